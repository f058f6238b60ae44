use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pitwall")]
#[command(author, version, about = "Ask Formula 1 questions answered from live data tools", long_about = None)]
pub struct Cli {
    /// Explicit configuration file (default: config/$CONFIG_ENV)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a single question
    Ask {
        question: String,

        /// Conversation session the question belongs to
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Also print the Query Plan and every tool call
        #[arg(short, long)]
        verbose: bool,
    },

    /// Start an interactive question session
    Interactive {
        #[arg(short, long, default_value = "default")]
        session: String,
    },

    /// Answer questions from a file, one per line
    Batch {
        file: String,

        #[arg(short, long, default_value = "5")]
        concurrency: usize,
    },

    /// Print the Query Plan for a question without calling any tool
    Plan { question: String },

    /// List the tool catalog
    Tools {
        /// Ask the data server which tools it advertises (stdio transport)
        #[arg(short, long)]
        remote: bool,
    },

    /// Check the health of the data service
    Health {
        /// Enable continuous monitoring (refresh every N seconds)
        #[arg(short, long)]
        watch: Option<u64>,
    },
}

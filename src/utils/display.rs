use crate::execution::ExecutionOutcome;
use colored::*;
use std::io::Write;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_warning(text: &str) {
    println!("{}", text.yellow());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = std::io::stdout().flush();
}

/// One line per dispatched call, e.g. `  [1] get_session_results {"year":2023} ✓`.
pub fn print_calls(outcome: &ExecutionOutcome) {
    for (i, call) in outcome.calls().iter().enumerate() {
        let arguments = serde_json::to_string(&call.arguments).unwrap_or_default();
        let line = format!("  [{}] {} {}", i + 1, call.tool, arguments);
        match call.result.payload() {
            Ok(_) => println!("{} {}", line.dimmed(), "✓".green()),
            Err(error) => println!("{} {} {}", line.dimmed(), "✗".red(), error.red()),
        }
    }
}

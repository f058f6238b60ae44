use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LLMConfig,
    pub tools: ToolsConfig,
    pub executor: ExecutorConfig,
    pub cache: CacheConfig,
    pub conversation: ConversationConfig,
    pub synthesis: SynthesisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 600,
            temperature: 0.0,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Bridge,
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub transport: Transport,
    pub bridge_url: String,
    pub server_command: String,
    pub server_args: Vec<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Bridge,
            bridge_url: "http://localhost:3001".to_string(),
            server_command: "python3".to_string(),
            server_args: vec![
                "-m".to_string(),
                "f1_mcp_server.server".to_string(),
                "--transport".to_string(),
                "stdio".to_string(),
            ],
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_sessions: usize,
    pub ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            ttl_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_answer_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_answer_chars: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());
        Self::load(File::with_name(&format!("config/{}", config_env)).required(false))
    }

    /// Load settings from an explicit file, still honouring `APP__*` overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(File::from(path.as_ref()).required(true))
    }

    fn load<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// The oracle key is optional: without it the deterministic paths are used.
    pub fn api_key() -> Option<String> {
        env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
    }
}

pub mod bridge;
pub mod llm;
pub mod mcp;

pub use bridge::{BridgeClient, BridgeHealth};
pub use llm::{LLMClient, LanguageOracle};
pub use mcp::McpStdioService;

//! Pitwall - Formula 1 question planner with recursive MCP tool orchestration
//!
//! This library turns natural-language F1 questions into calls against a
//! fixed catalog of remote data tools, chains dependent calls with bounded
//! recursion, and answers only from what the tools returned.

pub mod config;
pub mod core;
pub mod error;
pub mod execution;
pub mod planning;
pub mod storage;
pub mod synthesis;
pub mod tools;
pub mod utils;

pub mod api;
pub mod cli;

pub use api::{batch, Answer, Assistant, ServiceHealth};
pub use config::Settings;
pub use crate::core::{BridgeClient, BridgeHealth, LLMClient, LanguageOracle, McpStdioService};
pub use error::ToolServiceError;
pub use execution::{ExecutionOutcome, RecursiveExecutor, ToolCall};
pub use planning::{Clock, ConversationContext, FixedClock, QueryPlan, QueryPlanner, SystemClock, TemporalContext};
pub use synthesis::Synthesizer;
pub use tools::{catalog::ToolCatalog, Arguments, ToolInvocationResult, ToolInvocationService};

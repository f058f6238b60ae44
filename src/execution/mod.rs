//! Execution - running a `QueryPlan` against the data service
//!
//! Information Hiding:
//! - Envelope nesting and payload column spellings hidden behind typed views
//! - Per-pair argument threading kept in a registry
//! - Recursion bound and plan validation enforced in one place

pub mod envelope;
pub mod payload;
pub mod recursive;
pub mod threading;

pub use envelope::Envelope;
pub use recursive::{CombinedResult, ExecutionOutcome, RecursiveExecutor, ToolCall};
pub use threading::{ArgumentThreader, ThreadingContext, ThreadingRegistry};

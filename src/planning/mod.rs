//! Planning - turning a natural-language question into a `QueryPlan`
//!
//! Information Hiding:
//! - Entity tables (drivers, Grands Prix) hidden behind lookup functions
//! - Rule precedence lives in one ordered table per stage
//! - Oracle prompt format and response validation kept together

pub mod entities;
pub mod oracle;
pub mod plan;
pub mod planner;
pub mod rules;
pub mod temporal;

pub use plan::{ConversationContext, FollowUp, QueryPlan};
pub use planner::QueryPlanner;
pub use temporal::{Clock, FixedClock, SystemClock, TemporalContext};

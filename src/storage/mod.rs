//! Process-wide State
//!
//! Information Hiding:
//! - Storage backend implementation details hidden behind trait
//! - Size cap and time-to-live enforced by one bounded map shared by every store
//! - Stores are injected, never global

use crate::planning::ConversationContext;
use anyhow::Result;
use async_trait::async_trait;

pub mod bounded;
pub mod cache;
pub mod conversation;

pub use bounded::BoundedTtlMap;
pub use cache::{CachingService, ResponseCache};
pub use conversation::ConversationStore;

/// Per-session conversation context storage
#[async_trait]
pub trait ConversationStorage: Send + Sync {
    /// Save the context of a session
    async fn save(&self, session_id: &str, context: &ConversationContext) -> Result<()>;

    /// Load the context of a session
    /// Returns an empty context if the session doesn't exist
    async fn load(&self, session_id: &str) -> Result<ConversationContext>;

    /// Forget a session
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// List all live session IDs
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Check if a session exists
    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(!self.load(session_id).await?.is_empty())
    }
}

//! In-Memory Conversation Store
//!
//! Information Hiding:
//! - Bounded map structure hidden from users
//! - Thread-safe access via RwLock hidden behind async interface
//! - Contexts are lost when the process terminates

use super::bounded::BoundedTtlMap;
use super::ConversationStorage;
use crate::config::ConversationConfig;
use crate::planning::ConversationContext;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct ConversationStore {
    sessions: RwLock<BoundedTtlMap<String, ConversationContext>>,
}

impl ConversationStore {
    pub fn new(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(BoundedTtlMap::new(max_sessions, ttl)),
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(config.max_sessions, Duration::from_secs(config.ttl_secs))
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::from_config(&ConversationConfig::default())
    }
}

#[async_trait]
impl ConversationStorage for ConversationStore {
    async fn save(&self, session_id: &str, context: &ConversationContext) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), context.clone());
        tracing::debug!(
            "[ConversationStore] Saved context for session '{}' (race: {:?}, year: {:?})",
            session_id,
            context.last_race_name,
            context.last_year
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<ConversationContext> {
        let sessions = self.sessions.read().await;
        let context = sessions.get(session_id).cloned().unwrap_or_default();
        tracing::debug!(
            "[ConversationStore] Loaded context for session '{}' (empty: {})",
            session_id,
            context.is_empty()
        );
        Ok(context)
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        tracing::debug!("[ConversationStore] Deleted session '{}'", session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;
        let session_ids = sessions.keys();
        tracing::debug!("[ConversationStore] Listed {} sessions", session_ids.len());
        Ok(session_ids)
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).is_some())
    }
}

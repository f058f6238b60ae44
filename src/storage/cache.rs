//! Response cache for tool calls, and the service decorator that consults it.

use super::bounded::BoundedTtlMap;
use crate::config::CacheConfig;
use crate::error::ToolServiceError;
use crate::tools::{Arguments, ToolInvocationResult, ToolInvocationService};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct ResponseCache {
    entries: RwLock<BoundedTtlMap<String, ToolInvocationResult>>,
}

impl ResponseCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(BoundedTtlMap::new(max_entries, ttl)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, Duration::from_secs(config.ttl_secs))
    }

    /// Tool name plus arguments in key order.
    pub fn key(tool: &str, arguments: &Arguments) -> String {
        let mut pairs: Vec<(&String, String)> = arguments
            .iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        pairs.sort();
        let args = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", tool, args)
    }

    pub async fn get(&self, tool: &str, arguments: &Arguments) -> Option<ToolInvocationResult> {
        self.entries.read().await.get(&Self::key(tool, arguments)).cloned()
    }

    pub async fn put(&self, tool: &str, arguments: &Arguments, result: ToolInvocationResult) {
        self.entries
            .write()
            .await
            .insert(Self::key(tool, arguments), result);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Serves repeated calls from the cache. Only fully successful results are stored.
pub struct CachingService {
    inner: Arc<dyn ToolInvocationService>,
    cache: Arc<ResponseCache>,
}

impl CachingService {
    pub fn new(inner: Arc<dyn ToolInvocationService>, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl ToolInvocationService for CachingService {
    async fn invoke(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ToolInvocationResult, ToolServiceError> {
        if let Some(hit) = self.cache.get(name, arguments).await {
            tracing::debug!("[ResponseCache] Hit for {}", name);
            return Ok(hit);
        }

        let result = self.inner.invoke(name, arguments).await?;
        if result.is_success_deep() {
            self.cache.put(name, arguments, result.clone()).await;
        }
        Ok(result)
    }
}

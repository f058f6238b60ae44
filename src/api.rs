//! Question-answering facade
//!
//! This module wires planner, executor, synthesizer and the per-session
//! conversation store into one easy-to-use async interface.

use crate::config::{Settings, Transport};
use crate::core::bridge::{BridgeClient, BridgeHealth};
use crate::core::llm::{LLMClient, LanguageOracle};
use crate::core::mcp::McpStdioService;
use crate::error::ToolServiceError;
use crate::execution::{ExecutionOutcome, RecursiveExecutor};
use crate::planning::{Clock, ConversationContext, QueryPlan, QueryPlanner, SystemClock, TemporalContext};
use crate::storage::{CachingService, ConversationStorage, ConversationStore, ResponseCache};
use crate::synthesis::Synthesizer;
use crate::tools::catalog::ToolCatalog;
use crate::tools::executor::{RetryPolicy, RetryingService};
use crate::tools::ToolInvocationService;
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

/// One answered question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub plan: QueryPlan,
    pub outcome: Option<ExecutionOutcome>,
}

impl Answer {
    /// Number of remote calls that were actually dispatched.
    pub fn calls(&self) -> usize {
        self.outcome.as_ref().map(|o| o.calls().len()).unwrap_or(0)
    }
}

/// What `health()` could find out about the data service.
#[derive(Debug, Clone)]
pub enum ServiceHealth {
    Bridge(BridgeHealth),
    Stdio { tools: Vec<String> },
    Unmanaged,
}

enum Endpoint {
    Bridge(Arc<BridgeClient>),
    Stdio(Arc<McpStdioService>),
    Custom,
}

pub struct Assistant {
    catalog: Arc<ToolCatalog>,
    planner: QueryPlanner,
    executor: RecursiveExecutor,
    synthesizer: Synthesizer,
    conversations: Arc<dyn ConversationStorage>,
    clock: Arc<dyn Clock>,
    endpoint: Endpoint,
}

impl Assistant {
    /// Assistant over any Tool Invocation Service, without an oracle.
    ///
    /// # Example
    /// ```no_run
    /// use pitwall::{Assistant, BridgeClient, SystemClock};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let bridge = Arc::new(BridgeClient::new("http://localhost:3001", 30)?);
    ///     let assistant = Assistant::new(bridge, Arc::new(SystemClock));
    ///     let answer = assistant.ask("default", "Who won the 2023 British Grand Prix?").await?;
    ///     println!("{}", answer.text);
    ///     Ok(())
    /// }
    /// ```
    pub fn new(service: Arc<dyn ToolInvocationService>, clock: Arc<dyn Clock>) -> Self {
        let catalog = Arc::new(ToolCatalog::f1_defaults());
        Self {
            planner: QueryPlanner::new(catalog.clone()),
            executor: RecursiveExecutor::new(service, catalog.clone(), clock.clone()),
            synthesizer: Synthesizer::default(),
            conversations: Arc::new(ConversationStore::default()),
            catalog,
            clock,
            endpoint: Endpoint::Custom,
        }
    }

    /// Build the full stack from configuration: transport, retries, cache, oracle, stores.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let tools = &settings.tools;
        let (transport, endpoint) = match tools.transport {
            Transport::Bridge => {
                let bridge = Arc::new(BridgeClient::new(tools.bridge_url.clone(), tools.timeout_secs)?);
                tracing::info!("[Assistant] Using HTTP bridge at {}", bridge.base_url());
                let service: Arc<dyn ToolInvocationService> = bridge.clone();
                (service, Endpoint::Bridge(bridge))
            }
            Transport::Stdio => {
                let stdio = Arc::new(McpStdioService::new(
                    tools.server_command.clone(),
                    tools.server_args.clone(),
                ));
                tracing::info!("[Assistant] Using MCP stdio server: {}", tools.server_command);
                let service: Arc<dyn ToolInvocationService> = stdio.clone();
                (service, Endpoint::Stdio(stdio))
            }
        };

        let retrying: Arc<dyn ToolInvocationService> = Arc::new(RetryingService::new(
            transport,
            RetryPolicy::new(tools.timeout_secs, tools.max_retries),
        ));
        let cache = Arc::new(ResponseCache::from_config(&settings.cache));
        let service = Arc::new(CachingService::new(retrying, cache));

        let mut assistant = Self::new(service, Arc::new(SystemClock))
            .with_max_depth(settings.executor.max_depth)
            .with_max_answer_chars(settings.synthesis.max_answer_chars)
            .with_conversations(Arc::new(ConversationStore::from_config(&settings.conversation)));
        assistant.endpoint = endpoint;

        match (settings.llm.enabled, Settings::api_key()) {
            (true, Some(api_key)) => {
                let client = LLMClient::new(api_key, settings.llm.clone())?;
                tracing::info!("[Assistant] Oracle enabled ({})", settings.llm.model);
                Ok(assistant.with_oracle(Arc::new(client)))
            }
            (true, None) => {
                tracing::info!("[Assistant] No OPENAI_API_KEY set, using deterministic planning only");
                Ok(assistant)
            }
            (false, _) => Ok(assistant),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn LanguageOracle>) -> Self {
        self.planner = self.planner.with_oracle(oracle.clone());
        self.synthesizer = self.synthesizer.with_oracle(oracle);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.executor = self.executor.with_max_depth(max_depth);
        self
    }

    pub fn with_max_answer_chars(mut self, max_answer_chars: usize) -> Self {
        self.synthesizer = self.synthesizer.with_max_answer_chars(max_answer_chars);
        self
    }

    pub fn with_conversations(mut self, conversations: Arc<dyn ConversationStorage>) -> Self {
        self.conversations = conversations;
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Plan, execute and answer one question in the context of a session.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Answer> {
        let temporal = TemporalContext::now(self.clock.as_ref());
        let mut context = self.conversations.load(session_id).await?;

        let plan = self
            .planner
            .plan(question, &temporal, (!context.is_empty()).then_some(&context))
            .await;

        if plan.is_conversational() {
            return Ok(Answer {
                text: self.synthesizer.conversational(question),
                plan,
                outcome: None,
            });
        }

        let outcome = match self.executor.execute(&plan, 0).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[Assistant] {} failed: {}", plan.tool, e);
                return Ok(Answer {
                    text: self.synthesizer.service_failure(&e),
                    plan,
                    outcome: None,
                });
            }
        };

        let text = self
            .synthesizer
            .synthesize(question, &plan, &outcome, temporal.today())
            .await;

        for call in outcome.calls() {
            if call.result.is_success_deep() {
                context.record(&call.tool, &call.arguments);
            }
        }
        self.conversations.save(session_id, &context).await?;

        Ok(Answer {
            text,
            plan,
            outcome: Some(outcome),
        })
    }

    /// The Query Plan a question would produce, without executing it.
    pub async fn plan_only(&self, session_id: &str, question: &str) -> Result<QueryPlan> {
        let temporal = TemporalContext::now(self.clock.as_ref());
        let context = self.conversations.load(session_id).await?;
        Ok(self
            .planner
            .plan(question, &temporal, (!context.is_empty()).then_some(&context))
            .await)
    }

    pub async fn context(&self, session_id: &str) -> Result<ConversationContext> {
        self.conversations.load(session_id).await
    }

    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.conversations.delete(session_id).await
    }

    pub async fn health(&self) -> Result<ServiceHealth, ToolServiceError> {
        match &self.endpoint {
            Endpoint::Bridge(bridge) => Ok(ServiceHealth::Bridge(bridge.health().await?)),
            Endpoint::Stdio(stdio) => {
                let tools = stdio.list_remote_tools().await?;
                Ok(ServiceHealth::Stdio {
                    tools: tools.into_iter().map(|t| t.name).collect(),
                })
            }
            Endpoint::Custom => Ok(ServiceHealth::Unmanaged),
        }
    }

    /// Tool names advertised by the data server itself, when the transport can list them.
    pub async fn remote_tools(&self) -> Result<Option<Vec<String>>, ToolServiceError> {
        match &self.endpoint {
            Endpoint::Stdio(stdio) => Ok(Some(
                stdio.list_remote_tools().await?.into_iter().map(|t| t.name).collect(),
            )),
            _ => Ok(None),
        }
    }
}

/// Batch processing utilities
pub mod batch {
    use super::*;
    use futures::stream::{self, StreamExt};

    /// Answer independent questions concurrently, each in its own session.
    ///
    /// Results keep the input order.
    pub async fn process_questions(
        assistant: &Assistant,
        questions: Vec<String>,
        concurrency: usize,
    ) -> Vec<Result<Answer>> {
        let mut indexed: Vec<(usize, Result<Answer>)> = stream::iter(questions.into_iter().enumerate())
            .map(|(i, question)| async move {
                let session = format!("batch-{}", i);
                let answer = assistant.ask(&session, &question).await;
                let _ = assistant.clear_session(&session).await;
                (i, answer)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, answer)| answer).collect()
    }
}

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::config::LLMConfig;

/// An external text-generation capability used for planning and phrasing answers.
///
/// Implementations may fail; every caller has a deterministic path to fall back on.
#[async_trait]
pub trait LanguageOracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Same as `generate`, but asks for a single JSON object.
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// OpenAI-compatible chat-completions client.
pub struct LLMClient {
    client: Client,
    api_key: String,
    config: LLMConfig,
}

impl LLMClient {
    const BASE_DELAY_MS: u64 = 1000;

    pub fn new(api_key: String, config: LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.chat_with_format(messages, None).await
    }

    pub async fn chat_with_format(
        &self,
        messages: Vec<ChatMessage>,
        response_format: Option<ResponseFormat>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
            response_format,
        };

        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = Self::BASE_DELAY_MS * 2_u64.pow(attempt - 1);
                tracing::warn!(
                    "[LLMClient] Retrying API call (attempt {}/{}) after {}ms delay",
                    attempt + 1,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response_result = self
                .client
                .post(self.endpoint())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let response = match response_result {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!("[LLMClient] HTTP request failed: {}", e);
                    last_error = Some(anyhow::anyhow!("HTTP request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
                tracing::warn!(
                    "[LLMClient] API returned error status {}: {}",
                    status,
                    error_text
                );
                last_error = Some(anyhow::anyhow!("API error {}: {}", status, error_text));
                // client errors will not improve on retry
                if status.is_client_error() && status.as_u16() != 429 {
                    break;
                }
                continue;
            }

            let chat_response = match response.json::<ChatResponse>().await {
                Ok(cr) => cr,
                Err(e) => {
                    tracing::warn!("[LLMClient] Failed to decode response body: {}", e);
                    last_error = Some(anyhow::anyhow!("Response decode error: {}", e));
                    continue;
                }
            };

            return chat_response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("Model returned an empty completion"));
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

#[async_trait]
impl LanguageOracle for LLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(vec![ChatMessage::user(prompt)]).await
    }

    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.chat_with_format(vec![ChatMessage::user(prompt)], Some(ResponseFormat::JsonObject))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> LLMConfig {
        LLMConfig {
            base_url,
            max_retries: 1,
            ..LLMConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"tool\":\"get_event_schedule\"}"}}]
            })))
            .mount(&server)
            .await;

        let client = LLMClient::new("test-key".to_string(), config(server.uri())).unwrap();
        let text = client.generate_json("plan this").await.unwrap();
        assert!(text.contains("get_event_schedule"));
    }

    #[tokio::test]
    async fn test_client_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = LLMClient::new("wrong".to_string(), config(server.uri())).unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = LLMClient::new("k".to_string(), config(server.uri())).unwrap();
        assert!(client.generate("hello").await.is_err());
    }
}

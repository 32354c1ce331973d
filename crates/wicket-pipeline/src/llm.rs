use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A message in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Request to an LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: u32,
    /// Ask the backend for a bare JSON object.
    pub json_response: bool,
}

/// Response from an LLM.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
}

pub type LlmFuture<'a> = Pin<Box<dyn Future<Output = Result<LlmResponse, PipelineError>> + Send + 'a>>;

/// Facade trait for LLM providers.
///
/// Uses Pin<Box<dyn Future>> for dyn-compatibility, so the server can hold
/// an `Arc<dyn LlmClient>` chosen from configuration.
pub trait LlmClient: Send + Sync {
    fn chat<'a>(&'a self, request: &'a LlmRequest) -> LlmFuture<'a>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI protocol.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let system = LlmMessage::system(request.system_prompt.as_str());
        let messages: Vec<&LlmMessage> = std::iter::once(&system).chain(&request.messages).collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });
        if request.json_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

/// The part of a `/chat/completions` reply the generator reads.
#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl LlmClient for OpenAiCompatibleClient {
    fn chat<'a>(&'a self, request: &'a LlmRequest) -> LlmFuture<'a> {
        Box::pin(async move {
            let url = self.endpoint();
            tracing::debug!(model = %self.model, %url, max_tokens = request.max_tokens, "Requesting completion");

            let mut call = self.http.post(&url).json(&self.request_body(request));
            if let Some(key) = &self.api_key {
                call = call.bearer_auth(key);
            }
            let reply = call
                .send()
                .await
                .map_err(|e| PipelineError::LlmError(format!("cannot reach {url}: {e}")))?;

            let status = reply.status();
            if !status.is_success() {
                let detail = reply.text().await.unwrap_or_default();
                return Err(PipelineError::LlmError(format!(
                    "{} answered {status}: {detail}",
                    self.describe()
                )));
            }

            let completion: Completion = reply.json().await.map_err(|e| {
                PipelineError::LlmError(format!("unreadable completion from {url}: {e}"))
            })?;
            completion
                .choices
                .into_iter()
                .find_map(|choice| choice.message.content)
                .map(|content| LlmResponse { content })
                .ok_or_else(|| {
                    PipelineError::LlmError(format!("{} returned no message content", self.describe()))
                })
        })
    }

    fn describe(&self) -> String {
        format!("{} at {}", self.model, self.base_url)
    }
}

/// Replays scripted replies in order, wrapping around at the end.
///
/// Backs the `stub` provider and the tests; it never touches the network.
pub struct StubLlmClient {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl StubLlmClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
        }
    }

    /// A stub that gives the same reply every time.
    pub fn constant(reply: &str) -> Self {
        Self::new(vec![reply.to_string()])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl LlmClient for StubLlmClient {
    fn chat<'a>(&'a self, _request: &'a LlmRequest) -> LlmFuture<'a> {
        Box::pin(async move {
            let turn = self.calls.fetch_add(1, Ordering::Relaxed);
            if self.replies.is_empty() {
                return Err(PipelineError::LlmError("stub has no scripted replies".into()));
            }
            let content = self.replies[turn % self.replies.len()].clone();
            Ok(LlmResponse { content })
        })
    }

    fn describe(&self) -> String {
        format!("stub ({} scripted replies)", self.replies.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            system_prompt: "test".into(),
            messages: vec![],
            max_tokens: 100,
            json_response: false,
        }
    }

    #[tokio::test]
    async fn stub_returns_constant_response() {
        let client = StubLlmClient::constant("hello");
        let response = client.chat(&request()).await.unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn stub_cycles_through_responses() {
        let client = StubLlmClient::new(vec!["first".into(), "second".into()]);

        let r1 = client.chat(&request()).await.unwrap();
        assert_eq!(r1.content, "first");

        let r2 = client.chat(&request()).await.unwrap();
        assert_eq!(r2.content, "second");

        let r3 = client.chat(&request()).await.unwrap();
        assert_eq!(r3.content, "first"); // cycles back
    }

    #[test]
    fn request_body_carries_system_prompt_and_json_mode() {
        let client = OpenAiCompatibleClient::new(
            "http://localhost:9999/v1".into(),
            "test-model".into(),
            None,
        );
        let mut req = request();
        req.messages.push(LlmMessage::user("Hello"));
        req.json_response = true;

        let body = client.request_body(&req);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn stub_without_replies_is_an_llm_error() {
        let client = StubLlmClient::new(vec![]);
        let result = client.chat(&request()).await;
        assert!(matches!(result, Err(PipelineError::LlmError(m)) if m.contains("no scripted replies")));
    }

    #[test]
    fn completion_content_is_read_from_first_choice() {
        let completion: Completion = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "{}" } }],
        }))
        .unwrap();
        let content = completion.choices.into_iter().find_map(|c| c.message.content);
        assert_eq!(content.as_deref(), Some("{}"));
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client = OpenAiCompatibleClient::new("http://host/v1/".into(), "m".into(), None);
        assert_eq!(client.endpoint(), "http://host/v1/chat/completions");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_llm_error() {
        let client = OpenAiCompatibleClient::new(
            "http://127.0.0.1:9/v1".into(),
            "test-model".into(),
            None,
        );
        let result = client.chat(&request()).await;
        assert!(matches!(result, Err(PipelineError::LlmError(_))));
    }
}

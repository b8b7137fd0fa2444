use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::traits::{ClientInfo, DeltaSink, JobClient, JobKind, JobRequest};
use crate::config::{ClientConfig, Provider};
use crate::error::{Error, Result};
use crate::prompt;
use crate::stream::{Framing, StreamAccumulator};
use crate::util::strip_thinking;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// HTTP job client for LLM provider endpoints.
///
/// Works with OpenAI, Anthropic, Ollama, and any OpenAI-compatible server
/// (llama.cpp, vLLM, DeepSeek, etc.) via the `custom` provider.
pub struct HttpJobClient {
    client: Client,
    config: ClientConfig,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Anthropic messages request
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

// =============================================================================
// Client
// =============================================================================

impl HttpJobClient {
    /// Create a new HTTP job client.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created, which should only happen
    /// in extreme circumstances (e.g., TLS backend unavailable on the system).
    #[allow(clippy::expect_used)]
    pub fn new(config: ClientConfig) -> Self {
        // No request timeout on purpose: long generations are normal and the
        // cancellation token is the abort mechanism.
        let client = Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Validate configuration that must be in place before any request.
    fn validate(&self) -> Result<()> {
        if self.config.model.trim().is_empty() {
            return Err(Error::ConfigMissing("model".to_string()));
        }
        if self.config.provider.requires_api_key()
            && self.config.api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(Error::ConfigMissing("api_key".to_string()));
        }
        Ok(())
    }

    /// Render the prompt for a request, validating placeholder counts.
    fn render_prompt(request: &JobRequest) -> Result<String> {
        let rendered = match request.kind {
            JobKind::Translate => {
                prompt::render_translate(&request.prompt_template, &request.unit_text)?
            }
            JobKind::Proofread => prompt::render_proofread(
                &request.prompt_template,
                &request.unit_text,
                request.current_result.as_deref().unwrap_or(""),
            )?,
        };
        Ok(prompt::with_context(
            rendered,
            &request.context_before,
            &request.context_after,
        ))
    }

    /// True when this request goes out as a streamed response.
    fn streaming(&self) -> Option<Framing> {
        if !self.config.stream {
            return None;
        }
        self.config.provider.framing()
    }

    /// Build the provider-specific POST for one rendered prompt.
    fn build_request(&self, prompt_text: String, streaming: bool) -> RequestBuilder {
        let base = self.config.effective_api_base();
        let base = base.trim_end_matches('/');
        let messages = vec![Message::user(prompt_text)];

        match self.config.provider {
            Provider::OpenAi | Provider::Custom => {
                let body = ChatRequest {
                    model: self.config.model.clone(),
                    messages,
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                    stream: streaming,
                };
                let mut req = self
                    .client
                    .post(format!("{base}/chat/completions"))
                    .json(&body);
                if let Some(ref key) = self.config.api_key {
                    req = req.header("Authorization", format!("Bearer {key}"));
                }
                req
            }
            Provider::Anthropic => {
                let body = AnthropicRequest {
                    model: self.config.model.clone(),
                    max_tokens: self.config.max_tokens,
                    messages,
                    temperature: self.config.temperature,
                };
                self.client
                    .post(format!("{base}/messages"))
                    .header("x-api-key", self.config.api_key.clone().unwrap_or_default())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
            Provider::Ollama => {
                let body = OllamaRequest {
                    model: self.config.model.clone(),
                    messages,
                    stream: streaming,
                };
                self.client.post(format!("{base}/api/chat")).json(&body)
            }
        }
    }

    /// Extract the result text from a non-streaming response body.
    fn parse_response(&self, body: &str) -> Result<String> {
        match self.config.provider {
            Provider::OpenAi | Provider::Custom => {
                let parsed: ChatResponse = serde_json::from_str(body)
                    .map_err(|e| Error::InvalidResponse(e.to_string()))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))
            }
            Provider::Anthropic => {
                let parsed: AnthropicResponse = serde_json::from_str(body)
                    .map_err(|e| Error::InvalidResponse(e.to_string()))?;
                parsed
                    .content
                    .into_iter()
                    .next()
                    .map(|c| c.text)
                    .ok_or_else(|| Error::InvalidResponse("No content in response".to_string()))
            }
            Provider::Ollama => {
                let parsed: OllamaResponse = serde_json::from_str(body)
                    .map_err(|e| Error::InvalidResponse(e.to_string()))?;
                Ok(parsed.message.content)
            }
        }
    }

    /// Drain a streamed response, feeding snapshots to the sink.
    ///
    /// The byte stream is dropped (and the connection released) on every
    /// exit path: completion, error, and cancellation.
    async fn consume_stream(
        &self,
        response: reqwest::Response,
        framing: Framing,
        token: &CancellationToken,
        on_delta: DeltaSink<'_>,
    ) -> Result<String> {
        let mut accumulator = StreamAccumulator::new(framing);
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                () = token.cancelled() => {
                    debug!("Stream read cancelled");
                    return Err(Error::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for snapshot in accumulator.push(&bytes) {
                        on_delta(&strip_thinking(&snapshot));
                    }
                    if accumulator.is_finished() {
                        break;
                    }
                }
                Some(Err(e)) => return Err(Error::Request(e.to_string())),
                None => {
                    if let Some(snapshot) = accumulator.finish() {
                        on_delta(&strip_thinking(&snapshot));
                    }
                    break;
                }
            }
        }

        if accumulator.text().is_empty() {
            return Err(Error::StreamParse(
                "stream ended without any content frames".to_string(),
            ));
        }

        Ok(strip_thinking(accumulator.text()))
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            name: self.config.provider.name(),
            requires_api_key: self.config.provider.requires_api_key(),
            supports_streaming: self.config.provider.framing().is_some(),
        }
    }

    async fn run(
        &self,
        request: &JobRequest,
        token: &CancellationToken,
        on_delta: DeltaSink<'_>,
    ) -> Result<String> {
        // Configuration problems surface before any network traffic
        self.validate()?;
        let prompt_text = Self::render_prompt(request)?;

        let framing = self.streaming();
        let req = self.build_request(prompt_text, framing.is_some());

        debug!(
            "{} request to {} ({})",
            request.kind,
            self.config.effective_api_base(),
            self.config.provider
        );

        let response = tokio::select! {
            () = token.cancelled() => {
                debug!("Request cancelled before response");
                return Err(Error::Cancelled);
            }
            result = req.send() => result.map_err(|e| Error::Request(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("API error: {} - {}", status, body);
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        if let Some(framing) = framing {
            return self.consume_stream(response, framing, token, on_delta).await;
        }

        let body = tokio::select! {
            () = token.cancelled() => return Err(Error::Cancelled),
            body = response.text() => body.map_err(|e| Error::Request(e.to_string()))?,
        };

        let content = self.parse_response(&body)?;
        Ok(strip_thinking(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: JobKind, template: &str) -> JobRequest {
        JobRequest {
            kind,
            unit_text: "Bonjour".to_string(),
            context_before: Vec::new(),
            context_after: Vec::new(),
            prompt_template: template.to_string(),
            current_result: None,
        }
    }

    #[test]
    fn test_render_prompt_translate() {
        let rendered =
            HttpJobClient::render_prompt(&request(JobKind::Translate, "T: {{text}}"))
                .expect("valid template");
        assert_eq!(rendered, "T: Bonjour");
    }

    #[test]
    fn test_render_prompt_rejects_bad_template() {
        let err = HttpJobClient::render_prompt(&request(JobKind::Translate, "no placeholder"))
            .unwrap_err();
        assert!(matches!(err, Error::PromptTemplate(_)));
    }

    #[test]
    fn test_validate_requires_key_for_hosted_providers() {
        let mut config = ClientConfig::new(Provider::OpenAi, None, "gpt-4o-mini");
        let client = HttpJobClient::new(config.clone());
        assert!(matches!(
            client.validate(),
            Err(Error::ConfigMissing(field)) if field == "api_key"
        ));

        config.api_key = Some("sk-test".to_string());
        let client = HttpJobClient::new(config);
        assert!(client.validate().is_ok());
    }

    #[test]
    fn test_validate_allows_keyless_local_providers() {
        let client = HttpJobClient::new(ClientConfig::new(Provider::Ollama, None, "qwen2.5"));
        assert!(client.validate().is_ok());
    }

    #[test]
    fn test_anthropic_never_streams() {
        let mut config = ClientConfig::new(Provider::Anthropic, Some("key".into()), "claude");
        config.stream = true;
        let client = HttpJobClient::new(config);
        assert!(client.streaming().is_none());
    }

    #[test]
    fn test_parse_openai_response() {
        let client = HttpJobClient::new(ClientConfig::new(Provider::Custom, None, "m"));
        let content = client
            .parse_response(r#"{"choices":[{"message":{"content":"Hello"}}]}"#)
            .expect("valid body");
        assert_eq!(content, "Hello");

        assert!(matches!(
            client.parse_response(r#"{"choices":[]}"#),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_anthropic_response() {
        let client =
            HttpJobClient::new(ClientConfig::new(Provider::Anthropic, Some("k".into()), "m"));
        let content = client
            .parse_response(r#"{"content":[{"type":"text","text":"Salut"}]}"#)
            .expect("valid body");
        assert_eq!(content, "Salut");
    }

    #[test]
    fn test_parse_ollama_response() {
        let client = HttpJobClient::new(ClientConfig::new(Provider::Ollama, None, "m"));
        let content = client
            .parse_response(r#"{"message":{"role":"assistant","content":"Hej"},"done":true}"#)
            .expect("valid body");
        assert_eq!(content, "Hej");
    }
}

//! Chat-completion assistant client.
//!
//! A thin wrapper over an OpenAI-compatible chat-completions endpoint (Groq
//! by default). The contract is deliberately string-shaped: any failure
//! (missing key, network error, non-2xx status, malformed or empty body)
//! resolves to a human-readable reply beginning with `"Error:"` or
//! `"API Error:"` rather than an `Err`. Callers treat the string content as
//! the failure signal, which keeps every consumer a single render path.
//!
//! # Privacy
//!
//! The prompt leaves the machine: this is the only Pillbox component that
//! talks to an external service. Prompts are never logged.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Base URL of the default chat-completions provider.
const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Model requested from the provider.
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Client for generating assistant replies.
#[derive(Clone)]
pub struct AssistantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl AssistantClient {
    /// Create a client against the default provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Provider API key. `None` is allowed; every request then
    ///   resolves to a configuration-error reply.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_API_BASE, api_key)
    }

    /// Create a client with a custom base URL (for testing or an alternate
    /// OpenAI-compatible provider).
    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Generate a reply for `prompt`.
    ///
    /// Never fails: see the module docs for the error-string contract.
    pub async fn generate_content(&self, prompt: &str) -> String {
        if prompt.trim().is_empty() {
            return "Error: Invalid input".to_string();
        }

        let Some(api_key) = &self.api_key else {
            return "Error: API key not configured".to_string();
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 1.0,
        };

        let response = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Assistant request failed to send");
                return format!("Error: {e}");
            }
        };

        let status = response.status();
        let body = match response.json::<ChatResponse>().await {
            Ok(body) => body,
            Err(e) => {
                warn!(status = %status, error = %e, "Assistant response was not valid JSON");
                return "Error: API returned invalid response format".to_string();
            }
        };

        if !status.is_success() {
            let message = body
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(status = %status, "Assistant API returned an error");
            return format!("API Error: {message}");
        }

        match body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
        {
            Some(content) if !content.is_empty() => content,
            _ => "Error: Empty response from API".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

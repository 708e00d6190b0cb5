use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

// --- Errors ---

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{provider} needs an API key: set llm.api_key or export {env}")]
    MissingApiKey {
        provider: &'static str,
        env: &'static str,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} returned an empty response")]
    EmptyResponse(&'static str),

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<AiError>,
    },
}

impl AiError {
    /// Network hiccups, rate limits and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            // A dropped connection or a cut-off body is as transient as a timeout.
            AiError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// --- Provider trait ---

pub trait AIProvider {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Environment variable consulted when the config carries no key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::OpenAI => "gpt-4o",
            ProviderKind::Ollama => "llama3",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn AIProvider>, AiError> {
    let model = if config.model.trim().is_empty() {
        config.provider.default_model().to_string()
    } else {
        config.model.trim().to_string()
    };
    let http = HttpSettings::new(config)?;

    match config.provider {
        ProviderKind::Anthropic => {
            let api_key = require_key(config, "Anthropic")?;
            Ok(Box::new(AnthropicProvider { api_key, model, http }))
        }
        ProviderKind::OpenAI => {
            let api_key = require_key(config, "OpenAI")?;
            Ok(Box::new(OpenAIProvider { api_key, model, http }))
        }
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            http,
        })),
    }
}

fn require_key(config: &LlmConfig, provider: &'static str) -> Result<String, AiError> {
    config.resolved_api_key().ok_or(AiError::MissingApiKey {
        provider,
        env: config.provider.api_key_env().unwrap_or("an API key variable"),
    })
}

// --- Retry ---

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (backoff.as_millis() / 4) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Runs `op` until it succeeds, fails permanently, or the retry budget is
/// spent. `op` receives the zero-based attempt number.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, AiError>
where
    F: FnMut(u32) -> Result<T, AiError>,
{
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "LLM call failed, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(e) if e.is_transient() => {
                return Err(AiError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

// --- Shared HTTP plumbing ---

#[derive(Debug)]
struct HttpSettings {
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
    max_tokens: u32,
}

impl HttpSettings {
    fn new(config: &LlmConfig) -> Result<Self, AiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            retry: RetryPolicy::new(config.max_retries),
            max_tokens: config.max_tokens,
        })
    }

    fn send<T: for<'de> Deserialize<'de>>(
        &self,
        provider: &'static str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, AiError> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AiError::Api {
                provider,
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json()?)
    }
}

// {"error": {"message": ..}} or {"error": ".."}
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn non_empty(provider: &'static str, text: Option<String>) -> Result<String, AiError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(AiError::EmptyResponse(provider)),
    }
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    http: HttpSettings,
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.http.max_tokens,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: AnthropicResponse = with_retry(&self.http.retry, |attempt| {
            debug!(attempt, model = %self.model, "calling Anthropic");
            self.http.send(
                "Anthropic",
                self.http
                    .client
                    .post(ANTHROPIC_API_URL)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&request),
            )
        })?;

        let text = response
            .content
            .into_iter()
            .find(|block| block.content_type == "text")
            .and_then(|block| block.text);
        non_empty("Anthropic", text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model: String,
    http: HttpSettings,
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let request = OpenAIRequest {
            model: &self.model,
            max_tokens: self.http.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response: OpenAIResponse = with_retry(&self.http.retry, |attempt| {
            debug!(attempt, model = %self.model, "calling OpenAI");
            self.http.send(
                "OpenAI",
                self.http
                    .client
                    .post(OPENAI_API_URL)
                    .bearer_auth(&self.api_key)
                    .json(&request),
            )
        })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        non_empty("OpenAI", text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// --- Ollama provider (local server) ---

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

#[derive(Debug)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    http: HttpSettings,
}

impl AIProvider for OllamaProvider {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let request = OllamaRequest {
            model: &self.model,
            system,
            prompt,
            stream: false,
        };
        let url = format!("{}/api/generate", self.base_url);

        let response: OllamaResponse = with_retry(&self.http.retry, |attempt| {
            debug!(attempt, model = %self.model, url = %url, "calling Ollama");
            self.http
                .send("Ollama", self.http.client.post(&url).json(&request))
        })?;

        non_empty("Ollama", response.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::env;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn api_error(status: u16) -> AiError {
        AiError::Api {
            provider: "Test",
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(api_error(429).is_transient());
        assert!(api_error(503).is_transient());
        assert!(!api_error(400).is_transient());
        assert!(!api_error(401).is_transient());
        assert!(!AiError::EmptyResponse("Test").is_transient());
    }

    #[test]
    fn test_connection_dropped_mid_request_is_transient() {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            // Hang up without answering.
        });

        let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
        let err = client.get(format!("http://{}/v1/messages", addr)).send().unwrap_err();
        server.join().unwrap();

        assert!(!err.is_connect());
        assert!(AiError::Http(err).is_transient());
    }

    #[test]
    fn test_retry_recovers_from_transient_errors() {
        let calls = Cell::new(0);
        let result = with_retry(&instant_policy(3), |attempt| {
            calls.set(calls.get() + 1);
            if attempt < 2 {
                Err(api_error(503))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_stops_on_permanent_error() {
        let calls = Cell::new(0);
        let result: Result<(), AiError> = with_retry(&instant_policy(5), |_| {
            calls.set(calls.get() + 1);
            Err(api_error(401))
        });
        assert!(matches!(result, Err(AiError::Api { status: 401, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retry_gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), AiError> = with_retry(&instant_policy(2), |_| {
            calls.set(calls.get() + 1);
            Err(api_error(429))
        });
        match result {
            Err(AiError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AiError::Api { status: 429, .. }));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = policy.delay_for(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        let capped = policy.delay_for(9);
        assert!(capped <= Duration::from_millis(625));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad model"}}"#),
            "bad model"
        );
        assert_eq!(error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_message("  upstream timeout "), "upstream timeout");
    }

    #[test]
    fn test_create_ollama_provider_needs_no_key() {
        let config = LlmConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "llama3");
    }

    #[test]
    fn test_create_anthropic_provider_with_configured_key() {
        let config = LlmConfig {
            provider: ProviderKind::Anthropic,
            model: String::new(),
            api_key: Some("test-key".to_string()),
            ..LlmConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_openai_provider_requires_api_key() {
        let original = env::var("OPENAI_API_KEY").ok();
        unsafe { env::remove_var("OPENAI_API_KEY"); }

        let config = LlmConfig {
            provider: ProviderKind::OpenAI,
            model: "gpt-4o".to_string(),
            ..LlmConfig::default()
        };
        let result = create_provider(&config);

        if let Some(val) = original {
            unsafe { env::set_var("OPENAI_API_KEY", val); }
        }

        let err = result.err().unwrap();
        assert!(matches!(err, AiError::MissingApiKey { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}

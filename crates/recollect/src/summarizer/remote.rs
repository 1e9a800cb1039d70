//! Remote summarizer using OpenAI-compatible APIs
//!
//! Sends the rendered archive prompt to any OpenAI-compatible chat
//! completions endpoint. URL, model and the name of the environment
//! variable holding the API key come from [`SummarizerConfig`].

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SummarizerConfig;
use crate::summarizer::prompts::render_prompt;
use crate::summarizer::provider::Summarizer;
use crate::summarizer::types::{SummarizerError, SummaryRequest};

const SYSTEM_PROMPT: &str = "You condense character memories for a simulation.";

/// Pauses between attempts; one attempt more than there are delays
const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(500), Duration::from_secs(1)];

enum Attempt {
    Done(Result<String, SummarizerError>),
    /// Transient failure worth another try
    Retry(String),
}

/// Remote summarizer using OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteSummarizer {
    client: Client,
    config: SummarizerConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
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

impl RemoteSummarizer {
    /// Create a new remote summarizer.
    ///
    /// Fails if the API key environment variable is not set.
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizerError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            SummarizerError::ConfigError(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummarizerError::ApiError(e.to_string()))?;

        info!(model = %config.model, api_url = %config.api_url, "Remote summarizer ready");

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn chat_request(&self, prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens: 256,
        }
    }

    /// One POST to the completions endpoint
    async fn attempt(&self, url: &str, body: &ChatCompletionRequest) -> Attempt {
        let response = match self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(format!("request failed: {e}")),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry("rate limited".to_string());
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Attempt::Done(Err(SummarizerError::ApiError(format!(
                "API returned {status}: {detail}"
            ))));
        }

        let completion = match response.json::<ChatCompletionResponse>().await {
            Ok(completion) => completion,
            Err(e) => return Attempt::Done(Err(SummarizerError::ParseError(e.to_string()))),
        };
        Attempt::Done(
            completion
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or(SummarizerError::EmptyResponse),
        )
    }

    /// Send `prompt`, waiting out rate limits and transport failures
    /// according to [`RETRY_DELAYS`]
    async fn call_api(&self, prompt: &str) -> Result<String, SummarizerError> {
        let body = self.chat_request(prompt);
        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        debug!(url = %url, model = %self.config.model, "Requesting archive summary");

        let mut reason = String::new();
        for (attempt, delay) in RETRY_DELAYS.iter().map(Some).chain([None]).enumerate() {
            match self.attempt(&url, &body).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(why) => reason = why,
            }
            if let Some(delay) = delay {
                warn!(attempt = attempt + 1, reason = %reason, ?delay, "Summary request will be retried");
                tokio::time::sleep(*delay).await;
            }
        }

        Err(SummarizerError::Unavailable(format!(
            "gave up on archive summary after {} attempts ({reason})",
            RETRY_DELAYS.len() + 1
        )))
    }
}

#[async_trait]
impl Summarizer for RemoteSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        let prompt = render_prompt(request);
        let response = self.call_api(&prompt).await?;
        let summary = response.trim();

        if summary.is_empty() {
            return Err(SummarizerError::EmptyResponse);
        }

        debug!(
            agent = %request.agent,
            entries = request.entries.len(),
            "Summarized archive batch"
        );
        Ok(summary.to_string())
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty() && !self.config.api_url.is_empty()
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryKind, MemoryTier};
    use crate::summarizer::prompts::ARCHIVE_SUMMARY_PROMPT;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_ENV: &str = "RECOLLECT_UNIT_SUMMARIZER_KEY";

    fn create_test_config(api_url: String) -> SummarizerConfig {
        SummarizerConfig {
            enabled: true,
            api_url,
            api_key_env: KEY_ENV.to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            prompt_template: ARCHIVE_SUMMARY_PROMPT.to_string(),
        }
    }

    fn request() -> SummaryRequest {
        SummaryRequest {
            agent: "pawn_1".to_string(),
            kind: MemoryKind::Conversation,
            tier: MemoryTier::Archive,
            entries: vec!["Talked with Bob about the raid".to_string()],
            prompt_template: ARCHIVE_SUMMARY_PROMPT.to_string(),
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let mut config = create_test_config("https://api.example.com/v1".to_string());
        config.api_key_env = "RECOLLECT_UNIT_UNSET_KEY".to_string();
        unsafe { env::remove_var("RECOLLECT_UNIT_UNSET_KEY") };

        let err = RemoteSummarizer::new(&config).unwrap_err().to_string();
        assert!(err.contains("RECOLLECT_UNIT_UNSET_KEY"));
    }

    #[tokio::test]
    async fn test_summarize_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer unit-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("  Often talked with Bob about raids.  ")),
            )
            .mount(&mock_server)
            .await;

        unsafe { env::set_var(KEY_ENV, "unit-key") };
        let summarizer = RemoteSummarizer::new(&create_test_config(mock_server.uri())).unwrap();

        let summary = summarizer.summarize(&request()).await.unwrap();
        assert_eq!(summary, "Often talked with Bob about raids.");
    }

    #[tokio::test]
    async fn test_summarize_empty_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var(KEY_ENV, "unit-key") };
        let summarizer = RemoteSummarizer::new(&create_test_config(mock_server.uri())).unwrap();

        let result = summarizer.summarize(&request()).await;
        assert!(matches!(result, Err(SummarizerError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_summarize_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var(KEY_ENV, "unit-key") };
        let summarizer = RemoteSummarizer::new(&create_test_config(mock_server.uri())).unwrap();

        let err = summarizer.summarize(&request()).await.unwrap_err().to_string();
        assert!(err.contains("500"));
    }

    #[tokio::test]
    async fn test_summarize_gives_up_when_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&mock_server)
            .await;

        unsafe { env::set_var(KEY_ENV, "unit-key") };
        let summarizer = RemoteSummarizer::new(&create_test_config(mock_server.uri())).unwrap();

        let err = summarizer.summarize(&request()).await.unwrap_err();
        assert!(matches!(err, SummarizerError::Unavailable(_)));
        assert!(err.to_string().contains("after 3 attempts (rate limited)"));
    }

    #[tokio::test]
    async fn test_name_and_availability() {
        unsafe { env::set_var(KEY_ENV, "unit-key") };
        let summarizer =
            RemoteSummarizer::new(&create_test_config("https://api.example.com/v1".to_string()))
                .unwrap();

        assert_eq!(summarizer.name(), "remote");
        assert!(summarizer.is_available().await);
    }
}

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Credentials;
use crate::error::{DigestError, Result};
use crate::models::{ScoredPaper, Summary};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

const MAX_ABSTRACT_BYTES: usize = 10_000;

/// Failure reported by a text-generation backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceFailure {
    /// Worth retrying: timeouts, connection resets, 5xx.
    Transient(String),
    /// Rate limited by the provider; retried with a longer wait.
    RateLimited(String),
    /// Bad credentials, malformed request or response. Never retried.
    Permanent(String),
}

impl ServiceFailure {
    fn message(&self) -> &str {
        match self {
            ServiceFailure::Transient(m)
            | ServiceFailure::RateLimited(m)
            | ServiceFailure::Permanent(m) => m,
        }
    }
}

#[async_trait]
pub trait SummaryService: Send + Sync {
    async fn complete(&self, prompt: &str) -> core::result::Result<String, ServiceFailure>;
}

pub fn build_prompt(abstract_text: &str) -> String {
    let truncated = truncate_at_char_boundary(abstract_text, MAX_ABSTRACT_BYTES);

    format!(
        r#"You are an expert ML analyst. Summarise the following research abstract in <=120 words, bullet style, focusing on contribution and why it matters. Avoid jargon and make it accessible.

Abstract: {}

Format your response as concise bullet points highlighting:
• Key contribution/innovation
• Why it matters/potential impact
• Technical approach (simplified)"#,
        truncated
    )
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32, failure: &ServiceFailure) -> Duration {
        match failure {
            ServiceFailure::RateLimited(_) => self
                .rate_limit_delay
                .saturating_mul(attempt.saturating_add(1)),
            _ => self.base_delay.saturating_mul(2_u32.saturating_pow(attempt)),
        }
    }
}

pub struct Summarizer<S> {
    service: S,
    retry: RetryPolicy,
    concurrency: usize,
}

impl<S: SummaryService> Summarizer<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            retry: RetryPolicy::default(),
            // Keep concurrency low to stay under provider rate limits
            concurrency: 2,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn summarize(&self, abstract_text: &str) -> Result<String> {
        let prompt = build_prompt(abstract_text);
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let failure = match self.service.complete(&prompt).await {
                Ok(text) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
                Ok(_) => ServiceFailure::Permanent("Empty summary returned".to_string()),
                Err(failure) => failure,
            };

            if let ServiceFailure::Permanent(reason) = failure {
                return Err(DigestError::SummaryUnavailable {
                    attempts: attempt + 1,
                    reason,
                });
            }

            if attempt + 1 == max_attempts {
                return Err(DigestError::SummaryUnavailable {
                    attempts: max_attempts,
                    reason: failure.message().to_string(),
                });
            }

            let backoff = self.retry.backoff(attempt, &failure);
            warn!(
                attempt = attempt + 1,
                ?backoff,
                reason = failure.message(),
                "summary request failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }

        Err(DigestError::SummaryUnavailable {
            attempts: max_attempts,
            reason: "Max retries reached".to_string(),
        })
    }

    /// Fills in the summary of every paper, keeping the input order.
    ///
    /// A paper whose summary cannot be produced gets [`Summary::Unavailable`];
    /// this never fails as a whole.
    pub async fn summarize_papers(&self, papers: Vec<ScoredPaper>) -> Vec<ScoredPaper> {
        stream::iter(papers)
            .map(|mut scored| async move {
                let summary = match self.summarize(&scored.paper.abstract_text).await {
                    Ok(text) => Summary::Generated(text),
                    Err(e) => {
                        warn!(paper = %scored.paper.id, error = %e, "using placeholder summary");
                        Summary::Unavailable(e.to_string())
                    }
                };
                debug!(paper = %scored.paper.id, "summarized");
                scored.summary = Some(summary);
                scored
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

/// OpenRouter chat-completions backend.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    site_url: Option<String>,
    site_name: String,
}

impl OpenRouterClient {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.openrouter_key()?.to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DigestError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            url: OPENROUTER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            site_url: credentials.openrouter_site_url.clone(),
            site_name: credentials.openrouter_site_name.clone(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: StatusCode, body: String) -> ServiceFailure {
    let message = format!("API error {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        ServiceFailure::RateLimited(message)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ServiceFailure::Transient(message)
    } else {
        ServiceFailure::Permanent(message)
    }
}

fn extract_content(response: ChatResponse) -> core::result::Result<String, ServiceFailure> {
    if let Some(error) = response.error {
        return Err(ServiceFailure::Permanent(format!(
            "OpenRouter error: {}",
            error.message.unwrap_or_else(|| "Unknown error".to_string())
        )));
    }

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| {
            ServiceFailure::Permanent("No response content received from OpenRouter".to_string())
        })
}

#[async_trait]
impl SummaryService for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> core::result::Result<String, ServiceFailure> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
            max_tokens: 200,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("X-Title", &self.site_name)
            .json(&request);
        if let Some(site_url) = &self.site_url {
            builder = builder.header("HTTP-Referer", site_url);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ServiceFailure::Transient(format!("Network error: {}", e))
            } else {
                ServiceFailure::Permanent(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(classify_status(status, error_text));
        }

        let chat = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ServiceFailure::Permanent(format!("Failed to parse OpenRouter response: {}", e)))?;

        extract_content(chat)
    }
}

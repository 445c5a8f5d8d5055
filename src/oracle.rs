//! Generative oracle abstraction and providers.
//!
//! The pipeline sees one capability, [`Oracle::complete`]: prompt in, text
//! out. Providers:
//!
//! - **[`DisabledOracle`]**: always fails; the default until a provider is
//!   configured.
//! - **[`OpenAiOracle`]**: any OpenAI-compatible `/chat/completions`
//!   endpoint.
//! - **[`WatsonxOracle`]**: IBM watsonx.ai text generation, authenticated
//!   with an IAM token exchanged from the API key.
//!
//! Use [`create_oracle`] to build the configured provider.
//!
//! # Retry Strategy
//!
//! Both HTTP providers share [`post_json_with_retry`]:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff 1s, 2s, 4s, ... (capped at 2^5)
//!
//! # Credentials
//!
//! The API key is read from `ORACLE_API_KEY`, falling back to `API_KEY`.
//! For watsonx, `PROJECT_ID` and `REGION_URL` override the configured
//! project and base URL.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::OracleConfig;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_WATSONX_BASE_URL: &str = "https://us-south.ml.cloud.ibm.com";
const IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
const WATSONX_API_VERSION: &str = "2023-05-29";

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Provider name for logs (e.g. `"watsonx"`).
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("no oracle configured; set [oracle].provider to openai or watsonx")
    }
}

/// Read the oracle API key from the environment.
pub fn api_key_from_env() -> Result<String> {
    std::env::var("ORACLE_API_KEY")
        .or_else(|_| std::env::var("API_KEY"))
        .map_err(|_| anyhow::anyhow!("ORACLE_API_KEY (or API_KEY) environment variable not set"))
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create oracle HTTP client")
}

/// Whether a response status is worth retrying.
pub fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Send a JSON request built by `build`, retrying transient failures.
///
/// `build` is called once per attempt since a request builder is consumed
/// by `send`.
pub async fn post_json_with_retry<F>(label: &str, max_retries: u32, build: F) -> Result<Value>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider = label, attempt, ?delay, "retrying oracle request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: Value = response
                        .json()
                        .await
                        .with_context(|| format!("{} returned invalid JSON", label))?;
                    return Ok(json);
                }

                let body_text = response.text().await.unwrap_or_default();
                if is_retryable(status) {
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::Error::new(e).context(format!("{} request failed", label)));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", label)))
}

// ============ OpenAI-compatible ============

pub struct OpenAiOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_new_tokens: u32,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        Self::with_api_key(config, api_key_from_env()?)
    }

    pub fn with_api_key(config: &OracleConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for openai provider"))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model,
            api_key,
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_new_tokens,
            "temperature": self.temperature,
        });

        let json = post_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        parse_chat_response(&json)
    }
}

/// `choices[0].message.content`
pub fn parse_chat_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

// ============ watsonx ============

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct WatsonxOracle {
    client: reqwest::Client,
    base_url: String,
    iam_url: String,
    project_id: String,
    model: String,
    api_key: String,
    max_new_tokens: u32,
    temperature: f32,
    max_retries: u32,
    token: Mutex<Option<CachedToken>>,
}

impl WatsonxOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for watsonx provider"))?;
        let project_id = std::env::var("PROJECT_ID")
            .ok()
            .or_else(|| config.project_id.clone())
            .ok_or_else(|| anyhow::anyhow!("oracle.project_id (or PROJECT_ID) required for watsonx"))?;
        let base_url = std::env::var("REGION_URL")
            .ok()
            .or_else(|| config.base_url.clone())
            .unwrap_or_else(|| DEFAULT_WATSONX_BASE_URL.to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url,
            iam_url: IAM_TOKEN_URL.to_string(),
            project_id,
            model,
            api_key: api_key_from_env()?,
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            token: Mutex::new(None),
        })
    }

    /// A valid IAM bearer token, refreshed a minute before expiry.
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let json = post_json_with_retry("IAM", self.max_retries, || {
            self.client
                .post(&self.iam_url)
                .header("Accept", "application/json")
                .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", self.api_key.as_str())])
        })
        .await?;

        let value = json
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("IAM response missing access_token"))?
            .to_string();
        let lifetime = json.get("expires_in").and_then(|e| e.as_u64()).unwrap_or(3600);

        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime.saturating_sub(60)),
        });
        Ok(value)
    }
}

#[async_trait]
impl Oracle for WatsonxOracle {
    fn name(&self) -> &str {
        "watsonx"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let token = self.bearer_token().await?;
        let url = format!(
            "{}/ml/v1/text/generation?version={}",
            self.base_url.trim_end_matches('/'),
            WATSONX_API_VERSION
        );
        let body = json!({
            "model_id": self.model,
            "project_id": self.project_id,
            "input": prompt,
            "parameters": generation_parameters(self.max_new_tokens, self.temperature),
        });

        let json = post_json_with_retry("watsonx", self.max_retries, || {
            self.client.post(&url).bearer_auth(&token).json(&body)
        })
        .await?;

        parse_generation_response(&json)
    }
}

/// Greedy decoding at temperature zero, sampling otherwise.
pub fn generation_parameters(max_new_tokens: u32, temperature: f32) -> Value {
    if temperature <= 0.0 {
        json!({
            "decoding_method": "greedy",
            "max_new_tokens": max_new_tokens,
        })
    } else {
        json!({
            "decoding_method": "sample",
            "temperature": temperature,
            "max_new_tokens": max_new_tokens,
        })
    }
}

/// `results[0].generated_text`
pub fn parse_generation_response(json: &Value) -> Result<String> {
    json.get("results")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("generated_text"))
        .and_then(|t| t.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("Invalid generation response: missing results[0].generated_text"))
}

pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledOracle)),
        "openai" => Ok(Arc::new(OpenAiOracle::new(config)?)),
        "watsonx" => Ok(Arc::new(WatsonxOracle::new(config)?)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_oracle_fails() {
        let oracle = create_oracle(&OracleConfig::default()).unwrap();
        assert_eq!(oracle.name(), "disabled");
        assert!(oracle.complete("hi").await.is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = OracleConfig {
            provider: "magic".to_string(),
            ..OracleConfig::default()
        };
        assert!(create_oracle(&config).is_err());
    }

    #[test]
    fn openai_requires_model() {
        let err = OpenAiOracle::with_api_key(&OracleConfig::default(), "k".to_string())
            .err()
            .unwrap();
        assert!(err.to_string().contains("oracle.model"));
    }

    #[test]
    fn chat_response_parsing() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": "[{\"step\":1}]" } }] });
        assert_eq!(parse_chat_response(&json).unwrap(), "[{\"step\":1}]");
        assert!(parse_chat_response(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn generation_response_parsing() {
        let json = json!({ "results": [{ "generated_text": "[]", "stop_reason": "eos_token" }] });
        assert_eq!(parse_generation_response(&json).unwrap(), "[]");
        assert!(parse_generation_response(&json!({ "errors": [] })).is_err());
    }

    #[test]
    fn decoding_follows_temperature() {
        let greedy = generation_parameters(900, 0.0);
        assert_eq!(greedy["decoding_method"], "greedy");
        assert_eq!(greedy["max_new_tokens"], 900);
        assert!(greedy.get("temperature").is_none());

        let sample = generation_parameters(100, 0.7);
        assert_eq!(sample["decoding_method"], "sample");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
    }
}

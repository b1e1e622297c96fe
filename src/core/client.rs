//! HTTP translation provider with model fallback

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::core::config::ProviderConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{TokenUsage, TranslationRequest, TranslationResult};
use crate::core::provider::TranslationProvider;
use crate::core::token_tracker::{estimate_tokens, TokenTracker};

/// Translation client for the responses API.
///
/// Each call goes to the primary model first, then to the fallback models in
/// order. Quota and rate-limit refusals end the call at once so the job queue
/// can back off.
#[derive(Debug, Clone)]
pub struct AsyncTranslator {
    client: reqwest::Client,
    config: Arc<ProviderConfig>,
    semaphore: Arc<Semaphore>,
    token_tracker: TokenTracker,
    current_model: Arc<Mutex<String>>,
}

impl AsyncTranslator {
    /// Create a new async translator
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_endpoint.is_empty() {
            return Err(TranslationError::ConfigError {
                message: "API endpoint is required".to_string(),
            });
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let token_tracker = TokenTracker::new(config.daily_token_limit);
        let current_model = Arc::new(Mutex::new(config.model.clone()));

        Ok(Self {
            client,
            config: Arc::new(config),
            semaphore,
            token_tracker,
            current_model,
        })
    }

    /// Models in the order they are tried
    pub fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config.model.as_str())
            .chain(self.config.fallback_models.iter().map(String::as_str))
            .filter(|m| !m.is_empty())
    }

    /// Translate a single request
    pub async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        let estimate = estimate_tokens(&request.text);
        self.token_tracker.reserve(estimate).await?;

        let result = self.translate_reserved(request).await;
        match &result {
            Ok(done) => self.token_tracker.settle(estimate, done.tokens_used).await,
            Err(_) => self.token_tracker.release(estimate).await,
        }
        result
    }

    async fn translate_reserved(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| TranslationError::InternalError(e.to_string()))?;

        let mut last_error = None;
        for model in self.models() {
            match self.send_request(request, model).await {
                Ok(result) => {
                    *self.current_model.lock().await = result.model_used.clone();
                    return Ok(result);
                }
                Err(e) if e.is_quota() => return Err(e),
                Err(e) => {
                    warn!("Model {} failed: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TranslationError::ConfigError {
            message: "No models configured".to_string(),
        }))
    }

    /// Send actual HTTP request
    async fn send_request(
        &self,
        request: &TranslationRequest,
        model: &str,
    ) -> Result<TranslationResult> {
        debug!("Sending {} bytes to model {}", request.text.len(), model);
        let body = build_body(request, model);

        let response = self
            .client
            .post(&self.config.api_endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value =
                response
                    .json()
                    .await
                    .map_err(|e| TranslationError::InvalidResponseError {
                        message: e.to_string(),
                    })?;
            parse_response(&json, model)
        } else {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            Err(classify_failure(status.as_u16(), retry_after, error_text))
        }
    }

    /// Get current token usage
    pub async fn token_usage(&self) -> TokenUsage {
        self.token_tracker.snapshot().await
    }

    /// Model that served the last successful call
    pub async fn current_model(&self) -> String {
        self.current_model.lock().await.clone()
    }
}

#[async_trait]
impl TranslationProvider for AsyncTranslator {
    fn name(&self) -> &str {
        "responses-api"
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn translate_text(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        let result = self.translate(request).await?;
        info!(
            "Translated {} bytes with {} ({} tokens)",
            request.text.len(),
            result.model_used,
            result.tokens_used
        );
        Ok(result)
    }
}

/// Request body for one translation call
fn build_body(request: &TranslationRequest, model: &str) -> serde_json::Value {
    let mut options = serde_json::json!({
        "target_language": request.target_lang
    });
    if let Some(source_lang) = &request.source_lang {
        options["source_language"] = serde_json::json!(source_lang);
    }

    let mut body = serde_json::json!({
        "model": model,
        "input": [{
            "role": "user",
            "content": [{
                "type": "input_text",
                "text": request.text,
                "translation_options": options
            }]
        }]
    });
    if let Some(instructions) = &request.instructions {
        body["instructions"] = serde_json::json!(instructions);
    }
    body
}

fn parse_response(json: &serde_json::Value, model: &str) -> Result<TranslationResult> {
    let translation = json["output"]["choices"]
        .get(0)
        .and_then(|c| c["message"]["content"].as_str())
        .or_else(|| json["output_text"].as_str())
        .ok_or_else(|| TranslationError::InvalidResponseError {
            message: "No translation in response".to_string(),
        })?
        .to_string();

    let tokens_used = json["usage"]["total_tokens"].as_u64().unwrap_or(0) as usize;

    Ok(TranslationResult {
        translation,
        tokens_used,
        model_used: json["model"].as_str().unwrap_or(model).to_string(),
    })
}

/// Map a non-success response onto the error taxonomy
fn classify_failure(status: u16, retry_after: Option<u64>, body: String) -> TranslationError {
    if status == 429 {
        return TranslationError::RateLimitError { retry_after };
    }

    let lowered = body.to_lowercase();
    if lowered.contains("quota") || lowered.contains("insufficient balance") {
        return TranslationError::QuotaExceededError;
    }

    TranslationError::ApiError {
        status,
        message: body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    #[test]
    fn test_translator_creation() {
        let translator = AsyncTranslator::new(ProviderConfig::default()).unwrap();
        assert!(!translator.is_configured());
        let models: Vec<&str> = translator.models().collect();
        assert_eq!(models, vec!["doubao-seed-translation-250915", "deepseek-v3-250324"]);
    }

    #[test]
    fn test_configured_with_key() {
        let config = ProviderConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        };
        let translator = AsyncTranslator::new(config).unwrap();
        assert!(translator.is_configured());
    }

    #[tokio::test]
    async fn test_failed_call_releases_reserved_budget() {
        let config = ProviderConfig {
            api_key: "test_key".to_string(),
            api_endpoint: "http://127.0.0.1:9/responses".to_string(),
            fallback_models: Vec::new(),
            timeout_ms: 2000,
            daily_token_limit: 100,
            ..Default::default()
        };
        let translator = AsyncTranslator::new(config).unwrap();

        let request = TranslationRequest::new("Hello there", "fr");
        assert!(translator.translate(&request).await.is_err());

        assert_eq!(translator.token_usage().await.used_today, 0);
        assert_eq!(translator.current_model().await, "doubao-seed-translation-250915");
    }

    #[test]
    fn test_body_carries_languages_and_instructions() {
        let request = TranslationRequest::new("Hello", "fr")
            .with_source_lang("en")
            .with_instructions("Keep HTML tags");
        let body = build_body(&request, "m1");

        assert_json_include!(
            actual: body,
            expected: json!({
                "model": "m1",
                "instructions": "Keep HTML tags",
                "input": [{
                    "content": [{
                        "text": "Hello",
                        "translation_options": {
                            "source_language": "en",
                            "target_language": "fr"
                        }
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_body_omits_auto_source() {
        let request = TranslationRequest::new("Hello", "fr").with_source_lang("auto");
        let body = build_body(&request, "m1");
        let options = &body["input"][0]["content"][0]["translation_options"];
        assert!(options.get("source_language").is_none());
        assert!(body.get("instructions").is_none());
    }

    #[test]
    fn test_parse_response() {
        let json = json!({
            "output": {"choices": [{"message": {"content": "Bonjour"}}]},
            "usage": {"total_tokens": 12}
        });
        let result = parse_response(&json, "m1").unwrap();
        assert_eq!(result.translation, "Bonjour");
        assert_eq!(result.tokens_used, 12);
        assert_eq!(result.model_used, "m1");

        let empty = parse_response(&json!({"output": {}}), "m1");
        assert!(matches!(
            empty,
            Err(TranslationError::InvalidResponseError { .. })
        ));
    }

    #[test]
    fn test_failure_classification() {
        assert!(classify_failure(429, Some(5), String::new()).is_quota());
        assert!(classify_failure(403, None, "Quota exhausted for today".to_string()).is_quota());
        let other = classify_failure(500, None, "boom".to_string());
        assert!(!other.is_quota());
        assert!(matches!(other, TranslationError::ApiError { status: 500, .. }));
    }
}

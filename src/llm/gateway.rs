//! The `Generator` trait plus the concrete HTTP-backed `Gateway`: an
//! OpenAI-compatible `chat/completions` client wrapped in a per-provider
//! token-bucket rate limiter and fixed-point cost accounting.
//!
//! Grounded on the codebase's existing `reqwest`-based provider client —
//! same JSON request/response shape, same `thiserror`-composed error
//! enum — generalized to a trait object so BDI/AGInt/Mastermind/SIW can
//! all share one gateway instance (or a test double in `crate::testing`).

use crate::config::{GatewayConfig, ModelPricing};
use crate::errors::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_micros: i64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Every cognitive component talks to the model through this trait, so
/// `crate::testing` can substitute a scripted double in tests.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, GatewayError>;
}

/// Fixed-point cost estimate in micro-currency-units (six fractional
/// digits). Never uses `f64` — pricing tables and token counts are both
/// integers, and the product of two integers stays exact.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64, pricing: &HashMap<String, ModelPricing>) -> i64 {
    let Some(price) = pricing.get(model) else { return 0 };
    let input_cost = (input_tokens as i64).saturating_mul(price.input_micros_per_token);
    let output_cost = (output_tokens as i64).saturating_mul(price.output_micros_per_token);
    input_cost.saturating_add(output_cost)
}

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self { capacity: capacity as f64, tokens: capacity as f64, refill_per_sec, last_refill: std::time::Instant::now() }
    }

    fn try_acquire(&mut self) -> Result<(), u64> {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = std::time::Instant::now();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_secs = deficit / self.refill_per_sec.max(f64::MIN_POSITIVE);
            Err((wait_secs * 1000.0).ceil() as u64)
        }
    }
}

pub struct Gateway {
    client: reqwest::Client,
    config: GatewayConfig,
    bucket: Mutex<TokenBucket>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let bucket = TokenBucket::new(config.rate_limit_capacity, config.rate_limit_refill_per_sec);
        Self {
            client: reqwest::Client::new(),
            config,
            bucket: Mutex::new(bucket),
        }
    }
}

#[async_trait]
impl Generator for Gateway {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        {
            let mut bucket = self.bucket.lock().await;
            if let Err(retry_after_ms) = bucket.try_acquire() {
                return Err(GatewayError::RateLimited { retry_after_ms });
            }
        }

        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            GatewayError::InvalidRequest("no API key configured for the gateway".to_string())
        })?;

        let body = serde_json::json!({
            "model": req.model,
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });

        let response = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.default_timeout_secs),
            self.client
                .post(&self.config.endpoint)
                .bearer_auth(api_key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| GatewayError::Timeout(self.config.default_timeout_secs))?
        .map_err(|e| GatewayError::ProviderError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::FORBIDDEN || response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::PermissionDenied(response.status().to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::ProviderError(format!("{status}: {text}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::ProviderError("empty choices array".to_string()))?;

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        let cost_micros = estimate_cost(&req.model, input_tokens, output_tokens, &self.config.pricing);

        Ok(GenerateResponse { content, input_tokens, output_tokens, cost_micros })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelPricing;

    #[test]
    fn estimate_cost_is_exact_fixed_point_arithmetic() {
        let mut pricing = HashMap::new();
        pricing.insert("gpt-test".to_string(), ModelPricing { input_micros_per_token: 10, output_micros_per_token: 30 });
        assert_eq!(estimate_cost("gpt-test", 1000, 500, &pricing), 1000 * 10 + 500 * 30);
    }

    #[test]
    fn estimate_cost_unknown_model_is_zero() {
        let pricing = HashMap::new();
        assert_eq!(estimate_cost("unknown", 1000, 500, &pricing), 0);
    }

    #[test]
    fn token_bucket_exhausts_then_reports_retry_after() {
        let mut bucket = TokenBucket::new(1, 0.001);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(1, 1000.0);
        assert!(bucket.try_acquire().is_ok());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(bucket.try_acquire().is_ok());
    }
}

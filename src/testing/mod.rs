//! Test tooling shared between unit tests and `tests/integration/`.
//!
//! A mock LLM gateway (`ScriptedGenerator`) satisfies the `Generator` trait
//! with a fixed, cyclical script of responses, so BDI/AGInt/SIW scenarios
//! run deterministically without a network call — the same swap-the-client
//! pattern the codebase already uses for its own mock API client in tests.

use crate::errors::GatewayError;
use crate::llm::{GenerateRequest, GenerateResponse, Generator};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ScriptedGenerator {
    responses: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .responses
            .get(i % self.responses.len().max(1))
            .cloned()
            .unwrap_or_default();
        Ok(GenerateResponse { content, input_tokens: 0, output_tokens: 0, cost_micros: 0 })
    }
}

/// Always fails with the given error — for exercising recovery paths.
pub struct FailingGenerator {
    pub error: GatewayError,
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse, GatewayError> {
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> GenerateRequest {
        GenerateRequest { model: "m".to_string(), messages: vec![], temperature: None, max_tokens: None }
    }

    #[tokio::test]
    async fn scripted_generator_cycles_through_responses() {
        let generator = ScriptedGenerator::new(["a", "b"]);
        assert_eq!(generator.generate(req()).await.unwrap().content, "a");
        assert_eq!(generator.generate(req()).await.unwrap().content, "b");
        assert_eq!(generator.generate(req()).await.unwrap().content, "a");
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn failing_generator_always_errors() {
        let generator = FailingGenerator { error: GatewayError::Timeout(5) };
        assert!(generator.generate(req()).await.is_err());
    }
}

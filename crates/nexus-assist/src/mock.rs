//! Mock assistant for deterministic testing.
//!
//! ## Usage
//!
//! ```rust
//! use nexus_assist::MockAssistant;
//! use nexus_core::{AiAssistant, Analysis};
//!
//! # async fn demo() {
//! let assistant = MockAssistant::new().with_analysis(Analysis {
//!     summary: "Shopping list".into(),
//!     tags: vec!["errands".into()],
//!     ..Default::default()
//! });
//! let analysis = assistant.analyze("milk, eggs").await.unwrap();
//! assert_eq!(analysis.tags, vec!["errands".to_string()]);
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use nexus_core::{AiAssistant, Analysis, Error, Result};

#[derive(Debug, Clone)]
struct MockConfig {
    analysis: Analysis,
    generated: String,
    failure: Option<Error>,
    latency: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            analysis: Analysis::default(),
            generated: "Mock content".to_string(),
            failure: None,
            latency: Duration::ZERO,
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    pub input: String,
}

/// Assistant returning canned responses.
#[derive(Clone, Default)]
pub struct MockAssistant {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response for `analyze`. Clamped like real model output.
    pub fn with_analysis(mut self, analysis: Analysis) -> Self {
        Arc::make_mut(&mut self.config).analysis = analysis.truncated();
        self
    }

    /// Response for `generate`.
    pub fn with_generated(mut self, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).generated = text.into();
        self
    }

    /// Make every call fail with `error`.
    pub fn failing(mut self, error: Error) -> Self {
        Arc::make_mut(&mut self.config).failure = Some(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    pub fn call_count(&self) -> usize {
        self.log().len()
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, operation: &'static str, input: &str) -> Result<()> {
        self.log().push(MockCall {
            operation,
            input: input.to_string(),
        });
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        match &self.config.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AiAssistant for MockAssistant {
    async fn analyze(&self, content: &str) -> Result<Analysis> {
        self.enter("analyze", content).await?;
        Ok(self.config.analysis.clone())
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.enter("generate", prompt).await?;
        Ok(self.config.generated.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls() {
        let assistant = MockAssistant::new().with_generated("A poem");
        assert_eq!(assistant.generate("poem please").await.unwrap(), "A poem");
        assert_eq!(
            assistant.calls(),
            vec![MockCall {
                operation: "generate",
                input: "poem please".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_failing_assistant() {
        let assistant = MockAssistant::new().failing(Error::ConfigMissing("key".into()));
        let err = assistant.analyze("x").await.unwrap_err();
        assert_eq!(err, Error::ConfigMissing("key".into()));
        assert_eq!(assistant.call_count(), 1);
    }
}

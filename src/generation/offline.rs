use anyhow::Result;

use super::{GenerationParams, TextGenerator};

pub const OFFLINE_RESPONSE: &str =
    "Score: 0.75\nThis content shows reasonable coherence and quality.";

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Deterministic stand-in for the generation service.
pub struct OfflineGenerator {
    responder: Box<Responder>,
}

impl OfflineGenerator {
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::from_fn(move |_| Ok(response.clone()))
    }

    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
        }
    }
}

impl Default for OfflineGenerator {
    fn default() -> Self {
        Self::fixed(OFFLINE_RESPONSE)
    }
}

impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        (self.responder)(prompt)
    }
}

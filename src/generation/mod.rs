use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{error, warn};

use crate::config::ModelParams;
use crate::workers::{panic_message, run_bounded};

mod http;
mod offline;

pub use http::HttpGenerator;
pub use offline::OfflineGenerator;

/// Prefix of every string the adapter returns in place of a generation.
pub const ERROR_MARKER: &str = "Error calling LLM: ";

pub fn is_error_marker(text: &str) -> bool {
    text.starts_with(ERROR_MARKER)
}

fn error_marker(detail: impl fmt::Display) -> String {
    format!("{ERROR_MARKER}{detail}")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub model: Option<String>,
}

impl From<&ModelParams> for GenerationParams {
    fn from(params: &ModelParams) -> Self {
        Self {
            temperature: params.temperature,
            model: params.model.clone(),
        }
    }
}

/// The external text service: prompt in, text out.
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_params(params: &ModelParams) -> Self {
        Self {
            retry_count: params.retry_count,
            base_delay: params.retry_delay(),
            max_jitter: params.jitter(),
        }
    }

    pub fn without_delay(retry_count: u32) -> Self {
        Self {
            retry_count,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// `base_delay * 2^attempt` plus a uniform share of `max_jitter`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(2_u32.saturating_pow(attempt));
        let fraction = rand::thread_rng().gen_range(0.0..1.0);
        backoff.saturating_add(self.max_jitter.mul_f64(fraction))
    }
}

#[derive(Clone)]
pub struct GenerationAdapter {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl fmt::Debug for GenerationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationAdapter")
            .field("generator", &self.generator.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl GenerationAdapter {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    pub fn backend(&self) -> &'static str {
        self.generator.name()
    }

    /// Never fails: once retries are spent the error is folded into an
    /// [`ERROR_MARKER`] string.
    pub fn call(&self, prompt: &str, params: &GenerationParams) -> String {
        let attempts = self.policy.retry_count + 1;
        let mut attempt = 0;

        loop {
            match self.generator.generate(prompt, params) {
                Ok(text) => return text,
                Err(err) if attempt < self.policy.retry_count => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        backend = self.generator.name(),
                        attempt = attempt + 1,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "generation call failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        backend = self.generator.name(),
                        attempts,
                        error = %err,
                        "generation call failed after all retries"
                    );
                    return error_marker(err);
                }
            }
        }
    }

    /// Runs every prompt on a bounded pool; `output[i]` answers `prompts[i]`.
    pub fn batch(
        &self,
        prompts: &[String],
        max_workers: usize,
        params: &GenerationParams,
    ) -> Vec<String> {
        let results = match run_bounded(prompts, max_workers, |_, prompt| {
            self.call(prompt, params)
        }) {
            Ok(results) => results,
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "generation batch could not start");
                return vec![error_marker(message); prompts.len()];
            }
        };

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(index, error = %message, "generation worker panicked");
                    error_marker(message)
                })
            })
            .collect()
    }
}

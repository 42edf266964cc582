//! Content generator boundary
//!
//! Everything the engine cannot compute itself (branch labels, narrative
//! memory, severity scores) comes through [`ContentGenerator`]. Callers
//! normally hold a [`Retrying`] wrapper around a concrete generator: it
//! validates every payload against the structural contracts and retries
//! with jittered exponential backoff, so the rest of the engine only ever
//! sees well-formed content or a final error.

use crate::error::{CascadeError, Result};
use async_trait::async_trait;
use cascade_cache::{validate_severity, BranchSet, NodeNarrative, SeverityScore};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of primary effects generated for a fresh crisis graph.
pub const PRIMARY_COUNT: usize = 7;

/// Source of generated cascade content.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce the primary effect labels for a fresh graph, optionally
    /// localized to a country.
    async fn primary_effects(&self, country: Option<&str>) -> Result<Vec<String>>;

    /// Produce the child branches of a node, given its label, its
    /// ancestor label chain (oldest first, root and self excluded), and
    /// the affected entities known for the node.
    async fn expand(
        &self,
        label: &str,
        chain: &[String],
        country: Option<&str>,
        affected_entities: &[String],
    ) -> Result<BranchSet>;

    /// Produce the narrative memory for a node.
    async fn memory(
        &self,
        label: &str,
        chain: &[String],
        country: Option<&str>,
    ) -> Result<NodeNarrative>;

    /// Produce severity scores for a node. Severity depends on the label
    /// and country only, not on tree position.
    async fn severity(&self, label: &str, country: Option<&str>) -> Result<Vec<SeverityScore>>;
}

/// Retry policy for generator calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per call (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_factor: f64,
    /// Random fraction of the delay added on top, in [0, jitter)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            backoff_factor: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter.max(f64::EPSILON));
        Duration::from_secs_f64(base * (1.0 + jitter))
    }
}

/// Wraps a generator with payload validation and retry. A structurally
/// invalid payload counts as a failed attempt, same as a generator error.
pub struct Retrying<G> {
    inner: G,
    config: RetryConfig,
}

impl<G: ContentGenerator> Retrying<G> {
    pub fn new(inner: G, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_defaults(inner: G) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    async fn attempt<T, F, Fut, V>(&self, what: &str, call: F, validate: V) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
        V: Fn(&T) -> std::result::Result<(), String>,
    {
        let mut last_error = String::new();
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = self.config.delay(attempt - 1);
                debug!(what, attempt, ?delay, "Retrying generation");
                tokio::time::sleep(delay).await;
            }
            match call().await {
                Ok(value) => match validate(&value) {
                    Ok(()) => return Ok(value),
                    Err(reason) => {
                        warn!(what, attempt, "Generated payload rejected: {}", reason);
                        last_error = reason;
                    }
                },
                Err(e) => {
                    warn!(what, attempt, "Generation attempt failed: {}", e);
                    last_error = e.to_string();
                }
            }
        }
        Err(CascadeError::Generation {
            attempts: self.config.max_attempts,
            message: format!("{what}: {last_error}"),
        })
    }
}

#[async_trait]
impl<G: ContentGenerator> ContentGenerator for Retrying<G> {
    async fn primary_effects(&self, country: Option<&str>) -> Result<Vec<String>> {
        self.attempt(
            "primary_effects",
            || self.inner.primary_effects(country),
            |labels| {
                if labels.len() != PRIMARY_COUNT {
                    return Err(format!(
                        "expected {PRIMARY_COUNT} primary effects, got {}",
                        labels.len()
                    ));
                }
                if labels.iter().any(|l| l.trim().is_empty()) {
                    return Err("blank primary effect label".to_string());
                }
                Ok(())
            },
        )
        .await
    }

    async fn expand(
        &self,
        label: &str,
        chain: &[String],
        country: Option<&str>,
        affected_entities: &[String],
    ) -> Result<BranchSet> {
        self.attempt(
            "expand",
            || self.inner.expand(label, chain, country, affected_entities),
            |branches| branches.validate().map_err(|e| e.to_string()),
        )
        .await
    }

    async fn memory(
        &self,
        label: &str,
        chain: &[String],
        country: Option<&str>,
    ) -> Result<NodeNarrative> {
        self.attempt(
            "memory",
            || self.inner.memory(label, chain, country),
            |narrative| narrative.validate().map_err(|e| e.to_string()),
        )
        .await
    }

    async fn severity(&self, label: &str, country: Option<&str>) -> Result<Vec<SeverityScore>> {
        self.attempt(
            "severity",
            || self.inner.severity(label, country),
            |scores| validate_severity(scores).map_err(|e| e.to_string()),
        )
        .await
    }
}

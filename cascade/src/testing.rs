//! Test doubles for the generator boundary
//!
//! [`StubGenerator`] produces deterministic, contract-valid content derived
//! from the requested label, counts every call, and can be configured to
//! fail its first N calls or to emit malformed payloads. It lives in the
//! library (not a test module) so integration tests can share it.

use crate::error::{CascadeError, Result};
use crate::generator::{ContentGenerator, PRIMARY_COUNT};
use async_trait::async_trait;
use cascade_cache::{BranchSet, NodeNarrative, SeverityScore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-method call counters, shared with the test via [`StubGenerator::calls`].
#[derive(Debug, Default)]
pub struct CallCounts {
    pub primary_effects: AtomicUsize,
    pub expand: AtomicUsize,
    pub memory: AtomicUsize,
    pub severity: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.primary_effects.load(Ordering::SeqCst)
            + self.expand.load(Ordering::SeqCst)
            + self.memory.load(Ordering::SeqCst)
            + self.severity.load(Ordering::SeqCst)
    }
}

/// Deterministic scripted generator for tests.
pub struct StubGenerator {
    calls: Arc<CallCounts>,
    /// Remaining calls that should fail before the stub starts succeeding
    failures_left: Arc<AtomicUsize>,
    /// Emit a branch set with the wrong consequence count
    malformed_branches: bool,
    /// Suffix branch labels with the expand call index so successive
    /// expansions of the same label produce distinct children
    vary_branches: bool,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(CallCounts::default()),
            failures_left: Arc::new(AtomicUsize::new(0)),
            malformed_branches: false,
            vary_branches: false,
        }
    }

    /// Fail the first `n` calls (across all methods) with a generation error.
    pub fn fail_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Shared handle to the remaining-failure counter, so a test can arm
    /// failures after the stub has been moved into the engine.
    pub fn failures(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.failures_left)
    }

    /// Emit branch sets that violate the 3-consequence contract.
    pub fn malformed_branches(mut self) -> Self {
        self.malformed_branches = true;
        self
    }

    /// Make successive expansions of the same label produce distinct labels.
    pub fn vary_branches(mut self) -> Self {
        self.vary_branches = true;
        self
    }

    /// Handle to the shared call counters; clone before moving the stub.
    pub fn calls(&self) -> Arc<CallCounts> {
        Arc::clone(&self.calls)
    }

    fn maybe_fail(&self, what: &str) -> Result<()> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(CascadeError::Generation {
                attempts: 1,
                message: format!("stub failure injected for {what}"),
            });
        }
        Ok(())
    }
}

impl Default for StubGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentGenerator for StubGenerator {
    async fn primary_effects(&self, country: Option<&str>) -> Result<Vec<String>> {
        self.calls.primary_effects.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail("primary_effects")?;
        let suffix = country.map(|c| format!(" ({c})")).unwrap_or_default();
        Ok((0..PRIMARY_COUNT)
            .map(|i| format!("Primary Effect {i}{suffix}"))
            .collect())
    }

    async fn expand(
        &self,
        label: &str,
        _chain: &[String],
        _country: Option<&str>,
        _affected_entities: &[String],
    ) -> Result<BranchSet> {
        let call = self.calls.expand.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail("expand")?;

        let tag = if self.vary_branches {
            format!(" v{call}")
        } else {
            String::new()
        };
        let mut consequences: Vec<String> = (0..3)
            .map(|i| format!("{label} consequence {i}{tag}"))
            .collect();
        if self.malformed_branches {
            consequences.push(format!("{label} extra"));
        }
        Ok(BranchSet {
            consequences,
            responses: (0..2)
                .map(|i| format!("{label} response {i}{tag}"))
                .collect(),
        })
    }

    async fn memory(
        &self,
        label: &str,
        chain: &[String],
        _country: Option<&str>,
    ) -> Result<NodeNarrative> {
        self.calls.memory.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail("memory")?;
        Ok(NodeNarrative {
            context: format!("Context for {label} after {}", chain.join(" > ")),
            reflections: (0..3).map(|i| format!("{label} reflection {i}")).collect(),
            affected_entities: vec!["Transport".to_string(), "Energy".to_string()],
        })
    }

    async fn severity(&self, label: &str, _country: Option<&str>) -> Result<Vec<SeverityScore>> {
        self.calls.severity.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail("severity")?;
        Ok((0..6)
            .map(|i| SeverityScore {
                category: format!("Category {i}"),
                institutional: ((label.len() + i) % 10) as f64,
                human: (i % 10) as f64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_outputs_are_contract_valid() {
        let stub = StubGenerator::new();
        assert_eq!(stub.primary_effects(None).await.unwrap().len(), PRIMARY_COUNT);

        let branches = stub.expand("X", &[], None, &[]).await.unwrap();
        assert!(branches.validate().is_ok());

        let narrative = stub.memory("X", &[], None).await.unwrap();
        assert!(narrative.validate().is_ok());

        let scores = stub.severity("X", None).await.unwrap();
        assert!(cascade_cache::validate_severity(&scores).is_ok());
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let stub = StubGenerator::new().fail_first(1);
        assert!(stub.severity("X", None).await.is_err());
        assert!(stub.severity("X", None).await.is_ok());
        assert_eq!(stub.calls().severity.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_vary_branches_produces_distinct_labels() {
        let stub = StubGenerator::new().vary_branches();
        let first = stub.expand("X", &[], None, &[]).await.unwrap();
        let second = stub.expand("X", &[], None, &[]).await.unwrap();
        assert_ne!(first.consequences, second.consequences);
    }
}

//! Content payload types shared between the caches and the generator boundary
//!
//! These are the three value shapes the caches hold: node narratives,
//! severity score lists, and expansion results. Each carries a `validate`
//! method enforcing the generator contract, so schema-invalid payloads are
//! rejected before they reach a cache or the graph.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};

/// Number of reflection strings a narrative carries.
pub const REFLECTION_COUNT: usize = 3;

/// Number of consequence labels per expansion.
pub const CONSEQUENCE_COUNT: usize = 3;

/// Number of response labels per expansion.
pub const RESPONSE_COUNT: usize = 2;

/// Inclusive severity category count bounds.
pub const SEVERITY_CATEGORIES_MIN: usize = 6;
pub const SEVERITY_CATEGORIES_MAX: usize = 9;

/// Narrative payload attached to a node: a context paragraph, ordered
/// reflections, and the set of affected-entity labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeNarrative {
    /// Situational context for the effect
    pub context: String,

    /// Ordered reflection strings
    pub reflections: Vec<String>,

    /// Labels of entities this effect touches
    pub affected_entities: Vec<String>,
}

impl NodeNarrative {
    /// Check the generator contract: non-empty context and exactly three
    /// reflections.
    pub fn validate(&self) -> Result<()> {
        if self.context.trim().is_empty() {
            return Err(CacheError::Other("narrative context is empty".to_string()));
        }
        if self.reflections.len() != REFLECTION_COUNT {
            return Err(CacheError::Other(format!(
                "expected {} reflections, got {}",
                REFLECTION_COUNT,
                self.reflections.len()
            )));
        }
        Ok(())
    }
}

/// One severity category score. Both axes are on a 0-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityScore {
    /// Category name (e.g. "Economy", "Public Health")
    pub category: String,

    /// Impact on institutions, 0-10
    pub institutional: f64,

    /// Impact on people, 0-10
    pub human: f64,
}

impl SeverityScore {
    pub fn in_range(&self) -> bool {
        (0.0..=10.0).contains(&self.institutional) && (0.0..=10.0).contains(&self.human)
    }
}

/// Validate a severity score list: 6-9 categories, every score in [0, 10].
pub fn validate_severity(scores: &[SeverityScore]) -> Result<()> {
    if !(SEVERITY_CATEGORIES_MIN..=SEVERITY_CATEGORIES_MAX).contains(&scores.len()) {
        return Err(CacheError::Other(format!(
            "expected {}-{} severity categories, got {}",
            SEVERITY_CATEGORIES_MIN,
            SEVERITY_CATEGORIES_MAX,
            scores.len()
        )));
    }
    for score in scores {
        if !score.in_range() {
            return Err(CacheError::Other(format!(
                "severity score out of range for {}: institutional={}, human={}",
                score.category, score.institutional, score.human
            )));
        }
    }
    Ok(())
}

/// Result of expanding a node: consequence labels and response labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSet {
    /// Downstream consequence labels
    pub consequences: Vec<String>,

    /// Societal/institutional response labels
    pub responses: Vec<String>,
}

impl BranchSet {
    /// Check the generator contract: exactly three consequences and two
    /// responses, none blank.
    pub fn validate(&self) -> Result<()> {
        if self.consequences.len() != CONSEQUENCE_COUNT {
            return Err(CacheError::Other(format!(
                "expected {} consequences, got {}",
                CONSEQUENCE_COUNT,
                self.consequences.len()
            )));
        }
        if self.responses.len() != RESPONSE_COUNT {
            return Err(CacheError::Other(format!(
                "expected {} responses, got {}",
                RESPONSE_COUNT,
                self.responses.len()
            )));
        }
        if self
            .consequences
            .iter()
            .chain(self.responses.iter())
            .any(|l| l.trim().is_empty())
        {
            return Err(CacheError::Other("blank label in branch set".to_string()));
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three-valued verdict for a candidate after repeated trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    /// No trial arrived.
    Toxic,
    /// Every trial arrived.
    Safe,
    /// Trials split between arrival and loss.
    Maybe,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Toxic => "TOXIC",
            Classification::Safe => "SAFE",
            Classification::Maybe => "MAYBE",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TOXIC" => Ok(Classification::Toxic),
            "SAFE" => Ok(Classification::Safe),
            "MAYBE" => Ok(Classification::Maybe),
            other => Err(format!("unknown classification '{other}'")),
        }
    }
}

/// Aggregated outcome of `successes + failures` trials against one candidate.
///
/// Construct through [`ClassificationResult::from_counts`] so the
/// classification always agrees with the counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub successes: u32,
    pub failures: u32,
    pub classification: Classification,
}

impl ClassificationResult {
    pub fn from_counts(successes: u32, failures: u32) -> Self {
        let total = successes + failures;
        let classification = if successes == 0 {
            Classification::Toxic
        } else if successes == total {
            Classification::Safe
        } else {
            Classification::Maybe
        };
        Self {
            successes,
            failures,
            classification,
        }
    }

    /// Result standing in for `trials` probes answered by the safe cache.
    pub fn cached_safe(trials: u32) -> Self {
        Self::from_counts(trials, 0)
    }

    pub fn total(&self) -> u32 {
        self.successes + self.failures
    }

    /// Fraction of trials that arrived; 0.0 for an empty result.
    pub fn probability(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => f64::from(self.successes) / f64::from(total),
        }
    }

    pub fn is_toxic(&self) -> bool {
        self.classification == Classification::Toxic
    }

    pub fn is_safe(&self) -> bool {
        self.classification == Classification::Safe
    }

    pub fn is_maybe(&self) -> bool {
        self.classification == Classification::Maybe
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{})",
            self.classification,
            self.successes,
            self.total()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn classification_round_trips_through_text() {
        for c in [
            Classification::Toxic,
            Classification::Safe,
            Classification::Maybe,
        ] {
            assert_eq!(c.as_str().parse::<Classification>().unwrap(), c);
        }
        assert!("toxic".parse::<Classification>().is_err());
    }

    #[test]
    fn display_shows_counts() {
        let r = ClassificationResult::from_counts(2, 1);
        assert_eq!(r.to_string(), "MAYBE (2/3)");
        assert!((r.probability() - 2.0 / 3.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn counts_always_determine_classification(total in 1u32..64, raw in 0u32..64) {
            let successes = raw % (total + 1);
            let r = ClassificationResult::from_counts(successes, total - successes);
            prop_assert_eq!(r.total(), total);
            prop_assert_eq!(r.is_toxic(), successes == 0);
            prop_assert_eq!(r.is_safe(), successes == total);
            prop_assert_eq!(r.is_maybe(), successes > 0 && successes < total);
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

use super::SignificanceGate;

/// What to do with the treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    InsufficientData,
    Promote,
    Review,
    KeepControl,
}

impl Recommendation {
    /// First matching rule wins:
    /// not significant → insufficient data; better and cost increase below
    /// the review threshold → promote; better → review; otherwise keep
    /// control.
    pub fn decide(
        is_significant: bool,
        success_rate_delta: f64,
        cost_delta_pct: f64,
        gate: &SignificanceGate,
    ) -> Self {
        if !is_significant {
            Recommendation::InsufficientData
        } else if success_rate_delta > 0.0 && cost_delta_pct < gate.review_cost_increase_pct {
            Recommendation::Promote
        } else if success_rate_delta > 0.0 {
            Recommendation::Review
        } else {
            Recommendation::KeepControl
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Recommendation::InsufficientData => "INSUFFICIENT DATA: continue experiment.",
            Recommendation::Promote => "PROMOTE treatment.",
            Recommendation::Review => "REVIEW: treatment better but materially more expensive.",
            Recommendation::KeepControl => "KEEP CONTROL.",
        }
    }

    pub(crate) fn explain(
        &self,
        treatment: &str,
        smaller_arm: u64,
        success_rate_delta: f64,
        cost_delta_pct: f64,
        gate: &SignificanceGate,
    ) -> String {
        match self {
            Recommendation::InsufficientData if smaller_arm < gate.min_samples_per_arm => format!(
                "{} Smallest arm has {} requests; {} needed.",
                self.headline(),
                smaller_arm,
                gate.min_samples_per_arm
            ),
            Recommendation::InsufficientData => format!(
                "{} Success rate delta {:+.2}pp is within {:.2}pp.",
                self.headline(),
                success_rate_delta,
                gate.min_success_rate_delta_pp
            ),
            Recommendation::Promote => format!(
                "{} {} improves success rate by {:.2}pp at {:+.2}% cost.",
                self.headline(),
                treatment,
                success_rate_delta,
                cost_delta_pct
            ),
            Recommendation::Review => format!(
                "{} {} improves success rate by {:.2}pp but cost rises {:.2}%.",
                self.headline(),
                treatment,
                success_rate_delta,
                cost_delta_pct
            ),
            Recommendation::KeepControl => format!(
                "{} {} changes success rate by {:+.2}pp.",
                self.headline(),
                treatment,
                success_rate_delta
            ),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Recommendation::InsufficientData => "INSUFFICIENT DATA",
            Recommendation::Promote => "PROMOTE",
            Recommendation::Review => "REVIEW",
            Recommendation::KeepControl => "KEEP CONTROL",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let gate = SignificanceGate::default();
        assert_eq!(
            Recommendation::decide(false, 50.0, 0.0, &gate),
            Recommendation::InsufficientData
        );
        assert_eq!(
            Recommendation::decide(true, 6.0, 19.99, &gate),
            Recommendation::Promote
        );
        assert_eq!(
            Recommendation::decide(true, 6.0, 20.0, &gate),
            Recommendation::Review
        );
        assert_eq!(
            Recommendation::decide(true, -6.0, -50.0, &gate),
            Recommendation::KeepControl
        );
    }

    #[test]
    fn serializes_screaming_snake() {
        let json = serde_json::to_string(&Recommendation::KeepControl).unwrap();
        assert_eq!(json, "\"KEEP_CONTROL\"");
    }
}

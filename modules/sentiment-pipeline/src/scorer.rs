// Sentiment scoring: label derivation and boundary policy over an injected
// polarity oracle. The oracle owns the numbers; this module owns what they mean.

use std::sync::Arc;

use sentiment_common::{PolarityScores, Sentiment, SentimentLabel};
use thiserror::Error;

/// Compound scores at or above this are positive.
pub const POSITIVE_THRESHOLD: f64 = 0.05;
/// Compound scores at or below this are negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

const PROPORTION_EPSILON: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    /// The oracle refused this particular text. Skip the record, keep the run.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The oracle cannot score anything. Abort the run.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Capability: text in, four bounded polarity numbers out.
pub trait PolarityOracle: Send + Sync {
    fn name(&self) -> &str;

    fn polarity(&self, text: &str) -> Result<PolarityScores, OracleError>;

    /// Startup probe. Implementations backed by a remote service or a
    /// loaded model should report `Unavailable` here.
    fn check(&self) -> Result<(), OracleError> {
        Ok(())
    }
}

/// Map a compound score onto a label with the fixed thresholds.
pub fn label_for(compound: f64) -> SentimentLabel {
    if compound >= POSITIVE_THRESHOLD {
        SentimentLabel::Positive
    } else if compound <= NEGATIVE_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[derive(Clone)]
pub struct Scorer {
    oracle: Arc<dyn PolarityOracle>,
}

impl Scorer {
    pub fn new(oracle: Arc<dyn PolarityOracle>) -> Self {
        Self { oracle }
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub fn check(&self) -> Result<(), OracleError> {
        self.oracle.check()
    }

    /// Score already-normalized text.
    pub fn score(&self, clean_text: &str) -> Result<Sentiment, OracleError> {
        let raw = self.oracle.polarity(clean_text)?;
        bounded(raw)
    }
}

/// Enforce the record invariants regardless of what the oracle returned:
/// compound in [-1, 1], proportions non-negative and summing to 1.
fn bounded(raw: PolarityScores) -> Result<Sentiment, OracleError> {
    let values = [raw.compound, raw.pos, raw.neu, raw.neg];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(OracleError::Rejected(format!(
            "non-finite polarity scores: {raw:?}"
        )));
    }

    let compound = raw.compound.clamp(-1.0, 1.0);
    let pos = raw.pos.max(0.0);
    let neu = raw.neu.max(0.0);
    let neg = raw.neg.max(0.0);
    let total = pos + neu + neg;

    let (pos, neu, neg) = if total <= PROPORTION_EPSILON {
        // Nothing to score, e.g. empty text.
        (0.0, 1.0, 0.0)
    } else {
        (pos / total, neu / total, neg / total)
    };

    Ok(Sentiment {
        compound,
        pos,
        neu,
        neg,
        label: label_for(compound),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(PolarityScores);

    impl PolarityOracle for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn polarity(&self, _text: &str) -> Result<PolarityScores, OracleError> {
            Ok(self.0)
        }
    }

    fn scorer(compound: f64, pos: f64, neu: f64, neg: f64) -> Scorer {
        Scorer::new(Arc::new(Constant(PolarityScores {
            compound,
            pos,
            neu,
            neg,
        })))
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(label_for(0.05), SentimentLabel::Positive);
        assert_eq!(label_for(-0.05), SentimentLabel::Negative);
        assert_eq!(label_for(0.049_999), SentimentLabel::Neutral);
        assert_eq!(label_for(-0.049_999), SentimentLabel::Neutral);
        assert_eq!(label_for(0.0), SentimentLabel::Neutral);
        assert_eq!(label_for(1.0), SentimentLabel::Positive);
        assert_eq!(label_for(-1.0), SentimentLabel::Negative);
    }

    #[test]
    fn all_zero_proportions_become_neutral() {
        let s = scorer(0.0, 0.0, 0.0, 0.0).score("").unwrap();
        assert_eq!((s.pos, s.neu, s.neg), (0.0, 1.0, 0.0));
        assert_eq!(s.label, SentimentLabel::Neutral);
    }

    #[test]
    fn proportions_are_renormalized() {
        // Three-decimal rounding upstream can leave the sum at 0.999 or 1.001.
        let s = scorer(0.4, 0.334, 0.334, 0.334).score("x").unwrap();
        assert!((s.pos + s.neu + s.neg - 1.0).abs() < 1e-6);
    }

    #[test]
    fn compound_is_clamped() {
        let s = scorer(1.7, 1.0, 0.0, 0.0).score("x").unwrap();
        assert_eq!(s.compound, 1.0);
        assert_eq!(s.label, SentimentLabel::Positive);
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let result = scorer(f64::NAN, 0.2, 0.6, 0.2).score("x");
        assert!(matches!(result, Err(OracleError::Rejected(_))));
    }

    #[test]
    fn same_text_same_label() {
        let s = Scorer::new(Arc::new(crate::lexicon::LexiconOracle::new()));
        let a = s.score("not bad all").unwrap();
        let b = s.score("not bad all").unwrap();
        assert_eq!(a, b);
    }
}

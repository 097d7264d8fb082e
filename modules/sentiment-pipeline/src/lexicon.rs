//! Built-in rule-based polarity oracle.
//!
//! Scores normalized English text from a valence lexicon (roughly -4..4 per
//! word) with the usual adjustments for negation, intensifiers, contrastive
//! "but", and trailing `!`/`?` emphasis. The summed valence is squashed into
//! [-1, 1] with `x / sqrt(x^2 + 15)`, which is the scale the label
//! thresholds of the scorer were chosen for.

use std::collections::HashMap;
use std::sync::LazyLock;

use sentiment_common::PolarityScores;

use crate::scorer::{OracleError, PolarityOracle};

/// Longest input accepted. Reddit caps a self post at 40k characters plus a 300 character title.
pub const MAX_TEXT_CHARS: usize = 40_300;

const NORMALIZATION_ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
const EXCLAMATION_BOOST: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const QUESTION_BOOST: f64 = 0.18;
const MAX_QUESTION_BOOST: f64 = 0.96;

static VALENCE: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        // Strong positive
        ("love", 3.2), ("loved", 2.9), ("loves", 2.7), ("loving", 2.9),
        ("amazing", 2.8), ("awesome", 3.1), ("excellent", 2.7), ("fantastic", 2.6),
        ("wonderful", 2.7), ("brilliant", 2.8), ("perfect", 2.7), ("outstanding", 3.0),
        ("incredible", 2.2), ("superb", 3.1), ("best", 3.2), ("beautiful", 2.9),
        ("delighted", 2.9), ("thrilled", 2.4), ("masterpiece", 3.1), ("win", 2.8),
        // Moderate positive
        ("good", 1.9), ("great", 3.1), ("nice", 1.8), ("happy", 2.7), ("glad", 2.0),
        ("like", 1.5), ("liked", 1.8), ("likes", 1.8), ("enjoy", 2.2), ("enjoyed", 2.3),
        ("fun", 2.3), ("cool", 1.3), ("helpful", 1.8), ("useful", 1.9), ("impressive", 2.3),
        ("recommend", 1.5), ("recommended", 1.4), ("thanks", 1.9), ("thank", 1.5),
        ("interesting", 1.7), ("fine", 0.8), ("better", 1.9), ("improved", 2.1),
        ("solid", 0.9), ("clean", 1.7), ("easy", 1.9), ("fast", 0.7), ("safe", 1.9),
        ("hope", 1.9), ("hopeful", 2.3), ("excited", 1.4), ("exciting", 2.2),
        ("success", 2.7), ("successful", 2.8), ("works", 0.5), ("worth", 0.9),
        ("support", 1.7), ("agree", 1.5), ("yes", 1.7), ("wow", 2.8), ("lol", 1.8),
        ("congrats", 2.4), ("congratulations", 2.9), ("proud", 2.1), ("smart", 1.7),
        // Strong negative
        ("hate", -2.7), ("hated", -3.2), ("hates", -1.9), ("terrible", -2.1),
        ("horrible", -2.5), ("awful", -2.0), ("worst", -3.1), ("disgusting", -2.4),
        ("pathetic", -2.2), ("garbage", -2.1), ("trash", -1.8), ("disaster", -3.1),
        ("furious", -2.7), ("scam", -2.9), ("evil", -3.4), ("nightmare", -2.5),
        // Moderate negative
        ("bad", -2.5), ("worse", -2.1), ("useless", -1.8), ("broken", -1.8),
        ("sad", -2.1), ("angry", -2.3), ("annoying", -1.7), ("annoyed", -1.6),
        ("boring", -1.3), ("disappointed", -1.9), ("disappointing", -2.2),
        ("fail", -2.5), ("failed", -2.3), ("failure", -2.3), ("problem", -1.7),
        ("problems", -1.7), ("bug", -1.0), ("bugs", -0.9), ("slow", -0.6),
        ("wrong", -2.1), ("poor", -2.1), ("ugly", -2.3), ("stupid", -2.4),
        ("worried", -1.2), ("worry", -1.9), ("fear", -2.2), ("afraid", -2.2),
        ("confusing", -1.3), ("confused", -1.3), ("hard", -0.4), ("difficult", -0.6),
        ("expensive", -0.5), ("waste", -1.8), ("wasted", -2.2), ("crash", -1.7),
        ("lost", -1.3), ("lose", -1.7), ("pain", -2.3), ("sucks", -1.5), ("suck", -1.2),
        ("meh", -0.3), ("no", -1.2), ("unfortunately", -1.4), ("fake", -2.1),
        ("toxic", -2.5), ("overrated", -1.5), ("ridiculous", -1.5), ("regret", -1.8),
    ]
    .into_iter()
    .collect()
});

/// Words that scale the valence of the word after them.
static BOOSTERS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        ("absolutely", BOOSTER_INCREMENT), ("completely", BOOSTER_INCREMENT),
        ("extremely", BOOSTER_INCREMENT), ("incredibly", BOOSTER_INCREMENT),
        ("really", BOOSTER_INCREMENT), ("so", BOOSTER_INCREMENT),
        ("totally", BOOSTER_INCREMENT), ("very", BOOSTER_INCREMENT),
        ("super", BOOSTER_INCREMENT), ("most", BOOSTER_INCREMENT),
        ("more", BOOSTER_INCREMENT), ("too", BOOSTER_INCREMENT),
        ("barely", -BOOSTER_INCREMENT), ("hardly", -BOOSTER_INCREMENT),
        ("kinda", -BOOSTER_INCREMENT), ("slightly", -BOOSTER_INCREMENT),
        ("somewhat", -BOOSTER_INCREMENT), ("little", -BOOSTER_INCREMENT),
        ("less", -BOOSTER_INCREMENT), ("marginally", -BOOSTER_INCREMENT),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nobody", "nothing", "neither", "nor", "nowhere",
    "cannot", "without", "aint", "ain't",
];

fn is_negation(token: &str) -> bool {
    NEGATIONS.contains(&token) || token.ends_with("n't")
}

/// Lexicon scorer for English text. Stateless and cheap to share.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconOracle;

impl LexiconOracle {
    pub fn new() -> Self {
        Self
    }

    fn word_valences(tokens: &[&str]) -> Vec<f64> {
        let mut valences = Vec::with_capacity(tokens.len());

        for (i, token) in tokens.iter().enumerate() {
            let Some(&base) = VALENCE.get(token) else {
                valences.push(0.0);
                continue;
            };
            // "no" only carries valence on its own; "no problem" is a negation.
            if *token == "no" && tokens.get(i + 1).is_some_and(|next| VALENCE.contains_key(next)) {
                valences.push(0.0);
                continue;
            }

            let mut valence = base;
            for distance in 1..=3 {
                let Some(prev) = i.checked_sub(distance).map(|j| tokens[j]) else {
                    break;
                };
                if let Some(&boost) = BOOSTERS.get(prev) {
                    let decay = match distance {
                        1 => 1.0,
                        2 => 0.95,
                        _ => 0.9,
                    };
                    valence += boost * decay * valence.signum();
                }
                if is_negation(prev) {
                    valence *= NEGATION_SCALAR;
                }
            }
            valences.push(valence);
        }

        if let Some(but) = tokens.iter().position(|t| *t == "but") {
            for (i, v) in valences.iter_mut().enumerate() {
                if i < but {
                    *v *= 0.5;
                } else if i > but {
                    *v *= 1.5;
                }
            }
        }

        valences
    }

    fn punctuation_emphasis(tokens: &[&str]) -> f64 {
        let exclamations = tokens.iter().filter(|t| **t == "!").count().min(MAX_EXCLAMATIONS);
        let questions = tokens.iter().filter(|t| **t == "?").count();
        let question_boost = if questions > 1 {
            (questions as f64 * QUESTION_BOOST).min(MAX_QUESTION_BOOST)
        } else {
            0.0
        };
        exclamations as f64 * EXCLAMATION_BOOST + question_boost
    }
}

fn squash(score: f64) -> f64 {
    (score / (score * score + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

impl PolarityOracle for LexiconOracle {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn polarity(&self, text: &str) -> Result<PolarityScores, OracleError> {
        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(OracleError::Rejected(format!(
                "text longer than {MAX_TEXT_CHARS} characters"
            )));
        }
        if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return Err(OracleError::Rejected("text contains control characters".into()));
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let words: Vec<&str> = tokens.iter().copied().filter(|t| *t != "!" && *t != "?").collect();
        if words.is_empty() {
            return Ok(PolarityScores {
                compound: 0.0,
                pos: 0.0,
                neu: 0.0,
                neg: 0.0,
            });
        }

        let valences = Self::word_valences(&words);
        let sum: f64 = valences.iter().sum();
        let emphasis = Self::punctuation_emphasis(&tokens);

        let compound = if sum > 0.0 {
            squash(sum + emphasis)
        } else if sum < 0.0 {
            squash(sum - emphasis)
        } else {
            0.0
        };

        let mut pos_sum = 0.0;
        let mut neg_sum = 0.0;
        let mut neu_count = 0.0;
        for v in &valences {
            if *v > 0.0 {
                pos_sum += v + 1.0;
            } else if *v < 0.0 {
                neg_sum += v - 1.0;
            } else {
                neu_count += 1.0;
            }
        }
        if pos_sum > neg_sum.abs() {
            pos_sum += emphasis;
        } else if pos_sum < neg_sum.abs() {
            neg_sum -= emphasis;
        }

        let total = pos_sum + neg_sum.abs() + neu_count;
        Ok(PolarityScores {
            compound,
            pos: (pos_sum / total).abs(),
            neu: (neu_count / total).abs(),
            neg: (neg_sum / total).abs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(text: &str) -> PolarityScores {
        LexiconOracle::new().polarity(text).unwrap()
    }

    #[test]
    fn positive_text_scores_positive() {
        let s = score("love amazing !");
        assert!(s.compound > 0.5, "compound = {}", s.compound);
        assert!(s.pos > s.neg);
    }

    #[test]
    fn negative_text_scores_negative() {
        let s = score("terrible useless");
        assert!(s.compound < -0.5, "compound = {}", s.compound);
        assert!(s.neg > s.pos);
    }

    #[test]
    fn negation_flips_polarity() {
        assert!(score("good").compound > 0.0);
        assert!(score("not good").compound < 0.0);
        assert!(score("don't like").compound < 0.0);
    }

    #[test]
    fn boosters_amplify() {
        assert!(score("really good").compound > score("good").compound);
        assert!(score("slightly good").compound < score("good").compound);
    }

    #[test]
    fn exclamations_amplify_but_cap() {
        let plain = score("great").compound;
        let one = score("great !").compound;
        let four = score("great ! ! ! !").compound;
        let six = score("great ! ! ! ! ! !").compound;
        assert!(one > plain);
        assert!(four > one);
        assert_eq!(four, six);
    }

    #[test]
    fn but_shifts_weight_to_second_clause() {
        assert!(score("good but terrible").compound < 0.0);
        assert!(score("terrible but good").compound > 0.0);
    }

    #[test]
    fn proportions_sum_to_one_for_scored_text() {
        for text in ["love amazing !", "terrible useless", "table chair", "good bad meh ? ?"] {
            let s = score(text);
            assert!((s.pos + s.neu + s.neg - 1.0).abs() < 1e-9, "{text}: {s:?}");
        }
    }

    #[test]
    fn empty_text_is_all_zero() {
        let s = score("");
        assert_eq!((s.compound, s.pos, s.neu, s.neg), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn punctuation_only_is_all_zero() {
        let s = score("! ? !");
        assert_eq!(s.compound, 0.0);
    }

    #[test]
    fn rejects_oversized_and_control_text() {
        let oracle = LexiconOracle::new();
        let long = "word ".repeat(MAX_TEXT_CHARS);
        assert!(matches!(oracle.polarity(&long), Err(OracleError::Rejected(_))));
        assert!(matches!(oracle.polarity("bad\u{0}text"), Err(OracleError::Rejected(_))));
    }
}

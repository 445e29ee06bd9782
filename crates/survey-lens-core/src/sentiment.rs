//! Lexical polarity scoring.
//!
//! Each token found in [`POLARITY_LEXICON`] contributes its polarity. A
//! negator within the three preceding tokens flips and halves it; an
//! intensifier directly before it scales it. The comment's polarity is the
//! mean of the contributing tokens, clamped to `[-1, 1]`. Comments with no
//! lexicon hits score `0.0`.
//!
//! Scoring is a pure function of the text: no batch state is involved.

use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::normalize;
use crate::word_lists::{INTENSIFIERS, NEGATORS, POLARITY_LEXICON};

/// Default label threshold. Polarity strictly above `+threshold` is positive,
/// strictly below `-threshold` negative.
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// How far back a negator reaches.
const NEGATION_WINDOW: usize = 3;

/// Polarity multiplier applied under negation.
const NEGATION_FACTOR: f64 = -0.5;

/// Three-way sentiment label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    /// Polarity above the positive threshold.
    Positive,
    /// Polarity within the neutral band.
    Neutral,
    /// Polarity below the negative threshold.
    Negative,
}

impl SentimentLabel {
    /// All labels in report order.
    pub const ALL: [Self; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    /// Tie-break rank for dominant-sentiment selection; higher wins.
    ///
    /// Negative outranks Neutral, which outranks Positive, so ties surface
    /// concerns.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Negative => 2,
            Self::Neutral => 1,
            Self::Positive => 0,
        }
    }

    /// Returns the label as a lowercase string slice.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polarity and label for one comment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SentimentResult {
    /// Signed strength in `[-1, 1]`.
    pub polarity: f64,
    /// Label derived from `polarity` and the threshold.
    pub label: SentimentLabel,
}

/// Lexicon-based scorer with a configurable label threshold.
#[derive(Debug, Clone)]
pub struct SentimentScorer {
    threshold: f64,
    extra: HashMap<String, f64>,
}

impl Default for SentimentScorer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SentimentScorer {
    /// Create a scorer with the built-in lexicon.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            extra: HashMap::new(),
        }
    }

    /// Add or override lexicon entries. Keys are normalized and values
    /// clamped to `[-1, 1]`.
    pub fn with_lexicon<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        for (word, score) in entries {
            let key = normalize::strip_punctuation(&normalize::fold(word.as_ref()));
            if !key.is_empty() {
                self.extra.insert(key, score.clamp(-1.0, 1.0));
            }
        }
        self
    }

    /// The label threshold in use.
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Map a polarity to a label.
    pub fn label_for(&self, polarity: f64) -> SentimentLabel {
        if polarity > self.threshold {
            SentimentLabel::Positive
        } else if polarity < -self.threshold {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    fn word_score(&self, word: &str) -> Option<f64> {
        self.extra
            .get(word)
            .copied()
            .or_else(|| POLARITY_LEXICON.get(word).copied())
    }

    /// Polarity of a (normalized) comment.
    pub fn polarity(&self, normalized_text: &str) -> f64 {
        let stripped = normalize::strip_punctuation(normalized_text);
        let tokens: Vec<&str> = stripped.split(' ').filter(|t| !t.is_empty()).collect();

        let mut total = 0.0;
        let mut hits = 0usize;
        for (i, token) in tokens.iter().enumerate() {
            let Some(base) = self.word_score(token) else {
                continue;
            };
            let mut score = base;
            if i > 0
                && let Some(boost) = INTENSIFIERS.get(tokens[i - 1])
            {
                score *= boost;
            }
            let negated = (1..=NEGATION_WINDOW).any(|k| i >= k && NEGATORS.contains(tokens[i - k]));
            if negated {
                score *= NEGATION_FACTOR;
            }
            total += score.clamp(-1.0, 1.0);
            hits += 1;
        }

        if hits == 0 {
            0.0
        } else {
            (total / hits as f64).clamp(-1.0, 1.0)
        }
    }

    /// Score a (normalized) comment.
    pub fn score(&self, normalized_text: &str) -> SentimentResult {
        let polarity = self.polarity(normalized_text);
        SentimentResult {
            polarity,
            label: self.label_for(polarity),
        }
    }

    /// Score a batch in order.
    #[tracing::instrument(skip_all, fields(count = texts.len(), threshold = self.threshold))]
    pub fn score_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<SentimentResult> {
        texts.iter().map(|t| self.score(t.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::fold;

    fn label(text: &str) -> SentimentLabel {
        SentimentScorer::default().score(&fold(text)).label
    }

    #[test]
    fn survey_scenario_labels() {
        assert_eq!(label("Adoro trabalhar aqui"), SentimentLabel::Positive);
        assert_eq!(label("Odeio o ambiente"), SentimentLabel::Negative);
        assert_eq!(label("Local de trabalho é ok"), SentimentLabel::Neutral);
    }

    #[test]
    fn empty_input_is_neutral() {
        let result = SentimentScorer::default().score("");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert!(result.polarity.abs() < f64::EPSILON);
    }

    #[test]
    fn negation_flips_polarity() {
        let scorer = SentimentScorer::default();
        assert!(scorer.polarity("o ambiente e bom") > 0.0);
        assert!(scorer.polarity("o ambiente nao e bom") < 0.0);
    }

    #[test]
    fn intensifier_amplifies() {
        let scorer = SentimentScorer::default();
        assert!(scorer.polarity("muito bom") > scorer.polarity("bom"));
        assert!(scorer.polarity("extremamente otimo") <= 1.0);
    }

    #[test]
    fn scoring_is_pure() {
        let scorer = SentimentScorer::default();
        let a = scorer.score("gosto da equipe mas o salario e ruim");
        let _ = scorer.score_all(&["pessimo", "excelente", "ok"][..]);
        let b = scorer.score("gosto da equipe mas o salario e ruim");
        assert_eq!(a, b);
    }

    #[test]
    fn threshold_controls_band() {
        let loose = SentimentScorer::new(0.1);
        let strict = SentimentScorer::new(0.2);
        // "like" scores 0.2 on its own
        assert_eq!(loose.score("like").label, SentimentLabel::Positive);
        assert_eq!(strict.score("like").label, SentimentLabel::Neutral);
    }

    #[test]
    fn extra_lexicon_overrides_builtin() {
        let scorer = SentimentScorer::default().with_lexicon([("Home Office", 0.5), ("ok", 0.4)]);
        assert_eq!(scorer.score("ok").label, SentimentLabel::Positive);
        assert_eq!(
            SentimentScorer::default().score("ok").label,
            SentimentLabel::Neutral
        );
    }

    #[test]
    fn polarity_stays_in_range() {
        let scorer = SentimentScorer::default();
        for text in ["super excelente excelente", "extremamente pessimo", "nao nao nao ruim"] {
            let p = scorer.polarity(text);
            assert!((-1.0..=1.0).contains(&p), "{text}: {p}");
        }
    }

    #[test]
    fn precedence_prefers_negative() {
        assert!(SentimentLabel::Negative.precedence() > SentimentLabel::Neutral.precedence());
        assert!(SentimentLabel::Neutral.precedence() > SentimentLabel::Positive.precedence());
    }
}

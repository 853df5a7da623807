//! Scanner tuning and the reference-constant table.
//!
//! # Defaults
//!
//! | Setting | Default | Basis |
//! |---------|---------|-------|
//! | `tolerance` | `1e-4` | Relative; wide enough to catch values rounded to 5 digits |
//! | `shallow_depth` | `1` | A step consuming only axioms |
//! | `min_literal_digits` | `5` | Below this, literals are too common to mean anything |

use serde::{Deserialize, Serialize};

/// Relative tolerance for the numerical layer.
///
/// A derived value within `1e-4` of a reference is as close as a value copied
/// from a table and rounded to five significant digits.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Maximum depth at which an accepted node's match may be suppressed.
pub const DEFAULT_SHALLOW_DEPTH: usize = 1;

/// Minimum significant digits for a source literal to be compared.
pub const DEFAULT_MIN_LITERAL_DIGITS: usize = 5;

/// Phrases that indicate a value came from measurement.
pub const DEFAULT_LEXICAL_PHRASES: &[&str] = &[
    "measured value",
    "measured mass",
    "experimental value",
    "empirical value",
    "observed value",
    "fit to data",
    "fitted to",
    "best fit",
    "calibrated against",
    "calibrated to",
    "from experiment",
    "lab value",
    "codata",
    "pdg",
    "particle data group",
    "nist",
];

/// Regex fragments for circular justification. Matched case-insensitively.
pub const DEFAULT_REASONING_PATTERNS: &[&str] = &[
    r"\bto match\b",
    r"\badjusted (?:to|until|so)\b",
    r"\btuned (?:to|until|so)\b",
    r"\bchosen to (?:reproduce|match|agree)\b",
    r"\bfudge factor\b",
    r"\bin order to (?:reproduce|match|agree)\b",
    r"\bso that (?:it|this|the result) (?:agrees|matches)\b",
    r"\bagrees? with (?:experiment|observation|measurement)\b",
];

/// A measured constant the numerical layer compares derived values against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConstant {
    pub name: String,
    pub value: f64,
    /// One-sigma experimental uncertainty relative to `value`.
    pub relative_uncertainty: f64,
}

impl ReferenceConstant {
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, relative_uncertainty: f64) -> Self {
        Self {
            name: name.into(),
            value,
            relative_uncertainty,
        }
    }

    /// `|candidate - value| / |value|`, or the absolute deviation for a zero
    /// reference.
    #[must_use]
    pub fn relative_deviation(&self, candidate: f64) -> f64 {
        let diff = (candidate - self.value).abs();
        if self.value == 0.0 {
            diff
        } else {
            diff / self.value.abs()
        }
    }
}

/// CODATA 2018 / PDG values for the constants the operator claims to derive.
#[must_use]
pub fn default_references() -> Vec<ReferenceConstant> {
    vec![
        ReferenceConstant::new("inverse_fine_structure", 137.035_999_084, 1.5e-10),
        ReferenceConstant::new("fine_structure", 7.297_352_569_3e-3, 1.5e-10),
        ReferenceConstant::new("proton_electron_mass_ratio", 1_836.152_673_43, 6.0e-11),
        ReferenceConstant::new("muon_electron_mass_ratio", 206.768_283_0, 2.2e-8),
        ReferenceConstant::new("electron_mass_mev", 0.510_998_950_00, 3.0e-10),
        ReferenceConstant::new("weak_mixing_angle_sin2", 0.231_21, 1.7e-4),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub tolerance: f64,
    pub shallow_depth: usize,
    pub min_literal_digits: usize,
    pub lexical_phrases: Vec<String>,
    pub reasoning_patterns: Vec<String>,
    pub references: Vec<ReferenceConstant>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            shallow_depth: DEFAULT_SHALLOW_DEPTH,
            min_literal_digits: DEFAULT_MIN_LITERAL_DIGITS,
            lexical_phrases: DEFAULT_LEXICAL_PHRASES
                .iter()
                .map(ToString::to_string)
                .collect(),
            reasoning_patterns: DEFAULT_REASONING_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            references: default_references(),
        }
    }
}

impl ScanConfig {
    pub fn with_references(mut self, references: Vec<ReferenceConstant>) -> Self {
        self.references = references;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Add literal phrases to the lexical set.
    pub fn extend_lexical<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lexical_phrases
            .extend(phrases.into_iter().map(Into::into));
        self
    }

    /// Add literal phrases to the reasoning set. They are escaped and matched
    /// on word boundaries.
    pub fn extend_reasoning<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for phrase in phrases {
            let phrase: String = phrase.into();
            self.reasoning_patterns.push(word_bounded(&phrase));
        }
        self
    }
}

/// Escape `phrase` and anchor it on word boundaries where it starts or ends
/// with a word character.
fn word_bounded(phrase: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(phrase.chars().next()) { r"\b" } else { "" };
    let tail = if is_word(phrase.chars().last()) { r"\b" } else { "" };
    format!("{lead}{}{tail}", regex::escape(phrase))
}

#[cfg(test)]
mod tests {
    use super::{ReferenceConstant, ScanConfig};

    #[test]
    fn relative_deviation_handles_zero_reference() {
        let zero = ReferenceConstant::new("zero", 0.0, 0.0);
        assert_eq!(zero.relative_deviation(0.25), 0.25);

        let alpha = ReferenceConstant::new("alpha", 137.035_999_084, 1.5e-10);
        assert!(alpha.relative_deviation(137.036) < 1e-8);
    }

    #[test]
    fn extra_reasoning_phrases_are_escaped() {
        let config = ScanConfig::default().extend_reasoning(["set (by hand)"]);
        assert_eq!(
            config.reasoning_patterns.last().map(String::as_str),
            Some(r"\bset \(by hand\)")
        );
    }
}

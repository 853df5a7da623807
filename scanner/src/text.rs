//! Normalization and the two phrase matchers shared by tree and source scans.

use aho_corasick::AhoCorasick;
use regex::{Regex, RegexSet, RegexSetBuilder};
use unicode_normalization::UnicodeNormalization;

use crate::error::ScanError;

/// NFKC, then lowercase. Folds full-width digits, ligatures and compatibility
/// forms so "ＣＯＤＡＴＡ" and "CODATA" look the same.
pub(crate) fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Literal phrases matched with a single Aho-Corasick pass.
#[derive(Debug)]
pub(crate) struct PhraseMatcher {
    phrases: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl PhraseMatcher {
    pub(crate) fn new(phrases: &[String]) -> Result<Self, ScanError> {
        let mut phrases: Vec<String> = phrases
            .iter()
            .map(|p| normalize(p.trim()))
            .filter(|p| !p.is_empty())
            .collect();
        phrases.sort();
        phrases.dedup();

        let automaton = if phrases.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(&phrases)?)
        };
        Ok(Self { phrases, automaton })
    }

    /// Distinct phrases found in already-normalized `text`, in order of first
    /// occurrence. Matches inside a longer word are ignored; of overlapping
    /// whole-word matches the leftmost longest wins.
    pub(crate) fn find(&self, text: &str) -> Vec<&str> {
        let Some(automaton) = &self.automaton else {
            return Vec::new();
        };
        let mut matches: Vec<(usize, usize, usize)> = automaton
            .find_overlapping_iter(text)
            .filter(|m| on_word_boundary(text, m.start(), m.end()))
            .map(|m| (m.start(), m.end(), m.pattern().as_usize()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut found: Vec<&str> = Vec::new();
        let mut covered = 0;
        for (start, end, pattern) in matches {
            if start < covered {
                continue;
            }
            covered = end;
            let phrase = self.phrases[pattern].as_str();
            if !found.contains(&phrase) {
                found.push(phrase);
            }
        }
        found
    }
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// Case-insensitive regex bag for circular-justification language.
#[derive(Debug)]
pub(crate) struct ReasoningMatcher {
    set: RegexSet,
    patterns: Vec<Regex>,
}

impl ReasoningMatcher {
    pub(crate) fn new(patterns: &[String]) -> Result<Self, ScanError> {
        let set = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()?;
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { set, patterns })
    }

    /// Matched snippets in pattern order.
    pub(crate) fn find<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.set
            .matches(text)
            .iter()
            .filter_map(|index| self.patterns[index].find(text))
            .map(|m| m.as_str())
            .collect()
    }
}

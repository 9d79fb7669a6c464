//! Word-boundary phrase matching, shared with the verification checklists.

use once_cell::sync::Lazy;
use regex::Regex;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("valid word regex"));

/// Lowercased alphanumeric words of `text`.
pub fn words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Compiled phrase table.
pub struct PhraseSet {
    entries: Vec<(&'static str, Regex)>,
}

impl PhraseSet {
    /// Phrases must match as whole words.
    pub fn whole_words(phrases: &[&'static str]) -> Self {
        Self::compile(phrases, r"\b")
    }

    /// Phrases match at a word start, so `auth` matches `authentication`.
    pub fn prefixes(phrases: &[&'static str]) -> Self {
        Self::compile(phrases, "")
    }

    fn compile(phrases: &[&'static str], tail: &str) -> Self {
        let entries = phrases
            .iter()
            .filter_map(|phrase| {
                let pattern = format!(r"(?i)\b{}{tail}", regex::escape(phrase));
                Regex::new(&pattern).ok().map(|re| (*phrase, re))
            })
            .collect();
        Self { entries }
    }

    /// Phrases present in `text`, in table order.
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'static str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, re)| re.is_match(text))
            .map(|(phrase, _)| *phrase)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.entries.iter().any(|(_, re)| re.is_match(text))
    }
}

//! Question text normalization.

use kpi_core::text::fold;

/// A question split into folded tokens.
///
/// Each token remembers the word of the original text it came from, so that
/// answers can quote the user's own spelling.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuestion {
    pub raw: String,
    /// Lowercase, accent-free, punctuation-free tokens.
    pub tokens: Vec<String>,
    /// Whitespace-separated words of `raw`, outer punctuation trimmed.
    words: Vec<String>,
    /// Index into `words` for each token.
    word_of: Vec<usize>,
}

impl NormalizedQuestion {
    pub fn new(raw: &str) -> Self {
        let mut tokens = Vec::new();
        let mut words = Vec::new();
        let mut word_of = Vec::new();
        for word in raw.split_whitespace() {
            let folded = fold(word);
            if folded.is_empty() {
                continue;
            }
            for token in folded.split_whitespace() {
                tokens.push(token.to_string());
                word_of.push(words.len());
            }
            words.push(word.trim_matches(|c: char| !c.is_alphanumeric()).to_string());
        }
        Self {
            raw: raw.to_string(),
            tokens,
            words,
            word_of,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The source words, outer punctuation trimmed.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Tokens produced by source word `word`.
    pub fn token_range(&self, word: usize) -> std::ops::Range<usize> {
        let start = self.word_of.iter().position(|w| *w == word);
        let end = self.word_of.iter().rposition(|w| *w == word);
        match (start, end) {
            (Some(s), Some(e)) => s..e + 1,
            _ => 0..0,
        }
    }

    pub fn has(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn has_any(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|t| self.has(t))
    }

    /// Start index of every occurrence of `phrase` as consecutive tokens.
    pub fn find_phrase<S: AsRef<str>>(&self, phrase: &[S]) -> Vec<usize> {
        if phrase.is_empty() || phrase.len() > self.tokens.len() {
            return Vec::new();
        }
        self.tokens
            .windows(phrase.len())
            .enumerate()
            .filter(|(_, window)| window.iter().zip(phrase).all(|(t, p)| t == p.as_ref()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn contains_phrase<S: AsRef<str>>(&self, phrase: &[S]) -> bool {
        !self.find_phrase(phrase).is_empty()
    }

    /// Original words behind the tokens `start..end`.
    pub fn original(&self, start: usize, end: usize) -> String {
        let end = end.min(self.tokens.len());
        if start >= end {
            return String::new();
        }
        let (first, last) = (self.word_of[start], self.word_of[end - 1]);
        self.words[first..=last].join(" ")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Token and sentence quality filters

use crate::tree::{Sentence, Tag, Token};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Punctuation, symbols, control characters and whitespace, hyphen excepted
static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[[\p{P}\p{S}\p{Cc}\s]--[\-]]").expect("markup regex is invalid")
});

/// Lemmatizer failure on proper-noun compounds: "Baden-württemberg"
static CASE_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\p{Lu}[^-]*(?:-[^-]+)*-\p{Ll}+$").expect("case-error regex is invalid")
});

/// Whether a token may take part in a counted match
pub fn is_valid_token(token: &Token) -> bool {
    let surface = token.surface.as_str();
    let lemma = token.lemma.as_str();

    let mut chars = surface.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return false;
    };
    first.is_alphabetic()
        && last.is_alphabetic()
        && !lemma.chars().any(char::is_numeric)
        && !MARKUP.is_match(surface)
        && !MARKUP.is_match(lemma)
        && !CASE_ERROR.is_match(lemma)
}

/// Why a sentence was left out of the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("sentence length {0} out of bounds")]
    Length(usize),
    #[error("short sentence ends in a comma or colon")]
    TrailingPunctuation,
    #[error("no noun or verb")]
    NoContentWord,
    #[error("{0} tokens with unknown tags")]
    TooManyUnknown(usize),
}

/// Sentence-level eligibility for concordances and counting
#[derive(Debug, Clone)]
pub struct SentenceFilter {
    pub min_len: usize,
    pub max_len: usize,
    /// Catch-all tags that signal an annotation failure when frequent
    pub unknown_tags: Vec<Tag>,
}

impl Default for SentenceFilter {
    fn default() -> Self {
        Self {
            min_len: 3,
            max_len: 100,
            unknown_tags: vec![Tag::X, Tag::Sym],
        }
    }
}

impl SentenceFilter {
    pub fn check(&self, sentence: &Sentence) -> Result<(), Ineligible> {
        let len = sentence.len();
        if len < self.min_len || len > self.max_len {
            return Err(Ineligible::Length(len));
        }

        let last = &sentence.tokens()[len - 1];
        if len < 5 && matches!(last.surface.as_str(), "," | ":") {
            return Err(Ineligible::TrailingPunctuation);
        }

        if !sentence
            .tokens()
            .iter()
            .any(|t| matches!(t.tag, Tag::Noun | Tag::Verb | Tag::Aux))
        {
            return Err(Ineligible::NoContentWord);
        }

        let unknown = sentence
            .tokens()
            .iter()
            .filter(|t| self.unknown_tags.contains(&t.tag))
            .count();
        // fewer than min(10, len / 3) unknown tokens, in exact arithmetic
        if 3 * unknown >= len.min(30) {
            return Err(Ineligible::TooManyUnknown(unknown));
        }
        Ok(())
    }

    pub fn is_eligible(&self, sentence: &Sentence) -> bool {
        self.check(sentence).is_ok()
    }
}

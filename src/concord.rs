//! Concordance sentence encoding
//!
//! A stored sentence is the concatenation of its token surfaces, each
//! followed by [`SPACE`] when whitespace comes before the next token and by
//! [`NO_SPACE`] otherwise. Surfaces never contain either byte, so the
//! encoding is reversible.

use crate::tree::{Sentence, TokenIdx};
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::Hasher;
use std::sync::Mutex;

pub const SPACE: char = '\x01';
pub const NO_SPACE: char = '\x02';

pub const HIGHLIGHT_OPEN: &str = "_&";
pub const HIGHLIGHT_CLOSE: &str = "&_";

fn is_delimiter(c: char) -> bool {
    c == SPACE || c == NO_SPACE
}

/// Encode a sentence's surfaces and whitespace
pub fn encode(sentence: &Sentence) -> String {
    let mut out = String::new();
    for token in sentence.tokens() {
        // control bytes in the annotator's output would break decoding
        out.extend(token.surface.chars().filter(|c| !is_delimiter(*c)));
        out.push(if token.space_after { SPACE } else { NO_SPACE });
    }
    out
}

/// Token surfaces with their "space follows" flag
pub fn decode(encoded: &str) -> Vec<(&str, bool)> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in encoded.char_indices() {
        if is_delimiter(c) {
            out.push((&encoded[start..i], c == SPACE));
            start = i + c.len_utf8();
        }
    }
    if start < encoded.len() {
        out.push((&encoded[start..], true));
    }
    out
}

/// Plain text of an encoded sentence
pub fn reconstruct(encoded: &str) -> String {
    render(encoded, &[])
}

/// Plain text with the tokens at the given 1-based positions marked
pub fn highlight(encoded: &str, positions: &[TokenIdx]) -> String {
    render(encoded, positions)
}

fn render(encoded: &str, positions: &[TokenIdx]) -> String {
    let tokens = decode(encoded);
    let mut text = String::with_capacity(encoded.len() + 4 * positions.len());
    for (i, (surface, space_after)) in tokens.iter().enumerate() {
        let marked = positions.contains(&(i + 1));
        if marked {
            text.push_str(HIGHLIGHT_OPEN);
        }
        text.push_str(surface);
        if marked {
            text.push_str(HIGHLIGHT_CLOSE);
        }
        if *space_after && i + 1 < tokens.len() {
            text.push(' ');
        }
    }
    text
}

/// Corpus-wide record of which document each sentence text first appeared in
///
/// Texts are keyed by their 64-bit hash.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    first_seen: Mutex<FxHashMap<u64, usize>>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a text seen in `document`; false once the same text has
    /// already been seen in another document
    pub fn first_document(&self, document: usize, text: &str) -> bool {
        let mut hasher = FxHasher::default();
        hasher.write(text.as_bytes());
        let hash = hasher.finish();
        // a poisoned map is still a valid map
        let mut first_seen = match self.first_seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *first_seen.entry(hash).or_insert(document) == document
    }

    pub fn len(&self) -> usize {
        match self.first_seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Tag, Token};

    fn create_test_sentence() -> Sentence {
        Sentence::new(vec![
            Token::new(1, "„", "„", Tag::Punct, 2, "punct").without_space_after(),
            Token::new(2, "Halt", "halt", Tag::Intj, 0, "ROOT").without_space_after(),
            Token::new(3, "“", "“", Tag::Punct, 2, "punct"),
            Token::new(4, ",", ",", Tag::Punct, 2, "punct"),
            Token::new(5, "rief", "rufen", Tag::Verb, 2, "parataxis"),
            Token::new(6, "er", "er", Tag::Pron, 5, "nsubj").without_space_after(),
            Token::new(7, ".", ".", Tag::Punct, 2, "punct"),
        ])
        .unwrap()
    }

    #[test]
    fn test_encoding_preserves_tokens_and_spacing() {
        let sentence = create_test_sentence();
        let encoded = encode(&sentence);
        let decoded = decode(&encoded);

        assert_eq!(decoded.len(), sentence.len());
        for ((surface, space_after), token) in decoded.iter().zip(sentence.tokens()) {
            assert_eq!(*surface, token.surface);
            assert_eq!(*space_after, token.space_after);
        }
        assert_eq!(reconstruct(&encoded), sentence.text());
        assert_eq!(reconstruct(&encoded), "„Halt“ , rief er.");
    }

    #[test]
    fn test_highlight() {
        let encoded = encode(&create_test_sentence());
        assert_eq!(highlight(&encoded, &[2, 5]), "„_&Halt&_“ , _&rief&_ er.");
        assert_eq!(highlight(&encoded, &[]), reconstruct(&encoded));
    }

    #[test]
    fn test_decode_without_trailing_delimiter() {
        let decoded = decode("Er\x01kam\x02.");
        assert_eq!(decoded, vec![("Er", true), ("kam", false), (".", true)]);
        assert_eq!(reconstruct("Er\x01kam\x02."), "Er kam.");
    }

    #[test]
    fn test_duplicate_detector() {
        let detector = DuplicateDetector::new();
        assert!(detector.first_document(1, "Alle Rechte vorbehalten."));
        assert!(detector.first_document(1, "Eine neue Zeit begann."));
        assert!(!detector.first_document(2, "Alle Rechte vorbehalten."));
        assert_eq!(detector.len(), 2);
    }

    #[test]
    fn test_repeats_within_a_document_are_kept() {
        let detector = DuplicateDetector::new();
        assert!(detector.first_document(3, "Die rote Zeit"));
        assert!(detector.first_document(3, "Die rote Zeit"));
        assert!(!detector.first_document(4, "Die rote Zeit"));
        // the first document keeps its claim after another has been rejected
        assert!(detector.first_document(3, "Die rote Zeit"));
    }
}

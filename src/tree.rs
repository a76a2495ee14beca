//! Token and dependency tree data structures
//!
//! A sentence is an arena of tokens addressed by their 1-based CoNLL-U
//! position. Parent links are the `head` indices; the children of every
//! node are precomputed once when the sentence is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 1-based token position within a sentence; 0 denotes the artificial root
pub type TokenIdx = usize;

/// Coarse (universal) part-of-speech tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "ADJ")]
    Adj,
    #[serde(rename = "ADP")]
    Adp,
    #[serde(rename = "ADV")]
    Adv,
    #[serde(rename = "AUX")]
    Aux,
    #[serde(rename = "CCONJ")]
    Cconj,
    #[serde(rename = "DET")]
    Det,
    #[serde(rename = "INTJ")]
    Intj,
    #[serde(rename = "NOUN")]
    Noun,
    #[serde(rename = "NUM")]
    Num,
    #[serde(rename = "PART")]
    Part,
    #[serde(rename = "PRON")]
    Pron,
    #[serde(rename = "PROPN")]
    Propn,
    #[serde(rename = "PUNCT")]
    Punct,
    #[serde(rename = "SCONJ")]
    Sconj,
    #[serde(rename = "SYM")]
    Sym,
    #[serde(rename = "VERB")]
    Verb,
    #[serde(rename = "X")]
    X,
}

impl Tag {
    pub const ALL: [Tag; 17] = [
        Tag::Adj,
        Tag::Adp,
        Tag::Adv,
        Tag::Aux,
        Tag::Cconj,
        Tag::Det,
        Tag::Intj,
        Tag::Noun,
        Tag::Num,
        Tag::Part,
        Tag::Pron,
        Tag::Propn,
        Tag::Punct,
        Tag::Sconj,
        Tag::Sym,
        Tag::Verb,
        Tag::X,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Adj => "ADJ",
            Tag::Adp => "ADP",
            Tag::Adv => "ADV",
            Tag::Aux => "AUX",
            Tag::Cconj => "CCONJ",
            Tag::Det => "DET",
            Tag::Intj => "INTJ",
            Tag::Noun => "NOUN",
            Tag::Num => "NUM",
            Tag::Part => "PART",
            Tag::Pron => "PRON",
            Tag::Propn => "PROPN",
            Tag::Punct => "PUNCT",
            Tag::Sconj => "SCONJ",
            Tag::Sym => "SYM",
            Tag::Verb => "VERB",
            Tag::X => "X",
        }
    }

    /// Map an annotator tag onto the closed set; anything unknown becomes `X`
    pub fn from_annotation(s: &str) -> Tag {
        s.parse().unwrap_or(Tag::X)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown part-of-speech tag: {0}")]
pub struct UnknownTag(pub String);

impl FromStr for Tag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Morphological features (FEATS column), kept sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features(Vec<(String, String)>);

impl Features {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(pos) => self.0[pos].1 = value,
            Err(pos) => self.0.insert(pos, (key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|pos| self.0[pos].1.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a feature carries the given value; multi-valued
    /// features (`Case=Dat,Gen`) match on any member
    pub fn has(&self, key: &str, value: &str) -> bool {
        self.get(key)
            .is_some_and(|v| v.split(',').any(|part| part == value))
    }
}

/// A single annotated token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub index: TokenIdx,
    pub surface: String,
    pub lemma: String,
    pub tag: Tag,
    pub head: TokenIdx,
    pub deprel: String,
    pub space_after: bool,
    /// Position of a separable-verb particle collapsed into `lemma`
    pub particle: Option<TokenIdx>,
    pub feats: Features,
}

impl Token {
    pub fn new(
        index: TokenIdx,
        surface: &str,
        lemma: &str,
        tag: Tag,
        head: TokenIdx,
        deprel: &str,
    ) -> Self {
        Self {
            index,
            surface: surface.to_string(),
            lemma: lemma.to_string(),
            tag,
            head,
            deprel: deprel.to_string(),
            space_after: true,
            particle: None,
            feats: Features::new(),
        }
    }

    pub fn with_feature(mut self, key: &str, value: &str) -> Self {
        self.feats.insert(key, value);
        self
    }

    pub fn without_space_after(mut self) -> Self {
        self.space_after = false;
        self
    }
}

/// Structural defect in a sentence's head graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("empty sentence")]
    Empty,
    #[error("token {found} found at position {expected}")]
    Misnumbered { expected: TokenIdx, found: TokenIdx },
    #[error("token {token} has out-of-range head {head}")]
    HeadOutOfRange { token: TokenIdx, head: TokenIdx },
    #[error("token {0} is its own head")]
    SelfLoop(TokenIdx),
    #[error("expected exactly one root, found {0}")]
    RootCount(usize),
    #[error("cycle through token {0}")]
    Cycle(TokenIdx),
}

/// A dependency-parsed sentence
#[derive(Debug, Clone)]
pub struct Sentence {
    tokens: Vec<Token>,
    /// children[i] lists the dependents of token i (children[0] = root)
    children: Vec<Vec<TokenIdx>>,
}

impl Sentence {
    /// Build a sentence, validating that the head graph is a single rooted tree
    pub fn new(tokens: Vec<Token>) -> Result<Self, TreeError> {
        if tokens.is_empty() {
            return Err(TreeError::Empty);
        }
        let n = tokens.len();
        let mut children = vec![Vec::new(); n + 1];

        for (pos, token) in tokens.iter().enumerate() {
            if token.index != pos + 1 {
                return Err(TreeError::Misnumbered {
                    expected: pos + 1,
                    found: token.index,
                });
            }
            if token.head > n {
                return Err(TreeError::HeadOutOfRange {
                    token: token.index,
                    head: token.head,
                });
            }
            if token.head == token.index {
                return Err(TreeError::SelfLoop(token.index));
            }
            children[token.head].push(token.index);
        }

        if children[0].len() != 1 {
            return Err(TreeError::RootCount(children[0].len()));
        }

        // With one root and n-1 other edges, the graph is a tree iff every
        // token reaches the root in at most n steps
        for token in &tokens {
            let mut current = token.head;
            let mut steps = 0;
            while current != 0 {
                steps += 1;
                if steps > n {
                    return Err(TreeError::Cycle(token.index));
                }
                current = tokens[current - 1].head;
            }
        }

        Ok(Self { tokens, children })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Token at 1-based position `idx`
    pub fn get(&self, idx: TokenIdx) -> Option<&Token> {
        idx.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    pub(crate) fn get_mut(&mut self, idx: TokenIdx) -> Option<&mut Token> {
        idx.checked_sub(1).and_then(|i| self.tokens.get_mut(i))
    }

    pub fn root(&self) -> &Token {
        &self.tokens[self.children[0][0] - 1]
    }

    /// Head of a token, or None for the root
    pub fn head_of(&self, token: &Token) -> Option<&Token> {
        self.get(token.head)
    }

    /// Dependents of a token in surface order
    pub fn children<'a>(&'a self, token: &Token) -> impl Iterator<Item = &'a Token> + use<'a> {
        let ids = self
            .children
            .get(token.index)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        ids.iter().map(move |&id| &self.tokens[id - 1])
    }

    /// Dependents attached with the given relation label
    pub fn children_with<'a>(
        &'a self,
        token: &Token,
        deprel: &'a str,
    ) -> impl Iterator<Item = &'a Token> + use<'a> {
        self.children(token).filter(move |c| c.deprel == deprel)
    }

    pub fn has_child_with(&self, token: &Token, deprel: &str) -> bool {
        self.children_with(token, deprel).next().is_some()
    }

    /// Plain text of the sentence with annotator whitespace restored
    pub fn text(&self) -> String {
        let mut text = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 && self.tokens[i - 1].space_after {
                text.push(' ');
            }
            text.push_str(&token.surface);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Eine neue Zeit begann.
    fn create_test_sentence() -> Sentence {
        Sentence::new(vec![
            Token::new(1, "Eine", "eine", Tag::Det, 3, "det"),
            Token::new(2, "neue", "neu", Tag::Adj, 3, "amod"),
            Token::new(3, "Zeit", "Zeit", Tag::Noun, 4, "nsubj"),
            Token::new(4, "begann", "beginnen", Tag::Verb, 0, "ROOT").without_space_after(),
            Token::new(5, ".", ".", Tag::Punct, 4, "punct"),
        ])
        .unwrap()
    }

    #[test]
    fn test_sentence_navigation() {
        let sentence = create_test_sentence();

        assert_eq!(sentence.len(), 5);
        assert_eq!(sentence.root().lemma, "beginnen");

        let zeit = sentence.get(3).unwrap();
        assert_eq!(sentence.head_of(zeit).unwrap().index, 4);

        let children: Vec<_> = sentence.children(zeit).map(|t| t.index).collect();
        assert_eq!(children, vec![1, 2]);
        assert!(sentence.has_child_with(zeit, "amod"));
        assert!(!sentence.has_child_with(zeit, "case"));
        assert!(sentence.head_of(sentence.root()).is_none());
    }

    #[test]
    fn test_sentence_text() {
        let sentence = create_test_sentence();
        assert_eq!(sentence.text(), "Eine neue Zeit begann.");
    }

    #[test]
    fn test_rejects_malformed_heads() {
        let self_loop = vec![
            Token::new(1, "a", "a", Tag::Noun, 1, "nsubj"),
            Token::new(2, "b", "b", Tag::Verb, 0, "root"),
        ];
        assert_eq!(Sentence::new(self_loop).unwrap_err(), TreeError::SelfLoop(1));

        let out_of_range = vec![
            Token::new(1, "a", "a", Tag::Noun, 7, "nsubj"),
            Token::new(2, "b", "b", Tag::Verb, 0, "root"),
        ];
        assert!(matches!(
            Sentence::new(out_of_range),
            Err(TreeError::HeadOutOfRange { token: 1, head: 7 })
        ));

        let two_roots = vec![
            Token::new(1, "a", "a", Tag::Noun, 0, "root"),
            Token::new(2, "b", "b", Tag::Verb, 0, "root"),
        ];
        assert_eq!(Sentence::new(two_roots).unwrap_err(), TreeError::RootCount(2));

        let cycle = vec![
            Token::new(1, "a", "a", Tag::Noun, 2, "nsubj"),
            Token::new(2, "b", "b", Tag::Verb, 1, "obj"),
            Token::new(3, "c", "c", Tag::Verb, 0, "root"),
        ];
        assert!(matches!(Sentence::new(cycle), Err(TreeError::Cycle(_))));

        assert_eq!(Sentence::new(Vec::new()).unwrap_err(), TreeError::Empty);
    }

    #[test]
    fn test_features() {
        let mut feats = Features::new();
        feats.insert("Number", "Sing");
        feats.insert("Case", "Dat,Gen");
        assert_eq!(feats.get("Number"), Some("Sing"));
        assert!(feats.has("Case", "Gen"));
        assert!(!feats.has("Case", "Nom"));
        assert!(!feats.has("Gender", "Fem"));
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!("NOUN".parse::<Tag>().unwrap(), Tag::Noun);
        assert!("FOO".parse::<Tag>().is_err());
        assert_eq!(Tag::from_annotation("FOO"), Tag::X);
        assert_eq!(Tag::Cconj.to_string(), "CCONJ");
    }
}

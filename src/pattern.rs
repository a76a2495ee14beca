//! Relation pattern tables
//!
//! Binary patterns map a token's dependency label and the (head, token)
//! tag pair onto a relation. Ternary patterns map the (token, head) label
//! pair and the (grandhead, head, token) tag triple onto a relation; the
//! token itself becomes the mediating preposition or conjunction.
//!
//! Tables are plain immutable data, built once and shared by reference.

use crate::relation::Relation;
use crate::tree::Tag;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct BinaryPatterns {
    by_deprel: FxHashMap<String, FxHashMap<(Tag, Tag), Relation>>,
}

impl BinaryPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deprel: &str, head: Tag, dependent: Tag, relation: Relation) {
        self.by_deprel
            .entry(deprel.to_string())
            .or_default()
            .insert((head, dependent), relation);
    }

    /// Whether any pattern is keyed by this label
    pub fn has_deprel(&self, deprel: &str) -> bool {
        self.by_deprel.contains_key(deprel)
    }

    pub fn lookup(&self, deprel: &str, head: Tag, dependent: Tag) -> Option<Relation> {
        self.by_deprel.get(deprel)?.get(&(head, dependent)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_deprel.values().map(FxHashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All (head, dependent) tag pairs that yield `relation`
    pub fn tag_pairs(&self, relation: Relation) -> Vec<(Tag, Tag)> {
        let mut pairs: Vec<_> = self
            .by_deprel
            .values()
            .flat_map(|m| m.iter())
            .filter(|(_, r)| **r == relation)
            .map(|(pair, _)| *pair)
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

type TagTriples = FxHashMap<(Tag, Tag, Tag), Relation>;

#[derive(Debug, Clone, Default)]
pub struct TernaryPatterns {
    /// outer (token) label -> inner (head) label -> tag triple
    by_outer: FxHashMap<String, FxHashMap<String, TagTriples>>,
}

impl TernaryPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        outer: &str,
        inner: &str,
        tags: (Tag, Tag, Tag),
        relation: Relation,
    ) {
        self.by_outer
            .entry(outer.to_string())
            .or_default()
            .entry(inner.to_string())
            .or_default()
            .insert(tags, relation);
    }

    /// `outer` is the token's label, `inner` its head's label
    pub fn lookup(&self, outer: &str, inner: &str, tags: (Tag, Tag, Tag)) -> Option<Relation> {
        self.by_outer.get(outer)?.get(inner)?.get(&tags).copied()
    }

    fn triples(&self) -> impl Iterator<Item = (&(Tag, Tag, Tag), &Relation)> {
        self.by_outer
            .values()
            .flat_map(|inner| inner.values())
            .flat_map(|m| m.iter())
    }

    pub fn len(&self) -> usize {
        self.triples().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All (grandhead, head) tag pairs that yield `relation`
    pub fn tag_pairs(&self, relation: Relation) -> Vec<(Tag, Tag)> {
        let mut pairs: Vec<_> = self
            .triples()
            .filter(|(_, r)| **r == relation)
            .map(|((grandhead, head, _), _)| (*grandhead, *head))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

/// The complete set of table-driven patterns
#[derive(Debug, Clone, Default)]
pub struct PatternTables {
    pub binary: BinaryPatterns,
    pub ternary: TernaryPatterns,
}

impl PatternTables {
    pub fn new(binary: BinaryPatterns, ternary: TernaryPatterns) -> Self {
        Self { binary, ternary }
    }

    /// Tag pairs any table emits for `relation`
    pub fn tag_pairs(&self, relation: Relation) -> Vec<(Tag, Tag)> {
        let mut pairs = self.binary.tag_pairs(relation);
        pairs.extend(self.ternary.tag_pairs(relation));
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_lookup() {
        let mut binary = BinaryPatterns::new();
        binary.insert("amod", Tag::Noun, Tag::Adj, Relation::Attr);
        binary.insert("advmod", Tag::Verb, Tag::Adv, Relation::Adv);
        binary.insert("advmod", Tag::Adj, Tag::Adv, Relation::Adv);

        assert_eq!(binary.lookup("amod", Tag::Noun, Tag::Adj), Some(Relation::Attr));
        assert_eq!(binary.lookup("amod", Tag::Verb, Tag::Adj), None);
        assert_eq!(binary.lookup("obj", Tag::Verb, Tag::Noun), None);
        assert!(binary.has_deprel("advmod"));
        assert_eq!(binary.len(), 3);
        assert_eq!(
            binary.tag_pairs(Relation::Adv),
            vec![(Tag::Adj, Tag::Adv), (Tag::Verb, Tag::Adv)]
        );
    }

    #[test]
    fn test_ternary_lookup() {
        let mut ternary = TernaryPatterns::new();
        ternary.insert("case", "obl", (Tag::Verb, Tag::Noun, Tag::Adp), Relation::Pp);

        assert_eq!(
            ternary.lookup("case", "obl", (Tag::Verb, Tag::Noun, Tag::Adp)),
            Some(Relation::Pp)
        );
        assert_eq!(ternary.lookup("obl", "case", (Tag::Verb, Tag::Noun, Tag::Adp)), None);
        assert_eq!(ternary.tag_pairs(Relation::Pp), vec![(Tag::Verb, Tag::Noun)]);
    }
}

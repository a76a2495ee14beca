//! Collocation extraction
//!
//! Turns one dependency-parsed sentence into relation instances. Most
//! relations come from the pattern tables; predicatives, genitive
//! attributes, comparative groups and active subjects need small tree
//! walks of their own. Separable verb particles are folded into their
//! verb's lemma beforehand with [`collapse_phrasal_verbs`].

use crate::pattern::PatternTables;
use crate::relation::Relation;
use crate::tree::{Sentence, Tag, Token, TokenIdx};
use rustc_hash::FxHashSet;

const COPULA_LEMMA: &str = "sein";

/// Particles never folded into the verb ("recht" is mostly the adjective)
const UNCOLLAPSED_PARTICLES: &[&str] = &["recht"];

/// Markers introducing an object predicative ("bezeichnen als", "halten für")
const OBJECT_PREDICATIVE_MARKERS: &[&str] = &["als", "für"];

/// Comparative markers; `wie` only compares adjectives ("so groß wie")
const COMPARATIVE_MARKERS: &[(&str, bool)] = &[("als", false), ("wie", true)];

/// One relation instance within a sentence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'s> {
    pub head: &'s Token,
    pub dependent: &'s Token,
    pub prep: Option<&'s Token>,
    pub relation: Relation,
}

impl<'s> Match<'s> {
    fn new(head: &'s Token, dependent: &'s Token, relation: Relation) -> Self {
        Self {
            head,
            dependent,
            prep: None,
            relation,
        }
    }

    fn with_prep(mut self, prep: &'s Token) -> Self {
        self.prep = Some(prep);
        self
    }

    /// Identity of a match within its sentence
    pub fn key(&self) -> (TokenIdx, TokenIdx, Relation) {
        (self.head.index, self.dependent.index, self.relation)
    }
}

/// Fold separable verb particles into the lemma of their verb
///
/// "fängt ... an" becomes lemma "anfangen" with the particle position
/// recorded on the verb. A verb takes at most one particle, so running this
/// again leaves the sentence unchanged. Returns the number of verbs changed.
pub fn collapse_phrasal_verbs(sentence: &mut Sentence) -> usize {
    let mut updates: Vec<(TokenIdx, TokenIdx, String)> = Vec::new();

    for token in sentence.tokens() {
        if token.deprel != "compound:prt" || !matches!(token.tag, Tag::Adp | Tag::Adj | Tag::Adv) {
            continue;
        }
        let particle = token.surface.to_lowercase();
        if UNCOLLAPSED_PARTICLES.contains(&particle.as_str()) {
            continue;
        }
        let Some(verb) = sentence.head_of(token) else {
            continue;
        };
        if !matches!(verb.tag, Tag::Verb | Tag::Aux)
            || verb.lemma == COPULA_LEMMA
            || verb.particle.is_some()
            || updates.iter().any(|(v, _, _)| *v == verb.index)
        {
            continue;
        }
        updates.push((verb.index, token.index, particle));
    }

    for (verb, particle_idx, particle) in &updates {
        if let Some(verb) = sentence.get_mut(*verb) {
            verb.lemma = format!("{particle}{}", verb.lemma);
            verb.particle = Some(*particle_idx);
        }
    }
    updates.len()
}

/// Pattern matcher over single sentences
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'t> {
    tables: &'t PatternTables,
}

impl<'t> Extractor<'t> {
    pub fn new(tables: &'t PatternTables) -> Self {
        Self { tables }
    }

    /// Lazily yield every relation instance in the sentence
    ///
    /// Different extractors can find the same instance; use
    /// [`Extractor::unique_matches`] for the deduplicated set.
    pub fn matches<'a>(&'a self, sentence: &'a Sentence) -> impl Iterator<Item = Match<'a>> + 'a {
        let tables = self.tables;
        let binary = sentence.tokens().iter().filter_map(move |token| {
            let head = sentence.head_of(token)?;
            let relation = tables.binary.lookup(&token.deprel, head.tag, token.tag)?;
            Some(Match::new(head, token, relation))
        });

        let ternary = sentence.tokens().iter().filter_map(move |token| {
            let head = sentence.head_of(token)?;
            let grandhead = sentence.head_of(head)?;
            let relation = tables.ternary.lookup(
                &token.deprel,
                &head.deprel,
                (grandhead.tag, head.tag, token.tag),
            )?;
            Some(Match::new(grandhead, head, relation).with_prep(token))
        });

        let structural = sentence
            .tokens()
            .iter()
            .flat_map(move |token| structural_matches(sentence, token));

        binary.chain(ternary).chain(structural)
    }

    /// The set of matches keyed by (head, dependent, relation), first one wins
    pub fn unique_matches<'a>(&'a self, sentence: &'a Sentence) -> Vec<Match<'a>> {
        let mut seen = FxHashSet::default();
        self.matches(sentence)
            .filter(|m| seen.insert(m.key()))
            .collect()
    }
}

fn structural_matches<'a>(sentence: &'a Sentence, token: &'a Token) -> Vec<Match<'a>> {
    let mut out = Vec::new();
    subject_predicatives(sentence, token, &mut out);
    object_predicatives(sentence, token, &mut out);
    genitive_attributes(sentence, token, &mut out);
    comparative_groups(sentence, token, &mut out);
    active_subjects(sentence, token, &mut out);
    out
}

/// Universal part of a label ("obl:arg" -> "obl")
fn base_deprel(deprel: &str) -> &str {
    deprel.split(':').next().unwrap_or(deprel)
}

fn is_predicate_tag(tag: Tag) -> bool {
    matches!(tag, Tag::Noun | Tag::Verb | Tag::Adj)
}

/// "Der Himmel ist blau": PRED(blau, Himmel)
fn subject_predicatives<'a>(sentence: &'a Sentence, token: &'a Token, out: &mut Vec<Match<'a>>) {
    if !is_predicate_tag(token.tag)
        || !sentence.has_child_with(token, "cop")
        || sentence.has_child_with(token, "case")
    {
        return;
    }
    for subject in sentence.children_with(token, "nsubj") {
        if subject.tag == Tag::Noun {
            out.push(Match::new(token, subject, Relation::Pred));
        }
    }
}

/// "bezeichnet ihn als Lügner": PRED(bezeichnen, Lügner, als)
fn object_predicatives<'a>(sentence: &'a Sentence, token: &'a Token, out: &mut Vec<Match<'a>>) {
    if token.tag != Tag::Verb {
        return;
    }
    for child in sentence.children(token) {
        if !matches!(base_deprel(&child.deprel), "obj" | "obl")
            || !matches!(child.tag, Tag::Verb | Tag::Adj | Tag::Noun)
        {
            continue;
        }
        let marker = sentence.children(child).find(|m| {
            OBJECT_PREDICATIVE_MARKERS
                .iter()
                .any(|w| m.surface.eq_ignore_ascii_case(w))
        });
        if let Some(marker) = marker {
            out.push(Match::new(token, child, Relation::Pred).with_prep(marker));
        }
    }
}

/// "das Haus des Vaters": GMOD(Haus, Vater)
///
/// A case-marking child means the attachment is prepositional.
fn genitive_attributes<'a>(sentence: &'a Sentence, token: &'a Token, out: &mut Vec<Match<'a>>) {
    if token.tag != Tag::Noun {
        return;
    }
    for child in sentence.children_with(token, "nmod") {
        if child.tag == Tag::Noun
            && child.feats.has("Case", "Gen")
            && sentence
                .children(child)
                .any(|g| g.feats.has("Case", "Gen"))
            && !sentence.has_child_with(child, "case")
        {
            out.push(Match::new(token, child, Relation::Gmod));
        }
    }
}

/// "schneller als der Wind": KOM(schnell, Wind, als)
fn comparative_groups<'a>(sentence: &'a Sentence, token: &'a Token, out: &mut Vec<Match<'a>>) {
    if token.tag != Tag::Cconj || token.deprel != "case" {
        return;
    }
    let Some(&(_, adjective_only)) = COMPARATIVE_MARKERS
        .iter()
        .find(|(w, _)| token.surface.eq_ignore_ascii_case(w))
    else {
        return;
    };
    let Some(compared) = sentence.head_of(token) else {
        return;
    };
    let Some(top) = sentence.head_of(compared) else {
        return;
    };
    if compared.tag != Tag::Noun || !matches!(top.tag, Tag::Verb | Tag::Adj | Tag::Noun) {
        return;
    }
    if adjective_only && top.tag != Tag::Adj {
        return;
    }
    // verb + obj/obl + "als" is an object predicative
    if top.tag == Tag::Verb && matches!(base_deprel(&compared.deprel), "obj" | "obl") {
        return;
    }
    out.push(Match::new(top, compared, Relation::Kom).with_prep(token));
}

/// "Eine neue Zeit begann": SUBJA(beginnen, Zeit)
fn active_subjects<'a>(sentence: &'a Sentence, token: &'a Token, out: &mut Vec<Match<'a>>) {
    if !is_predicate_tag(token.tag) || sentence.has_child_with(token, "cop") {
        return;
    }
    for subject in sentence.children_with(token, "nsubj") {
        if subject.tag == Tag::Noun {
            out.push(Match::new(token, subject, Relation::Subja));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::default_tables;

    fn extract(sentence: &Sentence) -> Vec<(Relation, String, String, Option<String>)> {
        let tables = default_tables().unwrap();
        let extractor = Extractor::new(&tables);
        let mut out: Vec<_> = extractor
            .unique_matches(sentence)
            .into_iter()
            .map(|m| {
                (
                    m.relation,
                    m.head.lemma.clone(),
                    m.dependent.lemma.clone(),
                    m.prep.map(|p| p.lemma.clone()),
                )
            })
            .collect();
        out.sort();
        out
    }

    fn found(
        matches: &[(Relation, String, String, Option<String>)],
        relation: Relation,
        head: &str,
        dependent: &str,
    ) -> bool {
        matches
            .iter()
            .any(|(r, h, d, _)| *r == relation && h == head && d == dependent)
    }

    /// Eine neue Zeit begann.
    fn new_era() -> Sentence {
        Sentence::new(vec![
            Token::new(1, "Eine", "eine", Tag::Det, 3, "det"),
            Token::new(2, "neue", "neu", Tag::Adj, 3, "amod"),
            Token::new(3, "Zeit", "Zeit", Tag::Noun, 4, "nsubj"),
            Token::new(4, "begann", "beginnen", Tag::Verb, 0, "ROOT").without_space_after(),
            Token::new(5, ".", ".", Tag::Punct, 4, "punct"),
        ])
        .unwrap()
    }

    /// Er fängt morgen an.
    fn phrasal() -> Sentence {
        Sentence::new(vec![
            Token::new(1, "Er", "er", Tag::Pron, 2, "nsubj"),
            Token::new(2, "fängt", "fangen", Tag::Verb, 0, "ROOT"),
            Token::new(3, "morgen", "morgen", Tag::Adv, 2, "advmod"),
            Token::new(4, "an", "an", Tag::Adp, 2, "compound:prt"),
        ])
        .unwrap()
    }

    #[test]
    fn test_attribute_and_active_subject() {
        let matches = extract(&new_era());
        assert!(found(&matches, Relation::Attr, "Zeit", "neu"));
        assert!(found(&matches, Relation::Subja, "beginnen", "Zeit"));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_collapse_phrasal_verbs() {
        let mut sentence = phrasal();
        assert_eq!(collapse_phrasal_verbs(&mut sentence), 1);
        let verb = sentence.get(2).unwrap();
        assert_eq!(verb.lemma, "anfangen");
        assert_eq!(verb.particle, Some(4));

        let matches = extract(&sentence);
        assert!(found(&matches, Relation::Vz, "anfangen", "an"));
        assert!(found(&matches, Relation::Adv, "anfangen", "morgen"));
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let mut once = phrasal();
        collapse_phrasal_verbs(&mut once);
        let mut twice = once.clone();
        assert_eq!(collapse_phrasal_verbs(&mut twice), 0);
        assert_eq!(once.tokens(), twice.tokens());
    }

    #[test]
    fn test_collapse_exclusions() {
        // Er gibt ihm recht.
        let mut recht = Sentence::new(vec![
            Token::new(1, "Er", "er", Tag::Pron, 2, "nsubj"),
            Token::new(2, "gibt", "geben", Tag::Verb, 0, "ROOT"),
            Token::new(3, "ihm", "er", Tag::Pron, 2, "iobj"),
            Token::new(4, "recht", "recht", Tag::Adj, 2, "compound:prt"),
        ])
        .unwrap();
        assert_eq!(collapse_phrasal_verbs(&mut recht), 0);
        assert_eq!(recht.get(2).unwrap().lemma, "geben");

        // Er ist dabei: copula heads never absorb a particle
        let mut copula = Sentence::new(vec![
            Token::new(1, "Er", "er", Tag::Pron, 2, "nsubj"),
            Token::new(2, "ist", "sein", Tag::Aux, 0, "ROOT"),
            Token::new(3, "dabei", "dabei", Tag::Adv, 2, "compound:prt"),
        ])
        .unwrap();
        assert_eq!(collapse_phrasal_verbs(&mut copula), 0);
        assert_eq!(copula.get(2).unwrap().lemma, "sein");
    }

    #[test]
    fn test_subject_predicative() {
        // Der Himmel ist blau.
        let sentence = Sentence::new(vec![
            Token::new(1, "Der", "der", Tag::Det, 2, "det"),
            Token::new(2, "Himmel", "Himmel", Tag::Noun, 4, "nsubj"),
            Token::new(3, "ist", "sein", Tag::Aux, 4, "cop"),
            Token::new(4, "blau", "blau", Tag::Adj, 0, "ROOT"),
        ])
        .unwrap();
        let matches = extract(&sentence);
        assert!(found(&matches, Relation::Pred, "blau", "Himmel"));
        // copula clauses have no active subject
        assert!(!found(&matches, Relation::Subja, "blau", "Himmel"));
    }

    #[test]
    fn test_object_predicative() {
        // Er bezeichnet ihn als Lügner.
        let sentence = Sentence::new(vec![
            Token::new(1, "Er", "er", Tag::Pron, 2, "nsubj"),
            Token::new(2, "bezeichnet", "bezeichnen", Tag::Verb, 0, "ROOT"),
            Token::new(3, "ihn", "er", Tag::Pron, 2, "obj"),
            Token::new(4, "als", "als", Tag::Cconj, 5, "case"),
            Token::new(5, "Lügner", "Lügner", Tag::Noun, 2, "obl"),
        ])
        .unwrap();
        let matches = extract(&sentence);
        assert!(matches.contains(&(
            Relation::Pred,
            "bezeichnen".to_string(),
            "Lügner".to_string(),
            Some("als".to_string())
        )));
        assert!(!matches.iter().any(|(r, ..)| *r == Relation::Kom));
    }

    #[test]
    fn test_genitive_attribute() {
        // das Haus des Vaters
        let genitive = Sentence::new(vec![
            Token::new(1, "das", "der", Tag::Det, 2, "det"),
            Token::new(2, "Haus", "Haus", Tag::Noun, 0, "ROOT"),
            Token::new(3, "des", "der", Tag::Det, 4, "det").with_feature("Case", "Gen"),
            Token::new(4, "Vaters", "Vater", Tag::Noun, 2, "nmod").with_feature("Case", "Gen"),
        ])
        .unwrap();
        assert!(found(&extract(&genitive), Relation::Gmod, "Haus", "Vater"));

        // das Haus von Vaters Freund: prepositional, not genitive
        let prepositional = Sentence::new(vec![
            Token::new(1, "das", "der", Tag::Det, 2, "det"),
            Token::new(2, "Haus", "Haus", Tag::Noun, 0, "ROOT"),
            Token::new(3, "von", "von", Tag::Adp, 5, "case"),
            Token::new(4, "Vaters", "Vater", Tag::Propn, 5, "nmod").with_feature("Case", "Gen"),
            Token::new(5, "Freund", "Freund", Tag::Noun, 2, "nmod").with_feature("Case", "Gen"),
        ])
        .unwrap();
        let matches = extract(&prepositional);
        assert!(!matches.iter().any(|(r, ..)| *r == Relation::Gmod));
        assert!(found(&matches, Relation::Pp, "Haus", "Freund"));
    }

    #[test]
    fn test_comparative_groups() {
        // schneller als der Wind
        let als = Sentence::new(vec![
            Token::new(1, "schneller", "schnell", Tag::Adj, 0, "ROOT"),
            Token::new(2, "als", "als", Tag::Cconj, 4, "case"),
            Token::new(3, "der", "der", Tag::Det, 4, "det"),
            Token::new(4, "Wind", "Wind", Tag::Noun, 1, "obl"),
        ])
        .unwrap();
        let matches = extract(&als);
        assert!(matches.contains(&(
            Relation::Kom,
            "schnell".to_string(),
            "Wind".to_string(),
            Some("als".to_string())
        )));

        // "wie" needs an adjective on top: läuft wie der Wind
        let wie = Sentence::new(vec![
            Token::new(1, "läuft", "laufen", Tag::Verb, 0, "ROOT"),
            Token::new(2, "wie", "wie", Tag::Cconj, 4, "case"),
            Token::new(3, "der", "der", Tag::Det, 4, "det"),
            Token::new(4, "Wind", "Wind", Tag::Noun, 1, "advcl"),
        ])
        .unwrap();
        assert!(!extract(&wie).iter().any(|(r, ..)| *r == Relation::Kom));
    }

    #[test]
    fn test_prepositions_and_coordination() {
        // Er fährt mit dem Auto und dem Rad.
        let sentence = Sentence::new(vec![
            Token::new(1, "Er", "er", Tag::Pron, 2, "nsubj"),
            Token::new(2, "fährt", "fahren", Tag::Verb, 0, "ROOT"),
            Token::new(3, "mit", "mit", Tag::Adp, 5, "case"),
            Token::new(4, "dem", "der", Tag::Det, 5, "det"),
            Token::new(5, "Auto", "Auto", Tag::Noun, 2, "obl"),
            Token::new(6, "und", "und", Tag::Cconj, 8, "cc"),
            Token::new(7, "dem", "der", Tag::Det, 8, "det"),
            Token::new(8, "Rad", "Rad", Tag::Noun, 5, "conj"),
        ])
        .unwrap();
        let matches = extract(&sentence);
        assert!(matches.contains(&(
            Relation::Pp,
            "fahren".to_string(),
            "Auto".to_string(),
            Some("mit".to_string())
        )));
        assert!(matches.contains(&(
            Relation::Kon,
            "Auto".to_string(),
            "Rad".to_string(),
            Some("und".to_string())
        )));
    }

    #[test]
    fn test_table_matches_use_table_tag_pairs() {
        let tables = default_tables().unwrap();
        let extractor = Extractor::new(&tables);
        let mut sentences = vec![new_era(), phrasal()];
        for sentence in &mut sentences {
            collapse_phrasal_verbs(sentence);
        }
        for sentence in &sentences {
            for m in extractor.matches(sentence) {
                let table_driven = matches!(
                    m.relation,
                    Relation::Attr | Relation::Adv | Relation::Obj | Relation::Vz | Relation::Pp
                );
                if table_driven {
                    assert!(
                        tables
                            .tag_pairs(m.relation)
                            .contains(&(m.head.tag, m.dependent.tag)),
                        "{:?} emitted for an untabled tag pair",
                        m.relation
                    );
                }
            }
        }
    }

    #[test]
    fn test_root_tokens_take_no_ternary_match() {
        // a lone case-marked root has no head to mediate
        let sentence = Sentence::new(vec![
            Token::new(1, "mit", "mit", Tag::Adp, 2, "case"),
            Token::new(2, "Auto", "Auto", Tag::Noun, 0, "ROOT"),
        ])
        .unwrap();
        assert!(extract(&sentence).is_empty());
    }
}

//! Streaming collocation reducer
//!
//! The reducer sees every match of the corpus exactly once, in any order.
//! It assigns collocation ids in first-seen order, counts frequencies and
//! per-relation marginals, chains matches of one sentence into MWEs, and
//! streams the raw match rows to disk. Frequency floors can only be applied
//! once the whole corpus has been seen, so [`Aggregator::finish`] returns the
//! surviving ids and the raw rows are filtered afterwards with
//! [`retain_rows`].

use crate::bytes::{bs_atoi, bs_split_once, bs_trim_newline};
use crate::extract::Match;
use crate::relation::Relation;
use crate::tree::{Tag, Token, TokenIdx};
use lasso::{Rodeo, Spur};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{self, BufRead, Write};

/// Offset of the log-dice scale; the maximum attainable score
const LOG_DICE_OFFSET: f64 = 14.0;

/// log-dice association of a pair seen `joint` times
pub fn log_dice(joint: u64, marginal1: u64, marginal2: u64) -> f64 {
    LOG_DICE_OFFSET + (2.0 * joint as f64 / (marginal1 + marginal2) as f64).log2()
}

/// A match detached from its sentence, in canonical orientation
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub relation: Relation,
    pub lemma1: String,
    pub tag1: Tag,
    pub lemma2: String,
    pub tag2: Tag,
    pub prep: Option<String>,
    pub pos1: TokenIdx,
    pub pos2: TokenIdx,
    pub prep_pos: Option<TokenIdx>,
}

impl RawMatch {
    /// Symmetric relations are ordered by (lemma, tag) so both word orders
    /// reduce to one collocation
    pub fn from_match(m: &Match<'_>) -> Self {
        let (first, second) = if m.relation.is_symmetric()
            && (m.dependent.lemma.as_str(), m.dependent.tag) < (m.head.lemma.as_str(), m.head.tag)
        {
            (m.dependent, m.head)
        } else {
            (m.head, m.dependent)
        };
        Self {
            relation: m.relation,
            lemma1: first.lemma.clone(),
            tag1: first.tag,
            lemma2: second.lemma.clone(),
            tag2: second.tag,
            prep: m.prep.map(prep_lemma),
            pos1: first.index,
            pos2: second.index,
            prep_pos: m.prep.map(|p| p.index),
        }
    }
}

fn prep_lemma(token: &Token) -> String {
    token.lemma.to_lowercase()
}

/// The counted matches of one sentence
#[derive(Debug, Clone, Default)]
pub struct SentenceMatches {
    pub corpus_file_id: usize,
    pub sentence_id: usize,
    pub matches: Vec<RawMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CollocationKey {
    relation: Relation,
    lemma1: Spur,
    tag1: Tag,
    lemma2: Spur,
    tag2: Tag,
    prep: Option<Spur>,
}

type Marginal = (Relation, Spur, Tag);

/// Matches of the current sentence, for MWE chaining
struct Counted {
    match_id: u64,
    collocation: usize,
    pos1: TokenIdx,
    pos2: TokenIdx,
}

pub struct Aggregator<W: Write> {
    strings: Rodeo,
    index: FxHashMap<CollocationKey, usize>,
    collocations: Vec<(CollocationKey, u64)>,
    left: FxHashMap<Marginal, u64>,
    right: FxHashMap<Marginal, u64>,
    mwe_index: FxHashMap<(usize, usize), usize>,
    mwes: Vec<((usize, usize), u64)>,
    matches_out: W,
    mwe_matches_out: W,
    next_match_id: u64,
}

impl<W: Write> Aggregator<W> {
    /// Raw match rows go to `matches_out`, raw MWE witness rows to
    /// `mwe_matches_out`
    pub fn new(matches_out: W, mwe_matches_out: W) -> Self {
        Self {
            strings: Rodeo::default(),
            index: FxHashMap::default(),
            collocations: Vec::new(),
            left: FxHashMap::default(),
            right: FxHashMap::default(),
            mwe_index: FxHashMap::default(),
            mwes: Vec::new(),
            matches_out,
            mwe_matches_out,
            next_match_id: 1,
        }
    }

    fn intern(&mut self, m: &RawMatch) -> CollocationKey {
        CollocationKey {
            relation: m.relation,
            lemma1: self.strings.get_or_intern(&m.lemma1),
            tag1: m.tag1,
            lemma2: self.strings.get_or_intern(&m.lemma2),
            tag2: m.tag2,
            prep: m.prep.as_deref().map(|p| self.strings.get_or_intern(p)),
        }
    }

    fn count(&mut self, key: CollocationKey) -> usize {
        let next = self.collocations.len();
        let idx = *self.index.entry(key).or_insert(next);
        if idx == next {
            self.collocations.push((key, 0));
        }
        self.collocations[idx].1 += 1;

        let first = (key.relation, key.lemma1, key.tag1);
        let second = (key.relation, key.lemma2, key.tag2);
        if key.relation.is_symmetric() {
            *self.left.entry(first).or_default() += 1;
            *self.left.entry(second).or_default() += 1;
        } else {
            *self.left.entry(first).or_default() += 1;
            *self.right.entry(second).or_default() += 1;
        }
        idx
    }

    fn count_mwe(&mut self, pair: (usize, usize)) -> usize {
        let next = self.mwes.len();
        let idx = *self.mwe_index.entry(pair).or_insert(next);
        if idx == next {
            self.mwes.push((pair, 0));
        }
        self.mwes[idx].1 += 1;
        idx
    }

    /// Count one sentence's matches and write their raw rows
    pub fn add_sentence(&mut self, sentence: &SentenceMatches) -> io::Result<()> {
        let mut counted = Vec::with_capacity(sentence.matches.len());
        for m in &sentence.matches {
            let key = self.intern(m);
            let collocation = self.count(key);
            let match_id = self.next_match_id;
            self.next_match_id += 1;
            writeln!(
                self.matches_out,
                "{match_id}\t{}\t{}\t{}\t{}\t{}\t{}",
                collocation + 1,
                sentence.corpus_file_id,
                sentence.sentence_id,
                m.pos1,
                m.pos2,
                m.prep_pos.unwrap_or(0),
            )?;
            counted.push(Counted {
                match_id,
                collocation,
                pos1: m.pos1,
                pos2: m.pos2,
            });
        }

        for outer in &counted {
            for inner in &counted {
                if outer.pos2 != inner.pos1 || outer.collocation == inner.collocation {
                    continue;
                }
                let mwe = self.count_mwe((outer.collocation, inner.collocation));
                writeln!(
                    self.mwe_matches_out,
                    "{}\t{}\t{}",
                    mwe + 1,
                    outer.match_id,
                    inner.match_id
                )?;
            }
        }
        Ok(())
    }

    fn marginals(&self, key: &CollocationKey) -> (u64, u64) {
        let first = (key.relation, key.lemma1, key.tag1);
        let second = (key.relation, key.lemma2, key.tag2);
        let right = if key.relation.is_symmetric() {
            &self.left
        } else {
            &self.right
        };
        (
            self.left.get(&first).copied().unwrap_or(0),
            right.get(&second).copied().unwrap_or(0),
        )
    }

    /// Score everything, apply the floors and release the raw-row writers
    pub fn finish(mut self, min_rel_freq: u64, min_mwe_freq: u64) -> io::Result<(Aggregate, W, W)> {
        self.matches_out.flush()?;
        self.mwe_matches_out.flush()?;

        let mut collocations = Vec::new();
        let mut kept = vec![false; self.collocations.len()];
        for (idx, (key, frequency)) in self.collocations.iter().enumerate() {
            if *frequency < min_rel_freq {
                continue;
            }
            kept[idx] = true;
            let (m1, m2) = self.marginals(key);
            let resolve = |s: &Spur| self.strings.resolve(s).to_string();
            collocations.push(Collocation {
                id: idx as i64 + 1,
                relation: key.relation,
                lemma1: resolve(&key.lemma1),
                tag1: key.tag1,
                lemma2: resolve(&key.lemma2),
                tag2: key.tag2,
                prep: key.prep.as_ref().map(resolve),
                frequency: *frequency,
                score: log_dice(*frequency, m1, m2),
            });
        }

        let mut mwes = Vec::new();
        for (idx, ((c1, c2), frequency)) in self.mwes.iter().enumerate() {
            if *frequency < min_mwe_freq || !kept[*c1] || !kept[*c2] {
                continue;
            }
            let f1 = self.collocations[*c1].1;
            let f2 = self.collocations[*c2].1;
            mwes.push(Mwe {
                id: idx as i64 + 1,
                collocation1: *c1 as i64 + 1,
                collocation2: *c2 as i64 + 1,
                relation: self.collocations[*c2].0.relation,
                frequency: *frequency,
                score: log_dice(*frequency, f1, f2),
            });
        }

        debug!(
            "aggregated {} collocations ({} kept), {} mwes ({} kept), {} matches",
            self.collocations.len(),
            collocations.len(),
            self.mwes.len(),
            mwes.len(),
            self.next_match_id - 1
        );

        let aggregate = Aggregate { collocations, mwes };
        Ok((aggregate, self.matches_out, self.mwe_matches_out))
    }
}

/// A scored collocation in canonical orientation
#[derive(Debug, Clone, PartialEq)]
pub struct Collocation {
    pub id: i64,
    pub relation: Relation,
    pub lemma1: String,
    pub tag1: Tag,
    pub lemma2: String,
    pub tag2: Tag,
    pub prep: Option<String>,
    pub frequency: u64,
    pub score: f64,
}

impl Collocation {
    /// Write the canonical row and its inverse view
    ///
    /// Columns: id, relation, lemma1, tag1, lemma2, tag2, prep, inv,
    /// frequency, score.
    pub fn write_rows<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let prep = self.prep.as_deref().unwrap_or("");
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{prep}\t0\t{}\t{}",
            self.id, self.relation, self.lemma1, self.tag1, self.lemma2, self.tag2, self.frequency,
            self.score
        )?;
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{prep}\t1\t{}\t{}",
            -self.id, self.relation, self.lemma2, self.tag2, self.lemma1, self.tag1, self.frequency,
            self.score
        )
    }
}

/// A chain of two collocations through a shared token
#[derive(Debug, Clone, PartialEq)]
pub struct Mwe {
    pub id: i64,
    pub collocation1: i64,
    pub collocation2: i64,
    /// Relation of the second component
    pub relation: Relation,
    pub frequency: u64,
    pub score: f64,
}

impl Mwe {
    /// Columns: id, collocation1_id, collocation2_id, relation, frequency, score
    pub fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.id, self.collocation1, self.collocation2, self.relation, self.frequency, self.score
        )
    }
}

/// Everything that survived the frequency floors
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub collocations: Vec<Collocation>,
    pub mwes: Vec<Mwe>,
}

impl Aggregate {
    pub fn collocation_ids(&self) -> FxHashSet<usize> {
        self.collocations.iter().map(|c| c.id as usize).collect()
    }

    pub fn mwe_ids(&self) -> FxHashSet<usize> {
        self.mwes.iter().map(|m| m.id as usize).collect()
    }
}

/// Copy the lines whose `column`-th field is an id in `keep`
///
/// Returns the number of lines kept.
pub fn retain_rows<R: BufRead, W: Write>(
    mut input: R,
    output: &mut W,
    column: usize,
    keep: &FxHashSet<usize>,
) -> io::Result<usize> {
    let mut line = Vec::new();
    let mut kept = 0;
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let mut rest = bs_trim_newline(&line);
        for _ in 0..column {
            rest = match bs_split_once(rest, b'\t') {
                Some((_, tail)) => tail,
                None => &[],
            };
        }
        let field = bs_split_once(rest, b'\t').map_or(rest, |(f, _)| f);
        if bs_atoi(field).is_some_and(|id| keep.contains(&id)) {
            output.write_all(&line)?;
            kept += 1;
        }
    }
    Ok(kept)
}

/// Per (lemma, tag) occurrence counts with surface-form tallies
#[derive(Debug, Clone, Default)]
pub struct TokenFrequencies {
    counts: FxHashMap<(String, Tag), (u64, FxHashMap<String, u64>)>,
}

impl TokenFrequencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: &Token) {
        let (total, surfaces) = self
            .counts
            .entry((token.lemma.clone(), token.tag))
            .or_default();
        *total += 1;
        *surfaces.entry(token.surface.clone()).or_default() += 1;
    }

    /// Fold in the counts of another worker
    pub fn merge(&mut self, other: TokenFrequencies) {
        for (key, (total, surfaces)) in other.counts {
            let (mine, my_surfaces) = self.counts.entry(key).or_default();
            *mine += total;
            for (surface, n) in surfaces {
                *my_surfaces.entry(surface).or_default() += n;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn frequency(&self, lemma: &str, tag: Tag) -> u64 {
        self.counts
            .get(&(lemma.to_string(), tag))
            .map_or(0, |(total, _)| *total)
    }

    /// Rows of (lemma, tag, most frequent surface, frequency), sorted by
    /// lemma and tag; surface ties go to the smaller string
    pub fn rows(&self) -> Vec<(&str, Tag, &str, u64)> {
        let mut rows: Vec<_> = self
            .counts
            .iter()
            .map(|((lemma, tag), (total, surfaces))| {
                let surface = surfaces
                    .iter()
                    .max_by(|(a, na), (b, nb)| na.cmp(nb).then_with(|| b.cmp(a)))
                    .map_or(lemma.as_str(), |(s, _)| s.as_str());
                (lemma.as_str(), *tag, surface, *total)
            })
            .collect();
        rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        rows
    }

    /// Columns: lemma, tag, surface, frequency
    pub fn write_rows<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (lemma, tag, surface, frequency) in self.rows() {
            writeln!(out, "{lemma}\t{tag}\t{surface}\t{frequency}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(relation: Relation, lemma1: &str, lemma2: &str, pos1: usize, pos2: usize) -> RawMatch {
        RawMatch {
            relation,
            lemma1: lemma1.to_string(),
            tag1: Tag::Noun,
            lemma2: lemma2.to_string(),
            tag2: Tag::Adj,
            prep: None,
            pos1,
            pos2,
            prep_pos: None,
        }
    }

    fn sentence(id: usize, matches: Vec<RawMatch>) -> SentenceMatches {
        SentenceMatches {
            corpus_file_id: 1,
            sentence_id: id,
            matches,
        }
    }

    fn aggregate(sentences: &[SentenceMatches], min_rel: u64, min_mwe: u64) -> (Aggregate, String, String) {
        let mut agg = Aggregator::new(Vec::new(), Vec::new());
        for s in sentences {
            agg.add_sentence(s).unwrap();
        }
        let (result, matches, mwe_matches) = agg.finish(min_rel, min_mwe).unwrap();
        (
            result,
            String::from_utf8(matches).unwrap(),
            String::from_utf8(mwe_matches).unwrap(),
        )
    }

    #[test]
    fn test_log_dice_scores() {
        let sentences = vec![
            sentence(0, vec![raw(Relation::Attr, "car", "red", 2, 1)]),
            sentence(1, vec![raw(Relation::Attr, "car", "red", 2, 1)]),
            sentence(2, vec![raw(Relation::Attr, "car", "blue", 2, 1)]),
        ];
        let (result, matches, _) = aggregate(&sentences, 1, 1);

        assert_eq!(result.collocations.len(), 2);
        let red = &result.collocations[0];
        assert_eq!((red.lemma2.as_str(), red.frequency), ("red", 2));
        // freq(car, *) = 3, freq(*, red) = 2
        assert!((red.score - (14.0 + (4.0f64 / 5.0).log2())).abs() < 1e-9);
        let blue = &result.collocations[1];
        assert_eq!((blue.lemma2.as_str(), blue.frequency), ("blue", 1));
        assert!((blue.score - 13.0).abs() < 1e-9);

        assert_eq!(matches.lines().count(), 3);
        assert_eq!(matches.lines().next(), Some("1\t1\t1\t0\t2\t1\t0"));
    }

    #[test]
    fn test_marginals_are_per_relation() {
        let sentences = vec![sentence(
            0,
            vec![
                raw(Relation::Attr, "car", "red", 2, 1),
                raw(Relation::Pred, "car", "red", 2, 4),
            ],
        )];
        let (result, ..) = aggregate(&sentences, 1, 1);
        assert_eq!(result.collocations.len(), 2);
        for c in &result.collocations {
            assert!((c.score - 14.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_frequency_floor() {
        let sentences = vec![
            sentence(0, vec![raw(Relation::Attr, "car", "red", 2, 1)]),
            sentence(1, vec![raw(Relation::Attr, "car", "red", 2, 1)]),
            sentence(2, vec![raw(Relation::Attr, "car", "blue", 2, 1)]),
        ];
        let (result, matches, _) = aggregate(&sentences, 2, 1);
        assert_eq!(result.collocations.len(), 1);
        assert_eq!(result.collocations[0].lemma2, "red");
        // the dropped collocation still counts towards the marginals
        assert!((result.collocations[0].score - (14.0 + (4.0f64 / 5.0).log2())).abs() < 1e-9);

        let mut filtered = Vec::new();
        let kept = retain_rows(matches.as_bytes(), &mut filtered, 1, &result.collocation_ids()).unwrap();
        assert_eq!(kept, 2);
        assert!(String::from_utf8(filtered).unwrap().lines().all(|l| l.split('\t').nth(1) == Some("1")));
    }

    #[test]
    fn test_symmetric_relations_share_a_row() {
        let forward = RawMatch::from_match(&Match {
            head: &Token::new(1, "Hund", "Hund", Tag::Noun, 0, "ROOT"),
            dependent: &Token::new(3, "Katze", "Katze", Tag::Noun, 1, "conj"),
            prep: None,
            relation: Relation::Kon,
        });
        let backward = RawMatch::from_match(&Match {
            head: &Token::new(1, "Katze", "Katze", Tag::Noun, 0, "ROOT"),
            dependent: &Token::new(3, "Hund", "Hund", Tag::Noun, 1, "conj"),
            prep: None,
            relation: Relation::Kon,
        });
        assert_eq!((forward.lemma1.as_str(), forward.pos1), ("Hund", 1));
        assert_eq!((backward.lemma1.as_str(), backward.pos1), ("Hund", 3));

        let (result, ..) = aggregate(&[sentence(0, vec![forward]), sentence(1, vec![backward])], 1, 1);
        assert_eq!(result.collocations.len(), 1);
        assert_eq!(result.collocations[0].frequency, 2);
        // both lemmas occur twice on either side: 2 * 2 / (2 + 2)
        assert!((result.collocations[0].score - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_rows() {
        let c = Collocation {
            id: 7,
            relation: Relation::Pp,
            lemma1: "fahren".to_string(),
            tag1: Tag::Verb,
            lemma2: "Auto".to_string(),
            tag2: Tag::Noun,
            prep: Some("mit".to_string()),
            frequency: 3,
            score: 12.5,
        };
        let mut out = Vec::new();
        c.write_rows(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let rows: Vec<_> = text.lines().collect();
        assert_eq!(rows[0], "7\tPP\tfahren\tVERB\tAuto\tNOUN\tmit\t0\t3\t12.5");
        assert_eq!(rows[1], "-7\tPP\tAuto\tNOUN\tfahren\tVERB\tmit\t1\t3\t12.5");
    }

    #[test]
    fn test_mwe_chaining() {
        // (fahren, Auto) then (Auto, rot): the shared token is position 3
        let chain = |id| {
            let mut obj = raw(Relation::Obj, "fahren", "Auto", 1, 3);
            obj.tag1 = Tag::Verb;
            obj.tag2 = Tag::Noun;
            sentence(id, vec![obj, raw(Relation::Attr, "Auto", "rot", 3, 2)])
        };
        let (result, _, mwe_matches) = aggregate(&[chain(0), chain(1)], 1, 2);
        assert_eq!(result.mwes.len(), 1);
        let mwe = &result.mwes[0];
        assert_eq!((mwe.collocation1, mwe.collocation2), (1, 2));
        assert_eq!(mwe.relation, Relation::Attr);
        assert_eq!(mwe.frequency, 2);
        assert!((mwe.score - 14.0).abs() < 1e-9);
        assert_eq!(mwe_matches.lines().collect::<Vec<_>>(), vec!["1\t1\t2", "1\t3\t4"]);

        // a single witness is below the floor
        let (result, ..) = aggregate(&[chain(0)], 1, 2);
        assert!(result.mwes.is_empty());

        // dropping a component drops the mwe
        let (result, ..) = aggregate(&[chain(0), chain(1)], 3, 1);
        assert!(result.mwes.is_empty());
    }

    #[test]
    fn test_token_frequencies() {
        let mut a = TokenFrequencies::new();
        a.add(&Token::new(1, "Hauses", "Haus", Tag::Noun, 0, "ROOT"));
        a.add(&Token::new(1, "Haus", "Haus", Tag::Noun, 0, "ROOT"));
        let mut b = TokenFrequencies::new();
        b.add(&Token::new(1, "Haus", "Haus", Tag::Noun, 0, "ROOT"));
        b.add(&Token::new(2, "groß", "groß", Tag::Adj, 0, "ROOT"));
        a.merge(b);

        assert_eq!(a.len(), 2);
        assert_eq!(a.frequency("Haus", Tag::Noun), 3);
        assert_eq!(
            a.rows(),
            vec![("Haus", Tag::Noun, "Haus", 3), ("groß", Tag::Adj, "groß", 1)]
        );
    }
}

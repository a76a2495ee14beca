//! Word-profile queries
//!
//! Read-only lookups against a store built by [`crate::storage::rebuild`]:
//! a lemma's collocations per relation, the comparison of two lemmas'
//! profiles, MWEs built on a collocation, and concordance sentences.

use crate::concord;
use crate::relation::{Relation, RelationView, UnknownRelation};
use crate::storage::{self, StorageError};
use crate::tree::{Tag, TokenIdx};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static LEMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{M}-]+$").expect("lemma regex is invalid"));

/// Error type for query failures
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query error: invalid lemma: {0:?}")]
    InvalidLemma(String),

    #[error("Query error: unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Query error: unknown order: {0}")]
    UnknownOrder(String),

    #[error("Query error: {0}")]
    UnknownRelation(#[from] UnknownRelation),

    #[error("Query error: inconsistent store: {0}")]
    Inconsistent(String),

    #[error("Query error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Query error: {0}")]
    Storage(#[from] StorageError),
}

/// Reject anything but letters, combining marks and hyphens
pub fn validate_lemma(lemma: &str) -> Result<(), QueryError> {
    if LEMMA.is_match(lemma) {
        Ok(())
    } else {
        Err(QueryError::InvalidLemma(lemma.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    Frequency,
    #[default]
    LogDice,
}

impl OrderBy {
    fn column(self) -> &'static str {
        match self {
            OrderBy::Frequency => "frequency",
            OrderBy::LogDice => "score",
        }
    }

    fn metric(self, frequency: u64, score: f64) -> f64 {
        match self {
            OrderBy::Frequency => frequency as f64,
            OrderBy::LogDice => score,
        }
    }
}

impl FromStr for OrderBy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frequency" => Ok(OrderBy::Frequency),
            "log_dice" => Ok(OrderBy::LogDice),
            _ => Err(QueryError::UnknownOrder(s.to_string())),
        }
    }
}

/// Scalar comparing one collocate across two profiles
///
/// Scores are the ordering metric; ranks count from 0 at the top of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOperation {
    Diff,
    #[default]
    Adiff,
    Rdiff,
    Ardiff,
    Max,
    Rmax,
    Avg,
}

impl DiffOperation {
    pub fn apply(self, score1: f64, score2: f64, rank1: usize, rank2: usize) -> f64 {
        match self {
            DiffOperation::Diff | DiffOperation::Adiff => score1 - score2,
            DiffOperation::Rdiff | DiffOperation::Ardiff => rank2 as f64 - rank1 as f64,
            DiffOperation::Max => score1.max(score2),
            DiffOperation::Rmax => rank1.max(rank2) as f64,
            DiffOperation::Avg => (score1 + score2) / 2.0,
        }
    }

    /// Sort, truncate to `number`, and for the absolute operations regroup
    /// by sign
    fn rank(self, tuples: &mut Vec<DiffTuple>, number: usize) {
        match self {
            DiffOperation::Adiff | DiffOperation::Ardiff => {
                tuples.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
                tuples.truncate(number);
                tuples.sort_by(|a, b| b.value.total_cmp(&a.value));
            }
            DiffOperation::Rmax => {
                tuples.sort_by(|a, b| a.value.total_cmp(&b.value));
                tuples.truncate(number);
            }
            _ => {
                tuples.sort_by(|a, b| b.value.total_cmp(&a.value));
                tuples.truncate(number);
            }
        }
    }
}

impl FromStr for DiffOperation {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diff" => Ok(DiffOperation::Diff),
            "adiff" => Ok(DiffOperation::Adiff),
            "rdiff" => Ok(DiffOperation::Rdiff),
            "ardiff" => Ok(DiffOperation::Ardiff),
            "max" => Ok(DiffOperation::Max),
            "rmax" => Ok(DiffOperation::Rmax),
            "avg" => Ok(DiffOperation::Avg),
            _ => Err(QueryError::UnknownOperation(s.to_string())),
        }
    }
}

/// A relation view, or the META overview of all frequent-enough relations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationSelector {
    View(RelationView),
    Meta,
}

impl RelationSelector {
    /// The views META covers: everything but PP and VZ, in both directions
    pub fn meta_views() -> Vec<RelationView> {
        let mut views = Vec::new();
        for relation in Relation::ALL {
            if relation.is_meta_excluded() {
                continue;
            }
            views.push(RelationView::new(relation, false));
            if !relation.is_symmetric() {
                views.push(RelationView::new(relation, true));
            }
        }
        views
    }
}

impl fmt::Display for RelationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationSelector::View(view) => view.fmt(f),
            RelationSelector::Meta => f.write_str("META"),
        }
    }
}

impl FromStr for RelationSelector {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "META" {
            Ok(RelationSelector::Meta)
        } else {
            Ok(RelationSelector::View(s.parse()?))
        }
    }
}

impl From<RelationView> for RelationSelector {
    fn from(view: RelationView) -> Self {
        RelationSelector::View(view)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationsRequest {
    pub lemma: String,
    pub tag: Tag,
    /// Empty selects every view the lemma occurs in
    pub relations: Vec<RelationSelector>,
    pub start: usize,
    pub number: usize,
    pub order_by: OrderBy,
    pub min_freq: u64,
    pub min_stat: f64,
}

impl RelationsRequest {
    pub fn new(lemma: &str, tag: Tag) -> Self {
        Self {
            lemma: lemma.to_string(),
            tag,
            relations: Vec::new(),
            start: 0,
            number: 20,
            order_by: OrderBy::default(),
            min_freq: 0,
            min_stat: -1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffRequest {
    pub lemma1: String,
    pub lemma2: String,
    pub tag: Tag,
    /// Empty selects every view either lemma occurs in
    pub relations: Vec<RelationSelector>,
    pub number: usize,
    pub order_by: OrderBy,
    pub min_freq: u64,
    pub min_stat: f64,
    pub operation: DiffOperation,
    pub use_intersection: bool,
    /// When positive, only the top `nbest` collocates of each side count
    pub nbest: usize,
}

impl DiffRequest {
    pub fn new(lemma1: &str, lemma2: &str, tag: Tag) -> Self {
        Self {
            lemma1: lemma1.to_string(),
            lemma2: lemma2.to_string(),
            tag,
            relations: Vec::new(),
            number: 20,
            order_by: OrderBy::default(),
            min_freq: 0,
            min_stat: -1000.0,
            operation: DiffOperation::default(),
            use_intersection: false,
            nbest: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MweRequest {
    pub collocation_ids: Vec<i64>,
    /// Relations of the outer link; empty selects all
    pub relations: Vec<Relation>,
    pub start: usize,
    pub number: usize,
    pub order_by: OrderBy,
    pub min_freq: u64,
    pub min_stat: f64,
}

impl MweRequest {
    pub fn new(collocation_ids: Vec<i64>) -> Self {
        Self {
            collocation_ids,
            relations: Vec::new(),
            start: 0,
            number: 20,
            order_by: OrderBy::default(),
            min_freq: 0,
            min_stat: -1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcordanceRequest {
    /// Collocation id, or MWE id for [`QueryEngine::get_mwe_concordances`]
    pub id: i64,
    pub use_context: bool,
    pub start: usize,
    pub number: usize,
}

impl ConcordanceRequest {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            use_context: false,
            start: 0,
            number: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LemmaInfo {
    pub lemma: String,
    pub tag: Tag,
    /// Most frequent surface form
    pub surface: String,
    pub frequency: u64,
    pub relations: Vec<RelationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollocationTuple {
    pub id: i64,
    pub relation: RelationView,
    pub lemma: String,
    pub tag: Tag,
    pub prep: Option<String>,
    pub inverse: bool,
    pub frequency: u64,
    pub score: f64,
    pub has_mwe: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationResult {
    /// `{lemma}#{tag}#{relation}`
    pub id: String,
    pub relation: String,
    pub tuples: Vec<CollocationTuple>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Only the first lemma has the collocate
    Left,
    /// Only the second lemma has the collocate
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffTuple {
    pub relation: RelationView,
    pub lemma: String,
    pub tag: Tag,
    pub prep: Option<String>,
    pub id1: Option<i64>,
    pub id2: Option<i64>,
    pub frequency1: u64,
    pub frequency2: u64,
    pub score1: f64,
    pub score2: f64,
    pub rank1: Option<usize>,
    pub rank2: Option<usize>,
    pub value: f64,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult {
    pub relation: String,
    pub tuples: Vec<DiffTuple>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MweTuple {
    pub id: i64,
    pub lemma: String,
    pub tag: Tag,
    pub prep: Option<String>,
    pub frequency: u64,
    pub score: f64,
    /// The shared word and the outer collocate, for "word1 word2" display
    pub parts: [String; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MweGroup {
    pub relation: Relation,
    pub tuples: Vec<MweTuple>,
}

/// MWEs of every requested collocation sharing one first lemma
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MweRelations {
    pub lemma: String,
    pub tag: Tag,
    pub collocation_ids: Vec<i64>,
    pub relations: Vec<MweGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub corpus: String,
    pub document: String,
    pub bibl: String,
    pub date: String,
    pub textclass: String,
    pub avail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Concordance {
    pub corpus_file_id: i64,
    pub sentence_id: i64,
    /// Sentence text with the collocation's tokens marked
    pub sentence: String,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub source: Source,
}

/// A fetched collocation together with the lemma it was fetched for
struct Collocate {
    head: String,
    tuple: CollocationTuple,
}

struct Floors {
    order_by: OrderBy,
    min_freq: u64,
    min_stat: f64,
}

/// The raw column values of a collocation row
type RawRow = (i64, String, String, bool, String, String, String, i64, f64, bool);

fn parse_tag(s: &str) -> Result<Tag, QueryError> {
    s.parse()
        .map_err(|_| QueryError::Inconsistent(format!("unknown tag {s}")))
}

fn parse_relation(s: &str) -> Result<Relation, QueryError> {
    s.parse()
        .map_err(|_| QueryError::Inconsistent(format!("unknown relation {s}")))
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn limit(number: Option<usize>) -> i64 {
    number.map_or(-1, |n| n as i64)
}

pub struct QueryEngine {
    conn: Connection,
}

impl QueryEngine {
    /// Open a store read-only
    pub fn open(db: &Path) -> Result<Self, QueryError> {
        Ok(Self::from_connection(storage::open_read_only(db)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Token-frequency entries for a lemma, most frequent tag first
    pub fn get_lemma_and_pos(&self, lemma: &str, tag: Option<Tag>) -> Result<Vec<LemmaInfo>, QueryError> {
        validate_lemma(lemma)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT lemma, tag, surface, freq FROM token_freqs
             WHERE lemma = ?1 AND (?2 IS NULL OR tag = ?2)
             ORDER BY freq DESC, tag",
        )?;
        let rows = stmt
            .query_map(params![lemma, tag.map(Tag::as_str)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (lemma, tag, surface, frequency) in rows {
            let tag = parse_tag(&tag)?;
            let relations = self.available_views(&lemma, tag)?;
            out.push(LemmaInfo {
                lemma,
                tag,
                surface,
                frequency: frequency as u64,
                relations,
            });
        }
        Ok(out)
    }

    /// Distinct views in which (lemma, tag) is the first lemma
    fn available_views(&self, lemma: &str, tag: Tag) -> Result<Vec<RelationView>, QueryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT label, inv FROM collocations WHERE lemma1 = ?1 AND lemma1_tag = ?2",
        )?;
        let rows = stmt
            .query_map(params![lemma, tag.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut views = rows
            .iter()
            .map(|(label, inv)| Ok(RelationView::new(parse_relation(label)?, *inv)))
            .collect::<Result<Vec<_>, QueryError>>()?;
        views.sort();
        views.dedup();
        Ok(views)
    }

    fn fetch(
        &self,
        lemma: &str,
        tag: Tag,
        view: RelationView,
        floors: &Floors,
        start: usize,
        number: Option<usize>,
    ) -> Result<Vec<Collocate>, QueryError> {
        let sql = format!(
            "SELECT c.id, c.lemma1, c.label, c.inv, c.lemma2, c.lemma2_tag, c.prep, c.frequency, c.score,
                    EXISTS (SELECT 1 FROM mwe WHERE mwe.collocation1_id = ABS(c.id))
             FROM collocations c
             WHERE c.lemma1 = ?1 AND c.lemma1_tag = ?2 AND c.label = ?3
               AND (?4 IS NULL OR c.inv = ?4)
               AND c.frequency >= ?5 AND c.score >= ?6
             ORDER BY c.{} DESC, c.id
             LIMIT ?7 OFFSET ?8",
            floors.order_by.column()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    lemma,
                    tag.as_str(),
                    view.relation.as_str(),
                    view.inverse_filter(),
                    floors.min_freq as i64,
                    floors.min_stat,
                    limit(number),
                    start as i64,
                ],
                |row| -> rusqlite::Result<RawRow> {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, head, label, inverse, lemma, tag, prep, frequency, score, has_mwe)| {
                Ok(Collocate {
                    head,
                    tuple: CollocationTuple {
                        id,
                        relation: RelationView::new(parse_relation(&label)?, inverse),
                        lemma,
                        tag: parse_tag(&tag)?,
                        prep: non_empty(prep),
                        inverse,
                        frequency: frequency as u64,
                        score,
                        has_mwe,
                    },
                })
            })
            .collect()
    }

    /// Ranked collocates of one selector, META merging its views
    fn fetch_selector(
        &self,
        lemma: &str,
        tag: Tag,
        selector: RelationSelector,
        floors: &Floors,
        start: usize,
        number: Option<usize>,
    ) -> Result<Vec<Collocate>, QueryError> {
        match selector {
            RelationSelector::View(view) => self.fetch(lemma, tag, view, floors, start, number),
            RelationSelector::Meta => {
                let mut all = Vec::new();
                for view in RelationSelector::meta_views() {
                    all.extend(self.fetch(lemma, tag, view, floors, 0, None)?);
                }
                let metric = |c: &Collocate| floors.order_by.metric(c.tuple.frequency, c.tuple.score);
                all.sort_by(|a, b| metric(b).total_cmp(&metric(a)).then(a.tuple.id.cmp(&b.tuple.id)));
                Ok(all
                    .into_iter()
                    .skip(start)
                    .take(number.unwrap_or(usize::MAX))
                    .collect())
            }
        }
    }

    fn selectors(&self, requested: &[RelationSelector], lemmas: &[&str], tag: Tag) -> Result<Vec<RelationSelector>, QueryError> {
        if !requested.is_empty() {
            return Ok(requested.to_vec());
        }
        let mut views = Vec::new();
        for lemma in lemmas {
            views.extend(self.available_views(lemma, tag)?);
        }
        views.sort();
        views.dedup();
        Ok(views.into_iter().map(RelationSelector::View).collect())
    }

    /// A lemma's collocations, one ranked list per relation
    pub fn get_relations(&self, req: &RelationsRequest) -> Result<Vec<RelationResult>, QueryError> {
        validate_lemma(&req.lemma)?;
        let floors = Floors {
            order_by: req.order_by,
            min_freq: req.min_freq,
            min_stat: req.min_stat,
        };
        let mut out = Vec::new();
        for selector in self.selectors(&req.relations, &[&req.lemma], req.tag)? {
            let tuples = self
                .fetch_selector(&req.lemma, req.tag, selector, &floors, req.start, Some(req.number))?
                .into_iter()
                .map(|c| c.tuple)
                .collect();
            out.push(RelationResult {
                id: format!("{}#{}#{}", req.lemma, req.tag, selector),
                relation: selector.to_string(),
                tuples,
            });
        }
        Ok(out)
    }

    /// Compare the profiles of two lemmas relation by relation
    pub fn get_diff(&self, req: &DiffRequest) -> Result<Vec<DiffResult>, QueryError> {
        validate_lemma(&req.lemma1)?;
        validate_lemma(&req.lemma2)?;
        let floors = Floors {
            order_by: req.order_by,
            min_freq: req.min_freq,
            min_stat: req.min_stat,
        };
        let nbest = (req.nbest > 0).then_some(req.nbest);

        let mut out = Vec::new();
        for selector in self.selectors(&req.relations, &[&req.lemma1, &req.lemma2], req.tag)? {
            let left = self.fetch_selector(&req.lemma1, req.tag, selector, &floors, 0, nbest)?;
            let right = self.fetch_selector(&req.lemma2, req.tag, selector, &floors, 0, nbest)?;
            let tuples = diff_lists(req, left, right)?;
            out.push(DiffResult {
                relation: selector.to_string(),
                tuples,
            });
        }
        Ok(out)
    }

    /// MWEs whose inner link is one of the given collocations, grouped by
    /// the collocations' first lemma and then by MWE relation
    pub fn get_mwe_relations(&self, req: &MweRequest) -> Result<Vec<MweRelations>, QueryError> {
        let mut out: Vec<MweRelations> = Vec::new();
        for &id in &req.collocation_ids {
            let base = self
                .conn
                .prepare_cached(
                    "SELECT lemma1, lemma1_tag, lemma2 FROM collocations WHERE id = ABS(?1)",
                )?
                .query_row(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .optional()?;
            let Some((lemma, tag, shared)) = base else {
                continue;
            };
            let tag = parse_tag(&tag)?;

            let sql = format!(
                "SELECT m.id, m.label, m.frequency, m.score, c.lemma2, c.lemma2_tag, c.prep
                 FROM mwe m JOIN collocations c ON c.id = m.collocation2_id
                 WHERE m.collocation1_id = ABS(?1) AND m.frequency >= ?2 AND m.score >= ?3
                 ORDER BY m.{} DESC, m.id",
                req.order_by.column()
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params![id, req.min_freq as i64, req.min_stat], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let idx = match out.iter().position(|r| r.lemma == lemma && r.tag == tag) {
                Some(idx) => idx,
                None => {
                    out.push(MweRelations {
                        lemma,
                        tag,
                        collocation_ids: Vec::new(),
                        relations: Vec::new(),
                    });
                    out.len() - 1
                }
            };
            let entry = &mut out[idx];
            entry.collocation_ids.push(id);

            for (mwe_id, label, frequency, score, lemma2, tag2, prep) in rows {
                let relation = parse_relation(&label)?;
                if !req.relations.is_empty() && !req.relations.contains(&relation) {
                    continue;
                }
                let tuple = MweTuple {
                    id: mwe_id,
                    parts: [shared.clone(), lemma2.clone()],
                    lemma: lemma2,
                    tag: parse_tag(&tag2)?,
                    prep: non_empty(prep),
                    frequency: frequency as u64,
                    score,
                };
                match entry.relations.iter_mut().find(|g| g.relation == relation) {
                    Some(group) => group.tuples.push(tuple),
                    None => entry.relations.push(MweGroup {
                        relation,
                        tuples: vec![tuple],
                    }),
                }
            }
        }

        let metric = |t: &MweTuple| req.order_by.metric(t.frequency, t.score);
        for group in out.iter_mut().flat_map(|r| r.relations.iter_mut()) {
            let mut tuples = std::mem::take(&mut group.tuples);
            tuples.sort_by(|a, b| metric(b).total_cmp(&metric(a)));
            // first-seen wins among MWEs sharing the outer collocate
            let mut seen = FxHashSet::default();
            tuples.retain(|t| seen.insert(t.lemma.clone()));
            group.tuples = tuples
                .into_iter()
                .skip(req.start)
                .take(req.number)
                .collect();
        }
        Ok(out)
    }

    /// Sentences witnessing a collocation, in sampling order
    pub fn get_concordances(&self, req: &ConcordanceRequest) -> Result<Vec<Concordance>, QueryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT m.corpus_file_id, m.sentence_id, s.sentence,
                    m.head_position, m.dep_position, m.prep_position,
                    f.corpus, f.document, f.bibl, f.date, f.textclass, f.avail
             FROM matches m
             JOIN concord_sentences s
               ON s.corpus_file_id = m.corpus_file_id AND s.sentence_id = m.sentence_id
             JOIN corpus_files f ON f.id = m.corpus_file_id
             WHERE m.collocation_id = ABS(?1)
             ORDER BY s.sample_key, m.id
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![req.id, req.number as i64, req.start as i64], |row| {
                let positions = [row.get::<_, i64>(3)?, row.get(4)?, row.get(5)?];
                Ok(ConcordRow {
                    corpus_file_id: row.get(0)?,
                    sentence_id: row.get(1)?,
                    sentence: row.get(2)?,
                    positions: positions.to_vec(),
                    source: source(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|row| self.concordance(row, req.use_context))
            .collect()
    }

    /// Sentences witnessing an MWE, both links marked
    pub fn get_mwe_concordances(&self, req: &ConcordanceRequest) -> Result<Vec<Concordance>, QueryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT m1.corpus_file_id, m1.sentence_id, s.sentence,
                    m1.head_position, m1.dep_position, m1.prep_position,
                    m2.head_position, m2.dep_position, m2.prep_position,
                    f.corpus, f.document, f.bibl, f.date, f.textclass, f.avail
             FROM mwe_match w
             JOIN matches m1 ON m1.id = w.match1_id
             JOIN matches m2 ON m2.id = w.match2_id
             JOIN concord_sentences s
               ON s.corpus_file_id = m1.corpus_file_id AND s.sentence_id = m1.sentence_id
             JOIN corpus_files f ON f.id = m1.corpus_file_id
             WHERE w.mwe_id = ?1
             ORDER BY s.sample_key, w.match1_id
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![req.id, req.number as i64, req.start as i64], |row| {
                let mut positions = Vec::with_capacity(6);
                for i in 3..9 {
                    positions.push(row.get::<_, i64>(i)?);
                }
                Ok(ConcordRow {
                    corpus_file_id: row.get(0)?,
                    sentence_id: row.get(1)?,
                    sentence: row.get(2)?,
                    positions,
                    source: source(row, 9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|row| self.concordance(row, req.use_context))
            .collect()
    }

    fn concordance(&self, row: ConcordRow, use_context: bool) -> Result<Concordance, QueryError> {
        let mut positions: Vec<TokenIdx> = row
            .positions
            .iter()
            .filter(|&&p| p > 0)
            .map(|&p| p as TokenIdx)
            .collect();
        positions.sort_unstable();
        positions.dedup();

        let (previous, next) = if use_context {
            (
                self.sentence_text(row.corpus_file_id, row.sentence_id - 1)?,
                self.sentence_text(row.corpus_file_id, row.sentence_id + 1)?,
            )
        } else {
            (None, None)
        };
        Ok(Concordance {
            corpus_file_id: row.corpus_file_id,
            sentence_id: row.sentence_id,
            sentence: concord::highlight(&row.sentence, &positions),
            previous,
            next,
            source: row.source,
        })
    }

    fn sentence_text(&self, corpus_file_id: i64, sentence_id: i64) -> Result<Option<String>, QueryError> {
        if sentence_id < 0 {
            return Ok(None);
        }
        let encoded: Option<String> = self
            .conn
            .prepare_cached(
                "SELECT sentence FROM concord_sentences WHERE corpus_file_id = ?1 AND sentence_id = ?2",
            )?
            .query_row(params![corpus_file_id, sentence_id], |row| row.get(0))
            .optional()?;
        Ok(encoded.map(|s| concord::reconstruct(&s)))
    }
}

struct ConcordRow {
    corpus_file_id: i64,
    sentence_id: i64,
    sentence: String,
    positions: Vec<i64>,
    source: Source,
}

fn source(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<Source> {
    Ok(Source {
        corpus: row.get(first)?,
        document: row.get(first + 1)?,
        bibl: row.get(first + 2)?,
        date: row.get(first + 3)?,
        textclass: row.get(first + 4)?,
        avail: row.get(first + 5)?,
    })
}

/// One collocate's standing in the two profiles
struct Entry {
    relation: RelationView,
    lemma: String,
    tag: Tag,
    prep: Option<String>,
    left: Option<(usize, CollocationTuple)>,
    right: Option<(usize, CollocationTuple)>,
}

type CollocateKey = (RelationView, String, Tag, Option<String>);

/// Merge two ranked lists into diff tuples
fn diff_lists(req: &DiffRequest, left: Vec<Collocate>, right: Vec<Collocate>) -> Result<Vec<DiffTuple>, QueryError> {
    let (n_left, n_right) = (left.len(), right.len());
    let mut index: FxHashMap<CollocateKey, usize> = FxHashMap::default();
    let mut entries: Vec<Entry> = Vec::new();

    let sides = [(left, &req.lemma1, true), (right, &req.lemma2, false)];
    for (list, lemma, is_left) in sides {
        for (rank, collocate) in list.into_iter().enumerate() {
            if collocate.head != *lemma {
                return Err(QueryError::Inconsistent(format!(
                    "collocation {} belongs to {}, not {} or {}",
                    collocate.tuple.id, collocate.head, req.lemma1, req.lemma2
                )));
            }
            let t = collocate.tuple;
            let key = (t.relation, t.lemma.clone(), t.tag, t.prep.clone());
            let next = entries.len();
            let idx = *index.entry(key).or_insert(next);
            if idx == next {
                entries.push(Entry {
                    relation: t.relation,
                    lemma: t.lemma.clone(),
                    tag: t.tag,
                    prep: t.prep.clone(),
                    left: None,
                    right: None,
                });
            }
            let slot = if is_left {
                &mut entries[idx].left
            } else {
                &mut entries[idx].right
            };
            // a list holds each collocate once; keep its best rank
            if slot.is_none() {
                *slot = Some((rank, t));
            }
        }
    }

    let metric = |t: &CollocationTuple| req.order_by.metric(t.frequency, t.score);
    let mut tuples = Vec::new();
    for entry in entries {
        let position = match (&entry.left, &entry.right) {
            (Some(_), Some(_)) => Position::Center,
            (Some(_), None) => Position::Left,
            (None, Some(_)) => Position::Right,
            (None, None) => continue,
        };
        if req.use_intersection && position != Position::Center {
            continue;
        }
        let score1 = entry.left.as_ref().map_or(0.0, |(_, t)| metric(t));
        let score2 = entry.right.as_ref().map_or(0.0, |(_, t)| metric(t));
        let rank1 = entry.left.as_ref().map(|(r, _)| *r);
        let rank2 = entry.right.as_ref().map(|(r, _)| *r);
        let value = req
            .operation
            .apply(score1, score2, rank1.unwrap_or(n_left), rank2.unwrap_or(n_right));
        tuples.push(DiffTuple {
            relation: entry.relation,
            lemma: entry.lemma,
            tag: entry.tag,
            prep: entry.prep,
            id1: entry.left.as_ref().map(|(_, t)| t.id),
            id2: entry.right.as_ref().map(|(_, t)| t.id),
            frequency1: entry.left.as_ref().map_or(0, |(_, t)| t.frequency),
            frequency2: entry.right.as_ref().map_or(0, |(_, t)| t.frequency),
            score1,
            score2,
            rank1,
            rank2,
            value,
            position,
        });
    }
    req.operation.rank(&mut tuples, req.number);
    Ok(tuples)
}

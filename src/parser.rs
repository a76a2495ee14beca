//! Pattern-table parser
//!
//! Parses the pattern-table definition language into [`PatternTables`]
//! using a pest grammar. The default German tables are embedded from
//! `patterns.txt`.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::path::Path;
use thiserror::Error;

use crate::pattern::{BinaryPatterns, PatternTables, TernaryPatterns};
use crate::relation::Relation;
use crate::tree::Tag;

#[derive(Parser)]
#[grammar = "patterns.pest"]
struct TableParser;

const DEFAULT_TABLES: &str = include_str!("patterns.txt");

/// Error type for pattern-table parsing failures
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern table error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("pattern table error: line {line}: unknown tag {tag}")]
    UnknownTag { line: usize, tag: String },

    #[error("pattern table error: line {line}: unknown relation {relation}")]
    UnknownRelation { line: usize, relation: String },

    #[error("cannot read pattern table: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a pattern-table definition
pub fn parse_tables(input: &str) -> Result<PatternTables, PatternError> {
    let mut pairs = TableParser::parse(Rule::tables, input).map_err(Box::new)?;
    let mut binary = BinaryPatterns::new();
    let mut ternary = TernaryPatterns::new();

    let Some(tables) = pairs.next() else {
        return Ok(PatternTables::default());
    };

    for entry in tables.into_inner() {
        match entry.as_rule() {
            Rule::binary => {
                let line = entry.line_col().0;
                let mut inner = entry.into_inner();
                let (Some(deprel), Some(head), Some(dep), Some(rel)) =
                    (inner.next(), inner.next(), inner.next(), inner.next())
                else {
                    continue;
                };
                binary.insert(
                    deprel.as_str(),
                    parse_tag(&head, line)?,
                    parse_tag(&dep, line)?,
                    parse_relation(&rel, line)?,
                );
            }
            Rule::ternary => {
                let line = entry.line_col().0;
                let parts: Vec<Pair<Rule>> = entry.into_inner().collect();
                let [outer, inner, grandhead, head, token, rel] = parts.as_slice() else {
                    continue;
                };
                ternary.insert(
                    outer.as_str(),
                    inner.as_str(),
                    (
                        parse_tag(grandhead, line)?,
                        parse_tag(head, line)?,
                        parse_tag(token, line)?,
                    ),
                    parse_relation(rel, line)?,
                );
            }
            Rule::EOI => {} // End of input
            _ => {}
        }
    }

    Ok(PatternTables::new(binary, ternary))
}

/// Read a pattern-table definition from a file
pub fn load_tables(path: &Path) -> Result<PatternTables, PatternError> {
    let text = std::fs::read_to_string(path)?;
    parse_tables(&text)
}

/// The built-in tables for German UD annotation
pub fn default_tables() -> Result<PatternTables, PatternError> {
    parse_tables(DEFAULT_TABLES)
}

fn parse_tag(pair: &Pair<Rule>, line: usize) -> Result<Tag, PatternError> {
    pair.as_str().parse().map_err(|_| PatternError::UnknownTag {
        line,
        tag: pair.as_str().to_string(),
    })
}

fn parse_relation(pair: &Pair<Rule>, line: usize) -> Result<Relation, PatternError> {
    pair.as_str()
        .parse()
        .map_err(|_| PatternError::UnknownRelation {
            line,
            relation: pair.as_str().to_string(),
        })
}

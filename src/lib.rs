//! Wordprofile: collocation profiles from dependency-parsed corpora
//!
//! Extracts grammatical collocations from CoNLL-U documents, aggregates them
//! into log-dice scored collocations and multiword expressions, loads the
//! result into SQLite, and answers profile and comparison queries.

pub mod aggregate; // Counting, log-dice, floors and MWE chaining
pub mod bytes; // Byte-slice helpers for the readers
pub mod concord; // Concordance sentence encoding and duplicate detection
pub mod config; // Extraction settings
pub mod conllu; // CoNLL-U document reading
pub mod extract; // Relation extraction from one sentence
pub mod filter; // Token and sentence eligibility
pub mod parser; // Pattern-table parser
pub mod pattern; // Tag-pattern tables
pub mod pipeline; // Concurrent extraction over many files
pub mod query; // Profile, diff, MWE and concordance queries
pub mod relation; // Relation labels and views
pub mod storage; // SQLite store
pub mod tree; // Tokens and sentences

// Re-exports for convenience
pub use config::ExtractConfig;
pub use conllu::{CoNLLUReader, Document};
pub use extract::{Extractor, Match};
pub use parser::{default_tables, load_tables};
pub use pattern::PatternTables;
pub use pipeline::IngestSummary;
pub use query::{QueryEngine, QueryError};
pub use relation::{Relation, RelationView};
pub use tree::{Sentence, Tag, Token};

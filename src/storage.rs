//! Relational store
//!
//! The store is rebuilt from the bulk files of one extraction run, never
//! updated in place. Tables are loaded first and indexed afterwards; the new
//! database is written next to the live one and renamed over it only when
//! everything succeeded, so readers always see a complete store.

use crate::pipeline;
use log::{debug, info};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{}:{line}: expected {expected} fields, found {found}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// A bulk-loaded table and the file it comes from
pub struct Table {
    pub name: &'static str,
    pub file: &'static str,
    pub columns: &'static [&'static str],
}

pub mod corpus_files {
    pub const TABLE: &str = "corpus_files";
    pub const COLUMNS: &[&str] = &["id", "corpus", "file", "document", "bibl", "date", "textclass", "avail"];
}

pub mod concord_sentences {
    pub const TABLE: &str = "concord_sentences";
    pub const COLUMNS: &[&str] = &["corpus_file_id", "sentence_id", "sentence", "sample_key"];
}

pub mod matches {
    pub const TABLE: &str = "matches";
    pub const COLUMNS: &[&str] = &[
        "id",
        "collocation_id",
        "corpus_file_id",
        "sentence_id",
        "head_position",
        "dep_position",
        "prep_position",
    ];
}

pub mod collocations {
    pub const TABLE: &str = "collocations";
    pub const COLUMNS: &[&str] = &[
        "id",
        "label",
        "lemma1",
        "lemma1_tag",
        "lemma2",
        "lemma2_tag",
        "prep",
        "inv",
        "frequency",
        "score",
    ];
}

pub mod mwe {
    pub const TABLE: &str = "mwe";
    pub const COLUMNS: &[&str] = &["id", "collocation1_id", "collocation2_id", "label", "frequency", "score"];
}

pub mod mwe_match {
    pub const TABLE: &str = "mwe_match";
    pub const COLUMNS: &[&str] = &["mwe_id", "match1_id", "match2_id"];
}

pub mod token_freqs {
    pub const TABLE: &str = "token_freqs";
    pub const COLUMNS: &[&str] = &["lemma", "tag", "surface", "freq"];
}

pub const TABLES: &[Table] = &[
    Table {
        name: corpus_files::TABLE,
        file: pipeline::CORPUS_FILES,
        columns: corpus_files::COLUMNS,
    },
    Table {
        name: concord_sentences::TABLE,
        file: pipeline::CONCORD_SENTENCES,
        columns: concord_sentences::COLUMNS,
    },
    Table {
        name: matches::TABLE,
        file: pipeline::MATCHES,
        columns: matches::COLUMNS,
    },
    Table {
        name: collocations::TABLE,
        file: pipeline::COLLOCATIONS,
        columns: collocations::COLUMNS,
    },
    Table {
        name: mwe::TABLE,
        file: pipeline::MWE,
        columns: mwe::COLUMNS,
    },
    Table {
        name: mwe_match::TABLE,
        file: pipeline::MWE_MATCH,
        columns: mwe_match::COLUMNS,
    },
    Table {
        name: token_freqs::TABLE,
        file: pipeline::TOKEN_FREQS,
        columns: token_freqs::COLUMNS,
    },
];

const SCHEMA: &str = "
CREATE TABLE corpus_files (
    id INTEGER NOT NULL,
    corpus TEXT NOT NULL,
    file TEXT NOT NULL,
    document TEXT NOT NULL,
    bibl TEXT NOT NULL,
    date TEXT NOT NULL,
    textclass TEXT NOT NULL,
    avail TEXT NOT NULL
);
CREATE TABLE concord_sentences (
    corpus_file_id INTEGER NOT NULL,
    sentence_id INTEGER NOT NULL,
    sentence TEXT NOT NULL,
    sample_key INTEGER NOT NULL
);
CREATE TABLE matches (
    id INTEGER NOT NULL,
    collocation_id INTEGER NOT NULL,
    corpus_file_id INTEGER NOT NULL,
    sentence_id INTEGER NOT NULL,
    head_position INTEGER NOT NULL,
    dep_position INTEGER NOT NULL,
    prep_position INTEGER NOT NULL
);
CREATE TABLE collocations (
    id INTEGER NOT NULL,
    label TEXT NOT NULL,
    lemma1 TEXT NOT NULL,
    lemma1_tag TEXT NOT NULL,
    lemma2 TEXT NOT NULL,
    lemma2_tag TEXT NOT NULL,
    prep TEXT NOT NULL,
    inv INTEGER NOT NULL,
    frequency INTEGER NOT NULL,
    score REAL NOT NULL
);
CREATE TABLE mwe (
    id INTEGER NOT NULL,
    collocation1_id INTEGER NOT NULL,
    collocation2_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    frequency INTEGER NOT NULL,
    score REAL NOT NULL
);
CREATE TABLE mwe_match (
    mwe_id INTEGER NOT NULL,
    match1_id INTEGER NOT NULL,
    match2_id INTEGER NOT NULL
);
CREATE TABLE token_freqs (
    lemma TEXT NOT NULL,
    tag TEXT NOT NULL,
    surface TEXT NOT NULL,
    freq INTEGER NOT NULL
);
CREATE TABLE corpus_freqs (
    label TEXT NOT NULL,
    freq INTEGER NOT NULL
);
";

/// Per-relation totals over canonical rows
const CORPUS_FREQS: &str = "
INSERT INTO corpus_freqs (label, freq)
SELECT label, SUM(frequency) FROM collocations WHERE inv = 0 GROUP BY label;
";

const INDICES: &str = "
CREATE UNIQUE INDEX corpus_files_id ON corpus_files (id);
CREATE UNIQUE INDEX concord_sentences_key ON concord_sentences (corpus_file_id, sentence_id);
CREATE INDEX concord_sentences_sample ON concord_sentences (sample_key);
CREATE INDEX matches_collocation ON matches (collocation_id);
CREATE INDEX matches_sentence ON matches (corpus_file_id, sentence_id);
CREATE UNIQUE INDEX matches_id ON matches (id);
CREATE UNIQUE INDEX collocations_id ON collocations (id);
CREATE INDEX collocations_lemma1 ON collocations (lemma1);
CREATE INDEX collocations_lemma1_tag ON collocations (lemma1, lemma1_tag);
CREATE INDEX collocations_lemma2_tag ON collocations (lemma2, lemma2_tag);
CREATE UNIQUE INDEX mwe_id ON mwe (id);
CREATE INDEX mwe_collocation1 ON mwe (collocation1_id);
CREATE INDEX mwe_match_mwe ON mwe_match (mwe_id);
CREATE INDEX token_freqs_lemma ON token_freqs (lemma);
CREATE INDEX token_freqs_lemma_tag ON token_freqs (lemma, tag);
CREATE INDEX corpus_freqs_label ON corpus_freqs (label);
";

/// Rows loaded per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub tables: Vec<(String, usize)>,
}

impl LoadSummary {
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, n)| *n)
    }
}

fn tmp_path(db: &Path) -> PathBuf {
    let mut name = OsString::from(db.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Replace the database at `db` with one built from the files in `data_dir`
///
/// On failure the previous database is left untouched.
pub fn rebuild(db: &Path, data_dir: &Path) -> Result<LoadSummary, StorageError> {
    let tmp = tmp_path(db);
    if tmp.exists() {
        fs::remove_file(&tmp).map_err(io_error(&tmp))?;
    }
    info!("loading {} into {}", data_dir.display(), tmp.display());
    match load(&tmp, data_dir) {
        Ok(summary) => {
            fs::rename(&tmp, db).map_err(io_error(db))?;
            info!("replaced {}", db.display());
            Ok(summary)
        }
        Err(e) => {
            // leftovers of a failed build are worthless
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn load(path: &Path, data_dir: &Path) -> Result<LoadSummary, StorageError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = OFF; PRAGMA synchronous = OFF;")?;
    conn.execute_batch(SCHEMA)?;

    let mut summary = LoadSummary::default();
    let tx = conn.transaction()?;
    for table in TABLES {
        let rows = load_table(&tx, table, &data_dir.join(table.file))?;
        debug!("{}: {rows} rows", table.name);
        summary.tables.push((table.name.to_string(), rows));
    }
    tx.execute_batch(CORPUS_FREQS)?;
    tx.commit()?;

    conn.execute_batch(INDICES)?;
    conn.execute_batch("ANALYZE;")?;
    conn.close().map_err(|(_, e)| e)?;
    Ok(summary)
}

fn load_table(conn: &Connection, table: &Table, path: &Path) -> Result<usize, StorageError> {
    let reader = BufReader::new(File::open(path).map_err(io_error(path))?);
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        table.name,
        table.columns.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut rows = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        // values go in as text; column affinity converts the numeric ones
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != table.columns.len() {
            return Err(StorageError::Format {
                path: path.to_path_buf(),
                line: i + 1,
                expected: table.columns.len(),
                found: fields.len(),
            });
        }
        stmt.execute(params_from_iter(fields))?;
        rows += 1;
    }
    Ok(rows)
}

/// Open a store for querying
pub fn open_read_only(db: &Path) -> Result<Connection, StorageError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(Connection::open_with_flags(db, flags)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Bulk files for ATTR(Zeit, neu) seen twice in one document
    fn write_bulk_files(dir: &Path) {
        let files = [
            (pipeline::CORPUS_FILES, "1\tzeitung\tnews.conllu\tnews-1\tTagesblatt\t1990\tZeitung\tfrei\n"),
            (
                pipeline::CONCORD_SENTENCES,
                "1\t0\tEine\x01neue\x01Zeit\x01begann\x02.\x01\t17\n1\t1\tDie\x01neue\x01Zeit\x01kam\x02.\x01\t3\n",
            ),
            (
                pipeline::MATCHES,
                "1\t1\t1\t0\t3\t2\t0\n2\t1\t1\t1\t3\t2\t0\n",
            ),
            (
                pipeline::COLLOCATIONS,
                "1\tATTR\tZeit\tNOUN\tneu\tADJ\t\t0\t2\t14\n-1\tATTR\tneu\tADJ\tZeit\tNOUN\t\t1\t2\t14\n",
            ),
            (pipeline::MWE, ""),
            (pipeline::MWE_MATCH, ""),
            (pipeline::TOKEN_FREQS, "Zeit\tNOUN\tZeit\t2\nneu\tADJ\tneue\t2\n"),
        ];
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
    }

    #[test]
    fn test_rebuild_loads_and_indexes() {
        let dir = tempdir().unwrap();
        write_bulk_files(dir.path());
        let db = dir.path().join("profile.db");

        let summary = rebuild(&db, dir.path()).unwrap();
        assert_eq!(summary.rows(collocations::TABLE), Some(2));
        assert_eq!(summary.rows(matches::TABLE), Some(2));
        assert!(!tmp_path(&db).exists());

        let conn = open_read_only(&db).unwrap();
        let (frequency, score): (i64, f64) = conn
            .query_row(
                "SELECT frequency, score FROM collocations WHERE id = -1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((frequency, score), (2, 14.0));

        let total: i64 = conn
            .query_row("SELECT freq FROM corpus_freqs WHERE label = 'ATTR'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 2);

        let indices: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'collocations'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indices, 4);
    }

    #[test]
    fn test_failed_rebuild_keeps_old_store() {
        let dir = tempdir().unwrap();
        write_bulk_files(dir.path());
        let db = dir.path().join("profile.db");
        rebuild(&db, dir.path()).unwrap();

        fs::write(dir.path().join(pipeline::MATCHES), "1\t1\t1\n").unwrap();
        let err = rebuild(&db, dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Format { line: 1, expected: 7, found: 3, .. }));
        assert!(!tmp_path(&db).exists());

        let conn = open_read_only(&db).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("profile.db");
        assert!(matches!(rebuild(&db, dir.path()), Err(StorageError::Io { .. })));
        assert!(!db.exists());
    }
}

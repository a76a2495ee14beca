//! Extraction settings

use crate::filter::SentenceFilter;
use crate::tree::Tag;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings of one extraction run; every field has a default
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Corpus name recorded for documents without a `collection` comment
    pub corpus: String,
    /// Extraction worker threads
    pub workers: usize,
    /// Capacity of each bounded queue
    pub queue_capacity: usize,
    pub min_rel_freq: u64,
    pub min_mwe_freq: u64,
    /// Seed for concordance sampling keys
    pub seed: u64,
    pub min_sentence_len: usize,
    pub max_sentence_len: usize,
    pub unknown_tags: Vec<Tag>,
    /// Pattern-table file replacing the built-in tables
    pub patterns: Option<PathBuf>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        let filter = SentenceFilter::default();
        Self {
            corpus: "corpus".to_string(),
            workers: num_cpus::get(),
            queue_capacity: 1024,
            min_rel_freq: 5,
            min_mwe_freq: 5,
            seed: 0,
            min_sentence_len: filter.min_len,
            max_sentence_len: filter.max_len,
            unknown_tags: filter.unknown_tags,
            patterns: None,
        }
    }
}

impl ExtractConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".to_string()));
        }
        if self.min_sentence_len > self.max_sentence_len {
            return Err(ConfigError::Invalid(format!(
                "min_sentence_len {} exceeds max_sentence_len {}",
                self.min_sentence_len, self.max_sentence_len
            )));
        }
        Ok(())
    }

    pub fn sentence_filter(&self) -> SentenceFilter {
        SentenceFilter {
            min_len: self.min_sentence_len,
            max_len: self.max_sentence_len,
            unknown_tags: self.unknown_tags.clone(),
        }
    }
}

//! Parallel extraction pipeline
//!
//! Worker threads take input files off a job queue, parse and filter their
//! sentences and run the extractor. Their output goes over bounded queues
//! to one writer thread per intermediate file and to the single reducer
//! that assigns collocation ids. Producers block while a queue is full.
//!
//! When all inputs are done the reducer applies the frequency floors and
//! the final tab-separated files are written to the output directory,
//! ready for [`crate::storage::rebuild`].

use crate::aggregate::{Aggregate, Aggregator, RawMatch, SentenceMatches, TokenFrequencies, retain_rows};
use crate::concord::{self, DuplicateDetector};
use crate::config::ExtractConfig;
use crate::conllu::{CoNLLUReader, Document};
use crate::extract::{Extractor, collapse_phrasal_verbs};
use crate::filter::{SentenceFilter, is_valid_token};
use crate::pattern::PatternTables;
use crate::tree::Sentence;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, trace, warn};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ScopedJoinHandle};
use thiserror::Error;

pub const CORPUS_FILES: &str = "corpus_files.tsv";
pub const CONCORD_SENTENCES: &str = "concord_sentences.tsv";
pub const MATCHES: &str = "matches.tsv";
pub const COLLOCATIONS: &str = "collocations.tsv";
pub const MWE: &str = "mwe.tsv";
pub const MWE_MATCH: &str = "mwe_match.tsv";
pub const TOKEN_FREQS: &str = "token_freqs.tsv";
pub const DUPLICATES: &str = "duplicates.tsv";

const RAW_MATCHES: &str = "matches.raw.tsv";
const RAW_MWE_MATCH: &str = "mwe_match.raw.tsv";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no input files")]
    NoInput,

    #[error("a pipeline stage stopped before its producers")]
    Disconnected,

    #[error("a pipeline thread panicked")]
    Panicked,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Expand glob patterns into a sorted list of input files
pub fn input_paths(patterns: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::new();
    for pattern in patterns {
        paths.extend(glob::glob(pattern)?.filter_map(Result::ok));
    }
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        return Err(PipelineError::NoInput);
    }
    Ok(paths)
}

/// Counters of one extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files: usize,
    pub failed_files: usize,
    pub documents: usize,
    pub failed_documents: usize,
    pub sentences: usize,
    pub malformed_sentences: usize,
    pub ineligible_sentences: usize,
    pub duplicate_sentences: usize,
    pub matches: usize,
    pub collocations: usize,
    pub mwes: usize,
}

impl IngestSummary {
    fn add(&mut self, other: IngestSummary) {
        self.files += other.files;
        self.failed_files += other.failed_files;
        self.documents += other.documents;
        self.failed_documents += other.failed_documents;
        self.sentences += other.sentences;
        self.malformed_sentences += other.malformed_sentences;
        self.ineligible_sentences += other.ineligible_sentences;
        self.duplicate_sentences += other.duplicate_sentences;
    }
}

trait TsvRow: Send {
    fn write_row(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Metadata values may come from free-text comments
fn clean(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

struct CorpusFileRow {
    id: usize,
    corpus: String,
    file: String,
    document: String,
    bibl: String,
    date: String,
    textclass: String,
    avail: String,
}

impl TsvRow for CorpusFileRow {
    fn write_row(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            clean(&self.corpus),
            clean(&self.file),
            clean(&self.document),
            clean(&self.bibl),
            clean(&self.date),
            clean(&self.textclass),
            clean(&self.avail)
        )
    }
}

struct ConcordRow {
    corpus_file_id: usize,
    sentence_id: usize,
    sentence: String,
    sample_key: u32,
}

impl TsvRow for ConcordRow {
    fn write_row(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            self.corpus_file_id, self.sentence_id, self.sentence, self.sample_key
        )
    }
}

struct DuplicateRow {
    corpus_file_id: usize,
    sentence_id: usize,
    text: String,
}

impl TsvRow for DuplicateRow {
    fn write_row(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}\t{}\t{}", self.corpus_file_id, self.sentence_id, clean(&self.text))
    }
}

/// Sending halves of the output queues, one set per worker
#[derive(Clone)]
struct Outputs {
    files: Sender<CorpusFileRow>,
    concord: Sender<ConcordRow>,
    duplicates: Sender<DuplicateRow>,
    matches: Sender<SentenceMatches>,
}

fn send<T>(tx: &Sender<T>, value: T) -> Result<(), PipelineError> {
    tx.send(value).map_err(|_| PipelineError::Disconnected)
}

/// What a worker hands back when its job queue runs dry
#[derive(Default)]
struct WorkerTotal {
    summary: IngestSummary,
    token_freqs: TokenFrequencies,
}

/// State shared by all workers
struct Extraction<'a> {
    config: &'a ExtractConfig,
    extractor: Extractor<'a>,
    filter: SentenceFilter,
    duplicates: DuplicateDetector,
    next_file_id: AtomicUsize,
}

impl Extraction<'_> {
    fn work(&self, worker: usize, jobs: Receiver<PathBuf>, out: Outputs) -> Result<WorkerTotal, PipelineError> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed.wrapping_add(worker as u64));
        let mut total = WorkerTotal::default();
        while let Ok(path) = jobs.recv() {
            let reader = match CoNLLUReader::from_path(&path) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!("skipping {}: {e}", path.display());
                    total.summary.failed_files += 1;
                    continue;
                }
            };
            total.summary.files += 1;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for doc in reader {
                match doc {
                    Ok(doc) => self.document(doc, &file_name, &mut rng, &mut total, &out)?,
                    Err(e) => {
                        warn!("{}: skipping document: {e}", path.display());
                        total.summary.failed_documents += 1;
                    }
                }
            }
        }
        trace!("worker {worker} done");
        Ok(total)
    }

    fn document(
        &self,
        doc: Document,
        file_name: &str,
        rng: &mut Xoshiro256PlusPlus,
        total: &mut WorkerTotal,
        out: &Outputs,
    ) -> Result<(), PipelineError> {
        let file_id = self.next_file_id.fetch_add(1, Ordering::Relaxed) + 1;
        let meta = doc.meta;
        debug!("document {file_id}: {} ({} sentences)", meta.id, doc.sentences.len());
        total.summary.documents += 1;
        send(
            &out.files,
            CorpusFileRow {
                id: file_id,
                corpus: meta.collection.unwrap_or_else(|| self.config.corpus.clone()),
                file: file_name.to_string(),
                document: meta.id,
                bibl: meta.bibl,
                date: meta.date,
                textclass: meta.textclass,
                avail: meta.avail,
            },
        )?;

        for (sentence_id, tokens) in doc.sentences.into_iter().enumerate() {
            total.summary.sentences += 1;
            let mut sentence = match Sentence::new(tokens) {
                Ok(sentence) => sentence,
                Err(e) => {
                    warn!("document {file_id}, sentence {sentence_id}: {e}");
                    total.summary.malformed_sentences += 1;
                    continue;
                }
            };
            if let Err(reason) = self.filter.check(&sentence) {
                trace!("document {file_id}, sentence {sentence_id}: {reason}");
                total.summary.ineligible_sentences += 1;
                continue;
            }

            let encoded = concord::encode(&sentence);
            let text = concord::reconstruct(&encoded);
            if !self.duplicates.first_document(file_id, &text) {
                total.summary.duplicate_sentences += 1;
                send(
                    &out.duplicates,
                    DuplicateRow {
                        corpus_file_id: file_id,
                        sentence_id,
                        text,
                    },
                )?;
                continue;
            }
            send(
                &out.concord,
                ConcordRow {
                    corpus_file_id: file_id,
                    sentence_id,
                    sentence: encoded,
                    sample_key: rng.next_u32(),
                },
            )?;

            collapse_phrasal_verbs(&mut sentence);
            for token in sentence.tokens().iter().filter(|t| is_valid_token(t)) {
                total.token_freqs.add(token);
            }
            let matches: Vec<RawMatch> = self
                .extractor
                .unique_matches(&sentence)
                .iter()
                .filter(|m| is_valid_token(m.head) && is_valid_token(m.dependent))
                .map(RawMatch::from_match)
                .collect();
            if !matches.is_empty() {
                send(
                    &out.matches,
                    SentenceMatches {
                        corpus_file_id: file_id,
                        sentence_id,
                        matches,
                    },
                )?;
            }
        }
        Ok(())
    }
}

/// Drain a queue into a file; returns the number of rows written
fn drain<T: TsvRow>(rx: Receiver<T>, path: &Path) -> Result<usize, PipelineError> {
    let mut out = BufWriter::new(File::create(path).map_err(io_error(path))?);
    let mut rows = 0;
    for row in rx {
        row.write_row(&mut out).map_err(io_error(path))?;
        rows += 1;
    }
    out.flush().map_err(io_error(path))?;
    debug!("{}: {rows} rows", path.display());
    Ok(rows)
}

fn reduce(rx: Receiver<SentenceMatches>, out_dir: &Path, config: &ExtractConfig) -> Result<Aggregate, PipelineError> {
    let matches_path = out_dir.join(RAW_MATCHES);
    let mwe_path = out_dir.join(RAW_MWE_MATCH);
    let matches_out = BufWriter::new(File::create(&matches_path).map_err(io_error(&matches_path))?);
    let mwe_out = BufWriter::new(File::create(&mwe_path).map_err(io_error(&mwe_path))?);

    let mut aggregator = Aggregator::new(matches_out, mwe_out);
    for sentence in rx {
        aggregator
            .add_sentence(&sentence)
            .map_err(io_error(&matches_path))?;
    }
    let (aggregate, _, _) = aggregator
        .finish(config.min_rel_freq, config.min_mwe_freq)
        .map_err(io_error(&matches_path))?;
    Ok(aggregate)
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T, PipelineError>>) -> Result<T, PipelineError> {
    handle.join().map_err(|_| PipelineError::Panicked)?
}

/// Keep the most informative of several stage failures
fn first_error(errors: Vec<PipelineError>) -> Option<PipelineError> {
    let mut errors = errors.into_iter();
    let first = errors.next()?;
    if !matches!(first, PipelineError::Disconnected) {
        return Some(first);
    }
    Some(
        errors
            .find(|e| !matches!(e, PipelineError::Disconnected))
            .unwrap_or(first),
    )
}

/// Run extraction over `inputs`, writing the bulk-load files to `out_dir`
pub fn extract(
    config: &ExtractConfig,
    tables: &PatternTables,
    inputs: &[PathBuf],
    out_dir: &Path,
) -> Result<IngestSummary, PipelineError> {
    if inputs.is_empty() {
        return Err(PipelineError::NoInput);
    }
    fs::create_dir_all(out_dir).map_err(io_error(out_dir))?;
    info!(
        "extracting {} files with {} workers into {}",
        inputs.len(),
        config.workers,
        out_dir.display()
    );

    let (job_tx, job_rx) = crossbeam_channel::unbounded();
    for path in inputs {
        send(&job_tx, path.clone())?;
    }
    drop(job_tx);

    let capacity = config.queue_capacity;
    let (files_tx, files_rx) = crossbeam_channel::bounded(capacity);
    let (concord_tx, concord_rx) = crossbeam_channel::bounded(capacity);
    let (duplicates_tx, duplicates_rx) = crossbeam_channel::bounded(capacity);
    let (matches_tx, matches_rx) = crossbeam_channel::bounded(capacity);
    let outputs = Outputs {
        files: files_tx,
        concord: concord_tx,
        duplicates: duplicates_tx,
        matches: matches_tx,
    };

    let extraction = Extraction {
        config,
        extractor: Extractor::new(tables),
        filter: config.sentence_filter(),
        duplicates: DuplicateDetector::new(),
        next_file_id: AtomicUsize::new(0),
    };

    let files_path = out_dir.join(CORPUS_FILES);
    let concord_path = out_dir.join(CONCORD_SENTENCES);
    let duplicates_path = out_dir.join(DUPLICATES);

    let (totals, aggregate) = thread::scope(|scope| {
        let writers = [
            scope.spawn(|| drain(files_rx, &files_path)),
            scope.spawn(|| drain(concord_rx, &concord_path)),
            scope.spawn(|| drain(duplicates_rx, &duplicates_path)),
        ];
        let reducer = scope.spawn(|| reduce(matches_rx, out_dir, config));

        let workers: Vec<_> = (0..config.workers.max(1))
            .map(|worker| {
                let jobs = job_rx.clone();
                let out = outputs.clone();
                let extraction = &extraction;
                scope.spawn(move || extraction.work(worker, jobs, out))
            })
            .collect();
        // queues close once every worker has dropped its senders
        drop(outputs);

        let mut errors = Vec::new();
        let mut totals = WorkerTotal::default();
        for worker in workers {
            match join(worker) {
                Ok(total) => {
                    totals.summary.add(total.summary);
                    totals.token_freqs.merge(total.token_freqs);
                }
                Err(e) => errors.push(e),
            }
        }
        for writer in writers {
            if let Err(e) = join(writer) {
                errors.push(e);
            }
        }
        // a failed reducer disconnects the workers; report its own error
        match join(reducer) {
            Ok(aggregate) => match first_error(errors) {
                Some(e) => Err(e),
                None => Ok((totals, aggregate)),
            },
            Err(e) => {
                errors.push(e);
                Err(first_error(errors).unwrap_or(PipelineError::Disconnected))
            }
        }
    })?;

    let mut summary = totals.summary;
    summary.matches = write_aggregate(out_dir, &aggregate)?;
    summary.collocations = aggregate.collocations.len();
    summary.mwes = aggregate.mwes.len();

    let freqs_path = out_dir.join(TOKEN_FREQS);
    let mut out = BufWriter::new(File::create(&freqs_path).map_err(io_error(&freqs_path))?);
    totals
        .token_freqs
        .write_rows(&mut out)
        .and_then(|()| out.flush())
        .map_err(io_error(&freqs_path))?;

    info!(
        "{} documents, {} sentences ({} duplicates), {} collocations, {} mwes",
        summary.documents, summary.sentences, summary.duplicate_sentences, summary.collocations, summary.mwes
    );
    Ok(summary)
}

/// Write collocation and MWE rows and filter the raw match files down to
/// the ids that survived; returns the number of matches kept
fn write_aggregate(out_dir: &Path, aggregate: &Aggregate) -> Result<usize, PipelineError> {
    let path = out_dir.join(COLLOCATIONS);
    let mut out = BufWriter::new(File::create(&path).map_err(io_error(&path))?);
    for c in &aggregate.collocations {
        c.write_rows(&mut out).map_err(io_error(&path))?;
    }
    out.flush().map_err(io_error(&path))?;

    let path = out_dir.join(MWE);
    let mut out = BufWriter::new(File::create(&path).map_err(io_error(&path))?);
    for m in &aggregate.mwes {
        m.write_row(&mut out).map_err(io_error(&path))?;
    }
    out.flush().map_err(io_error(&path))?;

    let kept = filter_file(
        &out_dir.join(RAW_MATCHES),
        &out_dir.join(MATCHES),
        1,
        &aggregate.collocation_ids(),
    )?;
    filter_file(
        &out_dir.join(RAW_MWE_MATCH),
        &out_dir.join(MWE_MATCH),
        0,
        &aggregate.mwe_ids(),
    )?;
    Ok(kept)
}

fn filter_file(
    raw: &Path,
    path: &Path,
    column: usize,
    keep: &FxHashSet<usize>,
) -> Result<usize, PipelineError> {
    let input = BufReader::new(File::open(raw).map_err(io_error(raw))?);
    let mut out = BufWriter::new(File::create(path).map_err(io_error(path))?);
    let kept = retain_rows(input, &mut out, column, keep).map_err(io_error(path))?;
    out.flush().map_err(io_error(path))?;
    fs::remove_file(raw).map_err(io_error(raw))?;
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::default_tables;
    use tempfile::{TempDir, tempdir};

    const NEWS: &str = r#"# newdoc id = news-1
# bibl = Tagesblatt, 2. Mai 1990
# date = 1990-05-02
1	Eine	ein	DET	ART	_	3	det	_	_
2	neue	neu	ADJ	ADJA	_	3	amod	_	_
3	Zeit	Zeit	NOUN	NN	_	4	nsubj	_	_
4	begann	beginnen	VERB	VVFIN	_	0	root	_	SpaceAfter=No
5	.	.	PUNCT	$.	_	4	punct	_	_

1	Alle	alle	DET	PIAT	_	2	det	_	_
2	Rechte	Recht	NOUN	NN	_	3	nsubj:pass	_	_
3	vorbehalten	vorbehalten	VERB	VVPP	_	0	root	_	SpaceAfter=No
4	.	.	PUNCT	$.	_	3	punct	_	_

1	Schön	schön	ADJ	ADJD	_	0	root	_	_

# newdoc id = news-2
1	Die	der	DET	ART	_	2	det	_	_
2	rote	rot	ADJ	ADJA	_	3	amod	_	_
3	Zeit	Zeit	NOUN	NN	_	0	root	_	_

1	Alle	alle	DET	PIAT	_	2	det	_	_
2	Rechte	Recht	NOUN	NN	_	3	nsubj:pass	_	_
3	vorbehalten	vorbehalten	VERB	VVPP	_	0	root	_	SpaceAfter=No
4	.	.	PUNCT	$.	_	3	punct	_	_

1	Kaputt	kaputt	ADJ	ADJD	_	5	root	_	_
2	ist	sein	AUX	VAFIN	_	1	cop	_	_
3	es	es	PRON	PPER	_	1	nsubj	_	_

"#;

    fn create_test_files(contents: &[(&str, &str)]) -> (TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for (filename, content) in contents {
            let path = dir.path().join(filename);
            let mut file = File::create(&path).unwrap();
            write!(file, "{}", content).unwrap();
            paths.push(path);
        }
        (dir, paths)
    }

    fn config() -> ExtractConfig {
        ExtractConfig {
            workers: 2,
            queue_capacity: 4,
            min_rel_freq: 1,
            min_mwe_freq: 1,
            ..ExtractConfig::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_extract_writes_bulk_files() {
        let (dir, paths) = create_test_files(&[("news.conllu", NEWS)]);
        let out = dir.path().join("out");
        let tables = default_tables().unwrap();
        let summary = extract(&config(), &tables, &paths, &out).unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.sentences, 6);
        assert_eq!(summary.malformed_sentences, 1);
        assert_eq!(summary.ineligible_sentences, 1);
        assert_eq!(summary.duplicate_sentences, 1);

        let files = read_lines(&out.join(CORPUS_FILES));
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|l| l.contains("news-1\tTagesblatt, 2. Mai 1990\t1990-05-02")));

        assert_eq!(read_lines(&out.join(CONCORD_SENTENCES)).len(), 3);
        let duplicates = read_lines(&out.join(DUPLICATES));
        assert_eq!(duplicates.len(), 1);
        assert!(duplicates[0].ends_with("\tAlle Rechte vorbehalten."));

        // ATTR (Zeit, neu), SUBJA (beginnen, Zeit), SUBJP (vorbehalten, Recht), ATTR (Zeit, rot)
        let collocations = read_lines(&out.join(COLLOCATIONS));
        assert_eq!(collocations.len(), 8);
        assert_eq!(summary.collocations, 4);
        assert_eq!(summary.matches, 4);
        assert_eq!(read_lines(&out.join(MATCHES)).len(), 4);
        assert!(!out.join(RAW_MATCHES).exists());

        let freqs = read_lines(&out.join(TOKEN_FREQS));
        assert!(freqs.contains(&"Zeit\tNOUN\tZeit\t2".to_string()));
    }

    #[test]
    fn test_repeated_sentence_within_one_document() {
        let content = "# newdoc id = news-3\n\
            1\tDie\tder\tDET\tART\t_\t3\tdet\t_\t_\n\
            2\trote\trot\tADJ\tADJA\t_\t3\tamod\t_\t_\n\
            3\tZeit\tZeit\tNOUN\tNN\t_\t0\troot\t_\t_\n\
            \n\
            1\tDie\tder\tDET\tART\t_\t3\tdet\t_\t_\n\
            2\trote\trot\tADJ\tADJA\t_\t3\tamod\t_\t_\n\
            3\tZeit\tZeit\tNOUN\tNN\t_\t0\troot\t_\t_\n\
            \n";
        let (dir, paths) = create_test_files(&[("repeat.conllu", content)]);
        let out = dir.path().join("out");
        let summary = extract(&config(), &default_tables().unwrap(), &paths, &out).unwrap();

        assert_eq!(summary.sentences, 2);
        assert_eq!(summary.duplicate_sentences, 0);
        assert_eq!(summary.matches, 2);
        assert!(read_lines(&out.join(DUPLICATES)).is_empty());
        assert_eq!(read_lines(&out.join(CONCORD_SENTENCES)).len(), 2);
    }

    #[test]
    fn test_reducer_failure_is_reported() {
        let (dir, paths) = create_test_files(&[("news.conllu", NEWS)]);
        let out = dir.path().join("out");
        // a directory where the raw match file should go
        fs::create_dir_all(out.join(RAW_MATCHES)).unwrap();
        let config = ExtractConfig {
            queue_capacity: 1,
            ..config()
        };
        match extract(&config, &default_tables().unwrap(), &paths, &out) {
            Err(PipelineError::Io { path, .. }) => assert!(path.ends_with(RAW_MATCHES)),
            other => panic!("expected the reducer's I/O error, got {other:?}"),
        }
    }

    #[test]
    fn test_frequency_floor_filters_matches() {
        let (dir, paths) = create_test_files(&[("news.conllu", NEWS)]);
        let out = dir.path().join("out");
        let config = ExtractConfig {
            min_rel_freq: 2,
            ..config()
        };
        let summary = extract(&config, &default_tables().unwrap(), &paths, &out).unwrap();
        assert_eq!(summary.collocations, 0);
        assert!(read_lines(&out.join(MATCHES)).is_empty());
        assert!(read_lines(&out.join(COLLOCATIONS)).is_empty());
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let (dir, mut paths) = create_test_files(&[("news.conllu", NEWS)]);
        paths.push(dir.path().join("missing.conllu"));
        let out = dir.path().join("out");
        let summary = extract(&config(), &default_tables().unwrap(), &paths, &out).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.failed_files, 1);
        assert_eq!(summary.documents, 2);
    }

    #[test]
    fn test_input_paths() {
        let (dir, _) = create_test_files(&[("b.conllu", NEWS), ("a.conllu", NEWS), ("c.txt", "")]);
        let pattern = format!("{}/*.conllu", dir.path().display());
        let paths = input_paths(&[pattern]).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.conllu", "b.conllu"]);

        let none = format!("{}/*.xml", dir.path().display());
        assert!(matches!(input_paths(&[none]), Err(PipelineError::NoInput)));
    }
}

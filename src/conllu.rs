//! CoNLL-U file parsing
//!
//! Streams documents out of CoNLL-U files (plain or gzip-compressed).
//! A document starts at a `# newdoc` comment; document-level comments
//! (`bibl`, `date`, `textclass`, `avail`, `collection`) fill its metadata.
//! Multiword token ranges and empty nodes are skipped.
//!
//! CoNLL-U format: https://universaldependencies.org/format.html

use crate::bytes::{bs_atoi, bs_fields, bs_split_once, bs_str, bs_trim_newline};
use crate::tree::{Features, Tag, Token};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Error during CoNLL-U parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("parse error at line {line_num}: {message}")]
    Syntax { line_num: usize, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    fn syntax(line_num: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line_num,
            message: message.into(),
        }
    }
}

/// Bibliographic metadata of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: String,
    pub bibl: String,
    pub date: String,
    pub textclass: String,
    pub avail: String,
    pub collection: Option<String>,
}

/// One document: its metadata and raw token rows per sentence
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub meta: DocumentMeta,
    pub sentences: Vec<Vec<Token>>,
}

#[derive(Default)]
struct DocBuilder {
    doc: Document,
    tokens: Vec<Token>,
    error: Option<ParseError>,
    explicit: bool,
}

impl DocBuilder {
    fn flush_sentence(&mut self) {
        if !self.tokens.is_empty() {
            self.doc.sentences.push(std::mem::take(&mut self.tokens));
        }
    }

    fn is_empty(&self) -> bool {
        !self.explicit && self.doc.sentences.is_empty() && self.tokens.is_empty()
    }

    fn finish(mut self) -> Result<Document, ParseError> {
        self.flush_sentence();
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.doc),
        }
    }
}

/// CoNLL-U reader that iterates over documents
pub struct CoNLLUReader<R: BufRead> {
    reader: R,
    line_num: usize,
    buf: Vec<u8>,
    default_id: String,
    doc_count: usize,
    current: DocBuilder,
    done: bool,
}

impl CoNLLUReader<Box<dyn BufRead + Send>> {
    /// Open a file; `.gz` files are decompressed transparently
    ///
    /// Documents without a `# newdoc id` are named after the file stem.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead + Send> =
            if path.extension().is_some_and(|ext| ext == "gz") {
                Box::new(BufReader::new(MultiGzDecoder::new(file)))
            } else {
                Box::new(BufReader::new(file))
            };
        let stem = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.trim_end_matches(".gz").trim_end_matches(".conllu"))
            .unwrap_or("document");
        Ok(Self::new(reader, stem))
    }
}

impl<R: BufRead> CoNLLUReader<R> {
    pub fn new(reader: R, default_id: &str) -> Self {
        Self {
            reader,
            line_num: 0,
            buf: Vec::with_capacity(256),
            default_id: default_id.to_string(),
            doc_count: 0,
            current: DocBuilder::default(),
            done: false,
        }
    }

    fn next_id(&mut self) -> String {
        self.doc_count += 1;
        if self.doc_count == 1 {
            self.default_id.clone()
        } else {
            format!("{}-{}", self.default_id, self.doc_count)
        }
    }

    /// Finish the current document, start a new one; returns the finished one
    fn rotate(&mut self, explicit_id: Option<String>) -> Option<DocBuilder> {
        let id = match explicit_id {
            Some(id) => {
                self.doc_count += 1;
                id
            }
            None => self.next_id(),
        };
        let mut next = DocBuilder {
            explicit: true,
            ..DocBuilder::default()
        };
        next.doc.meta.id = id;
        let finished = std::mem::replace(&mut self.current, next);
        (!finished.is_empty()).then_some(finished)
    }

    fn handle_comment(&mut self, comment: &[u8]) -> Option<DocBuilder> {
        let comment = comment.trim_ascii();
        let (key, value) = match bs_split_once(comment, b'=') {
            Some((k, v)) => (k.trim_ascii(), v.trim_ascii()),
            None => (comment, &b""[..]),
        };
        let value = String::from_utf8_lossy(value).into_owned();

        if key == b"newdoc id" || key == b"newdoc" {
            self.current.flush_sentence();
            let explicit_id = (!value.is_empty()).then_some(value);
            return self.rotate(explicit_id);
        }

        let meta = &mut self.current.doc.meta;
        match key {
            b"bibl" => meta.bibl = value,
            b"date" => meta.date = value,
            b"textclass" => meta.textclass = value,
            b"avail" => meta.avail = value,
            b"collection" => meta.collection = Some(value),
            _ => {}
        }
        None
    }
}

impl<R: BufRead> Iterator for CoNLLUReader<R> {
    type Item = Result<Document, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            self.line_num += 1;
            let read = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            if read == 0 {
                self.done = true;
                let mut last = std::mem::take(&mut self.current);
                last.flush_sentence();
                if last.is_empty() {
                    return None;
                }
                if last.doc.meta.id.is_empty() {
                    last.doc.meta.id = self.next_id();
                }
                return Some(last.finish());
            }

            let line = bs_trim_newline(&self.buf).trim_ascii_end().to_vec();

            if line.is_empty() {
                self.current.flush_sentence();
                continue;
            }

            if let Some(comment) = line.strip_prefix(b"#") {
                if let Some(finished) = self.handle_comment(comment) {
                    return Some(finished.finish());
                }
                continue;
            }

            // The first document may start without a newdoc marker
            if self.current.doc.meta.id.is_empty() {
                self.current.doc.meta.id = self.next_id();
            }

            match parse_line(&line, self.line_num) {
                Ok(Some(token)) => self.current.tokens.push(token),
                Ok(None) => {}
                Err(e) => {
                    if self.current.error.is_none() {
                        self.current.error = Some(e);
                    }
                }
            }
        }
    }
}

/// Parse a single CoNLL-U token line
///
/// Returns None for multiword token ranges and empty nodes.
fn parse_line(line: &[u8], line_num: usize) -> Result<Option<Token>, ParseError> {
    let Some([id, form, lemma, upos, _xpos, feats, head, deprel, _deps, misc]) =
        bs_fields::<10>(line)
    else {
        return Err(ParseError::syntax(line_num, "expected 10 tab-separated fields"));
    };

    if id.contains(&b'-') || id.contains(&b'.') {
        return Ok(None);
    }

    let index = bs_atoi(id)
        .ok_or_else(|| ParseError::syntax(line_num, "invalid token ID"))?;
    let head = bs_atoi(head)
        .ok_or_else(|| ParseError::syntax(line_num, "invalid HEAD"))?;

    let text = |field: &[u8], name: &str| {
        bs_str(field)
            .map(str::to_string)
            .ok_or_else(|| ParseError::syntax(line_num, format!("{name} is not valid UTF-8")))
    };
    let form = text(form, "FORM")?;
    let lemma = if lemma == b"_" {
        form.clone()
    } else {
        text(lemma, "LEMMA")?
    };
    let tag = Tag::from_annotation(&text(upos, "UPOS")?);
    let deprel = text(deprel, "DEPREL")?;

    let mut token = Token::new(index, &form, &lemma, tag, head, &deprel);
    token.feats = parse_features(feats);
    token.space_after = !misc
        .split(|&b| b == b'|')
        .any(|item| item == b"SpaceAfter=No");

    Ok(Some(token))
}

/// Parse FEATS field (key=value|key=value)
fn parse_features(s: &[u8]) -> Features {
    let mut feats = Features::new();
    if s == b"_" {
        return feats;
    }
    for pair in s.split(|&b| b == b'|') {
        if let Some((key, value)) = bs_split_once(pair, b'=') {
            feats.insert(
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            );
        }
    }
    feats
}

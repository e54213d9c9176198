//! Search Index Construction and Persistence
//!
//! This module builds the inverted token-to-postings map with zone-weighted
//! scoring (the level-1 heading that supplies the title tallies in both the
//! title and heading zones) and persists it as a deterministic snapshot,
//! byte-identical across rebuilds except for the `built_at` timestamp.


use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write as _;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::diagnostics::{self, Diagnostic};
use crate::document::{Category, Document, Link};
use crate::template::TemplateKind;
use crate::{KbError, Result};

/// Bumped when the snapshot layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// Zone weights for term scoring.
const TITLE_WEIGHT: u32 = 3;
const HEADING_WEIGHT: u32 = 2;
const BODY_WEIGHT: u32 = 1;

/// One document's entry in a term's posting list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub path: String,
    /// Weighted term frequency across title, heading, and body zones.
    pub weight: u32,
    /// Indices into the document's concatenated token stream.
    pub positions: Vec<usize>,
}

/// Per-document metadata persisted alongside the postings.
///
/// Carries everything query filtering and incremental rebuilds need without
/// re-parsing the source file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    pub category: Category,
    pub tags: BTreeSet<String>,
    pub template_kind: TemplateKind,
    pub checksum: String,
    pub links: Vec<Link>,
}

impl DocumentMeta {
    #[inline]
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        Self {
            title: document.title.clone(),
            category: document.category,
            tags: document.tags.clone(),
            template_kind: document.template_kind,
            checksum: document.checksum.clone(),
            links: document.links.clone(),
        }
    }

    /// Reconstructs a skeleton document for pipeline stages that only need
    /// identity, links, and metadata. Headings and body stay empty, so the
    /// result must never be re-indexed or re-classified.
    #[inline]
    #[must_use]
    pub fn to_document(&self, path: &str) -> Document {
        Document {
            path: path.to_string(),
            title: self.title.clone(),
            category: self.category,
            tags: self.tags.clone(),
            template_kind: self.template_kind,
            headings: Vec::new(),
            links: self.links.clone(),
            body: String::new(),
            checksum: self.checksum.clone(),
        }
    }
}

/// The complete persisted state of one build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// RFC 3339 build timestamp. Excluded from idempotence comparisons.
    pub built_at: String,
    pub documents: BTreeMap<String, DocumentMeta>,
    pub postings: BTreeMap<String, Vec<Posting>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Splits text into lowercase alphanumeric tokens.
///
/// This is the single tokenizer for both indexing and queries; any change
/// here changes what matches, so the two sides can never drift apart.
/// Tokens shorter than two characters are dropped.
#[inline]
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().nth(1).is_some())
        .map(str::to_lowercase)
        .collect()
}

/// Builds a snapshot from scratch.
#[inline]
#[must_use]
pub fn build(documents: &[Document], diagnostics: Vec<Diagnostic>) -> Snapshot {
    let per_document: Vec<(&str, BTreeMap<String, (u32, Vec<usize>)>)> = documents
        .par_iter()
        .map(|document| (document.path.as_str(), document_postings(document)))
        .collect();

    assemble(documents, merge(per_document), diagnostics)
}

/// Builds a snapshot reusing posting lists from `previous` for every path in
/// `carried`.
///
/// `documents` must contain one entry per corpus file: freshly parsed ones
/// for changed files and [`DocumentMeta::to_document`] skeletons for carried
/// ones. Files present in `previous` but absent here simply drop out.
#[inline]
#[must_use]
pub fn build_incremental(
    documents: &[Document],
    previous: &Snapshot,
    carried: &BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
) -> Snapshot {
    let fresh: Vec<&Document> = documents
        .iter()
        .filter(|document| !carried.contains(&document.path))
        .collect();
    let per_document: Vec<(&str, BTreeMap<String, (u32, Vec<usize>)>)> = fresh
        .par_iter()
        .map(|document| (document.path.as_str(), document_postings(document)))
        .collect();

    let mut postings = merge(per_document);
    for (term, list) in &previous.postings {
        for posting in list {
            if carried.contains(&posting.path) {
                postings
                    .entry(term.clone())
                    .or_default()
                    .push(posting.clone());
            }
        }
    }

    debug!(
        carried = carried.len(),
        reparsed = fresh.len(),
        "assembled incremental index"
    );
    assemble(documents, postings, diagnostics)
}

impl Snapshot {
    /// Writes the snapshot as pretty-printed JSON via a temporary file in
    /// the same directory followed by an atomic rename, so readers never
    /// observe a half-written index.
    #[inline]
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| KbError::Snapshot(format!("failed to serialize index: {err}")))?;

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(directory)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.persist(path).map_err(|err| KbError::Io(err.error))?;

        debug!(path = %path.display(), "wrote index snapshot");
        Ok(())
    }

    /// Reads and version-checks a snapshot.
    #[inline]
    pub fn read(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(KbError::IndexMissing(path.display().to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let snapshot: Self = serde_json::from_str(&raw).map_err(|err| {
            KbError::Snapshot(format!("failed to parse {}: {err}", path.display()))
        })?;
        if snapshot.version != FORMAT_VERSION {
            return Err(KbError::Snapshot(format!(
                "unsupported index version {} (expected {FORMAT_VERSION}); run 'kb-index build' to regenerate",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Number of distinct indexed terms.
    #[inline]
    #[must_use]
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Total posting entries across all terms.
    #[inline]
    #[must_use]
    pub fn posting_count(&self) -> usize {
        self.postings.values().map(Vec::len).sum()
    }
}

/// Weighted term entries for one document, keyed by token.
fn document_postings(document: &Document) -> BTreeMap<String, (u32, Vec<usize>)> {
    let title_tokens = tokenize(&document.title);
    let heading_tokens: Vec<String> = document
        .headings
        .iter()
        .flat_map(|heading| tokenize(&heading.text))
        .collect();
    let body_tokens = tokenize(&document.body);

    let mut entries: BTreeMap<String, (u32, Vec<usize>)> = BTreeMap::new();
    let mut position = 0_usize;
    let zones = [
        (&title_tokens, TITLE_WEIGHT),
        (&heading_tokens, HEADING_WEIGHT),
        (&body_tokens, BODY_WEIGHT),
    ];
    for (tokens, zone_weight) in zones {
        for token in tokens {
            let entry = entries.entry(token.clone()).or_default();
            entry.0 += zone_weight;
            entry.1.push(position);
            position += 1;
        }
    }
    entries
}

fn merge(
    per_document: Vec<(&str, BTreeMap<String, (u32, Vec<usize>)>)>,
) -> BTreeMap<String, Vec<Posting>> {
    let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
    for (path, entries) in per_document {
        for (term, (weight, positions)) in entries {
            postings.entry(term).or_default().push(Posting {
                path: path.to_string(),
                weight,
                positions,
            });
        }
    }
    postings
}

/// Final ordering pass and snapshot assembly.
fn assemble(
    documents: &[Document],
    mut postings: BTreeMap<String, Vec<Posting>>,
    mut diagnostics: Vec<Diagnostic>,
) -> Snapshot {
    for list in postings.values_mut() {
        list.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.path.cmp(&b.path)));
    }
    diagnostics::sort(&mut diagnostics);

    let documents: BTreeMap<String, DocumentMeta> = documents
        .iter()
        .map(|document| (document.path.clone(), DocumentMeta::from_document(document)))
        .collect();

    Snapshot {
        version: FORMAT_VERSION,
        built_at: chrono::Utc::now().to_rfc3339(),
        documents,
        postings,
        diagnostics,
    }
}

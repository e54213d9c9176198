// Corpus module
// This module handles markdown discovery and the parallel parse stage


use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::Config;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::document::{self, Category, Document};
use crate::{KbError, Result};

/// One markdown file found by the walker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path used for reading.
    pub absolute: PathBuf,
    /// Corpus-relative path with forward slashes, the document identity.
    pub relative: String,
}

/// Finds every markdown file under `root`, sorted by relative path.
#[inline]
pub fn discover(root: &Path, config: &Config) -> Result<Vec<CandidateFile>> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in &config.corpus.exclude {
        overrides
            .add(&format!("!{pattern}"))
            .map_err(|err| KbError::Config(format!("bad exclude pattern `{pattern}`: {err}")))?;
    }
    let overrides = overrides
        .build()
        .map_err(|err| KbError::Config(format!("failed to compile exclude patterns: {err}")))?;

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .require_git(false)
        .follow_links(false)
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable directory entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|file_type| !file_type.is_dir()) {
            continue;
        }
        let path = entry.path();
        if !has_markdown_extension(path) {
            continue;
        }
        let Ok(stripped) = path.strip_prefix(root) else {
            continue;
        };
        let Some(relative) = normalize_relative(stripped) else {
            warn!("skipping non-UTF-8 path {}", path.display());
            continue;
        };
        files.push(CandidateFile {
            absolute: path.to_path_buf(),
            relative,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    debug!(count = files.len(), "discovered markdown files");
    Ok(files)
}

/// Reads and parses candidates in parallel, preserving input order.
///
/// An unreadable file becomes an error-severity `parse-warning` for that
/// path; it never aborts the rest of the corpus.
#[inline]
#[must_use]
pub fn parse_files(
    files: &[CandidateFile],
    progress: Option<&ProgressBar>,
) -> (Vec<Document>, Vec<Diagnostic>) {
    let parsed: Vec<(Option<Document>, Vec<Diagnostic>)> = files
        .par_iter()
        .map(|file| {
            let outcome = match fs::read(&file.absolute) {
                Ok(bytes) => {
                    let (document, diagnostics) = document::parse(&file.relative, &bytes);
                    (Some(document), diagnostics)
                }
                Err(err) => (
                    None,
                    vec![Diagnostic::error(
                        DiagnosticKind::ParseWarning,
                        file.relative.clone(),
                        format!("failed to read file: {err}"),
                    )],
                ),
            };
            if let Some(bar) = progress {
                bar.inc(1);
            }
            outcome
        })
        .collect();

    let mut documents = Vec::with_capacity(files.len());
    let mut diagnostics = Vec::new();
    for (document, file_diagnostics) in parsed {
        diagnostics.extend(file_diagnostics);
        if let Some(document) = document {
            documents.push(document);
        }
    }
    (documents, diagnostics)
}

/// Reports documents under top-level folders outside the known category set
/// and not listed in `corpus.extra_categories`.
#[inline]
#[must_use]
pub fn unknown_categories(documents: &[Document], config: &Config) -> Vec<Diagnostic> {
    documents
        .iter()
        .filter_map(|document| {
            let (_, folder) = Category::infer(&document.path);
            let folder = folder.filter(|name| !config.is_known_extra_category(name))?;
            Some(Diagnostic::warning(
                DiagnosticKind::ParseWarning,
                document.path.clone(),
                format!("unknown category folder `{folder}`, document categorized as `other`"),
            ))
        })
        .collect()
}

/// Flags documents sharing a title within one category.
///
/// Comparison is case-insensitive. The first document in path order keeps
/// the title unchallenged; every later one is reported against it.
#[inline]
#[must_use]
pub fn duplicate_titles(documents: &[Document]) -> Vec<Diagnostic> {
    let mut groups: BTreeMap<(Category, String), Vec<&Document>> = BTreeMap::new();
    for document in documents {
        groups
            .entry((document.category, document.title.to_lowercase()))
            .or_default()
            .push(document);
    }

    let mut diagnostics = Vec::new();
    for group in groups.values() {
        let Some((first, rest)) = group.split_first() else {
            continue;
        };
        for duplicate in rest {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::DuplicateTitle,
                duplicate.path.clone(),
                format!(
                    "title \"{}\" is already used by `{}` in the same category",
                    duplicate.title, first.path
                ),
            ));
        }
    }
    diagnostics
}

/// Full corpus load: discovery, parallel parse, and per-corpus checks.
#[inline]
pub fn load(
    root: &Path,
    config: &Config,
    progress: Option<&ProgressBar>,
) -> Result<(Vec<Document>, Vec<Diagnostic>)> {
    let files = discover(root, config)?;
    if let Some(bar) = progress {
        bar.set_length(files.len() as u64);
    }

    let (documents, mut diagnostics) = parse_files(&files, progress);
    diagnostics.extend(unknown_categories(&documents, config));
    diagnostics.extend(duplicate_titles(&documents));

    debug!(
        documents = documents.len(),
        diagnostics = diagnostics.len(),
        "corpus loaded"
    );
    Ok((documents, diagnostics))
}

fn has_markdown_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Converts a root-relative path into the forward-slash form used as the
/// document identity. Rejects non-UTF-8 and non-normal components.
fn normalize_relative(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

//! Query Execution
//!
//! This module runs searches against a loaded snapshot: query text goes
//! through the indexing tokenizer, scores sum the matched posting weights,
//! and category, tag, and template filters apply after scoring. Ordering is
//! descending score, then lexicographic path.


use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::document::{self, Category};
use crate::index::{DocumentMeta, Snapshot, tokenize};
use crate::template::TemplateKind;

/// Longest snippet returned with a result, in characters.
const SNIPPET_MAX_CHARS: usize = 160;

/// Optional result filters, applied after scoring.
#[derive(Clone, Debug, Default)]
pub struct SearchFilters {
    /// Keep only documents in this category (name compared case-insensitively).
    pub category: Option<String>,
    /// Keep only documents carrying this tag (case-insensitive).
    pub tag: Option<String>,
    /// Keep only documents of this template kind.
    pub template_kind: Option<TemplateKind>,
}

/// One search hit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedResult {
    pub path: String,
    pub title: String,
    pub category: Category,
    pub template_kind: TemplateKind,
    pub score: u32,
    pub snippet: String,
}

/// Runs a query against the snapshot.
///
/// `root` is the corpus root, used only to re-read matching files for
/// snippets; a file that has vanished since the build yields an empty
/// snippet rather than an error.
#[inline]
#[must_use]
pub fn search(
    snapshot: &Snapshot,
    root: &Path,
    text: &str,
    filters: &SearchFilters,
    limit: usize,
) -> Vec<RankedResult> {
    // Duplicate query tokens collapse so they cannot double-score.
    let tokens: BTreeSet<String> = tokenize(text).into_iter().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scores: BTreeMap<&str, u32> = BTreeMap::new();
    let mut matched: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for token in &tokens {
        let Some(list) = snapshot.postings.get(token.as_str()) else {
            continue;
        };
        for posting in list {
            *scores.entry(posting.path.as_str()).or_insert(0) += posting.weight;
            matched
                .entry(posting.path.as_str())
                .or_default()
                .insert(token.as_str());
        }
    }

    let mut ranked: Vec<(&str, u32)> = scores
        .into_iter()
        .filter(|(path, _)| {
            snapshot
                .documents
                .get(*path)
                .is_some_and(|meta| passes_filters(meta, filters))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(limit);

    debug!(query = text, hits = ranked.len(), "query executed");

    ranked
        .into_iter()
        .filter_map(|(path, score)| {
            let meta = snapshot.documents.get(path)?;
            let matched_tokens = matched.get(path).cloned().unwrap_or_default();
            Some(RankedResult {
                path: path.to_string(),
                title: meta.title.clone(),
                category: meta.category,
                template_kind: meta.template_kind,
                score,
                snippet: snippet_for(root, path, &matched_tokens),
            })
        })
        .collect()
}

fn passes_filters(meta: &DocumentMeta, filters: &SearchFilters) -> bool {
    if let Some(category) = &filters.category {
        if !meta.category.as_str().eq_ignore_ascii_case(category) {
            return false;
        }
    }
    if let Some(tag) = &filters.tag {
        if !meta.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }
    }
    if let Some(kind) = filters.template_kind {
        if meta.template_kind != kind {
            return false;
        }
    }
    true
}

/// Picks the first body sentence containing a matched token, falling back
/// to the document's first sentence.
fn snippet_for(root: &Path, path: &str, matched: &BTreeSet<&str>) -> String {
    let Ok(raw) = fs::read_to_string(root.join(path)) else {
        return String::new();
    };
    let body = document::body_text(&raw);
    let sentences = split_sentences(&body);

    let with_match = sentences.iter().find(|sentence| {
        tokenize(sentence)
            .iter()
            .any(|token| matched.contains(token.as_str()))
    });
    with_match
        .or_else(|| sentences.first())
        .map(|sentence| clip(sentence))
        .unwrap_or_default()
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c: char| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

fn clip(sentence: &str) -> String {
    let mut out: String = sentence.chars().take(SNIPPET_MAX_CHARS).collect();
    if sentence.chars().nth(SNIPPET_MAX_CHARS).is_some() {
        out.push('…');
    }
    out
}

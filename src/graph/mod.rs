
use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::document::Document;

/// The resolved link structure of the corpus.
///
/// Edges are kept per link occurrence, so two links from `a.md` to `b.md`
/// contribute two edges and an in-degree of two.
#[derive(Clone, Debug, Default)]
pub struct CorpusGraph {
    nodes: BTreeSet<String>,
    edges: Vec<(String, String)>,
    in_degree: BTreeMap<String, usize>,
}

impl CorpusGraph {
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Directed `(from, to)` pairs in document order.
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Number of links pointing at `path`. Unknown paths report zero.
    #[inline]
    #[must_use]
    pub fn in_degree(&self, path: &str) -> usize {
        self.in_degree.get(path).copied().unwrap_or(0)
    }
}

/// Resolves every internal link and assembles the graph.
///
/// Resolution is purely lexical and case-sensitive against the corpus path
/// set. Fills in [`crate::document::Link::resolved`] on each document as a
/// side effect so the persisted metadata records where links landed.
#[inline]
pub fn build(documents: &mut [Document]) -> (CorpusGraph, Vec<Diagnostic>) {
    let nodes: BTreeSet<String> = documents.iter().map(|d| d.path.clone()).collect();
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut diagnostics = Vec::new();

    for document in documents.iter_mut() {
        let from_dir = parent_dir(&document.path);
        for link in &mut document.links {
            link.resolved = None;
            let Some(base) = strip_fragment(&link.target) else {
                // Pure fragment, a reference within the same document.
                continue;
            };
            if is_external(base) {
                continue;
            }

            let resolved = match base.strip_prefix('/') {
                Some(rooted) => resolve_segments("", rooted),
                None => resolve_segments(from_dir, base),
            };
            match resolved {
                Some(target) if nodes.contains(&target) => {
                    edges.push((document.path.clone(), target.clone()));
                    link.resolved = Some(target);
                }
                _ => {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::BrokenLink,
                            document.path.clone(),
                            format!(
                                "link \"{}\" points to `{}` which is not in the corpus",
                                link.text, link.target
                            ),
                        )
                        .with_line(link.line),
                    );
                }
            }
        }
    }

    let mut in_degree: BTreeMap<String, usize> =
        nodes.iter().map(|node| (node.clone(), 0)).collect();
    for (_, to) in &edges {
        if let Some(count) = in_degree.get_mut(to.as_str()) {
            *count += 1;
        }
    }

    for node in &nodes {
        let inbound = in_degree.get(node).copied().unwrap_or(0);
        if inbound == 0 && !is_entry_point(node) {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::OrphanDocument,
                node.clone(),
                "document has no inbound links",
            ));
        }
    }

    (
        CorpusGraph {
            nodes,
            edges,
            in_degree,
        },
        diagnostics,
    )
}

/// `README.md` files are navigation entry points and may legitimately have
/// no inbound links.
fn is_entry_point(path: &str) -> bool {
    file_name(path) == "README.md"
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Drops a `#fragment` suffix. Returns `None` when nothing remains, which
/// happens for same-document anchors like `#setup`.
fn strip_fragment(target: &str) -> Option<&str> {
    let base = target.split('#').next().unwrap_or(target);
    if base.is_empty() { None } else { Some(base) }
}

/// True for targets with a URL scheme (`https:`, `mailto:`) or a
/// protocol-relative `//host` prefix.
fn is_external(target: &str) -> bool {
    if target.starts_with("//") {
        return true;
    }
    match target.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Folds `.` and `..` segments of `target` against `from_dir`. Returns
/// `None` when `..` would escape the corpus root.
fn resolve_segments(from_dir: &str, target: &str) -> Option<String> {
    let mut parts: Vec<&str> = if from_dir.is_empty() {
        Vec::new()
    } else {
        from_dir.split('/').collect()
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

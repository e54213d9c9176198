// Commands module
// Content problems travel as diagnostics inside the returned RunSummary;
// Err is reserved for operational failures

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools as _;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::{self, CandidateFile};
use crate::diagnostics::{self, Diagnostic, DiagnosticKind};
use crate::document::{self, Document};
use crate::graph;
use crate::index::{self, Snapshot};
use crate::query::{self, SearchFilters};
use crate::template;

/// Diagnostic counts of one build or validate run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub errors: usize,
    pub warnings: usize,
}

impl RunSummary {
    #[inline]
    #[must_use]
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let (errors, warnings) = diagnostics::count(diagnostics);
        Self { errors, warnings }
    }

    /// Exit code contract: 0 clean, 1 when any error-severity diagnostic
    /// was found. Operational failures exit 2 and never reach this point.
    #[inline]
    #[must_use]
    pub fn exit_code(self) -> u8 {
        u8::from(self.errors > 0)
    }
}

/// Build the search index snapshot for a corpus.
#[inline]
pub fn build(root: &Path, incremental: bool, output: Option<PathBuf>) -> Result<RunSummary> {
    let started = Instant::now();
    if !root.is_dir() {
        bail!("corpus root {} is not a directory", root.display());
    }
    let config = Config::load(root)?;
    let snapshot_path = resolve_snapshot_path(root, &config, output);

    // A previous snapshot is only consulted when asked for and only if it
    // loads cleanly; anything else falls back to a full build.
    let previous = if incremental {
        match Snapshot::read(&snapshot_path) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("incremental build requested but previous index is unusable: {err}");
                None
            }
        }
    } else {
        None
    };

    info!("building index for {}", root.display());
    let bar = progress_bar();
    let snapshot = match previous {
        Some(previous) => incremental_snapshot(root, &config, &previous, &bar)?,
        None => full_snapshot(root, &config, &bar)?,
    };
    bar.finish_and_clear();

    snapshot.write(&snapshot_path)?;

    print!("{}", diagnostics::render_report(&snapshot.diagnostics));
    println!(
        "Indexed {} documents, {} terms in {:.2?}",
        snapshot.documents.len(),
        snapshot.term_count(),
        started.elapsed()
    );
    println!("Index written to {}", snapshot_path.display());

    Ok(RunSummary::from_diagnostics(&snapshot.diagnostics))
}

/// Check corpus integrity without writing an index.
#[inline]
pub fn validate(root: &Path) -> Result<RunSummary> {
    if !root.is_dir() {
        bail!("corpus root {} is not a directory", root.display());
    }
    let config = Config::load(root)?;

    info!("validating corpus at {}", root.display());
    let bar = progress_bar();
    let (mut documents, mut diagnostics) = corpus::load(root, &config, Some(&bar))?;
    diagnostics.extend(template::check(&mut documents));
    let (_, graph_diagnostics) = graph::build(&mut documents);
    diagnostics.extend(graph_diagnostics);
    diagnostics::sort(&mut diagnostics);
    bar.finish_and_clear();

    if diagnostics.is_empty() {
        println!(
            "{} {} documents checked, no integrity findings",
            style("✓").green(),
            documents.len()
        );
    } else {
        print!("{}", diagnostics::render_report(&diagnostics));
    }

    Ok(RunSummary::from_diagnostics(&diagnostics))
}

/// Search the built index.
#[inline]
pub fn run_query(
    root: &Path,
    text: &str,
    filters: &SearchFilters,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = Config::load(root)?;
    let snapshot = Snapshot::read(&root.join(&config.index.file_name))?;

    let limit = limit.unwrap_or(config.search.default_limit);
    let results = query::search(&snapshot, root, text, filters, limit);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No results for \"{text}\".");
        return Ok(());
    }

    println!(
        "Results for \"{text}\" ({} hit{}):",
        results.len(),
        if results.len() == 1 { "" } else { "s" }
    );
    println!();
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. {} {}",
            rank + 1,
            style(&result.title).bold(),
            style(format!("({})", result.path)).dim()
        );
        println!(
            "    score {}  category {}  template {}",
            result.score,
            result.category.as_str(),
            result.template_kind
        );
        if !result.snippet.is_empty() {
            println!("    {}", result.snippet);
        }
    }

    Ok(())
}

/// Show statistics about the built index.
#[inline]
pub fn stats(root: &Path) -> Result<()> {
    let config = Config::load(root)?;
    let snapshot = Snapshot::read(&root.join(&config.index.file_name))?;

    let cross_references: usize = snapshot
        .documents
        .values()
        .map(|meta| meta.links.iter().filter(|link| link.resolved.is_some()).count())
        .sum();

    println!("{}", style("Index statistics").bold());
    println!("  Built at:         {}", snapshot.built_at);
    println!("  Documents:        {}", snapshot.documents.len());
    println!("  Distinct terms:   {}", snapshot.term_count());
    println!("  Postings:         {}", snapshot.posting_count());
    println!("  Cross-references: {cross_references}");

    let (errors, warnings) = diagnostics::count(&snapshot.diagnostics);
    println!("  Diagnostics:      {errors} errors, {warnings} warnings");

    let by_category = snapshot
        .documents
        .values()
        .counts_by(|meta| meta.category);
    println!();
    println!("{}", style("Documents by category").bold());
    for (category, count) in by_category.into_iter().sorted() {
        println!("  {:<16} {count}", category.as_str());
    }

    let by_template = snapshot
        .documents
        .values()
        .counts_by(|meta| meta.template_kind);
    println!();
    println!("{}", style("Documents by template").bold());
    for (kind, count) in by_template.into_iter().sorted() {
        println!("  {:<16} {count}", kind.as_str());
    }

    let top_terms: Vec<(&str, usize)> = snapshot
        .postings
        .iter()
        .map(|(term, list)| (term.as_str(), list.len()))
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(10)
        .collect();
    if !top_terms.is_empty() {
        println!();
        println!("{}", style("Most common terms").bold());
        for (term, document_count) in top_terms {
            println!("  {term:<16} {document_count} documents");
        }
    }

    Ok(())
}

/// Full pipeline: load, classify, resolve, index.
fn full_snapshot(root: &Path, config: &Config, bar: &ProgressBar) -> Result<Snapshot> {
    let (mut documents, mut diagnostics) = corpus::load(root, config, Some(bar))?;
    diagnostics.extend(template::check(&mut documents));
    let (_, graph_diagnostics) = graph::build(&mut documents);
    diagnostics.extend(graph_diagnostics);
    Ok(index::build(&documents, diagnostics))
}

/// Per-file outcome of the incremental scan.
enum Scanned {
    Carried(String),
    Fresh(Box<Document>, Vec<Diagnostic>),
    Unreadable(Diagnostic),
}

/// Incremental pipeline: re-parse only files whose checksum moved, carry
/// postings and file-scoped diagnostics for the rest, and recompute every
/// cross-document check against the current path set.
fn incremental_snapshot(
    root: &Path,
    config: &Config,
    previous: &Snapshot,
    bar: &ProgressBar,
) -> Result<Snapshot> {
    let files = corpus::discover(root, config)?;
    bar.set_length(files.len() as u64);

    let scanned: Vec<Scanned> = files
        .par_iter()
        .map(|file| {
            let outcome = scan_file(file, previous);
            bar.inc(1);
            outcome
        })
        .collect();

    let mut fresh: Vec<Document> = Vec::new();
    let mut carried: BTreeSet<String> = BTreeSet::new();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    for entry in scanned {
        match entry {
            Scanned::Carried(path) => {
                carried.insert(path);
            }
            Scanned::Fresh(document, file_diagnostics) => {
                diagnostics.extend(file_diagnostics);
                fresh.push(*document);
            }
            Scanned::Unreadable(diagnostic) => diagnostics.push(diagnostic),
        }
    }
    info!(
        carried = carried.len(),
        reparsed = fresh.len(),
        "incremental scan complete"
    );

    // Fresh files get the full per-file treatment; carried ones keep their
    // file-scoped findings from the previous run.
    diagnostics.extend(corpus::unknown_categories(&fresh, config));
    diagnostics.extend(template::check(&mut fresh));
    diagnostics.extend(previous.diagnostics.iter().filter(|diagnostic| {
        carried.contains(&diagnostic.path)
            && matches!(
                diagnostic.kind,
                DiagnosticKind::ParseWarning | DiagnosticKind::TemplateMismatch
            )
    }).cloned());

    let mut documents: Vec<Document> = carried
        .iter()
        .filter_map(|path| {
            previous
                .documents
                .get(path)
                .map(|meta| meta.to_document(path))
        })
        .chain(fresh)
        .collect();
    documents.sort_by(|a, b| a.path.cmp(&b.path));

    // Cross-document checks always run against the current corpus.
    diagnostics.extend(corpus::duplicate_titles(&documents));
    let (_, graph_diagnostics) = graph::build(&mut documents);
    diagnostics.extend(graph_diagnostics);

    Ok(index::build_incremental(
        &documents, previous, &carried, diagnostics,
    ))
}

fn scan_file(file: &CandidateFile, previous: &Snapshot) -> Scanned {
    match fs::read(&file.absolute) {
        Ok(bytes) => {
            let unchanged = previous
                .documents
                .get(&file.relative)
                .is_some_and(|meta| meta.checksum == document::checksum_hex(&bytes));
            if unchanged {
                Scanned::Carried(file.relative.clone())
            } else {
                let (parsed, file_diagnostics) = document::parse(&file.relative, &bytes);
                Scanned::Fresh(Box::new(parsed), file_diagnostics)
            }
        }
        Err(err) => Scanned::Unreadable(Diagnostic::error(
            DiagnosticKind::ParseWarning,
            file.relative.clone(),
            format!("failed to read file: {err}"),
        )),
    }
}

fn resolve_snapshot_path(root: &Path, config: &Config, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| root.join(&config.index.file_name))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:32} {pos}/{len} {msg}")
            .expect("progress template should be valid"),
    );
    bar
}

#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for the build, validate, and query pipelines
//!
//! These tests write real markdown corpora to temporary directories and
//! drive the same command functions the binary dispatches to, verifying:
//! - The full acceptance scenario: link resolution, broken links, orphan
//!   detection, and ranked search over one corpus
//! - Idempotent rebuilds (byte-identical snapshots apart from the timestamp)
//! - Incremental builds producing the same snapshot as a full build
//! - Tokenizer symmetry between indexing and querying
//! - Exit-code mapping from diagnostic severities

use std::fs;
use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;

use kb_index::commands::{build, validate};
use kb_index::config::Config;
use kb_index::corpus;
use kb_index::diagnostics::{DiagnosticKind, Severity};
use kb_index::graph;
use kb_index::index::Snapshot;
use kb_index::query::{SearchFilters, search};
use kb_index::template::TemplateKind;

/// Write a markdown file under `root`, creating parent folders as needed.
fn write_doc(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("should create parent directories");
    }
    fs::write(path, content).expect("should write markdown file");
}

/// The three-file corpus from the acceptance scenario: `a.md` links to
/// `b.md`, `b.md` links nowhere, `c.md` links to a file that does not exist.
/// Only `b.md` repeats "guide" in its body, so it outranks the others when
/// searching for its title.
fn scenario_corpus() -> TempDir {
    let dir = TempDir::new().expect("should create temp dir");
    write_doc(
        dir.path(),
        "a.md",
        "# Guide A\n\nStart here, then read [the second part](b.md) for details.\n",
    );
    write_doc(
        dir.path(),
        "b.md",
        "# Guide B\n\nThis guide covers standalone reference builds.\n",
    );
    write_doc(
        dir.path(),
        "c.md",
        "# Guide C\n\nThis [pointer](missing.md) goes nowhere.\n",
    );
    dir
}

/// Parse a written snapshot file and drop the build timestamp so two builds
/// of the same corpus can be compared field by field.
fn snapshot_without_timestamp(path: &Path) -> Value {
    let raw = fs::read_to_string(path).expect("should read snapshot file");
    let mut value: Value = serde_json::from_str(&raw).expect("snapshot should be valid JSON");
    let object = value.as_object_mut().expect("snapshot should be an object");
    object
        .remove("built_at")
        .expect("snapshot should carry a build timestamp");
    value
}

#[test]
fn acceptance_scenario_diagnostics_and_ranking() {
    let dir = scenario_corpus();
    let summary = build(dir.path(), false, None).expect("build should succeed");

    // One broken link error; a.md and c.md have no inbound links.
    assert_eq!(summary.errors, 1, "should report exactly one error");
    assert_eq!(summary.warnings, 2, "should report two orphan warnings");

    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");

    let broken: Vec<_> = snapshot
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::BrokenLink)
        .collect();
    assert_eq!(broken.len(), 1, "should have one broken link diagnostic");
    assert_eq!(broken[0].path, "c.md");
    assert_eq!(broken[0].severity, Severity::Error);
    assert!(
        broken[0].message.contains("missing.md"),
        "message should name the unresolved target: {}",
        broken[0].message
    );

    let orphans: Vec<&str> = snapshot
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::OrphanDocument)
        .map(|d| d.path.as_str())
        .collect();
    assert_eq!(orphans, ["a.md", "c.md"], "b.md has an inbound link");

    // The link from a.md resolved to b.md and was persisted that way.
    let a_meta = snapshot
        .documents
        .get("a.md")
        .expect("a.md should be indexed");
    assert_eq!(a_meta.links.len(), 1);
    assert_eq!(a_meta.links[0].resolved.as_deref(), Some("b.md"));

    let results = search(
        &snapshot,
        dir.path(),
        "Guide B",
        &SearchFilters::default(),
        10,
    );
    assert_eq!(results.len(), 3, "every title matches the guide token");
    assert_eq!(
        results[0].path, "b.md",
        "the document titled Guide B should rank first"
    );
    assert_eq!(results[0].title, "Guide B");
}

#[test]
fn graph_edges_and_in_degrees_for_scenario() {
    let dir = scenario_corpus();
    let config = Config::load(dir.path()).expect("should load default config");
    let (mut documents, _) =
        corpus::load(dir.path(), &config, None).expect("should load the corpus");
    let (corpus_graph, _) = graph::build(&mut documents);

    assert_eq!(corpus_graph.node_count(), 3);
    assert_eq!(
        corpus_graph.edges(),
        [("a.md".to_string(), "b.md".to_string())],
        "only the a.md link resolves"
    );
    assert_eq!(corpus_graph.in_degree("b.md"), 1);
    assert_eq!(corpus_graph.in_degree("a.md"), 0);
    assert_eq!(corpus_graph.in_degree("c.md"), 0);
}

#[test]
fn creating_the_missing_target_clears_the_broken_link() {
    let dir = scenario_corpus();

    let summary = build(dir.path(), false, None).expect("first build should succeed");
    assert_eq!(summary.errors, 1);

    write_doc(
        dir.path(),
        "missing.md",
        "# Found\n\nThe target now exists.\n",
    );
    let summary = build(dir.path(), false, None).expect("rebuild should succeed");
    assert_eq!(summary.errors, 0, "the former broken link now resolves");

    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");
    assert!(
        snapshot
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::BrokenLink),
        "no broken link diagnostics should remain"
    );
    assert!(
        snapshot
            .diagnostics
            .iter()
            .all(|d| d.path != "missing.md" || d.kind != DiagnosticKind::OrphanDocument),
        "missing.md gained an inbound link from c.md"
    );
}

#[test]
fn rebuild_is_idempotent_apart_from_timestamp() {
    let dir = scenario_corpus();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    build(dir.path(), false, Some(first.clone())).expect("first build should succeed");
    build(dir.path(), false, Some(second.clone())).expect("second build should succeed");

    assert_eq!(
        snapshot_without_timestamp(&first),
        snapshot_without_timestamp(&second),
        "unchanged corpus should rebuild to an identical snapshot"
    );
}

#[test]
fn incremental_build_matches_full_rebuild() {
    let dir = scenario_corpus();
    build(dir.path(), false, None).expect("initial build should succeed");

    // Change one file, leave the others untouched.
    write_doc(
        dir.path(),
        "b.md",
        "# Guide B\n\nRewritten content about deployment pipelines.\n",
    );

    build(dir.path(), true, None).expect("incremental build should succeed");
    let full = dir.path().join("full.json");
    build(dir.path(), false, Some(full.clone())).expect("full rebuild should succeed");

    assert_eq!(
        snapshot_without_timestamp(&dir.path().join("index.json")),
        snapshot_without_timestamp(&full),
        "incremental and full builds should agree on every field"
    );
}

#[test]
fn incremental_without_previous_snapshot_falls_back_to_full() {
    let dir = scenario_corpus();
    let summary = build(dir.path(), true, None).expect("build should fall back to full");
    assert_eq!(summary.errors, 1);
    assert!(dir.path().join("index.json").is_file());
}

#[test]
fn tokenizer_symmetry_across_cases() {
    let dir = TempDir::new().expect("should create temp dir");
    write_doc(
        dir.path(),
        "react/memoization.md",
        "# Memoization Guide\n\nCache derived values between renders.\n",
    );
    write_doc(
        dir.path(),
        "README.md",
        "# Index\n\nSee [memoization](react/memoization.md).\n",
    );
    build(dir.path(), false, None).expect("build should succeed");
    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");

    for query in ["memoization", "MEMOIZATION", "Memoization"] {
        let results = search(&snapshot, dir.path(), query, &SearchFilters::default(), 10);
        assert!(
            results.iter().any(|r| r.path == "react/memoization.md"),
            "query {query} should find the document titled with that term"
        );
    }
}

#[test]
fn title_match_outranks_body_match() {
    let dir = TempDir::new().expect("should create temp dir");
    write_doc(
        dir.path(),
        "README.md",
        "# Index\n\n[one](titled.md) [two](untitled.md)\n",
    );
    write_doc(
        dir.path(),
        "titled.md",
        "# Debouncing\n\nShared prose for both documents.\n",
    );
    write_doc(
        dir.path(),
        "untitled.md",
        "# Something Else\n\nShared prose about debouncing for both documents.\n",
    );
    build(dir.path(), false, None).expect("build should succeed");
    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");

    let results = search(
        &snapshot,
        dir.path(),
        "debouncing",
        &SearchFilters::default(),
        10,
    );
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].path, "titled.md");
    assert!(
        results[0].score > results[1].score,
        "title occurrence should outweigh body occurrence"
    );
}

#[test]
fn category_and_kind_filters_restrict_results() {
    let dir = TempDir::new().expect("should create temp dir");
    write_doc(
        dir.path(),
        "README.md",
        "# Index\n\n[hooks](react/hooks.md) [mocks](testing/mocks.md)\n",
    );
    write_doc(
        dir.path(),
        "react/hooks.md",
        "# Hooks Cheatsheet\n\n## Before\n\nClass components everywhere.\n\n## After\n\nHooks everywhere.\n",
    );
    write_doc(
        dir.path(),
        "testing/mocks.md",
        "# Mocks Cheatsheet\n\nStub collaborators in unit tests.\n",
    );
    build(dir.path(), false, None).expect("build should succeed");
    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");

    let by_category = search(
        &snapshot,
        dir.path(),
        "cheatsheet",
        &SearchFilters {
            category: Some("react".to_string()),
            ..Default::default()
        },
        10,
    );
    assert_eq!(by_category.len(), 1);
    assert_eq!(by_category[0].path, "react/hooks.md");

    let by_kind = search(
        &snapshot,
        dir.path(),
        "cheatsheet",
        &SearchFilters {
            template_kind: Some(TemplateKind::BeforeAfter),
            ..Default::default()
        },
        10,
    );
    assert_eq!(by_kind.len(), 1);
    assert_eq!(by_kind[0].path, "react/hooks.md");
    assert_eq!(by_kind[0].template_kind, TemplateKind::BeforeAfter);
}

#[test]
fn validate_reports_findings_without_writing_an_index() {
    let dir = scenario_corpus();
    let summary = validate(dir.path()).expect("validate should succeed");

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.warnings, 2);
    assert_eq!(summary.exit_code(), 1);
    assert!(
        !dir.path().join("index.json").exists(),
        "validate must not write a snapshot"
    );
}

#[test]
fn clean_corpus_exits_zero() {
    let dir = TempDir::new().expect("should create temp dir");
    write_doc(
        dir.path(),
        "README.md",
        "# Knowledge Base\n\nNothing links here, and that is fine.\n",
    );

    let summary = validate(dir.path()).expect("validate should succeed");
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.warnings, 0);
    assert_eq!(summary.exit_code(), 0);

    let summary = build(dir.path(), false, None).expect("build should succeed");
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn excluded_files_never_reach_the_index() {
    let dir = TempDir::new().expect("should create temp dir");
    fs::write(
        dir.path().join("kb-index.toml"),
        "[corpus]\nexclude = [\"drafts/**\"]\n",
    )
    .expect("should write config file");
    write_doc(dir.path(), "README.md", "# Index\n\nJust the readme.\n");
    write_doc(
        dir.path(),
        "drafts/wip.md",
        "# Unfinished\n\nNot ready yet.\n",
    );

    build(dir.path(), false, None).expect("build should succeed");
    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");

    assert!(snapshot.documents.contains_key("README.md"));
    assert!(
        !snapshot.documents.contains_key("drafts/wip.md"),
        "excluded pattern should drop the draft"
    );
}

#[test]
fn build_rejects_missing_root() {
    let dir = TempDir::new().expect("should create temp dir");
    let missing = dir.path().join("no-such-directory");
    let result = build(&missing, false, None);
    assert!(result.is_err(), "a nonexistent root is an operational error");
}

#[test]
fn snapshot_version_and_checksums_survive_the_round_trip() {
    let dir = scenario_corpus();
    build(dir.path(), false, None).expect("build should succeed");
    let snapshot =
        Snapshot::read(&dir.path().join("index.json")).expect("should read written snapshot");

    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.documents.len(), 3);
    for (path, meta) in &snapshot.documents {
        assert_eq!(
            meta.checksum.len(),
            64,
            "{path} should carry a hex SHA-256 checksum"
        );
    }
}

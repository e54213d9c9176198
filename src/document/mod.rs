
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::template::TemplateKind;

/// Topic folder a document lives under.
///
/// The corpus groups documents by top-level directory. Folders outside this
/// set map to [`Category::Other`]; the loader reports them unless the
/// configuration lists them as known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Architecture,
    BestPractices,
    Git,
    Patterns,
    Prompts,
    React,
    Templates,
    Testing,
    Tooling,
    Typescript,
    Other,
}

impl Category {
    /// Maps a top-level folder name to its category, if known.
    #[inline]
    #[must_use]
    pub fn from_folder(folder: &str) -> Option<Self> {
        match folder.to_ascii_lowercase().as_str() {
            "architecture" => Some(Self::Architecture),
            "best-practices" => Some(Self::BestPractices),
            "git" => Some(Self::Git),
            "patterns" => Some(Self::Patterns),
            "prompts" => Some(Self::Prompts),
            "react" => Some(Self::React),
            "templates" => Some(Self::Templates),
            "testing" => Some(Self::Testing),
            "tooling" => Some(Self::Tooling),
            "typescript" => Some(Self::Typescript),
            _ => None,
        }
    }

    /// Infers the category from a corpus-relative path.
    ///
    /// Returns the category plus the folder name when the folder is not in
    /// the known set. Root-level files have no folder and map to `Other`
    /// without being reported.
    #[inline]
    #[must_use]
    pub fn infer(path: &str) -> (Self, Option<&str>) {
        match path.split_once('/') {
            None => (Self::Other, None),
            Some((folder, _)) => match Self::from_folder(folder) {
                Some(category) => (category, None),
                None => (Self::Other, Some(folder)),
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::BestPractices => "best-practices",
            Self::Git => "git",
            Self::Patterns => "patterns",
            Self::Prompts => "prompts",
            Self::React => "react",
            Self::Templates => "templates",
            Self::Testing => "testing",
            Self::Tooling => "tooling",
            Self::Typescript => "typescript",
            Self::Other => "other",
        }
    }
}

/// One heading in a document's outline.
///
/// The level is recorded exactly as written; a jump from `#` to `###` is
/// kept as-is so the template checker can see the real structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    /// Byte offset of the heading's start in the source file.
    pub offset: usize,
}

/// One outbound link with its resolution result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Anchor text as written between the brackets.
    pub text: String,
    /// Raw link target, untouched.
    pub target: String,
    /// Corpus-relative path the target resolves to, or `None` for external
    /// targets and targets that do not resolve.
    pub resolved: Option<String>,
    /// One-based source line of the link.
    pub line: usize,
}

/// A fully parsed markdown document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Corpus-relative path with forward slashes.
    pub path: String,
    pub title: String,
    pub category: Category,
    pub tags: BTreeSet<String>,
    pub template_kind: TemplateKind,
    pub headings: Vec<Heading>,
    pub links: Vec<Link>,
    /// Visible text outside headings, used for indexing and snippets.
    pub body: String,
    /// Hex SHA-256 of the raw file bytes.
    pub checksum: String,
}

/// The title must come from an `# Heading` within this many leading lines;
/// later level-1 headings are outline entries, not titles.
const TITLE_SCAN_LINES: usize = 20;

/// Front-matter style markers such as `tags: react, hooks` are only honored
/// within this many leading lines.
const MARKER_SCAN_LINES: usize = 10;

/// Parses one markdown file into a [`Document`].
///
/// Never fails: undecodable bytes are replaced lossily, a missing title falls
/// back to the slugified file stem, and every degradation is reported through
/// the returned diagnostics. The template kind starts as `Unknown` and is
/// assigned later by the template checker.
#[inline]
#[must_use]
pub fn parse(path: &str, bytes: &[u8]) -> (Document, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let checksum = checksum_hex(bytes);

    let text = match std::str::from_utf8(bytes) {
        Ok(valid) => std::borrow::Cow::Borrowed(valid),
        Err(_) => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::ParseWarning,
                path,
                "file is not valid UTF-8, undecodable bytes were replaced",
            ));
            String::from_utf8_lossy(bytes)
        }
    };

    let starts = line_starts(&text);
    let title_cutoff = starts.get(TITLE_SCAN_LINES).copied().unwrap_or(usize::MAX);

    let mut title: Option<String> = None;
    let mut headings: Vec<Heading> = Vec::new();
    let mut links: Vec<Link> = Vec::new();

    // Accumulators for the element currently being walked. Links may appear
    // inside headings, so both can be live at once.
    let mut open_heading: Option<(u8, usize, String)> = None;
    let mut open_link: Option<(String, usize, String)> = None;

    for (event, range) in Parser::new_ext(&text, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                open_heading = Some((heading_level(level), range.start, String::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, offset, collected)) = open_heading.take() {
                    let collected = collected.trim().to_string();
                    if level == 1 && title.is_none() && offset < title_cutoff {
                        title = Some(collected.clone());
                    }
                    headings.push(Heading {
                        level,
                        text: collected,
                        offset,
                    });
                }
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                open_link = Some((dest_url.to_string(), range.start, String::new()));
            }
            Event::End(TagEnd::Link) => {
                if let Some((target, offset, anchor)) = open_link.take() {
                    links.push(Link {
                        text: anchor.trim().to_string(),
                        target,
                        resolved: None,
                        line: line_of(&starts, offset),
                    });
                }
            }
            Event::Text(chunk) | Event::Code(chunk) => {
                if let Some((_, _, buf)) = open_heading.as_mut() {
                    buf.push_str(&chunk);
                }
                if let Some((_, _, buf)) = open_link.as_mut() {
                    buf.push_str(&chunk);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, _, buf)) = open_heading.as_mut() {
                    buf.push(' ');
                }
                if let Some((_, _, buf)) = open_link.as_mut() {
                    buf.push(' ');
                }
            }
            _ => {}
        }
    }

    let mut tags = marker_tags(&text);
    for heading in &headings {
        collect_tag_list(&heading.text, &mut tags);
    }

    let title = title.unwrap_or_else(|| slugify(file_stem(path)));
    let (category, _) = Category::infer(path);

    let document = Document {
        path: path.to_string(),
        title,
        category,
        tags,
        template_kind: TemplateKind::Unknown,
        headings,
        links,
        body: body_text(&text),
        checksum,
    };
    (document, diagnostics)
}

/// Extracts the visible text outside headings.
///
/// Paragraph, list item, and code block boundaries become newlines so that
/// sentence extraction downstream does not glue unrelated lines together.
#[inline]
#[must_use]
pub fn body_text(markdown: &str) -> String {
    let mut body = String::new();
    let mut in_heading = false;

    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => in_heading = false,
            Event::Text(chunk) | Event::Code(chunk) => {
                if !in_heading {
                    body.push_str(&chunk);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if !in_heading {
                    body.push(' ');
                }
            }
            Event::End(TagEnd::Paragraph | TagEnd::Item | TagEnd::CodeBlock) => {
                if !body.ends_with('\n') && !body.is_empty() {
                    body.push('\n');
                }
            }
            _ => {}
        }
    }

    body.truncate(body.trim_end().len());
    body
}

/// Lowercases a file stem into a hyphen-separated slug.
///
/// Used as the title fallback for documents without a leading `# Heading`.
#[inline]
#[must_use]
pub fn slugify(stem: &str) -> String {
    let mut slug = String::with_capacity(stem.len());
    let mut pending_hyphen = false;
    for c in stem.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Hex SHA-256 of raw file bytes, the identity used for change detection.
#[inline]
#[must_use]
pub fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Byte offsets at which each line starts, for offset-to-line translation.
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (index, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(index + 1);
        }
    }
    starts
}

/// One-based line number containing the given byte offset.
fn line_of(starts: &[usize], offset: usize) -> usize {
    starts.partition_point(|&start| start <= offset)
}

/// Scans the leading lines for a `tags:` marker.
fn marker_tags(text: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for line in text.lines().take(MARKER_SCAN_LINES) {
        collect_tag_list(line.trim(), &mut tags);
    }
    tags
}

/// Parses `tags: a, b` or `tags: [a, b]` out of a line or heading.
fn collect_tag_list(text: &str, tags: &mut BTreeSet<String>) {
    let Some((key, rest)) = text.split_once(':') else {
        return;
    };
    if !key.trim().eq_ignore_ascii_case("tags") {
        return;
    }
    let rest = rest.trim().trim_start_matches('[').trim_end_matches(']');
    for tag in rest.split(',') {
        let tag = tag.trim();
        if !tag.is_empty() {
            tags.insert(tag.to_string());
        }
    }
}

fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
}

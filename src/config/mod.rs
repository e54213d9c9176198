
use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up at the corpus root.
pub const CONFIG_FILE_NAME: &str = "kb-index.toml";

/// Upper bound for `search.default_limit`.
const MAX_DEFAULT_LIMIT: usize = 500;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("index.file_name must be a bare file name, got `{0}`")]
    IndexFileName(String),

    #[error("search.default_limit must be between 1 and {MAX_DEFAULT_LIMIT}, got {0}")]
    DefaultLimit(usize),

    #[error("corpus.exclude pattern `{pattern}` is invalid: {message}")]
    ExcludePattern { pattern: String, message: String },

    #[error("corpus.extra_categories entry `{0}` must be a bare lowercase folder name")]
    ExtraCategory(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
}

/// Controls which files the walker feeds into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorpusConfig {
    /// Glob patterns excluded from the walk, relative to the corpus root.
    pub exclude: Vec<String>,
    /// Top-level folders accepted without an unknown-category report.
    /// Documents under them still carry the `other` category.
    pub extra_categories: Vec<String>,
}

/// Controls where the index snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Snapshot file name, written to and read from the corpus root.
    pub file_name: String,
}

/// Query-time defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result count used when a query does not pass `--limit`.
    pub default_limit: usize,
}

impl Default for IndexConfig {
    #[inline]
    fn default() -> Self {
        Self {
            file_name: "index.json".to_string(),
        }
    }
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

impl Config {
    /// Loads configuration from `kb-index.toml` under `root`.
    ///
    /// A missing file yields the defaults; an unreadable or invalid file is
    /// an error rather than a silent fallback.
    #[inline]
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path,
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field for values the pipeline cannot work with.
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let file_name = &self.index.file_name;
        if file_name.is_empty() || file_name.contains('/') || file_name.contains('\\') {
            return Err(ConfigError::IndexFileName(file_name.clone()));
        }

        let limit = self.search.default_limit;
        if limit == 0 || limit > MAX_DEFAULT_LIMIT {
            return Err(ConfigError::DefaultLimit(limit));
        }

        for pattern in &self.corpus.exclude {
            // Compiling the pattern up front turns glob syntax errors into
            // config errors instead of mid-walk failures.
            let mut builder = OverrideBuilder::new(".");
            builder
                .add(&format!("!{pattern}"))
                .and_then(|with_pattern| with_pattern.build())
                .map_err(|err| ConfigError::ExcludePattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?;
        }

        for folder in &self.corpus.extra_categories {
            let bare = !folder.is_empty()
                && !folder.contains('/')
                && !folder.contains('\\')
                && folder
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
            if !bare {
                return Err(ConfigError::ExtraCategory(folder.clone()));
            }
        }

        Ok(())
    }

    /// True when the walker should accept `folder` without reporting an
    /// unknown category.
    #[inline]
    #[must_use]
    pub fn is_known_extra_category(&self, folder: &str) -> bool {
        self.corpus
            .extra_categories
            .iter()
            .any(|known| known == &folder.to_ascii_lowercase())
    }
}

//! Configuration loading and discovery.
//!
//! This module provides configuration file discovery by:
//! 1. Walking up from the current directory to find project config
//! 2. Loading user config from XDG config directory
//! 3. Merging with sensible defaults
//!
//! # Supported formats
//!
//! The following configuration file formats are supported:
//! - TOML (`.toml`)
//! - YAML (`.yaml`, `.yml`)
//! - JSON (`.json`)
//!
//! # Config file locations (in order of precedence, highest first):
//! - `survey-lens.<ext>` in current directory or any parent
//! - `.survey-lens.<ext>` in current directory or any parent
//! - `lens.<ext>` in current directory or any parent
//! - `.lens.<ext>` in current directory or any parent
//! - `~/.config/survey-lens/config.<ext>` (user config)
//!
//! Where `<ext>` is one of: `toml`, `yaml`, `yml`, `json`
//!
//! When multiple files exist in the same directory, all are merged via figment.
//! Later extensions override earlier: toml < yaml < yml < json.
//!
//! Environment variables prefixed with `SURVEY_LENS_` override every file.
//! Nested keys use a double underscore: `SURVEY_LENS_CLUSTERING__EPS=0.3`.
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use survey_lens_core::config::{Config, ConfigLoader};
//!
//! let cwd = std::env::current_dir().unwrap();
//! let cwd = Utf8PathBuf::try_from(cwd).expect("current directory is not valid UTF-8");
//! let (config, _sources) = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! config.validate().unwrap();
//! ```

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterParams;
use crate::embedding::{DEFAULT_DIMENSIONS, EmbeddingProvider};
use crate::error::{ConfigError, ConfigResult};
use crate::input::{DEFAULT_COLUMN_KEYWORDS, DEFAULT_SOURCE_MARKERS};
use crate::projection::ProjectionParams;
use crate::report::{DEFAULT_EXAMPLES_PER_CLUSTER, DEFAULT_TITLE};
use crate::sentiment::{DEFAULT_THRESHOLD, SentimentScorer};
use crate::topics::{DEFAULT_MIN_TOKEN_LEN, DEFAULT_TOP_K};
use crate::transformer::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_REVISION, ModelSource};

/// Sentiment scoring settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SentimentConfig {
    /// Label threshold: polarity above `+threshold` is positive, below
    /// `-threshold` negative. Must be in `[0, 1)`.
    pub threshold: f64,
    /// Extra lexicon entries (word → polarity in `[-1, 1]`). Override
    /// built-in entries with the same normalized form.
    pub extra_lexicon: BTreeMap<String, f64>,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            extra_lexicon: BTreeMap::new(),
        }
    }
}

impl SentimentConfig {
    /// Build a scorer with this threshold and the extra lexicon applied.
    pub fn scorer(&self) -> SentimentScorer {
        SentimentScorer::new(self.threshold)
            .with_lexicon(self.extra_lexicon.iter().map(|(w, s)| (w, *s)))
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model family used to embed comments.
    pub provider: EmbeddingProvider,
    /// Hugging Face hub id of the sentence-transformer.
    pub model: String,
    /// Hub revision (branch, tag or commit).
    pub revision: String,
    /// Local directory with the sentence-transformer files. Takes precedence
    /// over `model` and never touches the network.
    pub model_dir: Option<Utf8PathBuf>,
    /// Token limit per comment for the sentence-transformer.
    pub max_tokens: usize,
    /// Dimensionality of the hashing embedder.
    pub dimensions: usize,
    /// Pretrained word vectors in text `.vec` format, read by the
    /// `word-vectors` provider.
    pub vectors: Option<Utf8PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: DEFAULT_MODEL.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            model_dir: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            dimensions: DEFAULT_DIMENSIONS,
            vectors: None,
        }
    }
}

impl EmbeddingConfig {
    /// Settings for the offline hashing embedder.
    pub fn hashing() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            ..Self::default()
        }
    }

    /// Where the sentence-transformer is loaded from.
    pub fn model_source(&self) -> ModelSource {
        match &self.model_dir {
            Some(dir) => ModelSource::Local(dir.clone()),
            None => ModelSource::Hub {
                repo: self.model.clone(),
                revision: self.revision.clone(),
            },
        }
    }
}

/// Keyword extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TopicsConfig {
    /// Keywords reported per cluster.
    pub top_k: usize,
    /// Minimum keyword length in characters.
    pub min_token_len: usize,
    /// Stop words added to the built-in list.
    pub extra_stop_words: Vec<String>,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            extra_stop_words: Vec::new(),
        }
    }
}

/// Report layout settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// Verbatim examples shown per cluster.
    pub examples_per_cluster: usize,
    /// Document title.
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            examples_per_cluster: DEFAULT_EXAMPLES_PER_CLUSTER,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Comment-column detection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnsConfig {
    /// Stems matched as substrings of normalized column names.
    pub keywords: Vec<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_COLUMN_KEYWORDS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Source identifier extraction from filenames.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    /// Words preceding the source label, tried in order, e.g. `base` in
    /// `Clima_Base_RH_2024.csv` or `pesquisa de clima` in
    /// `PESQUISA DE CLIMA RH - 2025.xlsx`.
    pub markers: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            markers: DEFAULT_SOURCE_MARKERS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Every tunable of the analysis pipeline, one section per stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sentiment scoring.
    pub sentiment: SentimentConfig,
    /// Embedding model.
    pub embedding: EmbeddingConfig,
    /// Density clustering.
    pub clustering: ClusterParams,
    /// 2-D projection.
    pub projection: ProjectionParams,
    /// Keyword extraction.
    pub topics: TopicsConfig,
    /// Report layout.
    pub report: ReportConfig,
    /// Comment-column detection.
    pub columns: ColumnsConfig,
    /// Source identifiers.
    pub source: SourceConfig,
}

impl AnalysisConfig {
    /// Reject values no stage can run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let eps = self.clustering.eps;
        if !(eps > 0.0 && eps <= 2.0) {
            return Err(invalid("clustering.eps", format!("{eps} is outside (0, 2]")));
        }
        if self.clustering.min_samples == 0 {
            return Err(invalid("clustering.min_samples", "must be at least 1"));
        }
        if self.projection.n_neighbors < 2 {
            return Err(invalid("projection.n_neighbors", "must be at least 2"));
        }
        let min_dist = self.projection.min_dist;
        if !min_dist.is_finite() || min_dist < 0.0 {
            return Err(invalid(
                "projection.min_dist",
                format!("{min_dist} is not a non-negative number"),
            ));
        }
        let threshold = self.sentiment.threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(invalid(
                "sentiment.threshold",
                format!("{threshold} is outside [0, 1)"),
            ));
        }
        if let Some((word, score)) = self
            .sentiment
            .extra_lexicon
            .iter()
            .find(|(_, s)| !(-1.0..=1.0).contains(*s))
        {
            return Err(invalid(
                "sentiment.extra_lexicon",
                format!("polarity {score} for `{word}` is outside [-1, 1]"),
            ));
        }
        if self.topics.top_k == 0 {
            return Err(invalid("topics.top_k", "must be at least 1"));
        }
        if self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions", "must be at least 1"));
        }
        match self.embedding.provider {
            EmbeddingProvider::SentenceTransformer => {
                if self.embedding.model_dir.is_none() && self.embedding.model.trim().is_empty() {
                    return Err(invalid("embedding.model", "a model id or model_dir is required"));
                }
                if self.embedding.max_tokens < 2 {
                    return Err(invalid("embedding.max_tokens", "must be at least 2"));
                }
            }
            EmbeddingProvider::WordVectors if self.embedding.vectors.is_none() => {
                return Err(invalid(
                    "embedding.vectors",
                    "the word-vectors provider needs a .vec file",
                ));
            }
            EmbeddingProvider::WordVectors | EmbeddingProvider::Hashing => {}
        }
        if self.columns.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(invalid("columns.keywords", "at least one keyword is required"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// The configuration for survey-lens.
///
/// Deserialized from config files found during discovery (TOML, YAML, or
/// JSON). Analysis sections (`sentiment`, `clustering`, ...) sit at the top
/// level of the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for JSONL log files (falls back to platform defaults if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// Maximum input size in bytes per file (default: 5 MiB).
    ///
    /// Prevents resource exhaustion from oversized uploads in both CLI and MCP
    /// server. Omit to use the default. Use `disable_input_limit` to remove
    /// the limit entirely.
    pub max_input_bytes: Option<usize>,
    /// Disable the input size limit entirely.
    ///
    /// When `true`, `max_input_bytes` is ignored and no size check is performed.
    /// Default: `false`.
    pub disable_input_limit: bool,
    /// Pipeline settings.
    #[serde(flatten)]
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Validate the analysis settings.
    pub fn validate(&self) -> ConfigResult<()> {
        self.analysis.validate()
    }

    /// The effective input size limit, `None` when disabled.
    pub fn input_limit(&self) -> Option<usize> {
        if self.disable_input_limit {
            None
        } else {
            Some(self.max_input_bytes.unwrap_or(crate::DEFAULT_MAX_INPUT_BYTES))
        }
    }
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Metadata about which configuration sources were loaded.
///
/// Returned alongside [`Config`] from [`ConfigLoader::load()`] so commands
/// can report the actual config files without re-discovering them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigSources {
    /// Project config files found by walking up, ordered low→high precedence.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub project_files: Vec<Utf8PathBuf>,
    /// User config file from XDG config directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_file: Option<Utf8PathBuf>,
    /// Explicit config files loaded (e.g., from `--config` flag).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigSources {
    /// Returns the highest-precedence config file that was loaded.
    ///
    /// Precedence: explicit files > project files > user file.
    pub fn primary_file(&self) -> Option<&Utf8Path> {
        self.explicit_files
            .last()
            .map(Utf8PathBuf::as_path)
            .or_else(|| self.project_files.last().map(Utf8PathBuf::as_path))
            .or(self.user_file.as_deref())
    }
}

/// Supported configuration file extensions (in order of preference).
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application name for XDG directory lookup and config file names.
const APP_NAME: &str = "survey-lens";

/// Application names to search for config files (in precedence order, lowest first).
const APP_NAMES: &[&str] = &["lens", "survey-lens"];

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "SURVEY_LENS_";

/// Builder for loading configuration from multiple sources.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Starting directory for project config search.
    project_search_root: Option<Utf8PathBuf>,
    /// Whether to include user config from XDG directory.
    include_user_config: bool,
    /// Stop searching when we hit a directory containing this file/dir.
    boundary_marker: Option<String>,
    /// Explicit config files to load (for testing or programmatic use).
    explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default settings.
    pub fn new() -> Self {
        Self {
            project_search_root: None,
            include_user_config: true,
            boundary_marker: Some(".git".to_string()),
            explicit_files: Vec::new(),
        }
    }

    /// Set the starting directory for project config search.
    ///
    /// The loader will walk up from this directory looking for config files.
    pub fn with_project_search<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.project_search_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set whether to include user config from `~/.config/survey-lens/`.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.include_user_config = include;
        self
    }

    /// Set a boundary marker to stop directory traversal.
    ///
    /// When walking up directories, stop if we find a directory containing
    /// this file or directory name. Default is `.git`.
    pub fn with_boundary_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.boundary_marker = Some(marker.into());
        self
    }

    /// Disable boundary marker (search all the way to filesystem root).
    pub fn without_boundary_marker(mut self) -> Self {
        self.boundary_marker = None;
        self
    }

    /// Add an explicit config file to load.
    ///
    /// Files are loaded in order, with later files taking precedence.
    /// Explicit files are loaded after discovered files.
    pub fn with_file<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.explicit_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration, merging all discovered sources.
    ///
    /// Returns the merged config alongside metadata about which files
    /// were loaded. Values are not range-checked here; call
    /// [`Config::validate`] before running the pipeline.
    ///
    /// Precedence (highest to lowest):
    /// 1. `SURVEY_LENS_*` environment variables
    /// 2. Explicit files (in order added via `with_file`)
    /// 3. Project config (closest to search root)
    /// 4. User config (`~/.config/survey-lens/config.<ext>`)
    /// 5. Default values
    #[tracing::instrument(skip(self), fields(search_root = ?self.project_search_root))]
    pub fn load(self) -> ConfigResult<(Config, ConfigSources)> {
        tracing::debug!("loading configuration");
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let mut sources = ConfigSources::default();

        // Start with user config (lowest precedence of file sources)
        if self.include_user_config
            && let Some(user_config) = self.find_user_config()
        {
            figment = Self::merge_file(figment, &user_config);
            sources.user_file = Some(user_config);
        }

        // Add project configs (ordered low→high precedence)
        if let Some(ref root) = self.project_search_root {
            let project_configs = self.find_project_configs(root);
            for pc in &project_configs {
                figment = Self::merge_file(figment, pc);
            }
            sources.project_files = project_configs;
        }

        // Add explicit files
        for file in &self.explicit_files {
            figment = Self::merge_file(figment, file);
        }
        sources.explicit_files = self.explicit_files;

        // SURVEY_LENS_LOG_LEVEL=debug, SURVEY_LENS_CLUSTERING__EPS=0.3, etc.
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        tracing::info!(
            log_level = config.log_level.as_str(),
            eps = config.analysis.clustering.eps,
            min_samples = config.analysis.clustering.min_samples,
            threshold = config.analysis.sentiment.threshold,
            "configuration loaded"
        );
        Ok((config, sources))
    }

    /// Load configuration, returning an error if no config file is found.
    pub fn load_or_error(self) -> ConfigResult<(Config, ConfigSources)> {
        let has_user = self.include_user_config && self.find_user_config().is_some();
        let has_project = self
            .project_search_root
            .as_ref()
            .is_some_and(|root| !self.find_project_configs(root).is_empty());
        let has_explicit = !self.explicit_files.is_empty();

        if !has_user && !has_project && !has_explicit {
            return Err(ConfigError::NotFound);
        }

        self.load()
    }

    /// Find project config files by walking up from the given directory.
    ///
    /// Returns all matching config files from the closest directory that has any
    /// match, ordered low-to-high precedence: `lens` names before `survey-lens`
    /// names, dotfiles before regular files within each app name.
    fn find_project_configs(&self, start: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let mut found = Vec::new();

            for app_name in APP_NAMES {
                for ext in CONFIG_EXTENSIONS {
                    let dotfile = dir.join(format!(".{app_name}.{ext}"));
                    if dotfile.is_file() {
                        found.push(dotfile);
                    }
                }
                for ext in CONFIG_EXTENSIONS {
                    let regular = dir.join(format!("{app_name}.{ext}"));
                    if regular.is_file() {
                        found.push(regular);
                    }
                }
            }

            if !found.is_empty() {
                return found;
            }

            // Checked after the config files so a config beside the marker is found.
            if let Some(ref marker) = self.boundary_marker
                && dir.join(marker).exists()
                && dir != start
            {
                break;
            }

            current = dir.parent().map(Utf8Path::to_path_buf);
        }

        Vec::new()
    }

    /// Find user config in XDG config directory.
    fn find_user_config(&self) -> Option<Utf8PathBuf> {
        let config_dir = user_config_dir()?;
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_dir.join(format!("config.{ext}")))
            .find(|path| path.is_file())
    }

    /// Merge a config file into the figment, detecting format from extension.
    fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
        match path.extension() {
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
            Some("json") => figment.merge(Json::file_exact(path.as_str())),
            _ => figment.merge(Toml::file_exact(path.as_str())),
        }
    }
}

/// Get the project directories for XDG-compliant path resolution.
///
/// Returns `None` if the home directory cannot be determined.
fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the user config directory path.
///
/// Returns `~/.config/survey-lens/` on Linux, `~/Library/Application Support/survey-lens/`
/// on macOS, and equivalent on other platforms.
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.config_dir().to_path_buf()).ok()
}

/// Get the user data directory path, used as the default log location.
///
/// Returns `~/.local/share/survey-lens/` on Linux, `~/Library/Application Support/survey-lens/`
/// on macOS, and equivalent on other platforms.
pub fn user_data_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.data_dir().to_path_buf()).ok()
}

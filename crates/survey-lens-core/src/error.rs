//! Error types for survey-lens-core.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// Configuration file not found after searching all locations.
    #[error("no configuration file found")]
    NotFound,

    /// A configuration value is outside its accepted range.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that abort the analysis of one batch.
///
/// Per-comment problems never show up here; they are collected as
/// [`RowParseError`] warnings instead.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// After normalization there was nothing left to analyze.
    #[error("nothing to analyze: no comments remain after normalization")]
    EmptyBatch,

    /// The embedding model could not be loaded.
    #[error("embedding model unavailable ({source_path}): {reason}")]
    ModelUnavailable {
        /// Where the model was expected to come from.
        source_path: Utf8PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// An embedding had a different dimensionality than the rest of the batch.
    #[error("embedding {index} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Dimensionality of the first vector.
        expected: usize,
        /// Dimensionality of the offending vector.
        found: usize,
        /// Position of the offending vector in the batch.
        index: usize,
    },

    /// A stage was invoked with parameters it cannot honor.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type alias using [`AnalysisError`].
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// A single unreadable cell.
///
/// Recovered locally: the cell is dropped and processing continues. These are
/// surfaced to callers as warnings listing the affected source.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[error("{source_base}: row {row}, column `{column}`: {reason}")]
pub struct RowParseError {
    /// Source identifier of the row.
    pub source_base: String,
    /// Zero-based row index within the table.
    pub row: usize,
    /// Column name of the cell.
    pub column: String,
    /// What was wrong with it.
    pub reason: String,
}

/// What is wrong with a whole source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The upload could not be read; none of its rows were analyzed.
    UnreadableFile,
    /// No column name looks like a comment column.
    NoCommentColumns,
    /// Comment columns exist but hold no usable text.
    NoComments,
}

/// A problem affecting a whole source rather than a single cell.
///
/// Like [`RowParseError`], it is a warning: the other sources are still
/// analyzed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[error("{source_base}: {message}")]
pub struct SourceNotice {
    /// Source identifier.
    pub source_base: String,
    /// Category of the problem.
    pub kind: NoticeKind,
    /// Human-readable description.
    pub message: String,
}

impl SourceNotice {
    /// The upload for `source_base` could not be read.
    pub fn unreadable(source_base: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            source_base: source_base.into(),
            kind: NoticeKind::UnreadableFile,
            message: format!("file could not be read: {reason}"),
        }
    }

    /// `source_base` has no detectable comment column.
    pub fn no_comment_columns(source_base: impl Into<String>) -> Self {
        Self {
            source_base: source_base.into(),
            kind: NoticeKind::NoCommentColumns,
            message: "no comment column detected".to_string(),
        }
    }

    /// `source_base` has comment columns but no filled-in values.
    pub fn no_comments(source_base: impl Into<String>) -> Self {
        Self {
            source_base: source_base.into(),
            kind: NoticeKind::NoComments,
            message: "comment columns hold no values".to_string(),
        }
    }
}

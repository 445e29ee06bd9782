//! Core library for survey-lens.
//!
//! Turns free-text survey comments into sentiment labels, topic clusters, a
//! 2-D layout for plotting, and a downloadable report.
//!
//! # Modules
//!
//! - [`input`] - Survey table model, source identifiers, comment-column detection
//! - [`normalize`] - Cell splitting and text cleaning
//! - [`sentiment`] - Lexical polarity scoring
//! - [`embedding`] - Embedding providers and the shared model cache
//! - [`transformer`] - Pretrained sentence-transformer on candle
//! - [`cluster`] - Density clustering over cosine distance
//! - [`projection`] - 2-D neighborhood-graph layout
//! - [`topics`] - Keywords and dominant sentiment per cluster
//! - [`report`] - Aggregation and markdown rendering
//! - [`pipeline`] - Orchestration and progress reporting
//! - [`config`] - Configuration loading and management
//! - [`error`] - Error types and result aliases
//!
//! # Quick Start
//!
//! ```no_run
//! use survey_lens_core::{ConfigLoader, Pipeline, NoProgress};
//! use survey_lens_core::input::{Cell, SurveyRow, SurveyTable};
//!
//! let (config, _sources) = ConfigLoader::new()
//!     .load()
//!     .expect("Failed to load configuration");
//! let pipeline = Pipeline::new(config.analysis).expect("model available");
//!
//! let table = SurveyTable::new(
//!     vec!["Comentários".into()],
//!     vec![SurveyRow {
//!         source_base: "RH".into(),
//!         cells: vec![Cell::Text("Adoro trabalhar aqui".into())],
//!     }],
//! );
//! let columns = pipeline.comment_columns().unwrap();
//! let analysis = pipeline.run(&table, &columns, &mut NoProgress).unwrap();
//! println!("{}", analysis.report.to_markdown());
//! ```
#![deny(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod embedding;
pub mod error;
pub mod input;
pub mod normalize;
pub mod pipeline;
pub mod projection;
pub mod report;
pub mod sentiment;
pub mod topics;
pub mod transformer;
pub mod word_lists;

pub use config::{AnalysisConfig, Config, ConfigLoader, EmbeddingConfig, LogLevel};
pub use embedding::EmbeddingProvider;
pub use error::{
    AnalysisError, AnalysisResult, ConfigError, ConfigResult, NoticeKind, RowParseError,
    SourceNotice,
};
pub use pipeline::{Analysis, NoProgress, Pipeline, Progress, Stage};
pub use report::{Report, ReportFormat};
pub use sentiment::{SentimentLabel, SentimentScorer};

/// Default per-file input limit: 5 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 5 * 1024 * 1024;

//! End-to-end orchestration of one analysis batch.
//!
//! Data flows strictly forward:
//! normalize → {sentiment, embed} → cluster → {project, summarize} → report.
//!
//! A batch either yields a complete [`Analysis`] or an error; partial results
//! are never returned. Batches share nothing but the read-only embedding model.

use std::sync::Arc;
use std::time::Instant;

use schemars::JsonSchema;
use serde::Serialize;

use crate::cluster::dbscan;
use crate::config::AnalysisConfig;
use crate::embedding::{Embedder, embedder_for};
use crate::error::{AnalysisError, AnalysisResult, ConfigError, RowParseError};
use crate::input::{CommentColumns, KeywordColumns, SurveyTable};
use crate::normalize::{Comment, NormalizedBatch, normalize_table};
use crate::projection::project;
use crate::report::{CommentRecord, Report};
use crate::sentiment::{SentimentLabel, SentimentScorer};
use crate::topics::{ClusterSummary, TopicSummarizer};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Splitting and cleaning cells into comments.
    Normalize,
    /// Polarity scoring.
    Sentiment,
    /// Computing embeddings.
    Embed,
    /// Density clustering.
    Cluster,
    /// 2-D layout.
    Project,
    /// Keyword extraction and dominant sentiment.
    Summarize,
    /// Report assembly.
    Report,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 7] = [
        Self::Normalize,
        Self::Sentiment,
        Self::Embed,
        Self::Cluster,
        Self::Project,
        Self::Summarize,
        Self::Report,
    ];

    /// Human-readable stage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "normalizing comments",
            Self::Sentiment => "scoring sentiment",
            Self::Embed => "computing embeddings",
            Self::Cluster => "clustering",
            Self::Project => "projecting to 2-D",
            Self::Summarize => "extracting topics",
            Self::Report => "assembling report",
        }
    }
}

/// Coarse progress reporting for long batches.
pub trait Progress {
    /// A stage is starting on `items` inputs.
    fn stage(&mut self, stage: Stage, items: usize);

    /// The batch ended, successfully or not.
    fn finish(&mut self) {}
}

/// Ignores all progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn stage(&mut self, _stage: Stage, _items: usize) {}
}

/// Result of one batch.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Analysis {
    /// Identifier of the embedding model used.
    pub model_id: String,
    /// One record per comment, in input order.
    pub records: Vec<CommentRecord>,
    /// One summary per distinct cluster id, ascending with `-1` last.
    pub summaries: Vec<ClusterSummary>,
    /// Aggregate report.
    pub report: Report,
}

fn validate(config: &AnalysisConfig) -> AnalysisResult<()> {
    config.validate().map_err(|e| match e {
        ConfigError::Invalid { field, reason } => AnalysisError::InvalidParameter {
            name: field,
            reason,
        },
        other => AnalysisError::InvalidParameter {
            name: "config",
            reason: other.to_string(),
        },
    })
}

/// A configured pipeline. Cheap to share across batches.
pub struct Pipeline {
    config: AnalysisConfig,
    embedder: Arc<dyn Embedder>,
    scorer: SentimentScorer,
    summarizer: TopicSummarizer,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("model", &self.embedder.model_id())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate `config` and resolve its embedding model.
    ///
    /// Fails with [`AnalysisError::ModelUnavailable`] when the configured
    /// model cannot be loaded.
    pub fn new(config: AnalysisConfig) -> AnalysisResult<Self> {
        validate(&config)?;
        let embedder = embedder_for(&config.embedding)?;
        Self::with_embedder(config, embedder)
    }

    /// Validate `config` and use the given embedder.
    pub fn with_embedder(
        config: AnalysisConfig,
        embedder: Arc<dyn Embedder>,
    ) -> AnalysisResult<Self> {
        validate(&config)?;

        let scorer = config.sentiment.scorer();
        let summarizer = TopicSummarizer::new(config.topics.top_k, config.topics.min_token_len)
            .with_stop_words(&config.topics.extra_stop_words);

        Ok(Self {
            config,
            embedder,
            scorer,
            summarizer,
        })
    }

    /// The configuration in use.
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The sentiment scorer in use.
    pub const fn scorer(&self) -> &SentimentScorer {
        &self.scorer
    }

    /// Identifier of the embedding model.
    pub fn model_id(&self) -> String {
        self.embedder.model_id()
    }

    /// Comment-column predicate built from `columns.keywords`.
    pub fn comment_columns(&self) -> AnalysisResult<KeywordColumns> {
        KeywordColumns::new(&self.config.columns.keywords).map_err(|e| {
            AnalysisError::InvalidParameter {
                name: "columns.keywords",
                reason: e.to_string(),
            }
        })
    }

    /// Analyze every comment in `table` as one batch.
    ///
    /// Returns [`AnalysisError::EmptyBatch`] before any embedding work when
    /// no comment survives normalization.
    #[tracing::instrument(skip_all, fields(rows = table.rows.len()))]
    pub fn run(
        &self,
        table: &SurveyTable,
        columns: &dyn CommentColumns,
        progress: &mut dyn Progress,
    ) -> AnalysisResult<Analysis> {
        progress.stage(Stage::Normalize, table.rows.len());
        let batch = normalize_table(table, columns);
        self.run_batch(batch, progress)
    }

    /// Analyze already-normalized comments.
    pub fn run_comments(
        &self,
        comments: Vec<Comment>,
        warnings: Vec<RowParseError>,
        progress: &mut dyn Progress,
    ) -> AnalysisResult<Analysis> {
        self.run_batch(
            NormalizedBatch {
                comments,
                warnings,
                notices: Vec::new(),
            },
            progress,
        )
    }

    /// Analyze a normalized batch, carrying its warnings into the report.
    #[tracing::instrument(skip_all, fields(comments = batch.comments.len(), model = %self.embedder.model_id()))]
    pub fn run_batch(
        &self,
        batch: NormalizedBatch,
        progress: &mut dyn Progress,
    ) -> AnalysisResult<Analysis> {
        let result = self.analyze(batch, progress);
        progress.finish();
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "batch not analyzed");
        }
        result
    }

    fn analyze(
        &self,
        batch: NormalizedBatch,
        progress: &mut dyn Progress,
    ) -> AnalysisResult<Analysis> {
        let NormalizedBatch {
            comments,
            warnings,
            notices,
        } = batch;
        let start = Instant::now();
        let n = comments.len();
        if n == 0 {
            return Err(AnalysisError::EmptyBatch);
        }
        let texts: Vec<&str> = comments.iter().map(|c| c.normalized_text.as_str()).collect();

        progress.stage(Stage::Sentiment, n);
        let sentiments = self.scorer.score_all(&texts);

        progress.stage(Stage::Embed, n);
        let vectors = self.embedder.embed(&texts)?;
        if vectors.len() != n {
            return Err(AnalysisError::InvalidParameter {
                name: "embeddings",
                reason: format!("model returned {} vectors for {n} comments", vectors.len()),
            });
        }
        let expected = self.embedder.dimensions();
        if let Some(index) = vectors.iter().position(|v| v.len() != expected) {
            return Err(AnalysisError::DimensionMismatch {
                expected,
                found: vectors[index].len(),
                index,
            });
        }

        progress.stage(Stage::Cluster, n);
        let cluster_ids = dbscan(&vectors, self.config.clustering)?;

        progress.stage(Stage::Project, n);
        let positions = project(&vectors, self.config.projection)?;

        progress.stage(Stage::Summarize, n);
        let labels: Vec<SentimentLabel> = sentiments.iter().map(|s| s.label).collect();
        let summaries = self.summarizer.summarize(&cluster_ids, &texts, &labels)?;

        progress.stage(Stage::Report, n);
        let records: Vec<CommentRecord> = comments
            .into_iter()
            .zip(sentiments)
            .zip(cluster_ids)
            .zip(positions)
            .map(|(((comment, sentiment), cluster_id), position)| CommentRecord {
                comment,
                sentiment,
                cluster_id,
                position,
            })
            .collect();
        let report = Report::assemble(
            &self.config.report.title,
            &records,
            &summaries,
            self.config.report.examples_per_cluster,
            warnings,
            notices,
        )?;

        tracing::info!(
            comments = n,
            clusters = summaries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch analyzed"
        );
        Ok(Analysis {
            model_id: self.embedder.model_id(),
            records,
            summaries,
            report,
        })
    }

    /// Analyze each source of `table` as its own independent batch.
    ///
    /// Results are returned per source, in first-seen order. A failing batch
    /// does not affect the others.
    #[tracing::instrument(skip_all, fields(rows = table.rows.len()))]
    pub fn run_by_source(
        &self,
        table: &SurveyTable,
        columns: &dyn CommentColumns,
        progress: &mut dyn Progress,
    ) -> Vec<(String, AnalysisResult<Analysis>)> {
        table
            .sources()
            .into_iter()
            .map(|source| {
                let subset = table.filter_source(source);
                tracing::debug!(source, rows = subset.rows.len(), "analyzing source");
                (source.to_string(), self.run(&subset, columns, progress))
            })
            .collect()
    }
}

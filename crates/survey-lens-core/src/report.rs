//! Report assembly and markdown rendering.
//!
//! The report is pure aggregation over the per-comment records and the
//! cluster summaries. It never recomputes anything the earlier stages
//! produced.

use std::fmt::Write as _;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cluster::NOISE;
use crate::error::{AnalysisError, AnalysisResult, RowParseError, SourceNotice};
use crate::normalize::Comment;
use crate::projection::Point;
use crate::sentiment::{SentimentLabel, SentimentResult};
use crate::topics::{ClusterSummary, Keyword};

/// Default number of verbatim examples per cluster section.
pub const DEFAULT_EXAMPLES_PER_CLUSTER: usize = 3;

/// Default report title.
pub const DEFAULT_TITLE: &str = "Survey comment analysis";

/// Everything the pipeline knows about one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommentRecord {
    /// The comment itself.
    pub comment: Comment,
    /// Polarity and label.
    pub sentiment: SentimentResult,
    /// Cluster id; `-1` when unclustered.
    pub cluster_id: i32,
    /// Position in the 2-D layout. For plotting only.
    pub position: Point,
}

/// Count and share of one sentiment label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelShare {
    /// The label.
    pub label: SentimentLabel,
    /// Comments with this label.
    pub count: usize,
    /// `count / total`, as a percentage.
    pub percentage: f64,
}

/// Sentiment counts for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceBreakdown {
    /// Source identifier.
    pub source_base: String,
    /// Comments from this source.
    pub total: usize,
    /// Positive comments.
    pub positive: usize,
    /// Neutral comments.
    pub neutral: usize,
    /// Negative comments.
    pub negative: usize,
}

/// One report section per cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterSection {
    /// Cluster id; `-1` for unclustered comments.
    pub cluster_id: i32,
    /// Number of comments.
    pub size: usize,
    /// Most frequent label.
    pub dominant_sentiment: SentimentLabel,
    /// Top keywords with counts.
    pub keywords: Vec<Keyword>,
    /// First comments of the cluster, verbatim, in encounter order.
    pub examples: Vec<String>,
}

/// Aggregate report over one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    /// Document title.
    pub title: String,
    /// Number of comments analyzed; always positive.
    pub total: usize,
    /// One entry per label, in positive/neutral/negative order.
    pub sentiment: Vec<LabelShare>,
    /// Per-source counts, in first-seen order.
    pub sources: Vec<SourceBreakdown>,
    /// Cluster sections, ascending by id with `-1` last.
    pub sections: Vec<ClusterSection>,
    /// Cells dropped during normalization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RowParseError>,
    /// Sources that contributed no comments, and why.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<SourceNotice>,
}

/// Output format for a rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown document.
    #[default]
    Markdown,
    /// Pretty-printed JSON.
    Json,
}

impl ReportFormat {
    /// Conventional file extension for this format.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl Report {
    /// Assemble a report.
    ///
    /// Fails with [`AnalysisError::EmptyBatch`] when `records` is empty.
    /// Sections follow the order of `summaries`.
    #[tracing::instrument(skip_all, fields(records = records.len(), clusters = summaries.len()))]
    pub fn assemble(
        title: &str,
        records: &[CommentRecord],
        summaries: &[ClusterSummary],
        examples_per_cluster: usize,
        warnings: Vec<RowParseError>,
        notices: Vec<SourceNotice>,
    ) -> AnalysisResult<Self> {
        let total = records.len();
        if total == 0 {
            return Err(AnalysisError::EmptyBatch);
        }

        let sentiment = SentimentLabel::ALL
            .into_iter()
            .map(|label| {
                let count = records.iter().filter(|r| r.sentiment.label == label).count();
                LabelShare {
                    label,
                    count,
                    percentage: 100.0 * count as f64 / total as f64,
                }
            })
            .collect();

        let mut sources: Vec<SourceBreakdown> = Vec::new();
        for record in records {
            let idx = match sources
                .iter()
                .position(|s| s.source_base == record.comment.source_base)
            {
                Some(idx) => idx,
                None => {
                    sources.push(SourceBreakdown {
                        source_base: record.comment.source_base.clone(),
                        total: 0,
                        positive: 0,
                        neutral: 0,
                        negative: 0,
                    });
                    sources.len() - 1
                }
            };
            let entry = &mut sources[idx];
            entry.total += 1;
            match record.sentiment.label {
                SentimentLabel::Positive => entry.positive += 1,
                SentimentLabel::Neutral => entry.neutral += 1,
                SentimentLabel::Negative => entry.negative += 1,
            }
        }

        let sections = summaries
            .iter()
            .map(|summary| ClusterSection {
                cluster_id: summary.cluster_id,
                size: summary.size,
                dominant_sentiment: summary.dominant_sentiment,
                keywords: summary.top_keywords.clone(),
                examples: records
                    .iter()
                    .filter(|r| r.cluster_id == summary.cluster_id)
                    .take(examples_per_cluster)
                    .map(|r| r.comment.raw_text.clone())
                    .collect(),
            })
            .collect();

        Ok(Self {
            title: title.to_string(),
            total,
            sentiment,
            sources,
            sections,
            warnings,
            notices,
        })
    }

    /// Count for `label`.
    pub fn count(&self, label: SentimentLabel) -> usize {
        self.sentiment
            .iter()
            .find(|s| s.label == label)
            .map_or(0, |s| s.count)
    }

    /// Distinct source identifiers named in the notices and cell warnings,
    /// in first-seen order.
    pub fn warned_sources(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let named = self
            .notices
            .iter()
            .map(|n| n.source_base.as_str())
            .chain(self.warnings.iter().map(|w| w.source_base.as_str()));
        for source in named {
            if !seen.contains(&source) {
                seen.push(source);
            }
        }
        seen
    }

    /// Render as a markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_markdown(&mut out);
        out
    }

    /// Render in the requested format.
    pub fn render(&self, format: ReportFormat) -> AnalysisResult<String> {
        match format {
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| AnalysisError::InvalidParameter {
                    name: "report",
                    reason: format!("serialization failed: {e}"),
                })
            }
        }
    }

    fn write_markdown(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "# {}", self.title)?;
        writeln!(out)?;
        writeln!(out, "**Comments analyzed:** {}", self.total)?;
        writeln!(out)?;

        writeln!(out, "## Sentiment")?;
        writeln!(out)?;
        writeln!(out, "| Sentiment | Count | Share |")?;
        writeln!(out, "|---|---:|---:|")?;
        for share in &self.sentiment {
            writeln!(out, "| {} | {} | {:.1}% |", share.label, share.count, share.percentage)?;
        }
        writeln!(out)?;

        if self.sources.len() > 1 {
            writeln!(out, "## Sources")?;
            writeln!(out)?;
            writeln!(out, "| Source | Comments | Positive | Neutral | Negative |")?;
            writeln!(out, "|---|---:|---:|---:|---:|")?;
            for s in &self.sources {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    escape_cell(&s.source_base),
                    s.total,
                    s.positive,
                    s.neutral,
                    s.negative
                )?;
            }
            writeln!(out)?;
        }

        writeln!(out, "## Topics")?;
        for section in &self.sections {
            writeln!(out)?;
            if section.cluster_id == NOISE {
                writeln!(out, "### Unclustered comments")?;
            } else {
                writeln!(out, "### Topic {}", section.cluster_id)?;
            }
            writeln!(out)?;
            writeln!(out, "- **Comments:** {}", section.size)?;
            writeln!(out, "- **Dominant sentiment:** {}", section.dominant_sentiment)?;
            if !section.keywords.is_empty() {
                let words: Vec<String> = section
                    .keywords
                    .iter()
                    .map(|k| format!("{} ({})", k.word, k.count))
                    .collect();
                writeln!(out, "- **Keywords:** {}", words.join(", "))?;
            }
            if !section.examples.is_empty() {
                writeln!(out)?;
                for example in &section.examples {
                    writeln!(out, "> {}", example.replace('\n', " "))?;
                    writeln!(out)?;
                }
            }
        }

        if self.notices.is_empty() && self.warnings.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        writeln!(out, "## Warnings")?;
        if !self.notices.is_empty() {
            writeln!(out)?;
            for notice in &self.notices {
                writeln!(out, "- {notice}")?;
            }
        }
        if !self.warnings.is_empty() {
            let mut cells: Vec<&str> = Vec::new();
            for w in &self.warnings {
                if !cells.contains(&w.source_base.as_str()) {
                    cells.push(&w.source_base);
                }
            }
            writeln!(out)?;
            writeln!(
                out,
                "{} unreadable cell(s) were skipped in: {}",
                self.warnings.len(),
                cells.join(", ")
            )?;
            writeln!(out)?;
            for w in &self.warnings {
                writeln!(out, "- {w}")?;
            }
        }
        Ok(())
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

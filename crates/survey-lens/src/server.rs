//! MCP (Model Context Protocol) server implementation.
//!
//! Exposes the comment-analysis pipeline over stdio so AI assistants can
//! score and cluster survey comments. Every tool delegates to the same core
//! library calls the CLI commands make.
//!
//! # Tools
//!
//! - `analyze_comments` - run the full pipeline over a list of comments
//! - `analyze_files` - run the pipeline over survey exports on disk
//! - `score_sentiment` - label comments without clustering
//! - `get_info` - package name and version

use camino::Utf8PathBuf;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use survey_lens_core::normalize::{comments_from_text, fold};
use survey_lens_core::report::ReportFormat;
use survey_lens_core::{
    AnalysisConfig, AnalysisError, EmbeddingProvider, NoProgress, NoticeKind, Pipeline,
};

use crate::commands::load_table;

/// Parameters for the `get_info` tool.
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct GetInfoParams {
    /// Output format: "text" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "text".to_string()
}

/// Pipeline overrides shared by the analysis tools.
#[derive(Debug, Default, serde::Deserialize, schemars::JsonSchema)]
pub struct AnalysisOverrides {
    /// Maximum cosine distance between neighbors, in (0, 2].
    pub eps: Option<f64>,
    /// Neighbors (including the comment itself) needed to seed a cluster.
    pub min_samples: Option<usize>,
    /// Polarity magnitude needed for a positive or negative label, in [0, 1).
    pub threshold: Option<f64>,
    /// Seed for the 2-D projection.
    pub seed: Option<u64>,
    /// Embedding provider; `hashing` needs no model download.
    pub embedder: Option<EmbeddingProvider>,
}

impl AnalysisOverrides {
    fn apply(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        if let Some(eps) = self.eps {
            config.clustering.eps = eps;
        }
        if let Some(min_samples) = self.min_samples {
            config.clustering.min_samples = min_samples;
        }
        if let Some(threshold) = self.threshold {
            config.sentiment.threshold = threshold;
        }
        if let Some(seed) = self.seed {
            config.projection.seed = Some(seed);
        }
        if let Some(provider) = self.embedder {
            config.embedding.provider = provider;
        }
        config
    }
}

/// Parameters for the `analyze_comments` tool.
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AnalyzeCommentsParams {
    /// Comments to analyze. Multi-line entries are split into one comment per line.
    pub comments: Vec<String>,
    /// Source label attached to every comment.
    #[serde(default = "default_source")]
    pub source: String,
    /// "json" (default) for the structured report, "markdown" for the document.
    #[serde(default = "default_report_format")]
    pub format: ReportFormat,
    /// Include per-comment records (sentiment, cluster id, x/y) in JSON output.
    #[serde(default)]
    pub include_records: bool,
    /// Pipeline overrides.
    #[serde(default, flatten)]
    pub overrides: AnalysisOverrides,
}

fn default_source() -> String {
    "comments".to_string()
}

const fn default_report_format() -> ReportFormat {
    ReportFormat::Json
}

/// Parameters for the `analyze_files` tool.
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AnalyzeFilesParams {
    /// Paths to survey exports (.csv, .tsv or .json).
    pub paths: Vec<String>,
    /// Analyze each source as its own batch.
    #[serde(default)]
    pub by_source: bool,
    /// Pipeline overrides.
    #[serde(default, flatten)]
    pub overrides: AnalysisOverrides,
}

/// Parameters for the `score_sentiment` tool.
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ScoreSentimentParams {
    /// Comments to score.
    pub texts: Vec<String>,
    /// Polarity magnitude needed for a positive or negative label, in [0, 1).
    pub threshold: Option<f64>,
}

/// MCP server exposing the analysis pipeline to AI assistants.
#[derive(Clone)]
pub struct SurveyServer {
    tool_router: rmcp::handler::server::router::tool::ToolRouter<Self>,
    analysis: AnalysisConfig,
    max_input: Option<usize>,
}

impl Default for SurveyServer {
    fn default() -> Self {
        Self::new(
            AnalysisConfig::default(),
            Some(survey_lens_core::DEFAULT_MAX_INPUT_BYTES),
        )
    }
}

fn analysis_error(e: AnalysisError) -> McpError {
    match e {
        AnalysisError::InvalidParameter { .. } | AnalysisError::DimensionMismatch { .. } => {
            McpError::invalid_params(e.to_string(), None)
        }
        _ => McpError::internal_error(e.to_string(), None),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("serialization error: {e}"), None))
}

fn nothing_to_analyze() -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::json!({ "status": "empty", "message": "nothing to analyze" }).to_string(),
    )])
}

#[tool_router]
impl SurveyServer {
    /// Create a server using the given analysis defaults.
    pub fn new(analysis: AnalysisConfig, max_input: Option<usize>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            analysis,
            max_input,
        }
    }

    fn pipeline(&self, overrides: &AnalysisOverrides) -> Result<Pipeline, McpError> {
        Pipeline::new(overrides.apply(self.analysis.clone())).map_err(analysis_error)
    }

    /// Get project information.
    #[tool(description = "Get project name, version, and description")]
    #[tracing::instrument(skip(self), fields(otel.kind = "server"))]
    fn get_info(
        &self,
        Parameters(params): Parameters<GetInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "get_info", format = %params.format, "executing MCP tool");

        let info = serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "description": env!("CARGO_PKG_DESCRIPTION"),
        });

        let text = if params.format == "json" {
            to_json(&info)?
        } else {
            format!(
                "{} v{}\n{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_DESCRIPTION"),
            )
        };

        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Label comments as positive, neutral or negative.
    #[tool(
        description = "Score the sentiment of comments. Returns polarity in [-1, 1] and a positive/neutral/negative label for each."
    )]
    #[tracing::instrument(skip(self, params), fields(otel.kind = "server", count = params.texts.len()))]
    fn score_sentiment(
        &self,
        Parameters(params): Parameters<ScoreSentimentParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "score_sentiment", "executing MCP tool");

        let mut sentiment = self.analysis.sentiment.clone();
        if let Some(threshold) = params.threshold {
            if !(0.0..1.0).contains(&threshold) {
                return Err(McpError::invalid_params(
                    format!("threshold {threshold} must be in [0, 1)"),
                    None,
                ));
            }
            sentiment.threshold = threshold;
        }
        let scorer = sentiment.scorer();
        let scored: Vec<serde_json::Value> = params
            .texts
            .iter()
            .map(|text| {
                let result = scorer.score(&fold(text));
                serde_json::json!({
                    "text": text,
                    "polarity": result.polarity,
                    "label": result.label,
                })
            })
            .collect();

        tracing::info!(tool = "score_sentiment", count = scored.len(), "MCP tool completed");
        Ok(CallToolResult::success(vec![Content::text(to_json(&scored)?)]))
    }

    /// Run the full pipeline over inline comments.
    #[tool(
        description = "Analyze survey comments: sentiment per comment, topic clusters (-1 = unclustered), keywords and dominant sentiment per topic, and a report."
    )]
    #[tracing::instrument(skip(self, params), fields(otel.kind = "server", count = params.comments.len()))]
    fn analyze_comments(
        &self,
        Parameters(params): Parameters<AnalyzeCommentsParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "analyze_comments", source = %params.source, "executing MCP tool");

        let pipeline = self.pipeline(&params.overrides)?;
        let comments = params
            .comments
            .iter()
            .enumerate()
            .flat_map(|(row, raw)| comments_from_text(&params.source, row, raw))
            .collect();

        let analysis = match pipeline.run_comments(comments, Vec::new(), &mut NoProgress) {
            Ok(analysis) => analysis,
            Err(AnalysisError::EmptyBatch) => return Ok(nothing_to_analyze()),
            Err(e) => return Err(analysis_error(e)),
        };

        let text = match params.format {
            ReportFormat::Markdown => analysis.report.to_markdown(),
            ReportFormat::Json if params.include_records => to_json(&analysis)?,
            ReportFormat::Json => to_json(&analysis.report)?,
        };

        tracing::info!(
            tool = "analyze_comments",
            comments = analysis.records.len(),
            clusters = analysis.summaries.len(),
            "MCP tool completed"
        );
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Run the full pipeline over survey exports on disk.
    #[tool(
        description = "Analyze survey export files (.csv, .tsv, .json). Comment columns are detected by name; each file is one source."
    )]
    #[tracing::instrument(skip(self, params), fields(otel.kind = "server", files = params.paths.len()))]
    fn analyze_files(
        &self,
        Parameters(params): Parameters<AnalyzeFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool = "analyze_files", by_source = params.by_source, "executing MCP tool");

        let paths: Vec<Utf8PathBuf> = params.paths.iter().map(Utf8PathBuf::from).collect();
        let pipeline = self.pipeline(&params.overrides)?;
        let table = load_table(&paths, &pipeline.config().source.markers, self.max_input)
            .map_err(|e| McpError::invalid_params(format!("{e:#}"), None))?;
        let columns = pipeline.comment_columns().map_err(analysis_error)?;

        if !params.by_source {
            return match pipeline.run(&table, &columns, &mut NoProgress) {
                Ok(analysis) => Ok(CallToolResult::success(vec![Content::text(to_json(
                    &analysis.report,
                )?)])),
                Err(AnalysisError::EmptyBatch) => Ok(nothing_to_analyze()),
                Err(e) => Err(analysis_error(e)),
            };
        }

        let mut outcomes: Vec<serde_json::Value> = pipeline
            .run_by_source(&table, &columns, &mut NoProgress)
            .into_iter()
            .map(|(source, result)| match result {
                Ok(analysis) => serde_json::json!({ "source": source, "report": analysis.report }),
                Err(e) => serde_json::json!({ "source": source, "error": e.to_string() }),
            })
            .collect();
        outcomes.extend(
            table
                .notices
                .iter()
                .filter(|n| n.kind == NoticeKind::UnreadableFile)
                .map(|n| serde_json::json!({ "source": n.source_base, "error": n.message })),
        );
        tracing::info!(tool = "analyze_files", sources = outcomes.len(), "MCP tool completed");
        Ok(CallToolResult::success(vec![Content::text(to_json(&outcomes)?)]))
    }
}

#[tool_handler]
impl ServerHandler for SurveyServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(format!(
                "{} MCP server. Analyze free-text survey comments: sentiment, topic clusters and reports.",
                env!("CARGO_PKG_NAME"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::RawContent;
    use survey_lens_core::EmbeddingConfig;

    /// Server with the offline hashing embedder.
    fn server() -> SurveyServer {
        SurveyServer::new(
            AnalysisConfig {
                embedding: EmbeddingConfig::hashing(),
                ..AnalysisConfig::default()
            },
            Some(survey_lens_core::DEFAULT_MAX_INPUT_BYTES),
        )
    }

    #[test]
    fn server_info_has_correct_name() {
        let server = SurveyServer::default();
        let info = ServerHandler::get_info(&server);

        assert_eq!(info.server_info.name, env!("CARGO_PKG_NAME"));
        assert_eq!(info.server_info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.capabilities.tools.is_some());
    }

    /// Extract text from the first content item in a `CallToolResult`.
    fn extract_text(result: &CallToolResult) -> Option<&str> {
        result.content.first().and_then(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
    }

    fn comments_params(comments: &[&str]) -> AnalyzeCommentsParams {
        AnalyzeCommentsParams {
            comments: comments.iter().map(ToString::to_string).collect(),
            source: default_source(),
            format: ReportFormat::Json,
            include_records: false,
            overrides: AnalysisOverrides::default(),
        }
    }

    #[test]
    fn get_info_tool_returns_json_when_requested() {
        let server = SurveyServer::default();
        let params = Parameters(GetInfoParams {
            format: "json".to_string(),
        });

        let result = server.get_info(params).expect("get_info should succeed");
        let text = extract_text(&result).expect("should have text content");
        let json: serde_json::Value = serde_json::from_str(text).expect("valid JSON");
        assert_eq!(json["name"], env!("CARGO_PKG_NAME"));
    }

    #[test]
    fn score_sentiment_tool_labels_each_text() {
        let server = SurveyServer::default();
        let params = Parameters(ScoreSentimentParams {
            texts: vec!["Adoro trabalhar aqui".into(), "Péssimo ambiente".into()],
            threshold: None,
        });

        let result = server.score_sentiment(params).expect("should succeed");
        let json: serde_json::Value =
            serde_json::from_str(extract_text(&result).unwrap()).expect("valid JSON");
        assert_eq!(json[0]["label"], "positive");
        assert_eq!(json[1]["label"], "negative");
    }

    #[test]
    fn score_sentiment_rejects_bad_threshold() {
        let server = SurveyServer::default();
        let params = Parameters(ScoreSentimentParams {
            texts: vec!["ok".into()],
            threshold: Some(2.0),
        });
        assert!(server.score_sentiment(params).is_err());
    }

    #[test]
    fn analyze_comments_tool_returns_report() {
        let server = server();
        let params = Parameters(comments_params(&[
            "O refeitório é ótimo",
            "O refeitório é ótimo",
            "Salário atrasado de novo",
        ]));

        let result = server.analyze_comments(params).expect("should succeed");
        let json: serde_json::Value =
            serde_json::from_str(extract_text(&result).unwrap()).expect("valid JSON");
        assert_eq!(json["total"], 3);
        assert_eq!(json["sections"][0]["cluster_id"], 0);
        assert_eq!(json["sections"][0]["size"], 2);
    }

    #[test]
    fn analyze_comments_with_records_and_markdown() {
        let server = server();
        let mut params = comments_params(&["Gosto da equipe", "Gosto da equipe"]);
        params.include_records = true;
        let result = server.analyze_comments(Parameters(params)).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(extract_text(&result).unwrap()).unwrap();
        assert_eq!(json["records"].as_array().unwrap().len(), 2);

        let mut params = comments_params(&["Gosto da equipe"]);
        params.format = ReportFormat::Markdown;
        let result = server.analyze_comments(Parameters(params)).unwrap();
        assert!(extract_text(&result).unwrap().starts_with("# "));
    }

    #[test]
    fn analyze_comments_empty_is_not_an_error() {
        let server = server();
        let result = server
            .analyze_comments(Parameters(comments_params(&["nan", "   "])))
            .expect("empty batch is reported, not failed");
        assert!(extract_text(&result).unwrap().contains("nothing to analyze"));
    }

    #[test]
    fn analyze_comments_rejects_bad_eps() {
        let server = server();
        let mut params = comments_params(&["ok"]);
        params.overrides.eps = Some(0.0);
        assert!(server.analyze_comments(Parameters(params)).is_err());
    }

    #[test]
    fn analyze_files_tool_reads_exports() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("Base_RH_2023.csv");
        let b = dir.path().join("Base_TI_2023.csv");
        std::fs::write(&a, "comentario\nGosto da equipe\nGosto da equipe\n").unwrap();
        std::fs::write(&b, "comentario\nnan\n").unwrap();

        let server = server();
        let params = Parameters(AnalyzeFilesParams {
            paths: vec![
                a.to_string_lossy().into_owned(),
                b.to_string_lossy().into_owned(),
            ],
            by_source: true,
            overrides: AnalysisOverrides::default(),
        });
        let result = server.analyze_files(params).expect("should succeed");
        let json: serde_json::Value =
            serde_json::from_str(extract_text(&result).unwrap()).unwrap();
        assert_eq!(json[0]["source"], "RH");
        assert_eq!(json[0]["report"]["total"], 2);
        assert_eq!(json[1]["source"], "TI");
        assert!(json[1]["error"].is_string());
    }

    #[test]
    fn analyze_files_keeps_going_past_a_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("Base_RH_2025.csv");
        let bad = dir.path().join("Base_TI_2025.json");
        std::fs::write(&good, "comentario\nGosto da equipe\nGosto da equipe\n").unwrap();
        std::fs::write(&bad, "{not json").unwrap();
        let paths = vec![
            good.to_string_lossy().into_owned(),
            bad.to_string_lossy().into_owned(),
        ];

        let server = server();
        let params = Parameters(AnalyzeFilesParams {
            paths: paths.clone(),
            by_source: false,
            overrides: AnalysisOverrides::default(),
        });
        let result = server.analyze_files(params).expect("good file is analyzed");
        let json: serde_json::Value =
            serde_json::from_str(extract_text(&result).unwrap()).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["notices"][0]["source_base"], "TI");
        assert_eq!(json["notices"][0]["kind"], "unreadable_file");

        let params = Parameters(AnalyzeFilesParams {
            paths,
            by_source: true,
            overrides: AnalysisOverrides::default(),
        });
        let result = server.analyze_files(params).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(extract_text(&result).unwrap()).unwrap();
        assert_eq!(json[0]["source"], "RH");
        assert_eq!(json[1]["source"], "TI");
        assert!(json[1]["error"].as_str().unwrap().contains("file could not be read"));
    }
}

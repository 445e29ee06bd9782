//! Analyze command: run the full pipeline over survey exports.

use std::time::Duration;

use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use survey_lens_core::normalize::normalize_table;
use survey_lens_core::report::ReportFormat;
use survey_lens_core::{
    Analysis, AnalysisConfig, AnalysisError, Config, EmbeddingProvider, NoticeKind, Pipeline,
    Progress, SentimentLabel, Stage,
};

use super::{load_table, print_notices};

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Survey exports to analyze (.csv, .tsv or .json).
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<Utf8PathBuf>,

    /// Analyze each source as its own batch instead of one combined batch.
    #[arg(long)]
    pub by_source: bool,

    /// Write the report to FILE. With --by-source, one file per source is
    /// written next to FILE.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<Utf8PathBuf>,

    /// Report format for --output.
    #[arg(long, value_enum, default_value_t)]
    pub format: ReportFormat,

    /// Maximum cosine distance between neighbors.
    #[arg(long)]
    pub eps: Option<f64>,

    /// Neighbors (including the comment itself) needed to seed a cluster.
    #[arg(long)]
    pub min_samples: Option<usize>,

    /// Polarity magnitude needed for a positive or negative label.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Keywords reported per topic.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Seed for the 2-D projection.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Embedding provider. `hashing` needs no model download.
    #[arg(long, value_enum, value_name = "PROVIDER")]
    pub embedder: Option<EmbeddingProvider>,

    /// Sentence-transformer files in a local directory instead of the hub.
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<Utf8PathBuf>,

    /// Pretrained word vectors (.vec text format). Implies `--embedder word-vectors`.
    #[arg(long, value_name = "FILE")]
    pub vectors: Option<Utf8PathBuf>,
}

impl AnalyzeArgs {
    fn apply_overrides(&self, mut analysis: AnalysisConfig) -> AnalysisConfig {
        if let Some(eps) = self.eps {
            analysis.clustering.eps = eps;
        }
        if let Some(min_samples) = self.min_samples {
            analysis.clustering.min_samples = min_samples;
        }
        if let Some(threshold) = self.threshold {
            analysis.sentiment.threshold = threshold;
        }
        if let Some(top_k) = self.top_k {
            analysis.topics.top_k = top_k;
        }
        if let Some(seed) = self.seed {
            analysis.projection.seed = Some(seed);
        }
        if let Some(provider) = self.embedder {
            analysis.embedding.provider = provider;
        }
        if let Some(ref dir) = self.model_dir {
            analysis.embedding.model_dir = Some(dir.clone());
        }
        if let Some(ref vectors) = self.vectors {
            analysis.embedding.provider = EmbeddingProvider::WordVectors;
            analysis.embedding.vectors = Some(vectors.clone());
        }
        analysis
    }
}

/// Spinner on stderr driven by pipeline stages.
struct Spinner {
    enabled: bool,
    bar: Option<ProgressBar>,
}

impl Spinner {
    const fn new(enabled: bool) -> Self {
        Self { enabled, bar: None }
    }

    fn bar(&mut self) -> &ProgressBar {
        let enabled = self.enabled;
        self.bar.get_or_insert_with(|| {
            if !enabled {
                return ProgressBar::hidden();
            }
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }
}

impl Progress for Spinner {
    fn stage(&mut self, stage: Stage, items: usize) {
        self.bar()
            .set_message(format!("{} ({items})", stage.as_str()));
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[derive(Serialize)]
struct SourceOutcome<'a> {
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a Analysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Analyze survey exports.
#[instrument(name = "cmd_analyze", skip_all, fields(files = args.files.len(), by_source = args.by_source))]
pub fn cmd_analyze(
    args: AnalyzeArgs,
    global_json: bool,
    quiet: bool,
    config: &Config,
    max_input: Option<usize>,
) -> anyhow::Result<()> {
    debug!(files = ?args.files, format = ?args.format, "executing analyze command");

    let analysis_config = args.apply_overrides(config.analysis.clone());
    let table = load_table(&args.files, &analysis_config.source.markers, max_input)?;
    let pipeline = Pipeline::new(analysis_config).context("failed to prepare analysis")?;
    let columns = pipeline.comment_columns()?;
    let mut spinner = Spinner::new(!quiet && !global_json);

    if !args.by_source {
        spinner.stage(Stage::Normalize, table.rows.len());
        let batch = normalize_table(&table, &columns);
        if !global_json {
            print_notices(&batch.notices);
        }
        let analysis = match pipeline.run_batch(batch, &mut spinner) {
            Ok(analysis) => analysis,
            Err(AnalysisError::EmptyBatch) => {
                print_nothing_to_analyze(global_json, None);
                return Ok(());
            }
            Err(e) => return Err(e).context("analysis failed"),
        };
        let written = match args.output {
            Some(ref path) => Some(write_report(&analysis, path, args.format)?),
            None => None,
        };
        if global_json {
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        } else {
            print_summary(None, &analysis, written.as_deref());
        }
        return Ok(());
    }

    if !global_json {
        print_notices(&table.notices);
    }
    let results = pipeline.run_by_source(&table, &columns, &mut spinner);
    let mut outcomes = Vec::with_capacity(results.len());
    let mut failed = 0usize;
    for (source, result) in &results {
        let source = source.as_str();
        match result {
            Ok(analysis) => {
                let written = match args.output {
                    Some(ref path) => {
                        let target = source_output_path(path, source, args.format);
                        Some(write_report(analysis, &target, args.format)?)
                    }
                    None => None,
                };
                if !global_json {
                    print_summary(Some(source), analysis, written.as_deref());
                }
                outcomes.push(SourceOutcome {
                    source,
                    analysis: Some(analysis),
                    error: None,
                });
            }
            Err(AnalysisError::EmptyBatch) => {
                if !global_json {
                    print_nothing_to_analyze(false, Some(source));
                }
                outcomes.push(SourceOutcome {
                    source,
                    analysis: None,
                    error: Some(AnalysisError::EmptyBatch.to_string()),
                });
            }
            Err(e) => {
                failed += 1;
                if !global_json {
                    eprintln!("{} {}: {e}", "error:".red().bold(), source.bold());
                }
                outcomes.push(SourceOutcome {
                    source,
                    analysis: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    for notice in &table.notices {
        if notice.kind == NoticeKind::UnreadableFile
            && !outcomes.iter().any(|o| o.source == notice.source_base)
        {
            outcomes.push(SourceOutcome {
                source: &notice.source_base,
                analysis: None,
                error: Some(notice.message.clone()),
            });
        }
    }

    if global_json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else if results.is_empty() {
        print_nothing_to_analyze(false, None);
    }

    if failed > 0 {
        bail!("{failed} of {} source(s) could not be analyzed", results.len());
    }
    Ok(())
}

fn print_nothing_to_analyze(json: bool, source: Option<&str>) {
    if json {
        println!("{}", serde_json::json!({ "status": "empty", "message": "nothing to analyze" }));
        return;
    }
    match source {
        Some(source) => println!("{} {}", source.bold(), "nothing to analyze".dimmed()),
        None => println!("{}", "nothing to analyze".dimmed()),
    }
}

fn print_summary(source: Option<&str>, analysis: &Analysis, written: Option<&Utf8Path>) {
    let report = &analysis.report;
    match source {
        Some(source) => println!("{}", source.bold()),
        None => println!("{}", report.title.bold()),
    }
    println!(
        "\n  {} {} (model: {})",
        "Comments:".cyan(),
        report.total,
        analysis.model_id.dimmed()
    );

    let shares: Vec<String> = report
        .sentiment
        .iter()
        .map(|share| {
            let text = format!("{} {} ({:.1}%)", share.label, share.count, share.percentage);
            match share.label {
                SentimentLabel::Positive => text.green().to_string(),
                SentimentLabel::Neutral => text.yellow().to_string(),
                SentimentLabel::Negative => text.red().to_string(),
            }
        })
        .collect();
    println!("  {} {}", "Sentiment:".cyan(), shares.join(" / "));

    let clustered = report.sections.iter().filter(|s| s.cluster_id >= 0).count();
    let unclustered: usize = report
        .sections
        .iter()
        .filter(|s| s.cluster_id < 0)
        .map(|s| s.size)
        .sum();
    println!(
        "  {} {clustered} topic(s), {unclustered} unclustered comment(s)",
        "Topics:".cyan()
    );
    for section in &report.sections {
        let keywords: Vec<String> = section
            .keywords
            .iter()
            .take(5)
            .map(|k| format!("{} ({})", k.word, k.count))
            .collect();
        let id = if section.cluster_id < 0 {
            "--".to_string()
        } else {
            format!("#{}", section.cluster_id)
        };
        println!(
            "    {:>4}  {:>4} comment(s)  {:<8}  {}",
            id.bold(),
            section.size,
            section.dominant_sentiment.as_str(),
            keywords.join(", ").dimmed()
        );
    }

    if !report.warnings.is_empty() {
        println!(
            "  {} {} unreadable cell(s) skipped",
            "Warnings:".yellow(),
            report.warnings.len()
        );
    }
    if let Some(path) = written {
        println!("  {} {}", "Report:".cyan(), path.underline());
    }
    println!();
}

fn write_report(
    analysis: &Analysis,
    path: &Utf8Path,
    format: ReportFormat,
) -> anyhow::Result<Utf8PathBuf> {
    let rendered = analysis.report.render(format)?;
    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {parent}"))?;
    }
    std::fs::write(path, rendered).with_context(|| format!("failed to write {path}"))?;
    debug!(path = %path, format = ?format, "report written");
    Ok(path.to_path_buf())
}

/// `out/report.md` + `Recursos Humanos` -> `out/report-recursos-humanos.md`.
fn source_output_path(base: &Utf8Path, source: &str, format: ReportFormat) -> Utf8PathBuf {
    let slug: String = source
        .split(|c: char| !c.is_alphanumeric())
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    let stem = base.file_stem().unwrap_or("report");
    let ext = base.extension().unwrap_or(format.extension());
    let name = if slug.is_empty() {
        format!("{stem}.{ext}")
    } else {
        format!("{stem}-{slug}.{ext}")
    };
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_source_paths_are_slugged() {
        let base = Utf8Path::new("out/report.md");
        assert_eq!(
            source_output_path(base, "Recursos Humanos", ReportFormat::Markdown),
            Utf8PathBuf::from("out/report-recursos-humanos.md")
        );
        assert_eq!(
            source_output_path(Utf8Path::new("summary"), "TI", ReportFormat::Json),
            Utf8PathBuf::from("summary-ti.json")
        );
    }

    #[test]
    fn flags_override_configuration() {
        let args = AnalyzeArgs {
            files: vec![],
            by_source: false,
            output: None,
            format: ReportFormat::Markdown,
            eps: Some(0.5),
            min_samples: Some(3),
            threshold: Some(0.2),
            top_k: Some(4),
            seed: Some(9),
            embedder: Some(EmbeddingProvider::Hashing),
            model_dir: None,
            vectors: None,
        };
        let analysis = args.apply_overrides(AnalysisConfig::default());
        assert_eq!(analysis.clustering.eps, 0.5);
        assert_eq!(analysis.clustering.min_samples, 3);
        assert_eq!(analysis.sentiment.threshold, 0.2);
        assert_eq!(analysis.topics.top_k, 4);
        assert_eq!(analysis.projection.seed, Some(9));
        assert_eq!(analysis.embedding.provider, EmbeddingProvider::Hashing);
        assert!(analysis.embedding.vectors.is_none());
    }

    #[test]
    fn vectors_flag_selects_word_vectors() {
        let args = AnalyzeArgs {
            files: vec![],
            by_source: false,
            output: None,
            format: ReportFormat::Markdown,
            eps: None,
            min_samples: None,
            threshold: None,
            top_k: None,
            seed: None,
            embedder: None,
            model_dir: Some("models/minilm".into()),
            vectors: Some("cc.pt.300.vec".into()),
        };
        let analysis = args.apply_overrides(AnalysisConfig::default());
        assert_eq!(analysis.embedding.provider, EmbeddingProvider::WordVectors);
        assert_eq!(analysis.embedding.vectors.as_deref(), Some(Utf8Path::new("cc.pt.300.vec")));
        assert_eq!(analysis.embedding.model_dir.as_deref(), Some(Utf8Path::new("models/minilm")));
    }

    #[test]
    fn writes_report_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let table = survey_lens_core::input::SurveyTable::new(
            vec!["comentario".into()],
            vec![survey_lens_core::input::SurveyRow {
                source_base: "RH".into(),
                cells: vec!["Gosto muito da equipe".into()],
            }],
        );
        let config = AnalysisConfig {
            embedding: survey_lens_core::EmbeddingConfig::hashing(),
            ..AnalysisConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let columns = pipeline.comment_columns().unwrap();
        let analysis = pipeline
            .run(&table, &columns, &mut survey_lens_core::NoProgress)
            .unwrap();

        let target = root.join("nested/report.md");
        let written = write_report(&analysis, &target, ReportFormat::Markdown).unwrap();
        let text = std::fs::read_to_string(written).unwrap();
        assert!(text.contains("**Comments analyzed:** 1"));
    }
}

//! Info command implementation

use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use survey_lens_core::config::{Config, ConfigSources};
use tracing::{debug, instrument};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    repository: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    homepage: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            repository: env!("CARGO_PKG_REPOSITORY"),
            homepage: env!("CARGO_PKG_HOMEPAGE"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<String>,
    log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_input_bytes: Option<usize>,
    sentiment_threshold: f64,
    extra_lexicon_entries: usize,
    embedding_provider: String,
    embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vectors: Option<String>,
    embedding_dimensions: usize,
    eps: f64,
    min_samples: usize,
    n_neighbors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    top_k: usize,
    column_keywords: Vec<String>,
    source_markers: Vec<String>,
}

impl ConfigInfo {
    fn from_config(config: &Config, sources: &ConfigSources) -> Self {
        let analysis = &config.analysis;
        Self {
            config_file: sources.primary_file().map(|p| p.to_string()),
            log_level: config.log_level.as_str().to_string(),
            log_dir: config.log_dir.as_ref().map(|p| p.to_string()),
            max_input_bytes: config.input_limit(),
            sentiment_threshold: analysis.sentiment.threshold,
            extra_lexicon_entries: analysis.sentiment.extra_lexicon.len(),
            embedding_provider: analysis.embedding.provider.as_str().to_string(),
            embedding_model: analysis.embedding.model_source().to_string(),
            vectors: analysis.embedding.vectors.as_ref().map(|p| p.to_string()),
            embedding_dimensions: analysis.embedding.dimensions,
            eps: analysis.clustering.eps,
            min_samples: analysis.clustering.min_samples,
            n_neighbors: analysis.projection.n_neighbors,
            seed: analysis.projection.seed,
            top_k: analysis.topics.top_k,
            column_keywords: analysis.columns.keywords.clone(),
            source_markers: analysis.source.markers.clone(),
        }
    }
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
}

/// Print package information
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `config` - Loaded configuration
/// * `sources` - Config source metadata from loading
#[instrument(name = "cmd_info", skip_all, fields(json_output))]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    sources: &ConfigSources,
) -> anyhow::Result<()> {
    let info = PackageInfo::new();

    debug!(json_output = global_json, "executing info command");

    let config_info = ConfigInfo::from_config(config, sources);
    let full_info = FullInfo {
        package: info,
        config: config_info,
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&full_info)?);
        return Ok(());
    }

    let package = &full_info.package;
    println!("{} {}", package.name.bold(), package.version.green());
    if !package.description.is_empty() {
        println!("{}", package.description);
    }
    if !package.license.is_empty() {
        println!("{}: {}", "License".dimmed(), package.license);
    }
    if !package.repository.is_empty() {
        println!("{}: {}", "Repository".dimmed(), package.repository.cyan());
    }

    let cfg = &full_info.config;
    println!();
    println!("{}", "Configuration".bold().underline());
    if let Some(ref path) = cfg.config_file {
        println!("{}: {}", "Config file".dimmed(), path.cyan());
    } else {
        println!("{}: {}", "Config file".dimmed(), "none loaded".yellow());
    }
    println!("{}: {}", "Log level".dimmed(), cfg.log_level);
    if let Some(ref dir) = cfg.log_dir {
        println!("{}: {}", "Log directory".dimmed(), dir);
    }
    print_opt("Input limit (bytes)", &cfg.max_input_bytes);

    println!();
    println!("{}", "Analysis".bold().underline());
    println!("{}: {}", "Sentiment threshold".dimmed(), cfg.sentiment_threshold);
    println!("{}: {}", "Extra lexicon entries".dimmed(), cfg.extra_lexicon_entries);
    match cfg.embedding_provider.as_str() {
        "hashing" => println!(
            "{}: hashing ({} dims)",
            "Embedding".dimmed(),
            cfg.embedding_dimensions
        ),
        "word-vectors" => println!(
            "{}: word vectors {}",
            "Embedding".dimmed(),
            cfg.vectors.as_deref().unwrap_or("(not set)").cyan()
        ),
        _ => println!(
            "{}: sentence transformer {}",
            "Embedding".dimmed(),
            cfg.embedding_model.cyan()
        ),
    }
    println!(
        "{}: eps {}, min samples {}",
        "Clustering".dimmed(),
        cfg.eps,
        cfg.min_samples
    );
    println!("{}: {} neighbors", "Projection".dimmed(), cfg.n_neighbors);
    print_opt("Projection seed", &cfg.seed);
    println!("{}: {}", "Keywords per topic".dimmed(), cfg.top_k);
    println!(
        "{}: {}",
        "Comment columns".dimmed(),
        cfg.column_keywords.join(", ")
    );
    println!(
        "{}: {}",
        "Source markers".dimmed(),
        cfg.source_markers.join(", ")
    );

    Ok(())
}

/// Print an optional value or "(not set)".
fn print_opt<T: std::fmt::Display>(label: &str, value: &Option<T>) {
    match value {
        Some(v) => println!("{}: {}", label.dimmed(), v),
        None => println!("{}: {}", label.dimmed(), "(not set)".dimmed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::default()
    }

    fn test_sources() -> ConfigSources {
        ConfigSources::default()
    }

    #[test]
    fn test_cmd_info_text_succeeds() {
        assert!(cmd_info(InfoArgs::default(), false, &test_config(), &test_sources()).is_ok());
    }

    #[test]
    fn test_cmd_info_json_via_global() {
        assert!(cmd_info(InfoArgs::default(), true, &test_config(), &test_sources()).is_ok());
    }

    #[test]
    fn test_config_info_no_file() {
        let config = Config::default();
        let sources = ConfigSources::default();
        let info = ConfigInfo::from_config(&config, &sources);
        assert!(info.config_file.is_none());
        assert_eq!(info.log_level, "info");
        assert_eq!(info.seed, Some(42));
        assert!((info.sentiment_threshold - 0.1).abs() < f64::EPSILON);
        assert_eq!(info.embedding_provider, "sentence-transformer");
        assert_eq!(
            info.embedding_model,
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
        );
        assert_eq!(info.source_markers, vec!["pesquisa de clima", "base"]);
    }

    #[test]
    fn test_config_info_reflects_overrides() {
        let mut config = Config::default();
        config.analysis.clustering.eps = 0.25;
        config.disable_input_limit = true;
        let info = ConfigInfo::from_config(&config, &ConfigSources::default());
        assert_eq!(info.eps, 0.25);
        assert!(info.max_input_bytes.is_none());
    }
}

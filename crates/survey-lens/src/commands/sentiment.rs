//! Sentiment command: score ad-hoc comments without clustering.

use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use survey_lens_core::normalize::fold;
use survey_lens_core::{AnalysisConfig, SentimentLabel};

/// Arguments for the `sentiment` subcommand.
#[derive(Args, Debug)]
pub struct SentimentArgs {
    /// Comments to score.
    #[arg(required = true, value_name = "TEXT")]
    pub texts: Vec<String>,

    /// Polarity magnitude needed for a positive or negative label.
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ScoredComment<'a> {
    text: &'a str,
    polarity: f64,
    label: SentimentLabel,
}

/// Score each comment and print its label.
#[instrument(name = "cmd_sentiment", skip_all, fields(count = args.texts.len()))]
pub fn cmd_sentiment(
    args: SentimentArgs,
    global_json: bool,
    analysis: &AnalysisConfig,
) -> anyhow::Result<()> {
    let mut sentiment = analysis.sentiment.clone();
    if let Some(threshold) = args.threshold {
        sentiment.threshold = threshold;
    }
    if !(0.0..1.0).contains(&sentiment.threshold) {
        anyhow::bail!(
            "invalid threshold {}: must be in [0, 1)",
            sentiment.threshold
        );
    }
    debug!(threshold = sentiment.threshold, "executing sentiment command");

    let scorer = sentiment.scorer();
    let scored: Vec<ScoredComment<'_>> = args
        .texts
        .iter()
        .map(|text| {
            let result = scorer.score(&fold(text));
            ScoredComment {
                text: text.as_str(),
                polarity: result.polarity,
                label: result.label,
            }
        })
        .collect();

    if global_json {
        println!("{}", serde_json::to_string_pretty(&scored)?);
        return Ok(());
    }

    for item in &scored {
        let label = format!("{:<8}", item.label.as_str());
        let label = match item.label {
            SentimentLabel::Positive => label.green().to_string(),
            SentimentLabel::Neutral => label.yellow().to_string(),
            SentimentLabel::Negative => label.red().to_string(),
        };
        println!("{label} {:>+6.2}  {}", item.polarity, item.text);
    }
    Ok(())
}

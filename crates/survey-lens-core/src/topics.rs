//! Per-cluster keyword extraction and dominant sentiment.

use std::collections::{BTreeMap, HashMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cluster::NOISE;
use crate::error::{AnalysisError, AnalysisResult};
use crate::normalize;
use crate::sentiment::SentimentLabel;
use crate::word_lists::is_stop_word;

/// Default number of keywords per cluster.
pub const DEFAULT_TOP_K: usize = 10;

/// Default minimum keyword length, in characters.
pub const DEFAULT_MIN_TOKEN_LEN: usize = 4;

/// A keyword and how often it occurs in its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Keyword {
    /// The token, normalized.
    pub word: String,
    /// Occurrences across the cluster's comments.
    pub count: usize,
}

/// Summary of one cluster (or of the noise group, id `-1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterSummary {
    /// Cluster id; `-1` for unclustered comments.
    pub cluster_id: i32,
    /// Number of comments in the cluster; at least 1.
    pub size: usize,
    /// Most frequent sentiment label.
    pub dominant_sentiment: SentimentLabel,
    /// Most frequent keywords, most frequent first.
    pub top_keywords: Vec<Keyword>,
}

/// Keyword extraction settings plus the stop-word set.
#[derive(Debug, Clone)]
pub struct TopicSummarizer {
    top_k: usize,
    min_token_len: usize,
    extra_stop_words: HashSet<String>,
}

impl Default for TopicSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K, DEFAULT_MIN_TOKEN_LEN)
    }
}

impl TopicSummarizer {
    /// Create a summarizer with the built-in stop words.
    pub fn new(top_k: usize, min_token_len: usize) -> Self {
        Self {
            top_k,
            min_token_len,
            extra_stop_words: HashSet::new(),
        }
    }

    /// Add stop words on top of the built-in set.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extra_stop_words.extend(
            words
                .into_iter()
                .map(|w| normalize::strip_punctuation(&normalize::fold(w.as_ref())))
                .filter(|w| !w.is_empty()),
        );
        self
    }

    fn keeps(&self, token: &str) -> bool {
        token.chars().count() >= self.min_token_len
            && !is_stop_word(token)
            && !self.extra_stop_words.contains(token)
    }

    /// Top keywords over `texts`, by descending count, ties by first occurrence.
    pub fn keywords<'a, I>(&self, texts: I) -> Vec<Keyword>
    where
        I: IntoIterator<Item = &'a str>,
    {
        // word -> (count, first seen)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut position = 0usize;
        for text in texts {
            let stripped = normalize::strip_punctuation(text);
            for token in stripped.split(' ').filter(|t| self.keeps(t)) {
                counts.entry(token.to_string()).or_insert((0, position)).0 += 1;
                position += 1;
            }
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(word, (count, first))| (word, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(self.top_k)
            .map(|(word, count, _)| Keyword { word, count })
            .collect()
    }

    /// One summary per distinct cluster id, ordered by id with `-1` last.
    ///
    /// `cluster_ids`, `texts` and `labels` are parallel slices.
    #[tracing::instrument(skip_all, fields(comments = cluster_ids.len(), top_k = self.top_k))]
    pub fn summarize(
        &self,
        cluster_ids: &[i32],
        texts: &[&str],
        labels: &[SentimentLabel],
    ) -> AnalysisResult<Vec<ClusterSummary>> {
        if texts.len() != cluster_ids.len() || labels.len() != cluster_ids.len() {
            return Err(AnalysisError::InvalidParameter {
                name: "cluster_ids",
                reason: format!(
                    "{} ids for {} texts and {} labels",
                    cluster_ids.len(),
                    texts.len(),
                    labels.len()
                ),
            });
        }

        let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (idx, &id) in cluster_ids.iter().enumerate() {
            members.entry(id).or_default().push(idx);
        }

        let summaries: Vec<ClusterSummary> = section_order(members.keys().copied())
            .into_iter()
            .map(|id| {
                let idx = &members[&id];
                let cluster_labels: Vec<SentimentLabel> = idx.iter().map(|&i| labels[i]).collect();
                ClusterSummary {
                    cluster_id: id,
                    size: idx.len(),
                    dominant_sentiment: dominant_sentiment(&cluster_labels),
                    top_keywords: self.keywords(idx.iter().map(|&i| texts[i])),
                }
            })
            .collect();

        tracing::debug!(clusters = summaries.len(), "topics summarized");
        Ok(summaries)
    }
}

/// Cluster ids ascending, with [`NOISE`] moved to the end.
pub fn section_order(ids: impl IntoIterator<Item = i32>) -> Vec<i32> {
    let mut ids: Vec<i32> = ids.into_iter().collect();
    ids.sort_unstable_by_key(|&id| (id == NOISE, id));
    ids.dedup();
    ids
}

/// Most frequent label; ties go to the label with the higher
/// [`SentimentLabel::precedence`]. Empty input is neutral.
pub fn dominant_sentiment(labels: &[SentimentLabel]) -> SentimentLabel {
    SentimentLabel::ALL
        .into_iter()
        .map(|label| (labels.iter().filter(|&&l| l == label).count(), label))
        .filter(|&(count, _)| count > 0)
        .max_by_key(|&(count, label)| (count, label.precedence()))
        .map_or(SentimentLabel::Neutral, |(_, label)| label)
}

//! Sentence embeddings.
//!
//! Three providers share the [`Embedder`] trait:
//!
//! - [`SentenceModel`](crate::transformer::SentenceModel), the default, runs a
//!   pretrained multilingual sentence-transformer so comments with the same
//!   meaning land close together even when they share no words.
//! - [`WordVectorEmbedder`] averages pretrained word vectors read from a text
//!   `.vec` file (one `word v1 .. vD` line per word, optional `count dim`
//!   header). Out-of-vocabulary words fall back to hashed n-gram features in
//!   the same space.
//! - [`HashingEmbedder`] needs no external resource. It hashes word unigrams,
//!   word bigrams and character n-grams (3 to 5) into a fixed number of signed
//!   buckets. It measures shared wording, not meaning, and is meant for
//!   offline runs and tests.
//!
//! Every vector is L2-normalized. Models are loaded once per process through a
//! [`ModelCache`] and shared by every later batch that names the same model.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::normalize;
use crate::transformer::shared_sentence_model;
use crate::word_lists::is_stop_word;

/// Default dimensionality of the hashing embedder.
pub const DEFAULT_DIMENSIONS: usize = 256;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.7;
const CHAR_NGRAM_WEIGHT: f32 = 0.35;
const STOP_WORD_WEIGHT: f32 = 0.2;
const OOV_WEIGHT: f32 = 0.5;

/// Which model turns comments into vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum EmbeddingProvider {
    /// Pretrained multilingual sentence-transformer.
    #[default]
    SentenceTransformer,
    /// Averaged word vectors from a `.vec` file.
    WordVectors,
    /// Offline feature hashing over words and character n-grams.
    Hashing,
}

impl EmbeddingProvider {
    /// Configuration name of the provider.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SentenceTransformer => "sentence-transformer",
            Self::WordVectors => "word-vectors",
            Self::Hashing => "hashing",
        }
    }
}

/// Maps a batch of comments to fixed-length vectors.
pub trait Embedder: Send + Sync {
    /// Identifier of the model, stable for a fixed model version.
    fn model_id(&self) -> String;

    /// Length of every produced vector.
    fn dimensions(&self) -> usize;

    /// Embed a batch, preserving order.
    fn embed(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>>;
}

/// Process-wide, per-key single-initialization cache for loaded models.
///
/// The map lock is only held to find a key's slot. Loading happens under the
/// slot's own lock, so a slow load blocks callers of that key and nobody
/// else. Failed loads leave the slot empty and the next caller retries.
pub struct ModelCache<T> {
    slots: Mutex<HashMap<String, Arc<Mutex<Option<Arc<T>>>>>>,
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for ModelCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache").finish_non_exhaustive()
    }
}

impl<T> ModelCache<T> {
    /// Return the model cached under `key`, running `load` on first use.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> AnalysisResult<Arc<T>>
    where
        F: FnOnce() -> AnalysisResult<T>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = entry.as_ref() {
            tracing::debug!(key, "model cache hit");
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(load()?);
        *entry = Some(Arc::clone(&model));
        Ok(model)
    }
}

/// Ensure every vector has the same length as the first.
pub fn check_dimensions(vectors: &[Vec<f32>]) -> AnalysisResult<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let expected = first.len();
    match vectors.iter().position(|v| v.len() != expected) {
        Some(index) => Err(AnalysisError::DimensionMismatch {
            expected,
            found: vectors[index].len(),
            index,
        }),
        None => Ok(()),
    }
}

/// 64-bit FNV-1a. Stable across platforms and releases, unlike `std`'s hasher.
const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
        i += 1;
    }
    hash
}

fn add_feature(vector: &mut [f32], feature: &str, weight: f32) {
    let hash = fnv1a(feature.as_bytes());
    let bucket = (hash % vector.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

fn add_char_ngrams(vector: &mut [f32], token: &str, weight: f32) {
    let padded: Vec<char> = format!("<{token}>").chars().collect();
    let grams: Vec<String> = (3..=5)
        .flat_map(|n| padded.windows(n).map(|w| w.iter().collect::<String>()))
        .collect();
    if grams.is_empty() {
        return;
    }
    let per_gram = weight / (grams.len() as f32).sqrt();
    for gram in grams {
        add_feature(vector, &format!("c:{gram}"), per_gram);
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn tokens(text: &str) -> Vec<String> {
    normalize::strip_punctuation(&normalize::fold(text))
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Feature-hashing embedder over words and character n-grams.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-length vectors (minimum 1).
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed one text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let words = tokens(text);
        let mut vector = vec![0.0; self.dimensions];
        self.accumulate(&mut vector, &words, 1.0);
        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], words: &[String], scale: f32) {
        for word in words {
            let weight = if is_stop_word(word) {
                STOP_WORD_WEIGHT
            } else {
                UNIGRAM_WEIGHT
            } * scale;
            add_feature(vector, &format!("w:{word}"), weight);
            add_char_ngrams(vector, word, CHAR_NGRAM_WEIGHT * weight);
        }
        for pair in words.windows(2) {
            add_feature(
                vector,
                &format!("b:{} {}", pair[0], pair[1]),
                BIGRAM_WEIGHT * scale,
            );
        }
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> String {
        format!("hashing-ngram-v1/{}", self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Pretrained word vectors keyed by normalized word.
#[derive(Debug)]
pub struct WordVectors {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    /// Number of words in the vocabulary.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector length.
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Look up a normalized word.
    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Parse the text `.vec` format from a reader.
    pub fn from_reader<R: BufRead>(reader: R, origin: &Utf8Path) -> AnalysisResult<Self> {
        let unavailable = |reason: String| AnalysisError::ModelUnavailable {
            source_path: origin.to_path_buf(),
            reason,
        };

        let mut dimensions = 0usize;
        let mut vectors = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| unavailable(format!("read error: {e}")))?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let values: Vec<&str> = parts.collect();

            if line_no == 0
                && values.len() == 1
                && word.parse::<usize>().is_ok()
                && values[0].parse::<usize>().is_ok()
            {
                // "count dim" header
                continue;
            }

            let parsed: Result<Vec<f32>, _> = values.iter().map(|v| v.parse::<f32>()).collect();
            let vector = parsed
                .map_err(|e| unavailable(format!("line {}: bad number: {e}", line_no + 1)))?;
            if vector.is_empty() {
                return Err(unavailable(format!("line {}: no values", line_no + 1)));
            }
            if dimensions == 0 {
                dimensions = vector.len();
            } else if vector.len() != dimensions {
                return Err(unavailable(format!(
                    "line {}: {} values, expected {dimensions}",
                    line_no + 1,
                    vector.len()
                )));
            }
            vectors.entry(normalize::fold(word)).or_insert(vector);
        }

        if vectors.is_empty() {
            return Err(unavailable("file contains no vectors".to_string()));
        }
        Ok(Self {
            dimensions,
            vectors,
        })
    }

    /// Read a `.vec` file from disk.
    #[tracing::instrument(skip_all, fields(path = %path))]
    pub fn load(path: &Utf8Path) -> AnalysisResult<Self> {
        let file = File::open(path.as_std_path()).map_err(|e| AnalysisError::ModelUnavailable {
            source_path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let vectors = Self::from_reader(BufReader::new(file), path)?;
        tracing::info!(
            words = vectors.len(),
            dimensions = vectors.dimensions,
            "word vectors loaded"
        );
        Ok(vectors)
    }
}

static VECTOR_CACHE: LazyLock<ModelCache<WordVectors>> = LazyLock::new(ModelCache::default);

/// Load `path` once per process; later calls share the same vectors.
pub fn shared_word_vectors(path: &Utf8Path) -> AnalysisResult<Arc<WordVectors>> {
    VECTOR_CACHE.get_or_load(path.as_str(), || WordVectors::load(path))
}

/// Averages pretrained word vectors; hashes out-of-vocabulary words.
#[derive(Debug, Clone)]
pub struct WordVectorEmbedder {
    origin: Utf8PathBuf,
    vectors: Arc<WordVectors>,
    fallback: HashingEmbedder,
}

impl WordVectorEmbedder {
    /// Wrap already-loaded vectors.
    pub fn new(origin: impl Into<Utf8PathBuf>, vectors: Arc<WordVectors>) -> Self {
        let fallback = HashingEmbedder::new(vectors.dimensions());
        Self {
            origin: origin.into(),
            vectors,
            fallback,
        }
    }

    /// Load (or reuse) the vectors at `path`.
    pub fn open(path: &Utf8Path) -> AnalysisResult<Self> {
        Ok(Self::new(path, shared_word_vectors(path)?))
    }

    /// Embed one text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let words = tokens(text);
        let content: Vec<&String> = words.iter().filter(|w| !is_stop_word(w)).collect();
        let considered: Vec<&String> = if content.is_empty() {
            words.iter().collect()
        } else {
            content
        };

        let mut vector = vec![0.0; self.dimensions()];
        let mut oov = Vec::new();
        for word in considered {
            match self.vectors.get(word) {
                Some(v) => {
                    for (acc, x) in vector.iter_mut().zip(v) {
                        *acc += x;
                    }
                }
                None => oov.push(word.clone()),
            }
        }
        l2_normalize(&mut vector);
        if !oov.is_empty() {
            let mut hashed = vec![0.0; self.dimensions()];
            self.fallback.accumulate(&mut hashed, &oov, 1.0);
            l2_normalize(&mut hashed);
            for (acc, x) in vector.iter_mut().zip(&hashed) {
                *acc += OOV_WEIGHT * x;
            }
            l2_normalize(&mut vector);
        }
        vector
    }
}

impl Embedder for WordVectorEmbedder {
    fn model_id(&self) -> String {
        format!("word-vectors:{}", self.origin)
    }

    fn dimensions(&self) -> usize {
        self.vectors.dimensions()
    }

    fn embed(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Build the embedder `config` selects.
///
/// Fails with [`AnalysisError::ModelUnavailable`] when the selected model
/// cannot be loaded; there is no silent fallback to another provider.
pub fn embedder_for(config: &EmbeddingConfig) -> AnalysisResult<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::SentenceTransformer => Ok(shared_sentence_model(
            &config.model_source(),
            config.max_tokens,
        )?),
        EmbeddingProvider::WordVectors => {
            let path = config
                .vectors
                .as_deref()
                .ok_or(AnalysisError::InvalidParameter {
                    name: "embedding.vectors",
                    reason: "the word-vectors provider needs a .vec file".to_string(),
                })?;
            Ok(Arc::new(WordVectorEmbedder::open(path)?))
        }
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // `Result::unwrap_err` needs `T: Debug`.
    impl std::fmt::Debug for dyn Embedder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Embedder")
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn vectors_have_fixed_dimension_and_unit_norm() {
        let embedder = HashingEmbedder::new(64);
        let out = embedder
            .embed(&["salario baixo", "gosto muito da minha equipe", "x"])
            .unwrap();
        assert_eq!(out.len(), 3);
        for v in &out {
            assert_eq!(v.len(), 64);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed(&["o salario esta defasado"]).unwrap();
        let b = embedder.embed(&["o salario esta defasado"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn related_texts_are_closer_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let v = embedder
            .embed(&[
                "salario abaixo do mercado",
                "salarios abaixo do mercado",
                "cafe da copa sempre frio",
            ])
            .unwrap();
        assert!(cosine(&v[0], &v[1]) > cosine(&v[0], &v[2]));
        assert!(cosine(&v[0], &v[1]) > 0.5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashingEmbedder::new(8).embed_one("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn parses_vec_format_with_header() {
        let data = "3 2\nsalario 1 0\nequipe 0 1\nÓtimo 0.5 0.5\n";
        let vectors = WordVectors::from_reader(Cursor::new(data), Utf8Path::new("mem.vec")).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors.dimensions(), 2);
        assert_eq!(vectors.get("otimo"), Some(&[0.5, 0.5][..]));
    }

    #[test]
    fn ragged_vec_file_is_unavailable() {
        let data = "salario 1 0\nequipe 0 1 2\n";
        let err = WordVectors::from_reader(Cursor::new(data), Utf8Path::new("bad.vec")).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable { .. }));
    }

    fn embedding(provider: EmbeddingProvider) -> EmbeddingConfig {
        EmbeddingConfig {
            provider,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn missing_vec_file_is_unavailable() {
        let mut config = embedding(EmbeddingProvider::WordVectors);
        config.vectors = Some(Utf8PathBuf::from("/nonexistent/model.vec"));
        let err = embedder_for(&config).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable { .. }));
    }

    #[test]
    fn word_vectors_provider_needs_a_file() {
        let err = embedder_for(&embedding(EmbeddingProvider::WordVectors)).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidParameter { name: "embedding.vectors", .. }
        ));
    }

    #[test]
    fn sentence_transformer_is_the_default_provider() {
        assert_eq!(
            EmbeddingConfig::default().provider,
            EmbeddingProvider::SentenceTransformer
        );
    }

    #[test]
    fn missing_sentence_model_is_unavailable_without_fallback() {
        let mut config = EmbeddingConfig::default();
        config.model_dir = Some(Utf8PathBuf::from("/nonexistent/minilm"));
        let err = embedder_for(&config).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable { .. }));
        assert!(err.to_string().contains("/nonexistent/minilm"));
    }

    #[test]
    fn hashing_is_an_explicit_choice() {
        let mut config = embedding(EmbeddingProvider::Hashing);
        config.dimensions = 32;
        let embedder = embedder_for(&config).unwrap();
        assert_eq!(embedder.dimensions(), 32);
        assert_eq!(embedder.model_id(), "hashing-ngram-v1/32");
    }

    #[test]
    fn cache_loads_each_key_once_under_contention() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache = ModelCache::<usize>::default();
        let loads = AtomicUsize::new(0);
        let models: Vec<Arc<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        cache
                            .get_or_load("minilm", || {
                                loads.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(std::time::Duration::from_millis(20));
                                Ok(7)
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    }

    #[test]
    fn slow_load_does_not_block_other_keys() {
        use std::sync::mpsc;
        use std::time::Duration;

        let cache = ModelCache::<&str>::default();
        cache.get_or_load("small", || Ok("small")).unwrap();
        let cache = &cache;

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        std::thread::scope(|scope| {
            let slow = scope.spawn(move || {
                cache.get_or_load("large", || {
                    started_tx.send(()).unwrap();
                    release_rx
                        .recv_timeout(Duration::from_secs(5))
                        .map(|()| "large")
                        .map_err(|e| AnalysisError::ModelUnavailable {
                            source_path: Utf8PathBuf::from("large"),
                            reason: e.to_string(),
                        })
                })
            });
            started_rx.recv().unwrap();

            // Served while "large" is still loading.
            let hit = cache.get_or_load("small", || Ok("reloaded")).unwrap();
            let fresh = cache.get_or_load("other", || Ok("other")).unwrap();
            release_tx.send(()).unwrap();

            assert_eq!(*hit, "small");
            assert_eq!(*fresh, "other");
            assert_eq!(*slow.join().unwrap().unwrap(), "large");
        });
    }

    #[test]
    fn failed_load_is_retried() {
        let cache = ModelCache::<u8>::default();
        let err = cache
            .get_or_load("flaky", || {
                Err(AnalysisError::ModelUnavailable {
                    source_path: Utf8PathBuf::from("flaky"),
                    reason: "offline".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable { .. }));
        assert_eq!(*cache.get_or_load("flaky", || Ok(3)).unwrap(), 3);
    }

    #[test]
    fn word_vector_embedder_averages_known_words() {
        let data = "salario 1 0 0 0\nequipe 0 1 0 0\n";
        let vectors =
            Arc::new(WordVectors::from_reader(Cursor::new(data), Utf8Path::new("m.vec")).unwrap());
        let embedder = WordVectorEmbedder::new("m.vec", vectors);
        let v = embedder.embed_one("salario equipe");
        assert_eq!(v.len(), 4);
        assert!((v[0] - v[1]).abs() < 1e-6);
        assert!(v[0] > 0.7);
    }

    #[test]
    fn shared_vectors_load_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("tiny.vec")).unwrap();
        std::fs::write(&path, "a 1 0\nb 0 1\n").unwrap();
        let first = shared_word_vectors(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = shared_word_vectors(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn dimension_check_reports_index() {
        let err = check_dimensions(&[vec![0.0; 3], vec![0.0; 3], vec![0.0; 2]]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::DimensionMismatch {
                expected: 3,
                found: 2,
                index: 2
            }
        ));
    }
}

//! Pretrained sentence-transformer embeddings.
//!
//! A BERT-family encoder runs on the CPU through candle. Token states are
//! mean-pooled under the attention mask and L2-normalized, which is how
//! `sentence-transformers` checkpoints such as
//! `paraphrase-multilingual-MiniLM-L12-v2` are meant to be read.
//!
//! Model files (`config.json`, `tokenizer.json` and `model.safetensors` or
//! `pytorch_model.bin`) come from a local directory or from the Hugging Face
//! hub, whose download cache honors `HF_HOME`. Each model is loaded once per
//! process.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use camino::{Utf8Path, Utf8PathBuf};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::embedding::{Embedder, ModelCache};
use crate::error::{AnalysisError, AnalysisResult};

/// Hub id of the default multilingual sentence model.
pub const DEFAULT_MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

/// Hub revision used when none is configured.
pub const DEFAULT_REVISION: &str = "main";

/// Longest token sequence fed to the encoder; longer comments are truncated.
pub const DEFAULT_MAX_TOKENS: usize = 128;

const BATCH_SIZE: usize = 32;

/// Where a sentence model's files come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelSource {
    /// A repository on the Hugging Face hub.
    Hub {
        /// Repository id, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
        repo: String,
        /// Branch, tag or commit.
        revision: String,
    },
    /// A directory holding the model files.
    Local(Utf8PathBuf),
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Hub {
            repo: DEFAULT_MODEL.to_string(),
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hub { repo, revision } if revision == DEFAULT_REVISION => f.write_str(repo),
            Self::Hub { repo, revision } => write!(f, "{repo}@{revision}"),
            Self::Local(dir) => write!(f, "local:{dir}"),
        }
    }
}

impl ModelSource {
    fn origin(&self) -> Utf8PathBuf {
        match self {
            Self::Hub { repo, .. } => Utf8PathBuf::from(repo.as_str()),
            Self::Local(dir) => dir.clone(),
        }
    }

    fn unavailable(&self, reason: impl fmt::Display) -> AnalysisError {
        AnalysisError::ModelUnavailable {
            source_path: self.origin(),
            reason: reason.to_string(),
        }
    }

    fn resolve(&self) -> AnalysisResult<ModelFiles> {
        match self {
            Self::Local(dir) => ModelFiles::in_dir(dir).ok_or_else(|| {
                self.unavailable(
                    "expected config.json, tokenizer.json and model.safetensors or pytorch_model.bin",
                )
            }),
            Self::Hub { repo, revision } => {
                let api = ApiBuilder::new()
                    .with_progress(false)
                    .build()
                    .map_err(|e| self.unavailable(e))?;
                let repo = api.repo(Repo::with_revision(
                    repo.clone(),
                    RepoType::Model,
                    revision.clone(),
                ));
                let fetch = |name: &str| {
                    repo.get(name)
                        .map_err(|e| self.unavailable(format!("{name}: {e}")))
                };
                let config = fetch("config.json")?;
                let tokenizer = fetch("tokenizer.json")?;
                let weights = match repo.get("model.safetensors") {
                    Ok(path) => Weights::SafeTensors(path),
                    Err(e) => {
                        tracing::debug!(error = %e, "no safetensors weights, trying pytorch_model.bin");
                        Weights::Pth(fetch("pytorch_model.bin")?)
                    }
                };
                Ok(ModelFiles {
                    config,
                    tokenizer,
                    weights,
                })
            }
        }
    }
}

enum Weights {
    SafeTensors(PathBuf),
    Pth(PathBuf),
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Weights,
}

impl ModelFiles {
    fn in_dir(dir: &Utf8Path) -> Option<Self> {
        let config = dir.join("config.json").into_std_path_buf();
        let tokenizer = dir.join("tokenizer.json").into_std_path_buf();
        if !config.is_file() || !tokenizer.is_file() {
            return None;
        }
        let safetensors = dir.join("model.safetensors").into_std_path_buf();
        let pth = dir.join("pytorch_model.bin").into_std_path_buf();
        let weights = if safetensors.is_file() {
            Weights::SafeTensors(safetensors)
        } else if pth.is_file() {
            Weights::Pth(pth)
        } else {
            return None;
        };
        Some(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

/// A loaded sentence encoder.
pub struct SentenceModel {
    source: ModelSource,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
}

impl fmt::Debug for SentenceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentenceModel")
            .field("source", &self.source)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl SentenceModel {
    /// Resolve and load the model at `source`.
    #[tracing::instrument(skip_all, fields(model = %source))]
    pub fn load(source: &ModelSource, max_tokens: usize) -> AnalysisResult<Self> {
        let files = source.resolve()?;

        let raw = std::fs::read_to_string(&files.config)
            .map_err(|e| source.unavailable(format!("config.json: {e}")))?;
        let config: BertConfig = serde_json::from_str(&raw)
            .map_err(|e| source.unavailable(format!("config.json: {e}")))?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| source.unavailable(format!("tokenizer.json: {e}")))?;
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("<pad>"))
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);
        let pad_token = tokenizer
            .id_to_token(pad_id)
            .unwrap_or_else(|| "[PAD]".to_string());
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| source.unavailable(format!("tokenizer.json: {e}")))?;

        let device = Device::Cpu;
        let vb = match &files.weights {
            Weights::SafeTensors(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| source.unavailable(format!("model.safetensors: {e}")))?;
                VarBuilder::from_buffered_safetensors(bytes, DType::F32, &device)
            }
            Weights::Pth(path) => VarBuilder::from_pth(path, DType::F32, &device),
        }
        .map_err(|e| source.unavailable(format!("weights: {e}")))?;
        let model = BertModel::load(vb, &config)
            .map_err(|e| source.unavailable(format!("weights: {e}")))?;

        tracing::info!(dimensions = config.hidden_size, "sentence model loaded");
        Ok(Self {
            source: source.clone(),
            model,
            tokenizer,
            device,
            dimensions: config.hidden_size,
        })
    }

    fn failed(&self, e: impl fmt::Display) -> AnalysisError {
        self.source.unavailable(format!("inference failed: {e}"))
    }

    fn embed_batch(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| self.failed(e))?;

        let stack = |rows: Vec<&[u32]>| -> candle_core::Result<Tensor> {
            let rows = rows
                .into_iter()
                .map(|row| Tensor::new(row, &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            Tensor::stack(&rows, 0)
        };
        let forward = || -> candle_core::Result<Vec<Vec<f32>>> {
            let input_ids = stack(encodings.iter().map(|e| e.get_ids()).collect())?;
            let attention_mask =
                stack(encodings.iter().map(|e| e.get_attention_mask()).collect())?;
            let token_type_ids = input_ids.zeros_like()?;
            let hidden = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
            normalize_rows(&mean_pool(&hidden, &attention_mask)?)?.to_vec2::<f32>()
        };
        forward().map_err(|e| self.failed(e))
    }
}

/// Average token states `[batch, seq, hidden]` over positions where `mask`
/// `[batch, seq]` is non-zero.
pub fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?.unsqueeze(D::Minus1)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
    summed.broadcast_div(&counts)
}

/// Scale every row of `[batch, hidden]` to unit L2 norm. Zero rows stay zero.
pub fn normalize_rows(x: &Tensor) -> candle_core::Result<Tensor> {
    let norms = x.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12f32, f32::MAX)?;
    x.broadcast_div(&norms)
}

impl Embedder for SentenceModel {
    fn model_id(&self) -> String {
        self.source.to_string()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.embed_batch(chunk)?);
        }
        Ok(vectors)
    }
}

static MODELS: LazyLock<ModelCache<SentenceModel>> = LazyLock::new(ModelCache::default);

/// Load `source` once per process; later calls share the same model.
pub fn shared_sentence_model(
    source: &ModelSource,
    max_tokens: usize,
) -> AnalysisResult<Arc<SentenceModel>> {
    MODELS.get_or_load(&format!("{source}#{max_tokens}"), || {
        SentenceModel::load(source, max_tokens)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_ignores_padding() {
        let hidden = Tensor::new(
            &[[[1.0f32, 0.0], [3.0, 0.0], [100.0, 100.0]]],
            &Device::Cpu,
        )
        .unwrap();
        let mask = Tensor::new(&[[1u32, 1, 0]], &Device::Cpu).unwrap();
        let pooled = mean_pool(&hidden, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(pooled, vec![vec![2.0, 0.0]]);
    }

    #[test]
    fn rows_are_unit_length() {
        let x = Tensor::new(&[[3.0f32, 4.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let rows = normalize_rows(&x).unwrap().to_vec2::<f32>().unwrap();
        assert!((rows[0][0] - 0.6).abs() < 1e-6);
        assert!((rows[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(rows[1], vec![0.0, 0.0]);
    }

    #[test]
    fn empty_model_dir_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("config.json"), "{}").unwrap();
        let err = SentenceModel::load(&ModelSource::Local(dir), DEFAULT_MAX_TOKENS).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable { .. }));
        assert!(err.to_string().contains("tokenizer.json"));
    }

    #[test]
    fn unreadable_config_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        for name in ["config.json", "tokenizer.json", "model.safetensors"] {
            std::fs::write(dir.join(name), "not a model").unwrap();
        }
        let err = shared_sentence_model(&ModelSource::Local(dir), DEFAULT_MAX_TOKENS).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn model_ids_name_the_source() {
        assert_eq!(ModelSource::default().to_string(), DEFAULT_MODEL);
        let pinned = ModelSource::Hub {
            repo: "org/model".into(),
            revision: "v2".into(),
        };
        assert_eq!(pinned.to_string(), "org/model@v2");
        assert_eq!(
            ModelSource::Local(Utf8PathBuf::from("/models/minilm")).to_string(),
            "local:/models/minilm"
        );
    }
}

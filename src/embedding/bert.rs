//! 로컬 BERT 문장 임베딩 (candle)
//!
//! 기본 모델은 `sentence-transformers/all-MiniLM-L6-v2` (384차원)입니다.
//! 가중치는 `embedding_model_dir`에서 읽거나 Hugging Face Hub 캐시로 받습니다.
//! 토큰 임베딩을 어텐션 마스크로 평균 풀링한 뒤 L2 정규화합니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::Api;
use hf_hub::{Cache, Repo, RepoType};
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::EmbeddingProvider;

/// 기본 문장 임베딩 모델
pub const DEFAULT_BERT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// 시퀀스 최대 토큰 수 (all-MiniLM-L6-v2 학습 길이)
const MAX_SEQUENCE_LENGTH: usize = 256;
/// spawn_blocking 한 번에 처리할 입력 수
const BATCH_SIZE: usize = 32;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PYTORCH_FILE: &str = "pytorch_model.bin";

/// 모델 파일 위치
#[derive(Debug, Clone, PartialEq)]
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    /// 로컬 디렉토리에서 찾기 (safetensors 우선, 없으면 pytorch 체크포인트)
    fn from_dir(dir: &Path) -> Result<Self> {
        let config = dir.join(CONFIG_FILE);
        let tokenizer = dir.join(TOKENIZER_FILE);
        for required in [&config, &tokenizer] {
            if !required.is_file() {
                anyhow::bail!("Missing {} in model directory {:?}", required.display(), dir);
            }
        }

        let weights = [SAFETENSORS_FILE, PYTORCH_FILE]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                anyhow!(
                    "No {} or {} in model directory {:?}",
                    SAFETENSORS_FILE,
                    PYTORCH_FILE,
                    dir
                )
            })?;

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }

    /// Hub에서 받고, 실패하면 로컬 캐시로 대체
    fn from_hub(model_id: &str) -> Result<Self> {
        let repo = Repo::new(model_id.to_string(), RepoType::Model);

        let fetched = Api::new().map_err(anyhow::Error::from).and_then(|api| {
            let api = api.repo(repo.clone());
            Ok(Self {
                config: api.get(CONFIG_FILE)?,
                tokenizer: api.get(TOKENIZER_FILE)?,
                weights: api.get(SAFETENSORS_FILE)?,
            })
        });

        match fetched {
            Ok(files) => Ok(files),
            Err(err) => {
                tracing::warn!(
                    "Failed to fetch {} from the hub, falling back to local cache: {}",
                    model_id,
                    err
                );
                let cache = Cache::default().repo(repo);
                Ok(Self {
                    config: cache
                        .get(CONFIG_FILE)
                        .ok_or_else(|| anyhow!("Missing {} for {} in cache", CONFIG_FILE, model_id))?,
                    tokenizer: cache.get(TOKENIZER_FILE).ok_or_else(|| {
                        anyhow!("Missing {} for {} in cache", TOKENIZER_FILE, model_id)
                    })?,
                    weights: cache.get(SAFETENSORS_FILE).ok_or_else(|| {
                        anyhow!("Missing {} for {} in cache", SAFETENSORS_FILE, model_id)
                    })?,
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

struct BertRuntime {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// candle BERT 임베딩 프로바이더
pub struct BertEmbedding {
    runtime: Arc<BertRuntime>,
    dimension: usize,
    name: String,
}

impl std::fmt::Debug for BertEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEmbedding")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl BertEmbedding {
    /// 모델 로드
    ///
    /// # Arguments
    /// * `model_id` - Hub 모델 ID (매니페스트에 기록되는 이름)
    /// * `model_dir` - 있으면 Hub 대신 이 디렉토리의 파일 사용
    pub fn load(model_id: &str, model_dir: Option<&Path>) -> Result<Self> {
        let files = match model_dir {
            Some(dir) => ModelFiles::from_dir(dir)?,
            None => ModelFiles::from_hub(model_id)?,
        };
        tracing::debug!("Loading BERT model files: {:?}", files);

        let config_text = std::fs::read_to_string(&files.config)
            .with_context(|| format!("Failed to read {:?}", files.config))?;
        let config: BertConfig =
            serde_json::from_str(&config_text).context("Invalid BERT config.json")?;
        let HiddenSize { hidden_size } =
            serde_json::from_str(&config_text).context("config.json has no hidden_size")?;

        let device = Device::Cpu;
        let weights: HashMap<String, Tensor> =
            if files.weights.extension().and_then(|e| e.to_str()) == Some("safetensors") {
                candle_core::safetensors::load(&files.weights, &device)?
            } else {
                candle_core::pickle::read_all(&files.weights)?
                    .into_iter()
                    .collect()
            };
        let vb = VarBuilder::from_tensors(weights, DTYPE, &device);
        let model = BertModel::load(vb, &config).context("Failed to build BERT model")?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(anyhow::Error::msg)?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(anyhow::Error::msg)?;

        tracing::info!("Loaded {} (dimension: {})", model_id, hidden_size);

        Ok(Self {
            runtime: Arc::new(BertRuntime {
                model,
                tokenizer,
                device,
            }),
            dimension: hidden_size,
            name: model_id.to_string(),
        })
    }
}

impl BertRuntime {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(anyhow::Error::msg)?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = mean_pool_l2(&hidden, &attention_mask)?;

        Ok(pooled.to_vec2::<f32>()?)
    }
}

/// 마스크된 평균 풀링 + L2 정규화
///
/// `hidden`은 `[B, T, H]`, `attention_mask`는 `[B, T]`입니다. 패딩 토큰은 평균에서 빠집니다.
pub(crate) fn mean_pool_l2(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.maximum(1e-9)?;
    let mean = summed.broadcast_div(&counts)?;

    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
    mean.broadcast_div(&norm)
}

#[async_trait]
impl EmbeddingProvider for BertEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("BERT returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let runtime = Arc::clone(&self.runtime);
            let batch = batch.to_vec();
            let vectors = tokio::task::spawn_blocking(move || runtime.encode(&batch))
                .await
                .context("BERT embedding task panicked")??;
            results.extend(vectors);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

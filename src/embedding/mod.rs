//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 세 가지 프로바이더를 제공합니다.
//! - [`BertEmbedding`]: candle 로컬 문장 임베딩 (기본값, all-MiniLM-L6-v2)
//! - [`OpenAiEmbedding`]: OpenAI 호환 `/embeddings` 엔드포인트 (`embedding_base_url` 지정 시)
//! - [`HashingEmbedding`]: 결정적 피처 해싱 (`hashing-<dim>`, 오프라인 스모크 테스트용)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config)?;
//! let embedding = embedder.embed("evidential deep learning").await?;
//! ```

mod bert;
mod remote;

use std::hash::Hasher;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use twox_hash::XxHash64;

use crate::config::Config;

pub use bert::{BertEmbedding, DEFAULT_BERT_MODEL};
pub use remote::OpenAiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 빌드와 검색에 같은 프로바이더를 써야 합니다. 인덱스 매니페스트에
/// `name()`이 기록되고 로드 시 비교됩니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수 (원격 모델은 첫 응답 전까지 0)
    fn dimension(&self) -> usize;

    /// 프로바이더/모델 식별자
    fn name(&self) -> &str;
}

// ============================================================================
// Hashing Embedding
// ============================================================================

/// 해싱 임베딩 기본 차원
pub const DEFAULT_HASHING_DIMENSION: usize = 384;

/// 해싱 모델 식별자 접두사
pub const HASHING_PREFIX: &str = "hashing";

/// 로컬 피처 해싱 임베딩
///
/// 소문자 토큰을 XxHash64로 버킷에 투영하고 부호 해싱 후 L2 정규화합니다.
/// 같은 입력에 대해 항상 같은 벡터를 반환합니다. 의미 유사도는 없고 어휘 겹침만
/// 반영하므로 모델 없이 파이프라인을 돌려볼 때만 씁니다.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    name: String,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Hashing embedding dimension must be positive");
        }

        Ok(Self {
            dimension,
            name: format!("{}-{}", HASHING_PREFIX, dimension),
        })
    }

    fn bucket(token: &str) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(token.as_bytes());
        hasher.finish()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = Self::bucket(token);
            let idx = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// - `hashing` / `hashing-<dim>`: 로컬 해싱
/// - `embedding_base_url`이 있으면: 해당 OpenAI 호환 엔드포인트 (API 키 필요)
/// - 그 외: Hub 모델 ID로 보고 candle BERT 로드 (`embedding_model_dir` 우선)
pub fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let model = config.embedding_model.trim();

    if let Some(dimension) = parse_hashing_model(model)? {
        let embedder = HashingEmbedding::new(dimension)?;
        tracing::info!("Using local hashing embedding (dimension: {})", dimension);
        return Ok(Arc::new(embedder));
    }

    if let Some(base_url) = config.embedding_base_url.as_deref() {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "Remote embedding model '{}' needs an API key. Set GROQ_API_KEY.",
                model
            )
        })?;

        let embedder = OpenAiEmbedding::new(api_key.to_string(), base_url, model)?;
        tracing::info!("Using remote embedding model {} at {}", model, base_url);
        return Ok(Arc::new(embedder));
    }

    let embedder = BertEmbedding::load(model, config.embedding_model_dir.as_deref())
        .with_context(|| format!("Failed to load embedding model '{}'", model))?;
    Ok(Arc::new(embedder))
}

/// `hashing[-<dim>]` 이름이면 차원 반환
fn parse_hashing_model(model: &str) -> Result<Option<usize>> {
    let Some(rest) = model.strip_prefix(HASHING_PREFIX) else {
        return Ok(None);
    };

    match rest.strip_prefix('-') {
        Some(dim) => dim
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid hashing dimension in '{}'", model)),
        None if rest.is_empty() => Ok(Some(DEFAULT_HASHING_DIMENSION)),
        None => anyhow::bail!("Unknown embedding model '{}'", model),
    }
}

// ============================================================================
// Tests
// ============================================================================

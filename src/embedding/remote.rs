//! OpenAI 호환 원격 임베딩
//!
//! Groq는 `/embeddings`를 제공하지 않으므로 `embedding_base_url`을 따로 지정했을 때만 씁니다.
//! 429/5xx/네트워크 에러는 [`RetryPolicy`]로 재시도하고, `Retry-After` 헤더가 있으면 그 값을 따릅니다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::scraper::RetryPolicy;

/// 요청당 최대 입력 수
const BATCH_SIZE: usize = 64;
/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 원격 임베딩 기본 재시도 정책 (2초, 4초, 8초)
pub const EMBEDDING_RETRY_POLICY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    initial_delay: Duration::from_secs(2),
};

/// OpenAI 호환 원격 임베딩
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    policy: RetryPolicy,
    dimension: AtomicUsize,
}

/// 한 번의 요청 실패
#[derive(Debug)]
enum Attempt {
    /// 재시도할 가치가 있음 (429, 5xx, 전송 실패)
    Retryable {
        reason: String,
        retry_after: Option<Duration>,
    },
    Fatal(anyhow::Error),
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiEmbedding {
    /// 새 원격 임베딩 생성
    ///
    /// # Arguments
    /// * `api_key` - Bearer 토큰
    /// * `base_url` - 예: `https://api.openai.com/v1`
    /// * `model` - 예: `text-embedding-3-small`
    pub fn new(api_key: String, base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            client,
            policy: EMBEDDING_RETRY_POLICY,
            dimension: AtomicUsize::new(0),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut retry = 0;

        loop {
            match self.send(inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retryable {
                    reason,
                    retry_after,
                }) => {
                    if retry >= self.policy.max_retries {
                        anyhow::bail!(
                            "Embedding request failed after {} attempts: {}",
                            retry + 1,
                            reason
                        );
                    }

                    let delay = retry_after.unwrap_or_else(|| self.policy.delay_for(retry));
                    tracing::warn!(
                        "Embedding request failed ({}), retrying in {:?} (attempt {}/{})",
                        reason,
                        delay,
                        retry + 1,
                        self.policy.max_attempts()
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }

    async fn send(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, Attempt> {
        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Attempt::Retryable {
                reason: format!("transport error: {}", e),
                retry_after: None,
            })?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.map_err(|e| Attempt::Retryable {
            reason: format!("failed to read body: {}", e),
            retry_after: None,
        })?;

        if status.is_success() {
            return parse_embed_response(&body, inputs.len()).map_err(Attempt::Fatal);
        }

        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Attempt::Retryable {
                reason: format!("{}: {}", status, message),
                retry_after,
            });
        }

        Err(Attempt::Fatal(anyhow::anyhow!(
            "Embedding API error ({}): {}",
            status,
            message
        )))
    }

    fn record_dimension(&self, vectors: &[Vec<f32>]) {
        if let Some(first) = vectors.first() {
            self.dimension.store(first.len(), Ordering::Relaxed);
        }
    }
}

/// `Retry-After` 초 단위 값
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 응답을 입력 순서대로 정렬해 반환
fn parse_embed_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbedResponse =
        serde_json::from_str(body).context("Failed to parse embedding response")?;

    if response.data.len() != expected {
        anyhow::bail!(
            "Embedding API returned {} vectors for {} inputs",
            response.data.len(),
            expected
        );
    }

    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            anyhow::bail!("Cannot embed empty text");
        }

        let mut vectors = self.request(&[text.to_string()]).await?;
        self.record_dimension(&vectors);
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding API returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(BATCH_SIZE)
            );
            let vectors = self.request(batch).await?;
            self.record_dimension(&vectors);
            results.extend(vectors);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

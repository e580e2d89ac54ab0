//! PDF 다운로드 - 재시도 + 지수 백오프
//!
//! 기본 정책: 최초 시도 후 3번 재시도 (1초, 2초, 4초 대기).
//! 모든 시도가 실패하면 해당 항목만 `Download` 에러가 됩니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::RagError;

/// PDF 파일 매직 바이트
const PDF_MAGIC: &[u8] = b"%PDF";

// ============================================================================
// Retry Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최초 시도 이후 재시도 횟수
    pub max_retries: u32,
    /// 첫 재시도 전 대기 시간 (이후 2배씩)
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `retry`번째 재시도 전 대기 시간 (0부터)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(retry)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// 실패하면 정책에 따라 재시도
///
/// 모든 시도가 실패하면 마지막 에러를 담은 `RagError::Download`를 반환합니다.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut operation: F,
) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    "Download of {} failed (attempt {}/{}): {:#}. Retrying in {:?}",
                    url,
                    retry + 1,
                    policy.max_attempts(),
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => {
                return Err(RagError::Download {
                    url: url.to_string(),
                    attempts: retry + 1,
                    reason: format!("{:#}", e),
                });
            }
        }
    }
}

// ============================================================================
// Fetchers
// ============================================================================

/// URL에서 PDF 바이트를 가져오는 수단
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest 기반 fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP 요청 실패")?
            .error_for_status()
            .context("HTTP 상태 오류")?;

        let bytes = response.bytes().await.context("응답 본문 읽기 실패")?;

        if !bytes.starts_with(PDF_MAGIC) {
            anyhow::bail!("response is not a PDF ({} bytes)", bytes.len());
        }

        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Downloader
// ============================================================================

pub struct Downloader {
    fetcher: Arc<dyn PdfFetcher>,
    policy: RetryPolicy,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn PdfFetcher>, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// PDF 다운로드 (재시도 포함)
    pub async fn download(&self, url: &str) -> crate::error::Result<Vec<u8>> {
        tracing::debug!("Downloading {}", url);
        retry_with_backoff(&self.policy, url, || self.fetcher.fetch(url)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// 지정한 URL은 항상 실패하는 fetcher
    #[derive(Default)]
    pub(crate) struct FlakyFetcher {
        pub failing: HashSet<String>,
        /// 처음 n번만 실패하는 URL
        pub fail_first: HashMap<String, u32>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FlakyFetcher {
        pub fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl PdfFetcher for FlakyFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            let previous = self.calls_for(url) as u32;
            self.calls.lock().unwrap().push(url.to_string());

            if self.failing.contains(url) {
                anyhow::bail!("connection reset");
            }
            if let Some(&n) = self.fail_first.get(url) {
                if previous < n {
                    anyhow::bail!("503 Service Unavailable");
                }
            }
            Ok(b"%PDF-1.5 fake".to_vec())
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_after_schedule() {
        let fetcher = Arc::new(FlakyFetcher {
            failing: HashSet::from(["https://arxiv.org/pdf/1".to_string()]),
            ..Default::default()
        });
        let downloader = Downloader::new(fetcher.clone(), RetryPolicy::default());

        let start = tokio::time::Instant::now();
        let err = downloader
            .download("https://arxiv.org/pdf/1")
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(fetcher.calls_for("https://arxiv.org/pdf/1"), 4);
        match err {
            RagError::Download { attempts, reason, .. } => {
                assert_eq!(attempts, 4);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let fetcher = Arc::new(FlakyFetcher {
            fail_first: HashMap::from([("https://hal.science/a.pdf".to_string(), 2)]),
            ..Default::default()
        });
        let downloader = Downloader::new(fetcher.clone(), RetryPolicy::default());

        let start = tokio::time::Instant::now();
        let bytes = downloader.download("https://hal.science/a.pdf").await.unwrap();

        assert!(bytes.starts_with(PDF_MAGIC));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(fetcher.calls_for("https://hal.science/a.pdf"), 3);
    }
}

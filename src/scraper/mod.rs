//! 논문 스크래퍼 모듈 - arXiv / HAL
//!
//! 검색 → PDF 다운로드(재시도) → 사이드카 메타데이터 저장 → 링크 기록 순서로 진행합니다.
//! 한 논문의 다운로드 실패는 해당 항목만 실패로 기록하고 배치는 계속됩니다.

pub mod arxiv;
pub mod download;
pub mod hal;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::io::AsyncWriteExt;

use crate::collector::{sidecar_path, LINKS_FILE};
use crate::error::RagError;
use crate::knowledge::DocumentMetadata;

pub use download::{retry_with_backoff, Downloader, HttpFetcher, PdfFetcher, RetryPolicy};

/// 다운로드 사이 대기 시간
pub const DOWNLOAD_PAUSE: Duration = Duration::from_secs(1);

/// 파일 이름에 쓰는 제목 최대 길이 (문자)
pub const MAX_TITLE_CHARS: usize = 50;

// ============================================================================
// Types
// ============================================================================

/// 검색 소스
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Source {
    Arxiv,
    Hal,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Arxiv => write!(f, "arxiv"),
            Source::Hal => write!(f, "hal"),
        }
    }
}

/// 검색된 논문
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    /// 소스 내 식별자 (arXiv id, HAL id)
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub pdf_url: String,
    /// 원본 페이지 링크 (`scraped_links.txt`에 기록)
    pub link: String,
    pub summary: Option<String>,
}

impl Paper {
    /// `<id>_<정리된 제목 50자>.pdf`
    pub fn file_name(&self) -> String {
        let title: String = sanitize_filename(&self.title)
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect();
        format!("{}_{}.pdf", sanitize_filename(&self.id), title)
    }

    fn metadata(&self, source: Source) -> DocumentMetadata {
        DocumentMetadata {
            title: Some(self.title.clone()),
            authors: self.authors.clone(),
            year: self.year,
            source: Some(source.to_string()),
            link: Some(self.link.clone()),
            ..Default::default()
        }
    }
}

/// 저장 결과
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub saved: Vec<PathBuf>,
    /// 항목별 실패 (`Download` 에러 등)
    pub failures: Vec<RagError>,
}

// ============================================================================
// ThesisScraper
// ============================================================================

pub struct ThesisScraper {
    client: reqwest::Client,
    downloader: Downloader,
    data_dir: PathBuf,
    pause: Duration,
}

impl ThesisScraper {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("thesis-rag/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        let fetcher = Arc::new(HttpFetcher::new(client.clone()));
        Ok(Self {
            client,
            downloader: Downloader::new(fetcher, RetryPolicy::default()),
            data_dir: data_dir.into(),
            pause: DOWNLOAD_PAUSE,
        })
    }

    /// 다운로드 수단 교체
    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 소스별 검색
    pub async fn search(&self, query: &str, source: Source, count: usize) -> Result<Vec<Paper>> {
        match source {
            Source::Arxiv => arxiv::search(&self.client, query, count).await,
            Source::Hal => hal::search(&self.client, query, count).await,
        }
    }

    /// 검색 후 저장
    pub async fn scrape(&self, query: &str, source: Source, count: usize) -> Result<ScrapeReport> {
        let papers = self
            .search(query, source, count)
            .await
            .with_context(|| format!("{} 검색 실패", source))?;

        if papers.is_empty() {
            tracing::warn!("No {} results for {:?}", source, query);
        }

        self.save_papers(&papers, source).await
    }

    /// 논문 PDF 저장
    ///
    /// 성공한 논문마다 PDF, 사이드카, 링크 한 줄이 기록됩니다.
    pub async fn save_papers(&self, papers: &[Paper], source: Source) -> Result<ScrapeReport> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", self.data_dir))?;

        let mut report = ScrapeReport::default();

        for (i, paper) in papers.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pause).await;
            }

            tracing::info!("Downloading: {}", paper.title);

            let bytes = match self.downloader.download(&paper.pdf_url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.failures.push(e);
                    continue;
                }
            };

            match self.save_paper(paper, source, &bytes).await {
                Ok(path) => {
                    tracing::info!("Saved to: {:?}", path);
                    report.saved.push(path);
                }
                Err(e) => {
                    tracing::warn!("Failed to save {}: {:#}", paper.title, e);
                    report.failures.push(RagError::Other(e));
                }
            }
        }

        tracing::info!(
            "Downloaded {} of {} papers ({} failed)",
            report.saved.len(),
            papers.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn save_paper(&self, paper: &Paper, source: Source, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.data_dir.join(paper.file_name());

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;

        let sidecar = serde_json::to_string_pretty(&paper.metadata(source))?;
        tokio::fs::write(sidecar_path(&path), sidecar)
            .await
            .context("Failed to write sidecar metadata")?;

        append_link(&self.data_dir, &paper.link).await?;
        Ok(path)
    }
}

/// 링크 목록에 한 줄 추가
async fn append_link(data_dir: &Path, link: &str) -> Result<()> {
    let path = data_dir.join(LINKS_FILE);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;

    file.write_all(format!("{}\n", link).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

// ============================================================================
// Source Listing
// ============================================================================

/// 다운로드된 파일과 기록된 링크
#[derive(Debug, Default)]
pub struct SourceListing {
    pub pdfs: Vec<String>,
    pub links: Vec<String>,
}

/// 데이터 디렉토리의 PDF와 링크 목록 (읽기 전용)
pub fn list_sources(data_dir: &Path) -> Result<SourceListing> {
    if !data_dir.is_dir() {
        anyhow::bail!("Documents directory not found: {:?}", data_dir);
    }

    let mut pdfs: Vec<String> = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read {:?}", data_dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.to_lowercase().ends_with(".pdf"))
        .collect();
    pdfs.sort();

    let links = match std::fs::read_to_string(data_dir.join(LINKS_FILE)) {
        Ok(raw) => raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    };

    Ok(SourceListing { pdfs, links })
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 파일 이름에 쓸 수 없는 문자를 `_`로 치환
pub fn sanitize_filename(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE
        .get_or_init(|| Regex::new(r"[^\w\-_\. ]").expect("Invalid regex"))
        .replace_all(name, "_")
        .into_owned()
}

/// 연속 공백을 하나로
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Tests
// ============================================================================

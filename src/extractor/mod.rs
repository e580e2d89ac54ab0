//! 문서 로딩 모듈
//!
//! 코퍼스 디렉토리의 파일을 [`Document`]로 변환합니다.
//! - 텍스트 파일: 파일 하나가 문서 하나
//! - PDF 파일: 페이지 하나가 문서 하나 (페이지 번호 포함)
//!
//! 메타데이터 우선순위: 사이드카(`<file>.meta.json`) → PDF Info 사전 → 파일 경로.
//! 읽을 수 없는 파일은 경고 후 건너뛰고 나머지는 계속 처리합니다.

pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::collector::{sidecar_path, CollectedFile, FileCollector, FileType};
use crate::error::{RagError, Result};
use crate::knowledge::{Document, DocumentMetadata};

// ============================================================================
// Load Report
// ============================================================================

/// 디렉토리 로딩 결과
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    /// 읽은 파일 수
    pub files_loaded: usize,
    /// 건너뛴 파일 (`DocumentLoad` 에러)
    pub failures: Vec<RagError>,
}

// ============================================================================
// DocumentLoader
// ============================================================================

pub struct DocumentLoader {
    collector: FileCollector,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(FileCollector::with_defaults())
    }
}

impl DocumentLoader {
    pub fn new(collector: FileCollector) -> Self {
        Self { collector }
    }

    /// 디렉토리 전체 로딩
    ///
    /// 디렉토리 자체가 없으면 에러, 개별 파일 실패는 `failures`에 기록됩니다.
    pub async fn load_directory(&self, dir: &Path) -> Result<LoadReport> {
        let files = self
            .collector
            .collect_directory(dir)
            .with_context(|| format!("Cannot read corpus directory {:?}", dir))?;

        let mut report = LoadReport::default();

        for file in &files {
            match self.load_file(file).await {
                Ok(documents) => {
                    tracing::debug!("Loaded {:?} ({} documents)", file.path, documents.len());
                    report.files_loaded += 1;
                    report.documents.extend(documents);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        tracing::info!(
            "Loaded {} documents from {} files ({} skipped)",
            report.documents.len(),
            report.files_loaded,
            report.failures.len()
        );
        Ok(report)
    }

    /// 파일 하나 로딩
    pub async fn load_file(&self, file: &CollectedFile) -> Result<Vec<Document>> {
        let mut metadata = read_sidecar(&file.path).await;
        if metadata.source.is_none() {
            metadata.source = Some(file.path.display().to_string());
        }

        match file.file_type {
            FileType::Text => {
                let text = tokio::fs::read_to_string(&file.path)
                    .await
                    .map_err(|e| load_error(&file.path, e))?;
                Ok(vec![Document::new(text, metadata)])
            }
            FileType::Pdf => self.load_pdf(&file.path, metadata).await,
        }
    }

    async fn load_pdf(&self, path: &Path, mut metadata: DocumentMetadata) -> Result<Vec<Document>> {
        // PDF 파싱은 CPU 바운드
        let owned: PathBuf = path.to_path_buf();
        let pdf::PdfContent { pages, info } =
            tokio::task::spawn_blocking(move || pdf::extract(&owned))
                .await
                .map_err(|e| load_error(path, e))?
                .map_err(|e| load_error(path, format!("{:#}", e)))?;

        metadata.fill_from(&DocumentMetadata {
            title: info.title,
            authors: info
                .author
                .as_deref()
                .map(pdf::split_authors)
                .unwrap_or_default(),
            creation_date: info.creation_date,
            ..Default::default()
        });

        let total_pages = pages.len();
        Ok(pages
            .into_iter()
            .map(|(page, text)| {
                let mut meta = metadata.clone();
                meta.page = Some(page);
                meta.total_pages = Some(total_pages);
                Document::new(text, meta)
            })
            .collect())
    }
}

/// 사이드카 메타데이터 읽기 (없거나 손상되면 빈 값)
async fn read_sidecar(path: &Path) -> DocumentMetadata {
    let sidecar = sidecar_path(path);

    let raw = match tokio::fs::read_to_string(&sidecar).await {
        Ok(raw) => raw,
        Err(_) => return DocumentMetadata::default(),
    };

    match serde_json::from_str(&raw) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!("Ignoring unreadable sidecar {:?}: {}", sidecar, e);
            DocumentMetadata::default()
        }
    }
}

fn load_error(path: &Path, reason: impl ToString) -> RagError {
    RagError::DocumentLoad {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

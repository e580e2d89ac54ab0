//! 에러 분류
//!
//! 파이프라인 경계에서 사용자에게 노출되는 실패 유형입니다.
//! 내부 I/O(LanceDB, SQLite, HTTP)는 `anyhow`로 전파되고,
//! 경계에서 아래 변형 중 하나로 변환됩니다.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// 필수 설정 누락 (시작 시 치명적)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 인덱스가 없거나 손상됨
    #[error(
        "no usable vector index at {}: {reason}. Run `thesis-rag index` to build it first.",
        path.display()
    )]
    IndexNotFound { path: PathBuf, reason: String },

    /// 단일 문서 읽기 실패 (배치는 계속 진행)
    #[error("failed to load document {}: {reason}", path.display())]
    DocumentLoad { path: PathBuf, reason: String },

    /// 재시도 후에도 실패한 다운로드
    #[error("download of {url} failed after {attempts} attempts: {reason}. Check the network connection and retry the scrape.")]
    Download {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// 언어 모델 호출 실패
    #[error("language model call failed: {0}")]
    Generation(String),

    /// 모델 채점 실패 (0점과 구분됨)
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// 잘못된 검색 요청 (k = 0 등)
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RagError {
    pub(crate) fn index_not_found(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::IndexNotFound {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

//! 설정 모듈
//!
//! Figment로 기본값 + `thesis-rag.toml` + 환경변수를 병합합니다.
//!
//! 우선순위 (뒤가 이김):
//! 1. 내장 기본값
//! 2. `thesis-rag.toml` (있을 때만)
//! 3. `THESIS_RAG_*` 환경변수 (예: `THESIS_RAG_CHUNK_SIZE=800`)
//! 4. `GROQ_API_KEY` → `api_key`

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::embedding::DEFAULT_BERT_MODEL;
use crate::error::{RagError, Result};
use crate::knowledge::RetrievalMode;

/// 선택 설정 파일 이름
pub const CONFIG_FILE: &str = "thesis-rag.toml";

/// 환경변수 접두사
pub const ENV_PREFIX: &str = "THESIS_RAG_";

/// API 키 환경변수
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 언어 모델 API 키 (필수)
    #[serde(default)]
    pub api_key: Option<String>,
    /// PDF/텍스트 코퍼스 디렉토리
    pub data_dir: PathBuf,
    /// 벡터 인덱스 위치
    pub index_path: PathBuf,
    /// 청크 최대 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 임베딩 모델 (Hub 모델 ID, `hashing-<dim>`이면 로컬 해싱)
    pub embedding_model: String,
    /// 임베딩 모델 파일 디렉토리 (config.json, tokenizer.json, 가중치)
    #[serde(default)]
    pub embedding_model_dir: Option<PathBuf>,
    /// 원격 임베딩 API 주소 (지정하면 `embedding_model`을 원격 모델 이름으로 사용)
    #[serde(default)]
    pub embedding_base_url: Option<String>,
    /// 생성 모델
    pub llm_model: String,
    /// OpenAI 호환 API 주소
    pub base_url: String,
    /// 검색 결과 개수
    pub top_k: usize,
    /// 기본 검색 모드
    pub retrieval_mode: RetrievalMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            data_dir: PathBuf::from("data/documents"),
            index_path: PathBuf::from("data/vectorstore"),
            chunk_size: 1000,
            chunk_overlap: 0,
            embedding_model: DEFAULT_BERT_MODEL.to_string(),
            embedding_model_dir: None,
            embedding_base_url: None,
            llm_model: "llama-3.1-8b-instant".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            top_k: 3,
            retrieval_mode: RetrievalMode::Hybrid,
        }
    }
}

impl Config {
    /// 기본 소스 체인 구성
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Env::raw().only(&[API_KEY_ENV]).map(|_| "api_key".into()))
    }

    /// 환경에서 설정 로드 (검증은 하지 않음)
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// 임의의 Figment에서 추출
    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| RagError::Configuration(format!("invalid configuration: {e}")))
    }

    /// 필수 값 검증
    ///
    /// API 키가 없으면 실패합니다. 부분 동작은 허용하지 않습니다.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_none() {
            return Err(RagError::Configuration(format!(
                "{API_KEY_ENV} is not set. Export it (export {API_KEY_ENV}=your-key) \
                 or add `api_key` to {CONFIG_FILE}."
            )));
        }

        if self.chunk_size == 0 {
            return Err(RagError::Configuration(format!(
                "chunk_size must be positive. Set {ENV_PREFIX}CHUNK_SIZE to a value above 0."
            )));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({}). Lower {ENV_PREFIX}CHUNK_OVERLAP.",
                self.chunk_overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    /// 비어있지 않은 API 키
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

// ============================================================================
// Tests
// ============================================================================

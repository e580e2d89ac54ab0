//! 질의 엔진
//!
//! 명시적으로 생성하는 서비스 객체입니다.
//! 설정 검증 → 인덱스 로드 → 키워드 인덱스 구성 순으로 초기화하며,
//! 디스크의 매니페스트 build id가 바뀌면 `is_stale()`이 참이 됩니다.

pub mod indexer;

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::Result;
use crate::evaluation::{EvaluationReport, EvaluationSample, Evaluator, MetricSet, ModelGradedScorer};
use crate::generation::{AnswerGenerator, LanguageModel, OpenAiChat};
use crate::knowledge::{
    read_manifest, HybridRetriever, LanceVectorIndex, LexicalStatus, Retrieval, RetrievalMode,
};

pub use indexer::{IndexSummary, Indexer};

/// 질의 한 건의 결과
#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub retrieval: Retrieval,
}

/// 평가 요청
#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    pub question: String,
    pub ground_truth: Option<String>,
    /// 관련 청크 접두사 (앞 100자)
    pub relevant: Vec<String>,
    pub metrics: Vec<MetricSet>,
}

// ============================================================================
// QueryEngine
// ============================================================================

pub struct QueryEngine {
    config: Config,
    index: Arc<LanceVectorIndex>,
    retriever: HybridRetriever,
    generator: AnswerGenerator,
    evaluator: Evaluator,
}

impl QueryEngine {
    /// 설정으로 엔진 초기화
    ///
    /// API 키가 없으면 `Configuration`, 인덱스가 없으면 `IndexNotFound`입니다.
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        let embedder = create_embedder(&config)?;
        let llm = Arc::new(OpenAiChat::from_config(&config)?);
        Self::initialize_with(config, embedder, llm).await
    }

    /// 임베딩/언어 모델을 지정해 초기화
    pub async fn initialize_with(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let index = Arc::new(LanceVectorIndex::load(&config.index_path, embedder.clone()).await?);
        let retriever = HybridRetriever::new(index.clone()).await?;

        let evaluator =
            Evaluator::new().with_scorer(Box::new(ModelGradedScorer::new(llm.clone(), embedder)));

        tracing::info!(
            "Query engine ready (build {}, {} chunks, lexical: {})",
            index.manifest().build_id,
            index.manifest().chunk_count,
            if retriever.lexical_status().is_ready() { "ready" } else { "unavailable" }
        );

        Ok(Self {
            config,
            index,
            retriever,
            generator: AnswerGenerator::new(llm),
            evaluator,
        })
    }

    /// 설정의 기본 `top_k`, 검색 모드로 질의
    pub async fn query(&self, question: &str) -> Result<Answer> {
        self.query_with(question, self.config.top_k, self.config.retrieval_mode)
            .await
    }

    /// 검색 후 답변 생성
    ///
    /// 모델 호출 실패는 에러가 아니라 안내 문장으로 돌아옵니다.
    pub async fn query_with(&self, question: &str, k: usize, mode: RetrievalMode) -> Result<Answer> {
        let retrieval = self.retriever.retrieve(question, k, mode).await?;

        if retrieval.degraded() {
            tracing::warn!("Hybrid retrieval degraded to {}", retrieval.mode_used);
        }

        let text = self.generator.answer(question, &retrieval.chunks).await;

        Ok(Answer {
            question: question.to_string(),
            text,
            retrieval,
        })
    }

    /// 질의 후 요청된 지표 묶음으로 채점
    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<(Answer, EvaluationReport)> {
        let answer = self.query(&request.question).await?;

        let sample = EvaluationSample {
            question: request.question.clone(),
            answer: answer.text.clone(),
            contexts: answer
                .retrieval
                .chunks
                .iter()
                .map(|r| r.chunk.content.clone())
                .collect(),
            ground_truth: request.ground_truth.clone(),
            relevant: request.relevant.clone(),
        };

        let report = self.evaluator.evaluate(&sample, &request.metrics).await?;
        Ok((answer, report))
    }

    /// 디스크의 인덱스가 다시 빌드되었는지
    pub fn is_stale(&self) -> bool {
        match read_manifest(&self.config.index_path) {
            Ok(manifest) => manifest.build_id != self.index.manifest().build_id,
            Err(_) => true,
        }
    }

    pub fn lexical_status(&self) -> &LexicalStatus {
        self.retriever.lexical_status()
    }

    pub fn index(&self) -> &LanceVectorIndex {
        &self.index
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

// ============================================================================
// Tests
// ============================================================================

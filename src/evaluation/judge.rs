//! 모델 채점 지표 - faithfulness, answer_relevancy, context_relevance
//!
//! 답변 생성과 같은 언어 모델을 채점자로 쓰고, answer_relevancy는 임베딩 유사도를 씁니다.
//! 모델 응답을 해석할 수 없으면 0점이 아니라 `Evaluation` 에러입니다.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{EvaluationReport, EvaluationSample, MetricSet, Scorer};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::LanguageModel;
use crate::knowledge::cosine_similarity;

/// 채점용 컨텍스트 최대 길이 (문자)
pub const CONTEXT_CHAR_LIMIT: usize = 500;

/// answer_relevancy에서 역생성할 질문 수
const GENERATED_QUESTIONS: usize = 3;

#[derive(Debug, Deserialize)]
struct Statements {
    statements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Verdicts {
    verdicts: Vec<Verdict>,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    verdict: u8,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    questions: Vec<String>,
    #[serde(default)]
    noncommittal: u8,
}

#[derive(Debug, Deserialize)]
struct Rating {
    rating: u8,
}

// ============================================================================
// ModelGradedScorer
// ============================================================================

/// LLM 채점기
pub struct ModelGradedScorer {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ModelGradedScorer {
    pub fn new(llm: Arc<dyn LanguageModel>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { llm, embedder }
    }

    /// 답변 문장 중 컨텍스트로 뒷받침되는 비율
    pub async fn faithfulness(&self, sample: &EvaluationSample) -> Result<f64> {
        let statements: Statements = self
            .ask(&format!(
                "Break the answer below into short standalone factual statements.\n\
                 Respond only with JSON: {{\"statements\": [\"...\"]}}\n\n\
                 Question: {}\nAnswer: {}",
                sample.question, sample.answer
            ))
            .await?;

        if statements.statements.is_empty() {
            return Err(RagError::Evaluation(
                "faithfulness: no statements could be extracted from the answer".to_string(),
            ));
        }

        let numbered = statements
            .statements
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");

        let verdicts: Verdicts = self
            .ask(&format!(
                "For each statement decide whether it can be directly inferred from the context. \
                 Use verdict 1 if it can and 0 if it cannot.\n\
                 Respond only with JSON: {{\"verdicts\": [{{\"statement\": \"...\", \"verdict\": 1}}]}}\n\n\
                 Context:\n{}\n\nStatements:\n{}",
                truncated_contexts(&sample.contexts),
                numbered
            ))
            .await?;

        if verdicts.verdicts.is_empty() {
            return Err(RagError::Evaluation(
                "faithfulness: judge returned no verdicts".to_string(),
            ));
        }

        let supported = verdicts.verdicts.iter().filter(|v| v.verdict == 1).count();
        Ok(supported as f64 / verdicts.verdicts.len() as f64)
    }

    /// 답변에서 역생성한 질문과 원 질문의 평균 코사인 유사도
    pub async fn answer_relevancy(&self, sample: &EvaluationSample) -> Result<f64> {
        let generated: GeneratedQuestions = self
            .ask(&format!(
                "Write {} questions that the answer below would answer. Also set noncommittal \
                 to 1 if the answer is evasive or vague, otherwise 0.\n\
                 Respond only with JSON: {{\"questions\": [\"...\"], \"noncommittal\": 0}}\n\n\
                 Answer: {}",
                GENERATED_QUESTIONS, sample.answer
            ))
            .await?;

        if generated.questions.is_empty() {
            return Err(RagError::Evaluation(
                "answer_relevancy: judge generated no questions".to_string(),
            ));
        }
        if generated.noncommittal == 1 {
            return Ok(0.0);
        }

        let original = self
            .embedder
            .embed(&sample.question)
            .await
            .map_err(|e| RagError::Evaluation(format!("answer_relevancy embedding: {:#}", e)))?;
        let embeddings = self
            .embedder
            .embed_batch(&generated.questions)
            .await
            .map_err(|e| RagError::Evaluation(format!("answer_relevancy embedding: {:#}", e)))?;

        let total: f64 = embeddings
            .iter()
            .map(|e| cosine_similarity(&original, e) as f64)
            .sum();
        Ok(total / embeddings.len() as f64)
    }

    /// 컨텍스트가 질문에 얼마나 관련있는지 (0, 1, 2 → 0.0 ~ 1.0)
    pub async fn context_relevance(&self, sample: &EvaluationSample) -> Result<f64> {
        if sample.contexts.is_empty() {
            return Err(RagError::Evaluation(
                "context_relevance: no contexts were retrieved".to_string(),
            ));
        }

        let rating: Rating = self
            .ask(&format!(
                "Rate how relevant the context is to the question. 0 means not relevant, \
                 1 means partially relevant, 2 means fully relevant.\n\
                 Respond only with JSON: {{\"rating\": 0}}\n\n\
                 Question: {}\n\nContext:\n{}",
                sample.question,
                truncated_contexts(&sample.contexts)
            ))
            .await?;

        if rating.rating > 2 {
            return Err(RagError::Evaluation(format!(
                "context_relevance: rating {} is outside 0..=2",
                rating.rating
            )));
        }
        Ok(rating.rating as f64 / 2.0)
    }

    async fn ask<T: DeserializeOwned>(&self, prompt: &str) -> Result<T> {
        let reply = self
            .llm
            .complete(prompt)
            .await
            .map_err(|e| RagError::Evaluation(format!("judge call failed: {:#}", e)))?;

        parse_json_reply(&reply)
    }
}

#[async_trait]
impl Scorer for ModelGradedScorer {
    fn metric_set(&self) -> MetricSet {
        MetricSet::ModelGraded
    }

    async fn score(&self, sample: &EvaluationSample) -> Result<EvaluationReport> {
        let mut report = EvaluationReport::default();
        report.insert("faithfulness", self.faithfulness(sample).await?);
        report.insert("answer_relevancy", self.answer_relevancy(sample).await?);
        report.insert("context_relevance", self.context_relevance(sample).await?);
        Ok(report)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn truncated_contexts(contexts: &[String]) -> String {
    contexts
        .iter()
        .map(|c| c.chars().take(CONTEXT_CHAR_LIMIT).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 모델 응답에서 JSON 객체 추출 (코드 펜스 허용)
fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let start = reply.find('{');
    let end = reply.rfind('}');

    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => {
            return Err(RagError::Evaluation(format!(
                "judge reply is not JSON: {}",
                reply.chars().take(200).collect::<String>()
            )))
        }
    };

    serde_json::from_str(json)
        .map_err(|e| RagError::Evaluation(format!("cannot parse judge reply: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================

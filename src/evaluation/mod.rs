//! 평가 모듈
//!
//! 지표 묶음별로 `Scorer`를 두고 `Evaluator`가 요청된 묶음에 맞게 호출합니다.
//! - retrieval: precision / recall / f1_score
//! - lexical: response_length / jaccard_similarity (정답 필요)
//! - model_graded: faithfulness / answer_relevancy / context_relevance

pub mod judge;
pub mod metrics;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{RagError, Result};

pub use judge::ModelGradedScorer;
pub use metrics::{
    chunk_id, generation_metrics, retrieval_metrics, GenerationMetrics, RetrievalMetrics,
};

// ============================================================================
// Types
// ============================================================================

/// 지표 묶음
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MetricSet {
    Retrieval,
    Lexical,
    #[value(name = "model_graded", alias = "ragas")]
    ModelGraded,
}

impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSet::Retrieval => write!(f, "retrieval"),
            MetricSet::Lexical => write!(f, "lexical"),
            MetricSet::ModelGraded => write!(f, "model_graded"),
        }
    }
}

/// 평가 대상 한 건
#[derive(Debug, Clone, Default)]
pub struct EvaluationSample {
    pub question: String,
    pub answer: String,
    /// 검색된 청크 본문 (검색 순서)
    pub contexts: Vec<String>,
    pub ground_truth: Option<String>,
    /// 관련 청크의 앞 100자
    pub relevant: Vec<String>,
}

/// 지표 이름 → 점수
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EvaluationReport {
    scores: BTreeMap<String, f64>,
}

impl EvaluationReport {
    pub fn insert(&mut self, metric: impl Into<String>, score: f64) {
        self.scores.insert(metric.into(), score);
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.scores.get(metric).copied()
    }

    pub fn extend(&mut self, other: EvaluationReport) {
        self.scores.extend(other.scores);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (metric, score) in &self.scores {
            writeln!(f, "  {:<20} {:.4}", metric, score)?;
        }
        Ok(())
    }
}

// ============================================================================
// Scorer Trait
// ============================================================================

/// 지표 묶음 하나를 계산하는 채점기
#[async_trait]
pub trait Scorer: Send + Sync {
    fn metric_set(&self) -> MetricSet;

    async fn score(&self, sample: &EvaluationSample) -> Result<EvaluationReport>;
}

/// 검색 집합 채점
pub struct RetrievalSetScorer;

#[async_trait]
impl Scorer for RetrievalSetScorer {
    fn metric_set(&self) -> MetricSet {
        MetricSet::Retrieval
    }

    async fn score(&self, sample: &EvaluationSample) -> Result<EvaluationReport> {
        let m = retrieval_metrics(&sample.contexts, &sample.relevant);

        let mut report = EvaluationReport::default();
        report.insert("precision", m.precision);
        report.insert("recall", m.recall);
        report.insert("f1_score", m.f1_score);
        Ok(report)
    }
}

/// 어휘 중복 채점
pub struct LexicalOverlapScorer;

#[async_trait]
impl Scorer for LexicalOverlapScorer {
    fn metric_set(&self) -> MetricSet {
        MetricSet::Lexical
    }

    async fn score(&self, sample: &EvaluationSample) -> Result<EvaluationReport> {
        let ground_truth = sample.ground_truth.as_deref().ok_or_else(|| {
            RagError::Evaluation(
                "lexical metrics need a ground truth answer (pass --ground-truth)".to_string(),
            )
        })?;

        let m = generation_metrics(&sample.answer, ground_truth);

        let mut report = EvaluationReport::default();
        report.insert("response_length", m.response_length as f64);
        report.insert("jaccard_similarity", m.jaccard_similarity);
        Ok(report)
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// 요청된 지표 묶음을 해당 채점기로 보냄
pub struct Evaluator {
    scorers: Vec<Box<dyn Scorer>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// 결정적 채점기만 등록 (retrieval, lexical)
    pub fn new() -> Self {
        Self {
            scorers: vec![Box::new(RetrievalSetScorer), Box::new(LexicalOverlapScorer)],
        }
    }

    /// 채점기 추가 (같은 묶음이면 교체)
    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorers.retain(|s| s.metric_set() != scorer.metric_set());
        self.scorers.push(scorer);
        self
    }

    pub fn supports(&self, set: MetricSet) -> bool {
        self.scorers.iter().any(|s| s.metric_set() == set)
    }

    /// 요청된 묶음 순서대로 채점해 하나의 리포트로 합침
    pub async fn evaluate(
        &self,
        sample: &EvaluationSample,
        sets: &[MetricSet],
    ) -> Result<EvaluationReport> {
        let mut report = EvaluationReport::default();

        for set in sets {
            let scorer = self
                .scorers
                .iter()
                .find(|s| s.metric_set() == *set)
                .ok_or_else(|| {
                    RagError::Evaluation(format!("no scorer is configured for {} metrics", set))
                })?;

            tracing::debug!("Scoring {} metrics", set);
            report.extend(scorer.score(sample).await?);
        }

        Ok(report)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EvaluationSample {
        EvaluationSample {
            question: "q".to_string(),
            answer: "dirichlet prior".to_string(),
            contexts: vec!["dirichlet prior over probabilities".to_string()],
            ground_truth: Some("a dirichlet prior".to_string()),
            relevant: vec!["dirichlet prior over probabilities".to_string()],
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_metric_set() {
        let evaluator = Evaluator::new();
        let report = evaluator
            .evaluate(&sample(), &[MetricSet::Retrieval, MetricSet::Lexical])
            .await
            .unwrap();

        assert_eq!(report.get("precision"), Some(1.0));
        assert_eq!(report.get("recall"), Some(1.0));
        assert_eq!(report.get("f1_score"), Some(1.0));
        assert_eq!(report.get("response_length"), Some(15.0));
        assert!((report.get("jaccard_similarity").unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_scorer_is_error() {
        let err = Evaluator::new()
            .evaluate(&sample(), &[MetricSet::ModelGraded])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Evaluation(_)));
    }

    #[tokio::test]
    async fn test_lexical_needs_ground_truth() {
        let mut s = sample();
        s.ground_truth = None;
        let err = Evaluator::new()
            .evaluate(&s, &[MetricSet::Lexical])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Evaluation(_)));
    }

    #[test]
    fn test_report_display() {
        let mut report = EvaluationReport::default();
        report.insert("recall", 0.5);
        report.insert("precision", 1.0);
        let text = report.to_string();
        assert!(text.find("precision").unwrap() < text.find("recall").unwrap());
        assert!(text.contains("0.5000"));
    }
}

//! 하이브리드 검색 - LanceDB 벡터 + FTS5 키워드
//!
//! 두 인덱스에서 각각 `k`개를 가져와 벡터 결과를 먼저, 키워드 결과를 뒤에 두고
//! 본문이 완전히 같은 청크는 처음 나온 것만 남긴 뒤 `k`개로 자릅니다.
//! 점수 융합(RRF 등)은 하지 않습니다. 벡터 우선 순서는 기본 정책입니다.
//!
//! 키워드 인덱스 초기화에 실패하면 hybrid 요청은 vector-only로 강등되고,
//! 실제 사용된 모드가 결과에 태그됩니다.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::lexical::LexicalIndex;
use super::vector::{ScoredChunk, VectorIndex};
use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 검색 모드
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// 벡터 인덱스만 사용
    #[value(name = "vector_only", alias = "vector")]
    VectorOnly,
    /// 벡터 + 키워드
    #[default]
    Hybrid,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::VectorOnly => write!(f, "vector_only"),
            RetrievalMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// 키워드 인덱스 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexicalStatus {
    Ready { chunks: usize },
    Unavailable { reason: String },
}

impl LexicalStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, LexicalStatus::Ready { .. })
    }
}

/// 검색 결과 (실제 사용 모드 포함)
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub chunks: Vec<ScoredChunk>,
    pub requested: RetrievalMode,
    pub mode_used: RetrievalMode,
}

impl Retrieval {
    /// 요청 모드에서 강등되었는지
    pub fn degraded(&self) -> bool {
        self.requested != self.mode_used
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 생성 시 벡터 인덱스의 청크 전체로 키워드 인덱스를 만들어
/// 두 인덱스가 항상 같은 청크 집합을 보도록 합니다.
pub struct HybridRetriever {
    vector: Arc<dyn VectorIndex>,
    lexical: Option<LexicalIndex>,
    lexical_status: LexicalStatus,
}

impl HybridRetriever {
    /// 벡터 인덱스로부터 검색기 생성
    ///
    /// 키워드 인덱스 실패는 에러가 아니며 `lexical_status()`로 확인합니다.
    pub async fn new(vector: Arc<dyn VectorIndex>) -> Result<Self> {
        let chunks = vector.chunks().await?;
        let count = chunks.len();

        let (lexical, lexical_status) = match LexicalIndex::build(chunks) {
            Ok(index) => {
                tracing::info!("Lexical index ready ({} chunks)", count);
                (Some(index), LexicalStatus::Ready { chunks: count })
            }
            Err(e) => {
                tracing::warn!("Lexical index unavailable, hybrid falls back to vector-only: {:#}", e);
                (
                    None,
                    LexicalStatus::Unavailable {
                        reason: format!("{:#}", e),
                    },
                )
            }
        };

        Ok(Self {
            vector,
            lexical,
            lexical_status,
        })
    }

    /// 질의 검색
    ///
    /// # Arguments
    /// * `query` - 자연어 질문
    /// * `k` - 최대 결과 수 (1 이상)
    /// * `mode` - 요청 모드
    pub async fn retrieve(&self, query: &str, k: usize, mode: RetrievalMode) -> Result<Retrieval> {
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidQuery("query is empty".to_string()));
        }

        let vector_results = self.vector.search(query, k).await.map_err(into_rag_error)?;

        let lexical = match (mode, &self.lexical) {
            (RetrievalMode::VectorOnly, _) => None,
            (RetrievalMode::Hybrid, None) => None,
            (RetrievalMode::Hybrid, Some(index)) => match index.search(query, k) {
                Ok(results) => Some(results),
                Err(e) => {
                    tracing::warn!("Lexical search failed, using vector results only: {:#}", e);
                    None
                }
            },
        };

        let (chunks, mode_used) = match lexical {
            Some(lexical_results) => (
                merge_results(vector_results, lexical_results, k),
                RetrievalMode::Hybrid,
            ),
            // 벡터 검색 결과 그대로 (중복 제거 없음)
            None => {
                let mut chunks = vector_results;
                chunks.truncate(k);
                (chunks, RetrievalMode::VectorOnly)
            }
        };

        tracing::debug!(
            "Retrieved {} chunks (requested {}, used {})",
            chunks.len(),
            mode,
            mode_used
        );

        Ok(Retrieval {
            chunks,
            requested: mode,
            mode_used,
        })
    }

    pub fn lexical_status(&self) -> &LexicalStatus {
        &self.lexical_status
    }

    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector
    }
}

/// 벡터 결과 → 키워드 결과 순으로 이어붙이고 본문 중복 제거 후 `k`개로 자름
pub fn merge_results(
    vector: Vec<ScoredChunk>,
    lexical: Vec<ScoredChunk>,
    k: usize,
) -> Vec<ScoredChunk> {
    let mut seen: HashSet<String> = HashSet::new();

    vector
        .into_iter()
        .chain(lexical)
        .filter(|r| seen.insert(r.chunk.content.clone()))
        .take(k)
        .collect()
}

fn into_rag_error(e: anyhow::Error) -> RagError {
    match e.downcast::<RagError>() {
        Ok(rag) => rag,
        Err(other) => RagError::Other(other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::document::{Chunk, DocumentMetadata};
    use crate::knowledge::vector::SearchMethod;
    use async_trait::async_trait;

    fn scored(text: &str, method: SearchMethod) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(text, DocumentMetadata::default()),
            score: 1.0,
            method,
        }
    }

    /// 고정 순서를 돌려주는 벡터 인덱스
    struct FixedIndex {
        chunks: Vec<Chunk>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn search(&self, _query: &str, k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
            Ok(self
                .chunks
                .iter()
                .take(k)
                .map(|c| ScoredChunk {
                    chunk: c.clone(),
                    score: 0.5,
                    method: SearchMethod::Vector,
                })
                .collect())
        }

        async fn chunks(&self) -> anyhow::Result<Vec<Chunk>> {
            Ok(self.chunks.clone())
        }

        async fn len(&self) -> anyhow::Result<usize> {
            Ok(self.chunks.len())
        }
    }

    fn fixed(texts: &[&str]) -> Arc<dyn VectorIndex> {
        Arc::new(FixedIndex {
            chunks: texts
                .iter()
                .map(|t| Chunk::new(*t, DocumentMetadata::default()))
                .collect(),
        })
    }

    #[test]
    fn test_merge_vector_first_and_dedup() {
        let vector = vec![scored("a", SearchMethod::Vector), scored("b", SearchMethod::Vector)];
        let lexical = vec![scored("b", SearchMethod::Lexical), scored("c", SearchMethod::Lexical)];

        let merged = merge_results(vector, lexical, 3);
        let texts: Vec<&str> = merged.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(merged[1].method, SearchMethod::Vector);
    }

    #[test]
    fn test_merge_truncates_to_k() {
        let vector = vec![scored("a", SearchMethod::Vector), scored("b", SearchMethod::Vector)];
        let lexical = vec![scored("c", SearchMethod::Lexical)];
        assert_eq!(merge_results(vector, lexical, 2).len(), 2);
    }

    #[test]
    fn test_retrieval_mode_serde_names() {
        let json = serde_json::to_string(&RetrievalMode::VectorOnly).unwrap();
        assert_eq!(json, "\"vector_only\"");
        assert_eq!(RetrievalMode::default(), RetrievalMode::Hybrid);
        assert_eq!(RetrievalMode::Hybrid.to_string(), "hybrid");
    }

    #[tokio::test]
    async fn test_hybrid_adds_keyword_hits() {
        let index = fixed(&[
            "gaussian processes model uncertainty",
            "bayesian ensembles model uncertainty",
            "evidential priors over class probabilities",
        ]);
        let retriever = HybridRetriever::new(index).await.unwrap();
        assert_eq!(retriever.lexical_status(), &LexicalStatus::Ready { chunks: 3 });

        let result = retriever
            .retrieve("evidential", 2, RetrievalMode::Hybrid)
            .await
            .unwrap();
        assert_eq!(result.mode_used, RetrievalMode::Hybrid);
        assert_eq!(result.chunks.len(), 2);

        let vector_only = retriever
            .retrieve("evidential", 3, RetrievalMode::VectorOnly)
            .await
            .unwrap();
        assert_eq!(vector_only.mode_used, RetrievalMode::VectorOnly);
        assert!(!vector_only.degraded());
    }

    #[tokio::test]
    async fn test_keyword_hit_survives_when_k_allows() {
        let index = fixed(&["alpha text", "beta text", "evidential gamma"]);
        let retriever = HybridRetriever::new(index).await.unwrap();

        // 벡터 결과가 먼저 k를 채움
        let result = retriever
            .retrieve("evidential", 2, RetrievalMode::Hybrid)
            .await
            .unwrap();
        let texts: Vec<&str> = result.chunks.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["alpha text", "beta text"]);

        let result = retriever
            .retrieve("evidential", 3, RetrievalMode::Hybrid)
            .await
            .unwrap();
        assert!(result
            .chunks
            .iter()
            .any(|r| r.chunk.content == "evidential gamma"));
    }

    #[tokio::test]
    async fn test_vector_only_keeps_duplicate_chunks() {
        let index = fixed(&["same body", "same body", "other body", "tail"]);
        let retriever = HybridRetriever::new(index).await.unwrap();

        let result = retriever
            .retrieve("same", 3, RetrievalMode::VectorOnly)
            .await
            .unwrap();
        let texts: Vec<&str> = result.chunks.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["same body", "same body", "other body"]);

        // hybrid 병합에서만 본문 중복이 빠짐
        let result = retriever
            .retrieve("same", 3, RetrievalMode::Hybrid)
            .await
            .unwrap();
        let texts: Vec<&str> = result.chunks.iter().map(|r| r.chunk.content.as_str()).collect();
        assert_eq!(texts, vec!["same body", "other body"]);
    }

    #[tokio::test]
    async fn test_empty_corpus_degrades_to_vector_only() {
        let retriever = HybridRetriever::new(fixed(&[])).await.unwrap();
        assert!(!retriever.lexical_status().is_ready());

        let result = retriever
            .retrieve("anything", 3, RetrievalMode::Hybrid)
            .await
            .unwrap();
        assert_eq!(result.requested, RetrievalMode::Hybrid);
        assert_eq!(result.mode_used, RetrievalMode::VectorOnly);
        assert!(result.degraded());
        assert!(result.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_queries() {
        let retriever = HybridRetriever::new(fixed(&["a"])).await.unwrap();
        assert!(matches!(
            retriever.retrieve("q", 0, RetrievalMode::Hybrid).await,
            Err(RagError::InvalidQuery(_))
        ));
        assert!(matches!(
            retriever.retrieve("  ", 3, RetrievalMode::Hybrid).await,
            Err(RagError::InvalidQuery(_))
        ));
    }
}

//! Vector Index - 벡터 검색 트레이트 및 유틸리티
//!
//! 구현체는 LanceDB(`lance.rs`)입니다. 하이브리드 검색기는 이 트레이트만 봅니다.

use anyhow::Result;
use async_trait::async_trait;

use super::document::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// 벡터 유사도
    Vector,
    /// BM25 키워드
    Lexical,
}

/// 점수가 매겨진 검색 결과
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 높을수록 관련성 높음 (벡터: 코사인 유사도, 키워드: -bm25)
    pub score: f32,
    pub method: SearchMethod,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 공통 인터페이스
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 질의 텍스트를 임베딩해 가장 가까운 `k`개를 반환 (가까운 순)
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// 인덱스에 들어있는 전체 청크 (빌드 순서)
    async fn chunks(&self) -> Result<Vec<Chunk>>;

    /// 엔트리 개수
    async fn len(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}

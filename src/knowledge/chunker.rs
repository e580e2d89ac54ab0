//! Text Chunking Module
//!
//! 구분자 우선순위(문단 → 줄 → 문장 → 단어)에 따라 재귀적으로 분할하고,
//! `chunk_size` 이하가 되도록 조각을 다시 병합합니다.
//! 길이는 바이트가 아닌 문자(char) 단위입니다.

use std::collections::VecDeque;

use super::document::{Chunk, Document};

/// 기본 구분자 (우선순위 순)
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 분할 구분자 (우선순위 순)
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(1000, 0)
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 문서 배치를 청크로 분할 (메타데이터 복사)
    fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let pieces = self.chunk(&document.text);
            if pieces.is_empty() {
                tracing::debug!(
                    "No chunks for document {:?} (empty text)",
                    document.metadata.source
                );
                continue;
            }

            chunks.extend(
                pieces
                    .into_iter()
                    .map(|content| Chunk::new(content, document.metadata.clone())),
            );
        }

        tracing::info!(
            "{} split {} documents into {} chunks",
            self.name(),
            documents.len(),
            chunks.len()
        );
        chunks
    }
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 구분자 청커
///
/// 1. 텍스트에 등장하는 첫 구분자로 조각을 나눔 (구분자는 앞 조각에 붙음)
/// 2. `chunk_size`를 넘는 조각은 다음 구분자로 재귀 분할
/// 3. 작은 조각들을 `chunk_size` 이하로 병합하면서 `chunk_overlap` 만큼 이전 조각을 남김
///
/// 더 나눌 구분자가 없는 토큰은 크기를 넘어도 하나의 청크로 내보냅니다.
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성 (1000자, 오버랩 0)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let Some(position) = separators.iter().position(|sep| text.contains(sep.as_str())) else {
            return trimmed(text).into_iter().collect();
        };

        let separator = separators[position].as_str();
        let rest = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in text.split_inclusive(separator) {
            if char_len(piece) <= self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending));
                pending.clear();
            }

            if rest.is_empty() {
                if let Some(token) = trimmed(piece) {
                    tracing::debug!(
                        "Emitting oversized chunk ({} chars > {})",
                        char_len(&token),
                        self.config.chunk_size
                    );
                    chunks.push(token);
                }
            } else {
                chunks.extend(self.split_recursive(piece, rest));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending));
        }

        chunks
    }

    /// 작은 조각 병합 (오버랩 유지)
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > size && !window.is_empty() {
                chunks.extend(join_window(&window));

                while total > overlap || (total + len > size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        chunks.extend(join_window(&window));
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.config.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    trimmed(&joined)
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

/// 크기/오버랩 지정 청커 생성
pub fn recursive_chunker(chunk_size: usize, chunk_overlap: usize) -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::new(ChunkConfig::new(chunk_size, chunk_overlap)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::document::DocumentMetadata;

    fn chunker(size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkConfig::new(size, overlap))
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    /// 청크를 이어붙이면서 앞 청크 꼬리와 겹치는 단어를 제거
    fn reconstruct(chunks: &[String]) -> Vec<String> {
        let mut acc: Vec<String> = Vec::new();
        for chunk in chunks {
            let next: Vec<String> = chunk.split_whitespace().map(str::to_string).collect();
            let max = next.len().min(acc.len());
            let shared = (0..=max)
                .rev()
                .find(|&j| acc[acc.len() - j..] == next[..j])
                .unwrap_or(0);
            acc.extend(next.into_iter().skip(shared));
        }
        acc
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = RecursiveChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_chunker_small_text() {
        let chunker = RecursiveChunker::with_defaults();
        let chunks = chunker.chunk("  Evidential deep learning.  ");
        assert_eq!(chunks, vec!["Evidential deep learning.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = chunker(50, 0);
        let text = words(200);
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {}", chunk);
        }
    }

    #[test]
    fn test_oversized_token_kept_whole() {
        let chunker = chunker(10, 0);
        let token = "x".repeat(40);
        let text = format!("short words {} tail", token);
        let chunks = chunker.chunk(&text);

        assert!(chunks.contains(&token));
        for chunk in chunks.iter().filter(|c| **c != token) {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let chunker = chunker(40, 0);
        let text = "First paragraph has some words.\n\nSecond paragraph has more words.";
        let chunks = chunker.chunk(text);

        assert_eq!(
            chunks,
            vec![
                "First paragraph has some words.".to_string(),
                "Second paragraph has more words.".to_string(),
            ]
        );
    }

    #[test]
    fn test_sentence_split_keeps_period() {
        let chunker = chunker(30, 0);
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa.";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn test_reconstruct_without_overlap() {
        let chunker = chunker(64, 0);
        let text = format!("{}\n\n{}\n{}", words(30), words(12), words(45));
        let chunks = chunker.chunk(&text);

        let rebuilt: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.split_whitespace().map(str::to_string))
            .collect();
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_reconstruct_with_overlap() {
        let chunker = chunker(60, 15);
        let text = words(120);
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        // 인접 청크는 실제로 겹쳐야 함
        let first_tail = chunks[0].split_whitespace().last().unwrap();
        assert!(chunks[1].split_whitespace().any(|w| w == first_tail));

        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(reconstruct(&chunks), original);
    }

    #[test]
    fn test_split_documents_copies_metadata() {
        let chunker = chunker(20, 0);
        let meta = DocumentMetadata {
            title: Some("Evidential Networks".to_string()),
            authors: vec!["Sensoy".to_string()],
            ..Default::default()
        };
        let docs = vec![
            Document::new("uncertainty quantification with evidence", meta.clone()),
            Document::new("", DocumentMetadata::default()),
        ];

        let chunks = chunker.split_documents(&docs);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.metadata == meta));
    }

    #[test]
    fn test_factories() {
        assert_eq!(default_chunker().name(), "RecursiveChunker");
        let small = recursive_chunker(5, 0);
        assert!(small.chunk("aaa bbb ccc").len() >= 2);
    }
}

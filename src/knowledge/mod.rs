//! Knowledge 모듈 - 청킹, 인덱싱, 검색
//!
//! - Chunker: 재귀 구분자 기반 텍스트 분할
//! - LanceDB: 청크 임베딩 저장 + 코사인 검색 (영속)
//! - FTS5: BM25 키워드 검색 (메모리, 초기화마다 재빌드)
//! - Hybrid: 벡터 우선 병합 + 본문 중복 제거

mod chunker;
mod document;
mod hybrid;
mod lance;
mod lexical;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, recursive_chunker, ChunkConfig, Chunker, RecursiveChunker,
    DEFAULT_SEPARATORS,
};
pub use document::{year_from_date, Chunk, Document, DocumentMetadata};
pub use hybrid::{merge_results, HybridRetriever, LexicalStatus, Retrieval, RetrievalMode};
pub use lance::{read_manifest, IndexManifest, LanceVectorIndex, MANIFEST_FILE};
pub use lexical::LexicalIndex;
pub use vector::{cosine_similarity, ScoredChunk, SearchMethod, VectorIndex};

//! thesis-rag - 학술 논문 PDF 기반 RAG 시스템
//!
//! LanceDB 벡터 검색 + SQLite FTS5 키워드 검색을 결합한
//! 하이브리드 검색으로 답변을 생성하고, 검색/생성 품질을 평가합니다.
//!
//! 파이프라인: 문서 로딩 → 청킹 → {벡터, 키워드} 인덱스 → 하이브리드 검색 → 답변 생성 → 평가

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod scraper;

// Re-exports
pub use config::Config;
pub use embedding::{
    create_embedder, BertEmbedding, EmbeddingProvider, HashingEmbedding, OpenAiEmbedding,
};
pub use engine::{Answer, EvaluationRequest, IndexSummary, Indexer, QueryEngine};
pub use error::{RagError, Result};
pub use evaluation::{EvaluationReport, Evaluator, MetricSet, Scorer};
pub use extractor::DocumentLoader;
pub use generation::{AnswerGenerator, LanguageModel, OpenAiChat};
pub use knowledge::{
    default_chunker, recursive_chunker, Chunk, ChunkConfig, Chunker, Document, DocumentMetadata,
    HybridRetriever, LanceVectorIndex, LexicalIndex, Retrieval, RetrievalMode, ScoredChunk,
    SearchMethod, VectorIndex,
};
pub use scraper::{list_sources, Paper, Source, ThesisScraper};

//! 인덱스 빌드 파이프라인
//!
//! 문서 로딩 → 청킹 → 임베딩 → LanceDB 테이블 + 매니페스트 저장.
//! 같은 위치에 대한 동시 빌드는 지원하지 않습니다.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extractor::DocumentLoader;
use crate::knowledge::{recursive_chunker, IndexManifest, LanceVectorIndex};

/// 빌드 결과 요약
#[derive(Debug)]
pub struct IndexSummary {
    pub files_loaded: usize,
    pub documents: usize,
    pub chunks: usize,
    /// 건너뛴 파일
    pub failures: Vec<RagError>,
    pub manifest: IndexManifest,
}

pub struct Indexer;

impl Indexer {
    /// 설정에 따라 인덱스 (재)빌드
    pub async fn build_index(config: &Config) -> Result<IndexSummary> {
        config.validate()?;
        let embedder = create_embedder(config)?;
        Self::build_with(config, embedder).await
    }

    /// 임베딩 프로바이더를 지정해 빌드
    pub async fn build_with(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<IndexSummary> {
        tracing::info!("Loading documents from {:?}", config.data_dir);
        let report = DocumentLoader::default()
            .load_directory(&config.data_dir)
            .await?;

        let chunker = recursive_chunker(config.chunk_size, config.chunk_overlap);
        let chunks = chunker.split_documents(&report.documents);

        let index = LanceVectorIndex::build(&chunks, embedder, &config.index_path).await?;

        tracing::info!(
            "Index built at {:?} ({} chunks, build {})",
            config.index_path,
            chunks.len(),
            index.manifest().build_id
        );

        Ok(IndexSummary {
            files_loaded: report.files_loaded,
            documents: report.documents.len(),
            chunks: chunks.len(),
            failures: report.failures,
            manifest: index.manifest().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::read_manifest;
    use figment::providers::Serialized;
    use figment::Figment;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_index_from_directory() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("documents");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("a.txt"), "First paragraph.\n\nSecond paragraph.").unwrap();
        std::fs::write(data_dir.join("broken.pdf"), b"garbage").unwrap();

        let config = Config::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(("api_key", "gsk_test"))
                .merge(("embedding_model", "hashing-384"))
                .merge(("data_dir", data_dir.clone()))
                .merge(("index_path", dir.path().join("vectorstore"))),
        )
        .unwrap();

        let summary = Indexer::build_index(&config).await.unwrap();
        assert_eq!(summary.files_loaded, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.manifest.embedding_model, "hashing-384");

        let manifest = read_manifest(&config.index_path).unwrap();
        assert_eq!(manifest, summary.manifest);
    }

    #[tokio::test]
    async fn test_build_index_requires_key() {
        let config = Config::from_figment(Figment::from(Serialized::defaults(Config::default())))
            .unwrap();
        assert!(matches!(
            Indexer::build_index(&config).await,
            Err(RagError::Configuration(_))
        ));
    }
}

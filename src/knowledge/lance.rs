//! LanceDB Vector Index - 청크 임베딩 저장 및 코사인 검색
//!
//! 인덱스 디렉토리 구조:
//! ```text
//! <index_path>/
//!   chunks.lance/    # ordinal, content, metadata(JSON), embedding
//!   manifest.json    # 빌드 ID, 임베딩 모델, 차원, 코퍼스 다이제스트
//! ```
//!
//! 빌드는 항상 기존 테이블을 교체합니다. 로드는 매니페스트가 맞지 않으면 실패합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;
use lancedb::DistanceType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::document::{Chunk, DocumentMetadata};
use super::vector::{ScoredChunk, SearchMethod, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

/// 매니페스트 파일 이름
pub const MANIFEST_FILE: &str = "manifest.json";

/// 이 행 수 이상이면 IVF-PQ ANN 인덱스 생성 (미만은 전수 검색)
const ANN_MIN_ROWS: usize = 256;

/// ANN 후보를 `k * REFINE_FACTOR`개 뽑아 원본 벡터로 재정렬
const REFINE_FACTOR: u32 = 10;

// ============================================================================
// Manifest
// ============================================================================

/// 인덱스 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// 빌드마다 새로 발급 (엔진 재로드 판단용)
    pub build_id: String,
    pub built_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    /// 청크 본문 SHA-256
    pub corpus_digest: String,
}

/// 인덱스 디렉토리의 매니페스트 읽기
pub fn read_manifest(index_path: &Path) -> Result<IndexManifest> {
    let manifest_path = index_path.join(MANIFEST_FILE);

    let raw = std::fs::read_to_string(&manifest_path)
        .map_err(|e| RagError::index_not_found(index_path, format!("cannot read {}: {}", MANIFEST_FILE, e)))?;

    serde_json::from_str(&raw)
        .map_err(|e| RagError::index_not_found(index_path, format!("corrupt {}: {}", MANIFEST_FILE, e)))
}

fn corpus_digest(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.content.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 기반 벡터 인덱스
///
/// 빌드와 검색에 같은 임베딩 프로바이더를 사용해야 합니다.
pub struct LanceVectorIndex {
    table: Table,
    embedder: Arc<dyn EmbeddingProvider>,
    manifest: IndexManifest,
    path: PathBuf,
}

impl LanceVectorIndex {
    /// 청크 전체를 임베딩해 인덱스를 새로 빌드 (기존 인덱스 교체)
    pub async fn build(
        chunks: &[Chunk],
        embedder: Arc<dyn EmbeddingProvider>,
        path: &Path,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create index directory {}", path.display()))?;

        tracing::info!(
            "Embedding {} chunks with {}",
            chunks.len(),
            embedder.name()
        );
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder
            .embed_batch(&contents)
            .await
            .context("Failed to embed chunks")?;

        let dimension = embeddings
            .first()
            .map(Vec::len)
            .unwrap_or_else(|| embedder.dimension());
        if dimension == 0 {
            return Err(RagError::Other(anyhow::anyhow!(
                "Cannot determine embedding dimension for {}",
                embedder.name()
            )));
        }
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimension) {
            return Err(RagError::Other(anyhow::anyhow!(
                "Embedding {} has dimension {} (expected {})",
                bad,
                embeddings[bad].len(),
                dimension
            )));
        }

        let db = connect(path).await?;

        let existing = db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        if existing.iter().any(|name| name == TABLE_NAME) {
            tracing::debug!("Dropping previous table at {}", path.display());
            db.drop_table(TABLE_NAME)
                .await
                .context("Failed to drop previous table")?;
        }

        let schema = Arc::new(create_schema(dimension));
        let table = if chunks.is_empty() {
            db.create_empty_table(TABLE_NAME, schema.clone())
                .execute()
                .await
                .context("Failed to create empty table")?
        } else {
            let batch = chunks_to_batch(chunks, &embeddings, dimension, schema.clone())?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema.clone());
            db.create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?
        };

        if chunks.len() >= ANN_MIN_ROWS {
            build_ann_index(&table, chunks.len(), dimension).await;
        }

        let manifest = IndexManifest {
            build_id: uuid::Uuid::new_v4().to_string(),
            built_at: Utc::now(),
            embedding_model: embedder.name().to_string(),
            dimension,
            chunk_count: chunks.len(),
            corpus_digest: corpus_digest(chunks),
        };
        let raw = serde_json::to_string_pretty(&manifest).context("Failed to encode manifest")?;
        tokio::fs::write(path.join(MANIFEST_FILE), raw)
            .await
            .context("Failed to write manifest")?;

        tracing::info!(
            "Built vector index at {} ({} chunks, dim {})",
            path.display(),
            manifest.chunk_count,
            dimension
        );

        Ok(Self {
            table,
            embedder,
            manifest,
            path: path.to_path_buf(),
        })
    }

    /// 빌드된 인덱스 열기
    ///
    /// 매니페스트 누락/손상, 테이블 없음, 임베딩 모델 불일치는 `IndexNotFound`입니다.
    pub async fn load(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if !path.is_dir() {
            return Err(RagError::index_not_found(path, "directory does not exist"));
        }

        let manifest = read_manifest(path)?;

        if manifest.embedding_model != embedder.name() {
            return Err(RagError::index_not_found(
                path,
                format!(
                    "index was built with embedding model '{}' but '{}' is configured",
                    manifest.embedding_model,
                    embedder.name()
                ),
            ));
        }
        if embedder.dimension() != 0 && embedder.dimension() != manifest.dimension {
            return Err(RagError::index_not_found(
                path,
                format!(
                    "index dimension {} does not match embedder dimension {}",
                    manifest.dimension,
                    embedder.dimension()
                ),
            ));
        }

        let db = connect(path).await?;
        let names = db
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::index_not_found(path, format!("unreadable store: {}", e)))?;
        if !names.iter().any(|name| name == TABLE_NAME) {
            return Err(RagError::index_not_found(path, "chunk table is missing"));
        }

        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::index_not_found(path, format!("cannot open chunk table: {}", e)))?;

        tracing::debug!(
            "Loaded vector index {} (build {})",
            path.display(),
            manifest.build_id
        );

        Ok(Self {
            table,
            embedder,
            manifest,
            path: path.to_path_buf(),
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        self.embedder.clone()
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()).into());
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidQuery("query is empty".to_string()).into());
        }
        if self.manifest.chunk_count == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.len() != self.manifest.dimension {
            anyhow::bail!(
                "Query embedding has dimension {} (index expects {})",
                query_embedding.len(),
                self.manifest.dimension
            );
        }

        let mut search = self
            .table
            .vector_search(query_embedding)
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(k);
        if self.manifest.chunk_count >= ANN_MIN_ROWS {
            search = search.refine_factor(REFINE_FACTOR);
        }
        let stream = search
            .execute()
            .await
            .context("Failed to execute vector search")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut rows: Vec<(u64, f32, Chunk)> = Vec::new();
        for batch in &batches {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for (i, (ordinal, chunk)) in batch_to_chunks(batch)?.into_iter().enumerate() {
                let distance = distances.value(i);
                let distance = if distance.is_nan() { 1.0 } else { distance };
                rows.push((ordinal, distance, chunk));
            }
        }

        // 거리 오름차순, 동률은 빌드 순서
        rows.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        rows.truncate(k);

        Ok(rows
            .into_iter()
            .map(|(_, distance, chunk)| ScoredChunk {
                chunk,
                score: 1.0 - distance,
                method: SearchMethod::Vector,
            })
            .collect())
    }

    async fn chunks(&self) -> anyhow::Result<Vec<Chunk>> {
        let stream = self
            .table
            .query()
            .select(Select::columns(&["ordinal", "content", "metadata"]))
            .execute()
            .await
            .context("Failed to scan chunk table")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut rows = Vec::with_capacity(self.manifest.chunk_count);
        for batch in &batches {
            rows.extend(batch_to_chunks(batch)?);
        }
        rows.sort_by_key(|(ordinal, _)| *ordinal);

        Ok(rows.into_iter().map(|(_, chunk)| chunk).collect())
    }

    async fn len(&self) -> anyhow::Result<usize> {
        let count = self
            .table
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Arrow Helpers
// ============================================================================

async fn connect(path: &Path) -> Result<lancedb::Connection> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding: {}", path.display()))?;

    let db = lancedb::connect(path_str)
        .execute()
        .await
        .context("Failed to connect to LanceDB")?;
    Ok(db)
}

fn create_schema(dimension: usize) -> Schema {
    Schema::new(vec![
        Field::new("ordinal", DataType::UInt64, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
    ])
}

fn chunks_to_batch(
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
    dimension: usize,
    schema: Arc<Schema>,
) -> Result<RecordBatch> {
    let ordinals: Vec<u64> = (0..chunks.len() as u64).collect();
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let metadata = chunks
        .iter()
        .map(|c| serde_json::to_string(&c.metadata))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to encode chunk metadata")?;

    let values = Float32Array::from(embeddings.iter().flatten().copied().collect::<Vec<f32>>());
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let embedding_list = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(values) as Arc<dyn Array>,
        None,
    )
    .context("Failed to create embedding array")?;

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(UInt64Array::from(ordinals)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(embedding_list),
        ],
    )
    .context("Failed to create RecordBatch")?;

    Ok(batch)
}

fn batch_to_chunks(batch: &RecordBatch) -> anyhow::Result<Vec<(u64, Chunk)>> {
    let ordinals = batch
        .column_by_name("ordinal")
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing ordinal column"))?;
    let contents = batch
        .column_by_name("content")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing content column"))?;
    let metadata = batch
        .column_by_name("metadata")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing metadata column"))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: DocumentMetadata = serde_json::from_str(metadata.value(i))
            .context("Failed to decode chunk metadata")?;
        rows.push((ordinals.value(i), Chunk::new(contents.value(i), meta)));
    }
    Ok(rows)
}

/// IVF-PQ 인덱스 생성 (실패해도 전수 검색으로 동작)
async fn build_ann_index(table: &Table, rows: usize, dimension: usize) {
    let partitions = ((rows as f64).sqrt() as u32).clamp(1, 256);
    let sub_vectors = [16u32, 8, 4, 2, 1]
        .into_iter()
        .find(|m| dimension as u32 % m == 0)
        .unwrap_or(1);

    let result = table
        .create_index(
            &["embedding"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(partitions)
                    .num_sub_vectors(sub_vectors),
            ),
        )
        .execute()
        .await;

    match result {
        Ok(()) => tracing::info!(
            "Created IVF-PQ index ({} partitions, {} sub-vectors)",
            partitions,
            sub_vectors
        ),
        Err(e) => tracing::warn!("ANN index creation failed, using flat search: {}", e),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedding;
    use tempfile::TempDir;

    fn embedder(dim: usize) -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingEmbedding::new(dim).unwrap())
    }

    fn sample_chunks() -> Vec<Chunk> {
        let meta = |title: &str| DocumentMetadata {
            title: Some(title.to_string()),
            authors: vec!["Doe, J.".to_string()],
            year: Some(2021),
            ..Default::default()
        };
        vec![
            Chunk::new(
                "Evidential deep learning places a Dirichlet prior over class probabilities",
                meta("Evidential Networks"),
            ),
            Chunk::new(
                "Gaussian processes provide calibrated predictive variance",
                meta("Gaussian Processes"),
            ),
            Chunk::new(
                "Protein folding simulations with molecular dynamics",
                meta("Folding"),
            ),
        ]
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let chunks = sample_chunks();

        let index = LanceVectorIndex::build(&chunks, embedder(64), &path)
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), 3);
        assert_eq!(index.manifest().chunk_count, 3);
        assert_eq!(index.manifest().embedding_model, "hashing-64");

        let results = index.search(&chunks[1].content, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk, chunks[1]);
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.method == SearchMethod::Vector));
    }

    #[tokio::test]
    async fn test_load_round_trip_preserves_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let chunks = sample_chunks();

        let built = LanceVectorIndex::build(&chunks, embedder(32), &path)
            .await
            .unwrap();
        let loaded = LanceVectorIndex::load(&path, embedder(32)).await.unwrap();

        assert_eq!(loaded.manifest(), built.manifest());
        assert_eq!(loaded.chunks().await.unwrap(), chunks);
    }

    #[tokio::test]
    async fn test_search_rejects_zero_k() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let index = LanceVectorIndex::build(&sample_chunks(), embedder(32), &path)
            .await
            .unwrap();

        let err = index.search("dirichlet", 0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_k_larger_than_corpus() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let index = LanceVectorIndex::build(&sample_chunks(), embedder(32), &path)
            .await
            .unwrap();

        assert_eq!(index.search("dirichlet prior", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_index() {
        let temp_dir = TempDir::new().unwrap();
        let err = LanceVectorIndex::load(&temp_dir.path().join("nope"), embedder(32))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_with_other_embedder_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        LanceVectorIndex::build(&sample_chunks(), embedder(32), &path)
            .await
            .unwrap();

        let err = LanceVectorIndex::load(&path, embedder(64)).await.err().unwrap();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let first = LanceVectorIndex::build(&sample_chunks(), embedder(32), &path)
            .await
            .unwrap();

        let smaller = vec![sample_chunks().remove(0)];
        let second = LanceVectorIndex::build(&smaller, embedder(32), &path)
            .await
            .unwrap();

        assert_ne!(first.manifest().build_id, second.manifest().build_id);
        let loaded = LanceVectorIndex::load(&path, embedder(32)).await.unwrap();
        assert_eq!(loaded.len().await.unwrap(), 1);
        assert_eq!(loaded.chunks().await.unwrap(), smaller);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let index = LanceVectorIndex::build(&[], embedder(16), &path)
            .await
            .unwrap();

        assert_eq!(index.len().await.unwrap(), 0);
        assert!(index.search("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_large_corpus_uses_ann_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectorstore");
        let chunks: Vec<Chunk> = (0..300)
            .map(|i| {
                Chunk::new(
                    format!("section{i} lemma{i} figure{i} dataset{i} appendix{i}"),
                    DocumentMetadata {
                        title: Some(format!("Paper {i}")),
                        ..Default::default()
                    },
                )
            })
            .collect();
        assert!(chunks.len() >= ANN_MIN_ROWS);

        let index = LanceVectorIndex::build(&chunks, embedder(128), &path)
            .await
            .unwrap();
        assert_eq!(index.manifest().chunk_count, 300);

        let indices = index.table.list_indices().await.unwrap();
        assert!(
            indices
                .iter()
                .any(|i| i.columns.iter().any(|c| c == "embedding")),
            "no ANN index on embedding column: {:?}",
            indices
        );

        for i in [0, 137, 299] {
            let results = index.search(&chunks[i].content, 3).await.unwrap();
            assert_eq!(results.len(), 3);
            assert_eq!(results[0].chunk, chunks[i]);
            assert!(results[0].score >= results[1].score);
        }

        // 다시 열어도 ANN 인덱스로 검색
        let loaded = LanceVectorIndex::load(&path, embedder(128)).await.unwrap();
        let results = loaded.search(&chunks[42].content, 1).await.unwrap();
        assert_eq!(results[0].chunk, chunks[42]);
    }

    #[test]
    fn test_corpus_digest_changes_with_content() {
        let chunks = sample_chunks();
        let a = corpus_digest(&chunks);
        let b = corpus_digest(&chunks[..2]);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}

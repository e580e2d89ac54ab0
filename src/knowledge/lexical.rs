//! Lexical Index - SQLite FTS5 BM25 키워드 검색
//!
//! 벡터 인덱스의 청크 전체로 메모리 내 FTS5 테이블을 만듭니다.
//! 디스크에 저장하지 않으며 엔진 초기화마다 다시 빌드합니다.
//! source: https://www.sqlite.org/fts5.html#the_bm25_function

use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::document::Chunk;
use super::vector::{ScoredChunk, SearchMethod};
use crate::error::RagError;

// ============================================================================
// LexicalIndex
// ============================================================================

/// BM25 키워드 인덱스
///
/// 점수는 `-bm25()` 이므로 높을수록 관련성이 높습니다.
pub struct LexicalIndex {
    conn: Mutex<Connection>,
    chunks: Vec<Chunk>,
}

impl LexicalIndex {
    /// 청크 목록으로 빌드
    ///
    /// 빈 코퍼스는 에러입니다. 호출자는 키워드 검색 없이 동작해야 합니다.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("Lexical index needs at least one chunk");
        }

        let mut conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;

        conn.execute(
            "CREATE VIRTUAL TABLE chunks_fts USING fts5(content, tokenize = 'unicode61')",
            [],
        )
        .context("Failed to create FTS5 table (is FTS5 compiled in?)")?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO chunks_fts(rowid, content) VALUES (?1, ?2)")?;
            for (ordinal, chunk) in chunks.iter().enumerate() {
                stmt.execute(params![ordinal as i64, chunk.content])?;
            }
        }
        tx.commit().context("Failed to populate FTS5 table")?;

        tracing::debug!("Lexical index built over {} chunks", chunks.len());

        Ok(Self {
            conn: Mutex::new(conn),
            chunks,
        })
    }

    /// BM25 상위 `k`개 검색
    ///
    /// 질의 토큰은 OR로 묶입니다. 토큰이 하나도 없으면 빈 결과입니다.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()).into());
        }

        let match_query = build_match_query(query);
        if match_query.is_empty() {
            return Ok(vec![]);
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT rowid, bm25(chunks_fts) AS score
            FROM chunks_fts
            WHERE chunks_fts MATCH ?1
            ORDER BY score, rowid
            LIMIT ?2
            "#,
        )?;

        let rows = stmt
            .query_map(params![match_query, k as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("FTS5 query failed")?;

        Ok(rows
            .into_iter()
            .filter_map(|(rowid, bm25)| {
                self.chunks.get(rowid as usize).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    score: -bm25 as f32,
                    method: SearchMethod::Lexical,
                })
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// FTS5 MATCH 식 생성
///
/// 영숫자 토큰만 남겨 큰따옴표로 감싸고 OR로 연결합니다.
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn build_match_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::document::DocumentMetadata;

    fn corpus() -> Vec<Chunk> {
        [
            "Evidential deep learning quantifies classification uncertainty",
            "Monte Carlo dropout approximates Bayesian inference",
            "Graph neural networks for molecule property prediction",
        ]
        .iter()
        .map(|t| Chunk::new(*t, DocumentMetadata::default()))
        .collect()
    }

    #[test]
    fn test_build_match_query() {
        assert_eq!(build_match_query("Bayesian (dropout)?"), "\"bayesian\" OR \"dropout\"");
        assert_eq!(build_match_query("  ?! "), "");
    }

    #[test]
    fn test_empty_corpus_fails() {
        assert!(LexicalIndex::build(vec![]).is_err());
    }

    #[test]
    fn test_keyword_hit_ranks_first() {
        let index = LexicalIndex::build(corpus()).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search("bayesian dropout", 3).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.content.contains("Monte Carlo"));
        assert!(results[0].score > 0.0);
        assert_eq!(results[0].method, SearchMethod::Lexical);
    }

    #[test]
    fn test_scores_descending() {
        let index = LexicalIndex::build(corpus()).unwrap();
        let results = index.search("uncertainty networks prediction", 3).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_no_match_and_no_tokens() {
        let index = LexicalIndex::build(corpus()).unwrap();
        assert!(index.search("astrophysics", 3).unwrap().is_empty());
        assert!(index.search("???", 3).unwrap().is_empty());
    }

    #[test]
    fn test_zero_k_is_invalid() {
        let index = LexicalIndex::build(corpus()).unwrap();
        let err = index.search("dropout", 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::InvalidQuery(_))
        ));
    }
}

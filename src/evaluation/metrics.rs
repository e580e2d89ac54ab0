//! 결정적 평가 지표 - 검색 정밀도/재현율, 어휘 중복도

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// 검색 결과 식별에 쓰는 본문 접두사 길이 (문자)
pub const CHUNK_ID_PREFIX_CHARS: usize = 100;

/// 청크 본문의 식별 접두사
pub fn chunk_id(content: &str) -> String {
    content.chars().take(CHUNK_ID_PREFIX_CHARS).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationMetrics {
    /// 응답 길이 (문자)
    pub response_length: usize,
    pub jaccard_similarity: f64,
}

/// 검색 정밀도/재현율/F1
///
/// 검색된 청크는 앞 100자로 식별하고, `relevant`는 같은 형식의 접두사 집합입니다.
/// 분모가 0이면 해당 지표는 0입니다.
pub fn retrieval_metrics<R: AsRef<str>, T: AsRef<str>>(
    retrieved: &[R],
    relevant: &[T],
) -> RetrievalMetrics {
    let retrieved: HashSet<String> = retrieved.iter().map(|c| chunk_id(c.as_ref())).collect();
    let relevant: HashSet<&str> = relevant.iter().map(|r| r.as_ref()).collect();

    let hits = retrieved
        .iter()
        .filter(|id| relevant.contains(id.as_str()))
        .count() as f64;

    let precision = if retrieved.is_empty() {
        0.0
    } else {
        hits / retrieved.len() as f64
    };
    let recall = if relevant.is_empty() {
        0.0
    } else {
        hits / relevant.len() as f64
    };
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    RetrievalMetrics {
        precision,
        recall,
        f1_score,
    }
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\b\w+\b").expect("Invalid regex"))
}

fn word_set(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 응답 길이와 정답 대비 Jaccard 유사도
pub fn generation_metrics(response: &str, ground_truth: &str) -> GenerationMetrics {
    let response_words = word_set(response);
    let truth_words = word_set(ground_truth);

    let intersection = response_words.intersection(&truth_words).count();
    let union = response_words.union(&truth_words).count();

    GenerationMetrics {
        response_length: response.chars().count(),
        jaccard_similarity: if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sets_are_zero() {
        let empty: [&str; 0] = [];
        let m = retrieval_metrics(&empty, &empty);
        assert_eq!(m, RetrievalMetrics { precision: 0.0, recall: 0.0, f1_score: 0.0 });

        let m = retrieval_metrics(&["some chunk"], &empty);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let long = format!("{}tail that is ignored", "x".repeat(100));
        let retrieved = vec![long.clone(), "other".to_string()];
        let relevant = vec!["x".repeat(100), "missing".to_string()];

        let m = retrieval_metrics(&retrieved, &relevant);
        assert!((m.precision - 0.5).abs() < 1e-9);
        assert!((m.recall - 0.5).abs() < 1e-9);
        assert!((m.f1_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        let same = generation_metrics("Evidential learning works.", "evidential LEARNING works");
        assert_eq!(same.jaccard_similarity, 1.0);
        assert_eq!(same.response_length, 26);

        let disjoint = generation_metrics("alpha beta", "gamma delta");
        assert_eq!(disjoint.jaccard_similarity, 0.0);

        let empty = generation_metrics("", "...");
        assert_eq!(empty.jaccard_similarity, 0.0);
        assert_eq!(empty.response_length, 0);
    }

    #[test]
    fn test_chunk_id_counts_chars() {
        let text = "é".repeat(150);
        assert_eq!(chunk_id(&text).chars().count(), 100);
    }
}

//! 프롬프트 구성 - 인용 메타데이터가 붙은 컨텍스트

use crate::knowledge::Chunk;

pub const UNSPECIFIED_TITLE: &str = "Unspecified Title";
pub const UNSPECIFIED_AUTHORS: &str = "Unspecified Authors";
pub const UNSPECIFIED_YEAR: &str = "Unspecified Year";

/// 컨텍스트에 답이 없을 때 모델이 써야 하는 문장
pub const NO_ANSWER_SENTENCE: &str =
    "The provided context does not contain the answer to this question.";

/// 청크 하나를 인용 블록으로 포맷
pub fn format_chunk(chunk: &Chunk) -> String {
    let meta = &chunk.metadata;

    let title = meta
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNSPECIFIED_TITLE);

    let authors = if meta.authors.is_empty() {
        UNSPECIFIED_AUTHORS.to_string()
    } else {
        meta.authors.join(", ")
    };

    let year = meta
        .year()
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNSPECIFIED_YEAR.to_string());

    format!(
        "Title: {}\nAuthors: {}\nYear: {}\nContent: {}",
        title, authors, year, chunk.content
    )
}

/// 검색 순서대로 빈 줄로 구분해 이어붙임
pub fn build_context<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> String {
    chunks
        .into_iter()
        .map(format_chunk)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 최종 프롬프트
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert in deep learning and mathematics. Answer the question directly and \
concisely using only the provided context. Base your answer on the context, paraphrase or quote \
where appropriate, and include citations [Authors, Year].

If the context does not contain information to answer the question, say \"{NO_ANSWER_SENTENCE}\"

Context:
{context}

Question: {question}

Direct Answer:"
    )
}

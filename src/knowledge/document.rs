//! 문서 / 청크 데이터 모델

use serde::{Deserialize, Serialize};

/// 문서 메타데이터
///
/// 스크래퍼 사이드카, PDF Info 사전, 파일 경로에서 채워집니다.
/// 청크는 부모 문서의 메타데이터를 그대로 복사해 가집니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// 구조화된 출판 연도 (있으면 creation_date보다 우선)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// 원본 생성일 문자열 (PDF `D:YYYYMMDD...` 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    /// 출처 식별자 (스크랩 소스 이름 또는 파일 경로)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 원본 링크 (arXiv abs, HAL URI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// PDF 페이지 번호 (1부터)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
}

impl DocumentMetadata {
    /// 연도 결정
    ///
    /// 구조화된 `year` 우선, 없으면 생성일 앞 4글자가 숫자일 때만 사용합니다.
    pub fn year(&self) -> Option<i32> {
        self.year
            .or_else(|| self.creation_date.as_deref().and_then(year_from_date))
    }

    /// 빈 필드를 `other` 값으로 채움
    pub fn fill_from(&mut self, other: &DocumentMetadata) {
        if self.title.is_none() {
            self.title = other.title.clone();
        }
        if self.authors.is_empty() {
            self.authors = other.authors.clone();
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.creation_date.is_none() {
            self.creation_date = other.creation_date.clone();
        }
        if self.source.is_none() {
            self.source = other.source.clone();
        }
        if self.link.is_none() {
            self.link = other.link.clone();
        }
    }
}

/// 날짜 문자열에서 연도 추출
///
/// `D:` 접두사(PDF 날짜 형식)를 제거한 뒤 앞 4글자가 모두 숫자여야 합니다.
pub fn year_from_date(date: &str) -> Option<i32> {
    let date = date.trim();
    let date = date.strip_prefix("D:").unwrap_or(date);
    let prefix = date.get(..4)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// 스크랩된 원본 문서 (PDF는 페이지 단위)
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// 인덱싱/검색 단위
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

//! PDF 텍스트/메타데이터 추출 모듈
//!
//! 페이지 텍스트는 lopdf로 페이지마다 추출하고, 모두 비어 있으면
//! pdf-extract 전체 추출 결과를 폼피드 기준으로 나눕니다.
//! Info 사전에서 제목, 저자, 생성일을 읽습니다.

use std::path::Path;

use anyhow::{Context, Result};
use lopdf::{Document as PdfDoc, Object};

/// PDF Info 사전 값
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    /// 원본 문자열 (`D:YYYYMMDD...`)
    pub creation_date: Option<String>,
}

/// 한 번의 파싱으로 얻은 페이지 텍스트와 Info 사전
#[derive(Debug, Clone, Default)]
pub struct PdfContent {
    /// (페이지 번호, 텍스트), 페이지 번호는 1부터
    pub pages: Vec<(usize, String)>,
    pub info: PdfInfo,
}

/// PDF를 한 번 읽고 파싱해 페이지 텍스트와 Info 사전을 함께 추출
pub fn extract(path: &Path) -> Result<PdfContent> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let doc = PdfDoc::load_mem(&bytes)
        .with_context(|| format!("Failed to parse PDF: {:?}", path))?;

    Ok(PdfContent {
        pages: pages_from_document(&doc, &bytes, path),
        info: info_from_document(&doc),
    })
}

fn pages_from_document(doc: &PdfDoc, bytes: &[u8], path: &Path) -> Vec<(usize, String)> {
    let mut pages: Vec<(usize, String)> = Vec::new();
    for (page_num, _) in doc.get_pages() {
        let text = match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Page {} of {:?} has no extractable text: {}", page_num, path, e);
                String::new()
            }
        };
        pages.push((page_num as usize, text));
    }

    if pages.iter().any(|(_, text)| !text.trim().is_empty()) {
        return pages;
    }

    // lopdf가 텍스트를 못 찾은 경우
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) if !text.trim().is_empty() => split_pdf_pages(&text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| (i + 1, text))
            .collect(),
        Ok(_) => {
            tracing::warn!(
                "No text extracted from PDF: {:?}. It might be a scanned document.",
                path
            );
            pages
        }
        Err(e) => {
            tracing::warn!("pdf-extract failed on {:?}: {}", path, e);
            pages
        }
    }
}

/// Info 사전 (없으면 빈 값)
fn info_from_document(doc: &PdfDoc) -> PdfInfo {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        });

    let Some(info) = info else {
        return PdfInfo::default();
    };

    let field = |key: &[u8]| {
        info.get(key)
            .ok()
            .and_then(|obj| obj.as_str().ok())
            .map(decode_pdf_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    PdfInfo {
        title: field(b"Title"),
        author: field(b"Author"),
        creation_date: field(b"CreationDate"),
    }
}

/// PDF 문자열 디코딩 (UTF-16BE BOM 또는 PDFDocEncoding/Latin-1)
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// PDF 텍스트를 폼피드 기준으로 페이지 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.is_empty() {
        vec![text.trim().to_string()]
    } else {
        pages
    }
}

/// 저자 문자열을 목록으로 분리 (`;` 또는 ` and ` 구분)
pub fn split_authors(author: &str) -> Vec<String> {
    author
        .split(';')
        .flat_map(|part| part.split(" and "))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

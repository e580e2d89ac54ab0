//! HAL 검색 - 학위논문(THESE)만
//!
//! HAL 검색 API(JSON)를 사용합니다. 본문 PDF(`fileMain_s`)가 없는 항목은 제외됩니다.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{normalize_whitespace, Paper};

pub const API_URL: &str = "https://api.archives-ouvertes.fr/search/";

const FIELDS: &str = "halId_s,title_s,authFullName_s,producedDateY_i,fileMain_s,uri_s,abstract_s";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    docs: Vec<HalDoc>,
}

#[derive(Debug, Deserialize)]
struct HalDoc {
    #[serde(rename = "halId_s")]
    hal_id: Option<String>,
    #[serde(rename = "title_s", default)]
    titles: Vec<String>,
    #[serde(rename = "authFullName_s", default)]
    authors: Vec<String>,
    #[serde(rename = "producedDateY_i")]
    year: Option<i32>,
    #[serde(rename = "fileMain_s")]
    file_main: Option<String>,
    #[serde(rename = "uri_s")]
    uri: Option<String>,
    #[serde(rename = "abstract_s", default)]
    abstracts: Vec<String>,
}

/// 학위논문 검색
pub async fn search(client: &reqwest::Client, query: &str, max_results: usize) -> Result<Vec<Paper>> {
    tracing::info!("Searching HAL theses: {:?} (max {})", query, max_results);

    let rows = max_results.to_string();

    let body = client
        .get(API_URL)
        .query(&[
            ("q", query),
            ("fq", "docType_s:THESE"),
            ("fl", FIELDS),
            ("rows", rows.as_str()),
            ("wt", "json"),
        ])
        .send()
        .await
        .context("HAL 요청 실패")?
        .error_for_status()
        .context("HAL 응답 오류")?
        .text()
        .await
        .context("HAL 응답 본문 읽기 실패")?;

    parse_response(&body)
}

/// 검색 응답 → 논문 목록
pub fn parse_response(body: &str) -> Result<Vec<Paper>> {
    let parsed: SearchResponse =
        serde_json::from_str(body).context("HAL 응답 파싱 실패")?;

    let papers: Vec<Paper> = parsed
        .response
        .docs
        .into_iter()
        .filter_map(|doc| {
            let id = doc.hal_id?;
            let Some(pdf_url) = doc.file_main else {
                tracing::debug!("Skipping HAL record without PDF: {}", id);
                return None;
            };
            let title = doc
                .titles
                .first()
                .map(|t| normalize_whitespace(t))
                .filter(|t| !t.is_empty())?;

            Some(Paper {
                link: doc
                    .uri
                    .unwrap_or_else(|| format!("https://hal.science/{}", id)),
                id,
                title,
                authors: doc.authors,
                year: doc.year,
                pdf_url,
                summary: doc.abstracts.into_iter().next(),
            })
        })
        .collect();

    tracing::debug!("Parsed {} HAL records", papers.len());
    Ok(papers)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{
          "response": {
            "numFound": 3,
            "start": 0,
            "docs": [
              {
                "halId_s": "tel-03512345",
                "title_s": ["Apprentissage profond évidentiel", "Evidential deep learning"],
                "authFullName_s": ["Marie Curie"],
                "producedDateY_i": 2021,
                "fileMain_s": "https://theses.hal.science/tel-03512345/document",
                "uri_s": "https://theses.hal.science/tel-03512345"
              },
              {
                "halId_s": "tel-00000001",
                "title_s": ["No PDF here"]
              },
              {
                "title_s": ["No id"],
                "fileMain_s": "https://hal.science/x.pdf"
              }
            ]
          }
        }"#;

        let papers = parse_response(body).unwrap();
        assert_eq!(papers.len(), 1);

        let thesis = &papers[0];
        assert_eq!(thesis.id, "tel-03512345");
        assert_eq!(thesis.title, "Apprentissage profond évidentiel");
        assert_eq!(thesis.authors, vec!["Marie Curie"]);
        assert_eq!(thesis.year, Some(2021));
        assert_eq!(thesis.link, "https://theses.hal.science/tel-03512345");
        assert!(thesis.pdf_url.ends_with("/document"));
    }

    #[test]
    fn test_malformed_response() {
        assert!(parse_response("<html>maintenance</html>").is_err());
    }
}

//! arXiv 검색 - Atom API
//!
//! `export.arxiv.org/api/query` 응답(Atom 피드)을 HTML 파서로 읽습니다.

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};

use super::{normalize_whitespace, Paper};
use crate::knowledge::year_from_date;

pub const API_URL: &str = "http://export.arxiv.org/api/query";

/// 관련도순 검색
pub async fn search(client: &reqwest::Client, query: &str, max_results: usize) -> Result<Vec<Paper>> {
    tracing::info!("Searching arXiv: {:?} (max {})", query, max_results);

    let search_query = format!("all:{}", query);
    let max_results = max_results.to_string();

    let feed = client
        .get(API_URL)
        .query(&[
            ("search_query", search_query.as_str()),
            ("start", "0"),
            ("max_results", max_results.as_str()),
            ("sortBy", "relevance"),
            ("sortOrder", "descending"),
        ])
        .send()
        .await
        .context("arXiv 요청 실패")?
        .error_for_status()
        .context("arXiv 응답 오류")?
        .text()
        .await
        .context("arXiv 응답 본문 읽기 실패")?;

    parse_feed(&feed)
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

/// Atom 피드 → 논문 목록
///
/// id나 제목이 없는 항목은 건너뜁니다. API 에러 피드는 에러로 변환합니다.
pub fn parse_feed(feed: &str) -> Result<Vec<Paper>> {
    let document = Html::parse_document(feed);

    let entry_sel = selector("entry");
    let id_sel = selector("id");
    let title_sel = selector("title");
    let summary_sel = selector("summary");
    let published_sel = selector("published");
    let author_sel = selector("author name");
    let pdf_link_sel = selector(r#"link[title="pdf"]"#);

    let mut papers = Vec::new();

    for entry in document.select(&entry_sel) {
        let Some(abs_url) = first_text(&entry, &id_sel) else {
            continue;
        };

        if abs_url.contains("/api/errors") {
            let reason = first_text(&entry, &summary_sel).unwrap_or_default();
            anyhow::bail!("arXiv API error: {}", reason);
        }

        let Some(title) = first_text(&entry, &title_sel) else {
            tracing::debug!("Skipping arXiv entry without title: {}", abs_url);
            continue;
        };

        let id = abs_url
            .rsplit('/')
            .next()
            .unwrap_or(abs_url.as_str())
            .to_string();

        let pdf_url = entry
            .select(&pdf_link_sel)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(str::to_string)
            .unwrap_or_else(|| abs_url.replace("/abs/", "/pdf/"));

        papers.push(Paper {
            id,
            title,
            authors: entry
                .select(&author_sel)
                .map(|n| normalize_whitespace(&n.text().collect::<String>()))
                .filter(|n| !n.is_empty())
                .collect(),
            year: first_text(&entry, &published_sel).as_deref().and_then(year_from_date),
            pdf_url,
            link: abs_url,
            summary: first_text(&entry, &summary_sel),
        });
    }

    tracing::debug!("Parsed {} arXiv entries", papers.len());
    Ok(papers)
}

fn first_text(element: &ElementRef, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|e| normalize_whitespace(&e.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:evidential</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/1806.01768v3</id>
    <published>2018-06-05T17:38:09Z</published>
    <title>Evidential Deep Learning to Quantify
      Classification Uncertainty</title>
    <summary>Deterministic neural nets have been shown to learn effective predictors.</summary>
    <author><name>Murat Sensoy</name></author>
    <author><name>Lance Kaplan</name></author>
    <link href="http://arxiv.org/abs/1806.01768v3" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1806.01768v3" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-01T00:00:00Z</published>
    <title>Old Style Identifier</title>
    <author><name>A. Physicist</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let papers = parse_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let edl = &papers[0];
        assert_eq!(edl.id, "1806.01768v3");
        assert_eq!(
            edl.title,
            "Evidential Deep Learning to Quantify Classification Uncertainty"
        );
        assert_eq!(edl.authors, vec!["Murat Sensoy", "Lance Kaplan"]);
        assert_eq!(edl.year, Some(2018));
        assert_eq!(edl.pdf_url, "http://arxiv.org/pdf/1806.01768v3");
        assert_eq!(edl.link, "http://arxiv.org/abs/1806.01768v3");
        assert!(edl.summary.as_deref().unwrap().starts_with("Deterministic"));

        // pdf 링크가 없으면 abs → pdf
        let old = &papers[1];
        assert_eq!(old.id, "9901001v1");
        assert_eq!(old.pdf_url, "http://arxiv.org/pdf/hep-th/9901001v1");
    }

    #[test]
    fn test_error_feed() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
  </entry>
</feed>"#;
        let err = parse_feed(feed).unwrap_err();
        assert!(err.to_string().contains("incorrect id format"));
    }

    #[test]
    fn test_empty_feed() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_feed(feed).unwrap().is_empty());
    }
}

//! CLI 모듈
//!
//! thesis-rag CLI 명령어 정의 및 구현

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectionStats, FileCollector};
use crate::config::{Config, API_KEY_ENV};
use crate::engine::{Answer, EvaluationRequest, Indexer, QueryEngine};
use crate::evaluation::MetricSet;
use crate::generation::prompt::{UNSPECIFIED_AUTHORS, UNSPECIFIED_TITLE, UNSPECIFIED_YEAR};
use crate::knowledge::{read_manifest, RetrievalMode, SearchMethod};
use crate::scraper::{list_sources, Source, ThesisScraper};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "thesis-rag")]
#[command(version, about = "학술 논문 PDF 기반 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 디렉토리로 벡터 인덱스 (재)빌드
    Index,

    /// arXiv / HAL에서 논문 PDF 다운로드
    Scrape {
        /// 검색 쿼리
        query: String,

        /// 검색 소스
        #[arg(short, long, value_enum, default_value_t = Source::Arxiv)]
        source: Source,

        /// 최대 논문 수
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수 (기본: 설정의 top_k)
        #[arg(short)]
        k: Option<usize>,

        /// 검색 모드 (기본: 설정의 retrieval_mode)
        #[arg(short, long, value_enum)]
        mode: Option<RetrievalMode>,
    },

    /// 질문 하나에 대해 답변을 만들고 채점
    Evaluate {
        /// 질문
        question: String,

        /// 정답 (lexical 지표에 필요)
        #[arg(short, long)]
        ground_truth: Option<String>,

        /// 관련 청크의 앞 100자 (여러 번 지정 가능)
        #[arg(short, long)]
        relevant: Vec<String>,

        /// 지표 묶음 (쉼표 구분)
        #[arg(
            short,
            long,
            value_enum,
            value_delimiter = ',',
            default_value = "model_graded"
        )]
        metrics: Vec<MetricSet>,
    },

    /// 다운로드된 PDF와 원본 링크 목록
    Sources,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Index => cmd_index(&config).await,
        Commands::Scrape {
            query,
            source,
            count,
        } => cmd_scrape(&config, &query, source, count).await,
        Commands::Ask { question, k, mode } => cmd_ask(config, &question, k, mode).await,
        Commands::Evaluate {
            question,
            ground_truth,
            relevant,
            metrics,
        } => {
            let request = EvaluationRequest {
                question,
                ground_truth,
                relevant,
                metrics,
            };
            cmd_evaluate(config, &request).await
        }
        Commands::Sources => cmd_sources(&config),
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 빌드 명령어 (index)
async fn cmd_index(config: &Config) -> Result<()> {
    println!("[*] 인덱스 빌드 중: {}", config.data_dir.display());

    let summary = Indexer::build_index(config).await?;

    for failure in &summary.failures {
        println!("[!] {}", failure);
    }

    println!(
        "[OK] 인덱스 저장: {} ({} 파일, {} 문서, {} 청크)",
        config.index_path.display(),
        summary.files_loaded,
        summary.documents,
        summary.chunks
    );
    println!(
        "     임베딩: {} ({}차원), build {}",
        summary.manifest.embedding_model, summary.manifest.dimension, summary.manifest.build_id
    );

    Ok(())
}

/// 논문 스크래핑 명령어 (scrape)
async fn cmd_scrape(config: &Config, query: &str, source: Source, count: usize) -> Result<()> {
    println!("[*] {} 검색 중: \"{}\" (최대 {}건)", source, query, count);

    let scraper = ThesisScraper::new(&config.data_dir)?;
    let report = scraper
        .scrape(query, source, count)
        .await
        .context("스크래핑 실패")?;

    for path in &report.saved {
        println!("[OK] {}", path.display());
    }
    for failure in &report.failures {
        println!("[!] {}", failure);
    }

    println!();
    println!(
        "[OK] 완료: 성공 {}, 실패 {}",
        report.saved.len(),
        report.failures.len()
    );
    if !report.saved.is_empty() {
        println!("     다음 단계: thesis-rag index");
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: Config,
    question: &str,
    k: Option<usize>,
    mode: Option<RetrievalMode>,
) -> Result<()> {
    let k = k.unwrap_or(config.top_k);
    let mode = mode.unwrap_or(config.retrieval_mode);

    let engine = QueryEngine::initialize(config).await?;

    println!("[*] 검색 중: \"{}\" (k={}, {})", question, k, mode);
    let answer = engine.query_with(question, k, mode).await?;

    print_answer(&answer);
    Ok(())
}

/// 평가 명령어 (evaluate)
async fn cmd_evaluate(config: Config, request: &EvaluationRequest) -> Result<()> {
    let engine = QueryEngine::initialize(config).await?;

    let metrics = request
        .metrics
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("[*] 평가 중: \"{}\" ({})", request.question, metrics);

    let (answer, report) = engine.evaluate(request).await?;

    print_answer(&answer);
    println!("[OK] 평가 결과:");
    print!("{}", report);

    Ok(())
}

/// 소스 목록 명령어 (sources)
fn cmd_sources(config: &Config) -> Result<()> {
    let listing = list_sources(&config.data_dir)?;

    if listing.pdfs.is_empty() {
        println!("[!] PDF가 없습니다. 먼저 thesis-rag scrape를 실행하세요.");
        return Ok(());
    }

    println!("[OK] 다운로드된 PDF ({} 건):", listing.pdfs.len());
    for pdf in &listing.pdfs {
        println!("  - {}", pdf);
    }

    if !listing.links.is_empty() {
        println!();
        println!("[OK] 원본 링크 ({} 건):", listing.links.len());
        for link in &listing.links {
            println!("  - {}", link);
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &Config) -> Result<()> {
    println!("thesis-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 문서 디렉토리: {}", config.data_dir.display());
    println!("[*] 인덱스 위치: {}", config.index_path.display());
    println!(
        "[*] 모델: {} (임베딩: {})",
        config.llm_model, config.embedding_model
    );

    // API 키 상태
    if config.api_key().is_some() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export {}=your-key", API_KEY_ENV);
    }

    // 문서 통계
    match FileCollector::with_defaults().collect_directory(&config.data_dir) {
        Ok(files) => {
            let stats = CollectionStats::from_files(&files);
            println!(
                "[OK] 문서: {} 파일 (PDF {}, 텍스트 {}), {}",
                stats.total_files,
                stats.pdf_files,
                stats.text_files,
                format_bytes(stats.total_size)
            );
        }
        Err(e) => {
            println!("[!] 문서 디렉토리를 읽을 수 없습니다: {}", e);
        }
    }

    // 인덱스 상태
    match read_manifest(&config.index_path) {
        Ok(manifest) => {
            println!(
                "[OK] 벡터 인덱스: {} 청크 ({}, {}차원)",
                manifest.chunk_count, manifest.embedding_model, manifest.dimension
            );
            println!(
                "     build {} ({})",
                manifest.build_id,
                manifest.built_at.format("%Y-%m-%d %H:%M")
            );
            if manifest.embedding_model != config.embedding_model {
                println!(
                    "[!] 설정된 임베딩 모델({})과 다릅니다. thesis-rag index로 다시 빌드하세요.",
                    config.embedding_model
                );
            }
        }
        Err(e) => {
            println!("[!] {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_answer(answer: &Answer) {
    let retrieval = &answer.retrieval;

    if retrieval.degraded() {
        println!(
            "[!] 키워드 인덱스를 사용할 수 없어 {}로 검색했습니다.",
            retrieval.mode_used
        );
    }

    println!("\n{}\n", answer.text);

    if retrieval.chunks.is_empty() {
        println!("[!] 검색된 문서가 없습니다.");
        return;
    }

    println!("[OK] 참고 문서 ({} 건, {}):", retrieval.chunks.len(), retrieval.mode_used);

    for (i, result) in retrieval.chunks.iter().enumerate() {
        let method_str = match result.method {
            SearchMethod::Vector => "VEC",
            SearchMethod::Lexical => "FTS",
        };
        let meta = &result.chunk.metadata;

        println!(
            "{}. [{}] [점수: {:.4}] {}",
            i + 1,
            method_str,
            result.score,
            truncate_text(meta.title.as_deref().unwrap_or(UNSPECIFIED_TITLE), 60)
        );

        let authors = if meta.authors.is_empty() {
            UNSPECIFIED_AUTHORS.to_string()
        } else {
            meta.authors.join(", ")
        };
        let year = meta
            .year()
            .map(|y| y.to_string())
            .unwrap_or_else(|| UNSPECIFIED_YEAR.to_string());
        println!("   {} ({})", truncate_text(&authors, 60), year);

        if let Some(page) = meta.page {
            println!("   페이지: {}", page);
        }
        if let Some(ref link) = meta.link {
            println!("   링크: {}", link);
        }
        println!("   내용: {}", truncate_text(&result.chunk.content, 200));
        println!();
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

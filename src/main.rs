//! thesis-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // CLI 실행
    let cli = thesis_rag::cli::Cli::parse();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(thesis_rag::cli::run(cli))
}

//! 抽出パイプラインテスト
//!
//! 実行方法:
//! ```
//! cargo run -p material-extractor --example extract_test -- ./materials.xlsx
//! ```

use material_extractor::{ExtractionRequest, ExtractionService, ExtractorConfig};
use tower::Service;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // .envがあれば読み込む
    if let Ok(env_path) = std::fs::canonicalize(".env") {
        println!("Loading .env from: {:?}", env_path);
        for line in std::fs::read_to_string(".env")?.lines() {
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('\'').trim_matches('"');
                if !key.starts_with('#') && !key.is_empty() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    let excel_paths: Vec<String> = std::env::args().skip(1).collect();
    if excel_paths.is_empty() {
        eprintln!("Usage: extract_test <workbook.xlsx> [more.xls ...]");
        std::process::exit(1);
    }

    let config = ExtractorConfig::from_env()?;

    println!("=== Material Extractor Test ===");
    println!("Realm: {}", config.realm);
    println!("Workbooks: {:?}", excel_paths);
    println!("Headless: {}", config.headless);
    println!();

    let mut service = ExtractionService::new(&config);
    let request = ExtractionRequest::new(excel_paths);

    match service.call(request).await {
        Ok(result) => {
            println!();
            println!("=== Results ===");
            println!("Processed: {}", result.summary.processed.len());
            println!("Failed: {}", result.summary.failed.len());
            for report in &result.reports {
                println!("Report: {:?}", report);
            }
            println!("Archive: {:?}", result.zip_path);
        }
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

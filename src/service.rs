use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::archive;
use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::lookup::RecordClient;
use crate::orchestrator::{ExtractionSummary, Orchestrator};
use crate::portal::PortalSession;
use crate::report;

/// 抽出リクエスト
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub excel_paths: Vec<PathBuf>,
    pub headless: Option<bool>,
}

impl ExtractionRequest {
    pub fn new(excel_paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            excel_paths: excel_paths.into_iter().map(Into::into).collect(),
            headless: None,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }
}

/// 抽出結果
#[derive(Debug)]
pub struct ExtractionResult {
    pub run_root: PathBuf,
    pub reports: Vec<PathBuf>,
    pub zip_path: PathBuf,
    pub summary: ExtractionSummary,
}

/// tower::Serviceを実装した抽出サービス
///
/// スイープ → 抽出 → レポート生成 → ZIPパッケージまでを1リクエストで実行する
#[derive(Debug, Clone)]
pub struct ExtractionService {
    config: ExtractorConfig,
}

impl ExtractionService {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl Service<ExtractionRequest> for ExtractionService {
    type Response = ExtractionResult;
    type Error = ExtractorError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ExtractionRequest) -> Self::Future {
        info!(
            "Extraction request received: {} workbook(s)",
            req.excel_paths.len()
        );

        let mut config = self.config.clone();
        Box::pin(async move {
            config.validate()?;
            if let Some(headless) = req.headless {
                config.headless = headless;
            }

            std::fs::create_dir_all(&config.download_root)?;

            // 古いラン出力を掃除してから新しいランを始める
            let removed = archive::sweep_expired(&config.download_root, archive::RETENTION_DAYS);
            if removed > 0 {
                info!("Swept {} expired output folder(s)", removed);
            }

            let run_root = config.download_root.join(archive::run_folder_name());
            std::fs::create_dir_all(&run_root)?;

            let lookup = RecordClient::new(&config)?;
            let session = PortalSession::new(&config);
            let mut orchestrator = Orchestrator::new(&config, session, lookup);

            let summary = orchestrator.run(&req.excel_paths, &run_root).await?;
            if summary.is_empty() {
                return Err(ExtractorError::NoData(
                    "資材番号が1件も抽出できませんでした".into(),
                ));
            }

            let reports = report::generate_reports(&run_root)?;
            let zip_path = archive::package_output(&run_root.join(report::SUMMARY_DIR_NAME))?;

            info!(
                "Extraction finished: {} processed, archive {}",
                summary.processed.len(),
                zip_path.display()
            );

            Ok(ExtractionResult {
                run_root,
                reports,
                zip_path,
                summary,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_config(root: &std::path::Path) -> ExtractorConfig {
        ExtractorConfig::new("example.quickbase.com", "b_token")
            .with_tables("appid", "tbl_mat", "tbl_att")
            .with_login("https://portal.example.com/login", "qa@example.com", "pw")
            .with_download_root(root)
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let unique = format!(
            "material-extractor-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let dir = std::env::temp_dir().join(unique);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_request_builder() {
        let req = ExtractionRequest::new(["/tmp/a.xlsx", "/tmp/b.xls"]).with_headless(false);
        assert_eq!(req.excel_paths.len(), 2);
        assert_eq!(req.headless, Some(false));
    }

    #[tokio::test]
    async fn test_call_without_identifiers_reports_no_data() {
        let root = temp_dir("service-nodata");
        let mut service = ExtractionService::new(&fixture_config(&root));

        // 存在しないワークブックはバッチ単位で読み飛ばされ、
        // 識別子ゼロのランはNoDataになる
        let req = ExtractionRequest::new([root.join("missing.xlsx")]);
        let result = service.call(req).await;
        assert!(matches!(result, Err(ExtractorError::NoData(_))));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_call_rejects_incomplete_config() {
        let root = temp_dir("service-config");
        let config = ExtractorConfig::new("example.quickbase.com", "b_token");
        let mut service = ExtractionService::new(&config);

        let result = service.call(ExtractionRequest::new([root.join("a.xlsx")])).await;
        assert!(matches!(result, Err(ExtractorError::Config(_))));

        std::fs::remove_dir_all(&root).unwrap();
    }
}

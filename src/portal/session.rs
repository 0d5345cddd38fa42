//! 認証済みポータルセッション

use std::collections::HashSet;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::traits::Session;

/// ログインフォームのフォールバックセレクタ群
///
/// ポータル側のフォーム構造変更に備えて name → id → type の順で試す
const EMAIL_SELECTORS: &[&str] = &[
    r#"input[name="email"]"#,
    r#"input[id*="email"]"#,
    r#"input[type="email"]"#,
];
const PASSWORD_SELECTORS: &[&str] = &[
    r#"input[name="password"]"#,
    r#"input[id*="password"]"#,
    r#"input[type="password"]"#,
];
const SUBMIT_SELECTORS: &[&str] = &[
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    r#"button[id*="login"]"#,
];

const CDP_REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct PortalSession {
    config: ExtractorConfig,
    browser: Option<Browser>,
    page: Option<Arc<Page>>,
}

impl PortalSession {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            config: config.clone(),
            browser: None,
            page: None,
        }
    }

    fn get_page(&self) -> Result<&Arc<Page>, ExtractorError> {
        self.page
            .as_ref()
            .ok_or_else(|| ExtractorError::BrowserInit("セッションが開かれていません".into()))
    }

    /// レコード詳細ページのURLを組み立てる
    fn build_record_url(&self, rid: i64) -> String {
        format!(
            "https://{}/nav/app/{}/table/{}/action/dr?rid={}",
            self.config.realm, self.config.app_id, self.config.material_table_id, rid
        )
    }

    async fn launch_browser(&mut self) -> Result<(), ExtractorError> {
        info!("Initializing browser for portal session...");

        // ユニークなユーザーデータディレクトリを生成
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("material-extractor-{}", unique_id));

        // Chrome パスを取得
        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .unwrap_or_else(|_| "chromium".to_string());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&user_data_dir)
            .window_size(1280, 800);

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(CDP_REQUEST_TIMEOUT_SECS))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        let browser_config = builder
            .build()
            .map_err(|e| ExtractorError::BrowserInit(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ExtractorError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExtractorError::BrowserInit(e.to_string()))?;

        self.browser = Some(browser);
        self.page = Some(Arc::new(page));

        info!("Browser initialized");
        Ok(())
    }

    /// ログインシーケンス（メール → パスワード → 送信）
    async fn login(&self) -> Result<(), ExtractorError> {
        let page = self.get_page()?.clone();

        info!("Navigating to login page: {}", self.config.login_url);
        page.goto(self.config.login_url.as_str())
            .await
            .map_err(|e| ExtractorError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ExtractorError::Navigation(e.to_string()))?;
        sleep(self.config.backoff.pre_login_settle).await;

        let email_input = self.locate(&page, EMAIL_SELECTORS, "メール入力欄").await?;
        email_input
            .type_str(&self.config.login_email)
            .await
            .map_err(|e| ExtractorError::Login(format!("メール入力: {}", e)))?;
        debug!("Email entered");

        let password_input = self
            .locate(&page, PASSWORD_SELECTORS, "パスワード入力欄")
            .await?;
        password_input
            .type_str(&self.config.login_password)
            .await
            .map_err(|e| ExtractorError::Login(format!("パスワード入力: {}", e)))?;
        debug!("Password entered");

        let submit = self.locate(&page, SUBMIT_SELECTORS, "ログインボタン").await?;
        submit
            .click()
            .await
            .map_err(|e| ExtractorError::Login(format!("ログインボタンクリック: {}", e)))?;

        // ログイン処理完了待ち
        sleep(self.config.backoff.login_settle).await;

        info!("Login completed");
        Ok(())
    }

    /// フォールバックチェーンの先頭から順に要素を探す
    async fn locate(
        &self,
        page: &Page,
        selectors: &[&str],
        what: &str,
    ) -> Result<Element, ExtractorError> {
        for selector in selectors {
            match page.find_element(*selector).await {
                Ok(element) => {
                    debug!("Matched selector for {}: {}", what, selector);
                    return Ok(element);
                }
                Err(e) => debug!("Selector {} not matched: {}", selector, e),
            }
        }

        self.debug_screenshot(page, what).await;
        Err(ExtractorError::ElementNotFound(format!(
            "{} ({})",
            what,
            selectors.join(", ")
        )))
    }

    /// debugモード時のみ、現在のページをBase64でログ出力する
    async fn debug_screenshot(&self, page: &Page, tag: &str) {
        if !self.config.debug {
            return;
        }
        if let Ok(screenshot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("{} screenshot: data:image/png;base64,{}", tag, encoded);
        }
    }

    /// ダウンロード先ディレクトリを設定する
    async fn set_download_dir(&self, page: &Page, dir: &Path) -> Result<(), ExtractorError> {
        let download_path = dir
            .canonicalize()
            .unwrap_or_else(|_| dir.to_path_buf())
            .to_string_lossy()
            .to_string();

        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_path)
            .events_enabled(true)
            .build()
            .map_err(|e| ExtractorError::Download(format!("ダウンロード設定エラー: {}", e)))?;

        page.execute(params)
            .await
            .map_err(|e| ExtractorError::Download(format!("ダウンロード設定エラー: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Session for PortalSession {
    async fn open(&mut self) -> Result<(), ExtractorError> {
        let result = async {
            self.launch_browser().await?;
            self.login().await
        }
        .await;

        // open失敗時にreadyのまま残さない
        if let Err(e) = result {
            self.close().await;
            return Err(e);
        }

        info!("Portal session ready");
        Ok(())
    }

    async fn fetch_item_page(&mut self, rid: i64) -> Result<String, ExtractorError> {
        let page = self.get_page()?.clone();
        let url = self.build_record_url(rid);

        info!("Navigating to record page: {}", url);
        page.goto(url.as_str())
            .await
            .map_err(|e| ExtractorError::Navigation(e.to_string()))?;

        sleep(self.config.backoff.page_settle).await;
        sleep(self.config.backoff.content_settle).await;

        page.content()
            .await
            .map_err(|e| ExtractorError::Scrape(e.to_string()))
    }

    async fn download_image(&mut self, url: &str, dest: &Path) -> Result<bool, ExtractorError> {
        let page = self.get_page()?.clone();

        let dest_dir: PathBuf = dest
            .parent()
            .ok_or_else(|| {
                ExtractorError::Download(format!("保存先が不正です: {}", dest.display()))
            })?
            .to_path_buf();
        std::fs::create_dir_all(&dest_dir)?;
        self.set_download_dir(&page, &dest_dir).await?;

        // リネーム対象の判別用に既存エントリを控えておく
        let known = list_entries(&dest_dir);

        info!("Downloading image {} -> {}", url, dest.display());

        let policy = &self.config.backoff;
        let found = poll_for_download(
            policy.download_attempts,
            policy.download_poll,
            || {
                let page = page.clone();
                let url = url.to_string();
                async move {
                    // ダウンロード遷移はナビゲーションエラーになることがある
                    if let Err(e) = page.goto(url.as_str()).await {
                        debug!("Download navigation: {}", e);
                    }
                }
            },
            || finalize_download(&dest_dir, &known, dest),
        )
        .await;

        if !found {
            warn!(
                "Image download failed after {} attempts: {}",
                policy.download_attempts, url
            );
        }
        Ok(found)
    }

    async fn close(&mut self) {
        if self.browser.is_none() && self.page.is_none() {
            return;
        }

        info!("Closing portal session...");

        // ページとブラウザの参照を解放
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close: {}", e);
            }
        }

        info!("Portal session closed");
    }
}

/// ダウンロード完了をポーリングで待つ
///
/// 各試行でダウンロード要求を再発行し、固定間隔を置いてから
/// 完了判定を行う。上限到達でfalse。
pub(crate) async fn poll_for_download<R, Fut, C>(
    attempts: u32,
    delay: Duration,
    mut reissue: R,
    mut check: C,
) -> bool
where
    R: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    C: FnMut() -> bool,
{
    for attempt in 1..=attempts {
        reissue().await;
        sleep(delay).await;
        if check() {
            debug!("Download completed on attempt {}", attempt);
            return true;
        }
        debug!("Download not present yet ({}/{})", attempt, attempts);
    }
    false
}

/// ダウンロード済みファイルを所定の名前に揃える
///
/// ブラウザはGUID名で保存するため、試行開始前に無かった完了済み
/// エントリを目的の名前にリネームする。
fn finalize_download(dir: &Path, known: &HashSet<OsString>, dest: &Path) -> bool {
    if dest.exists() {
        return true;
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        if known.contains(&name) {
            continue;
        }
        let text = name.to_string_lossy();
        // 書き込み途中のファイルは対象外
        if text.ends_with(".crdownload") || text.ends_with(".tmp") {
            continue;
        }
        if std::fs::rename(entry.path(), dest).is_ok() {
            return true;
        }
    }
    false
}

fn list_entries(dir: &Path) -> HashSet<OsString> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn fixture_config() -> ExtractorConfig {
        ExtractorConfig::new("example.quickbase.com", "b_token")
            .with_tables("appid", "tbl_mat", "tbl_att")
            .with_login("https://portal.example.com/login", "qa@example.com", "pw")
    }

    #[test]
    fn test_session_starts_unopened() {
        let session = PortalSession::new(&fixture_config());
        assert!(session.browser.is_none());
        assert!(session.page.is_none());
        assert!(session.get_page().is_err());
    }

    #[test]
    fn test_build_record_url() {
        let session = PortalSession::new(&fixture_config());
        assert_eq!(
            session.build_record_url(1234),
            "https://example.quickbase.com/nav/app/appid/table/tbl_mat/action/dr?rid=1234"
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent_without_open() {
        let mut session = PortalSession::new(&fixture_config());
        session.close().await;
        session.close().await;
        assert!(session.browser.is_none());
    }

    #[tokio::test]
    async fn test_poll_reissues_exactly_five_times_on_permanent_failure() {
        let mut reissued = 0u32;
        let found = poll_for_download(
            5,
            Duration::from_millis(1),
            || {
                reissued += 1;
                std::future::ready(())
            },
            || false,
        )
        .await;

        assert!(!found);
        assert_eq!(reissued, 5);
    }

    #[tokio::test]
    async fn test_poll_stops_once_file_appears() {
        let mut reissued = 0u32;
        let mut checks = 0u32;
        let found = poll_for_download(
            5,
            Duration::from_millis(1),
            || {
                reissued += 1;
                std::future::ready(())
            },
            || {
                checks += 1;
                checks >= 2
            },
        )
        .await;

        assert!(found);
        assert_eq!(reissued, 2);
    }

    #[test]
    fn test_finalize_download_renames_new_entry() {
        let dir = temp_dir("download");
        std::fs::write(dir.join("existing.png"), b"old").unwrap();
        let known = list_entries(&dir);

        // ブラウザがGUID名で保存した想定
        std::fs::write(dir.join("6cb2d6a1-e5f0"), b"image-bytes").unwrap();
        std::fs::write(dir.join("partial.crdownload"), b"...").unwrap();

        let dest = dir.join("image_1.png");
        assert!(finalize_download(&dir, &known, &dest));
        assert!(dest.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"image-bytes");
        // 書き込み途中のファイルは残る
        assert!(dir.join("partial.crdownload").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_finalize_download_without_new_entry() {
        let dir = temp_dir("download-miss");
        std::fs::write(dir.join("existing.png"), b"old").unwrap();
        let known = list_entries(&dir);

        let dest = dir.join("image_1.png");
        assert!(!finalize_download(&dir, &known, &dest));
        assert!(!dest.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

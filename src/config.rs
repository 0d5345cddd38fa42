use std::path::PathBuf;
use std::time::Duration;

use crate::error::ExtractorError;

/// ネットワーク境界ごとの待機・リトライ設定
///
/// デフォルト値は実運用で確認済みの固定インターバル。挙動を変えずに
/// チューニングできるよう設定として公開する。
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// ログインフォーム描画待ち
    pub pre_login_settle: Duration,
    /// ログイン送信後の処理待ち
    pub login_settle: Duration,
    /// レコードページ遷移後の描画待ち
    pub page_settle: Duration,
    /// HTML取得前の追加待ち
    pub content_settle: Duration,
    /// 画像ダウンロードのポーリング間隔
    pub download_poll: Duration,
    /// 画像ダウンロードの再試行回数
    pub download_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            pre_login_settle: Duration::from_secs(3),
            login_settle: Duration::from_secs(10),
            page_settle: Duration::from_secs(5),
            content_settle: Duration::from_secs(3),
            download_poll: Duration::from_secs(3),
            download_attempts: 5,
        }
    }
}

/// Quickbase上のフィールドラベル設定
#[derive(Debug, Clone)]
pub struct FieldNames {
    /// 入力Excelの資材番号カラム
    pub material_number: String,
    pub component_id: String,
    pub material_cost: String,
    pub supplier_name: String,
    pub supplier_material_id: String,
    /// 添付テーブルの画像HTMLフィールド
    pub image: String,
    /// 照会クエリで使う関連フィールド
    pub related_material: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            material_number: "NPR Material Number".to_string(),
            component_id: "Component ID#".to_string(),
            material_cost: "Material Cost".to_string(),
            supplier_name: "Supplier Name(EN)".to_string(),
            supplier_material_id: "Supplier Material ID#".to_string(),
            image: "Image".to_string(),
            related_material: "Related Material".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub realm: String,
    pub app_id: String,
    pub material_table_id: String,
    pub attachment_table_id: String,
    pub token: String,
    pub login_url: String,
    pub login_email: String,
    pub login_password: String,
    pub headless: bool,
    pub debug: bool,
    pub download_root: PathBuf,
    pub fields: FieldNames,
    pub backoff: BackoffPolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            realm: String::new(),
            app_id: String::new(),
            material_table_id: String::new(),
            attachment_table_id: String::new(),
            token: String::new(),
            login_url: String::new(),
            login_email: String::new(),
            login_password: String::new(),
            headless: true,
            debug: false,
            download_root: PathBuf::from("./downloads"),
            fields: FieldNames::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn new(realm: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// 環境変数から設定を構築する
    ///
    /// 必須: REALM, APP_ID, MATERIAL_TABLE_ID, ATTACHMENT_TABLE_ID, TOKEN,
    /// LOGIN_URL, LOGIN_EMAIL, LOGIN_PASSWORD
    /// 任意: RELATED_MATERIAL_FIELD, HEADLESS ("1"で有効)
    pub fn from_env() -> Result<Self, ExtractorError> {
        fn required(key: &str) -> Result<String, ExtractorError> {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ExtractorError::Config(format!("{} が設定されていません", key)))
        }

        let mut fields = FieldNames::default();
        if let Ok(related) = std::env::var("RELATED_MATERIAL_FIELD") {
            if !related.trim().is_empty() {
                fields.related_material = related;
            }
        }

        Ok(Self {
            realm: required("REALM")?,
            app_id: required("APP_ID")?,
            material_table_id: required("MATERIAL_TABLE_ID")?,
            attachment_table_id: required("ATTACHMENT_TABLE_ID")?,
            token: required("TOKEN")?,
            login_url: required("LOGIN_URL")?,
            login_email: required("LOGIN_EMAIL")?,
            login_password: required("LOGIN_PASSWORD")?,
            headless: std::env::var("HEADLESS").map(|v| v == "1").unwrap_or(true),
            fields,
            ..Default::default()
        })
    }

    /// 処理開始前の必須項目チェック
    pub fn validate(&self) -> Result<(), ExtractorError> {
        let missing: Vec<&str> = [
            ("realm", &self.realm),
            ("app_id", &self.app_id),
            ("material_table_id", &self.material_table_id),
            ("attachment_table_id", &self.attachment_table_id),
            ("token", &self.token),
            ("login_url", &self.login_url),
            ("login_email", &self.login_email),
            ("login_password", &self.login_password),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ExtractorError::Config(format!(
                "必須設定が不足しています: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn with_login(
        mut self,
        url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.login_url = url.into();
        self.login_email = email.into();
        self.login_password = password.into();
        self
    }

    pub fn with_tables(
        mut self,
        app_id: impl Into<String>,
        material_table_id: impl Into<String>,
        attachment_table_id: impl Into<String>,
    ) -> Self {
        self.app_id = app_id.into();
        self.material_table_id = material_table_id.into();
        self.attachment_table_id = attachment_table_id.into();
        self
    }

    pub fn with_download_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_root = path.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ExtractorConfig::new("example.quickbase.com", "b_token")
            .with_tables("appid", "tbl_mat", "tbl_att")
            .with_login("https://portal.example.com/login", "qa@example.com", "pw")
            .with_download_root("/tmp/dl")
            .with_headless(false);

        assert_eq!(config.realm, "example.quickbase.com");
        assert_eq!(config.material_table_id, "tbl_mat");
        assert!(!config.headless);
        assert_eq!(config.download_root, PathBuf::from("/tmp/dl"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_keys() {
        let config = ExtractorConfig::new("example.quickbase.com", "b_token");
        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("app_id"));
        assert!(msg.contains("login_url"));
        assert!(!msg.contains("realm,"));
    }

    #[test]
    fn test_default_backoff_matches_fixed_intervals() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.download_attempts, 5);
        assert_eq!(backoff.download_poll, Duration::from_secs(3));
        assert_eq!(backoff.login_settle, Duration::from_secs(10));
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("ログインエラー: {0}")]
    Login(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("ダウンロードエラー: {0}")]
    Download(String),

    #[error("バックエンド照会エラー: {0}")]
    Lookup(String),

    #[error("ページ取得エラー: {0}")]
    Scrape(String),

    #[error("JSONエラー: {0}")]
    Json(String),

    #[error("スプレッドシート読み込みエラー: {0}")]
    Spreadsheet(String),

    #[error("レポート出力エラー: {0}")]
    Report(String),

    #[error("アーカイブ作成エラー: {0}")]
    Archive(String),

    #[error("抽出データなし: {0}")]
    NoData(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ExtractorError {
    /// ラン全体を中断すべきエラーか（識別子単位で回復可能なものはfalse）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractorError::Config(_)
                | ExtractorError::BrowserInit(_)
                | ExtractorError::Login(_)
                | ExtractorError::ElementNotFound(_)
        )
    }
}

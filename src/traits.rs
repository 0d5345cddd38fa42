use async_trait::async_trait;
use std::path::Path;

use crate::error::ExtractorError;
use crate::model::MaterialRecord;

/// 認証済みポータルセッション
///
/// 1ランにつき1インスタンスを順次共有する。並行利用は不可。
#[async_trait]
pub trait Session: Send + Sync {
    /// ブラウザ起動 + ログイン実行
    async fn open(&mut self) -> Result<(), ExtractorError>;

    /// レコードページに遷移してHTMLを返す
    async fn fetch_item_page(&mut self, rid: i64) -> Result<String, ExtractorError>;

    /// 画像をダウンロードして保存先に配置する
    ///
    /// リトライ上限に達した場合はOk(false)。エラーにはしない。
    async fn download_image(&mut self, url: &str, dest: &Path) -> Result<bool, ExtractorError>;

    /// セッション解放（冪等、open失敗後でも安全）
    async fn close(&mut self);
}

/// バックエンドの資材レコード照会
#[async_trait]
pub trait MaterialLookup: Send + Sync {
    /// 資材番号からレコード基本情報を構築する
    async fn material_details(&self, material_number: &str)
        -> Result<MaterialRecord, ExtractorError>;
}

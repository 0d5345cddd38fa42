//! 資材レコード関連の型定義

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// QA要求事項の値
///
/// チェックボックス項目はbool、"Comments"等のテキスト項目は文字列。
/// untaggedなのでスナップショットJSON上はフラットなマッピングになる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QaValue {
    Flag(bool),
    Text(String),
}

/// QA要求事項マッピング（生成後は不変）
pub type QaRequirements = BTreeMap<String, QaValue>;

/// 1資材分の抽出レコード
///
/// material_number以外は全て任意項目。バックエンドに存在しない資材でも
/// 番号だけのレコードとして成立する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub material_number: String,
    pub component_id: Option<String>,
    pub cost: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_material_no: Option<String>,
    #[serde(default)]
    pub image_url: Vec<String>,
    /// スクレイプ完了前はNone、完了後はSome（空マッピングも有効値）
    pub qa_requirements: Option<QaRequirements>,
}

impl MaterialRecord {
    pub fn new(material_number: impl Into<String>) -> Self {
        Self {
            material_number: material_number.into(),
            component_id: None,
            cost: None,
            supplier_name: None,
            supplier_material_no: None,
            image_url: Vec::new(),
            qa_requirements: None,
        }
    }
}

/// 資材ディレクトリ名（`material_<番号>`）
pub fn material_dir_name(material_number: &str) -> String {
    format!("material_{}", material_number)
}

/// スナップショットJSONファイル名（`material_<番号>_data.json`）
pub fn snapshot_file_name(material_number: &str) -> String {
    format!("material_{}_data.json", material_number)
}

/// 画像サブディレクトリ名
pub const IMAGE_DIR_NAME: &str = "images";

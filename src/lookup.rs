//! Quickbaseレコード照会クライアント
//!
//! 資材テーブルと添付テーブルへの絞り込みクエリを発行し、
//! フィールドID基準の行データをラベル基準のマッピングに整形する。
//! 照会失敗は識別子単位で回復可能なので、呼び出し側へは空結果として
//! 渡しつつログでは「失敗」と「データなし」を区別する。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::model::MaterialRecord;
use crate::traits::MaterialLookup;

const RECORDS_QUERY_URL: &str = "https://api.quickbase.com/v1/records/query";
const USER_AGENT: &str = "material-extractor/0.1";
const HTTP_TIMEOUT_SECS: u64 = 30;

/// 添付HTMLから画像URLを取り出すパターン
const IMG_SRC_PATTERN: &str = r#"(?i)src\s*=\s*["']([^"']+)["']"#;

/// `/v1/records/query` のレスポンス
#[derive(Debug, Deserialize)]
pub struct TableQueryResponse {
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub data: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDef {
    pub id: i64,
    pub label: String,
}

pub struct RecordClient {
    config: ExtractorConfig,
    http: reqwest::Client,
    src_re: Regex,
}

impl RecordClient {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ExtractorError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExtractorError::Lookup(format!("HTTPクライアント構築: {}", e)))?;

        let src_re = Regex::new(IMG_SRC_PATTERN)
            .map_err(|e| ExtractorError::Config(format!("画像URLパターン: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            http,
            src_re,
        })
    }

    /// 「関連フィールドが資材番号を含む」絞り込みクエリを発行する
    pub async fn query_table(
        &self,
        table_id: &str,
        material_number: &str,
    ) -> Result<TableQueryResponse, ExtractorError> {
        let where_clause = build_where(&self.config.fields.related_material, material_number);
        debug!("Querying table {} where {}", table_id, where_clause);

        let body = serde_json::json!({
            "from": table_id,
            "where": where_clause,
        });

        let response = self
            .http
            .post(RECORDS_QUERY_URL)
            .header("QB-Realm-Hostname", &self.config.realm)
            .header(
                "Authorization",
                format!("QB-USER-TOKEN {}", self.config.token),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractorError::Lookup(format!("table {}: {}", table_id, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractorError::Lookup(format!(
                "table {} returned {}",
                table_id, status
            )));
        }

        response
            .json::<TableQueryResponse>()
            .await
            .map_err(|e| ExtractorError::Lookup(format!("table {}: {}", table_id, e)))
    }

    /// 資材テーブルの先頭一致レコードをラベル基準で返す
    ///
    /// 照会失敗とデータなしはどちらも空マッピングに落とす。
    pub async fn component_data(&self, material_number: &str) -> HashMap<String, Value> {
        match self
            .query_table(&self.config.material_table_id, material_number)
            .await
        {
            Ok(response) => match response.data.first() {
                Some(row) => reshape_row(&response.fields, row),
                None => {
                    info!("No component data found for material {}", material_number);
                    HashMap::new()
                }
            },
            Err(e) => {
                warn!("Component query failed for material {}: {}", material_number, e);
                HashMap::new()
            }
        }
    }

    /// 添付テーブルの全一致レコードをラベル基準で返す
    pub async fn attachments(&self, material_number: &str) -> Vec<HashMap<String, Value>> {
        match self
            .query_table(&self.config.attachment_table_id, material_number)
            .await
        {
            Ok(response) => {
                if response.data.is_empty() {
                    info!("No attachments found for material {}", material_number);
                }
                response
                    .data
                    .iter()
                    .map(|row| reshape_row(&response.fields, row))
                    .collect()
            }
            Err(e) => {
                warn!("Attachment query failed for material {}: {}", material_number, e);
                Vec::new()
            }
        }
    }

    /// 添付行の画像HTMLフィールドからURLを抽出する（各行の先頭URLのみ）
    fn extract_image_urls(&self, attachments: &[HashMap<String, Value>]) -> Vec<String> {
        attachments
            .iter()
            .filter_map(|att| att.get(&self.config.fields.image))
            .filter_map(|v| v.as_str())
            .filter(|html| html.to_lowercase().contains("<img"))
            .filter_map(|html| {
                self.src_re
                    .captures(html)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }
}

#[async_trait]
impl MaterialLookup for RecordClient {
    /// コンポーネント情報と添付画像URLから資材レコードを組み立てる
    async fn material_details(
        &self,
        material_number: &str,
    ) -> Result<MaterialRecord, ExtractorError> {
        let component = self.component_data(material_number).await;
        let attachments = self.attachments(material_number).await;
        let image_url = self.extract_image_urls(&attachments);

        let fields = &self.config.fields;
        Ok(MaterialRecord {
            material_number: material_number.to_string(),
            component_id: take_string(&component, &fields.component_id),
            cost: take_string(&component, &fields.material_cost),
            supplier_name: take_string(&component, &fields.supplier_name),
            supplier_material_no: take_string(&component, &fields.supplier_material_id),
            image_url,
            qa_requirements: None,
        })
    }
}

fn build_where(related_field: &str, material_number: &str) -> String {
    format!("{{{}.CT.'{}'}}", related_field, material_number)
}

/// フィールドID基準の行をラベル基準のマッピングに整形する
fn reshape_row(fields: &[FieldDef], row: &serde_json::Map<String, Value>) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    for field in fields {
        if let Some(cell) = row.get(&field.id.to_string()) {
            if let Some(value) = cell.get("value") {
                out.insert(field.label.clone(), value.clone());
            }
        }
    }
    out
}

/// レコード値を表示用文字列にする（null・欠落はNone）
fn take_string(data: &HashMap<String, Value>, label: &str) -> Option<String> {
    match data.get(label)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

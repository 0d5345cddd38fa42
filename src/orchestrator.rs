//! 抽出オーケストレータ
//!
//! 識別子集合を1つの共有セッションで順次処理し、資材ごとの
//! 永続化ディレクトリ（スナップショットJSON + 画像）を作る。
//! 失敗の隔離は識別子単位。1件の失敗でラン全体は止めない。

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::input::read_material_numbers;
use crate::model::{self, MaterialRecord, QaRequirements};
use crate::parser::parse_qa_requirements;
use crate::traits::{MaterialLookup, Session};

/// 1ラン分の処理結果
#[derive(Debug, Default, Clone)]
pub struct ExtractionSummary {
    /// スナップショット保存まで完了した資材番号（処理順）
    pub processed: Vec<String>,
    /// 永続化に失敗した資材番号
    pub failed: Vec<String>,
}

impl ExtractionSummary {
    /// 1件も抽出できなかったか（クラッシュとは別の正常な空結果）
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}

pub struct Orchestrator<S: Session, L: MaterialLookup> {
    config: ExtractorConfig,
    session: S,
    lookup: L,
}

impl<S: Session, L: MaterialLookup> Orchestrator<S, L> {
    pub fn new(config: &ExtractorConfig, session: S, lookup: L) -> Self {
        Self {
            config: config.clone(),
            session,
            lookup,
        }
    }

    /// 入力Excel群からバッチを構成して抽出を実行する
    ///
    /// 読めないワークブックはバッチ単位で読み飛ばす。
    pub async fn run(
        &mut self,
        excel_paths: &[PathBuf],
        run_root: &Path,
    ) -> Result<ExtractionSummary, ExtractorError> {
        let mut batches = Vec::new();
        for path in excel_paths {
            match read_material_numbers(path, &self.config.fields.material_number) {
                Ok(numbers) if numbers.is_empty() => {
                    info!("No material numbers found in {}", path.display());
                }
                Ok(numbers) => batches.push((batch_stem(path), numbers)),
                Err(e) => warn!("Skipping unreadable workbook {}: {}", path.display(), e),
            }
        }
        self.run_batches(&batches, run_root).await
    }

    /// バッチごとの識別子集合を抽出する
    ///
    /// セッションは全バッチで1つだけ開き、成否に関わらず閉じる。
    pub async fn run_batches(
        &mut self,
        batches: &[(String, Vec<String>)],
        run_root: &Path,
    ) -> Result<ExtractionSummary, ExtractorError> {
        self.config.validate()?;

        let mut summary = ExtractionSummary::default();
        let total: usize = batches.iter().map(|(_, numbers)| numbers.len()).sum();
        if total == 0 {
            info!("Nothing to extract");
            return Ok(summary);
        }

        std::fs::create_dir_all(run_root)?;
        info!(
            "Starting extraction run: {} materials in {} batch(es)",
            total,
            batches.len()
        );

        // セッション確立失敗のみラン全体のエラー
        self.session.open().await?;
        self.process_batches(batches, run_root, &mut summary).await;
        self.session.close().await;

        info!(
            "Extraction run finished: {} processed, {} failed",
            summary.processed.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn process_batches(
        &mut self,
        batches: &[(String, Vec<String>)],
        run_root: &Path,
        summary: &mut ExtractionSummary,
    ) {
        for (stem, numbers) in batches {
            let batch_dir = run_root.join(stem);
            if let Err(e) = std::fs::create_dir_all(&batch_dir) {
                error!("Could not create batch folder {}: {}", batch_dir.display(), e);
                summary.failed.extend(numbers.iter().cloned());
                continue;
            }

            info!("Processing batch '{}' ({} materials)", stem, numbers.len());
            for mano in numbers {
                match self.process_material(mano, &batch_dir).await {
                    Ok(()) => summary.processed.push(mano.clone()),
                    Err(e) => {
                        error!("Failed to process material {}: {}", mano, e);
                        summary.failed.push(mano.clone());
                    }
                }
            }
        }
    }

    /// 1資材分の処理
    ///
    /// 照会・スクレイプ・ダウンロードの失敗はここで握りつぶして
    /// 欠損フィールドのまま続行する。エラーとして返すのは
    /// スナップショット永続化に関わる失敗だけ。
    async fn process_material(&mut self, mano: &str, batch_dir: &Path) -> Result<(), ExtractorError> {
        info!("--- Processing material {} ---", mano);

        let mut record = match self.lookup.material_details(mano).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Lookup failed for material {}: {}", mano, e);
                MaterialRecord::new(mano)
            }
        };

        let material_dir = batch_dir.join(model::material_dir_name(mano));
        std::fs::create_dir_all(&material_dir)?;

        if let Some(component_id) = record.component_id.clone() {
            match component_id.trim().parse::<i64>() {
                Ok(rid) => match self.fetch_qa(rid).await {
                    Ok(qa) => record.qa_requirements = Some(qa),
                    Err(e) => {
                        warn!("Could not fetch QA requirements for component {}: {}", rid, e)
                    }
                },
                Err(_) => {
                    warn!("Invalid component_id '{}' for material {}", component_id, mano)
                }
            }
        }

        let image_dir = material_dir.join(model::IMAGE_DIR_NAME);
        std::fs::create_dir_all(&image_dir)?;
        for (i, url) in record.image_url.iter().enumerate() {
            let dest = image_dir.join(format!("image_{}.png", i + 1));
            match self.session.download_image(url, &dest).await {
                // 失敗はセッション層でログ済み、JSON上のURLリストはそのまま残す
                Ok(_) => {}
                Err(e) => warn!("Image download error for {}: {}", url, e),
            }
        }

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| ExtractorError::Json(e.to_string()))?;
        std::fs::write(material_dir.join(model::snapshot_file_name(mano)), json)?;

        info!("--- Finished material {} ---", mano);
        Ok(())
    }

    async fn fetch_qa(&mut self, rid: i64) -> Result<QaRequirements, ExtractorError> {
        let html = self.session.fetch_item_page(rid).await?;
        Ok(parse_qa_requirements(&html))
    }
}

fn batch_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "batch".to_string())
}

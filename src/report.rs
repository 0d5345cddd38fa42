//! サマリーレポート生成
//!
//! 永続化済みの資材ディレクトリ群からバッチごとのExcelサマリーを作る。
//! セッションには依存せず、ディスク上のスナップショットだけを読む。

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, FormatAlign, Image, Workbook};
use tracing::{info, warn};

use crate::error::ExtractorError;
use crate::model::{MaterialRecord, QaRequirements, QaValue};

pub const SUMMARY_DIR_NAME: &str = "summary";
const SUMMARY_SUFFIX: &str = "_summary.xlsx";

const HEADERS: [&str; 7] = [
    "Material Number",
    "Component ID",
    "Cost",
    "Supplier Name",
    "Supplier Material NO",
    "QA Requirements (True)",
    "Image",
];

const COLUMN_WIDTHS: [f64; 7] = [18.0, 15.0, 10.0, 40.0, 20.0, 60.0, 20.0];

/// 埋め込み画像の表示サイズ（ピクセル）
const IMAGE_SIZE_PX: f64 = 120.0;
const IMAGE_ROW_HEIGHT: f64 = 100.0;

struct MaterialEntry {
    record: MaterialRecord,
    qa_text: String,
    image_path: Option<PathBuf>,
}

/// ラン出力フォルダ全体からバッチごとのサマリーを生成する
///
/// 生成したサマリーのパス一覧を返す。読める資材が1件も無いバッチは
/// ログだけ残して飛ばす。
pub fn generate_reports(run_root: &Path) -> Result<Vec<PathBuf>, ExtractorError> {
    if !run_root.exists() {
        return Err(ExtractorError::Report(format!(
            "出力フォルダがありません: {}",
            run_root.display()
        )));
    }

    let summary_dir = run_root.join(SUMMARY_DIR_NAME);
    std::fs::create_dir_all(&summary_dir)?;

    let mut batch_dirs: Vec<PathBuf> = std::fs::read_dir(run_root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| p.file_name().is_some_and(|n| n != SUMMARY_DIR_NAME))
        .collect();
    batch_dirs.sort();

    let mut written = Vec::new();
    for batch_dir in batch_dirs {
        let batch_name = batch_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let output_path = summary_dir.join(format!("{}{}", batch_name, SUMMARY_SUFFIX));

        let rows = compile_batch(&batch_dir, &output_path)?;
        if rows == 0 {
            info!("No material entries in batch '{}'; skipping report", batch_name);
            continue;
        }
        info!("Summary written to {} ({} rows)", output_path.display(), rows);
        written.push(output_path);
    }

    Ok(written)
}

/// 1バッチ分のサマリーを書き出し、行数を返す
///
/// 読めないスナップショットは警告を出して読み飛ばす。0行のときは
/// ファイルを作らない。
pub fn compile_batch(batch_dir: &Path, output_path: &Path) -> Result<usize, ExtractorError> {
    let mut material_dirs: Vec<PathBuf> = std::fs::read_dir(batch_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("material_"))
        })
        .collect();
    material_dirs.sort();

    let entries: Vec<MaterialEntry> = material_dirs
        .iter()
        .filter_map(|dir| collect_entry(dir))
        .collect();

    if entries.is_empty() {
        return Ok(0);
    }

    write_summary(&entries, output_path)?;
    Ok(entries.len())
}

/// 1資材ディレクトリからレポート行の材料を集める
fn collect_entry(material_dir: &Path) -> Option<MaterialEntry> {
    let Some(snapshot_path) = find_snapshot(material_dir) else {
        warn!("JSON not found in {}", material_dir.display());
        return None;
    };

    let text = match std::fs::read_to_string(&snapshot_path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to read {}: {}", snapshot_path.display(), e);
            return None;
        }
    };

    let record: MaterialRecord = match serde_json::from_str(&text) {
        Ok(record) => record,
        Err(e) => {
            warn!("Failed to parse {}: {}", snapshot_path.display(), e);
            return None;
        }
    };

    let qa_text = format_qa_requirements(record.qa_requirements.as_ref());
    let image_path = first_image(material_dir);

    Some(MaterialEntry {
        record,
        qa_text,
        image_path,
    })
}

/// スナップショットJSON（`material_*_data.json`）を探す
fn find_snapshot(material_dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(material_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name().is_some_and(|n| {
                let name = n.to_string_lossy();
                name.starts_with("material_") && name.ends_with("_data.json")
            })
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// 画像サブディレクトリから辞書順で先頭のファイルを取る
fn first_image(material_dir: &Path) -> Option<PathBuf> {
    let image_dir = material_dir.join(crate::model::IMAGE_DIR_NAME);
    let mut images: Vec<PathBuf> = std::fs::read_dir(image_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    images.sort();
    images.into_iter().next()
}

/// trueのテスト名 + 非空のテキスト項目を改行結合で描画する
pub fn format_qa_requirements(qa: Option<&QaRequirements>) -> String {
    let Some(qa) = qa else {
        return String::new();
    };

    let mut lines: Vec<String> = qa
        .iter()
        .filter_map(|(name, value)| match value {
            QaValue::Flag(true) => Some(name.clone()),
            _ => None,
        })
        .collect();

    for label in ["Additional Tests", "Comments"] {
        if let Some(QaValue::Text(text)) = qa.get(label) {
            if !text.is_empty() {
                lines.push(format!("{}{}", label, text));
            }
        }
    }

    lines.join("\n")
}

fn write_summary(entries: &[MaterialEntry], output_path: &Path) -> Result<(), ExtractorError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Materials").map_err(report_err)?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, *header)
            .map_err(report_err)?;
    }
    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet
            .set_column_width(col as u16, *width)
            .map_err(report_err)?;
    }

    let qa_format = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    for (i, entry) in entries.iter().enumerate() {
        let row = (i + 1) as u32;
        let record = &entry.record;

        worksheet
            .write_string(row, 0, &record.material_number)
            .map_err(report_err)?;

        let optional_cells = [
            (1u16, record.component_id.as_deref()),
            (2, record.cost.as_deref()),
            (3, record.supplier_name.as_deref()),
            (4, record.supplier_material_no.as_deref()),
        ];
        for (col, value) in optional_cells {
            if let Some(value) = value {
                worksheet.write_string(row, col, value).map_err(report_err)?;
            }
        }

        worksheet
            .write_string_with_format(row, 5, &entry.qa_text, &qa_format)
            .map_err(report_err)?;

        if let Some(path) = &entry.image_path {
            embed_image(worksheet, row, path);
        }
    }

    workbook.save(output_path).map_err(report_err)?;
    Ok(())
}

/// 画像を固定表示サイズで7列目に埋め込む（失敗は警告のみ）
fn embed_image(worksheet: &mut rust_xlsxwriter::Worksheet, row: u32, path: &Path) {
    let image = match Image::new(path) {
        Ok(image) => image,
        Err(e) => {
            warn!("Failed to embed image {}: {}", path.display(), e);
            return;
        }
    };

    if image.width() <= 0.0 || image.height() <= 0.0 {
        warn!("Image has no dimensions: {}", path.display());
        return;
    }

    let scale_width = IMAGE_SIZE_PX / image.width();
    let scale_height = IMAGE_SIZE_PX / image.height();
    let image = image
        .set_scale_width(scale_width)
        .set_scale_height(scale_height);

    if let Err(e) = worksheet.insert_image(row, 6, &image) {
        warn!("Failed to embed image {}: {}", path.display(), e);
        return;
    }
    if let Err(e) = worksheet.set_row_height(row, IMAGE_ROW_HEIGHT) {
        warn!("Failed to set row height for image row {}: {}", row, e);
    }
}

fn report_err(e: rust_xlsxwriter::XlsxError) -> ExtractorError {
    ExtractorError::Report(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Data, Reader};

    use crate::model::material_dir_name;
    use crate::model::snapshot_file_name;

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

    fn write_snapshot(batch_dir: &Path, record: &MaterialRecord) {
        let dir = batch_dir.join(material_dir_name(&record.material_number));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(snapshot_file_name(&record.material_number)),
            serde_json::to_string_pretty(record).unwrap(),
        )
        .unwrap();
    }

    fn read_rows(path: &Path) -> Vec<Vec<Data>> {
        let mut workbook = open_workbook_auto(path).unwrap();
        let range = workbook.worksheet_range("Materials").unwrap();
        range.rows().map(|r| r.to_vec()).collect()
    }

    fn sample_qa() -> QaRequirements {
        let mut qa = QaRequirements::new();
        qa.insert("RoHS".to_string(), QaValue::Flag(true));
        qa.insert("Drop Test".to_string(), QaValue::Flag(false));
        qa.insert("Bend Test".to_string(), QaValue::Flag(true));
        qa.insert("Comments".to_string(), QaValue::Text("rev B only".to_string()));
        qa.insert("Additional Tests".to_string(), QaValue::Text(String::new()));
        qa
    }

    #[test]
    fn test_format_qa_requirements_rendering() {
        let qa = sample_qa();
        let text = format_qa_requirements(Some(&qa));
        assert_eq!(text, "Bend Test\nRoHS\nCommentsrev B only");
        assert_eq!(format_qa_requirements(None), "");
    }

    #[test]
    fn test_unreadable_snapshots_are_skipped() {
        let root = temp_dir("report-skip");
        let batch = root.join("ES.C95914");

        let mut one = MaterialRecord::new("111");
        one.cost = Some("1.00".to_string());
        write_snapshot(&batch, &one);
        write_snapshot(&batch, &MaterialRecord::new("222"));

        // 壊れたスナップショット
        let broken_dir = batch.join("material_333");
        std::fs::create_dir_all(&broken_dir).unwrap();
        std::fs::write(broken_dir.join("material_333_data.json"), "{not json").unwrap();

        // スナップショットの無いディレクトリ
        std::fs::create_dir_all(batch.join("material_444")).unwrap();

        let output = root.join("out.xlsx");
        let rows = compile_batch(&batch, &output).unwrap();
        assert_eq!(rows, 2);

        let sheet = read_rows(&output);
        // ヘッダー + 2行
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet[0][0], Data::String("Material Number".to_string()));
        assert_eq!(sheet[1][0], Data::String("111".to_string()));
        assert_eq!(sheet[2][0], Data::String("222".to_string()));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_snapshot_round_trip_into_report() {
        let root = temp_dir("report-roundtrip");
        let batch = root.join("batch");

        let mut record = MaterialRecord::new("6860340");
        record.component_id = Some("1234".to_string());
        record.cost = Some("0.42".to_string());
        record.supplier_name = Some("Acme Paper Co.".to_string());
        record.qa_requirements = Some(sample_qa());
        write_snapshot(&batch, &record);

        let output = root.join("out.xlsx");
        compile_batch(&batch, &output).unwrap();

        let sheet = read_rows(&output);
        let row = &sheet[1];
        assert_eq!(row[1], Data::String("1234".to_string()));
        assert_eq!(row[2], Data::String("0.42".to_string()));
        assert_eq!(row[3], Data::String("Acme Paper Co.".to_string()));
        assert_eq!(
            row[5],
            Data::String(format_qa_requirements(record.qa_requirements.as_ref()))
        );

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_fields_leave_blank_cells() {
        let root = temp_dir("report-blank");
        let batch = root.join("batch");
        write_snapshot(&batch, &MaterialRecord::new("456"));

        let output = root.join("out.xlsx");
        assert_eq!(compile_batch(&batch, &output).unwrap(), 1);

        let sheet = read_rows(&output);
        let row = &sheet[1];
        assert_eq!(row[0], Data::String("456".to_string()));
        // 任意項目のセルは空のまま
        assert!(matches!(row[1], Data::Empty));
        assert!(matches!(row[3], Data::Empty));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_generate_reports_per_batch() {
        let root = temp_dir("report-run");

        write_snapshot(&root.join("batch_a"), &MaterialRecord::new("1"));
        write_snapshot(&root.join("batch_b"), &MaterialRecord::new("2"));
        // 空バッチはスキップされる
        std::fs::create_dir_all(root.join("batch_empty")).unwrap();

        let written = generate_reports(&root).unwrap();
        assert_eq!(written.len(), 2);
        assert!(root
            .join("summary/batch_a_summary.xlsx")
            .exists());
        assert!(root
            .join("summary/batch_b_summary.xlsx")
            .exists());
        assert!(!root
            .join("summary/batch_empty_summary.xlsx")
            .exists());

        std::fs::remove_dir_all(&root).unwrap();
    }
}

//! 入力Excelからの資材番号読み込み

use std::collections::HashSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use crate::error::ExtractorError;

/// 全シートから指定カラムの資材番号を収集する
///
/// カラムを持たないシートは黙って読み飛ばす。値は前後空白を除去し、
/// 空文字を捨て、初出順を保ったまま重複排除する。
pub fn read_material_numbers(
    path: impl AsRef<Path>,
    column_name: &str,
) -> Result<Vec<String>, ExtractorError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ExtractorError::Spreadsheet(format!(
            "ファイルが見つかりません: {}",
            path.display()
        )));
    }

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ExtractorError::Spreadsheet(format!("{}: {}", path.display(), e)))?;

    let mut seen = HashSet::new();
    let mut numbers = Vec::new();

    for sheet_name in workbook.sheet_names().to_owned() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                debug!("Skipping unreadable sheet '{}': {}", sheet_name, e);
                continue;
            }
        };

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            continue;
        };

        let Some(col_idx) = header
            .iter()
            .position(|cell| cell_to_string(cell).is_some_and(|s| s == column_name))
        else {
            debug!("Column '{}' not found in sheet '{}'", column_name, sheet_name);
            continue;
        };

        for row in rows {
            let Some(value) = row.get(col_idx).and_then(cell_to_string) else {
                continue;
            };
            if seen.insert(value.clone()) {
                numbers.push(value);
            }
        }
    }

    info!(
        "Read {} unique material numbers from {}",
        numbers.len(),
        path.display()
    );
    Ok(numbers)
}

/// セル値を前後空白除去済みの文字列にする（空セルはNone）
fn cell_to_string(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            // Excel上の数値セルは整数でも浮動小数で返る
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) => s.trim().to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

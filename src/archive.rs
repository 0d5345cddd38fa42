//! 出力のパッケージングと保持期間スイープ

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::ExtractorError;

/// バッチ出力フォルダの保持日数
pub const RETENTION_DAYS: i64 = 7;

/// ラン出力フォルダ名（`%Y%m%d_%H%M%S`、スイープの日付判定と対になる）
pub fn run_folder_name() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// ディレクトリを同名のZIPに圧縮する
///
/// エントリはディレクトリ相対パス。既存の同名ZIPは置き換える。
pub fn package_output(dir: &Path) -> Result<PathBuf, ExtractorError> {
    if !dir.is_dir() {
        return Err(ExtractorError::Archive(format!(
            "ディレクトリがありません: {}",
            dir.display()
        )));
    }

    let zip_path = dir.with_extension("zip");
    if zip_path.exists() {
        std::fs::remove_file(&zip_path)?;
    }

    let file = File::create(&zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    add_dir_entries(&mut writer, dir, dir, &options)?;

    writer
        .finish()
        .map_err(|e| ExtractorError::Archive(e.to_string()))?;

    info!("Packaged {} -> {}", dir.display(), zip_path.display());
    Ok(zip_path)
}

fn add_dir_entries(
    writer: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
    options: &SimpleFileOptions,
) -> Result<(), ExtractorError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    paths.sort();

    for path in paths {
        let rel = path
            .strip_prefix(root)
            .map_err(|e| ExtractorError::Archive(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");

        if path.is_dir() {
            writer
                .add_directory(format!("{}/", rel), options.clone())
                .map_err(|e| ExtractorError::Archive(e.to_string()))?;
            add_dir_entries(writer, root, &path, options)?;
        } else {
            writer
                .start_file(rel, options.clone())
                .map_err(|e| ExtractorError::Archive(e.to_string()))?;
            let bytes = std::fs::read(&path)?;
            writer.write_all(&bytes)?;
        }
    }
    Ok(())
}

/// 名前から日付が読めるラン出力フォルダのうち、保持期間を過ぎたものを消す
///
/// 削除数を返す。掃除の失敗はラン継続に影響させない。
pub fn sweep_expired(root: &Path, horizon_days: i64) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };

    let today = Local::now().date_naive();
    let mut removed = 0;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = folder_date(&name) else {
            continue;
        };

        if today.signed_duration_since(date).num_days() > horizon_days {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!("Removed expired output folder {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
    removed
}

/// フォルダ名先頭の `%Y%m%d` 部分を日付として読む
fn folder_date(name: &str) -> Option<NaiveDate> {
    let prefix = name.split('_').next()?;
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

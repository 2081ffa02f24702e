//! 入力ファイルの収集
//!
//! ファイル指定とフォルダ指定（直下のみ）の両方に対応する。

use crate::error::{DetectError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use yolo_batch_common::{is_recognized, MediaKind};

#[derive(Debug, Clone)]
pub struct InputInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: MediaKind,
}

impl InputInfo {
    fn from_path(path: &Path) -> Option<Self> {
        let kind = MediaKind::detect(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Some(Self {
            path: path.to_path_buf(),
            file_name,
            kind,
        })
    }
}

/// フォルダ直下の対応ファイルを列挙（ファイル名順）
pub fn scan_folder(folder: &Path) -> Result<Vec<InputInfo>> {
    if !folder.is_dir() {
        return Err(DetectError::FolderNotFound(folder.display().to_string()));
    }

    let mut inputs: Vec<InputInfo> = WalkDir::new(folder)
        .max_depth(1)  // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| InputInfo::from_path(e.path()))
        .collect();

    inputs.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    tracing::debug!("{}: {}件の入力を検出", folder.display(), inputs.len());
    Ok(inputs)
}

/// ファイル・フォルダ混在の指定から入力を集める（指定順を保持）
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<InputInfo>> {
    let mut inputs = Vec::new();

    for path in paths {
        if path.is_dir() {
            inputs.extend(scan_folder(path)?);
        } else if !path.exists() {
            tracing::warn!("ファイルが見つかりません: {}", path.display());
        } else if let Some(info) = InputInfo::from_path(path) {
            inputs.push(info);
        } else {
            tracing::warn!("未対応の拡張子のためスキップ: {}", path.display());
        }
    }

    Ok(inputs)
}

/// ファイルダイアログで選ばれたパスのうち対応拡張子のもの
pub fn filter_recognized(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().filter(|p| is_recognized(p)).collect()
}

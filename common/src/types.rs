//! 作業アイテムの型定義
//!
//! - WorkItem: 検出対象1件（パス・対象フラグ・状態）
//! - StatusTag: 処理状態

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// 処理状態
///
/// 遷移は `Pending → Detecting → {Completed, Failed}` のみ。
/// 完了済み・失敗済みの再実行は `Detecting` へ戻す（明示的な再キューのみ `Pending`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatusTag {
    #[default]
    Pending,
    Detecting,
    Completed,
    Failed,
}

impl StatusTag {
    pub fn label(&self) -> &'static str {
        match self {
            StatusTag::Pending => "Pending",
            StatusTag::Detecting => "Detecting",
            StatusTag::Completed => "Completed",
            StatusTag::Failed => "Failed",
        }
    }

    /// `set_status` で許可される遷移か
    pub fn can_transition_to(&self, next: StatusTag) -> bool {
        use StatusTag::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Pending, Detecting) => true,
            (Detecting, Completed) | (Detecting, Failed) => true,
            // 対象のまま再実行された場合
            (Completed, Detecting) | (Failed, Detecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// 検出対象1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub included: bool,
    #[serde(default)]
    pub status: StatusTag,
    pub path: PathBuf,
}

impl WorkItem {
    /// 取り込み直後のアイテム（対象・未処理）
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            included: true,
            status: StatusTag::Pending,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 表示用ファイル名
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

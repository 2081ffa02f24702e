use std::path::PathBuf;
use thiserror::Error;
use yolo_batch_common::StatusTag;

#[derive(Error, Debug)]
pub enum DetectError {
    /// 設定項目の検証エラー（直前の値に戻して警告する）
    #[error("設定値が不正です ({field}): {message}")]
    Validation { field: &'static str, message: String },

    #[error("メディアを開けません: {path}: {message}")]
    MediaOpen { path: PathBuf, message: String },

    #[error("推論エンジン実行エラー: {0}")]
    InferenceFailure(String),

    #[error("ファイルシステムエラー: {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    #[error("検出処理が実行中です")]
    Busy,

    #[error("検出対象が選択されていません")]
    NothingToDetect,

    #[error("インデックスが範囲外です: {index} (件数 {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("状態遷移が不正です: {from} → {to}")]
    InvalidTransition { from: StatusTag, to: StatusTag },

    #[error("表示スロット {0} は使用中です")]
    SlotOccupied(usize),

    #[error("フレーム読み込みエラー: {0}")]
    FrameDecode(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;

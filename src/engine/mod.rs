//! 推論エンジン
//!
//! コア側はリクエスト/結果の契約だけを知る。実体は `yolo` CLI を呼ぶ
//! [`YoloCli`] で、テストでは差し替える。

mod yolo_cli;

pub use yolo_cli::YoloCli;

use crate::error::Result;
use std::path::{Path, PathBuf};
use yolo_batch_common::{expected_output_path, run_dir, MediaKind, RUN_NAME};

/// 1回の推論呼び出し
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub kind: MediaKind,
    pub model_path: PathBuf,
    pub sources: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub run_name: String,
    pub confidence: f64,
    pub overwrite_existing: bool,
}

impl InferenceRequest {
    pub fn new(
        kind: MediaKind,
        model_path: &Path,
        sources: Vec<PathBuf>,
        output_dir: &Path,
        confidence: f64,
    ) -> Self {
        Self {
            kind,
            model_path: model_path.to_path_buf(),
            sources,
            output_dir: output_dir.to_path_buf(),
            run_name: RUN_NAME.to_string(),
            confidence,
            overwrite_existing: true,
        }
    }

    /// 出力先 `output_dir/predict`
    pub fn run_dir(&self) -> PathBuf {
        run_dir(&self.output_dir)
    }

    /// 各入力に対応する出力ファイル
    pub fn expected_outputs(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .map(|s| expected_output_path(&self.output_dir, s))
            .collect()
    }
}

/// 推論エンジンの契約
///
/// ワーカースレッドから呼ばれるため `Send + Sync`。
/// 成功時は `output_dir/run_name/` 以下に結果ファイルが書き出されていること。
pub trait InferenceEngine: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, request: &InferenceRequest) -> Result<()>;
}

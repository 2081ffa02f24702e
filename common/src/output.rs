//! 推論結果ファイルの出力先解決
//!
//! 推論エンジンは `output_dir/predict/` に結果を書き出す。
//! 動画は `.mp4` が `.avi` に再エンコードされ、画像は元のファイル名のまま。

use std::path::{Path, PathBuf};

/// 推論実行名（出力サブフォルダ名）
pub const RUN_NAME: &str = "predict";

/// `output_dir/predict`
pub fn run_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(RUN_NAME)
}

/// 入力ファイルに対応する出力ファイルのパス
pub fn expected_output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let file_name = input.file_name().map(Path::new).unwrap_or(Path::new(""));

    // 拡張子の大小文字は区別しない（is_video と同じ扱い）
    let is_mp4 = file_name
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("mp4"))
        .unwrap_or(false);

    let output_name = if is_mp4 {
        file_name.with_extension("avi")
    } else {
        file_name.to_path_buf()
    };

    run_dir(output_dir).join(output_name)
}

//! Ultralytics `yolo` CLI 連携
//!
//! `yolo predict model=… source=… project=… name=predict conf=… exist_ok=True save=True`
//! を子プロセスとして実行する。複数ソースは一時リストファイル（1行1パス）で渡す。

use super::{InferenceEngine, InferenceRequest};
use crate::error::{DetectError, Result};
use std::io::Write;
use std::process::Command;

pub struct YoloCli {
    program: String,
}

impl YoloCli {
    pub const DEFAULT_PROGRAM: &'static str = "yolo";
    /// 実行ファイルの上書き用環境変数
    pub const ENV_PROGRAM: &'static str = "YOLO_BATCH_ENGINE";

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// 環境変数を優先し、なければ `yolo`
    pub fn from_env() -> Self {
        match std::env::var(Self::ENV_PROGRAM) {
            Ok(program) if !program.trim().is_empty() => Self::new(program),
            _ => Self::new(Self::DEFAULT_PROGRAM),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `source=` 以外の引数はリクエストから組み立てる
    pub fn build_args(request: &InferenceRequest, source_arg: &str) -> Vec<String> {
        vec![
            "predict".to_string(),
            format!("model={}", request.model_path.display()),
            format!("source={}", source_arg),
            format!("project={}", request.output_dir.display()),
            format!("name={}", request.run_name),
            format!("conf={}", request.confidence),
            format!("exist_ok={}", if request.overwrite_existing { "True" } else { "False" }),
            "save=True".to_string(),
        ]
    }

    fn run(&self, args: &[String]) -> Result<()> {
        tracing::debug!("{} {}", self.program, args.join(" "));

        // Windowsではcmd /c経由
        #[cfg(windows)]
        let output = Command::new("cmd")
            .arg("/c")
            .arg(&self.program)
            .args(args)
            .output();

        #[cfg(not(windows))]
        let output = Command::new(&self.program).args(args).output();

        let output = output.map_err(|e| {
            DetectError::InferenceFailure(format!("{} の起動に失敗: {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("unknown error");
            return Err(DetectError::InferenceFailure(format!(
                "{} failed (code {:?}): {}",
                self.program,
                output.status.code(),
                last_line.trim()
            )));
        }

        Ok(())
    }
}

impl Default for YoloCli {
    fn default() -> Self {
        Self::from_env()
    }
}

impl InferenceEngine for YoloCli {
    fn name(&self) -> &str {
        &self.program
    }

    fn predict(&self, request: &InferenceRequest) -> Result<()> {
        match request.sources.as_slice() {
            [] => Ok(()),
            [single] => {
                let args = Self::build_args(request, &single.display().to_string());
                self.run(&args)
            }
            sources => {
                // 一時リストファイルは run 完了まで保持する
                let mut list = tempfile::Builder::new()
                    .prefix("yolo-sources-")
                    .suffix(".txt")
                    .tempfile()?;
                for source in sources {
                    writeln!(list, "{}", source.display())?;
                }
                list.flush()?;

                let args = Self::build_args(request, &list.path().display().to_string());
                self.run(&args)
            }
        }
    }
}

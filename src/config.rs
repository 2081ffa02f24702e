//! 設定ファイル管理
//!
//! `config/config.json` を読み書きする。書式:
//!
//! ```json
//! {
//!     "common": { "OutputPath": "", "alertAfterComplete": true },
//!     "Model": { "ModelPath": "", "confidence": "" }
//! }
//! ```
//!
//! 空文字の項目は読み込み時に既定値へ置き換える。
//! 不正な項目は直前の有効値に戻し、警告として呼び出し側へ返す（保存は中断しない）。

use crate::error::{DetectError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_MODEL_PATH: &str = "model/yolo8n.pt";
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const MODEL_SUFFIX: &str = "pt";

/// 検証済みの設定値
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub output_path: PathBuf,
    pub alert_after_complete: bool,
    pub model_path: PathBuf,
    pub confidence: f64,
}

impl Config {
    pub fn defaults(base_dir: &Path) -> Self {
        Self {
            output_path: base_dir.join(DEFAULT_OUTPUT_DIR),
            alert_after_complete: true,
            model_path: base_dir.join(DEFAULT_MODEL_PATH),
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

// ---- ファイル上の表現 ----

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    common: CommonSection,
    #[serde(rename = "Model", default)]
    model: ModelSection,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommonSection {
    #[serde(rename = "OutputPath", default)]
    output_path: String,
    #[serde(rename = "alertAfterComplete", default = "default_alert")]
    alert_after_complete: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModelSection {
    #[serde(rename = "ModelPath", default)]
    model_path: String,
    #[serde(default)]
    confidence: ConfidenceValue,
}

/// confidence は文字列でも数値でも受け付ける
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ConfidenceValue {
    Number(f64),
    Text(String),
}

fn default_alert() -> bool {
    true
}

impl Default for CommonSection {
    fn default() -> Self {
        Self {
            output_path: String::new(),
            alert_after_complete: true,
        }
    }
}

impl Default for ConfidenceValue {
    fn default() -> Self {
        ConfidenceValue::Text(String::new())
    }
}

impl ConfidenceValue {
    fn as_raw(&self) -> String {
        match self {
            ConfidenceValue::Number(n) => n.to_string(),
            ConfidenceValue::Text(s) => s.trim().to_string(),
        }
    }
}

impl ConfigFile {
    /// 初回起動時に作成するテンプレート
    fn template() -> Self {
        Self {
            common: CommonSection::default(),
            model: ModelSection::default(),
        }
    }

    fn from_config(config: &Config) -> Self {
        Self {
            common: CommonSection {
                output_path: config.output_path.display().to_string().replace('\\', "/"),
                alert_after_complete: config.alert_after_complete,
            },
            model: ModelSection {
                model_path: config.model_path.display().to_string().replace('\\', "/"),
                confidence: ConfidenceValue::Number(config.confidence),
            },
        }
    }
}

/// 部分更新（None の項目は変更しない）
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub output_path: Option<String>,
    pub alert_after_complete: Option<bool>,
    pub model_path: Option<String>,
    pub confidence: Option<String>,
}

impl ConfigUpdate {
    pub fn output_path(mut self, value: impl Into<String>) -> Self {
        self.output_path = Some(value.into());
        self
    }

    pub fn alert_after_complete(mut self, value: bool) -> Self {
        self.alert_after_complete = Some(value);
        self
    }

    pub fn model_path(mut self, value: impl Into<String>) -> Self {
        self.model_path = Some(value.into());
        self
    }

    pub fn confidence(mut self, value: impl Into<String>) -> Self {
        self.confidence = Some(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.output_path.is_none()
            && self.alert_after_complete.is_none()
            && self.model_path.is_none()
            && self.confidence.is_none()
    }
}

/// 保存結果（警告は回復済みのエラー）
#[derive(Debug)]
pub struct SaveOutcome {
    pub config: Config,
    pub warnings: Vec<DetectError>,
}

pub struct ConfigManager {
    path: PathBuf,
    base_dir: PathBuf,
    current: Config,
}

impl ConfigManager {
    /// カレントディレクトリ基準で読み込み
    pub fn load() -> Result<(Self, Vec<DetectError>)> {
        let base_dir = std::env::current_dir()?;
        let path = base_dir.join(CONFIG_DIR).join(CONFIG_FILE);
        Ok(Self::load_from(path, base_dir))
    }

    /// 指定パスから読み込み。ファイルがなければテンプレートを作成する。
    pub fn load_from(path: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> (Self, Vec<DetectError>) {
        let path = path.into();
        let base_dir = base_dir.into();
        let defaults = Config::defaults(&base_dir);
        let mut warnings = Vec::new();

        let mut manager = Self {
            path,
            base_dir,
            current: defaults,
        };

        if !manager.path.exists() {
            if let Err(e) = manager.write_file(&ConfigFile::template()) {
                warnings.push(e);
            } else {
                tracing::info!("既定の設定ファイルを作成: {}", manager.path.display());
            }
            return (manager, warnings);
        }

        let file = match std::fs::read_to_string(&manager.path)
            .map_err(DetectError::from)
            .and_then(|content| serde_json::from_str::<ConfigFile>(&content).map_err(DetectError::from))
        {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("設定ファイルを読み込めません。既定値を使用: {}", e);
                warnings.push(e);
                return (manager, warnings);
            }
        };

        if !file.common.output_path.trim().is_empty() {
            if let Some(path) = manager.check_output_path(&file.common.output_path, &mut warnings) {
                manager.current.output_path = path;
            }
        }
        manager.current.alert_after_complete = file.common.alert_after_complete;

        if !file.model.model_path.trim().is_empty() {
            if let Some(path) = manager.check_model_path(&file.model.model_path, &mut warnings) {
                manager.current.model_path = path;
            }
        }

        let raw_confidence = file.model.confidence.as_raw();
        if !raw_confidence.is_empty() {
            if let Some(value) = check_confidence(&raw_confidence, &mut warnings) {
                manager.current.confidence = value;
            }
        }

        tracing::debug!(config = ?manager.current, "設定を読み込みました");
        (manager, warnings)
    }

    pub fn config(&self) -> &Config {
        &self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 各項目を個別に検証して即時保存する
    pub fn validate_and_save(&mut self, update: ConfigUpdate) -> SaveOutcome {
        let mut warnings = Vec::new();
        let mut next = self.current.clone();

        if let Some(raw) = update.output_path.as_deref() {
            if let Some(path) = self.check_output_path(raw, &mut warnings) {
                next.output_path = path;
            }
        }

        if let Some(alert) = update.alert_after_complete {
            next.alert_after_complete = alert;
        }

        if let Some(raw) = update.model_path.as_deref() {
            if let Some(path) = self.check_model_path(raw, &mut warnings) {
                next.model_path = path;
            }
        }

        if let Some(raw) = update.confidence.as_deref() {
            if let Some(value) = check_confidence(raw, &mut warnings) {
                next.confidence = value;
            }
        }

        self.current = next;

        if let Err(e) = self.save() {
            tracing::warn!("設定の保存に失敗: {}", e);
            warnings.push(e);
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        SaveOutcome {
            config: self.current.clone(),
            warnings,
        }
    }

    pub fn save(&self) -> Result<()> {
        self.write_file(&ConfigFile::from_config(&self.current))
    }

    fn write_file(&self, file: &ConfigFile) -> Result<()> {
        let to_fs_error = |e: std::io::Error| DetectError::Filesystem {
            path: self.path.clone(),
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(to_fs_error)?;
        }

        let content = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, content).map_err(to_fs_error)?;
        Ok(())
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw.trim());
        if path.is_relative() {
            self.base_dir.join(path)
        } else {
            path
        }
    }

    /// 出力フォルダ: 存在しなければ作成する
    fn check_output_path(&self, raw: &str, warnings: &mut Vec<DetectError>) -> Option<PathBuf> {
        if raw.trim().is_empty() {
            warnings.push(DetectError::Validation {
                field: "OutputPath",
                message: "出力フォルダが空です".into(),
            });
            return None;
        }

        let path = self.resolve(raw);
        if path.is_dir() {
            return Some(path);
        }
        if path.exists() {
            warnings.push(DetectError::Validation {
                field: "OutputPath",
                message: format!("フォルダではありません: {}", path.display()),
            });
            return None;
        }

        match std::fs::create_dir_all(&path) {
            Ok(()) => {
                warnings.push(DetectError::Validation {
                    field: "OutputPath",
                    message: format!("出力フォルダが存在しないため作成しました: {}", path.display()),
                });
                Some(path)
            }
            Err(e) => {
                warnings.push(DetectError::Filesystem {
                    path,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// モデル: 存在する .pt ファイルのみ
    fn check_model_path(&self, raw: &str, warnings: &mut Vec<DetectError>) -> Option<PathBuf> {
        let path = self.resolve(raw);
        if !path.exists() {
            warnings.push(DetectError::Validation {
                field: "ModelPath",
                message: format!("モデルファイルが見つかりません: {}", path.display()),
            });
            return None;
        }

        let is_pt = path
            .extension()
            .map(|ext| ext.to_string_lossy() == MODEL_SUFFIX)
            .unwrap_or(false);
        if !is_pt {
            warnings.push(DetectError::Validation {
                field: "ModelPath",
                message: "モデルは .pt ファイルを指定してください".into(),
            });
            return None;
        }

        Some(path)
    }
}

/// 信頼度: (0, 1] の数値
pub fn parse_confidence(raw: &str) -> std::result::Result<f64, DetectError> {
    let value: f64 = raw.trim().parse().map_err(|_| DetectError::Validation {
        field: "confidence",
        message: format!("数値ではありません: {raw:?}"),
    })?;

    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(DetectError::Validation {
            field: "confidence",
            message: format!("0より大きく1以下の値を指定してください: {value}"),
        })
    }
}

fn check_confidence(raw: &str, warnings: &mut Vec<DetectError>) -> Option<f64> {
    match parse_confidence(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warnings.push(e);
            None
        }
    }
}

//! YOLO物体検出のバッチ実行と結果の同期再生
//!
//! - [`registry`]: 検出対象リストと変更通知
//! - [`orchestrator`]: バックグラウンドでの推論実行と状態の書き戻し
//! - [`playback`]: 入力/出力メディアの同期再生
//! - [`config`]: 設定ファイルの検証・保存

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod playback;
pub mod registry;
pub mod scanner;

pub use config::{Config, ConfigManager, ConfigUpdate, SaveOutcome};
pub use dispatch::Dispatch;
pub use engine::{InferenceEngine, InferenceRequest, YoloCli};
pub use error::{DetectError, Result};
pub use orchestrator::{DetectionOrchestrator, JobReport, JobTicket, OrchestratorState};
pub use playback::{FfmpegOpener, FrameSink, FrameSource, MediaOpener, PlayAffordance, PlaybackSynchronizer, SlotId};
pub use registry::{RegistryEvent, SourceRegistry};
pub use yolo_batch_common::{expected_output_path, is_video, MediaKind, StatusTag, WorkItem};

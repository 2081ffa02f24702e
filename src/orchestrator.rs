//! 検出ジョブの実行制御
//!
//! 状態は `Idle → Running → Idle`。実行中の `start` は [`DetectError::Busy`]。
//!
//! 1. 対話側で対象アイテムを `Detecting` にして `replace_all` で戻す
//! 2. スナップショット（値渡し）をワーカースレッドへ移し、種別ごと（または1件ずつ）に推論
//! 3. 失敗はリクエスト単位で捕捉し、そのリクエストの全アイテムを `Failed` にする
//! 4. 完了はチャネルのメッセージで対話側へ返し、`poll` / `finished` で状態を書き戻す

use crate::config::Config;
use crate::dispatch::Dispatch;
use crate::engine::{InferenceEngine, InferenceRequest};
use crate::error::{DetectError, Result};
use crate::registry::SourceRegistry;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use yolo_batch_common::{MediaKind, StatusTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Running { job_id: u64 },
}

/// ワーカーへ値渡しされるジョブ
#[derive(Debug, Clone)]
pub struct DetectionJob {
    pub id: u64,
    /// (リスト上のインデックス, パス)
    pub entries: Vec<(usize, PathBuf)>,
    pub model_path: PathBuf,
    pub output_dir: PathBuf,
    pub confidence: f64,
    pub dispatch: Dispatch,
}

impl DetectionJob {
    /// 推論リクエストへ分割（各リクエストが担当する entries の位置付き）
    pub fn requests(&self) -> Vec<(Vec<usize>, InferenceRequest)> {
        match self.dispatch {
            Dispatch::PerKind => {
                let mut groups: BTreeMap<MediaKind, Vec<usize>> = BTreeMap::new();
                for (pos, (_, path)) in self.entries.iter().enumerate() {
                    groups.entry(MediaKind::classify(path)).or_default().push(pos);
                }
                groups
                    .into_iter()
                    .map(|(kind, positions)| {
                        let sources = positions.iter().map(|&p| self.entries[p].1.clone()).collect();
                        (positions, self.request(kind, sources))
                    })
                    .collect()
            }
            Dispatch::PerItem => self
                .entries
                .iter()
                .enumerate()
                .map(|(pos, (_, path))| {
                    let request = self.request(MediaKind::classify(path), vec![path.clone()]);
                    (vec![pos], request)
                })
                .collect(),
        }
    }

    fn request(&self, kind: MediaKind, sources: Vec<PathBuf>) -> InferenceRequest {
        InferenceRequest::new(kind, &self.model_path, sources, &self.output_dir, self.confidence)
    }
}

/// `start` の戻り値
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: u64,
    pub item_count: usize,
    pub request_count: usize,
    pub started_at: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub index: usize,
    pub path: PathBuf,
    pub status: StatusTag,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFailure {
    pub kind: Option<MediaKind>,
    pub sources: Vec<PathBuf>,
    pub message: String,
}

/// ジョブ完了報告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: u64,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub outcomes: Vec<ItemOutcome>,
    pub failures: Vec<RequestFailure>,
    /// 推論は成功したが出力ファイルが見つからないもの
    pub missing_outputs: Vec<PathBuf>,
}

impl JobReport {
    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == StatusTag::Completed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == StatusTag::Failed).count()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// ユーザー向けのエラー要約（失敗がなければ None）
    pub fn summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }

        let mut lines = vec![format!(
            "{}件中{}件の検出に失敗しました",
            self.outcomes.len(),
            self.failed_count()
        )];
        for failure in &self.failures {
            let kind = failure.kind.map(|k| k.to_string()).unwrap_or_else(|| "job".into());
            lines.push(format!("- [{}] {}件: {}", kind, failure.sources.len(), failure.message));
        }
        Some(lines.join("\n"))
    }
}

enum WorkerMessage {
    Finished(JobReport),
}

struct RunningJob {
    ticket: JobTicket,
    entries: Vec<(usize, PathBuf)>,
    rx: UnboundedReceiver<WorkerMessage>,
    handle: Option<JoinHandle<()>>,
}

pub struct DetectionOrchestrator {
    engine: Arc<dyn InferenceEngine>,
    dispatch: Dispatch,
    next_job_id: u64,
    running: Option<RunningJob>,
}

impl DetectionOrchestrator {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            dispatch: Dispatch::default(),
            next_job_id: 1,
            running: None,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    pub fn set_dispatch(&mut self, dispatch: Dispatch) {
        self.dispatch = dispatch;
    }

    pub fn state(&self) -> OrchestratorState {
        match &self.running {
            Some(job) => OrchestratorState::Running { job_id: job.ticket.id },
            None => OrchestratorState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// 対象アイテムの検出を開始する
    pub fn start(&mut self, registry: &mut SourceRegistry, config: &Config) -> Result<JobTicket> {
        if self.running.is_some() {
            return Err(DetectError::Busy);
        }

        let mut snapshot = registry.items().to_vec();
        let entries: Vec<(usize, PathBuf)> = snapshot
            .iter_mut()
            .enumerate()
            .filter(|(_, item)| item.included)
            .map(|(index, item)| {
                item.status = StatusTag::Detecting;
                (index, item.path.clone())
            })
            .collect();

        if entries.is_empty() {
            return Err(DetectError::NothingToDetect);
        }

        let id = self.next_job_id;
        let job = DetectionJob {
            id,
            entries: entries.clone(),
            model_path: config.model_path.clone(),
            output_dir: config.output_path.clone(),
            confidence: config.confidence,
            dispatch: self.dispatch,
        };
        let ticket = JobTicket {
            id,
            item_count: entries.len(),
            request_count: job.requests().len(),
            started_at: Local::now(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::clone(&self.engine);
        let started_at = ticket.started_at;
        let handle = std::thread::Builder::new()
            .name(format!("detect-job-{id}"))
            .spawn(move || {
                let report = run_job(engine.as_ref(), &job, started_at);
                let _ = tx.send(WorkerMessage::Finished(report));
            })?;

        self.next_job_id += 1;
        registry.replace_all(snapshot);

        tracing::info!(
            job_id = id,
            items = ticket.item_count,
            requests = ticket.request_count,
            dispatch = self.dispatch.label(),
            "検出ジョブを開始"
        );

        self.running = Some(RunningJob {
            ticket: ticket.clone(),
            entries,
            rx,
            handle: Some(handle),
        });
        Ok(ticket)
    }

    /// 完了していれば状態を書き戻して報告を返す（ブロックしない）
    pub fn poll(&mut self, registry: &mut SourceRegistry) -> Option<JobReport> {
        let message = match self.running.as_mut()?.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => None,
        };
        let running = self.running.take()?;
        Some(complete(running, registry, message))
    }

    /// 完了まで待機して状態を書き戻す（実行中でなければ None）
    pub async fn finished(&mut self, registry: &mut SourceRegistry) -> Option<JobReport> {
        let message = self.running.as_mut()?.rx.recv().await;
        let running = self.running.take()?;
        Some(complete(running, registry, message))
    }
}

/// ワーカースレッド本体
fn run_job(engine: &dyn InferenceEngine, job: &DetectionJob, started_at: DateTime<Local>) -> JobReport {
    let clock = Instant::now();
    let mut statuses = vec![StatusTag::Detecting; job.entries.len()];
    let mut failures = Vec::new();
    let mut missing_outputs = Vec::new();

    for (positions, request) in job.requests() {
        tracing::debug!(
            job_id = job.id,
            kind = %request.kind,
            sources = request.sources.len(),
            "推論リクエスト実行"
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.predict(&request)))
            .unwrap_or_else(|_| {
                Err(DetectError::InferenceFailure(format!("{} がパニックしました", engine.name())))
            });

        match result {
            Ok(()) => {
                for &pos in &positions {
                    statuses[pos] = StatusTag::Completed;
                }
                missing_outputs.extend(request.expected_outputs().into_iter().filter(|p| !p.exists()));
            }
            Err(e) => {
                tracing::warn!(job_id = job.id, kind = %request.kind, "推論失敗: {}", e);
                for &pos in &positions {
                    statuses[pos] = StatusTag::Failed;
                }
                failures.push(RequestFailure {
                    kind: Some(request.kind),
                    sources: request.sources.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    for path in &missing_outputs {
        tracing::warn!("出力ファイルが見つかりません: {}", path.display());
    }

    let outcomes = job
        .entries
        .iter()
        .zip(statuses)
        .map(|((index, path), status)| ItemOutcome {
            index: *index,
            path: path.clone(),
            status,
        })
        .collect();

    JobReport {
        job_id: job.id,
        started_at: started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        elapsed_ms: clock.elapsed().as_millis() as u64,
        outcomes,
        failures,
        missing_outputs,
    }
}

/// 報告なしで終了したワーカー: 全アイテムを失敗扱い
fn abandoned_report(running: &RunningJob) -> JobReport {
    let elapsed = Local::now().signed_duration_since(running.ticket.started_at);
    JobReport {
        job_id: running.ticket.id,
        started_at: running.ticket.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        elapsed_ms: elapsed.num_milliseconds().max(0) as u64,
        outcomes: running
            .entries
            .iter()
            .map(|(index, path)| ItemOutcome {
                index: *index,
                path: path.clone(),
                status: StatusTag::Failed,
            })
            .collect(),
        failures: vec![RequestFailure {
            kind: None,
            sources: running.entries.iter().map(|(_, p)| p.clone()).collect(),
            message: "ワーカーが完了報告なしで終了しました".to_string(),
        }],
        missing_outputs: Vec::new(),
    }
}

/// 対話側: 報告をリストへ書き戻して Idle に戻る
fn complete(mut running: RunningJob, registry: &mut SourceRegistry, message: Option<WorkerMessage>) -> JobReport {
    let report = match message {
        Some(WorkerMessage::Finished(report)) => report,
        None => abandoned_report(&running),
    };

    if let Some(handle) = running.handle.take() {
        if handle.join().is_err() {
            tracing::error!(job_id = running.ticket.id, "ワーカースレッドが異常終了しました");
        }
    }

    let mut claimed = BTreeSet::new();
    for outcome in &report.outcomes {
        let Some(index) = resolve_index(registry, outcome, &claimed) else {
            tracing::warn!("リスト上に見つからないため更新をスキップ: {}", outcome.path.display());
            continue;
        };
        claimed.insert(index);
        if let Err(e) = registry.set_status(index, outcome.status) {
            tracing::warn!("状態の更新に失敗 ({}): {}", outcome.path.display(), e);
        }
    }

    tracing::info!(
        job_id = report.job_id,
        completed = report.completed_count(),
        failed = report.failed_count(),
        elapsed_ms = report.elapsed_ms,
        "検出ジョブ完了"
    );
    report
}

/// 実行中にリストが置き換えられた場合はパスで引き直す。
/// 同じパスが複数行あっても、書き戻し済みの行は二度使わない。
fn resolve_index(registry: &SourceRegistry, outcome: &ItemOutcome, claimed: &BTreeSet<usize>) -> Option<usize> {
    match registry.get(outcome.index) {
        Some(item) if item.path == outcome.path && !claimed.contains(&outcome.index) => Some(outcome.index),
        _ => registry.items().iter().enumerate().position(|(index, item)| {
            item.path == outcome.path && item.status == StatusTag::Detecting && !claimed.contains(&index)
        }),
    }
}

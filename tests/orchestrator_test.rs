//! 検出ジョブ実行制御のテスト
//!
//! 推論エンジンを差し替えて、状態遷移・排他・失敗の切り分けを検証

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;
use yolo_batch_rust::error::DetectError;
use yolo_batch_rust::{
    Config, Dispatch, DetectionOrchestrator, InferenceEngine, InferenceRequest, MediaKind,
    OrchestratorState, RegistryEvent, SourceRegistry, StatusTag, WorkItem,
};

/// 受け取ったリクエストを記録し、指定の種別/パスで失敗するエンジン
#[derive(Default)]
struct RecordingEngine {
    requests: Mutex<Vec<InferenceRequest>>,
    fail_kind: Option<MediaKind>,
    fail_path: Option<PathBuf>,
    panic_always: bool,
}

impl RecordingEngine {
    fn failing_kind(kind: MediaKind) -> Self {
        Self {
            fail_kind: Some(kind),
            ..Default::default()
        }
    }

    fn failing_path(path: &str) -> Self {
        Self {
            fail_path: Some(PathBuf::from(path)),
            ..Default::default()
        }
    }

    fn recorded(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl InferenceEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn predict(&self, request: &InferenceRequest) -> yolo_batch_rust::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if self.panic_always {
            panic!("engine exploded");
        }
        if self.fail_kind == Some(request.kind) {
            return Err(DetectError::InferenceFailure("model crashed".into()));
        }
        if let Some(path) = &self.fail_path {
            if request.sources.contains(path) {
                return Err(DetectError::InferenceFailure(format!("cannot decode {}", path.display())));
            }
        }
        Ok(())
    }
}

/// 合図が来るまでブロックするエンジン
struct GatedEngine {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl InferenceEngine for GatedEngine {
    fn name(&self) -> &str {
        "gated"
    }

    fn predict(&self, _request: &InferenceRequest) -> yolo_batch_rust::Result<()> {
        let _ = self.gate.lock().unwrap().recv();
        Ok(())
    }
}

fn config(output: &Path) -> Config {
    Config {
        output_path: output.to_path_buf(),
        alert_after_complete: true,
        model_path: PathBuf::from("model/yolo8n.pt"),
        confidence: 0.35,
    }
}

fn registry(paths: &[(&str, bool)]) -> SourceRegistry {
    SourceRegistry::with_items(
        paths
            .iter()
            .map(|(p, included)| WorkItem {
                included: *included,
                status: StatusTag::Pending,
                path: PathBuf::from(p),
            })
            .collect(),
    )
}

fn status(registry: &SourceRegistry, index: usize) -> StatusTag {
    registry.get(index).unwrap().status
}

/// 対象のアイテムだけが Detecting になり、除外アイテムは元の状態のまま
#[tokio::test]
async fn test_start_marks_only_included() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("a.jpg", true), ("b.mp4", true)]);
    registry.set_status(1, StatusTag::Detecting).unwrap();
    registry.set_status(1, StatusTag::Completed).unwrap();
    registry.set_included(1, false).unwrap();

    let engine = Arc::new(RecordingEngine::default());
    let mut orchestrator = DetectionOrchestrator::new(engine.clone());
    let ticket = orchestrator.start(&mut registry, &config(dir.path())).unwrap();

    assert_eq!(ticket.item_count, 1);
    assert_eq!(status(&registry, 0), StatusTag::Detecting);
    assert_eq!(status(&registry, 1), StatusTag::Completed);

    let report = orchestrator.finished(&mut registry).await.unwrap();
    assert_eq!(report.completed_count(), 1);
    assert_eq!(status(&registry, 0), StatusTag::Completed);
    assert_eq!(status(&registry, 1), StatusTag::Completed);

    let requests = engine.recorded();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sources, vec![PathBuf::from("a.jpg")]);
}

/// 開始時の書き戻しは replace_all 1回
#[tokio::test]
async fn test_start_emits_single_replace() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("a.jpg", true), ("b.png", true), ("c.mp4", false)]);
    let rx = registry.subscribe();

    let mut orchestrator = DetectionOrchestrator::new(Arc::new(RecordingEngine::default()));
    orchestrator.start(&mut registry, &config(dir.path())).unwrap();

    let events: Vec<RegistryEvent> = rx.try_iter().collect();
    assert_eq!(events, vec![RegistryEvent::Replaced { len: 3 }]);

    orchestrator.finished(&mut registry).await.unwrap();
    let events: Vec<RegistryEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, RegistryEvent::ItemChanged { .. })));
}

/// 実行中の start は Busy
#[tokio::test]
async fn test_start_rejected_while_running() {
    let dir = tempdir().unwrap();
    let (release, gate) = mpsc::channel();
    let engine = Arc::new(GatedEngine { gate: Mutex::new(gate) });
    let mut orchestrator = DetectionOrchestrator::new(engine);
    let mut registry = registry(&[("a.jpg", true)]);
    let config = config(dir.path());

    let ticket = orchestrator.start(&mut registry, &config).unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Running { job_id: ticket.id });

    let err = orchestrator.start(&mut registry, &config).unwrap_err();
    assert!(matches!(err, DetectError::Busy));

    release.send(()).unwrap();
    orchestrator.finished(&mut registry).await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);

    // 完了後は再実行できる（完了済みアイテムは Detecting に戻る）
    release.send(()).unwrap();
    let second = orchestrator.start(&mut registry, &config).unwrap();
    assert!(second.id > ticket.id);
    assert_eq!(status(&registry, 0), StatusTag::Detecting);
    orchestrator.finished(&mut registry).await.unwrap();
    assert_eq!(status(&registry, 0), StatusTag::Completed);
}

/// poll はブロックせず、完了後に一度だけ報告を返す
#[test]
fn test_poll_is_non_blocking() {
    let dir = tempdir().unwrap();
    let (release, gate) = mpsc::channel();
    let engine = Arc::new(GatedEngine { gate: Mutex::new(gate) });
    let mut orchestrator = DetectionOrchestrator::new(engine);
    let mut registry = registry(&[("a.jpg", true), ("b.mp4", true)]);

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();
    assert!(orchestrator.poll(&mut registry).is_none());
    assert!(orchestrator.is_running());

    // 画像と動画で2リクエスト
    release.send(()).unwrap();
    release.send(()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let report = loop {
        if let Some(report) = orchestrator.poll(&mut registry) {
            break report;
        }
        assert!(Instant::now() < deadline, "job did not finish");
        std::thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(report.completed_count(), 2);
    assert!(!orchestrator.is_running());
    assert!(orchestrator.poll(&mut registry).is_none());
}

/// 種別ごとのリクエストで失敗した側だけが Failed になる
#[tokio::test]
async fn test_failure_isolated_per_kind() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("a.jpg", true), ("b.mp4", true), ("c.png", true)]);
    let engine = Arc::new(RecordingEngine::failing_kind(MediaKind::Video));
    let mut orchestrator = DetectionOrchestrator::new(engine.clone());

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();
    let report = orchestrator.finished(&mut registry).await.unwrap();

    assert_eq!(status(&registry, 0), StatusTag::Completed);
    assert_eq!(status(&registry, 1), StatusTag::Failed);
    assert_eq!(status(&registry, 2), StatusTag::Completed);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].sources, vec![PathBuf::from("b.mp4")]);
    let summary = report.summary().unwrap();
    assert!(summary.contains("model crashed"));

    let requests = engine.recorded();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].kind, MediaKind::Image);
    assert_eq!(requests[0].sources, vec![PathBuf::from("a.jpg"), PathBuf::from("c.png")]);
}

/// 種別単位だと同じバッチの全件が失敗、1件ずつなら失敗は1件だけ
#[tokio::test]
async fn test_per_item_dispatch_isolates_bad_input() {
    let dir = tempdir().unwrap();

    let mut batch_registry = registry(&[("a.jpg", true), ("bad.jpg", true), ("c.jpg", true)]);
    let mut batch = DetectionOrchestrator::new(Arc::new(RecordingEngine::failing_path("bad.jpg")));
    batch.start(&mut batch_registry, &config(dir.path())).unwrap();
    let report = batch.finished(&mut batch_registry).await.unwrap();
    assert_eq!(report.failed_count(), 3);

    let mut item_registry = registry(&[("a.jpg", true), ("bad.jpg", true), ("c.jpg", true)]);
    let engine = Arc::new(RecordingEngine::failing_path("bad.jpg"));
    let mut per_item = DetectionOrchestrator::new(engine.clone()).with_dispatch(Dispatch::PerItem);
    per_item.start(&mut item_registry, &config(dir.path())).unwrap();
    let report = per_item.finished(&mut item_registry).await.unwrap();

    assert_eq!(report.failed_count(), 1);
    assert_eq!(status(&item_registry, 0), StatusTag::Completed);
    assert_eq!(status(&item_registry, 1), StatusTag::Failed);
    assert_eq!(status(&item_registry, 2), StatusTag::Completed);
    assert_eq!(engine.recorded().len(), 3);
}

/// パニックするエンジンでもプロセスは落ちず、全件 Failed
#[tokio::test]
async fn test_panicking_engine_marks_failed() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("a.jpg", true), ("b.mp4", true)]);
    let engine = Arc::new(RecordingEngine {
        panic_always: true,
        ..Default::default()
    });
    let mut orchestrator = DetectionOrchestrator::new(engine);

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();
    let report = orchestrator.finished(&mut registry).await.unwrap();

    assert_eq!(report.failed_count(), 2);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(status(&registry, 0), StatusTag::Failed);
    assert_eq!(status(&registry, 1), StatusTag::Failed);
    assert!(!orchestrator.is_running());
}

/// 対象がなければ開始しない
#[test]
fn test_nothing_to_detect() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("a.jpg", false)]);
    let rx = registry.subscribe();
    let mut orchestrator = DetectionOrchestrator::new(Arc::new(RecordingEngine::default()));

    let err = orchestrator.start(&mut registry, &config(dir.path())).unwrap_err();
    assert!(matches!(err, DetectError::NothingToDetect));
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(status(&registry, 0), StatusTag::Pending);
    assert!(rx.try_recv().is_err());
}

/// 推論リクエストの契約（run名・上書き・信頼度・出力先）
#[tokio::test]
async fn test_request_contract() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("clip.mp4", true)]);
    let engine = Arc::new(RecordingEngine::default());
    let mut orchestrator = DetectionOrchestrator::new(engine.clone());

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();
    let report = orchestrator.finished(&mut registry).await.unwrap();

    let request = &engine.recorded()[0];
    assert_eq!(request.kind, MediaKind::Video);
    assert_eq!(request.run_name, "predict");
    assert!(request.overwrite_existing);
    assert_eq!(request.confidence, 0.35);
    assert_eq!(request.output_dir, dir.path());
    assert_eq!(request.model_path, PathBuf::from("model/yolo8n.pt"));

    // エンジンが何も書かないので出力は欠落扱い（失敗ではない）
    assert_eq!(report.missing_outputs, vec![dir.path().join("predict").join("clip.avi")]);
    assert_eq!(status(&registry, 0), StatusTag::Completed);
}

/// 実行中にリストが追加されてもパスで状態を書き戻す
#[tokio::test]
async fn test_status_written_back_after_replace() {
    let dir = tempdir().unwrap();
    let (release, gate) = mpsc::channel();
    let engine = Arc::new(GatedEngine { gate: Mutex::new(gate) });
    let mut orchestrator = DetectionOrchestrator::new(engine);
    let mut registry = registry(&[("a.jpg", true)]);

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();

    let mut reordered = vec![WorkItem::new("new.png")];
    reordered.extend(registry.items().iter().cloned());
    registry.replace_all(reordered);

    release.send(()).unwrap();
    orchestrator.finished(&mut registry).await.unwrap();

    assert_eq!(status(&registry, 0), StatusTag::Pending);
    assert_eq!(status(&registry, 1), StatusTag::Completed);
}

/// 名前の取得でもパニックするエンジン（ワーカーが報告前に落ちる）
struct CrashingEngine;

impl InferenceEngine for CrashingEngine {
    fn name(&self) -> &str {
        panic!("engine state lost");
    }

    fn predict(&self, _request: &InferenceRequest) -> yolo_batch_rust::Result<()> {
        panic!("engine exploded");
    }
}

/// 報告なしで終了したワーカーの対象は全件 Failed になり、Idle に戻る
#[tokio::test]
async fn test_worker_lost_marks_all_failed() {
    let dir = tempdir().unwrap();
    let mut registry = registry(&[("a.jpg", true), ("b.mp4", true), ("c.png", false)]);
    let mut orchestrator = DetectionOrchestrator::new(Arc::new(CrashingEngine));

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();
    let report = orchestrator.finished(&mut registry).await.unwrap();

    assert_eq!(report.failed_count(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, None);
    assert!(report.summary().is_some());
    assert_eq!(status(&registry, 0), StatusTag::Failed);
    assert_eq!(status(&registry, 1), StatusTag::Failed);
    assert_eq!(status(&registry, 2), StatusTag::Pending);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
}

/// 同じパスが複数行あり、実行中に並びが変わっても各行を1回ずつ書き戻す
#[tokio::test]
async fn test_duplicate_paths_written_back_once_each() {
    let dir = tempdir().unwrap();
    let (release, gate) = mpsc::channel();
    let engine = Arc::new(GatedEngine { gate: Mutex::new(gate) });
    let mut orchestrator = DetectionOrchestrator::new(engine);
    let mut registry = registry(&[("a.jpg", true), ("a.jpg", true)]);

    orchestrator.start(&mut registry, &config(dir.path())).unwrap();

    let mut shifted = vec![WorkItem::new("new.png")];
    shifted.extend(registry.items().iter().cloned());
    registry.replace_all(shifted);

    release.send(()).unwrap();
    orchestrator.finished(&mut registry).await.unwrap();

    assert_eq!(status(&registry, 0), StatusTag::Pending);
    assert_eq!(status(&registry, 1), StatusTag::Completed);
    assert_eq!(status(&registry, 2), StatusTag::Completed);
}

//! 同期再生
//!
//! 複数の表示スロットに結び付けたメディアを、共有カーソル1本で同じフレーム番号に揃える。
//! カーソルの上限は結び付けたメディアの最小フレーム数 - 1。
//! 結び付けは `reset` まで追加のみ。

mod ffmpeg;
mod media;
mod still;

pub use ffmpeg::{parse_fps_fraction, parse_probe_output, probe, FfmpegVideo, VideoProperties};
pub use media::{Frame, FrameSink, FrameSource, MediaOpener, PlayAffordance, SlotId};
pub use still::StillImage;

use crate::error::{DetectError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use yolo_batch_common::MediaKind;

/// 再生タイマーの間隔
pub const PLAYBACK_INTERVAL: Duration = Duration::from_millis(30);

/// 拡張子で動画/静止画リーダーを選ぶ
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl MediaOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        match MediaKind::classify(path) {
            MediaKind::Video => Ok(Box::new(FfmpegVideo::open(path)?)),
            MediaKind::Image => Ok(Box::new(StillImage::open(path)?)),
        }
    }
}

struct Binding {
    path: PathBuf,
    source: Box<dyn FrameSource>,
}

pub struct PlaybackSynchronizer<S: FrameSink> {
    opener: Box<dyn MediaOpener>,
    sink: S,
    bindings: BTreeMap<SlotId, Binding>,
    cursor: usize,
    max: usize,
    playing: bool,
    interval: Duration,
    next_tick: Option<Instant>,
}

impl<S: FrameSink> PlaybackSynchronizer<S> {
    pub fn new(opener: Box<dyn MediaOpener>, sink: S) -> Self {
        Self {
            opener,
            sink,
            bindings: BTreeMap::new(),
            cursor: 0,
            max: 0,
            playing: false,
            interval: PLAYBACK_INTERVAL,
            next_tick: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// カーソル上限（結び付けがなければ None）
    pub fn max_position(&self) -> Option<usize> {
        (!self.bindings.is_empty()).then_some(self.max)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_bound(&self, slot: SlotId) -> bool {
        self.bindings.contains_key(&slot)
    }

    pub fn bound_path(&self, slot: SlotId) -> Option<&Path> {
        self.bindings.get(&slot).map(|b| b.path.as_path())
    }

    pub fn bound_slots(&self) -> Vec<SlotId> {
        self.bindings.keys().copied().collect()
    }

    /// メディアを開いてスロットに結び付け、現在のカーソル位置を描画する。
    /// 開けなければスロットは空のまま。
    pub fn bind(&mut self, path: &Path, slot: SlotId) -> Result<()> {
        if self.bindings.contains_key(&slot) {
            return Err(DetectError::SlotOccupied(slot.0));
        }

        let source = self.opener.open(path)?;
        let count = source.frame_count();
        if count == 0 {
            return Err(DetectError::MediaOpen {
                path: path.to_path_buf(),
                message: "フレームがありません".to_string(),
            });
        }

        let first = self.bindings.is_empty();
        self.bindings.insert(
            slot,
            Binding {
                path: path.to_path_buf(),
                source,
            },
        );

        let ceiling = count - 1;
        let previous_max = self.max;
        self.max = if first { ceiling } else { previous_max.min(ceiling) };
        if first || self.max != previous_max {
            self.sink.set_cursor_range(self.max);
        }

        tracing::debug!(slot = slot.0, frames = count, max = self.max, "bind {}", path.display());

        if self.cursor > self.max {
            // 上限が縮んだ: 全スロットを揃え直す
            self.seek(self.max);
        } else {
            self.render(slot);
        }
        Ok(())
    }

    /// カーソルを移動して全スロットを描画する（範囲外は丸める）
    pub fn seek(&mut self, position: usize) -> usize {
        if self.bindings.is_empty() {
            return self.cursor;
        }

        self.cursor = position.min(self.max);
        self.sink.set_cursor(self.cursor);

        for (slot, binding) in self.bindings.iter_mut() {
            match binding.source.frame(self.cursor) {
                Ok(frame) => self.sink.show_frame(*slot, frame),
                Err(e) => tracing::warn!(slot = slot.0, "{}: {}", binding.path.display(), e),
            }
        }
        self.cursor
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.bindings.is_empty() {
            return false;
        }

        if self.playing {
            self.stop();
        } else {
            if self.cursor >= self.max {
                self.seek(0);
            }
            self.playing = true;
            self.next_tick = Some(Instant::now() + self.interval);
            self.sink.set_affordance(PlayAffordance::Pause);
        }
        self.playing
    }

    /// 1フレーム進める。末尾なら再生を止める（自動停止はこの経路のみ）
    pub fn advance(&mut self) {
        if self.bindings.is_empty() {
            return;
        }

        if self.cursor < self.max {
            self.seek(self.cursor + 1);
        } else if self.playing {
            tracing::debug!("末尾に到達したため停止");
            self.stop();
        }
    }

    /// タイマー: 間隔を過ぎていれば1回だけ `advance` する
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.playing {
            return false;
        }
        match self.next_tick {
            Some(due) if now < due => false,
            _ => {
                self.advance();
                if self.playing {
                    self.next_tick = Some(now + self.interval);
                }
                true
            }
        }
    }

    /// 次の tick までの残り時間（再生中のみ）
    pub fn time_until_tick(&self, now: Instant) -> Option<Duration> {
        if !self.playing {
            return None;
        }
        Some(self.next_tick.map(|due| due.saturating_duration_since(now)).unwrap_or_default())
    }

    pub fn pause(&mut self) {
        if self.playing {
            self.stop();
        }
    }

    /// セッションを破棄する
    pub fn reset(&mut self) {
        self.pause();
        self.bindings.clear();
        self.cursor = 0;
        self.max = 0;
        self.sink.set_cursor_range(0);
        self.sink.set_cursor(0);
    }

    fn stop(&mut self) {
        self.playing = false;
        self.next_tick = None;
        self.sink.set_affordance(PlayAffordance::Play);
    }

    fn render(&mut self, slot: SlotId) {
        let Some(binding) = self.bindings.get_mut(&slot) else {
            return;
        };
        match binding.source.frame(self.cursor) {
            Ok(frame) => self.sink.show_frame(slot, frame),
            Err(e) => tracing::warn!(slot = slot.0, "{}: {}", binding.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    struct Blank(usize);

    impl FrameSource for Blank {
        fn frame_count(&self) -> usize {
            self.0
        }

        fn frame(&mut self, _index: usize) -> Result<Frame> {
            Ok(RgbaImage::new(1, 1))
        }
    }

    struct BlankOpener;

    impl MediaOpener for BlankOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
            let frames = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            Ok(Box::new(Blank(frames)))
        }
    }

    #[derive(Default)]
    struct NullSink;

    impl FrameSink for NullSink {
        fn show_frame(&mut self, _slot: SlotId, _frame: Frame) {}
        fn set_cursor_range(&mut self, _max: usize) {}
        fn set_affordance(&mut self, _affordance: PlayAffordance) {}
    }

    fn player() -> PlaybackSynchronizer<NullSink> {
        PlaybackSynchronizer::new(Box::new(BlankOpener), NullSink)
    }

    #[test]
    fn test_tick_respects_interval() {
        let mut player = player().with_interval(Duration::from_millis(30));
        player.bind(Path::new("10.mp4"), SlotId::SOURCE).unwrap();
        player.toggle_play();

        let start = Instant::now();
        assert!(!player.tick(start));
        assert!(player.tick(start + Duration::from_millis(31)));
        assert_eq!(player.cursor(), 1);
    }

    #[test]
    fn test_zero_frame_media_rejected() {
        let mut player = player();
        let err = player.bind(Path::new("0.mp4"), SlotId::SOURCE).unwrap_err();
        assert!(matches!(err, DetectError::MediaOpen { .. }));
        assert!(!player.is_bound(SlotId::SOURCE));
        assert_eq!(player.max_position(), None);
    }

    #[test]
    fn test_toggle_without_bindings_is_noop() {
        let mut player = player();
        assert!(!player.toggle_play());
        assert!(!player.is_playing());
        assert!(!player.tick(Instant::now() + Duration::from_secs(1)));
    }

    #[test]
    fn test_play_at_end_rewinds() {
        let mut player = player();
        player.bind(Path::new("5.mp4"), SlotId::SOURCE).unwrap();
        player.seek(4);
        assert!(player.toggle_play());
        assert_eq!(player.cursor(), 0);
    }
}

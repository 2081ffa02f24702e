//! フレーム単位でアクセスできるメディアと表示先の契約

use crate::error::Result;
use image::RgbaImage;
use std::fmt;
use std::path::Path;

pub type Frame = RgbaImage;

/// 表示スロット（0 = 入力、1 = 出力）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

impl SlotId {
    pub const SOURCE: SlotId = SlotId(0);
    pub const OUTPUT: SlotId = SlotId(1);
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// フレーム番号でシークできるメディア
pub trait FrameSource {
    fn frame_count(&self) -> usize;

    fn frame(&mut self, index: usize) -> Result<Frame>;
}

pub trait MediaOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

/// 再生ボタンの表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAffordance {
    Play,
    Pause,
}

/// 表示面
pub trait FrameSink {
    fn show_frame(&mut self, slot: SlotId, frame: Frame);

    /// シークバーの範囲 `0..=max`
    fn set_cursor_range(&mut self, max: usize);

    fn set_cursor(&mut self, _position: usize) {}

    fn set_affordance(&mut self, affordance: PlayAffordance);
}

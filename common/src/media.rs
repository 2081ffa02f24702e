//! 拡張子によるメディア種別判定
//!
//! 判定は大文字小文字を区別しない（`clip.MP4` も動画）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const IMAGE_SUFFIXES: &[&str] = &["jpg", "bmp", "png"];
pub const VIDEO_SUFFIXES: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "mpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// 動画拡張子なら Video、それ以外はすべて Image として扱う
    pub fn classify(path: &Path) -> Self {
        if is_video(path) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    /// 対応拡張子のみ判定（未対応なら None）
    pub fn detect(path: &Path) -> Option<Self> {
        if is_video(path) {
            Some(MediaKind::Video)
        } else if is_image(path) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            suffixes.iter().any(|s| *s == ext)
        })
        .unwrap_or(false)
}

pub fn is_video(path: impl AsRef<Path>) -> bool {
    has_suffix(path.as_ref(), VIDEO_SUFFIXES)
}

pub fn is_image(path: impl AsRef<Path>) -> bool {
    has_suffix(path.as_ref(), IMAGE_SUFFIXES)
}

/// 取り込み対象の拡張子か
pub fn is_recognized(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    is_video(path) || is_image(path)
}

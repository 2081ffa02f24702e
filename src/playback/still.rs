//! 静止画（1フレームのメディア）

use super::media::{Frame, FrameSource};
use crate::error::{DetectError, Result};
use std::path::Path;

pub struct StillImage {
    image: Frame,
}

impl StillImage {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path).map_err(|e| DetectError::MediaOpen {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::from_frame(image.to_rgba8()))
    }

    pub fn from_frame(image: Frame) -> Self {
        Self { image }
    }
}

impl FrameSource for StillImage {
    fn frame_count(&self) -> usize {
        1
    }

    fn frame(&mut self, index: usize) -> Result<Frame> {
        if index != 0 {
            return Err(DetectError::FrameDecode(format!("still image has no frame {}", index)));
        }
        Ok(self.image.clone())
    }
}

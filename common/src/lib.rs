//! YOLO Batch Common Library
//!
//! CLIとデスクトップで共有される型とユーティリティ

pub mod types;
pub mod media;
pub mod output;

pub use types::{StatusTag, WorkItem};
pub use media::{is_image, is_recognized, is_video, MediaKind, IMAGE_SUFFIXES, VIDEO_SUFFIXES};
pub use output::{expected_output_path, run_dir, RUN_NAME};

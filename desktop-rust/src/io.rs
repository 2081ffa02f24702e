use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use yolo_batch_common::{IMAGE_SUFFIXES, VIDEO_SUFFIXES};
use yolo_batch_rust::config::MODEL_SUFFIX;
use yolo_batch_rust::{scanner, JobReport};

pub fn pick_media_files() -> Vec<PathBuf> {
    let picked = rfd::FileDialog::new()
        .add_filter("Media", media_filter().as_slice())
        .add_filter("Images", IMAGE_SUFFIXES)
        .add_filter("Videos", VIDEO_SUFFIXES)
        .pick_files()
        .unwrap_or_default();
    scanner::filter_recognized(picked)
}

/// Top-level media of a chosen folder, sorted by file name.
pub fn pick_media_folder() -> Result<Option<Vec<PathBuf>>> {
    let Some(folder) = rfd::FileDialog::new().pick_folder() else {
        return Ok(None);
    };
    let inputs = scanner::scan_folder(&folder).with_context(|| format!("scan {}", folder.display()))?;
    Ok(Some(inputs.into_iter().map(|i| i.path).collect()))
}

pub fn pick_model(current: &Path) -> Option<PathBuf> {
    let mut dialog = rfd::FileDialog::new().add_filter("PyTorch model", &[MODEL_SUFFIX]);
    if let Some(dir) = current.parent().filter(|d| d.is_dir()) {
        dialog = dialog.set_directory(dir);
    }
    dialog.pick_file()
}

pub fn pick_output_dir(current: &Path) -> Option<PathBuf> {
    let mut dialog = rfd::FileDialog::new();
    if current.is_dir() {
        dialog = dialog.set_directory(current);
    }
    dialog.pick_folder()
}

pub fn save_report(path: &Path, report: &JobReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn default_report_name(report: &JobReport) -> String {
    format!("detect-report-{}.json", report.job_id)
}

fn media_filter() -> Vec<&'static str> {
    IMAGE_SUFFIXES.iter().chain(VIDEO_SUFFIXES.iter()).copied().collect()
}

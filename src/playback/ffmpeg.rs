//! FFmpeg サブプロセスによる動画リーダー
//!
//! ffprobe でプロパティを取得し、ffmpeg の rawvideo (RGBA) 出力からフレームを読む。
//! 連続読み出し（再生中）はパイプを保持して次フレームをそのまま読み、
//! それ以外は `-ss` 付きで ffmpeg を起動し直す。

use super::media::{Frame, FrameSource};
use crate::error::{DetectError, Result};
use image::RgbaImage;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: usize,
}

/// "30000/1001" → 29.97
pub fn parse_fps_fraction(value: &str) -> Option<f64> {
    let fps = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (fps > 0.0).then_some(fps)
}

/// ffprobe の JSON 出力を解釈
pub fn parse_probe_output(json: &str) -> Option<VideoProperties> {
    let data: serde_json::Value = serde_json::from_str(json).ok()?;
    let stream = data.get("streams")?.as_array()?.first()?;

    let width = stream.get("width")?.as_u64()? as u32;
    let height = stream.get("height")?.as_u64()? as u32;
    let fps = stream
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .and_then(parse_fps_fraction)?;

    let parse_str = |v: Option<&serde_json::Value>| -> Option<f64> {
        v.and_then(|v| v.as_str()).filter(|s| *s != "N/A").and_then(|s| s.parse().ok())
    };

    let mut frame_count = parse_str(stream.get("nb_frames")).map(|n| n as usize).unwrap_or(0);
    // MKV 等は nb_frames がないので長さから推定
    if frame_count == 0 {
        let duration = parse_str(stream.get("duration"))
            .or_else(|| parse_str(data.get("format").and_then(|f| f.get("duration"))))
            .unwrap_or(0.0);
        frame_count = (duration * fps).floor() as usize;
    }

    Some(VideoProperties {
        width,
        height,
        fps,
        frame_count,
    })
}

pub fn probe(path: &Path) -> Result<VideoProperties> {
    let open_error = |message: String| DetectError::MediaOpen {
        path: path.to_path_buf(),
        message,
    };

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,duration",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| open_error(format!("ffprobe execution failed: {}", e)))?;

    if !output.status.success() {
        return Err(open_error("ffprobe failed".to_string()));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json).ok_or_else(|| open_error("no video stream".to_string()))
}

struct FrameStream {
    child: Child,
    stdout: ChildStdout,
    next_index: usize,
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct FfmpegVideo {
    path: PathBuf,
    props: VideoProperties,
    stream: Option<FrameStream>,
}

impl FfmpegVideo {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DetectError::MediaOpen {
                path: path.to_path_buf(),
                message: "File does not exist".to_string(),
            });
        }

        let props = probe(path)?;
        tracing::debug!(
            "[FFmpeg] Opened video: {}x{} @ {:.3} fps, {} frames",
            props.width,
            props.height,
            props.fps,
            props.frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            props,
            stream: None,
        })
    }

    fn frame_bytes(&self) -> usize {
        self.props.width as usize * self.props.height as usize * 4
    }

    fn spawn_stream(&self, index: usize) -> Result<FrameStream> {
        let seconds = index as f64 / self.props.fps;
        let mut child = Command::new("ffmpeg")
            .args(stream_args(&self.path, seconds))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DetectError::FrameDecode(format!("ffmpeg execution failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectError::FrameDecode("ffmpeg stdout unavailable".to_string()))?;

        Ok(FrameStream {
            child,
            stdout,
            next_index: index,
        })
    }
}

/// rawvideo 出力の引数。
/// ffprobe の幅・高さ（回転メタデータ適用前）とバッファを揃えるため自動回転は無効にする。
fn stream_args(path: &Path, seconds: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-noautorotate", "-ss"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(format!("{:.6}", seconds).into());
    args.push("-i".into());
    args.push(path.as_os_str().to_os_string());
    args.extend(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "-"].into_iter().map(OsString::from));
    args
}

impl FrameSource for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.props.frame_count
    }

    fn frame(&mut self, index: usize) -> Result<Frame> {
        if index >= self.props.frame_count {
            return Err(DetectError::FrameDecode(format!(
                "frame {} out of range ({} frames)",
                index, self.props.frame_count
            )));
        }

        let reusable = matches!(&self.stream, Some(s) if s.next_index == index);
        if !reusable {
            self.stream = Some(self.spawn_stream(index)?);
        }

        let mut buffer = vec![0u8; self.frame_bytes()];
        let read = match self.stream.as_mut() {
            Some(stream) => stream.stdout.read_exact(&mut buffer),
            None => return Err(DetectError::FrameDecode("stream not started".to_string())),
        };
        if let Err(e) = read {
            self.stream = None;
            return Err(DetectError::FrameDecode(format!("frame {}: {}", index, e)));
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.next_index += 1;
        }

        RgbaImage::from_raw(self.props.width, self.props.height, buffer)
            .ok_or_else(|| DetectError::FrameDecode("frame buffer size mismatch".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fps_fraction() {
        assert!((parse_fps_fraction("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_fps_fraction("25/1"), Some(25.0));
        assert_eq!(parse_fps_fraction("24"), Some(24.0));
        assert_eq!(parse_fps_fraction("0/0"), None);
        assert_eq!(parse_fps_fraction("abc"), None);
    }

    #[test]
    fn test_parse_probe_output_with_nb_frames() {
        let json = r#"{"streams": [{"width": 640, "height": 360, "r_frame_rate": "30/1", "nb_frames": "300", "duration": "10.0"}], "format": {"duration": "10.0"}}"#;
        let props = parse_probe_output(json).unwrap();
        assert_eq!(props.width, 640);
        assert_eq!(props.height, 360);
        assert_eq!(props.frame_count, 300);
    }

    #[test]
    fn test_parse_probe_output_estimates_from_duration() {
        let json = r#"{"streams": [{"width": 320, "height": 240, "r_frame_rate": "25/1", "nb_frames": "N/A"}], "format": {"duration": "4.0"}}"#;
        let props = parse_probe_output(json).unwrap();
        assert_eq!(props.frame_count, 100);
    }

    #[test]
    fn test_parse_probe_output_no_stream() {
        assert!(parse_probe_output(r#"{"streams": []}"#).is_none());
        assert!(parse_probe_output("not json").is_none());
    }

    #[test]
    fn test_stream_args_disable_autorotate() {
        let args = stream_args(Path::new("clip.mov"), 1.5);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();

        let rotate = args.iter().position(|a| a == "-noautorotate").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(rotate < input);
        assert_eq!(args[input + 1], "clip.mov");
        assert!(args.contains(&"1.500000".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_open_nonexistent() {
        let result = FfmpegVideo::open(Path::new("/nonexistent/video.mkv"));
        assert!(matches!(result, Err(DetectError::MediaOpen { .. })));
    }
}

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Extensions handed to the frame extractor instead of the image decoder.
pub const VIDEO_EXTENSIONS: &[&str] =
    &["mp4", "mkv", "webm", "avi", "mov", "m4v", "wmv"];

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Seek offset for the representative frame:
/// `min(1.0 s, 10% of duration)`, never earlier than 0.1 s.
pub fn frame_offset_secs(duration_secs: f64) -> f64 {
    (duration_secs * 0.1).clamp(0.1, 1.0)
}

/// Extract a single JPEG frame from a video file via the external `ffmpeg`
/// binary. A missing binary is a structured [`CoreError::ExternalTool`]
/// error, never a worker crash.
pub async fn extract_frame(path: &Path) -> Result<Vec<u8>> {
    let duration = probe_duration(path).await?;
    let offset = frame_offset_secs(duration);
    debug!("Extracting frame at {:.2}s from {}", offset, path.display());

    let output = Command::new("ffmpeg")
        .arg("-v")
        .arg("error")
        .arg("-ss")
        .arg(format!("{offset:.3}"))
        .arg("-i")
        .arg(path)
        .arg("-frames:v")
        .arg("1")
        .arg("-f")
        .arg("image2pipe")
        .arg("-vcodec")
        .arg("mjpeg")
        .arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| tool_error("ffmpeg", e))?;

    if !output.status.success() {
        return Err(CoreError::ExternalTool(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    if output.stdout.is_empty() {
        return Err(CoreError::ExternalTool(format!(
            "ffmpeg produced no frame for {}",
            path.display()
        )));
    }
    Ok(output.stdout)
}

async fn probe_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| tool_error("ffprobe", e))?;

    if !output.status.success() {
        return Err(CoreError::ExternalTool(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| {
            CoreError::ExternalTool(format!("unparseable ffprobe duration: {e}"))
        })
}

fn tool_error(tool: &str, e: std::io::Error) -> CoreError {
    if e.kind() == ErrorKind::NotFound {
        CoreError::ExternalTool(format!("{tool} binary is not installed"))
    } else {
        CoreError::ExternalTool(format!("failed to run {tool}: {e}"))
    }
}

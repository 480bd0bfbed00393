use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::ComposeError;

/// Media inspection backed by the external `ffprobe` tool.
///
/// Probing is the only part of the pipeline that reads source files directly;
/// everything downstream works from the numbers extracted here.
pub struct MediaProbe;

impl MediaProbe {
    /// Duration of an audio source.
    pub async fn audio_duration(path: &Path) -> Result<Duration, ComposeError> {
        let data = Self::run_ffprobe(path).await?;
        let seconds = parse_duration_secs(&data).ok_or_else(|| ComposeError::Probe {
            path: path.to_path_buf(),
            reason: "no duration in probe output".to_string(),
        })?;

        info!(
            "🎵 Probed audio: {} ({:.1}s)",
            path.display(),
            seconds
        );
        Ok(Duration::from_secs_f64(seconds))
    }

    /// Intrinsic width and height of an image or animation source.
    pub async fn visual_dimensions(path: &Path) -> Result<(u32, u32), ComposeError> {
        let data = Self::run_ffprobe(path).await?;
        let (width, height) =
            parse_video_stream_dims(&data).ok_or_else(|| ComposeError::Probe {
                path: path.to_path_buf(),
                reason: "no video stream with valid dimensions".to_string(),
            })?;

        info!("🖼️ Probed visual: {} ({}x{})", path.display(), width, height);
        Ok((width, height))
    }

    async fn run_ffprobe(path: &Path) -> Result<serde_json::Value, ComposeError> {
        if !path.exists() {
            return Err(ComposeError::Input {
                path: path.to_path_buf(),
            });
        }

        let output = tokio::process::Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ComposeError::Probe {
                path: path.to_path_buf(),
                reason: format!("ffprobe exited with {}", output.status),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ComposeError::Probe {
            path: path.to_path_buf(),
            reason: format!("unparseable ffprobe output: {e}"),
        })
    }
}

/// Pull the container duration (seconds) out of ffprobe JSON.
fn parse_duration_secs(data: &serde_json::Value) -> Option<f64> {
    data["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
}

/// Pull the first video stream's dimensions out of ffprobe JSON.
fn parse_video_stream_dims(data: &serde_json::Value) -> Option<(u32, u32)> {
    let stream = data["streams"]
        .as_array()?
        .iter()
        .find(|s| s["codec_type"] == "video")?;

    let width = stream["width"].as_u64()? as u32;
    let height = stream["height"].as_u64()? as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_duration() {
        let data = fixture(r#"{"format": {"format_name": "mp3", "duration": "30.042"}}"#);
        assert_eq!(parse_duration_secs(&data), Some(30.042));
    }

    #[test]
    fn test_parse_duration_rejects_missing_or_zero() {
        assert_eq!(parse_duration_secs(&fixture(r#"{"format": {}}"#)), None);
        let zero = fixture(r#"{"format": {"duration": "0.0"}}"#);
        assert_eq!(parse_duration_secs(&zero), None);
    }

    #[test]
    fn test_parse_dimensions_picks_video_stream() {
        let data = fixture(
            r#"{"streams": [
                {"codec_type": "audio", "channels": 2},
                {"codec_type": "video", "width": 480, "height": 270}
            ]}"#,
        );
        assert_eq!(parse_video_stream_dims(&data), Some((480, 270)));
    }

    #[test]
    fn test_parse_dimensions_rejects_degenerate_stream() {
        let data = fixture(r#"{"streams": [{"codec_type": "video", "width": 0, "height": 270}]}"#);
        assert_eq!(parse_video_stream_dims(&data), None);
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let path = PathBuf::from("/definitely/not/here.mp3");
        let err = tokio_test::block_on(MediaProbe::audio_duration(&path)).unwrap_err();
        assert!(matches!(err, ComposeError::Input { .. }));
    }
}

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::ComposeError;
use crate::probe::MediaProbe;
use crate::progress::ProgressSender;

/// Frame rate of every output video.
pub const OUTPUT_FPS: u32 = 24;

/// Canvas size used when no custom resolution is configured.
pub const DEFAULT_CANVAS: (u32, u32) = (1280, 720);

/// Fixed progress milestones emitted by the composition pipeline, in order.
pub const MILESTONES: [u8; 4] = [10, 40, 70, 100];

/// Everything a composition worker needs. Owns its `Settings` copy, so UI
/// edits made after launch never reach an in-flight job.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub audio_path: PathBuf,
    pub visual_path: PathBuf,
    pub output_path: PathBuf,
    pub settings: Settings,
}

/// Scaled-source and canvas geometry for one composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub scaled_w: u32,
    pub scaled_h: u32,
    pub canvas_w: u32,
    pub canvas_h: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Scale the visual source to the target height preserving aspect ratio,
/// then center it on the canvas.
///
/// A scaled source larger than the canvas on either axis is rejected rather
/// than silently clipped.
pub fn compute_layout(
    src_w: u32,
    src_h: u32,
    settings: &Settings,
) -> Result<Layout, ComposeError> {
    settings
        .validate()
        .map_err(|e| ComposeError::InvalidSettings(e.to_string()))?;

    let scaled_h = if settings.custom_resolution {
        settings.height
    } else {
        DEFAULT_CANVAS.1
    };
    let aspect = src_w as f64 / src_h as f64;
    let scaled_w = (scaled_h as f64 * aspect).round() as u32;

    let (canvas_w, canvas_h) = if settings.custom_resolution {
        (settings.width, settings.height)
    } else {
        DEFAULT_CANVAS
    };

    if scaled_w > canvas_w || scaled_h > canvas_h {
        return Err(ComposeError::SourceExceedsCanvas {
            scaled_w,
            scaled_h,
            canvas_w,
            canvas_h,
        });
    }

    Ok(Layout {
        scaled_w,
        scaled_h,
        canvas_w,
        canvas_h,
        offset_x: (canvas_w - scaled_w) / 2,
        offset_y: (canvas_h - scaled_h) / 2,
    })
}

/// The ffmpeg filter graph for one composition: a black canvas of the audio's
/// duration, the looped-and-scaled visual overlaid at the centering offset.
///
/// Input 1 is fed with `-stream_loop -1`, so the overlay keeps repeating the
/// source until the canvas (and `-t`) cut it off at the audio's duration;
/// a source longer than the audio is truncated the same way.
fn filter_graph(layout: &Layout, duration: Duration) -> String {
    format!(
        "color=c=black:s={cw}x{ch}:r={fps}:d={dur:.3}[bg];\
         [1:v]scale={sw}:{sh}[fg];\
         [bg][fg]overlay={x}:{y}:shortest=0[v]",
        cw = layout.canvas_w,
        ch = layout.canvas_h,
        fps = OUTPUT_FPS,
        dur = duration.as_secs_f64(),
        sw = layout.scaled_w,
        sh = layout.scaled_h,
        x = layout.offset_x,
        y = layout.offset_y,
    )
}

/// The two encoding presets on offer. No continuum in between.
fn encode_preset(high_quality: bool) -> &'static str {
    if high_quality {
        "slow"
    } else {
        "ultrafast"
    }
}

/// Runs the audio + looping-visual composition end to end via the external
/// `ffmpeg` tool, reporting fixed milestones on a progress channel.
#[derive(Debug, Clone, Default)]
pub struct MediaComposer;

impl MediaComposer {
    pub fn new() -> Self {
        Self
    }

    /// Compose `job` into its output file.
    ///
    /// Emits 10/40/70 at pipeline checkpoints and 100 on success; any failure
    /// emits the failure sentinel instead and the output file, if present,
    /// must not be treated as usable.
    pub async fn compose(
        &self,
        job: &ConversionJob,
        progress: &ProgressSender,
    ) -> Result<(), ComposeError> {
        match self.run(job, progress).await {
            Ok(()) => {
                progress.percent(100);
                info!("✅ Video created: {}", job.output_path.display());
                Ok(())
            }
            Err(e) => {
                error!("❌ Composition failed for {}: {}", job.output_path.display(), e);
                progress.fail();
                Err(e)
            }
        }
    }

    async fn run(&self, job: &ConversionJob, progress: &ProgressSender) -> Result<(), ComposeError> {
        let duration = MediaProbe::audio_duration(&job.audio_path).await?;
        progress.percent(MILESTONES[0]);

        let (src_w, src_h) = MediaProbe::visual_dimensions(&job.visual_path).await?;
        let layout = compute_layout(src_w, src_h, &job.settings)?;
        progress.percent(MILESTONES[1]);

        let filter = filter_graph(&layout, duration);
        let preset = encode_preset(job.settings.high_quality);
        debug!("🎬 Composite graph: {}", filter);
        progress.percent(MILESTONES[2]);

        self.encode(job, &filter, preset, duration).await
    }

    async fn encode(
        &self,
        job: &ConversionJob,
        filter: &str,
        preset: &str,
        duration: Duration,
    ) -> Result<(), ComposeError> {
        let output = tokio::process::Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(&job.audio_path)
            .args(["-stream_loop", "-1"])
            .arg("-i")
            .arg(&job.visual_path)
            .args(["-filter_complex", filter])
            .args(["-map", "[v]", "-map", "0:a"])
            .arg("-t")
            .arg(format!("{:.3}", duration.as_secs_f64()))
            .arg("-r")
            .arg(OUTPUT_FPS.to_string())
            .args(["-c:v", "libx264", "-preset", preset])
            .args(["-c:a", "aac"])
            .arg(&job.output_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(3)..].join(" | ");
            return Err(ComposeError::Encode(format!(
                "ffmpeg exited with {}: {}",
                output.status, tail
            )));
        }

        // ffmpeg reported success but produced nothing usable
        if tokio::fs::metadata(&job.output_path).await.is_err() {
            return Err(ComposeError::Encode(format!(
                "output file was not written: {}",
                job.output_path.display()
            )));
        }

        Ok(())
    }
}

//! ffmpeg compositing backend.
//!
//! Renders an assembly plan by driving the `ffmpeg` CLI: slides go through
//! the concat demuxer, audio gets its fade applied with `afade`, the
//! countdown overlay is a `drawtext` expression, and an appended clip is
//! joined with the `concat` filter. `ffprobe` supplies clip durations.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{AssemblyPlan, OverlayPosition};

use super::{Compositor, FetchedMedia};

const TARGET_WIDTH: u32 = 1920;
const TARGET_HEIGHT: u32 = 1080;

/// Compositor shelling out to ffmpeg/ffprobe binaries.
pub struct FfmpegCompositor {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCompositor {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    /// Use specific binary paths instead of relying on PATH lookup.
    pub fn with_binaries(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Concat-demuxer script listing every slide of every pass.
    fn concat_script(plan: &AssemblyPlan, media: &FetchedMedia) -> Result<String> {
        let mut script = String::from("ffconcat version 1.0\n");
        for _ in 0..plan.repeat_count {
            for slide in &plan.slides {
                let local = media
                    .local_path(&slide.item)
                    .with_context(|| format!("no local copy of {}", slide.item.file_name()))?;
                script.push_str(&format!(
                    "file '{}'\nduration {:.4}\n",
                    local.display(),
                    slide.display_seconds
                ));
            }
        }
        // The demuxer ignores the last duration unless the file repeats.
        if let Some(last) = plan.slides.last() {
            if let Some(local) = media.local_path(&last.item) {
                script.push_str(&format!("file '{}'\n", local.display()));
            }
        }
        Ok(script)
    }

    /// drawtext countdown filter for the overlay window.
    fn overlay_filter(plan: &AssemblyPlan) -> Option<String> {
        let overlay = plan.overlay.as_ref()?;
        let end = overlay.end;
        let (x, y) = match overlay.position {
            OverlayPosition::TopMiddle => ("(w-tw)/2".to_string(), "50".to_string()),
            OverlayPosition::BottomRight => ("w-tw-50".to_string(), "h-th-50".to_string()),
        };
        Some(format!(
            "drawtext=text='%{{eif\\:trunc(({end:.0}-t)/60)\\:d\\:2}}\\:%{{eif\\:mod({end:.0}-t,60)\\:d\\:2}}':\
             enable='between(t,{start:.3},{end:.3})':x={x}:y={y}:\
             fontsize=70:fontcolor=white:box=1:boxcolor=black@0.4:boxborderw=20",
            start = overlay.start,
            end = end,
        ))
    }

    fn build_args(
        &self,
        plan: &AssemblyPlan,
        media: &FetchedMedia,
        concat_path: &Path,
        output: &Path,
    ) -> Result<Vec<String>> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            concat_path.display().to_string(),
        ];

        let audio_input = plan
            .audio
            .as_ref()
            .map(|audio| {
                media
                    .local_path(&audio.track)
                    .map(Path::to_path_buf)
                    .with_context(|| format!("no local copy of {}", audio.track.file_name()))
            })
            .transpose()?;
        if let Some(track) = &audio_input {
            args.push("-i".into());
            args.push(track.display().to_string());
        }

        let append_input = plan
            .append
            .as_ref()
            .map(|append| {
                media
                    .local_path(&append.item)
                    .map(Path::to_path_buf)
                    .with_context(|| format!("no local copy of {}", append.item.file_name()))
            })
            .transpose()?;
        if let Some(clip) = &append_input {
            args.push("-i".into());
            args.push(clip.display().to_string());
        }

        // Video chain: normalize slide frames, optionally join the appended
        // clip, optionally draw the countdown.
        let scale = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={fps},format=yuv420p",
            w = TARGET_WIDTH,
            h = TARGET_HEIGHT,
            fps = plan.fps,
        );

        let mut filters = Vec::new();
        let video_label = if let Some(append) = &plan.append {
            let append_index = if audio_input.is_some() { 2 } else { 1 };
            filters.push(format!(
                "[0:v]{scale},trim=duration={:.4},setpts=PTS-STARTPTS[slides]",
                plan.slideshow_seconds()
            ));
            filters.push(format!(
                "[{append_index}:v]{scale},trim=duration={:.4},setpts=PTS-STARTPTS[outro]",
                append.duration_seconds
            ));
            filters.push("[slides][outro]concat=n=2:v=1:a=0[joined]".to_string());
            "joined"
        } else {
            filters.push(format!("[0:v]{scale}[joined]"));
            "joined"
        };

        let final_video = if let Some(overlay) = Self::overlay_filter(plan) {
            filters.push(format!("[{video_label}]{overlay}[vid]"));
            "[vid]"
        } else {
            filters.push(format!("[{video_label}]null[vid]"));
            "[vid]"
        };

        let final_audio = if let Some(audio) = &plan.audio {
            let audio_end = plan.total_seconds - audio.trailing_silence;
            filters.push(format!(
                "[1:a]atrim=0:{end:.4},afade=t=out:st={start:.4}:d={dur:.4},apad[aud]",
                end = audio_end.max(0.0),
                start = audio.fade_start,
                dur = audio.fade_seconds,
            ));
            Some("[aud]")
        } else {
            None
        };

        args.push("-filter_complex".into());
        args.push(filters.join(";"));
        args.push("-map".into());
        args.push(final_video.into());
        if let Some(aud) = final_audio {
            args.push("-map".into());
            args.push(aud.into());
            args.push("-c:a".into());
            args.push("aac".into());
        }

        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-t".into(),
            format!("{:.4}", plan.total_seconds),
            output.display().to_string(),
        ]);

        Ok(args)
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn probe_duration(&self, video: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video)
            .output()
            .await
            .with_context(|| format!("Failed to run ffprobe on {}", video.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed for {}: {}", video.display(), stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<f64>()
            .with_context(|| format!("Unparseable ffprobe duration: '{}'", stdout.trim()))
    }

    async fn render(
        &self,
        plan: &AssemblyPlan,
        media: &FetchedMedia,
        output: &Path,
    ) -> Result<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        let workdir = tempfile::tempdir().context("Failed to create ffmpeg work directory")?;
        let concat_path = workdir.path().join("slides.ffconcat");
        tokio::fs::write(&concat_path, Self::concat_script(plan, media)?)
            .await
            .context("Failed to write concat script")?;

        let args = self.build_args(plan, media, &concat_path, output)?;
        debug!(args = ?args, "Invoking ffmpeg");

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        let result = child
            .wait_with_output()
            .await
            .context("Failed to wait for ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(8)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!(
                "ffmpeg exited with {}: {}",
                result.status.code().unwrap_or(-1),
                tail
            );
        }

        info!(output = %output.display(), seconds = plan.total_seconds, "Render complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MediaItem, MediaKind, OverlayPlan, Slide};

    fn test_plan() -> (AssemblyPlan, FetchedMedia) {
        let items = vec![
            MediaItem::new("1.jpg", MediaKind::Image),
            MediaItem::new("2.jpg", MediaKind::Image),
        ];
        let mut media = FetchedMedia::default();
        media.insert(&items[0], PathBuf::from("/tmp/m/1.jpg"));
        media.insert(&items[1], PathBuf::from("/tmp/m/2.jpg"));

        let plan = AssemblyPlan {
            slides: items
                .into_iter()
                .map(|item| Slide {
                    item,
                    display_seconds: 5.0,
                })
                .collect(),
            repeat_count: 3,
            append: None,
            audio: None,
            overlay: None,
            total_seconds: 30.0,
            fps: 5.0,
        };
        (plan, media)
    }

    #[test]
    fn test_concat_script_repeats_sequence() {
        let (plan, media) = test_plan();
        let script = FfmpegCompositor::concat_script(&plan, &media).unwrap();

        // 2 slides x 3 repeats, plus the trailing repeat of the last file.
        assert_eq!(script.matches("file '").count(), 7);
        assert_eq!(script.matches("duration 5.0000").count(), 6);
    }

    #[test]
    fn test_build_args_without_audio_maps_video_only() {
        let (plan, media) = test_plan();
        let compositor = FfmpegCompositor::new();
        let args = compositor
            .build_args(&plan, &media, Path::new("/tmp/slides.ffconcat"), Path::new("/tmp/out.mp4"))
            .unwrap();

        assert!(args.contains(&"-filter_complex".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 1);
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn test_overlay_filter_tracks_position() {
        let (mut plan, _) = test_plan();
        plan.overlay = Some(OverlayPlan {
            start: 10.0,
            end: 30.0,
            position: OverlayPosition::BottomRight,
        });

        let filter = FfmpegCompositor::overlay_filter(&plan).unwrap();
        assert!(filter.contains("between(t,10.000,30.000)"));
        assert!(filter.contains("x=w-tw-50"));
    }
}

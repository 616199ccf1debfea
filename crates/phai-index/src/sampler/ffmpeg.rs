//! Frame source backed by the `ffmpeg` and `ffprobe` executables.

use phai_core::{Error, Result, SamplerConfig};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::source::{FrameSource, THUMBNAIL_SIDE};
use crate::embedding::ImageData;

/// Frame source that shells out to ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegFrameSource {
    /// Create a frame source using the executables named in the sampler configuration
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        }
    }

    async fn run<I, S>(program: &Path, args: I, path: &Path) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                Error::Decode(format!(
                    "Failed to run '{}' for {}: {error}. Is it installed?",
                    program.display(),
                    path.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Decode(format!(
                "'{}' failed for {}: {}",
                program.display(),
                path.display(),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn seek_arg(timestamp: Duration) -> String {
        format!("{:.3}", timestamp.as_secs_f64())
    }

    fn parse_duration(raw: &str, path: &Path) -> Result<Duration> {
        let seconds: f64 = raw.trim().parse().map_err(|_| {
            Error::Decode(format!(
                "No duration reported for {}: '{}'",
                path.display(),
                raw.trim()
            ))
        })?;
        Duration::try_from_secs_f64(seconds).map_err(|_| {
            Error::Decode(format!(
                "Invalid duration {seconds} for {}",
                path.display()
            ))
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    async fn duration(&self, path: &Path) -> Result<Duration> {
        let stdout = Self::run(
            &self.ffprobe,
            [
                OsStr::new("-v"),
                OsStr::new("error"),
                OsStr::new("-show_entries"),
                OsStr::new("format=duration"),
                OsStr::new("-of"),
                OsStr::new("default=noprint_wrappers=1:nokey=1"),
                path.as_os_str(),
            ],
            path,
        )
        .await?;
        let duration = Self::parse_duration(&String::from_utf8_lossy(&stdout), path)?;
        debug!("{} lasts {:?}", path.display(), duration);
        Ok(duration)
    }

    async fn frame_at(&self, path: &Path, timestamp: Duration) -> Result<ImageData> {
        let seek = Self::seek_arg(timestamp);
        let stdout = Self::run(
            &self.ffmpeg,
            [
                OsStr::new("-v"),
                OsStr::new("error"),
                OsStr::new("-ss"),
                OsStr::new(&seek),
                OsStr::new("-i"),
                path.as_os_str(),
                OsStr::new("-frames:v"),
                OsStr::new("1"),
                OsStr::new("-f"),
                OsStr::new("image2pipe"),
                OsStr::new("-vcodec"),
                OsStr::new("png"),
                OsStr::new("-"),
            ],
            path,
        )
        .await?;

        if stdout.is_empty() {
            return Err(Error::Decode(format!(
                "No frame at {seek}s in {}",
                path.display()
            )));
        }
        Ok(ImageData::new(stdout).with_origin(path))
    }

    async fn luma_thumbnail(&self, path: &Path, timestamp: Duration) -> Result<Vec<u8>> {
        let seek = Self::seek_arg(timestamp);
        let filter = format!("scale={THUMBNAIL_SIDE}:{THUMBNAIL_SIDE},format=gray");
        let stdout = Self::run(
            &self.ffmpeg,
            [
                OsStr::new("-v"),
                OsStr::new("error"),
                OsStr::new("-ss"),
                OsStr::new(&seek),
                OsStr::new("-i"),
                path.as_os_str(),
                OsStr::new("-frames:v"),
                OsStr::new("1"),
                OsStr::new("-vf"),
                OsStr::new(&filter),
                OsStr::new("-f"),
                OsStr::new("rawvideo"),
                OsStr::new("-"),
            ],
            path,
        )
        .await?;

        if stdout.len() != THUMBNAIL_SIDE * THUMBNAIL_SIDE {
            return Err(Error::Decode(format!(
                "Thumbnail at {seek}s in {} has {} bytes",
                path.display(),
                stdout.len()
            )));
        }
        Ok(stdout)
    }
}

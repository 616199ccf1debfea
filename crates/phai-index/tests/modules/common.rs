//! Deterministic provider and frame source used across the integration tests.
//!
//! Fixture files carry their vectors in plain text:
//! - images: `vec:0.34,0.94,0`
//! - videos: `video:<seconds>:0.1,0.2,0.97`

use phai_core::vector::normalized;
use phai_core::{EngineConfig, Error, Result};
use phai_index::{EmbeddingProvider, FrameSource, ImageData, JobController};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Shared call counters
#[derive(Debug, Default)]
pub struct Calls {
    pub images: AtomicUsize,
    pub texts: AtomicUsize,
    pub frames: AtomicUsize,
}

impl Calls {
    pub fn images(&self) -> usize {
        self.images.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

fn parse_vector(text: &str) -> Option<Vec<f32>> {
    text.trim()
        .split(',')
        .map(|value| value.trim().parse::<f32>().ok())
        .collect()
}

/// Provider that reads image vectors from the fixture bytes and maps query
/// words onto three axes: dogs, cats, everything else.
///
/// Image bytes starting with `crash` make it panic.
#[derive(Clone, Default)]
pub struct FakeProvider {
    pub calls: Arc<Calls>,
    pub unavailable: Arc<AtomicBool>,
    pub delay: Duration,
    pub text_delay: Duration,
}

impl FakeProvider {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_text_delay(text_delay: Duration) -> Self {
        Self {
            text_delay,
            ..Self::default()
        }
    }
}

impl EmbeddingProvider for FakeProvider {
    async fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::ProviderUnavailable("model not loaded".to_owned()));
        }
        Ok(())
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.texts.fetch_add(1, Ordering::SeqCst);
        if !self.text_delay.is_zero() {
            sleep(self.text_delay).await;
        }
        let text = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|word| text.contains(word));
        if has(&["dog", "puppy", "canine", "pet"]) {
            Ok(vec![1.0, 0.0, 0.0])
        } else if has(&["cat", "kitten", "feline"]) {
            Ok(vec![0.0, 1.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 1.0])
        }
    }

    async fn embed_image(&self, image: &ImageData) -> Result<Vec<f32>> {
        self.calls.images.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if image.bytes.starts_with(b"crash") {
            panic!("provider crashed on {:?}", image.origin);
        }
        let text = String::from_utf8_lossy(&image.bytes);
        let vector = text
            .strip_prefix("vec:")
            .and_then(parse_vector)
            .ok_or_else(|| Error::Decode("not an image".to_owned()))?;
        Ok(normalized(&vector))
    }
}

/// Frame source that serves the fixture's single vector at every timestamp
#[derive(Clone, Default)]
pub struct FakeFrames {
    pub calls: Arc<Calls>,
}

impl FakeFrames {
    fn parse(path: &Path) -> Result<(Duration, String)> {
        let content = fs::read_to_string(path)?;
        let mut parts = content.trim().splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("video"), Some(seconds), Some(vector)) => {
                let seconds: f64 = seconds
                    .parse()
                    .map_err(|_| Error::Decode("bad duration".to_owned()))?;
                Ok((Duration::from_secs_f64(seconds), vector.to_owned()))
            }
            _ => Err(Error::Decode(format!("{} is not a video", path.display()))),
        }
    }
}

impl FrameSource for FakeFrames {
    async fn duration(&self, path: &Path) -> Result<Duration> {
        Self::parse(path).map(|(duration, _)| duration)
    }

    async fn frame_at(&self, path: &Path, _timestamp: Duration) -> Result<ImageData> {
        self.calls.frames.fetch_add(1, Ordering::SeqCst);
        let (_, vector) = Self::parse(path)?;
        Ok(ImageData::new(format!("vec:{vector}").into_bytes()).with_origin(path))
    }

    async fn luma_thumbnail(&self, _path: &Path, _timestamp: Duration) -> Result<Vec<u8>> {
        Err(Error::Decode("thumbnails unsupported".to_owned()))
    }
}

/// Temporary media library plus index directory
pub struct Library {
    pub temp: TempDir,
}

impl Library {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(temp.path().join("media")).expect("Failed to create media dir");
        Self { temp }
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("media")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.temp.path().join("index")
    }

    pub fn image(&self, name: &str, vector: &[f32]) -> PathBuf {
        let values: Vec<String> = vector.iter().map(ToString::to_string).collect();
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, format!("vec:{}", values.join(","))).expect("Failed to write image");
        path
    }

    pub fn video(&self, name: &str, seconds: f32, vector: &[f32]) -> PathBuf {
        let values: Vec<String> = vector.iter().map(ToString::to_string).collect();
        let path = self.root().join(name);
        fs::write(&path, format!("video:{seconds}:{}", values.join(",")))
            .expect("Failed to write video");
        path
    }

    /// Three photos and one five-second clip
    pub fn with_scenario(self) -> Self {
        self.image("dog.jpg", &[0.34, 0.940_425, 0.0]);
        self.image("cat.png", &[0.0, 1.0, 0.0]);
        self.image("sunset.jpeg", &[0.0, 0.0, 1.0]);
        self.video("beach.mp4", 5.0, &[0.1, 0.2, 0.97]);
        self
    }

    pub fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.index.dir = Some(self.index_dir());
        config.index.sync_writes = false;
        config.sampler.frames = 8;
        config
    }

    pub fn controller(
        &self,
        provider: FakeProvider,
        frames: FakeFrames,
        config: EngineConfig,
    ) -> JobController<FakeProvider, FakeFrames> {
        JobController::new(provider, frames, config)
    }
}

//! Video frame sampling and per-video vector aggregation.

mod ffmpeg;
mod source;

pub use ffmpeg::FfmpegFrameSource;
pub use source::{FrameSource, THUMBNAIL_SIDE};

use phai_core::vector::{mean, normalized};
use phai_core::{Embedding, Error, Result, SamplerConfig, SamplingPolicy, VideoAggregation};
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::embedding::{EmbeddingProvider, ImageData};
use crate::jobs::StopFlag;

/// A decoded frame and where it was taken from
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Position inside the video
    pub timestamp: Duration,
    /// Encoded frame image
    pub image: ImageData,
}

/// Picks representative frames from videos and turns them into stored vectors
pub struct FrameSampler<F: FrameSource> {
    /// Frame decoder
    source: F,
    /// Frame count, policy and aggregation
    config: SamplerConfig,
}

impl<F: FrameSource> FrameSampler<F> {
    /// Create a sampler over a frame source
    pub fn new(source: F, config: SamplerConfig) -> Self {
        Self { source, config }
    }

    /// Aggregation mode applied to every video
    pub fn aggregation(&self) -> VideoAggregation {
        self.config.aggregation
    }

    /// `count` timestamps at the centres of equal slices of `[0, duration)`.
    ///
    /// A zero duration (stills, broken headers) yields a single frame at 0.
    pub fn uniform_timestamps(duration: Duration, count: usize) -> Vec<Duration> {
        if duration.is_zero() || count == 0 {
            return vec![Duration::ZERO];
        }
        (0..count)
            .map(|slot| duration.mul_f64((slot as f64 + 0.5) / count as f64))
            .collect()
    }

    /// Keep the `count` candidates whose thumbnail differs most from its predecessor.
    ///
    /// The first candidate is scored against its successor. Ties go to the
    /// earlier candidate. The result is in temporal order.
    pub fn select_keyframes(candidates: &[(Duration, Vec<u8>)], count: usize) -> Vec<Duration> {
        if candidates.len() <= count {
            return candidates.iter().map(|(timestamp, _)| *timestamp).collect();
        }

        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(position, (_, thumbnail))| {
                let neighbour = if position == 0 { 1 } else { position - 1 };
                (position, mean_abs_difference(thumbnail, &candidates[neighbour].1))
            })
            .collect();

        scored.sort_by(|first, second| {
            second
                .1
                .partial_cmp(&first.1)
                .unwrap_or(Ordering::Equal)
                .then(first.0.cmp(&second.0))
        });

        let mut kept: Vec<usize> = scored
            .into_iter()
            .take(count)
            .map(|(position, _)| position)
            .collect();
        kept.sort_unstable();
        kept.into_iter().map(|position| candidates[position].0).collect()
    }

    /// Choose sample timestamps for a video according to the configured policy
    ///
    /// # Errors
    /// Returns a decode error if the video cannot be opened
    pub async fn plan(&self, path: &Path) -> Result<Vec<Duration>> {
        let duration = self.source.duration(path).await?;
        let uniform = Self::uniform_timestamps(duration, self.config.frames);

        if self.config.policy == SamplingPolicy::Uniform || uniform.len() < self.config.frames {
            return Ok(uniform);
        }

        let candidate_count = self.config.frames * self.config.candidate_multiplier;
        let mut candidates = Vec::with_capacity(candidate_count);
        for timestamp in Self::uniform_timestamps(duration, candidate_count) {
            match self.source.luma_thumbnail(path, timestamp).await {
                Ok(thumbnail) => candidates.push((timestamp, thumbnail)),
                Err(error) => {
                    warn!(
                        "Keyframe scan failed for {}, using uniform sampling: {error}",
                        path.display()
                    );
                    return Ok(uniform);
                }
            }
        }
        Ok(Self::select_keyframes(&candidates, self.config.frames))
    }

    /// Decode the representative frames of a video, in temporal order.
    ///
    /// Frames that fail to decode are dropped. The stop flag is checked
    /// before each frame.
    ///
    /// # Errors
    /// Returns `Cancelled` on stop, or a decode error if the video cannot be
    /// opened or no frame decodes
    pub async fn sample(&self, path: &Path, stop: &StopFlag) -> Result<Vec<SampledFrame>> {
        let mut frames = Vec::new();
        for timestamp in self.plan(path).await? {
            stop.check()?;
            match self.source.frame_at(path, timestamp).await {
                Ok(image) => frames.push(SampledFrame { timestamp, image }),
                Err(error) => debug!("Dropping frame of {}: {error}", path.display()),
            }
        }
        if frames.is_empty() {
            return Err(Error::Decode(format!(
                "No decodable frames in {}",
                path.display()
            )));
        }
        Ok(frames)
    }

    /// Sample, embed and aggregate a video into the vectors stored for it.
    ///
    /// A stop discards the partial result.
    ///
    /// # Errors
    /// Returns `Cancelled` on stop, a decode error when no frame decodes, or
    /// the last embedding error when no frame could be embedded
    pub async fn embed_video<E: EmbeddingProvider>(
        &self,
        path: &Path,
        provider: &E,
        stop: &StopFlag,
    ) -> Result<Vec<Embedding>> {
        let frames = self.sample(path, stop).await?;
        let mut frame_vectors = Vec::with_capacity(frames.len());
        let mut last_error = None;

        for frame in &frames {
            stop.check()?;
            match provider.embed_image(&frame.image).await {
                Ok(vector) => frame_vectors.push(vector),
                Err(error) => {
                    debug!(
                        "Frame at {:?} of {} skipped: {error}",
                        frame.timestamp,
                        path.display()
                    );
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if frame_vectors.is_empty() => Err(error),
            _ => self.aggregate(&frame_vectors),
        }
    }

    /// Combine per-frame vectors according to the aggregation mode
    ///
    /// # Errors
    /// Returns a dimension error if frames disagree on dimension
    pub fn aggregate(&self, frame_vectors: &[Embedding]) -> Result<Vec<Embedding>> {
        let expected = frame_vectors.first().map_or(0, Vec::len);
        if let Some(odd) = frame_vectors.iter().find(|vector| vector.len() != expected) {
            return Err(Error::DimensionMismatch {
                expected,
                actual: odd.len(),
            });
        }

        match self.config.aggregation {
            VideoAggregation::Mean => mean(frame_vectors)
                .map(|vector| vec![vector])
                .ok_or_else(|| Error::Decode("No frame vectors to aggregate".to_owned())),
            VideoAggregation::PerFrame => Ok(frame_vectors
                .iter()
                .map(|vector| normalized(vector))
                .collect()),
        }
    }
}

/// Mean absolute difference between two luma rasters, over their common length
fn mean_abs_difference(first: &[u8], second: &[u8]) -> f32 {
    let length = first.len().min(second.len());
    if length == 0 {
        return 0.0;
    }
    let total: u64 = first
        .iter()
        .zip(second.iter())
        .map(|(left, right)| u64::from(left.abs_diff(*right)))
        .sum();
    total as f32 / length as f32
}

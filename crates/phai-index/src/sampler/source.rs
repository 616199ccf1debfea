use std::future::Future;
use std::path::Path;
use std::time::Duration;

use phai_core::Result;

use crate::embedding::ImageData;

/// Side length of the grayscale thumbnails used for change detection
pub const THUMBNAIL_SIDE: usize = 32;

/// Trait for decoding frames out of a video file
pub trait FrameSource: Send + Sync {
    /// Total duration of the video
    ///
    /// # Errors
    /// Returns a decode error if the container cannot be opened or has no duration
    fn duration(&self, path: &Path) -> impl Future<Output = Result<Duration>> + Send;

    /// Decode the frame nearest to `timestamp` as an encoded image
    ///
    /// # Errors
    /// Returns a decode error if no frame can be produced at that position
    fn frame_at(
        &self,
        path: &Path,
        timestamp: Duration,
    ) -> impl Future<Output = Result<ImageData>> + Send;

    /// Decode a small grayscale raster (`THUMBNAIL_SIDE` squared bytes) at `timestamp`
    ///
    /// # Errors
    /// Returns a decode error if seeking or decoding fails
    fn luma_thumbnail(
        &self,
        path: &Path,
        timestamp: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

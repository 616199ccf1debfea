//! Directory walking and extension-based media classification.

use phai_core::MediaKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Extensions routed to the image path (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "heic", "heif", "webp",
];

/// Extensions routed to the video path (lowercase)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "wmv", "flv", "webm", "m4v"];

/// A file found under the root that the indexer knows how to embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Routing decided by the extension
    pub kind: MediaKind,
}

/// Classify a path by its extension, case-insensitively.
///
/// Returns `None` for unsupported files, which are skipped silently.
pub fn classify(path: &Path) -> Option<MediaKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Walk `root` recursively and collect supported files in file-name order
pub fn collect_candidates(root: &Path, follow_links: bool) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!("Skipping unreadable entry under {}: {error}", root.display());
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(kind) = classify(entry.path()) {
            candidates.push(Candidate {
                path: entry.into_path(),
                kind,
            });
        }
    }

    candidates
}

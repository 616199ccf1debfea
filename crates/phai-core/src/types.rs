use bincode::{Decode, Encode};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{Error, Result};

/// A single embedding vector
pub type Embedding = Vec<f32>;

/// Kind of media stored for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image, stored with exactly one embedding
    Image,
    /// Video, stored with one or more embeddings
    Video,
}

impl MediaKind {
    /// Lowercase label used in logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cheap change detector for a file: byte size plus modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Fingerprint {
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl Fingerprint {
    /// Build a fingerprint from filesystem metadata
    ///
    /// # Errors
    /// Returns an error if the platform does not report modification times
    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified()?,
        })
    }
}

/// Identity of an indexed item: canonical absolute path plus its fingerprint.
///
/// The path is the unique key inside the index; the fingerprint decides
/// whether a stored record is still current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct MediaIdentity {
    /// Canonical absolute path
    pub path: PathBuf,
    /// Fingerprint at the time of indexing
    pub fingerprint: Fingerprint,
}

/// One indexed photo or video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MediaItem {
    /// Unique identity within the index
    pub identity: MediaIdentity,
    /// Image or video
    pub kind: MediaKind,
    /// Stored vectors (one for images, one or more for videos)
    pub embeddings: Vec<Embedding>,
    /// Best-effort capture timestamp carried as metadata
    pub created_at: Option<SystemTime>,
}

impl MediaItem {
    /// Create a new media item
    pub fn new(
        identity: MediaIdentity,
        kind: MediaKind,
        embeddings: Vec<Embedding>,
        created_at: Option<SystemTime>,
    ) -> Self {
        Self {
            identity,
            kind,
            embeddings,
            created_at,
        }
    }

    /// Path used as the unique key
    pub fn path(&self) -> &Path {
        &self.identity.path
    }

    /// Dimension shared by every stored vector
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }

    /// Check the shape invariants of the item before it is stored
    ///
    /// # Errors
    /// Returns an error if the vector count does not match the media kind,
    /// a vector is empty, or the vectors disagree on dimension
    pub fn validate(&self) -> Result<()> {
        let count = self.embeddings.len();
        match self.kind {
            MediaKind::Image if count != 1 => {
                return Err(Error::Provider(format!(
                    "Image {} must carry exactly one embedding, got {count}",
                    self.identity.path.display()
                )));
            }
            MediaKind::Video if count == 0 => {
                return Err(Error::Provider(format!(
                    "Video {} carries no embeddings",
                    self.identity.path.display()
                )));
            }
            _ => {}
        }

        let Some(expected) = self.dimension() else {
            return Ok(());
        };
        if expected == 0 {
            return Err(Error::Provider(format!(
                "Empty embedding for {}",
                self.identity.path.display()
            )));
        }
        for embedding in &self.embeddings {
            if embedding.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        Ok(())
    }
}

//! Bundle manifest: format version plus summary metadata for the record log.

use phai_core::{Error, Result, VideoAggregation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current on-disk format
pub const FORMAT_VERSION: u32 = 1;

/// Manifest file name inside the bundle directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Summary written next to the record log on every persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// On-disk format version
    pub version: u32,
    /// Vector dimension shared by all records
    pub dimension: Option<usize>,
    /// Aggregation mode used for stored videos
    pub aggregation: Option<VideoAggregation>,
    /// Live records at the time of writing
    pub records: usize,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            dimension: None,
            aggregation: None,
            records: 0,
        }
    }
}

impl Manifest {
    /// Load the manifest from a bundle directory; `None` for a fresh bundle
    ///
    /// # Errors
    /// Returns `StoreCorrupt` if the manifest is unreadable or from an unknown format
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read(&path)?;
        let manifest: Self = serde_json::from_slice(&content).map_err(|error| {
            Error::StoreCorrupt(format!("Unreadable manifest {}: {error}", path.display()))
        })?;

        if manifest.version != FORMAT_VERSION {
            return Err(Error::StoreCorrupt(format!(
                "Unsupported index format version {} (expected {FORMAT_VERSION})",
                manifest.version
            )));
        }
        Ok(Some(manifest))
    }

    /// Write the manifest via temp file and rename
    ///
    /// # Errors
    /// Returns an error if the manifest cannot be written
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        let temp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
        let content = serde_json::to_vec_pretty(self)?;

        fs::write(&temp_path, content)?;
        fs::File::open(&temp_path)?.sync_all()?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

//! Append-only record log backing the index store.
//!
//! Frame layout (all little-endian): `u32` payload length, `u32` CRC-32C of
//! the length bytes, `u32` CRC-32C of the payload, bincode payload.
//!
//! The length carries its own checksum, so a frame whose verified length runs
//! past the end of the file can only be the unfinished last append. That frame
//! and a partial header at the very end are truncated away on open; any other
//! damage is reported as corruption and nothing is truncated.

use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use crc32c::crc32c;
use phai_core::{Error, MediaItem, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Bytes before each payload
const HEADER_LEN: usize = 12;

/// One entry of the log; replay is last-writer-wins per path
#[derive(Debug, Clone, Encode, Decode)]
pub enum LogRecord {
    /// Insert or replace the record for `item.identity.path`
    Put(MediaItem),
    /// Drop the record stored under this path
    Remove(PathBuf),
}

/// Result of reading a log from disk
#[derive(Debug, Default)]
pub struct Replay {
    /// Complete records in file order
    pub records: Vec<LogRecord>,
    /// Length of the prefix made of complete frames
    pub valid_len: u64,
    /// Whether trailing bytes of an unfinished frame were found
    pub torn: bool,
}

/// Writer handle over the log file
pub struct RecordLog {
    path: PathBuf,
    file: File,
    len: u64,
    sync_writes: bool,
}

impl RecordLog {
    /// Open (creating if needed) the log, replaying its complete frames.
    ///
    /// # Errors
    /// Returns `StoreCorrupt` for damaged frames and I/O errors otherwise
    pub fn open(path: &Path, sync_writes: bool) -> Result<(Self, Vec<LogRecord>)> {
        let replay = if path.exists() {
            Self::replay(path)?
        } else {
            Replay::default()
        };

        if replay.torn {
            warn!(
                "Discarding unfinished record at the end of {} (offset {})",
                path.display(),
                replay.valid_len
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(
            "Opened record log {} with {} frames",
            path.display(),
            replay.records.len()
        );
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len: replay.valid_len,
                sync_writes,
            },
            replay.records,
        ))
    }

    /// Read every complete frame of a log file
    ///
    /// # Errors
    /// Returns `StoreCorrupt` if a frame header fails its checksum, or a
    /// complete frame fails its checksum or decode
    pub fn replay(path: &Path) -> Result<Replay> {
        let data = fs::read(path)?;
        let mut replay = Replay::default();
        let mut offset = 0usize;

        while offset < data.len() {
            let remaining = data.len() - offset;
            if remaining < HEADER_LEN {
                replay.torn = true;
                break;
            }

            let length_bytes = &data[offset..offset + 4];
            if crc32c(length_bytes) != read_u32(&data[offset + 4..offset + 8]) {
                return Err(Error::StoreCorrupt(format!(
                    "Damaged frame header in {} at offset {offset}",
                    path.display()
                )));
            }
            let payload_len = read_u32(length_bytes) as usize;
            let expected = read_u32(&data[offset + 8..offset + HEADER_LEN]);

            if remaining - HEADER_LEN < payload_len {
                replay.torn = true;
                break;
            }

            let payload = &data[offset + HEADER_LEN..offset + HEADER_LEN + payload_len];
            if crc32c(payload) != expected {
                return Err(Error::StoreCorrupt(format!(
                    "Checksum mismatch in {} at offset {offset}",
                    path.display()
                )));
            }

            let (record, _) = decode_from_slice(payload, bincode_config()).map_err(|error| {
                Error::StoreCorrupt(format!(
                    "Undecodable record in {} at offset {offset}: {error}",
                    path.display()
                ))
            })?;
            replay.records.push(record);
            offset += HEADER_LEN + payload_len;
        }

        replay.valid_len = offset as u64;
        Ok(replay)
    }

    /// Encode a record as one self-checking frame
    ///
    /// # Errors
    /// Returns an error if the record cannot be serialized
    pub fn encode_frame(record: &LogRecord) -> Result<Vec<u8>> {
        let payload = encode_to_vec(record, bincode_config())
            .map_err(|error| Error::Other(format!("Failed to serialize record: {error}")))?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| Error::Other(format!("Record too large: {} bytes", payload.len())))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        let length_bytes = payload_len.to_le_bytes();
        frame.extend_from_slice(&length_bytes);
        frame.extend_from_slice(&crc32c(&length_bytes).to_le_bytes());
        frame.extend_from_slice(&crc32c(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Append one record.
    ///
    /// On a failed write the file is cut back to its previous length so the
    /// log never keeps a half-written frame in front of later appends.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be written or flushed
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let frame = Self::encode_frame(record)?;

        let written = self
            .file
            .write_all(&frame)
            .and_then(|()| self.file.flush())
            .and_then(|()| {
                if self.sync_writes {
                    self.file.sync_data()
                } else {
                    Ok(())
                }
            });

        if let Err(error) = written {
            if let Err(truncate_error) = self.file.set_len(self.len) {
                warn!(
                    "Failed to roll back partial write to {}: {truncate_error}",
                    self.path.display()
                );
            }
            return Err(Error::Io(error));
        }

        self.len += frame.len() as u64;
        Ok(())
    }

    /// Atomically replace the log with exactly `records`.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the log.
    ///
    /// # Errors
    /// Returns an error if the temp file cannot be written or renamed
    pub fn rewrite<'record>(
        &mut self,
        records: impl Iterator<Item = &'record MediaItem>,
    ) -> Result<usize> {
        let temp_path = self.path.with_extension("log.tmp");
        let mut count = 0usize;
        {
            let mut temp = File::create(&temp_path)?;
            let mut buffer = Vec::new();
            for item in records {
                buffer.extend(Self::encode_frame(&LogRecord::Put(item.clone()))?);
                count += 1;
            }
            temp.write_all(&buffer)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = self.file.metadata()?.len();
        Ok(count)
    }

    /// Current length of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the log holds no frames
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buffer = [0u8; 4];
    buffer.copy_from_slice(bytes);
    u32::from_le_bytes(buffer)
}

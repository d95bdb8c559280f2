//! Append-only JSON-lines backend.
//!
//! Each upsert appends one envelope line; nothing is ever rewritten. The
//! current record of a device is the last line carrying its id. Lines that
//! fail to parse (torn writes, manual edits) are skipped on read. A torn
//! tail is terminated before the next append so it cannot swallow the new
//! line.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use telebridge_core::Envelope;

use crate::{Result, StateStore};

/// File-backed append-only store.
pub struct LogStore {
    path: PathBuf,
    writer: Mutex<File>,
}

impl LogStore {
    /// Open `path` for appending, creating it and its directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        if ends_mid_line(&mut file)? {
            tracing::warn!(path = %path.display(), "Log ends in a partial line, terminating it");
            file.write_all(b"\n")?;
            file.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(file),
        })
    }

    /// Get the storage path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fold the log into the latest envelope per device, in append order.
    fn replay(&self) -> Result<HashMap<String, Envelope>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Log file not found, returning no devices");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut latest = HashMap::new();
        let mut skipped = 0usize;
        for line in content.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Envelope>(line) {
                Ok(envelope) if !envelope.device_id.is_empty() => {
                    latest.insert(envelope.device_id.clone(), envelope);
                }
                Ok(_) => skipped += 1,
                Err(e) => {
                    skipped += 1;
                    tracing::debug!("Skipping corrupted log line: {}", e);
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(path = %self.path.display(), skipped, "Skipped unreadable log lines");
        }
        Ok(latest)
    }
}

/// True when the file is non-empty and its last byte is not a newline.
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl StateStore for LogStore {
    async fn upsert(&self, envelope: Envelope) -> Result<()> {
        let mut line = serde_json::to_vec(&envelope)?;
        line.push(b'\n');

        // One write call per line keeps O_APPEND writes from interleaving.
        let mut writer = self.writer.lock();
        if ends_mid_line(&mut *writer)? {
            line.insert(0, b'\n');
        }
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<Envelope>> {
        Ok(self.replay()?.remove(device_id))
    }

    async fn list(&self) -> Result<Vec<Envelope>> {
        let mut envelopes: Vec<Envelope> = self.replay()?.into_values().collect();
        envelopes.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(envelopes)
    }

    fn backend_name(&self) -> &'static str {
        "log"
    }
}

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// A confirmed, fully synthesized output. Never changed once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRecord {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub wav_path: PathBuf,
    pub mp3_path: PathBuf,
    pub wav_url: String,
    pub mp3_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Append-only list of [`AudioRecord`]s kept in one JSON file.
///
/// Appends are serialized within the process and replace the file through a
/// temporary sibling plus rename, so readers never see a half-written list.
/// Separate processes sharing one file still need external locking.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in append order.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is also
    /// reported as empty, with a warning.
    pub fn load_all(&self) -> Vec<AudioRecord> {
        match self.read() {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "Treating record store {} as empty: {e}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    pub fn append(&self, record: AudioRecord) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut records = match self.read() {
            Ok(records) => records,
            Err(TtsError::Json(e)) => {
                self.quarantine(&e)?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let id = record.id.clone();
        records.push(record);
        self.write(&records)?;

        log::info!(
            "Stored audio record {id} ({} total) in {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    fn read(&self) -> Result<Vec<AudioRecord>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        // Bytes that are not UTF-8 surface as a JSON error like any other corruption.
        Ok(serde_json::from_slice(&content)?)
    }

    fn write(&self, records: &[AudioRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = sibling(&self.path, "tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Move a corrupt file out of the way so the next write cannot destroy it.
    fn quarantine(&self, cause: &serde_json::Error) -> Result<()> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let target = sibling(&self.path, &format!("corrupt-{stamp}"));
        log::warn!(
            "Record store {} is corrupt ({cause}); moving it to {}",
            self.path.display(),
            target.display()
        );
        std::fs::rename(&self.path, &target)?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

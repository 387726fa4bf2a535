//! Durable replay ledger of accepted transaction signatures.
//!
//! The check-and-mark sequence runs under one async lock, and the backing
//! file is rewritten while that lock is held, so two concurrent
//! verifications of the same signature cannot both observe it as unused.

use crate::amount::AtomicAmount;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default file name of the persisted ledger.
pub const DEFAULT_REPLAY_FILE: &str = ".x402test-signatures.json";

/// One accepted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    /// Transaction signature.
    pub signature: String,
    /// When the signature was first accepted, milliseconds since the epoch.
    pub used_at: i64,
    /// Route the payment unlocked.
    pub endpoint: String,
    /// Amount observed on the ledger.
    pub amount: AtomicAmount,
}

impl ReplayRecord {
    /// `used_at` as a UTC timestamp.
    #[must_use]
    pub fn used_at_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.used_at)
    }
}

/// Snapshot of the ledger contents.
#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    /// Number of recorded signatures.
    pub total: usize,
    /// Records in insertion order.
    pub records: Vec<ReplayRecord>,
}

#[derive(Default)]
struct Records {
    ordered: Vec<ReplayRecord>,
    index: HashMap<String, usize>,
}

impl Records {
    fn from_vec(records: Vec<ReplayRecord>) -> Self {
        let mut this = Self::default();
        for record in records {
            this.insert(record);
        }
        this
    }

    fn insert(&mut self, record: ReplayRecord) -> bool {
        if self.index.contains_key(&record.signature) {
            return false;
        }
        self.index
            .insert(record.signature.clone(), self.ordered.len());
        self.ordered.push(record);
        true
    }

    fn get(&self, signature: &str) -> Option<&ReplayRecord> {
        self.index.get(signature).and_then(|&i| self.ordered.get(i))
    }
}

/// Set of signatures that have already unlocked a resource.
pub struct ReplayLedger {
    path: Option<PathBuf>,
    records: Mutex<Records>,
}

impl ReplayLedger {
    /// A ledger that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Records::default()),
        }
    }

    /// Load the ledger persisted at `path`.
    ///
    /// A missing file yields an empty ledger. A corrupt file is moved aside
    /// to `<file>.corrupt` so its records can be recovered by hand, and the
    /// ledger starts empty. An unreadable file is logged and also yields an
    /// empty ledger.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<ReplayRecord>>(&bytes) {
                Ok(records) => {
                    debug!(
                        "Loaded {} used signatures from {}",
                        records.len(),
                        path.display()
                    );
                    Records::from_vec(records)
                }
                Err(e) => {
                    let aside = corrupt_path(&path);
                    match tokio::fs::rename(&path, &aside).await {
                        Ok(()) => warn!(
                            "Corrupt replay ledger {} moved to {}: {e}",
                            path.display(),
                            aside.display()
                        ),
                        Err(rename) => warn!(
                            "Corrupt replay ledger {} could not be moved aside ({rename}): {e}",
                            path.display()
                        ),
                    }
                    Records::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::default(),
            Err(e) => {
                warn!("Cannot read replay ledger {}: {e}", path.display());
                Records::default()
            }
        };

        Self {
            path: Some(path),
            records: Mutex::new(records),
        }
    }

    /// Backing file, if persisted.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `signature` has been accepted before.
    pub async fn has(&self, signature: &str) -> bool {
        self.records.lock().await.index.contains_key(signature)
    }

    /// Record `signature` as used unless it already is.
    ///
    /// Returns `true` if this call inserted the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted. The record is
    /// kept in memory, so the signature stays blocked in this process, but
    /// the payment must not be honoured.
    pub async fn mark_used(
        &self,
        signature: &str,
        endpoint: &str,
        amount: AtomicAmount,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        let inserted = records.insert(ReplayRecord {
            signature: signature.to_string(),
            used_at: chrono::Utc::now().timestamp_millis(),
            endpoint: endpoint.to_string(),
            amount,
        });
        if !inserted {
            return Ok(false);
        }

        self.persist(&records.ordered).await?;
        debug!("Marked signature used: {signature} for {endpoint} with amount {amount}");
        Ok(true)
    }

    /// The record for `signature`, if any.
    pub async fn get(&self, signature: &str) -> Option<ReplayRecord> {
        self.records.lock().await.get(signature).cloned()
    }

    /// All records.
    pub async fn stats(&self) -> ReplayStats {
        let records = self.records.lock().await;
        ReplayStats {
            total: records.ordered.len(),
            records: records.ordered.clone(),
        }
    }

    /// Forget every signature and delete the backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn reset(&self) -> Result<()> {
        let mut records = self.records.lock().await;
        *records = Records::default();
        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!("Cleared replay ledger {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Write the current contents to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn flush(&self) -> Result<()> {
        let records = self.records.lock().await;
        self.persist(&records.ordered).await
    }

    async fn persist(&self, records: &[ReplayRecord]) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let json =
            serde_json::to_vec_pretty(records).map_err(|e| Error::Serialization(e.to_string()))?;

        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

/// Replace `path` with `contents` via a temporary file in the same
/// directory, so readers never observe a half-written ledger.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

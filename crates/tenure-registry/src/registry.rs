//! The shared member registry.

use crate::error::{Error, Result};
use crate::record::{MemberId, MemberRecord};
use crate::store;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Member registry backed by a JSON file.
///
/// All mutation goes through the registry. Closures passed to
/// [`update`](Self::update) and [`upsert`](Self::upsert) run under the write
/// lock and are synchronous, so a record's read-modify-write can never
/// interleave with another writer's and no lock outlives a suspension point.
pub struct Registry {
    path: PathBuf,
    records: RwLock<BTreeMap<MemberId, MemberRecord>>,
    /// Bumped under the write lock on every mutation.
    revision: AtomicU64,
    /// Revision last written to disk.
    persisted: AtomicU64,
    flush_lock: Mutex<()>,
}

impl Registry {
    /// Open or create the registry at `path`.
    ///
    /// Fails only when the containing directory cannot be created or the file
    /// cannot be read at all. Undecodable contents are quarantined and the
    /// registry starts empty.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let records = match store::load(&path).await {
            Ok(records) => records,
            Err(Error::Corrupt(reason)) => {
                let moved = store::quarantine(&path).await?;
                warn!(
                    path = %path.display(),
                    moved_to = %moved.display(),
                    %reason,
                    "Member store unreadable, starting empty"
                );
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        info!(path = %path.display(), members = records.len(), "Registry loaded");

        Ok(Self {
            path,
            records: RwLock::new(records),
            revision: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of one record.
    pub async fn get(&self, id: &MemberId) -> Option<MemberRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Insert or replace a record.
    pub async fn put(&self, record: MemberRecord) {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
        self.touch();
    }

    /// Mutate an existing record. Returns `None` when the id is unknown.
    pub async fn update<F, R>(&self, id: &MemberId, f: F) -> Option<R>
    where
        F: FnOnce(&mut MemberRecord) -> R,
    {
        let mut records = self.records.write().await;
        let record = records.get_mut(id)?;
        let out = f(record);
        self.touch();
        Some(out)
    }

    /// Mutate a record, creating an empty one first if the id is unknown.
    pub async fn upsert<F, R>(&self, id: &MemberId, f: F) -> R
    where
        F: FnOnce(&mut MemberRecord) -> R,
    {
        let mut records = self.records.write().await;
        let record = records
            .entry(id.clone())
            .or_insert_with(|| MemberRecord::new(id.clone()));
        let out = f(record);
        self.touch();
        out
    }

    /// Mark a member as gone. The record is retained.
    pub async fn mark_departed(&self, id: &MemberId, at: DateTime<Utc>) -> bool {
        self.update(id, |record| {
            if record.departed_at.is_none() {
                record.departed_at = Some(at);
            }
        })
        .await
        .is_some()
    }

    /// Visit every record under the read lock.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&MemberRecord),
    {
        for record in self.records.read().await.values() {
            f(record);
        }
    }

    /// All member ids, in key order.
    pub async fn ids(&self) -> Vec<MemberId> {
        self.records.read().await.keys().cloned().collect()
    }

    /// Snapshot of every record.
    pub async fn load_all(&self) -> Vec<MemberRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Whether there are mutations not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.revision.load(Ordering::Acquire) != self.persisted.load(Ordering::Acquire)
    }

    /// Write the registry to disk if anything changed since the last flush.
    ///
    /// The map is encoded under the read lock; the file is written after the
    /// lock is released. Concurrent flushes are serialized.
    pub async fn flush(&self) -> Result<bool> {
        let _guard = self.flush_lock.lock().await;

        let (revision, bytes) = {
            let records = self.records.read().await;
            let revision = self.revision.load(Ordering::Acquire);
            if revision == self.persisted.load(Ordering::Acquire) {
                return Ok(false);
            }
            (revision, store::encode(&records)?)
        };

        store::save(&self.path, &bytes).await?;
        self.persisted.store(revision, Ordering::Release);
        debug!(revision, path = %self.path.display(), "Registry flushed");
        Ok(true)
    }

    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

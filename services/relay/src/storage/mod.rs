//! Durable event store: index in RAM, one JSON body file per event, with
//! per-entry TTL, tombstone deletion, periodic compaction, and chunked
//! index persistence that survives restart.
//!
//! Layout under the storage root:
//! - `events/<hh>/<id-hex-prefix>_<file-index>.bin` — event bodies, one
//!   subdirectory per first id byte;
//! - `nostr_idx/` — key/value namespace holding `count`, `next_idx`, and
//!   `idx_<n>` chunks of packed index entries.

pub mod index;
mod kv;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nostr_proto::{Event, EventId, Filter};
use thiserror::Error;
use tracing::{debug, info, warn};

use index::{IndexEntry, FLAG_DELETED, PACKED_SIZE};
use kv::KvStore;

/// Index capacity; saves beyond this fail with [`StorageError::Full`].
pub const DEFAULT_CAPACITY: usize = 5000;

/// Hard cap on events returned by one query.
pub const MAX_QUERY_LIMIT: usize = 500;

/// Default retention: 21 days.
pub const DEFAULT_TTL_SECS: u32 = 1_814_400;

const KV_NAMESPACE: &str = "nostr_idx";
const EVENTS_DIR: &str = "events";
const CHUNK_ENTRIES: usize = 50;
const FLUSH_EVERY_SAVES: usize = 10;
const CLEANUP_TICKS: u32 = 60;
const COMPACT_EVERY_CYCLES: u32 = 10;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("event store full")]
    Full,

    #[error("event already stored")]
    Duplicate,

    #[error("event not found")]
    NotFound,

    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding both the event files and the index namespace.
    pub root: PathBuf,
    /// TTL applied to every saved event; 0 disables time-based expiry.
    pub default_ttl_secs: u32,
    pub capacity: usize,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Live-event statistics; tombstoned and expired entries are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub total_events: u32,
    pub oldest_event_ts: u32,
    pub newest_event_ts: u32,
}

struct Inner {
    index: Vec<IndexEntry>,
    next_file_index: u32,
    saves_since_flush: usize,
    kv: KvStore,
}

pub struct Storage {
    root: PathBuf,
    default_ttl_secs: u32,
    capacity: usize,
    inner: Mutex<Inner>,
    cleanup_stop: AtomicBool,
}

impl Storage {
    /// Mount the store, loading any persisted index. A corrupt or
    /// inconsistent index starts fresh with a warning rather than failing
    /// the mount.
    pub fn mount(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(config.root.join(EVENTS_DIR))?;
        let kv = KvStore::open(config.root.join(KV_NAMESPACE))?;

        let (index, next_file_index) = match load_index(&kv, config.capacity) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "failed to load persisted index, starting fresh");
                (Vec::new(), 0)
            }
        };

        info!(
            events = index.iter().filter(|e| !e.is_deleted()).count(),
            next_file_index,
            root = %config.root.display(),
            "storage mounted"
        );

        Ok(Self {
            root: config.root,
            default_ttl_secs: config.default_ttl_secs,
            capacity: config.capacity,
            inner: Mutex::new(Inner {
                index,
                next_file_index,
                saves_since_flush: 0,
                kv,
            }),
            cleanup_stop: AtomicBool::new(false),
        })
    }

    /// Persist a non-ephemeral event. Fails with [`StorageError::Duplicate`]
    /// when a live entry already carries the id, [`StorageError::Full`] at
    /// capacity.
    pub fn save(&self, event: &Event) -> Result<(), StorageError> {
        self.save_at(event, now_secs())
    }

    fn save_at(&self, event: &Event, now: u32) -> Result<(), StorageError> {
        let mut inner = self.lock();

        if find_live(&inner.index, &event.id).is_some() {
            return Err(StorageError::Duplicate);
        }
        if inner.index.len() >= self.capacity {
            warn!("storage full");
            return Err(StorageError::Full);
        }

        let file_index = inner.next_file_index;
        let json = serde_json::to_vec(event)?;
        let path = self.event_path(&event.id, file_index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::write(&path, &json) {
            // Half-written bodies must not survive next to a missing entry.
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        let mut expires_at = if self.default_ttl_secs > 0 {
            now.saturating_add(self.default_ttl_secs)
        } else {
            0
        };
        if let Some(tag_expiry) = event.expiration().and_then(|t| u32::try_from(t).ok()) {
            if tag_expiry > 0 && (expires_at == 0 || tag_expiry < expires_at) {
                expires_at = tag_expiry;
            }
        }

        inner.index.push(IndexEntry {
            event_id: event.id.0,
            created_at: event.created_at as u32,
            expires_at,
            kind: event.kind,
            pubkey_prefix: event.pubkey.0[..4].try_into().unwrap(),
            file_index,
            flags: 0,
        });
        inner.next_file_index += 1;
        inner.saves_since_flush += 1;

        if inner.saves_since_flush >= FLUSH_EVERY_SAVES {
            flush_locked(&mut inner);
        }

        debug!(kind = event.kind, expires_at, "event stored");
        Ok(())
    }

    /// Load one event by id; tombstoned and missing ids read as `None`.
    pub fn get(&self, id: &EventId) -> Option<Event> {
        let inner = self.lock();
        let entry = find_live(&inner.index, id)?;
        self.load_event(&entry)
    }

    pub fn exists(&self, id: &EventId) -> bool {
        let inner = self.lock();
        find_live(&inner.index, id).is_some()
    }

    /// Filter query over the index, newest insertion first. Entries found
    /// expired along the way are tombstoned lazily. `limit` is clamped to
    /// [`MAX_QUERY_LIMIT`].
    pub fn query(&self, filter: &Filter, limit: usize) -> Vec<Event> {
        self.query_at(filter, limit, now_secs())
    }

    fn query_at(&self, filter: &Filter, limit: usize, now: u32) -> Vec<Event> {
        let limit = limit.min(MAX_QUERY_LIMIT);
        let mut results = Vec::new();
        let mut inner = self.lock();
        let root = self.root.clone();

        for i in (0..inner.index.len()).rev() {
            if results.len() >= limit {
                break;
            }
            let entry = inner.index[i];
            if entry.is_deleted() {
                continue;
            }
            if entry.is_expired(now) {
                tombstone(&root, &mut inner.index[i]);
                continue;
            }
            if !entry.passes_prefilter(filter) {
                continue;
            }
            if let Some(event) = self.load_event(&entry) {
                if filter.matches(&event) {
                    results.push(event);
                }
            }
        }

        debug!(returned = results.len(), "query complete");
        results
    }

    /// Tombstone an event and unlink its body file.
    pub fn delete(&self, id: &EventId) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let slot = inner
            .index
            .iter()
            .position(|e| !e.is_deleted() && e.event_id == id.0)
            .ok_or(StorageError::NotFound)?;
        tombstone(&self.root, &mut inner.index[slot]);
        flush_locked(&mut inner);
        Ok(())
    }

    /// Sweep the whole index, tombstoning expired entries. Returns the
    /// number purged.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(now_secs())
    }

    fn purge_expired_at(&self, now: u32) -> usize {
        let mut inner = self.lock();
        let mut purged = 0;
        for i in 0..inner.index.len() {
            let entry = inner.index[i];
            if !entry.is_deleted() && entry.is_expired(now) {
                tombstone(&self.root, &mut inner.index[i]);
                purged += 1;
            }
        }
        if purged > 0 {
            flush_locked(&mut inner);
            info!(purged, "purged expired events");
        }
        purged
    }

    /// Drop tombstones, preserving the relative order of survivors.
    /// Returns the number of slots reclaimed.
    pub fn compact(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.index.len();
        inner.index.retain(|e| !e.is_deleted());
        let compacted = before - inner.index.len();
        if compacted > 0 {
            flush_locked(&mut inner);
            info!(compacted, remaining = inner.index.len(), "compacted index");
        }
        compacted
    }

    pub fn stats(&self) -> StorageStats {
        self.stats_at(now_secs())
    }

    fn stats_at(&self, now: u32) -> StorageStats {
        let inner = self.lock();
        let mut stats = StorageStats::default();
        let mut oldest = u32::MAX;
        for entry in &inner.index {
            if entry.is_deleted() || entry.is_expired(now) {
                continue;
            }
            stats.total_events += 1;
            oldest = oldest.min(entry.created_at);
            stats.newest_event_ts = stats.newest_event_ts.max(entry.created_at);
        }
        if stats.total_events > 0 {
            stats.oldest_event_ts = oldest;
        }
        stats
    }

    /// Force an index flush, surfacing any persistence error.
    pub fn flush(&self) -> Result<(), StorageError> {
        let mut inner = self.lock();
        persist_index(&mut inner)
    }

    /// Signal the cleanup loop to exit (observed within one second) and
    /// write a final index snapshot.
    pub fn shutdown(&self) {
        self.cleanup_stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.flush() {
            warn!(error = %e, "final index flush failed");
        }
    }

    /// Background maintenance: purge expired events every minute, compact
    /// the index every ten minutes, honor the stop flag within a second.
    pub async fn run_cleanup(self: Arc<Self>) {
        let mut cycles_since_compact = 0;
        loop {
            for _ in 0..CLEANUP_TICKS {
                if self.cleanup_stop.load(Ordering::Relaxed) {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            if self.cleanup_stop.load(Ordering::Relaxed) {
                return;
            }

            self.purge_expired();
            cycles_since_compact += 1;
            if cycles_since_compact >= COMPACT_EVERY_CYCLES {
                self.compact();
                cycles_since_compact = 0;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn event_path(&self, id: &EventId, file_index: u32) -> PathBuf {
        event_path(&self.root, &id.0, file_index)
    }

    fn load_event(&self, entry: &IndexEntry) -> Option<Event> {
        let path = event_path(&self.root, &entry.event_id, entry.file_index);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "event body unreadable");
                return None;
            }
        };
        match serde_json::from_slice::<Event>(&bytes) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "event body corrupt");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn event_path(root: &Path, event_id: &[u8; 32], file_index: u32) -> PathBuf {
    root.join(EVENTS_DIR)
        .join(format!("{:02x}", event_id[0]))
        .join(format!(
            "{}_{file_index:08x}.bin",
            hex::encode(&event_id[..16])
        ))
}

fn find_live<'a>(index: &'a [IndexEntry], id: &EventId) -> Option<&'a IndexEntry> {
    index
        .iter()
        .find(|e| !e.is_deleted() && e.event_id == id.0)
}

fn tombstone(root: &Path, entry: &mut IndexEntry) {
    let path = event_path(root, &entry.event_id, entry.file_index);
    if let Err(e) = fs::remove_file(&path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to unlink event body");
        }
    }
    entry.flags |= FLAG_DELETED;
}

/// Flush inside an operation: persistence errors are logged, the in-memory
/// operation stands.
fn flush_locked(inner: &mut Inner) {
    if let Err(e) = persist_index(inner) {
        warn!(error = %e, "index flush failed; previous snapshot remains committed");
    }
}

fn persist_index(inner: &mut Inner) -> Result<(), StorageError> {
    let count = inner.index.len();
    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("count".to_owned(), (count as u16).to_le_bytes().to_vec()),
        (
            "next_idx".to_owned(),
            inner.next_file_index.to_le_bytes().to_vec(),
        ),
    ];

    let num_chunks = count.div_ceil(CHUNK_ENTRIES);
    for chunk in 0..num_chunks {
        let start = chunk * CHUNK_ENTRIES;
        let end = (start + CHUNK_ENTRIES).min(count);
        let mut blob = Vec::with_capacity((end - start) * PACKED_SIZE);
        for entry in &inner.index[start..end] {
            blob.extend_from_slice(&entry.encode());
        }
        entries.push((format!("idx_{chunk}"), blob));
    }

    inner.kv.commit(&entries)?;

    // Erase stale chunks beyond the live set so a shrunk index cannot
    // resurrect old entries on the next mount.
    inner.kv.remove_where(|key| {
        key.strip_prefix("idx_")
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| n >= num_chunks)
    })?;

    inner.saves_since_flush = 0;
    Ok(())
}

fn load_index(kv: &KvStore, capacity: usize) -> Result<(Vec<IndexEntry>, u32), StorageError> {
    let Some(count_bytes) = kv.get("count")? else {
        info!("no persisted index found");
        return Ok((Vec::new(), 0));
    };
    let count = count_bytes
        .try_into()
        .map(u16::from_le_bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad count record"))?
        as usize;
    if count > capacity {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "count exceeds capacity").into());
    }

    let next_file_index = kv
        .get("next_idx")?
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad next_idx record"))?;

    let mut index = Vec::with_capacity(count);
    let num_chunks = count.div_ceil(CHUNK_ENTRIES);
    for chunk in 0..num_chunks {
        let blob = kv.get(&format!("idx_{chunk}"))?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "missing index chunk")
        })?;
        let expected = (count - chunk * CHUNK_ENTRIES).min(CHUNK_ENTRIES) * PACKED_SIZE;
        if blob.len() != expected {
            return Err(
                io::Error::new(io::ErrorKind::InvalidData, "index chunk size mismatch").into(),
            );
        }
        for raw in blob.chunks_exact(PACKED_SIZE) {
            index.push(IndexEntry::decode(raw.try_into().unwrap()));
        }
    }

    info!(entries = index.len(), "loaded persisted index");
    Ok((index, next_file_index))
}

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

//! Lightweight global metrics for ZzzFS.
//!
//! Thread-safe atomic counters per subsystem:
//! - Namespace (datasets, renames)
//! - Snapshots / rollback / clone / promote
//! - Send / Receive
//! - History
//! - Copy engine (bytes copied by full-copy snapshots and clones)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Namespace -----
static DATASETS_CREATED: AtomicU64 = AtomicU64::new(0);
static DATASETS_DESTROYED: AtomicU64 = AtomicU64::new(0);
static RENAMES: AtomicU64 = AtomicU64::new(0);

// ----- Snapshots -----
static SNAPSHOTS_CREATED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_DESTROYED: AtomicU64 = AtomicU64::new(0);
static ROLLBACKS: AtomicU64 = AtomicU64::new(0);
static CLONES_CREATED: AtomicU64 = AtomicU64::new(0);
static PROMOTES: AtomicU64 = AtomicU64::new(0);

// ----- Send / Receive -----
static SEND_ENTRIES: AtomicU64 = AtomicU64::new(0);
static SEND_BYTES: AtomicU64 = AtomicU64::new(0);
static RECV_ENTRIES: AtomicU64 = AtomicU64::new(0);
static RECV_BYTES: AtomicU64 = AtomicU64::new(0);

// ----- History -----
static HISTORY_RECORDS: AtomicU64 = AtomicU64::new(0);

// ----- Copy engine -----
static BYTES_COPIED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub datasets_created: u64,
    pub datasets_destroyed: u64,
    pub renames: u64,

    pub snapshots_created: u64,
    pub snapshots_destroyed: u64,
    pub rollbacks: u64,
    pub clones_created: u64,
    pub promotes: u64,

    pub send_entries: u64,
    pub send_bytes: u64,
    pub recv_entries: u64,
    pub recv_bytes: u64,

    pub history_records: u64,

    pub bytes_copied: u64,
}

// ----- Recorders (Namespace) -----
pub fn record_dataset_created() {
    DATASETS_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_dataset_destroyed() {
    DATASETS_DESTROYED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_rename() {
    RENAMES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Snapshots) -----
pub fn record_snapshot_created() {
    SNAPSHOTS_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_snapshot_destroyed() {
    SNAPSHOTS_DESTROYED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_rollback() {
    ROLLBACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_clone_created() {
    CLONES_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_promote() {
    PROMOTES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Send / Receive) -----
pub fn record_send_entry(payload_len: usize) {
    SEND_ENTRIES.fetch_add(1, Ordering::Relaxed);
    SEND_BYTES.fetch_add(payload_len as u64, Ordering::Relaxed);
}
pub fn record_recv_entry(payload_len: usize) {
    RECV_ENTRIES.fetch_add(1, Ordering::Relaxed);
    RECV_BYTES.fetch_add(payload_len as u64, Ordering::Relaxed);
}

// ----- Recorders (History / Copy) -----
pub fn record_history_append() {
    HISTORY_RECORDS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_bytes_copied(n: u64) {
    BYTES_COPIED.fetch_add(n, Ordering::Relaxed);
}

pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        datasets_created: DATASETS_CREATED.load(Ordering::Relaxed),
        datasets_destroyed: DATASETS_DESTROYED.load(Ordering::Relaxed),
        renames: RENAMES.load(Ordering::Relaxed),

        snapshots_created: SNAPSHOTS_CREATED.load(Ordering::Relaxed),
        snapshots_destroyed: SNAPSHOTS_DESTROYED.load(Ordering::Relaxed),
        rollbacks: ROLLBACKS.load(Ordering::Relaxed),
        clones_created: CLONES_CREATED.load(Ordering::Relaxed),
        promotes: PROMOTES.load(Ordering::Relaxed),

        send_entries: SEND_ENTRIES.load(Ordering::Relaxed),
        send_bytes: SEND_BYTES.load(Ordering::Relaxed),
        recv_entries: RECV_ENTRIES.load(Ordering::Relaxed),
        recv_bytes: RECV_BYTES.load(Ordering::Relaxed),

        history_records: HISTORY_RECORDS.load(Ordering::Relaxed),

        bytes_copied: BYTES_COPIED.load(Ordering::Relaxed),
    }
}

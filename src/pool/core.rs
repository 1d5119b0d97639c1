//! pool/core — the pool handle: lock, layout, namespace index, history.
//!
//! A `PoolHandle` is the only way to touch a pool. It holds the pool lock for
//! its whole lifetime (exclusive for writers, shared for readers) and releases
//! it on `close()` or drop. Mutating operations record one history line per
//! handle when a command text was supplied, or one synthesized line per
//! operation otherwise.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ZzzConfig;
use crate::consts::{POOL_RECORD_VERSION, STAGING_PREFIX};
use crate::error::ZfsError;
use crate::fsops::{list_dir, read_json, remove_path, write_json_atomic, Undo};
use crate::history::HistoryLog;
use crate::layout::{is_staging_name, PoolLayout};
use crate::lock::{lock_with, LockGuard, LockMode, LockScope};
use crate::name::{DatasetName, SnapshotName};
use crate::namespace::{DatasetEntry, DatasetKind, Namespace, SnapshotRecord};

/// <state_root>/<pool>/pool.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub version: u32,
    pub name: String,
    /// Directory the pool's content lives under (`<altroot>/<name>`).
    pub altroot: PathBuf,
    pub created_unix_ms: i64,
    /// Last transaction number handed out.
    pub txg: u64,
}

impl PoolRecord {
    pub fn new(name: &str, altroot: &Path, created_unix_ms: i64) -> Self {
        Self {
            version: POOL_RECORD_VERSION,
            name: name.to_string(),
            altroot: altroot.to_path_buf(),
            created_unix_ms,
            txg: 1,
        }
    }
}

pub struct PoolHandle {
    pub(crate) cfg: ZzzConfig,
    pub(crate) layout: PoolLayout,
    pub(crate) record: PoolRecord,
    pub(crate) ns: Namespace,
    mode: LockMode,
    command: Option<String>,
    history_logged: bool,
    _lock: LockGuard,
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("pool", &self.record.name)
            .field("mode", &self.mode)
            .field("datasets", &self.ns.len())
            .finish()
    }
}

impl PoolHandle {
    /// Lock the pool and load its namespace. The pool must exist.
    pub(crate) fn open_locked(
        cfg: &ZzzConfig,
        name: &str,
        mode: LockMode,
        command: Option<String>,
    ) -> Result<Self> {
        let state = crate::layout::pool_state_dir(&cfg.state_root, name);
        let pool_file = state.join(crate::consts::POOL_FILE);
        if !pool_file.exists() {
            return Err(ZfsError::NotFound(format!("{}: no such pool", name)).into());
        }
        let lock = lock_with(&state, LockScope::Pool(name.to_string()), mode, cfg.lock_nowait)?;
        // destroyed while we waited for the lock
        if !pool_file.exists() {
            return Err(ZfsError::NotFound(format!("{}: no such pool", name)).into());
        }
        let record: PoolRecord = read_json(&pool_file)?;
        let layout = PoolLayout::new(&cfg.state_root, name, &record.altroot);
        let mut h = Self {
            cfg: cfg.clone(),
            layout,
            record,
            ns: Namespace::default(),
            mode,
            command,
            history_logged: false,
            _lock: lock,
        };
        if mode == LockMode::Exclusive {
            h.sweep_staging();
        }
        h.ns = Namespace::load(&h.layout)
            .with_context(|| format!("load namespace of pool {}", name))?;
        debug!("pool {}: opened {:?}, {} datasets", name, mode, h.ns.len());
        Ok(h)
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &PoolRecord {
        &self.record
    }

    pub fn layout(&self) -> &PoolLayout {
        &self.layout
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn is_readonly(&self) -> bool {
        self.mode == LockMode::Shared
    }

    /// Name of the pool's root dataset.
    pub fn root_dataset(&self) -> Result<DatasetName> {
        DatasetName::parse(&self.record.name)
    }

    /// Release the lock.
    pub fn close(self) {
        debug!("pool {}: closed", self.record.name);
    }

    // ---------- helpers for the operation modules ----------

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.is_readonly() {
            anyhow::bail!("pool {} is open read-only", self.record.name);
        }
        Ok(())
    }

    pub(crate) fn check_pool(&self, pool: &str) -> Result<()> {
        if pool != self.record.name {
            return Err(ZfsError::Name(format!(
                "{}: dataset is not in pool {}",
                pool, self.record.name
            ))
            .into());
        }
        Ok(())
    }

    pub(crate) fn entry(&self, ds: &DatasetName) -> Result<&DatasetEntry> {
        self.check_pool(ds.pool())?;
        self.ns
            .get(ds)
            .ok_or_else(|| ZfsError::NotFound(format!("{}: dataset does not exist", ds)).into())
    }

    pub(crate) fn snapshot_record(&self, snap: &SnapshotName) -> Result<&SnapshotRecord> {
        self.entry(snap.dataset())?
            .snapshot(snap.label())
            .ok_or_else(|| {
                ZfsError::NotFound(format!("{}: snapshot does not exist", snap)).into()
            })
    }

    /// Parent must exist and be able to hold children.
    pub(crate) fn check_parent(&self, ds: &DatasetName) -> Result<()> {
        if let Some(parent) = ds.parent() {
            match self.ns.get(&parent) {
                None => {
                    return Err(ZfsError::NotFound(format!(
                        "{}: parent {} does not exist",
                        ds, parent
                    ))
                    .into())
                }
                Some(e) if e.record.kind == DatasetKind::Volume => {
                    return Err(ZfsError::Name(format!(
                        "{}: volume {} cannot have children",
                        ds, parent
                    ))
                    .into())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Hand out the next transaction number and persist it.
    pub(crate) fn next_txg(&mut self) -> Result<u64> {
        self.record.txg += 1;
        write_json_atomic(&self.layout.pool_file(), &self.record, self.cfg.fsync)?;
        Ok(self.record.txg)
    }

    /// Rewrite dataset.json and properties.json from the in-memory entry.
    pub(crate) fn persist_entry(&self, undo: &mut Undo, ds: &DatasetName, entry: &DatasetEntry) -> Result<()> {
        undo.write_json(&self.layout.dataset_file(ds), &entry.record, self.cfg.fsync)?;
        undo.write_json(&self.layout.properties_file(ds), &entry.local, self.cfg.fsync)?;
        Ok(())
    }

    /// Top-level names in a live content dir that do not belong to `ds`:
    /// child dataset directories and staging artifacts.
    pub(crate) fn content_excludes(&self, ds: &DatasetName) -> Result<Vec<String>> {
        let mut out: Vec<String> = self
            .ns
            .children(ds)
            .iter()
            .map(|c| c.leaf().to_string())
            .collect();
        let dir = self.layout.content_dir(ds);
        if dir.is_dir() {
            for n in list_dir(&dir)? {
                if is_staging_name(&n) {
                    out.push(n);
                }
            }
        }
        Ok(out)
    }

    /// Append to history after a successful mutation.
    fn log_history(&mut self, synthesized: impl FnOnce() -> String) -> Result<()> {
        let log = HistoryLog::new(&self.layout.history_file(), &self.record.name);
        match &self.command {
            Some(cmd) => {
                if !self.history_logged {
                    log.record(cmd)?;
                    self.history_logged = true;
                }
            }
            None => {
                let text = synthesized();
                log.record(&text)?;
            }
        }
        Ok(())
    }

    /// Called once the mutation has committed; a history failure cannot undo it.
    pub(crate) fn done(&mut self, what: &str, synthesized: impl FnOnce() -> String) -> Result<()> {
        info!("pool {}: {}", self.record.name, what);
        if let Err(e) = self.log_history(synthesized) {
            warn!("pool {}: {} but history was not recorded: {:#}", self.record.name, what, e);
        }
        Ok(())
    }

    /// Remove staging leftovers of a process that died mid-operation.
    fn sweep_staging(&self) {
        let mut dirs = vec![
            self.layout.state_dir().to_path_buf(),
            self.layout.datasets_dir(),
            self.layout.altroot().to_path_buf(),
        ];
        for ds in self.ns_dirs_for_sweep() {
            dirs.push(self.layout.snapshots_dir(&ds));
            dirs.push(self.layout.content_dir(&ds));
        }
        for dir in dirs {
            let names = match list_dir(&dir) {
                Ok(n) => n,
                Err(_) => continue,
            };
            for n in names.iter().filter(|n| is_staging_name(n)) {
                let p = dir.join(n);
                warn!("pool {}: removing stale staging {}", self.record.name, p.display());
                if let Err(e) = remove_path(&p) {
                    warn!("pool {}: {:#}", self.record.name, e);
                }
            }
        }
    }

    // The namespace is not loaded yet when sweeping; read the directory names.
    fn ns_dirs_for_sweep(&self) -> Vec<DatasetName> {
        list_dir(&self.layout.datasets_dir())
            .unwrap_or_default()
            .into_iter()
            .filter(|n| !n.starts_with(STAGING_PREFIX))
            .filter_map(|n| DatasetName::parse(&crate::layout::unescape_dataset(&n)).ok())
            .collect()
    }
}

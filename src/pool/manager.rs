//! pool/manager — pool lifecycle (create/destroy/list/history) and handle opening.
//!
//! Pool create/destroy hold the registry lock (`<state_root>/LOCK`) so two
//! processes cannot claim the same name; listing takes it shared.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ZzzConfig;
use crate::consts::{POOL_FILE, STAGING_PREFIX};
use crate::error::ZfsError;
use crate::fsops::{create_dir_all, list_dir, read_json, remove_path, tree_size, Undo};
use crate::history::{HistoryLog, HistoryRecord};
use crate::layout::{pool_state_dir, staging_tag, PoolLayout};
use crate::lock::{lock_with, LockGuard, LockMode, LockScope};
use crate::name::{validate_pool_name, DatasetName};
use crate::namespace::{DatasetEntry, DatasetKind, DatasetRecord};
use crate::props::validate_assignment;
use crate::util::now_unix_ms;

use super::core::{PoolHandle, PoolRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Online,
    Unavail,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Health::Online => "ONLINE",
            Health::Unavail => "UNAVAIL",
        })
    }
}

/// One `zzzpool list` row. Sizes are `None` when they cannot be computed.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub name: String,
    pub size: Option<u64>,
    pub alloc: Option<u64>,
    pub free: Option<u64>,
    /// Percent of `size` allocated.
    pub cap: Option<u64>,
    pub health: Health,
    pub altroot: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PoolManager {
    cfg: ZzzConfig,
    command: Option<String>,
}

impl PoolManager {
    pub fn new(cfg: ZzzConfig) -> Self {
        Self { cfg, command: None }
    }

    pub fn from_env() -> Self {
        Self::new(ZzzConfig::from_env())
    }

    /// Raw command text recorded in history instead of a synthesized one.
    pub fn with_command<S: Into<String>>(mut self, text: S) -> Self {
        self.command = Some(text.into());
        self
    }

    pub fn config(&self) -> &ZzzConfig {
        &self.cfg
    }

    fn registry_lock(&self, mode: LockMode) -> Result<LockGuard> {
        create_dir_all(&self.cfg.state_root)?;
        lock_with(&self.cfg.state_root, LockScope::Registry, mode, self.cfg.lock_nowait)
    }

    pub fn exists(&self, name: &str) -> bool {
        pool_state_dir(&self.cfg.state_root, name)
            .join(POOL_FILE)
            .exists()
    }

    /// Names of all pools under the state root, sorted.
    pub fn pool_names(&self) -> Result<Vec<String>> {
        if !self.cfg.state_root.is_dir() {
            return Ok(Vec::new());
        }
        Ok(list_dir(&self.cfg.state_root)?
            .into_iter()
            .filter(|n| !n.starts_with(STAGING_PREFIX))
            .filter(|n| self.exists(n))
            .collect())
    }

    /// Writer handle (exclusive pool lock).
    pub fn open(&self, name: &str) -> Result<PoolHandle> {
        validate_pool_name(name)?;
        PoolHandle::open_locked(&self.cfg, name, LockMode::Exclusive, self.command.clone())
    }

    /// Reader handle (shared pool lock). Mutations through it fail.
    pub fn open_ro(&self, name: &str) -> Result<PoolHandle> {
        validate_pool_name(name)?;
        PoolHandle::open_locked(&self.cfg, name, LockMode::Shared, None)
    }

    /// Writer handle whose mutations are recorded in history as `text`.
    pub fn open_for_command(&self, name: &str, text: &str) -> Result<PoolHandle> {
        validate_pool_name(name)?;
        PoolHandle::open_locked(
            &self.cfg,
            name,
            LockMode::Exclusive,
            Some(text.to_string()),
        )
    }

    /// Create a pool rooted at `dir`: content goes to `<dir>/<name>`, the
    /// root dataset gets `props` as local overrides.
    pub fn create(
        &self,
        name: &str,
        dir: &Path,
        props: &BTreeMap<String, String>,
    ) -> Result<PoolRecord> {
        validate_pool_name(name)?;
        for (k, v) in props {
            validate_assignment(k, v)?;
        }
        let _reg = self.registry_lock(LockMode::Exclusive)?;
        if self.exists(name) {
            return Err(ZfsError::Name(format!("{}: pool already exists", name)).into());
        }
        let altroot = usable_root(dir)?;

        let state = pool_state_dir(&self.cfg.state_root, name);
        if state.exists() {
            // an abandoned directory without pool.json
            warn!("pool {}: replacing incomplete state {}", name, state.display());
            remove_path(&state)?;
        }
        let stage = self
            .cfg
            .state_root
            .join(format!("{}{}.{}", STAGING_PREFIX, name, staging_tag("create")));
        let layout = PoolLayout::new(&self.cfg.state_root, name, &altroot);
        let stage_layout = StagedLayout { layout: &layout, stage: &stage };

        let mut undo = Undo::new();
        undo.scratch(&stage);
        create_dir_all(&stage)?;

        let content = layout.content_root();
        if content.exists() {
            if !list_dir(&content)?.is_empty() {
                return Err(anyhow!(
                    "{}: directory {} exists and is not empty",
                    name,
                    content.display()
                ));
            }
        } else {
            create_dir_all(&content)?;
            undo.scratch(&content);
        }

        let now = now_unix_ms();
        let record = PoolRecord::new(name, &altroot, now);
        let root = DatasetName::parse(name)?;
        let mut entry = DatasetEntry::new(DatasetRecord::new(&root, DatasetKind::Filesystem, record.txg, now));
        entry.local = props.clone();

        undo.write_json(&stage.join(POOL_FILE), &record, self.cfg.fsync)?;
        let ds_dir = stage_layout.map(&layout.dataset_dir(&root));
        create_dir_all(&stage_layout.map(&layout.snapshots_dir(&root)))?;
        undo.write_json(&ds_dir.join(crate::consts::DATASET_FILE), &entry.record, self.cfg.fsync)?;
        undo.write_json(&ds_dir.join(crate::consts::PROPERTIES_FILE), &entry.local, self.cfg.fsync)?;

        let text = self
            .command
            .clone()
            .unwrap_or_else(|| format!("zzzpool create {} {}", name, dir.display()));
        HistoryLog::new(&stage_layout.map(&layout.history_file()), name).record(&text)?;

        undo.move_path(&stage, &state)?;
        undo.commit();
        info!("pool {}: created at {}", name, altroot.display());
        Ok(record)
    }

    /// Remove a pool with its content, snapshots and history.
    pub fn destroy(&self, name: &str, recursive: bool) -> Result<()> {
        validate_pool_name(name)?;
        let _reg = self.registry_lock(LockMode::Exclusive)?;
        let h = PoolHandle::open_locked(&self.cfg, name, LockMode::Exclusive, None)?;
        let root = h.root_dataset()?;
        if !recursive {
            let others: Vec<String> = h
                .ns
                .descendants(&root)
                .iter()
                .map(|d| d.to_string())
                .collect();
            if !others.is_empty() {
                return Err(ZfsError::NotEmpty(format!(
                    "cannot destroy {}: pool has datasets: {}",
                    name,
                    others.join(", ")
                ))
                .into());
            }
            let snaps = h.ns.get(&root).map(|e| e.snapshots.len()).unwrap_or(0);
            if snaps > 0 {
                return Err(ZfsError::NotEmpty(format!(
                    "cannot destroy {}: pool has {} snapshot(s)",
                    name, snaps
                ))
                .into());
            }
        }

        let state = h.layout.state_dir().to_path_buf();
        let content = h.layout.content_root();
        let trash = self
            .cfg
            .state_root
            .join(format!("{}{}.{}", STAGING_PREFIX, name, staging_tag("destroy")));
        let content_trash = h.layout.content_staging(&root, &staging_tag("destroy"));
        let mut undo = Undo::new();
        undo.move_path(&state, &trash)?;
        if fs::symlink_metadata(&content).is_ok() {
            undo.move_path(&content, &content_trash)?;
        }
        undo.commit();
        drop(h);
        for p in [&trash, &content_trash] {
            if let Err(e) = remove_path(p) {
                warn!("pool {}: cleanup {}: {:#}", name, p.display(), e);
            }
        }
        info!("pool {}: destroyed", name);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<PoolStatus>> {
        let _reg = self.registry_lock(LockMode::Shared)?;
        let mut out = Vec::new();
        for name in self.pool_names()? {
            let state = pool_state_dir(&self.cfg.state_root, &name);
            let rec: PoolRecord = read_json(&state.join(POOL_FILE))?;
            out.push(status_of(&self.cfg, rec));
        }
        Ok(out)
    }

    pub fn history(&self, name: &str) -> Result<Vec<HistoryRecord>> {
        let h = self.open_ro(name)?;
        HistoryLog::new(&h.layout.history_file(), name).query()
    }
}

fn status_of(cfg: &ZzzConfig, rec: PoolRecord) -> PoolStatus {
    let layout = PoolLayout::new(&cfg.state_root, &rec.name, &rec.altroot);
    let content = layout.content_root();
    let usable = fs::read_dir(&content).is_ok();
    if !usable {
        return PoolStatus {
            name: rec.name,
            size: None,
            alloc: None,
            free: None,
            cap: None,
            health: Health::Unavail,
            altroot: rec.altroot,
        };
    }
    let alloc = match (tree_size(&content, &[]), tree_size(&layout.datasets_dir(), &[])) {
        (Ok(a), Ok(b)) => Some(a + b),
        (a, b) => {
            debug!("pool {}: size walk failed: {:?} {:?}", rec.name, a.err(), b.err());
            None
        }
    };
    let free = fs2::available_space(&content).ok();
    let size = match (alloc, free) {
        (Some(a), Some(f)) => Some(a + f),
        _ => None,
    };
    let cap = match (alloc, size) {
        (Some(a), Some(s)) if s > 0 => Some(a * 100 / s),
        _ => None,
    };
    PoolStatus {
        name: rec.name,
        size,
        alloc,
        free,
        cap,
        health: Health::Online,
        altroot: rec.altroot,
    }
}

/// Pool root directory must exist and accept writes.
fn usable_root(dir: &Path) -> Result<PathBuf> {
    let md = fs::metadata(dir).with_context(|| format!("pool root {}", dir.display()))?;
    if !md.is_dir() {
        return Err(anyhow!("pool root {} is not a directory", dir.display()));
    }
    if md.permissions().readonly() {
        return Err(anyhow!("pool root {} is not writable", dir.display()));
    }
    fs::canonicalize(dir).with_context(|| format!("canonicalize {}", dir.display()))
}

/// Maps final state paths into the staging directory during pool creation.
struct StagedLayout<'a> {
    layout: &'a PoolLayout,
    stage: &'a Path,
}

impl<'a> StagedLayout<'a> {
    fn map(&self, p: &Path) -> PathBuf {
        match p.strip_prefix(self.layout.state_dir()) {
            Ok(rest) => self.stage.join(rest),
            Err(_) => p.to_path_buf(),
        }
    }
}

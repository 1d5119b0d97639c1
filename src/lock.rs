//! lock — fs2 advisory locks on a pool or on the pool registry.
//!
//! Each pool has `<state_root>/<pool>/LOCK`: writers hold it exclusive for the
//! whole life of their handle, readers (list/get/diff/send) hold it shared so
//! they never see a half-applied move. `<state_root>/LOCK` guards the set of
//! pools during pool create/destroy. The lock goes away with the guard.

use anyhow::{Context, Result};
use fs2::FileExt;
use log::debug;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        })
    }
}

/// What a lock file protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    Registry,
    Pool(String),
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Registry => f.write_str("pool registry"),
            LockScope::Pool(name) => write!(f, "pool {}", name),
        }
    }
}

#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    scope: LockScope,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("{}: unlock {}: {}", self.scope, self.path.display(), e);
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Lock `<dir>/LOCK` for `scope`. With `nowait` a lock held elsewhere is an
/// immediate error naming the scope; otherwise this blocks.
pub fn lock_with(dir: &Path, scope: LockScope, mode: LockMode, nowait: bool) -> Result<LockGuard> {
    let path = dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("{}: open lock file {}", scope, path.display()))?;
    let res = match (mode, nowait) {
        (LockMode::Shared, false) => FileExt::lock_shared(&file),
        (LockMode::Exclusive, false) => FileExt::lock_exclusive(&file),
        (LockMode::Shared, true) => FileExt::try_lock_shared(&file),
        (LockMode::Exclusive, true) => FileExt::try_lock_exclusive(&file),
    };
    match res {
        Ok(()) => {}
        Err(e) if nowait && is_contended(&e) => {
            anyhow::bail!("{} is busy: cannot take {} lock {}", scope, mode, path.display())
        }
        Err(e) => {
            return Err(e).with_context(|| format!("{}: {} lock {}", scope, mode, path.display()))
        }
    }
    debug!("{}: {} lock taken", scope, mode);
    Ok(LockGuard {
        file,
        path,
        scope,
        mode,
    })
}

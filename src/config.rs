//! Centralized configuration and builder for ZzzFS.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - `ZzzConfig::from_env()` reads the env vars the CLI honours.
//! - `ZzzBuilder` returns a `ZzzConfig`, which `PoolManager` consumes.
//!
//! Env:
//! - ZZZFS_ROOT        — state root (pool records, snapshots, history). Default `$HOME/.zzzfs`.
//! - ZZZFS_LOCK_NOWAIT — fail instead of blocking when a pool lock is held.
//! - ZZZFS_FSYNC       — fsync sidecar files after the atomic rename.

use std::fmt;
use std::path::PathBuf;

use crate::consts::DEFAULT_STATE_DIR;
use crate::util::env_bool;

#[derive(Clone, Debug)]
pub struct ZzzConfig {
    /// Directory holding pool records, dataset sidecars, snapshots and history.
    /// Env: ZZZFS_ROOT
    pub state_root: PathBuf,

    /// Try-lock instead of blocking on pool and registry locks.
    /// Env: ZZZFS_LOCK_NOWAIT (default false)
    pub lock_nowait: bool,

    /// fsync sidecar JSON files (pool/dataset/snapshot records) after writing.
    /// Env: ZZZFS_FSYNC (default false)
    pub fsync: bool,
}

fn default_state_root() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    home.join(DEFAULT_STATE_DIR)
}

impl Default for ZzzConfig {
    fn default() -> Self {
        Self {
            state_root: default_state_root(),
            lock_nowait: false,
            fsync: false,
        }
    }
}

impl ZzzConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("ZZZFS_ROOT") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.state_root = PathBuf::from(s);
            }
        }
        cfg.lock_nowait = env_bool("ZZZFS_LOCK_NOWAIT");
        cfg.fsync = env_bool("ZZZFS_FSYNC");

        cfg
    }

    pub fn with_state_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.state_root = root.into();
        self
    }

    pub fn with_lock_nowait(mut self, on: bool) -> Self {
        self.lock_nowait = on;
        self
    }

    pub fn with_fsync(mut self, on: bool) -> Self {
        self.fsync = on;
        self
    }

    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for ZzzConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ZzzConfig {{ state_root: {}, lock_nowait: {}, fsync: {} }}",
            self.state_root.display(),
            self.lock_nowait,
            self.fsync,
        )
    }
}

/// Lightweight builder that produces a ZzzConfig.
#[derive(Clone, Debug)]
pub struct ZzzBuilder {
    cfg: ZzzConfig,
}

impl Default for ZzzBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: ZzzConfig::from_env(),
        }
    }
}

impl ZzzBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: ZzzConfig::default(),
        }
    }

    pub fn state_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.cfg.state_root = root.into();
        self
    }

    pub fn lock_nowait(mut self, on: bool) -> Self {
        self.cfg.lock_nowait = on;
        self
    }

    pub fn fsync(mut self, on: bool) -> Self {
        self.cfg.fsync = on;
        self
    }

    pub fn build(self) -> ZzzConfig {
        self.cfg
    }
}

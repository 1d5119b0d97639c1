//! Physical layout: logical names → directories.
//!
//! ```text
//! <state_root>/<pool>/pool.json
//! <state_root>/<pool>/LOCK
//! <state_root>/<pool>/history
//! <state_root>/<pool>/datasets/<esc>/dataset.json
//! <state_root>/<pool>/datasets/<esc>/properties.json
//! <state_root>/<pool>/datasets/<esc>/snapshots/<label>/{snapshot.json,data/}
//! <altroot>/<pool>/<relative path>        live content
//! ```
//!
//! `<esc>` is the full dataset name with `/` replaced by `%`. Every mapping is a
//! pure function of the names, so identical names always resolve identically.

use std::path::{Path, PathBuf};

use crate::consts::{
    DATASETS_DIR, DATASET_FILE, HISTORY_FILE, NAME_ESCAPE, POOL_FILE, PROPERTIES_FILE,
    SNAPSHOTS_DIR, SNAPSHOT_DATA_DIR, SNAPSHOT_FILE, STAGING_PREFIX,
};
use crate::name::{DatasetName, SnapshotName, Target};

pub fn escape_dataset(name: &DatasetName) -> String {
    name.as_str().replace('/', &NAME_ESCAPE.to_string())
}

pub fn unescape_dataset(esc: &str) -> String {
    esc.replace(NAME_ESCAPE, "/")
}

/// Paths for one pool. Cheap to clone; carried by `PoolHandle`.
#[derive(Clone, Debug)]
pub struct PoolLayout {
    pool: String,
    state: PathBuf,
    altroot: PathBuf,
}

impl PoolLayout {
    pub fn new(state_root: &Path, pool: &str, altroot: &Path) -> Self {
        Self {
            pool: pool.to_string(),
            state: pool_state_dir(state_root, pool),
            altroot: altroot.to_path_buf(),
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn state_dir(&self) -> &Path {
        &self.state
    }

    pub fn altroot(&self) -> &Path {
        &self.altroot
    }

    pub fn pool_file(&self) -> PathBuf {
        self.state.join(POOL_FILE)
    }

    pub fn history_file(&self) -> PathBuf {
        self.state.join(HISTORY_FILE)
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.state.join(DATASETS_DIR)
    }

    /// Live content root of the pool (`<altroot>/<pool>`).
    pub fn content_root(&self) -> PathBuf {
        self.altroot.join(&self.pool)
    }

    /// Live content directory of a dataset.
    pub fn content_dir(&self, ds: &DatasetName) -> PathBuf {
        let mut p = self.content_root();
        for part in ds.components().skip(1) {
            p.push(part);
        }
        p
    }

    pub fn dataset_dir(&self, ds: &DatasetName) -> PathBuf {
        self.datasets_dir().join(escape_dataset(ds))
    }

    pub fn dataset_file(&self, ds: &DatasetName) -> PathBuf {
        self.dataset_dir(ds).join(DATASET_FILE)
    }

    pub fn properties_file(&self, ds: &DatasetName) -> PathBuf {
        self.dataset_dir(ds).join(PROPERTIES_FILE)
    }

    pub fn snapshots_dir(&self, ds: &DatasetName) -> PathBuf {
        self.dataset_dir(ds).join(SNAPSHOTS_DIR)
    }

    pub fn snapshot_dir(&self, snap: &SnapshotName) -> PathBuf {
        self.snapshots_dir(snap.dataset()).join(snap.label())
    }

    pub fn snapshot_file(&self, snap: &SnapshotName) -> PathBuf {
        self.snapshot_dir(snap).join(SNAPSHOT_FILE)
    }

    /// Frozen content of a snapshot.
    pub fn snapshot_data(&self, snap: &SnapshotName) -> PathBuf {
        self.snapshot_dir(snap).join(SNAPSHOT_DATA_DIR)
    }

    /// Staging directory inside the state area (same device as snapshots).
    pub fn staging_dir(&self, tag: &str) -> PathBuf {
        self.state.join(format!("{}staging-{}", STAGING_PREFIX, tag))
    }

    /// Staging path next to a live content dir (same device as the content).
    pub fn content_staging(&self, ds: &DatasetName, tag: &str) -> PathBuf {
        let dir = self.content_dir(ds);
        let leaf = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.pool.clone());
        let parent = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        parent.join(format!("{}{}.{}", STAGING_PREFIX, leaf, tag))
    }

    /// Resolve any identifier to its physical directory: live content for a
    /// dataset, frozen content for a snapshot.
    pub fn resolve(&self, target: &Target) -> PathBuf {
        match target {
            Target::Dataset(d) => self.content_dir(d),
            Target::Snapshot(s) => self.snapshot_data(s),
        }
    }
}

/// Marker carried by every staging tag.
pub const STAGING_TAG: &str = "zzz-";

/// Staging tag unique to this process: `zzz-<what>-<pid>`.
pub fn staging_tag(what: &str) -> String {
    format!("{}{}-{}", STAGING_TAG, what, std::process::id())
}

/// True for names produced by `content_staging`/`staging_dir` and friends.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX) && name.contains(STAGING_TAG)
}

pub fn pool_state_dir(state_root: &Path, pool: &str) -> PathBuf {
    state_root.join(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_deterministic() -> anyhow::Result<()> {
        let l = PoolLayout::new(Path::new("/state"), "tank", Path::new("/disk"));
        let t = Target::parse("tank/a/b")?;
        assert_eq!(l.resolve(&t), PathBuf::from("/disk/tank/a/b"));
        assert_eq!(l.resolve(&t), l.resolve(&Target::parse("tank/a/b")?));

        let s = Target::parse("tank/a@x")?;
        assert_eq!(
            l.resolve(&s),
            PathBuf::from("/state/tank/datasets/tank%a/snapshots/x/data")
        );
        assert_eq!(unescape_dataset("tank%a%b"), "tank/a/b");

        let a = DatasetName::parse("tank/a")?;
        let st = l.content_staging(&a, &staging_tag("rollback"));
        assert_eq!(st.parent(), Some(Path::new("/disk/tank")));
        assert!(is_staging_name(&st.file_name().unwrap().to_string_lossy()));
        assert!(!is_staging_name(".profile"));
        Ok(())
    }
}

//! Namespace index: dataset name → record.
//!
//! The tree is never stored as parent/child references. Parents, children and
//! clone dependencies are all answered by walking this sorted map, and the map
//! is rebuilt from the sidecar files each time a pool handle is opened.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::consts::{DATASET_FILE, DATASET_RECORD_VERSION, SNAPSHOT_FILE, STAGING_PREFIX};
use crate::fsops::{list_dir, read_json};
use crate::layout::{unescape_dataset, PoolLayout};
use crate::name::{DatasetName, SnapshotName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Filesystem,
    Volume,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Filesystem => f.write_str("filesystem"),
            DatasetKind::Volume => f.write_str("volume"),
        }
    }
}

/// Where a resolved attribute value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Local,
    /// Inherited from the named ancestor.
    Inherited(String),
    Default,
    /// Neither set anywhere nor a known native property.
    None,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local => f.write_str("local"),
            Source::Inherited(from) => write!(f, "inherited from {}", from),
            Source::Default => f.write_str("default"),
            Source::None => f.write_str("-"),
        }
    }
}

impl Source {
    pub fn is_inherited(&self) -> bool {
        matches!(self, Source::Inherited(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropValue {
    pub value: String,
    pub source: Source,
}

/// <datasets>/<esc>/dataset.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub version: u32,
    pub name: String,
    pub kind: DatasetKind,
    pub created_unix_ms: i64,
    pub createtxg: u64,
    /// "pool/ds@label" for clones.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub volsize: Option<u64>,
}

impl DatasetRecord {
    pub fn new(name: &DatasetName, kind: DatasetKind, createtxg: u64, created_unix_ms: i64) -> Self {
        Self {
            version: DATASET_RECORD_VERSION,
            name: name.to_string(),
            kind,
            created_unix_ms,
            createtxg,
            origin: None,
            volsize: None,
        }
    }
}

/// <datasets>/<esc>/snapshots/<label>/snapshot.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub label: String,
    pub created_unix_ms: i64,
    pub createtxg: u64,
    /// Attribute values frozen at creation (local and inherited ones).
    pub properties: BTreeMap<String, PropValue>,
    /// Bytes frozen in `data/`.
    #[serde(default)]
    pub referenced: u64,
    /// Properties of the snapshot itself (`snapshot -o k=v`). They describe
    /// the snapshot and are not restored by a rollback.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub own: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub record: DatasetRecord,
    /// Local attribute overrides (properties.json).
    pub local: BTreeMap<String, String>,
    /// Ordered by createtxg.
    pub snapshots: Vec<SnapshotRecord>,
}

impl DatasetEntry {
    pub fn new(record: DatasetRecord) -> Self {
        Self {
            record,
            local: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn snapshot(&self, label: &str) -> Option<&SnapshotRecord> {
        self.snapshots.iter().find(|s| s.label == label)
    }

    pub fn latest_snapshot(&self) -> Option<&SnapshotRecord> {
        self.snapshots.last()
    }

    pub fn sort_snapshots(&mut self) {
        self.snapshots.sort_by_key(|s| s.createtxg);
    }
}

#[derive(Debug, Default, Clone)]
pub struct Namespace {
    entries: BTreeMap<String, DatasetEntry>,
}

impl Namespace {
    /// Rebuild the index from the pool's sidecar files. Staging artifacts
    /// (dot-prefixed) are ignored, so half-built datasets never show up.
    pub fn load(layout: &PoolLayout) -> Result<Self> {
        let mut ns = Namespace::default();
        let dir = layout.datasets_dir();
        if !dir.exists() {
            return Ok(ns);
        }
        for esc in list_dir(&dir)? {
            if esc.starts_with(STAGING_PREFIX) {
                continue;
            }
            let name = match DatasetName::parse(&unescape_dataset(&esc)) {
                Ok(n) => n,
                Err(e) => {
                    warn!("namespace: skip {}: {:#}", esc, e);
                    continue;
                }
            };
            let ds_file = layout.dataset_file(&name);
            if !ds_file.exists() {
                debug!("namespace: {} has no {}, skipping", esc, DATASET_FILE);
                continue;
            }
            let mut record: DatasetRecord = read_json(&ds_file)?;
            // the directory name is authoritative
            record.name = name.to_string();
            let mut entry = DatasetEntry::new(record);

            let props = layout.properties_file(&name);
            if props.exists() {
                entry.local = read_json(&props)?;
            }

            let snaps_dir = layout.snapshots_dir(&name);
            if snaps_dir.exists() {
                for label in list_dir(&snaps_dir)? {
                    if label.starts_with(STAGING_PREFIX) {
                        continue;
                    }
                    let sf = snaps_dir.join(&label).join(SNAPSHOT_FILE);
                    if !sf.exists() {
                        continue;
                    }
                    let rec: SnapshotRecord = read_json(&sf)
                        .with_context(|| format!("load snapshot {}@{}", name, label))?;
                    entry.snapshots.push(rec);
                }
                entry.sort_snapshots();
            }
            ns.entries.insert(name.to_string(), entry);
        }
        Ok(ns)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, ds: &DatasetName) -> bool {
        self.entries.contains_key(ds.as_str())
    }

    pub fn get(&self, ds: &DatasetName) -> Option<&DatasetEntry> {
        self.entries.get(ds.as_str())
    }

    pub fn get_mut(&mut self, ds: &DatasetName) -> Option<&mut DatasetEntry> {
        self.entries.get_mut(ds.as_str())
    }

    pub fn insert(&mut self, ds: &DatasetName, entry: DatasetEntry) {
        self.entries.insert(ds.to_string(), entry);
    }

    pub fn remove(&mut self, ds: &DatasetName) -> Option<DatasetEntry> {
        self.entries.remove(ds.as_str())
    }

    pub fn snapshot(&self, snap: &SnapshotName) -> Option<&SnapshotRecord> {
        self.get(snap.dataset()).and_then(|e| e.snapshot(snap.label()))
    }

    /// All dataset names in component order.
    pub fn names(&self) -> Vec<DatasetName> {
        let mut v: Vec<DatasetName> = self
            .entries
            .keys()
            .filter_map(|k| DatasetName::parse(k).ok())
            .collect();
        v.sort_by(|a, b| a.cmp_components(b));
        v
    }

    pub fn children(&self, ds: &DatasetName) -> Vec<DatasetName> {
        self.names()
            .into_iter()
            .filter(|n| n.parent().as_ref() == Some(ds))
            .collect()
    }

    /// Everything strictly below `ds`, in component order.
    pub fn descendants(&self, ds: &DatasetName) -> Vec<DatasetName> {
        self.names()
            .into_iter()
            .filter(|n| n != ds && n.is_within(ds))
            .collect()
    }

    /// Datasets whose origin is `snap`.
    pub fn clones_of(&self, snap: &SnapshotName) -> Vec<DatasetName> {
        let key = snap.to_string();
        self.names()
            .into_iter()
            .filter(|n| {
                self.get(n)
                    .and_then(|e| e.record.origin.as_deref())
                    .map(|o| o == key)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn origin_of(&self, ds: &DatasetName) -> Option<SnapshotName> {
        self.get(ds)
            .and_then(|e| e.record.origin.as_deref())
            .and_then(|o| SnapshotName::parse(o).ok())
    }
}

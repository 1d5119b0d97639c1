//! Dataset and snapshot names.
//!
//! Accepted shapes:
//!   pool
//!   pool/child/.../leaf
//!   pool/child@label
//!
//! Each component starts with an ASCII alphanumeric and contains only
//! alphanumerics and `_ - : .`. Pool names additionally start with a letter
//! and must not collide with vdev keywords.

use anyhow::Result;
use std::cmp::Ordering;
use std::fmt;

use crate::consts::{MAX_NAME_LEN, MAX_POOL_NAME_LEN};
use crate::error::ZfsError;

const RESERVED_POOL_NAMES: &[&str] = &[
    "mirror", "raidz", "raidz1", "raidz2", "raidz3", "draid", "spare", "log", "cache",
    "special", "dedup",
];

/// Component check shared by dataset path parts, snapshot labels and property keys.
pub fn valid_component(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
}

pub fn validate_pool_name(name: &str) -> Result<()> {
    if name.len() > MAX_POOL_NAME_LEN {
        return Err(ZfsError::Name(format!(
            "{}...: pool name longer than {} bytes",
            name.chars().take(16).collect::<String>(),
            MAX_POOL_NAME_LEN
        ))
        .into());
    }
    if !valid_component(name) {
        return Err(ZfsError::Name(format!("{}: invalid pool name", name)).into());
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(ZfsError::Name(format!("{}: pool name must begin with a letter", name)).into());
    }
    if RESERVED_POOL_NAMES.contains(&name) {
        return Err(ZfsError::Name(format!("{}: name is reserved", name)).into());
    }
    let b = name.as_bytes();
    if b.len() >= 2 && b[0] == b'c' && b[1].is_ascii_digit() {
        return Err(ZfsError::Name(format!("{}: pool name looks like a disk", name)).into());
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatasetName {
    full: String,
}

impl DatasetName {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_NAME_LEN {
            return Err(ZfsError::Name(format!("{:?}: invalid dataset name length", s)).into());
        }
        if s.contains('@') {
            return Err(ZfsError::Name(format!("{}: not a filesystem or volume name", s)).into());
        }
        for part in s.split('/') {
            if !valid_component(part) {
                return Err(ZfsError::Name(format!("{}: invalid dataset identifier", s)).into());
            }
        }
        let pool = s.split('/').next().unwrap_or_default();
        validate_pool_name(pool)
            .map_err(|_| ZfsError::Name(format!("{}: invalid pool name {:?}", s, pool)))?;
        Ok(Self { full: s.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn pool(&self) -> &str {
        self.full.split('/').next().unwrap_or(&self.full)
    }

    pub fn is_root(&self) -> bool {
        !self.full.contains('/')
    }

    /// Path below the pool root ("" for the root dataset).
    pub fn relative(&self) -> &str {
        match self.full.find('/') {
            Some(i) => &self.full[i + 1..],
            None => "",
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.full.split('/')
    }

    pub fn depth(&self) -> usize {
        self.full.matches('/').count()
    }

    pub fn leaf(&self) -> &str {
        self.full.rsplit('/').next().unwrap_or(&self.full)
    }

    pub fn parent(&self) -> Option<DatasetName> {
        self.full.rfind('/').map(|i| DatasetName {
            full: self.full[..i].to_string(),
        })
    }

    /// All ancestors from the direct parent up to the pool root.
    pub fn ancestors(&self) -> Vec<DatasetName> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            cur = p.parent();
            out.push(p);
        }
        out
    }

    pub fn child(&self, leaf: &str) -> Result<DatasetName> {
        DatasetName::parse(&format!("{}/{}", self.full, leaf))
    }

    /// True if `self` is `other` or lives below it. A shared string prefix
    /// ("pool/dee" vs "pool/deeee") does not count.
    pub fn is_within(&self, other: &DatasetName) -> bool {
        self.full == other.full
            || (self.full.starts_with(&other.full)
                && self.full.as_bytes().get(other.full.len()) == Some(&b'/'))
    }

    /// Replace the `from` prefix with `to` (caller checks `is_within`).
    pub fn reparent(&self, from: &DatasetName, to: &DatasetName) -> DatasetName {
        let rest = &self.full[from.full.len()..];
        DatasetName {
            full: format!("{}{}", to.full, rest),
        }
    }

    pub fn snapshot(&self, label: &str) -> Result<SnapshotName> {
        SnapshotName::new(self.clone(), label)
    }

    /// Component-wise comparison (children sort right after their parent).
    pub fn cmp_components(&self, other: &DatasetName) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotName {
    dataset: DatasetName,
    label: String,
}

impl SnapshotName {
    pub fn new(dataset: DatasetName, label: &str) -> Result<Self> {
        if !valid_component(label) {
            return Err(ZfsError::Name(format!("{}: invalid snapshot name", label)).into());
        }
        if dataset.as_str().len() + 1 + label.len() > MAX_NAME_LEN {
            return Err(ZfsError::Name(format!("{}@{}: name too long", dataset, label)).into());
        }
        Ok(Self {
            dataset,
            label: label.to_string(),
        })
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (ds, label) = s
            .split_once('@')
            .ok_or_else(|| ZfsError::Name(format!("{}: not a snapshot name", s)))?;
        if label.contains('@') {
            return Err(ZfsError::Name(format!("{}: invalid dataset identifier", s)).into());
        }
        if ds.is_empty() {
            return Err(ZfsError::Name(format!("{}: missing dataset name", s)).into());
        }
        SnapshotName::new(DatasetName::parse(ds)?, label)
    }

    pub fn dataset(&self) -> &DatasetName {
        &self.dataset
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pool(&self) -> &str {
        self.dataset.pool()
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dataset, self.label)
    }
}

/// A user-supplied identifier: either a filesystem/volume or a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Dataset(DatasetName),
    Snapshot(SnapshotName),
}

impl Target {
    pub fn parse(s: &str) -> Result<Self> {
        if s.contains('@') {
            Ok(Target::Snapshot(SnapshotName::parse(s)?))
        } else {
            Ok(Target::Dataset(DatasetName::parse(s)?))
        }
    }

    pub fn pool(&self) -> &str {
        match self {
            Target::Dataset(d) => d.pool(),
            Target::Snapshot(s) => s.pool(),
        }
    }

    pub fn dataset(&self) -> &DatasetName {
        match self {
            Target::Dataset(d) => d,
            Target::Snapshot(s) => s.dataset(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Dataset(d) => d.fmt(f),
            Target::Snapshot(s) => s.fmt(f),
        }
    }
}

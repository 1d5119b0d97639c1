//! pool/dataset — filesystem/volume lifecycle, listing and renaming.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::OpenOptions;
use std::path::Path;

use crate::error::ZfsError;
use crate::fsops::{copy_tree, create_dir_all, remove_path, tree_size, Undo};
use crate::layout::{escape_dataset, staging_tag};
use crate::metrics::{
    record_dataset_created, record_dataset_destroyed, record_rename, record_snapshot_destroyed,
};
use crate::name::{DatasetName, SnapshotName, Target};
use crate::namespace::{DatasetEntry, DatasetKind, DatasetRecord};
use crate::props::{self, validate_assignment, MOUNTPOINT};
use crate::util::{now_unix_ms, parse_size};

use super::core::PoolHandle;

/// Key carrying a volume's size at creation time.
pub const VOLSIZE: &str = "volsize";

/// Initial content of a dataset being materialized.
pub(crate) enum Seed<'a> {
    Empty,
    /// Copy of a frozen snapshot tree.
    CopyOf(&'a Path),
    /// A prepared staging tree that is moved into place.
    Adopt(&'a Path),
}

/// Which kinds `list` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeFilter {
    pub filesystems: bool,
    pub volumes: bool,
    pub snapshots: bool,
}

impl Default for TypeFilter {
    fn default() -> Self {
        Self {
            filesystems: true,
            volumes: true,
            snapshots: false,
        }
    }
}

impl TypeFilter {
    pub fn all() -> Self {
        Self {
            filesystems: true,
            volumes: true,
            snapshots: true,
        }
    }

    /// "all" or a comma list of filesystem|volume|snapshot (plural and short forms).
    pub fn parse(s: &str) -> Result<Self> {
        let mut f = Self {
            filesystems: false,
            volumes: false,
            snapshots: false,
        };
        for part in s.split(',') {
            match part.trim() {
                "all" => f = Self::all(),
                "filesystem" | "filesystems" | "fs" => f.filesystems = true,
                "volume" | "volumes" | "vol" => f.volumes = true,
                "snapshot" | "snapshots" | "snap" => f.snapshots = true,
                other => {
                    return Err(ZfsError::Name(format!("{}: invalid type", other)).into());
                }
            }
        }
        Ok(f)
    }

    /// Whether a row of `kind` ("filesystem", "volume", "snapshot") passes.
    pub fn accepts(&self, kind: &str) -> bool {
        match kind {
            "filesystem" => self.filesystems,
            "volume" => self.volumes,
            "snapshot" => self.snapshots,
            _ => false,
        }
    }
}

/// One `zzzfs list` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub name: String,
    /// "filesystem", "volume" or "snapshot".
    pub kind: String,
    pub used: Option<u64>,
    pub avail: Option<u64>,
    pub refer: Option<u64>,
    /// `-` for snapshots and volumes.
    pub mountpoint: String,
    /// `-` unless a clone.
    pub origin: String,
}

impl PoolHandle {
    /// Create a filesystem or volume. Volumes take their size from the
    /// `volsize` entry of `props`; everything else becomes a local override.
    /// With `create_parents` an existing dataset of the same kind is not an
    /// error and is left untouched.
    pub fn create(
        &mut self,
        ds: &DatasetName,
        kind: DatasetKind,
        props: &BTreeMap<String, String>,
        create_parents: bool,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.check_pool(ds.pool())?;
        let mut local = props.clone();
        let volsize = match kind {
            DatasetKind::Volume => {
                let raw = local.remove(VOLSIZE).ok_or_else(|| {
                    ZfsError::Name(format!("{}: volume requires a size", ds))
                })?;
                match parse_size(&raw) {
                    Some(n) if n > 0 => Some(n),
                    _ => {
                        return Err(ZfsError::Name(format!("{}: bad volume size {:?}", ds, raw)).into())
                    }
                }
            }
            DatasetKind::Filesystem => None,
        };
        for (k, v) in &local {
            validate_assignment(k, v)?;
        }
        if kind == DatasetKind::Volume && local.contains_key(MOUNTPOINT) {
            return Err(ZfsError::Name(format!("{}: volumes have no mountpoint", ds)).into());
        }
        if let Some(e) = self.ns.get(ds) {
            // -p makes the call idempotent for a dataset of the same kind
            if create_parents && e.record.kind == kind {
                debug!("pool {}: {} already exists", self.name(), ds);
                return Ok(());
            }
            return Err(ZfsError::Name(format!("{}: dataset already exists", ds)).into());
        }

        let mut missing = Vec::new();
        if create_parents {
            for anc in ds.ancestors() {
                if self.ns.contains(&anc) {
                    break;
                }
                missing.push(anc);
            }
            missing.reverse();
        }
        if let Some(top) = missing.first() {
            self.check_parent(top)?;
        } else {
            self.check_parent(ds)?;
        }

        for anc in &missing {
            let entry = self.new_entry(anc, DatasetKind::Filesystem, BTreeMap::new(), None)?;
            self.materialize(anc, entry, Seed::Empty)?;
        }
        let entry = self.new_entry(ds, kind, local, volsize)?;
        self.materialize(ds, entry, Seed::Empty)?;

        let p = if create_parents { "-p " } else { "" };
        let v = volsize.map(|n| format!("-V {} ", n)).unwrap_or_default();
        self.done(&format!("created {}", ds), || format!("zzzfs create {}{}{}", p, v, ds))
    }

    pub(crate) fn new_entry(
        &mut self,
        ds: &DatasetName,
        kind: DatasetKind,
        local: BTreeMap<String, String>,
        volsize: Option<u64>,
    ) -> Result<DatasetEntry> {
        let txg = self.next_txg()?;
        let mut rec = DatasetRecord::new(ds, kind, txg, now_unix_ms());
        rec.volsize = volsize;
        let mut e = DatasetEntry::new(rec);
        e.local = local;
        Ok(e)
    }

    /// Build state and content for a new dataset, then make it visible.
    pub(crate) fn materialize(&mut self, ds: &DatasetName, entry: DatasetEntry, seed: Seed<'_>) -> Result<()> {
        let mut undo = Undo::new();
        self.materialize_with(&mut undo, ds, &entry, seed)?;
        undo.commit();

        self.ns.insert(ds, entry);
        record_dataset_created();
        debug!("pool {}: materialized {}", self.name(), ds);
        Ok(())
    }

    /// The file work of `materialize`, journaled into the caller's `undo`.
    /// The namespace is left alone.
    pub(crate) fn materialize_with(
        &self,
        undo: &mut Undo,
        ds: &DatasetName,
        entry: &DatasetEntry,
        seed: Seed<'_>,
    ) -> Result<()> {
        let content = self.layout.content_dir(ds);
        if std::fs::symlink_metadata(&content).is_ok() {
            return Err(ZfsError::Name(format!(
                "{}: {} already exists in the parent's content",
                ds,
                content.display()
            ))
            .into());
        }
        let tag = staging_tag("create");
        let stage = self
            .layout
            .datasets_dir()
            .join(format!(".{}.{}", escape_dataset(ds), tag));
        let content_stage = self.layout.content_staging(ds, &tag);
        undo.scratch(&stage);
        undo.scratch(&content_stage);

        create_dir_all(&stage.join(crate::consts::SNAPSHOTS_DIR))?;
        undo.write_json(&stage.join(crate::consts::DATASET_FILE), &entry.record, self.cfg.fsync)?;
        undo.write_json(&stage.join(crate::consts::PROPERTIES_FILE), &entry.local, self.cfg.fsync)?;

        let content_stage = match seed {
            Seed::Adopt(prepared) => prepared.to_path_buf(),
            Seed::CopyOf(src) => {
                copy_tree(src, &content_stage, &[])?;
                content_stage
            }
            Seed::Empty => {
                create_dir_all(&content_stage)?;
                if let Some(size) = entry.record.volsize {
                    let f = OpenOptions::new()
                        .create_new(true)
                        .write(true)
                        .open(content_stage.join(crate::consts::VOLUME_FILE))
                        .with_context(|| format!("create volume file for {}", ds))?;
                    f.set_len(size)
                        .with_context(|| format!("size volume file for {}", ds))?;
                }
                content_stage
            }
        };

        undo.move_path(&content_stage, &content)?;
        undo.move_path(&stage, &self.layout.dataset_dir(ds))?;
        Ok(())
    }

    /// Everything a destroy of `roots` has to remove, including clones of
    /// their snapshots when `cascade_clones` is set.
    pub(crate) fn destroy_closure(&self, roots: Vec<DatasetName>, cascade_clones: bool) -> Result<Vec<DatasetName>> {
        let mut set: BTreeSet<String> = roots.iter().map(|d| d.to_string()).collect();
        let mut queue = roots;
        while let Some(ds) = queue.pop() {
            let entry = match self.ns.get(&ds) {
                Some(e) => e,
                None => continue,
            };
            for s in &entry.snapshots {
                let snap = ds.snapshot(&s.label)?;
                for clone in self.ns.clones_of(&snap) {
                    if set.contains(clone.as_str()) {
                        continue;
                    }
                    if !cascade_clones {
                        return Err(ZfsError::Dependency(format!(
                            "cannot destroy {}: snapshot {} has dependent clone {}; use -R",
                            ds, snap, clone
                        ))
                        .into());
                    }
                    let mut add = vec![clone.clone()];
                    add.extend(self.ns.descendants(&clone));
                    for a in add {
                        if set.insert(a.to_string()) {
                            queue.push(a);
                        }
                    }
                }
            }
        }
        let mut out: Vec<DatasetName> = set
            .iter()
            .filter_map(|s| DatasetName::parse(s).ok())
            .collect();
        // children before parents
        out.sort_by(|a, b| b.depth().cmp(&a.depth()).then(a.cmp_components(b)));
        Ok(out)
    }

    /// Destroy a dataset. Children and snapshots require `recursive`; clones of
    /// its snapshots require `cascade_clones`.
    pub fn destroy_dataset(&mut self, ds: &DatasetName, recursive: bool, cascade_clones: bool) -> Result<()> {
        self.ensure_writable()?;
        let entry = self.entry(ds)?;
        if ds.is_root() {
            return Err(ZfsError::Name(format!(
                "{}: cannot destroy the pool root dataset; use zzzpool destroy",
                ds
            ))
            .into());
        }
        let children = self.ns.descendants(ds);
        if !recursive {
            if !children.is_empty() {
                let names: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                return Err(ZfsError::NotEmpty(format!(
                    "cannot destroy {}: filesystem has children: {}",
                    ds,
                    names.join(", ")
                ))
                .into());
            }
            if !entry.snapshots.is_empty() {
                return Err(ZfsError::NotEmpty(format!(
                    "cannot destroy {}: filesystem has {} snapshot(s)",
                    ds,
                    entry.snapshots.len()
                ))
                .into());
            }
        }
        let mut roots = vec![ds.clone()];
        roots.extend(children);
        let victims = self.destroy_closure(roots, cascade_clones)?;
        self.discard(&victims, &[])?;

        let flag = match (recursive, cascade_clones) {
            (_, true) => "-R ",
            (true, false) => "-r ",
            _ => "",
        };
        self.done(&format!("destroyed {}", ds), || format!("zzzfs destroy {}{}", flag, ds))
    }

    /// Drop `datasets` (children before parents) and `snaps` from the pool.
    /// Everything is first moved aside under one journal, so a failure
    /// leaves the pool as it was; the trash is deleted after commit.
    pub(crate) fn discard(&mut self, datasets: &[DatasetName], snaps: &[SnapshotName]) -> Result<()> {
        if datasets.is_empty() && snaps.is_empty() {
            return Ok(());
        }
        let tag = staging_tag("destroy");
        let state_trash = self.layout.staging_dir(&tag);
        let content_trash = self.layout.content_staging(&self.root_dataset()?, &tag);
        let mut undo = Undo::new();
        undo.scratch(&state_trash);
        create_dir_all(&state_trash)?;
        undo.scratch(&content_trash);

        for s in snaps {
            let slot = format!("{}@{}", escape_dataset(s.dataset()), s.label());
            undo.move_path(&self.layout.snapshot_dir(s), &state_trash.join(slot))?;
        }
        for d in datasets {
            let content = self.layout.content_dir(d);
            // an unavailable dataset has no content left to move
            if std::fs::symlink_metadata(&content).is_ok() {
                create_dir_all(&content_trash)?;
                undo.move_path(&content, &content_trash.join(escape_dataset(d)))?;
            }
            undo.move_path(&self.layout.dataset_dir(d), &state_trash.join(escape_dataset(d)))?;
        }
        undo.commit();

        for p in [&state_trash, &content_trash] {
            if let Err(e) = remove_path(p) {
                warn!("pool {}: cleanup {}: {:#}", self.name(), p.display(), e);
            }
        }
        for s in snaps {
            if let Some(e) = self.ns.get_mut(s.dataset()) {
                e.snapshots.retain(|r| r.label != s.label());
            }
            record_snapshot_destroyed();
            debug!("pool {}: removed snapshot {}", self.name(), s);
        }
        for d in datasets {
            self.ns.remove(d);
            record_dataset_destroyed();
            debug!("pool {}: removed {}", self.name(), d);
        }
        Ok(())
    }

    /// Dispatch on the target kind.
    pub fn destroy(&mut self, target: &Target, recursive: bool, cascade_clones: bool) -> Result<()> {
        match target {
            Target::Dataset(d) => self.destroy_dataset(d, recursive, cascade_clones),
            Target::Snapshot(s) => self.destroy_snapshot(s, recursive, cascade_clones),
        }
    }

    /// Summaries for `roots` (all datasets when empty), optionally with
    /// descendants, limited to `depth` levels below each root.
    pub fn list(
        &self,
        filter: TypeFilter,
        roots: &[Target],
        recursive: bool,
        depth: Option<usize>,
    ) -> Result<Vec<DatasetSummary>> {
        let mut datasets: BTreeSet<Vec<String>> = BTreeSet::new();
        let mut snapshots: Vec<SnapshotName> = Vec::new();
        let add = |d: &DatasetName, set: &mut BTreeSet<Vec<String>>| {
            set.insert(d.components().map(str::to_string).collect());
        };

        if roots.is_empty() {
            for d in self.ns.names() {
                add(&d, &mut datasets);
            }
        } else {
            for t in roots {
                match t {
                    Target::Snapshot(s) => {
                        self.snapshot_record(s)?;
                        snapshots.push(s.clone());
                    }
                    Target::Dataset(d) => {
                        self.entry(d)?;
                        add(d, &mut datasets);
                        if recursive || depth.is_some() {
                            for c in self.ns.descendants(d) {
                                let rel = c.depth() - d.depth();
                                if depth.map(|m| rel <= m).unwrap_or(true) {
                                    add(&c, &mut datasets);
                                }
                            }
                        }
                    }
                }
            }
        }

        let names: Vec<DatasetName> = datasets
            .iter()
            .filter_map(|parts| DatasetName::parse(&parts.join("/")).ok())
            .collect();
        if filter.snapshots {
            for d in &names {
                if let Some(e) = self.ns.get(d) {
                    for s in &e.snapshots {
                        snapshots.push(d.snapshot(&s.label)?);
                    }
                }
            }
        }

        let sizes = self.space_usage()?;
        let avail = fs2::available_space(&self.layout.content_root()).ok();
        let mut rows: Vec<(Vec<String>, u8, u64, DatasetSummary)> = Vec::new();

        for d in &names {
            let e = self.entry(d)?;
            if !filter.accepts(&e.record.kind.to_string()) {
                continue;
            }
            let (used, refer) = sizes.get(d.as_str()).copied().unwrap_or((None, None));
            rows.push((
                d.components().map(str::to_string).collect(),
                0,
                0,
                DatasetSummary {
                    name: d.to_string(),
                    kind: e.record.kind.to_string(),
                    used,
                    avail,
                    refer,
                    mountpoint: self.mountpoint_of(d),
                    origin: e.record.origin.clone().unwrap_or_else(|| "-".into()),
                },
            ));
        }
        let mut seen = BTreeSet::new();
        for s in &snapshots {
            if !seen.insert(s.to_string()) {
                continue;
            }
            let rec = self.snapshot_record(s)?;
            rows.push((
                s.dataset().components().map(str::to_string).collect(),
                1,
                rec.createtxg,
                DatasetSummary {
                    name: s.to_string(),
                    kind: "snapshot".into(),
                    used: Some(rec.referenced),
                    avail: None,
                    refer: Some(rec.referenced),
                    mountpoint: "-".into(),
                    origin: "-".into(),
                },
            ));
        }
        // dataset, then its snapshots by creation, then its children
        rows.sort_by(|a, b| (&a.0, a.1, a.2).cmp(&(&b.0, b.1, b.2)));
        Ok(rows.into_iter().map(|r| r.3).collect())
    }

    /// Resolved mountpoint; `-` for volumes.
    pub(crate) fn mountpoint_of(&self, ds: &DatasetName) -> String {
        match self.ns.get(ds) {
            Some(e) if e.record.kind == DatasetKind::Volume => "-".into(),
            _ => match props::resolve_explicit(&self.ns, ds, MOUNTPOINT) {
                Some(pv) => pv.value,
                None => self.layout.content_dir(ds).display().to_string(),
            },
        }
    }

    /// (used, referenced) per dataset. `used` covers the dataset's own
    /// content, its snapshots and all descendants.
    pub(crate) fn space_usage(&self) -> Result<HashMap<String, (Option<u64>, Option<u64>)>> {
        let names = self.ns.names();
        let mut refer: HashMap<String, Option<u64>> = HashMap::new();
        let mut own: HashMap<String, Option<u64>> = HashMap::new();
        for d in &names {
            let r = self.referenced(d);
            let snaps: u64 = self
                .ns
                .get(d)
                .map(|e| e.snapshots.iter().map(|s| s.referenced).sum())
                .unwrap_or(0);
            own.insert(d.to_string(), r.map(|r| r + snaps));
            refer.insert(d.to_string(), r);
        }
        let mut out = HashMap::new();
        for d in &names {
            let mut used = own.get(d.as_str()).copied().flatten();
            for c in self.ns.descendants(d) {
                used = match (used, own.get(c.as_str()).copied().flatten()) {
                    (Some(a), Some(b)) => Some(a + b),
                    _ => None,
                };
            }
            out.insert(d.to_string(), (used, refer.get(d.as_str()).copied().flatten()));
        }
        Ok(out)
    }

    /// Bytes in the live content, children excluded.
    pub(crate) fn referenced(&self, ds: &DatasetName) -> Option<u64> {
        let excludes = self.content_excludes(ds).ok()?;
        tree_size(&self.layout.content_dir(ds), &excludes).ok()
    }

    /// Rename a dataset (with its descendants) or a snapshot.
    pub fn rename(&mut self, from: &Target, to: &Target, create_parents: bool) -> Result<()> {
        match (from, to) {
            (Target::Snapshot(a), Target::Snapshot(b)) => self.rename_snapshot(a, b),
            (Target::Dataset(a), Target::Dataset(b)) => self.rename_dataset(a, b, create_parents),
            _ => Err(ZfsError::Name(format!(
                "cannot rename {} to {}: mismatched dataset types",
                from, to
            ))
            .into()),
        }
    }

    pub fn rename_dataset(&mut self, from: &DatasetName, to: &DatasetName, create_parents: bool) -> Result<()> {
        self.ensure_writable()?;
        self.entry(from)?;
        if from.pool() != to.pool() {
            return Err(ZfsError::Name(format!(
                "cannot rename {} to {}: different pool",
                from, to
            ))
            .into());
        }
        if from.is_root() {
            return Err(ZfsError::Name(format!("{}: cannot rename the pool root dataset", from)).into());
        }
        if self.ns.contains(to) {
            return Err(ZfsError::Name(format!("{}: dataset already exists", to)).into());
        }
        if to.is_within(from) {
            return Err(ZfsError::Name(format!(
                "cannot rename {} to {}: a dataset cannot move below itself",
                from, to
            ))
            .into());
        }
        let mut missing = Vec::new();
        if create_parents {
            for anc in to.ancestors() {
                if self.ns.contains(&anc) {
                    break;
                }
                missing.push(anc);
            }
            missing.reverse();
        }
        match missing.first() {
            Some(top) => self.check_parent(top)?,
            None => self.check_parent(to)?,
        }
        let to_content = self.layout.content_dir(to);
        if std::fs::symlink_metadata(&to_content).is_ok() {
            return Err(ZfsError::Name(format!(
                "{}: {} already exists in the parent's content",
                to,
                to_content.display()
            ))
            .into());
        }

        for anc in &missing {
            let entry = self.new_entry(anc, DatasetKind::Filesystem, BTreeMap::new(), None)?;
            self.materialize(anc, entry, Seed::Empty)?;
        }

        let mut moved = vec![from.clone()];
        moved.extend(self.ns.descendants(from));

        let mut undo = Undo::new();
        undo.move_path(&self.layout.content_dir(from), &to_content)?;
        for d in &moved {
            let nd = d.reparent(from, to);
            undo.move_path(&self.layout.dataset_dir(d), &self.layout.dataset_dir(&nd))?;
        }

        // new entries, with origins rewritten wherever they pointed into the moved subtree
        let mut entries: Vec<(DatasetName, DatasetEntry)> = Vec::new();
        for d in &moved {
            if let Some(e) = self.ns.get(d) {
                let nd = d.reparent(from, to);
                let mut e = e.clone();
                e.record.name = nd.to_string();
                entries.push((nd, e));
            }
        }
        let mut rewired: Vec<(DatasetName, DatasetEntry)> = Vec::new();
        for d in self.ns.names() {
            if d.is_within(from) {
                continue;
            }
            if let Some(e) = self.ns.get(&d) {
                if let Some(o) = rewrite_origin(e.record.origin.as_deref(), from, to) {
                    let mut e = e.clone();
                    e.record.origin = Some(o);
                    rewired.push((d, e));
                }
            }
        }
        for (_, e) in entries.iter_mut() {
            if let Some(o) = rewrite_origin(e.record.origin.as_deref(), from, to) {
                e.record.origin = Some(o);
            }
        }
        for (d, e) in entries.iter().chain(rewired.iter()) {
            self.persist_entry(&mut undo, d, e)?;
        }
        undo.commit();

        for d in &moved {
            self.ns.remove(d);
        }
        for (d, e) in entries.into_iter().chain(rewired) {
            self.ns.insert(&d, e);
        }
        record_rename();
        self.done(&format!("renamed {} to {}", from, to), || {
            format!("zzzfs rename {}{} {}", if create_parents { "-p " } else { "" }, from, to)
        })
    }

    pub fn rename_snapshot(&mut self, from: &SnapshotName, to: &SnapshotName) -> Result<()> {
        self.ensure_writable()?;
        self.snapshot_record(from)?;
        if from.dataset() != to.dataset() {
            return Err(ZfsError::Name(format!(
                "cannot rename {} to {}: snapshots must stay on the same dataset",
                from, to
            ))
            .into());
        }
        if self.ns.snapshot(to).is_some() {
            return Err(ZfsError::Name(format!("{}: snapshot already exists", to)).into());
        }
        let mut undo = Undo::new();
        undo.move_path(&self.layout.snapshot_dir(from), &self.layout.snapshot_dir(to))?;

        let mut rec = self.snapshot_record(from)?.clone();
        rec.label = to.label().to_string();
        undo.write_json(&self.layout.snapshot_file(to), &rec, self.cfg.fsync)?;

        let key = from.to_string();
        let mut rewired = Vec::new();
        for c in self.ns.clones_of(from) {
            if let Some(e) = self.ns.get(&c) {
                let mut e = e.clone();
                e.record.origin = Some(to.to_string());
                rewired.push((c, e));
            }
        }
        for (d, e) in &rewired {
            self.persist_entry(&mut undo, d, e)?;
        }
        undo.commit();

        if let Some(e) = self.ns.get_mut(from.dataset()) {
            if let Some(s) = e.snapshots.iter_mut().find(|s| s.label == from.label()) {
                *s = rec;
            }
        }
        for (d, e) in rewired {
            self.ns.insert(&d, e);
        }
        record_rename();
        self.done(&format!("renamed {} to {}", key, to), || {
            format!("zzzfs rename {} {}", from, to)
        })
    }
}

/// "old/x@s" → "new/x@s" when the origin dataset lies under `from`.
fn rewrite_origin(origin: Option<&str>, from: &DatasetName, to: &DatasetName) -> Option<String> {
    let snap = SnapshotName::parse(origin?).ok()?;
    if !snap.dataset().is_within(from) {
        return None;
    }
    Some(format!("{}@{}", snap.dataset().reparent(from, to), snap.label()))
}

//! pool/snapshot — snapshot create/destroy/rollback and diff.
//!
//! A snapshot is a full copy of the dataset's live content (child dataset
//! directories excluded) taken into `snapshots/<label>/data`, plus the
//! attribute values resolved at that moment. There is no copy-on-write
//! underneath: a snapshot costs as much space as the content it freezes.

use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::diff::Diff;
use crate::error::ZfsError;
use crate::fsops::{copy_tree, create_dir_all, remove_path, Undo};
use crate::layout::staging_tag;
use crate::metrics::{record_rollback, record_snapshot_created, record_snapshot_destroyed};
use crate::name::{DatasetName, SnapshotName, Target};
use crate::namespace::{PropValue, SnapshotRecord, Source};
use crate::props::{explicit_set, validate_assignment, MOUNTPOINT};
use crate::util::now_unix_ms;

use super::core::PoolHandle;

impl PoolHandle {
    /// Snapshot each dataset in `snaps` (and, with `recursive`, every
    /// descendant under the same label). All snapshots share one txg and
    /// either all appear or none does.
    pub fn snapshot(&mut self, snaps: &[SnapshotName], recursive: bool) -> Result<Vec<SnapshotName>> {
        self.snapshot_with(snaps, recursive, &BTreeMap::new())
    }

    /// `snapshot`, attaching `props` to every snapshot taken.
    pub fn snapshot_with(
        &mut self,
        snaps: &[SnapshotName],
        recursive: bool,
        props: &BTreeMap<String, String>,
    ) -> Result<Vec<SnapshotName>> {
        self.ensure_writable()?;
        for (k, v) in props {
            validate_assignment(k, v)?;
            if k == MOUNTPOINT {
                return Err(ZfsError::Name("snapshots have no mountpoint".into()).into());
            }
        }
        let mut all: Vec<SnapshotName> = Vec::new();
        for s in snaps {
            self.entry(s.dataset())?;
            all.push(s.clone());
            if recursive {
                for d in self.ns.descendants(s.dataset()) {
                    all.push(d.snapshot(s.label())?);
                }
            }
        }
        all.sort_by(|a, b| a.dataset().cmp_components(b.dataset()).then(a.label().cmp(b.label())));
        all.dedup();
        for s in &all {
            if self.ns.snapshot(s).is_some() {
                return Err(ZfsError::Name(format!("{}: snapshot already exists", s)).into());
            }
        }
        if all.is_empty() {
            return Ok(all);
        }

        self.take_snapshots(&all, props)?;
        let names: Vec<String> = snaps.iter().map(|s| s.to_string()).collect();
        let r = if recursive { "-r " } else { "" };
        let o: String = props.iter().map(|(k, v)| format!("-o {}={} ", k, v)).collect();
        self.done(&format!("snapshot {}", names.join(" ")), || {
            format!("zzzfs snapshot {}{}{}", r, o, names.join(" "))
        })?;
        Ok(all)
    }

    /// Copy content and freeze attributes for every name in `all` under a
    /// single txg. Either every snapshot appears or none does.
    pub(crate) fn take_snapshots(
        &mut self,
        all: &[SnapshotName],
        own: &BTreeMap<String, String>,
    ) -> Result<()> {
        let txg = self.next_txg()?;
        let now = now_unix_ms();
        let tag = staging_tag("snap");
        let mut undo = Undo::new();
        let mut made: Vec<(SnapshotName, SnapshotRecord)> = Vec::new();
        for s in all {
            let ds = s.dataset();
            let stage = self
                .layout
                .snapshots_dir(ds)
                .join(format!(".{}.{}", s.label(), tag));
            undo.scratch(&stage);
            create_dir_all(&stage)?;
            let excludes = self.content_excludes(ds)?;
            let bytes = copy_tree(
                &self.layout.content_dir(ds),
                &stage.join(crate::consts::SNAPSHOT_DATA_DIR),
                &excludes,
            )?;
            let rec = SnapshotRecord {
                label: s.label().to_string(),
                created_unix_ms: now,
                createtxg: txg,
                properties: explicit_set(&self.ns, ds),
                referenced: bytes,
                own: own.clone(),
            };
            undo.write_json(&stage.join(crate::consts::SNAPSHOT_FILE), &rec, self.cfg.fsync)?;
            let fin = self.layout.snapshot_dir(s);
            undo.move_path(&stage, &fin)?;
            made.push((s.clone(), rec));
        }
        undo.commit();

        for (s, rec) in made {
            if let Some(e) = self.ns.get_mut(s.dataset()) {
                e.snapshots.push(rec);
                e.sort_snapshots();
            }
            record_snapshot_created();
            debug!("pool {}: snapshot {} at txg {}", self.name(), s, txg);
        }
        Ok(())
    }

    /// Destroy a snapshot (with `recursive`, the same label on every
    /// descendant). Clones depending on it need `cascade_clones`.
    pub fn destroy_snapshot(&mut self, snap: &SnapshotName, recursive: bool, cascade_clones: bool) -> Result<()> {
        self.ensure_writable()?;
        self.snapshot_record(snap)?;
        let mut victims = vec![snap.clone()];
        if recursive {
            for d in self.ns.descendants(snap.dataset()) {
                let s = d.snapshot(snap.label())?;
                if self.ns.snapshot(&s).is_some() {
                    victims.push(s);
                }
            }
        }
        let mut clones: Vec<DatasetName> = Vec::new();
        for s in &victims {
            for c in self.ns.clones_of(s) {
                if !cascade_clones {
                    return Err(ZfsError::Dependency(format!(
                        "cannot destroy {}: snapshot has dependent clone {}; use -R",
                        s, c
                    ))
                    .into());
                }
                clones.push(c);
            }
        }
        let mut doomed = Vec::new();
        if !clones.is_empty() {
            let mut roots = Vec::new();
            for c in clones {
                roots.extend(self.ns.descendants(&c));
                roots.push(c);
            }
            doomed = self.clone_closure(roots)?;
        }
        // snapshots of datasets that go away anyway leave with them
        victims.retain(|s| !doomed.contains(s.dataset()));
        self.discard(&doomed, &victims)?;

        let flag = match (recursive, cascade_clones) {
            (_, true) => "-R ",
            (true, false) => "-r ",
            _ => "",
        };
        self.done(&format!("destroyed {}", snap), || format!("zzzfs destroy {}{}", flag, snap))
    }

    /// Datasets (children first) reachable from `roots` through descendants
    /// and clones of their snapshots.
    fn clone_closure(&self, roots: Vec<DatasetName>) -> Result<Vec<DatasetName>> {
        let mut seen: BTreeMap<String, DatasetName> = BTreeMap::new();
        let mut queue = roots;
        while let Some(d) = queue.pop() {
            if seen.contains_key(d.as_str()) {
                continue;
            }
            if let Some(e) = self.ns.get(&d) {
                for s in &e.snapshots {
                    for c in self.ns.clones_of(&d.snapshot(&s.label)?) {
                        queue.extend(self.ns.descendants(&c));
                        queue.push(c);
                    }
                }
            }
            seen.insert(d.to_string(), d);
        }
        let mut out: Vec<DatasetName> = seen.into_values().collect();
        out.sort_by(|a, b| b.depth().cmp(&a.depth()).then(a.cmp_components(b)));
        Ok(out)
    }

    /// Restore content and local overrides from `snap`. Newer snapshots must
    /// be destroyed, which requires `force` and fails if any has clones.
    pub fn rollback(&mut self, snap: &SnapshotName, force: bool) -> Result<()> {
        self.ensure_writable()?;
        self.rollback_inner(snap, force)?;
        let r = if force { "-r " } else { "" };
        self.done(&format!("rolled back to {}", snap), || {
            format!("zzzfs rollback {}{}", r, snap)
        })
    }

    pub(crate) fn rollback_inner(&mut self, snap: &SnapshotName, force: bool) -> Result<()> {
        let rec = self.snapshot_record(snap)?.clone();
        let ds = snap.dataset().clone();
        let newer: Vec<SnapshotName> = self
            .entry(&ds)?
            .snapshots
            .iter()
            .filter(|s| s.createtxg > rec.createtxg)
            .map(|s| ds.snapshot(&s.label))
            .collect::<Result<_>>()?;
        if !newer.is_empty() {
            let names: Vec<String> = newer.iter().map(|s| s.to_string()).collect();
            if !force {
                return Err(ZfsError::Dependency(format!(
                    "cannot rollback to {}: more recent snapshots exist: {}; use -r to destroy them",
                    snap,
                    names.join(", ")
                ))
                .into());
            }
            for s in &newer {
                if let Some(c) = self.ns.clones_of(s).first() {
                    return Err(ZfsError::Dependency(format!(
                        "cannot rollback to {}: {} has dependent clone {}",
                        snap, s, c
                    ))
                    .into());
                }
            }
        }

        let tag = staging_tag("rollback");
        let stage = self.layout.content_staging(&ds, &tag);
        let trash = self.layout.staging_dir(&tag);

        let mut undo = Undo::new();
        undo.scratch(&stage);
        copy_tree(&self.layout.snapshot_data(snap), &stage, &[])?;
        let old = self.install_content(&mut undo, &ds, &stage)?;

        let local: BTreeMap<String, String> = rec
            .properties
            .iter()
            .filter(|(_, v)| v.source == Source::Local)
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        undo.write_json(&self.layout.properties_file(&ds), &local, self.cfg.fsync)?;

        if !newer.is_empty() {
            create_dir_all(&trash)?;
            undo.scratch(&trash);
            for s in &newer {
                undo.move_path(&self.layout.snapshot_dir(s), &trash.join(s.label()))?;
            }
        }
        undo.commit();

        for p in [&old, &trash] {
            if let Err(e) = remove_path(p) {
                warn!("pool {}: cleanup {}: {:#}", self.name(), p.display(), e);
            }
        }
        if let Some(e) = self.ns.get_mut(&ds) {
            e.local = local;
            e.snapshots.retain(|s| s.createtxg <= rec.createtxg);
        }
        for _ in &newer {
            record_snapshot_destroyed();
        }
        record_rollback();
        Ok(())
    }

    /// Replace the live content of `ds` with the prepared tree at `stage`.
    /// Child dataset directories are carried over into the new tree. Returns
    /// where the previous content went; the caller removes it after commit.
    pub(crate) fn install_content(&self, undo: &mut Undo, ds: &DatasetName, stage: &Path) -> Result<PathBuf> {
        let content = self.layout.content_dir(ds);
        let old = self.layout.content_staging(ds, &staging_tag("old"));
        for child in self.ns.children(ds) {
            let leaf = child.leaf();
            let at = stage.join(leaf);
            if std::fs::symlink_metadata(&at).is_ok() {
                warn!(
                    "pool {}: {} is shadowed by child dataset {}, dropping it",
                    self.name(),
                    at.display(),
                    child
                );
                remove_path(&at)?;
            }
            let live = content.join(leaf);
            if std::fs::symlink_metadata(&live).is_ok() {
                undo.move_path(&live, &at)?;
            }
        }
        undo.move_path(&content, &old)?;
        undo.move_path(stage, &content)?;
        Ok(old)
    }

    /// Lazy diff from `old` to `new` (the live content of `old`'s dataset
    /// when `new` is `None`). Iterate while the handle is open.
    pub fn diff(&self, old: &Target, new: Option<&Target>) -> Result<Diff> {
        let live;
        let new = match new {
            Some(t) => t,
            None => {
                live = Target::Dataset(old.dataset().clone());
                &live
            }
        };
        let side = |t: &Target| -> Result<(PathBuf, Vec<String>)> {
            match t {
                Target::Snapshot(s) => {
                    self.snapshot_record(s)?;
                    Ok((self.layout.snapshot_data(s), Vec::new()))
                }
                Target::Dataset(d) => {
                    self.entry(d)?;
                    Ok((self.layout.content_dir(d), self.content_excludes(d)?))
                }
            }
        };
        let (a, ax) = side(old)?;
        let (b, bx) = side(new)?;
        Ok(Diff::new(&a, ax, &b, bx))
    }

    /// Frozen attribute values of a snapshot.
    pub fn snapshot_properties(&self, snap: &SnapshotName) -> Result<BTreeMap<String, PropValue>> {
        Ok(self.snapshot_record(snap)?.properties.clone())
    }
}

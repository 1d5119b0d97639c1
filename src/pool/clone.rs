//! pool/clone — clone creation and promote.
//!
//! A clone is a full copy of a snapshot's frozen content that records the
//! snapshot as its `origin`; the origin cannot be destroyed while the clone
//! exists. Promote inverts the relationship: the snapshots taken up to the
//! clone point move over to the clone, and the former origin dataset becomes
//! a clone of the promoted one.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::error::ZfsError;
use crate::fsops::Undo;
use crate::metrics::{record_clone_created, record_promote};
use crate::name::{DatasetName, SnapshotName};
use crate::namespace::{DatasetEntry, DatasetKind, Source};
use crate::props::validate_assignment;

use super::core::PoolHandle;
use super::dataset::Seed;

impl PoolHandle {
    /// Create `target` from `snap`. The snapshot's frozen local overrides are
    /// carried over, then `props` applied on top.
    pub fn clone_snapshot(
        &mut self,
        snap: &SnapshotName,
        target: &DatasetName,
        props: &BTreeMap<String, String>,
        create_parents: bool,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.check_pool(target.pool())?;
        if snap.pool() != target.pool() {
            return Err(ZfsError::Name(format!(
                "cannot clone {} to {}: clones must stay in the same pool",
                snap, target
            ))
            .into());
        }
        let rec = self.snapshot_record(snap)?.clone();
        let src = self.entry(snap.dataset())?.record.clone();
        for (k, v) in props {
            validate_assignment(k, v)?;
        }
        if self.ns.contains(target) {
            return Err(ZfsError::Name(format!("{}: dataset already exists", target)).into());
        }
        let mut missing = Vec::new();
        if create_parents {
            for anc in target.ancestors() {
                if self.ns.contains(&anc) {
                    break;
                }
                missing.push(anc);
            }
            missing.reverse();
        }
        match missing.first() {
            Some(top) => self.check_parent(top)?,
            None => self.check_parent(target)?,
        }
        for anc in &missing {
            let entry = self.new_entry(anc, DatasetKind::Filesystem, BTreeMap::new(), None)?;
            self.materialize(anc, entry, Seed::Empty)?;
        }

        let mut local: BTreeMap<String, String> = rec
            .properties
            .iter()
            .filter(|(_, v)| v.source == Source::Local)
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        local.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut entry: DatasetEntry = self.new_entry(target, src.kind, local, src.volsize)?;
        entry.record.origin = Some(snap.to_string());
        let data = self.layout.snapshot_data(snap);
        self.materialize(target, entry, Seed::CopyOf(&data))?;
        record_clone_created();

        let p = if create_parents { "-p " } else { "" };
        self.done(&format!("cloned {} to {}", snap, target), || {
            format!("zzzfs clone {}{} {}", p, snap, target)
        })
    }

    /// Make `clone` independent of its origin.
    pub fn promote(&mut self, clone: &DatasetName) -> Result<()> {
        self.ensure_writable()?;
        let origin = match self.ns.origin_of(clone) {
            Some(o) => o,
            None => {
                self.entry(clone)?;
                return Err(ZfsError::Dependency(format!(
                    "cannot promote {}: not a cloned filesystem",
                    clone
                ))
                .into());
            }
        };
        let point = self.snapshot_record(&origin)?.createtxg;
        let parent_ds = origin.dataset().clone();
        let parent = self.entry(&parent_ds)?.clone();
        let mine = self.entry(clone)?.clone();

        let moving: Vec<String> = parent
            .snapshots
            .iter()
            .filter(|s| s.createtxg <= point)
            .map(|s| s.label.clone())
            .collect();
        for label in &moving {
            if mine.snapshot(label).is_some() {
                return Err(ZfsError::Name(format!(
                    "cannot promote {}: snapshot {}@{} conflicts with {}@{}",
                    clone, clone, label, parent_ds, label
                ))
                .into());
            }
        }

        let mut undo = Undo::new();
        for label in &moving {
            let from = parent_ds.snapshot(label)?;
            let to = clone.snapshot(label)?;
            undo.move_path(&self.layout.snapshot_dir(&from), &self.layout.snapshot_dir(&to))?;
        }

        let mut new_mine = mine.clone();
        let mut new_parent = parent.clone();
        new_mine.record.origin = parent.record.origin.clone();
        new_parent.record.origin = Some(clone.snapshot(origin.label())?.to_string());
        for label in &moving {
            if let Some(s) = parent.snapshot(label) {
                new_mine.snapshots.push(s.clone());
            }
        }
        new_mine.sort_snapshots();
        new_parent.snapshots.retain(|s| !moving.contains(&s.label));

        // every other dataset cloned from a moved snapshot now hangs off `clone`
        let mut rewired: Vec<(DatasetName, DatasetEntry)> = Vec::new();
        for label in &moving {
            let from = parent_ds.snapshot(label)?;
            for c in self.ns.clones_of(&from) {
                if &c == clone {
                    continue;
                }
                if let Some(e) = self.ns.get(&c) {
                    let mut e = e.clone();
                    e.record.origin = Some(clone.snapshot(label)?.to_string());
                    rewired.push((c, e));
                }
            }
        }

        self.persist_entry(&mut undo, clone, &new_mine)?;
        self.persist_entry(&mut undo, &parent_ds, &new_parent)?;
        for (d, e) in &rewired {
            self.persist_entry(&mut undo, d, e)?;
        }
        undo.commit();

        self.ns.insert(clone, new_mine);
        self.ns.insert(&parent_ds, new_parent);
        for (d, e) in rewired {
            self.ns.insert(&d, e);
        }
        record_promote();
        self.done(&format!("promoted {}", clone), || format!("zzzfs promote {}", clone))
    }
}

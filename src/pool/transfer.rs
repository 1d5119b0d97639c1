//! pool/transfer — send and receive on top of the stream codec.
//!
//! Receive never touches the destination until the whole stream has been
//! decoded into a staging tree; the swap, the property rewrite and the
//! closing snapshot then run under one undo journal. The closing snapshot
//! freezes the values as they resolve on the destination, so a later
//! rollback to it reproduces what the receive left behind.

use anyhow::Result;
use log::{info, warn};
use std::collections::BTreeMap;
use std::io::Read;

use crate::error::ZfsError;
use crate::fsops::{copy_tree, create_dir_all, remove_path, Undo};
use crate::layout::{escape_dataset, staging_tag};
use crate::metrics::{record_dataset_created, record_dataset_destroyed};
use crate::name::{DatasetName, SnapshotName, Target};
use crate::namespace::{DatasetEntry, PropValue, Source};
use crate::props::{is_readonly, validate_key, MOUNTPOINT};
use crate::stream::{SendStream, StreamHeader, StreamReader};

use super::core::PoolHandle;
use super::dataset::Seed;

/// Streamed values that become local overrides on the destination. An
/// inherited mountpoint points into the sender's hierarchy and is dropped.
fn received_locals(props: &BTreeMap<String, PropValue>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (k, v) in props {
        match v.source {
            Source::Local => {}
            Source::Inherited(_) if k != MOUNTPOINT => {}
            _ => continue,
        }
        if is_readonly(k) || validate_key(k).is_err() {
            warn!("receive: ignoring streamed property {}", k);
            continue;
        }
        out.insert(k.clone(), v.value.clone());
    }
    out
}

impl PoolHandle {
    /// Stream `snap`, or only what changed since `base` (an earlier snapshot
    /// of the same dataset). Read the result while this handle is open.
    pub fn send(&self, snap: &SnapshotName, base: Option<&SnapshotName>) -> Result<SendStream> {
        let rec = self.snapshot_record(snap)?;
        let entry = self.entry(snap.dataset())?;
        let base_dir = match base {
            None => None,
            Some(b) => {
                if b.dataset() != snap.dataset() {
                    return Err(ZfsError::Name(format!(
                        "cannot send {} incrementally from {}: different datasets",
                        snap, b
                    ))
                    .into());
                }
                if self.snapshot_record(b)?.createtxg >= rec.createtxg {
                    return Err(ZfsError::Name(format!(
                        "cannot send {} incrementally from {}: not an earlier snapshot",
                        snap, b
                    ))
                    .into());
                }
                Some(self.layout.snapshot_data(b))
            }
        };
        let header = StreamHeader {
            dataset: snap.dataset().to_string(),
            label: snap.label().to_string(),
            base_label: base.map(|b| b.label().to_string()),
            kind: entry.record.kind,
            volsize: entry.record.volsize,
            creation_unix_ms: rec.created_unix_ms,
            properties: rec.properties.clone(),
        };
        info!(
            "pool {}: sending {}{}",
            self.name(),
            snap,
            base.map(|b| format!(" from {}", b)).unwrap_or_default()
        );
        SendStream::new(header, &self.layout.snapshot_data(snap), base_dir.as_deref())
    }

    /// Materialize a stream at `dest` and finish with `dest@<label>`.
    /// A full stream needs a new `dest` (or `force`, which replaces it); an
    /// incremental one needs `dest@<base>` as the newest snapshot and no live
    /// changes since (or `force`, which discards them).
    pub fn receive<R: Read>(&mut self, reader: R, dest: &DatasetName, force: bool) -> Result<SnapshotName> {
        self.ensure_writable()?;
        self.check_pool(dest.pool())?;
        let stream = StreamReader::open(reader)?;
        let header = stream.header().clone();
        let target = dest.snapshot(&header.label)?;
        match &header.base_label {
            None => self.receive_full(stream, dest, &target, force)?,
            Some(base) => self.receive_incremental(stream, dest, base, &target, force)?,
        }
        let f = if force { "-F " } else { "" };
        self.done(&format!("received {} into {}", header.label, target), || {
            format!("zzzfs receive {}{}", f, dest)
        })?;
        Ok(target)
    }

    fn receive_full<R: Read>(
        &mut self,
        stream: StreamReader<R>,
        dest: &DatasetName,
        target: &SnapshotName,
        force: bool,
    ) -> Result<()> {
        let header = stream.header().clone();
        let mut victims = Vec::new();
        if self.ns.contains(dest) {
            if !force {
                return Err(ZfsError::Conflict(format!(
                    "cannot receive new filesystem stream: destination {} exists; use -F",
                    dest
                ))
                .into());
            }
            if dest.is_root() {
                return Err(ZfsError::Name(format!(
                    "{}: cannot replace the pool root dataset",
                    dest
                ))
                .into());
            }
            let mut roots = vec![dest.clone()];
            roots.extend(self.ns.descendants(dest));
            victims = self.destroy_closure(roots, false)?;
        } else {
            self.check_parent(dest)?;
        }

        let tag = staging_tag("recv");
        let stage = self.layout.content_staging(dest, &tag);
        let trash = self.layout.staging_dir(&tag);
        let mut undo = Undo::new();
        undo.scratch(&stage);
        create_dir_all(&stage)?;
        let n = stream.apply_to(&stage)?;

        if !victims.is_empty() {
            create_dir_all(&trash)?;
            undo.scratch(&trash);
            undo.move_path(&self.layout.content_dir(dest), &trash.join("content"))?;
            for v in &victims {
                undo.move_path(&self.layout.dataset_dir(v), &trash.join(escape_dataset(v)))?;
            }
        }

        let entry = self.new_entry(dest, header.kind, received_locals(&header.properties), header.volsize)?;
        self.materialize_with(&mut undo, dest, &entry, Seed::Adopt(&stage))?;

        let saved: Vec<(DatasetName, DatasetEntry)> = victims
            .iter()
            .filter_map(|v| self.ns.get(v).map(|e| (v.clone(), e.clone())))
            .collect();
        for v in &victims {
            self.ns.remove(v);
        }
        self.ns.insert(dest, entry);
        if let Err(e) = self.take_snapshots(std::slice::from_ref(target), &BTreeMap::new()) {
            self.ns.remove(dest);
            for (d, e) in saved {
                self.ns.insert(&d, e);
            }
            return Err(e);
        }
        undo.commit();

        if let Err(e) = remove_path(&trash) {
            warn!("pool {}: cleanup {}: {:#}", self.name(), trash.display(), e);
        }
        for _ in &victims {
            record_dataset_destroyed();
        }
        record_dataset_created();
        info!("pool {}: received {} entries into {}", self.name(), n, dest);
        Ok(())
    }

    fn receive_incremental<R: Read>(
        &mut self,
        stream: StreamReader<R>,
        dest: &DatasetName,
        base_label: &str,
        target: &SnapshotName,
        force: bool,
    ) -> Result<()> {
        let header = stream.header().clone();
        let entry = self.entry(dest)?.clone();
        if entry.record.kind != header.kind {
            return Err(ZfsError::Conflict(format!(
                "cannot receive {} stream into {} {}",
                header.kind, entry.record.kind, dest
            ))
            .into());
        }
        let base = dest.snapshot(base_label)?;
        match entry.latest_snapshot() {
            Some(s) if s.label == base_label => {}
            Some(s) if entry.snapshot(base_label).is_some() => {
                return Err(ZfsError::Dependency(format!(
                    "cannot receive incremental stream: {} is not the most recent snapshot of {} ({}@{} is newer)",
                    base, dest, dest, s.label
                ))
                .into())
            }
            _ => {
                return Err(ZfsError::Dependency(format!(
                    "cannot receive incremental stream: {} does not exist",
                    base
                ))
                .into())
            }
        }
        if entry.snapshot(target.label()).is_some() {
            return Err(ZfsError::Conflict(format!("{}: snapshot already exists", target)).into());
        }
        let modified = self
            .diff(&Target::Snapshot(base.clone()), None)?
            .iter()
            .next()
            .transpose()?
            .is_some();
        if modified && !force {
            return Err(ZfsError::Conflict(format!(
                "cannot receive incremental stream: {} has been modified since {}; use -F",
                dest, base
            ))
            .into());
        }

        let stage = self.layout.content_staging(dest, &staging_tag("recv"));
        let mut undo = Undo::new();
        undo.scratch(&stage);
        copy_tree(&self.layout.snapshot_data(&base), &stage, &[])?;
        let n = stream.apply_to(&stage)?;
        let old = self.install_content(&mut undo, dest, &stage)?;
        let local = received_locals(&header.properties);
        undo.write_json(&self.layout.properties_file(dest), &local, self.cfg.fsync)?;

        let mut updated = entry.clone();
        updated.local = local;
        self.ns.insert(dest, updated);
        if let Err(e) = self.take_snapshots(std::slice::from_ref(target), &BTreeMap::new()) {
            self.ns.insert(dest, entry);
            return Err(e);
        }
        undo.commit();

        if let Err(e) = remove_path(&old) {
            warn!("pool {}: cleanup {}: {:#}", self.name(), old.display(), e);
        }
        info!(
            "pool {}: applied {} incremental entries onto {}{}",
            self.name(),
            n,
            dest,
            if modified { " (local changes discarded)" } else { "" }
        );
        Ok(())
    }
}

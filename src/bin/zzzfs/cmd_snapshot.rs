use anyhow::Result;
use std::io::Write;

use zzzfs::cli::parse_props;
use zzzfs::{DatasetName, SnapshotName, Target};

use crate::util::{by_pool, manager, open_ro_for};

pub fn snapshot(names: &[String], recursive: bool, props: &[String]) -> Result<()> {
    let props = parse_props(props)?;
    let mgr = manager();
    let groups = by_pool(names)?;
    // parse everything before touching any pool
    let mut parsed = Vec::new();
    for (pool, ts) in groups {
        let snaps: Vec<SnapshotName> = ts
            .iter()
            .map(|t| SnapshotName::parse(&t.to_string()))
            .collect::<Result<_>>()?;
        parsed.push((pool, snaps));
    }
    for (pool, snaps) in parsed {
        let mut h = mgr.open(&pool)?;
        h.snapshot_with(&snaps, recursive, &props)?;
    }
    Ok(())
}

pub fn rollback(name: &str, recursive: bool) -> Result<()> {
    let snap = SnapshotName::parse(name)?;
    let mut h = manager().open(snap.pool())?;
    h.rollback(&snap, recursive)
}

pub fn diff(old: &str, new: Option<&str>) -> Result<()> {
    let old = Target::Snapshot(SnapshotName::parse(old)?);
    let new = new.map(Target::parse).transpose()?;
    let h = open_ro_for(&old)?;
    let base = h.layout().content_dir(old.dataset());
    let d = h.diff(&old, new.as_ref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for e in d.iter() {
        let e = e?;
        writeln!(out, "{}\t{}", e.change.symbol(), base.join(&e.path).display())?;
    }
    Ok(())
}

pub fn clone(snapshot: &str, target: &str, parents: bool, props: &[String]) -> Result<()> {
    let snap = SnapshotName::parse(snapshot)?;
    let target = DatasetName::parse(target)?;
    let props = parse_props(props)?;
    let mut h = manager().open(snap.pool())?;
    h.clone_snapshot(&snap, &target, &props, parents)
}

pub fn promote(clone: &str) -> Result<()> {
    let ds = DatasetName::parse(clone)?;
    let mut h = manager().open(ds.pool())?;
    h.promote(&ds)
}

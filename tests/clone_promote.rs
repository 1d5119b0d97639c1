use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use zzzfs::{
    error_kind, DatasetKind, DatasetName, ErrorKind, PoolManager, SnapshotName, Target, TypeFilter,
    ZzzBuilder,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("zzztest-clone-{prefix}-{pid}-{t}-{id}"))
}

fn setup(prefix: &str) -> Result<(PathBuf, PoolManager)> {
    let root = unique_root(prefix);
    let dir = root.join("pools");
    fs::create_dir_all(&dir)?;
    let mgr = PoolManager::new(ZzzBuilder::from_default().state_root(root.join("state")).build());
    mgr.create("mypool", &dir, &BTreeMap::new())?;
    Ok((root, mgr))
}

#[test]
fn clone_then_promote_moves_history_to_the_clone() -> Result<()> {
    let (root, mgr) = setup("promote")?;
    let mut h = mgr.open("mypool")?;
    let work = DatasetName::parse("mypool/work")?;
    let work2 = DatasetName::parse("mypool/work2")?;
    let yesterday = SnapshotName::parse("mypool/work@yesterday")?;

    h.create(&work, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    fs::write(h.layout().content_dir(&work).join("report.txt"), b"draft")?;
    h.snapshot(&[yesterday.clone()], false)?;

    let rows = h.list(TypeFilter::all(), &[], false, None)?;
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["mypool", "mypool/work", "mypool/work@yesterday"]);
    assert_eq!(rows[1].mountpoint, h.layout().content_dir(&work).display().to_string());
    assert_eq!(rows[2].mountpoint, "-");

    h.clone_snapshot(&yesterday, &work2, &BTreeMap::new(), false)?;
    let copy = h.layout().content_dir(&work2).join("report.txt");
    assert_eq!(fs::read(&copy)?, b"draft");
    assert_eq!(h.get(&Target::parse("mypool/work2")?, "origin")?.value, "mypool/work@yesterday");

    // the clone is independent content
    fs::write(&copy, b"final")?;
    assert_eq!(fs::read(h.layout().content_dir(&work).join("report.txt"))?, b"draft");

    let err = h.destroy(&Target::parse("mypool/work")?, true, false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Dependency);

    h.promote(&work2)?;
    let moved = SnapshotName::parse("mypool/work2@yesterday")?;
    assert!(h.namespace().snapshot(&moved).is_some());
    assert!(h.namespace().snapshot(&yesterday).is_none());
    assert!(h.layout().snapshot_data(&moved).join("report.txt").exists());
    assert_eq!(h.get(&Target::parse("mypool/work")?, "origin")?.value, "mypool/work2@yesterday");
    assert_eq!(h.get(&Target::parse("mypool/work2")?, "origin")?.value, "-");

    h.destroy(&Target::parse("mypool/work")?, false, false)?;
    let names: Vec<String> = h
        .list(TypeFilter::all(), &[], false, None)?
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["mypool", "mypool/work2", "mypool/work2@yesterday"]);

    // promotion is persisted
    drop(h);
    let h = mgr.open_ro("mypool")?;
    assert!(h.namespace().snapshot(&moved).is_some());
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn promote_moves_only_snapshots_up_to_the_clone_point() -> Result<()> {
    let (root, mgr) = setup("point")?;
    let mut h = mgr.open("mypool")?;
    let a = DatasetName::parse("mypool/a")?;
    h.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    for label in ["s1", "s2", "s3"] {
        h.snapshot(&[a.snapshot(label)?], false)?;
    }
    let b = DatasetName::parse("mypool/b")?;
    let other = DatasetName::parse("mypool/other")?;
    h.clone_snapshot(&a.snapshot("s2")?, &b, &BTreeMap::new(), false)?;
    h.clone_snapshot(&a.snapshot("s1")?, &other, &BTreeMap::new(), false)?;

    h.promote(&b)?;
    let labels = |d: &DatasetName| -> Vec<String> {
        h.namespace()
            .get(d)
            .map(|e| e.snapshots.iter().map(|s| s.label.clone()).collect())
            .unwrap_or_default()
    };
    assert_eq!(labels(&b), vec!["s1", "s2"]);
    assert_eq!(labels(&a), vec!["s3"]);
    assert_eq!(h.get(&Target::parse("mypool/a")?, "origin")?.value, "mypool/b@s2");
    assert_eq!(h.get(&Target::parse("mypool/other")?, "origin")?.value, "mypool/b@s1");
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn clone_rules() -> Result<()> {
    let (root, mgr) = setup("rules")?;
    let mut h = mgr.open("mypool")?;
    let a = DatasetName::parse("mypool/a")?;
    h.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    h.set(&Target::parse("mypool/a")?, "atime", "off")?;
    let s = a.snapshot("s")?;
    h.snapshot(&[s.clone()], false)?;

    let err = h.promote(&a).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Dependency);
    let err = h
        .clone_snapshot(&a.snapshot("missing")?, &DatasetName::parse("mypool/x")?, &BTreeMap::new(), false)
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotFound);
    let err = h.clone_snapshot(&s, &a, &BTreeMap::new(), false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);
    let err = h
        .clone_snapshot(&s, &DatasetName::parse("mypool/deep/x")?, &BTreeMap::new(), false)
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotFound);

    let mut props = BTreeMap::new();
    props.insert("compression".to_string(), "lz4".to_string());
    let deep = DatasetName::parse("mypool/deep/x")?;
    h.clone_snapshot(&s, &deep, &props, true)?;
    let t = Target::parse("mypool/deep/x")?;
    assert_eq!(h.get(&t, "atime")?.value, "off");
    assert_eq!(h.get(&t, "compression")?.value, "lz4");
    assert_eq!(h.get(&t, "origin")?.value, "mypool/a@s");
    fs::remove_dir_all(&root)?;
    Ok(())
}

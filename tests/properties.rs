use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use zzzfs::{error_kind, DatasetKind, DatasetName, ErrorKind, PoolManager, Source, Target, ZzzBuilder};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("zzztest-props-{prefix}-{pid}-{t}-{id}"))
}

fn setup(prefix: &str) -> Result<(PathBuf, PoolManager)> {
    let root = unique_root(prefix);
    let dir = root.join("pools");
    fs::create_dir_all(&dir)?;
    let mgr = PoolManager::new(ZzzBuilder::from_default().state_root(root.join("state")).build());
    mgr.create("tank", &dir, &BTreeMap::new())?;
    let mut h = mgr.open("tank")?;
    h.create(
        &DatasetName::parse("tank/a/b/c")?,
        DatasetKind::Filesystem,
        &BTreeMap::new(),
        true,
    )?;
    Ok((root, mgr))
}

fn t(s: &str) -> Target {
    Target::parse(s).unwrap()
}

#[test]
fn nearest_local_override_is_inherited() -> Result<()> {
    let (root, mgr) = setup("inherit")?;
    let mut h = mgr.open("tank")?;

    let v = h.get(&t("tank/a/b"), "compression")?;
    assert_eq!((v.value.as_str(), &v.source), ("off", &Source::Default));

    h.set(&t("tank"), "compression", "lz4")?;
    let v = h.get(&t("tank/a/b/c"), "compression")?;
    assert_eq!(v.value, "lz4");
    assert_eq!(v.source, Source::Inherited("tank".into()));

    h.set(&t("tank/a"), "compression", "gzip")?;
    let v = h.get(&t("tank/a/b/c"), "compression")?;
    assert_eq!(v.value, "gzip");
    assert_eq!(v.source, Source::Inherited("tank/a".into()));
    assert_eq!(h.get(&t("tank/a"), "compression")?.source, Source::Local);

    h.set(&t("tank/a/b"), "org.example:owner", "ops team")?;
    assert_eq!(h.get(&t("tank/a/b/c"), "org.example:owner")?.value, "ops team");
    let unset = h.get(&t("tank/a"), "org.example:owner")?;
    assert_eq!((unset.value.as_str(), &unset.source), ("-", &Source::None));

    // survives reopen
    drop(h);
    let h = mgr.open_ro("tank")?;
    assert_eq!(h.get(&t("tank/a/b/c"), "compression")?.value, "gzip");
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn inherited_mountpoint_gets_relative_path() -> Result<()> {
    let (root, mgr) = setup("mountpoint")?;
    let mut h = mgr.open("tank")?;
    let default = h.get(&t("tank/a/b"), "mountpoint")?;
    assert_eq!(default.source, Source::Default);
    assert_eq!(
        default.value,
        h.layout().content_dir(&DatasetName::parse("tank/a/b")?).display().to_string()
    );

    h.set(&t("tank/a"), "mountpoint", "/srv/data")?;
    let v = h.get(&t("tank/a/b/c"), "mountpoint")?;
    assert_eq!(v.value, "/srv/data/b/c");
    assert_eq!(v.source, Source::Inherited("tank/a".into()));
    assert_eq!(h.get(&t("tank/a"), "mountpoint")?.value, "/srv/data");
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn bad_assignments_are_rejected() -> Result<()> {
    let (root, mgr) = setup("reject")?;
    let mut h = mgr.open("tank")?;
    for (k, v) in [
        ("used", "1"),
        ("creation", "now"),
        ("atime", "sometimes"),
        ("recordsize", "100"),
        ("mountpoint", "relative/path"),
        ("bad key", "x"),
    ] {
        let err = h.set(&t("tank/a"), k, v).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Name, "{k}={v}");
    }

    h.snapshot(&[zzzfs::SnapshotName::parse("tank/a@s")?], false)?;
    let err = h.set(&t("tank/a@s"), "atime", "off").unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);
    let err = h.inherit(&t("tank/a@s"), "atime", false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);
    let err = h.inherit(&t("tank/a"), "origin", false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);

    let err = h.get(&t("tank/nope"), "atime").unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotFound);
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn inherit_clears_local_overrides() -> Result<()> {
    let (root, mgr) = setup("clear")?;
    let mut h = mgr.open("tank")?;
    h.set(&t("tank"), "atime", "off")?;
    h.set(&t("tank/a"), "atime", "on")?;
    h.set(&t("tank/a/b"), "atime", "on")?;
    h.set(&t("tank/a/b/c"), "atime", "on")?;

    h.inherit(&t("tank/a/b"), "atime", false)?;
    assert_eq!(h.get(&t("tank/a/b"), "atime")?.source, Source::Inherited("tank/a".into()));
    assert_eq!(h.get(&t("tank/a/b/c"), "atime")?.source, Source::Local);

    h.inherit(&t("tank/a"), "atime", true)?;
    for d in ["tank/a", "tank/a/b", "tank/a/b/c"] {
        let v = h.get(&t(d), "atime")?;
        assert_eq!(v.value, "off", "{d}");
        assert_eq!(v.source, Source::Inherited("tank".into()), "{d}");
    }

    // no override anywhere: a no-op, not an error
    h.inherit(&t("tank/a"), "compression", true)?;
    assert_eq!(h.get(&t("tank/a"), "compression")?.source, Source::Default);
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn computed_keys_and_full_listing() -> Result<()> {
    let (root, mgr) = setup("computed")?;
    let mut h = mgr.open("tank")?;
    let a = DatasetName::parse("tank/a")?;
    fs::write(h.layout().content_dir(&a).join("blob"), vec![7u8; 3000])?;
    h.set(&t("tank/a"), "com.example:tag", "x")?;

    assert_eq!(h.get(&t("tank/a"), "type")?.value, "filesystem");
    assert_eq!(h.get(&t("tank/a"), "name")?.value, "tank/a");
    assert_eq!(h.get(&t("tank/a"), "origin")?.value, "-");
    assert_eq!(h.get(&t("tank/a"), "referenced")?.value, "3000");
    let used: u64 = h.get(&t("tank"), "used")?.value.parse()?;
    assert!(used >= 3000);
    let a_txg: u64 = h.get(&t("tank/a"), "createtxg")?.value.parse()?;
    let c_txg: u64 = h.get(&t("tank/a/b/c"), "createtxg")?.value.parse()?;
    assert!(a_txg < c_txg);

    let all = h.properties(&t("tank/a"))?;
    for k in ["name", "type", "creation", "used", "available", "referenced", "mountpoint", "atime", "compression", "com.example:tag"] {
        assert!(all.contains_key(k), "missing {k}");
    }
    assert_eq!(all["com.example:tag"].source, Source::Local);
    assert_eq!(all["atime"].source, Source::Default);
    fs::remove_dir_all(&root)?;
    Ok(())
}

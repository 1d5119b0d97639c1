use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use zzzfs::{error_kind, DatasetKind, DatasetName, ErrorKind, Health, PoolManager, Target, ZzzBuilder};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("zzztest-pool-{prefix}-{pid}-{t}-{id}"))
}

fn manager(root: &PathBuf) -> PoolManager {
    PoolManager::new(ZzzBuilder::from_default().state_root(root.join("state")).build())
}

fn pools_dir(root: &PathBuf) -> Result<PathBuf> {
    let p = root.join("pools");
    fs::create_dir_all(&p)?;
    Ok(p)
}

#[test]
fn create_list_destroy_leaves_nothing_behind() -> Result<()> {
    let root = unique_root("cycle");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);

    let rec = mgr.create("tank", &dir, &BTreeMap::new())?;
    assert_eq!(rec.name, "tank");
    assert!(mgr.exists("tank"));
    let content = rec.altroot.join("tank");
    assert!(content.is_dir());

    let rows = mgr.list()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "tank");
    assert_eq!(rows[0].health, Health::Online);
    assert!(rows[0].alloc.is_some());
    assert!(rows[0].cap.map(|c| c <= 100).unwrap_or(false));

    let err = mgr.create("tank", &dir, &BTreeMap::new()).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);

    mgr.destroy("tank", false)?;
    assert!(!mgr.exists("tank"));
    assert!(!content.exists());
    assert!(mgr.list()?.is_empty());
    assert!(mgr.pool_names()?.is_empty());

    let err = mgr.open("tank").unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotFound);
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn destroy_with_datasets_needs_recursive() -> Result<()> {
    let root = unique_root("destroy");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    mgr.create("tank", &dir, &BTreeMap::new())?;
    {
        let mut h = mgr.open("tank")?;
        h.create(&DatasetName::parse("tank/a")?, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    }
    let err = mgr.destroy("tank", false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotEmpty);
    assert!(mgr.exists("tank"));

    mgr.destroy("tank", true)?;
    assert!(!mgr.exists("tank"));
    assert!(!dir.join("tank").exists());
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn pool_names_are_validated() -> Result<()> {
    let root = unique_root("names");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    for bad in ["mirror", "1tank", "c0d0", "bad/name", "", "-x"] {
        let err = mgr.create(bad, &dir, &BTreeMap::new()).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Name, "{bad:?} must be rejected");
    }
    let long = format!("t{}", "a".repeat(300));
    let err = mgr.create(&long, &dir, &BTreeMap::new()).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);
    assert!(mgr.pool_names()?.is_empty());
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn create_refuses_occupied_or_missing_directory() -> Result<()> {
    let root = unique_root("occupied");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    fs::create_dir_all(dir.join("tank"))?;
    fs::write(dir.join("tank").join("stray"), b"x")?;
    assert!(mgr.create("tank", &dir, &BTreeMap::new()).is_err());
    assert!(!mgr.exists("tank"));
    assert!(dir.join("tank").join("stray").exists());

    assert!(mgr.create("other", &root.join("missing"), &BTreeMap::new()).is_err());
    assert!(!mgr.exists("other"));
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn missing_content_root_reports_unavail() -> Result<()> {
    let root = unique_root("unavail");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    let rec = mgr.create("tank", &dir, &BTreeMap::new())?;
    fs::remove_dir_all(rec.altroot.join("tank"))?;
    let rows = mgr.list()?;
    assert_eq!(rows[0].health, Health::Unavail);
    assert_eq!(rows[0].size, None);

    // an unavailable pool can still be destroyed
    mgr.destroy("tank", false)?;
    assert!(mgr.pool_names()?.is_empty());
    assert_eq!(fs::read_dir(&dir)?.count(), 0);
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn history_keeps_command_text_in_order() -> Result<()> {
    let root = unique_root("history");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    mgr.clone()
        .with_command("zzzpool create tank /somewhere")
        .create("tank", &dir, &BTreeMap::new())?;

    // one record per handle when the command text is known
    {
        let mut h = mgr.clone().with_command("zzzfs create -p tank/a/b").open("tank")?;
        h.create(&DatasetName::parse("tank/a/b")?, DatasetKind::Filesystem, &BTreeMap::new(), true)?;
    }
    // synthesized text otherwise
    {
        let mut h = mgr.open("tank")?;
        h.set(&Target::parse("tank/a")?, "compression", "gzip")?;
    }
    // read-only commands are not recorded
    {
        let h = mgr.open_ro("tank")?;
        h.get(&Target::parse("tank/a")?, "compression")?;
        assert!(h.is_readonly());
    }

    let hist = mgr.history("tank")?;
    let cmds: Vec<&str> = hist.iter().map(|r| r.command.as_str()).collect();
    assert_eq!(
        cmds,
        vec![
            "zzzpool create tank /somewhere",
            "zzzfs create -p tank/a/b",
            "zzzfs set compression=gzip tank/a",
        ]
    );
    assert!(hist.windows(2).all(|w| w[0].ts_ms <= w[1].ts_ms));
    assert!(hist.iter().all(|r| r.pool == "tank"));
    assert!(hist[0].short_line().ends_with("zzzpool create tank /somewhere"));
    assert!(hist[0].long_line().contains("[user "));
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn unwritable_history_does_not_fail_a_committed_change() -> Result<()> {
    let root = unique_root("history-broken");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    mgr.create("tank", &dir, &BTreeMap::new())?;

    let mut h = mgr.open("tank")?;
    let hist = h.layout().history_file();
    fs::remove_file(&hist)?;
    fs::create_dir(&hist)?;
    let a = DatasetName::parse("tank/a")?;
    h.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    assert!(h.namespace().contains(&a));
    drop(h);

    let h = mgr.open_ro("tank")?;
    assert!(h.namespace().contains(&a));
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn read_only_handle_rejects_mutation() -> Result<()> {
    let root = unique_root("ro");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    mgr.create("tank", &dir, &BTreeMap::new())?;
    let mut h = mgr.open_ro("tank")?;
    assert!(h
        .create(&DatasetName::parse("tank/a")?, DatasetKind::Filesystem, &BTreeMap::new(), false)
        .is_err());
    drop(h);
    let h = mgr.open("tank")?;
    assert!(h.namespace().get(&DatasetName::parse("tank/a")?).is_none());
    h.close();
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn nowait_lock_fails_while_writer_is_open() -> Result<()> {
    let root = unique_root("lock");
    let dir = pools_dir(&root)?;
    let mgr = manager(&root);
    mgr.create("tank", &dir, &BTreeMap::new())?;
    let impatient = PoolManager::new(
        ZzzBuilder::from_default()
            .state_root(root.join("state"))
            .lock_nowait(true)
            .build(),
    );
    let writer = mgr.open("tank")?;
    let err = impatient.open("tank").unwrap_err();
    assert!(format!("{err:#}").contains("pool tank is busy"), "{err:#}");
    assert!(impatient.open_ro("tank").is_err());
    writer.close();
    impatient.open("tank")?.close();
    fs::remove_dir_all(&root)?;
    Ok(())
}

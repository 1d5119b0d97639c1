use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use oorandom::Rand64;

use zzzfs::pool::VOLSIZE;
use zzzfs::{
    error_kind, DatasetKind, DatasetName, ErrorKind, PoolHandle, PoolManager, SnapshotName, Source,
    Target, ZzzBuilder,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("zzztest-send-{prefix}-{pid}-{t}-{id}"))
}

/// Two pools, `tank` (source) and `backup` (destination).
fn setup(prefix: &str) -> Result<(PathBuf, PoolManager)> {
    let root = unique_root(prefix);
    let dir = root.join("pools");
    fs::create_dir_all(&dir)?;
    let mgr = PoolManager::new(ZzzBuilder::from_default().state_root(root.join("state")).build());
    mgr.create("tank", &dir, &BTreeMap::new())?;
    mgr.create("backup", &dir, &BTreeMap::new())?;
    Ok((root, mgr))
}

fn ds(s: &str) -> DatasetName {
    DatasetName::parse(s).unwrap()
}

fn snap(s: &str) -> SnapshotName {
    SnapshotName::parse(s).unwrap()
}

fn stream_bytes(h: &PoolHandle, s: &str, base: Option<&str>) -> Result<Vec<u8>> {
    let base = base.map(SnapshotName::parse).transpose()?;
    let mut out = Vec::new();
    h.send(&snap(s), base.as_ref())?.read_to_end(&mut out)?;
    Ok(out)
}

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
    Link(PathBuf),
}

fn tree(root: &Path) -> Result<BTreeMap<String, Node>> {
    fn walk(root: &Path, rel: &str, out: &mut BTreeMap<String, Node>) -> Result<()> {
        let dir = if rel.is_empty() { root.to_path_buf() } else { root.join(rel) };
        for e in fs::read_dir(&dir)? {
            let e = e?;
            let name = e.file_name().to_string_lossy().into_owned();
            let r = if rel.is_empty() { name } else { format!("{rel}/{name}") };
            let p = root.join(&r);
            let md = fs::symlink_metadata(&p)?;
            if md.file_type().is_symlink() {
                out.insert(r, Node::Link(fs::read_link(&p)?));
            } else if md.is_dir() {
                out.insert(r.clone(), Node::Dir);
                walk(root, &r, out)?;
            } else {
                out.insert(r, Node::File(fs::read(&p)?));
            }
        }
        Ok(())
    }
    let mut out = BTreeMap::new();
    walk(root, "", &mut out)?;
    Ok(out)
}

/// Random directories, files and (on unix) symlinks under `root`.
fn random_tree(rng: &mut Rand64, root: &Path, depth: u32) -> Result<()> {
    let n = rng.rand_range(1..7);
    for i in 0..n {
        let name = format!("n{}-{}", i, rng.rand_range(0..1000));
        let p = root.join(&name);
        match rng.rand_range(0..10) {
            0..=2 if depth < 3 => {
                fs::create_dir(&p)?;
                random_tree(rng, &p, depth + 1)?;
            }
            3 => {
                #[cfg(unix)]
                std::os::unix::fs::symlink(format!("../target-{}", i), &p)?;
                #[cfg(not(unix))]
                fs::write(&p, b"link")?;
            }
            _ => {
                let len = match rng.rand_range(0..4) {
                    0 => 0,
                    1 => rng.rand_range(1..64),
                    _ => rng.rand_range(100..200_000),
                } as usize;
                let data: Vec<u8> = (0..len).map(|_| rng.rand_u64() as u8).collect();
                fs::write(&p, data)?;
            }
        }
    }
    Ok(())
}

#[test]
fn full_stream_recreates_random_trees() -> Result<()> {
    for seed in [1u128, 7, 42, 2024] {
        let (root, mgr) = setup(&format!("full{seed}"))?;
        let mut src = mgr.open("tank")?;
        let a = ds("tank/a");
        src.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
        src.set(&Target::parse("tank")?, "compression", "gzip")?;
        src.set(&Target::parse("tank/a")?, "atime", "off")?;
        src.set(&Target::parse("tank/a")?, "mountpoint", "/srv/a")?;
        let mut rng = Rand64::new(seed);
        random_tree(&mut rng, &src.layout().content_dir(&a), 0)?;
        src.snapshot(&[snap("tank/a@s1")], false)?;

        let bytes = stream_bytes(&src, "tank/a@s1", None)?;
        let mut dst = mgr.open("backup")?;
        let got = dst.receive(&bytes[..], &ds("backup/copy"), false)?;
        assert_eq!(got, snap("backup/copy@s1"));

        let want = tree(&src.layout().snapshot_data(&snap("tank/a@s1")))?;
        assert_eq!(tree(&dst.layout().content_dir(&ds("backup/copy")))?, want, "seed {seed}");
        assert_eq!(tree(&dst.layout().snapshot_data(&got))?, want, "seed {seed}");

        // the values arrive, but as overrides of the destination
        let values = |m: BTreeMap<String, zzzfs::PropValue>| -> BTreeMap<String, String> {
            m.into_iter().map(|(k, v)| (k, v.value)).collect()
        };
        let frozen = dst.snapshot_properties(&got)?;
        assert!(frozen.values().all(|v| v.source == Source::Local));
        assert_eq!(values(frozen), values(src.snapshot_properties(&snap("tank/a@s1"))?));
        let copy = Target::parse("backup/copy")?;
        let c = dst.get(&copy, "compression")?;
        assert_eq!((c.value.as_str(), c.source), ("gzip", Source::Local));
        assert_eq!(dst.get(&copy, "atime")?.value, "off");
        assert_eq!(dst.get(&copy, "mountpoint")?.value, "/srv/a");
        fs::remove_dir_all(&root)?;
    }
    Ok(())
}

#[test]
fn inherited_mountpoint_is_not_received() -> Result<()> {
    let (root, mgr) = setup("mount")?;
    let mut src = mgr.open("tank")?;
    src.create(&ds("tank/a/b"), DatasetKind::Filesystem, &BTreeMap::new(), true)?;
    src.set(&Target::parse("tank/a")?, "mountpoint", "/srv/a")?;
    src.snapshot(&[snap("tank/a/b@s")], false)?;
    let bytes = stream_bytes(&src, "tank/a/b@s", None)?;

    let mut dst = mgr.open("backup")?;
    dst.receive(&bytes[..], &ds("backup/b"), false)?;
    let mp = dst.get(&Target::parse("backup/b")?, "mountpoint")?;
    assert_eq!(mp.source, Source::Default);
    assert_eq!(mp.value, dst.layout().content_dir(&ds("backup/b")).display().to_string());
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn rollback_to_a_received_snapshot_keeps_streamed_values() -> Result<()> {
    let (root, mgr) = setup("rollback")?;
    let mut src = mgr.open("tank")?;
    src.set(&Target::parse("tank")?, "compression", "gzip")?;
    src.create(&ds("tank/src"), DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    fs::write(src.layout().content_dir(&ds("tank/src")).join("f"), b"one")?;
    src.snapshot(&[snap("tank/src@s")], false)?;
    let bytes = stream_bytes(&src, "tank/src@s", None)?;

    let mut dst = mgr.open("backup")?;
    let got = dst.receive(&bytes[..], &ds("backup/dst"), false)?;
    let live = Target::parse("backup/dst")?;
    assert_eq!(dst.get(&live, "compression")?.value, "gzip");
    assert_eq!(dst.get(&Target::Snapshot(got.clone()), "compression")?.value, "gzip");

    fs::write(dst.layout().content_dir(&ds("backup/dst")).join("f"), b"two")?;
    dst.set(&live, "compression", "off")?;
    dst.rollback(&got, false)?;
    let c = dst.get(&live, "compression")?;
    assert_eq!((c.value.as_str(), c.source), ("gzip", Source::Local));
    assert_eq!(fs::read(dst.layout().content_dir(&ds("backup/dst")).join("f"))?, b"one");
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn incremental_stream_applies_changes() -> Result<()> {
    let (root, mgr) = setup("incr")?;
    let mut src = mgr.open("tank")?;
    let a = ds("tank/a");
    src.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    let live = src.layout().content_dir(&a);
    fs::write(live.join("keep"), b"same")?;
    fs::write(live.join("edit"), b"v1")?;
    fs::write(live.join("gone"), b"x")?;
    fs::create_dir_all(live.join("dir/sub"))?;
    fs::write(live.join("dir/sub/f"), b"deep")?;
    fs::write(live.join("flip"), b"was a file")?;
    src.snapshot(&[snap("tank/a@s1")], false)?;

    let full = stream_bytes(&src, "tank/a@s1", None)?;
    let mut dst = mgr.open("backup")?;
    dst.receive(&full[..], &ds("backup/a"), false)?;

    fs::write(live.join("edit"), b"version two")?;
    fs::remove_file(live.join("gone"))?;
    fs::remove_dir_all(live.join("dir"))?;
    fs::write(live.join("dir"), b"now a file")?;
    fs::remove_file(live.join("flip"))?;
    fs::create_dir(live.join("flip"))?;
    fs::write(live.join("flip/inside"), b"in")?;
    fs::write(live.join("added"), vec![3u8; 70_000])?;
    src.set(&Target::parse("tank/a")?, "compression", "lz4")?;
    src.snapshot(&[snap("tank/a@s2")], false)?;

    let incr = stream_bytes(&src, "tank/a@s2", Some("tank/a@s1"))?;
    let got = dst.receive(&incr[..], &ds("backup/a"), false)?;
    assert_eq!(got, snap("backup/a@s2"));

    let want = tree(&src.layout().snapshot_data(&snap("tank/a@s2")))?;
    assert_eq!(tree(&dst.layout().content_dir(&ds("backup/a")))?, want);
    assert_eq!(tree(&dst.layout().snapshot_data(&got))?, want);
    assert_eq!(
        tree(&dst.layout().snapshot_data(&snap("backup/a@s1")))?,
        tree(&src.layout().snapshot_data(&snap("tank/a@s1")))?
    );
    assert_eq!(dst.get(&Target::parse("backup/a")?, "compression")?.value, "lz4");

    let labels: Vec<String> = dst
        .namespace()
        .get(&ds("backup/a"))
        .map(|e| e.snapshots.iter().map(|s| s.label.clone()).collect())
        .unwrap_or_default();
    assert_eq!(labels, vec!["s1", "s2"]);
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn existing_destination_needs_force() -> Result<()> {
    let (root, mgr) = setup("force")?;
    let mut src = mgr.open("tank")?;
    let a = ds("tank/a");
    src.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    fs::write(src.layout().content_dir(&a).join("f"), b"from tank")?;
    src.snapshot(&[snap("tank/a@s1")], false)?;
    let bytes = stream_bytes(&src, "tank/a@s1", None)?;

    let mut dst = mgr.open("backup")?;
    let b = ds("backup/a");
    dst.create(&b, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    fs::write(dst.layout().content_dir(&b).join("local"), b"mine")?;
    dst.create(&ds("backup/a/kid"), DatasetKind::Filesystem, &BTreeMap::new(), false)?;

    let err = dst.receive(&bytes[..], &b, false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Conflict);
    assert_eq!(fs::read(dst.layout().content_dir(&b).join("local"))?, b"mine");

    dst.receive(&bytes[..], &b, true)?;
    let content = dst.layout().content_dir(&b);
    assert_eq!(fs::read(content.join("f"))?, b"from tank");
    assert!(!content.join("local").exists());
    assert!(dst.namespace().get(&ds("backup/a/kid")).is_none());
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn incremental_needs_newest_base_and_clean_destination() -> Result<()> {
    let (root, mgr) = setup("base")?;
    let mut src = mgr.open("tank")?;
    let a = ds("tank/a");
    src.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    let live = src.layout().content_dir(&a);
    for (i, label) in ["s1", "s2", "s3"].iter().enumerate() {
        fs::write(live.join("f"), format!("round {i}"))?;
        src.snapshot(&[a.snapshot(label)?], false)?;
    }
    let full = stream_bytes(&src, "tank/a@s1", None)?;
    let s1_s2 = stream_bytes(&src, "tank/a@s2", Some("tank/a@s1"))?;
    let s1_s3 = stream_bytes(&src, "tank/a@s3", Some("tank/a@s1"))?;
    let s2_s3 = stream_bytes(&src, "tank/a@s3", Some("tank/a@s2"))?;

    let mut dst = mgr.open("backup")?;
    let b = ds("backup/a");
    let err = dst.receive(&s1_s2[..], &b, false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotFound);

    dst.receive(&full[..], &b, false)?;
    dst.receive(&s1_s2[..], &b, false)?;
    let err = dst.receive(&s1_s3[..], &b, false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Dependency);
    let err = dst.receive(&s1_s2[..], &b, false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Dependency);

    let content = dst.layout().content_dir(&b);
    fs::write(content.join("scribble"), b"local change")?;
    let err = dst.receive(&s2_s3[..], &b, false).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Conflict);
    assert!(content.join("scribble").exists());

    dst.receive(&s2_s3[..], &b, true)?;
    assert!(!content.join("scribble").exists());
    assert_eq!(fs::read_to_string(content.join("f"))?, "round 2");
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn send_argument_checks() -> Result<()> {
    let (root, mgr) = setup("args")?;
    let mut h = mgr.open("tank")?;
    h.create(&ds("tank/a"), DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    h.create(&ds("tank/b"), DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    h.snapshot(&[snap("tank/a@s1"), snap("tank/b@s1")], false)?;
    h.snapshot(&[snap("tank/a@s2")], false)?;

    let err = h.send(&snap("tank/a@s9"), None).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::NotFound);
    let err = h.send(&snap("tank/a@s1"), Some(&snap("tank/a@s2"))).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);
    let err = h.send(&snap("tank/a@s2"), Some(&snap("tank/b@s1"))).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Name);
    fs::remove_dir_all(&root)?;
    Ok(())
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(raw)?;
    Ok(enc.finish()?)
}

#[test]
fn damaged_streams_are_format_errors_and_leave_no_trace() -> Result<()> {
    let (root, mgr) = setup("damage")?;
    let mut src = mgr.open("tank")?;
    let a = ds("tank/a");
    src.create(&a, DatasetKind::Filesystem, &BTreeMap::new(), false)?;
    fs::write(src.layout().content_dir(&a).join("payload"), vec![9u8; 50_000])?;
    src.snapshot(&[snap("tank/a@s1")], false)?;
    let good = stream_bytes(&src, "tank/a@s1", None)?;

    let raw = decompress(&good)?;
    // last byte of the final entry's checksum, just before the 13-byte end record
    let mut flipped = raw.clone();
    let at = flipped.len() - 14;
    flipped[at] ^= 0xff;
    let mut bad_version = raw.clone();
    bad_version[8] = 99;
    bad_version[9] = 0;

    let cases: Vec<(&str, Vec<u8>)> = vec![
        ("truncated", good[..good.len() / 2].to_vec()),
        ("checksum", compress(&flipped)?),
        ("version", compress(&bad_version)?),
        ("short", compress(&raw[..raw.len() - 5])?),
        ("garbage", b"definitely not a stream".to_vec()),
    ];
    let mut dst = mgr.open("backup")?;
    let dest = ds("backup/x");
    for (what, bytes) in cases {
        let err = dst.receive(&bytes[..], &dest, false).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Format, "{what}: {err:#}");
        assert!(dst.namespace().get(&dest).is_none(), "{what}");
        assert!(!dst.layout().content_dir(&dest).exists(), "{what}");
    }
    let leftovers: Vec<_> = fs::read_dir(dst.layout().content_root())?.collect::<Result<_, _>>()?;
    assert!(leftovers.is_empty(), "{leftovers:?}");

    dst.receive(&good[..], &dest, false)?;
    assert_eq!(fs::read(dst.layout().content_dir(&dest).join("payload"))?.len(), 50_000);
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn volumes_and_same_pool_round_trip() -> Result<()> {
    let (root, mgr) = setup("volume")?;
    let mut h = mgr.open("tank")?;
    let mut props = BTreeMap::new();
    props.insert(VOLSIZE.to_string(), "64K".to_string());
    let vol = ds("tank/vol");
    h.create(&vol, DatasetKind::Volume, &props, false)?;
    let file = h.layout().content_dir(&vol).join("volume");
    let mut data = fs::read(&file)?;
    data[100] = 0xab;
    fs::write(&file, &data)?;
    h.snapshot(&[snap("tank/vol@s")], false)?;

    let bytes = stream_bytes(&h, "tank/vol@s", None)?;
    let copy = ds("tank/vol-copy");
    h.receive(&bytes[..], &copy, false)?;
    let t = Target::parse("tank/vol-copy")?;
    assert_eq!(h.get(&t, "type")?.value, "volume");
    assert_eq!(h.get(&t, "volsize")?.value, (64 * 1024).to_string());
    assert_eq!(fs::read(h.layout().content_dir(&copy).join("volume"))?, data);
    fs::remove_dir_all(&root)?;
    Ok(())
}

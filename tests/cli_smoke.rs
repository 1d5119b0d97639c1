use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("zzztest-cli-{prefix}-{pid}-{t}"))
}

fn run(bin: &str, state: &Path, args: &[&str], stdin: Option<&[u8]>) -> Result<Output> {
    let mut child = Command::new(bin)
        .args(args)
        .env("ZZZFS_ROOT", state)
        .env_remove("RUST_LOG")
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(data)?;
    }
    Ok(child.wait_with_output()?)
}

fn zzzfs(state: &Path, args: &[&str]) -> Result<Output> {
    run(env!("CARGO_BIN_EXE_zzzfs"), state, args, None)
}

fn zzzpool(state: &Path, args: &[&str]) -> Result<Output> {
    run(env!("CARGO_BIN_EXE_zzzpool"), state, args, None)
}

fn stdout_of(o: &Output) -> String {
    assert!(o.status.success(), "stderr: {}", String::from_utf8_lossy(&o.stderr));
    String::from_utf8_lossy(&o.stdout).into_owned()
}

#[test]
fn end_to_end_through_the_binaries() -> Result<()> {
    let root = unique_root("e2e");
    let dir = root.join("pools");
    let state = root.join("state");
    fs::create_dir_all(&dir)?;
    let dir_s = dir.to_string_lossy().into_owned();

    stdout_of(&zzzpool(&state, &["create", "tank", &dir_s])?);
    stdout_of(&zzzfs(&state, &["create", "-p", "-o", "compression=lz4", "tank/a/b"])?);

    let names = stdout_of(&zzzfs(&state, &["list", "-H", "-o", "name"])?);
    assert_eq!(names, "tank\ntank/a\ntank/a/b\n");

    let got = stdout_of(&zzzfs(&state, &["get", "-H", "compression", "tank/a", "tank/a/b"])?);
    assert_eq!(got, "tank/a\tcompression\toff\tdefault\ntank/a/b\tcompression\tlz4\tlocal\n");

    fs::write(dir.join("tank/a/hello.txt"), b"hi")?;
    stdout_of(&zzzfs(&state, &["snapshot", "tank/a@s1"])?);
    let listed = stdout_of(&zzzfs(&state, &["list", "-H", "-t", "snapshot", "-o", "name,type"])?);
    assert_eq!(listed, "tank/a@s1\tsnapshot\n");

    let sent = zzzfs(&state, &["send", "tank/a@s1"])?;
    assert!(sent.status.success());
    assert!(!sent.stdout.is_empty());
    let recv = run(env!("CARGO_BIN_EXE_zzzfs"), &state, &["receive", "tank/copy"], Some(&sent.stdout))?;
    stdout_of(&recv);
    assert_eq!(fs::read(dir.join("tank/copy/hello.txt"))?, b"hi");

    fs::write(dir.join("tank/a/hello.txt"), b"changed")?;
    let diff = stdout_of(&zzzfs(&state, &["diff", "tank/a@s1"])?);
    assert_eq!(diff.lines().count(), 1);
    assert!(diff.starts_with("M\t"), "{diff}");
    assert!(diff.trim_end().ends_with("hello.txt"), "{diff}");

    let missing = zzzfs(&state, &["destroy", "tank/nope"])?;
    assert_eq!(missing.status.code(), Some(2));
    let busy = zzzfs(&state, &["destroy", "tank/a"])?;
    assert_eq!(busy.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&busy.stderr).starts_with("error: "));

    let history = stdout_of(&zzzpool(&state, &["history", "tank"])?);
    let lines: Vec<&str> = history.lines().collect();
    assert_eq!(lines[0], "History for 'tank':");
    assert!(lines[1].ends_with(&format!("zzzpool create tank {}", dir_s)), "{history}");
    assert!(lines[2].ends_with("zzzfs create -p -o compression=lz4 tank/a/b"), "{history}");
    assert!(lines.iter().any(|l| l.ends_with("zzzfs receive tank/copy")), "{history}");
    assert!(!history.contains("zzzfs list"), "{history}");
    assert!(!history.contains("destroy tank/nope"), "{history}");

    stdout_of(&zzzpool(&state, &["destroy", "-r", "tank"])?);
    assert_eq!(stdout_of(&zzzpool(&state, &["list"])?), "no pools available\n");
    fs::remove_dir_all(&root)?;
    Ok(())
}

#[test]
fn list_get_and_snapshot_options() -> Result<()> {
    let root = unique_root("opts");
    let dir = root.join("pools");
    let state = root.join("state");
    fs::create_dir_all(&dir)?;
    let dir_s = dir.to_string_lossy().into_owned();

    stdout_of(&zzzpool(&state, &["create", "tank", &dir_s])?);
    stdout_of(&zzzfs(&state, &["create", "-o", "prio=10", "tank/a"])?);
    stdout_of(&zzzfs(&state, &["create", "-o", "prio=9", "tank/b"])?);
    stdout_of(&zzzfs(&state, &["create", "-o", "prio=100", "tank/c"])?);

    // any property is a column; numbers sort by value, unset sorts last
    let asc = stdout_of(&zzzfs(&state, &["list", "-H", "-o", "name,prio", "-s", "prio"])?);
    assert_eq!(asc, "tank/b\t9\ntank/a\t10\ntank/c\t100\ntank\t-\n");
    let desc = stdout_of(&zzzfs(&state, &["list", "-H", "-o", "name", "-S", "prio"])?);
    assert_eq!(desc, "tank\ntank/c\ntank/a\ntank/b\n");
    let by_name = stdout_of(&zzzfs(&state, &["list", "-H", "-o", "name", "-S", "name"])?);
    assert_eq!(by_name, "tank/c\ntank/b\ntank/a\ntank\n");
    let bad = zzzfs(&state, &["list", "-o", "name,no/such"])?;
    assert_eq!(bad.status.code(), Some(2));

    let values = stdout_of(&zzzfs(&state, &["get", "-H", "-o", "value", "prio", "tank/a", "tank/b"])?);
    assert_eq!(values, "10\n9\n");
    let sources = stdout_of(&zzzfs(
        &state,
        &["get", "-H", "-o", "name,source", "-d", "1", "-t", "filesystem", "prio", "tank"],
    )?);
    assert_eq!(sources, "tank\t-\ntank/a\tlocal\ntank/b\tlocal\ntank/c\tlocal\n");
    let unset = stdout_of(&zzzfs(&state, &["get", "-H", "-o", "name", "-s", "none", "-r", "prio", "tank"])?);
    assert_eq!(unset, "tank\n");
    let bad = zzzfs(&state, &["get", "-o", "colour", "prio", "tank"])?;
    assert_eq!(bad.status.code(), Some(2));

    stdout_of(&zzzfs(&state, &["snapshot", "-o", "x=1", "-o", "y=2", "tank/a@first"])?);
    let x = stdout_of(&zzzfs(&state, &["get", "-H", "-t", "snap", "-o", "value", "x", "tank/a@first"])?);
    assert_eq!(x, "1\n");
    let skipped = stdout_of(&zzzfs(&state, &["get", "-H", "-t", "filesystem", "x", "tank/a@first"])?);
    assert_eq!(skipped, "");
    let snaps = stdout_of(&zzzfs(&state, &["get", "-H", "-o", "name", "-r", "-t", "snapshot", "y", "tank"])?);
    assert_eq!(snaps, "tank/a@first\n");

    stdout_of(&zzzfs(&state, &["rename", "tank/a@first", "second"])?);
    let listed = stdout_of(&zzzfs(&state, &["list", "-H", "-t", "snapshot", "-o", "name"])?);
    assert_eq!(listed, "tank/a@second\n");
    let diff = zzzfs(&state, &["diff", "tank/a", "tank/a@second"])?;
    assert_eq!(diff.status.code(), Some(2));

    let pools = stdout_of(&zzzpool(&state, &["list", "-H", "-o", "name,health"])?);
    assert_eq!(pools, "tank\tONLINE\n");
    let bad = zzzpool(&state, &["list", "-o", "name,dedup"])?;
    assert_eq!(bad.status.code(), Some(2));

    stdout_of(&zzzpool(&state, &["destroy", "-r", "tank"])?);
    fs::remove_dir_all(&root)?;
    Ok(())
}

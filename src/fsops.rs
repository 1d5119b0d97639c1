//! fsops — the filesystem adapter the core calls into.
//!
//! Only directory create/remove/move/copy, symlinks, stat and byte streams live
//! here. Copies preserve permissions, symlinks and file mtimes so that frozen
//! copies compare cleanly against live trees.
//!
//! Snapshots and clones are built with full copies: there is no copy-on-write
//! substrate underneath, so a snapshot costs as much space as the data it
//! freezes.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::metrics::record_bytes_copied;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Dir,
    File,
    Symlink,
}

impl EntryType {
    pub fn of(md: &fs::Metadata) -> Self {
        let ft = md.file_type();
        if ft.is_symlink() {
            EntryType::Symlink
        } else if ft.is_dir() {
            EntryType::Dir
        } else {
            EntryType::File
        }
    }
}

/// stat() result reduced to what diff and send need.
#[derive(Debug, Clone)]
pub struct EntryStat {
    pub ty: EntryType,
    pub size: u64,
    pub mode: u32,
    pub mtime: SystemTime,
}

pub fn stat(path: &Path) -> Result<EntryStat> {
    let md = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    Ok(EntryStat {
        ty: EntryType::of(&md),
        size: md.len(),
        mode: mode_of(&md),
        mtime: md.modified().unwrap_or(UNIX_EPOCH),
    })
}

#[cfg(unix)]
fn mode_of(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}
#[cfg(not(unix))]
fn mode_of(md: &fs::Metadata) -> u32 {
    if md.is_dir() {
        0o755
    } else if md.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod {:o} {}", mode, path.display()))
}
#[cfg(not(unix))]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut p = fs::metadata(path)?.permissions();
    p.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, p).with_context(|| format!("chmod {}", path.display()))
}

pub fn set_mtime(path: &Path, mtime: SystemTime) -> Result<()> {
    let f = File::options()
        .write(true)
        .open(path)
        .or_else(|_| File::open(path))
        .with_context(|| format!("open {} for mtime", path.display()))?;
    f.set_modified(mtime)
        .with_context(|| format!("set mtime {}", path.display()))
}

#[cfg(unix)]
pub fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("symlink {} -> {}", link.display(), target.display()))
}
#[cfg(windows)]
pub fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(target, link)
        .with_context(|| format!("symlink {} -> {}", link.display(), target.display()))
}

pub fn read_link(path: &Path) -> Result<PathBuf> {
    fs::read_link(path).with_context(|| format!("readlink {}", path.display()))
}

/// Sorted names of the entries directly inside `dir`.
pub fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for e in fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let e = e.with_context(|| format!("read_dir entry in {}", dir.display()))?;
        out.push(e.file_name().to_string_lossy().into_owned());
    }
    out.sort();
    Ok(out)
}

pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create dir {}", path.display()))
}

/// Remove a file, symlink or directory tree; missing paths are fine.
pub fn remove_path(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => {
            fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))
        }
        Ok(_) => fs::remove_file(path).with_context(|| format!("remove {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("stat {}", path.display())),
    }
}

/// Copy `src` into a new `dst`, skipping top-level names listed in `exclude`
/// (child dataset directories). Returns the number of file bytes copied.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &[String]) -> Result<u64> {
    let md = fs::symlink_metadata(src).with_context(|| format!("stat {}", src.display()))?;
    if !md.is_dir() {
        return Err(anyhow!("copy_tree: {} is not a directory", src.display()));
    }
    fs::create_dir(dst).with_context(|| format!("create dir {}", dst.display()))?;
    let mut bytes = 0u64;
    for name in list_dir(src)? {
        if exclude.iter().any(|x| *x == name) {
            continue;
        }
        bytes += copy_entry(&src.join(&name), &dst.join(&name))?;
    }
    finish_dir(dst, &md);
    record_bytes_copied(bytes);
    Ok(bytes)
}

/// Copy one entry (file, symlink or directory subtree) to a path that does not exist yet.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<u64> {
    let md = fs::symlink_metadata(src).with_context(|| format!("stat {}", src.display()))?;
    match EntryType::of(&md) {
        EntryType::Symlink => {
            let target = read_link(src)?;
            make_symlink(&target, dst)?;
            Ok(0)
        }
        EntryType::File => {
            let n = fs::copy(src, dst)
                .with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
            if let Ok(m) = md.modified() {
                set_mtime(dst, m)?;
            }
            Ok(n)
        }
        EntryType::Dir => {
            fs::create_dir(dst).with_context(|| format!("create dir {}", dst.display()))?;
            let mut bytes = 0;
            for name in list_dir(src)? {
                bytes += copy_entry(&src.join(&name), &dst.join(&name))?;
            }
            finish_dir(dst, &md);
            Ok(bytes)
        }
    }
}

// Directory mode/mtime are best-effort: some platforms refuse to open directories for writing.
fn finish_dir(dst: &Path, md: &fs::Metadata) {
    if let Err(e) = set_mode(dst, mode_of(md)) {
        debug!("fsops: keep default mode on {}: {:#}", dst.display(), e);
    }
    if let Ok(m) = md.modified() {
        if let Err(e) = set_mtime(dst, m) {
            debug!("fsops: keep mtime on {}: {:#}", dst.display(), e);
        }
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(18) // EXDEV
    }
    #[cfg(windows)]
    {
        e.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

/// rename(2), falling back to copy + remove across devices.
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(
                "fsops: cross-device move {} -> {}",
                from.display(),
                to.display()
            );
            copy_entry(from, to)?;
            remove_path(from)
        }
        Err(e) => Err(e).with_context(|| format!("rename {} -> {}", from.display(), to.display())),
    }
}

/// Total file bytes below `dir`, skipping top-level names in `exclude`.
pub fn tree_size(dir: &Path, exclude: &[String]) -> Result<u64> {
    let mut total = 0u64;
    for name in list_dir(dir)? {
        if exclude.iter().any(|x| *x == name) {
            continue;
        }
        total += entry_size(&dir.join(name))?;
    }
    Ok(total)
}

fn entry_size(p: &Path) -> Result<u64> {
    let md = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    if md.is_dir() {
        let mut total = 0;
        for name in list_dir(p)? {
            total += entry_size(&p.join(name))?;
        }
        Ok(total)
    } else {
        Ok(md.len())
    }
}

/// Byte-for-byte comparison of two regular files.
pub fn same_bytes(a: &Path, b: &Path) -> Result<bool> {
    let mut fa = File::open(a).with_context(|| format!("open {}", a.display()))?;
    let mut fb = File::open(b).with_context(|| format!("open {}", b.display()))?;
    let mut ba = vec![0u8; 64 * 1024];
    let mut bb = vec![0u8; 64 * 1024];
    loop {
        let na = read_full(&mut fa, &mut ba)?;
        let nb = read_full(&mut fb, &mut bb)?;
        if na != nb || ba[..na] != bb[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

fn read_full(f: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        let k = f.read(&mut buf[n..])?;
        if k == 0 {
            break;
        }
        n += k;
    }
    Ok(n)
}

// ---------- sidecars ----------

/// Write JSON via tmp + rename (optionally fsync before rename).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T, fsync: bool) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;
        f.write_all(&data)?;
        if fsync {
            f.sync_all()?;
        }
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

pub fn system_time_parts(t: SystemTime) -> (i64, u32) {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            (-(d.as_secs() as i64), 0)
        }
    }
}

pub fn system_time_from_parts(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos.min(999_999_999))
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

// ---------- undo journal ----------

enum Step {
    Moved(PathBuf, PathBuf),
    /// Previous bytes of a rewritten sidecar (None: it did not exist).
    Wrote(PathBuf, Option<Vec<u8>>),
}

/// Journal for multi-step operations. Unless `commit()` is called, dropping
/// it undoes the recorded moves and sidecar writes in reverse order and then
/// removes the registered scratch paths.
#[derive(Default)]
pub struct Undo {
    steps: Vec<Step>,
    scratch: Vec<PathBuf>,
    committed: bool,
}

impl Undo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move and remember how to put it back.
    pub fn move_path(&mut self, from: &Path, to: &Path) -> Result<()> {
        move_path(from, to)?;
        self.steps.push(Step::Moved(from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    /// `write_json_atomic`, remembering the previous content.
    pub fn write_json<T: Serialize>(&mut self, path: &Path, value: &T, fsync: bool) -> Result<()> {
        let prev = match fs::read(path) {
            Ok(b) => Some(b),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        write_json_atomic(path, value, fsync)?;
        self.steps.push(Step::Wrote(path.to_path_buf(), prev));
        Ok(())
    }

    /// A path created by the operation that must disappear on failure.
    pub fn scratch(&mut self, path: &Path) {
        self.scratch.push(path.to_path_buf());
    }

    pub fn commit(mut self) {
        self.committed = true;
    }

    fn unwind(&mut self) {
        while let Some(step) = self.steps.pop() {
            let res = match &step {
                Step::Moved(from, to) => move_path(to, from),
                Step::Wrote(path, Some(bytes)) => {
                    fs::write(path, bytes).with_context(|| format!("restore {}", path.display()))
                }
                Step::Wrote(path, None) => remove_path(path),
            };
            if let Err(e) = res {
                match step {
                    Step::Moved(from, to) => warn!(
                        "undo: failed to move {} back to {}: {:#}",
                        to.display(),
                        from.display(),
                        e
                    ),
                    Step::Wrote(path, _) => {
                        warn!("undo: failed to restore {}: {:#}", path.display(), e)
                    }
                }
            }
        }
        while let Some(p) = self.scratch.pop() {
            if let Err(e) = remove_path(&p) {
                warn!("undo: failed to remove {}: {:#}", p.display(), e);
            }
        }
    }
}

impl Drop for Undo {
    fn drop(&mut self) {
        if !self.committed {
            self.unwind();
        }
    }
}

//! stream/receive — decode a send stream and apply its entries to a tree.
//!
//! The caller prepares the target tree (an empty directory for a full
//! stream, a copy of the base snapshot for an incremental one); entries are
//! applied in stream order and directory modes/mtimes are fixed up at the
//! end, deepest first, so that creating children does not disturb them.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::fsops::{create_dir_all, make_symlink, remove_path, set_mode, set_mtime, system_time_from_parts};
use crate::metrics::record_recv_entry;

use super::format::{
    check_entry_crc, format_err, read_exact_fmt, read_preamble, read_record, EntryHeader, EntryTag,
    Record, StreamHeader,
};

const CHUNK: usize = 64 * 1024;

pub struct StreamReader<R: Read> {
    inner: GzDecoder<R>,
    header: StreamHeader,
}

impl<R: Read> StreamReader<R> {
    /// Read and validate the preamble.
    pub fn open(r: R) -> Result<Self> {
        let mut inner = GzDecoder::new(r);
        let header = read_preamble(&mut inner)?;
        debug!(
            "receive: stream of {}@{} (base {:?}), {} properties",
            header.dataset,
            header.label,
            header.base_label,
            header.properties.len()
        );
        Ok(Self { inner, header })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Apply every entry under `root`. Returns the number of entries.
    pub fn apply_to(mut self, root: &Path) -> Result<u64> {
        let mut dirs: Vec<(PathBuf, u32, SystemTime)> = Vec::new();
        let mut count = 0u64;
        loop {
            let (hdr, crc) = match read_record(&mut self.inner)? {
                Record::End(n) => {
                    if n != count {
                        return Err(format_err(format!(
                            "stream announced {} entries, found {}",
                            n, count
                        )));
                    }
                    break;
                }
                Record::Entry(h, c) => (h, c),
            };
            count += 1;
            self.apply_entry(root, &hdr, crc, &mut dirs)?;
            record_recv_entry(hdr.len as usize);
        }
        for (p, mode, mtime) in dirs.iter().rev() {
            set_mode(p, *mode)?;
            if let Err(e) = set_mtime(p, *mtime) {
                debug!("receive: keep mtime on {}: {:#}", p.display(), e);
            }
        }
        Ok(count)
    }

    fn apply_entry(
        &mut self,
        root: &Path,
        hdr: &EntryHeader,
        mut crc: crc32fast::Hasher,
        dirs: &mut Vec<(PathBuf, u32, SystemTime)>,
    ) -> Result<()> {
        let mtime = system_time_from_parts(hdr.mtime_s, hdr.mtime_ns);
        match hdr.tag {
            EntryTag::Removed => {
                check_entry_crc(&mut self.inner, crc, &hdr.path)?;
                if let Some(p) = resolve(root, &hdr.path)? {
                    remove_path(&p)?;
                }
            }
            EntryTag::Dir => {
                check_entry_crc(&mut self.inner, crc, &hdr.path)?;
                let p = resolve_for_create(root, &hdr.path)?;
                match fs::symlink_metadata(&p) {
                    Ok(md) if md.is_dir() => {}
                    Ok(_) => {
                        remove_path(&p)?;
                        create_dir_all(&p)?;
                    }
                    Err(_) => create_dir_all(&p)?,
                }
                dirs.push((p, hdr.mode, mtime));
            }
            EntryTag::Symlink => {
                let mut target = vec![0u8; hdr.len as usize];
                read_exact_fmt(&mut self.inner, &mut target, "link target")?;
                crc.update(&target);
                check_entry_crc(&mut self.inner, crc, &hdr.path)?;
                let target = String::from_utf8(target)
                    .map_err(|_| format_err(format!("{}: link target is not UTF-8", hdr.path)))?;
                let p = resolve_for_create(root, &hdr.path)?;
                remove_path(&p)?;
                make_symlink(Path::new(&target), &p)?;
            }
            EntryTag::File => {
                let p = resolve_for_create(root, &hdr.path)?;
                remove_path(&p)?;
                let mut f = OpenOptions::new()
                    .create_new(true)
                    .write(true)
                    .open(&p)
                    .with_context(|| format!("create {}", p.display()))?;
                let mut left = hdr.len;
                let mut buf = vec![0u8; CHUNK];
                while left > 0 {
                    let n = left.min(CHUNK as u64) as usize;
                    read_exact_fmt(&mut self.inner, &mut buf[..n], "file payload")?;
                    crc.update(&buf[..n]);
                    f.write_all(&buf[..n])
                        .with_context(|| format!("write {}", p.display()))?;
                    left -= n as u64;
                }
                drop(f);
                check_entry_crc(&mut self.inner, crc, &hdr.path)?;
                set_mode(&p, hdr.mode)?;
                set_mtime(&p, mtime)?;
            }
        }
        Ok(())
    }
}

/// Turn a stream path into a path under `root`. `None` when an ancestor is
/// missing or is not a real directory (the entry no longer exists there).
fn resolve(root: &Path, rel: &str) -> Result<Option<PathBuf>> {
    let parts: Vec<&str> = rel.split('/').collect();
    if parts.iter().any(|c| c.is_empty() || *c == "." || *c == "..") {
        return Err(format_err(format!("bad entry path {:?}", rel)));
    }
    let mut p = root.to_path_buf();
    for c in &parts[..parts.len() - 1] {
        p.push(c);
        match fs::symlink_metadata(&p) {
            Ok(md) if md.is_dir() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("stat {}", p.display())),
        }
    }
    p.push(parts[parts.len() - 1]);
    Ok(Some(p))
}

fn resolve_for_create(root: &Path, rel: &str) -> Result<PathBuf> {
    resolve(root, rel)?
        .ok_or_else(|| format_err(format!("{}: parent directory missing in stream", rel)))
}

/// A received stream copied to disk before the pool is locked, so that a
/// `send | receive` pipeline on the same pool cannot deadlock.
pub struct Spool {
    path: PathBuf,
}

impl Spool {
    pub fn capture<R: Read>(dir: &Path, mut r: R) -> Result<Self> {
        create_dir_all(dir)?;
        let path = dir.join(format!(".spool.{}", crate::layout::staging_tag("recv")));
        let spool = Self { path };
        let mut f = File::create(&spool.path)
            .with_context(|| format!("create {}", spool.path.display()))?;
        let n = io::copy(&mut r, &mut f).context("spool stream")?;
        debug!("receive: spooled {} bytes to {}", n, spool.path.display());
        Ok(spool)
    }

    pub fn open(&self) -> Result<File> {
        File::open(&self.path).with_context(|| format!("open {}", self.path.display()))
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

//! stream/send — lazy producer of the send stream.
//!
//! `SendStream` implements `io::Read`; records are generated on demand while
//! the consumer reads, so a large snapshot is never buffered in memory. File
//! payloads are copied straight from the frozen snapshot tree.

use anyhow::Result;
use crc32fast::Hasher as Crc32;
use flate2::read::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::diff::{ChangeType, Diff, DiffIter};
use crate::fsops::{list_dir, read_link, stat, system_time_parts, EntryType};
use crate::metrics::record_send_entry;

use super::format::{encode_end, encode_preamble, EntryHeader, EntryTag, StreamHeader};

enum Step {
    Emit(String),
    Remove(String),
}

/// Which paths go into the stream.
enum Walker {
    /// Every entry of the tree, preorder, names sorted.
    Full { root: PathBuf, stack: Vec<String> },
    /// Only what differs from the base snapshot.
    Incremental(DiffIter),
}

impl Walker {
    fn full(root: &Path) -> Result<Self> {
        let mut stack = list_dir(root)?;
        stack.reverse();
        Ok(Walker::Full {
            root: root.to_path_buf(),
            stack,
        })
    }

    fn next(&mut self) -> Result<Option<Step>> {
        match self {
            Walker::Full { root, stack } => {
                let rel = match stack.pop() {
                    Some(r) => r,
                    None => return Ok(None),
                };
                let p = root.join(&rel);
                if stat(&p)?.ty == EntryType::Dir {
                    for n in list_dir(&p)?.into_iter().rev() {
                        stack.push(format!("{}/{}", rel, n));
                    }
                }
                Ok(Some(Step::Emit(rel)))
            }
            Walker::Incremental(it) => match it.next() {
                None => Ok(None),
                Some(Err(e)) => Err(e),
                Some(Ok(d)) => Ok(Some(match d.change {
                    ChangeType::Removed => Step::Remove(d.path),
                    // a type change replaces the entry on the receiving side
                    ChangeType::Added | ChangeType::Modified => Step::Emit(d.path),
                })),
            },
        }
    }
}

/// Uncompressed record producer.
struct RawStream {
    src: PathBuf,
    walker: Walker,
    buf: Vec<u8>,
    pos: usize,
    /// File payload in flight: reader, bytes left, running checksum.
    file: Option<(File, u64, Crc32)>,
    count: u64,
    done: bool,
}

fn to_io(e: anyhow::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{:#}", e))
}

impl RawStream {
    fn fill(&mut self) -> Result<()> {
        self.buf.clear();
        self.pos = 0;
        let step = match self.walker.next()? {
            Some(s) => s,
            None => {
                self.buf = encode_end(self.count);
                self.done = true;
                return Ok(());
            }
        };
        self.count += 1;
        match step {
            Step::Remove(rel) => {
                let hdr = EntryHeader {
                    tag: EntryTag::Removed,
                    path: rel,
                    mode: 0,
                    mtime_s: 0,
                    mtime_ns: 0,
                    len: 0,
                };
                self.push_small(&hdr, &[]);
                record_send_entry(0);
            }
            Step::Emit(rel) => {
                let p = self.src.join(&rel);
                let st = stat(&p)?;
                let (mtime_s, mtime_ns) = system_time_parts(st.mtime);
                let mut hdr = EntryHeader {
                    tag: EntryTag::Dir,
                    path: rel,
                    mode: st.mode,
                    mtime_s,
                    mtime_ns,
                    len: 0,
                };
                match st.ty {
                    EntryType::Dir => {
                        self.push_small(&hdr, &[]);
                        record_send_entry(0);
                    }
                    EntryType::Symlink => {
                        let target = read_link(&p)?.to_string_lossy().into_owned();
                        hdr.tag = EntryTag::Symlink;
                        hdr.len = target.len() as u64;
                        self.push_small(&hdr, target.as_bytes());
                        record_send_entry(target.len());
                    }
                    EntryType::File => {
                        hdr.tag = EntryTag::File;
                        hdr.len = st.size;
                        let enc = hdr.encode();
                        let mut crc = Crc32::new();
                        crc.update(&enc);
                        self.buf.extend_from_slice(&enc);
                        let f = File::open(&p)?;
                        self.file = Some((f, st.size, crc));
                        record_send_entry(st.size as usize);
                    }
                }
            }
        }
        Ok(())
    }

    fn push_small(&mut self, hdr: &EntryHeader, payload: &[u8]) {
        let enc = hdr.encode();
        let mut crc = Crc32::new();
        crc.update(&enc);
        crc.update(payload);
        self.buf.extend_from_slice(&enc);
        self.buf.extend_from_slice(payload);
        self.buf.extend_from_slice(&crc.finalize().to_le_bytes());
    }
}

impl Read for RawStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.buf.len() {
                let n = (self.buf.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if let Some((f, left, crc)) = self.file.as_mut() {
                if *left > 0 {
                    let want = (*left).min(out.len() as u64) as usize;
                    let n = f.read(&mut out[..want])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "snapshot file shrank while sending",
                        ));
                    }
                    crc.update(&out[..n]);
                    *left -= n as u64;
                    return Ok(n);
                }
                if let Some((_, _, crc)) = self.file.take() {
                    self.buf.clear();
                    self.pos = 0;
                    self.buf.extend_from_slice(&crc.finalize().to_le_bytes());
                }
                continue;
            }
            if self.done {
                return Ok(0);
            }
            self.fill().map_err(to_io)?;
        }
    }
}

/// Gzip-wrapped send stream. Read it while the pool handle that produced it
/// is still open.
pub struct SendStream {
    inner: GzEncoder<RawStream>,
    header: StreamHeader,
}

impl std::fmt::Debug for SendStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendStream")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl SendStream {
    /// `src` is the frozen tree being sent; `base` the frozen tree of the
    /// incremental source, if any.
    pub fn new(header: StreamHeader, src: &Path, base: Option<&Path>) -> Result<Self> {
        let walker = match base {
            Some(b) => Walker::Incremental(Diff::new(b, Vec::new(), src, Vec::new()).into_iter()),
            None => Walker::full(src)?,
        };
        let raw = RawStream {
            src: src.to_path_buf(),
            walker,
            buf: encode_preamble(&header)?,
            pos: 0,
            file: None,
            count: 0,
            done: false,
        };
        Ok(Self {
            inner: GzEncoder::new(raw, Compression::default()),
            header,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }
}

impl Read for SendStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.inner.read(out)
    }
}

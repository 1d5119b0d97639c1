//! stream/format — framing of the send stream (v1).
//!
//! Layout (little-endian, before gzip):
//!   preamble: [magic8][ver u16][flags u16][hdr_len u32][hdr json][crc32 u32]
//!   entry:    [tag u8][path_len u16][path][mode u32][mtime_s i64][mtime_ns u32][len u64][payload][crc32 u32]
//!   end:      [tag u8='E'][count u64][crc32 u32]
//!
//! The entry checksum covers the entry header and the payload. Every
//! structural problem (bad magic, unknown version, checksum mismatch,
//! truncation) surfaces as `ZfsError::Format`.

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Read};

use crate::consts::{
    STREAM_FLAG_INCREMENTAL, STREAM_MAGIC, STREAM_MAX_HEADER, STREAM_MAX_PATH,
    STREAM_PREAMBLE_SIZE, STREAM_VERSION, TAG_DIR, TAG_END, TAG_FILE, TAG_REMOVED, TAG_SYMLINK,
};
use crate::error::ZfsError;
use crate::name::{valid_component, DatasetName};
use crate::namespace::{DatasetKind, PropValue};

/// Self-description of a stream: what was sent and the attributes frozen
/// with the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub dataset: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_label: Option<String>,
    pub kind: DatasetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volsize: Option<u64>,
    pub creation_unix_ms: i64,
    #[serde(default)]
    pub properties: BTreeMap<String, PropValue>,
}

impl StreamHeader {
    pub fn is_incremental(&self) -> bool {
        self.base_label.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    Dir,
    File,
    Symlink,
    Removed,
}

impl EntryTag {
    fn byte(self) -> u8 {
        match self {
            EntryTag::Dir => TAG_DIR,
            EntryTag::File => TAG_FILE,
            EntryTag::Symlink => TAG_SYMLINK,
            EntryTag::Removed => TAG_REMOVED,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            TAG_DIR => Some(EntryTag::Dir),
            TAG_FILE => Some(EntryTag::File),
            TAG_SYMLINK => Some(EntryTag::Symlink),
            TAG_REMOVED => Some(EntryTag::Removed),
            _ => None,
        }
    }
}

/// Everything in an entry record before the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub tag: EntryTag,
    /// Relative, '/'-separated.
    pub path: String,
    pub mode: u32,
    pub mtime_s: i64,
    pub mtime_ns: u32,
    /// Payload length: file bytes or link target; 0 for dirs and removals.
    pub len: u64,
}

impl EntryHeader {
    pub fn encode(&self) -> Vec<u8> {
        let path = self.path.as_bytes();
        let mut out = vec![0u8; 1 + 2 + path.len() + 4 + 8 + 4 + 8];
        out[0] = self.tag.byte();
        LittleEndian::write_u16(&mut out[1..3], path.len() as u16);
        out[3..3 + path.len()].copy_from_slice(path);
        let mut off = 3 + path.len();
        LittleEndian::write_u32(&mut out[off..off + 4], self.mode);
        off += 4;
        LittleEndian::write_i64(&mut out[off..off + 8], self.mtime_s);
        off += 8;
        LittleEndian::write_u32(&mut out[off..off + 4], self.mtime_ns);
        off += 4;
        LittleEndian::write_u64(&mut out[off..off + 8], self.len);
        out
    }
}

/// One decoded record. `crc` has already absorbed the entry header bytes;
/// the reader feeds it the payload and compares against the trailer.
pub enum Record {
    Entry(EntryHeader, Crc32),
    End(u64),
}

pub(crate) fn format_err(msg: impl Into<String>) -> anyhow::Error {
    ZfsError::Format(msg.into()).into()
}

/// `read_exact` with truncation and gzip corruption reported as format errors.
pub(crate) fn read_exact_fmt<R: Read>(r: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => format_err(format!("truncated stream while reading {}", what)),
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            format_err(format!("corrupt stream while reading {}: {}", what, e))
        }
        _ => anyhow::Error::new(e).context(format!("read stream {}", what)),
    })
}

pub fn crc32(bytes: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(bytes);
    h.finalize()
}

pub fn encode_preamble(header: &StreamHeader) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(header)?;
    let flags = if header.is_incremental() {
        STREAM_FLAG_INCREMENTAL
    } else {
        0
    };
    let mut out = vec![0u8; STREAM_PREAMBLE_SIZE];
    out[0..8].copy_from_slice(STREAM_MAGIC);
    LittleEndian::write_u16(&mut out[8..10], STREAM_VERSION);
    LittleEndian::write_u16(&mut out[10..12], flags);
    LittleEndian::write_u32(&mut out[12..16], json.len() as u32);
    out.extend_from_slice(&json);
    let mut crc = [0u8; 4];
    LittleEndian::write_u32(&mut crc, crc32(&json));
    out.extend_from_slice(&crc);
    Ok(out)
}

pub fn read_preamble<R: Read>(r: &mut R) -> Result<StreamHeader> {
    let mut pre = [0u8; STREAM_PREAMBLE_SIZE];
    read_exact_fmt(r, &mut pre, "preamble")?;
    if &pre[0..8] != STREAM_MAGIC {
        return Err(format_err("not a zzzfs send stream (bad magic)"));
    }
    let version = LittleEndian::read_u16(&pre[8..10]);
    if version != STREAM_VERSION {
        return Err(format_err(format!(
            "unsupported stream version {} (expected {})",
            version, STREAM_VERSION
        )));
    }
    let flags = LittleEndian::read_u16(&pre[10..12]);
    let hdr_len = LittleEndian::read_u32(&pre[12..16]);
    if hdr_len > STREAM_MAX_HEADER {
        return Err(format_err(format!("stream header too large ({} bytes)", hdr_len)));
    }
    let mut json = vec![0u8; hdr_len as usize];
    read_exact_fmt(r, &mut json, "header")?;
    let mut crc = [0u8; 4];
    read_exact_fmt(r, &mut crc, "header checksum")?;
    if LittleEndian::read_u32(&crc) != crc32(&json) {
        return Err(format_err("stream header checksum mismatch"));
    }
    let header: StreamHeader = serde_json::from_slice(&json)
        .map_err(|e| format_err(format!("malformed stream header: {}", e)))?;
    if (flags & STREAM_FLAG_INCREMENTAL != 0) != header.is_incremental() {
        return Err(format_err("stream flags disagree with header"));
    }
    for label in std::iter::once(&header.label).chain(header.base_label.as_ref()) {
        if !valid_component(label) {
            return Err(format_err(format!("stream header carries bad snapshot label {:?}", label)));
        }
    }
    if DatasetName::parse(&header.dataset).is_err() {
        return Err(format_err(format!("stream header carries bad dataset name {:?}", header.dataset)));
    }
    Ok(header)
}

pub fn encode_end(count: u64) -> Vec<u8> {
    let mut out = vec![0u8; 1 + 8 + 4];
    out[0] = TAG_END;
    LittleEndian::write_u64(&mut out[1..9], count);
    let crc = crc32(&out[1..9]);
    LittleEndian::write_u32(&mut out[9..13], crc);
    out
}

pub fn read_record<R: Read>(r: &mut R) -> Result<Record> {
    let mut tag = [0u8; 1];
    read_exact_fmt(r, &mut tag, "record tag")?;
    if tag[0] == TAG_END {
        let mut rest = [0u8; 12];
        read_exact_fmt(r, &mut rest, "end record")?;
        if LittleEndian::read_u32(&rest[8..12]) != crc32(&rest[0..8]) {
            return Err(format_err("end record checksum mismatch"));
        }
        return Ok(Record::End(LittleEndian::read_u64(&rest[0..8])));
    }
    let kind = EntryTag::from_byte(tag[0])
        .ok_or_else(|| format_err(format!("unknown record tag 0x{:02x}", tag[0])))?;

    let mut plen = [0u8; 2];
    read_exact_fmt(r, &mut plen, "path length")?;
    let path_len = LittleEndian::read_u16(&plen) as usize;
    if path_len == 0 || path_len > STREAM_MAX_PATH {
        return Err(format_err(format!("bad entry path length {}", path_len)));
    }
    let mut path = vec![0u8; path_len];
    read_exact_fmt(r, &mut path, "entry path")?;
    let mut fixed = [0u8; 4 + 8 + 4 + 8];
    read_exact_fmt(r, &mut fixed, "entry header")?;

    let mut crc = Crc32::new();
    crc.update(&tag);
    crc.update(&plen);
    crc.update(&path);
    crc.update(&fixed);

    let path = String::from_utf8(path).map_err(|_| format_err("entry path is not UTF-8"))?;
    let hdr = EntryHeader {
        tag: kind,
        path,
        mode: LittleEndian::read_u32(&fixed[0..4]),
        mtime_s: LittleEndian::read_i64(&fixed[4..12]),
        mtime_ns: LittleEndian::read_u32(&fixed[12..16]),
        len: LittleEndian::read_u64(&fixed[16..24]),
    };
    match hdr.tag {
        EntryTag::Dir | EntryTag::Removed if hdr.len != 0 => {
            return Err(format_err(format!("{}: unexpected payload", hdr.path)));
        }
        EntryTag::Symlink if hdr.len as usize > STREAM_MAX_PATH => {
            return Err(format_err(format!("{}: link target too long", hdr.path)));
        }
        _ => {}
    }
    Ok(Record::Entry(hdr, crc))
}

/// Read the trailing checksum of an entry and compare.
pub fn check_entry_crc<R: Read>(r: &mut R, crc: Crc32, path: &str) -> Result<()> {
    let mut buf = [0u8; 4];
    read_exact_fmt(r, &mut buf, "entry checksum")?;
    if LittleEndian::read_u32(&buf) != crc.finalize() {
        return Err(format_err(format!("{}: entry checksum mismatch", path)));
    }
    Ok(())
}

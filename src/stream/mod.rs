//! Send/receive codec.
//!
//! Submodules:
//! - format:  preamble, header JSON and entry framing (byteorder + crc32fast)
//! - send:    lazy `io::Read` producer, gzip-wrapped
//! - receive: decoder that applies entries onto a prepared tree, plus `Spool`
//!
//! Pool-level semantics (staging, conflicts, the closing snapshot) live in
//! `pool::transfer`.

pub mod format;
pub mod receive;
pub mod send;

pub use format::{EntryHeader, EntryTag, StreamHeader};
pub use receive::{Spool, StreamReader};
pub use send::SendStream;

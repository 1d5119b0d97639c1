//! ZzzFS: the ZFS administrative model (pools, datasets, snapshots, clones,
//! property inheritance, send/receive, command history) emulated on plain
//! directories.
//!
//! There is no block layer: snapshots and clones are full copies, and every
//! multi-step change is staged in dot-prefixed directories and swapped in
//! with renames under the pool lock.

// Base modules
pub mod config;
pub mod consts;
pub mod error;
pub mod metrics;
pub mod util;

// On-disk state
pub mod fsops;
pub mod layout;
pub mod lock;
pub mod name;
pub mod namespace;

// Semantics
pub mod diff;
pub mod history;
pub mod pool;
pub mod props;
pub mod stream;

// Output helpers shared by the binaries
pub mod cli;

// Convenience re-exports
pub use config::{ZzzBuilder, ZzzConfig};
pub use diff::{ChangeType, Diff, DiffEntry};
pub use error::{error_kind, exit_code, ErrorKind, ZfsError};
pub use history::HistoryRecord;
pub use name::{DatasetName, SnapshotName, Target};
pub use namespace::{DatasetKind, PropValue, Source};
pub use pool::{DatasetSummary, Health, PoolHandle, PoolManager, PoolRecord, PoolStatus, TypeFilter};
pub use stream::{SendStream, StreamHeader};

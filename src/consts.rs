//! Shared on-disk layout constants (state root, pool records, send stream).

// -------- State root --------
pub const DEFAULT_STATE_DIR: &str = ".zzzfs";
pub const LOCK_FILE: &str = "LOCK";

// -------- Pool --------
pub const POOL_FILE: &str = "pool.json";
pub const HISTORY_FILE: &str = "history";
pub const DATASETS_DIR: &str = "datasets";
pub const POOL_RECORD_VERSION: u32 = 1;

// -------- Dataset --------
pub const DATASET_FILE: &str = "dataset.json";
pub const PROPERTIES_FILE: &str = "properties.json";
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const DATASET_RECORD_VERSION: u32 = 1;
/// Volumes keep their bytes in a single sparse file inside the dataset directory.
pub const VOLUME_FILE: &str = "volume";
/// `/` is not allowed inside components, so it is escaped to a character that
/// is not allowed either.
pub const NAME_ESCAPE: char = '%';

// -------- Snapshot --------
pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const SNAPSHOT_DATA_DIR: &str = "data";

/// Prefix for staging artifacts; never loaded into the namespace.
pub const STAGING_PREFIX: &str = ".";

// -------- Names --------
pub const MAX_NAME_LEN: usize = 255;
/// Leaves room for the staging suffixes added to pool directory names.
pub const MAX_POOL_NAME_LEN: usize = 200;

// -------- Send stream (v1) --------
// [magic8="ZZZSEND1"][ver u16][flags u16][hdr_len u32][hdr json][crc32 u32]
// entries: [tag u8][path_len u16][path][mode u32][mtime_s i64][mtime_ns u32][len u64][payload][crc32 u32]
// end:     [tag u8='E'][count u64][crc32 u32]
pub const STREAM_MAGIC: &[u8; 8] = b"ZZZSEND1";
pub const STREAM_VERSION: u16 = 1;
pub const STREAM_FLAG_INCREMENTAL: u16 = 0x1;
pub const STREAM_PREAMBLE_SIZE: usize = 8 + 2 + 2 + 4;
/// Upper bound for the header JSON; anything larger is treated as corruption.
pub const STREAM_MAX_HEADER: u32 = 16 * 1024 * 1024;
pub const STREAM_MAX_PATH: usize = 4096;

pub const TAG_DIR: u8 = b'D';
pub const TAG_FILE: u8 = b'F';
pub const TAG_SYMLINK: u8 = b'L';
pub const TAG_REMOVED: u8 = b'X';
pub const TAG_END: u8 = b'E';

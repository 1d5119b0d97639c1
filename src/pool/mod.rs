//! Pool and dataset operations.
//!
//! Submodules:
//! - core:     `PoolHandle` (lock, layout, namespace index, history hooks)
//! - manager:  pool registry: create/destroy/list/history, opening handles
//! - dataset:  create/destroy/list/rename of filesystems and volumes
//! - snapshot: snapshot create/destroy/rollback, diff
//! - clone:    clone and promote
//! - props:    get/set/inherit and computed properties
//! - transfer: send/receive

mod clone;
mod core;
mod dataset;
mod manager;
mod props;
mod snapshot;
mod transfer;

pub use self::core::{PoolHandle, PoolRecord};
pub use dataset::{DatasetSummary, TypeFilter, VOLSIZE};
pub use manager::{Health, PoolManager, PoolStatus};

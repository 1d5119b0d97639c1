use anyhow::Result;
use std::collections::BTreeMap;

use zzzfs::{PoolHandle, PoolManager, Target};

/// Manager that records the command line in each touched pool's history.
pub fn manager() -> PoolManager {
    PoolManager::from_env().with_command(zzzfs::cli::command_line())
}

/// Parse targets and group them by pool, keeping the given order per pool.
pub fn by_pool(targets: &[String]) -> Result<BTreeMap<String, Vec<Target>>> {
    let mut out: BTreeMap<String, Vec<Target>> = BTreeMap::new();
    for t in targets {
        let t = Target::parse(t)?;
        out.entry(t.pool().to_string()).or_default().push(t);
    }
    Ok(out)
}

/// Writer handle for the pool a name lives in.
pub fn open_for(name: &Target) -> Result<PoolHandle> {
    manager().open(name.pool())
}

pub fn open_ro_for(name: &Target) -> Result<PoolHandle> {
    manager().open_ro(name.pool())
}

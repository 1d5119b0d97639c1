use anyhow::{bail, Result};
use std::io::{self, IsTerminal};

use zzzfs::stream::Spool;
use zzzfs::{DatasetName, SnapshotName};

use crate::util::manager;

pub fn send(snapshot: &str, base: Option<&str>) -> Result<()> {
    let snap = SnapshotName::parse(snapshot)?;
    // `-i @a`, `-i a` and `-i tank/x@a` all name a snapshot of the same dataset
    let base = match base {
        None => None,
        Some(b) if b.contains('@') && !b.starts_with('@') => Some(SnapshotName::parse(b)?),
        Some(b) => Some(snap.dataset().snapshot(b.trim_start_matches('@'))?),
    };
    let stdout = io::stdout();
    if stdout.is_terminal() {
        bail!("refusing to write a send stream to a terminal; redirect stdout");
    }
    let h = manager().open_ro(snap.pool())?;
    let mut stream = h.send(&snap, base.as_ref())?;
    let mut out = stdout.lock();
    io::copy(&mut stream, &mut out)?;
    drop(stream);
    h.close();
    Ok(())
}

pub fn receive(dest: &str, force: bool) -> Result<()> {
    let dest = DatasetName::parse(dest)?;
    let mgr = manager();
    // spool first: the sender may still hold this pool's lock
    let spool = Spool::capture(&mgr.config().state_root, io::stdin().lock())?;
    let mut h = mgr.open(dest.pool())?;
    let snap = h.receive(spool.open()?, &dest, force)?;
    log::info!("received {}", snap);
    Ok(())
}

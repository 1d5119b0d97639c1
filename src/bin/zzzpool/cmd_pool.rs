use anyhow::Result;
use std::path::Path;

use zzzfs::cli::{command_line, parse_props, size_cell, Table};
use zzzfs::{PoolManager, PoolStatus, ZfsError};

fn manager() -> PoolManager {
    PoolManager::from_env().with_command(command_line())
}

pub fn create(name: &str, dir: &Path, props: &[String]) -> Result<()> {
    let props = parse_props(props)?;
    manager().create(name, dir, &props)?;
    Ok(())
}

pub fn destroy(name: &str, recursive: bool) -> Result<()> {
    manager().destroy(name, recursive)
}

const POOL_FIELDS: &[&str] = &["name", "size", "alloc", "free", "cap", "health", "altroot"];

fn cell(r: &PoolStatus, field: &str, parsable: bool) -> String {
    match field {
        "name" => r.name.clone(),
        "size" => size_cell(r.size, parsable),
        "alloc" => size_cell(r.alloc, parsable),
        "free" => size_cell(r.free, parsable),
        "cap" => r.cap.map(|c| format!("{}%", c)).unwrap_or_else(|| "-".into()),
        "health" => r.health.to_string(),
        _ => r.altroot.display().to_string(),
    }
}

pub fn list(pools: &[String], scripted: bool, parsable: bool, fields: &str) -> Result<()> {
    let fields: Vec<&str> = fields.split(',').map(str::trim).collect();
    for f in &fields {
        if !POOL_FIELDS.contains(f) {
            return Err(ZfsError::Name(format!("{}: invalid column", f)).into());
        }
    }
    let mgr = manager();
    let mut rows = mgr.list()?;
    if !pools.is_empty() {
        for p in pools {
            if !rows.iter().any(|r| &r.name == p) {
                return Err(ZfsError::NotFound(format!("{}: no such pool", p)).into());
            }
        }
        rows.retain(|r| pools.contains(&r.name));
    }
    let mut t = Table::new(&fields[..]);
    for r in &rows {
        t.push(fields.iter().map(|f| cell(r, f, parsable)).collect());
    }
    if t.is_empty() && !scripted {
        println!("no pools available");
        return Ok(());
    }
    print!("{}", t.render(scripted));
    Ok(())
}

pub fn history(pools: &[String], long: bool) -> Result<()> {
    let mgr = manager();
    let names = if pools.is_empty() {
        mgr.pool_names()?
    } else {
        pools.to_vec()
    };
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("History for '{}':", name);
        for rec in mgr.history(name)? {
            println!("{}", if long { rec.long_line() } else { rec.short_line() });
        }
    }
    Ok(())
}

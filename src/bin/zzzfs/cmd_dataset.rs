use anyhow::Result;
use std::cmp::Ordering;

use zzzfs::cli::{parse_props, size_cell, value_cell, Table};
use zzzfs::pool::VOLSIZE;
use zzzfs::props::validate_key;
use zzzfs::{DatasetKind, DatasetName, DatasetSummary, PoolHandle, Target, TypeFilter, ZfsError};

use crate::util::{by_pool, manager, open_for};

pub fn create(name: &str, parents: bool, volsize: Option<String>, props: &[String]) -> Result<()> {
    let ds = DatasetName::parse(name)?;
    let mut props = parse_props(props)?;
    let kind = match volsize {
        Some(v) => {
            props.insert(VOLSIZE.to_string(), v);
            DatasetKind::Volume
        }
        None => DatasetKind::Filesystem,
    };
    let mut h = manager().open(ds.pool())?;
    h.create(&ds, kind, &props, parents)
}

pub fn destroy(target: &str, recursive: bool, cascade: bool) -> Result<()> {
    let t = Target::parse(target)?;
    let mut h = open_for(&t)?;
    h.destroy(&t, recursive, cascade)
}

pub fn rename(from: &str, to: &str, parents: bool) -> Result<()> {
    let from = Target::parse(from)?;
    let to = match &from {
        // `rename tank/a@old new` renames within the same dataset
        Target::Snapshot(s) if !to.contains('@') => Target::Snapshot(s.dataset().snapshot(to)?),
        _ => Target::parse(to)?,
    };
    let mut h = open_for(&from)?;
    h.rename(&from, &to, parents)
}

/// Columns answered from the listing itself; anything else is looked up
/// as a property of the row.
const LIST_FIELDS: &[&str] = &[
    "name",
    "used",
    "avail",
    "available",
    "refer",
    "referenced",
    "mountpoint",
    "type",
    "origin",
];

fn check_field(f: &str) -> Result<()> {
    if LIST_FIELDS.contains(&f) {
        return Ok(());
    }
    validate_key(f).map_err(|_| anyhow::Error::from(ZfsError::Name(format!("{}: invalid column", f))))
}

fn cell(h: &PoolHandle, row: &DatasetSummary, field: &str, parsable: bool) -> Result<String> {
    Ok(match field {
        "name" => row.name.clone(),
        "used" => size_cell(row.used, parsable),
        "avail" | "available" => size_cell(row.avail, parsable),
        "refer" | "referenced" => size_cell(row.refer, parsable),
        "mountpoint" => row.mountpoint.clone(),
        "type" => row.kind.clone(),
        "origin" => row.origin.clone(),
        key => {
            let v = h.get(&Target::parse(&row.name)?, key)?;
            value_cell(key, &v.value, parsable)
        }
    })
}

/// Numbers sort by value, and before any text such as `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Num(u64),
    Text(String),
}

impl SortKey {
    fn of(raw: String) -> Self {
        match raw.parse::<u64>() {
            Ok(n) => SortKey::Num(n),
            Err(_) => SortKey::Text(raw),
        }
    }
}

struct Row {
    cells: Vec<String>,
    keys: Vec<SortKey>,
}

pub struct ListOptions<'a> {
    pub recursive: bool,
    pub depth: Option<usize>,
    pub types: Option<&'a str>,
    pub scripted: bool,
    pub parsable: bool,
    pub fields: &'a str,
    /// Ascending sort columns, applied before `sort_desc`.
    pub sort_asc: &'a [String],
    pub sort_desc: &'a [String],
}

pub fn list(targets: &[String], opts: &ListOptions<'_>) -> Result<()> {
    let fields: Vec<&str> = opts.fields.split(',').map(str::trim).collect();
    for f in &fields {
        check_field(f)?;
    }
    let sort: Vec<(&str, bool)> = opts
        .sort_asc
        .iter()
        .map(|k| (k.as_str(), false))
        .chain(opts.sort_desc.iter().map(|k| (k.as_str(), true)))
        .collect();
    for (k, _) in &sort {
        check_field(k)?;
    }
    let filter = match opts.types {
        Some(t) => TypeFilter::parse(t)?,
        // naming a snapshot lists it even without -t
        None if targets.iter().any(|t| t.contains('@')) => TypeFilter {
            snapshots: true,
            ..TypeFilter::default()
        },
        None => TypeFilter::default(),
    };

    let mgr = manager();
    let groups: Vec<(String, Vec<Target>)> = if targets.is_empty() {
        mgr.pool_names()?.into_iter().map(|p| (p, Vec::new())).collect()
    } else {
        by_pool(targets)?.into_iter().collect()
    };
    let mut rows: Vec<Row> = Vec::new();
    for (pool, ts) in groups {
        let h = mgr.open_ro(&pool)?;
        for r in h.list(filter, &ts, opts.recursive, opts.depth)? {
            let mut cells = Vec::with_capacity(fields.len());
            for f in &fields {
                cells.push(cell(&h, &r, f, opts.parsable)?);
            }
            let mut keys = Vec::with_capacity(sort.len());
            for (k, _) in &sort {
                keys.push(SortKey::of(cell(&h, &r, k, true)?));
            }
            rows.push(Row { cells, keys });
        }
    }
    if !sort.is_empty() {
        rows.sort_by(|a, b| {
            for (i, (_, desc)) in sort.iter().enumerate() {
                let o = a.keys[i].cmp(&b.keys[i]);
                let o = if *desc { o.reverse() } else { o };
                if o != Ordering::Equal {
                    return o;
                }
            }
            Ordering::Equal
        });
    }

    let mut t = Table::new(&fields[..]);
    for r in rows {
        t.push(r.cells);
    }
    if t.is_empty() && !opts.scripted {
        eprintln!("no datasets available");
        return Ok(());
    }
    print!("{}", t.render(opts.scripted));
    Ok(())
}

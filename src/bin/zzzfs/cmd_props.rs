use anyhow::Result;

use zzzfs::cli::{value_cell, Table};
use zzzfs::props::parse_assignment;
use zzzfs::{Source, Target, TypeFilter, ZfsError};

use crate::util::{by_pool, manager};

const GET_FIELDS: &[&str] = &["name", "property", "value", "source"];
const SOURCES: &[&str] = &["local", "inherited", "default", "none"];

fn source_class(s: &Source) -> &'static str {
    match s {
        Source::Local => "local",
        Source::Inherited(_) => "inherited",
        Source::Default => "default",
        Source::None => "none",
    }
}

/// A comma list drawn from `allowed`, or everything for `all`/absent.
fn pick<'a>(list: Option<&'a str>, allowed: &[&'a str], what: &str) -> Result<Vec<&'a str>> {
    let list = match list {
        None | Some("all") => return Ok(allowed.to_vec()),
        Some(l) => l,
    };
    let mut out = Vec::new();
    for part in list.split(',').map(str::trim) {
        if !allowed.contains(&part) {
            return Err(ZfsError::Name(format!("{}: invalid {}", part, what)).into());
        }
        out.push(part);
    }
    Ok(out)
}

pub struct GetOptions<'a> {
    pub recursive: bool,
    pub depth: Option<usize>,
    /// Comma list of name,property,value,source.
    pub fields: Option<&'a str>,
    /// Comma list of local,inherited,default,none.
    pub sources: Option<&'a str>,
    pub types: Option<&'a str>,
    pub scripted: bool,
    pub parsable: bool,
}

pub fn get(keys: &str, targets: &[String], opts: &GetOptions<'_>) -> Result<()> {
    let fields = pick(opts.fields, GET_FIELDS, "field")?;
    let sources = pick(opts.sources, SOURCES, "source")?;
    let filter = match opts.types {
        Some(t) => TypeFilter::parse(t)?,
        None => TypeFilter::all(),
    };
    let mgr = manager();
    let mut t = Table::new(&fields[..]);
    for (pool, ts) in by_pool(targets)? {
        let h = mgr.open_ro(&pool)?;
        let mut all = Vec::new();
        for target in ts {
            match &target {
                Target::Dataset(_) if opts.recursive || opts.depth.is_some() => {
                    let rows = h.list(TypeFilter::all(), std::slice::from_ref(&target), true, opts.depth)?;
                    for r in rows {
                        all.push(Target::parse(&r.name)?);
                    }
                }
                _ => all.push(target.clone()),
            }
        }
        for target in &all {
            if !filter.accepts(&h.get(target, "type")?.value) {
                continue;
            }
            let props = if keys == "all" {
                h.properties(target)?.into_iter().collect::<Vec<_>>()
            } else {
                let mut v = Vec::new();
                for k in keys.split(',').map(str::trim) {
                    v.push((k.to_string(), h.get(target, k)?));
                }
                v
            };
            for (k, v) in props {
                if !sources.contains(&source_class(&v.source)) {
                    continue;
                }
                let row = fields
                    .iter()
                    .map(|f| match *f {
                        "name" => target.to_string(),
                        "property" => k.clone(),
                        "value" => value_cell(&k, &v.value, opts.parsable),
                        _ => v.source.to_string(),
                    })
                    .collect();
                t.push(row);
            }
        }
    }
    print!("{}", t.render(opts.scripted));
    Ok(())
}

pub fn set(assignment: &str, targets: &[String]) -> Result<()> {
    let (key, value) = parse_assignment(assignment)?;
    let mgr = manager();
    for (pool, ts) in by_pool(targets)? {
        let mut h = mgr.open(&pool)?;
        for t in &ts {
            h.set(t, &key, &value)?;
        }
    }
    Ok(())
}

pub fn inherit(key: &str, targets: &[String], recursive: bool) -> Result<()> {
    let mgr = manager();
    for (pool, ts) in by_pool(targets)? {
        let mut h = mgr.open(&pool)?;
        for t in &ts {
            h.inherit(t, key, recursive)?;
        }
    }
    Ok(())
}

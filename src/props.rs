//! Attribute resolution.
//!
//! A dataset's value for a key is, in order:
//! 1. its own local override,
//! 2. the nearest ancestor's local override (source `inherited from <anc>`),
//! 3. the built-in default for native keys,
//! 4. `-` with source `-`.
//!
//! Inheritance is an upward walk over the namespace index. An inherited
//! `mountpoint` gets the path below the ancestor appended.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::error::ZfsError;
use crate::name::{valid_component, DatasetName};
use crate::namespace::{Namespace, PropValue, Source};
use crate::util::parse_size;

pub const MOUNTPOINT: &str = "mountpoint";

/// Settable native keys with their built-in defaults.
pub const NATIVE_DEFAULTS: &[(&str, &str)] = &[
    ("atime", "on"),
    ("canmount", "on"),
    ("checksum", "on"),
    ("compression", "off"),
    ("dedup", "off"),
    ("quota", "none"),
    ("readonly", "off"),
    ("recordsize", "128K"),
    ("reservation", "none"),
    ("snapdir", "hidden"),
];

/// Computed keys; never settable.
pub const READONLY_KEYS: &[&str] = &[
    "name",
    "type",
    "creation",
    "createtxg",
    "used",
    "available",
    "referenced",
    "origin",
    "volsize",
];

const ON_OFF: &[&str] = &["atime", "checksum", "dedup", "readonly"];
const COMPRESSION: &[&str] = &[
    "on", "off", "lz4", "lzjb", "gzip", "gzip-1", "gzip-2", "gzip-3", "gzip-4", "gzip-5",
    "gzip-6", "gzip-7", "gzip-8", "gzip-9", "zle", "zstd",
];

pub fn is_readonly(key: &str) -> bool {
    READONLY_KEYS.contains(&key)
}

pub fn native_default(key: &str) -> Option<&'static str> {
    NATIVE_DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Any key that may be passed to `get`.
pub fn validate_key(key: &str) -> Result<()> {
    if !valid_component(key) {
        return Err(ZfsError::Name(format!("{}: invalid property", key)).into());
    }
    Ok(())
}

/// Checks a key/value pair for `set` (and `-o` at create time).
pub fn validate_assignment(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;
    if is_readonly(key) {
        return Err(ZfsError::Name(format!("{}: property is read-only", key)).into());
    }
    let bad = || -> anyhow::Error {
        ZfsError::Name(format!("{}={}: invalid value for property", key, value)).into()
    };
    match key {
        k if ON_OFF.contains(&k) => {
            if value != "on" && value != "off" {
                return Err(bad());
            }
        }
        "canmount" => {
            if !matches!(value, "on" | "off" | "noauto") {
                return Err(bad());
            }
        }
        "compression" => {
            if !COMPRESSION.contains(&value) {
                return Err(bad());
            }
        }
        "snapdir" => {
            if !matches!(value, "hidden" | "visible") {
                return Err(bad());
            }
        }
        "quota" | "reservation" => {
            if value != "none" && parse_size(value).is_none() {
                return Err(bad());
            }
        }
        "recordsize" => match parse_size(value) {
            Some(n) if n.is_power_of_two() && (512..=1 << 20).contains(&n) => {}
            _ => return Err(bad()),
        },
        MOUNTPOINT => {
            if !(value == "none" || value == "legacy" || value.starts_with('/')) {
                return Err(bad());
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse "key=value" as given on the command line.
pub fn parse_assignment(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(ZfsError::Name(format!("{:?}: invalid property=value format", s)).into()),
    }
}

/// Walk from `ds` up to the pool root looking for a local override.
pub fn resolve_explicit(ns: &Namespace, ds: &DatasetName, key: &str) -> Option<PropValue> {
    if let Some(v) = ns.get(ds).and_then(|e| e.local.get(key)) {
        return Some(PropValue {
            value: v.clone(),
            source: Source::Local,
        });
    }
    for anc in ds.ancestors() {
        if let Some(v) = ns.get(&anc).and_then(|e| e.local.get(key)) {
            let value = if key == MOUNTPOINT {
                inherited_mountpoint(v, &anc, ds)
            } else {
                v.clone()
            };
            return Some(PropValue {
                value,
                source: Source::Inherited(anc.to_string()),
            });
        }
    }
    None
}

/// Explicit resolution, falling back to the built-in default and then `-`.
pub fn resolve(ns: &Namespace, ds: &DatasetName, key: &str) -> PropValue {
    if let Some(pv) = resolve_explicit(ns, ds, key) {
        return pv;
    }
    match native_default(key) {
        Some(v) => PropValue {
            value: v.to_string(),
            source: Source::Default,
        },
        None => PropValue {
            value: "-".to_string(),
            source: Source::None,
        },
    }
}

/// Every key with a local or inherited value at `ds`. This is what a
/// snapshot freezes and what a send stream carries.
pub fn explicit_set(ns: &Namespace, ds: &DatasetName) -> BTreeMap<String, PropValue> {
    let mut out = BTreeMap::new();
    let mut chain = vec![ds.clone()];
    chain.extend(ds.ancestors());
    for d in &chain {
        if let Some(e) = ns.get(d) {
            for k in e.local.keys() {
                if !out.contains_key(k) {
                    if let Some(pv) = resolve_explicit(ns, ds, k) {
                        out.insert(k.clone(), pv);
                    }
                }
            }
        }
    }
    out
}

// "/mnt/x" set on pool/a, seen from pool/a/b/c → "/mnt/x/b/c"
fn inherited_mountpoint(value: &str, anc: &DatasetName, ds: &DatasetName) -> String {
    if value == "none" || value == "legacy" {
        return value.to_string();
    }
    let below = &ds.as_str()[anc.as_str().len()..];
    format!("{}{}", value.trim_end_matches('/'), below)
}

//! pool/props — get/set/inherit/list on top of the resolution rules in
//! `crate::props`, plus the computed read-only keys.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::error::ZfsError;
use crate::fsops::Undo;
use crate::name::{DatasetName, Target};
use crate::namespace::{DatasetKind, PropValue, Source};
use crate::props::{
    self, is_readonly, native_default, validate_assignment, validate_key, MOUNTPOINT,
    NATIVE_DEFAULTS, READONLY_KEYS,
};
use crate::util::format_creation;

use super::core::PoolHandle;

fn computed(value: String) -> PropValue {
    PropValue {
        value,
        source: Source::None,
    }
}

fn size_or_dash(n: Option<u64>) -> String {
    n.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

impl PoolHandle {
    pub fn get(&self, target: &Target, key: &str) -> Result<PropValue> {
        validate_key(key)?;
        match target {
            Target::Dataset(d) => {
                self.entry(d)?;
                if let Some(v) = self.computed_dataset(d, key)? {
                    return Ok(v);
                }
                Ok(props::resolve(&self.ns, d, key))
            }
            Target::Snapshot(s) => {
                let rec = self.snapshot_record(s)?;
                let v = match key {
                    "name" => computed(s.to_string()),
                    "type" => computed("snapshot".into()),
                    "creation" => computed(format_creation(rec.created_unix_ms)),
                    "createtxg" => computed(rec.createtxg.to_string()),
                    "used" | "referenced" => computed(rec.referenced.to_string()),
                    "available" | "origin" | "volsize" | MOUNTPOINT => computed("-".into()),
                    k => match (rec.own.get(k), rec.properties.get(k)) {
                        (Some(v), _) => PropValue {
                            value: v.clone(),
                            source: Source::Local,
                        },
                        (None, Some(pv)) => pv.clone(),
                        (None, None) => match native_default(k) {
                            Some(v) => PropValue {
                                value: v.to_string(),
                                source: Source::Default,
                            },
                            None => computed("-".into()),
                        },
                    },
                };
                Ok(v)
            }
        }
    }

    fn computed_dataset(&self, d: &DatasetName, key: &str) -> Result<Option<PropValue>> {
        let e = self.entry(d)?;
        let v = match key {
            "name" => computed(d.to_string()),
            "type" => computed(e.record.kind.to_string()),
            "creation" => computed(format_creation(e.record.created_unix_ms)),
            "createtxg" => computed(e.record.createtxg.to_string()),
            "used" => {
                let usage = self.space_usage()?;
                computed(size_or_dash(usage.get(d.as_str()).and_then(|u| u.0)))
            }
            "referenced" => computed(size_or_dash(self.referenced(d))),
            "available" => computed(size_or_dash(
                fs2::available_space(&self.layout.content_root()).ok(),
            )),
            "origin" => computed(e.record.origin.clone().unwrap_or_else(|| "-".into())),
            "volsize" => computed(size_or_dash(e.record.volsize)),
            MOUNTPOINT => {
                if e.record.kind == DatasetKind::Volume {
                    computed("-".into())
                } else {
                    match props::resolve_explicit(&self.ns, d, MOUNTPOINT) {
                        Some(pv) => pv,
                        None => PropValue {
                            value: self.layout.content_dir(d).display().to_string(),
                            source: Source::Default,
                        },
                    }
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    /// Set a local override.
    pub fn set(&mut self, target: &Target, key: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;
        let d = match target {
            Target::Snapshot(s) => {
                return Err(ZfsError::Name(format!(
                    "{}: snapshot properties cannot be modified",
                    s
                ))
                .into())
            }
            Target::Dataset(d) => d,
        };
        validate_assignment(key, value)?;
        let mut entry = self.entry(d)?.clone();
        if key == MOUNTPOINT && entry.record.kind == DatasetKind::Volume {
            return Err(ZfsError::Name(format!("{}: volumes have no mountpoint", d)).into());
        }
        entry.local.insert(key.to_string(), value.to_string());
        let mut undo = Undo::new();
        undo.write_json(&self.layout.properties_file(d), &entry.local, self.cfg.fsync)?;
        undo.commit();
        self.ns.insert(d, entry);
        self.done(&format!("set {}={} on {}", key, value, d), || {
            format!("zzzfs set {}={} {}", key, value, d)
        })
    }

    /// Drop the local override of `key` (on every descendant too with `recursive`).
    pub fn inherit(&mut self, target: &Target, key: &str, recursive: bool) -> Result<()> {
        self.ensure_writable()?;
        let d = match target {
            Target::Snapshot(s) => {
                return Err(ZfsError::Name(format!(
                    "{}: snapshot properties cannot be modified",
                    s
                ))
                .into())
            }
            Target::Dataset(d) => d,
        };
        validate_key(key)?;
        if is_readonly(key) {
            return Err(ZfsError::Name(format!("{}: property is read-only", key)).into());
        }
        self.entry(d)?;
        let mut targets = vec![d.clone()];
        if recursive {
            targets.extend(self.ns.descendants(d));
        }

        let mut undo = Undo::new();
        let mut changed = Vec::new();
        for t in targets {
            let mut e = match self.ns.get(&t) {
                Some(e) if e.local.contains_key(key) => e.clone(),
                _ => continue,
            };
            e.local.remove(key);
            undo.write_json(&self.layout.properties_file(&t), &e.local, self.cfg.fsync)?;
            changed.push((t, e));
        }
        undo.commit();
        for (t, e) in changed {
            self.ns.insert(&t, e);
        }
        let r = if recursive { "-r " } else { "" };
        self.done(&format!("inherit {} on {}", key, d), || {
            format!("zzzfs inherit {}{} {}", r, key, d)
        })
    }

    /// Every resolved key: computed ones, native keys and any set explicitly.
    pub fn properties(&self, target: &Target) -> Result<BTreeMap<String, PropValue>> {
        let mut keys: Vec<String> = READONLY_KEYS.iter().map(|k| k.to_string()).collect();
        keys.push(MOUNTPOINT.to_string());
        keys.extend(NATIVE_DEFAULTS.iter().map(|(k, _)| k.to_string()));
        match target {
            Target::Dataset(d) => {
                self.entry(d)?;
                keys.extend(props::explicit_set(&self.ns, d).into_keys());
            }
            Target::Snapshot(s) => {
                let rec = self.snapshot_record(s)?;
                keys.extend(rec.properties.keys().cloned());
                keys.extend(rec.own.keys().cloned());
            }
        }
        let mut out = BTreeMap::new();
        for k in keys {
            if out.contains_key(&k) {
                continue;
            }
            let v = self.get(target, &k)?;
            out.insert(k, v);
        }
        Ok(out)
    }
}

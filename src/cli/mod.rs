//! Helpers shared by the `zzzfs` and `zzzpool` binaries.
//!
//! Submodules:
//! - table: column/tab-separated output

pub mod table;

use anyhow::Result;
use env_logger::{Builder, Env};
use std::collections::BTreeMap;

use crate::error::exit_code;
use crate::props::parse_assignment;
use crate::util::human_bytes;

pub use table::Table;

/// Level from RUST_LOG, `warn` otherwise.
/// Example: RUST_LOG=debug zzzfs snapshot -r tank@now
pub fn init_logger() {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();
}

/// Print the error chain and exit with the code for its kind.
pub fn fail(e: anyhow::Error) -> ! {
    eprintln!("error: {:#}", e);
    std::process::exit(exit_code(&e));
}

/// The invocation as typed, for the pool history (`zzzfs create -p tank/a`).
pub fn command_line() -> String {
    let mut args = std::env::args();
    let prog = args
        .next()
        .map(|p| {
            std::path::Path::new(&p)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or(p)
        })
        .unwrap_or_default();
    let mut parts = vec![prog];
    for a in args {
        if a.is_empty() || a.contains(char::is_whitespace) {
            parts.push(format!("'{}'", a));
        } else {
            parts.push(a);
        }
    }
    parts.join(" ")
}

/// `-o key=value` arguments into a map; the last assignment of a key wins.
pub fn parse_props(assignments: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for a in assignments {
        let (k, v) = parse_assignment(a)?;
        out.insert(k, v);
    }
    Ok(out)
}

/// Properties whose values are byte counts, humanized unless `-p`.
pub const SIZE_KEYS: &[&str] = &["used", "available", "referenced", "volsize", "quota", "reservation"];

/// Size column: `-` when unknown, exact bytes with `-p`, human otherwise.
pub fn size_cell(n: Option<u64>, parsable: bool) -> String {
    match n {
        None => "-".to_string(),
        Some(v) if parsable => v.to_string(),
        Some(v) => human_bytes(v),
    }
}

/// A property value for display: byte counts go through `size_cell`.
pub fn value_cell(key: &str, value: &str, parsable: bool) -> String {
    if SIZE_KEYS.contains(&key) {
        if let Ok(n) = value.parse::<u64>() {
            return size_cell(Some(n), parsable);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_and_sizes() -> Result<()> {
        let m = parse_props(&["compression=gzip".into(), "atime=off".into(), "atime=on".into()])?;
        assert_eq!(m.get("atime").map(String::as_str), Some("on"));
        assert_eq!(m.len(), 2);
        assert!(parse_props(&["novalue".into()]).is_err());
        assert_eq!(size_cell(None, false), "-");
        assert_eq!(size_cell(Some(2048), true), "2048");
        assert_eq!(size_cell(Some(2048), false), "2.00K");
        assert_eq!(value_cell("quota", "2048", false), "2.00K");
        assert_eq!(value_cell("quota", "none", false), "none");
        assert_eq!(value_cell("compression", "2048", false), "2048");
        Ok(())
    }
}

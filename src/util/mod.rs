//! util — small shared helpers (time, env flags, user/host lookup).

use chrono::{DateTime, Local, Utc};

/// Current Unix time in milliseconds.
#[inline]
pub fn now_unix_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_millis().min(i64::MAX as u128) as i64
}

/// Interpret an env var as a boolean flag ("1|true|yes|on").
pub fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_ascii_lowercase())
        .map(|s| s == "1" || s == "true" || s == "yes" || s == "on")
        .unwrap_or(false)
}

/// Local time for a Unix millisecond timestamp (falls back to the epoch).
pub fn local_time(ms: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .with_timezone(&Local)
}

/// `creation` property rendering, e.g. "Sat Oct 18 12:04 2026".
pub fn format_creation(ms: i64) -> String {
    local_time(ms).format("%a %b %e %H:%M %Y").to_string()
}

/// History timestamp rendering, e.g. "2026-10-18.12:04:55".
pub fn format_history_time(ms: i64) -> String {
    local_time(ms).format("%Y-%m-%d.%H:%M:%S").to_string()
}

pub fn current_user() -> String {
    for var in ["USER", "LOGNAME", "USERNAME"] {
        if let Ok(v) = std::env::var(var) {
            let v = v.trim();
            if !v.is_empty() {
                return v.to_string();
            }
        }
    }
    "unknown".to_string()
}

pub fn current_host() -> String {
    if let Ok(v) = std::env::var("HOSTNAME") {
        let v = v.trim();
        if !v.is_empty() {
            return v.to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Human-readable byte count in the style of `zfs list` (1024-based, 3 significant digits).
pub fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 7] = ["B", "K", "M", "G", "T", "P", "E"];
    if n < 1024 {
        return format!("{}B", n);
    }
    let mut v = n as f64;
    let mut idx = 0;
    while v >= 1024.0 && idx < UNITS.len() - 1 {
        v /= 1024.0;
        idx += 1;
    }
    if v >= 100.0 {
        format!("{:.0}{}", v, UNITS[idx])
    } else if v >= 10.0 {
        format!("{:.1}{}", v, UNITS[idx])
    } else {
        format!("{:.2}{}", v, UNITS[idx])
    }
}

/// Parse sizes like "10M", "1.5G", "4096" into bytes.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (num, mult) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let m: u64 = match c.to_ascii_uppercase() {
                'B' => 1,
                'K' => 1 << 10,
                'M' => 1 << 20,
                'G' => 1 << 30,
                'T' => 1 << 40,
                'P' => 1 << 50,
                _ => return None,
            };
            (&s[..i], m)
        }
        _ => (s, 1),
    };
    if let Ok(n) = num.parse::<u64>() {
        return n.checked_mul(mult);
    }
    let f: f64 = num.parse().ok()?;
    if !(f >= 0.0) {
        return None;
    }
    Some((f * mult as f64) as u64)
}

//! Error taxonomy.
//!
//! Library functions return `anyhow::Result` and attach context to every
//! filesystem call. Domain failures are raised as a `ZfsError` value so that
//! callers (CLI exit codes, tests) can classify them with [`error_kind`];
//! everything else in the chain that is an `std::io::Error` counts as IO.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ZfsError {
    /// Invalid, duplicate or malformed name (also read-only property keys).
    #[error("{0}")]
    Name(String),
    /// Missing pool, dataset or snapshot.
    #[error("{0}")]
    NotFound(String),
    /// Destroy blocked by children or snapshots.
    #[error("{0}")]
    NotEmpty(String),
    /// Clone/snapshot dependency violation.
    #[error("{0}")]
    Dependency(String),
    /// Receive target already exists or was modified.
    #[error("{0}")]
    Conflict(String),
    /// Malformed or unsupported send stream.
    #[error("{0}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Name,
    NotFound,
    NotEmpty,
    Dependency,
    Conflict,
    Format,
    Io,
}

impl ZfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZfsError::Name(_) => ErrorKind::Name,
            ZfsError::NotFound(_) => ErrorKind::NotFound,
            ZfsError::NotEmpty(_) => ErrorKind::NotEmpty,
            ZfsError::Dependency(_) => ErrorKind::Dependency,
            ZfsError::Conflict(_) => ErrorKind::Conflict,
            ZfsError::Format(_) => ErrorKind::Format,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Name => "name",
            ErrorKind::NotFound => "not found",
            ErrorKind::NotEmpty => "not empty",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Format => "format",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Classify an error chain. The first `ZfsError` found wins; anything else
/// (io errors, sidecar parse failures) is reported as IO.
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(z) = cause.downcast_ref::<ZfsError>() {
            return z.kind();
        }
    }
    ErrorKind::Io
}

/// Process exit code used by the binaries (1 = generic, 2 = usage-like).
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match error_kind(err) {
        ErrorKind::Name | ErrorKind::NotFound => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_context() {
        let e: anyhow::Result<()> = Err(ZfsError::NotFound("x".into()).into());
        let e = e.context("outer").unwrap_err();
        assert_eq!(error_kind(&e), ErrorKind::NotFound);
    }

    #[test]
    fn io_is_default() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let e = anyhow::Error::from(io);
        assert_eq!(error_kind(&e), ErrorKind::Io);
    }
}

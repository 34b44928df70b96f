// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Structured error type used across the pipeline.
//!
//! Modelled on [gRPC's `StatusCode`](https://github.com/grpc/grpc/blob/master/doc/statuscodes.md),
//! which is a convenient general-purpose classification: every error carries
//! a `kind`, a message, and an optional chained cause.

use std::fmt;
use std::sync::Arc;

/// Error kind. See the gRPC status codes for descriptions of each variant.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unknown => "Unknown",
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::DeadlineExceeded => "Deadline exceeded",
            ErrorKind::NotFound => "Not found",
            ErrorKind::AlreadyExists => "Already exists",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::ResourceExhausted => "Resource exhausted",
            ErrorKind::FailedPrecondition => "Failed precondition",
            ErrorKind::Aborted => "Aborted",
            ErrorKind::OutOfRange => "Out of range",
            ErrorKind::Unimplemented => "Unimplemented",
            ErrorKind::Internal => "Internal",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::DataLoss => "Data loss",
        };
        f.write_str(s)
    }
}

struct Inner {
    kind: ErrorKind,
    msg: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

/// The pipeline's error type: a classification plus an optional message and cause chain.
#[derive(Clone)]
pub struct Error(Arc<Inner>);

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Error(Arc::new(Inner {
            kind,
            msg: Some(msg.into()),
            source: None,
        }))
    }

    pub fn with_source(
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error(Arc::new(Inner {
            kind,
            msg: Some(msg.into()),
            source: Some(Arc::new(source)),
        }))
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Error(Arc::new(Inner {
            kind,
            msg: None,
            source: None,
        }))
    }

    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    /// Renders the full cause chain, one line each, suitable for logging.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut cur = self.0.source.as_ref();
        while let Some(e) = cur {
            out.push_str("\ncaused by: ");
            out.push_str(&e.to_string());
            cur = e
                .source()
                .and_then(|s| s.downcast_ref::<Error>())
                .map(|e| &e.0)
                .and_then(|i| i.source.as_ref());
        }
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0.msg {
            Some(m) => write!(f, "{}: {}", self.0.kind, m),
            None => fmt::Display::fmt(&self.0.kind, f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error {{ kind: {:?}, msg: {:?} }}", self.0.kind, self.0.msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from_kind(kind)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Error {
        Error::with_source(ErrorKind::Internal, "sqlite error", e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Internal,
        };
        Error::with_source(kind, "I/O error", e)
    }
}

/// Extension methods for annotating a foreign `Result` with a `ErrorKind`.
pub trait ResultExt<T, E> {
    fn err_kind(self, k: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, k: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| Error::with_source(k, e.to_string(), e))
    }
}

/// Builds an [`Error`] of the given kind.
///
/// ```ignore
/// err!(NotFound, msg("no such camera {camera_id}"))
/// err!(Internal, msg("write failed"), source(io_err))
/// ```
#[macro_export]
macro_rules! err {
    ($kind:ident, msg($($arg:tt)+)) => {
        $crate::Error::new($crate::ErrorKind::$kind, format!($($arg)+))
    };
    ($kind:ident, msg($($arg:tt)+), source($source:expr)) => {
        $crate::Error::with_source($crate::ErrorKind::$kind, format!($($arg)+), $source)
    };
}

/// Like [`err!`], but returns immediately.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)+) => {
        return Err($crate::err!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let e = err!(NotFound, msg("no such camera {}", "cam1"));
        assert_eq!(e.to_string(), "Not found: no such camera cam1");
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn chain_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e = err!(Internal, msg("snapshot write failed"), source(io));
        let chain = e.chain();
        assert!(chain.contains("Internal: snapshot write failed"));
        assert!(chain.contains("caused by: disk full"));
    }

    #[test]
    fn bail_macro_returns_err() {
        fn f() -> Result<(), Error> {
            bail!(PermissionDenied, msg("view_video required"));
        }
        let e = f().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::PermissionDenied);
    }
}

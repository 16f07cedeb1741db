// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Portable error taxonomy.
//!
//! Every platform failure code (`errno`, Win32 error codes) is translated into
//! one of a handful of [`ErrorKind`]s. The original code is kept as diagnostic
//! context only: portable logic never needs it.

use std::borrow::Cow;
use std::io;

use thiserror::Error;

/// Raw platform error code: an `errno` value on unix, a Win32 error code on
/// Windows.
pub type RawOsError = i32;

/// Portable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// The executable (or another path) does not exist.
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    /// The other end of a pipe was closed: the child exited or closed its stream.
    #[error("broken pipe")]
    BrokenPipe,
    /// The deadline elapsed before the operation could complete.
    #[error("deadline elapsed")]
    Timeout,
    #[error("operation would block")]
    WouldBlock,
    #[error("invalid argument")]
    InvalidArgument,
    /// An OS resource limit was hit (descriptors, memory, process table).
    #[error("system resources exhausted")]
    Exhausted,
    /// A forcefully killed process did not report its exit. No further
    /// escalation is possible.
    #[error("process did not exit after being killed")]
    Fatal,
    #[error("system error")]
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}{}", describe_detail(.detail), describe_os_code(.os_code))]
pub struct Error {
    kind: ErrorKind,
    os_code: Option<RawOsError>,
    detail: Option<Cow<'static, str>>,
}

fn describe_detail(detail: &Option<Cow<'static, str>>) -> String {
    detail
        .as_ref()
        .map(|detail| format!(": {detail}"))
        .unwrap_or_default()
}

fn describe_os_code(os_code: &Option<RawOsError>) -> String {
    os_code
        .map(|code| format!(" (os error {code})"))
        .unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            os_code: None,
            detail: None,
        }
    }

    pub fn with_detail<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Self {
        Self {
            kind,
            os_code: None,
            detail: Some(detail.into()),
        }
    }

    /// Attaches `code` while overriding the kind `translate` would pick.
    pub(crate) fn with_os_code(kind: ErrorKind, code: RawOsError) -> Self {
        Self {
            kind,
            os_code: Some(code),
            detail: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Platform code this error was translated from, if any.
    pub fn os_code(&self) -> Option<RawOsError> {
        self.os_code
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub(crate) fn context<D: Into<Cow<'static, str>>>(mut self, detail: D) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

/// Maps a platform error code to a portable [`Error`].
///
/// Total: codes without a dedicated kind become [`ErrorKind::Generic`]. The
/// code is always attached to the result.
pub fn translate(code: RawOsError) -> Error {
    Error {
        kind: crate::sys::error_kind(code),
        os_code: Some(code),
        detail: None,
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return translate(code);
        }
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            io::ErrorKind::WouldBlock => ErrorKind::WouldBlock,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                ErrorKind::InvalidArgument
            }
            io::ErrorKind::OutOfMemory => ErrorKind::Exhausted,
            _ => ErrorKind::Generic,
        };
        Error::with_detail(kind, err.to_string())
    }
}

#[cfg(unix)]
impl From<nix::Error> for Error {
    fn from(errno: nix::Error) -> Self {
        translate(errno as RawOsError)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        if let (Some(code), None) = (err.os_code, &err.detail) {
            return io::Error::from_raw_os_error(code);
        }
        let kind = match err.kind {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::BrokenPipe => io::ErrorKind::BrokenPipe,
            ErrorKind::Timeout => io::ErrorKind::TimedOut,
            ErrorKind::WouldBlock => io::ErrorKind::WouldBlock,
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::Exhausted => io::ErrorKind::OutOfMemory,
            ErrorKind::Fatal | ErrorKind::Generic => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

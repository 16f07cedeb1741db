// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Windows backend: `CreateProcessW`, overlapped named pipes, waitable
//! process handles.

mod errno;
mod pipe;
mod process;
mod spawn;

use std::os::windows::io::{FromRawHandle, OwnedHandle};

use windows_sys::Win32::Foundation::{GetLastError, HANDLE, INVALID_HANDLE_VALUE};

pub(crate) use errno::error_kind;
pub(crate) use pipe::Pipe;
pub(crate) use process::ProcessHandle;
pub(crate) use spawn::spawn;

/// Error for the calling thread's last Win32 error.
pub(crate) fn last_error() -> crate::Error {
    crate::translate(unsafe { GetLastError() } as i32)
}

pub(crate) fn timeout_error() -> crate::Error {
    crate::Error::new(crate::ErrorKind::Timeout)
}

/// Takes ownership of a handle returned by a Win32 call, failing with the last
/// error if it is null or `INVALID_HANDLE_VALUE`.
///
/// # Safety
///
/// `handle` must be a freshly created handle that nothing else closes.
pub(crate) unsafe fn owned_handle(handle: HANDLE) -> crate::Result<OwnedHandle> {
    if handle.is_null() || handle == INVALID_HANDLE_VALUE {
        return Err(last_error());
    }
    Ok(OwnedHandle::from_raw_handle(handle))
}

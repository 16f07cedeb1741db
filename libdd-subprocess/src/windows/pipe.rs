// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, OwnedHandle};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;
use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_BROKEN_PIPE, ERROR_IO_PENDING, ERROR_OPERATION_ABORTED, FALSE,
    GENERIC_READ, GENERIC_WRITE, HANDLE, TRUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_FIRST_PIPE_INSTANCE,
    FILE_FLAG_OVERLAPPED, FILE_WRITE_ATTRIBUTES, OPEN_EXISTING, PIPE_ACCESS_INBOUND,
    PIPE_ACCESS_OUTBOUND,
};
use windows_sys::Win32::System::Pipes::{
    CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_REJECT_REMOTE_CLIENTS, PIPE_TYPE_BYTE, PIPE_WAIT,
};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

use super::{last_error, owned_handle, timeout_error};
use crate::deadline::TimeoutManager;
use crate::{translate, Deadline, Error, ErrorKind, Result, Stream};

pub(crate) const PIPE_PATH: &str = r"\\.\pipe\";

const PIPE_BUFFER_SIZE: u32 = 64 * 1024;

static PIPE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Parent-side end of a stdio pipe: the server end of a uniquely named pipe,
/// opened for overlapped I/O and not inheritable.
#[derive(Debug)]
pub(crate) struct Pipe {
    handle: OwnedHandle,
}

fn unique_pipe_name() -> Vec<u16> {
    let name = format!(
        "{PIPE_PATH}libdd-subprocess-{}-{}-{}",
        std::process::id(),
        PIPE_COUNTER.fetch_add(1, Ordering::Relaxed),
        fastrand::u64(..),
    );
    OsStr::new(&name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Creates the pipe for `stream`, returning the parent end and the child end.
///
/// The child end is a synchronous, inheritable client handle.
pub(crate) fn create(stream: Stream) -> Result<(Pipe, OwnedHandle)> {
    let name = unique_pipe_name();
    let parent_reads = stream != Stream::Stdin;
    let access = if parent_reads {
        PIPE_ACCESS_INBOUND
    } else {
        PIPE_ACCESS_OUTBOUND
    };

    // Safety: name is NUL terminated, null security attributes make the handle
    // non-inheritable
    let parent = unsafe {
        owned_handle(CreateNamedPipeW(
            name.as_ptr(),
            access | FILE_FLAG_OVERLAPPED | FILE_FLAG_FIRST_PIPE_INSTANCE,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT | PIPE_REJECT_REMOTE_CLIENTS,
            1,
            PIPE_BUFFER_SIZE,
            PIPE_BUFFER_SIZE,
            0,
            std::ptr::null(),
        ))?
    };

    let inheritable = SECURITY_ATTRIBUTES {
        nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: std::ptr::null_mut(),
        bInheritHandle: TRUE,
    };
    let child_access = if parent_reads {
        GENERIC_WRITE
    } else {
        GENERIC_READ | FILE_WRITE_ATTRIBUTES
    };
    let child = unsafe {
        owned_handle(CreateFileW(
            name.as_ptr(),
            child_access,
            0,
            &inheritable,
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            std::ptr::null_mut(),
        ))?
    };

    Ok((Pipe { handle: parent }, child))
}

/// Manual-reset event signalled when an overlapped operation completes.
struct Event(OwnedHandle);

impl Event {
    fn new() -> Result<Self> {
        let handle = unsafe {
            owned_handle(CreateEventW(
                std::ptr::null(),
                TRUE,
                FALSE,
                std::ptr::null(),
            ))?
        };
        Ok(Self(handle))
    }

    fn raw(&self) -> HANDLE {
        self.0.as_raw_handle()
    }
}

impl Pipe {
    pub(crate) fn read(&self, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::with_detail(ErrorKind::InvalidArgument, "empty buffer"));
        }
        let len = buf.len().min(u32::MAX as usize) as u32;
        let res = self.overlapped(deadline, |handle, overlapped| unsafe {
            ReadFile(
                handle,
                buf.as_mut_ptr(),
                len,
                std::ptr::null_mut(),
                overlapped,
            )
        });
        match res {
            Err(err) if err.os_code() == Some(ERROR_BROKEN_PIPE as i32) => Ok(0),
            res => {
                if let Ok(n) = res {
                    trace!(bytes = n, "Read from pipe");
                }
                res
            }
        }
    }

    pub(crate) fn write(&self, buf: &[u8], deadline: Deadline) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::with_detail(ErrorKind::InvalidArgument, "empty buffer"));
        }
        let len = buf.len().min(u32::MAX as usize) as u32;
        let n = self.overlapped(deadline, |handle, overlapped| unsafe {
            WriteFile(handle, buf.as_ptr(), len, std::ptr::null_mut(), overlapped)
        })?;
        trace!(bytes = n, "Wrote to pipe");
        Ok(n)
    }

    /// Starts an overlapped operation and waits for it until the deadline.
    ///
    /// On expiry the operation is cancelled, and still waited for since the
    /// kernel may be using the buffer and the `OVERLAPPED` until then. Data
    /// transferred before the cancellation is reported as a partial success.
    fn overlapped<F>(&self, deadline: Deadline, start: F) -> Result<usize>
    where
        F: FnOnce(HANDLE, *mut OVERLAPPED) -> i32,
    {
        let timeout = TimeoutManager::new(deadline);
        let handle = self.handle.as_raw_handle();
        let event = Event::new()?;
        // Safety: OVERLAPPED is a plain C struct for which all zeroes is valid
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        overlapped.hEvent = event.raw();

        if start(handle, &mut overlapped) == FALSE {
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                return Err(translate(code as i32));
            }
            match unsafe { WaitForSingleObject(event.raw(), timeout.remaining_wait_millis()) } {
                WAIT_OBJECT_0 => {}
                WAIT_TIMEOUT => return self.cancel(&overlapped),
                _ => {
                    let err = last_error();
                    // the operation can't be left running against our stack
                    let _ = self.cancel(&overlapped);
                    return Err(err);
                }
            }
        }

        let mut transferred = 0u32;
        if unsafe { GetOverlappedResult(handle, &overlapped, &mut transferred, FALSE) } == FALSE {
            return Err(last_error());
        }
        Ok(transferred as usize)
    }

    fn cancel(&self, overlapped: &OVERLAPPED) -> Result<usize> {
        let handle = self.handle.as_raw_handle();
        let mut transferred = 0u32;
        unsafe { CancelIoEx(handle, overlapped) };
        let completed = unsafe { GetOverlappedResult(handle, overlapped, &mut transferred, TRUE) };
        if completed == FALSE {
            let code = unsafe { GetLastError() };
            if code != ERROR_OPERATION_ABORTED {
                return Err(translate(code as i32));
            }
        }
        if transferred > 0 {
            Ok(transferred as usize)
        } else {
            Err(timeout_error())
        }
    }
}

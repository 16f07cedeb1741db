// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{Error, ErrorKind, Result};

pub(crate) enum Fork {
    Parent(libc::pid_t),
    Child,
}

/// Forks the calling process.
///
/// `EAGAIN` from `fork(2)` means the process table or the user's process limit
/// is full, so it is reported as [`ErrorKind::Exhausted`].
///
/// # Safety
///
/// In the child only async-signal-safe functions may be called until `exec` or
/// `_exit`: other threads may have held locks (including the allocator's) at the
/// time of the fork.
pub(crate) unsafe fn fork() -> Result<Fork> {
    match libc::fork() {
        -1 => {
            let errno = nix::errno::Errno::last_raw();
            if errno == libc::EAGAIN {
                Err(Error::with_os_code(ErrorKind::Exhausted, errno))
            } else {
                Err(crate::translate(errno))
            }
        }
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

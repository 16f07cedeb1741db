// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! POSIX backend: fork/exec, `poll(2)` based deadlines, pidfd or
//! exit-notification pipe for exit detection.

mod errno;
mod fork;
#[cfg(bsd)]
mod kqueue;
mod pipe;
mod process;
mod spawn;
mod utils;

use std::os::fd::RawFd;

use nix::errno::Errno;

use crate::deadline::TimeoutManager;
use crate::{translate, ErrorKind, Result};

pub(crate) use errno::error_kind;
pub(crate) use pipe::Pipe;
pub(crate) use process::ProcessHandle;
pub(crate) use spawn::spawn;

/// Waits until `fd` reports one of `events` (or a hang-up/error condition).
///
/// Returns `false` when the deadline elapsed first. `EINTR` restarts the poll
/// with whatever time is left.
pub(crate) fn poll_fd(fd: RawFd, events: libc::c_short, timeout: &TimeoutManager) -> Result<bool> {
    let mut poll_fds = [libc::pollfd {
        fd,
        events,
        revents: 0,
    }];

    loop {
        let timeout_ms = timeout.remaining_poll_millis();
        let poll_result = unsafe {
            libc::poll(
                poll_fds.as_mut_ptr(),
                poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        match poll_result {
            -1 => match Errno::last_raw() {
                libc::EAGAIN | libc::EINTR => continue,
                errno => return Err(translate(errno)),
            },
            0 => return Ok(false),
            _ => {
                let revents = poll_fds[0].revents;
                if revents & libc::POLLNVAL != 0 {
                    return Err(translate(libc::EBADF));
                }
                if revents & (events | libc::POLLHUP | libc::POLLERR) != 0 {
                    return Ok(true);
                }
                // spurious wakeup, poll again with the remaining time
                if timeout.is_expired() {
                    return Ok(false);
                }
            }
        }
    }
}

/// Builds an error for a `-1` syscall return, retrieving `errno`.
pub(crate) fn last_error() -> crate::Error {
    translate(Errno::last_raw())
}

pub(crate) fn timeout_error() -> crate::Error {
    crate::Error::new(ErrorKind::Timeout)
}

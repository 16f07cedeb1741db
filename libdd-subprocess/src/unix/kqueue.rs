// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process exit notification through `EVFILT_PROC`.

use nix::errno::Errno;
use nix::sys::event::{EventFilter, EventFlag, FilterFlag, KEvent, Kqueue};
use nix::unistd::Pid;

use crate::deadline::TimeoutManager;
use crate::{translate, Result};

fn remaining_timespec(timeout: &TimeoutManager) -> Option<libc::timespec> {
    timeout.remaining().map(|remaining| libc::timespec {
        tv_sec: remaining.as_secs() as libc::time_t,
        tv_nsec: remaining.subsec_nanos() as _,
    })
}

/// Waits until `pid` exits. Returns `false` if the deadline elapsed first.
///
/// `pid` must be an unreaped child of the caller, so the pid can't be reused
/// meanwhile. A child that already exited is reported right away.
pub(crate) fn wait_exit(pid: Pid, timeout: &TimeoutManager) -> Result<bool> {
    let kqueue = Kqueue::new()?;
    let change = KEvent::new(
        pid.as_raw() as libc::uintptr_t,
        EventFilter::EVFILT_PROC,
        EventFlag::EV_ADD | EventFlag::EV_ONESHOT,
        FilterFlag::NOTE_EXIT,
        0,
        0,
    );
    let mut events = [change];
    loop {
        // registering again after EINTR is harmless, EV_ADD updates in place
        match kqueue.kevent(&[change], &mut events, remaining_timespec(timeout)) {
            Ok(0) => return Ok(false),
            Ok(_) => {
                let event = events[0];
                if !event.flags().contains(EventFlag::EV_ERROR) || event.data() == 0 {
                    return Ok(true);
                }
                return match event.data() as i32 {
                    // gone already, a zombie waiting to be reaped
                    libc::ESRCH => Ok(true),
                    errno => Err(translate(errno)),
                };
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ESRCH) => return Ok(true),
            Err(errno) => return Err(errno.into()),
        }
    }
}

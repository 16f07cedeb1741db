// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::os::windows::io::{AsRawHandle, OwnedHandle};

use windows_sys::Win32::Foundation::{FALSE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, TerminateProcess, WaitForSingleObject,
};

use super::{last_error, timeout_error};
use crate::deadline::TimeoutManager;
use crate::{Deadline, ExitStatus, Result};

/// Exit code reported for processes killed with [`ProcessHandle::kill`],
/// matching the `128 + SIGKILL` shell convention.
pub(crate) const KILLED_EXIT_CODE: u32 = 137;

#[derive(Debug)]
pub(crate) struct ProcessHandle {
    handle: OwnedHandle,
    pid: u32,
}

impl ProcessHandle {
    pub(crate) fn new(handle: OwnedHandle, pid: u32) -> Self {
        Self { handle, pid }
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn wait(&self, deadline: Deadline) -> Result<ExitStatus> {
        let timeout = TimeoutManager::new(deadline);
        match unsafe { WaitForSingleObject(self.handle.as_raw_handle(), timeout.remaining_wait_millis()) }
        {
            WAIT_OBJECT_0 => self.exit_code().map(|code| ExitStatus::Exited(code as i32)),
            WAIT_TIMEOUT => Err(timeout_error()),
            _ => Err(last_error()),
        }
    }

    fn exit_code(&self) -> Result<u32> {
        let mut code = 0u32;
        if unsafe { GetExitCodeProcess(self.handle.as_raw_handle(), &mut code) } == FALSE {
            return Err(last_error());
        }
        Ok(code)
    }

    fn has_exited(&self) -> bool {
        unsafe { WaitForSingleObject(self.handle.as_raw_handle(), 0) == WAIT_OBJECT_0 }
    }

    /// Sends `CTRL_BREAK_EVENT` to the child's process group.
    ///
    /// Children are always created with `CREATE_NEW_PROCESS_GROUP`, so the group
    /// id is the child's pid. The event only reaches children sharing the
    /// caller's console.
    pub(crate) fn terminate(&self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        if unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, self.pid) } == FALSE {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn kill(&self) -> Result<()> {
        if unsafe { TerminateProcess(self.handle.as_raw_handle(), KILLED_EXIT_CODE) } == FALSE {
            let err = last_error();
            // access denied is also what a process that is already gone reports
            if self.has_exited() {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::OnceLock;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

use super::poll_fd;
use crate::deadline::TimeoutManager;
use crate::{Deadline, Error, ExitStatus, Result};

/// Upper bound on the exit detection latency once the exit pipe hung up.
const MAX_REAP_BACKOFF: Duration = Duration::from_millis(50);

/// Non-empty value forces the exit-notification pipe even where pidfds work.
pub(crate) const DISABLE_PIDFD_ENV: &str = "DD_SUBPROCESS_DISABLE_PIDFD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitStrategy {
    /// `pidfd_open(2)`, readable once the process exits. Linux 5.3+.
    PidFd,
    /// `EVFILT_PROC` / `NOTE_EXIT` on a kqueue.
    #[cfg(bsd)]
    Kqueue,
    /// Pipe whose only write end is inherited by the child: it hangs up when
    /// the child (and anything it passed the descriptor to) is gone.
    ExitPipe,
}

/// Strategy used for every spawn of this process, detected once.
pub(crate) fn wait_strategy() -> WaitStrategy {
    static STRATEGY: OnceLock<WaitStrategy> = OnceLock::new();
    *STRATEGY.get_or_init(detect_wait_strategy)
}

#[cfg(target_os = "linux")]
fn detect_wait_strategy() -> WaitStrategy {
    if let Ok(env) = std::env::var(DISABLE_PIDFD_ENV) {
        if !env.is_empty() {
            return WaitStrategy::ExitPipe;
        }
    }
    match pidfd_open(std::process::id() as libc::pid_t) {
        Ok(_) => WaitStrategy::PidFd,
        Err(err) => {
            debug!(error = %err, "pidfd unavailable, using exit pipes");
            WaitStrategy::ExitPipe
        }
    }
}

#[cfg(bsd)]
fn detect_wait_strategy() -> WaitStrategy {
    WaitStrategy::Kqueue
}

#[cfg(not(any(target_os = "linux", bsd)))]
fn detect_wait_strategy() -> WaitStrategy {
    WaitStrategy::ExitPipe
}

#[cfg(target_os = "linux")]
fn pidfd_open(pid: libc::pid_t) -> Result<OwnedFd> {
    use std::os::fd::{FromRawFd, RawFd};

    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
    if fd == -1 {
        return Err(super::last_error());
    }
    // Safety: pidfd_open returned a fresh close-on-exec descriptor
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

#[cfg(not(target_os = "linux"))]
fn pidfd_open(_pid: libc::pid_t) -> Result<OwnedFd> {
    Err(crate::translate(libc::ENOSYS))
}

/// What the parent waits on to learn that the child exited.
#[derive(Debug)]
pub(crate) enum Watch {
    PidFd(OwnedFd),
    /// Registered on a fresh kqueue by every wait, nothing to keep meanwhile.
    #[cfg(bsd)]
    Kqueue,
    ExitPipe(OwnedFd),
}

impl Watch {
    /// Builds the watch for a freshly spawned `pid`. `exit_pipe` is the read
    /// end created for [`WaitStrategy::ExitPipe`], if any.
    pub(crate) fn new(pid: libc::pid_t, exit_pipe: Option<OwnedFd>) -> Result<Self> {
        if let Some(fd) = exit_pipe {
            return Ok(Watch::ExitPipe(fd));
        }
        match wait_strategy() {
            #[cfg(bsd)]
            WaitStrategy::Kqueue => Ok(Watch::Kqueue),
            _ => pidfd_open(pid).map(Watch::PidFd),
        }
    }
}

/// OS side of a spawned, not yet reaped, child.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pid: Pid,
    watch: Watch,
    process_group: bool,
}

impl ProcessHandle {
    pub(crate) fn new(pid: libc::pid_t, watch: Watch, process_group: bool) -> Self {
        Self {
            pid: Pid::from_raw(pid),
            watch,
            process_group,
        }
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Waits for the child to exit and reaps it.
    ///
    /// Fails with [`crate::ErrorKind::Timeout`] if the deadline elapses first; the
    /// child is then still running and not reaped.
    pub(crate) fn wait(&self, deadline: Deadline) -> Result<ExitStatus> {
        match deadline {
            Deadline::Infinite => self.reap(),
            Deadline::Immediate => self.try_reap()?.ok_or_else(super::timeout_error),
            Deadline::After(_) => {
                let timeout = TimeoutManager::new(deadline);
                match &self.watch {
                    Watch::PidFd(fd) => {
                        poll_fd(fd.as_raw_fd(), libc::POLLIN, &timeout)?;
                    }
                    #[cfg(bsd)]
                    Watch::Kqueue => {
                        if super::kqueue::wait_exit(self.pid, &timeout)? {
                            // NOTE_EXIT can fire right before the child turns
                            // into a waitable zombie
                            return self.reap();
                        }
                    }
                    Watch::ExitPipe(fd) => {
                        if let Some(status) = self.wait_exit_pipe(fd, &timeout)? {
                            return Ok(status);
                        }
                    }
                }
                self.try_reap()?.ok_or_else(super::timeout_error)
            }
        }
    }

    /// Waits for the exit pipe to hang up, or the deadline.
    ///
    /// A child may close the pipe while still running, its exit can't be
    /// observed before the deadline then: the remaining time is slept and the
    /// caller checks once more. A grandchild holding the pipe open delays
    /// detection to the deadline the same way.
    fn wait_exit_pipe(
        &self,
        fd: &OwnedFd,
        timeout: &TimeoutManager,
    ) -> Result<Option<ExitStatus>> {
        if !poll_fd(fd.as_raw_fd(), libc::POLLIN, timeout)? {
            return Ok(None);
        }
        // The pipe hangs up when the child closes it or exits, and an exiting
        // child drops its descriptors before it becomes waitable
        let mut backoff = Duration::from_millis(1);
        let mut logged = false;
        loop {
            if let Some(status) = self.try_reap()? {
                return Ok(Some(status));
            }
            let remaining = timeout.remaining().unwrap_or(MAX_REAP_BACKOFF);
            if remaining.is_zero() {
                return Ok(None);
            }
            if !logged && backoff >= MAX_REAP_BACKOFF {
                debug!(pid = %self.pid, "Exit pipe closed by a running process");
                logged = true;
            }
            std::thread::sleep(backoff.min(remaining));
            backoff = (backoff * 2).min(MAX_REAP_BACKOFF);
        }
    }

    fn try_reap(&self) -> Result<Option<ExitStatus>> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => return Ok(exit_status(status)),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(Error::from(errno).context("waitpid failed")),
            }
        }
    }

    fn reap(&self) -> Result<ExitStatus> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(status) = exit_status(status) {
                        return Ok(status);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(Error::from(errno).context("waitpid failed")),
            }
        }
    }

    /// Asks the child (or its process group) to exit with `SIGTERM`.
    pub(crate) fn terminate(&self) -> Result<()> {
        self.signal(Signal::SIGTERM)
    }

    /// Kills the child (or its process group) with `SIGKILL`.
    pub(crate) fn kill(&self) -> Result<()> {
        self.signal(Signal::SIGKILL)
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        let res = if self.process_group {
            kill(Pid::from_raw(-self.pid.as_raw()), signal)
        } else {
            self.signal_process(signal)
        };
        match res {
            // already exited, and possibly a zombie waiting to be reaped
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }

    #[cfg(target_os = "linux")]
    fn signal_process(&self, signal: Signal) -> nix::Result<()> {
        if let Watch::PidFd(fd) = &self.watch {
            let res = unsafe {
                libc::syscall(
                    libc::SYS_pidfd_send_signal,
                    fd.as_raw_fd(),
                    signal as libc::c_int,
                    std::ptr::null::<libc::siginfo_t>(),
                    0,
                )
            };
            return Errno::result(res).map(drop);
        }
        kill(self.pid, signal)
    }

    #[cfg(not(target_os = "linux"))]
    fn signal_process(&self, signal: Signal) -> nix::Result<()> {
        kill(self.pid, signal)
    }
}

fn exit_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
        WaitStatus::Signaled(_, signal, core_dumped) => Some(ExitStatus::Signaled {
            signal: signal as i32,
            core_dumped,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_mapping() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            exit_status(WaitStatus::Exited(pid, 3)),
            Some(ExitStatus::Exited(3))
        );
        assert_eq!(
            exit_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(ExitStatus::Signaled {
                signal: libc::SIGKILL,
                core_dumped: false
            })
        );
        assert_eq!(exit_status(WaitStatus::StillAlive), None);
    }

    #[test]
    fn test_wait_strategy_is_stable() {
        assert_eq!(wait_strategy(), wait_strategy());
        #[cfg(bsd)]
        assert_eq!(wait_strategy(), WaitStrategy::Kqueue);
        #[cfg(not(any(target_os = "linux", bsd)))]
        assert_eq!(wait_strategy(), WaitStrategy::ExitPipe);
    }

    fn spawn_sleep() -> libc::pid_t {
        let child = std::process::Command::new("sleep").arg("60").spawn().unwrap();
        child.id() as libc::pid_t
    }

    #[test]
    fn test_exit_pipe_closed_by_running_child_honours_deadline() {
        let pid = spawn_sleep();
        // hung up from the start, as if the child closed its end
        let (read, write) = super::super::pipe::raw_pipe().unwrap();
        drop(write);
        let handle = ProcessHandle::new(pid, Watch::ExitPipe(read), false);

        let start = std::time::Instant::now();
        let err = handle.wait(Deadline::from_millis(200)).unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= std::time::Duration::from_millis(190));
        assert!(start.elapsed() < std::time::Duration::from_secs(5));

        handle.kill().unwrap();
        assert_eq!(
            handle.wait(Deadline::from_secs(30)).unwrap().signal(),
            Some(libc::SIGKILL)
        );
    }

    #[test]
    fn test_exit_pipe_closed_then_exit_is_seen_before_deadline() {
        let pid = spawn_sleep();
        let (read, write) = super::super::pipe::raw_pipe().unwrap();
        drop(write);
        let handle = ProcessHandle::new(pid, Watch::ExitPipe(read), false);

        handle.kill().unwrap();
        let start = std::time::Instant::now();
        let status = handle.wait(Deadline::from_secs(20)).unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_exit_pipe_held_open_reports_exit_at_deadline() {
        let pid = spawn_sleep();
        // kept open, as if inherited by a grandchild
        let (read, _write) = super::super::pipe::raw_pipe().unwrap();
        let handle = ProcessHandle::new(pid, Watch::ExitPipe(read), false);

        handle.kill().unwrap();
        assert_eq!(
            handle.wait(Deadline::from_millis(200)).unwrap().signal(),
            Some(libc::SIGKILL)
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pidfd_open_invalid_pid() {
        assert!(pidfd_open(-1).is_err());
    }
}

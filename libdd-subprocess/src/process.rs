// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::{OsStr, OsString};

use tracing::{debug, warn};

use crate::options::Options;
use crate::stop::{self, StopActions};
use crate::{sys, Deadline, Error, ErrorKind, ExitStatus, PipeEnd, Result, Stream};

/// What a platform spawner hands back: the OS process plus the parent-side
/// ends of the piped streams.
pub(crate) struct Spawned {
    pub(crate) handle: sys::ProcessHandle,
    pub(crate) stdin: Option<sys::Pipe>,
    pub(crate) stdout: Option<sys::Pipe>,
    pub(crate) stderr: Option<sys::Pipe>,
}

/// A spawned child process.
///
/// Dropping the `Process` runs the [`Options::stop_on_drop`] actions if the
/// child may still be running, then releases every handle still open.
#[derive(Debug)]
pub struct Process {
    pid: u32,
    // None once the child has been reaped
    handle: Option<sys::ProcessHandle>,
    stdin: Option<PipeEnd>,
    stdout: Option<PipeEnd>,
    stderr: Option<PipeEnd>,
    status: Option<ExitStatus>,
    stop_on_drop: StopActions,
}

impl Process {
    /// Starts `argv[0]` with the arguments `argv[1..]`.
    ///
    /// The program is looked up in `PATH` like a shell would, using the
    /// child's environment on unix. On failure every resource allocated for
    /// the child has already been released.
    pub fn spawn<S: AsRef<OsStr>>(argv: &[S], options: &Options) -> Result<Self> {
        let argv: Vec<OsString> = argv.iter().map(|arg| arg.as_ref().to_owned()).collect();
        if argv.is_empty() {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "empty argument vector",
            ));
        }
        let spawned = sys::spawn(&argv, options)?;
        Ok(Self {
            pid: spawned.handle.pid(),
            handle: Some(spawned.handle),
            stdin: spawned.stdin.map(|pipe| PipeEnd::new(pipe, Stream::Stdin)),
            stdout: spawned.stdout.map(|pipe| PipeEnd::new(pipe, Stream::Stdout)),
            stderr: spawned.stderr.map(|pipe| PipeEnd::new(pipe, Stream::Stderr)),
            status: None,
            stop_on_drop: options.stop_on_drop().clone(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status, if the child was already waited for. Never blocks.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    fn pipe(&mut self, stream: Stream) -> &mut Option<PipeEnd> {
        match stream {
            Stream::Stdin => &mut self.stdin,
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    fn open_pipe(&mut self, stream: Stream) -> Result<&mut PipeEnd> {
        self.pipe(stream).as_mut().ok_or_else(|| {
            Error::with_detail(ErrorKind::BrokenPipe, format!("{stream:?} is not open"))
        })
    }

    /// Reads from the child's stdout or stderr.
    ///
    /// Returns `Ok(0)` at end of stream. Reading a stream that was not piped,
    /// or was closed or taken, fails with [`ErrorKind::BrokenPipe`].
    pub fn read(&mut self, stream: Stream, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
        if stream == Stream::Stdin {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "can't read from stdin",
            ));
        }
        self.open_pipe(stream)?.read(buf, deadline)
    }

    /// Reads `stream` until end of stream, within one overall deadline.
    pub fn read_to_end(
        &mut self,
        stream: Stream,
        buf: &mut Vec<u8>,
        deadline: Deadline,
    ) -> Result<usize> {
        if stream == Stream::Stdin {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "can't read from stdin",
            ));
        }
        self.open_pipe(stream)?.read_to_end(buf, deadline)
    }

    /// Writes to the child's stdin.
    pub fn write(&mut self, buf: &[u8], deadline: Deadline) -> Result<usize> {
        self.open_pipe(Stream::Stdin)?.write(buf, deadline)
    }

    pub fn write_all(&mut self, buf: &[u8], deadline: Deadline) -> Result<()> {
        self.open_pipe(Stream::Stdin)?.write_all(buf, deadline)
    }

    /// Closes the parent end of `stream`. Closing stdin signals end of input to
    /// the child. Closing an already closed stream does nothing.
    pub fn close(&mut self, stream: Stream) {
        if self.pipe(stream).take().is_some() {
            debug!(pid = self.pid, ?stream, "Closed pipe");
        }
    }

    pub fn take_stdin(&mut self) -> Option<PipeEnd> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<PipeEnd> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<PipeEnd> {
        self.stderr.take()
    }

    /// Waits for the child to exit.
    ///
    /// Fails with [`ErrorKind::Timeout`] if the deadline elapses first, the
    /// child keeps running. Once the child exited its status is cached and
    /// later calls return it without any system call.
    pub fn wait(&mut self, deadline: Deadline) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let handle = self.handle.as_ref().ok_or_else(|| {
            Error::with_detail(ErrorKind::Generic, "process handle already released")
        })?;
        let status = handle.wait(deadline)?;
        self.status = Some(status);
        // reaped: the pid may be reused from now on
        self.handle = None;
        debug!(pid = self.pid, %status, "Process exited");
        Ok(status)
    }

    /// Asks the child to exit: `SIGTERM` on unix, `CTRL_BREAK_EVENT` on
    /// Windows. Does nothing if the child was already waited for.
    pub fn terminate(&mut self) -> Result<()> {
        match &self.handle {
            Some(handle) if self.status.is_none() => handle.terminate(),
            _ => Ok(()),
        }
    }

    /// Forcefully stops the child: `SIGKILL` on unix, `TerminateProcess` on
    /// Windows. Does nothing if the child was already waited for.
    pub fn kill(&mut self) -> Result<()> {
        match &self.handle {
            Some(handle) if self.status.is_none() => handle.kill(),
            _ => Ok(()),
        }
    }

    /// Runs `actions` in order until the child exits.
    pub fn stop(&mut self, actions: &StopActions) -> Result<ExitStatus> {
        stop::run(self, actions)
    }

    /// Stops the child with the configured on-drop actions and releases
    /// everything. Same as dropping the `Process`.
    pub fn destroy(self) {
        drop(self)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // EOF on stdin first, a well-behaved child may exit on its own
        self.stdin = None;
        if self.status.is_none() && !self.stop_on_drop.is_empty() {
            let actions = std::mem::replace(&mut self.stop_on_drop, StopActions::noop());
            if let Err(err) = self.stop(&actions) {
                warn!(pid = self.pid, error = %err, "Failed to stop process on drop");
            }
        }
        if self.handle.is_some() {
            debug!(pid = self.pid, "Releasing handle of a running process");
        }
    }
}

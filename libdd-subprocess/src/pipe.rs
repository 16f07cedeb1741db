// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

use crate::deadline::TimeoutManager;
use crate::{sys, Deadline, Error, ErrorKind, Result};

/// One of the child's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

/// Parent-side end of a pipe connected to one of the child's standard streams.
///
/// Obtained from [`crate::Process::take_stdin`] and friends, to drive a stream
/// from another thread. Dropping it closes the pipe.
#[derive(Debug)]
pub struct PipeEnd {
    inner: sys::Pipe,
    stream: Stream,
}

impl PipeEnd {
    pub(crate) fn new(inner: sys::Pipe, stream: Stream) -> Self {
        Self { inner, stream }
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Reads at least one byte, unless the deadline elapses first.
    ///
    /// `Ok(0)` means the child closed its end: no more data will come.
    pub fn read(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
        if self.stream == Stream::Stdin {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "can't read from stdin",
            ));
        }
        self.inner.read(buf, deadline)
    }

    /// Writes at least one byte, unless the deadline elapses first. Fails with
    /// [`ErrorKind::BrokenPipe`] once the child closed its end.
    pub fn write(&mut self, buf: &[u8], deadline: Deadline) -> Result<usize> {
        if self.stream != Stream::Stdin {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "can't write to an output stream",
            ));
        }
        self.inner.write(buf, deadline)
    }

    /// Writes the whole buffer, within one overall deadline.
    pub fn write_all(&mut self, mut buf: &[u8], deadline: Deadline) -> Result<()> {
        let timeout = TimeoutManager::new(deadline);
        while !buf.is_empty() {
            let n = self.write(buf, timeout.remaining_deadline())?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Reads until end of stream, within one overall deadline.
    ///
    /// On error, the data read so far is kept in `buf`.
    pub fn read_to_end(&mut self, buf: &mut Vec<u8>, deadline: Deadline) -> Result<usize> {
        let timeout = TimeoutManager::new(deadline);
        let start = buf.len();
        let mut chunk = [0u8; 8 * 1024];
        loop {
            match self.read(&mut chunk, timeout.remaining_deadline())? {
                0 => return Ok(buf.len() - start),
                n => buf.extend_from_slice(&chunk[..n]),
            }
        }
    }
}

impl io::Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(PipeEnd::read(self, buf, Deadline::Infinite)?)
    }
}

impl io::Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(PipeEnd::write(self, buf, Deadline::Infinite)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

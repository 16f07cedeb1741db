// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use tracing::trace;

use super::utils::{move_above_stdio, set_nonblocking};
use super::{last_error, poll_fd, timeout_error};
use crate::deadline::TimeoutManager;
use crate::{translate, Deadline, Error, ErrorKind, Result, Stream};

/// Parent-side end of a stdio pipe. Non-blocking, close-on-exec.
#[derive(Debug)]
pub(crate) struct Pipe {
    fd: OwnedFd,
}

/// Creates the pipe for `stream`, returning the parent end and the child end.
///
/// Both ends are close-on-exec and live above the stdio range: the child gets
/// its inheritable copy from `dup2` onto 0, 1 or 2.
pub(crate) fn create(stream: Stream) -> Result<(Pipe, OwnedFd)> {
    let (read, write) = raw_pipe()?;
    let read = move_above_stdio(read)?;
    let write = move_above_stdio(write)?;
    let (parent, child) = match stream {
        Stream::Stdin => (write, read),
        Stream::Stdout | Stream::Stderr => (read, write),
    };
    set_nonblocking(&parent)?;
    #[cfg(target_vendor = "apple")]
    if stream == Stream::Stdin {
        if unsafe { libc::fcntl(parent.as_raw_fd(), libc::F_SETNOSIGPIPE, 1) } == -1 {
            return Err(last_error());
        }
    }
    Ok((Pipe { fd: parent }, child))
}

/// Anonymous close-on-exec pipe, as `(read, write)`.
pub(crate) fn raw_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [-1; 2];
    #[cfg(not(target_vendor = "apple"))]
    let res = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    #[cfg(target_vendor = "apple")]
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if res == -1 {
        return Err(last_error());
    }
    // Safety: pipe returned two fresh descriptors
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    #[cfg(target_vendor = "apple")]
    {
        super::utils::set_cloexec(&read)?;
        super::utils::set_cloexec(&write)?;
    }
    Ok((read, write))
}

impl Pipe {
    pub(crate) fn read(&self, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::with_detail(ErrorKind::InvalidArgument, "empty buffer"));
        }
        let timeout = TimeoutManager::new(deadline);
        loop {
            let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                trace!(fd = self.fd.as_raw_fd(), bytes = n, "Read from pipe");
                return Ok(n as usize);
            }
            match Errno::last_raw() {
                libc::EINTR => continue,
                libc::EAGAIN => {
                    if !poll_fd(self.fd.as_raw_fd(), libc::POLLIN, &timeout)? {
                        return Err(timeout_error());
                    }
                }
                errno => return Err(translate(errno)),
            }
        }
    }

    pub(crate) fn write(&self, buf: &[u8], deadline: Deadline) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::with_detail(ErrorKind::InvalidArgument, "empty buffer"));
        }
        let timeout = TimeoutManager::new(deadline);
        let guard = sigpipe::Guard::block()?;
        loop {
            let n = unsafe { libc::write(self.fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
            if n >= 0 {
                trace!(fd = self.fd.as_raw_fd(), bytes = n, "Wrote to pipe");
                return Ok(n as usize);
            }
            match Errno::last_raw() {
                libc::EINTR => continue,
                libc::EAGAIN => {
                    if !poll_fd(self.fd.as_raw_fd(), libc::POLLOUT, &timeout)? {
                        return Err(timeout_error());
                    }
                }
                libc::EPIPE => {
                    guard.consume_pending();
                    return Err(translate(libc::EPIPE));
                }
                errno => return Err(translate(errno)),
            }
        }
    }
}

impl AsRawFd for Pipe {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Keeps a write to a closed pipe from killing the process with `SIGPIPE`.
///
/// The signal is blocked on the calling thread for the duration of the write.
/// A `SIGPIPE` raised by the write is then pending on the thread and is
/// consumed before the mask is restored, unless one was already pending before.
#[cfg(not(target_vendor = "apple"))]
mod sigpipe {
    use crate::Result;

    pub(super) struct Guard {
        old_mask: libc::sigset_t,
        was_pending: bool,
    }

    fn sigpipe_set() -> libc::sigset_t {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGPIPE);
            set
        }
    }

    fn is_pending() -> bool {
        unsafe {
            let mut pending: libc::sigset_t = std::mem::zeroed();
            libc::sigpending(&mut pending) == 0 && libc::sigismember(&pending, libc::SIGPIPE) == 1
        }
    }

    impl Guard {
        pub(super) fn block() -> Result<Self> {
            let set = sigpipe_set();
            let mut old_mask: libc::sigset_t = unsafe { std::mem::zeroed() };
            let res = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut old_mask) };
            if res != 0 {
                // pthread functions return the error instead of setting errno
                return Err(crate::translate(res));
            }
            Ok(Self {
                old_mask,
                was_pending: is_pending(),
            })
        }

        pub(super) fn consume_pending(&self) {
            if self.was_pending || !is_pending() {
                return;
            }
            let set = sigpipe_set();
            let zero = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            loop {
                let res = unsafe { libc::sigtimedwait(&set, std::ptr::null_mut(), &zero) };
                if res == -1 && nix::errno::Errno::last_raw() == libc::EINTR {
                    continue;
                }
                break;
            }
        }
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            unsafe {
                libc::pthread_sigmask(libc::SIG_SETMASK, &self.old_mask, std::ptr::null_mut());
            }
        }
    }
}

/// The parent end of a stdin pipe carries `F_SETNOSIGPIPE`, nothing to do.
#[cfg(target_vendor = "apple")]
mod sigpipe {
    use crate::Result;

    pub(super) struct Guard;

    impl Guard {
        pub(super) fn block() -> Result<Self> {
            Ok(Guard)
        }

        pub(super) fn consume_pending(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_create_flags() {
        let (parent, child) = create(Stream::Stdout).unwrap();
        assert!(parent.as_raw_fd() > 2);
        assert!(child.as_raw_fd() > 2);
        let flags = unsafe { libc::fcntl(parent.as_raw_fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
        for fd in [parent.as_raw_fd(), child.as_raw_fd()] {
            let fd_flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert_ne!(fd_flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn test_read_timeout() {
        let (parent, _child) = create(Stream::Stdout).unwrap();
        let mut buf = [0u8; 16];
        let start = Instant::now();
        let err = parent.read(&mut buf, Deadline::from_millis(50)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(45));

        let err = parent.read(&mut buf, Deadline::Immediate).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_read_data_and_eof() {
        let (parent, child) = create(Stream::Stdout).unwrap();
        let written = unsafe { libc::write(child.as_raw_fd(), b"hello".as_ptr().cast(), 5) };
        assert_eq!(written, 5);
        drop(child);

        let mut buf = [0u8; 16];
        let n = parent.read(&mut buf, Deadline::Infinite).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(parent.read(&mut buf, Deadline::Infinite).unwrap(), 0);
    }

    #[test]
    fn test_write_to_closed_pipe_is_broken_pipe() {
        let (parent, child) = create(Stream::Stdin).unwrap();
        drop(child);
        // the test process would die here if SIGPIPE were delivered
        let err = parent.write(b"data", Deadline::Infinite).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert_eq!(err.os_code(), Some(libc::EPIPE));
    }

    #[test]
    fn test_write_full_pipe_times_out() {
        let (parent, _child) = create(Stream::Stdin).unwrap();
        let chunk = [0u8; 64 * 1024];
        let err = loop {
            match parent.write(&chunk, Deadline::from_millis(20)) {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_empty_buffers_are_rejected() {
        let (parent, _child) = create(Stream::Stdout).unwrap();
        let err = parent.read(&mut [], Deadline::Immediate).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::{CString, OsString};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use tracing::debug;

use super::fork::{fork, Fork};
use super::pipe::{self, raw_pipe, Pipe};
use super::process::{wait_strategy, ProcessHandle, Watch, WaitStrategy};
use super::utils::{move_above_stdio, raw_env, ExecVec};
use crate::options::{Options, Redirect};
use crate::process::Spawned;
use crate::{env, translate, Error, ErrorKind, Result, Stream};

/// Trailer written after the errno when `exec` fails in the child, so a
/// truncated report can be told apart from a real one.
const EXEC_FAILED_FOOTER: &[u8; 4] = b"NOEX";

/// Everything the child needs, allocated before forking.
struct ExecPlan {
    argv: ExecVec<8>,
    envp: Option<ExecVec<0>>,
    cwd: Option<CString>,
    new_process_group: bool,
}

impl ExecPlan {
    fn new(argv: &[OsString], options: &Options) -> Result<Self> {
        let argv = argv
            .iter()
            .map(|arg| to_cstring(arg.as_bytes()))
            .collect::<Result<ExecVec<8>>>()?;
        if argv.len() == 0 {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "empty argument vector",
            ));
        }
        let envp = match env::resolve(options.environment())? {
            Some(vars) => Some(env::to_cstrings(&vars)?.into_iter().collect()),
            None => None,
        };
        let cwd = options
            .working_directory()
            .map(|dir| to_cstring(dir.as_os_str().as_bytes()))
            .transpose()?;
        Ok(Self {
            argv,
            envp,
            cwd,
            new_process_group: options.new_process_group(),
        })
    }
}

fn to_cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| {
        Error::with_detail(
            ErrorKind::InvalidArgument,
            "argument contains a NUL character",
        )
    })
}

enum ChildStdio {
    Inherit,
    Owned(OwnedFd),
}

impl ChildStdio {
    fn as_fd(&self) -> Option<RawFd> {
        match self {
            ChildStdio::Inherit => None,
            ChildStdio::Owned(fd) => Some(fd.as_raw_fd()),
        }
    }
}

/// Descriptors that only the child may keep. Owned by the spawn call and
/// dropped as soon as the fork returned in the parent, on every path.
struct ChildSide {
    stdin: ChildStdio,
    stdout: ChildStdio,
    stderr: ChildStdio,
    exit_notify: Option<OwnedFd>,
}

/// Raw descriptor numbers copied out of [`ChildSide`] so the child does not
/// touch any Rust-owned value.
#[derive(Clone, Copy)]
struct ChildFds {
    stdio: [(Option<RawFd>, RawFd); 3],
    exit_notify: Option<RawFd>,
}

impl ChildSide {
    fn raw_fds(&self) -> ChildFds {
        ChildFds {
            stdio: [
                (self.stdin.as_fd(), libc::STDIN_FILENO),
                (self.stdout.as_fd(), libc::STDOUT_FILENO),
                (self.stderr.as_fd(), libc::STDERR_FILENO),
            ],
            exit_notify: self.exit_notify.as_ref().map(AsRawFd::as_raw_fd),
        }
    }
}

fn open_redirect(path: &Path, stream: Stream) -> Result<OwnedFd> {
    let file = match stream {
        Stream::Stdin => File::open(path),
        Stream::Stdout | Stream::Stderr => OpenOptions::new().append(true).create(true).open(path),
    }
    .map_err(|err| Error::from(err).context(format!("can't open {}", path.display())))?;
    move_above_stdio(file.into())
}

fn open_null(stream: Stream) -> Result<OwnedFd> {
    open_redirect(Path::new("/dev/null"), stream)
}

fn stdio(redirect: &Redirect, stream: Stream) -> Result<(Option<Pipe>, ChildStdio)> {
    Ok(match redirect {
        Redirect::Inherit => (None, ChildStdio::Inherit),
        Redirect::Pipe => {
            let (parent, child) = pipe::create(stream)?;
            (Some(parent), ChildStdio::Owned(child))
        }
        Redirect::Discard => (None, ChildStdio::Owned(open_null(stream)?)),
        Redirect::Path(path) => (None, ChildStdio::Owned(open_redirect(path, stream)?)),
    })
}

pub(crate) fn spawn(argv: &[OsString], options: &Options) -> Result<Spawned> {
    let plan = ExecPlan::new(argv, options)?;

    let (stdin, child_stdin) = stdio(options.stdin(), Stream::Stdin)?;
    let (stdout, child_stdout) = stdio(options.stdout(), Stream::Stdout)?;
    let (stderr, child_stderr) = stdio(options.stderr(), Stream::Stderr)?;

    let strategy = wait_strategy();
    let (exit_watch, exit_notify) = match strategy {
        WaitStrategy::ExitPipe => {
            let (read, write) = raw_pipe()?;
            (Some(move_above_stdio(read)?), Some(move_above_stdio(write)?))
        }
        _ => (None, None),
    };

    let child_side = ChildSide {
        stdin: child_stdin,
        stdout: child_stdout,
        stderr: child_stderr,
        exit_notify,
    };
    let pid = fork_exec(&plan, child_side)?;

    let watch = match Watch::new(pid, exit_watch) {
        Ok(watch) => watch,
        Err(err) => {
            // without a handle the child can't be waited on with a deadline
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            reap(pid);
            return Err(err.context("can't watch process exit"));
        }
    };

    debug!(
        pid,
        program = %argv[0].to_string_lossy(),
        wait_strategy = ?strategy,
        "Spawned process"
    );

    Ok(Spawned {
        handle: ProcessHandle::new(pid, watch, plan.new_process_group),
        stdin,
        stdout,
        stderr,
    })
}

/// Forks and execs `plan`, returning the child's pid once `exec` succeeded.
///
/// If `exec` fails the child reports its errno through a close-on-exec pipe
/// and exits; the parent reaps it and returns the translated error.
fn fork_exec(plan: &ExecPlan, child_side: ChildSide) -> Result<libc::pid_t> {
    let (report_read, report_write) = raw_pipe()?;
    let fds = child_side.raw_fds();
    let report_fd = report_write.as_raw_fd();

    // no allocations in the child process should happen from this point on
    let pid = match unsafe { fork() }? {
        Fork::Child => unsafe { exec_child(plan, fds, report_fd) },
        Fork::Parent(pid) => pid,
    };

    drop(child_side);
    drop(report_write);

    if plan.new_process_group {
        // Also done in the parent so that signals sent to the group right after
        // spawn can't race the child's own setpgid. Fails harmlessly with EACCES
        // once the child has exec'd.
        unsafe { libc::setpgid(pid, pid) };
    }

    let mut report = [0u8; 8];
    let mut received = 0;
    while received < report.len() {
        let n = unsafe {
            libc::read(
                report_read.as_raw_fd(),
                report[received..].as_mut_ptr().cast(),
                report.len() - received,
            )
        };
        match n {
            -1 if Errno::last_raw() == libc::EINTR => continue,
            -1 => {
                let err = super::last_error();
                reap(pid);
                return Err(err.context("can't read exec status"));
            }
            0 => break,
            n => received += n as usize,
        }
    }

    match received {
        0 => Ok(pid),
        8 if &report[4..] == EXEC_FAILED_FOOTER => {
            let errno = i32::from_be_bytes([report[0], report[1], report[2], report[3]]);
            reap(pid);
            debug!(pid, errno, "exec failed in child process");
            Err(translate(errno).context("exec failed"))
        }
        _ => {
            reap(pid);
            Err(Error::with_detail(
                ErrorKind::Generic,
                "short read from exec status pipe",
            ))
        }
    }
}

/// Reaps a child that is known to exit (or to have been killed).
fn reap(pid: libc::pid_t) {
    loop {
        match waitpid(Pid::from_raw(pid), None) {
            Err(Errno::EINTR) => continue,
            _ => return,
        }
    }
}

/// Runs in the forked child. Never returns.
///
/// # Safety
///
/// Must only be called in the child right after `fork`. Only async-signal-safe
/// functions are used.
unsafe fn exec_child(plan: &ExecPlan, fds: ChildFds, report_fd: RawFd) -> ! {
    let errno = prepare_and_exec(plan, fds);
    let mut report = [0u8; 8];
    report[..4].copy_from_slice(&errno.to_be_bytes());
    report[4..].copy_from_slice(EXEC_FAILED_FOOTER);
    libc::write(report_fd, report.as_ptr().cast(), report.len());
    libc::_exit(127)
}

/// Sets up the child's process state and execs. Returns the errno of the first
/// failing step.
unsafe fn prepare_and_exec(plan: &ExecPlan, fds: ChildFds) -> i32 {
    // the parent's mask and dispositions must not leak into the program
    let mut empty: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut empty);
    let res = libc::pthread_sigmask(libc::SIG_SETMASK, &empty, std::ptr::null_mut());
    if res != 0 {
        return res;
    }
    if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
        return Errno::last_raw();
    }

    if plan.new_process_group && libc::setpgid(0, 0) == -1 {
        return Errno::last_raw();
    }

    // every source fd is above stdio, so dup2 always creates a new,
    // inheritable descriptor
    for (fd, target) in fds.stdio {
        if let Some(fd) = fd {
            if libc::dup2(fd, target) == -1 {
                return Errno::last_raw();
            }
        }
    }

    if let Some(fd) = fds.exit_notify {
        if libc::fcntl(fd, libc::F_SETFD, 0) == -1 {
            return Errno::last_raw();
        }
    }

    if let Some(cwd) = &plan.cwd {
        if libc::chdir(cwd.as_ptr()) == -1 {
            return Errno::last_raw();
        }
    }

    if let Some(envp) = &plan.envp {
        raw_env::swap(envp.as_ptr());
    }

    libc::execvp(plan.argv.first(), plan.argv.as_ptr());
    Errno::last_raw()
}

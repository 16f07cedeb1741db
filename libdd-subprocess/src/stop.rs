// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ordered stop sequences: wait, ask nicely, then force.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::{Deadline, Error, ErrorKind, ExitStatus, Process, Result};

/// Longest supported stop sequence.
pub const MAX_STOP_ACTIONS: usize = 3;

/// One step of a stop sequence. Each step is followed by a wait bounded by the
/// step's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopAction {
    /// Only wait.
    Wait,
    /// `SIGTERM` on unix, `CTRL_BREAK_EVENT` on Windows.
    Terminate,
    /// `SIGKILL` on unix, `TerminateProcess` on Windows.
    Kill,
}

/// Up to [`MAX_STOP_ACTIONS`] steps, run in order until the child exits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopActions {
    actions: SmallVec<[(StopAction, Deadline); MAX_STOP_ACTIONS]>,
}

impl StopActions {
    pub fn new<I>(actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (StopAction, Deadline)>,
    {
        let actions: SmallVec<_> = actions.into_iter().collect();
        if actions.len() > MAX_STOP_ACTIONS {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                format!("at most {MAX_STOP_ACTIONS} stop actions are supported"),
            ));
        }
        Ok(Self { actions })
    }

    pub fn wait_only(deadline: Deadline) -> Self {
        Self::from_slice(&[(StopAction::Wait, deadline)])
    }

    /// Terminate, then kill whatever is left once `terminate_deadline` elapsed.
    pub fn terminate_then_kill(terminate_deadline: Deadline, kill_deadline: Deadline) -> Self {
        Self::from_slice(&[
            (StopAction::Terminate, terminate_deadline),
            (StopAction::Kill, kill_deadline),
        ])
    }

    /// Kill, then wait up to `deadline` for the exit.
    ///
    /// The kill signal is delivered asynchronously: with
    /// [`Deadline::Immediate`] the child is usually still running when it is
    /// checked, which fails with [`ErrorKind::Fatal`] and leaves it unreaped.
    /// A later [`Process::wait`], or dropping the process, reaps it.
    pub fn kill_only(deadline: Deadline) -> Self {
        Self::from_slice(&[(StopAction::Kill, deadline)])
    }

    /// Does nothing: stopping fails with [`ErrorKind::Timeout`] unless the
    /// child already exited, and dropping the process leaves it running.
    pub fn noop() -> Self {
        Self::default()
    }

    fn from_slice(actions: &[(StopAction, Deadline)]) -> Self {
        Self {
            actions: SmallVec::from_slice(actions),
        }
    }

    pub fn actions(&self) -> &[(StopAction, Deadline)] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What the stop engine drives. Implemented by [`Process`].
pub(crate) trait Stoppable {
    fn pid(&self) -> u32;
    fn exit_status(&self) -> Option<ExitStatus>;
    fn terminate(&mut self) -> Result<()>;
    fn kill(&mut self) -> Result<()>;
    fn wait(&mut self, deadline: Deadline) -> Result<ExitStatus>;
}

impl Stoppable for Process {
    fn pid(&self) -> u32 {
        Process::pid(self)
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        Process::exit_status(self)
    }

    fn terminate(&mut self) -> Result<()> {
        Process::terminate(self)
    }

    fn kill(&mut self) -> Result<()> {
        Process::kill(self)
    }

    fn wait(&mut self, deadline: Deadline) -> Result<ExitStatus> {
        Process::wait(self, deadline)
    }
}

pub(crate) fn run<P: Stoppable>(process: &mut P, actions: &StopActions) -> Result<ExitStatus> {
    if let Some(status) = process.exit_status() {
        return Ok(status);
    }
    for &(action, deadline) in actions.actions() {
        debug!(pid = process.pid(), ?action, ?deadline, "Stopping process");
        match action {
            StopAction::Wait => {}
            StopAction::Terminate => {
                // e.g. no shared console on Windows, a later Kill still applies
                if let Err(err) = process.terminate() {
                    warn!(pid = process.pid(), error = %err, "Failed to terminate process");
                }
            }
            StopAction::Kill => process
                .kill()
                .map_err(|err| fatal(err, "failed to kill process"))?,
        }
        match process.wait(deadline) {
            Ok(status) => return Ok(status),
            Err(err) if err.is_timeout() => {
                if action == StopAction::Kill {
                    return Err(fatal(err, "process survived kill"));
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(Error::with_detail(
        ErrorKind::Timeout,
        "process still running after all stop actions",
    ))
}

fn fatal(err: Error, detail: &'static str) -> Error {
    match err.os_code() {
        Some(code) => Error::with_os_code(ErrorKind::Fatal, code).context(detail),
        None => Error::with_detail(ErrorKind::Fatal, detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(
            StopActions::wait_only(Deadline::from_secs(1)).actions(),
            &[(StopAction::Wait, Deadline::from_secs(1))]
        );
        assert_eq!(
            StopActions::terminate_then_kill(Deadline::from_millis(500), Deadline::Infinite)
                .actions(),
            &[
                (StopAction::Terminate, Deadline::from_millis(500)),
                (StopAction::Kill, Deadline::Infinite)
            ]
        );
        assert_eq!(
            StopActions::kill_only(Deadline::Immediate).actions(),
            &[(StopAction::Kill, Deadline::Immediate)]
        );
        assert!(StopActions::noop().is_empty());
    }

    #[test]
    fn test_too_many_actions() {
        let err = StopActions::new([(StopAction::Wait, Deadline::Immediate); 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let actions = StopActions::new([(StopAction::Wait, Deadline::Immediate); 3]).unwrap();
        assert_eq!(actions.actions().len(), 3);
    }

    /// Child that never exits, recording what it was sent.
    #[derive(Default)]
    struct Stubborn {
        status: Option<ExitStatus>,
        terminate_error: Option<Error>,
        kill_error: Option<Error>,
        sent: Vec<StopAction>,
        waits: Vec<Deadline>,
    }

    impl Stoppable for Stubborn {
        fn pid(&self) -> u32 {
            42
        }

        fn exit_status(&self) -> Option<ExitStatus> {
            self.status
        }

        fn terminate(&mut self) -> Result<()> {
            self.sent.push(StopAction::Terminate);
            self.terminate_error.clone().map_or(Ok(()), Err)
        }

        fn kill(&mut self) -> Result<()> {
            self.sent.push(StopAction::Kill);
            self.kill_error.clone().map_or(Ok(()), Err)
        }

        fn wait(&mut self, deadline: Deadline) -> Result<ExitStatus> {
            self.waits.push(deadline);
            Err(Error::new(ErrorKind::Timeout))
        }
    }

    #[test]
    fn test_surviving_kill_is_fatal() {
        let mut child = Stubborn::default();
        let err = run(&mut child, &StopActions::kill_only(Deadline::Immediate)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.detail(), Some("process survived kill"));
        assert_eq!(child.sent, [StopAction::Kill]);
        assert_eq!(child.waits, [Deadline::Immediate]);
    }

    #[test]
    fn test_failed_kill_is_fatal() {
        let mut child = Stubborn {
            kill_error: Some(Error::with_os_code(ErrorKind::PermissionDenied, 1)),
            ..Default::default()
        };
        let err = run(&mut child, &StopActions::kill_only(Deadline::Infinite)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.os_code(), Some(1));
        assert!(child.waits.is_empty());
    }

    #[test]
    fn test_failed_terminate_moves_on_to_kill() {
        let mut child = Stubborn {
            terminate_error: Some(Error::new(ErrorKind::Generic)),
            ..Default::default()
        };
        let actions =
            StopActions::terminate_then_kill(Deadline::from_millis(1), Deadline::Immediate);
        let err = run(&mut child, &actions).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(child.sent, [StopAction::Terminate, StopAction::Kill]);
        assert_eq!(child.waits.len(), 2);
    }

    #[test]
    fn test_exhausted_sequence_is_timeout() {
        let mut child = Stubborn::default();
        let actions = StopActions::new([
            (StopAction::Wait, Deadline::Immediate),
            (StopAction::Terminate, Deadline::Immediate),
        ])
        .unwrap();
        let err = run(&mut child, &actions).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(child.sent, [StopAction::Terminate]);

        let err = run(&mut child, &StopActions::noop()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_exited_child_gets_no_signal() {
        let mut child = Stubborn {
            status: Some(ExitStatus::Exited(4)),
            ..Default::default()
        };
        let status = run(&mut child, &StopActions::kill_only(Deadline::Infinite)).unwrap();
        assert_eq!(status, ExitStatus::Exited(4));
        assert!(child.sent.is_empty());
        assert!(child.waits.is_empty());
    }

    #[test]
    fn test_fatal_keeps_os_code() {
        let err = fatal(Error::with_os_code(ErrorKind::PermissionDenied, 1), "nope");
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.os_code(), Some(1));
        assert_eq!(err.detail(), Some("nope"));

        let err = fatal(Error::from(ErrorKind::Timeout), "survived");
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.os_code(), None);
    }
}

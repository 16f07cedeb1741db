// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Spawn child processes, talk to them over pipes and stop them, with every
//! blocking call bounded by a [`Deadline`].
//!
//! ```no_run
//! use libdd_subprocess::{Deadline, Options, Process, StopActions, Stream};
//!
//! # fn main() -> libdd_subprocess::Result<()> {
//! let mut child = Process::spawn(&["cat"], &Options::default())?;
//! child.write_all(b"hello", Deadline::from_secs(1))?;
//! child.close(Stream::Stdin);
//! let mut out = Vec::new();
//! child.read_to_end(Stream::Stdout, &mut out, Deadline::from_secs(1))?;
//! let status = child.stop(&StopActions::terminate_then_kill(
//!     Deadline::from_secs(1),
//!     Deadline::Infinite,
//! ))?;
//! assert!(status.success());
//! # Ok(())
//! # }
//! ```

mod cmdline;
mod deadline;
mod env;
mod error;
mod options;
mod pipe;
mod process;
mod status;
mod stop;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

pub use cmdline::build_command_line;
pub use deadline::Deadline;
pub use error::{translate, Error, ErrorKind, RawOsError, Result};
pub use options::{Environment, Options, OptionsBuilder, Redirect};
pub use pipe::{PipeEnd, Stream};
pub use process::Process;
pub use status::ExitStatus;
pub use stop::{StopAction, StopActions, MAX_STOP_ACTIONS};

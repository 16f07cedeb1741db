// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spawn configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::stop::StopActions;

/// Where a standard stream of the child is connected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Redirect {
    /// Share the parent's stream.
    Inherit,
    /// Connect the stream to a pipe owned by the [`crate::Process`].
    #[default]
    Pipe,
    /// Connect the stream to the null device.
    Discard,
    /// Connect the stream to a file. Input is opened read-only, output is
    /// opened in append mode and created if missing.
    Path(PathBuf),
}

/// The environment the child starts with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    /// The parent's environment, unchanged.
    #[default]
    Inherit,
    /// Exactly the given variables.
    Replace(Vec<(OsString, OsString)>),
    /// The parent's environment with the given variables set on top.
    Extend(Vec<(OsString, OsString)>),
}

/// Configuration for one [`crate::Process::spawn`] call.
///
/// Constructed via [`Options::builder`]; the default spawns with piped stdio,
/// the parent's environment and working directory, and kills the child when the
/// [`crate::Process`] is dropped.
#[derive(Debug, Clone)]
pub struct Options {
    working_directory: Option<PathBuf>,
    environment: Environment,
    stdin: Redirect,
    stdout: Redirect,
    stderr: Redirect,
    new_process_group: bool,
    stop_on_drop: StopActions,
}

impl Default for Options {
    fn default() -> Self {
        OptionsBuilder::new().build()
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn stdin(&self) -> &Redirect {
        &self.stdin
    }

    pub fn stdout(&self) -> &Redirect {
        &self.stdout
    }

    pub fn stderr(&self) -> &Redirect {
        &self.stderr
    }

    /// Whether the child leads its own process group (unix only, Windows
    /// children always get their own group).
    pub fn new_process_group(&self) -> bool {
        self.new_process_group
    }

    /// Stop sequence run when the [`crate::Process`] is dropped while the child
    /// may still be running.
    pub fn stop_on_drop(&self) -> &StopActions {
        &self.stop_on_drop
    }
}

/// Builder for [`Options`].
#[derive(Debug)]
pub struct OptionsBuilder {
    options: Options,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: Options {
                working_directory: None,
                environment: Environment::Inherit,
                stdin: Redirect::Pipe,
                stdout: Redirect::Pipe,
                stderr: Redirect::Pipe,
                new_process_group: false,
                stop_on_drop: StopActions::kill_only(crate::Deadline::Infinite),
            },
        }
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.working_directory = Some(dir.into());
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.options.environment = environment;
        self
    }

    /// Replace the environment with exactly `vars`.
    pub fn env_clear<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.environment(Environment::Replace(collect_vars(vars)))
    }

    /// Inherit the environment, with `vars` set on top.
    pub fn envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.environment(Environment::Extend(collect_vars(vars)))
    }

    pub fn stdin(mut self, redirect: Redirect) -> Self {
        self.options.stdin = redirect;
        self
    }

    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.options.stdout = redirect;
        self
    }

    pub fn stderr(mut self, redirect: Redirect) -> Self {
        self.options.stderr = redirect;
        self
    }

    /// Start the child in a new process group, so that terminate and kill reach
    /// its descendants too. Ignored on Windows.
    pub fn new_process_group(mut self, value: bool) -> Self {
        self.options.new_process_group = value;
        self
    }

    /// Stop sequence run on drop. Use [`StopActions::noop`] to leave the child
    /// running.
    pub fn stop_on_drop(mut self, actions: StopActions) -> Self {
        self.options.stop_on_drop = actions;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

fn collect_vars<I, K, V>(vars: I) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    vars.into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

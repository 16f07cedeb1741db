// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::ffi::OsString;

use libdd_subprocess::{Deadline, Options, Process, Result, Stream};

pub const FIXTURE: &str = env!("CARGO_BIN_EXE_subprocess_fixture");

/// Generous bound for operations that should complete quickly, so a slow CI
/// machine fails a test instead of hanging it.
pub const SLOW: Deadline = Deadline::After(std::time::Duration::from_secs(30));

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn fixture_argv<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    std::iter::once(OsString::from(FIXTURE))
        .chain(args.into_iter().map(Into::into))
        .collect()
}

pub fn spawn_fixture<I, S>(args: I, options: &Options) -> Result<Process>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    init_logging();
    Process::spawn(&fixture_argv(args), options)
}

pub fn read_all(process: &mut Process, stream: Stream) -> Vec<u8> {
    let mut out = Vec::new();
    process.read_to_end(stream, &mut out, SLOW).unwrap();
    out
}

pub fn read_string(process: &mut Process, stream: Stream) -> String {
    String::from_utf8(read_all(process, stream)).unwrap()
}

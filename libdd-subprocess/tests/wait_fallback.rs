// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs with pidfds disabled, so Linux falls back to exit-notification pipes.
//! The wait strategy is picked once per process: this needs its own test
//! binary. Other unix platforms exercise their native strategy here too.
#![cfg(unix)]

mod common;

use std::sync::Once;
use std::time::{Duration, Instant};

use common::{read_string, spawn_fixture, SLOW};
use libdd_subprocess::{Deadline, ErrorKind, Options, Process, StopActions, Stream};

fn spawn(args: &[&str]) -> Process {
    static DISABLE_PIDFD: Once = Once::new();
    DISABLE_PIDFD.call_once(|| std::env::set_var("DD_SUBPROCESS_DISABLE_PIDFD", "1"));
    spawn_fixture(args.iter().copied(), &Options::default()).unwrap()
}

#[test]
fn test_echo() {
    let mut process = spawn(&["echo"]);
    process.write_all(b"over exit pipes", SLOW).unwrap();
    process.close(Stream::Stdin);
    assert_eq!(read_string(&mut process, Stream::Stdout), "over exit pipes");
    assert!(process.wait(SLOW).unwrap().success());
}

#[test]
fn test_exit_code() {
    let mut process = spawn(&["exit", "9"]);
    let start = Instant::now();
    assert_eq!(process.wait(SLOW).unwrap().code(), 9);
    assert!(start.elapsed() < Duration::from_secs(20));
}

#[test]
fn test_wait_timeout() {
    let mut process = spawn(&["sleep", "60000"]);
    let err = process.wait(Deadline::Immediate).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let err = process.wait(Deadline::from_millis(100)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(process.exit_status(), None);
}

#[test]
fn test_terminate_then_kill() {
    let mut process = spawn(&["sleep", "60000"]);
    let status = process
        .stop(&StopActions::terminate_then_kill(SLOW, SLOW))
        .unwrap();
    assert_eq!(status.signal(), Some(libc::SIGTERM));
}

#[test]
fn test_child_closing_inherited_descriptors_keeps_deadline() {
    let mut process = spawn(&["close-fds", "3000"]);
    // give the child time to close everything
    std::thread::sleep(Duration::from_millis(200));

    let start = Instant::now();
    let err = process.wait(Deadline::from_millis(200)).unwrap_err();
    let elapsed = start.elapsed();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= Duration::from_millis(190), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");

    process.kill().unwrap();
    assert_eq!(process.wait(SLOW).unwrap().signal(), Some(libc::SIGKILL));
}

#[test]
fn test_child_closing_inherited_descriptors_then_exiting_is_seen_early() {
    let mut process = spawn(&["close-fds", "300"]);

    let start = Instant::now();
    let status = process.wait(Deadline::from_secs(20)).unwrap();
    assert!(status.success());
    assert!(start.elapsed() < Duration::from_secs(10), "{:?}", start.elapsed());
}

// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{read_string, spawn_fixture, SLOW};
use libdd_subprocess::{Deadline, ErrorKind, ExitStatus, Options, Process, Redirect, Stream};

#[test]
fn test_exit_codes() {
    for code in [0, 1, 2, 42, 127] {
        let mut process = spawn_fixture(["exit", &code.to_string()], &Options::default()).unwrap();
        let status = process.wait(SLOW).unwrap();
        assert_eq!(status, ExitStatus::Exited(code));
        assert_eq!(status.code(), code);
        assert_eq!(status.success(), code == 0);
    }
}

#[test]
fn test_status_is_cached() {
    let mut process = spawn_fixture(["exit", "3"], &Options::default()).unwrap();
    assert_eq!(process.exit_status(), None);
    let status = process.wait(SLOW).unwrap();
    assert_eq!(process.exit_status(), Some(status));
    // no handle left, the cached value is all there is
    assert_eq!(process.wait(Deadline::Immediate).unwrap(), status);
    assert_eq!(process.wait(Deadline::Infinite).unwrap(), status);
    process.kill().unwrap();
    process.terminate().unwrap();
}

#[test]
fn test_pid() {
    let mut process = spawn_fixture(["exit", "0"], &Options::default()).unwrap();
    assert_ne!(process.pid(), 0);
    assert_ne!(process.pid(), std::process::id());
    process.wait(SLOW).unwrap();
}

#[test]
fn test_missing_program() {
    let err = Process::spawn(
        &["libdd-subprocess-definitely-not-a-program"],
        &Options::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.os_code().is_some());
}

#[test]
fn test_empty_argv() {
    let argv: [&str; 0] = [];
    let err = Process::spawn(&argv, &Options::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_arguments_reach_the_child_unchanged() {
    let args = [
        "plain",
        "",
        "with space",
        "tab\there",
        "\"quoted\"",
        "trailing\\",
        "back\\\\slashes\\\"",
        "ünïcødé",
    ];
    let mut process = spawn_fixture(
        std::iter::once("args").chain(args.iter().copied()),
        &Options::default(),
    )
    .unwrap();
    let out = read_string(&mut process, Stream::Stdout);
    let received: Vec<&str> = out.split_terminator('\0').collect();
    assert_eq!(received, args);
    assert!(process.wait(SLOW).unwrap().success());
}

#[test]
fn test_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options::builder().working_directory(dir.path()).build();
    let mut process = spawn_fixture(["cwd"], &options).unwrap();
    let out = read_string(&mut process, Stream::Stdout);
    assert!(process.wait(SLOW).unwrap().success());
    assert_eq!(
        std::fs::canonicalize(out.trim_end()).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[test]
fn test_missing_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options::builder()
        .working_directory(dir.path().join("missing"))
        .build();
    let err = spawn_fixture(["exit", "0"], &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_output_to_file_appends() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("out.log");
    std::fs::write(&log, "first;").unwrap();

    let options = Options::builder()
        .stdout(Redirect::Path(log.clone()))
        .stderr(Redirect::Path(log.clone()))
        .build();
    let mut process = spawn_fixture(["stderr", "second"], &options).unwrap();
    assert!(process.wait(SLOW).unwrap().success());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "first;second");
}

#[test]
fn test_input_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, "from a file").unwrap();

    let options = Options::builder().stdin(Redirect::Path(input)).build();
    let mut process = spawn_fixture(["echo"], &options).unwrap();
    assert_eq!(read_string(&mut process, Stream::Stdout), "from a file");
    assert!(process.wait(SLOW).unwrap().success());

    // stdin was not piped
    let err = process.write(b"x", Deadline::Immediate).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options::builder()
        .stdin(Redirect::Path(dir.path().join("missing")))
        .build();
    let err = spawn_fixture(["echo"], &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_discarded_input_is_empty() {
    let options = Options::builder().stdin(Redirect::Discard).build();
    let mut process = spawn_fixture(["echo"], &options).unwrap();
    assert_eq!(read_string(&mut process, Stream::Stdout), "");
    assert!(process.wait(SLOW).unwrap().success());
}

#[test]
fn test_wait_timeout_leaves_process_running() {
    let mut process = spawn_fixture(["sleep", "60000"], &Options::default()).unwrap();

    let err = process.wait(Deadline::Immediate).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let err = process.wait(Deadline::from_millis(100)).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(process.exit_status(), None);

    process.kill().unwrap();
    let status = process.wait(SLOW).unwrap();
    assert!(!status.success());
}

#[test]
fn test_wait_observes_exit_before_deadline() {
    let mut process = spawn_fixture(["sleep", "100"], &Options::default()).unwrap();
    let start = std::time::Instant::now();
    assert!(process.wait(SLOW).unwrap().success());
    assert!(start.elapsed() < std::time::Duration::from_secs(20));
}

#[cfg(unix)]
#[test]
fn test_new_process_group() {
    let options = Options::builder().new_process_group(true).build();
    let mut process = spawn_fixture(["sleep", "60000"], &options).unwrap();
    let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(process.pid() as i32))).unwrap();
    assert_eq!(pgid.as_raw() as u32, process.pid());
    process.terminate().unwrap();
    assert_eq!(process.wait(SLOW).unwrap().signal(), Some(libc::SIGTERM));
}

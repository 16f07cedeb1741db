// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kept in its own test binary: a test spawning concurrently would change the
//! descriptor count under our feet.
#![cfg(unix)]

mod common;

use common::{spawn_fixture, SLOW};
use libdd_subprocess::{ErrorKind, Options, Process, Redirect};

fn open_fds() -> usize {
    let dir = if cfg!(target_os = "linux") {
        "/proc/self/fd"
    } else {
        "/dev/fd"
    };
    // the directory handle itself is counted on every call, so it cancels out
    std::fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_no_descriptor_leaks() {
    common::init_logging();
    // warm up lazily initialized state (wait strategy, logging)
    spawn_fixture(["exit", "0"], &Options::default())
        .unwrap()
        .wait(SLOW)
        .unwrap();

    let before = open_fds();

    for _ in 0..10 {
        let err = Process::spawn(
            &["libdd-subprocess-definitely-not-a-program"],
            &Options::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let options = Options::builder()
            .working_directory("/libdd-subprocess/missing/dir")
            .build();
        assert!(spawn_fixture(["exit", "0"], &options).is_err());

        let options = Options::builder()
            .stdin(Redirect::Path("/libdd-subprocess/missing/file".into()))
            .build();
        assert!(spawn_fixture(["exit", "0"], &options).is_err());
    }
    assert_eq!(open_fds(), before, "failed spawns leaked descriptors");

    for _ in 0..10 {
        let mut process = spawn_fixture(["echo"], &Options::default()).unwrap();
        process.close(libdd_subprocess::Stream::Stdin);
        assert!(process.wait(SLOW).unwrap().success());
    }
    assert_eq!(open_fds(), before, "finished processes leaked descriptors");

    for _ in 0..10 {
        drop(spawn_fixture(["sleep", "60000"], &Options::default()).unwrap());
    }
    assert_eq!(open_fds(), before, "dropped processes leaked descriptors");
}

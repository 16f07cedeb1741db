// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{read_string, spawn_fixture, SLOW};
use libdd_subprocess::{Environment, ErrorKind, Options, Stream};

fn child_env(options: &Options, key: &str) -> Option<String> {
    let mut process = spawn_fixture(["env", key], options).unwrap();
    let out = read_string(&mut process, Stream::Stdout);
    match process.wait(SLOW).unwrap().code() {
        0 => Some(out.trim_end().to_owned()),
        1 => None,
        code => panic!("unexpected exit code {code}"),
    }
}

#[test]
fn test_inherit() {
    // set by cargo for every test binary
    let expected = std::env::var("CARGO_PKG_NAME").unwrap();
    assert_eq!(
        child_env(&Options::default(), "CARGO_PKG_NAME").as_deref(),
        Some(expected.as_str())
    );
}

#[test]
fn test_extend() {
    let options = Options::builder()
        .envs([("LIBDD_SUBPROCESS_TEST", "extended"), ("OTHER", "x")])
        .build();
    assert_eq!(
        child_env(&options, "LIBDD_SUBPROCESS_TEST").as_deref(),
        Some("extended")
    );
    assert!(child_env(&options, "CARGO_PKG_NAME").is_some());
}

#[test]
fn test_extend_overrides_parent() {
    let options = Options::builder()
        .envs([("CARGO_PKG_NAME", "overridden")])
        .build();
    assert_eq!(
        child_env(&options, "CARGO_PKG_NAME").as_deref(),
        Some("overridden")
    );
}

#[test]
fn test_replace() {
    let mut vars = vec![("LIBDD_SUBPROCESS_TEST".to_owned(), "replaced".to_owned())];
    // a Windows process can't start without SystemRoot
    if let Ok(root) = std::env::var("SystemRoot") {
        vars.push(("SystemRoot".to_owned(), root));
    }
    let options = Options::builder().env_clear(vars).build();
    assert_eq!(
        child_env(&options, "LIBDD_SUBPROCESS_TEST").as_deref(),
        Some("replaced")
    );
    assert_eq!(child_env(&options, "CARGO_PKG_NAME"), None);
}

#[test]
fn test_later_entries_win() {
    let options = Options::builder()
        .envs([
            ("LIBDD_SUBPROCESS_TEST", "first"),
            ("LIBDD_SUBPROCESS_TEST", "second"),
        ])
        .build();
    assert_eq!(
        child_env(&options, "LIBDD_SUBPROCESS_TEST").as_deref(),
        Some("second")
    );
}

#[cfg(windows)]
#[test]
fn test_keys_are_case_insensitive() {
    let options = Options::builder()
        .envs([
            ("libdd_subprocess_test", "lower"),
            ("LIBDD_SUBPROCESS_TEST", "upper"),
        ])
        .build();
    assert_eq!(
        child_env(&options, "Libdd_Subprocess_Test").as_deref(),
        Some("upper")
    );
}

#[cfg(unix)]
#[test]
fn test_keys_are_case_sensitive() {
    let options = Options::builder()
        .envs([
            ("libdd_subprocess_test", "lower"),
            ("LIBDD_SUBPROCESS_TEST", "upper"),
        ])
        .build();
    assert_eq!(
        child_env(&options, "libdd_subprocess_test").as_deref(),
        Some("lower")
    );
    assert_eq!(
        child_env(&options, "LIBDD_SUBPROCESS_TEST").as_deref(),
        Some("upper")
    );
}

#[test]
fn test_invalid_variables() {
    for (key, value) in [("", "v"), ("A=B", "v"), ("A\0B", "v"), ("A", "v\0")] {
        let options = Options::builder()
            .environment(Environment::Extend(vec![(key.into(), value.into())]))
            .build();
        let err = spawn_fixture(["exit", "0"], &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{key:?}={value:?}");
    }
}

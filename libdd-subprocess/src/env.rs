// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Child environment construction.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

use crate::options::Environment;
use crate::{Error, ErrorKind, Result};

pub(crate) type EnvVars = Vec<(OsString, OsString)>;

/// Windows variable names are case-insensitive, POSIX ones are not.
pub(crate) const CASE_INSENSITIVE_KEYS: bool = cfg!(windows);

/// Resolves the environment policy into the sorted, deduplicated list of
/// variables the child starts with.
///
/// `None` means the child simply inherits the parent's environment.
pub(crate) fn resolve(policy: &Environment) -> Result<Option<EnvVars>> {
    match policy {
        Environment::Inherit => Ok(None),
        Environment::Replace(vars) => {
            validate(vars)?;
            Ok(Some(merge(Vec::new(), vars, CASE_INSENSITIVE_KEYS)))
        }
        Environment::Extend(vars) => {
            validate(vars)?;
            Ok(Some(merge(
                std::env::vars_os(),
                vars,
                CASE_INSENSITIVE_KEYS,
            )))
        }
    }
}

fn validate(vars: &[(OsString, OsString)]) -> Result<()> {
    for (key, value) in vars {
        let key_bytes = key.as_encoded_bytes();
        if key_bytes.is_empty() {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "empty environment variable name",
            ));
        }
        if key_bytes.contains(&b'=') {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                format!("environment variable name contains '=': {key:?}"),
            ));
        }
        if key_bytes.contains(&0) || value.as_encoded_bytes().contains(&0) {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                format!("environment variable contains a NUL character: {key:?}"),
            ));
        }
    }
    Ok(())
}

fn sort_key(key: &OsStr, case_insensitive: bool) -> Vec<u8> {
    if case_insensitive {
        key.to_string_lossy().to_uppercase().into_bytes()
    } else {
        key.as_encoded_bytes().to_vec()
    }
}

/// Applies `overrides` on top of `base`. Later entries win; with
/// `case_insensitive` keys that differ only in case are the same variable and
/// the winning entry keeps its own spelling. The result is sorted by key.
pub(crate) fn merge<I>(
    base: I,
    overrides: &[(OsString, OsString)],
    case_insensitive: bool,
) -> EnvVars
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut merged = BTreeMap::new();
    let overrides = overrides.iter().cloned();
    for (key, value) in base.into_iter().chain(overrides) {
        merged.insert(sort_key(&key, case_insensitive), (key, value));
    }
    merged.into_values().collect()
}

/// `KEY=VALUE` C strings, in order.
#[cfg(unix)]
pub(crate) fn to_cstrings(vars: &[(OsString, OsString)]) -> Result<Vec<std::ffi::CString>> {
    use std::os::unix::ffi::OsStrExt;

    vars.iter()
        .map(|(key, value)| {
            let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
            entry.extend_from_slice(key.as_bytes());
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            std::ffi::CString::new(entry).map_err(|_| {
                Error::with_detail(
                    ErrorKind::InvalidArgument,
                    "environment variable contains a NUL character",
                )
            })
        })
        .collect()
}

/// Environment block for `CreateProcessW` with `CREATE_UNICODE_ENVIRONMENT`:
/// `KEY=VALUE\0` entries followed by a terminating `\0`.
#[cfg(windows)]
pub(crate) fn to_wide_block(vars: &[(OsString, OsString)]) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;

    let mut block = Vec::new();
    for (key, value) in vars {
        block.extend(key.encode_wide());
        block.push(b'=' as u16);
        block.extend(value.encode_wide());
        block.push(0);
    }
    // an empty block still needs two terminators
    if block.is_empty() {
        block.push(0);
    }
    block.push(0);
    block
}

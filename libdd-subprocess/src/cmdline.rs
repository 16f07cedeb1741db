// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Windows command line construction.
//!
//! `CreateProcessW` takes a single string that the child splits back into
//! arguments, usually with the MSVC runtime rules (`CommandLineToArgvW` follows
//! the same rules for everything but the program name). The builder quotes
//! every argument so that splitting yields exactly the original vector.
//!
//! The encoding work is done on UTF-16 code units so that the Windows backend
//! can feed arbitrary `OsString`s through it, while [`build_command_line`]
//! exposes the same logic for `str` arguments on every platform.

use crate::{Error, ErrorKind, Result};

const QUOTE: u16 = b'"' as u16;
const BACKSLASH: u16 = b'\\' as u16;
const SPACE: u16 = b' ' as u16;
const TAB: u16 = b'\t' as u16;
const NEWLINE: u16 = b'\n' as u16;
const VERTICAL_TAB: u16 = 0x0b;

/// Joins `args` into a command line that splits back into the same vector.
///
/// The first element is the program name. It is quoted but never escaped, as
/// the program name is split with simpler rules than the other arguments, so
/// it may not contain `"`.
///
/// # Errors
/// [`ErrorKind::InvalidArgument`] if `args` is empty, an argument contains a
/// NUL character, or the program name contains a double quote.
pub fn build_command_line<S: AsRef<str>>(args: &[S]) -> Result<String> {
    let wide = encode(args.iter().map(|arg| arg.as_ref().encode_utf16()))?;
    // every code unit was copied from valid UTF-16 or is ASCII
    String::from_utf16(&wide).map_err(|_| Error::with_detail(ErrorKind::Generic, "invalid UTF-16"))
}

/// NUL-terminated wide command line, ready for `CreateProcessW`.
#[cfg(windows)]
pub(crate) fn build_command_line_wide(args: &[std::ffi::OsString]) -> Result<Vec<u16>> {
    use std::os::windows::ffi::OsStrExt;

    let mut wide = encode(args.iter().map(|arg| arg.encode_wide()))?;
    wide.push(0);
    Ok(wide)
}

fn encode<I, A>(mut args: I) -> Result<Vec<u16>>
where
    I: Iterator<Item = A>,
    A: Iterator<Item = u16>,
{
    let program = args
        .next()
        .ok_or_else(|| Error::with_detail(ErrorKind::InvalidArgument, "empty argument vector"))?;
    let mut cmd = Vec::new();
    append_program(&mut cmd, program)?;
    for arg in args {
        cmd.push(SPACE);
        append_arg(&mut cmd, arg)?;
    }
    Ok(cmd)
}

fn needs_quotes(arg: &[u16]) -> bool {
    arg.is_empty()
        || arg
            .iter()
            .any(|&c| matches!(c, SPACE | TAB | NEWLINE | VERTICAL_TAB | QUOTE))
}

fn append_program(cmd: &mut Vec<u16>, program: impl Iterator<Item = u16>) -> Result<()> {
    let program: Vec<u16> = program.collect();
    if program.contains(&QUOTE) {
        return Err(Error::with_detail(
            ErrorKind::InvalidArgument,
            "program name contains a double quote",
        ));
    }
    if program.contains(&0) {
        return Err(nul_error());
    }
    let quote = needs_quotes(&program);
    if quote {
        cmd.push(QUOTE);
    }
    cmd.extend_from_slice(&program);
    if quote {
        cmd.push(QUOTE);
    }
    Ok(())
}

fn append_arg(cmd: &mut Vec<u16>, arg: impl Iterator<Item = u16>) -> Result<()> {
    let arg: Vec<u16> = arg.collect();
    if arg.contains(&0) {
        return Err(nul_error());
    }
    let quote = needs_quotes(&arg);
    if quote {
        cmd.push(QUOTE);
    }
    // Backslashes are only special right before a quote: 2n+1 backslashes
    // then yield n backslashes and a literal quote.
    let mut backslashes: usize = 0;
    for &c in &arg {
        if c == BACKSLASH {
            backslashes += 1;
        } else {
            if c == QUOTE {
                cmd.extend(std::iter::repeat(BACKSLASH).take(backslashes + 1));
            }
            backslashes = 0;
        }
        cmd.push(c);
    }
    if quote {
        // trailing backslashes precede the closing quote
        cmd.extend(std::iter::repeat(BACKSLASH).take(backslashes));
        cmd.push(QUOTE);
    }
    Ok(())
}

fn nul_error() -> Error {
    Error::with_detail(ErrorKind::InvalidArgument, "argument contains a NUL character")
}

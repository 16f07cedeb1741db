// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Child process driven by the integration tests.
//!
//! Usage: `subprocess_fixture <mode> [args...]`
//! - `exit <code>`: exit with `code`
//! - `echo`: copy stdin to stdout until end of input
//! - `flood <bytes>`: write `bytes` bytes to stdout and stderr, then exit 0
//! - `ignore-term`: ignore SIGTERM / CTRL_BREAK, print `ready`, sleep forever
//! - `sleep <millis>`: sleep, then exit 0
//! - `close-fds <millis>`: close every inherited descriptor above stderr, then
//!   sleep (unix only)
//! - `args [args...]`: write each argument followed by a NUL byte to stdout
//! - `env <key>`: print the variable's value, exit 1 if unset
//! - `cwd`: print the working directory
//! - `stderr <text>`: write `text` to stderr

use anyhow::{bail, Context};
use std::io::{self, Read, Write};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let mode = args
        .next()
        .context("missing mode")?
        .into_string()
        .map_err(|_| anyhow::anyhow!("mode is not valid unicode"))?;
    let mut rest = args.map(|arg| arg.to_string_lossy().into_owned());

    match mode.as_str() {
        "exit" => {
            let code: i32 = rest.next().context("missing exit code")?.parse()?;
            std::process::exit(code);
        }
        "echo" => {
            let mut stdin = io::stdin().lock();
            let mut stdout = io::stdout().lock();
            let mut buf = [0u8; 4096];
            loop {
                let n = stdin.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
                stdout.flush()?;
            }
        }
        "flood" => {
            let size: usize = rest.next().context("missing size")?.parse()?;
            let chunk = vec![b'x'; 64 * 1024];
            let mut left = size;
            let mut stdout = io::stdout().lock();
            let mut stderr = io::stderr().lock();
            while left > 0 {
                let n = left.min(chunk.len());
                stdout.write_all(&chunk[..n])?;
                stderr.write_all(&chunk[..n])?;
                left -= n;
            }
        }
        "ignore-term" => {
            ignore_termination()?;
            println!("ready");
            io::stdout().flush()?;
            loop {
                std::thread::sleep(Duration::from_secs(60));
            }
        }
        "sleep" => {
            let millis: u64 = rest.next().context("missing duration")?.parse()?;
            std::thread::sleep(Duration::from_millis(millis));
        }
        #[cfg(unix)]
        "close-fds" => {
            let millis: u64 = rest.next().context("missing duration")?.parse()?;
            let max_fd = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) }.clamp(3, 65536) as i32;
            for fd in 3..max_fd {
                // Safety: no Rust value owns a descriptor above stderr at this point
                unsafe { libc::close(fd) };
            }
            std::thread::sleep(Duration::from_millis(millis));
        }
        "args" => {
            let mut stdout = io::stdout().lock();
            for arg in rest {
                stdout.write_all(arg.as_bytes())?;
                stdout.write_all(b"\0")?;
            }
        }
        "env" => {
            let key = rest.next().context("missing key")?;
            match std::env::var_os(&key) {
                Some(value) => println!("{}", value.to_string_lossy()),
                None => std::process::exit(1),
            }
        }
        "cwd" => println!("{}", std::env::current_dir()?.display()),
        "stderr" => {
            let text = rest.next().context("missing text")?;
            eprint!("{text}");
        }
        other => bail!("unknown mode {other}"),
    }
    Ok(())
}

#[cfg(unix)]
fn ignore_termination() -> anyhow::Result<()> {
    // Safety: SIG_IGN installs no handler code
    if unsafe { libc::signal(libc::SIGTERM, libc::SIG_IGN) } == libc::SIG_ERR {
        return Err(io::Error::last_os_error()).context("can't ignore SIGTERM");
    }
    Ok(())
}

#[cfg(windows)]
fn ignore_termination() -> anyhow::Result<()> {
    use windows_sys::Win32::Foundation::{BOOL, TRUE};
    use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;

    unsafe extern "system" fn swallow(_ctrl_type: u32) -> BOOL {
        TRUE
    }

    if unsafe { SetConsoleCtrlHandler(Some(swallow), TRUE) } == 0 {
        return Err(io::Error::last_os_error()).context("can't install ctrl handler");
    }
    Ok(())
}

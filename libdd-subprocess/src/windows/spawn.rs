// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::{c_void, OsString};
use std::fs::{File, OpenOptions};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::path::Path;

use tracing::debug;
use windows_sys::Win32::Foundation::{
    DuplicateHandle, SetHandleInformation, DUPLICATE_SAME_ACCESS, FALSE, HANDLE,
    HANDLE_FLAG_INHERIT, INVALID_HANDLE_VALUE, TRUE,
};
use windows_sys::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows_sys::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, GetCurrentProcess,
    InitializeProcThreadAttributeList, UpdateProcThreadAttribute, CREATE_NEW_PROCESS_GROUP,
    CREATE_UNICODE_ENVIRONMENT, EXTENDED_STARTUPINFO_PRESENT, LPPROC_THREAD_ATTRIBUTE_LIST,
    PROCESS_INFORMATION, PROC_THREAD_ATTRIBUTE_HANDLE_LIST, STARTF_USESTDHANDLES,
    STARTUPINFOEXW,
};

use super::pipe::{self, Pipe};
use super::process::ProcessHandle;
use super::{last_error, owned_handle};
use crate::options::{Options, Redirect};
use crate::process::Spawned;
use crate::{cmdline, env, Error, ErrorKind, Result, Stream};

/// Child-side handles, all inheritable. Owned by the spawn call and closed as
/// soon as `CreateProcessW` returned, on every path.
struct ChildSide {
    stdin: OwnedHandle,
    stdout: OwnedHandle,
    stderr: OwnedHandle,
}

impl ChildSide {
    fn handle_list(&self) -> [HANDLE; 3] {
        [
            self.stdin.as_raw_handle(),
            self.stdout.as_raw_handle(),
            self.stderr.as_raw_handle(),
        ]
    }
}

/// `PROC_THREAD_ATTRIBUTE_LIST` restricting inheritance to the given handles.
struct AttributeList {
    // usize elements keep the buffer pointer-aligned
    buffer: Vec<usize>,
}

impl AttributeList {
    /// `handles` must outlive the returned list, the attribute stores a pointer
    /// to it.
    fn with_handle_list(handles: &[HANDLE]) -> Result<Self> {
        let mut size = 0usize;
        // fails with ERROR_INSUFFICIENT_BUFFER, only the size is wanted
        unsafe { InitializeProcThreadAttributeList(std::ptr::null_mut(), 1, 0, &mut size) };
        if size == 0 {
            return Err(last_error());
        }
        let mut buffer = vec![0usize; size.div_ceil(std::mem::size_of::<usize>())];
        let list = buffer.as_mut_ptr() as LPPROC_THREAD_ATTRIBUTE_LIST;
        if unsafe { InitializeProcThreadAttributeList(list, 1, 0, &mut size) } == FALSE {
            return Err(last_error());
        }
        let mut attributes = Self { buffer };
        let updated = unsafe {
            UpdateProcThreadAttribute(
                attributes.as_mut_ptr(),
                0,
                PROC_THREAD_ATTRIBUTE_HANDLE_LIST as usize,
                handles.as_ptr() as *const c_void,
                std::mem::size_of_val(handles),
                std::ptr::null_mut(),
                std::ptr::null(),
            )
        };
        if updated == FALSE {
            return Err(last_error());
        }
        Ok(attributes)
    }

    fn as_mut_ptr(&mut self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        self.buffer.as_mut_ptr() as LPPROC_THREAD_ATTRIBUTE_LIST
    }
}

impl Drop for AttributeList {
    fn drop(&mut self) {
        unsafe { DeleteProcThreadAttributeList(self.as_mut_ptr()) };
    }
}

fn set_inheritable(handle: &OwnedHandle) -> Result<()> {
    let res = unsafe {
        SetHandleInformation(handle.as_raw_handle(), HANDLE_FLAG_INHERIT, HANDLE_FLAG_INHERIT)
    };
    if res == FALSE {
        return Err(last_error());
    }
    Ok(())
}

fn open_redirect(path: &Path, stream: Stream) -> Result<OwnedHandle> {
    let file = match stream {
        Stream::Stdin => File::open(path),
        Stream::Stdout | Stream::Stderr => OpenOptions::new().append(true).create(true).open(path),
    }
    .map_err(|err| Error::from(err).context(format!("can't open {}", path.display())))?;
    let handle = OwnedHandle::from(file);
    set_inheritable(&handle)?;
    Ok(handle)
}

fn open_null(stream: Stream) -> Result<OwnedHandle> {
    let file = match stream {
        Stream::Stdin => File::open("NUL"),
        Stream::Stdout | Stream::Stderr => OpenOptions::new().write(true).open("NUL"),
    }?;
    let handle = OwnedHandle::from(file);
    set_inheritable(&handle)?;
    Ok(handle)
}

/// Inheritable duplicate of the parent's own std handle, or the null device if
/// the parent has none (e.g. a GUI or service process).
fn inherited_std_handle(stream: Stream) -> Result<OwnedHandle> {
    let which: STD_HANDLE = match stream {
        Stream::Stdin => STD_INPUT_HANDLE,
        Stream::Stdout => STD_OUTPUT_HANDLE,
        Stream::Stderr => STD_ERROR_HANDLE,
    };
    let source = unsafe { GetStdHandle(which) };
    if source.is_null() || source == INVALID_HANDLE_VALUE {
        return open_null(stream);
    }
    let mut duplicate: HANDLE = std::ptr::null_mut();
    let res = unsafe {
        DuplicateHandle(
            GetCurrentProcess(),
            source,
            GetCurrentProcess(),
            &mut duplicate,
            0,
            TRUE,
            DUPLICATE_SAME_ACCESS,
        )
    };
    if res == FALSE {
        // std handles can be stale in detached processes
        debug!(?stream, error = %last_error(), "Can't duplicate std handle, using NUL");
        return open_null(stream);
    }
    Ok(unsafe { OwnedHandle::from_raw_handle(duplicate) })
}

fn stdio(redirect: &Redirect, stream: Stream) -> Result<(Option<Pipe>, OwnedHandle)> {
    Ok(match redirect {
        Redirect::Inherit => (None, inherited_std_handle(stream)?),
        Redirect::Pipe => {
            let (parent, child) = pipe::create(stream)?;
            (Some(parent), child)
        }
        Redirect::Discard => (None, open_null(stream)?),
        Redirect::Path(path) => (None, open_redirect(path, stream)?),
    })
}

fn to_wide_nul(path: &Path) -> Result<Vec<u16>> {
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if wide.contains(&0) {
        return Err(Error::with_detail(
            ErrorKind::InvalidArgument,
            "working directory contains a NUL character",
        ));
    }
    wide.push(0);
    Ok(wide)
}

pub(crate) fn spawn(argv: &[OsString], options: &Options) -> Result<Spawned> {
    let mut command_line = cmdline::build_command_line_wide(argv)?;
    let environment = env::resolve(options.environment())?.map(|vars| env::to_wide_block(&vars));
    let working_directory = options.working_directory().map(to_wide_nul).transpose()?;

    let (stdin, child_stdin) = stdio(options.stdin(), Stream::Stdin)?;
    let (stdout, child_stdout) = stdio(options.stdout(), Stream::Stdout)?;
    let (stderr, child_stderr) = stdio(options.stderr(), Stream::Stderr)?;
    let child_side = ChildSide {
        stdin: child_stdin,
        stdout: child_stdout,
        stderr: child_stderr,
    };

    let handles = child_side.handle_list();
    let mut attributes = AttributeList::with_handle_list(&handles)?;

    // Safety: plain C structs for which all zeroes is valid
    let mut startup_info: STARTUPINFOEXW = unsafe { std::mem::zeroed() };
    startup_info.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;
    startup_info.StartupInfo.dwFlags = STARTF_USESTDHANDLES;
    startup_info.StartupInfo.hStdInput = child_side.stdin.as_raw_handle();
    startup_info.StartupInfo.hStdOutput = child_side.stdout.as_raw_handle();
    startup_info.StartupInfo.hStdError = child_side.stderr.as_raw_handle();
    startup_info.lpAttributeList = attributes.as_mut_ptr();
    let mut process_info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

    let created = unsafe {
        CreateProcessW(
            std::ptr::null(),
            command_line.as_mut_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            TRUE,
            CREATE_UNICODE_ENVIRONMENT | CREATE_NEW_PROCESS_GROUP | EXTENDED_STARTUPINFO_PRESENT,
            environment
                .as_ref()
                .map_or(std::ptr::null(), |block| block.as_ptr() as *const c_void),
            working_directory
                .as_ref()
                .map_or(std::ptr::null(), |dir| dir.as_ptr()),
            &startup_info.StartupInfo,
            &mut process_info,
        )
    };
    let result = if created == FALSE {
        Err(last_error())
    } else {
        Ok(())
    };
    drop(attributes);
    drop(child_side);
    result?;

    // Safety: CreateProcessW succeeded, both handles are ours
    let process = unsafe { owned_handle(process_info.hProcess)? };
    drop(unsafe { owned_handle(process_info.hThread) });

    debug!(
        pid = process_info.dwProcessId,
        program = %argv[0].to_string_lossy(),
        "Spawned process"
    );

    Ok(Spawned {
        handle: ProcessHandle::new(process, process_info.dwProcessId),
        stdin,
        stdout,
        stderr,
    })
}

// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use windows_sys::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_BAD_ENVIRONMENT, ERROR_BAD_EXE_FORMAT, ERROR_BAD_NETPATH,
    ERROR_BROKEN_PIPE, ERROR_COMMITMENT_LIMIT, ERROR_DIRECTORY, ERROR_FILENAME_EXCED_RANGE,
    ERROR_FILE_NOT_FOUND, ERROR_INVALID_DRIVE, ERROR_INVALID_HANDLE, ERROR_INVALID_NAME,
    ERROR_INVALID_PARAMETER, ERROR_IO_PENDING, ERROR_NOT_ENOUGH_MEMORY, ERROR_NO_DATA,
    ERROR_NO_SYSTEM_RESOURCES, ERROR_OUTOFMEMORY, ERROR_PATH_NOT_FOUND, ERROR_PIPE_NOT_CONNECTED,
    ERROR_PRIVILEGE_NOT_HELD, ERROR_SEM_TIMEOUT, ERROR_TIMEOUT, ERROR_TOO_MANY_OPEN_FILES,
    WAIT_TIMEOUT,
};

use crate::ErrorKind;

pub(crate) fn error_kind(code: i32) -> ErrorKind {
    match code as u32 {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND | ERROR_INVALID_DRIVE | ERROR_BAD_NETPATH
        | ERROR_DIRECTORY => ErrorKind::NotFound,
        ERROR_ACCESS_DENIED | ERROR_PRIVILEGE_NOT_HELD => ErrorKind::PermissionDenied,
        ERROR_BROKEN_PIPE | ERROR_NO_DATA | ERROR_PIPE_NOT_CONNECTED => ErrorKind::BrokenPipe,
        WAIT_TIMEOUT | ERROR_TIMEOUT | ERROR_SEM_TIMEOUT => ErrorKind::Timeout,
        ERROR_IO_PENDING => ErrorKind::WouldBlock,
        ERROR_INVALID_PARAMETER
        | ERROR_INVALID_HANDLE
        | ERROR_INVALID_NAME
        | ERROR_BAD_EXE_FORMAT
        | ERROR_FILENAME_EXCED_RANGE
        | ERROR_BAD_ENVIRONMENT => ErrorKind::InvalidArgument,
        ERROR_TOO_MANY_OPEN_FILES
        | ERROR_NOT_ENOUGH_MEMORY
        | ERROR_OUTOFMEMORY
        | ERROR_NO_SYSTEM_RESOURCES
        | ERROR_COMMITMENT_LIMIT => ErrorKind::Exhausted,
        _ => ErrorKind::Generic,
    }
}

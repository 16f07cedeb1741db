// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use nix::errno::Errno;

use crate::ErrorKind;

pub(crate) fn error_kind(code: i32) -> ErrorKind {
    match Errno::from_raw(code) {
        Errno::ENOENT | Errno::ENOTDIR | Errno::ESRCH => ErrorKind::NotFound,
        Errno::EACCES | Errno::EPERM | Errno::EROFS => ErrorKind::PermissionDenied,
        Errno::EPIPE | Errno::ECONNRESET => ErrorKind::BrokenPipe,
        Errno::ETIMEDOUT => ErrorKind::Timeout,
        Errno::EAGAIN | Errno::EINPROGRESS => ErrorKind::WouldBlock,
        Errno::EINVAL
        | Errno::E2BIG
        | Errno::ENOEXEC
        | Errno::ENAMETOOLONG
        | Errno::ELOOP
        | Errno::EBADF
        | Errno::EISDIR => ErrorKind::InvalidArgument,
        Errno::EMFILE | Errno::ENFILE | Errno::ENOMEM | Errno::ENOSPC | Errno::ENOBUFS => {
            ErrorKind::Exhausted
        }
        _ => ErrorKind::Generic,
    }
}

// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use smallvec::SmallVec;

use crate::Result;

pub(crate) mod raw_env {
    /// # Safety
    ///
    /// caller must ensure its safe to read `environ` global value
    #[cfg(not(target_vendor = "apple"))]
    #[inline]
    unsafe fn environ() -> *mut *const *const libc::c_char {
        extern "C" {
            static mut environ: *const *const libc::c_char;
        }
        std::ptr::addr_of_mut!(environ)
    }

    #[cfg(target_vendor = "apple")]
    #[inline]
    unsafe fn environ() -> *mut *const *const libc::c_char {
        extern "C" {
            fn _NSGetEnviron() -> *mut *const *const libc::c_char;
        }
        _NSGetEnviron()
    }

    /// # Safety
    ///
    /// caller must ensure its safe to read and write to `environ` global value.
    /// Only meant to be called in a freshly forked child, right before `exec`.
    pub(crate) unsafe fn swap(new: *const *const libc::c_char) -> *const *const libc::c_char {
        let old = *environ();
        *environ() = new;
        old
    }
}

/// NULL-terminated array of C string pointers, with storage for the strings it
/// points to. Built before forking so the child never allocates.
pub(crate) struct ExecVec<const N: usize> {
    heap_items: SmallVec<[CString; N]>,
    // Always NULL ptr terminated
    ptrs: SmallVec<[*const libc::c_char; N]>,
}

impl<const N: usize> ExecVec<N> {
    pub(crate) fn empty() -> Self {
        let mut ptrs = SmallVec::new();
        ptrs.push(std::ptr::null());
        Self {
            heap_items: SmallVec::new(),
            ptrs,
        }
    }

    pub(crate) fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }

    /// First entry, NULL if the vector is empty.
    pub(crate) fn first(&self) -> *const libc::c_char {
        self.ptrs[0]
    }

    pub(crate) fn len(&self) -> usize {
        self.heap_items.len()
    }

    pub(crate) fn push(&mut self, item: CString) {
        // the string's buffer does not move when the CString itself is moved
        let ptr = item.as_ptr();
        self.heap_items.push(item);
        let l = self.ptrs.len();
        // replace previous trailing null with ptr to the item
        self.ptrs[l - 1] = ptr;
        self.ptrs.push(std::ptr::null());
    }
}

impl<const N: usize> FromIterator<CString> for ExecVec<N> {
    fn from_iter<I: IntoIterator<Item = CString>>(iter: I) -> Self {
        let mut vec = Self::empty();
        for item in iter {
            vec.push(item);
        }
        vec
    }
}

#[cfg(target_vendor = "apple")]
pub(crate) fn set_cloexec(fd: &OwnedFd) -> Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(nix::fcntl::FdFlag::FD_CLOEXEC))?;
    Ok(())
}

pub(crate) fn set_nonblocking(fd: &OwnedFd) -> Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Moves `fd` out of the stdio range, so that `dup2` onto 0, 1 or 2 in a child
/// can never clobber it. The returned descriptor is close-on-exec.
pub(crate) fn move_above_stdio(fd: OwnedFd) -> Result<OwnedFd> {
    if fd.as_raw_fd() > libc::STDERR_FILENO {
        return Ok(fd);
    }
    let moved = fcntl(fd.as_raw_fd(), FcntlArg::F_DUPFD_CLOEXEC(libc::STDERR_FILENO + 1))?;
    // Safety: F_DUPFD_CLOEXEC returned a fresh descriptor that nothing else owns
    Ok(unsafe { OwnedFd::from_raw_fd(moved) })
}

pub mod io;
pub mod memory;
pub mod process;
pub mod service;
pub mod time;

use core::ffi::{c_char, CStr};

use crate::syscalls::dispatcher::SyscallError;
use crate::syscalls::message::SyscallContext;
use crate::task::ThreadId;

pub(crate) fn caller(ctx: &SyscallContext) -> Result<ThreadId, SyscallError> {
    ctx.caller.ok_or(SyscallError::NoSuchThread)
}

/// Borrow a NUL-terminated string from the caller.
///
/// Caller buffers must be mapped in the kernel table, which shares the low
/// half with every process.
pub(crate) fn caller_str<'a>(address: u64) -> Result<&'a str, SyscallError> {
    if address == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    let raw = unsafe { CStr::from_ptr(address as *const c_char) };
    raw.to_str().map_err(|_| SyscallError::InvalidArgument)
}

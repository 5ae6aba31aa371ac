use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::handlers::caller_str;
use crate::syscalls::message::{SyscallContext, SystemMessage};

/// arg1: address of a NUL-terminated message.
pub fn sys_write_debug_message(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let text = caller_str(msg.arg1)?;
    kernel.platform.write_debug(text.as_bytes());
    kernel.platform.write_debug(b"\n");
    Ok(text.len() as u64)
}

/// arg1: byte to write.
pub fn sys_write_debug_char(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let byte = u8::try_from(msg.arg1).map_err(|_| SyscallError::InvalidArgument)?;
    kernel.platform.write_debug(&[byte]);
    Ok(0)
}

use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::handlers::caller;
use crate::syscalls::message::{SyscallContext, SystemMessage};

/// arg1: ticks to sleep; 0 yields the rest of the tick.
pub fn sys_thread_sleep(kernel: &mut Kernel, ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    caller(ctx)?;
    kernel.sleep(msg.arg1);
    Ok(0)
}

/// arg1: priority of the calling thread, as a signed word.
pub fn sys_set_thread_priority(kernel: &mut Kernel, ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let id = caller(ctx)?;
    let priority = i32::try_from(msg.arg1 as i64).map_err(|_| SyscallError::InvalidArgument)?;
    kernel.set_priority(id, priority)?;
    Ok(0)
}

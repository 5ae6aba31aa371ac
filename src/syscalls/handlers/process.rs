use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::handlers::{caller, caller_str};
use crate::syscalls::message::{SyscallContext, SystemMessage};
use crate::task::{ProcessId, ThreadStartOptions, IDLE_THREAD};

/// Returned when a lookup finds nothing.
pub const NOT_FOUND: u64 = u64::MAX;

pub fn sys_get_current_process_id(kernel: &mut Kernel, _ctx: &SyscallContext, _msg: &SystemMessage) -> SyscallResult {
    Ok(kernel.current_process() as u64)
}

pub fn sys_get_current_thread_id(_kernel: &mut Kernel, ctx: &SyscallContext, _msg: &SystemMessage) -> SyscallResult {
    Ok(caller(ctx)? as u64)
}

/// arg1: address of a NUL-terminated process path.
pub fn sys_get_process_by_name(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let name = caller_str(msg.arg1)?;
    Ok(kernel
        .processes
        .by_name(name)
        .map_or(NOT_FOUND, |proc| proc.id as u64))
}

/// arg1: process id.
pub fn sys_kill_process(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let process = ProcessId::try_from(msg.arg1).map_err(|_| SyscallError::NoSuchProcess)?;
    if process == kernel.processes.idle() || process == kernel.processes.system() {
        return Err(SyscallError::PermissionDenied);
    }
    kernel.kill_process(process)?;
    Ok(0)
}

/// arg1: entry point, arg2: argument buffer size, arg3: stack size (0 for
/// the default). The thread joins the calling process in `Created` state.
pub fn sys_create_thread(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let mut options = ThreadStartOptions::new(msg.arg1);
    options.argument_buffer_size = msg.arg2;
    options.stack_size = (msg.arg3 != 0).then_some(msg.arg3);
    options.debug_name = "UserThread";

    let process = kernel.current_process();
    Ok(kernel.create_thread(process, options)? as u64)
}

/// arg1: thread id of the calling process.
pub fn sys_start_thread(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let id = own_thread(kernel, msg.arg1)?;
    kernel.start_thread(id)?;
    Ok(0)
}

/// arg1: thread id of the calling process.
pub fn sys_kill_thread(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let id = own_thread(kernel, msg.arg1)?;
    kernel.kill_thread(id)?;
    Ok(0)
}

/// arg1: FS base of the calling thread.
pub fn sys_set_thread_storage_segment_base(
    kernel: &mut Kernel,
    ctx: &SyscallContext,
    msg: &SystemMessage,
) -> SyscallResult {
    let id = caller(ctx)?;
    let thread = kernel
        .scheduler
        .thread_mut(id)
        .ok_or(SyscallError::NoSuchThread)?;
    thread.storage_base = msg.arg1;
    kernel.platform.set_thread_storage_base(msg.arg1);
    Ok(0)
}

fn own_thread(kernel: &Kernel, word: u64) -> Result<usize, SyscallError> {
    let id = usize::try_from(word).map_err(|_| SyscallError::NoSuchThread)?;
    let thread = kernel
        .scheduler
        .thread(id)
        .ok_or(SyscallError::NoSuchThread)?;
    if id == IDLE_THREAD || thread.process != kernel.current_process() {
        return Err(SyscallError::PermissionDenied);
    }
    Ok(id)
}

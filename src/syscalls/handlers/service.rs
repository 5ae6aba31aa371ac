use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::message::{SyscallContext, SystemMessage};
use crate::syscalls::table::CommandHandler;
use crate::task::{ProcessId, ServiceStatus};

/// arg1: result word for the waiting caller.
pub fn sys_service_return(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    kernel.service_return(msg.arg1);
    Ok(0)
}

/// arg1: command id. Owner of the command, or the system process.
pub fn sys_get_process_id_for_command(
    kernel: &mut Kernel,
    _ctx: &SyscallContext,
    msg: &SystemMessage,
) -> SyscallResult {
    let owner = kernel
        .commands
        .owner(msg.arg1 as u32)
        .unwrap_or_else(|| kernel.processes.system());
    Ok(owner as u64)
}

/// arg1: command id to route to the calling process.
pub fn sys_register_service(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let process = kernel.current_process();
    kernel.register_service(msg.arg1 as u32, process)?;
    Ok(0)
}

/// arg1: vector to forward to the calling process.
pub fn sys_register_interrupt(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let vector = u8::try_from(msg.arg1).map_err(|_| SyscallError::InvalidArgument)?;
    let process = kernel.current_process();
    kernel.register_interrupt(vector, process)?;
    Ok(0)
}

/// arg1: 0 = not initialized, 1 = ready.
pub fn sys_set_service_status(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let status = ServiceStatus::from_word(msg.arg1).ok_or(SyscallError::InvalidArgument)?;
    let process = kernel.current_process();
    kernel.set_service_status(process, status)?;
    Ok(0)
}

impl Kernel {
    /// Route `command` to the service of `process`. Kernel commands cannot
    /// be taken over.
    pub fn register_service(&mut self, command: u32, process: ProcessId) -> Result<(), KernelError> {
        let has_service = self
            .processes
            .get(process)
            .ok_or(KernelError::UnknownProcess(process))?
            .service
            .is_some();
        if !has_service {
            return Err(KernelError::ServiceUnavailable(process));
        }
        if let Some(existing) = self.commands.get(command) {
            if matches!(existing.handler, CommandHandler::Kernel(_)) {
                return Err(KernelError::InvalidArgument);
            }
        }
        self.commands.register_service(command, process);
        log::info!("command {} served by process {}", command, process);
        Ok(())
    }
}

//! # System calls
//!
//! | Vector | Calling type | Caller                          |
//! |--------|--------------|---------------------------------|
//! | 250    | sync         | blocks until the command answers|
//! | 251    | async        | continues once the command runs |
//!
//! Register convention: RAX = command, RBX, RCX, RDX, RSI, RDI, RBP =
//! arguments 1-6. The result comes back in RAX; failures are negative
//! errno values.

pub mod dispatcher;
pub mod handlers;
pub mod message;
pub mod numbers;
pub mod table;

use handlers::{io, memory, process, service, time};
use numbers::SyscallNumber;
use table::CommandTable;

/// Register every kernel-side command.
pub fn install(commands: &mut CommandTable) {
    commands.register(SyscallNumber::ServiceReturn, service::sys_service_return);
    commands.register(
        SyscallNumber::GetProcessIdForCommand,
        service::sys_get_process_id_for_command,
    );
    commands.register(SyscallNumber::RegisterService, service::sys_register_service);
    commands.register(SyscallNumber::RegisterInterrupt, service::sys_register_interrupt);
    commands.register(SyscallNumber::SetServiceStatus, service::sys_set_service_status);

    commands.register(SyscallNumber::RequestMemory, memory::sys_request_memory);
    commands.register(
        SyscallNumber::RequestMessageBuffer,
        memory::sys_request_message_buffer,
    );
    commands.register(SyscallNumber::GetPhysicalMemory, memory::sys_get_physical_memory);
    commands.register(
        SyscallNumber::TranslateVirtualToPhysicalAddress,
        memory::sys_translate_virtual_to_physical,
    );

    commands.register(SyscallNumber::GetCurrentProcessId, process::sys_get_current_process_id);
    commands.register(SyscallNumber::GetCurrentThreadId, process::sys_get_current_thread_id);
    commands.register(SyscallNumber::GetProcessByName, process::sys_get_process_by_name);
    commands.register(SyscallNumber::KillProcess, process::sys_kill_process);
    commands.register(SyscallNumber::CreateThread, process::sys_create_thread);
    commands.register(SyscallNumber::StartThread, process::sys_start_thread);
    commands.register(SyscallNumber::KillThread, process::sys_kill_thread);
    commands.register(
        SyscallNumber::SetThreadStorageSegmentBase,
        process::sys_set_thread_storage_segment_base,
    );

    commands.register(SyscallNumber::ThreadSleep, time::sys_thread_sleep);
    commands.register(SyscallNumber::SetThreadPriority, time::sys_set_thread_priority);

    commands.register(SyscallNumber::WriteDebugMessage, io::sys_write_debug_message);
    commands.register(SyscallNumber::WriteDebugChar, io::sys_write_debug_char);
}

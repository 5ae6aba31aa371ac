//! System call dispatcher.
//!
//! Vectors 250 and 251 decode the trapped registers into a
//! [`SystemMessage`], save the caller, run the command, and store the
//! result word in the caller's saved accumulator. When the command did not
//! switch threads the live frame gets the same word.

use crate::error::{Fault, KernelError};
use crate::interrupts::frame::RegisterSnapshot;
use crate::kernel::Kernel;
use crate::syscalls::message::{CallingType, SyscallContext, SystemMessage};
use crate::syscalls::numbers::SyscallNumber;
use crate::syscalls::table::CommandHandler;

pub type SyscallResult = Result<u64, SyscallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidArgument,
    PermissionDenied,
    NoSuchProcess,
    NoSuchThread,
    ServiceUnavailable,
    NoMemory,
    IoError,
}

impl SyscallError {
    pub fn as_errno(self) -> isize {
        match self {
            Self::InvalidArgument => -22,   // EINVAL
            Self::PermissionDenied => -13,  // EACCES
            Self::NoSuchProcess => -3,      // ESRCH
            Self::NoSuchThread => -3,       // ESRCH
            Self::ServiceUnavailable => -6, // ENXIO
            Self::NoMemory => -12,          // ENOMEM
            Self::IoError => -5,            // EIO
        }
    }

    /// The accumulator word a caller sees.
    pub fn as_word(self) -> u64 {
        self.as_errno() as i64 as u64
    }
}

impl From<KernelError> for SyscallError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::NoFreeThreadSlot | KernelError::OutOfMemory => Self::NoMemory,
            KernelError::UnknownThread(_) => Self::NoSuchThread,
            KernelError::UnknownProcess(_) => Self::NoSuchProcess,
            KernelError::ServiceUnavailable(_) => Self::ServiceUnavailable,
            KernelError::MappingFailed(_) => Self::IoError,
            KernelError::InvalidArgument => Self::InvalidArgument,
        }
    }
}

/// Vector 250.
pub fn function_call(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    dispatch_syscall(kernel, frame, CallingType::Sync);
}

/// Vector 251.
pub fn action_call(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    dispatch_syscall(kernel, frame, CallingType::Async);
}

pub fn dispatch_syscall(kernel: &mut Kernel, frame: &mut RegisterSnapshot, calling_type: CallingType) {
    let message = SystemMessage::from_frame(frame);
    let command = message.command();

    let caller = kernel.scheduler.current_id();
    if let Some(id) = caller {
        kernel.scheduler.save_thread_state(id, frame);
    }

    let registration = match kernel.commands.get(command) {
        Some(registration) => *registration,
        None => kernel.fatal(Fault::UndefinedSyscall(command), frame),
    };

    if kernel.config.log.syscalls {
        log::debug!(
            "syscall {:?}({}) {:?} from {:?}: {:#x} {:#x} {:#x} {:#x} {:#x} {:#x}",
            SyscallNumber::from(command),
            command,
            calling_type,
            caller,
            message.arg1,
            message.arg2,
            message.arg3,
            message.arg4,
            message.arg5,
            message.arg6
        );
    }
    if registration.debug {
        kernel.dump_stats();
    }

    let context = SyscallContext {
        calling_type,
        caller,
        debug: registration.debug,
    };
    let result = match registration.handler {
        CommandHandler::Kernel(handler) => handler(kernel, &context, &message),
        CommandHandler::Service(process) => kernel
            .call_service(process, &context, &message)
            .map_err(SyscallError::from),
    };

    let word = match result {
        Ok(value) => value,
        Err(e) => {
            if kernel.config.log.syscalls {
                log::debug!("syscall {} failed: {:?}", command, e);
            }
            e.as_word()
        }
    };

    if let Some(id) = caller {
        kernel.scheduler.set_return_value(id, word);
    }
    if !kernel.scheduler.switch_pending() {
        frame.rax = word;
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;
    use crate::interrupts::frame::RegisterSnapshot;
    use crate::syscalls::numbers::ACTION_VECTOR;
    use crate::task::{ThreadId, ThreadStatus};
    use crate::testing::{sync_call, syscall_frame, Harness};

    fn client() -> (Harness, ThreadId) {
        let mut h = Harness::new();
        let process = h.user_process("/client");
        let thread = h.spawn(process, 0x40_0000);
        h.run(thread);
        (h, thread)
    }

    fn errno(word: u64) -> isize {
        word as i64 as isize
    }

    #[test]
    fn test_request_memory_maps_into_caller() {
        let (mut h, thread) = client();
        let process = h.kernel.scheduler.thread(thread).unwrap().process;
        let table = h.kernel.processes.get(process).unwrap().page_table;

        let mut frame = sync_call(SyscallNumber::RequestMemory as u64, [4096, 0, 0, 0, 0, 0]);
        frame.rip = 0x40_1000;
        h.trap(&mut frame);

        let address = frame.rax;
        assert_ne!(address, 0);
        assert!(h.kernel.page_tables.translate(table, address).is_some());
        assert_eq!(h.kernel.scheduler.current_id(), Some(thread));
        assert_eq!(frame.rip, 0x40_1000);
        assert_eq!(h.kernel.scheduler.thread(thread).unwrap().state.rax, address);
        assert_eq!(
            h.kernel.page_tables.translate(table, address + 4096),
            None
        );
    }

    #[test]
    fn test_zero_sized_request_is_rejected() {
        let (mut h, _) = client();
        let mut frame = sync_call(SyscallNumber::RequestMemory as u64, [0; 6]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::InvalidArgument.as_errno());
    }

    #[test]
    fn test_sizes_that_overflow_are_rejected() {
        let (mut h, _) = client();
        let pages = h.memory.lock().allocated_pages;
        let target = h.kernel.current_process() as u64;

        for (command, [a, b, c]) in [
            (SyscallNumber::RequestMemory, [u64::MAX, 0, 0]),
            (SyscallNumber::RequestMemory, [u64::MAX - 100, 0, 0]),
            (SyscallNumber::RequestMessageBuffer, [u64::MAX, target, 0]),
            (SyscallNumber::GetPhysicalMemory, [0x1001, u64::MAX, 0]),
            (SyscallNumber::GetPhysicalMemory, [0x1000, u64::MAX, 0]),
            (SyscallNumber::CreateThread, [0x40_3000, 0u64.wrapping_sub(64), 0]),
            (SyscallNumber::CreateThread, [0x40_3000, 0, u64::MAX]),
        ] {
            let mut frame = sync_call(command as u64, [a, b, c, 0, 0, 0]);
            h.trap(&mut frame);
            assert_eq!(errno(frame.rax), -22, "{:?} {:x} {:x}", command, a, b);
        }
        assert_eq!(h.memory.lock().allocated_pages, pages);
    }

    #[test]
    fn test_failed_mapping_releases_requested_memory() {
        let (mut h, _) = client();
        let (allocated, freed, physical) = {
            let mut memory = h.memory.lock();
            memory.fail_mappings = true;
            (memory.allocated_pages, memory.freed_pages, memory.physical_in_use)
        };

        let mut frame = sync_call(SyscallNumber::RequestMemory as u64, [3 * 4096, 0, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::IoError.as_errno());

        let mut frame = sync_call(SyscallNumber::GetPhysicalMemory as u64, [0xb8000, 4096, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::IoError.as_errno());

        let memory = h.memory.lock();
        assert_eq!(memory.allocated_pages - allocated, 4);
        assert_eq!(memory.freed_pages - freed, 4);
        assert_eq!(memory.physical_in_use, physical);
    }

    #[test]
    fn test_failed_sharing_releases_message_buffer() {
        let (mut h, thread) = client();
        let caller = h.kernel.scheduler.thread(thread).unwrap().process;
        let target = h.user_process("/target");
        let tables = [caller, target].map(|id| h.kernel.processes.get(id).unwrap().page_table);
        let (allocated, freed, mapped) = {
            let mut memory = h.memory.lock();
            memory.fail_mappings = true;
            let mapped = tables.map(|table| memory.tables[table].len());
            (memory.allocated_pages, memory.freed_pages, mapped)
        };

        let mut frame = sync_call(
            SyscallNumber::RequestMessageBuffer as u64,
            [2 * 4096, target as u64, 0, 0, 0, 0],
        );
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::IoError.as_errno());

        let memory = h.memory.lock();
        assert_eq!(memory.allocated_pages - allocated, 2);
        assert_eq!(memory.freed_pages - freed, 2);
        assert_eq!(tables.map(|table| memory.tables[table].len()), mapped);
        drop(memory);
        assert!(h.kernel.processes.get(caller).unwrap().global_allocations.is_empty());
    }

    #[test]
    fn test_message_buffer_is_shared_with_target() {
        let (mut h, thread) = client();
        let caller = h.kernel.scheduler.thread(thread).unwrap().process;
        let target = h.user_process("/target");
        let tables = [caller, target].map(|id| h.kernel.processes.get(id).unwrap().page_table);

        let mut frame = sync_call(
            SyscallNumber::RequestMessageBuffer as u64,
            [100, target as u64, 0, 0, 0, 0],
        );
        h.trap(&mut frame);

        let address = frame.rax;
        let [a, b] = tables.map(|table| h.kernel.page_tables.translate(table, address));
        assert!(a.is_some());
        assert_eq!(a, b);
        let allocations = &h.kernel.processes.get(caller).unwrap().global_allocations;
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].target, target);
    }

    #[test]
    #[should_panic(expected = "undefined system call 999")]
    fn test_unregistered_command_is_fatal() {
        let (mut h, _) = client();
        h.trap(&mut sync_call(999, [0; 6]));
    }

    #[test]
    fn test_command_number_uses_low_bits() {
        let (mut h, thread) = client();
        let mut frame = sync_call(
            (1 << 10) | SyscallNumber::GetCurrentThreadId as u64,
            [0; 6],
        );
        h.trap(&mut frame);
        assert_eq!(frame.rax, thread as u64);
    }

    #[test]
    fn test_process_lookup_by_name() {
        let (mut h, _) = client();
        let server = h.user_process("/services/disk");
        let found = CString::new("/services/disk").unwrap();
        let missing = CString::new("/services/none").unwrap();

        let mut frame = sync_call(
            SyscallNumber::GetProcessByName as u64,
            [found.as_ptr() as u64, 0, 0, 0, 0, 0],
        );
        h.trap(&mut frame);
        assert_eq!(frame.rax, server as u64);

        let mut frame = sync_call(
            SyscallNumber::GetProcessByName as u64,
            [missing.as_ptr() as u64, 0, 0, 0, 0, 0],
        );
        h.trap(&mut frame);
        assert_eq!(frame.rax, u64::MAX);
    }

    #[test]
    fn test_debug_output() {
        let (mut h, _) = client();
        let text = CString::new("hello").unwrap();

        let mut frame = sync_call(
            SyscallNumber::WriteDebugMessage as u64,
            [text.as_ptr() as u64, 0, 0, 0, 0, 0],
        );
        h.trap(&mut frame);
        assert_eq!(frame.rax, 5);

        h.trap(&mut sync_call(SyscallNumber::WriteDebugChar as u64, [b'!' as u64, 0, 0, 0, 0, 0]));
        assert_eq!(h.cpu.lock().debug_output, b"hello\n!".to_vec());

        let mut frame = sync_call(SyscallNumber::WriteDebugChar as u64, [0x1ff, 0, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), -22);
    }

    #[test]
    fn test_debug_command_still_returns_result() {
        let (mut h, thread) = client();
        let command = SyscallNumber::GetCurrentThreadId.id();
        h.kernel.commands.set_debug(command, true);
        assert!(h.kernel.commands.get(command).unwrap().debug);

        let mut frame = sync_call(command as u64, [0; 6]);
        h.trap(&mut frame);
        assert_eq!(frame.rax, thread as u64);

        h.kernel.commands.set_debug(command, false);
        h.kernel.commands.set_debug(999, true);
        assert!(!h.kernel.commands.get(command).unwrap().debug);
        assert!(h.kernel.commands.get(999).is_none());
    }

    #[test]
    fn test_kernel_commands_cannot_be_taken_over() {
        let (mut h, _) = client();
        let mut frame = sync_call(
            SyscallNumber::RegisterService as u64,
            [SyscallNumber::RequestMemory as u64, 0, 0, 0, 0, 0],
        );
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), -22);

        let mut frame = sync_call(SyscallNumber::RegisterService as u64, [600, 0, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(frame.rax, 0);
        let owner = h.kernel.commands.owner(600);
        assert_eq!(owner, Some(h.kernel.current_process()));
    }

    #[test]
    fn test_sleep_switches_and_resumes_with_result() {
        let (mut h, thread) = client();
        let process = h.kernel.scheduler.thread(thread).unwrap().process;
        let other = h.spawn(process, 0x40_2000);

        let mut frame = sync_call(SyscallNumber::ThreadSleep as u64, [2, 0, 0, 0, 0, 0]);
        frame.rip = 0x40_0100;
        h.trap(&mut frame);
        assert_eq!(h.kernel.scheduler.current_id(), Some(other));
        assert_eq!(frame.rip, 0x40_2000);

        let mut frame = RegisterSnapshot::for_vector(32);
        h.trap(&mut frame);
        assert_eq!(h.kernel.scheduler.current_id(), Some(other));

        let mut frame = RegisterSnapshot::for_vector(32);
        h.trap(&mut frame);
        assert_eq!(h.kernel.scheduler.current_id(), Some(thread));
        assert_eq!(frame.rip, 0x40_0100);
        assert_eq!(frame.rax, 0);
    }

    #[test]
    fn test_priority_is_read_as_signed() {
        let (mut h, thread) = client();
        let mut frame = syscall_frame(
            ACTION_VECTOR,
            SyscallNumber::SetThreadPriority as u64,
            [(-3i64) as u64, 0, 0, 0, 0, 0],
        );
        h.trap(&mut frame);
        assert_eq!(frame.rax, 0);
        assert_eq!(h.kernel.scheduler.thread(thread).unwrap().priority, -3);
    }

    #[test]
    fn test_thread_lifecycle_through_commands() {
        let (mut h, _) = client();
        let mut frame = sync_call(SyscallNumber::CreateThread as u64, [0x40_3000, 32, 0, 0, 0, 0]);
        h.trap(&mut frame);
        let created = frame.rax as ThreadId;
        assert_eq!(
            h.kernel.scheduler.thread(created).unwrap().status,
            ThreadStatus::Created
        );

        h.trap(&mut sync_call(SyscallNumber::StartThread as u64, [created as u64, 0, 0, 0, 0, 0]));
        assert_eq!(
            h.kernel.scheduler.thread(created).unwrap().status,
            ThreadStatus::Ready
        );

        let mut frame = sync_call(SyscallNumber::KillThread as u64, [0, 0, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::PermissionDenied.as_errno());

        let mut frame = sync_call(SyscallNumber::KillThread as u64, [200, 0, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::NoSuchThread.as_errno());

        h.trap(&mut sync_call(SyscallNumber::KillThread as u64, [created as u64, 0, 0, 0, 0, 0]));
        assert_eq!(
            h.kernel.scheduler.thread(created).unwrap().status,
            ThreadStatus::Terminated
        );
    }

    #[test]
    fn test_system_processes_cannot_be_killed() {
        let (mut h, _) = client();
        let system = h.kernel.processes.system();
        let mut frame = sync_call(SyscallNumber::KillProcess as u64, [system as u64, 0, 0, 0, 0, 0]);
        h.trap(&mut frame);
        assert_eq!(errno(frame.rax), SyscallError::PermissionDenied.as_errno());
    }

    #[test]
    fn test_errno_words() {
        assert_eq!(SyscallError::NoMemory.as_word(), (-12i64) as u64);
        assert_eq!(
            SyscallError::from(KernelError::ServiceUnavailable(3)),
            SyscallError::ServiceUnavailable
        );
    }
}

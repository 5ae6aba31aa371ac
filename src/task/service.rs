//! Service up-call bridge.
//!
//! A process that owns a command or an IRQ is reached by spawning a fresh
//! thread in it at the service's dispatch entry. The request travels as a
//! [`SystemMessage`] copied into the new thread's argument area. A
//! synchronous caller is parked in `Waiting` until the callee issues
//! `ServiceReturn`; an asynchronous caller stays runnable.
//!
//! There is no timeout: a callee that never returns leaves its caller
//! waiting for good.

use core::mem::size_of;

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::syscalls::message::{CallingType, SyscallContext, SystemMessage};
use crate::task::thread::ThreadStartOptions;
use crate::task::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    NotInitialized,
    Ready,
}

impl ServiceStatus {
    pub fn from_word(word: u64) -> Option<Self> {
        match word {
            0 => Some(Self::NotInitialized),
            1 => Some(Self::Ready),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    pub process: ProcessId,
    pub status: ServiceStatus,
    /// Routine every up-call thread starts at; set by the loader.
    pub dispatch_entry: Option<u64>,
}

impl Service {
    pub fn new(process: ProcessId) -> Self {
        Self {
            process,
            status: ServiceStatus::NotInitialized,
            dispatch_entry: None,
        }
    }
}

impl Kernel {
    pub fn init_service(&mut self, process: ProcessId, dispatch_entry: u64) -> Result<(), KernelError> {
        let service = self
            .processes
            .get_mut(process)
            .ok_or(KernelError::UnknownProcess(process))?
            .service
            .as_mut()
            .ok_or(KernelError::ServiceUnavailable(process))?;
        service.dispatch_entry = Some(dispatch_entry);
        Ok(())
    }

    pub fn set_service_status(
        &mut self,
        process: ProcessId,
        status: ServiceStatus,
    ) -> Result<(), KernelError> {
        let service = self
            .processes
            .get_mut(process)
            .ok_or(KernelError::UnknownProcess(process))?
            .service
            .as_mut()
            .ok_or(KernelError::ServiceUnavailable(process))?;
        service.status = status;
        Ok(())
    }

    /// Hand `message` to the service of `process` on a new thread and switch
    /// to it. The current thread's state must already be saved.
    pub fn call_service(
        &mut self,
        process: ProcessId,
        context: &SyscallContext,
        message: &SystemMessage,
    ) -> Result<u64, KernelError> {
        let entry = self
            .processes
            .get(process)
            .ok_or(KernelError::UnknownProcess(process))?
            .service
            .and_then(|service| service.dispatch_entry)
            .ok_or(KernelError::ServiceUnavailable(process))?;

        let mut options = ThreadStartOptions::new(entry);
        options.argument_buffer_size = size_of::<SystemMessage>() as u64;
        options.debug_name = "ServiceCall";
        let callee = self.create_thread(process, options)?;

        let thread = self
            .scheduler
            .thread_mut(callee)
            .ok_or(KernelError::UnknownThread(callee))?;
        thread.debug_message = Some(*message);
        let arguments = thread.argument_address();
        unsafe { core::ptr::write_unaligned(arguments as *mut SystemMessage, *message) };

        if context.calling_type == CallingType::Sync {
            if let Some(caller) = context.caller {
                self.scheduler.link_call(caller, callee);
            }
        }

        self.start_thread(callee)?;
        self.scheduler.switch_to_thread(callee);
        Ok(0)
    }

    /// Finish the current up-call with `value`. The waiting caller, if any,
    /// resumes with `value` in its accumulator.
    pub fn service_return(&mut self, value: u64) {
        let callee = match self.scheduler.current_id() {
            Some(id) => id,
            None => {
                self.scheduler.schedule_next();
                return;
            }
        };
        let parent = self.scheduler.thread(callee).and_then(|thread| thread.parent);

        self.scheduler.terminate_thread(callee);
        match parent {
            Some(parent) => {
                self.scheduler.unlink_call(parent, callee);
                self.scheduler.set_return_value(parent, value);
                self.scheduler.switch_to_thread(parent);
            }
            None => {
                self.scheduler.schedule_next();
            }
        }
    }
}

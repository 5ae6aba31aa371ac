//! Command table: one slot per command id.

use alloc::vec::Vec;

use crate::kernel::Kernel;
use crate::syscalls::dispatcher::SyscallResult;
use crate::syscalls::message::{SyscallContext, SystemMessage};
use crate::syscalls::numbers::{SyscallNumber, COMMAND_COUNT, COMMAND_MASK};
use crate::task::ProcessId;

/// Kernel-side implementation of a command.
pub type SyscallHandler = fn(&mut Kernel, &SyscallContext, &SystemMessage) -> SyscallResult;

#[derive(Debug, Clone, Copy)]
pub enum CommandHandler {
    Kernel(SyscallHandler),
    /// Delivered to the service of the owning process.
    Service(ProcessId),
}

#[derive(Debug, Clone, Copy)]
pub struct CommandRegistration {
    pub command: u32,
    pub handler: CommandHandler,
    /// Dump scheduler and process state before each call.
    pub debug: bool,
}

impl CommandRegistration {
    pub fn owner(&self) -> Option<ProcessId> {
        match self.handler {
            CommandHandler::Service(process) => Some(process),
            CommandHandler::Kernel(_) => None,
        }
    }
}

pub struct CommandTable {
    entries: Vec<Option<CommandRegistration>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            entries: (0..COMMAND_COUNT).map(|_| None).collect(),
        }
    }

    fn slot(command: u32) -> usize {
        (command as u64 & COMMAND_MASK) as usize
    }

    pub fn register(&mut self, command: SyscallNumber, handler: SyscallHandler) {
        let id = command.id();
        self.entries[Self::slot(id)] = Some(CommandRegistration {
            command: id,
            handler: CommandHandler::Kernel(handler),
            debug: false,
        });
    }

    /// Bind `command` to the service of `process`, replacing any binding.
    pub fn register_service(&mut self, command: u32, process: ProcessId) {
        self.entries[Self::slot(command)] = Some(CommandRegistration {
            command,
            handler: CommandHandler::Service(process),
            debug: false,
        });
    }

    pub fn set_debug(&mut self, command: u32, debug: bool) {
        if let Some(entry) = self.entries[Self::slot(command)].as_mut() {
            entry.debug = debug;
        }
    }

    pub fn get(&self, command: u32) -> Option<&CommandRegistration> {
        self.entries[Self::slot(command)].as_ref()
    }

    pub fn owner(&self, command: u32) -> Option<ProcessId> {
        self.get(command).and_then(CommandRegistration::owner)
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

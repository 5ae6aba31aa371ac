//! The six-word message that carries a system call across the boundary.

use crate::interrupts::frame::RegisterSnapshot;
use crate::syscalls::numbers::COMMAND_MASK;
use crate::task::ThreadId;

/// Target plus six argument words, decoded from RAX and RBX, RCX, RDX,
/// RSI, RDI, RBP. Up-call threads receive a copy in their argument area.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemMessage {
    pub target: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
    pub arg6: u64,
}

impl SystemMessage {
    pub fn new(target: u64, args: [u64; 6]) -> Self {
        let [arg1, arg2, arg3, arg4, arg5, arg6] = args;
        Self {
            target,
            arg1,
            arg2,
            arg3,
            arg4,
            arg5,
            arg6,
        }
    }

    pub fn from_frame(frame: &RegisterSnapshot) -> Self {
        Self::new(
            frame.rax,
            [frame.rbx, frame.rcx, frame.rdx, frame.rsi, frame.rdi, frame.rbp],
        )
    }

    /// Index into the command table.
    pub fn command(&self) -> u32 {
        (self.target & COMMAND_MASK) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingType {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy)]
pub struct SyscallContext {
    pub calling_type: CallingType,
    /// Thread that trapped; absent before the scheduler runs a thread.
    pub caller: Option<ThreadId>,
    pub debug: bool,
}

impl SyscallContext {
    pub fn new(calling_type: CallingType, caller: Option<ThreadId>) -> Self {
        Self {
            calling_type,
            caller,
            debug: false,
        }
    }
}

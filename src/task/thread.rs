//! Thread records.
//!
//! A [`Thread`] owns the saved register snapshot of a suspended execution
//! context together with everything needed to resume it: the owning
//! process (for the address space), the data selector, the privileged
//! stack and the thread-storage base.

use crate::interrupts::frame::RegisterSnapshot;
use crate::memory::align_down;
use crate::syscalls::message::SystemMessage;
use crate::task::{ProcessId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Free slot.
    Empty,
    Created,
    /// Started but never run; the initial snapshot is authoritative.
    Ready,
    Running,
    /// Blocked on a synchronous call until the callee returns.
    Waiting,
    Sleeping { until: u64 },
    Terminated,
}

/// A contiguous stack allocation. `size` is in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackRegion {
    pub base: u64,
    pub size: u64,
}

impl StackRegion {
    pub fn top(&self) -> u64 {
        self.base + self.size
    }

    pub fn is_allocated(&self) -> bool {
        self.size != 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThreadStartOptions {
    pub entry: u64,
    /// Bytes reserved at the top of the stack for start arguments.
    pub argument_buffer_size: u64,
    /// Stack size in bytes; the configured default when `None`.
    pub stack_size: Option<u64>,
    /// Pushed as the return address of the entry routine.
    pub return_address: u64,
    pub allow_user_mode_io: bool,
    pub debug: bool,
    pub debug_name: &'static str,
}

impl ThreadStartOptions {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            argument_buffer_size: 0,
            stack_size: None,
            return_address: 0,
            allow_user_mode_io: false,
            debug: false,
            debug_name: "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Thread {
    pub id: ThreadId,
    pub process: ProcessId,
    pub status: ThreadStatus,
    pub state: RegisterSnapshot,
    /// Negative: extra ticks on the CPU. Positive: selections passed over.
    pub priority: i32,
    pub(crate) priority_counter: i32,
    pub parent: Option<ThreadId>,
    pub child: Option<ThreadId>,
    pub storage_base: u64,
    pub user: bool,
    pub data_selector: u16,
    pub stack: StackRegion,
    pub kernel_stack: StackRegion,
    pub argument_buffer_size: u64,
    pub debug: bool,
    pub debug_name: &'static str,
    /// Last message delivered through the up-call bridge.
    pub debug_message: Option<SystemMessage>,
    /// Number of times the thread was switched to.
    pub ticks: u64,
}

impl Thread {
    pub fn empty(id: ThreadId) -> Self {
        Self {
            id,
            process: 0,
            status: ThreadStatus::Empty,
            state: RegisterSnapshot::default(),
            priority: 0,
            priority_counter: 0,
            parent: None,
            child: None,
            storage_base: 0,
            user: false,
            data_selector: 0,
            stack: StackRegion::default(),
            kernel_stack: StackRegion::default(),
            argument_buffer_size: 0,
            debug: false,
            debug_name: "",
            debug_message: None,
            ticks: 0,
        }
    }

    /// Has saved or initial state the scheduler may resume.
    pub fn is_runnable(&self) -> bool {
        matches!(self.status, ThreadStatus::Running | ThreadStatus::Ready)
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.status, ThreadStatus::Empty | ThreadStatus::Terminated)
    }

    /// Base of the argument area at the top of the stack, 16-byte aligned.
    pub fn argument_address(&self) -> u64 {
        align_down(self.stack.top() - self.argument_buffer_size, 16)
    }
}

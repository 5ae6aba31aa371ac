//! Threads, processes and the scheduler.

pub mod process;
pub mod scheduler;
pub mod service;
pub mod thread;

/// Slot index in the thread table.
pub type ThreadId = usize;
pub type ProcessId = u32;

pub use process::{Process, ProcessManager, ProcessRunState};
pub use scheduler::{Scheduler, IDLE_THREAD};
pub use service::{Service, ServiceStatus};
pub use thread::{Thread, ThreadStartOptions, ThreadStatus};

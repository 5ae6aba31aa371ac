//! Kernel tunables.
//!
//! A [`KernelConfig`] is handed to [`Kernel::new`](crate::Kernel::new) and
//! stays fixed for the lifetime of the kernel. Values that belong to the
//! hardware contract (vector numbers, selectors, PIC offsets) are constants
//! next to the code that owns them, not configuration.

use log::LevelFilter;

use crate::memory::PAGE_SIZE;

/// Which trace categories are emitted through the `log` facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    /// Log every thread switch performed by the scheduler.
    pub task_switch: bool,
    /// Level used for thread create / start / terminate records.
    pub threads: LevelFilter,
    /// Trace every system call with its decoded arguments.
    pub syscalls: bool,
    /// Trace every vector flagged for tracing.
    pub interrupts: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            task_switch: false,
            threads: LevelFilter::Info,
            syscalls: false,
            interrupts: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of slots in the thread table, including the idle slot 0.
    pub thread_capacity: usize,
    /// Stack size for threads that do not request one, in bytes.
    pub default_stack_size: u64,
    /// Privileged stack loaded into the TSS while a thread runs, in bytes.
    pub kernel_stack_size: u64,
    /// User threads run with IOPL 3 and may touch I/O ports directly.
    pub allow_user_mode_io: bool,
    /// Stack padding below the argument area, in bytes.
    pub stack_debug_padding: u64,
    pub log: LogConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            thread_capacity: 256,
            default_stack_size: 0x4000,
            kernel_stack_size: 4 * PAGE_SIZE,
            allow_user_mode_io: true,
            stack_debug_padding: 8,
            log: LogConfig::default(),
        }
    }
}

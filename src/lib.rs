//! # trapcore
//!
//! Privileged trap core for a preemptible x86_64 kernel: every hardware
//! interrupt, CPU exception and software system call enters through
//! [`Kernel::dispatch_interrupt`], is routed through the interrupt vector
//! table, and may hand the CPU to another thread or up-call a user-mode
//! service before the trap returns.
//!
//! ## Layout
//!
//! | Module               | Responsibility                                   |
//! |----------------------|--------------------------------------------------|
//! | `interrupts`         | register frame, vector table, dispatcher, PIC    |
//! | `kernel`             | kernel singleton, init phases, component status  |
//! | `syscalls`           | command table, register decode, kernel handlers  |
//! | `task`               | threads, scheduler, processes, service up-calls  |
//! | `memory`             | page-table and page-allocator collaborator traits|
//! | `platform`           | CPU register plumbing (CR3, CR2, segments, TSS)  |
//!
//! Hardware access is confined to `target_os = "none"` builds; everything
//! else runs under the host test harness against recording fakes.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use spin::Mutex;
use uart_16550::SerialPort;

pub mod config;
pub mod error;
pub mod interrupts;
pub mod kernel;
pub mod logger;
pub mod memory;
pub mod panic;
pub mod platform;
pub mod syscalls;
pub mod task;

#[cfg(test)]
mod testing;

pub use crate::config::KernelConfig;
pub use crate::interrupts::frame::RegisterSnapshot;
pub use crate::kernel::{with_kernel, Kernel, KERNEL};
pub use crate::error::{Fault, KernelError};

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(0x3F8) });

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut serial = $crate::SERIAL.lock();
        let _ = writeln!(serial, $($arg)*);
    }};
}

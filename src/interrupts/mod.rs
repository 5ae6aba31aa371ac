//! # Interrupt Handling Module
//!
//! - **frame**: the register snapshot every trap builds
//! - **table**: per-vector handlers, flags and gate attributes
//! - **dispatcher**: the single entry point for every trap
//! - **handlers**: exceptions, clock, terminate-current, service IRQs
//! - **pic**: 8259 end-of-interrupt
//! - **gdt**: selectors, GDT and TSS
//! - **stubs**: per-vector entry code (bare metal only)
//!
//! ## Interrupt Vector Layout
//!
//! | Vector | Type                   |
//! |--------|------------------------|
//! | 0-31   | CPU exceptions         |
//! | 32-47  | PIC lines (32 = clock) |
//! | 250    | synchronous syscall    |
//! | 251    | asynchronous syscall   |
//! | 254    | terminate current      |

pub mod dispatcher;
pub mod frame;
pub mod gdt;
pub mod handlers;
pub mod pic;
#[cfg(target_os = "none")]
pub mod stubs;
pub mod table;

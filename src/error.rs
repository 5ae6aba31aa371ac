//! Error types.
//!
//! [`KernelError`] covers failures a caller can recover from (a full thread
//! table, an unknown id, an exhausted pool). [`Fault`] names conditions that
//! halt the machine; they are never returned, only passed to
//! [`fatal`](crate::panic::fatal).

use core::fmt;

use crate::task::{ProcessId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    NoFreeThreadSlot,
    UnknownThread(ThreadId),
    UnknownProcess(ProcessId),
    /// The process exists but has no service or no dispatch entry.
    ServiceUnavailable(ProcessId),
    OutOfMemory,
    /// The page-table collaborator rejected a map or unmap.
    MappingFailed(u64),
    InvalidArgument,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NoFreeThreadSlot => write!(f, "thread table is full"),
            KernelError::UnknownThread(id) => write!(f, "no thread with id {}", id),
            KernelError::UnknownProcess(id) => write!(f, "no process with id {}", id),
            KernelError::ServiceUnavailable(id) => {
                write!(f, "process {} does not serve requests", id)
            }
            KernelError::OutOfMemory => write!(f, "out of memory"),
            KernelError::MappingFailed(addr) => write!(f, "cannot map address {:#x}", addr),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

/// How a page fault was classified before it was declared fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultKind {
    NullPointer,
    /// Non-canonical or above the user half of the address space.
    OutOfRange,
    NotMapped,
}

impl fmt::Display for PageFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFaultKind::NullPointer => write!(f, "null pointer dereference"),
            PageFaultKind::OutOfRange => write!(f, "access above user space"),
            PageFaultKind::NotMapped => write!(f, "address not mapped"),
        }
    }
}

/// Unrecoverable kernel conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    CpuException { vector: u8, name: &'static str },
    PageFault(PageFaultKind),
    InvalidVector(u64),
    MissingHandler(u8),
    UndefinedSyscall(u32),
    PageTableInvariant(&'static str),
    /// A thread already waiting on a callee issued a second synchronous call.
    CallCardinality(ThreadId),
    NestedTrap,
    UnflushedVectorTable,
    SchedulerInvariant(&'static str),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::CpuException { vector, name } => {
                write!(f, "cpu exception {}: {}", vector, name)
            }
            Fault::PageFault(kind) => write!(f, "page fault: {}", kind),
            Fault::InvalidVector(vector) => write!(f, "invalid interrupt vector {}", vector),
            Fault::MissingHandler(vector) => write!(f, "no handler for vector {}", vector),
            Fault::UndefinedSyscall(command) => write!(f, "undefined system call {}", command),
            Fault::PageTableInvariant(what) => write!(f, "page table invariant: {}", what),
            Fault::CallCardinality(thread) => {
                write!(f, "thread {} already has a pending call", thread)
            }
            Fault::NestedTrap => write!(f, "trap while the dispatcher is active"),
            Fault::UnflushedVectorTable => {
                write!(f, "interrupts enabled with unflushed vector table")
            }
            Fault::SchedulerInvariant(what) => write!(f, "scheduler invariant: {}", what),
        }
    }
}

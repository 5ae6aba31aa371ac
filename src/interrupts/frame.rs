//! Register-context snapshot.
//!
//! The entry stubs build this record on the interrupted stack, so the field
//! order is part of the ABI: general registers in reverse push order, the
//! vector number and error code pushed by the stub, then the hardware
//! `iretq` frame. The stubs in `stubs.rs` and the offset constants below
//! must move together.

use core::mem::{offset_of, size_of};

/// Interrupt-enable flag.
pub const RFLAGS_IF: u64 = 1 << 9;
/// Bit 1 of RFLAGS always reads as one.
pub const RFLAGS_RESERVED: u64 = 1 << 1;
/// I/O privilege level 3.
pub const RFLAGS_IOPL3: u64 = 3 << 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub interrupt: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

pub const FRAME_SIZE: usize = 22 * 8;
pub const OFFSET_RAX: usize = 14 * 8;
pub const OFFSET_INTERRUPT: usize = 15 * 8;
pub const OFFSET_ERROR_CODE: usize = 16 * 8;
pub const OFFSET_RIP: usize = 17 * 8;

const _: () = assert!(size_of::<RegisterSnapshot>() == FRAME_SIZE);
const _: () = assert!(FRAME_SIZE % 16 == 0);
const _: () = assert!(offset_of!(RegisterSnapshot, rax) == OFFSET_RAX);
const _: () = assert!(offset_of!(RegisterSnapshot, interrupt) == OFFSET_INTERRUPT);
const _: () = assert!(offset_of!(RegisterSnapshot, error_code) == OFFSET_ERROR_CODE);
const _: () = assert!(offset_of!(RegisterSnapshot, rip) == OFFSET_RIP);
const _: () = assert!(offset_of!(RegisterSnapshot, ss) == FRAME_SIZE - 8);

impl RegisterSnapshot {
    /// Snapshot for a trap on `vector`, as the stubs would build it.
    pub fn for_vector(vector: u8) -> Self {
        Self {
            interrupt: vector as u64,
            rflags: RFLAGS_RESERVED,
            ..Self::default()
        }
    }

    pub fn vector(&self) -> u64 {
        self.interrupt
    }

    /// The trapped code ran at privilege level 3.
    pub fn from_user_mode(&self) -> bool {
        self.cs & 3 == 3
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.rflags & RFLAGS_IF != 0
    }
}

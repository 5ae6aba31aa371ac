//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! IRQ 0-15 are remapped past the CPU exception range:
//! - PIC 1: vectors 32-39 (IRQ 0-7)
//! - PIC 2: vectors 40-47 (IRQ 8-15)
//!
//! A line routed through the slave needs an end-of-interrupt on both chips,
//! slave first. Vectors outside the remapped window never reached the
//! controller and are not acknowledged.

use pic8259::ChainedPics;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = 40;
const PIC_LINES: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Clock = PIC_1_OFFSET,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Which chips must see an end-of-interrupt for a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EoiTarget {
    None,
    Master,
    SlaveThenMaster,
}

pub fn eoi_target(vector: u8) -> EoiTarget {
    if (PIC_2_OFFSET..PIC_2_OFFSET + PIC_LINES).contains(&vector) {
        EoiTarget::SlaveThenMaster
    } else if (PIC_1_OFFSET..PIC_1_OFFSET + PIC_LINES).contains(&vector) {
        EoiTarget::Master
    } else {
        EoiTarget::None
    }
}

/// Acknowledgement side of the interrupt controller, as seen by the
/// dispatcher.
pub trait InterruptController {
    /// Remap the lines and unmask them.
    fn setup(&mut self);
    /// Acknowledge `vector`. Called exactly once per dispatched trap.
    fn send_end_of_interrupt(&mut self, vector: u8);
}

/// The chained 8259 pair found on every PC.
pub struct LegacyPic {
    pics: ChainedPics,
}

impl LegacyPic {
    /// # Safety
    ///
    /// The caller must own the PIC I/O ports; only one instance may exist.
    pub const unsafe fn new() -> Self {
        Self {
            pics: ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET),
        }
    }
}

impl InterruptController for LegacyPic {
    fn setup(&mut self) {
        unsafe {
            self.pics.initialize();
            self.pics.write_masks(0, 0);
        }
    }

    fn send_end_of_interrupt(&mut self, vector: u8) {
        // ChainedPics sends slave-then-master itself for the upper window.
        if eoi_target(vector) != EoiTarget::None {
            unsafe { self.pics.notify_end_of_interrupt(vector) };
        }
    }
}

//! CPU plumbing the dispatcher needs but must not touch directly.
//!
//! Everything here is a register or descriptor-table write. The dispatcher
//! and scheduler talk to a [`Platform`] so the trap path runs unchanged
//! under the host test harness, where a recording fake stands in.

/// One entry of the hardware-visible vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    /// Lowest privilege level allowed to raise the vector with `int`.
    pub privilege: u8,
    /// Interrupt stack table slot, if the vector runs on a dedicated stack.
    pub stack_index: Option<u16>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            privilege: 0,
            stack_index: None,
        }
    }
}

pub trait Platform {
    /// Load the kernel data selector into the data segment registers.
    fn load_kernel_segments(&mut self);
    fn load_data_selector(&mut self, selector: u16);

    fn page_table_root(&self) -> u64;
    /// Activate an address space. Writing the active root again is allowed.
    fn set_page_table_root(&mut self, root: u64);

    /// Address of the last page fault (CR2).
    fn fault_address(&self) -> u64;

    fn thread_storage_base(&self) -> u64;
    fn set_thread_storage_base(&mut self, base: u64);

    /// Privileged stack used when a user-mode thread traps.
    fn set_kernel_stack(&mut self, top: u64);

    /// Commit all 256 gates to the table the CPU reads.
    fn load_vector_table(&mut self, gates: &[Gate; 256]);

    /// Raw bytes for the debug console.
    fn write_debug(&mut self, bytes: &[u8]);
}

#[cfg(target_os = "none")]
pub use self::hw::X86Platform;

#[cfg(target_os = "none")]
mod hw {
    use core::mem::size_of;
    use core::ptr::addr_of;

    use x86_64::instructions::segmentation::{Segment, DS, ES};
    use x86_64::instructions::tables::lidt;
    use x86_64::registers::control::{Cr2, Cr3, Cr3Flags};
    use x86_64::registers::model_specific::FsBase;
    use x86_64::structures::gdt::SegmentSelector;
    use x86_64::structures::paging::PhysFrame;
    use x86_64::structures::DescriptorTablePointer;
    use x86_64::{PhysAddr, VirtAddr};

    use super::{Gate, Platform};
    use crate::interrupts::gdt::{self, KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};

    extern "C" {
        static trap_stub_table: [u64; 256];
    }

    #[repr(C, packed)]
    #[derive(Clone, Copy)]
    struct RawGate {
        offset_low: u16,
        selector: u16,
        ist: u8,
        type_attr: u8,
        offset_mid: u16,
        offset_high: u32,
        reserved: u32,
    }

    const PRESENT_INTERRUPT_GATE: u8 = 0x8E;

    static mut IDT: [RawGate; 256] = [RawGate {
        offset_low: 0,
        selector: 0,
        ist: 0,
        type_attr: 0,
        offset_mid: 0,
        offset_high: 0,
        reserved: 0,
    }; 256];

    impl RawGate {
        fn new(handler: u64, gate: &Gate) -> Self {
            Self {
                offset_low: handler as u16,
                selector: KERNEL_CODE_SELECTOR,
                ist: gate.stack_index.map_or(0, |index| index as u8 + 1),
                type_attr: PRESENT_INTERRUPT_GATE | ((gate.privilege & 3) << 5),
                offset_mid: (handler >> 16) as u16,
                offset_high: (handler >> 32) as u32,
                reserved: 0,
            }
        }
    }

    pub struct X86Platform;

    impl X86Platform {
        /// Load the GDT and TSS. Call once, before the first trap.
        pub fn new() -> Self {
            gdt::init();
            Self
        }
    }

    impl Platform for X86Platform {
        fn load_kernel_segments(&mut self) {
            self.load_data_selector(KERNEL_DATA_SELECTOR);
        }

        fn load_data_selector(&mut self, selector: u16) {
            unsafe {
                DS::set_reg(SegmentSelector(selector));
                ES::set_reg(SegmentSelector(selector));
            }
        }

        fn page_table_root(&self) -> u64 {
            let (frame, _) = Cr3::read();
            frame.start_address().as_u64()
        }

        fn set_page_table_root(&mut self, root: u64) {
            if self.page_table_root() == root {
                return;
            }
            let frame = PhysFrame::containing_address(PhysAddr::new(root));
            unsafe { Cr3::write(frame, Cr3Flags::empty()) };
        }

        fn fault_address(&self) -> u64 {
            Cr2::read_raw()
        }

        fn thread_storage_base(&self) -> u64 {
            FsBase::read().as_u64()
        }

        fn set_thread_storage_base(&mut self, base: u64) {
            FsBase::write(VirtAddr::new_truncate(base));
        }

        fn set_kernel_stack(&mut self, top: u64) {
            gdt::set_kernel_stack(top);
        }

        fn load_vector_table(&mut self, gates: &[Gate; 256]) {
            unsafe {
                let stubs = &*addr_of!(trap_stub_table);
                let table = &mut *core::ptr::addr_of_mut!(IDT);
                for (vector, gate) in gates.iter().enumerate() {
                    table[vector] = RawGate::new(stubs[vector], gate);
                }
                lidt(&DescriptorTablePointer {
                    limit: (size_of::<[RawGate; 256]>() - 1) as u16,
                    base: VirtAddr::new(addr_of!(IDT) as u64),
                });
            }
        }

        fn write_debug(&mut self, bytes: &[u8]) {
            let mut serial = crate::SERIAL.lock();
            for &byte in bytes {
                serial.send(byte);
            }
        }
    }
}

//! Segment selectors and the bare-metal GDT / TSS.
//!
//! The selector values are fixed by the descriptor order below; the
//! scheduler stamps them into fresh thread snapshots, so they are plain
//! constants available on every target.

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

#[cfg(target_os = "none")]
pub use self::hw::{init, set_kernel_stack};

#[cfg(target_os = "none")]
mod hw {
    use core::ptr::{addr_of, addr_of_mut};

    use spin::Lazy;
    use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
    use x86_64::instructions::tables::load_tss;
    use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
    use x86_64::structures::tss::TaskStateSegment;
    use x86_64::VirtAddr;

    use super::*;

    const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 4;

    static mut DOUBLE_FAULT_STACK: [u8; DOUBLE_FAULT_STACK_SIZE] = [0; DOUBLE_FAULT_STACK_SIZE];

    // RSP0 is rewritten on every thread switch.
    static mut TSS: TaskStateSegment = TaskStateSegment::new();

    struct Selectors {
        code: SegmentSelector,
        data: SegmentSelector,
        tss: SegmentSelector,
    }

    static GDT: Lazy<(GlobalDescriptorTable, Selectors)> = Lazy::new(|| {
        let mut gdt = GlobalDescriptorTable::new();

        let code = gdt.append(Descriptor::kernel_code_segment());
        let data = gdt.append(Descriptor::kernel_data_segment());
        let user_code = gdt.append(Descriptor::user_code_segment());
        let user_data = gdt.append(Descriptor::user_data_segment());
        let tss = gdt.append(Descriptor::tss_segment(unsafe { &*addr_of!(TSS) }));

        debug_assert_eq!(code.0, KERNEL_CODE_SELECTOR);
        debug_assert_eq!(data.0, KERNEL_DATA_SELECTOR);
        debug_assert_eq!(user_code.0, USER_CODE_SELECTOR);
        debug_assert_eq!(user_data.0, USER_DATA_SELECTOR);
        debug_assert_eq!(tss.0, TSS_SELECTOR);

        (gdt, Selectors { code, data, tss })
    });

    pub fn init() {
        unsafe {
            let stack_start = addr_of!(DOUBLE_FAULT_STACK) as u64;
            (*addr_of_mut!(TSS)).interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] =
                VirtAddr::new(stack_start + DOUBLE_FAULT_STACK_SIZE as u64);
        }

        let (ref gdt, ref selectors) = *GDT;
        gdt.load();

        unsafe {
            CS::set_reg(selectors.code);
            DS::set_reg(selectors.data);
            ES::set_reg(selectors.data);
            SS::set_reg(selectors.data);
            load_tss(selectors.tss);
        }
    }

    /// Stack the CPU switches to when a user thread traps.
    pub fn set_kernel_stack(top: u64) {
        unsafe {
            (*addr_of_mut!(TSS)).privilege_stack_table[0] = VirtAddr::new(top);
        }
    }
}

//! # Memory collaborators
//!
//! Page-frame allocation and page-table construction live outside the trap
//! core. The kernel consumes them through two traits:
//!
//! - [`PageTables`]: address-space handles, mapping and translation
//! - [`PageAllocator`]: physical regions and virtual page ranges by pool
//!
//! Table `0` ([`KERNEL_TABLE`]) is the kernel address space. It also holds
//! the interrupt control block the dispatcher switches to on entry.

use bitflags::bitflags;

use crate::error::KernelError;

pub const PAGE_SIZE: u64 = 4096;

/// Handle of an address space known to the [`PageTables`] collaborator.
pub type PageTableId = usize;

pub const KERNEL_TABLE: PageTableId = 0;

bitflags! {
    pub struct MapFlags: u32 {
        const WRITABLE = 1 << 0;
        const USER = 1 << 1;
        const EXECUTABLE = 1 << 2;
    }
}

/// Where a virtual page range is carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPool {
    /// Kernel-private, mapped in the kernel table on allocation.
    Kernel,
    /// Visible from every address space; used for message buffers.
    Global,
    /// Reserved in the given user table; the caller maps it.
    User(PageTableId),
}

pub trait PageTables {
    /// Fresh address space sharing the kernel's interrupt control block.
    fn create_table(&mut self) -> Result<PageTableId, KernelError>;
    /// Physical root (CR3 value) of `table`.
    fn root_address(&self, table: PageTableId) -> Option<u64>;
    fn map(
        &mut self,
        table: PageTableId,
        virt: u64,
        phys: u64,
        size: u64,
        flags: MapFlags,
    ) -> Result<(), KernelError>;
    /// Share `[virt, virt + size)` of `from` into `to` at the same address.
    fn map_copy(
        &mut self,
        from: PageTableId,
        to: PageTableId,
        virt: u64,
        size: u64,
    ) -> Result<(), KernelError>;
    fn unmap(&mut self, table: PageTableId, virt: u64, size: u64);
    fn translate(&self, table: PageTableId, virt: u64) -> Option<u64>;
    fn flush(&mut self, table: PageTableId);
}

pub trait PageAllocator {
    fn allocate_physical(&mut self, size: u64) -> Result<u64, KernelError>;
    fn free_physical(&mut self, addr: u64, size: u64);
    /// Reserve `pages` contiguous virtual pages from `pool`.
    fn allocate_pages(&mut self, pages: u64, pool: AddressPool) -> Result<u64, KernelError>;
    fn free_pages(&mut self, addr: u64, pages: u64, pool: AddressPool);
}

pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// [`align_up`] for untrusted sizes; `None` when rounding overflows.
pub const fn checked_align_up(value: u64, align: u64) -> Option<u64> {
    match value.checked_add(align - 1) {
        Some(sum) => Some(sum & !(align - 1)),
        None => None,
    }
}

pub const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

pub const fn pages_for(size: u64) -> u64 {
    align_up(size, PAGE_SIZE) / PAGE_SIZE
}

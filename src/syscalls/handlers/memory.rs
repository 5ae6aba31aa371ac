use crate::kernel::Kernel;
use crate::memory::{checked_align_up, AddressPool, MapFlags, KERNEL_TABLE, PAGE_SIZE};
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::message::{SyscallContext, SystemMessage};
use crate::task::process::GlobalAllocation;
use crate::task::ProcessId;

/// Page-rounded size of a user request; zero and overflow are rejected.
fn request_size(size: u64) -> Result<u64, SyscallError> {
    checked_align_up(size, PAGE_SIZE)
        .filter(|&size| size != 0)
        .ok_or(SyscallError::InvalidArgument)
}

fn caller_table(kernel: &Kernel) -> Result<(ProcessId, usize), SyscallError> {
    let process = kernel.current_process();
    let table = kernel
        .processes
        .get(process)
        .ok_or(SyscallError::NoSuchProcess)?
        .page_table;
    Ok((process, table))
}

/// arg1: size in bytes, rounded up to whole pages. Returns the address of
/// fresh memory mapped into the caller.
pub fn sys_request_memory(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let size = request_size(msg.arg1)?;
    let pages = size / PAGE_SIZE;
    let (_, table) = caller_table(kernel)?;

    let physical = kernel.allocator.allocate_physical(size)?;
    let virt = match kernel.allocator.allocate_pages(pages, AddressPool::User(table)) {
        Ok(virt) => virt,
        Err(e) => {
            kernel.allocator.free_physical(physical, size);
            return Err(e.into());
        }
    };
    if let Err(e) = kernel
        .page_tables
        .map(table, virt, physical, size, MapFlags::WRITABLE | MapFlags::USER)
    {
        kernel.allocator.free_pages(virt, pages, AddressPool::User(table));
        kernel.allocator.free_physical(physical, size);
        return Err(e.into());
    }
    kernel.page_tables.flush(table);
    Ok(virt)
}

/// arg1: size in bytes, arg2: target process. Pages visible to both the
/// caller and the target at the same address.
pub fn sys_request_message_buffer(
    kernel: &mut Kernel,
    _ctx: &SyscallContext,
    msg: &SystemMessage,
) -> SyscallResult {
    let size = request_size(msg.arg1)?;
    let target = msg.arg2 as ProcessId;
    let target_table = kernel
        .processes
        .get(target)
        .ok_or(SyscallError::NoSuchProcess)?
        .page_table;
    let (process, table) = caller_table(kernel)?;

    let pages = size / PAGE_SIZE;
    let virt = kernel.allocator.allocate_pages(pages, AddressPool::Global)?;
    let tables = [table, target_table];
    let shared = tables
        .iter()
        .filter(|&&to| to != KERNEL_TABLE)
        .try_for_each(|&to| kernel.page_tables.map_copy(KERNEL_TABLE, to, virt, size));
    for &to in tables.iter().filter(|&&to| to != KERNEL_TABLE) {
        if shared.is_err() {
            kernel.page_tables.unmap(to, virt, size);
        }
        kernel.page_tables.flush(to);
    }
    if let Err(e) = shared {
        kernel.allocator.free_pages(virt, pages, AddressPool::Global);
        return Err(e.into());
    }

    if let Some(proc) = kernel.processes.get_mut(process) {
        proc.global_allocations.push(GlobalAllocation {
            address: virt,
            pages,
            target,
        });
    }
    Ok(virt)
}

/// arg1: physical address, arg2: size. Maps a device or firmware region.
pub fn sys_get_physical_memory(kernel: &mut Kernel, _ctx: &SyscallContext, msg: &SystemMessage) -> SyscallResult {
    let physical = msg.arg1 & !(PAGE_SIZE - 1);
    let offset = msg.arg1 - physical;
    let size = request_size(msg.arg2.checked_add(offset).ok_or(SyscallError::InvalidArgument)?)?;
    let pages = size / PAGE_SIZE;
    let (_, table) = caller_table(kernel)?;

    let virt = kernel
        .allocator
        .allocate_pages(pages, AddressPool::User(table))?;
    if let Err(e) = kernel
        .page_tables
        .map(table, virt, physical, size, MapFlags::WRITABLE | MapFlags::USER)
    {
        kernel.allocator.free_pages(virt, pages, AddressPool::User(table));
        return Err(e.into());
    }
    kernel.page_tables.flush(table);
    Ok(virt + offset)
}

/// arg1: virtual address in the caller's space.
pub fn sys_translate_virtual_to_physical(
    kernel: &mut Kernel,
    _ctx: &SyscallContext,
    msg: &SystemMessage,
) -> SyscallResult {
    let (_, table) = caller_table(kernel)?;
    kernel
        .page_tables
        .translate(table, msg.arg1)
        .ok_or(SyscallError::InvalidArgument)
}

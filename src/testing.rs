//! Recording fakes for the hardware and memory collaborators.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::boxed::Box;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::vec::Vec;

use spin::Mutex;

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::interrupts::frame::RegisterSnapshot;
use crate::interrupts::pic::InterruptController;
use crate::kernel::Kernel;
use crate::memory::{AddressPool, MapFlags, PageAllocator, PageTableId, PageTables, KERNEL_TABLE, PAGE_SIZE};
use crate::platform::{Gate, Platform};
use crate::syscalls::numbers::FUNCTION_VECTOR;
use crate::task::{ProcessId, ThreadId, ThreadStartOptions};

/// CPU state as seen through the fakes.
#[derive(Default)]
pub struct Cpu {
    pub root: u64,
    pub data_selector: u16,
    pub kernel_stack: u64,
    pub storage_base: u64,
    pub fault_address: u64,
    pub eois: Vec<u8>,
    pub gates: Vec<Gate>,
    pub table_loads: usize,
    pub debug_output: Vec<u8>,
}

pub struct FakePlatform(pub Arc<Mutex<Cpu>>);

impl Platform for FakePlatform {
    fn load_kernel_segments(&mut self) {
        self.0.lock().data_selector = crate::interrupts::gdt::KERNEL_DATA_SELECTOR;
    }

    fn load_data_selector(&mut self, selector: u16) {
        self.0.lock().data_selector = selector;
    }

    fn page_table_root(&self) -> u64 {
        self.0.lock().root
    }

    fn set_page_table_root(&mut self, root: u64) {
        self.0.lock().root = root;
    }

    fn fault_address(&self) -> u64 {
        self.0.lock().fault_address
    }

    fn thread_storage_base(&self) -> u64 {
        self.0.lock().storage_base
    }

    fn set_thread_storage_base(&mut self, base: u64) {
        self.0.lock().storage_base = base;
    }

    fn set_kernel_stack(&mut self, top: u64) {
        self.0.lock().kernel_stack = top;
    }

    fn load_vector_table(&mut self, gates: &[Gate; 256]) {
        let mut cpu = self.0.lock();
        cpu.gates = gates.to_vec();
        cpu.table_loads += 1;
    }

    fn write_debug(&mut self, bytes: &[u8]) {
        self.0.lock().debug_output.extend_from_slice(bytes);
    }
}

pub struct FakeController(pub Arc<Mutex<Cpu>>);

impl InterruptController for FakeController {
    fn setup(&mut self) {}

    fn send_end_of_interrupt(&mut self, vector: u8) {
        self.0.lock().eois.push(vector);
    }
}

/// Page tables keyed by page, plus real heap memory behind the kernel and
/// global pools so the kernel can write argument areas.
#[derive(Default)]
pub struct Memory {
    pub tables: Vec<BTreeMap<u64, u64>>,
    next_physical: u64,
    next_user: BTreeMap<PageTableId, u64>,
    heap: BTreeMap<u64, Layout>,
    pub allocated_pages: u64,
    pub freed_pages: u64,
    pub physical_in_use: u64,
    /// Page allocations that succeed before the allocator runs dry.
    pub fail_allocations_after: Option<usize>,
    /// Make every `map` and `map_copy` fail.
    pub fail_mappings: bool,
}

impl Memory {
    fn new() -> Self {
        Self {
            tables: vec![BTreeMap::new()],
            next_physical: 0x20_0000,
            ..Self::default()
        }
    }

    fn map_range(&mut self, table: PageTableId, virt: u64, phys: u64, size: u64) {
        for offset in (0..size).step_by(PAGE_SIZE as usize) {
            self.tables[table].insert(virt + offset, phys + offset);
        }
    }
}

pub struct FakePageTables(pub Arc<Mutex<Memory>>);

pub const ROOT_BASE: u64 = 0x1000_0000;

impl PageTables for FakePageTables {
    fn create_table(&mut self) -> Result<PageTableId, KernelError> {
        let mut memory = self.0.lock();
        memory.tables.push(BTreeMap::new());
        Ok(memory.tables.len() - 1)
    }

    fn root_address(&self, table: PageTableId) -> Option<u64> {
        (table < self.0.lock().tables.len()).then(|| ROOT_BASE + table as u64 * PAGE_SIZE)
    }

    fn map(
        &mut self,
        table: PageTableId,
        virt: u64,
        phys: u64,
        size: u64,
        _flags: MapFlags,
    ) -> Result<(), KernelError> {
        let mut memory = self.0.lock();
        if table >= memory.tables.len() || memory.fail_mappings {
            return Err(KernelError::MappingFailed(virt));
        }
        memory.map_range(table, virt, phys, size);
        Ok(())
    }

    fn map_copy(
        &mut self,
        from: PageTableId,
        to: PageTableId,
        virt: u64,
        size: u64,
    ) -> Result<(), KernelError> {
        let mut memory = self.0.lock();
        if memory.fail_mappings {
            return Err(KernelError::MappingFailed(virt));
        }
        for offset in (0..size).step_by(PAGE_SIZE as usize) {
            let phys = *memory.tables[from]
                .get(&(virt + offset))
                .ok_or(KernelError::MappingFailed(virt + offset))?;
            memory.tables[to].insert(virt + offset, phys);
        }
        Ok(())
    }

    fn unmap(&mut self, table: PageTableId, virt: u64, size: u64) {
        let mut memory = self.0.lock();
        for offset in (0..size).step_by(PAGE_SIZE as usize) {
            memory.tables[table].remove(&(virt + offset));
        }
    }

    fn translate(&self, table: PageTableId, virt: u64) -> Option<u64> {
        let memory = self.0.lock();
        let page = virt & !(PAGE_SIZE - 1);
        memory
            .tables
            .get(table)?
            .get(&page)
            .map(|phys| phys + (virt - page))
    }

    fn flush(&mut self, _table: PageTableId) {}
}

pub struct FakeAllocator(pub Arc<Mutex<Memory>>);

impl PageAllocator for FakeAllocator {
    fn allocate_physical(&mut self, size: u64) -> Result<u64, KernelError> {
        let mut memory = self.0.lock();
        let addr = memory.next_physical;
        memory.next_physical += size;
        memory.physical_in_use += size;
        Ok(addr)
    }

    fn free_physical(&mut self, _addr: u64, size: u64) {
        self.0.lock().physical_in_use -= size;
    }

    fn allocate_pages(&mut self, pages: u64, pool: AddressPool) -> Result<u64, KernelError> {
        let size = pages.checked_mul(PAGE_SIZE).ok_or(KernelError::OutOfMemory)?;
        let mut memory = self.0.lock();
        if let Some(left) = memory.fail_allocations_after.as_mut() {
            if *left == 0 {
                return Err(KernelError::OutOfMemory);
            }
            *left -= 1;
        }
        let addr = match pool {
            AddressPool::Kernel | AddressPool::Global => {
                let layout = Layout::from_size_align(size as usize, PAGE_SIZE as usize)
                    .map_err(|_| KernelError::OutOfMemory)?;
                let ptr = unsafe { alloc_zeroed(layout) };
                if ptr.is_null() {
                    return Err(KernelError::OutOfMemory);
                }
                let addr = ptr as u64;
                memory.heap.insert(addr, layout);
                memory.map_range(KERNEL_TABLE, addr, addr, size);
                addr
            }
            AddressPool::User(table) => {
                let next = memory.next_user.entry(table).or_insert(0x4000_0000);
                let addr = *next;
                *next += size;
                addr
            }
        };
        memory.allocated_pages += pages;
        Ok(addr)
    }

    fn free_pages(&mut self, addr: u64, pages: u64, pool: AddressPool) {
        let mut memory = self.0.lock();
        memory.freed_pages += pages;
        if matches!(pool, AddressPool::Kernel | AddressPool::Global) {
            if let Some(layout) = memory.heap.remove(&addr) {
                let size = layout.size() as u64;
                for offset in (0..size).step_by(PAGE_SIZE as usize) {
                    memory.tables[KERNEL_TABLE].remove(&(addr + offset));
                }
                unsafe { dealloc(addr as *mut u8, layout) };
            }
        }
    }
}

pub struct Harness {
    pub kernel: Kernel,
    pub cpu: Arc<Mutex<Cpu>>,
    pub memory: Arc<Mutex<Memory>>,
}

impl Harness {
    pub fn with_config(config: KernelConfig) -> Self {
        let cpu = Arc::new(Mutex::new(Cpu::default()));
        let memory = Arc::new(Mutex::new(Memory::new()));
        let mut kernel = Kernel::new(
            config,
            Box::new(FakePlatform(cpu.clone())),
            Box::new(FakeController(cpu.clone())),
            Box::new(FakePageTables(memory.clone())),
            Box::new(FakeAllocator(memory.clone())),
        );
        kernel.setup().expect("setup");
        kernel.start();
        Self { kernel, cpu, memory }
    }

    /// A set-up and started kernel with no thread running yet.
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Started process with its own address space.
    pub fn user_process(&mut self, path: &str) -> ProcessId {
        let id = self.kernel.create_user_process(path).expect("process");
        self.kernel.start_process(id).expect("start");
        id
    }

    /// Started thread at `entry`.
    pub fn spawn(&mut self, process: ProcessId, entry: u64) -> ThreadId {
        let id = self
            .kernel
            .create_thread(process, ThreadStartOptions::new(entry))
            .expect("thread");
        self.kernel.start_thread(id).expect("start");
        id
    }

    /// Make `thread` current as if a trap had just resumed it.
    pub fn run(&mut self, thread: ThreadId) -> RegisterSnapshot {
        self.kernel.switch_to_thread(thread);
        self.kernel.scheduler.take_switch_request();
        let mut frame = RegisterSnapshot::default();
        self.kernel.resume_current(&mut frame);
        frame
    }

    pub fn root_of(&self, process: ProcessId) -> u64 {
        self.kernel.process_root(process)
    }

    pub fn trap(&mut self, frame: &mut RegisterSnapshot) {
        self.kernel.dispatch_interrupt(frame);
    }

    pub fn tick(&mut self) -> Option<usize> {
        let mut frame = RegisterSnapshot::for_vector(32);
        self.trap(&mut frame);
        self.kernel.scheduler.current_id()
    }

    pub fn eois(&self) -> Vec<u8> {
        self.cpu.lock().eois.clone()
    }

    pub fn root(&self) -> u64 {
        self.cpu.lock().root
    }
}

/// Frame of a system call trap on `vector`.
pub fn syscall_frame(vector: u8, command: u64, args: [u64; 6]) -> RegisterSnapshot {
    RegisterSnapshot {
        rax: command,
        rbx: args[0],
        rcx: args[1],
        rdx: args[2],
        rsi: args[3],
        rdi: args[4],
        rbp: args[5],
        ..RegisterSnapshot::for_vector(vector)
    }
}

pub fn sync_call(command: u64, args: [u64; 6]) -> RegisterSnapshot {
    syscall_frame(FUNCTION_VECTOR, command, args)
}

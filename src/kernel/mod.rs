//! # Kernel singleton
//!
//! [`Kernel`] owns every table the trap path touches: the interrupt vector
//! table, the system-call command table, the thread table and the process
//! list, plus the hardware collaborators behind traits.
//!
//! ## Submodules
//!
//! - `init`: named setup phases run by [`Kernel::setup`]
//! - `status`: component status tracking for boot diagnostics
//!
//! ## Entry
//!
//! Trap stubs and kernel-mode callers reach the instance through
//! [`with_kernel`]. The lock is never contended on a single CPU: a trap
//! that finds it held was raised inside the dispatcher, which is fatal.

pub mod init;
pub mod status;

use alloc::boxed::Box;

use spin::Mutex;

use crate::config::KernelConfig;
use crate::error::{Fault, KernelError};
use crate::interrupts::frame::{RegisterSnapshot, RFLAGS_IF};
use crate::interrupts::pic::InterruptController;
use crate::interrupts::table::InterruptTable;
use crate::memory::{PageAllocator, PageTableId, PageTables};
use crate::panic::{fatal, fatal_with_frame};
use crate::platform::Platform;
use crate::syscalls::table::CommandTable;
use crate::task::{ProcessId, ProcessManager, Scheduler};

pub use status::{BootStatus, ComponentStatus, InitStatus};

pub struct Kernel {
    pub config: KernelConfig,
    pub(crate) platform: Box<dyn Platform + Send>,
    pub(crate) controller: Box<dyn InterruptController + Send>,
    pub(crate) page_tables: Box<dyn PageTables + Send>,
    pub(crate) allocator: Box<dyn PageAllocator + Send>,
    pub vectors: InterruptTable,
    pub commands: CommandTable,
    pub scheduler: Scheduler,
    pub processes: ProcessManager,
    pub boot: BootStatus,
}

pub static KERNEL: Mutex<Option<Kernel>> = Mutex::new(None);

impl Kernel {
    pub fn new(
        config: KernelConfig,
        platform: Box<dyn Platform + Send>,
        controller: Box<dyn InterruptController + Send>,
        page_tables: Box<dyn PageTables + Send>,
        allocator: Box<dyn PageAllocator + Send>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(config.thread_capacity, config.log),
            vectors: InterruptTable::new(),
            commands: CommandTable::new(),
            processes: ProcessManager::new(),
            boot: BootStatus::new(),
            config,
            platform,
            controller,
            page_tables,
            allocator,
        }
    }

    /// Commit pending gate edits to the hardware-visible table.
    pub fn flush_vectors(&mut self) {
        self.vectors.flush(self.platform.as_mut());
    }

    /// Open the dispatcher and the scheduler. Gate edits must be flushed.
    pub fn start(&mut self) {
        if self.vectors.is_dirty() {
            fatal(Fault::UnflushedVectorTable);
        }
        if let Some(component) = self.boot.blocker() {
            log::warn!("starting with {} {}", component.name, component.status);
        }
        self.vectors.enable();
        self.scheduler.enable();
        log::info!("dispatcher and scheduler enabled");
    }

    pub(crate) fn table_root(&self, table: PageTableId) -> u64 {
        match self.page_tables.root_address(table) {
            Some(root) => root,
            None => fatal(Fault::PageTableInvariant("unknown page table")),
        }
    }

    pub(crate) fn process_root(&self, process: ProcessId) -> u64 {
        match self.processes.get(process) {
            Some(proc) => self.table_root(proc.page_table),
            None => fatal(Fault::PageTableInvariant("thread without a process")),
        }
    }

    /// Load the current thread into `frame` and activate its address space,
    /// data selector, privileged stack and storage base.
    pub(crate) fn resume_current(&mut self, frame: &mut RegisterSnapshot) {
        let thread = match self.scheduler.current() {
            Some(thread) => thread,
            None => fatal(Fault::SchedulerInvariant("no thread to resume")),
        };
        let (state, process, selector, kernel_stack, storage_base) = (
            thread.state,
            thread.process,
            thread.data_selector,
            thread.kernel_stack,
            thread.storage_base,
        );
        let root = self.process_root(process);

        *frame = state;
        frame.rflags |= RFLAGS_IF;
        self.platform.set_page_table_root(root);
        self.platform.load_data_selector(selector);
        if kernel_stack.is_allocated() {
            self.platform.set_kernel_stack(kernel_stack.top());
        }
        self.platform.set_thread_storage_base(storage_base);
    }

    /// Stop with a register dump of the trapped context.
    pub fn fatal(&self, fault: Fault, frame: &RegisterSnapshot) -> ! {
        fatal_with_frame(
            fault,
            frame,
            self.platform.fault_address(),
            self.platform.thread_storage_base(),
        )
    }
}

/// Run `f` against the installed kernel with interrupts masked.
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    let run = || {
        let mut guard = match KERNEL.try_lock() {
            Some(guard) => guard,
            None => fatal(Fault::NestedTrap),
        };
        match guard.as_mut() {
            Some(kernel) => f(kernel),
            None => fatal(Fault::SchedulerInvariant("kernel not installed")),
        }
    };

    #[cfg(target_os = "none")]
    {
        x86_64::instructions::interrupts::without_interrupts(run)
    }
    #[cfg(not(target_os = "none"))]
    {
        run()
    }
}

/// Install the kernel. Fails when one is already installed.
pub fn install(kernel: Kernel) -> Result<(), KernelError> {
    let mut slot = KERNEL.lock();
    if slot.is_some() {
        return Err(KernelError::InvalidArgument);
    }
    *slot = Some(kernel);
    Ok(())
}

/// Boot path: install the kernel, adopt the boot context as the
/// "KernelMain" thread, open the dispatcher and continue in `main` with
/// interrupts enabled.
#[cfg(target_os = "none")]
pub fn run(kernel: Kernel, main: fn() -> !) -> ! {
    if let Err(e) = install(kernel) {
        fatal_boot(e);
    }
    if let Err(e) = with_kernel(|kernel| {
        kernel.adopt_boot_thread()?;
        kernel.start();
        Ok::<(), KernelError>(())
    }) {
        fatal_boot(e);
    }
    x86_64::instructions::interrupts::enable();
    main()
}

#[cfg(target_os = "none")]
fn fatal_boot(e: KernelError) -> ! {
    log::error!("boot failed: {}", e);
    fatal(Fault::SchedulerInvariant("boot failed"))
}

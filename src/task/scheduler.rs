//! Thread table and scheduler.
//!
//! # Selection
//!
//! Round robin over slots `1..capacity`, starting after the current thread
//! and ending with it. Slot 0 is the idle thread and is chosen only when no
//! other thread can run. A thread with a pending child call is skipped.
//!
//! Priorities bias the rotation:
//! - `p < 0`: the thread keeps the CPU for `|p|` extra clock ticks
//! - `p > 0`: the scan passes over the thread `p` times before picking it
//!
//! # Switching
//!
//! The scheduler never touches the CPU. [`Scheduler::switch_to_thread`]
//! marks the new current thread and raises a switch request; the trap
//! dispatcher consumes the request after the controller is acknowledged and
//! loads the thread's snapshot into the outgoing frame.

use alloc::vec::Vec;

use log::LevelFilter;

use crate::config::LogConfig;
use crate::error::{Fault, KernelError};
use crate::interrupts::frame::{RegisterSnapshot, RFLAGS_IF, RFLAGS_IOPL3, RFLAGS_RESERVED};
use crate::interrupts::gdt::{
    KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, USER_CODE_SELECTOR, USER_DATA_SELECTOR,
};
use crate::kernel::Kernel;
use crate::memory::{
    align_up, checked_align_up, pages_for, AddressPool, PageTableId, KERNEL_TABLE, PAGE_SIZE,
};
use crate::panic::fatal;
use crate::task::thread::{StackRegion, Thread, ThreadStartOptions, ThreadStatus};
use crate::task::{ProcessId, ThreadId};

pub const IDLE_THREAD: ThreadId = 0;

pub struct Scheduler {
    threads: Vec<Thread>,
    current: Option<ThreadId>,
    enabled: bool,
    clock_ticks: u64,
    switch_requested: bool,
    log: LogConfig,
}

impl Scheduler {
    pub fn new(capacity: usize, log: LogConfig) -> Self {
        Self {
            threads: (0..capacity).map(Thread::empty).collect(),
            current: None,
            enabled: false,
            clock_ticks: 0,
            switch_requested: false,
            log,
        }
    }

    pub fn capacity(&self) -> usize {
        self.threads.len()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clock_ticks(&self) -> u64 {
        self.clock_ticks
    }

    pub fn current_id(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn current(&self) -> Option<&Thread> {
        self.current.and_then(|id| self.thread(id))
    }

    /// Live (non-empty) thread in slot `id`.
    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads
            .get(id)
            .filter(|thread| thread.status != ThreadStatus::Empty)
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads
            .get_mut(id)
            .filter(|thread| thread.status != ThreadStatus::Empty)
    }

    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads
            .iter()
            .filter(|thread| thread.status != ThreadStatus::Empty)
    }

    pub(crate) fn find_empty_slot(&self, from: ThreadId) -> Option<ThreadId> {
        (from..self.threads.len()).find(|&id| self.threads[id].status == ThreadStatus::Empty)
    }

    pub(crate) fn slot_mut(&mut self, id: ThreadId) -> &mut Thread {
        &mut self.threads[id]
    }

    /// Copy the trapped registers into the thread. Only a Running thread's
    /// snapshot is replaced; a Ready thread keeps its initial state.
    pub fn save_thread_state(&mut self, id: ThreadId, frame: &RegisterSnapshot) {
        if let Some(thread) = self.thread_mut(id) {
            if thread.status == ThreadStatus::Running {
                thread.state = *frame;
            }
        }
    }

    /// Write a system call result into the thread's saved accumulator.
    pub fn set_return_value(&mut self, id: ThreadId, value: u64) {
        if let Some(thread) = self.thread_mut(id) {
            thread.state.rax = value;
        }
    }

    pub fn switch_to_thread(&mut self, id: ThreadId) {
        let log = self.log;
        let previous = self.current;
        if let Some(prev) = previous.filter(|&prev| prev != id) {
            let prev = &mut self.threads[prev];
            if prev.status == ThreadStatus::Running {
                prev.status = ThreadStatus::Ready;
            }
        }
        let thread = match self.threads.get_mut(id) {
            Some(thread) if thread.is_alive() => thread,
            _ => fatal(Fault::SchedulerInvariant("switch to a dead thread")),
        };

        thread.status = ThreadStatus::Running;
        thread.ticks = thread.ticks.wrapping_add(1);
        if thread.priority < 0 {
            thread.priority_counter = -thread.priority;
        }
        if log.task_switch {
            log::debug!("switch {:?} -> {} ({})", previous, id, thread.debug_name);
        }

        self.current = Some(id);
        self.switch_requested = true;
    }

    pub fn switch_pending(&self) -> bool {
        self.switch_requested
    }

    pub fn take_switch_request(&mut self) -> bool {
        core::mem::replace(&mut self.switch_requested, false)
    }

    /// Pick the thread to run next. Wakes sleepers whose deadline passed.
    pub fn next_thread(&mut self) -> ThreadId {
        let slots = self.threads.len().saturating_sub(1);
        if slots == 0 {
            return IDLE_THREAD;
        }
        let offset = match self.current {
            Some(id) if id != IDLE_THREAD => id,
            _ => 0,
        };
        let now = self.clock_ticks;
        let mut passed_over = None;

        for step in 0..slots {
            let id = (offset + step) % slots + 1;
            let thread = &mut self.threads[id];
            if thread.child.is_some() {
                continue;
            }
            if let ThreadStatus::Sleeping { until } = thread.status {
                if until <= now {
                    thread.status = ThreadStatus::Ready;
                }
            }
            if !thread.is_runnable() {
                continue;
            }
            if thread.priority > 0 {
                if thread.priority_counter > 0 {
                    thread.priority_counter -= 1;
                    passed_over.get_or_insert(id);
                    continue;
                }
                thread.priority_counter = thread.priority;
            }
            return id;
        }

        match passed_over {
            Some(id) => {
                let thread = &mut self.threads[id];
                thread.priority_counter = thread.priority;
                id
            }
            None => IDLE_THREAD,
        }
    }

    pub fn schedule_next(&mut self) -> ThreadId {
        let next = self.next_thread();
        self.switch_to_thread(next);
        next
    }

    /// Timer tick. The caller acknowledges the controller.
    pub fn clock_interrupt(&mut self, frame: &RegisterSnapshot) {
        self.clock_ticks = self.clock_ticks.wrapping_add(1);
        if !self.enabled {
            return;
        }

        if let Some(id) = self.current {
            let thread = &mut self.threads[id];
            if thread.status == ThreadStatus::Running
                && thread.child.is_none()
                && thread.priority_counter > 0
                && thread.priority < 0
            {
                thread.priority_counter -= 1;
                return;
            }
            self.save_thread_state(id, frame);
        }
        self.schedule_next();
    }

    /// Put `id` to sleep for `ticks` clock ticks; `0` yields.
    pub fn sleep(&mut self, id: ThreadId, ticks: u64) {
        let until = self.clock_ticks.wrapping_add(ticks);
        if let Some(thread) = self.thread_mut(id) {
            if thread.is_runnable() {
                thread.status = ThreadStatus::Sleeping { until };
            }
        }
    }

    pub fn set_priority(&mut self, id: ThreadId, priority: i32) -> Result<(), KernelError> {
        let thread = self.thread_mut(id).ok_or(KernelError::UnknownThread(id))?;
        thread.priority = priority;
        thread.priority_counter = priority.abs();
        Ok(())
    }

    /// Terminate `id` and, transitively, the child it waits on. The links
    /// between terminated pairs are dropped so both slots can be reclaimed;
    /// the link to a live parent of `id` stays, leaving that parent blocked.
    pub fn terminate_thread(&mut self, id: ThreadId) {
        let level = self.log.threads;
        let mut next = Some(id);
        while let Some(id) = next {
            let thread = match self.threads.get_mut(id) {
                Some(thread) if thread.is_alive() => thread,
                _ => break,
            };
            thread.status = ThreadStatus::Terminated;
            if level >= LevelFilter::Debug {
                log::debug!("thread {} ({}) terminated", id, thread.debug_name);
            }
            next = thread.child.take();
            if let Some(child) = next {
                self.threads[child].parent = None;
            }
        }
    }

    /// Block `caller` on `callee`. A caller may wait on one callee at a time.
    pub fn link_call(&mut self, caller: ThreadId, callee: ThreadId) {
        if self.threads[caller].child.is_some() || self.threads[callee].parent.is_some() {
            fatal(Fault::CallCardinality(caller));
        }
        self.threads[caller].child = Some(callee);
        self.threads[caller].status = ThreadStatus::Waiting;
        self.threads[callee].parent = Some(caller);
    }

    pub fn unlink_call(&mut self, caller: ThreadId, callee: ThreadId) {
        self.threads[caller].child = None;
        self.threads[callee].parent = None;
    }

    pub fn dump_stats(&self) {
        log::info!(
            "scheduler: ticks={} current={:?} enabled={}",
            self.clock_ticks,
            self.current,
            self.enabled
        );
        for thread in self.threads().filter(|thread| thread.is_runnable()) {
            log::info!(
                "  [{}] pid={} {:?} prio={} ticks={} {}",
                thread.id,
                thread.process,
                thread.status,
                thread.priority,
                thread.ticks,
                thread.debug_name
            );
        }
        for thread in self.threads().filter(|thread| !thread.is_runnable()) {
            log::info!(
                "  ({}) pid={} {:?} parent={:?} child={:?} {}",
                thread.id,
                thread.process,
                thread.status,
                thread.parent,
                thread.child,
                thread.debug_name
            );
        }
    }
}

#[cfg(target_os = "none")]
fn default_return_address() -> u64 {
    crate::interrupts::stubs::thread_exit_address()
}

#[cfg(not(target_os = "none"))]
fn default_return_address() -> u64 {
    0
}

/// Body of the idle thread.
pub extern "C" fn idle_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

impl Kernel {
    pub(crate) fn setup_scheduler(&mut self) -> Result<(), KernelError> {
        let idle = self.processes.idle();
        let mut options = ThreadStartOptions::new(idle_loop as usize as u64);
        options.debug_name = "Idle";
        let id = self.create_thread_in_slot(idle, options, IDLE_THREAD)?;
        self.start_thread(id)
    }

    /// Register the code running at boot as the "KernelMain" thread of the
    /// system process. Its snapshot is filled by its first trap.
    pub fn adopt_boot_thread(&mut self) -> Result<ThreadId, KernelError> {
        let id = self
            .scheduler
            .find_empty_slot(1)
            .ok_or(KernelError::NoFreeThreadSlot)?;
        let process = self.processes.system();

        let thread = self.scheduler.slot_mut(id);
        *thread = Thread::empty(id);
        thread.process = process;
        thread.status = ThreadStatus::Running;
        thread.data_selector = KERNEL_DATA_SELECTOR;
        thread.debug_name = "KernelMain";

        self.processes.attach_thread(process, id)?;
        self.scheduler.current = Some(id);
        Ok(id)
    }

    pub fn create_thread(
        &mut self,
        process: ProcessId,
        options: ThreadStartOptions,
    ) -> Result<ThreadId, KernelError> {
        self.reset_terminated_threads();
        let id = self
            .scheduler
            .find_empty_slot(1)
            .ok_or(KernelError::NoFreeThreadSlot)?;
        self.create_thread_in_slot(process, options, id)
    }

    fn create_thread_in_slot(
        &mut self,
        process: ProcessId,
        options: ThreadStartOptions,
        id: ThreadId,
    ) -> Result<ThreadId, KernelError> {
        let (user, table) = {
            let proc = self
                .processes
                .get(process)
                .ok_or(KernelError::UnknownProcess(process))?;
            (proc.user, proc.page_table)
        };

        let stack_size = options
            .stack_size
            .unwrap_or(self.config.default_stack_size);
        let stack_size =
            checked_align_up(stack_size, PAGE_SIZE).ok_or(KernelError::InvalidArgument)?;
        let kernel_stack_size = align_up(self.config.kernel_stack_size, PAGE_SIZE);
        let padding = self.config.stack_debug_padding.max(8);
        // Argument area, padding and the return address all fit on the stack.
        let required = options
            .argument_buffer_size
            .checked_add(padding)
            .and_then(|size| size.checked_add(64))
            .ok_or(KernelError::InvalidArgument)?;
        if required > stack_size {
            return Err(KernelError::InvalidArgument);
        }

        let stack = self.allocate_stack(stack_size)?;
        let kernel_stack = match self.allocate_stack(kernel_stack_size) {
            Ok(region) => region,
            Err(e) => {
                self.release_stacks(None, &[stack]);
                return Err(e);
            }
        };
        if user {
            if let Err(e) = self.share_stacks(table, &[stack, kernel_stack]) {
                self.release_stacks(Some(table), &[stack, kernel_stack]);
                return Err(e);
            }
        }

        let (code_selector, data_selector) = if user {
            (USER_CODE_SELECTOR, USER_DATA_SELECTOR)
        } else {
            (KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR)
        };
        let mut rflags = RFLAGS_RESERVED | RFLAGS_IF;
        if user && (options.allow_user_mode_io || self.config.allow_user_mode_io) {
            rflags |= RFLAGS_IOPL3;
        }

        let thread = self.scheduler.slot_mut(id);
        *thread = Thread::empty(id);
        thread.process = process;
        thread.status = ThreadStatus::Created;
        thread.user = user;
        thread.data_selector = data_selector;
        thread.stack = stack;
        thread.kernel_stack = kernel_stack;
        thread.argument_buffer_size = options.argument_buffer_size;
        thread.debug = options.debug;
        thread.debug_name = options.debug_name;

        let arguments = thread.argument_address();
        let rsp = arguments - padding;
        let return_address = match options.return_address {
            0 if !user => default_return_address(),
            address => address,
        };
        // The entry routine sees `return_address` as its caller.
        unsafe { core::ptr::write_unaligned(rsp as *mut u64, return_address) };

        thread.state = RegisterSnapshot {
            rip: options.entry,
            cs: code_selector as u64,
            rflags,
            rsp,
            ss: data_selector as u64,
            rdi: arguments,
            rsi: options.argument_buffer_size,
            ..RegisterSnapshot::default()
        };

        if self.config.log.threads >= LevelFilter::Info {
            log::info!(
                "created thread {} ({}) pid={} entry={:#x} stack={:#x}",
                id,
                options.debug_name,
                process,
                options.entry,
                stack.base
            );
        }

        self.processes.attach_thread(process, id)?;
        Ok(id)
    }

    pub fn start_thread(&mut self, id: ThreadId) -> Result<(), KernelError> {
        let thread = self
            .scheduler
            .thread_mut(id)
            .ok_or(KernelError::UnknownThread(id))?;
        if thread.status == ThreadStatus::Created {
            thread.status = ThreadStatus::Ready;
        }
        Ok(())
    }

    /// Terminate a thread (and the child it waits on). Reschedules when the
    /// current thread was killed.
    pub fn kill_thread(&mut self, id: ThreadId) -> Result<(), KernelError> {
        if id == IDLE_THREAD || self.scheduler.thread(id).is_none() {
            return Err(KernelError::UnknownThread(id));
        }
        self.scheduler.terminate_thread(id);
        if self.scheduler.current_id() == Some(id) {
            self.scheduler.schedule_next();
        }
        Ok(())
    }

    pub fn terminate_current_thread(&mut self) {
        match self.scheduler.current_id() {
            Some(id) if id != IDLE_THREAD => self.scheduler.terminate_thread(id),
            _ => {}
        }
        self.scheduler.schedule_next();
    }

    pub fn switch_to_thread(&mut self, id: ThreadId) {
        self.scheduler.switch_to_thread(id);
    }

    pub fn sleep(&mut self, ticks: u64) {
        if let Some(id) = self.scheduler.current_id() {
            self.scheduler.sleep(id, ticks);
        }
        self.scheduler.schedule_next();
    }

    pub fn set_priority(&mut self, id: ThreadId, priority: i32) -> Result<(), KernelError> {
        self.scheduler.set_priority(id, priority)
    }

    /// Release stacks of terminated threads and free their slots. A thread
    /// still linked to a waiting parent keeps its slot.
    pub fn reset_terminated_threads(&mut self) {
        let current = self.scheduler.current_id();
        let reclaim: Vec<ThreadId> = self
            .scheduler
            .threads()
            .filter(|thread| {
                thread.status == ThreadStatus::Terminated
                    && thread.parent.is_none()
                    && Some(thread.id) != current
            })
            .map(|thread| thread.id)
            .collect();

        for id in reclaim {
            let thread = self.scheduler.slot_mut(id);
            let (process, user, stack, kernel_stack) =
                (thread.process, thread.user, thread.stack, thread.kernel_stack);
            *thread = Thread::empty(id);

            let table = if user {
                self.processes.get(process).map(|proc| proc.page_table)
            } else {
                None
            };
            self.release_stacks(table, &[stack, kernel_stack]);
            self.processes.detach_thread(process, id);
        }
    }

    fn allocate_stack(&mut self, size: u64) -> Result<StackRegion, KernelError> {
        let base = self
            .allocator
            .allocate_pages(pages_for(size), AddressPool::Kernel)?;
        Ok(StackRegion { base, size })
    }

    /// Map kernel-allocated stacks into a user table at the same address.
    fn share_stacks(&mut self, table: PageTableId, regions: &[StackRegion]) -> Result<(), KernelError> {
        for region in regions {
            self.page_tables
                .map_copy(KERNEL_TABLE, table, region.base, region.size)?;
        }
        self.page_tables.flush(table);
        Ok(())
    }

    /// Unmap stacks from `table`, if given, and return their pages.
    fn release_stacks(&mut self, table: Option<PageTableId>, regions: &[StackRegion]) {
        if let Some(table) = table {
            for region in regions {
                self.page_tables.unmap(table, region.base, region.size);
            }
            self.page_tables.flush(table);
        }
        for region in regions.iter().filter(|region| region.is_allocated()) {
            self.allocator
                .free_pages(region.base, pages_for(region.size), AddressPool::Kernel);
        }
    }
}

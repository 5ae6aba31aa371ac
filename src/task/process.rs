//! Processes.
//!
//! A process is an address space (page-table handle), the list of threads
//! running in it and an optional [`Service`] through which other processes
//! reach it. Process images are built by the loader; this module only
//! tracks them.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::memory::{PageTableId, KERNEL_TABLE};
use crate::task::service::Service;
use crate::task::{ProcessId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRunState {
    Creating,
    Running,
    Terminated,
}

/// Pages shared between processes through a message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalAllocation {
    pub address: u64,
    pub pages: u64,
    pub target: ProcessId,
}

#[derive(Debug, Clone)]
pub struct Process {
    pub id: ProcessId,
    pub run_state: ProcessRunState,
    pub threads: Vec<ThreadId>,
    pub page_table: PageTableId,
    pub service: Option<Service>,
    pub user: bool,
    pub path: String,
    pub global_allocations: Vec<GlobalAllocation>,
}

pub struct ProcessManager {
    processes: Vec<Process>,
    next_id: ProcessId,
    idle: ProcessId,
    system: ProcessId,
}

impl ProcessManager {
    pub const fn new() -> Self {
        Self {
            processes: Vec::new(),
            next_id: 1,
            idle: 0,
            system: 0,
        }
    }

    pub fn idle(&self) -> ProcessId {
        self.idle
    }

    pub fn system(&self) -> ProcessId {
        self.system
    }

    /// New process in the kernel address space, with a service façade.
    pub fn create_empty_process(&mut self, path: &str, user: bool) -> ProcessId {
        let id = self.next_id;
        self.next_id += 1;
        self.processes.push(Process {
            id,
            run_state: ProcessRunState::Creating,
            threads: Vec::new(),
            page_table: KERNEL_TABLE,
            service: Some(Service::new(id)),
            user,
            path: String::from(path),
            global_allocations: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ProcessId) -> Option<&Process> {
        self.processes.iter().find(|proc| proc.id == id)
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut Process> {
        self.processes.iter_mut().find(|proc| proc.id == id)
    }

    /// Running process with the given path.
    pub fn by_name(&self, path: &str) -> Option<&Process> {
        self.processes
            .iter()
            .find(|proc| proc.run_state == ProcessRunState::Running && proc.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }

    pub(crate) fn attach_thread(
        &mut self,
        process: ProcessId,
        thread: ThreadId,
    ) -> Result<(), KernelError> {
        let proc = self
            .get_mut(process)
            .ok_or(KernelError::UnknownProcess(process))?;
        proc.threads.push(thread);
        Ok(())
    }

    pub(crate) fn detach_thread(&mut self, process: ProcessId, thread: ThreadId) {
        if let Some(proc) = self.get_mut(process) {
            proc.threads.retain(|&id| id != thread);
        }
    }

    pub fn dump_stats(&self) {
        for proc in &self.processes {
            log::info!(
                "process {} {:?} {} threads={:?} table={} service={:?}",
                proc.id,
                proc.run_state,
                proc.path,
                proc.threads,
                proc.page_table,
                proc.service.map(|service| service.status)
            );
        }
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub(crate) fn setup_processes(&mut self) -> Result<(), KernelError> {
        let idle = self.processes.create_empty_process("/system/idle", false);
        let system = self.processes.create_empty_process("/system/main", false);
        self.processes.idle = idle;
        self.processes.system = system;
        for id in [idle, system] {
            if let Some(proc) = self.processes.get_mut(id) {
                proc.run_state = ProcessRunState::Running;
            }
        }
        Ok(())
    }

    /// Process with its own address space. The page-table collaborator
    /// shares the interrupt control block into the new table.
    pub fn create_user_process(&mut self, path: &str) -> Result<ProcessId, KernelError> {
        let table = self.page_tables.create_table()?;
        let id = self.processes.create_empty_process(path, true);
        if let Some(proc) = self.processes.get_mut(id) {
            proc.page_table = table;
        }
        log::info!("created process {} ({}) table={}", id, path, table);
        Ok(id)
    }

    /// Mark the process running and start every thread created so far.
    pub fn start_process(&mut self, id: ProcessId) -> Result<(), KernelError> {
        let proc = self
            .processes
            .get_mut(id)
            .ok_or(KernelError::UnknownProcess(id))?;
        proc.run_state = ProcessRunState::Running;
        let threads = proc.threads.clone();
        for thread in threads {
            self.start_thread(thread)?;
        }
        Ok(())
    }

    /// Terminate every thread of the process. When the current thread was
    /// among them, the scheduler picks a successor.
    pub fn kill_process(&mut self, id: ProcessId) -> Result<(), KernelError> {
        let proc = self
            .processes
            .get_mut(id)
            .ok_or(KernelError::UnknownProcess(id))?;
        proc.run_state = ProcessRunState::Terminated;
        let threads = proc.threads.clone();

        for thread in threads {
            self.scheduler.terminate_thread(thread);
        }
        log::info!("killed process {}", id);

        let current_dead = self
            .scheduler
            .current()
            .map_or(false, |thread| !thread.is_alive());
        if current_dead {
            self.scheduler.schedule_next();
        }
        Ok(())
    }

    pub fn current_process(&self) -> ProcessId {
        self.scheduler
            .current()
            .map_or(self.processes.system(), |thread| thread.process)
    }

    pub fn dump_stats(&self) {
        self.scheduler.dump_stats();
        self.processes.dump_stats();
    }
}

//! Kernel setup phases.
//!
//! Each phase is tracked in [`Kernel::boot`] so a failed boot shows which
//! component stopped it.

use crate::error::KernelError;
use crate::interrupts::handlers;
use crate::kernel::status::InitStatus;
use crate::kernel::Kernel;
use crate::syscalls;

type Phase = fn(&mut Kernel) -> Result<(), KernelError>;

const PHASES: [(&str, Phase); 5] = [
    ("Interrupt Controller", init_controller),
    ("Vector Table", init_vectors),
    ("System Calls", init_syscalls),
    ("Processes", Kernel::setup_processes),
    ("Scheduler", Kernel::setup_scheduler),
];

impl Kernel {
    /// Bring every component up in order. Interrupts stay masked and the
    /// dispatcher stays closed until [`Kernel::start`].
    pub fn setup(&mut self) -> Result<(), KernelError> {
        for (name, _) in PHASES {
            self.boot.register(name);
        }
        log::info!("kernel setup");

        for (index, &(name, phase)) in PHASES.iter().enumerate() {
            init_phase(self, index, name, phase)?;
        }

        log::info!("kernel setup complete");
        Ok(())
    }
}

fn init_phase(
    kernel: &mut Kernel,
    index: usize,
    name: &'static str,
    phase: Phase,
) -> Result<(), KernelError> {
    kernel.boot.update(name, InitStatus::InProgress);
    log::info!("[{}/{}] Initializing {}...", index + 1, PHASES.len(), name);

    match phase(kernel) {
        Ok(()) => {
            kernel.boot.update(name, InitStatus::Completed);
            log::info!("    {} initialized", name);
            Ok(())
        }
        Err(e) => {
            kernel.boot.update(name, InitStatus::Failed(e));
            log::error!("    {} failed: {}", name, e);
            Err(e)
        }
    }
}

fn init_controller(kernel: &mut Kernel) -> Result<(), KernelError> {
    kernel.controller.setup();
    Ok(())
}

fn init_vectors(kernel: &mut Kernel) -> Result<(), KernelError> {
    handlers::install(&mut kernel.vectors);
    kernel.flush_vectors();
    Ok(())
}

fn init_syscalls(kernel: &mut Kernel) -> Result<(), KernelError> {
    syscalls::install(&mut kernel.commands);
    Ok(())
}

//! Handlers installed in the vector table at setup.
//!
//! | Vector  | Handler              | Action                               |
//! |---------|----------------------|--------------------------------------|
//! | 0-19    | `cpu_exception`      | register dump, halt                  |
//! | 14      | `page_fault`         | classify CR2, register dump, halt    |
//! | 32      | `clock`              | tick the scheduler                   |
//! | 250     | `function_call`      | synchronous system call              |
//! | 251     | `action_call`        | asynchronous system call             |
//! | 254     | `terminate_current`  | end the current thread               |
//! | claimed | `service_interrupt`  | forward the IRQ to the owning service|
//! | other   | `undefined`          | report once, then ignore             |

use crate::error::{Fault, KernelError, PageFaultKind};
use crate::interrupts::frame::RegisterSnapshot;
use crate::interrupts::gdt::DOUBLE_FAULT_IST_INDEX;
use crate::interrupts::pic::{eoi_target, EoiTarget, InterruptIndex};
use crate::interrupts::table::{InterruptTable, VectorFlags};
use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{action_call, function_call};
use crate::syscalls::message::{CallingType, SyscallContext, SystemMessage};
use crate::syscalls::numbers::{SyscallNumber, ACTION_VECTOR, FUNCTION_VECTOR};
use crate::task::ProcessId;

pub const CLOCK_VECTOR: u8 = InterruptIndex::Clock as u8;
pub const PAGE_FAULT_VECTOR: u8 = 14;
pub const DOUBLE_FAULT_VECTOR: u8 = 8;
pub const TERMINATE_CURRENT_VECTOR: u8 = 254;

/// Faults below this address are reported as null dereferences.
pub const NULL_GUARD_END: u64 = 0x2_0000;
/// First address past the lower canonical half.
pub const USER_SPACE_END: u64 = 0x0000_8000_0000_0000;

const EXCEPTIONS: [(u8, &str); 14] = [
    (0, "Divide Error"),
    (4, "Arithmetic Overflow"),
    (5, "Bound Check Error"),
    (6, "Invalid Opcode"),
    (7, "Coprocessor Not Available"),
    (8, "Double Fault"),
    (9, "Coprocessor Segment Overrun"),
    (10, "Invalid TSS"),
    (11, "Segment Not Present"),
    (12, "Stack Exception"),
    (13, "General Protection Exception"),
    (14, "Page Fault"),
    (16, "Coprocessor Error"),
    (19, "SIMD Floating-Point Exception"),
];

pub fn install(table: &mut InterruptTable) {
    for vector in 0..=u8::MAX {
        table.register(vector, undefined, None, true, true);
        table.set_flags(
            vector,
            VectorFlags::TRACE | VectorFlags::COUNT_STATISTICS | VectorFlags::NOTIFY_UNHANDLED,
        );
    }

    for (vector, _) in EXCEPTIONS {
        table.register(vector, cpu_exception, None, true, true);
    }
    table.register(PAGE_FAULT_VECTOR, page_fault, None, true, true);
    table.set_stack_index(DOUBLE_FAULT_VECTOR, Some(DOUBLE_FAULT_IST_INDEX));

    table.register(CLOCK_VECTOR, clock, None, false, false);

    table.register(FUNCTION_VECTOR, function_call, None, true, true);
    table.register(ACTION_VECTOR, action_call, None, true, true);
    table.register(TERMINATE_CURRENT_VECTOR, terminate_current, None, true, true);
    for vector in [FUNCTION_VECTOR, ACTION_VECTOR, TERMINATE_CURRENT_VECTOR] {
        table.set_privilege_level(vector, 3);
    }
}

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTIONS
        .iter()
        .find(|(v, _)| *v == vector)
        .map_or("Unknown Exception", |(_, name)| name)
}

pub fn classify_page_fault(address: u64) -> PageFaultKind {
    if address < NULL_GUARD_END {
        PageFaultKind::NullPointer
    } else if address >= USER_SPACE_END {
        PageFaultKind::OutOfRange
    } else {
        PageFaultKind::NotMapped
    }
}

fn undefined(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    let vector = frame.interrupt as u8;
    if kernel.vectors.take_unhandled_notification(vector) {
        log::warn!("unhandled interrupt {} at rip={:#x}", vector, frame.rip);
    }
}

fn cpu_exception(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    let vector = frame.interrupt as u8;
    let fault = Fault::CpuException {
        vector,
        name: exception_name(vector),
    };
    kernel.fatal(fault, frame);
}

fn page_fault(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    let address = kernel.platform.fault_address();
    kernel.fatal(Fault::PageFault(classify_page_fault(address)), frame);
}

fn clock(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    kernel.scheduler.clock_interrupt(frame);
}

fn terminate_current(kernel: &mut Kernel, _frame: &mut RegisterSnapshot) {
    kernel.terminate_current_thread();
}

/// Forward a claimed IRQ to its service as an asynchronous `Interrupt`
/// message carrying the vector.
fn service_interrupt(kernel: &mut Kernel, frame: &mut RegisterSnapshot) {
    let vector = frame.interrupt as u8;
    let process = match kernel.vectors.get(vector).service {
        Some(process) => process,
        None => return,
    };

    let caller = kernel.scheduler.current_id();
    if let Some(id) = caller {
        kernel.scheduler.save_thread_state(id, frame);
    }

    let message = SystemMessage::new(SyscallNumber::Interrupt as u64, [vector as u64, 0, 0, 0, 0, 0]);
    let context = SyscallContext::new(CallingType::Async, caller);
    if let Err(e) = kernel.call_service(process, &context, &message) {
        log::warn!("interrupt {} not delivered to process {}: {}", vector, process, e);
    }
}

impl Kernel {
    /// Route `vector` to the service of `process`. Only PIC lines other than
    /// the clock can be claimed.
    pub fn register_interrupt(&mut self, vector: u8, process: ProcessId) -> Result<(), KernelError> {
        if self.processes.get(process).is_none() {
            return Err(KernelError::UnknownProcess(process));
        }
        if eoi_target(vector) == EoiTarget::None || vector == CLOCK_VECTOR {
            return Err(KernelError::InvalidArgument);
        }
        self.vectors
            .set_interrupt_handler(vector, service_interrupt, Some(process));
        log::info!("interrupt {} routed to process {}", vector, process);
        Ok(())
    }
}

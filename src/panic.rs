//! Fatal error path.
//!
//! [`fatal`] logs the fault and panics; [`fatal_with_frame`] adds a register
//! dump of the trapped context first. On bare metal the panic handler below
//! stops the CPU; under the test harness the panic unwinds so fatal paths
//! can be asserted with `should_panic`.

use crate::error::Fault;
use crate::interrupts::frame::RegisterSnapshot;

pub fn fatal(fault: Fault) -> ! {
    log::error!("KERNEL PANIC: {}", fault);
    panic!("{}", fault);
}

pub fn fatal_with_frame(
    fault: Fault,
    frame: &RegisterSnapshot,
    fault_address: u64,
    storage_base: u64,
) -> ! {
    log::error!("KERNEL PANIC: {}", fault);
    dump_registers(frame, fault_address, storage_base);
    panic!("{}", fault);
}

fn dump_registers(frame: &RegisterSnapshot, fault_address: u64, storage_base: u64) {
    log::error!(
        "RAX={:#018x} RBX={:#018x} RCX={:#018x} RDX={:#018x}",
        frame.rax, frame.rbx, frame.rcx, frame.rdx
    );
    log::error!(
        "RSI={:#018x} RDI={:#018x} RBP={:#018x} RSP={:#018x}",
        frame.rsi, frame.rdi, frame.rbp, frame.rsp
    );
    log::error!(
        "R8 ={:#018x} R9 ={:#018x} R10={:#018x} R11={:#018x}",
        frame.r8, frame.r9, frame.r10, frame.r11
    );
    log::error!(
        "R12={:#018x} R13={:#018x} R14={:#018x} R15={:#018x}",
        frame.r12, frame.r13, frame.r14, frame.r15
    );
    log::error!(
        "RIP={:#018x} CS={:#06x} SS={:#06x} RFLAGS={:#010x}",
        frame.rip, frame.cs, frame.ss, frame.rflags
    );
    log::error!(
        "INT={} ERR={:#x} CR2={:#018x} FS={:#018x}",
        frame.interrupt, frame.error_code, fault_address, storage_base
    );
}

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();
    crate::println!("{}", info);
    loop {
        x86_64::instructions::hlt();
    }
}

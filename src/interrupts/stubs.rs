//! Trap entry stubs.
//!
//! One stub per vector. Vectors where the CPU pushes no error code get a
//! zero in its place so every trap builds the same [`RegisterSnapshot`].
//! The common path pushes the general registers, hands the frame to
//! [`trap_entry`], and resumes whatever context the dispatcher left in it.

use core::arch::global_asm;

use crate::interrupts::frame::RegisterSnapshot;
use crate::kernel::with_kernel;

global_asm!(
    r#"
.altmacro

.macro TRAP_STUB vector
trap_stub_\vector:
    .if \vector == 8 || \vector == 10 || \vector == 11 || \vector == 12 || \vector == 13 || \vector == 14 || \vector == 17 || \vector == 21 || \vector == 29 || \vector == 30
    .else
    push 0
    .endif
    push \vector
    jmp trap_common
.endm

.macro TRAP_STUB_ADDRESS vector
    .quad trap_stub_\vector
.endm

.section .text
.balign 16
trap_common:
    push rax
    push rcx
    push rdx
    push rbx
    push rbp
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    cld
    mov rdi, rsp
    call trap_entry
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rbp
    pop rbx
    pop rdx
    pop rcx
    pop rax
    add rsp, 16
    iretq

.set vector, 0
.rept 256
    TRAP_STUB %vector
    .set vector, vector + 1
.endr

.global thread_exit_trampoline
thread_exit_trampoline:
    int 254
2:
    hlt
    jmp 2b

.section .rodata
.balign 8
.global trap_stub_table
trap_stub_table:
.set vector, 0
.rept 256
    TRAP_STUB_ADDRESS %vector
    .set vector, vector + 1
.endr

.section .text
"#
);

extern "C" {
    fn thread_exit_trampoline();
}

/// Return address for kernel threads: ending the entry routine raises the
/// terminate-current vector.
pub fn thread_exit_address() -> u64 {
    thread_exit_trampoline as usize as u64
}

#[no_mangle]
extern "C" fn trap_entry(frame: *mut RegisterSnapshot) {
    let frame = unsafe { &mut *frame };
    with_kernel(|kernel| kernel.dispatch_interrupt(frame));
}

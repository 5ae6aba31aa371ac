//! Privileged entry dispatcher.
//!
//! Every trap lands in [`Kernel::dispatch_interrupt`] with interrupts
//! masked and the trapped registers in `frame`. On return, `frame` holds
//! the context the stub resumes with `iretq`: the trapped one, possibly
//! with a new accumulator, or the saved state of another thread.

use crate::error::Fault;
use crate::interrupts::frame::RegisterSnapshot;
use crate::interrupts::gdt::KERNEL_DATA_SELECTOR;
use crate::interrupts::table::VectorFlags;
use crate::kernel::Kernel;
use crate::memory::KERNEL_TABLE;

impl Kernel {
    pub fn dispatch_interrupt(&mut self, frame: &mut RegisterSnapshot) {
        self.platform.load_kernel_segments();
        let kernel_root = self.table_root(KERNEL_TABLE);
        self.platform.set_page_table_root(kernel_root);

        let (saved_root, saved_selector) = match self.scheduler.current() {
            Some(thread) => (self.process_root(thread.process), thread.data_selector),
            None => (kernel_root, KERNEL_DATA_SELECTOR),
        };

        if !self.vectors.is_enabled() {
            if let Ok(vector) = u8::try_from(frame.interrupt) {
                self.controller.send_end_of_interrupt(vector);
            }
            self.platform.set_page_table_root(saved_root);
            self.platform.load_data_selector(saved_selector);
            return;
        }

        let vector = match u8::try_from(frame.interrupt) {
            Ok(vector) => vector,
            Err(_) => self.fatal(Fault::InvalidVector(frame.interrupt), frame),
        };

        let entry = self.vectors.note_raised(vector);
        if self.config.log.interrupts && entry.flags.contains(VectorFlags::TRACE) {
            log::trace!(
                "interrupt {} rip={:#x} err={:#x} thread={:?}",
                vector,
                frame.rip,
                frame.error_code,
                self.scheduler.current_id()
            );
        }

        if let Some(pre_handler) = entry.pre_handler {
            pre_handler(self, frame);
        }
        match entry.handler {
            Some(handler) => handler(self, frame),
            None => self.fatal(Fault::MissingHandler(vector), frame),
        }

        self.controller.send_end_of_interrupt(vector);

        self.platform.set_page_table_root(saved_root);
        self.platform.load_data_selector(saved_selector);

        if self.scheduler.take_switch_request() {
            self.resume_current(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::gdt::USER_DATA_SELECTOR;
    use crate::testing::Harness;

    fn mark(_: &mut Kernel, frame: &mut RegisterSnapshot) {
        frame.r15 += 1;
    }

    fn mark_before(_: &mut Kernel, frame: &mut RegisterSnapshot) {
        frame.r14 = frame.r15 + 10;
    }

    #[test]
    fn test_handler_runs_once_and_vector_is_acknowledged_once() {
        let mut h = Harness::new();
        h.kernel.vectors.register(44, mark, Some(mark_before), true, true);

        let mut frame = RegisterSnapshot::for_vector(44);
        h.trap(&mut frame);

        assert_eq!(frame.r15, 1);
        assert_eq!(frame.r14, 10);
        assert_eq!(h.eois(), vec![44]);
        assert_eq!(h.kernel.vectors.vector_raised_count(44), 1);
    }

    #[test]
    fn test_disabled_dispatch_acknowledges_and_drops() {
        let mut h = Harness::new();
        h.kernel.vectors.register(40, mark, None, true, true);
        h.kernel.vectors.disable();

        let mut frame = RegisterSnapshot::for_vector(40);
        h.trap(&mut frame);

        assert_eq!(frame.r15, 0);
        assert_eq!(h.eois(), vec![40]);
        assert_eq!(h.kernel.vectors.raised_count(), 0);
    }

    #[test]
    fn test_disabled_dispatch_drops_out_of_range_vector() {
        let mut h = Harness::new();
        h.kernel.vectors.disable();

        let mut frame = RegisterSnapshot::default();
        frame.interrupt = 300;
        let before = frame;
        h.trap(&mut frame);

        assert_eq!(frame, before);
        assert!(h.eois().is_empty());
    }

    #[test]
    fn test_switch_acknowledges_exactly_once() {
        let mut h = Harness::new();
        let system = h.kernel.processes.system();
        let thread = h.spawn(system, 0x1000);

        assert_eq!(h.tick(), Some(thread));
        assert_eq!(h.eois(), vec![32]);
    }

    #[test]
    fn test_trap_without_switch_keeps_address_space_and_selector() {
        let mut h = Harness::new();
        let process = h.user_process("/app");
        let thread = h.spawn(process, 0x40_0000);
        h.tick();
        assert_eq!(h.kernel.scheduler.current_id(), Some(thread));
        assert_eq!(h.root(), h.root_of(process));

        let mut frame = RegisterSnapshot::for_vector(99);
        frame.rip = 0x40_0042;
        let before = frame;
        h.trap(&mut frame);

        assert_eq!(frame, before);
        assert_eq!(h.root(), h.root_of(process));
        assert_eq!(h.cpu.lock().data_selector, USER_DATA_SELECTOR);
    }

    #[test]
    fn test_switch_loads_thread_context() {
        let mut h = Harness::new();
        let process = h.user_process("/app");
        let thread = h.spawn(process, 0x40_0000);
        h.kernel.scheduler.thread_mut(thread).unwrap().storage_base = 0x7000_0000;

        let mut frame = RegisterSnapshot::for_vector(32);
        h.trap(&mut frame);

        let t = h.kernel.scheduler.thread(thread).unwrap();
        assert_eq!(frame.rip, 0x40_0000);
        assert!(frame.interrupts_enabled());
        assert!(frame.from_user_mode());
        let cpu = h.cpu.lock();
        assert_eq!(cpu.kernel_stack, t.kernel_stack.top());
        assert_eq!(cpu.storage_base, 0x7000_0000);
        assert_eq!(cpu.data_selector, USER_DATA_SELECTOR);
    }

    #[test]
    fn test_undefined_vector_is_counted_and_ignored() {
        let mut h = Harness::new();
        let mut frame = RegisterSnapshot::for_vector(120);
        h.trap(&mut frame);
        h.trap(&mut frame);

        assert_eq!(h.kernel.vectors.vector_raised_count(120), 2);
        assert!(!h
            .kernel
            .vectors
            .get(120)
            .flags
            .contains(VectorFlags::NOTIFY_UNHANDLED));
        assert_eq!(h.eois(), vec![120, 120]);
    }

    #[test]
    fn test_clock_is_not_counted_as_custom() {
        let mut h = Harness::new();
        h.tick();
        h.tick();
        assert_eq!(h.kernel.vectors.raised_count(), 2);
        assert_eq!(h.kernel.vectors.raised_count_custom(), 0);
    }

    #[test]
    #[should_panic(expected = "no handler for vector 77")]
    fn test_missing_handler_is_fatal() {
        let mut h = Harness::new();
        h.kernel.vectors.unregister(77);
        h.trap(&mut RegisterSnapshot::for_vector(77));
    }

    #[test]
    #[should_panic(expected = "invalid interrupt vector 300")]
    fn test_vector_out_of_range_is_fatal() {
        let mut h = Harness::new();
        let mut frame = RegisterSnapshot::default();
        frame.interrupt = 300;
        h.trap(&mut frame);
    }

    #[test]
    #[should_panic(expected = "cpu exception 13: General Protection Exception")]
    fn test_general_protection_is_fatal() {
        let mut h = Harness::new();
        h.trap(&mut RegisterSnapshot::for_vector(13));
    }

    #[test]
    #[should_panic(expected = "page fault: null pointer dereference")]
    fn test_null_page_fault_is_fatal() {
        let mut h = Harness::new();
        h.cpu.lock().fault_address = 0x10;
        h.trap(&mut RegisterSnapshot::for_vector(14));
    }

    #[test]
    #[should_panic(expected = "unflushed vector table")]
    fn test_start_with_unflushed_gates_is_fatal() {
        let mut h = Harness::new();
        h.kernel.vectors.set_privilege_level(200, 3);
        h.kernel.start();
    }

    #[test]
    fn test_flush_commits_gate_privileges() {
        let h = Harness::new();
        let cpu = h.cpu.lock();
        assert_eq!(cpu.table_loads, 1);
        assert_eq!(cpu.gates[250].privilege, 3);
        assert_eq!(cpu.gates[251].privilege, 3);
        assert_eq!(cpu.gates[32].privilege, 0);
        assert_eq!(cpu.gates[8].stack_index, Some(0));
    }
}

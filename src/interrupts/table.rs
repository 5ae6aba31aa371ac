//! Interrupt vector table.
//!
//! One [`VectorRegistration`] per vector: the handlers the dispatcher calls
//! and the gate attributes (privilege, IST slot) the CPU sees. Gate edits
//! only reach the CPU on [`InterruptTable::flush`]; until then the table is
//! dirty and the kernel refuses to start.

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::interrupts::frame::RegisterSnapshot;
use crate::kernel::Kernel;
use crate::platform::{Gate, Platform};
use crate::task::ProcessId;

pub const VECTOR_COUNT: usize = 256;

/// Primary or pre-handler for a vector. Runs with interrupts masked.
pub type InterruptHandler = fn(&mut Kernel, &mut RegisterSnapshot);

bitflags! {
    pub struct VectorFlags: u8 {
        /// Emit a trace record per trap when interrupt tracing is on.
        const TRACE = 1 << 0;
        /// Count the trap in the custom and per-vector counters.
        const COUNT_STATISTICS = 1 << 1;
        /// The undefined handler has not reported this vector yet.
        const NOTIFY_UNHANDLED = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VectorRegistration {
    pub pre_handler: Option<InterruptHandler>,
    pub handler: Option<InterruptHandler>,
    pub flags: VectorFlags,
    /// Process whose service receives this vector.
    pub service: Option<ProcessId>,
    pub privilege: u8,
    pub stack_index: Option<u16>,
    pub raised: u64,
}

impl VectorRegistration {
    const fn empty() -> Self {
        Self {
            pre_handler: None,
            handler: None,
            flags: VectorFlags::empty(),
            service: None,
            privilege: 0,
            stack_index: None,
            raised: 0,
        }
    }
}

pub struct InterruptTable {
    vectors: Vec<VectorRegistration>,
    enabled: bool,
    dirty: bool,
    raised: u64,
    raised_custom: u64,
}

impl InterruptTable {
    pub fn new() -> Self {
        Self {
            vectors: (0..VECTOR_COUNT).map(|_| VectorRegistration::empty()).collect(),
            enabled: false,
            dirty: true,
            raised: 0,
            raised_custom: 0,
        }
    }

    pub fn register(
        &mut self,
        vector: u8,
        handler: InterruptHandler,
        pre_handler: Option<InterruptHandler>,
        trace: bool,
        count_statistics: bool,
    ) {
        let entry = &mut self.vectors[vector as usize];
        entry.handler = Some(handler);
        entry.pre_handler = pre_handler;
        entry.flags.set(VectorFlags::TRACE, trace);
        entry.flags.set(VectorFlags::COUNT_STATISTICS, count_statistics);
    }

    /// Drop both handlers. Raising the vector afterwards is fatal.
    pub fn unregister(&mut self, vector: u8) {
        let entry = &mut self.vectors[vector as usize];
        entry.handler = None;
        entry.pre_handler = None;
    }

    /// Replace only the primary handler and the owning service.
    pub fn set_interrupt_handler(
        &mut self,
        vector: u8,
        handler: InterruptHandler,
        service: Option<ProcessId>,
    ) {
        let entry = &mut self.vectors[vector as usize];
        entry.handler = Some(handler);
        entry.service = service;
    }

    pub fn set_privilege_level(&mut self, vector: u8, privilege: u8) {
        let entry = &mut self.vectors[vector as usize];
        if entry.privilege != privilege {
            entry.privilege = privilege;
            self.dirty = true;
        }
    }

    pub fn set_stack_index(&mut self, vector: u8, stack_index: Option<u16>) {
        let entry = &mut self.vectors[vector as usize];
        if entry.stack_index != stack_index {
            entry.stack_index = stack_index;
            self.dirty = true;
        }
    }

    pub fn set_owning_service(&mut self, vector: u8, service: Option<ProcessId>) {
        self.vectors[vector as usize].service = service;
    }

    pub fn set_flags(&mut self, vector: u8, flags: VectorFlags) {
        self.vectors[vector as usize].flags = flags;
    }

    pub fn get(&self, vector: u8) -> &VectorRegistration {
        &self.vectors[vector as usize]
    }

    /// Clear the notify latch; true if this call cleared it.
    pub fn take_unhandled_notification(&mut self, vector: u8) -> bool {
        let flags = &mut self.vectors[vector as usize].flags;
        let pending = flags.contains(VectorFlags::NOTIFY_UNHANDLED);
        flags.remove(VectorFlags::NOTIFY_UNHANDLED);
        pending
    }

    /// Count a trap and hand back a copy of the registration to run.
    pub fn note_raised(&mut self, vector: u8) -> VectorRegistration {
        self.raised = self.raised.wrapping_add(1);
        let entry = &mut self.vectors[vector as usize];
        if entry.flags.contains(VectorFlags::COUNT_STATISTICS) {
            self.raised_custom = self.raised_custom.wrapping_add(1);
            entry.raised = entry.raised.wrapping_add(1);
        }
        *entry
    }

    pub fn raised_count(&self) -> u64 {
        self.raised
    }

    pub fn raised_count_custom(&self) -> u64 {
        self.raised_custom
    }

    pub fn vector_raised_count(&self, vector: u8) -> u64 {
        self.vectors[vector as usize].raised
    }

    pub fn flush(&mut self, platform: &mut dyn Platform) {
        let mut gates = [Gate::default(); VECTOR_COUNT];
        for (gate, entry) in gates.iter_mut().zip(self.vectors.iter()) {
            gate.privilege = entry.privilege;
            gate.stack_index = entry.stack_index;
        }
        platform.load_vector_table(&gates);
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
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
}

impl Default for InterruptTable {
    fn default() -> Self {
        Self::new()
    }
}

//! CPU-visible memory bus.
//!
//! The gate array owns RAM and the ROM overlays but is shared with the
//! I/O port adapters, so the CPU cannot hold a long borrow of it. This
//! wrapper borrows per access, which also matches the hardware: the
//! gate array arbitrates the bus one cycle at a time.

use std::cell::RefCell;
use std::rc::Rc;

use emu_core::Bus;

use crate::gate_array::GateArray;

pub struct CpcBus {
    gate_array: Rc<RefCell<GateArray>>,
}

impl CpcBus {
    pub(crate) fn new(gate_array: Rc<RefCell<GateArray>>) -> Self {
        Self { gate_array }
    }
}

impl Bus for CpcBus {
    fn read(&mut self, address: u16) -> u8 {
        self.gate_array.borrow_mut().read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.gate_array.borrow_mut().write(address, value);
    }
}

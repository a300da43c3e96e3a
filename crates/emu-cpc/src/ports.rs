//! Device-side I/O port adapters.
//!
//! Each adapter owns a shared handle to its chip and implements the one
//! hardware port it decodes. The machine registers these on the
//! [`emu_core::IoBus`] with the CPC's partial-decode masks.

use std::cell::RefCell;
use std::rc::Rc;

use emu_core::IoPort;
use gi_ay_3_8910::Psg;
use intel_8255::{Ppi, PsgCommand};
use motorola_6845::Crtc;
use nec_upd765::Upd765;

use crate::gate_array::GateArray;

pub(crate) struct GateArrayPort {
    pub gate_array: Rc<RefCell<GateArray>>,
}

impl IoPort for GateArrayPort {
    fn write(&mut self, value: u8) {
        self.gate_array.borrow_mut().write_port(value);
    }

    fn read(&mut self) -> u8 {
        0xFF
    }
}

pub(crate) struct RomBankPort {
    pub gate_array: Rc<RefCell<GateArray>>,
}

impl IoPort for RomBankPort {
    fn write(&mut self, value: u8) {
        self.gate_array.borrow_mut().write_rom_bank(value);
    }

    fn read(&mut self) -> u8 {
        0xFF
    }
}

#[derive(Clone, Copy)]
pub(crate) enum CrtcFunction {
    SelectRegister,
    WriteRegister,
    Status,
    ReadRegister,
}

pub(crate) struct CrtcPort {
    pub crtc: Rc<RefCell<Crtc>>,
    pub function: CrtcFunction,
}

impl IoPort for CrtcPort {
    fn write(&mut self, value: u8) {
        match self.function {
            CrtcFunction::SelectRegister => self.crtc.borrow_mut().select_register(value),
            CrtcFunction::WriteRegister => self.crtc.borrow_mut().write_register(value),
            CrtcFunction::Status | CrtcFunction::ReadRegister => {}
        }
    }

    fn read(&mut self) -> u8 {
        match self.function {
            CrtcFunction::Status => self.crtc.borrow().read_status(),
            CrtcFunction::ReadRegister => self.crtc.borrow().read_register(),
            CrtcFunction::SelectRegister | CrtcFunction::WriteRegister => 0xFF,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum PpiRegister {
    PortA,
    PortB,
    PortC,
    Control,
}

/// 8255 port adapter. Writes that change the port C function lines are
/// forwarded to the sound chip here, so the PSG transaction completes
/// within the same OUT instruction, as it does on the shared bus.
pub(crate) struct PpiPort {
    pub ppi: Rc<RefCell<Ppi>>,
    pub psg: Rc<RefCell<Psg>>,
    pub register: PpiRegister,
}

impl PpiPort {
    fn run_psg_transaction(&mut self) {
        let mut ppi = self.ppi.borrow_mut();
        let mut psg = self.psg.borrow_mut();
        psg.select_keyboard_row(ppi.keyboard_row());
        match ppi.take_psg_command() {
            Some(PsgCommand::Read) => {
                let value = psg.read();
                ppi.set_port_a(value);
            }
            Some(PsgCommand::Write(value)) => psg.write(value),
            Some(PsgCommand::SelectRegister(value)) => psg.select_register(value),
            None => {}
        }
    }
}

impl IoPort for PpiPort {
    fn write(&mut self, value: u8) {
        match self.register {
            PpiRegister::PortA => self.ppi.borrow_mut().write_port_a(value),
            PpiRegister::PortB => self.ppi.borrow_mut().write_port_b(value),
            PpiRegister::PortC => {
                self.ppi.borrow_mut().write_port_c(value);
                self.run_psg_transaction();
            }
            PpiRegister::Control => {
                self.ppi.borrow_mut().write_control(value);
                self.run_psg_transaction();
            }
        }
    }

    fn read(&mut self) -> u8 {
        match self.register {
            PpiRegister::PortA => {
                // A fresh keyboard read each time the firmware polls.
                let mut ppi = self.ppi.borrow_mut();
                if ppi.psg_function() == intel_8255::PsgFunction::Read {
                    let value = self.psg.borrow().read();
                    ppi.set_port_a(value);
                }
                ppi.read_port_a()
            }
            PpiRegister::PortB => self.ppi.borrow().read_port_b(),
            PpiRegister::PortC => self.ppi.borrow().read_port_c(),
            PpiRegister::Control => 0xFF,
        }
    }
}

pub(crate) struct FdcMotorPort {
    pub fdc: Rc<RefCell<Upd765>>,
}

impl IoPort for FdcMotorPort {
    fn write(&mut self, value: u8) {
        self.fdc.borrow_mut().write_motor(value);
    }

    fn read(&mut self) -> u8 {
        0xFF
    }
}

#[derive(Clone, Copy)]
pub(crate) enum FdcRegister {
    Status,
    Data,
}

pub(crate) struct FdcPort {
    pub fdc: Rc<RefCell<Upd765>>,
    pub register: FdcRegister,
}

impl IoPort for FdcPort {
    fn write(&mut self, value: u8) {
        if matches!(self.register, FdcRegister::Data) {
            self.fdc.borrow_mut().write_data(value);
        }
    }

    fn read(&mut self) -> u8 {
        match self.register {
            FdcRegister::Status => self.fdc.borrow().read_msr(),
            FdcRegister::Data => self.fdc.borrow_mut().read_data(),
        }
    }
}

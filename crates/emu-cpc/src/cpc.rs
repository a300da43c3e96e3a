//! Top-level CPC system.
//!
//! The CPU runs at 4 MHz and drives time for everything else: the gate
//! array ticks the CRTC and FDC once every 4 T-states (their 1 MHz
//! character clock). Scanline and frame boundaries come back out of the
//! CRTC's sync outputs.
//!
//! # Frame loop
//!
//! `run_frame()` steps the CPU until the CRTC's vsync pulse ends. With
//! the firmware's CRTC programming that is 19,968 character clocks, a
//! hair under 80,000 T-states at 50 Hz.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use emu_core::{IoBus, MasterClock, Ticks};
use gi_ay_3_8910::Psg;
use intel_8255::Ppi;
use motorola_6845::Crtc;
use nec_upd765::{DskError, DskImage, Upd765};
use zilog_z80::Z80;

use crate::bus::CpcBus;
use crate::config::CpcConfig;
use crate::gate_array::GateArray;
use crate::ports::{
    CrtcFunction, CrtcPort, FdcMotorPort, FdcPort, FdcRegister, GateArrayPort, PpiPort,
    PpiRegister, RomBankPort,
};

/// CPU crystal frequency.
const CPU_CLOCK: MasterClock = MasterClock::new(4_000_000);

/// T-states per CRTC/FDC tick (4 MHz CPU, 1 MHz character clock).
const PERIPHERAL_DIVIDER: u32 = 4;

/// Upper ROM bank holding BASIC.
const BANK_BASIC: u8 = 0;

/// Upper ROM bank holding AMSDOS.
const BANK_AMSDOS: u8 = 7;

/// Amstrad CPC system.
pub struct Cpc {
    cpu: Z80,
    bus: CpcBus,
    io: IoBus,
    gate_array: Rc<RefCell<GateArray>>,
    crtc: Rc<RefCell<Crtc>>,
    ppi: Rc<RefCell<Ppi>>,
    psg: Rc<RefCell<Psg>>,
    fdc: Rc<RefCell<Upd765>>,
    peripheral_phase: u32,
    hsync_state: bool,
    vsync_state: bool,
    frame_done: bool,
    frame_count: u64,
    /// CPU T-states executed since power-on.
    total_ticks: Ticks,
}

impl Cpc {
    /// Build the machine and wire the I/O port map.
    ///
    /// # Errors
    ///
    /// Fails on wrongly sized ROM images or an unparseable disk image.
    pub fn new(config: CpcConfig) -> Result<Self, String> {
        config.validate()?;

        let mut upper_roms = HashMap::new();
        upper_roms.insert(BANK_BASIC, config.basic_rom);
        if let Some(rom) = config.amsdos_rom {
            upper_roms.insert(BANK_AMSDOS, rom);
        }

        let mut fdc = Upd765::new();
        if let Some(disk) = &config.disk {
            let image = DskImage::from_bytes(disk).map_err(|e| e.to_string())?;
            fdc.insert_disk(0, image);
        }

        let gate_array = Rc::new(RefCell::new(GateArray::new(config.os_rom, upper_roms)));
        let crtc = Rc::new(RefCell::new(Crtc::new()));
        let ppi = Rc::new(RefCell::new(Ppi::new()));
        let psg = Rc::new(RefCell::new(Psg::new()));
        let fdc = Rc::new(RefCell::new(fdc));

        let mut io = IoBus::new();
        io.connect(
            0xC000,
            0x4000,
            Rc::new(RefCell::new(GateArrayPort {
                gate_array: gate_array.clone(),
            })),
        );
        for (address, function) in [
            (0x0000, CrtcFunction::SelectRegister),
            (0x0100, CrtcFunction::WriteRegister),
            (0x0200, CrtcFunction::Status),
            (0x0300, CrtcFunction::ReadRegister),
        ] {
            io.connect(
                0x4300,
                address,
                Rc::new(RefCell::new(CrtcPort {
                    crtc: crtc.clone(),
                    function,
                })),
            );
        }
        io.connect(
            0x2000,
            0x0000,
            Rc::new(RefCell::new(RomBankPort {
                gate_array: gate_array.clone(),
            })),
        );
        for (address, register) in [
            (0x0000, PpiRegister::PortA),
            (0x0100, PpiRegister::PortB),
            (0x0200, PpiRegister::PortC),
            (0x0300, PpiRegister::Control),
        ] {
            io.connect(
                0x0B00,
                address,
                Rc::new(RefCell::new(PpiPort {
                    ppi: ppi.clone(),
                    psg: psg.clone(),
                    register,
                })),
            );
        }
        io.connect(
            0x0580,
            0x0000,
            Rc::new(RefCell::new(FdcMotorPort { fdc: fdc.clone() })),
        );
        for (address, register) in [(0x0100, FdcRegister::Status), (0x0101, FdcRegister::Data)] {
            io.connect(
                0x0581,
                address,
                Rc::new(RefCell::new(FdcPort {
                    fdc: fdc.clone(),
                    register,
                })),
            );
        }

        Ok(Self {
            cpu: Z80::new(),
            bus: CpcBus::new(gate_array.clone()),
            io,
            gate_array,
            crtc,
            ppi,
            psg,
            fdc,
            peripheral_phase: 0,
            hsync_state: false,
            vsync_state: false,
            frame_done: false,
            frame_count: 0,
            total_ticks: Ticks::ZERO,
        })
    }

    /// Execute one CPU step and the peripheral time it covers.
    /// Returns the T-states consumed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus, &mut self.io);
        if self.cpu.take_interrupt_ack() {
            self.gate_array.borrow_mut().acknowledge_interrupt();
        }
        for _ in 0..cycles {
            self.peripheral_phase += 1;
            if self.peripheral_phase == PERIPHERAL_DIVIDER {
                self.peripheral_phase = 0;
                self.tick_peripherals();
            }
        }
        self.cpu.int_line = self.gate_array.borrow().interrupt_requested();
        self.total_ticks += Ticks::new(u64::from(cycles));
        cycles
    }

    /// Run until the end of the current video frame.
    /// Returns the T-states executed.
    pub fn run_frame(&mut self) -> u64 {
        self.frame_done = false;
        self.frame_count += 1;
        let mut tstates: u64 = 0;
        while !self.frame_done {
            tstates += u64::from(self.step());
        }
        tstates
    }

    fn tick_peripherals(&mut self) {
        let (hsync, vsync) = {
            let mut crtc = self.crtc.borrow_mut();
            crtc.tick();
            (crtc.hsync(), crtc.vsync())
        };
        self.fdc.borrow_mut().tick();

        if self.hsync_state && !hsync {
            self.gate_array.borrow_mut().end_of_line();
        }
        self.hsync_state = hsync;

        self.ppi.borrow_mut().set_vsync(vsync);
        if vsync && !self.vsync_state {
            self.gate_array.borrow_mut().vsync_start();
        }
        if self.vsync_state && !vsync {
            self.frame_done = true;
        }
        self.vsync_state = vsync;
    }

    /// Insert a DSK image into a drive.
    ///
    /// # Errors
    ///
    /// Fails if the image does not parse.
    pub fn insert_disk(&mut self, drive: usize, image: &[u8]) -> Result<(), DskError> {
        let image = DskImage::from_bytes(image)?;
        self.fdc.borrow_mut().insert_disk(drive, image);
        Ok(())
    }

    /// Press a key in the keyboard matrix.
    pub fn key_down(&mut self, row: usize, bit: u8) {
        self.psg.borrow_mut().set_key(row, bit);
    }

    /// Release a key.
    pub fn key_up(&mut self, row: usize, bit: u8) {
        self.psg.borrow_mut().clear_key(row, bit);
    }

    /// RAM contents at an address, ignoring the ROM overlays.
    #[must_use]
    pub fn ram(&self, address: u16) -> u8 {
        self.gate_array.borrow().ram()[address as usize]
    }

    /// Current screen mode.
    #[must_use]
    pub fn mode(&self) -> u8 {
        self.gate_array.borrow().mode()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// T-states executed since power-on.
    #[must_use]
    pub fn total_ticks(&self) -> Ticks {
        self.total_ticks
    }

    /// Nominal T-states per 50 Hz frame.
    #[must_use]
    pub fn ticks_per_frame() -> Ticks {
        CPU_CLOCK.ticks_per_frame(50)
    }

    /// Reference to the CPU.
    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    /// Mutable reference to the CPU.
    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }
}

//! CPU state machine.
//!
//! `step` runs one instruction (or services one pending interrupt) and
//! returns the T-states consumed. Interrupts are sampled at instruction
//! boundaries and serviced one step later, matching the hardware's
//! end-of-instruction interrupt sampling.

use emu_core::{Bus, IoBus};

use crate::decoder::Decoder;
use crate::execute;
use crate::flags::Flags;
use crate::registers::Registers;

/// T-states consumed by an accepted IM 1 interrupt.
const INT_ACK_CYCLES: u32 = 13;

/// IM 1 restart vector.
const INT_VECTOR: u16 = 0x0038;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Execute,
    CheckInterrupt,
}

/// Zilog Z80 CPU.
pub struct Z80 {
    pub regs: Registers,
    pub flags: Flags,
    /// Primary interrupt-enable flip-flop.
    pub iff1: bool,
    /// Secondary flip-flop, saved copy during NMI/interrupt (RETN restores).
    pub iff2: bool,
    /// Interrupt mode (0, 1 or 2; only 1 is serviced).
    pub im: u8,
    /// Maskable interrupt request line. Peripherals raise it; only the
    /// acknowledge tells them to drop it.
    pub int_line: bool,
    int_ack: bool,
    pub(crate) halted: bool,
    state: State,
    pub(crate) decoder: Decoder,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::new(),
            flags: Flags::default(),
            iff1: false,
            iff2: false,
            im: 0,
            int_line: false,
            int_ack: false,
            halted: false,
            state: State::Execute,
            decoder: Decoder::new(),
        };
        cpu.reset();
        cpu
    }

    /// Hardware reset: PC to 0, interrupts off, AF and SP high.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.regs.set_af(0xFFFF);
        self.regs.sp = 0xFFFF;
        self.flags = Flags::unpack(self.regs.f);
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.int_line = false;
        self.int_ack = false;
        self.halted = false;
        self.state = State::Execute;
        self.decoder.flush();
    }

    /// Execute one step; returns T-states consumed.
    pub fn step(&mut self, bus: &mut dyn Bus, io: &mut IoBus) -> u32 {
        match self.state {
            State::Execute => {
                let cycles = if self.halted {
                    // Halted CPU executes internal NOPs until an interrupt.
                    4
                } else {
                    self.execute_one(bus, io)
                };
                if self.iff1 && self.int_line {
                    self.state = State::CheckInterrupt;
                }
                cycles
            }
            State::CheckInterrupt => {
                self.state = State::Execute;
                if self.im == 1 {
                    self.service_im1(bus)
                } else {
                    0
                }
            }
        }
    }

    fn execute_one(&mut self, bus: &mut dyn Bus, io: &mut IoBus) -> u32 {
        let instruction = self.decoder.decode(self.regs.pc, bus);
        log::trace!("{:04X}  {}", instruction.address, instruction);
        self.regs.increment_r();

        // PC moves past the instruction before it runs, so relative
        // targets and pushed return addresses come out right.
        self.regs.pc = self.regs.pc.wrapping_add(instruction.size);

        let mut watched = WatchedBus::new(bus, instruction.address, instruction.size);
        let cycles = execute::execute(self, &mut watched, io, &instruction);
        if watched.hit {
            // The instruction overwrote its own bytes.
            self.decoder.flush();
        }
        self.regs.f = self.flags.pack();
        cycles
    }

    fn service_im1(&mut self, bus: &mut dyn Bus) -> u32 {
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        let pc = self.regs.pc;
        self.decoder.invalidate_write(self.regs.sp.wrapping_sub(1));
        self.decoder.invalidate_write(self.regs.sp.wrapping_sub(2));
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, (pc >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, pc as u8);
        self.regs.pc = INT_VECTOR;
        self.regs.wz = INT_VECTOR;
        self.int_ack = true;
        INT_ACK_CYCLES
    }

    /// True once per serviced interrupt; reading clears it. Peripherals
    /// with edge-held request lines poll this to deassert them.
    pub fn take_interrupt_ack(&mut self) -> bool {
        std::mem::take(&mut self.int_ack)
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Drop the decode cache. Call after writing memory behind the CPU's
    /// back (snapshot or ROM loads).
    pub fn invalidate_decode_cache(&mut self) {
        self.decoder.flush();
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus wrapper that watches writes against the executing instruction's
/// byte range, so self-modifying code drops the decode cache.
struct WatchedBus<'a> {
    inner: &'a mut dyn Bus,
    start: u16,
    len: u16,
    hit: bool,
}

impl<'a> WatchedBus<'a> {
    fn new(inner: &'a mut dyn Bus, start: u16, len: u16) -> Self {
        Self {
            inner,
            start,
            len,
            hit: false,
        }
    }
}

impl Bus for WatchedBus<'_> {
    fn read(&mut self, address: u16) -> u8 {
        self.inner.read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        if address.wrapping_sub(self.start) < self.len {
            self.hit = true;
        }
        self.inner.write(address, value);
    }
}

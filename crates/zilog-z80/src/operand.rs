//! Decoded operands and condition codes.
//!
//! An operand is valid only for the instruction that produced it. All
//! access goes through explicit register-file and bus parameters; operands
//! hold no references of their own.

use std::fmt;

use emu_core::Bus;

use crate::flags::Flags;
use crate::registers::{Reg, Registers};

/// Jump/call/return condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    /// Not zero.
    Nz,
    /// Zero.
    Z,
    /// No carry.
    Nc,
    /// Carry.
    C,
    /// Parity odd.
    Po,
    /// Parity even.
    Pe,
    /// Sign positive.
    P,
    /// Sign negative.
    M,
}

impl Cond {
    /// Evaluate against the current flags.
    #[must_use]
    pub const fn satisfied(self, flags: Flags) -> bool {
        match self {
            Self::Nz => !flags.zero,
            Self::Z => flags.zero,
            Self::Nc => !flags.carry,
            Self::C => flags.carry,
            Self::Po => !flags.parity_overflow,
            Self::Pe => flags.parity_overflow,
            Self::P => !flags.sign,
            Self::M => flags.sign,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nz => "NZ",
            Self::Z => "Z",
            Self::Nc => "NC",
            Self::C => "C",
            Self::Po => "PO",
            Self::Pe => "PE",
            Self::P => "P",
            Self::M => "M",
        }
    }
}

/// Where an instruction's data comes from or goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A register, by closed identifier.
    Register(Reg),
    /// Memory at a literal address.
    Direct(u16),
    /// Memory at register plus signed displacement ((HL), (IX+d), ...).
    Indexed(Reg, i8),
    /// Literal byte from the instruction stream.
    Immediate8(u8),
    /// Literal word from the instruction stream.
    Immediate16(u16),
    /// A condition code; read/write never apply.
    Condition(Cond),
    /// Static bit number baked into the opcode (BIT/SET/RES/IM/RST).
    Bit(u8),
}

impl Operand {
    /// Effective memory address. Only meaningful for the memory classes;
    /// anything else is a decode bug.
    #[must_use]
    pub fn address(self, regs: &Registers) -> u16 {
        match self {
            Self::Direct(address) => address,
            Self::Indexed(reg, displacement) => {
                reg.get(regs).wrapping_add(displacement as u16)
            }
            _ => unreachable!("operand {self:?} has no address"),
        }
    }

    /// Read as a byte.
    pub fn read8(self, regs: &Registers, bus: &mut dyn Bus) -> u8 {
        match self {
            Self::Register(reg) => reg.get(regs) as u8,
            Self::Immediate8(value) => value,
            Self::Bit(value) => value,
            Self::Direct(_) | Self::Indexed(..) => bus.read(self.address(regs)),
            Self::Immediate16(_) | Self::Condition(_) => {
                unreachable!("operand {self:?} is not byte-readable")
            }
        }
    }

    /// Read as a word. Memory operands read little-endian.
    pub fn read16(self, regs: &Registers, bus: &mut dyn Bus) -> u16 {
        match self {
            Self::Register(reg) => reg.get(regs),
            Self::Immediate16(value) => value,
            Self::Direct(_) | Self::Indexed(..) => {
                let address = self.address(regs);
                let lo = bus.read(address);
                let hi = bus.read(address.wrapping_add(1));
                u16::from(hi) << 8 | u16::from(lo)
            }
            Self::Immediate8(_) | Self::Condition(_) | Self::Bit(_) => {
                unreachable!("operand {self:?} is not word-readable")
            }
        }
    }

    /// Write a byte.
    pub fn write8(self, regs: &mut Registers, bus: &mut dyn Bus, value: u8) {
        match self {
            Self::Register(reg) => reg.set(regs, u16::from(value)),
            Self::Direct(_) | Self::Indexed(..) => bus.write(self.address(regs), value),
            _ => unreachable!("operand {self:?} is not writable"),
        }
    }

    /// Write a word. Memory operands write little-endian.
    pub fn write16(self, regs: &mut Registers, bus: &mut dyn Bus, value: u16) {
        match self {
            Self::Register(reg) => reg.set(regs, value),
            Self::Direct(_) | Self::Indexed(..) => {
                let address = self.address(regs);
                bus.write(address, value as u8);
                bus.write(address.wrapping_add(1), (value >> 8) as u8);
            }
            _ => unreachable!("operand {self:?} is not writable"),
        }
    }

    /// The condition code, for conditional control transfer.
    #[must_use]
    pub fn condition(self) -> Option<Cond> {
        match self {
            Self::Condition(cond) => Some(cond),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Register(reg) => f.write_str(reg.name()),
            Self::Direct(address) => write!(f, "(0x{address:04X})"),
            Self::Indexed(reg, 0) => write!(f, "({})", reg.name()),
            Self::Indexed(reg, d) if d < 0 => write!(f, "({}-0x{:02X})", reg.name(), -i16::from(d)),
            Self::Indexed(reg, d) => write!(f, "({}+0x{d:02X})", reg.name()),
            Self::Immediate8(value) => write!(f, "0x{value:02X}"),
            Self::Immediate16(value) => write!(f, "0x{value:04X}"),
            Self::Condition(cond) => f.write_str(cond.name()),
            Self::Bit(value) => write!(f, "{value}"),
        }
    }
}

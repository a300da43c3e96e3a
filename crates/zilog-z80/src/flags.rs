//! Z80 flag register.
//!
//! Operations manipulate six independent booleans; the F register byte is
//! only materialized when an instruction moves F as data (PUSH AF, EX AF).

/// Sign flag (bit 7) - set if result is negative.
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6) - set if result is zero.
pub const ZF: u8 = 0b0100_0000;

/// Half-carry flag (bit 4) - carry from bit 3 to bit 4.
pub const HF: u8 = 0b0001_0000;

/// Parity/Overflow flag (bit 2) - parity or overflow depending on instruction.
pub const PF: u8 = 0b0000_0100;

/// Add/Subtract flag (bit 1) - set if last operation was subtraction.
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0) - carry out of bit 7.
pub const CF: u8 = 0b0000_0001;

/// Compute parity of a byte (true if even number of 1 bits).
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

/// The six architectural condition flags, unpacked.
///
/// Bits 3 and 5 of F (the undocumented X/Y copies of the result) are not
/// modelled; they pack as zero and are dropped on unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub carry: bool,
    pub add_subtract: bool,
    pub parity_overflow: bool,
    pub half_carry: bool,
    pub zero: bool,
    pub sign: bool,
}

impl Flags {
    /// Pack into the F register byte layout.
    #[must_use]
    pub const fn pack(self) -> u8 {
        let mut f = 0;
        if self.carry {
            f |= CF;
        }
        if self.add_subtract {
            f |= NF;
        }
        if self.parity_overflow {
            f |= PF;
        }
        if self.half_carry {
            f |= HF;
        }
        if self.zero {
            f |= ZF;
        }
        if self.sign {
            f |= SF;
        }
        f
    }

    /// Unpack from the F register byte layout.
    #[must_use]
    pub const fn unpack(f: u8) -> Self {
        Self {
            carry: f & CF != 0,
            add_subtract: f & NF != 0,
            parity_overflow: f & PF != 0,
            half_carry: f & HF != 0,
            zero: f & ZF != 0,
            sign: f & SF != 0,
        }
    }
}

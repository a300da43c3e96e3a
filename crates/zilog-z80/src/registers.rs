//! Z80 register file.

/// The full architectural register set.
///
/// Pairs (AF, BC, DE, HL) are stored as their 8-bit halves; the 16-bit
/// views are composed on access, so half and pair views can never
/// disagree. WZ is the internal address latch (MEMPTR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Shadow set (EX AF,AF' / EXX)
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub wz: u16,

    /// Interrupt vector base.
    pub i: u8,
    /// Memory refresh counter (bit 7 preserved across increments).
    pub r: u8,
}

macro_rules! register_pair {
    ($get:ident, $set:ident, $hi:ident, $lo:ident) => {
        #[must_use]
        pub const fn $get(&self) -> u16 {
            (self.$hi as u16) << 8 | self.$lo as u16
        }

        pub const fn $set(&mut self, value: u16) {
            self.$hi = (value >> 8) as u8;
            self.$lo = value as u8;
        }
    };
}

impl Registers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    register_pair!(af, set_af, a, f);
    register_pair!(bc, set_bc, b, c);
    register_pair!(de, set_de, d, e);
    register_pair!(hl, set_hl, h, l);
    register_pair!(af_alt, set_af_alt, a_alt, f_alt);
    register_pair!(bc_alt, set_bc_alt, b_alt, c_alt);
    register_pair!(de_alt, set_de_alt, d_alt, e_alt);
    register_pair!(hl_alt, set_hl_alt, h_alt, l_alt);

    /// Bump the refresh counter: low 7 bits increment, bit 7 sticks.
    pub const fn increment_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }
}

/// Closed identifier for every addressable register.
///
/// Decode resolves operands to these; there is no name-based lookup
/// anywhere in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    I,
    R,
    Af,
    Bc,
    De,
    Hl,
    Ix,
    Iy,
    Sp,
    Pc,
    AfAlt,
}

impl Reg {
    /// True for the 16-bit views.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(
            self,
            Self::Af | Self::Bc | Self::De | Self::Hl | Self::Ix | Self::Iy | Self::Sp | Self::Pc | Self::AfAlt
        )
    }

    /// Read the register; 8-bit registers occupy the low byte.
    #[must_use]
    pub fn get(self, regs: &Registers) -> u16 {
        match self {
            Self::A => u16::from(regs.a),
            Self::F => u16::from(regs.f),
            Self::B => u16::from(regs.b),
            Self::C => u16::from(regs.c),
            Self::D => u16::from(regs.d),
            Self::E => u16::from(regs.e),
            Self::H => u16::from(regs.h),
            Self::L => u16::from(regs.l),
            Self::Ixh => regs.ix >> 8,
            Self::Ixl => regs.ix & 0xFF,
            Self::Iyh => regs.iy >> 8,
            Self::Iyl => regs.iy & 0xFF,
            Self::I => u16::from(regs.i),
            Self::R => u16::from(regs.r),
            Self::Af => regs.af(),
            Self::Bc => regs.bc(),
            Self::De => regs.de(),
            Self::Hl => regs.hl(),
            Self::Ix => regs.ix,
            Self::Iy => regs.iy,
            Self::Sp => regs.sp,
            Self::Pc => regs.pc,
            Self::AfAlt => regs.af_alt(),
        }
    }

    /// Write the register, truncating to its width.
    pub fn set(self, regs: &mut Registers, value: u16) {
        let byte = value as u8;
        match self {
            Self::A => regs.a = byte,
            Self::F => regs.f = byte,
            Self::B => regs.b = byte,
            Self::C => regs.c = byte,
            Self::D => regs.d = byte,
            Self::E => regs.e = byte,
            Self::H => regs.h = byte,
            Self::L => regs.l = byte,
            Self::Ixh => regs.ix = (regs.ix & 0x00FF) | u16::from(byte) << 8,
            Self::Ixl => regs.ix = (regs.ix & 0xFF00) | u16::from(byte),
            Self::Iyh => regs.iy = (regs.iy & 0x00FF) | u16::from(byte) << 8,
            Self::Iyl => regs.iy = (regs.iy & 0xFF00) | u16::from(byte),
            Self::I => regs.i = byte,
            Self::R => regs.r = byte,
            Self::Af => regs.set_af(value),
            Self::Bc => regs.set_bc(value),
            Self::De => regs.set_de(value),
            Self::Hl => regs.set_hl(value),
            Self::Ix => regs.ix = value,
            Self::Iy => regs.iy = value,
            Self::Sp => regs.sp = value,
            Self::Pc => regs.pc = value,
            Self::AfAlt => regs.set_af_alt(value),
        }
    }

    /// Assembly name, for trace output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::F => "F",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::H => "H",
            Self::L => "L",
            Self::Ixh => "IXH",
            Self::Ixl => "IXL",
            Self::Iyh => "IYH",
            Self::Iyl => "IYL",
            Self::I => "I",
            Self::R => "R",
            Self::Af => "AF",
            Self::Bc => "BC",
            Self::De => "DE",
            Self::Hl => "HL",
            Self::Ix => "IX",
            Self::Iy => "IY",
            Self::Sp => "SP",
            Self::Pc => "PC",
            Self::AfAlt => "AF'",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_views_stay_consistent_with_halves() {
        let mut regs = Registers::new();
        let pairs: [(fn(&mut Registers, u16), Reg, Reg); 4] = [
            (Registers::set_af, Reg::A, Reg::F),
            (Registers::set_bc, Reg::B, Reg::C),
            (Registers::set_de, Reg::D, Reg::E),
            (Registers::set_hl, Reg::H, Reg::L),
        ];
        for (set, hi, lo) in pairs {
            set(&mut regs, 0x1234);
            assert_eq!(hi.get(&regs), 0x12);
            assert_eq!(lo.get(&regs), 0x34);
        }

        regs.b = 0xAB;
        regs.c = 0xCD;
        assert_eq!(regs.bc(), 0xABCD);
    }

    #[test]
    fn index_halves_alias_the_index_register() {
        let mut regs = Registers::new();
        regs.ix = 0x55AA;
        assert_eq!(Reg::Ixh.get(&regs), 0x55);
        assert_eq!(Reg::Ixl.get(&regs), 0xAA);

        Reg::Iyh.set(&mut regs, 0x12);
        Reg::Iyl.set(&mut regs, 0x34);
        assert_eq!(regs.iy, 0x1234);
    }

    #[test]
    fn eight_bit_sets_truncate() {
        let mut regs = Registers::new();
        Reg::A.set(&mut regs, 0x1FF);
        assert_eq!(regs.a, 0xFF);
    }

    #[test]
    fn refresh_counter_preserves_bit_seven() {
        let mut regs = Registers::new();
        regs.r = 0xFF;
        regs.increment_r();
        assert_eq!(regs.r, 0x80);
        regs.r = 0x7F;
        regs.increment_r();
        assert_eq!(regs.r, 0x00);
    }
}

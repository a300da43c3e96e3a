//! Arithmetic and logic primitives.
//!
//! Everything funnels through [`add8`]: subtraction is addition of the
//! complement with inverted carry (the same trick the silicon uses), so
//! both share one flag derivation and the awkward boundary cases
//! (0 - 0, 0 - 0x80, 0x80 - 0x80) fall out identically.
//!
//! Arithmetic ops set the P/V flag from two's-complement overflow; logic
//! ops and rotates set it from bit-population parity. The two formulas
//! are distinct on purpose and must never be swapped.

use crate::flags::{Flags, parity};

/// Value plus the flags it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: Flags,
}

/// 8-bit add with carry-in. Sets all six flags; N cleared.
#[must_use]
pub fn add8(a: u8, b: u8, carry_in: bool) -> AluResult {
    let carry = u16::from(carry_in);
    let wide = u16::from(a) + u16::from(b) + carry;
    let value = wide as u8;
    let flags = Flags {
        carry: wide > 0xFF,
        add_subtract: false,
        // Overflow: operands agree in sign, result disagrees.
        parity_overflow: (!(a ^ b) & (a ^ value) & 0x80) != 0,
        half_carry: (a & 0x0F) + (b & 0x0F) + carry as u8 > 0x0F,
        zero: value == 0,
        sign: value & 0x80 != 0,
    };
    AluResult { value, flags }
}

/// 8-bit subtract with borrow-in, built on [`add8`].
///
/// `a - b - c` is `a + !b + !c`; carry and half-carry come back inverted
/// (they are borrows), and N is forced.
#[must_use]
pub fn sub8(a: u8, b: u8, carry_in: bool) -> AluResult {
    let mut r = add8(a, !b, !carry_in);
    r.flags.carry = !r.flags.carry;
    r.flags.half_carry = !r.flags.half_carry;
    r.flags.add_subtract = true;
    r
}

fn logic_flags(value: u8, half_carry: bool) -> Flags {
    Flags {
        carry: false,
        add_subtract: false,
        parity_overflow: parity(value),
        half_carry,
        zero: value == 0,
        sign: value & 0x80 != 0,
    }
}

/// AND: H is always set.
#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: logic_flags(value, true),
    }
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: logic_flags(value, false),
    }
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: logic_flags(value, false),
    }
}

/// INC r: carry is untouched, P/V flags the 0x7F boundary.
#[must_use]
pub fn inc8(value: u8, carry: bool) -> AluResult {
    let mut r = add8(value, 1, false);
    r.flags.carry = carry;
    r.flags.parity_overflow = value == 0x7F;
    r
}

/// DEC r: carry is untouched, P/V flags the 0x80 boundary.
#[must_use]
pub fn dec8(value: u8, carry: bool) -> AluResult {
    let mut r = sub8(value, 1, false);
    r.flags.carry = carry;
    r.flags.parity_overflow = value == 0x80;
    r
}

fn rotate_result(value: u8, carry_out: bool) -> AluResult {
    let mut flags = logic_flags(value, false);
    flags.carry = carry_out;
    AluResult { value, flags }
}

/// Rotate left circular: bit 7 to bit 0 and to carry.
#[must_use]
pub fn rlc8(value: u8) -> AluResult {
    rotate_result(value.rotate_left(1), value & 0x80 != 0)
}

/// Rotate right circular: bit 0 to bit 7 and to carry.
#[must_use]
pub fn rrc8(value: u8) -> AluResult {
    rotate_result(value.rotate_right(1), value & 0x01 != 0)
}

/// Rotate left through carry.
#[must_use]
pub fn rl8(value: u8, carry_in: bool) -> AluResult {
    rotate_result(value << 1 | u8::from(carry_in), value & 0x80 != 0)
}

/// Rotate right through carry.
#[must_use]
pub fn rr8(value: u8, carry_in: bool) -> AluResult {
    rotate_result(value >> 1 | u8::from(carry_in) << 7, value & 0x01 != 0)
}

/// Shift left arithmetic: zero into bit 0.
#[must_use]
pub fn sla8(value: u8) -> AluResult {
    rotate_result(value << 1, value & 0x80 != 0)
}

/// Shift right arithmetic: bit 7 duplicated.
#[must_use]
pub fn sra8(value: u8) -> AluResult {
    rotate_result(value >> 1 | (value & 0x80), value & 0x01 != 0)
}

/// Undocumented shift left: one into bit 0.
#[must_use]
pub fn sll8(value: u8) -> AluResult {
    rotate_result(value << 1 | 1, value & 0x80 != 0)
}

/// Shift right logical: zero into bit 7.
#[must_use]
pub fn srl8(value: u8) -> AluResult {
    rotate_result(value >> 1, value & 0x01 != 0)
}

/// Decimal adjust after add/subtract.
///
/// Correction nibbles are chosen from H, C and the digit ranges, then
/// applied in the direction recorded by N.
#[must_use]
pub fn daa(a: u8, flags: Flags) -> AluResult {
    let mut correction = 0u8;
    let mut carry = flags.carry;
    if flags.half_carry || a & 0x0F > 0x09 {
        correction |= 0x06;
    }
    if flags.carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }
    let value = if flags.add_subtract {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };
    AluResult {
        value,
        flags: Flags {
            carry,
            add_subtract: flags.add_subtract,
            parity_overflow: parity(value),
            half_carry: (a ^ value) & 0x10 != 0,
            zero: value == 0,
            sign: value & 0x80 != 0,
        },
    }
}

/// ADD HL,rr: two chained byte adds. Only C, H and N change; S, Z and
/// P/V ride through from the caller's flags.
#[must_use]
pub fn add16(a: u16, b: u16, flags: Flags) -> (u16, Flags) {
    let low = add8(a as u8, b as u8, false);
    let high = add8((a >> 8) as u8, (b >> 8) as u8, low.flags.carry);
    let value = u16::from(high.value) << 8 | u16::from(low.value);
    let flags = Flags {
        carry: high.flags.carry,
        add_subtract: false,
        half_carry: high.flags.half_carry,
        ..flags
    };
    (value, flags)
}

/// ADC HL,rr: chained byte adds with full 16-bit flag semantics.
#[must_use]
pub fn adc16(a: u16, b: u16, carry_in: bool) -> (u16, Flags) {
    let low = add8(a as u8, b as u8, carry_in);
    let high = add8((a >> 8) as u8, (b >> 8) as u8, low.flags.carry);
    let value = u16::from(high.value) << 8 | u16::from(low.value);
    // S, H, C and overflow follow the high byte; Z needs the whole word.
    let mut flags = high.flags;
    flags.zero = value == 0;
    (value, flags)
}

/// SBC HL,rr: chained byte subtracts with full 16-bit flag semantics.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry_in: bool) -> (u16, Flags) {
    let low = sub8(a as u8, b as u8, carry_in);
    let high = sub8((a >> 8) as u8, (b >> 8) as u8, low.flags.carry);
    let value = u16::from(high.value) << 8 | u16::from(low.value);
    let mut flags = high.flags;
    flags.zero = value == 0;
    (value, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sets_half_carry_on_nibble_overflow() {
        let r = add8(0x06, 0x0A, false);
        assert_eq!(r.value, 0x10);
        assert!(!r.flags.carry);
        assert!(r.flags.half_carry);
        assert!(!r.flags.zero);
        assert!(!r.flags.sign);
        assert!(!r.flags.parity_overflow);
    }

    #[test]
    fn add_overflow_needs_matching_operand_signs() {
        // 0x40 + 0x40: both positive, result negative.
        assert!(add8(0x40, 0x40, false).flags.parity_overflow);
        // 0x40 + 0xC0: signs differ, never overflows.
        assert!(!add8(0x40, 0xC0, false).flags.parity_overflow);
        // 0x80 + 0x80: both negative, result positive.
        assert!(add8(0x80, 0x80, false).flags.parity_overflow);
    }

    #[test]
    fn sub_matches_reference_table() {
        // (a, b, carry_in, result, carry_out, overflow)
        let vectors = [
            (0x00u8, 0x00u8, false, 0x00u8, false, false),
            (0x00, 0x01, false, 0xFF, true, false),
            (0x00, 0x7F, false, 0x81, true, false),
            (0x00, 0x80, false, 0x80, true, true),
            (0x00, 0xFF, false, 0x01, true, false),
            (0x7F, 0x7F, false, 0x00, false, false),
            (0x7F, 0x80, false, 0xFF, true, true),
            (0x7F, 0xFF, false, 0x80, true, true),
            (0x80, 0x01, false, 0x7F, false, true),
            (0x80, 0x80, false, 0x00, false, false),
            (0xFF, 0x7F, false, 0x80, false, false),
            (0xFF, 0xFF, false, 0x00, false, false),
            (0x00, 0x00, true, 0xFF, true, false),
            (0x7F, 0x7F, true, 0xFF, true, false),
            (0xFF, 0xFF, true, 0xFF, true, false),
        ];
        for (a, b, carry_in, value, carry, overflow) in vectors {
            let r = sub8(a, b, carry_in);
            assert_eq!(r.value, value, "SUB {a:02X},{b:02X} carry={carry_in}");
            assert_eq!(r.flags.carry, carry, "carry of {a:02X}-{b:02X}");
            assert_eq!(
                r.flags.parity_overflow, overflow,
                "overflow of {a:02X}-{b:02X}"
            );
            assert!(r.flags.add_subtract);
        }
    }

    #[test]
    fn sub_is_add_of_complement_with_inverted_borrows() {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                for carry_in in [false, true] {
                    let s = sub8(a, b, carry_in);
                    let d = add8(a, !b, !carry_in);
                    assert_eq!(s.value, d.value);
                    assert_eq!(s.flags.carry, !d.flags.carry);
                    assert_eq!(s.flags.half_carry, !d.flags.half_carry);
                    assert_eq!(s.flags.zero, d.flags.zero);
                    assert_eq!(s.flags.sign, d.flags.sign);
                    assert_eq!(s.flags.parity_overflow, d.flags.parity_overflow);
                    assert!(s.flags.add_subtract);
                    assert!(!d.flags.add_subtract);
                }
            }
        }
    }

    #[test]
    fn inc_dec_preserve_carry() {
        for carry in [false, true] {
            assert_eq!(inc8(0xFF, carry).flags.carry, carry);
            assert_eq!(dec8(0x00, carry).flags.carry, carry);
        }
        assert!(inc8(0x7F, false).flags.parity_overflow);
        assert!(!inc8(0x80, false).flags.parity_overflow);
        assert!(dec8(0x80, false).flags.parity_overflow);
        assert!(!dec8(0x00, false).flags.parity_overflow);
        assert!(inc8(0xFF, false).flags.zero);
    }

    #[test]
    fn rotate_right_through_carry_cycles_in_nine_steps() {
        let mut value = 0x00u8;
        let mut carry = true;
        let expected = [0x80u8, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01];
        for want in expected {
            let r = rr8(value, carry);
            value = r.value;
            carry = r.flags.carry;
            assert_eq!(value, want);
            assert!(!carry);
        }
        let r = rr8(value, carry);
        assert_eq!(r.value, 0x00);
        assert!(r.flags.carry);
    }

    #[test]
    fn shifts_and_circular_rotates() {
        assert_eq!(rlc8(0x81).value, 0x03);
        assert!(rlc8(0x81).flags.carry);
        assert_eq!(rrc8(0x01).value, 0x80);
        assert!(rrc8(0x01).flags.carry);
        assert_eq!(sla8(0xC1).value, 0x82);
        assert_eq!(sra8(0x81).value, 0xC0);
        assert!(sra8(0x81).flags.carry);
        assert_eq!(sll8(0x80).value, 0x01);
        assert_eq!(srl8(0x81).value, 0x40);
        assert!(srl8(0x81).flags.carry);
    }

    #[test]
    fn daa_corrects_bcd_addition() {
        // 0x11 + 0x19 = 0x2A, adjusts to 0x30.
        let sum = add8(0x11, 0x19, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x30);
        assert!(!r.flags.carry);

        // 0x99 + 0x01 = 0x9A, adjusts to 0x00 with carry.
        let sum = add8(0x99, 0x01, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x00);
        assert!(r.flags.carry);
        assert!(r.flags.zero);
    }

    #[test]
    fn daa_corrects_bcd_subtraction() {
        // 0x42 - 0x09 = 0x39 raw, 0x33 in BCD.
        let diff = sub8(0x42, 0x09, false);
        let r = daa(diff.value, diff.flags);
        assert_eq!(r.value, 0x33);
    }

    #[test]
    fn add16_preserves_sign_zero_parity() {
        let before = Flags {
            sign: true,
            zero: true,
            parity_overflow: true,
            ..Flags::default()
        };
        let (value, flags) = add16(0x0FFF, 0x0001, before);
        assert_eq!(value, 0x1000);
        assert!(flags.half_carry);
        assert!(!flags.carry);
        assert!(flags.sign && flags.zero && flags.parity_overflow);
    }

    #[test]
    fn adc16_and_sbc16_use_full_width_flags() {
        let (value, flags) = adc16(0xFFFF, 0x0000, true);
        assert_eq!(value, 0x0000);
        assert!(flags.zero);
        assert!(flags.carry);

        let (value, flags) = sbc16(0x0000, 0x0001, false);
        assert_eq!(value, 0xFFFF);
        assert!(flags.carry);
        assert!(flags.sign);
        assert!(!flags.zero);

        let (value, flags) = sbc16(0x8000, 0x0001, false);
        assert_eq!(value, 0x7FFF);
        assert!(flags.parity_overflow);
    }
}

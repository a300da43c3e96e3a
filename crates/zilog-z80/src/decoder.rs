//! Table-driven instruction decoder.
//!
//! Decode walks the prefix tables byte by byte, resolves the leaf's
//! operand tokens against the instruction stream, and memoizes the most
//! recent result by address. Tight loops (and the PC rewind the block
//! instructions use) hit the same address over and over, so the cache
//! pays for itself; writes that land inside the cached instruction's
//! bytes drop it so patched code is re-decoded.

use std::fmt;

use emu_core::Bus;

use crate::opcodes::{Entry, Op, OpcodeTable, Token};
use crate::operand::Operand;

/// Prefix chains never legitimately exceed this (DD CB d op is depth 2).
const MAX_PREFIX_DEPTH: u8 = 4;

/// One decoded instruction: operation, resolved operands, byte size and
/// T-state counts. Valid until code at its address is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub address: u16,
    pub op: Op,
    operands: [Operand; 3],
    operand_count: u8,
    /// Total bytes, including prefixes and inline data.
    pub size: u16,
    /// T-states when not taken (or unconditional).
    pub cycles: u8,
    /// T-states when a condition passes or a block op repeats.
    pub cycles_taken: u8,
}

impl Instruction {
    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        &self.operands[..self.operand_count as usize]
    }

    /// Operand by position; decode guarantees the count per opcode.
    #[must_use]
    pub fn operand(&self, index: usize) -> Operand {
        self.operands[index]
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.mnemonic())?;
        for (i, operand) in self.operands().iter().enumerate() {
            if i == 0 {
                write!(f, " {operand}")?;
            } else {
                write!(f, ",{operand}")?;
            }
        }
        Ok(())
    }
}

/// Decoder: owns the opcode tables and the single-entry decode cache.
pub struct Decoder {
    root: OpcodeTable,
    cached: Option<Instruction>,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: OpcodeTable::standard(),
            cached: None,
        }
    }

    /// Decode the instruction at `pc`, reusing the cached result when the
    /// address matches.
    pub fn decode(&mut self, pc: u16, bus: &mut dyn Bus) -> Instruction {
        if let Some(cached) = self.cached
            && cached.address == pc
        {
            return cached;
        }

        let instruction = self.decode_uncached(pc, bus);
        self.cached = Some(instruction);
        instruction
    }

    fn decode_uncached(&self, pc: u16, bus: &mut dyn Bus) -> Instruction {
        let mut raw: Vec<u8> = Vec::with_capacity(4);
        let mut consumed: u16 = 0;
        let mut fetch = |consumed: &mut u16, raw: &mut Vec<u8>, bus: &mut dyn Bus| {
            let byte = bus.read(pc.wrapping_add(*consumed));
            *consumed += 1;
            raw.push(byte);
            byte
        };

        let mut table = &self.root;
        let mut displacement: Option<i8> = None;
        let mut depth: u8 = 0;
        let leaf = loop {
            let byte = fetch(&mut consumed, &mut raw, bus);
            match &table.entries[byte as usize] {
                Entry::Leaf(leaf) => break leaf,
                Entry::Table {
                    table: sub,
                    fetch_displacement,
                } => {
                    depth += 1;
                    assert!(
                        depth <= MAX_PREFIX_DEPTH,
                        "prefix chain exceeds depth {MAX_PREFIX_DEPTH} at 0x{pc:04X} (bytes {raw:02X?})"
                    );
                    if *fetch_displacement {
                        displacement = Some(fetch(&mut consumed, &mut raw, bus) as i8);
                    }
                    table = sub;
                }
                Entry::Missing => panic!(
                    "undefined opcode at 0x{pc:04X}: bytes {raw:02X?} reach no instruction"
                ),
            }
        };

        let mut operands = [Operand::Bit(0); 3];
        let mut operand_count: u8 = 0;
        for token in &leaf.tokens {
            let operand = match token {
                Token::R(reg) => Operand::Register(*reg),
                Token::Cc(cond) => Operand::Condition(*cond),
                Token::BitNum(value) => Operand::Bit(*value),
                Token::Target(address) => Operand::Direct(*address),
                Token::AtReg(reg) => Operand::Indexed(*reg, 0),
                Token::Imm8 => Operand::Immediate8(fetch(&mut consumed, &mut raw, bus)),
                Token::Imm16 | Token::Addr => {
                    let lo = fetch(&mut consumed, &mut raw, bus);
                    let hi = fetch(&mut consumed, &mut raw, bus);
                    let value = u16::from(hi) << 8 | u16::from(lo);
                    if matches!(token, Token::Addr) {
                        Operand::Direct(value)
                    } else {
                        Operand::Immediate16(value)
                    }
                }
                Token::IdxDisp(reg) => {
                    // Doubly-prefixed forms carry the displacement before
                    // the final opcode byte; it was fetched during the
                    // table walk. Singly-prefixed forms read it here.
                    let d = displacement
                        .take()
                        .unwrap_or_else(|| fetch(&mut consumed, &mut raw, bus) as i8);
                    Operand::Indexed(*reg, d)
                }
            };
            operands[operand_count as usize] = operand;
            operand_count += 1;
        }

        Instruction {
            address: pc,
            op: leaf.op,
            operands,
            operand_count,
            size: consumed,
            cycles: leaf.cycles,
            cycles_taken: leaf.cycles_taken,
        }
    }

    /// Drop the cached decode if `address` falls inside its bytes.
    /// Called for every memory write the CPU performs.
    pub fn invalidate_write(&mut self, address: u16) {
        if let Some(cached) = self.cached
            && address.wrapping_sub(cached.address) < cached.size
        {
            self.cached = None;
        }
    }

    /// Drop the cached decode unconditionally. For hosts that write
    /// memory behind the CPU's back (snapshot loads, DMA).
    pub fn flush(&mut self) {
        self.cached = None;
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

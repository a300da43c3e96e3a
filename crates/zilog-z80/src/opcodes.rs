//! Opcode identifiers and the decode tables.
//!
//! The table set is built once, owned by the decoder, and never mutated
//! afterwards. Entries are leaves (operation + operand tokens + T-state
//! counts) or sub-tables reached through a prefix byte. The DD/FD tables
//! are derived from the root table by the index-register substitution the
//! hardware applies: (HL) becomes (IX+d), and where no memory operand is
//! involved H/L/HL become IXH/IXL/IX. Opcodes the prefix does not affect
//! are left undefined rather than aliased.

use crate::operand::Cond;
use crate::registers::Reg;

/// Operation identifier: one variant per semantic handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    Ld8,
    Ld16,
    Push,
    Pop,
    ExDeHl,
    ExAf,
    Exx,
    ExSp,
    Ldi,
    Ldd,
    Ldir,
    Lddr,
    Cpi,
    Cpd,
    Cpir,
    Cpdr,
    Ini,
    Ind,
    Inir,
    Indr,
    Outi,
    Outd,
    Otir,
    Otdr,
    Add8,
    Adc8,
    Sub8,
    Sbc8,
    And,
    Xor,
    Or,
    Cp,
    Inc8,
    Dec8,
    Add16,
    Adc16,
    Sbc16,
    Inc16,
    Dec16,
    Daa,
    Cpl,
    Neg,
    Ccf,
    Scf,
    Halt,
    Di,
    Ei,
    Im,
    Rlca,
    Rrca,
    Rla,
    Rra,
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
    Rld,
    Rrd,
    Bit,
    Res,
    Set,
    Jp,
    Jr,
    Djnz,
    Call,
    Ret,
    Reti,
    Retn,
    Rst,
    InA,
    InC,
    OutA,
    OutC,
    LdAI,
    LdAR,
    LdIA,
    LdRA,
}

impl Op {
    /// Assembly mnemonic, for trace output and diagnostics.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Ld8 | Self::Ld16 => "LD",
            Self::Push => "PUSH",
            Self::Pop => "POP",
            Self::ExDeHl | Self::ExAf | Self::ExSp => "EX",
            Self::Exx => "EXX",
            Self::Ldi => "LDI",
            Self::Ldd => "LDD",
            Self::Ldir => "LDIR",
            Self::Lddr => "LDDR",
            Self::Cpi => "CPI",
            Self::Cpd => "CPD",
            Self::Cpir => "CPIR",
            Self::Cpdr => "CPDR",
            Self::Ini => "INI",
            Self::Ind => "IND",
            Self::Inir => "INIR",
            Self::Indr => "INDR",
            Self::Outi => "OUTI",
            Self::Outd => "OUTD",
            Self::Otir => "OTIR",
            Self::Otdr => "OTDR",
            Self::Add8 | Self::Add16 => "ADD",
            Self::Adc8 | Self::Adc16 => "ADC",
            Self::Sub8 => "SUB",
            Self::Sbc8 | Self::Sbc16 => "SBC",
            Self::And => "AND",
            Self::Xor => "XOR",
            Self::Or => "OR",
            Self::Cp => "CP",
            Self::Inc8 | Self::Inc16 => "INC",
            Self::Dec8 | Self::Dec16 => "DEC",
            Self::Daa => "DAA",
            Self::Cpl => "CPL",
            Self::Neg => "NEG",
            Self::Ccf => "CCF",
            Self::Scf => "SCF",
            Self::Halt => "HALT",
            Self::Di => "DI",
            Self::Ei => "EI",
            Self::Im => "IM",
            Self::Rlca => "RLCA",
            Self::Rrca => "RRCA",
            Self::Rla => "RLA",
            Self::Rra => "RRA",
            Self::Rlc => "RLC",
            Self::Rrc => "RRC",
            Self::Rl => "RL",
            Self::Rr => "RR",
            Self::Sla => "SLA",
            Self::Sra => "SRA",
            Self::Sll => "SLL",
            Self::Srl => "SRL",
            Self::Rld => "RLD",
            Self::Rrd => "RRD",
            Self::Bit => "BIT",
            Self::Res => "RES",
            Self::Set => "SET",
            Self::Jp => "JP",
            Self::Jr => "JR",
            Self::Djnz => "DJNZ",
            Self::Call => "CALL",
            Self::Ret => "RET",
            Self::Reti => "RETI",
            Self::Retn => "RETN",
            Self::Rst => "RST",
            Self::InA | Self::InC => "IN",
            Self::OutA | Self::OutC => "OUT",
            Self::LdAI | Self::LdAR | Self::LdIA | Self::LdRA => "LD",
        }
    }
}

/// Raw operand descriptor stored in the table, resolved against the
/// instruction stream at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    /// A register.
    R(Reg),
    /// A condition code.
    Cc(Cond),
    /// One literal byte consumed from the stream.
    Imm8,
    /// One literal word consumed from the stream.
    Imm16,
    /// A two-byte direct address consumed from the stream.
    Addr,
    /// Memory at a register ((HL), (BC), (DE)).
    AtReg(Reg),
    /// Memory at index register plus a displacement byte from the stream.
    IdxDisp(Reg),
    /// A literal baked into the opcode (bit number, IM mode).
    BitNum(u8),
    /// A fixed jump target baked into the opcode (RST).
    Target(u16),
}

pub(crate) struct Leaf {
    pub op: Op,
    pub tokens: Vec<Token>,
    /// T-states when not taken (or unconditionally).
    pub cycles: u8,
    /// T-states when a condition passes or a block op repeats.
    pub cycles_taken: u8,
}

pub(crate) enum Entry {
    /// No instruction decodes here; hitting it is a table defect.
    Missing,
    Leaf(Leaf),
    /// Prefix byte: continue in a sub-table. `fetch_displacement` marks
    /// the doubly-prefixed tables whose displacement byte precedes the
    /// final opcode.
    Table {
        table: Box<OpcodeTable>,
        fetch_displacement: bool,
    },
}

/// A 256-entry decode table.
pub struct OpcodeTable {
    pub(crate) entries: Vec<Entry>,
}

/// Register operand order used by most opcode blocks; index 6 is (HL).
const R8: [Token; 8] = [
    Token::R(Reg::B),
    Token::R(Reg::C),
    Token::R(Reg::D),
    Token::R(Reg::E),
    Token::R(Reg::H),
    Token::R(Reg::L),
    Token::AtReg(Reg::Hl),
    Token::R(Reg::A),
];

/// Register-pair order for 16-bit arithmetic and loads.
const RP: [Reg; 4] = [Reg::Bc, Reg::De, Reg::Hl, Reg::Sp];

/// Register-pair order for PUSH/POP.
const RP2: [Reg; 4] = [Reg::Bc, Reg::De, Reg::Hl, Reg::Af];

/// Condition order in the opcode encoding.
const CC: [Cond; 8] = [
    Cond::Nz,
    Cond::Z,
    Cond::Nc,
    Cond::C,
    Cond::Po,
    Cond::Pe,
    Cond::P,
    Cond::M,
];

/// ALU operation order in the 0x80-0xBF block.
const ALU_OPS: [Op; 8] = [
    Op::Add8,
    Op::Adc8,
    Op::Sub8,
    Op::Sbc8,
    Op::And,
    Op::Xor,
    Op::Or,
    Op::Cp,
];

/// Rotate/shift order in the CB 0x00-0x3F block.
const ROT_OPS: [Op; 8] = [
    Op::Rlc,
    Op::Rrc,
    Op::Rl,
    Op::Rr,
    Op::Sla,
    Op::Sra,
    Op::Sll,
    Op::Srl,
];

impl OpcodeTable {
    fn empty() -> Self {
        Self {
            entries: (0..256).map(|_| Entry::Missing).collect(),
        }
    }

    fn leaf(&mut self, opcode: u8, op: Op, tokens: &[Token], cycles: u8) {
        self.leaf_cc(opcode, op, tokens, cycles, cycles);
    }

    fn leaf_cc(&mut self, opcode: u8, op: Op, tokens: &[Token], cycles: u8, cycles_taken: u8) {
        self.entries[opcode as usize] = Entry::Leaf(Leaf {
            op,
            tokens: tokens.to_vec(),
            cycles,
            cycles_taken,
        });
    }

    fn prefix(&mut self, opcode: u8, table: OpcodeTable, fetch_displacement: bool) {
        self.entries[opcode as usize] = Entry::Table {
            table: Box::new(table),
            fetch_displacement,
        };
    }

    /// Build the full Z80 decode table set.
    #[must_use]
    pub fn standard() -> Self {
        let mut root = Self::base_table();
        root.prefix(0xCB, Self::cb_table(), false);
        root.prefix(0xED, Self::ed_table(), false);
        root.prefix(0xDD, Self::index_table(Reg::Ix), false);
        root.prefix(0xFD, Self::index_table(Reg::Iy), false);
        root
    }

    /// The unprefixed opcode space, without the four prefix entries.
    fn base_table() -> Self {
        let mut t = Self::empty();

        t.leaf(0x00, Op::Nop, &[], 4);
        t.leaf(0x07, Op::Rlca, &[], 4);
        t.leaf(0x0F, Op::Rrca, &[], 4);
        t.leaf(0x17, Op::Rla, &[], 4);
        t.leaf(0x1F, Op::Rra, &[], 4);
        t.leaf(0x08, Op::ExAf, &[], 4);
        t.leaf_cc(0x10, Op::Djnz, &[Token::Imm8], 8, 13);
        t.leaf(0x18, Op::Jr, &[Token::Imm8], 12);
        t.leaf(0x27, Op::Daa, &[], 4);
        t.leaf(0x2F, Op::Cpl, &[], 4);
        t.leaf(0x37, Op::Scf, &[], 4);
        t.leaf(0x3F, Op::Ccf, &[], 4);

        // 16-bit loads, increments, ADD HL
        for (i, rp) in RP.iter().enumerate() {
            let base = (i as u8) << 4;
            t.leaf(base | 0x01, Op::Ld16, &[Token::R(*rp), Token::Imm16], 10);
            t.leaf(base | 0x03, Op::Inc16, &[Token::R(*rp)], 6);
            t.leaf(base | 0x0B, Op::Dec16, &[Token::R(*rp)], 6);
            t.leaf(
                base | 0x09,
                Op::Add16,
                &[Token::R(Reg::Hl), Token::R(*rp)],
                11,
            );
        }
        t.leaf(0x02, Op::Ld8, &[Token::AtReg(Reg::Bc), Token::R(Reg::A)], 7);
        t.leaf(0x12, Op::Ld8, &[Token::AtReg(Reg::De), Token::R(Reg::A)], 7);
        t.leaf(0x0A, Op::Ld8, &[Token::R(Reg::A), Token::AtReg(Reg::Bc)], 7);
        t.leaf(0x1A, Op::Ld8, &[Token::R(Reg::A), Token::AtReg(Reg::De)], 7);
        t.leaf(0x22, Op::Ld16, &[Token::Addr, Token::R(Reg::Hl)], 16);
        t.leaf(0x2A, Op::Ld16, &[Token::R(Reg::Hl), Token::Addr], 16);
        t.leaf(0x32, Op::Ld8, &[Token::Addr, Token::R(Reg::A)], 13);
        t.leaf(0x3A, Op::Ld8, &[Token::R(Reg::A), Token::Addr], 13);

        // INC r / DEC r / LD r,n
        for (i, reg) in R8.iter().enumerate() {
            let mem = i == 6;
            let base = (i as u8) << 3;
            t.leaf(base | 0x04, Op::Inc8, &[*reg], if mem { 11 } else { 4 });
            t.leaf(base | 0x05, Op::Dec8, &[*reg], if mem { 11 } else { 4 });
            t.leaf(
                base | 0x06,
                Op::Ld8,
                &[*reg, Token::Imm8],
                if mem { 10 } else { 7 },
            );
        }

        // JR cc
        for (i, cc) in CC.iter().take(4).enumerate() {
            t.leaf_cc(
                0x20 | (i as u8) << 3,
                Op::Jr,
                &[Token::Cc(*cc), Token::Imm8],
                7,
                12,
            );
        }

        // LD r,r' block (0x76 is HALT)
        for (d, dst) in R8.iter().enumerate() {
            for (s, src) in R8.iter().enumerate() {
                let opcode = 0x40 | (d as u8) << 3 | s as u8;
                if opcode == 0x76 {
                    t.leaf(opcode, Op::Halt, &[], 4);
                    continue;
                }
                let cycles = if d == 6 || s == 6 { 7 } else { 4 };
                t.leaf(opcode, Op::Ld8, &[*dst, *src], cycles);
            }
        }

        // ALU A,r block
        for (a, op) in ALU_OPS.iter().enumerate() {
            for (s, src) in R8.iter().enumerate() {
                let cycles = if s == 6 { 7 } else { 4 };
                t.leaf(0x80 | (a as u8) << 3 | s as u8, *op, &[*src], cycles);
            }
            // Immediate form
            t.leaf(0xC6 | (a as u8) << 3, *op, &[Token::Imm8], 7);
        }

        // Conditional control transfer, PUSH/POP, RST
        for (i, cc) in CC.iter().enumerate() {
            let base = 0xC0 | (i as u8) << 3;
            t.leaf_cc(base, Op::Ret, &[Token::Cc(*cc)], 5, 11);
            t.leaf_cc(base | 0x02, Op::Jp, &[Token::Cc(*cc), Token::Imm16], 10, 10);
            t.leaf_cc(
                base | 0x04,
                Op::Call,
                &[Token::Cc(*cc), Token::Imm16],
                10,
                17,
            );
            t.leaf(base | 0x07, Op::Rst, &[Token::Target((i as u16) << 3)], 11);
        }
        for (i, rp) in RP2.iter().enumerate() {
            let base = 0xC0 | (i as u8) << 4;
            t.leaf(base | 0x01, Op::Pop, &[Token::R(*rp)], 10);
            t.leaf(base | 0x05, Op::Push, &[Token::R(*rp)], 11);
        }
        t.leaf(0xC3, Op::Jp, &[Token::Imm16], 10);
        t.leaf(0xC9, Op::Ret, &[], 10);
        t.leaf(0xCD, Op::Call, &[Token::Imm16], 17);
        t.leaf(0xD3, Op::OutA, &[Token::Imm8], 11);
        t.leaf(0xDB, Op::InA, &[Token::Imm8], 11);
        t.leaf(0xD9, Op::Exx, &[], 4);
        t.leaf(0xE3, Op::ExSp, &[Token::R(Reg::Hl)], 19);
        t.leaf(0xE9, Op::Jp, &[Token::R(Reg::Hl)], 4);
        t.leaf(0xEB, Op::ExDeHl, &[], 4);
        t.leaf(0xF3, Op::Di, &[], 4);
        t.leaf(0xFB, Op::Ei, &[], 4);
        t.leaf(0xF9, Op::Ld16, &[Token::R(Reg::Sp), Token::R(Reg::Hl)], 6);

        t
    }

    fn cb_table() -> Self {
        let mut t = Self::empty();
        for (s, src) in R8.iter().enumerate() {
            let mem = s == 6;
            for (r, op) in ROT_OPS.iter().enumerate() {
                let cycles = if mem { 15 } else { 8 };
                t.leaf((r as u8) << 3 | s as u8, *op, &[*src], cycles);
            }
            for bit in 0..8u8 {
                let tokens = [Token::BitNum(bit), *src];
                t.leaf(
                    0x40 | bit << 3 | s as u8,
                    Op::Bit,
                    &tokens,
                    if mem { 12 } else { 8 },
                );
                t.leaf(
                    0x80 | bit << 3 | s as u8,
                    Op::Res,
                    &tokens,
                    if mem { 15 } else { 8 },
                );
                t.leaf(
                    0xC0 | bit << 3 | s as u8,
                    Op::Set,
                    &tokens,
                    if mem { 15 } else { 8 },
                );
            }
        }
        t
    }

    fn ed_table() -> Self {
        let mut t = Self::empty();
        for (i, reg) in R8.iter().enumerate() {
            if i == 6 {
                continue;
            }
            t.leaf(0x40 | (i as u8) << 3, Op::InC, &[*reg], 12);
            t.leaf(0x41 | (i as u8) << 3, Op::OutC, &[*reg], 12);
        }
        for (i, rp) in RP.iter().enumerate() {
            let base = (i as u8) << 4;
            t.leaf(
                0x42 | base,
                Op::Sbc16,
                &[Token::R(Reg::Hl), Token::R(*rp)],
                15,
            );
            t.leaf(
                0x4A | base,
                Op::Adc16,
                &[Token::R(Reg::Hl), Token::R(*rp)],
                15,
            );
            t.leaf(0x43 | base, Op::Ld16, &[Token::Addr, Token::R(*rp)], 20);
            t.leaf(0x4B | base, Op::Ld16, &[Token::R(*rp), Token::Addr], 20);
        }
        t.leaf(0x44, Op::Neg, &[], 8);
        t.leaf(0x45, Op::Retn, &[], 14);
        t.leaf(0x4D, Op::Reti, &[], 14);
        t.leaf(0x46, Op::Im, &[Token::BitNum(0)], 8);
        t.leaf(0x56, Op::Im, &[Token::BitNum(1)], 8);
        t.leaf(0x5E, Op::Im, &[Token::BitNum(2)], 8);
        t.leaf(0x47, Op::LdIA, &[], 9);
        t.leaf(0x4F, Op::LdRA, &[], 9);
        t.leaf(0x57, Op::LdAI, &[], 9);
        t.leaf(0x5F, Op::LdAR, &[], 9);
        t.leaf(0x67, Op::Rrd, &[], 18);
        t.leaf(0x6F, Op::Rld, &[], 18);

        let block = [
            (0xA0, Op::Ldi),
            (0xA1, Op::Cpi),
            (0xA2, Op::Ini),
            (0xA3, Op::Outi),
            (0xA8, Op::Ldd),
            (0xA9, Op::Cpd),
            (0xAA, Op::Ind),
            (0xAB, Op::Outd),
        ];
        for (opcode, op) in block {
            t.leaf(opcode, op, &[], 16);
        }
        let repeat = [
            (0xB0, Op::Ldir),
            (0xB1, Op::Cpir),
            (0xB2, Op::Inir),
            (0xB3, Op::Otir),
            (0xB8, Op::Lddr),
            (0xB9, Op::Cpdr),
            (0xBA, Op::Indr),
            (0xBB, Op::Otdr),
        ];
        for (opcode, op) in repeat {
            t.leaf_cc(opcode, op, &[], 16, 21);
        }
        t
    }

    /// DD/FD table: the root table with index-register substitution.
    fn index_table(index: Reg) -> Self {
        let (high, low) = match index {
            Reg::Ix => (Reg::Ixh, Reg::Ixl),
            Reg::Iy => (Reg::Iyh, Reg::Iyl),
            _ => unreachable!("not an index register"),
        };

        let base = Self::base_table();
        let mut t = Self::empty();
        for (opcode, entry) in base.entries.into_iter().enumerate() {
            // EX DE,HL ignores index prefixes entirely.
            if opcode == 0xEB {
                continue;
            }
            let Entry::Leaf(leaf) = entry else { continue };

            let uses_hl_memory = leaf.tokens.contains(&Token::AtReg(Reg::Hl));
            let mut substituted = false;
            let tokens: Vec<Token> = leaf
                .tokens
                .iter()
                .map(|token| {
                    let replaced = if uses_hl_memory {
                        // Only the memory operand changes; plain H and L
                        // keep their meaning next to (IX+d).
                        match token {
                            Token::AtReg(Reg::Hl) => Token::IdxDisp(index),
                            other => *other,
                        }
                    } else {
                        match token {
                            Token::R(Reg::Hl) => Token::R(index),
                            Token::R(Reg::H) => Token::R(high),
                            Token::R(Reg::L) => Token::R(low),
                            other => *other,
                        }
                    };
                    if replaced != *token {
                        substituted = true;
                    }
                    replaced
                })
                .collect();

            if !substituted {
                continue;
            }
            let (cycles, cycles_taken) = if uses_hl_memory {
                let c = if matches!(leaf.op, Op::Inc8 | Op::Dec8) {
                    23
                } else {
                    19
                };
                (c, c)
            } else {
                (leaf.cycles + 4, leaf.cycles_taken + 4)
            };
            t.entries[opcode] = Entry::Leaf(Leaf {
                op: leaf.op,
                tokens,
                cycles,
                cycles_taken,
            });
        }
        t.prefix(0xCB, Self::index_cb_table(index), true);
        t
    }

    /// DD CB / FD CB table: every defined form operates on (IX+d).
    fn index_cb_table(index: Reg) -> Self {
        let mut t = Self::empty();
        let mem = Token::IdxDisp(index);
        for (r, op) in ROT_OPS.iter().enumerate() {
            t.leaf((r as u8) << 3 | 0x06, *op, &[mem], 23);
        }
        for bit in 0..8u8 {
            let tokens = [Token::BitNum(bit), mem];
            t.leaf(0x46 | bit << 3, Op::Bit, &tokens, 20);
            t.leaf(0x86 | bit << 3, Op::Res, &tokens, 23);
            t.leaf(0xC6 | bit << 3, Op::Set, &tokens, 23);
        }
        t
    }
}

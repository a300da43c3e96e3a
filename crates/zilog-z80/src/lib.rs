//! Zilog Z80 CPU emulator.
//!
//! Instruction-stepped: each call to [`Z80::step`] fetches, decodes and
//! executes one instruction (or services one interrupt) and returns the
//! number of T-states it consumed. Decode is table-driven over the full
//! prefix space (CB/ED/DD/FD and the doubly-prefixed DD CB/FD CB forms),
//! with the most recent decode memoized by address.

mod alu;
mod cpu;
mod decoder;
mod execute;
mod flags;
mod opcodes;
mod operand;
mod registers;

pub use cpu::Z80;
pub use decoder::{Decoder, Instruction};
pub use flags::{CF, Flags, HF, NF, PF, SF, ZF, parity};
pub use opcodes::{Op, OpcodeTable};
pub use operand::{Cond, Operand};
pub use registers::{Reg, Registers};

//! Semantic handlers for every operation.
//!
//! Each arm reads and writes through the decoded operands, updates the
//! flags it architecturally affects, and returns the T-states consumed.
//! Conditional instructions pick between the leaf's two counts; block
//! repeat forms rewind PC by their own size so the step loop re-enters
//! them until the counter runs out.

use emu_core::{Bus, IoBus};

use crate::alu;
use crate::cpu::Z80;
use crate::decoder::Instruction;
use crate::flags::{Flags, parity};
use crate::opcodes::Op;
use crate::operand::Operand;
use crate::registers::Reg;

pub(crate) fn execute(
    cpu: &mut Z80,
    bus: &mut dyn Bus,
    io: &mut IoBus,
    instr: &Instruction,
) -> u32 {
    let base = u32::from(instr.cycles);
    let taken = u32::from(instr.cycles_taken);

    match instr.op {
        Op::Nop => base,

        // -- 8/16-bit loads ------------------------------------------------

        Op::Ld8 => {
            let value = instr.operand(1).read8(&cpu.regs, bus);
            instr.operand(0).write8(&mut cpu.regs, bus, value);
            base
        }
        Op::Ld16 => {
            let value = instr.operand(1).read16(&cpu.regs, bus);
            instr.operand(0).write16(&mut cpu.regs, bus, value);
            base
        }
        Op::Push => {
            let value = instr.operand(0).read16(&cpu.regs, bus);
            push_word(cpu, bus, value);
            base
        }
        Op::Pop => {
            let value = pop_word(cpu, bus);
            instr.operand(0).write16(&mut cpu.regs, bus, value);
            if instr.operand(0) == Operand::Register(Reg::Af) {
                cpu.flags = Flags::unpack(cpu.regs.f);
            }
            base
        }

        // -- exchanges -----------------------------------------------------

        Op::ExDeHl => {
            let de = cpu.regs.de();
            cpu.regs.set_de(cpu.regs.hl());
            cpu.regs.set_hl(de);
            base
        }
        Op::ExAf => {
            let af = cpu.regs.af();
            cpu.regs.set_af(cpu.regs.af_alt());
            cpu.regs.set_af_alt(af);
            cpu.flags = Flags::unpack(cpu.regs.f);
            base
        }
        Op::Exx => {
            let (bc, de, hl) = (cpu.regs.bc(), cpu.regs.de(), cpu.regs.hl());
            cpu.regs.set_bc(cpu.regs.bc_alt());
            cpu.regs.set_de(cpu.regs.de_alt());
            cpu.regs.set_hl(cpu.regs.hl_alt());
            cpu.regs.set_bc_alt(bc);
            cpu.regs.set_de_alt(de);
            cpu.regs.set_hl_alt(hl);
            base
        }
        Op::ExSp => {
            let sp = cpu.regs.sp;
            let lo = bus.read(sp);
            let hi = bus.read(sp.wrapping_add(1));
            let from_stack = u16::from(hi) << 8 | u16::from(lo);
            let value = instr.operand(0).read16(&cpu.regs, bus);
            bus.write(sp, value as u8);
            bus.write(sp.wrapping_add(1), (value >> 8) as u8);
            instr.operand(0).write16(&mut cpu.regs, bus, from_stack);
            cpu.regs.wz = from_stack;
            base
        }

        // -- block transfer and search ------------------------------------

        Op::Ldi => {
            block_ld(cpu, bus, 1);
            base
        }
        Op::Ldd => {
            block_ld(cpu, bus, -1);
            base
        }
        Op::Ldir => {
            block_ld(cpu, bus, 1);
            if cpu.regs.bc() != 0 {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Lddr => {
            block_ld(cpu, bus, -1);
            if cpu.regs.bc() != 0 {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Cpi => {
            block_cp(cpu, bus, 1);
            base
        }
        Op::Cpd => {
            block_cp(cpu, bus, -1);
            base
        }
        Op::Cpir => {
            let matched = block_cp(cpu, bus, 1);
            if cpu.regs.bc() != 0 && !matched {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Cpdr => {
            let matched = block_cp(cpu, bus, -1);
            if cpu.regs.bc() != 0 && !matched {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Ini => {
            block_in(cpu, bus, io, 1);
            base
        }
        Op::Ind => {
            block_in(cpu, bus, io, -1);
            base
        }
        Op::Inir => {
            block_in(cpu, bus, io, 1);
            if cpu.regs.b != 0 {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Indr => {
            block_in(cpu, bus, io, -1);
            if cpu.regs.b != 0 {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Outi => {
            block_out(cpu, bus, io, 1);
            base
        }
        Op::Outd => {
            block_out(cpu, bus, io, -1);
            base
        }
        Op::Otir => {
            block_out(cpu, bus, io, 1);
            if cpu.regs.b != 0 {
                repeat(cpu, instr)
            } else {
                base
            }
        }
        Op::Otdr => {
            block_out(cpu, bus, io, -1);
            if cpu.regs.b != 0 {
                repeat(cpu, instr)
            } else {
                base
            }
        }

        // -- 8-bit arithmetic and logic -----------------------------------

        Op::Add8 => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::add8(cpu.regs.a, value, false);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Adc8 => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::add8(cpu.regs.a, value, cpu.flags.carry);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Sub8 => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::sub8(cpu.regs.a, value, false);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Sbc8 => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::sub8(cpu.regs.a, value, cpu.flags.carry);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::And => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::and8(cpu.regs.a, value);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Xor => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::xor8(cpu.regs.a, value);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Or => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::or8(cpu.regs.a, value);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Cp => {
            let value = instr.operand(0).read8(&cpu.regs, bus);
            let r = alu::sub8(cpu.regs.a, value, false);
            cpu.flags = r.flags;
            base
        }
        Op::Inc8 => {
            let operand = instr.operand(0);
            let r = alu::inc8(operand.read8(&cpu.regs, bus), cpu.flags.carry);
            operand.write8(&mut cpu.regs, bus, r.value);
            cpu.flags = r.flags;
            base
        }
        Op::Dec8 => {
            let operand = instr.operand(0);
            let r = alu::dec8(operand.read8(&cpu.regs, bus), cpu.flags.carry);
            operand.write8(&mut cpu.regs, bus, r.value);
            cpu.flags = r.flags;
            base
        }

        // -- 16-bit arithmetic --------------------------------------------

        Op::Add16 => {
            let dst = instr.operand(0);
            let (value, flags) = alu::add16(
                dst.read16(&cpu.regs, bus),
                instr.operand(1).read16(&cpu.regs, bus),
                cpu.flags,
            );
            dst.write16(&mut cpu.regs, bus, value);
            cpu.flags = flags;
            base
        }
        Op::Adc16 => {
            let dst = instr.operand(0);
            let (value, flags) = alu::adc16(
                dst.read16(&cpu.regs, bus),
                instr.operand(1).read16(&cpu.regs, bus),
                cpu.flags.carry,
            );
            dst.write16(&mut cpu.regs, bus, value);
            cpu.flags = flags;
            base
        }
        Op::Sbc16 => {
            let dst = instr.operand(0);
            let (value, flags) = alu::sbc16(
                dst.read16(&cpu.regs, bus),
                instr.operand(1).read16(&cpu.regs, bus),
                cpu.flags.carry,
            );
            dst.write16(&mut cpu.regs, bus, value);
            cpu.flags = flags;
            base
        }
        Op::Inc16 => {
            let operand = instr.operand(0);
            let value = operand.read16(&cpu.regs, bus).wrapping_add(1);
            operand.write16(&mut cpu.regs, bus, value);
            base
        }
        Op::Dec16 => {
            let operand = instr.operand(0);
            let value = operand.read16(&cpu.regs, bus).wrapping_sub(1);
            operand.write16(&mut cpu.regs, bus, value);
            base
        }

        // -- accumulator and flag housekeeping ----------------------------

        Op::Daa => {
            let r = alu::daa(cpu.regs.a, cpu.flags);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Cpl => {
            cpu.regs.a = !cpu.regs.a;
            cpu.flags.half_carry = true;
            cpu.flags.add_subtract = true;
            base
        }
        Op::Neg => {
            let r = alu::sub8(0, cpu.regs.a, false);
            cpu.regs.a = r.value;
            cpu.flags = r.flags;
            base
        }
        Op::Ccf => {
            cpu.flags.half_carry = cpu.flags.carry;
            cpu.flags.carry = !cpu.flags.carry;
            cpu.flags.add_subtract = false;
            base
        }
        Op::Scf => {
            cpu.flags.carry = true;
            cpu.flags.half_carry = false;
            cpu.flags.add_subtract = false;
            base
        }

        // -- CPU control ---------------------------------------------------

        Op::Halt => {
            cpu.halted = true;
            base
        }
        Op::Di => {
            cpu.iff1 = false;
            cpu.iff2 = false;
            base
        }
        Op::Ei => {
            cpu.iff1 = true;
            cpu.iff2 = true;
            base
        }
        Op::Im => {
            cpu.im = instr.operand(0).read8(&cpu.regs, bus);
            base
        }

        // -- rotates and shifts -------------------------------------------

        Op::Rlca => {
            let r = alu::rlc8(cpu.regs.a);
            accumulator_rotate(cpu, r);
            base
        }
        Op::Rrca => {
            let r = alu::rrc8(cpu.regs.a);
            accumulator_rotate(cpu, r);
            base
        }
        Op::Rla => {
            let r = alu::rl8(cpu.regs.a, cpu.flags.carry);
            accumulator_rotate(cpu, r);
            base
        }
        Op::Rra => {
            let r = alu::rr8(cpu.regs.a, cpu.flags.carry);
            accumulator_rotate(cpu, r);
            base
        }
        Op::Rlc | Op::Rrc | Op::Rl | Op::Rr | Op::Sla | Op::Sra | Op::Sll | Op::Srl => {
            let operand = instr.operand(0);
            let value = operand.read8(&cpu.regs, bus);
            let r = match instr.op {
                Op::Rlc => alu::rlc8(value),
                Op::Rrc => alu::rrc8(value),
                Op::Rl => alu::rl8(value, cpu.flags.carry),
                Op::Rr => alu::rr8(value, cpu.flags.carry),
                Op::Sla => alu::sla8(value),
                Op::Sra => alu::sra8(value),
                Op::Sll => alu::sll8(value),
                _ => alu::srl8(value),
            };
            operand.write8(&mut cpu.regs, bus, r.value);
            cpu.flags = r.flags;
            base
        }
        Op::Rld => {
            let address = cpu.regs.hl();
            let memory = bus.read(address);
            bus.write(address, memory << 4 | (cpu.regs.a & 0x0F));
            cpu.regs.a = (cpu.regs.a & 0xF0) | memory >> 4;
            digit_rotate_flags(cpu);
            base
        }
        Op::Rrd => {
            let address = cpu.regs.hl();
            let memory = bus.read(address);
            bus.write(address, cpu.regs.a << 4 | memory >> 4);
            cpu.regs.a = (cpu.regs.a & 0xF0) | (memory & 0x0F);
            digit_rotate_flags(cpu);
            base
        }

        // -- bit test/set/reset -------------------------------------------

        Op::Bit => {
            let bit = instr.operand(0).read8(&cpu.regs, bus);
            let value = instr.operand(1).read8(&cpu.regs, bus);
            let zero = value & 1 << bit == 0;
            cpu.flags.zero = zero;
            cpu.flags.parity_overflow = zero;
            cpu.flags.sign = bit == 7 && !zero;
            cpu.flags.half_carry = true;
            cpu.flags.add_subtract = false;
            base
        }
        Op::Res => {
            let bit = instr.operand(0).read8(&cpu.regs, bus);
            let operand = instr.operand(1);
            let value = operand.read8(&cpu.regs, bus) & !(1 << bit);
            operand.write8(&mut cpu.regs, bus, value);
            base
        }
        Op::Set => {
            let bit = instr.operand(0).read8(&cpu.regs, bus);
            let operand = instr.operand(1);
            let value = operand.read8(&cpu.regs, bus) | 1 << bit;
            operand.write8(&mut cpu.regs, bus, value);
            base
        }

        // -- control transfer ---------------------------------------------

        Op::Jp => {
            let (pass, target) = conditional(cpu, instr);
            if !pass {
                return base;
            }
            let target = target.read16(&cpu.regs, bus);
            cpu.regs.pc = target;
            cpu.regs.wz = target;
            taken
        }
        Op::Jr => {
            let (pass, target) = conditional(cpu, instr);
            if !pass {
                return base;
            }
            cpu.regs.pc = relative_target(cpu.regs.pc, target);
            cpu.regs.wz = cpu.regs.pc;
            taken
        }
        Op::Djnz => {
            cpu.regs.b = cpu.regs.b.wrapping_sub(1);
            if cpu.regs.b == 0 {
                return base;
            }
            cpu.regs.pc = relative_target(cpu.regs.pc, instr.operand(0));
            taken
        }
        Op::Call => {
            let (pass, target) = conditional(cpu, instr);
            if !pass {
                return base;
            }
            let target = target.read16(&cpu.regs, bus);
            push_word(cpu, bus, cpu.regs.pc);
            cpu.regs.pc = target;
            cpu.regs.wz = target;
            taken
        }
        Op::Ret => {
            let (pass, _) = conditional(cpu, instr);
            if !pass {
                return base;
            }
            cpu.regs.pc = pop_word(cpu, bus);
            if instr.operands().is_empty() { base } else { taken }
        }
        Op::Reti => {
            cpu.regs.pc = pop_word(cpu, bus);
            base
        }
        Op::Retn => {
            cpu.iff1 = cpu.iff2;
            cpu.regs.pc = pop_word(cpu, bus);
            base
        }
        Op::Rst => {
            let target = instr.operand(0).address(&cpu.regs);
            push_word(cpu, bus, cpu.regs.pc);
            cpu.regs.pc = target;
            cpu.regs.wz = target;
            base
        }

        // -- port I/O ------------------------------------------------------

        Op::InA => {
            let low = instr.operand(0).read8(&cpu.regs, bus);
            io.select(u16::from(cpu.regs.a) << 8 | u16::from(low));
            cpu.regs.a = io.read();
            base
        }
        Op::InC => {
            io.select(cpu.regs.bc());
            let value = io.read();
            instr.operand(0).write8(&mut cpu.regs, bus, value);
            cpu.flags.sign = value & 0x80 != 0;
            cpu.flags.zero = value == 0;
            cpu.flags.parity_overflow = parity(value);
            cpu.flags.half_carry = false;
            cpu.flags.add_subtract = false;
            base
        }
        Op::OutA => {
            let low = instr.operand(0).read8(&cpu.regs, bus);
            io.select(u16::from(cpu.regs.a) << 8 | u16::from(low));
            io.write(cpu.regs.a);
            base
        }
        Op::OutC => {
            io.select(cpu.regs.bc());
            let value = instr.operand(0).read8(&cpu.regs, bus);
            io.write(value);
            base
        }

        // -- interrupt registers ------------------------------------------

        Op::LdIA => {
            cpu.regs.i = cpu.regs.a;
            base
        }
        Op::LdRA => {
            cpu.regs.r = cpu.regs.a;
            base
        }
        Op::LdAI => {
            cpu.regs.a = cpu.regs.i;
            interrupt_register_flags(cpu);
            base
        }
        Op::LdAR => {
            cpu.regs.a = cpu.regs.r;
            interrupt_register_flags(cpu);
            base
        }
    }
}

/// Condition check: instructions whose first operand is a condition code
/// pass only when it holds. Returns the target operand either way.
fn conditional(cpu: &Z80, instr: &Instruction) -> (bool, Operand) {
    match instr.operands().first() {
        Some(&Operand::Condition(cond)) => (cond.satisfied(cpu.flags), instr.operand(1)),
        Some(&operand) => (true, operand),
        None => (true, Operand::Bit(0)),
    }
}

fn relative_target(pc: u16, operand: Operand) -> u16 {
    let Operand::Immediate8(displacement) = operand else {
        unreachable!("relative jump needs an immediate displacement")
    };
    pc.wrapping_add(displacement as i8 as u16)
}

fn push_word(cpu: &mut Z80, bus: &mut dyn Bus, value: u16) {
    cpu.regs.sp = cpu.regs.sp.wrapping_sub(1);
    bus.write(cpu.regs.sp, (value >> 8) as u8);
    cpu.regs.sp = cpu.regs.sp.wrapping_sub(1);
    bus.write(cpu.regs.sp, value as u8);
}

fn pop_word(cpu: &mut Z80, bus: &mut dyn Bus) -> u16 {
    let lo = bus.read(cpu.regs.sp);
    cpu.regs.sp = cpu.regs.sp.wrapping_add(1);
    let hi = bus.read(cpu.regs.sp);
    cpu.regs.sp = cpu.regs.sp.wrapping_add(1);
    u16::from(hi) << 8 | u16::from(lo)
}

/// Rewind PC over the instruction so the next step re-enters it.
fn repeat(cpu: &mut Z80, instr: &Instruction) -> u32 {
    cpu.regs.pc = cpu.regs.pc.wrapping_sub(instr.size);
    u32::from(instr.cycles_taken)
}

/// One step of LDI/LDD: move a byte, walk the pointers, count down BC.
/// P/V doubles as the repeat-pending flag: set while BC is non-zero.
fn block_ld(cpu: &mut Z80, bus: &mut dyn Bus, delta: i16) {
    let value = bus.read(cpu.regs.hl());
    bus.write(cpu.regs.de(), value);
    cpu.regs.set_hl(cpu.regs.hl().wrapping_add(delta as u16));
    cpu.regs.set_de(cpu.regs.de().wrapping_add(delta as u16));
    cpu.regs.set_bc(cpu.regs.bc().wrapping_sub(1));
    cpu.flags.half_carry = false;
    cpu.flags.add_subtract = false;
    cpu.flags.parity_overflow = cpu.regs.bc() != 0;
}

/// One step of CPI/CPD. Returns true when the compared byte matched A.
fn block_cp(cpu: &mut Z80, bus: &mut dyn Bus, delta: i16) -> bool {
    let value = bus.read(cpu.regs.hl());
    let r = alu::sub8(cpu.regs.a, value, false);
    cpu.regs.set_hl(cpu.regs.hl().wrapping_add(delta as u16));
    cpu.regs.set_bc(cpu.regs.bc().wrapping_sub(1));
    cpu.flags.sign = r.flags.sign;
    cpu.flags.zero = r.flags.zero;
    cpu.flags.half_carry = r.flags.half_carry;
    cpu.flags.add_subtract = true;
    cpu.flags.parity_overflow = cpu.regs.bc() != 0;
    r.flags.zero
}

/// One step of INI/IND: port (BC) to (HL), then B counts down.
fn block_in(cpu: &mut Z80, bus: &mut dyn Bus, io: &mut IoBus, delta: i16) {
    io.select(cpu.regs.bc());
    let value = io.read();
    bus.write(cpu.regs.hl(), value);
    cpu.regs.b = cpu.regs.b.wrapping_sub(1);
    cpu.regs.set_hl(cpu.regs.hl().wrapping_add(delta as u16));
    cpu.flags.zero = cpu.regs.b == 0;
    cpu.flags.add_subtract = true;
}

/// One step of OUTI/OUTD: B counts down before the port sees the address.
fn block_out(cpu: &mut Z80, bus: &mut dyn Bus, io: &mut IoBus, delta: i16) {
    let value = bus.read(cpu.regs.hl());
    cpu.regs.b = cpu.regs.b.wrapping_sub(1);
    io.select(cpu.regs.bc());
    io.write(value);
    cpu.regs.set_hl(cpu.regs.hl().wrapping_add(delta as u16));
    cpu.flags.zero = cpu.regs.b == 0;
    cpu.flags.add_subtract = true;
}

/// RLCA/RRCA/RLA/RRA touch only C, H and N; S, Z and P/V survive.
fn accumulator_rotate(cpu: &mut Z80, r: alu::AluResult) {
    cpu.regs.a = r.value;
    cpu.flags.carry = r.flags.carry;
    cpu.flags.half_carry = false;
    cpu.flags.add_subtract = false;
}

/// Shared flag derivation for RLD/RRD: from A, carry untouched.
fn digit_rotate_flags(cpu: &mut Z80) {
    cpu.flags.sign = cpu.regs.a & 0x80 != 0;
    cpu.flags.zero = cpu.regs.a == 0;
    cpu.flags.parity_overflow = parity(cpu.regs.a);
    cpu.flags.half_carry = false;
    cpu.flags.add_subtract = false;
}

/// LD A,I / LD A,R: S and Z from the value, P/V mirrors IFF2.
fn interrupt_register_flags(cpu: &mut Z80) {
    cpu.flags.sign = cpu.regs.a & 0x80 != 0;
    cpu.flags.zero = cpu.regs.a == 0;
    cpu.flags.parity_overflow = cpu.iff2;
    cpu.flags.half_carry = false;
    cpu.flags.add_subtract = false;
}

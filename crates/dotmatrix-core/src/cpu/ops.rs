//! Base opcode table.

use std::sync::LazyLock;

use log::warn;

use super::{Cpu, OpFn, cb};
use crate::bus::Bus;
use crate::registers::{CpuStatus, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

pub static TABLE: LazyLock<[OpFn; 256]> = LazyLock::new(build);

const UNDEFINED: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

fn build() -> [OpFn; 256] {
    let mut t: [OpFn; 256] = [undefined; 256];

    for row in 0..4u8 {
        let base = row << 4;
        t[(base | 0x01) as usize] = ld_rr_d16;
        t[(base | 0x02) as usize] = ld_ind_a;
        t[(base | 0x03) as usize] = inc_rr;
        t[(base | 0x09) as usize] = add_hl_rr;
        t[(base | 0x0A) as usize] = ld_a_ind;
        t[(base | 0x0B) as usize] = dec_rr;
        t[(0xC1 | base) as usize] = pop;
        t[(0xC5 | base) as usize] = push;
    }
    for r in 0..8u8 {
        let base = r << 3;
        t[(base | 0x04) as usize] = inc_r;
        t[(base | 0x05) as usize] = dec_r;
        t[(base | 0x06) as usize] = ld_r_d8;
        t[(0xC6 | base) as usize] = alu_d8;
        t[(0xC7 | base) as usize] = rst;
    }
    for cc in 0..4u8 {
        let base = cc << 3;
        t[(0x20 | base) as usize] = jr_cc;
        t[(0xC0 | base) as usize] = ret_cc;
        t[(0xC2 | base) as usize] = jp_cc;
        t[(0xC4 | base) as usize] = call_cc;
    }
    for op in 0x40..=0x7Fusize {
        t[op] = ld_r_r;
    }
    for op in 0x80..=0xBFusize {
        t[op] = alu_r;
    }
    for op in [0x07, 0x0F, 0x17, 0x1F] {
        t[op] = rotate_a;
    }

    t[0x00] = nop;
    t[0x08] = ld_a16_sp;
    t[0x10] = stop;
    t[0x18] = jr;
    t[0x27] = daa;
    t[0x2F] = cpl;
    t[0x37] = scf;
    t[0x3F] = ccf;
    t[0x76] = halt;
    t[0xC3] = jp;
    t[0xC9] = ret;
    t[0xCB] = prefix_cb;
    t[0xCD] = call;
    t[0xD9] = reti;
    t[0xE0] = ldh_a8_a;
    t[0xE2] = ldh_c_a;
    t[0xE8] = add_sp_e8;
    t[0xE9] = jp_hl;
    t[0xEA] = ld_a16_a;
    t[0xF0] = ldh_a_a8;
    t[0xF2] = ldh_a_c;
    t[0xF3] = di;
    t[0xF8] = ld_hl_sp_e8;
    t[0xF9] = ld_sp_hl;
    t[0xFA] = ld_a_a16;
    t[0xFB] = ei;

    for op in UNDEFINED {
        t[op as usize] = undefined;
    }
    t
}

fn undefined(cpu: &mut Cpu, _: &mut Bus, op: u8) {
    warn!(
        "Undefined opcode {:#04X} at {:#06X}, ignored",
        op,
        cpu.regs.pc.wrapping_sub(1)
    );
}

fn nop(_: &mut Cpu, _: &mut Bus, _: u8) {}

fn ld_rr_d16(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.fetch16(bus);
    cpu.set_reg16(op >> 4, val);
}

/// (BC), (DE), (HL+), (HL-).
fn indirect_addr(cpu: &mut Cpu, bus: &mut Bus, op: u8) -> u16 {
    match (op >> 4) & 3 {
        0 => cpu.regs.bc(),
        1 => cpu.regs.de(),
        sel => {
            let hl = cpu.regs.hl();
            Cpu::idu(bus, hl);
            cpu.regs.set_hl(if sel == 2 {
                hl.wrapping_add(1)
            } else {
                hl.wrapping_sub(1)
            });
            hl
        }
    }
}

fn ld_ind_a(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let addr = indirect_addr(cpu, bus, op);
    cpu.write8(bus, addr, cpu.regs.a);
}

fn ld_a_ind(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let addr = indirect_addr(cpu, bus, op);
    cpu.regs.a = cpu.read8(bus, addr);
}

fn inc_rr(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let old = cpu.reg16(op >> 4);
    Cpu::idu(bus, old);
    cpu.set_reg16(op >> 4, old.wrapping_add(1));
    cpu.tick(bus);
}

fn dec_rr(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let old = cpu.reg16(op >> 4);
    Cpu::idu(bus, old);
    cpu.set_reg16(op >> 4, old.wrapping_sub(1));
    cpu.tick(bus);
}

fn add_hl_rr(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let hl = cpu.regs.hl();
    let val = cpu.reg16(op >> 4);
    let (sum, carry) = hl.overflowing_add(val);
    let half = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
    cpu.regs.set_hl(sum);
    cpu.regs.set_flag(FLAG_N, false);
    cpu.regs.set_flag(FLAG_H, half);
    cpu.regs.set_flag(FLAG_C, carry);
    cpu.tick(bus);
}

fn inc_r(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let r = op >> 3;
    let val = cpu.reg8(bus, r);
    let res = cpu.inc8(val);
    cpu.set_reg8(bus, r, res);
}

fn dec_r(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let r = op >> 3;
    let val = cpu.reg8(bus, r);
    let res = cpu.dec8(val);
    cpu.set_reg8(bus, r, res);
}

fn ld_r_d8(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.fetch8(bus);
    cpu.set_reg8(bus, op >> 3, val);
}

/// RLCA, RRCA, RLA, RRA: the CB shifts with Z always cleared.
fn rotate_a(cpu: &mut Cpu, _: &mut Bus, op: u8) {
    cpu.regs.a = cpu.shift(op >> 3, cpu.regs.a);
    cpu.regs.set_flag(FLAG_Z, false);
}

fn ld_a16_sp(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let addr = cpu.fetch16(bus);
    let sp = cpu.regs.sp;
    cpu.write8(bus, addr, sp as u8);
    cpu.write8(bus, addr.wrapping_add(1), (sp >> 8) as u8);
}

fn stop(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    cpu.regs.pc = cpu.regs.pc.wrapping_add(1);
    cpu.regs.status = CpuStatus::Stopped;
}

fn jump_relative(cpu: &mut Cpu, bus: &mut Bus, offset: u8) {
    cpu.regs.pc = cpu.regs.pc.wrapping_add(offset as i8 as u16);
    cpu.tick(bus);
}

fn jr(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let offset = cpu.fetch8(bus);
    jump_relative(cpu, bus, offset);
}

fn jr_cc(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let offset = cpu.fetch8(bus);
    if cpu.condition(op >> 3) {
        jump_relative(cpu, bus, offset);
    }
}

fn daa(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    let mut a = cpu.regs.a;
    let mut carry = cpu.regs.flag(FLAG_C);
    let half = cpu.regs.flag(FLAG_H);
    if cpu.regs.flag(FLAG_N) {
        if half {
            a = a.wrapping_sub(0x06);
        }
        if carry {
            a = a.wrapping_sub(0x60);
        }
    } else {
        if carry || a > 0x99 {
            a = a.wrapping_add(0x60);
            carry = true;
        }
        if half || a & 0x0F > 0x09 {
            a = a.wrapping_add(0x06);
        }
    }
    cpu.regs.a = a;
    cpu.regs.set_flag(FLAG_Z, a == 0);
    cpu.regs.set_flag(FLAG_H, false);
    cpu.regs.set_flag(FLAG_C, carry);
}

fn cpl(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    cpu.regs.a = !cpu.regs.a;
    cpu.regs.set_flag(FLAG_N, true);
    cpu.regs.set_flag(FLAG_H, true);
}

fn scf(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    cpu.regs.set_flag(FLAG_N, false);
    cpu.regs.set_flag(FLAG_H, false);
    cpu.regs.set_flag(FLAG_C, true);
}

fn ccf(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    let c = cpu.regs.flag(FLAG_C);
    cpu.regs.set_flag(FLAG_N, false);
    cpu.regs.set_flag(FLAG_H, false);
    cpu.regs.set_flag(FLAG_C, !c);
}

fn ld_r_r(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.reg8(bus, op);
    cpu.set_reg8(bus, op >> 3, val);
}

fn halt(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    if !bus.interrupts.ime && bus.interrupts.pending() != 0 {
        cpu.regs.halt_bug = true;
    } else {
        cpu.regs.status = CpuStatus::Halted;
    }
}

fn alu_r(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.reg8(bus, op);
    cpu.alu(op >> 3, val);
}

fn alu_d8(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.fetch8(bus);
    cpu.alu(op >> 3, val);
}

fn pop(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.pop16(bus);
    match (op >> 4) & 3 {
        3 => cpu.regs.set_af(val),
        idx => cpu.set_reg16(idx, val),
    }
}

fn push(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = match (op >> 4) & 3 {
        3 => cpu.regs.af(),
        idx => cpu.reg16(idx),
    };
    cpu.push16(bus, val);
}

fn ret(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    cpu.regs.pc = cpu.pop16(bus);
    cpu.tick(bus);
}

fn reti(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    ret(cpu, bus, op);
    bus.interrupts.ime = true;
}

fn ret_cc(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    cpu.tick(bus);
    if cpu.condition(op >> 3) {
        ret(cpu, bus, op);
    }
}

fn jp(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let addr = cpu.fetch16(bus);
    cpu.regs.pc = addr;
    cpu.tick(bus);
}

fn jp_cc(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let addr = cpu.fetch16(bus);
    if cpu.condition(op >> 3) {
        cpu.regs.pc = addr;
        cpu.tick(bus);
    }
}

fn jp_hl(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    cpu.regs.pc = cpu.regs.hl();
}

fn call(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let addr = cpu.fetch16(bus);
    cpu.push16(bus, cpu.regs.pc);
    cpu.regs.pc = addr;
}

fn call_cc(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let addr = cpu.fetch16(bus);
    if cpu.condition(op >> 3) {
        cpu.push16(bus, cpu.regs.pc);
        cpu.regs.pc = addr;
    }
}

fn rst(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    cpu.push16(bus, cpu.regs.pc);
    cpu.regs.pc = (op & 0x38) as u16;
}

fn prefix_cb(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let op = cpu.fetch8(bus);
    cb::TABLE[op as usize](cpu, bus, op);
}

fn ldh_a8_a(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let offset = cpu.fetch8(bus);
    cpu.write8(bus, 0xFF00 | offset as u16, cpu.regs.a);
}

fn ldh_a_a8(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let offset = cpu.fetch8(bus);
    cpu.regs.a = cpu.read8(bus, 0xFF00 | offset as u16);
}

fn ldh_c_a(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    cpu.write8(bus, 0xFF00 | cpu.regs.c as u16, cpu.regs.a);
}

fn ldh_a_c(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    cpu.regs.a = cpu.read8(bus, 0xFF00 | cpu.regs.c as u16);
}

fn ld_a16_a(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let addr = cpu.fetch16(bus);
    cpu.write8(bus, addr, cpu.regs.a);
}

fn ld_a_a16(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let addr = cpu.fetch16(bus);
    cpu.regs.a = cpu.read8(bus, addr);
}

fn add_sp_e8(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let offset = cpu.fetch8(bus);
    cpu.regs.sp = cpu.sp_offset(offset);
    cpu.tick(bus);
    cpu.tick(bus);
}

fn ld_hl_sp_e8(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    let offset = cpu.fetch8(bus);
    let val = cpu.sp_offset(offset);
    cpu.regs.set_hl(val);
    cpu.tick(bus);
}

fn ld_sp_hl(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    cpu.regs.sp = cpu.regs.hl();
    cpu.tick(bus);
}

fn di(cpu: &mut Cpu, bus: &mut Bus, _: u8) {
    bus.interrupts.ime = false;
    cpu.regs.ime_pending = false;
}

fn ei(cpu: &mut Cpu, _: &mut Bus, _: u8) {
    cpu.regs.ime_pending = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FrameBuffer;
    use crate::input::NoInput;
    use crate::sound::NullSound;

    fn run(program: &[u8], steps: usize) -> (Cpu, Bus, u32) {
        let mut bus = Bus::new(
            Box::new(FrameBuffer::new()),
            Box::new(NullSound::new()),
            Box::new(NoInput),
        );
        for (i, &b) in program.iter().enumerate() {
            bus.write(0xC000 + i as u16, b);
        }
        let mut cpu = Cpu::new();
        cpu.regs.pc = 0xC000;
        let mut cycles = 0;
        for _ in 0..steps {
            cycles += cpu.step(&mut bus);
        }
        (cpu, bus, cycles)
    }

    #[test]
    fn undefined_opcodes_are_nops() {
        for op in UNDEFINED {
            let (cpu, _, cycles) = run(&[op], 1);
            assert_eq!(cpu.regs.pc, 0xC001, "opcode {op:#04X}");
            assert_eq!(cycles, 4);
            assert_eq!(cpu.regs.af(), 0x01B0);
        }
    }

    #[test]
    fn accumulator_rotate_clears_zero() {
        // XOR A; RLCA
        let (cpu, _, _) = run(&[0xAF, 0x07], 2);
        assert_eq!(cpu.regs.a, 0);
        assert!(!cpu.regs.flag(FLAG_Z));
        // XOR A; RLC A
        let (cpu, _, _) = run(&[0xAF, 0xCB, 0x07], 2);
        assert!(cpu.regs.flag(FLAG_Z));
    }

    #[test]
    fn add_hl_half_carry_from_bit_11() {
        // LD HL,0x0FFF; LD BC,0x0001; ADD HL,BC
        let (cpu, _, _) = run(&[0x21, 0xFF, 0x0F, 0x01, 0x01, 0x00, 0x09], 3);
        assert_eq!(cpu.regs.hl(), 0x1000);
        assert!(cpu.regs.flag(FLAG_H));
        assert!(!cpu.regs.flag(FLAG_C));
    }

    #[test]
    fn daa_after_bcd_add() {
        // LD A,0x45; ADD A,0x38; DAA
        let (cpu, _, _) = run(&[0x3E, 0x45, 0xC6, 0x38, 0x27], 3);
        assert_eq!(cpu.regs.a, 0x83);
        // LD A,0x83; SUB 0x38; DAA
        let (cpu, _, _) = run(&[0x3E, 0x83, 0xD6, 0x38, 0x27], 3);
        assert_eq!(cpu.regs.a, 0x45);
    }

    #[test]
    fn instruction_timings() {
        let cases: &[(&[u8], u32)] = &[
            (&[0x01, 0x34, 0x12], 12),       // LD BC,d16
            (&[0x03], 8),                    // INC BC
            (&[0x08, 0x00, 0xD0], 20),       // LD (a16),SP
            (&[0x18, 0x00], 12),             // JR
            (&[0x20, 0x00], 8),              // JR NZ (Z set after reset)
            (&[0xC5], 16),                   // PUSH BC
            (&[0xC1], 12),                   // POP BC
            (&[0xCD, 0x00, 0xC1], 24),       // CALL
            (&[0xC3, 0x00, 0xC1], 16),       // JP
            (&[0xE8, 0x01], 16),             // ADD SP,e8
            (&[0xF8, 0x01], 12),             // LD HL,SP+e8
            (&[0xCB, 0x46], 12),             // BIT 0,(HL)
            (&[0xCB, 0x06], 16),             // RLC (HL)
            (&[0xC7], 16),                   // RST 00
        ];
        for &(program, expected) in cases {
            let (_, _, cycles) = run(program, 1);
            assert_eq!(cycles, expected, "program {program:02X?}");
        }
    }

    #[test]
    fn call_and_ret_round_trip() {
        let mut program = vec![0xCD, 0x10, 0xC0]; // CALL 0xC010
        program.resize(0x10, 0x00);
        program.push(0xC9); // RET
        let (cpu, _, cycles) = run(&program, 2);
        assert_eq!(cpu.regs.pc, 0xC003);
        assert_eq!(cpu.regs.sp, 0xFFFE);
        assert_eq!(cycles, 24 + 16);
    }

    #[test]
    fn push_pop_af_masks_flags() {
        // LD BC,0x12FF; PUSH BC; POP AF
        let (cpu, _, _) = run(&[0x01, 0xFF, 0x12, 0xC5, 0xF1], 3);
        assert_eq!(cpu.regs.af(), 0x12F0);
    }

    #[test]
    fn sp_offset_flags_from_low_byte() {
        // LD SP,0x00FF; ADD SP,1
        let (cpu, _, _) = run(&[0x31, 0xFF, 0x00, 0xE8, 0x01], 2);
        assert_eq!(cpu.regs.sp, 0x0100);
        assert_eq!(cpu.regs.f(), FLAG_H | FLAG_C);
    }

    #[test]
    fn hl_increment_and_decrement_loads() {
        // LD HL,0xC100; LD A,0x77; LD (HL+),A; LD (HL-),A
        let (cpu, mut bus, _) = run(&[0x21, 0x00, 0xC1, 0x3E, 0x77, 0x22, 0x32], 4);
        assert_eq!(cpu.regs.hl(), 0xC100);
        assert_eq!(bus.read(0xC100), 0x77);
        assert_eq!(bus.read(0xC101), 0x77);
    }
}

//! 0xCB-prefixed opcodes: shifts, BIT, RES and SET.

use std::sync::LazyLock;

use super::{Cpu, OpFn};
use crate::bus::Bus;
use crate::registers::{FLAG_H, FLAG_N, FLAG_Z};

pub static TABLE: LazyLock<[OpFn; 256]> = LazyLock::new(|| {
    let mut t: [OpFn; 256] = [shift; 256];
    for op in 0x40..=0xFFusize {
        t[op] = match op >> 6 {
            1 => bit,
            2 => res,
            _ => set,
        };
    }
    t
});

fn shift(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.reg8(bus, op);
    let out = cpu.shift(op >> 3, val);
    cpu.set_reg8(bus, op, out);
}

fn bit(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.reg8(bus, op);
    let mask = 1 << ((op >> 3) & 7);
    cpu.regs.set_flag(FLAG_Z, val & mask == 0);
    cpu.regs.set_flag(FLAG_N, false);
    cpu.regs.set_flag(FLAG_H, true);
}

fn res(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.reg8(bus, op);
    cpu.set_reg8(bus, op, val & !(1 << ((op >> 3) & 7)));
}

fn set(cpu: &mut Cpu, bus: &mut Bus, op: u8) {
    let val = cpu.reg8(bus, op);
    cpu.set_reg8(bus, op, val | (1 << ((op >> 3) & 7)));
}

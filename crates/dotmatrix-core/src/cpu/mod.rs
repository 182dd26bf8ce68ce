//! SM83 instruction engine.
//!
//! Every memory access costs one M-cycle and advances the rest of the
//! machine through [`Bus::tick`] right after the access, so peripherals see
//! reads and writes at the cycle they happen on hardware.

pub mod cb;
pub mod ops;

#[cfg(feature = "cpu-trace")]
use log::trace;

use crate::bus::Bus;
use crate::registers::{CpuRegisters, CpuStatus, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

/// Handler for one opcode. The opcode is passed along so a single handler
/// can decode register fields for a whole block.
pub type OpFn = fn(&mut Cpu, &mut Bus, u8);

pub const CYCLES_PER_M_CYCLE: u32 = 4;

#[derive(Debug, Clone, Default)]
pub struct Cpu {
    pub regs: CpuRegisters,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: CpuRegisters::new(),
        }
    }

    pub fn reset(&mut self, boot_rom_mapped: bool) {
        self.regs.reset(boot_rom_mapped);
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        let r = &self.regs;
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            r.af(),
            r.bc(),
            r.de(),
            r.hl(),
            r.pc,
            r.sp,
            r.total_cycles
        )
    }

    /// Run one instruction (or one idle M-cycle while halted or stopped),
    /// then service interrupts. Returns the T-cycles consumed.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        self.regs.step_cycles = 0;
        match self.regs.status {
            CpuStatus::Running => {
                let enable_ime = self.regs.ime_pending;
                let opcode = self.fetch_opcode(bus);
                #[cfg(feature = "cpu-trace")]
                trace!("{:02X} {}", opcode, self.debug_state());
                ops::TABLE[opcode as usize](self, bus, opcode);
                if enable_ime && self.regs.ime_pending {
                    self.regs.ime_pending = false;
                    bus.interrupts.ime = true;
                }
            }
            CpuStatus::Halted | CpuStatus::Stopped => self.tick(bus),
        }
        self.dispatch_interrupt(bus);
        self.regs.total_cycles += self.regs.step_cycles as u64;
        self.regs.step_cycles
    }

    fn dispatch_interrupt(&mut self, bus: &mut Bus) {
        if bus.interrupts.pending() == 0 {
            return;
        }
        self.regs.status = CpuStatus::Running;
        if !bus.interrupts.ime {
            return;
        }
        self.tick(bus);
        bus.interrupts.ime = false;
        self.tick(bus);

        let pc = self.regs.pc;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(bus, self.regs.sp, (pc >> 8) as u8);
        // The high byte may have landed on IE and cancelled the request.
        let target = bus.interrupts.current();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(bus, self.regs.sp, pc as u8);
        match target {
            Some((irq, vector)) => {
                bus.interrupts.clear(irq);
                self.regs.pc = vector;
            }
            None => self.regs.pc = 0,
        }
        self.tick(bus);
    }

    #[inline]
    pub(crate) fn tick(&mut self, bus: &mut Bus) {
        bus.tick();
        self.regs.step_cycles += CYCLES_PER_M_CYCLE;
    }

    /// Opcode fetch; the halt bug leaves PC where it was once.
    fn fetch_opcode(&mut self, bus: &mut Bus) -> u8 {
        let val = self.read8(bus, self.regs.pc);
        if self.regs.halt_bug {
            self.regs.halt_bug = false;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        val
    }

    #[inline(always)]
    pub(crate) fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        let val = self.read8(bus, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    #[inline(always)]
    pub(crate) fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    #[inline(always)]
    pub(crate) fn read8(&mut self, bus: &mut Bus, addr: u16) -> u8 {
        let val = bus.read(addr);
        self.tick(bus);
        val
    }

    #[inline(always)]
    pub(crate) fn write8(&mut self, bus: &mut Bus, addr: u16, val: u8) {
        bus.write(addr, val);
        self.tick(bus);
    }

    /// 16-bit increment/decrement unit driving `addr` onto the bus.
    #[inline(always)]
    pub(crate) fn idu(bus: &mut Bus, addr: u16) {
        bus.oam_corruption(addr);
    }

    pub(crate) fn push16(&mut self, bus: &mut Bus, val: u16) {
        Self::idu(bus, self.regs.sp);
        self.tick(bus);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(bus, self.regs.sp, (val >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(bus, self.regs.sp, val as u8);
    }

    pub(crate) fn pop16(&mut self, bus: &mut Bus) -> u16 {
        Self::idu(bus, self.regs.sp);
        let lo = self.read8(bus, self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = self.read8(bus, self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// B, C, D, E, H, L, (HL), A by the usual 3-bit encoding.
    pub(crate) fn reg8(&mut self, bus: &mut Bus, index: u8) -> u8 {
        match index & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => self.read8(bus, self.regs.hl()),
            _ => self.regs.a,
        }
    }

    pub(crate) fn set_reg8(&mut self, bus: &mut Bus, index: u8, val: u8) {
        match index & 7 {
            0 => self.regs.b = val,
            1 => self.regs.c = val,
            2 => self.regs.d = val,
            3 => self.regs.e = val,
            4 => self.regs.h = val,
            5 => self.regs.l = val,
            6 => self.write8(bus, self.regs.hl(), val),
            _ => self.regs.a = val,
        }
    }

    /// BC, DE, HL, SP.
    pub(crate) fn reg16(&self, index: u8) -> u16 {
        match index & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    pub(crate) fn set_reg16(&mut self, index: u8, val: u16) {
        match index & 3 {
            0 => self.regs.set_bc(val),
            1 => self.regs.set_de(val),
            2 => self.regs.set_hl(val),
            _ => self.regs.sp = val,
        }
    }

    /// NZ, Z, NC, C.
    pub(crate) fn condition(&self, index: u8) -> bool {
        match index & 3 {
            0 => !self.regs.flag(FLAG_Z),
            1 => self.regs.flag(FLAG_Z),
            2 => !self.regs.flag(FLAG_C),
            _ => self.regs.flag(FLAG_C),
        }
    }

    /// ADD, ADC, SUB, SBC, AND, XOR, OR, CP on A.
    pub(crate) fn alu(&mut self, op: u8, val: u8) {
        let a = self.regs.a;
        match op & 7 {
            0 | 1 => {
                let carry = if op & 7 == 1 { self.regs.carry() } else { 0 };
                let sum = a as u16 + val as u16 + carry as u16;
                let half = (a & 0x0F) + (val & 0x0F) + carry > 0x0F;
                self.regs.a = sum as u8;
                self.regs.set_flags(sum as u8 == 0, false, half, sum > 0xFF);
            }
            2 | 3 | 7 => {
                let carry = if op & 7 == 3 { self.regs.carry() } else { 0 };
                let diff = a.wrapping_sub(val).wrapping_sub(carry);
                let half = (a & 0x0F) < (val & 0x0F) + carry;
                let borrow = (a as u16) < val as u16 + carry as u16;
                if op & 7 != 7 {
                    self.regs.a = diff;
                }
                self.regs.set_flags(diff == 0, true, half, borrow);
            }
            4 => {
                self.regs.a = a & val;
                self.regs.set_flags(self.regs.a == 0, false, true, false);
            }
            5 => {
                self.regs.a = a ^ val;
                self.regs.set_flags(self.regs.a == 0, false, false, false);
            }
            _ => {
                self.regs.a = a | val;
                self.regs.set_flags(self.regs.a == 0, false, false, false);
            }
        }
    }

    pub(crate) fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.regs.set_flag(FLAG_Z, res == 0);
        self.regs.set_flag(FLAG_N, false);
        self.regs.set_flag(FLAG_H, val & 0x0F == 0x0F);
        res
    }

    pub(crate) fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.regs.set_flag(FLAG_Z, res == 0);
        self.regs.set_flag(FLAG_N, true);
        self.regs.set_flag(FLAG_H, val & 0x0F == 0);
        res
    }

    /// RLC, RRC, RL, RR, SLA, SRA, SWAP, SRL. Sets Z from the result.
    pub(crate) fn shift(&mut self, kind: u8, val: u8) -> u8 {
        let carry_in = self.regs.carry();
        let (res, carry) = match kind & 7 {
            0 => (val.rotate_left(1), val & 0x80 != 0),
            1 => (val.rotate_right(1), val & 0x01 != 0),
            2 => ((val << 1) | carry_in, val & 0x80 != 0),
            3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            4 => (val << 1, val & 0x80 != 0),
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => (val.rotate_left(4), false),
            _ => (val >> 1, val & 0x01 != 0),
        };
        self.regs.set_flags(res == 0, false, false, carry);
        res
    }

    /// SP plus a signed immediate; flags come from the low byte.
    pub(crate) fn sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.regs.sp;
        let e = offset as i8 as i16 as u16;
        let half = (sp & 0x0F) + (e & 0x0F) > 0x0F;
        let carry = (sp & 0xFF) + (e & 0xFF) > 0xFF;
        self.regs.set_flags(false, false, half, carry);
        sp.wrapping_add(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FrameBuffer;
    use crate::input::NoInput;
    use crate::sound::NullSound;

    fn setup() -> (Cpu, Bus) {
        let bus = Bus::new(
            Box::new(FrameBuffer::new()),
            Box::new(NullSound::new()),
            Box::new(NoInput),
        );
        let mut cpu = Cpu::new();
        cpu.regs.pc = 0xC000;
        (cpu, bus)
    }

    fn load(bus: &mut Bus, program: &[u8]) {
        for (i, &b) in program.iter().enumerate() {
            bus.write(0xC000 + i as u16, b);
        }
    }

    #[test]
    fn add_and_sub_flags() {
        let (mut cpu, _) = setup();
        cpu.regs.a = 0x0F;
        cpu.alu(0, 0x01);
        assert_eq!(cpu.regs.a, 0x10);
        assert_eq!(cpu.regs.f(), FLAG_H);
        cpu.regs.a = 0xFF;
        cpu.alu(0, 0x01);
        assert_eq!(cpu.regs.f(), FLAG_Z | FLAG_H | FLAG_C);
        cpu.regs.a = 0x10;
        cpu.alu(2, 0x01);
        assert_eq!(cpu.regs.a, 0x0F);
        assert_eq!(cpu.regs.f(), FLAG_N | FLAG_H);
        cpu.regs.a = 0x00;
        cpu.regs.set_flag(FLAG_C, true);
        cpu.alu(3, 0x00);
        assert_eq!(cpu.regs.a, 0xFF);
        assert_eq!(cpu.regs.f(), FLAG_N | FLAG_H | FLAG_C);
    }

    #[test]
    fn compare_leaves_a() {
        let (mut cpu, _) = setup();
        cpu.regs.a = 0x42;
        cpu.alu(7, 0x42);
        assert_eq!(cpu.regs.a, 0x42);
        assert!(cpu.regs.flag(FLAG_Z));
    }

    #[test]
    fn nop_takes_one_m_cycle() {
        let (mut cpu, mut bus) = setup();
        load(&mut bus, &[0x00]);
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.regs.pc, 0xC001);
    }

    #[test]
    fn halted_cpu_idles_one_m_cycle() {
        let (mut cpu, mut bus) = setup();
        cpu.regs.status = CpuStatus::Halted;
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.regs.pc, 0xC000);
    }

    #[test]
    fn interrupt_dispatch_takes_five_m_cycles() {
        let (mut cpu, mut bus) = setup();
        load(&mut bus, &[0x00]);
        bus.interrupts.ime = true;
        bus.interrupts.set_enable(0x04);
        bus.interrupts.set_request_reg(0x04);
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 4 + 20);
        assert_eq!(cpu.regs.pc, 0x0050);
        assert!(!bus.interrupts.ime);
        assert_eq!(bus.interrupts.request_reg() & 0x04, 0);
        assert_eq!(cpu.regs.sp, 0xFFFC);
        assert_eq!(bus.read(0xFFFC), 0x01);
        assert_eq!(bus.read(0xFFFD), 0xC0);
    }

    #[test]
    fn push_onto_ie_can_cancel_dispatch() {
        let (mut cpu, mut bus) = setup();
        load(&mut bus, &[0x00]);
        cpu.regs.sp = 0x0000;
        // PC high byte (0xC0) lands on IE and disables the timer interrupt.
        bus.interrupts.ime = true;
        bus.interrupts.set_enable(0x04);
        bus.interrupts.set_request_reg(0x04);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.pc, 0x0000);
        assert_eq!(bus.interrupts.request_reg() & 0x04, 0x04);
    }

    #[test]
    fn halt_wakes_without_ime() {
        let (mut cpu, mut bus) = setup();
        load(&mut bus, &[0x76, 0x00]);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.status, CpuStatus::Halted);
        bus.interrupts.set_enable(0x01);
        bus.interrupts.set_request_reg(0x01);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.status, CpuStatus::Running);
        assert_eq!(cpu.regs.pc, 0xC001);
    }

    #[test]
    fn halt_bug_repeats_next_byte() {
        let (mut cpu, mut bus) = setup();
        // HALT; INC A with an interrupt already pending and IME off
        load(&mut bus, &[0x76, 0x3C, 0x00]);
        bus.interrupts.set_enable(0x01);
        bus.interrupts.set_request_reg(0x01);
        cpu.regs.a = 0;
        cpu.step(&mut bus);
        assert!(cpu.regs.halt_bug);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 2);
        assert_eq!(cpu.regs.pc, 0xC002);
    }

    #[test]
    fn ei_takes_effect_after_next_instruction() {
        let (mut cpu, mut bus) = setup();
        load(&mut bus, &[0xFB, 0x00, 0x00]);
        bus.interrupts.set_enable(0x01);
        bus.interrupts.set_request_reg(0x01);
        cpu.step(&mut bus);
        assert!(!bus.interrupts.ime);
        assert_eq!(cpu.regs.pc, 0xC001);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.pc, 0x0040);
    }

    #[test]
    fn di_right_after_ei_wins() {
        let (mut cpu, mut bus) = setup();
        load(&mut bus, &[0xFB, 0xF3, 0x00]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert!(!bus.interrupts.ime);
    }
}

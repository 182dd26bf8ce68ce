use crate::state::{Snapshot, StateError, StateReader, StateWriter};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_AF: u16 = 0x01B0;
const BOOT_BC: u16 = 0x0013;
const BOOT_DE: u16 = 0x00D8;
const BOOT_HL: u16 = 0x014D;
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuStatus {
    #[default]
    Running,
    Halted,
    Stopped,
}

impl CpuStatus {
    fn to_byte(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Halted => 1,
            Self::Stopped => 2,
        }
    }

    fn from_byte(v: u8) -> Result<Self, StateError> {
        match v {
            0 => Ok(Self::Running),
            1 => Ok(Self::Halted),
            2 => Ok(Self::Stopped),
            _ => Err(StateError::Mismatch("cpu status")),
        }
    }
}

/// Register file of the SM83 core.
///
/// `F` is private so its low nibble can only ever be written through
/// [`CpuRegisters::set_f`], which masks it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuRegisters {
    pub a: u8,
    f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub status: CpuStatus,
    /// Next opcode fetch does not advance PC.
    pub halt_bug: bool,
    /// IME turns on after the instruction following EI.
    pub ime_pending: bool,
    /// T-cycles consumed by the most recent `step`.
    pub step_cycles: u32,
    pub total_cycles: u64,
}

impl CpuRegisters {
    pub fn new() -> Self {
        let mut regs = Self::default();
        regs.reset(false);
        regs
    }

    /// Apply the register state the boot ROM leaves behind, or zero everything
    /// when a boot ROM is mapped and will do the initialization itself.
    pub fn reset(&mut self, boot_rom_mapped: bool) {
        *self = Self::default();
        if boot_rom_mapped {
            return;
        }
        self.set_af(BOOT_AF);
        self.set_bc(BOOT_BC);
        self.set_de(BOOT_DE);
        self.set_hl(BOOT_HL);
        self.sp = BOOT_SP;
        self.pc = BOOT_PC;
    }

    pub fn f(&self) -> u8 {
        self.f
    }

    pub fn set_f(&mut self, v: u8) {
        self.f = v & 0xF0;
    }

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn set_af(&mut self, v: u16) {
        let [hi, lo] = v.to_be_bytes();
        self.a = hi;
        self.set_f(lo);
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn set_bc(&mut self, v: u16) {
        [self.b, self.c] = v.to_be_bytes();
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn set_de(&mut self, v: u16) {
        [self.d, self.e] = v.to_be_bytes();
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn set_hl(&mut self, v: u16) {
        [self.h, self.l] = v.to_be_bytes();
    }

    pub fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    pub fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.set_f(self.f | mask);
        } else {
            self.set_f(self.f & !mask);
        }
    }

    /// Replace all four flags at once.
    pub fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        let mut f = 0;
        if z {
            f |= FLAG_Z;
        }
        if n {
            f |= FLAG_N;
        }
        if h {
            f |= FLAG_H;
        }
        if c {
            f |= FLAG_C;
        }
        self.f = f;
    }

    pub fn carry(&self) -> u8 {
        self.flag(FLAG_C) as u8
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut w = StateWriter::new();
        self.save(&mut w);
        w.finish()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, StateError> {
        let mut regs = Self::default();
        regs.load(&mut StateReader::new(data))?;
        Ok(regs)
    }
}

impl Snapshot for CpuRegisters {
    fn save(&self, w: &mut StateWriter) {
        for r in [self.a, self.f, self.b, self.c, self.d, self.e, self.h, self.l] {
            w.u8(r);
        }
        w.u16(self.sp);
        w.u16(self.pc);
        w.u8(self.status.to_byte());
        w.bool(self.halt_bug);
        w.bool(self.ime_pending);
        w.u32(self.step_cycles);
        w.u64(self.total_cycles);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.a = r.u8()?;
        self.set_f(r.u8()?);
        self.b = r.u8()?;
        self.c = r.u8()?;
        self.d = r.u8()?;
        self.e = r.u8()?;
        self.h = r.u8()?;
        self.l = r.u8()?;
        self.sp = r.u16()?;
        self.pc = r.u16()?;
        self.status = CpuStatus::from_byte(r.u8()?)?;
        self.halt_bug = r.bool()?;
        self.ime_pending = r.bool()?;
        self.step_cycles = r.u32()?;
        self.total_cycles = r.u64()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_boot_values() {
        let regs = CpuRegisters::new();
        assert_eq!(regs.af(), 0x01B0);
        assert_eq!(regs.bc(), 0x0013);
        assert_eq!(regs.de(), 0x00D8);
        assert_eq!(regs.hl(), 0x014D);
        assert_eq!(regs.sp, 0xFFFE);
        assert_eq!(regs.pc, 0x0100);
        assert_eq!(regs.status, CpuStatus::Running);
    }

    #[test]
    fn boot_rom_reset_zeroes_everything() {
        let mut regs = CpuRegisters::new();
        regs.reset(true);
        assert_eq!(regs.af(), 0);
        assert_eq!(regs.hl(), 0);
        assert_eq!(regs.sp, 0);
        assert_eq!(regs.pc, 0);
    }

    #[test]
    fn byte_writes_truncate() {
        let mut regs = CpuRegisters::new();
        regs.b = 0x1FFu16 as u8;
        assert_eq!(regs.b, 0xFF);
        regs.c = (-1i32) as u8;
        assert_eq!(regs.c, 0xFF);
        regs.d = (-128i32) as u8;
        assert_eq!(regs.d, 0x80);
    }

    #[test]
    fn pairs_split_into_halves() {
        let mut regs = CpuRegisters::new();
        regs.set_bc(0xBEEF);
        assert_eq!((regs.b, regs.c), (0xBE, 0xEF));
        regs.set_de(0x1234);
        assert_eq!((regs.d, regs.e), (0x12, 0x34));
        regs.set_hl(0xC0DE);
        assert_eq!((regs.h, regs.l), (0xC0, 0xDE));
        regs.set_af(0x12FF);
        assert_eq!(regs.a, 0x12);
        assert_eq!(regs.f(), 0xF0);
        assert_eq!(regs.af(), 0x12F0);
    }

    #[test]
    fn flag_low_nibble_stays_clear() {
        let mut regs = CpuRegisters::new();
        regs.set_f(0xFF);
        assert_eq!(regs.f() & 0x0F, 0);
        regs.set_flag(0x01, true);
        assert_eq!(regs.f() & 0x0F, 0);
    }

    #[test]
    fn serialize_round_trip() {
        let mut regs = CpuRegisters::new();
        regs.set_af(0xAB50);
        regs.set_bc(0x0102);
        regs.set_de(0x0304);
        regs.set_hl(0x0506);
        regs.sp = 0xDFF0;
        regs.pc = 0x4321;
        regs.status = CpuStatus::Halted;
        regs.halt_bug = true;
        regs.ime_pending = true;
        regs.step_cycles = 24;
        regs.total_cycles = 0x0123_4567_89AB;

        let restored = CpuRegisters::deserialize(&regs.serialize()).unwrap();
        assert_eq!(restored, regs);
    }
}

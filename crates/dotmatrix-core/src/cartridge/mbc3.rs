use std::time::SystemTime;

use super::rtc::Rtc;
use super::{BankController, ram_offset, rom_byte};
use crate::memory::RawMemory;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// MBC3: 7-bit ROM bank, RAM banks 0-7 or RTC registers 0x08-0x0C in the
/// RAM window, optional real-time clock.
#[derive(Debug, Clone)]
pub struct Mbc3 {
    ram_enable: bool,
    rom_bank: u8,
    ram_select: u8,
    last_latch_write: u8,
    rtc: Option<Rtc>,
}

impl Mbc3 {
    pub fn new(has_rtc: bool) -> Self {
        Self {
            ram_enable: false,
            rom_bank: 1,
            ram_select: 0,
            last_latch_write: 0xFF,
            rtc: has_rtc.then(|| Rtc::new(SystemTime::now())),
        }
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        self.rtc.as_ref()
    }

    pub fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        self.rtc.as_mut()
    }
}

impl BankController for Mbc3 {
    fn read_rom(&self, rom: &[u8], addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            self.rom_bank as usize
        };
        rom_byte(rom, bank, addr)
    }

    fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val & 0x0F == 0x0A,
            0x2000..=0x3FFF => self.rom_bank = (val & 0x7F).max(1),
            0x4000..=0x5FFF => self.ram_select = val & 0x0F,
            _ => {
                if self.last_latch_write == 0x00
                    && val == 0x01
                    && let Some(rtc) = self.rtc.as_mut()
                {
                    rtc.latch(SystemTime::now());
                }
                self.last_latch_write = val;
            }
        }
    }

    fn read_ram(&mut self, ram: &RawMemory, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        match self.ram_select {
            0x00..=0x07 if !ram.is_empty() => {
                ram.read(ram_offset(self.ram_select as usize, addr))
            }
            reg @ 0x08..=0x0C => self.rtc.as_ref().map_or(0xFF, |rtc| rtc.read(reg)),
            _ => 0xFF,
        }
    }

    fn write_ram(&mut self, ram: &mut RawMemory, addr: u16, val: u8) {
        if !self.ram_enable {
            return;
        }
        match self.ram_select {
            0x00..=0x07 => ram.write(ram_offset(self.ram_select as usize, addr), val),
            reg @ 0x08..=0x0C => {
                if let Some(rtc) = self.rtc.as_mut() {
                    rtc.write(reg, val, SystemTime::now());
                }
            }
            _ => {}
        }
    }
}

impl Snapshot for Mbc3 {
    fn save(&self, w: &mut StateWriter) {
        w.bool(self.ram_enable);
        w.u8(self.rom_bank);
        w.u8(self.ram_select);
        w.u8(self.last_latch_write);
        w.bool(self.rtc.is_some());
        if let Some(rtc) = &self.rtc {
            rtc.save(w);
        }
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enable = r.bool()?;
        self.rom_bank = (r.u8()? & 0x7F).max(1);
        self.ram_select = r.u8()? & 0x0F;
        self.last_latch_write = r.u8()?;
        let has_rtc = r.bool()?;
        match (&mut self.rtc, has_rtc) {
            (Some(rtc), true) => rtc.load(r),
            (None, false) => Ok(()),
            _ => Err(StateError::Mismatch("MBC3 clock")),
        }
    }
}

use super::{BankController, ram_offset, rom_byte};
use crate::memory::RawMemory;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

const LOGO: std::ops::Range<usize> = 0x0104..0x0134;
/// Second game of a multicart starts at bank 0x10.
const SECOND_GAME_LOGO: usize = 0x40104;

/// Multi-game MBC1 carts wire BANK2 to ROM bits 4-5 instead of 5-6. They are
/// recognised by a second copy of the boot logo at the start of bank 0x10.
pub fn detect_multicart(rom: &[u8]) -> bool {
    let Some(logo) = rom.get(LOGO) else {
        return false;
    };
    if logo.iter().all(|&b| b == 0) {
        return false;
    }
    rom.get(SECOND_GAME_LOGO..SECOND_GAME_LOGO + LOGO.len()) == Some(logo)
}

#[derive(Debug, Clone, Default)]
pub struct Mbc1 {
    ram_enable: bool,
    /// BANK1, 5 bits, never 0.
    bank1: u8,
    /// BANK2, 2 bits.
    bank2: u8,
    /// Banking mode 1 applies BANK2 to the 0x0000 window and RAM.
    advanced: bool,
    multicart: bool,
}

impl Mbc1 {
    pub fn new(multicart: bool) -> Self {
        Self {
            bank1: 1,
            multicart,
            ..Self::default()
        }
    }

    fn shift(&self) -> u32 {
        if self.multicart { 4 } else { 5 }
    }

    fn low_bits(&self) -> usize {
        if self.multicart {
            (self.bank1 & 0x0F) as usize
        } else {
            self.bank1 as usize
        }
    }

    pub fn rom_bank(&self) -> usize {
        ((self.bank2 as usize) << self.shift()) | self.low_bits()
    }

    fn zero_bank(&self) -> usize {
        if self.advanced {
            (self.bank2 as usize) << self.shift()
        } else {
            0
        }
    }

    fn ram_bank(&self) -> usize {
        if self.advanced { self.bank2 as usize } else { 0 }
    }
}

impl BankController for Mbc1 {
    fn read_rom(&self, rom: &[u8], addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            self.zero_bank()
        } else {
            self.rom_bank()
        };
        rom_byte(rom, bank, addr)
    }

    fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val & 0x0F == 0x0A,
            0x2000..=0x3FFF => {
                self.bank1 = val & 0x1F;
                if self.bank1 == 0 {
                    self.bank1 = 1;
                }
            }
            0x4000..=0x5FFF => self.bank2 = val & 0x03,
            _ => self.advanced = val & 0x01 != 0,
        }
    }

    fn read_ram(&mut self, ram: &RawMemory, addr: u16) -> u8 {
        if !self.ram_enable || ram.is_empty() {
            return 0xFF;
        }
        ram.read(ram_offset(self.ram_bank(), addr))
    }

    fn write_ram(&mut self, ram: &mut RawMemory, addr: u16, val: u8) {
        if self.ram_enable {
            ram.write(ram_offset(self.ram_bank(), addr), val);
        }
    }
}

impl Snapshot for Mbc1 {
    fn save(&self, w: &mut StateWriter) {
        w.bool(self.ram_enable);
        w.u8(self.bank1);
        w.u8(self.bank2);
        w.bool(self.advanced);
        w.bool(self.multicart);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enable = r.bool()?;
        self.bank1 = r.u8()? & 0x1F;
        self.bank2 = r.u8()? & 0x03;
        self.advanced = r.bool()?;
        if r.bool()? != self.multicart {
            return Err(StateError::Mismatch("MBC1 wiring"));
        }
        Ok(())
    }
}

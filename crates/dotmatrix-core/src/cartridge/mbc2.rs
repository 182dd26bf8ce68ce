use super::{BankController, rom_byte};
use crate::memory::RawMemory;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// MBC2: 4-bit ROM bank, 512x4-bit built-in RAM. Address bit 8 picks
/// between the RAM enable and ROM bank registers.
#[derive(Debug, Clone)]
pub struct Mbc2 {
    ram_enable: bool,
    rom_bank: u8,
}

impl Mbc2 {
    pub fn new() -> Self {
        Self {
            ram_enable: false,
            rom_bank: 1,
        }
    }
}

impl Default for Mbc2 {
    fn default() -> Self {
        Self::new()
    }
}

impl BankController for Mbc2 {
    fn read_rom(&self, rom: &[u8], addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            self.rom_bank as usize
        };
        rom_byte(rom, bank, addr)
    }

    fn write_rom(&mut self, addr: u16, val: u8) {
        if addr >= 0x4000 {
            return;
        }
        if addr & 0x0100 == 0 {
            self.ram_enable = val & 0x0F == 0x0A;
        } else {
            self.rom_bank = (val & 0x0F).max(1);
        }
    }

    fn read_ram(&mut self, ram: &RawMemory, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        ram.read(addr as usize & 0x01FF) | 0xF0
    }

    fn write_ram(&mut self, ram: &mut RawMemory, addr: u16, val: u8) {
        if self.ram_enable {
            ram.write(addr as usize & 0x01FF, val & 0x0F);
        }
    }
}

impl Snapshot for Mbc2 {
    fn save(&self, w: &mut StateWriter) {
        w.bool(self.ram_enable);
        w.u8(self.rom_bank);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enable = r.bool()?;
        self.rom_bank = (r.u8()? & 0x0F).max(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::cartridge::{Cartridge, test_rom};

    fn cart() -> Cartridge {
        Cartridge::from_rom(test_rom::build(0x06, 0x03, 0x00)).unwrap()
    }

    #[test]
    fn address_bit_eight_selects_register() {
        let mut c = cart();
        c.write_rom(0x2100, 0x05);
        assert_eq!(c.read_rom(0x4000), 5);
        // bit 8 clear: RAM enable, bank untouched
        c.write_rom(0x2000, 0x0A);
        assert_eq!(c.read_rom(0x4000), 5);
        c.write_ram(0xA000, 0x03);
        assert_eq!(c.read_ram(0xA000), 0xF3);
    }

    #[test]
    fn bank_zero_maps_to_one() {
        let mut c = cart();
        c.write_rom(0x0100, 0x00);
        assert_eq!(c.read_rom(0x4000), 1);
    }

    #[test]
    fn ram_is_nibble_wide_and_mirrored() {
        let mut c = cart();
        c.write_rom(0x0000, 0x0A);
        c.write_ram(0xA001, 0xAB);
        assert_eq!(c.read_ram(0xA001), 0xFB);
        assert_eq!(c.read_ram(0xA201), 0xFB);
        assert_eq!(c.read_ram(0xBE01), 0xFB);
    }
}

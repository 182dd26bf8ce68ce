use super::{BankController, ram_offset, rom_byte};
use crate::memory::RawMemory;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// MBC5: 9-bit ROM bank (bank 0 is selectable), 4-bit RAM bank. Rumble carts
/// repurpose RAM bank bit 3 as the motor control.
#[derive(Debug, Clone, Default)]
pub struct Mbc5 {
    ram_enable: bool,
    rom_bank_low: u8,
    rom_bank_high: u8,
    ram_bank: u8,
    has_rumble: bool,
    rumble: bool,
}

impl Mbc5 {
    pub fn new(has_rumble: bool) -> Self {
        Self {
            rom_bank_low: 1,
            has_rumble,
            ..Self::default()
        }
    }

    pub fn rom_bank(&self) -> usize {
        ((self.rom_bank_high as usize) << 8) | self.rom_bank_low as usize
    }

    pub fn rumble(&self) -> bool {
        self.rumble
    }
}

impl BankController for Mbc5 {
    fn read_rom(&self, rom: &[u8], addr: u16) -> u8 {
        let bank = if addr < 0x4000 { 0 } else { self.rom_bank() };
        rom_byte(rom, bank, addr)
    }

    fn write_rom(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val & 0x0F == 0x0A,
            0x2000..=0x2FFF => self.rom_bank_low = val,
            0x3000..=0x3FFF => self.rom_bank_high = val & 0x01,
            0x4000..=0x5FFF => {
                if self.has_rumble {
                    self.ram_bank = val & 0x07;
                    self.rumble = val & 0x08 != 0;
                } else {
                    self.ram_bank = val & 0x0F;
                }
            }
            _ => {}
        }
    }

    fn read_ram(&mut self, ram: &RawMemory, addr: u16) -> u8 {
        if !self.ram_enable || ram.is_empty() {
            return 0xFF;
        }
        ram.read(ram_offset(self.ram_bank as usize, addr))
    }

    fn write_ram(&mut self, ram: &mut RawMemory, addr: u16, val: u8) {
        if self.ram_enable {
            ram.write(ram_offset(self.ram_bank as usize, addr), val);
        }
    }
}

impl Snapshot for Mbc5 {
    fn save(&self, w: &mut StateWriter) {
        w.bool(self.ram_enable);
        w.u8(self.rom_bank_low);
        w.u8(self.rom_bank_high);
        w.u8(self.ram_bank);
        w.bool(self.rumble);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ram_enable = r.bool()?;
        self.rom_bank_low = r.u8()?;
        self.rom_bank_high = r.u8()? & 0x01;
        self.ram_bank = r.u8()? & 0x0F;
        self.rumble = r.bool()? && self.has_rumble;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::cartridge::{Cartridge, test_rom};

    #[test]
    fn nine_bit_bank_and_bank_zero() {
        let mut c = Cartridge::from_rom(test_rom::build(0x19, 0x08, 0x00)).unwrap();
        c.write_rom(0x2000, 0x05);
        c.write_rom(0x3000, 0x01);
        assert_eq!(c.read_rom(0x4000), 0x05);
        assert_eq!(c.read_rom(0x4001), 0x01);
        c.write_rom(0x2000, 0x00);
        c.write_rom(0x3000, 0x00);
        assert_eq!(c.read_rom(0x4000), 0x00);
    }

    #[test]
    fn sixteen_ram_banks() {
        let mut c = Cartridge::from_rom(test_rom::build(0x1B, 0x00, 0x04)).unwrap();
        c.write_rom(0x0000, 0x0A);
        c.write_rom(0x4000, 0x0F);
        c.write_ram(0xA000, 0x99);
        c.write_rom(0x4000, 0x07);
        assert_eq!(c.read_ram(0xA000), 0x00);
        c.write_rom(0x4000, 0x0F);
        assert_eq!(c.read_ram(0xA000), 0x99);
    }

    #[test]
    fn rumble_bit_is_not_a_bank_bit() {
        let mut c = Cartridge::from_rom(test_rom::build(0x1E, 0x00, 0x03)).unwrap();
        c.write_rom(0x0000, 0x0A);
        c.write_rom(0x4000, 0x01);
        c.write_ram(0xA000, 0x31);
        c.write_rom(0x4000, 0x09);
        assert!(c.rumble());
        assert_eq!(c.read_ram(0xA000), 0x31);
        c.write_rom(0x4000, 0x01);
        assert!(!c.rumble());
    }
}

//! Cartridge ROM/RAM and the memory bank controller family.

mod header;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;
mod rtc;

use log::{info, warn};

pub use header::{
    CartridgeError, CartridgeHeader, CartridgeId, CartridgeKind, ControllerKind, Destination,
    Licensee, RAM_BANK_SIZE, ROM_BANK_SIZE, RamSize, RomSize, global_checksum_of,
    header_checksum_of,
};
pub use mbc1::Mbc1;
pub use mbc2::Mbc2;
pub use mbc3::Mbc3;
pub use mbc5::Mbc5;
pub use rtc::{Rtc, RtcRegisters};

use crate::memory::RawMemory;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// MBC2 has 512 half-byte cells built into the controller.
const MBC2_RAM_SIZE: usize = 0x200;

/// Bank switching over the 0x0000-0x7FFF ROM window and the 0xA000-0xBFFF
/// RAM window. ROM and RAM storage belong to the [`Cartridge`]; controllers
/// only hold their bank registers.
pub trait BankController: Snapshot {
    fn read_rom(&self, rom: &[u8], addr: u16) -> u8;
    fn write_rom(&mut self, addr: u16, val: u8);
    fn read_ram(&mut self, ram: &RawMemory, addr: u16) -> u8;
    fn write_ram(&mut self, ram: &mut RawMemory, addr: u16, val: u8);
}

/// Byte `addr` (low 14 bits) of ROM bank `bank`. Bank numbers beyond the
/// image wrap around.
pub(crate) fn rom_byte(rom: &[u8], bank: usize, addr: u16) -> u8 {
    let banks = rom.len() / ROM_BANK_SIZE;
    if banks == 0 {
        return rom.get(addr as usize).copied().unwrap_or(0xFF);
    }
    let offset = (bank % banks) * ROM_BANK_SIZE + (addr as usize & 0x3FFF);
    rom[offset]
}

pub(crate) fn ram_offset(bank: usize, addr: u16) -> usize {
    bank * RAM_BANK_SIZE + (addr as usize & 0x1FFF)
}

/// Cartridge without a bank controller. Types 0x08/0x09 put up to 8 KiB of
/// RAM on the bus with no enable latch.
#[derive(Debug, Clone, Default)]
pub struct NoMbc;

impl BankController for NoMbc {
    fn read_rom(&self, rom: &[u8], addr: u16) -> u8 {
        rom.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn write_rom(&mut self, _addr: u16, _val: u8) {}

    fn read_ram(&mut self, ram: &RawMemory, addr: u16) -> u8 {
        ram.read(addr as usize & 0x1FFF)
    }

    fn write_ram(&mut self, ram: &mut RawMemory, addr: u16, val: u8) {
        ram.write(addr as usize & 0x1FFF, val);
    }
}

impl Snapshot for NoMbc {
    fn save(&self, _w: &mut StateWriter) {}

    fn load(&mut self, _r: &mut StateReader<'_>) -> Result<(), StateError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Controller {
    None(NoMbc),
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Controller {
    fn for_kind(kind: &CartridgeKind, rom: &[u8]) -> Self {
        match kind.controller {
            ControllerKind::RomOnly => Controller::None(NoMbc),
            ControllerKind::Mbc1 => Controller::Mbc1(Mbc1::new(mbc1::detect_multicart(rom))),
            ControllerKind::Mbc2 => Controller::Mbc2(Mbc2::new()),
            ControllerKind::Mbc3 => Controller::Mbc3(Mbc3::new(kind.timer)),
            ControllerKind::Mbc5 => Controller::Mbc5(Mbc5::new(kind.rumble)),
        }
    }

    fn as_dyn(&self) -> &dyn BankController {
        match self {
            Controller::None(m) => m,
            Controller::Mbc1(m) => m,
            Controller::Mbc2(m) => m,
            Controller::Mbc3(m) => m,
            Controller::Mbc5(m) => m,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn BankController {
        match self {
            Controller::None(m) => m,
            Controller::Mbc1(m) => m,
            Controller::Mbc2(m) => m,
            Controller::Mbc3(m) => m,
            Controller::Mbc5(m) => m,
        }
    }
}

pub struct Cartridge {
    header: Option<CartridgeHeader>,
    rom: Vec<u8>,
    ram: RawMemory,
    controller: Controller,
}

impl Cartridge {
    /// Slot with nothing inserted: ROM and RAM reads float to 0xFF.
    pub fn empty() -> Self {
        Self {
            header: None,
            rom: Vec::new(),
            ram: RawMemory::new(0),
            controller: Controller::None(NoMbc),
        }
    }

    pub fn from_rom(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(&rom)?;
        let kind = header.kind;

        let ram_bytes = match kind.controller {
            ControllerKind::Mbc2 => MBC2_RAM_SIZE,
            _ => header.ram_size.bytes,
        };
        let controller = Controller::for_kind(&kind, &rom);

        info!(
            "Loaded \"{}\": type {:#04X} ({:?}), {} ROM banks, {} bytes RAM",
            header.title, kind.code, kind.controller, header.rom_size.banks, ram_bytes
        );

        Ok(Self {
            header: Some(header),
            rom,
            ram: RawMemory::new(ram_bytes),
            controller,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none()
    }

    /// Power cycle: bank registers go back to their defaults while RAM and
    /// the clock keep running.
    pub fn reset(&mut self) {
        let Some(header) = &self.header else {
            return;
        };
        let rtc = self.rtc().cloned();
        self.controller = Controller::for_kind(&header.kind, &self.rom);
        if let (Some(saved), Some(live)) = (rtc, self.rtc_mut()) {
            *live = saved;
        }
    }

    pub fn header(&self) -> Option<&CartridgeHeader> {
        self.header.as_ref()
    }

    pub fn id(&self) -> Option<CartridgeId> {
        self.header.as_ref().map(CartridgeHeader::id)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        if self.rom.is_empty() {
            return 0xFF;
        }
        self.controller.as_dyn().read_rom(&self.rom, addr)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        self.controller.as_dyn_mut().write_rom(addr, val);
    }

    pub fn read_ram(&mut self, addr: u16) -> u8 {
        self.controller.as_dyn_mut().read_ram(&self.ram, addr)
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        self.controller
            .as_dyn_mut()
            .write_ram(&mut self.ram, addr, val);
    }

    pub fn has_battery(&self) -> bool {
        self.header.as_ref().is_some_and(|h| h.kind.battery)
    }

    /// RAM contents worth persisting, if the cartridge keeps RAM alive.
    pub fn battery_ram(&self) -> Option<&[u8]> {
        (self.has_battery() && !self.ram.is_empty()).then(|| self.ram.as_slice())
    }

    pub fn load_battery_ram(&mut self, data: &[u8]) {
        if self.ram.is_empty() {
            return;
        }
        if data.len() != self.ram.len() {
            warn!(
                "Battery RAM is {} bytes, cartridge expects {}; loading the overlap",
                data.len(),
                self.ram.len()
            );
        }
        let n = data.len().min(self.ram.len());
        self.ram.as_mut_slice()[..n].copy_from_slice(&data[..n]);
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        match &self.controller {
            Controller::Mbc3(m) => m.rtc(),
            _ => None,
        }
    }

    pub fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.controller {
            Controller::Mbc3(m) => m.rtc_mut(),
            _ => None,
        }
    }

    /// Rumble motor state for MBC5 rumble cartridges.
    pub fn rumble(&self) -> bool {
        match &self.controller {
            Controller::Mbc5(m) => m.rumble(),
            _ => false,
        }
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot for Cartridge {
    fn save(&self, w: &mut StateWriter) {
        self.controller.as_dyn().save(w);
        self.ram.save(w);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.controller.as_dyn_mut().load(r)?;
        self.ram.load(r)
    }
}

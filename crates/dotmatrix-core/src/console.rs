//! The assembled machine: CPU plus bus, and the operations frontends drive.

use log::{debug, info, warn};
use thiserror::Error;

use crate::bus::{BOOT_ROM_SIZE, Bus};
use crate::cartridge::{Cartridge, CartridgeError, CartridgeId};
use crate::cpu::Cpu;
use crate::display::PixelSink;
use crate::input::InputSource;
use crate::persist::{SaveSlot, SaveStore, StoreError};
use crate::ppu::DOTS_PER_FRAME;
use crate::sound::SoundUnit;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
    #[error("boot ROM must be 256 bytes, got {len}")]
    BootRomSize { len: usize },
    #[error("no cartridge inserted")]
    NoCartridge,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct GameConsole {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl GameConsole {
    /// Console with an empty cartridge slot, already in post-boot state.
    pub fn new(
        sink: Box<dyn PixelSink>,
        sound: Box<dyn SoundUnit>,
        input: Box<dyn InputSource>,
    ) -> Self {
        let mut console = Self {
            cpu: Cpu::new(),
            bus: Bus::new(sink, sound, input),
        };
        console.reset();
        console
    }

    /// Insert a cartridge and power-cycle.
    pub fn load_cartridge(&mut self, rom: Vec<u8>) -> Result<(), ConsoleError> {
        self.bus.cartridge = Cartridge::from_rom(rom)?;
        self.reset();
        Ok(())
    }

    /// Install a 256-byte boot ROM; the machine restarts through it.
    pub fn load_boot_rom(&mut self, data: &[u8]) -> Result<(), ConsoleError> {
        let image: [u8; BOOT_ROM_SIZE] = data
            .try_into()
            .map_err(|_| ConsoleError::BootRomSize { len: data.len() })?;
        self.bus.set_boot_rom(Some(Box::new(image)));
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(self.bus.boot_mapped());
        debug!(
            "Reset ({})",
            if self.bus.boot_mapped() {
                "boot ROM"
            } else {
                "post-boot"
            }
        );
    }

    pub fn cartridge_id(&self) -> Option<CartridgeId> {
        self.bus.cartridge.id()
    }

    /// One instruction, one idle M-cycle or one interrupt dispatch.
    /// Returns T-cycles.
    pub fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.bus)
    }

    /// Run until the PPU presents a frame, or a frame's worth of cycles
    /// passes with the LCD off. Returns T-cycles.
    pub fn run_frame(&mut self) -> u64 {
        let start = self.bus.ppu.frames();
        let mut cycles = 0u64;
        while self.bus.ppu.frames() == start && cycles < DOTS_PER_FRAME as u64 {
            cycles += self.step() as u64;
        }
        cycles
    }

    /// Bytes the program has sent over the serial port so far.
    pub fn serial_output(&self) -> &[u8] {
        self.bus.serial.peek_output()
    }

    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.bus.serial.take_output()
    }

    pub fn save_state(&self) -> Result<Vec<u8>, ConsoleError> {
        let id = self.cartridge_id().ok_or(ConsoleError::NoCartridge)?;
        let mut w = StateWriter::with_header(id.0);
        self.cpu.regs.save(&mut w);
        self.bus.save(&mut w);
        Ok(w.finish())
    }

    /// Restore a snapshot. On failure the machine is left as it was.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), ConsoleError> {
        let id = self.cartridge_id().ok_or(ConsoleError::NoCartridge)?;
        let backup = self.save_state()?;
        if let Err(e) = self.restore(data, id) {
            if self.restore(&backup, id).is_err() {
                warn!("Could not roll back after a failed state load; resetting");
                self.reset();
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn restore(&mut self, data: &[u8], id: CartridgeId) -> Result<(), StateError> {
        let mut r = StateReader::new(data);
        if r.read_header()? != id.0 {
            return Err(StateError::Mismatch("cartridge"));
        }
        self.cpu.regs.load(&mut r)?;
        self.bus.load(&mut r)?;
        if !r.is_empty() {
            return Err(StateError::Mismatch("state length"));
        }
        Ok(())
    }

    pub fn save_state_to(&self, store: &mut dyn SaveStore, slot: u8) -> Result<(), ConsoleError> {
        let id = self.cartridge_id().ok_or(ConsoleError::NoCartridge)?;
        let data = self.save_state()?;
        store.save(id, SaveSlot::State(slot), &data)?;
        info!("Saved state to slot {slot}");
        Ok(())
    }

    pub fn load_state_from(
        &mut self,
        store: &mut dyn SaveStore,
        slot: u8,
    ) -> Result<(), ConsoleError> {
        let id = self.cartridge_id().ok_or(ConsoleError::NoCartridge)?;
        let data = store.load(id, SaveSlot::State(slot))?;
        self.load_state(&data)?;
        info!("Loaded state from slot {slot}");
        Ok(())
    }

    /// Persist battery RAM and clock. Returns whether anything was written;
    /// cartridges without a battery have nothing to keep.
    pub fn save_battery(&self, store: &mut dyn SaveStore) -> Result<bool, ConsoleError> {
        let cart = &self.bus.cartridge;
        let Some(id) = cart.id() else {
            return Ok(false);
        };
        if !cart.has_battery() {
            return Ok(false);
        }
        let mut saved = false;
        if let Some(ram) = cart.battery_ram() {
            store.save(id, SaveSlot::Battery, ram)?;
            saved = true;
        }
        if let Some(rtc) = cart.rtc() {
            store.save(id, SaveSlot::Rtc, &rtc.serialize())?;
            saved = true;
        }
        Ok(saved)
    }

    /// Restore battery RAM and clock. Missing slots are not an error.
    pub fn load_battery(&mut self, store: &mut dyn SaveStore) -> Result<bool, ConsoleError> {
        let cart = &mut self.bus.cartridge;
        let Some(id) = cart.id() else {
            return Ok(false);
        };
        if !cart.has_battery() {
            return Ok(false);
        }
        let mut loaded = false;
        match store.load(id, SaveSlot::Battery) {
            Ok(data) => {
                cart.load_battery_ram(&data);
                loaded = true;
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(rtc) = cart.rtc_mut() {
            match store.load(id, SaveSlot::Rtc) {
                Ok(data) => {
                    if rtc.deserialize(&data) {
                        loaded = true;
                    } else {
                        warn!("Ignoring unreadable RTC data for {id}");
                    }
                }
                Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(loaded)
    }
}

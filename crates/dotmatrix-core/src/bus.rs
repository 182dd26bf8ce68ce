//! Address decoding and the per-M-cycle hardware tick.

use log::debug;

use crate::cartridge::Cartridge;
use crate::display::PixelSink;
use crate::dma::{DMA, DmaController};
use crate::input::{InputSource, JOYP, Joypad};
use crate::interrupts::InterruptController;
use crate::memory::RawMemory;
use crate::ppu::{self, Ppu};
use crate::serial::{SB, SC, Serial};
use crate::sound::SoundUnit;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};
use crate::timer::{self, Timer};

pub const IF: u16 = 0xFF0F;
pub const IE: u16 = 0xFFFF;
pub const BOOT: u16 = 0xFF50;

pub const BOOT_ROM_SIZE: usize = 0x100;
const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
/// IF after the boot ROM hands over.
const POST_BOOT_IF: u8 = 0xE1;

pub struct Bus {
    pub cartridge: Cartridge,
    pub ppu: Ppu,
    pub timer: Timer,
    pub interrupts: InterruptController,
    pub dma: DmaController,
    pub joypad: Joypad,
    pub serial: Serial,
    pub sound: Box<dyn SoundUnit>,
    pub sink: Box<dyn PixelSink>,
    pub input: Box<dyn InputSource>,
    wram: RawMemory,
    hram: RawMemory,
    boot_rom: Option<Box<[u8; BOOT_ROM_SIZE]>>,
    boot_mapped: bool,
    /// T-cycles since reset.
    cycles: u64,
}

impl Bus {
    pub fn new(
        sink: Box<dyn PixelSink>,
        sound: Box<dyn SoundUnit>,
        input: Box<dyn InputSource>,
    ) -> Self {
        let mut bus = Self {
            cartridge: Cartridge::empty(),
            ppu: Ppu::new(),
            timer: Timer::new(),
            interrupts: InterruptController::new(),
            dma: DmaController::new(),
            joypad: Joypad::new(),
            serial: Serial::new(),
            sound,
            sink,
            input,
            wram: RawMemory::new(WRAM_SIZE),
            hram: RawMemory::new(HRAM_SIZE),
            boot_rom: None,
            boot_mapped: false,
            cycles: 0,
        };
        bus.reset();
        bus
    }

    /// Install a boot ROM; it takes effect on the next reset.
    pub fn set_boot_rom(&mut self, image: Option<Box<[u8; BOOT_ROM_SIZE]>>) {
        self.boot_rom = image;
    }

    pub fn has_boot_rom(&self) -> bool {
        self.boot_rom.is_some()
    }

    pub fn boot_mapped(&self) -> bool {
        self.boot_mapped
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Bring every on-board component to its power-on state, or to the
    /// state the boot ROM leaves behind when there is none to run.
    pub fn reset(&mut self) {
        let boot = self.boot_rom.is_some();
        self.boot_mapped = boot;
        self.interrupts = InterruptController::new();
        if boot {
            self.ppu = Ppu::new();
            self.timer = Timer::new();
        } else {
            self.ppu = Ppu::post_boot();
            self.timer = Timer::post_boot();
            self.interrupts.set_request_reg(POST_BOOT_IF);
        }
        self.dma = DmaController::new();
        self.joypad = Joypad::new();
        self.serial = Serial::new();
        self.wram.fill(0);
        self.hram.fill(0);
        self.cartridge.reset();
        self.sink.clear();
        self.sound.reset();
        self.cycles = 0;
    }

    /// CPU read. Touches OAM-bug state and costs no time by itself.
    pub fn read(&mut self, addr: u16) -> u8 {
        self.oam_corruption(addr);
        self.read_inner(addr, false)
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.oam_corruption(addr);
        self.write_inner(addr, val);
    }

    /// An address in 0xFE00-0xFEFF on the CPU bus while the scanner owns
    /// OAM garbles the row it is reading. Also driven by the 16-bit
    /// increment/decrement unit.
    pub fn oam_corruption(&mut self, addr: u16) {
        if (0xFE00..=0xFEFF).contains(&addr) && !self.dma.active() {
            self.ppu.oam_glitch();
        }
    }

    fn cpu_blocked_by_dma(&self, addr: u16) -> bool {
        self.dma.active() && !(0xFF80..=0xFFFE).contains(&addr)
    }

    /// `dma` marks accesses made by the DMA engine itself, which bypass the
    /// DMA and PPU-mode locks.
    pub fn read_inner(&mut self, addr: u16, dma: bool) -> u8 {
        if !dma && self.cpu_blocked_by_dma(addr) {
            return 0xFF;
        }
        match addr {
            0x0000..=0x00FF if self.boot_mapped => match &self.boot_rom {
                Some(image) => image[addr as usize],
                None => 0xFF,
            },
            0x0000..=0x7FFF => self.cartridge.read_rom(addr),
            0x8000..=0x9FFF => {
                if dma || self.ppu.vram_accessible() {
                    self.ppu.vram.read((addr - 0x8000) as usize)
                } else {
                    0xFF
                }
            }
            0xA000..=0xBFFF => self.cartridge.read_ram(addr),
            0xC000..=0xDFFF => self.wram.read((addr - 0xC000) as usize),
            0xE000..=0xFDFF => self.wram.read((addr - 0xE000) as usize),
            0xFE00..=0xFE9F => {
                if dma || self.ppu.oam_accessible() {
                    self.ppu.oam.read((addr - 0xFE00) as usize)
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            JOYP => self.joypad.read(self.input.as_mut()),
            SB | SC => self.serial.read(addr),
            timer::DIV..=timer::TAC => self.timer.read(addr),
            IF => self.interrupts.request_reg(),
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.sound.read(addr),
            DMA => self.dma.register(),
            ppu::LCDC..=ppu::LYC | ppu::BGP..=ppu::WX => self.ppu.read_reg(addr),
            0xFF00..=0xFF7F => 0xFF,
            0xFF80..=0xFFFE => self.hram.read((addr - 0xFF80) as usize),
            IE => self.interrupts.enable(),
        }
    }

    fn write_inner(&mut self, addr: u16, val: u8) {
        if self.cpu_blocked_by_dma(addr) {
            return;
        }
        match addr {
            0x0000..=0x7FFF => self.cartridge.write_rom(addr, val),
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram.write((addr - 0x8000) as usize, val);
                }
            }
            0xA000..=0xBFFF => self.cartridge.write_ram(addr, val),
            0xC000..=0xDFFF => self.wram.write((addr - 0xC000) as usize, val),
            0xE000..=0xFDFF => self.wram.write((addr - 0xE000) as usize, val),
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam.write((addr - 0xFE00) as usize, val);
                }
            }
            0xFEA0..=0xFEFF => {}
            JOYP => self.joypad.write(val),
            SB | SC => self.serial.write(addr, val),
            timer::DIV..=timer::TAC => self.timer.write(addr, val),
            IF => self.interrupts.set_request_reg(val),
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.sound.write(addr, val),
            DMA => self.dma.start(val),
            ppu::LCDC..=ppu::LYC | ppu::BGP..=ppu::WX => self.ppu.write_reg(addr, val),
            BOOT => {
                if val != 0 && self.boot_mapped {
                    debug!("Boot ROM unmapped");
                    self.boot_mapped = false;
                }
            }
            0xFF00..=0xFF7F => {}
            0xFF80..=0xFFFE => self.hram.write((addr - 0xFF80) as usize, val),
            IE => self.interrupts.set_enable(val),
        }
    }

    /// One M-cycle of everything that is not the CPU.
    pub fn tick(&mut self) {
        self.timer.tick(&mut self.interrupts);
        for _ in 0..4 {
            self.ppu.tick(&mut self.interrupts, self.sink.as_mut());
        }
        if self.ppu.take_line_end() {
            self.joypad.poll(self.input.as_mut(), &mut self.interrupts);
        }
        if let Some((src, index)) = self.dma.tick() {
            let byte = self.read_inner(src, true);
            self.ppu.oam.write(index, byte);
        }
        self.serial.tick(&mut self.interrupts);
        self.sound.tick();
        self.cycles += 4;
    }
}

impl Snapshot for Bus {
    fn save(&self, w: &mut StateWriter) {
        w.u64(self.cycles);
        w.bool(self.boot_mapped);
        self.wram.save(w);
        self.hram.save(w);
        self.interrupts.save(w);
        self.timer.save(w);
        self.ppu.save(w);
        self.dma.save(w);
        self.joypad.save(w);
        self.serial.save(w);
        self.cartridge.save(w);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.cycles = r.u64()?;
        self.boot_mapped = r.bool()? && self.boot_rom.is_some();
        self.wram.load(r)?;
        self.hram.load(r)?;
        self.interrupts.load(r)?;
        self.timer.load(r)?;
        self.ppu.load(r)?;
        self.dma.load(r)?;
        self.joypad.load(r)?;
        self.serial.load(r)?;
        self.cartridge.load(r)?;
        Ok(())
    }
}

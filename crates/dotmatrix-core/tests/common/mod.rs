#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use dotmatrix_core::GameConsole;
use dotmatrix_core::cartridge::header_checksum_of;
use dotmatrix_core::display::{FrameBuffer, SharedFrameBuffer};
use dotmatrix_core::input::InputSource;
use dotmatrix_core::sound::NullSound;

/// Where test programs start; 0x0100 jumps here over the header.
pub const CODE: u16 = 0x0150;

/// Synthetic cartridge image built in memory.
pub struct RomBuilder {
    rom: Vec<u8>,
}

impl RomBuilder {
    /// 32 KiB ROM-only image titled `title`, entry point jumping to [`CODE`].
    pub fn new(title: &str) -> Self {
        let mut rom = vec![0u8; 0x8000];
        rom[0x100..0x104].copy_from_slice(&[0x00, 0xC3, CODE as u8, (CODE >> 8) as u8]);
        let len = title.len().min(15);
        rom[0x134..0x134 + len].copy_from_slice(&title.as_bytes()[..len]);
        Self { rom }
    }

    /// Set cartridge type and size codes, growing the image to match.
    pub fn kind(mut self, cart_type: u8, rom_code: u8, ram_code: u8) -> Self {
        self.rom.resize(0x8000 << rom_code, 0);
        self.rom[0x147] = cart_type;
        self.rom[0x148] = rom_code;
        self.rom[0x149] = ram_code;
        self
    }

    /// Stamp each 16 KiB bank's first two bytes with its bank number.
    pub fn stamp_banks(mut self) -> Self {
        for (bank, chunk) in self.rom.chunks_mut(0x4000).enumerate().skip(1) {
            chunk[0] = bank as u8;
            chunk[1] = (bank >> 8) as u8;
        }
        self
    }

    pub fn code(self, program: &[u8]) -> Self {
        self.bytes_at(CODE, program)
    }

    pub fn bytes_at(mut self, addr: u16, bytes: &[u8]) -> Self {
        let start = addr as usize;
        self.rom[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.rom[0x14D] = header_checksum_of(&self.rom);
        self.rom
    }
}

/// Console with a shared frame buffer and nothing pressed.
pub fn console(rom: Vec<u8>) -> (GameConsole, SharedFrameBuffer) {
    console_with_input(rom, Box::new(dotmatrix_core::input::NoInput))
}

pub fn console_with_input(
    rom: Vec<u8>,
    input: Box<dyn InputSource>,
) -> (GameConsole, SharedFrameBuffer) {
    let fb: SharedFrameBuffer = Rc::new(RefCell::new(FrameBuffer::new()));
    let mut gc = GameConsole::new(Box::new(fb.clone()), Box::new(NullSound::new()), input);
    gc.load_cartridge(rom).expect("test ROM should load");
    (gc, fb)
}

/// Step until PC lands on `addr` or the step budget runs out.
pub fn run_until_pc(gc: &mut GameConsole, addr: u16, max_steps: usize) -> bool {
    for _ in 0..max_steps {
        if gc.cpu.regs.pc == addr {
            return true;
        }
        gc.step();
    }
    gc.cpu.regs.pc == addr
}

/// Address of the `JR -2` idle loop that ends a program of `len` bytes.
pub fn idle_at(len: usize) -> u16 {
    CODE + len as u16 - 2
}

use std::cell::Cell;
use std::rc::Rc;

use crate::interrupts::{Interrupt, InterruptController};
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

pub const JOYP: u16 = 0xFF00;

/// Pressed-button bits reported by an [`InputSource`].
pub mod button {
    pub const RIGHT: u8 = 0x01;
    pub const LEFT: u8 = 0x02;
    pub const UP: u8 = 0x04;
    pub const DOWN: u8 = 0x08;
    pub const A: u8 = 0x10;
    pub const B: u8 = 0x20;
    pub const SELECT: u8 = 0x40;
    pub const START: u8 = 0x80;
}

/// Host-side button state, 1 = pressed.
pub trait InputSource {
    fn poll(&mut self) -> u8;
}

/// Nothing pressed, ever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll(&mut self) -> u8 {
        0
    }
}

/// Fixed mask, settable from the frontend between steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeldButtons(pub u8);

impl InputSource for HeldButtons {
    fn poll(&mut self) -> u8 {
        self.0
    }
}

/// Button mask shared with the frontend, which updates it between steps.
impl InputSource for Rc<Cell<u8>> {
    fn poll(&mut self) -> u8 {
        self.get()
    }
}

/// P1/JOYP register.
#[derive(Debug, Clone)]
pub struct Joypad {
    /// Bits 4-5 as last written; a 0 bit selects that button group.
    select: u8,
    pressed: u8,
    /// Low nibble seen at the previous poll, for edge detection.
    lines: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            pressed: 0,
            lines: 0x0F,
        }
    }

    fn compute_lines(&self) -> u8 {
        let mut low = 0;
        if self.select & 0x10 == 0 {
            low |= self.pressed & 0x0F;
        }
        if self.select & 0x20 == 0 {
            low |= self.pressed >> 4;
        }
        !low & 0x0F
    }

    pub fn read(&mut self, source: &mut dyn InputSource) -> u8 {
        self.pressed = source.poll();
        0xC0 | self.select | self.compute_lines()
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Scanline-boundary poll. Any selected line going low requests the
    /// joypad interrupt.
    pub fn poll(&mut self, source: &mut dyn InputSource, ic: &mut InterruptController) {
        self.pressed = source.poll();
        let lines = self.compute_lines();
        if self.lines & !lines != 0 {
            ic.request(Interrupt::Joypad);
        }
        self.lines = lines;
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot for Joypad {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.select);
        w.u8(self.lines);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.select = r.u8()? & 0x30;
        self.lines = r.u8()? & 0x0F;
        Ok(())
    }
}

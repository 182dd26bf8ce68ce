use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// Interrupt sources in priority order (gbdev.io/pandocs/Interrupts.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub fn mask(self) -> u8 {
        1 << self as u8
    }

    pub fn vector(self) -> u16 {
        0x40 + 8 * self as u16
    }
}

/// IME, IE and IF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptController {
    pub ime: bool,
    enable: u8,
    request: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) -> u8 {
        self.enable
    }

    pub fn set_enable(&mut self, v: u8) {
        self.enable = v;
    }

    /// IF with the three unused bits reading back as 1.
    pub fn request_reg(&self) -> u8 {
        self.request | 0xE0
    }

    pub fn set_request_reg(&mut self, v: u8) {
        self.request = v & 0x1F;
    }

    pub fn request(&mut self, irq: Interrupt) {
        self.request |= irq.mask();
    }

    pub fn clear(&mut self, irq: Interrupt) {
        self.request &= !irq.mask();
    }

    /// Bits both enabled and requested.
    pub fn pending(&self) -> u8 {
        self.enable & self.request & 0x1F
    }

    /// Highest-priority pending interrupt and its vector.
    pub fn current(&self) -> Option<(Interrupt, u16)> {
        let pending = self.pending();
        if pending == 0 {
            return None;
        }
        let irq = Interrupt::ALL[pending.trailing_zeros() as usize];
        Some((irq, irq.vector()))
    }
}

impl Snapshot for InterruptController {
    fn save(&self, w: &mut StateWriter) {
        w.bool(self.ime);
        w.u8(self.enable);
        w.u8(self.request);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.ime = r.bool()?;
        self.enable = r.u8()?;
        self.request = r.u8()? & 0x1F;
        Ok(())
    }
}

//! Boundary to the sound synthesis engine.

/// Receives every access to 0xFF10-0xFF3F and one tick per M-cycle.
pub trait SoundUnit {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, val: u8);
    fn tick(&mut self);
    /// Power-on state. Called whenever the console resets.
    fn reset(&mut self);
}

/// Register file without synthesis. Reads return the last value written so
/// software polling the sound registers sees its own writes.
#[derive(Debug, Clone)]
pub struct NullSound {
    regs: [u8; 0x30],
}

impl NullSound {
    pub fn new() -> Self {
        Self { regs: [0; 0x30] }
    }
}

impl Default for NullSound {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundUnit for NullSound {
    fn read(&mut self, addr: u16) -> u8 {
        self.regs[(addr - 0xFF10) as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.regs[(addr - 0xFF10) as usize] = val;
    }

    fn tick(&mut self) {}

    fn reset(&mut self) {
        self.regs.fill(0);
    }
}

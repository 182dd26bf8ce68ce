use crate::interrupts::{Interrupt, InterruptController};
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

pub const SB: u16 = 0xFF01;
pub const SC: u16 = 0xFF02;

/// T-cycles per shifted bit with the internal 8192 Hz clock.
const CYCLES_PER_BIT: u16 = 512;

/// SB/SC with nothing plugged into the link port. Incoming bits are all 1,
/// so a finished transfer leaves 0xFF in SB. Outgoing bytes are captured for
/// the frontend (test ROMs print through serial).
#[derive(Debug, Clone, Default)]
pub struct Serial {
    sb: u8,
    sc: u8,
    /// Bits still to shift; 0 when idle.
    remaining_bits: u8,
    bit_clock: u16,
    outgoing: u8,
    output: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            SB => self.sb,
            SC => self.sc | 0x7E,
            _ => unreachable!("serial read from {addr:#06X}"),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            SB => self.sb = val,
            SC => {
                self.sc = val & 0x81;
                // Only the internal clock makes progress without a partner.
                if val & 0x81 == 0x81 {
                    self.remaining_bits = 8;
                    self.bit_clock = 0;
                    self.outgoing = self.sb;
                } else {
                    self.remaining_bits = 0;
                }
            }
            _ => unreachable!("serial write to {addr:#06X}"),
        }
    }

    /// Advance one M-cycle.
    pub fn tick(&mut self, ic: &mut InterruptController) {
        if self.remaining_bits == 0 {
            return;
        }
        self.bit_clock += 4;
        if self.bit_clock < CYCLES_PER_BIT {
            return;
        }
        self.bit_clock = 0;
        self.sb = (self.sb << 1) | 1;
        self.remaining_bits -= 1;
        if self.remaining_bits == 0 {
            self.sc &= 0x7F;
            self.output.push(self.outgoing);
            ic.request(Interrupt::Serial);
        }
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.output
    }
}

impl Snapshot for Serial {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.sb);
        w.u8(self.sc);
        w.u8(self.remaining_bits);
        w.u16(self.bit_clock);
        w.u8(self.outgoing);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.sb = r.u8()?;
        self.sc = r.u8()? & 0x81;
        self.remaining_bits = r.u8()?.min(8);
        self.bit_clock = r.u16()? % CYCLES_PER_BIT;
        self.outgoing = r.u8()?;
        Ok(())
    }
}

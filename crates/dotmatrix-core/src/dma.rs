use log::debug;

use crate::state::{Snapshot, StateError, StateReader, StateWriter};

pub const DMA: u16 = 0xFF46;
/// Bytes copied per transfer.
pub const DMA_LENGTH: u8 = 0xA0;

/// OAM DMA sequencing. The bus performs the actual byte moves, one per
/// M-cycle, at the addresses this returns.
#[derive(Debug, Clone, Default)]
pub struct DmaController {
    reg: u8,
    source: u16,
    /// Start delay still to be consumed.
    armed: bool,
    copying: bool,
    index: u8,
}

impl DmaController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value last written to 0xFF46.
    pub fn register(&self) -> u8 {
        self.reg
    }

    pub fn active(&self) -> bool {
        self.armed || self.copying
    }

    pub fn start(&mut self, page: u8) {
        self.reg = page;
        // Sources above 0xDF mirror work RAM through the echo region.
        let page = if page >= 0xFE { page - 0x20 } else { page };
        self.source = (page as u16) << 8;
        self.armed = true;
        self.copying = false;
        self.index = 0;
        debug!("OAM DMA from {:#06X}", self.source);
    }

    /// Advance one M-cycle. Returns the source address and OAM offset of the
    /// byte to copy in this cycle.
    pub fn tick(&mut self) -> Option<(u16, usize)> {
        if self.armed {
            self.armed = false;
            self.copying = true;
            return None;
        }
        if !self.copying {
            return None;
        }
        let index = self.index;
        self.index += 1;
        if self.index == DMA_LENGTH {
            self.copying = false;
        }
        Some((self.source + index as u16, index as usize))
    }
}

impl Snapshot for DmaController {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.reg);
        w.u16(self.source);
        w.bool(self.armed);
        w.bool(self.copying);
        w.u8(self.index);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.reg = r.u8()?;
        self.source = r.u16()? & 0xFF00;
        self.armed = r.bool()?;
        self.copying = r.bool()?;
        self.index = r.u8()?;
        if self.index >= DMA_LENGTH && self.copying {
            return Err(StateError::Mismatch("DMA progress"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_cycle_delay_then_160_bytes() {
        let mut dma = DmaController::new();
        dma.start(0xC1);
        assert!(dma.active());
        assert_eq!(dma.tick(), None);
        let copied: Vec<(u16, usize)> = std::iter::from_fn(|| dma.tick()).collect();
        assert_eq!(copied.len(), 160);
        assert_eq!(copied[0], (0xC100, 0));
        assert_eq!(copied[159], (0xC19F, 159));
        assert!(!dma.active());
        assert_eq!(dma.register(), 0xC1);
    }

    #[test]
    fn high_pages_fold_onto_work_ram() {
        let mut dma = DmaController::new();
        dma.start(0xFE);
        dma.tick();
        assert_eq!(dma.tick(), Some((0xDE00, 0)));
    }

    #[test]
    fn restart_rearms() {
        let mut dma = DmaController::new();
        dma.start(0x80);
        dma.tick();
        dma.tick();
        dma.start(0x90);
        assert_eq!(dma.tick(), None);
        assert_eq!(dma.tick(), Some((0x9000, 0)));
    }
}

use crate::state::{Snapshot, StateError, StateReader, StateWriter};

pub const MAX_SPRITES_PER_LINE: usize = 10;
pub const TOTAL_SPRITES: usize = 40;
pub const OAM_SCAN_DOTS: u16 = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteEntry {
    /// Screen Y + 16.
    pub y: u8,
    /// Screen X + 8.
    pub x: u8,
    pub tile: u8,
    pub flags: u8,
    pub oam_index: u8,
}

impl SpriteEntry {
    pub fn x_flip(&self) -> bool {
        self.flags & 0x20 != 0
    }

    pub fn y_flip(&self) -> bool {
        self.flags & 0x40 != 0
    }

    pub fn palette1(&self) -> bool {
        self.flags & 0x10 != 0
    }

    pub fn bg_priority(&self) -> bool {
        self.flags & 0x80 != 0
    }
}

/// Mode 2 sprite selection. One OAM entry is examined every other dot; up to
/// ten entries covering the line are kept, then ordered by X with OAM index
/// breaking ties. Drawing consumes them front to back.
#[derive(Debug, Clone, Default)]
pub struct OamScanner {
    selected: [SpriteEntry; MAX_SPRITES_PER_LINE],
    count: usize,
    next: usize,
}

impl OamScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.next = 0;
    }

    /// Entry being examined at `dot` (0-79) of mode 2.
    pub fn entry_at(dot: u16) -> usize {
        (dot / 2) as usize
    }

    /// Run one dot of the scan. `dot` counts from 0 at the start of mode 2.
    pub fn tick(&mut self, dot: u16, oam: &[u8], ly: u8, sprite_height: u8) {
        if dot % 2 == 1 {
            return;
        }
        let index = Self::entry_at(dot);
        if index < TOTAL_SPRITES {
            self.check(index, oam, ly, sprite_height);
        }
        if dot + 2 >= OAM_SCAN_DOTS {
            self.finish();
        }
    }

    fn check(&mut self, index: usize, oam: &[u8], ly: u8, sprite_height: u8) {
        if self.count >= MAX_SPRITES_PER_LINE {
            return;
        }
        let base = index * 4;
        let entry = SpriteEntry {
            y: oam[base],
            x: oam[base + 1],
            tile: oam[base + 2],
            flags: oam[base + 3],
            oam_index: index as u8,
        };
        let line = ly as u16 + 16;
        let top = entry.y as u16;
        if entry.x != 0 && line >= top && line < top + sprite_height as u16 {
            self.selected[self.count] = entry;
            self.count += 1;
        }
    }

    /// Stable sort keeps OAM order among equal X.
    fn finish(&mut self) {
        self.selected[..self.count].sort_by_key(|s| s.x);
    }

    /// Select sprites for a whole line in one go.
    pub fn scan_line(&mut self, oam: &[u8], ly: u8, sprite_height: u8) {
        self.reset();
        for dot in (0..OAM_SCAN_DOTS).step_by(2) {
            self.tick(dot, oam, ly, sprite_height);
        }
    }

    pub fn peek(&self) -> Option<&SpriteEntry> {
        self.selected[..self.count].get(self.next)
    }

    pub fn pop(&mut self) -> Option<SpriteEntry> {
        let entry = self.peek().copied()?;
        self.next += 1;
        Some(entry)
    }

    pub fn remaining(&self) -> &[SpriteEntry] {
        &self.selected[self.next..self.count]
    }
}

impl Snapshot for OamScanner {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.count as u8);
        w.u8(self.next as u8);
        for s in &self.selected[..self.count] {
            for b in [s.y, s.x, s.tile, s.flags, s.oam_index] {
                w.u8(b);
            }
        }
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let count = r.u8()? as usize;
        let next = r.u8()? as usize;
        if count > MAX_SPRITES_PER_LINE || next > count {
            return Err(StateError::Mismatch("sprite list"));
        }
        for s in &mut self.selected[..count] {
            *s = SpriteEntry {
                y: r.u8()?,
                x: r.u8()?,
                tile: r.u8()?,
                flags: r.u8()?,
                oam_index: r.u8()?,
            };
        }
        self.count = count;
        self.next = next;
        Ok(())
    }
}

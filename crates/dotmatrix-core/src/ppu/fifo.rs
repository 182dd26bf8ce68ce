use crate::state::{Snapshot, StateError, StateReader, StateWriter};

pub const FIFO_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BgPixel {
    /// Raw 2-bit colour before palette lookup.
    pub color: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpritePixel {
    pub color: u8,
    /// OBP1 instead of OBP0.
    pub palette1: bool,
    /// OAM flag bit 7: background colours 1-3 win over this pixel.
    pub bg_priority: bool,
}

/// Fixed 8-slot ring buffer of pixels waiting to be shifted out.
#[derive(Debug, Clone)]
pub struct PixelFifo<T> {
    slots: [T; FIFO_CAPACITY],
    head: usize,
    len: usize,
}

impl<T: Copy + Default> PixelFifo<T> {
    pub fn new() -> Self {
        Self {
            slots: [T::default(); FIFO_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == FIFO_CAPACITY
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Returns false when the FIFO is already full.
    pub fn push(&mut self, px: T) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.len) % FIFO_CAPACITY;
        self.slots[tail] = px;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let px = self.slots[self.head];
        self.head = (self.head + 1) % FIFO_CAPACITY;
        self.len -= 1;
        Some(px)
    }

    /// Slot `i` counted from the next pixel out.
    pub fn get(&self, i: usize) -> Option<&T> {
        (i < self.len).then(|| &self.slots[(self.head + i) % FIFO_CAPACITY])
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        if i < self.len {
            Some(&mut self.slots[(self.head + i) % FIFO_CAPACITY])
        } else {
            None
        }
    }
}

impl<T: Copy + Default> Default for PixelFifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelFifo<SpritePixel> {
    /// Overlay a freshly fetched sprite row. Transparent slots take the new
    /// pixel; opaque ones belong to an earlier, higher-priority sprite.
    pub fn merge(&mut self, row: &[SpritePixel]) {
        for (i, &px) in row.iter().enumerate() {
            match self.get_mut(i) {
                Some(slot) => {
                    if slot.color == 0 && px.color != 0 {
                        *slot = px;
                    }
                }
                None => {
                    self.push(px);
                }
            }
        }
    }
}

impl Snapshot for PixelFifo<BgPixel> {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.len as u8);
        for i in 0..self.len {
            if let Some(px) = self.get(i) {
                w.u8(px.color);
            }
        }
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.clear();
        let len = r.u8()? as usize;
        if len > FIFO_CAPACITY {
            return Err(StateError::Mismatch("pixel FIFO length"));
        }
        for _ in 0..len {
            self.push(BgPixel {
                color: r.u8()? & 0x03,
            });
        }
        Ok(())
    }
}

impl Snapshot for PixelFifo<SpritePixel> {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.len as u8);
        for i in 0..self.len {
            if let Some(px) = self.get(i) {
                w.u8(px.color | (px.palette1 as u8) << 4 | (px.bg_priority as u8) << 7);
            }
        }
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.clear();
        let len = r.u8()? as usize;
        if len > FIFO_CAPACITY {
            return Err(StateError::Mismatch("pixel FIFO length"));
        }
        for _ in 0..len {
            let b = r.u8()?;
            self.push(SpritePixel {
                color: b & 0x03,
                palette1: b & 0x10 != 0,
                bg_priority: b & 0x80 != 0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(color: u8) -> SpritePixel {
        SpritePixel {
            color,
            ..SpritePixel::default()
        }
    }

    #[test]
    fn wraps_around_the_ring() {
        let mut fifo = PixelFifo::<BgPixel>::new();
        for round in 0..3u8 {
            for c in 0..8u8 {
                assert!(fifo.push(BgPixel { color: (c + round) & 3 }));
            }
            assert!(!fifo.push(BgPixel::default()));
            for c in 0..8u8 {
                assert_eq!(fifo.pop().map(|p| p.color), Some((c + round) & 3));
            }
            assert!(fifo.is_empty());
            // leave the head off slot 0 so the next round crosses the end
            for _ in 0..3 {
                fifo.push(BgPixel::default());
                fifo.pop();
            }
        }
        assert_eq!(fifo.pop(), None);

        for c in 0..6u8 {
            fifo.push(BgPixel { color: c & 3 });
        }
        fifo.pop();
        assert_eq!(fifo.get(4).map(|p| p.color), Some(5 & 3));
        assert_eq!(fifo.get(5), None);
    }

    #[test]
    fn merge_keeps_existing_opaque_pixels() {
        let mut fifo = PixelFifo::<SpritePixel>::new();
        for c in [0, 2, 0] {
            fifo.push(sp(c));
        }
        fifo.merge(&[sp(1), sp(1), sp(0), sp(3), sp(0)]);
        let colors: Vec<u8> = (0..fifo.len()).map(|i| fifo.get(i).unwrap().color).collect();
        assert_eq!(colors, [1, 2, 0, 3, 0]);
    }
}

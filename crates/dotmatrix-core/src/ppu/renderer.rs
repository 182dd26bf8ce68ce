use super::LcdControl;
use super::fifo::{BgPixel, PixelFifo, SpritePixel};
use crate::display::SCREEN_WIDTH;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// Expand a palette register into colour index -> shade.
#[inline(always)]
pub fn expand_palette(reg: u8) -> [u8; 4] {
    [reg & 3, (reg >> 2) & 3, (reg >> 4) & 3, (reg >> 6) & 3]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStep {
    /// Background FIFO empty; nothing shifted out.
    Stalled,
    /// Fine-scroll pixel dropped.
    Discarded,
    /// FIFOs flushed; the background fetcher must restart on the window.
    WindowStart,
    Pixel { column: u8, shade: u8 },
}

#[derive(Debug, Clone)]
pub struct PixelRenderer {
    bg_lut: [u8; 4],
    obj_lut: [[u8; 4]; 2],
    x: u8,
    discard: u8,
    window_active: bool,
}

impl PixelRenderer {
    pub fn new() -> Self {
        Self {
            bg_lut: expand_palette(0),
            obj_lut: [expand_palette(0); 2],
            x: 0,
            discard: 0,
            window_active: false,
        }
    }

    pub fn set_bgp(&mut self, val: u8) {
        self.bg_lut = expand_palette(val);
    }

    pub fn set_obp(&mut self, index: usize, val: u8) {
        self.obj_lut[index & 1] = expand_palette(val);
    }

    /// Next column to be output.
    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn line_done(&self) -> bool {
        self.x as usize >= SCREEN_WIDTH
    }

    pub fn window_active(&self) -> bool {
        self.window_active
    }

    pub fn start_line(&mut self, scx: u8) {
        self.x = 0;
        self.discard = scx & 7;
        self.window_active = false;
    }

    /// Shift one pixel out. `window_x` is WX when the window may start on
    /// this line.
    pub fn tick(
        &mut self,
        bg: &mut PixelFifo<BgPixel>,
        sprites: &mut PixelFifo<SpritePixel>,
        lcdc: &LcdControl,
        window_x: Option<u8>,
    ) -> RenderStep {
        if bg.is_empty() {
            return RenderStep::Stalled;
        }
        if self.discard == 0
            && !self.window_active
            && let Some(wx) = window_x
            && self.x as u16 + 7 >= wx as u16
        {
            self.window_active = true;
            bg.clear();
            sprites.clear();
            return RenderStep::WindowStart;
        }
        let Some(bg_px) = bg.pop() else {
            return RenderStep::Stalled;
        };
        if self.discard > 0 {
            self.discard -= 1;
            return RenderStep::Discarded;
        }
        let sprite = sprites.pop();
        let shade = self.mix(bg_px, sprite, lcdc);
        let column = self.x;
        self.x += 1;
        RenderStep::Pixel { column, shade }
    }

    pub fn mix(&self, bg: BgPixel, sprite: Option<SpritePixel>, lcdc: &LcdControl) -> u8 {
        let bg_color = if lcdc.bg_enabled { bg.color } else { 0 };
        if let Some(sp) = sprite
            && lcdc.obj_enabled
            && sp.color != 0
            && !(sp.bg_priority && bg_color != 0)
        {
            return self.obj_lut[sp.palette1 as usize][sp.color as usize];
        }
        self.bg_lut[bg_color as usize]
    }
}

impl Default for PixelRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot for PixelRenderer {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.x);
        w.u8(self.discard);
        w.bool(self.window_active);
    }

    /// Palette tables are rebuilt from the registers by the owner.
    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.x = r.u8()?.min(SCREEN_WIDTH as u8);
        self.discard = r.u8()? & 7;
        self.window_active = r.bool()?;
        Ok(())
    }
}

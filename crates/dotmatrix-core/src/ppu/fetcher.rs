use super::LcdControl;
use super::fifo::{BgPixel, PixelFifo, SpritePixel};
use super::oam_scan::SpriteEntry;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// Tiles fetched per line: 20 visible plus one for fine scroll.
pub const TILES_PER_LINE: u8 = 21;

/// Everything a fetch step needs to look at besides its own state.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub vram: &'a [u8],
    pub lcdc: LcdControl,
    pub scx: u8,
    pub scy: u8,
    pub ly: u8,
    pub window_line: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    Sleep,
    TileNumber,
    TileDataLow,
    TileDataHigh,
    PushToFifo,
}

impl FetchState {
    fn to_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(v: u8) -> Result<Self, StateError> {
        Ok(match v {
            0 => Self::Sleep,
            1 => Self::TileNumber,
            2 => Self::TileDataLow,
            3 => Self::TileDataHigh,
            4 => Self::PushToFifo,
            _ => return Err(StateError::Mismatch("fetcher state")),
        })
    }
}

/// Two dots per fetch step.
fn step_done(dots: &mut u8) -> bool {
    *dots += 1;
    if *dots == 2 {
        *dots = 0;
        true
    } else {
        false
    }
}

fn decode_row(low: u8, high: u8) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, px) in out.iter_mut().enumerate() {
        let bit = 7 - i;
        *px = (((high >> bit) & 1) << 1) | ((low >> bit) & 1);
    }
    out
}

/// Address of row `line` (0-7, or 0-15 for tall sprites) of `tile`.
fn tile_row_addr(lcdc: &LcdControl, tile: u8, line: u8) -> usize {
    let base = if lcdc.unsigned_tiles {
        tile as usize * 16
    } else {
        (0x1000 + (tile as i8 as isize) * 16) as usize
    };
    base + line as usize * 2
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundFetcher {
    state: FetchState,
    dots: u8,
    /// Tile column relative to the fetch origin (SCX/8 or window start).
    tile_x: u8,
    tiles_fetched: u8,
    window: bool,
    /// First fetch of a line is thrown away.
    warmup: bool,
    paused: bool,
    tile_no: u8,
    low: u8,
    high: u8,
}

impl BackgroundFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn in_window(&self) -> bool {
        self.window
    }

    pub fn start_line(&mut self) {
        *self = Self {
            state: FetchState::TileNumber,
            warmup: true,
            ..Self::default()
        };
    }

    pub fn start_window(&mut self) {
        self.state = FetchState::TileNumber;
        self.dots = 0;
        self.tile_x = 0;
        self.tiles_fetched = 0;
        self.window = true;
        self.warmup = false;
    }

    pub fn stop(&mut self) {
        self.state = FetchState::Sleep;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn tick(&mut self, ctx: &FetchContext<'_>, fifo: &mut PixelFifo<BgPixel>) {
        if self.paused {
            return;
        }
        match self.state {
            FetchState::Sleep => {}
            FetchState::TileNumber => {
                if step_done(&mut self.dots) {
                    self.tile_no = ctx.vram[self.map_addr(ctx)];
                    self.state = FetchState::TileDataLow;
                }
            }
            FetchState::TileDataLow => {
                if step_done(&mut self.dots) {
                    self.low = ctx.vram[self.data_addr(ctx)];
                    self.state = FetchState::TileDataHigh;
                }
            }
            FetchState::TileDataHigh => {
                if step_done(&mut self.dots) {
                    self.high = ctx.vram[self.data_addr(ctx) + 1];
                    if self.warmup {
                        self.warmup = false;
                        self.state = FetchState::TileNumber;
                    } else {
                        self.state = FetchState::PushToFifo;
                        self.try_push(fifo);
                    }
                }
            }
            FetchState::PushToFifo => self.try_push(fifo),
        }
    }

    fn try_push(&mut self, fifo: &mut PixelFifo<BgPixel>) {
        if !fifo.is_empty() {
            return;
        }
        for color in decode_row(self.low, self.high) {
            fifo.push(BgPixel { color });
        }
        self.tile_x = self.tile_x.wrapping_add(1);
        self.tiles_fetched += 1;
        self.state = if self.tiles_fetched >= TILES_PER_LINE {
            FetchState::Sleep
        } else {
            FetchState::TileNumber
        };
    }

    fn map_addr(&self, ctx: &FetchContext<'_>) -> usize {
        let (base, row, col) = if self.window {
            (
                ctx.lcdc.window_map_base(),
                ctx.window_line as usize / 8,
                self.tile_x as usize & 31,
            )
        } else {
            let y = ctx.ly.wrapping_add(ctx.scy);
            (
                ctx.lcdc.bg_map_base(),
                y as usize / 8,
                ((ctx.scx / 8) as usize + self.tile_x as usize) & 31,
            )
        };
        base + row * 32 + col
    }

    fn data_addr(&self, ctx: &FetchContext<'_>) -> usize {
        let line = if self.window {
            ctx.window_line % 8
        } else {
            ctx.ly.wrapping_add(ctx.scy) % 8
        };
        tile_row_addr(&ctx.lcdc, self.tile_no, line)
    }
}

impl Snapshot for BackgroundFetcher {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.state.to_byte());
        w.u8(self.dots);
        w.u8(self.tile_x);
        w.u8(self.tiles_fetched);
        w.bool(self.window);
        w.bool(self.warmup);
        w.bool(self.paused);
        w.u8(self.tile_no);
        w.u8(self.low);
        w.u8(self.high);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.state = FetchState::from_byte(r.u8()?)?;
        self.dots = r.u8()? & 1;
        self.tile_x = r.u8()?;
        self.tiles_fetched = r.u8()?;
        self.window = r.bool()?;
        self.warmup = r.bool()?;
        self.paused = r.bool()?;
        self.tile_no = r.u8()?;
        self.low = r.u8()?;
        self.high = r.u8()?;
        Ok(())
    }
}

/// Fetches one sprite row and overlays it on the sprite FIFO. Runs while
/// the background fetcher and renderer are stalled.
#[derive(Debug, Clone, Default)]
pub struct SpriteFetcher {
    state: FetchState,
    dots: u8,
    entry: SpriteEntry,
    addr: usize,
    low: u8,
}

impl SpriteFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.state != FetchState::Sleep
    }

    pub fn start(&mut self, entry: SpriteEntry) {
        self.state = FetchState::TileNumber;
        self.dots = 0;
        self.entry = entry;
    }

    pub fn cancel(&mut self) {
        self.state = FetchState::Sleep;
    }

    pub fn tick(&mut self, ctx: &FetchContext<'_>, fifo: &mut PixelFifo<SpritePixel>) {
        match self.state {
            FetchState::Sleep => {}
            FetchState::TileNumber => {
                if step_done(&mut self.dots) {
                    self.addr = self.row_addr(ctx);
                    self.state = FetchState::TileDataLow;
                }
            }
            FetchState::TileDataLow => {
                if step_done(&mut self.dots) {
                    self.low = ctx.vram[self.addr];
                    self.state = FetchState::TileDataHigh;
                }
            }
            FetchState::TileDataHigh => {
                if step_done(&mut self.dots) {
                    let high = ctx.vram[self.addr + 1];
                    self.state = FetchState::PushToFifo;
                    self.push(high, fifo);
                }
            }
            FetchState::PushToFifo => {}
        }
    }

    fn row_addr(&self, ctx: &FetchContext<'_>) -> usize {
        let height = ctx.lcdc.sprite_height();
        let mut row = (ctx.ly.wrapping_add(16).wrapping_sub(self.entry.y)) & (height - 1);
        if self.entry.y_flip() {
            row = height - 1 - row;
        }
        let tile = if height == 16 {
            self.entry.tile & 0xFE
        } else {
            self.entry.tile
        };
        tile as usize * 16 + row as usize * 2
    }

    fn push(&mut self, high: u8, fifo: &mut PixelFifo<SpritePixel>) {
        let mut colors = decode_row(self.low, high);
        if self.entry.x_flip() {
            colors.reverse();
        }
        let row = colors.map(|color| SpritePixel {
            color,
            palette1: self.entry.palette1(),
            bg_priority: self.entry.bg_priority(),
        });
        // Columns left of the screen edge never reach the FIFO.
        let skip = 8usize.saturating_sub(self.entry.x as usize);
        fifo.merge(&row[skip..]);
        self.state = FetchState::Sleep;
    }
}

impl Snapshot for SpriteFetcher {
    fn save(&self, w: &mut StateWriter) {
        w.u8(self.state.to_byte());
        w.u8(self.dots);
        let e = &self.entry;
        for b in [e.y, e.x, e.tile, e.flags, e.oam_index] {
            w.u8(b);
        }
        w.u16(self.addr as u16);
        w.u8(self.low);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        self.state = FetchState::from_byte(r.u8()?)?;
        self.dots = r.u8()? & 1;
        self.entry = SpriteEntry {
            y: r.u8()?,
            x: r.u8()?,
            tile: r.u8()?,
            flags: r.u8()?,
            oam_index: r.u8()?,
        };
        self.addr = (r.u16()? & 0x1FFE) as usize;
        self.low = r.u8()?;
        Ok(())
    }
}

//! Pixel processing unit: scanline state machine, registers, VRAM and OAM.

pub mod fetcher;
pub mod fifo;
pub mod oam_scan;
pub mod renderer;

use log::debug;

use crate::display::{PixelSink, SCREEN_HEIGHT};
use crate::interrupts::{Interrupt, InterruptController};
use crate::memory::RawMemory;
use crate::state::{Snapshot, StateError, StateReader, StateWriter};
use fetcher::{BackgroundFetcher, FetchContext, SpriteFetcher};
use fifo::{BgPixel, PixelFifo, SpritePixel};
use oam_scan::{OAM_SCAN_DOTS, OamScanner};
use renderer::{PixelRenderer, RenderStep};

pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const SCY: u16 = 0xFF42;
pub const SCX: u16 = 0xFF43;
pub const LY: u16 = 0xFF44;
pub const LYC: u16 = 0xFF45;
pub const BGP: u16 = 0xFF47;
pub const OBP0: u16 = 0xFF48;
pub const OBP1: u16 = 0xFF49;
pub const WY: u16 = 0xFF4A;
pub const WX: u16 = 0xFF4B;

pub const VRAM_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;

pub const DOTS_PER_LINE: u16 = 456;
/// LY moves to the next line four dots before the line really ends.
const LY_ADVANCE_DOT: u16 = 452;
pub const LINES_PER_FRAME: u8 = 154;
pub const DOTS_PER_FRAME: u32 = DOTS_PER_LINE as u32 * LINES_PER_FRAME as u32;
pub const MIN_DRAWING_DOTS: u16 = 172;

const STAT_HBLANK: u8 = 0x08;
const STAT_VBLANK: u8 = 0x10;
const STAT_OAM: u8 = 0x20;
const STAT_LYC: u8 = 0x40;

/// LCDC split into flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LcdControl {
    pub lcd_enabled: bool,
    pub window_map_high: bool,
    pub window_enabled: bool,
    /// Tile data at 0x8000 with unsigned indices; otherwise 0x9000 signed.
    pub unsigned_tiles: bool,
    pub bg_map_high: bool,
    pub tall_sprites: bool,
    pub obj_enabled: bool,
    pub bg_enabled: bool,
}

impl LcdControl {
    pub fn from_bits(v: u8) -> Self {
        Self {
            lcd_enabled: v & 0x80 != 0,
            window_map_high: v & 0x40 != 0,
            window_enabled: v & 0x20 != 0,
            unsigned_tiles: v & 0x10 != 0,
            bg_map_high: v & 0x08 != 0,
            tall_sprites: v & 0x04 != 0,
            obj_enabled: v & 0x02 != 0,
            bg_enabled: v & 0x01 != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        (self.lcd_enabled as u8) << 7
            | (self.window_map_high as u8) << 6
            | (self.window_enabled as u8) << 5
            | (self.unsigned_tiles as u8) << 4
            | (self.bg_map_high as u8) << 3
            | (self.tall_sprites as u8) << 2
            | (self.obj_enabled as u8) << 1
            | self.bg_enabled as u8
    }

    pub fn sprite_height(&self) -> u8 {
        if self.tall_sprites { 16 } else { 8 }
    }

    /// VRAM offsets of the two tile maps.
    pub fn bg_map_base(&self) -> usize {
        if self.bg_map_high { 0x1C00 } else { 0x1800 }
    }

    pub fn window_map_base(&self) -> usize {
        if self.window_map_high { 0x1C00 } else { 0x1800 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PpuMode {
    #[default]
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Drawing = 3,
}

impl PpuMode {
    fn from_bits(v: u8) -> Self {
        match v & 3 {
            0 => Self::HBlank,
            1 => Self::VBlank,
            2 => Self::OamScan,
            _ => Self::Drawing,
        }
    }
}

pub struct Ppu {
    pub vram: RawMemory,
    pub oam: RawMemory,

    lcdc: LcdControl,
    stat_sources: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal scanline, trails `ly` by four dots at the end of a line.
    line: u8,
    line_dot: u16,
    mode: PpuMode,
    prev_mode: PpuMode,
    drawing_dots: u16,
    window_line: u8,
    wy_latch: bool,
    window_drawn: bool,
    first_frame: bool,
    stat_pending: bool,
    lyc_equal: bool,
    line_ended: bool,
    frames: u64,

    scanner: OamScanner,
    bg_fetcher: BackgroundFetcher,
    sprite_fetcher: SpriteFetcher,
    bg_fifo: PixelFifo<BgPixel>,
    sprite_fifo: PixelFifo<SpritePixel>,
    renderer: PixelRenderer,
}

impl Ppu {
    /// Power-on state: LCD off, everything zeroed.
    pub fn new() -> Self {
        Self {
            vram: RawMemory::new(VRAM_SIZE),
            oam: RawMemory::new(OAM_SIZE),
            lcdc: LcdControl::default(),
            stat_sources: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            line: 0,
            line_dot: 0,
            mode: PpuMode::HBlank,
            prev_mode: PpuMode::HBlank,
            drawing_dots: 0,
            window_line: 0,
            wy_latch: false,
            window_drawn: false,
            first_frame: false,
            stat_pending: false,
            lyc_equal: false,
            line_ended: false,
            frames: 0,
            scanner: OamScanner::new(),
            bg_fetcher: BackgroundFetcher::new(),
            sprite_fetcher: SpriteFetcher::new(),
            bg_fifo: PixelFifo::new(),
            sprite_fifo: PixelFifo::new(),
            renderer: PixelRenderer::new(),
        }
    }

    /// State left behind by the boot ROM: LCD on at the top of a frame.
    pub fn post_boot() -> Self {
        let mut ppu = Self::new();
        ppu.write_reg(BGP, 0xFC);
        ppu.write_reg(LCDC, 0x91);
        ppu.first_frame = false;
        ppu
    }

    pub fn lcdc(&self) -> LcdControl {
        self.lcdc
    }

    pub fn mode(&self) -> PpuMode {
        self.mode
    }

    pub fn previous_mode(&self) -> PpuMode {
        self.prev_mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn line(&self) -> u8 {
        self.line
    }

    /// Dots elapsed in the current line.
    pub fn line_dot(&self) -> u16 {
        self.line_dot
    }

    /// Length of the most recent (or current) mode 3.
    pub fn drawing_dots(&self) -> u16 {
        self.drawing_dots
    }

    pub fn window_line(&self) -> u8 {
        self.window_line
    }

    pub fn first_frame(&self) -> bool {
        self.first_frame
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// True once per completed scanline; reading clears it.
    pub fn take_line_end(&mut self) -> bool {
        std::mem::take(&mut self.line_ended)
    }

    pub fn vram_accessible(&self) -> bool {
        !self.lcdc.lcd_enabled || self.mode != PpuMode::Drawing
    }

    pub fn oam_accessible(&self) -> bool {
        !self.lcdc.lcd_enabled || matches!(self.mode, PpuMode::HBlank | PpuMode::VBlank)
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            LCDC => self.lcdc.bits(),
            STAT => {
                let mode = if self.lcdc.lcd_enabled {
                    self.mode as u8
                } else {
                    0
                };
                0x80 | self.stat_sources | (self.lyc_equal as u8) << 2 | mode
            }
            SCY => self.scy,
            SCX => self.scx,
            LY => self.ly,
            LYC => self.lyc,
            BGP => self.bgp,
            OBP0 => self.obp0,
            OBP1 => self.obp1,
            WY => self.wy,
            WX => self.wx,
            _ => unreachable!("PPU register read at {addr:#06X}"),
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            LCDC => {
                let was_on = self.lcdc.lcd_enabled;
                self.lcdc = LcdControl::from_bits(val);
                match (was_on, self.lcdc.lcd_enabled) {
                    (true, false) => self.lcd_off(),
                    (false, true) => self.lcd_on(),
                    _ => {}
                }
            }
            STAT => self.stat_sources = val & 0x78,
            SCY => self.scy = val,
            SCX => self.scx = val,
            LY => {}
            LYC => {
                self.lyc = val;
                if self.lcdc.lcd_enabled {
                    self.compare_lyc();
                }
            }
            BGP => {
                self.bgp = val;
                self.renderer.set_bgp(val);
            }
            OBP0 => {
                self.obp0 = val;
                self.renderer.set_obp(0, val);
            }
            OBP1 => {
                self.obp1 = val;
                self.renderer.set_obp(1, val);
            }
            WY => self.wy = val,
            WX => self.wx = val,
            _ => unreachable!("PPU register write at {addr:#06X}"),
        }
    }

    fn lcd_off(&mut self) {
        debug!("LCD off at line {} dot {}", self.line, self.line_dot);
        self.mode = PpuMode::HBlank;
        self.prev_mode = PpuMode::HBlank;
        self.ly = 0;
        self.line = 0;
        self.line_dot = 0;
        self.window_line = 0;
        self.wy_latch = false;
        self.window_drawn = false;
        self.stat_pending = false;
        self.bg_fifo.clear();
        self.sprite_fifo.clear();
        self.bg_fetcher.stop();
        self.sprite_fetcher.cancel();
    }

    fn lcd_on(&mut self) {
        debug!("LCD on");
        self.first_frame = true;
        self.ly = 0;
        self.line = 0;
        self.line_dot = 0;
        self.prev_mode = PpuMode::HBlank;
        // No mode 2 interrupt for the first line after enabling.
        self.mode = PpuMode::OamScan;
        self.scanner.reset();
        self.wy_latch = self.wy == 0;
        self.lyc_equal = false;
        self.compare_lyc();
    }

    fn enter_mode(&mut self, mode: PpuMode) {
        self.prev_mode = self.mode;
        self.mode = mode;
        if self.prev_mode == mode {
            return;
        }
        let sources = match mode {
            PpuMode::HBlank => STAT_HBLANK,
            PpuMode::VBlank => STAT_VBLANK | STAT_OAM,
            PpuMode::OamScan => STAT_OAM,
            PpuMode::Drawing => 0,
        };
        if self.stat_sources & sources != 0 {
            self.stat_pending = true;
        }
    }

    fn compare_lyc(&mut self) {
        let equal = self.ly == self.lyc;
        if equal && !self.lyc_equal && self.stat_sources & STAT_LYC != 0 {
            self.stat_pending = true;
        }
        self.lyc_equal = equal;
    }

    /// Advance one dot.
    pub fn tick(&mut self, ic: &mut InterruptController, sink: &mut dyn PixelSink) {
        if !self.lcdc.lcd_enabled {
            return;
        }
        self.line_dot += 1;
        match self.mode {
            PpuMode::OamScan => {
                self.scanner.tick(
                    self.line_dot - 1,
                    self.oam.as_slice(),
                    self.line,
                    self.lcdc.sprite_height(),
                );
                if self.line_dot == OAM_SCAN_DOTS {
                    self.start_drawing();
                }
            }
            PpuMode::Drawing => self.drawing_dot(sink),
            PpuMode::HBlank | PpuMode::VBlank => {}
        }

        if self.line_dot == LY_ADVANCE_DOT {
            self.ly = if self.line + 1 >= LINES_PER_FRAME {
                0
            } else {
                self.line + 1
            };
            self.compare_lyc();
        }
        if self.line_dot >= DOTS_PER_LINE {
            self.end_of_line(ic, sink);
        }

        if std::mem::take(&mut self.stat_pending) {
            ic.request(Interrupt::LcdStat);
        }
    }

    fn start_oam_scan(&mut self) {
        if self.line == self.wy {
            self.wy_latch = true;
        }
        self.scanner.reset();
        self.enter_mode(PpuMode::OamScan);
    }

    fn start_drawing(&mut self) {
        self.enter_mode(PpuMode::Drawing);
        self.drawing_dots = 0;
        self.bg_fifo.clear();
        self.sprite_fifo.clear();
        self.bg_fetcher.start_line();
        self.sprite_fetcher.cancel();
        self.renderer.start_line(self.scx);
    }

    fn drawing_dot(&mut self, sink: &mut dyn PixelSink) {
        self.drawing_dots += 1;
        let ctx = FetchContext {
            vram: self.vram.as_slice(),
            lcdc: self.lcdc,
            scx: self.scx,
            scy: self.scy,
            ly: self.line,
            window_line: self.window_line,
        };

        if self.sprite_fetcher.is_active() {
            self.sprite_fetcher.tick(&ctx, &mut self.sprite_fifo);
            if !self.sprite_fetcher.is_active() {
                self.bg_fetcher.resume();
            }
            return;
        }

        let next_sprite_x = self.scanner.peek().map(|s| s.x);
        if self.lcdc.obj_enabled
            && !self.bg_fifo.is_empty()
            && let Some(x) = next_sprite_x
            && x as u16 <= self.renderer.x() as u16 + 8
            && let Some(entry) = self.scanner.pop()
        {
            self.bg_fetcher.pause();
            self.sprite_fetcher.start(entry);
            self.sprite_fetcher.tick(&ctx, &mut self.sprite_fifo);
            return;
        }

        let window_x = (self.lcdc.window_enabled && self.wy_latch).then_some(self.wx);
        match self.renderer.tick(
            &mut self.bg_fifo,
            &mut self.sprite_fifo,
            &self.lcdc,
            window_x,
        ) {
            RenderStep::Pixel { column, shade } => {
                let shade = if self.first_frame { 0 } else { shade };
                sink.set_pixel(self.line, column, shade);
            }
            RenderStep::WindowStart => {
                self.bg_fetcher.start_window();
                self.window_drawn = true;
            }
            RenderStep::Stalled | RenderStep::Discarded => {}
        }

        if self.renderer.line_done() {
            self.bg_fetcher.stop();
            self.enter_mode(PpuMode::HBlank);
            return;
        }
        self.bg_fetcher.tick(&ctx, &mut self.bg_fifo);
    }

    fn end_of_line(&mut self, ic: &mut InterruptController, sink: &mut dyn PixelSink) {
        self.line_dot = 0;
        self.line_ended = true;
        if std::mem::take(&mut self.window_drawn) {
            self.window_line = self.window_line.wrapping_add(1);
        }
        self.line += 1;
        if self.line >= LINES_PER_FRAME {
            self.line = 0;
            self.window_line = 0;
            self.wy_latch = false;
        }

        if self.line as usize == SCREEN_HEIGHT {
            self.enter_mode(PpuMode::VBlank);
            ic.request(Interrupt::VBlank);
            sink.present_frame();
            self.frames += 1;
            self.first_frame = false;
        } else if (self.line as usize) < SCREEN_HEIGHT {
            self.start_oam_scan();
        }
    }

    /// Byte offset of the OAM row the scanner is reading, when a CPU access
    /// right now would corrupt it.
    pub fn oam_scan_row(&self) -> Option<usize> {
        if !self.lcdc.lcd_enabled || self.mode != PpuMode::OamScan {
            return None;
        }
        let row = (OamScanner::entry_at(self.line_dot) & !1) * 4;
        (8..OAM_SIZE).contains(&row).then_some(row)
    }

    /// Apply the OAM corruption bug if the scanner is mid-scan.
    pub fn oam_glitch(&mut self) {
        if let Some(row) = self.oam_scan_row() {
            corrupt_oam_row(self.oam.as_mut_slice(), row);
        }
    }
}

/// Garble the first word of `row` from the preceding row and copy the
/// four bytes after it from eight bytes earlier.
pub fn corrupt_oam_row(oam: &mut [u8], row: usize) {
    let word = |oam: &[u8], i: usize| u16::from_le_bytes([oam[i], oam[i + 1]]);
    let a = word(oam, row);
    let b = word(oam, row - 8);
    let c = word(oam, row - 4);
    let glitched = ((a ^ c) & (b ^ c)) ^ c;
    oam[row..row + 2].copy_from_slice(&glitched.to_le_bytes());
    oam.copy_within(row - 6..row - 2, row + 2);
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot for Ppu {
    fn save(&self, w: &mut StateWriter) {
        w.bytes(self.vram.as_slice());
        w.bytes(self.oam.as_slice());
        for b in [
            self.lcdc.bits(),
            self.stat_sources,
            self.scy,
            self.scx,
            self.ly,
            self.lyc,
            self.bgp,
            self.obp0,
            self.obp1,
            self.wy,
            self.wx,
            self.line,
        ] {
            w.u8(b);
        }
        w.u16(self.line_dot);
        w.u8(self.mode as u8);
        w.u8(self.prev_mode as u8);
        w.u16(self.drawing_dots);
        w.u8(self.window_line);
        for flag in [
            self.wy_latch,
            self.window_drawn,
            self.first_frame,
            self.stat_pending,
            self.lyc_equal,
            self.line_ended,
        ] {
            w.bool(flag);
        }
        w.u64(self.frames);
        self.scanner.save(w);
        self.bg_fetcher.save(w);
        self.sprite_fetcher.save(w);
        self.bg_fifo.save(w);
        self.sprite_fifo.save(w);
        self.renderer.save(w);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        r.bytes_into(self.vram.as_mut_slice(), "VRAM")?;
        r.bytes_into(self.oam.as_mut_slice(), "OAM")?;
        self.lcdc = LcdControl::from_bits(r.u8()?);
        self.stat_sources = r.u8()? & 0x78;
        self.scy = r.u8()?;
        self.scx = r.u8()?;
        self.ly = r.u8()?;
        self.lyc = r.u8()?;
        self.bgp = r.u8()?;
        self.obp0 = r.u8()?;
        self.obp1 = r.u8()?;
        self.wy = r.u8()?;
        self.wx = r.u8()?;
        self.line = r.u8()?;
        if self.line >= LINES_PER_FRAME || self.ly >= LINES_PER_FRAME {
            return Err(StateError::Mismatch("scanline"));
        }
        self.line_dot = r.u16()?;
        if self.line_dot >= DOTS_PER_LINE {
            return Err(StateError::Mismatch("line dot"));
        }
        self.mode = PpuMode::from_bits(r.u8()?);
        self.prev_mode = PpuMode::from_bits(r.u8()?);
        self.drawing_dots = r.u16()?;
        self.window_line = r.u8()?;
        self.wy_latch = r.bool()?;
        self.window_drawn = r.bool()?;
        self.first_frame = r.bool()?;
        self.stat_pending = r.bool()?;
        self.lyc_equal = r.bool()?;
        self.line_ended = r.bool()?;
        self.frames = r.u64()?;
        self.scanner.load(r)?;
        self.bg_fetcher.load(r)?;
        self.sprite_fetcher.load(r)?;
        self.bg_fifo.load(r)?;
        self.sprite_fifo.load(r)?;
        self.renderer.load(r)?;
        self.renderer.set_bgp(self.bgp);
        self.renderer.set_obp(0, self.obp0);
        self.renderer.set_obp(1, self.obp1);
        Ok(())
    }
}

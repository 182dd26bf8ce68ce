//! Boundary to the frame presentation layer.

use std::cell::RefCell;
use std::rc::Rc;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// Receives shaded colour indices (0-3) from the pixel pipeline.
pub trait PixelSink {
    fn set_pixel(&mut self, line: u8, column: u8, color: u8);
    /// Called when the PPU enters VBlank.
    fn present_frame(&mut self);
    fn clear(&mut self);
}

/// In-memory sink keeping the frame being drawn and the last presented one.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    drawing: Box<[u8; SCREEN_WIDTH * SCREEN_HEIGHT]>,
    presented: Box<[u8; SCREEN_WIDTH * SCREEN_HEIGHT]>,
    frames: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            drawing: Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT]),
            presented: Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT]),
            frames: 0,
        }
    }

    /// Last complete frame, row-major.
    pub fn frame(&self) -> &[u8] {
        &self.presented[..]
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn pixel(&self, line: usize, column: usize) -> u8 {
        self.presented[line * SCREEN_WIDTH + column]
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelSink for FrameBuffer {
    fn set_pixel(&mut self, line: u8, column: u8, color: u8) {
        let (line, column) = (line as usize, column as usize);
        if line < SCREEN_HEIGHT && column < SCREEN_WIDTH {
            self.drawing[line * SCREEN_WIDTH + column] = color & 0x03;
        }
    }

    fn present_frame(&mut self) {
        self.presented.copy_from_slice(&self.drawing[..]);
        self.frames += 1;
    }

    fn clear(&mut self) {
        self.drawing.fill(0);
        self.presented.fill(0);
    }
}

/// Lets a frontend keep a handle on the sink it gave to the console.
impl<S: PixelSink + ?Sized> PixelSink for Rc<RefCell<S>> {
    fn set_pixel(&mut self, line: u8, column: u8, color: u8) {
        self.borrow_mut().set_pixel(line, column, color);
    }

    fn present_frame(&mut self) {
        self.borrow_mut().present_frame();
    }

    fn clear(&mut self) {
        self.borrow_mut().clear();
    }
}

/// Frame buffer shared between the console and its owner.
pub type SharedFrameBuffer = Rc<RefCell<FrameBuffer>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presented_frame_lags_drawing() {
        let mut fb = FrameBuffer::new();
        fb.set_pixel(1, 2, 3);
        assert_eq!(fb.pixel(1, 2), 0);
        fb.present_frame();
        assert_eq!(fb.pixel(1, 2), 3);
        assert_eq!(fb.frames_presented(), 1);
    }

    #[test]
    fn shared_handle_sees_writes() {
        let shared: SharedFrameBuffer = Rc::new(RefCell::new(FrameBuffer::new()));
        let mut sink: Box<dyn PixelSink> = Box::new(shared.clone());
        sink.set_pixel(143, 159, 2);
        sink.set_pixel(144, 0, 1);
        sink.present_frame();
        assert_eq!(shared.borrow().pixel(143, 159), 2);
        assert_eq!(shared.borrow().frames_presented(), 1);
    }
}

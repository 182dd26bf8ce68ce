use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use dotmatrix_core::display::{SCREEN_HEIGHT, SCREEN_WIDTH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("cannot create {path}: {source}")]
    Create {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Encoding(#[from] png::EncodingError),
}

/// Expand a frame of shade indices through `palette` (0xRRGGBB).
pub fn frame_to_rgb(frame: &[u8], palette: &[u32; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len() * 3);
    for &shade in frame {
        let px = palette[(shade & 0x03) as usize];
        out.extend_from_slice(&[(px >> 16) as u8, (px >> 8) as u8, px as u8]);
    }
    out
}

pub fn encode<W: Write>(w: W, frame: &[u8], palette: &[u32; 4]) -> Result<(), ScreenshotError> {
    let rgb = frame_to_rgb(frame, palette);
    let mut encoder = png::Encoder::new(w, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&rgb)?;
    writer.finish()?;
    Ok(())
}

pub fn save_png(path: &Path, frame: &[u8], palette: &[u32; 4]) -> Result<(), ScreenshotError> {
    let file = File::create(path).map_err(|source| ScreenshotError::Create {
        path: path.display().to_string(),
        source,
    })?;
    encode(BufWriter::new(file), frame, palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DMG_PALETTE;
    use std::io::Cursor;

    #[test]
    fn shades_map_through_palette() {
        let rgb = frame_to_rgb(&[0, 3, 7], &DMG_PALETTE);
        assert_eq!(rgb, vec![0x9B, 0xBC, 0x0F, 0x0F, 0x38, 0x0F, 0x0F, 0x38, 0x0F]);
    }

    #[test]
    fn encoded_png_decodes_to_the_frame() {
        let mut frame = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        frame[SCREEN_WIDTH + 1] = 2;
        let mut bytes = Vec::new();
        encode(&mut bytes, &frame, &DMG_PALETTE).unwrap();

        let decoder = png::Decoder::new(Cursor::new(bytes));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; SCREEN_WIDTH * SCREEN_HEIGHT * 3];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (160, 144));
        let at = (SCREEN_WIDTH + 1) * 3;
        assert_eq!(&buf[at..at + 3], &[0x30, 0x62, 0x30]);
        assert_eq!(&buf[..3], &[0x9B, 0xBC, 0x0F]);
    }
}

//! Cartridge header at 0x0100-0x014F (gbdev.io/pandocs/The_Cartridge_Header.html).

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use log::warn;
use thiserror::Error;

pub const HEADER_END: usize = 0x150;

const TITLE: usize = 0x134;
const CGB_FLAG: usize = 0x143;
const NEW_LICENSEE: usize = 0x144;
const SGB_FLAG: usize = 0x146;
const CART_TYPE: usize = 0x147;
const ROM_SIZE: usize = 0x148;
const RAM_SIZE: usize = 0x149;
const DESTINATION: usize = 0x14A;
const OLD_LICENSEE: usize = 0x14B;
const VERSION: usize = 0x14C;
const HEADER_CHECKSUM: usize = 0x14D;
const GLOBAL_CHECKSUM: usize = 0x14E;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("ROM image of {len} bytes is too small to hold a header")]
    TooSmall { len: usize },
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedType(u8),
    #[error("unsupported ROM size code {0:#04X}")]
    UnsupportedRomSize(u8),
    #[error("unsupported RAM size code {0:#04X}")]
    UnsupportedRamSize(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Decoded cartridge-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartridgeKind {
    pub code: u8,
    pub controller: ControllerKind,
    pub ram: bool,
    pub battery: bool,
    pub timer: bool,
    pub rumble: bool,
    pub sensor: bool,
}

impl CartridgeKind {
    pub fn from_code(code: u8) -> Result<Self, CartridgeError> {
        use ControllerKind::*;
        // (controller, ram, battery, timer, rumble)
        let (controller, ram, battery, timer, rumble) = match code {
            0x00 => (RomOnly, false, false, false, false),
            0x01 => (Mbc1, false, false, false, false),
            0x02 => (Mbc1, true, false, false, false),
            0x03 => (Mbc1, true, true, false, false),
            0x05 => (Mbc2, true, false, false, false),
            0x06 => (Mbc2, true, true, false, false),
            0x08 => (RomOnly, true, false, false, false),
            0x09 => (RomOnly, true, true, false, false),
            0x0F => (Mbc3, false, true, true, false),
            0x10 => (Mbc3, true, true, true, false),
            0x11 => (Mbc3, false, false, false, false),
            0x12 => (Mbc3, true, false, false, false),
            0x13 => (Mbc3, true, true, false, false),
            0x19 => (Mbc5, false, false, false, false),
            0x1A => (Mbc5, true, false, false, false),
            0x1B => (Mbc5, true, true, false, false),
            0x1C => (Mbc5, false, false, false, true),
            0x1D => (Mbc5, true, false, false, true),
            0x1E => (Mbc5, true, true, false, true),
            other => return Err(CartridgeError::UnsupportedType(other)),
        };
        Ok(Self {
            code,
            controller,
            ram,
            battery,
            timer,
            rumble,
            sensor: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomSize {
    pub code: u8,
    pub bytes: usize,
    pub banks: usize,
}

impl RomSize {
    pub fn from_code(code: u8) -> Result<Self, CartridgeError> {
        let banks = match code {
            0x00..=0x08 => 2usize << code,
            0x52 => 72,
            0x53 => 80,
            0x54 => 96,
            other => return Err(CartridgeError::UnsupportedRomSize(other)),
        };
        Ok(Self {
            code,
            bytes: banks * ROM_BANK_SIZE,
            banks,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamSize {
    pub code: u8,
    pub bytes: usize,
    pub banks: usize,
}

impl RamSize {
    pub fn from_code(code: u8) -> Result<Self, CartridgeError> {
        let (bytes, banks) = match code {
            0x00 => (0, 0),
            0x01 => (0x800, 1),
            0x02 => (0x2000, 1),
            0x03 => (0x8000, 4),
            0x04 => (0x20000, 16),
            0x05 => (0x10000, 8),
            other => return Err(CartridgeError::UnsupportedRamSize(other)),
        };
        Ok(Self { code, bytes, banks })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Japanese,
    Overseas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Licensee {
    Old(u8),
    New([u8; 2]),
}

/// Stable per-game key for battery and save-state storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CartridgeId(pub u64);

impl fmt::Display for CartridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cgb_flag: u8,
    pub sgb: bool,
    pub kind: CartridgeKind,
    pub rom_size: RomSize,
    pub ram_size: RamSize,
    pub destination: Destination,
    pub licensee: Licensee,
    pub version: u8,
    pub header_checksum: u8,
    pub header_checksum_valid: bool,
    pub global_checksum: u16,
    pub global_checksum_valid: bool,
    /// Image length differs from what the ROM size code declares.
    pub size_mismatch: bool,
    id: CartridgeId,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::TooSmall { len: rom.len() });
        }

        let kind = CartridgeKind::from_code(rom[CART_TYPE])?;
        let rom_size = RomSize::from_code(rom[ROM_SIZE])?;
        let ram_size = RamSize::from_code(rom[RAM_SIZE])?;

        let destination = match rom[DESTINATION] {
            0x00 => Destination::Japanese,
            0x01 => Destination::Overseas,
            other => {
                warn!("Unknown destination code {other:#04X}; assuming overseas");
                Destination::Overseas
            }
        };

        let licensee = match rom[OLD_LICENSEE] {
            0x33 => Licensee::New([rom[NEW_LICENSEE], rom[NEW_LICENSEE + 1]]),
            code => Licensee::Old(code),
        };

        let cgb_flag = rom[CGB_FLAG];
        let title_len = if cgb_flag & 0x80 != 0 { 15 } else { 16 };
        let title = decode_title(&rom[TITLE..TITLE + title_len]);

        let header_checksum = rom[HEADER_CHECKSUM];
        let computed_header = header_checksum_of(rom);
        let global_checksum =
            u16::from_be_bytes([rom[GLOBAL_CHECKSUM], rom[GLOBAL_CHECKSUM + 1]]);
        let computed_global = global_checksum_of(rom);

        let mut header = Self {
            title,
            cgb_flag,
            sgb: rom[SGB_FLAG] == 0x03,
            kind,
            rom_size,
            ram_size,
            destination,
            licensee,
            version: rom[VERSION],
            header_checksum,
            header_checksum_valid: header_checksum == computed_header,
            global_checksum,
            global_checksum_valid: global_checksum == computed_global,
            size_mismatch: rom.len() != rom_size.bytes,
            id: CartridgeId(0),
        };
        header.id = header.compute_id();

        if !header.header_checksum_valid {
            warn!(
                "Header checksum mismatch: stored {header_checksum:#04X}, computed {computed_header:#04X}"
            );
        }
        if header.size_mismatch {
            warn!(
                "ROM image is {} bytes but the header declares {}",
                rom.len(),
                rom_size.bytes
            );
        }
        Ok(header)
    }

    pub fn id(&self) -> CartridgeId {
        self.id
    }

    fn compute_id(&self) -> CartridgeId {
        let mut hasher = FnvHasher::default();
        hasher.write(self.title.as_bytes());
        hasher.write_u8(self.kind.code);
        hasher.write_u8(self.rom_size.code);
        hasher.write_u8(self.ram_size.code);
        hasher.write_u8(self.version);
        hasher.write_u8(matches!(self.destination, Destination::Overseas) as u8);
        hasher.write_u8(self.cgb_flag);
        hasher.write_u8(self.sgb as u8);
        CartridgeId(hasher.finish())
    }
}

fn decode_title(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// `x = x - byte - 1` over 0x134..=0x14C.
pub fn header_checksum_of(rom: &[u8]) -> u8 {
    rom[TITLE..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1))
}

/// Sum of every byte except the two checksum bytes themselves.
pub fn global_checksum_of(rom: &[u8]) -> u16 {
    rom.iter()
        .enumerate()
        .filter(|(i, _)| *i != GLOBAL_CHECKSUM && *i != GLOBAL_CHECKSUM + 1)
        .fold(0u16, |sum, (_, &b)| sum.wrapping_add(b as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000 << rom_code];
        rom[TITLE..TITLE + 8].copy_from_slice(b"DOTTEST\0");
        rom[CART_TYPE] = cart_type;
        rom[ROM_SIZE] = rom_code;
        rom[RAM_SIZE] = ram_code;
        rom[DESTINATION] = 0x01;
        rom[HEADER_CHECKSUM] = header_checksum_of(&rom);
        let global = global_checksum_of(&rom);
        rom[GLOBAL_CHECKSUM..GLOBAL_CHECKSUM + 2].copy_from_slice(&global.to_be_bytes());
        rom
    }

    #[test]
    fn parses_a_valid_header() {
        let rom = rom_with(0x1B, 0x01, 0x03);
        let h = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(h.title, "DOTTEST");
        assert_eq!(h.kind.controller, ControllerKind::Mbc5);
        assert!(h.kind.ram && h.kind.battery && !h.kind.rumble);
        assert_eq!(h.rom_size.banks, 4);
        assert_eq!(h.ram_size.banks, 4);
        assert_eq!(h.destination, Destination::Overseas);
        assert!(h.header_checksum_valid);
        assert!(h.global_checksum_valid);
        assert!(!h.size_mismatch);
    }

    #[test]
    fn rejects_unknown_codes() {
        let mut rom = rom_with(0x00, 0x00, 0x00);
        rom[CART_TYPE] = 0xFC;
        assert_eq!(
            CartridgeHeader::parse(&rom),
            Err(CartridgeError::UnsupportedType(0xFC))
        );
        rom[CART_TYPE] = 0x00;
        rom[ROM_SIZE] = 0x09;
        assert_eq!(
            CartridgeHeader::parse(&rom),
            Err(CartridgeError::UnsupportedRomSize(0x09))
        );
        rom[ROM_SIZE] = 0x00;
        rom[RAM_SIZE] = 0x06;
        assert_eq!(
            CartridgeHeader::parse(&rom),
            Err(CartridgeError::UnsupportedRamSize(0x06))
        );
    }

    #[test]
    fn too_small_is_rejected() {
        assert_eq!(
            CartridgeHeader::parse(&[0u8; 0x100]),
            Err(CartridgeError::TooSmall { len: 0x100 })
        );
    }

    #[test]
    fn bad_checksums_and_size_are_flags_only() {
        let mut rom = rom_with(0x01, 0x00, 0x00);
        rom[HEADER_CHECKSUM] ^= 0xFF;
        rom.truncate(0x4000);
        let h = CartridgeHeader::parse(&rom).unwrap();
        assert!(!h.header_checksum_valid);
        assert!(!h.global_checksum_valid);
        assert!(h.size_mismatch);
    }

    #[test]
    fn unknown_destination_defaults() {
        let mut rom = rom_with(0x00, 0x00, 0x00);
        rom[DESTINATION] = 0x7F;
        let h = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(h.destination, Destination::Overseas);
    }

    #[test]
    fn identity_is_stable_and_content_derived() {
        let rom = rom_with(0x03, 0x00, 0x02);
        let a = CartridgeHeader::parse(&rom).unwrap().id();
        let b = CartridgeHeader::parse(&rom).unwrap().id();
        assert_eq!(a, b);

        let mut other = rom.clone();
        other[VERSION] = 1;
        assert_ne!(CartridgeHeader::parse(&other).unwrap().id(), a);
    }

    #[test]
    fn new_licensee_code() {
        let mut rom = rom_with(0x00, 0x00, 0x00);
        rom[OLD_LICENSEE] = 0x33;
        rom[NEW_LICENSEE] = b'0';
        rom[NEW_LICENSEE + 1] = b'1';
        let h = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(h.licensee, Licensee::New(*b"01"));
    }
}

//! Save-state encoding.
//!
//! A snapshot is a flat little-endian byte stream: a 4-byte magic, a version
//! byte, the cartridge identity, then every component's fields in a fixed
//! order. Components implement [`Snapshot`] and read back exactly what they
//! wrote.

use thiserror::Error;

pub const STATE_MAGIC: &[u8; 4] = b"DMST";
pub const STATE_VERSION: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("data is not a save state")]
    BadMagic,
    #[error("unsupported save state version {0}")]
    UnsupportedVersion(u8),
    #[error("save state ended early")]
    Truncated,
    #[error("save state does not match the loaded {0}")]
    Mismatch(&'static str),
}

pub trait Snapshot {
    fn save(&self, w: &mut StateWriter);
    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError>;
}

#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a writer with the magic/version preamble already emitted.
    pub fn with_header(identity: u64) -> Self {
        let mut w = Self::new();
        w.buf.extend_from_slice(STATE_MAGIC);
        w.u8(STATE_VERSION);
        w.u64(identity);
        w
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed byte block.
    pub fn bytes(&mut self, data: &[u8]) {
        self.u32(data.len() as u32);
        self.buf.extend_from_slice(data);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Validate the preamble and return the stored cartridge identity.
    pub fn read_header(&mut self) -> Result<u64, StateError> {
        let magic = self.take(4)?;
        if magic != STATE_MAGIC {
            return Err(StateError::BadMagic);
        }
        let version = self.u8()?;
        if version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion(version));
        }
        self.u64()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        let end = self.pos.checked_add(len).ok_or(StateError::Truncated)?;
        let out = self.data.get(self.pos..end).ok_or(StateError::Truncated)?;
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StateError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, StateError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, StateError> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, StateError> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, StateError> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn bytes(&mut self) -> Result<&'a [u8], StateError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Read a block that must exactly fill `dst`.
    pub fn bytes_into(&mut self, dst: &mut [u8], what: &'static str) -> Result<(), StateError> {
        let src = self.bytes()?;
        if src.len() != dst.len() {
            return Err(StateError::Mismatch(what));
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}

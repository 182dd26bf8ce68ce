use crate::state::{Snapshot, StateError, StateReader, StateWriter};

/// Fixed-size byte block. Addresses wrap: power-of-two sizes are masked,
/// anything else uses a modulo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMemory {
    data: Box<[u8]>,
    mask: Option<usize>,
}

impl RawMemory {
    pub fn new(size: usize) -> Self {
        Self::filled(size, 0)
    }

    pub fn filled(size: usize, value: u8) -> Self {
        Self::from_vec(vec![value; size])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        let mask = (len.is_power_of_two()).then(|| len - 1);
        Self {
            data: data.into_boxed_slice(),
            mask,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn index(&self, addr: usize) -> usize {
        match self.mask {
            Some(mask) => addr & mask,
            None => addr % self.data.len(),
        }
    }

    /// Reads from an empty block return 0xFF.
    pub fn read(&self, addr: usize) -> u8 {
        if self.data.is_empty() {
            return 0xFF;
        }
        self.data[self.index(addr)]
    }

    pub fn write(&mut self, addr: usize, val: u8) {
        if self.data.is_empty() {
            return;
        }
        let i = self.index(addr);
        self.data[i] = val;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }
}

impl Snapshot for RawMemory {
    fn save(&self, w: &mut StateWriter) {
        w.bytes(&self.data);
    }

    fn load(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        r.bytes_into(&mut self.data, "memory size")
    }
}

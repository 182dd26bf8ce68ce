//! Boundary to persistent storage of battery RAM, clocks and save states.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::cartridge::CartridgeId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("nothing saved in this slot")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveSlot {
    Battery,
    Rtc,
    State(u8),
}

impl fmt::Display for SaveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveSlot::Battery => f.write_str("battery"),
            SaveSlot::Rtc => f.write_str("rtc"),
            SaveSlot::State(n) => write!(f, "state {n}"),
        }
    }
}

/// Byte blobs keyed by cartridge identity and slot. The core never
/// interprets how they are stored.
pub trait SaveStore {
    fn save(&mut self, id: CartridgeId, slot: SaveSlot, data: &[u8]) -> Result<(), StoreError>;
    fn load(&mut self, id: CartridgeId, slot: SaveSlot) -> Result<Vec<u8>, StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<(CartridgeId, SaveSlot), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SaveStore for MemoryStore {
    fn save(&mut self, id: CartridgeId, slot: SaveSlot, data: &[u8]) -> Result<(), StoreError> {
        self.entries.insert((id, slot), data.to_vec());
        Ok(())
    }

    fn load(&mut self, id: CartridgeId, slot: SaveSlot) -> Result<Vec<u8>, StoreError> {
        self.entries
            .get(&(id, slot))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_keyed_by_cartridge() {
        let mut store = MemoryStore::new();
        let a = CartridgeId(1);
        let b = CartridgeId(2);
        store.save(a, SaveSlot::Battery, &[1, 2, 3]).unwrap();
        store.save(a, SaveSlot::State(0), &[9]).unwrap();
        assert_eq!(store.load(a, SaveSlot::Battery).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.load(b, SaveSlot::Battery),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.load(a, SaveSlot::State(1)),
            Err(StoreError::NotFound)
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn slot_names() {
        assert_eq!(SaveSlot::State(3).to_string(), "state 3");
        assert_eq!(SaveSlot::Rtc.to_string(), "rtc");
    }
}

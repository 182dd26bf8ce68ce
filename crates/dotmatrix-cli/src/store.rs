use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use dotmatrix_core::cartridge::CartridgeId;
use dotmatrix_core::persist::{SaveSlot, SaveStore, StoreError};
use log::debug;

/// Save files in one directory, named after the cartridge identity:
/// `<id>.sav`, `<id>.rtc` and `<id>.st<N>`.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: CartridgeId, slot: SaveSlot) -> PathBuf {
        let ext = match slot {
            SaveSlot::Battery => "sav".to_string(),
            SaveSlot::Rtc => "rtc".to_string(),
            SaveSlot::State(n) => format!("st{n}"),
        };
        self.dir.join(format!("{id}.{ext}"))
    }
}

impl SaveStore for DirStore {
    fn save(&mut self, id: CartridgeId, slot: SaveSlot, data: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(id, slot);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn load(&mut self, id: CartridgeId, slot: SaveSlot) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(id, slot);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

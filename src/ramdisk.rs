use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::block::{BlockDevice, BlockDeviceError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RamDiskError {
    OutOfRange,
    BadBuffer,
    Injected,
}

impl BlockDeviceError for RamDiskError {
    fn as_str(&self) -> &'static str {
        match self {
            RamDiskError::OutOfRange => "Sector out of range.",
            RamDiskError::BadBuffer => "Buffer is not one sector.",
            RamDiskError::Injected => "Injected fault.",
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Faults {
    read_at: Option<u64>,
    write_at: Option<u64>,
    writes_left: Option<usize>,
}

/// Volume image held in memory. Faults can be armed to exercise error
/// paths.
pub struct RamDisk {
    sector_size: usize,
    data: Mutex<Vec<u8>>,
    faults: Mutex<Faults>,
}

impl RamDisk {
    pub fn new(sector_size: usize, sectors: u64) -> Self {
        Self::from_image(sector_size, vec![0u8; sector_size * sectors as usize])
    }

    /// Wraps an existing image. A trailing partial sector is ignored.
    pub fn from_image(sector_size: usize, image: Vec<u8>) -> Self {
        Self {
            sector_size,
            data: Mutex::new(image),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn into_image(self) -> Vec<u8> {
        self.data.into_inner()
    }

    pub fn fail_reads_at(&self, sector: Option<u64>) {
        self.faults.lock().read_at = sector;
    }

    pub fn fail_writes_at(&self, sector: Option<u64>) {
        self.faults.lock().write_at = sector;
    }

    /// Lets `count` more writes through, then fails every write.
    pub fn fail_writes_after(&self, count: Option<usize>) {
        self.faults.lock().writes_left = count;
    }

    fn range(&self, sector: u64, len: usize) -> Result<core::ops::Range<usize>, RamDiskError> {
        if len != self.sector_size {
            return Err(RamDiskError::BadBuffer);
        }
        if sector >= self.sector_count() {
            return Err(RamDiskError::OutOfRange);
        }
        let start = sector as usize * self.sector_size;
        Ok(start..start + self.sector_size)
    }
}

impl BlockDevice for RamDisk {
    type Error = RamDiskError;

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        (self.data.lock().len() / self.sector_size) as u64
    }

    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        if self.faults.lock().read_at == Some(sector) {
            return Err(RamDiskError::Injected);
        }
        let range = self.range(sector, buf.len())?;
        buf.copy_from_slice(&self.data.lock()[range]);
        Ok(())
    }

    fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<(), Self::Error> {
        {
            let mut faults = self.faults.lock();
            if faults.write_at == Some(sector) {
                return Err(RamDiskError::Injected);
            }
            if let Some(left) = faults.writes_left.as_mut() {
                if *left == 0 {
                    return Err(RamDiskError::Injected);
                }
                *left -= 1;
            }
        }
        let range = self.range(sector, buf.len())?;
        self.data.lock()[range].copy_from_slice(buf);
        Ok(())
    }
}

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use spin::Mutex;

use crate::block::{BlockDevice, BlockDeviceError};

#[derive(Debug)]
pub enum ImageError {
    OutOfRange,
    BadBuffer,
    Io(io::Error),
}

impl BlockDeviceError for ImageError {
    fn as_str(&self) -> &'static str {
        match self {
            ImageError::OutOfRange => "Sector out of range.",
            ImageError::BadBuffer => "Buffer is not one sector.",
            ImageError::Io(_) => "Image file I/O failed.",
        }
    }
}

impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> Self {
        ImageError::Io(err)
    }
}

/// Volume image stored in a regular file.
pub struct ImageFile {
    file: Mutex<File>,
    sector_size: usize,
    sectors: u64,
}

impl ImageFile {
    pub fn open<P: AsRef<Path>>(path: P, sector_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let sectors = file.metadata()?.len() / sector_size as u64;
        Ok(Self { file: Mutex::new(file), sector_size, sectors })
    }

    /// Creates (or truncates) an image of `sectors` zeroed sectors.
    pub fn create<P: AsRef<Path>>(path: P, sector_size: usize, sectors: u64) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        file.set_len(sectors * sector_size as u64)?;
        Ok(Self { file: Mutex::new(file), sector_size, sectors })
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.lock().sync_all()
    }

    fn check(&self, sector: u64, len: usize) -> Result<u64, ImageError> {
        if len != self.sector_size {
            return Err(ImageError::BadBuffer);
        }
        if sector >= self.sectors {
            return Err(ImageError::OutOfRange);
        }
        Ok(sector * self.sector_size as u64)
    }
}

impl BlockDevice for ImageFile {
    type Error = ImageError;

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sectors
    }

    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        let pos = self.check(sector, buf.len())?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<(), Self::Error> {
        let pos = self.check(sector, buf.len())?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)?;
        Ok(())
    }
}

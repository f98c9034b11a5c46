use crate::error::{FsError, FsResult};

pub trait BlockDeviceError {
    fn as_str(&self) -> &'static str;
}

/// Sector-addressed backing store. Writes go through `&self`; implementations
/// carry their own interior mutability.
pub trait BlockDevice {
    type Error: BlockDeviceError;

    fn sector_size(&self) -> usize;
    fn sector_count(&self) -> u64;
    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<(), Self::Error>;
    fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<(), Self::Error>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    type Error = D::Error;

    fn sector_size(&self) -> usize {
        (**self).sector_size()
    }

    fn sector_count(&self) -> u64 {
        (**self).sector_count()
    }

    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read_sector(sector, buf)
    }

    fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<(), Self::Error> {
        (**self).write_sector(sector, buf)
    }
}

pub(crate) fn read_sector<D: BlockDevice + ?Sized>(dev: &D, sector: u64, buf: &mut [u8]) -> FsResult<()> {
    dev.read_sector(sector, buf).map_err(|err| {
        log::error!("read of sector {} failed: {}", sector, err.as_str());
        FsError::Io
    })
}

pub(crate) fn write_sector<D: BlockDevice + ?Sized>(dev: &D, sector: u64, buf: &[u8]) -> FsResult<()> {
    dev.write_sector(sector, buf).map_err(|err| {
        log::error!("write of sector {} failed: {}", sector, err.as_str());
        FsError::Io
    })
}

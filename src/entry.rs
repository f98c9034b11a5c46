use crate::block::{self, BlockDevice};
use crate::dir::{DirEntry, DirEntrySlot};
use crate::error::{FsError, FsResult};
use crate::name::{NAME_DELETED, SHORT_NAME_LEN};
use crate::time::{self, Timestamp};
use crate::volume::{VolumeMeta, DIR_ENTRY_SIZE, MAX_SECTOR_SIZE};

/// In-place updates of single directory entries. Every write rereads the
/// containing sector so neighbouring entries survive.
pub struct EntryWriter<'a, D: BlockDevice + ?Sized> {
    dev: &'a D,
    meta: &'a VolumeMeta,
}

impl<'a, D: BlockDevice + ?Sized> EntryWriter<'a, D> {
    pub fn new(dev: &'a D, meta: &'a VolumeMeta) -> Self {
        Self { dev, meta }
    }

    pub fn write(&self, slot: &DirEntrySlot) -> FsResult<()> {
        let ss = self.meta.sector_size;
        if slot.offset + DIR_ENTRY_SIZE > ss {
            return Err(FsError::Inconsistent);
        }
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        block::read_sector(self.dev, slot.sector, &mut buf[..ss])?;
        slot.entry.encode(&mut buf[slot.offset..slot.offset + DIR_ENTRY_SIZE]);
        block::write_sector(self.dev, slot.sector, &buf[..ss])
    }

    pub fn create(
        &self,
        slot: &mut DirEntrySlot,
        short_name: &[u8; SHORT_NAME_LEN],
        attr: u8,
        first_cluster: u16,
        size: u32,
    ) -> FsResult<()> {
        let (date, tm, tenths) = time::encode(time::now());
        let mut entry = DirEntry {
            name: *short_name,
            attr,
            create_tenths: tenths,
            create_time: tm,
            create_date: date,
            access_date: date,
            write_time: tm,
            write_date: date,
            size,
            ..DirEntry::default()
        };
        entry.set_first_cluster(first_cluster);
        slot.entry = entry;
        self.write(slot)
    }

    /// Marks the entry deleted. The caller frees its clusters first.
    pub fn delete(&self, slot: &mut DirEntrySlot) -> FsResult<()> {
        slot.entry.name[0] = NAME_DELETED;
        self.write(slot)
    }

    pub fn set_times(&self, slot: &mut DirEntrySlot, atime: Timestamp, mtime: Timestamp) -> FsResult<()> {
        let (adate, _, _) = time::encode(atime);
        let (mdate, mtm, _) = time::encode(mtime);
        slot.entry.access_date = adate;
        slot.entry.write_date = mdate;
        slot.entry.write_time = mtm;
        self.write(slot)
    }
}

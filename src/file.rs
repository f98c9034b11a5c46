use alloc::vec::Vec;
use core::cmp;

use crate::allocator::ClusterAllocator;
use crate::block::{self, BlockDevice};
use crate::dir::{DirEntry, DirEntrySlot, DirResolver};
use crate::entry::EntryWriter;
use crate::error::{FsError, FsResult};
use crate::fat::{FatTable, CLUSTER_END};
use crate::time;
use crate::volume::{VolumeMeta, MAX_SECTOR_SIZE};

const ZERO: [u8; MAX_SECTOR_SIZE] = [0u8; MAX_SECTOR_SIZE];

/// Offset-addressed file content access.
pub struct FileIo<'a, D: BlockDevice + ?Sized> {
    dev: &'a D,
    meta: &'a VolumeMeta,
}

impl<'a, D: BlockDevice + ?Sized> FileIo<'a, D> {
    pub fn new(dev: &'a D, meta: &'a VolumeMeta) -> Self {
        Self { dev, meta }
    }

    fn fat(&self) -> FatTable<'a, D> {
        FatTable::new(self.dev, self.meta)
    }

    fn open(&self, path: &str) -> FsResult<DirEntrySlot> {
        let slot = DirResolver::new(self.dev, self.meta).find_entry(path)?;
        if slot.entry.is_dir() {
            return Err(FsError::IsADirectory);
        }
        Ok(slot)
    }

    fn clusters_for(&self, bytes: u64) -> usize {
        bytes.div_ceil(self.meta.cluster_size as u64) as usize
    }

    /// Whole chain of a file, checked against the recorded size.
    fn load_chain(&self, entry: &DirEntry) -> FsResult<Vec<u16>> {
        let chain = self.fat().chain(entry.first_cluster())?;
        if chain.len() < self.clusters_for(entry.size as u64) {
            log::warn!(
                "{} holds {} bytes in {} clusters",
                entry.display_name(),
                entry.size,
                chain.len()
            );
            return Err(FsError::Inconsistent);
        }
        Ok(chain)
    }

    pub fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let slot = self.open(path)?;
        self.read_entry(&slot.entry, offset, buf)
    }

    pub fn read_entry(&self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let size = entry.size as u64;
        if offset > size {
            return Err(FsError::InvalidArgument);
        }
        let len = cmp::min(buf.len() as u64, size - offset) as usize;
        if len == 0 {
            return Ok(0);
        }

        let fat = self.fat();
        let ss = self.meta.sector_size;
        let cs = self.meta.cluster_size;

        let mut cluster = entry.first_cluster();
        for _ in 0..offset / cs as u64 {
            cluster = fat.next(cluster)?.ok_or(FsError::Inconsistent)?;
        }

        let mut sector_buf = [0u8; MAX_SECTOR_SIZE];
        let mut in_cluster = (offset % cs as u64) as usize;
        let mut done = 0usize;
        loop {
            let first = self.meta.sector_of(cluster)?;
            while in_cluster < cs && done < len {
                let sector = first + (in_cluster / ss) as u64;
                let off = in_cluster % ss;
                let n = cmp::min(ss - off, len - done);
                block::read_sector(self.dev, sector, &mut sector_buf[..ss])?;
                buf[done..done + n].copy_from_slice(&sector_buf[off..off + n]);
                done += n;
                in_cluster += n;
            }
            if done == len {
                break;
            }
            cluster = fat.next(cluster)?.ok_or_else(|| {
                log::warn!("chain of {} ends after {} of {} bytes", entry.display_name(), done, len);
                FsError::Inconsistent
            })?;
            in_cluster = 0;
        }
        Ok(done)
    }

    /// Copies `data` into the clusters of `chain` starting at byte `pos`.
    /// Partially covered sectors are read first.
    fn write_span(&self, chain: &[u16], mut pos: u64, data: &[u8]) -> FsResult<()> {
        let ss = self.meta.sector_size;
        let cs = self.meta.cluster_size as u64;
        let mut sector_buf = [0u8; MAX_SECTOR_SIZE];
        let mut done = 0usize;

        while done < data.len() {
            let cluster = *chain.get((pos / cs) as usize).ok_or(FsError::Inconsistent)?;
            let in_cluster = (pos % cs) as usize;
            let sector = self.meta.sector_of(cluster)? + (in_cluster / ss) as u64;
            let off = in_cluster % ss;
            let n = cmp::min(ss - off, data.len() - done);
            if off != 0 || n < ss {
                block::read_sector(self.dev, sector, &mut sector_buf[..ss])?;
            }
            sector_buf[off..off + n].copy_from_slice(&data[done..done + n]);
            block::write_sector(self.dev, sector, &sector_buf[..ss])?;
            done += n;
            pos += n as u64;
        }
        Ok(())
    }

    fn zero_span(&self, chain: &[u16], mut pos: u64, end: u64) -> FsResult<()> {
        while pos < end {
            let n = cmp::min(end - pos, MAX_SECTOR_SIZE as u64) as usize;
            self.write_span(chain, pos, &ZERO[..n])?;
            pos += n as u64;
        }
        Ok(())
    }

    /// Appends `count` fresh clusters to `chain`, linking them from the
    /// current tail or from the entry itself when the file had none.
    fn extend_chain(&self, entry: &mut DirEntry, chain: &mut Vec<u16>, count: usize) -> FsResult<()> {
        let head = ClusterAllocator::new(self.dev, self.meta).allocate_n(count)?;
        let fat = self.fat();
        match chain.last() {
            Some(&tail) => fat.write_entry(tail, head)?,
            None => entry.set_first_cluster(head),
        }
        chain.extend(fat.chain(head)?);
        Ok(())
    }

    fn stamp_modified(entry: &mut DirEntry) {
        let (date, tm, _) = time::encode(time::now());
        entry.write_date = date;
        entry.write_time = tm;
    }

    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let mut slot = self.open(path)?;
        let size = slot.entry.size as u64;
        if offset > size {
            return Err(FsError::InvalidArgument);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset + data.len() as u64;
        if end > u32::MAX as u64 {
            return Err(FsError::InvalidArgument);
        }

        let first_before = slot.entry.first_cluster();
        let mut chain = self.load_chain(&slot.entry)?;
        let need = self.clusters_for(end);
        if chain.len() < need {
            let missing = need - chain.len();
            self.extend_chain(&mut slot.entry, &mut chain, missing)?;
        }

        self.write_span(&chain, offset, data)?;

        if end > size || slot.entry.first_cluster() != first_before {
            slot.entry.size = cmp::max(size, end) as u32;
            Self::stamp_modified(&mut slot.entry);
            EntryWriter::new(self.dev, self.meta).write(&slot)?;
        }
        log::debug!("wrote {} bytes at {} to {}", data.len(), offset, path);
        Ok(data.len())
    }

    pub fn truncate(&self, path: &str, new_size: u64) -> FsResult<()> {
        let mut slot = self.open(path)?;
        if new_size > u32::MAX as u64 {
            return Err(FsError::InvalidArgument);
        }
        let old_size = slot.entry.size as u64;
        if new_size == old_size {
            return Ok(());
        }

        let fat = self.fat();
        let mut chain = self.load_chain(&slot.entry)?;
        let need = self.clusters_for(new_size);

        if new_size > old_size {
            // stale bytes past the old end must read back as zeros
            let covered = chain.len() as u64 * self.meta.cluster_size as u64;
            self.zero_span(&chain, old_size, cmp::min(new_size, covered))?;
            if chain.len() < need {
                let missing = need - chain.len();
                self.extend_chain(&mut slot.entry, &mut chain, missing)?;
            }
        } else if need == 0 {
            fat.free_chain(slot.entry.first_cluster())?;
            slot.entry.set_first_cluster(0);
        } else if chain.len() > need {
            fat.write_entry(chain[need - 1], CLUSTER_END)?;
            fat.free_chain(chain[need])?;
        }

        slot.entry.size = new_size as u32;
        Self::stamp_modified(&mut slot.entry);
        EntryWriter::new(self.dev, self.meta).write(&slot)?;
        log::debug!("truncated {} from {} to {}", path, old_size, new_size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::ATTR_ARCHIVE;
    use crate::fat::CLUSTER_FREE;
    use crate::format::{format, FormatParams};
    use crate::ramdisk::RamDisk;
    use crate::time::Timestamp;
    use crate::volume::MountOptions;
    use alloc::vec;

    fn setup() -> (RamDisk, VolumeMeta) {
        let disk = RamDisk::new(512, 4096);
        let params = FormatParams { sectors_per_cluster: Some(2), allow_small: true, ..FormatParams::default() };
        let bs = format(&disk, &params).unwrap();
        let meta = VolumeMeta::from_boot_sector(&bs, &MountOptions::default(), Timestamp::default()).unwrap();
        (disk, meta)
    }

    fn touch(disk: &RamDisk, meta: &VolumeMeta, short: &[u8; 11]) {
        let dirs = DirResolver::new(disk, meta);
        let mut slot = match dirs.find_in_dir(0, "NOSUCH.BIN").unwrap() {
            crate::dir::FindResult::Empty(slot) => slot,
            other => panic!("unexpected {:?}", other),
        };
        EntryWriter::new(disk, meta).create(&mut slot, short, ATTR_ARCHIVE, 0, 0).unwrap();
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn write_spans_sectors_and_clusters() {
        let (disk, meta) = setup();
        touch(&disk, &meta, b"DATA    BIN");
        let io = FileIo::new(&disk, &meta);

        let data = pattern(5000);
        assert_eq!(io.write("/DATA.BIN", &data, 0).unwrap(), 5000);

        let slot = DirResolver::new(&disk, &meta).find_entry("/DATA.BIN").unwrap();
        assert_eq!(slot.entry.size, 5000);
        let chain = FatTable::new(&disk, &meta).chain(slot.entry.first_cluster()).unwrap();
        assert_eq!(chain.len(), 5);

        let mut back = vec![0u8; 6000];
        assert_eq!(io.read("/DATA.BIN", 0, &mut back).unwrap(), 5000);
        assert_eq!(&back[..5000], &data[..]);

        let mut mid = vec![0u8; 700];
        assert_eq!(io.read("/DATA.BIN", 1000, &mut mid).unwrap(), 700);
        assert_eq!(&mid[..], &data[1000..1700]);
    }

    #[test]
    fn overwrite_in_place_keeps_neighbours() {
        let (disk, meta) = setup();
        touch(&disk, &meta, b"DATA    BIN");
        let io = FileIo::new(&disk, &meta);
        io.write("/DATA.BIN", &pattern(3000), 0).unwrap();
        io.write("/DATA.BIN", b"hello", 1022).unwrap();

        let mut back = vec![0u8; 3000];
        io.read("/DATA.BIN", 0, &mut back).unwrap();
        let mut expect = pattern(3000);
        expect[1022..1027].copy_from_slice(b"hello");
        assert_eq!(back, expect);
        assert_eq!(DirResolver::new(&disk, &meta).find_entry("/DATA.BIN").unwrap().entry.size, 3000);
    }

    #[test]
    fn append_at_cluster_boundary_links_new_cluster() {
        let (disk, meta) = setup();
        touch(&disk, &meta, b"DATA    BIN");
        let io = FileIo::new(&disk, &meta);
        let cs = meta.cluster_size;
        io.write("/DATA.BIN", &pattern(cs), 0).unwrap();
        io.write("/DATA.BIN", &pattern(10), cs as u64).unwrap();

        let slot = DirResolver::new(&disk, &meta).find_entry("/DATA.BIN").unwrap();
        assert_eq!(slot.entry.size as usize, cs + 10);
        let chain = FatTable::new(&disk, &meta).chain(slot.entry.first_cluster()).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn offsets_past_size_are_rejected() {
        let (disk, meta) = setup();
        touch(&disk, &meta, b"DATA    BIN");
        let io = FileIo::new(&disk, &meta);
        io.write("/DATA.BIN", b"abc", 0).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(io.read("/DATA.BIN", 4, &mut buf), Err(FsError::InvalidArgument));
        assert_eq!(io.write("/DATA.BIN", b"x", 4), Err(FsError::InvalidArgument));
        assert_eq!(io.read("/DATA.BIN", 3, &mut buf), Ok(0));
        assert_eq!(io.write("/DATA.BIN", b"", 0), Ok(0));
    }

    #[test]
    fn truncate_grow_reads_zeros_then_shrink_frees() {
        let (disk, meta) = setup();
        touch(&disk, &meta, b"DATA    BIN");
        let io = FileIo::new(&disk, &meta);
        let fat = FatTable::new(&disk, &meta);

        io.write("/DATA.BIN", &[0xAB; 1500], 0).unwrap();
        io.truncate("/DATA.BIN", 100).unwrap();
        io.truncate("/DATA.BIN", 3000).unwrap();

        let mut back = vec![0xFFu8; 3000];
        assert_eq!(io.read("/DATA.BIN", 0, &mut back).unwrap(), 3000);
        assert!(back[..100].iter().all(|&b| b == 0xAB));
        assert!(back[100..].iter().all(|&b| b == 0));

        let first = DirResolver::new(&disk, &meta).find_entry("/DATA.BIN").unwrap().entry.first_cluster();
        let chain = fat.chain(first).unwrap();
        assert_eq!(chain.len(), 3);

        io.truncate("/DATA.BIN", 1024).unwrap();
        assert_eq!(fat.chain(first).unwrap(), &chain[..1]);
        assert_eq!(fat.read_entry(chain[1]), CLUSTER_FREE);
        assert_eq!(fat.read_entry(chain[2]), CLUSTER_FREE);

        io.truncate("/DATA.BIN", 0).unwrap();
        let slot = DirResolver::new(&disk, &meta).find_entry("/DATA.BIN").unwrap();
        assert_eq!(slot.entry.first_cluster(), 0);
        assert_eq!(slot.entry.size, 0);
        assert_eq!(fat.read_entry(chain[0]), CLUSTER_FREE);
    }

    #[test]
    fn short_chain_is_inconsistent() {
        let (disk, meta) = setup();
        touch(&disk, &meta, b"DATA    BIN");
        let io = FileIo::new(&disk, &meta);
        io.write("/DATA.BIN", &pattern(100), 0).unwrap();

        let mut slot = DirResolver::new(&disk, &meta).find_entry("/DATA.BIN").unwrap();
        slot.entry.size = 5000;
        EntryWriter::new(&disk, &meta).write(&slot).unwrap();

        let mut buf = vec![0u8; 5000];
        assert_eq!(io.read("/DATA.BIN", 0, &mut buf), Err(FsError::Inconsistent));
        assert_eq!(io.write("/DATA.BIN", b"x", 0), Err(FsError::Inconsistent));
    }
}

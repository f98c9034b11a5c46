use alloc::vec::Vec;

use crate::block::{self, BlockDevice, BlockDeviceError};
use crate::error::{FsError, FsResult};
use crate::volume::{VolumeMeta, MAX_SECTOR_SIZE};

pub const CLUSTER_FREE: u16 = 0x0000;
pub const CLUSTER_MIN: u16 = 0x0002;
pub const CLUSTER_MAX: u16 = 0xFFEF;
pub const CLUSTER_END_BOUND: u16 = 0xFFF8;
pub const CLUSTER_END: u16 = 0xFFFF;

const FAT_ENTRY_SIZE: usize = 2;

/// A value that links to another cluster rather than marking free,
/// reserved, bad or end of chain.
pub fn is_cluster_inuse(value: u16) -> bool {
    (CLUSTER_MIN..=CLUSTER_MAX).contains(&value)
}

pub fn is_end_of_chain(value: u16) -> bool {
    value >= CLUSTER_END_BOUND
}

/// View of the file allocation table. Reads come from the first copy,
/// writes go to every copy.
pub struct FatTable<'a, D: BlockDevice + ?Sized> {
    dev: &'a D,
    meta: &'a VolumeMeta,
}

impl<'a, D: BlockDevice + ?Sized> FatTable<'a, D> {
    pub fn new(dev: &'a D, meta: &'a VolumeMeta) -> Self {
        Self { dev, meta }
    }

    fn locate(&self, cluster: u16) -> Option<(u64, usize)> {
        let byte = cluster as usize * FAT_ENTRY_SIZE;
        let sector_idx = (byte / self.meta.sector_size) as u64;
        if sector_idx >= self.meta.sectors_per_fat as u64 {
            return None;
        }
        Some((sector_idx, byte % self.meta.sector_size))
    }

    /// Value stored for `cluster`. An unreadable FAT sector reads as end
    /// of chain so callers stop walking instead of following garbage.
    pub fn read_entry(&self, cluster: u16) -> u16 {
        let Some((sector_idx, offset)) = self.locate(cluster) else {
            log::warn!("FAT entry {} beyond table", cluster);
            return CLUSTER_END;
        };
        let ss = self.meta.sector_size;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        if let Err(err) = self.dev.read_sector(self.meta.fat_start + sector_idx, &mut buf[..ss]) {
            log::warn!("FAT entry {} unreadable ({}), treating as end of chain", cluster, err.as_str());
            return CLUSTER_END;
        }
        u16::from_le_bytes([buf[offset], buf[offset + 1]])
    }

    /// Stores `value` for `cluster` in each FAT copy in turn. The first
    /// failing copy aborts the update; earlier copies keep the new value.
    pub fn write_entry(&self, cluster: u16, value: u16) -> FsResult<()> {
        let Some((sector_idx, offset)) = self.locate(cluster) else {
            log::error!("FAT entry {} beyond table", cluster);
            return Err(FsError::Inconsistent);
        };
        log::trace!("fat[{}] <- {:#06x}", cluster, value);

        let ss = self.meta.sector_size;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        for copy in 0..self.meta.num_fats as u64 {
            let sector = self.meta.fat_start + copy * self.meta.sectors_per_fat as u64 + sector_idx;
            block::read_sector(self.dev, sector, &mut buf[..ss])?;
            buf[offset..offset + FAT_ENTRY_SIZE].copy_from_slice(&value.to_le_bytes());
            block::write_sector(self.dev, sector, &buf[..ss])?;
        }
        Ok(())
    }

    /// Successor of `cluster` if the chain continues.
    pub fn next(&self, cluster: u16) -> FsResult<Option<u16>> {
        let value = self.read_entry(cluster);
        if !is_cluster_inuse(value) {
            return Ok(None);
        }
        if !self.meta.is_valid_cluster(value) {
            log::warn!("cluster {} links to {} outside the data area", cluster, value);
            return Err(FsError::Inconsistent);
        }
        Ok(Some(value))
    }

    /// Every cluster of the chain starting at `start`, in order.
    pub fn chain(&self, start: u16) -> FsResult<Vec<u16>> {
        let mut clusters = Vec::new();
        if !is_cluster_inuse(start) {
            return Ok(clusters);
        }
        if !self.meta.is_valid_cluster(start) {
            return Err(FsError::Inconsistent);
        }

        let mut current = Some(start);
        while let Some(cluster) = current {
            if clusters.len() >= self.meta.cluster_end as usize {
                log::warn!("cluster chain from {} loops", start);
                return Err(FsError::Inconsistent);
            }
            clusters.push(cluster);
            current = self.next(cluster)?;
        }
        Ok(clusters)
    }

    /// Releases every cluster reachable from `start`. The successor is
    /// read before its predecessor is cleared.
    pub fn free_chain(&self, start: u16) -> FsResult<()> {
        let mut current = start;
        let mut freed = 0usize;
        while is_cluster_inuse(current) && self.meta.is_valid_cluster(current) {
            if freed >= self.meta.cluster_end as usize {
                log::warn!("cluster chain from {} loops", start);
                return Err(FsError::Inconsistent);
            }
            let next = self.read_entry(current);
            self.write_entry(current, CLUSTER_FREE)?;
            freed += 1;
            current = next;
        }
        log::trace!("freed {} clusters from {}", freed, start);
        Ok(())
    }

    /// Free clusters in ascending order, at most `limit` of them. Each FAT
    /// sector is read once; unreadable sectors count as fully used.
    pub fn scan_free(&self, limit: usize) -> Vec<u16> {
        let mut found = Vec::new();
        let ss = self.meta.sector_size;
        let per_sector = ss / FAT_ENTRY_SIZE;
        let end = self.meta.cluster_end as usize;
        let mut buf = [0u8; MAX_SECTOR_SIZE];

        let mut cluster = CLUSTER_MIN as usize;
        while cluster < end && found.len() < limit {
            let sector_idx = cluster / per_sector;
            let sector_last = ((sector_idx + 1) * per_sector).min(end);
            if let Err(err) = self.dev.read_sector(self.meta.fat_start + sector_idx as u64, &mut buf[..ss]) {
                log::warn!("FAT sector {} unreadable ({}), skipping", sector_idx, err.as_str());
                cluster = sector_last;
                continue;
            }
            while cluster < sector_last && found.len() < limit {
                let offset = (cluster % per_sector) * FAT_ENTRY_SIZE;
                if u16::from_le_bytes([buf[offset], buf[offset + 1]]) == CLUSTER_FREE {
                    found.push(cluster as u16);
                }
                cluster += 1;
            }
        }
        found
    }

    pub fn count_free(&self) -> u32 {
        self.scan_free(usize::MAX).len() as u32
    }
}

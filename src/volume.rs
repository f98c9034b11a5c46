use crate::bpb::BootSector;
use crate::error::{FsError, FsResult};
use crate::fat::{CLUSTER_MAX, CLUSTER_MIN};
use crate::time::Timestamp;

/// Unit used for the `blocks` attribute and the minimum logical sector.
pub const PHYSICAL_SECTOR_SIZE: usize = 512;
/// Upper bound for stack sector buffers.
pub const MAX_SECTOR_SIZE: usize = 4096;
pub const DIR_ENTRY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MountOptions {
    pub uid: u32,
    pub gid: u32,
}

/// Geometry derived from the boot sector at mount. Nothing here changes
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeMeta {
    pub sector_size: usize,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub root_entries: u32,
    pub total_sectors: u32,
    pub sectors_per_fat: u32,
    pub fat_start: u64,
    pub root_start: u64,
    pub root_sectors: u32,
    pub data_start: u64,
    pub cluster_count: u32,
    pub cluster_size: usize,
    /// Exclusive upper bound of addressable cluster numbers.
    pub cluster_end: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

impl VolumeMeta {
    pub fn from_boot_sector(bs: &BootSector, opts: &MountOptions, now: Timestamp) -> FsResult<Self> {
        bs.validate()?;

        let sector_size = bs.bytes_per_sector as usize;
        let sectors_per_cluster = bs.sectors_per_cluster as u32;
        let reserved_sectors = bs.reserved_sectors as u32;
        let num_fats = bs.num_fats as u32;
        let root_entries = bs.root_entries as u32;
        let total_sectors = bs.total_sectors();
        let sectors_per_fat = bs.sectors_per_fat as u32;

        let fat_start = reserved_sectors as u64;
        let root_start = fat_start + num_fats as u64 * sectors_per_fat as u64;
        let root_sectors = (root_entries * DIR_ENTRY_SIZE as u32).div_ceil(sector_size as u32);
        let data_start = root_start + root_sectors as u64;
        if data_start >= total_sectors as u64 {
            log::warn!("data area starts at {} past the end of a {} sector volume", data_start, total_sectors);
            return Err(FsError::InvalidBootSector);
        }

        let cluster_count = ((total_sectors as u64 - data_start) / sectors_per_cluster as u64) as u32;
        let fat_capacity = sectors_per_fat as u64 * sector_size as u64 / 2;
        let cluster_end = (cluster_count as u64 + CLUSTER_MIN as u64)
            .min(CLUSTER_MAX as u64 + 1)
            .min(fat_capacity) as u32;
        if cluster_end <= CLUSTER_MIN as u32 {
            return Err(FsError::InvalidBootSector);
        }

        Ok(Self {
            sector_size,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entries,
            total_sectors,
            sectors_per_fat,
            fat_start,
            root_start,
            root_sectors,
            data_start,
            cluster_count,
            cluster_size: sectors_per_cluster as usize * sector_size,
            cluster_end,
            uid: opts.uid,
            gid: opts.gid,
            atime: now,
            mtime: now,
            ctime: now,
        })
    }

    pub fn is_valid_cluster(&self, cluster: u16) -> bool {
        cluster >= CLUSTER_MIN && (cluster as u32) < self.cluster_end
    }

    /// First sector of `cluster`. The cluster must be in range.
    pub fn cluster_to_sector(&self, cluster: u16) -> u64 {
        debug_assert!(self.is_valid_cluster(cluster), "cluster {} out of range", cluster);
        (cluster as u64 - CLUSTER_MIN as u64) * self.sectors_per_cluster as u64 + self.data_start
    }

    pub fn sector_of(&self, cluster: u16) -> FsResult<u64> {
        if !self.is_valid_cluster(cluster) {
            log::warn!("cluster {} outside 2..{}", cluster, self.cluster_end);
            return Err(FsError::Inconsistent);
        }
        Ok(self.cluster_to_sector(cluster))
    }

    /// Cluster holding `sector`, or 0 for sectors ahead of the data area.
    pub fn sector_to_cluster(&self, sector: u64) -> u16 {
        if sector < self.data_start {
            return 0;
        }
        (CLUSTER_MIN as u64 + (sector - self.data_start) / self.sectors_per_cluster as u64) as u16
    }

    pub fn entries_per_sector(&self) -> usize {
        self.sector_size / DIR_ENTRY_SIZE
    }
}

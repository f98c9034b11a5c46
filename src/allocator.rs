use crate::block::{self, BlockDevice};
use crate::error::{FsError, FsResult};
use crate::fat::{FatTable, CLUSTER_END};
use crate::volume::{VolumeMeta, MAX_SECTOR_SIZE};

/// First-fit cluster allocation. Every cluster handed out is zero-filled
/// and already terminated or linked in all FAT copies.
pub struct ClusterAllocator<'a, D: BlockDevice + ?Sized> {
    dev: &'a D,
    meta: &'a VolumeMeta,
}

impl<'a, D: BlockDevice + ?Sized> ClusterAllocator<'a, D> {
    pub fn new(dev: &'a D, meta: &'a VolumeMeta) -> Self {
        Self { dev, meta }
    }

    fn fat(&self) -> FatTable<'a, D> {
        FatTable::new(self.dev, self.meta)
    }

    pub fn allocate_one(&self) -> FsResult<u16> {
        let fat = self.fat();
        let Some(&cluster) = fat.scan_free(1).first() else {
            log::warn!("no free cluster left");
            return Err(FsError::NoSpace);
        };
        fat.write_entry(cluster, CLUSTER_END)?;
        self.zero_cluster(cluster)?;
        log::debug!("allocated cluster {}", cluster);
        Ok(cluster)
    }

    /// Allocates `count` clusters as one chain and returns its head. Nothing
    /// is written unless enough free clusters exist.
    pub fn allocate_n(&self, count: usize) -> FsResult<u16> {
        if count == 0 {
            return Err(FsError::InvalidArgument);
        }
        let fat = self.fat();
        let free = fat.scan_free(count);
        if free.len() < count {
            log::warn!("{} clusters requested, {} free", count, free.len());
            return Err(FsError::NoSpace);
        }

        for pair in free.windows(2) {
            fat.write_entry(pair[0], pair[1])?;
        }
        if let Some(&last) = free.last() {
            fat.write_entry(last, CLUSTER_END)?;
        }
        for &cluster in free.iter() {
            self.zero_cluster(cluster)?;
        }
        log::debug!("allocated {} clusters from {}", count, free[0]);
        Ok(free[0])
    }

    pub fn zero_cluster(&self, cluster: u16) -> FsResult<()> {
        let first = self.meta.sector_of(cluster)?;
        let zero = [0u8; MAX_SECTOR_SIZE];
        for i in 0..self.meta.sectors_per_cluster as u64 {
            block::write_sector(self.dev, first + i, &zero[..self.meta.sector_size])?;
        }
        Ok(())
    }

    pub fn free_count(&self) -> u32 {
        self.fat().count_free()
    }
}

use crate::block::{self, BlockDevice};
use crate::bpb::{BootSector, EXTENDED_BOOT_SIGNATURE};
use crate::error::{FsError, FsResult};
use crate::time;
use crate::volume::{DIR_ENTRY_SIZE, MAX_SECTOR_SIZE, PHYSICAL_SECTOR_SIZE};

/// Cluster counts a FAT16 driver expects; anything outside is FAT12 or
/// FAT32 territory.
pub const FAT16_MIN_CLUSTERS: u32 = 4085;
pub const FAT16_MAX_CLUSTERS: u32 = 65525;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatParams {
    /// Chosen from the volume size when unset.
    pub sectors_per_cluster: Option<u8>,
    pub root_entries: u16,
    pub num_fats: u8,
    pub reserved_sectors: u16,
    pub media: u8,
    pub label: [u8; 11],
    /// 0 derives one from the clock.
    pub volume_id: u32,
    /// Accept cluster counts below the FAT16 minimum. Small test images
    /// need this.
    pub allow_small: bool,
}

impl Default for FormatParams {
    fn default() -> Self {
        Self {
            sectors_per_cluster: None,
            root_entries: 512,
            num_fats: 2,
            reserved_sectors: 1,
            media: 0xF8,
            label: *b"NO NAME    ",
            volume_id: 0,
            allow_small: false,
        }
    }
}

fn choose_sectors_per_cluster(total_sectors: u32, sector_size: usize) -> u8 {
    let bytes = total_sectors as u64 * sector_size as u64;
    let cluster_bytes: u64 = if bytes <= 16 * 1024 * 1024 {
        1024
    } else if bytes <= 128 * 1024 * 1024 {
        2 * 1024
    } else if bytes <= 256 * 1024 * 1024 {
        4 * 1024
    } else if bytes <= 512 * 1024 * 1024 {
        8 * 1024
    } else if bytes <= 1024 * 1024 * 1024 {
        16 * 1024
    } else if bytes <= 2048 * 1024 * 1024 {
        32 * 1024
    } else {
        64 * 1024
    };
    (cluster_bytes / sector_size as u64).clamp(1, 128) as u8
}

fn volume_id_from_time() -> u32 {
    let (date, tm, _) = time::encode(time::now());
    ((date as u32) << 16) | tm as u32
}

/// Lays a fresh FAT16 file system over the whole device and returns the
/// boot sector written.
pub fn format<D: BlockDevice + ?Sized>(dev: &D, params: &FormatParams) -> FsResult<BootSector> {
    let ss = dev.sector_size();
    if !ss.is_power_of_two() || !(PHYSICAL_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&ss) {
        return Err(FsError::Unsupported);
    }
    let total = u32::try_from(dev.sector_count()).map_err(|_| FsError::Unsupported)?;

    let spc = params.sectors_per_cluster.unwrap_or_else(|| choose_sectors_per_cluster(total, ss));
    if spc == 0 || !spc.is_power_of_two() {
        return Err(FsError::InvalidArgument);
    }
    if params.num_fats == 0 || params.reserved_sectors == 0 || params.root_entries == 0 {
        return Err(FsError::InvalidArgument);
    }

    let reserved = params.reserved_sectors as u32;
    let fats = params.num_fats as u32;
    let root_sectors = (params.root_entries as u32 * DIR_ENTRY_SIZE as u32).div_ceil(ss as u32);

    let mut sectors_per_fat = 1u32;
    let clusters = loop {
        let overhead = reserved + fats * sectors_per_fat + root_sectors;
        if overhead >= total {
            log::warn!("{} sectors leave no room for data", total);
            return Err(FsError::NoSpace);
        }
        let clusters = (total - overhead) / spc as u32;
        let needed = ((clusters + 2) * 2).div_ceil(ss as u32);
        if needed <= sectors_per_fat {
            break clusters;
        }
        sectors_per_fat = needed;
    };
    let sectors_per_fat = u16::try_from(sectors_per_fat).map_err(|_| FsError::Unsupported)?;

    if clusters == 0 {
        return Err(FsError::NoSpace);
    }
    if !params.allow_small && !(FAT16_MIN_CLUSTERS..FAT16_MAX_CLUSTERS).contains(&clusters) {
        log::warn!("{} clusters is outside the FAT16 range", clusters);
        return Err(FsError::Unsupported);
    }

    let volume_id = if params.volume_id != 0 { params.volume_id } else { volume_id_from_time() };
    let (total_sectors_16, total_sectors_32) = match u16::try_from(total) {
        Ok(small) => (small, 0),
        Err(_) => (0, total),
    };

    let boot = BootSector {
        jump: [0xEB, 0x3C, 0x90],
        oem_name: *b"FAT16VOL",
        bytes_per_sector: ss as u16,
        sectors_per_cluster: spc,
        reserved_sectors: params.reserved_sectors,
        num_fats: params.num_fats,
        root_entries: params.root_entries,
        total_sectors_16,
        media: params.media,
        sectors_per_fat,
        sectors_per_track: 63,
        heads: 255,
        hidden_sectors: 0,
        total_sectors_32,
        drive_number: 0x80,
        reserved1: 0,
        boot_signature: EXTENDED_BOOT_SIGNATURE,
        volume_id,
        volume_label: params.label,
        fs_type: *b"FAT16   ",
    };

    let mut sector = [0u8; MAX_SECTOR_SIZE];
    boot.serialize(&mut sector[..ss]);
    block::write_sector(dev, 0, &sector[..ss])?;

    let zero = [0u8; MAX_SECTOR_SIZE];
    let system_end = reserved + fats * sectors_per_fat as u32 + root_sectors;
    for lba in 1..system_end {
        block::write_sector(dev, lba as u64, &zero[..ss])?;
    }

    let mut fat_head = [0u8; MAX_SECTOR_SIZE];
    fat_head[0..2].copy_from_slice(&(0xFF00 | params.media as u16).to_le_bytes());
    fat_head[2..4].copy_from_slice(&0xFFFFu16.to_le_bytes());
    for copy in 0..fats {
        let lba = reserved + copy * sectors_per_fat as u32;
        block::write_sector(dev, lba as u64, &fat_head[..ss])?;
    }

    log::info!(
        "formatted {} sectors: {} clusters of {} bytes, {} sectors per FAT",
        total,
        clusters,
        spc as usize * ss,
        sectors_per_fat
    );
    Ok(boot)
}

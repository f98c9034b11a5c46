use crate::error::{FsError, FsResult};
use crate::volume::{MAX_SECTOR_SIZE, PHYSICAL_SECTOR_SIZE};

pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

/// FAT16 boot sector: BIOS parameter block plus the extended block that
/// follows it at offset 36.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    pub jump: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl BootSector {
    pub fn parse(sector: &[u8]) -> FsResult<Self> {
        if sector.len() < PHYSICAL_SECTOR_SIZE {
            return Err(FsError::InvalidBootSector);
        }
        if sector[510..512] != BOOT_SIGNATURE {
            log::warn!("boot sector signature missing");
            return Err(FsError::InvalidBootSector);
        }

        let u16_at = |off: usize| u16::from_le_bytes([sector[off], sector[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_le_bytes([sector[off], sector[off + 1], sector[off + 2], sector[off + 3]])
        };

        let mut jump = [0u8; 3];
        jump.copy_from_slice(&sector[0..3]);
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&sector[3..11]);
        let mut volume_label = [b' '; 11];
        volume_label.copy_from_slice(&sector[43..54]);
        let mut fs_type = [b' '; 8];
        fs_type.copy_from_slice(&sector[54..62]);

        Ok(Self {
            jump,
            oem_name,
            bytes_per_sector: u16_at(11),
            sectors_per_cluster: sector[13],
            reserved_sectors: u16_at(14),
            num_fats: sector[16],
            root_entries: u16_at(17),
            total_sectors_16: u16_at(19),
            media: sector[21],
            sectors_per_fat: u16_at(22),
            sectors_per_track: u16_at(24),
            heads: u16_at(26),
            hidden_sectors: u32_at(28),
            total_sectors_32: u32_at(32),
            drive_number: sector[36],
            reserved1: sector[37],
            boot_signature: sector[38],
            volume_id: u32_at(39),
            volume_label,
            fs_type,
        })
    }

    /// Writes the 512-byte boot record into `out`. Bytes past the BPB are
    /// left as they are, the signature always lands at 510.
    pub fn serialize(&self, out: &mut [u8]) {
        out[0..3].copy_from_slice(&self.jump);
        out[3..11].copy_from_slice(&self.oem_name);
        out[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        out[13] = self.sectors_per_cluster;
        out[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        out[16] = self.num_fats;
        out[17..19].copy_from_slice(&self.root_entries.to_le_bytes());
        out[19..21].copy_from_slice(&self.total_sectors_16.to_le_bytes());
        out[21] = self.media;
        out[22..24].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        out[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        out[26..28].copy_from_slice(&self.heads.to_le_bytes());
        out[28..32].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        out[32..36].copy_from_slice(&self.total_sectors_32.to_le_bytes());
        out[36] = self.drive_number;
        out[37] = self.reserved1;
        out[38] = self.boot_signature;
        out[39..43].copy_from_slice(&self.volume_id.to_le_bytes());
        out[43..54].copy_from_slice(&self.volume_label);
        out[54..62].copy_from_slice(&self.fs_type);
        out[510..512].copy_from_slice(&BOOT_SIGNATURE);
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    pub fn validate(&self) -> FsResult<()> {
        let bps = self.bytes_per_sector as usize;
        if !bps.is_power_of_two() || !(PHYSICAL_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&bps) {
            log::warn!("unsupported sector size {}", bps);
            return Err(FsError::Unsupported);
        }
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Err(FsError::InvalidBootSector);
        }
        if self.reserved_sectors == 0 || self.num_fats == 0 {
            return Err(FsError::InvalidBootSector);
        }
        if self.root_entries == 0 {
            // FAT32 keeps its root in the data area
            return Err(FsError::Unsupported);
        }
        if self.sectors_per_fat == 0 || self.total_sectors() == 0 {
            return Err(FsError::InvalidBootSector);
        }
        Ok(())
    }
}

use crate::block::{self, BlockDevice};
use crate::error::{FsError, FsResult};
use crate::fat::FatTable;
use crate::name::{self, DisplayName, DOTDOT_NAME, DOT_NAME, NAME_DELETED, NAME_FREE, SHORT_NAME_LEN};
use crate::time::{self, Timestamp};
use crate::volume::{VolumeMeta, DIR_ENTRY_SIZE, MAX_SECTOR_SIZE};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

/// One 32-byte directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirEntry {
    pub name: [u8; SHORT_NAME_LEN],
    pub attr: u8,
    pub nt_reserved: u8,
    pub create_tenths: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub cluster_hi: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub cluster_lo: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn decode(raw: &[u8]) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([raw[off], raw[off + 1]]);
        let mut name = [0u8; SHORT_NAME_LEN];
        name.copy_from_slice(&raw[0..11]);
        Self {
            name,
            attr: raw[11],
            nt_reserved: raw[12],
            create_tenths: raw[13],
            create_time: u16_at(14),
            create_date: u16_at(16),
            access_date: u16_at(18),
            cluster_hi: u16_at(20),
            write_time: u16_at(22),
            write_date: u16_at(24),
            cluster_lo: u16_at(26),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..11].copy_from_slice(&self.name);
        out[11] = self.attr;
        out[12] = self.nt_reserved;
        out[13] = self.create_tenths;
        out[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        out[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        out[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        out[20..22].copy_from_slice(&self.cluster_hi.to_le_bytes());
        out[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        out[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        out[26..28].copy_from_slice(&self.cluster_lo.to_le_bytes());
        out[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == NAME_FREE
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == NAME_DELETED
    }

    /// Usable for a new entry.
    pub fn is_vacant(&self) -> bool {
        self.is_free() || self.is_deleted()
    }

    pub fn is_long_name(&self) -> bool {
        self.attr & ATTR_LONG_NAME == ATTR_LONG_NAME
    }

    pub fn is_volume_label(&self) -> bool {
        !self.is_long_name() && self.attr & ATTR_VOLUME_ID != 0
    }

    pub fn is_dir(&self) -> bool {
        !self.is_long_name() && self.attr & ATTR_DIRECTORY != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.attr & ATTR_READ_ONLY != 0
    }

    pub fn is_dot(&self) -> bool {
        self.name == DOT_NAME || self.name == DOTDOT_NAME
    }

    /// FAT16 only uses the low half.
    pub fn first_cluster(&self) -> u16 {
        self.cluster_lo
    }

    pub fn set_first_cluster(&mut self, cluster: u16) {
        self.cluster_hi = 0;
        self.cluster_lo = cluster;
    }

    pub fn display_name(&self) -> DisplayName {
        name::decode_short_name(&self.name, self.nt_reserved)
    }

    pub fn accessed(&self) -> Timestamp {
        time::decode(self.access_date, 0, 0)
    }

    pub fn modified(&self) -> Timestamp {
        time::decode(self.write_date, self.write_time, 0)
    }

    pub fn created(&self) -> Timestamp {
        time::decode(self.create_date, self.create_time, self.create_tenths)
    }
}

/// A directory entry together with where it lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntrySlot {
    pub entry: DirEntry,
    pub sector: u64,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindResult {
    Exists(DirEntrySlot),
    /// No match; the slot is the first vacant one seen.
    Empty(DirEntrySlot),
    Full,
}

/// Outcome for the last segment of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'p> {
    pub result: FindResult,
    pub name: &'p str,
    /// First cluster of the containing directory, 0 for the root.
    pub parent_cluster: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement<'p> {
    pub slot: DirEntrySlot,
    pub name: &'p str,
    pub parent_cluster: u16,
}

enum Scan {
    Found(DirEntrySlot),
    /// Hit a free marker; no entries follow.
    End,
    Continue,
}

pub fn path_is_root(path: &str) -> bool {
    path.split('/').all(|seg| seg.is_empty())
}

pub struct DirResolver<'a, D: BlockDevice + ?Sized> {
    dev: &'a D,
    meta: &'a VolumeMeta,
}

impl<'a, D: BlockDevice + ?Sized> DirResolver<'a, D> {
    pub fn new(dev: &'a D, meta: &'a VolumeMeta) -> Self {
        Self { dev, meta }
    }

    /// Slots from `first` onward, `slots` of them at most. The root area
    /// can end partway through its last sector.
    fn slot_offsets(&self, first: u64, slots: usize) -> impl Iterator<Item = (u64, usize)> {
        let per_sector = self.meta.entries_per_sector();
        (0..slots).map(move |i| (first + (i / per_sector) as u64, (i % per_sector) * DIR_ENTRY_SIZE))
    }

    fn root_slots(&self) -> usize {
        self.meta.root_entries as usize
    }

    fn cluster_slots(&self) -> usize {
        self.meta.sectors_per_cluster as usize * self.meta.entries_per_sector()
    }

    fn scan_sectors(
        &self,
        key: Option<&[u8; SHORT_NAME_LEN]>,
        first: u64,
        slots: usize,
        vacant: &mut Option<DirEntrySlot>,
    ) -> FsResult<Scan> {
        let ss = self.meta.sector_size;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        let mut loaded = None;
        for (sector, offset) in self.slot_offsets(first, slots) {
            if loaded != Some(sector) {
                block::read_sector(self.dev, sector, &mut buf[..ss])?;
                loaded = Some(sector);
            }
            let entry = DirEntry::decode(&buf[offset..offset + DIR_ENTRY_SIZE]);
            let slot = DirEntrySlot { entry, sector, offset };
            if entry.is_vacant() {
                if vacant.is_none() {
                    *vacant = Some(slot);
                }
                if entry.is_free() {
                    return Ok(Scan::End);
                }
                continue;
            }
            if entry.is_long_name() || entry.is_volume_label() {
                continue;
            }
            if key == Some(&entry.name) {
                return Ok(Scan::Found(slot));
            }
        }
        Ok(Scan::Continue)
    }

    /// Searches one contiguous run of directory sectors for `name`. A match
    /// anywhere in the run wins over a vacant slot seen earlier.
    pub fn find_in_sectors(&self, name: &str, first: u64, count: u64) -> FsResult<FindResult> {
        let key = name::encode_short_name(name).ok();
        let mut vacant = None;
        let slots = count as usize * self.meta.entries_per_sector();
        match self.scan_sectors(key.as_ref(), first, slots, &mut vacant)? {
            Scan::Found(slot) => Ok(FindResult::Exists(slot)),
            Scan::End | Scan::Continue => Ok(vacant.map_or(FindResult::Full, FindResult::Empty)),
        }
    }

    /// Searches the root area (cluster 0) or a directory chain.
    pub fn find_in_dir(&self, dir_cluster: u16, name: &str) -> FsResult<FindResult> {
        let key = name::encode_short_name(name).ok();
        let mut vacant = None;

        let found = if dir_cluster == 0 {
            self.scan_sectors(key.as_ref(), self.meta.root_start, self.root_slots(), &mut vacant)?
        } else {
            let mut outcome = Scan::Continue;
            for cluster in FatTable::new(self.dev, self.meta).chain(dir_cluster)? {
                let first = self.meta.sector_of(cluster)?;
                outcome = self.scan_sectors(key.as_ref(), first, self.cluster_slots(), &mut vacant)?;
                if !matches!(outcome, Scan::Continue) {
                    break;
                }
            }
            outcome
        };

        match found {
            Scan::Found(slot) => Ok(FindResult::Exists(slot)),
            Scan::End | Scan::Continue => Ok(vacant.map_or(FindResult::Full, FindResult::Empty)),
        }
    }

    /// Walks every segment of `path`. Intermediate segments must name
    /// existing directories.
    pub fn resolve<'p>(&self, path: &'p str) -> FsResult<Resolution<'p>> {
        let mut segments = path.split('/').filter(|seg| !seg.is_empty()).peekable();
        let mut dir_cluster = 0u16;

        while let Some(segment) = segments.next() {
            let result = self.find_in_dir(dir_cluster, segment)?;
            if segments.peek().is_none() {
                return Ok(Resolution { result, name: segment, parent_cluster: dir_cluster });
            }
            match result {
                FindResult::Exists(slot) if slot.entry.is_dir() => dir_cluster = slot.entry.first_cluster(),
                FindResult::Exists(_) => return Err(FsError::NotADirectory),
                FindResult::Empty(_) | FindResult::Full => return Err(FsError::NotFound),
            }
        }

        // nothing but separators
        Err(FsError::InvalidArgument)
    }

    pub fn find_entry(&self, path: &str) -> FsResult<DirEntrySlot> {
        match self.resolve(path)?.result {
            FindResult::Exists(slot) => Ok(slot),
            _ => Err(FsError::NotFound),
        }
    }

    pub fn find_empty_slot<'p>(&self, path: &'p str) -> FsResult<Placement<'p>> {
        if path_is_root(path) {
            return Err(FsError::AlreadyExists);
        }
        let res = self.resolve(path)?;
        match res.result {
            FindResult::Empty(slot) => Ok(Placement { slot, name: res.name, parent_cluster: res.parent_cluster }),
            FindResult::Exists(_) => Err(FsError::AlreadyExists),
            FindResult::Full => Err(FsError::DirectoryFull),
        }
    }

    /// Directory cluster for `path`: 0 for the root, else the first cluster
    /// of an existing directory.
    pub fn dir_cluster_of(&self, path: &str) -> FsResult<u16> {
        if path_is_root(path) {
            return Ok(0);
        }
        let slot = self.find_entry(path)?;
        if !slot.entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(slot.entry.first_cluster())
    }

    fn list_sectors<F>(&self, first: u64, slots: usize, sink: &mut F) -> FsResult<bool>
    where
        F: FnMut(&str, &DirEntry) -> bool,
    {
        let ss = self.meta.sector_size;
        let mut buf = [0u8; MAX_SECTOR_SIZE];
        let mut loaded = None;
        for (sector, offset) in self.slot_offsets(first, slots) {
            if loaded != Some(sector) {
                block::read_sector(self.dev, sector, &mut buf[..ss])?;
                loaded = Some(sector);
            }
            let entry = DirEntry::decode(&buf[offset..offset + DIR_ENTRY_SIZE]);
            if entry.is_free() {
                return Ok(false);
            }
            if entry.is_deleted() || entry.is_long_name() || entry.is_volume_label() {
                continue;
            }
            if !sink(entry.display_name().as_str(), &entry) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Streams the live entries of a directory, `.` and `..` included, to
    /// `sink` until it returns false or the entries run out.
    pub fn list<F>(&self, dir_cluster: u16, mut sink: F) -> FsResult<()>
    where
        F: FnMut(&str, &DirEntry) -> bool,
    {
        if dir_cluster == 0 {
            self.list_sectors(self.meta.root_start, self.root_slots(), &mut sink)?;
            return Ok(());
        }
        for cluster in FatTable::new(self.dev, self.meta).chain(dir_cluster)? {
            let first = self.meta.sector_of(cluster)?;
            if !self.list_sectors(first, self.cluster_slots(), &mut sink)? {
                break;
            }
        }
        Ok(())
    }

    /// True when nothing but `.` and `..` remains in any cluster of the
    /// directory.
    pub fn is_empty_dir(&self, dir_cluster: u16) -> FsResult<bool> {
        let mut empty = true;
        self.list(dir_cluster, |_, entry| {
            if entry.is_dot() {
                return true;
            }
            empty = false;
            false
        })?;
        Ok(empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockDevice;
    use crate::format::{format, FormatParams};
    use crate::ramdisk::RamDisk;
    use crate::volume::MountOptions;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;

    fn setup(root_entries: u16) -> (RamDisk, VolumeMeta) {
        let disk = RamDisk::new(512, 4096);
        let params = FormatParams {
            sectors_per_cluster: Some(1),
            root_entries,
            allow_small: true,
            ..FormatParams::default()
        };
        let bs = format(&disk, &params).unwrap();
        let meta = VolumeMeta::from_boot_sector(&bs, &MountOptions::default(), Timestamp::default()).unwrap();
        (disk, meta)
    }

    fn put(disk: &RamDisk, sector: u64, index: usize, entry: &DirEntry) {
        let mut buf = [0u8; 512];
        disk.read_sector(sector, &mut buf).unwrap();
        entry.encode(&mut buf[index * 32..index * 32 + 32]);
        disk.write_sector(sector, &buf).unwrap();
    }

    fn named(short: &[u8; 11], attr: u8, cluster: u16) -> DirEntry {
        DirEntry { name: *short, attr, cluster_lo: cluster, ..DirEntry::default() }
    }

    #[test]
    fn entry_fields_at_fixed_offsets() {
        let entry = DirEntry {
            name: *b"FILE1   TXT",
            attr: ATTR_ARCHIVE,
            create_date: 0x1234,
            cluster_lo: 0x0102,
            size: 10000,
            ..DirEntry::default()
        };
        let mut raw = [0u8; 32];
        entry.encode(&mut raw);
        assert_eq!(&raw[0..11], b"FILE1   TXT");
        assert_eq!(raw[11], 0x20);
        assert_eq!(raw[16..18], [0x34, 0x12]);
        assert_eq!(raw[26..28], [0x02, 0x01]);
        assert_eq!(raw[28..32], 10000u32.to_le_bytes());
        assert_eq!(DirEntry::decode(&raw), entry);
    }

    #[test]
    fn long_name_fragments_are_not_directories() {
        let lfn = named(b"A          ", ATTR_LONG_NAME, 0);
        assert!(lfn.is_long_name());
        assert!(!lfn.is_dir());
        assert!(!lfn.is_volume_label());
        assert!(named(b"LABEL      ", ATTR_VOLUME_ID, 0).is_volume_label());
    }

    #[test]
    fn three_way_result_in_root() {
        let (disk, meta) = setup(16);
        let dirs = DirResolver::new(&disk, &meta);
        let root = meta.root_start;

        match dirs.find_in_dir(0, "FILE1.TXT").unwrap() {
            FindResult::Empty(slot) => assert_eq!((slot.sector, slot.offset), (root, 0)),
            other => panic!("unexpected {:?}", other),
        }

        put(&disk, root, 0, &named(b"FILE1   TXT", ATTR_ARCHIVE, 0));
        match dirs.find_in_dir(0, "file1.txt").unwrap() {
            FindResult::Exists(slot) => assert_eq!((slot.sector, slot.offset), (root, 0)),
            other => panic!("unexpected {:?}", other),
        }

        for i in 1..16 {
            put(&disk, root, i, &named(b"OTHER   BIN", ATTR_ARCHIVE, 0));
        }
        assert_eq!(dirs.find_in_dir(0, "NEW.TXT").unwrap(), FindResult::Full);
    }

    #[test]
    fn match_after_deleted_slot_is_found() {
        let (disk, meta) = setup(16);
        let dirs = DirResolver::new(&disk, &meta);
        let root = meta.root_start;
        let mut gone = named(b"OLD     TXT", ATTR_ARCHIVE, 0);
        gone.name[0] = NAME_DELETED;
        put(&disk, root, 0, &gone);
        put(&disk, root, 1, &named(b"KEEP    TXT", ATTR_ARCHIVE, 0));

        match dirs.find_in_dir(0, "KEEP.TXT").unwrap() {
            FindResult::Exists(slot) => assert_eq!(slot.offset, 32),
            other => panic!("unexpected {:?}", other),
        }
        match dirs.find_in_dir(0, "NEW.TXT").unwrap() {
            FindResult::Empty(slot) => assert_eq!(slot.offset, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn volume_label_never_matches() {
        let (disk, meta) = setup(16);
        let dirs = DirResolver::new(&disk, &meta);
        put(&disk, meta.root_start, 0, &named(b"DATA       ", ATTR_VOLUME_ID, 0));
        assert!(matches!(dirs.find_in_dir(0, "DATA").unwrap(), FindResult::Empty(_)));
    }

    #[test]
    fn walks_into_subdirectory_chain() {
        let (disk, meta) = setup(16);
        let dirs = DirResolver::new(&disk, &meta);
        let fat = FatTable::new(&disk, &meta);
        fat.write_entry(2, 3).unwrap();
        fat.write_entry(3, crate::fat::CLUSTER_END).unwrap();
        put(&disk, meta.root_start, 0, &named(b"SUB        ", ATTR_DIRECTORY, 2));

        let first = meta.cluster_to_sector(2);
        put(&disk, first, 0, &named(&DOT_NAME, ATTR_DIRECTORY, 2));
        put(&disk, first, 1, &named(&DOTDOT_NAME, ATTR_DIRECTORY, 0));
        for i in 2..16 {
            put(&disk, first, i, &named(b"FILLER  BIN", ATTR_ARCHIVE, 0));
        }
        put(&disk, meta.cluster_to_sector(3), 0, &named(b"A       TXT", ATTR_ARCHIVE, 0));

        let res = dirs.resolve("//sub//a.txt").unwrap();
        assert_eq!(res.name, "a.txt");
        assert_eq!(res.parent_cluster, 2);
        match res.result {
            FindResult::Exists(slot) => assert_eq!(slot.sector, meta.cluster_to_sector(3)),
            other => panic!("unexpected {:?}", other),
        }

        let placement = dirs.find_empty_slot("/SUB/B.TXT").unwrap();
        assert_eq!(placement.slot.sector, meta.cluster_to_sector(3));
        assert_eq!(placement.slot.offset, 32);

        let mut names: Vec<String> = Vec::new();
        dirs.list(2, |name, _| {
            names.push(name.to_string());
            true
        })
        .unwrap();
        assert_eq!(names.len(), 17);
        assert_eq!(names[0], ".");
        assert_eq!(names[16], "A.TXT");
        assert!(!dirs.is_empty_dir(2).unwrap());
    }

    #[test]
    fn lookup_errors() {
        let (disk, meta) = setup(16);
        let dirs = DirResolver::new(&disk, &meta);
        put(&disk, meta.root_start, 0, &named(b"FILE    TXT", ATTR_ARCHIVE, 0));

        assert_eq!(dirs.find_entry("/missing"), Err(FsError::NotFound));
        assert_eq!(dirs.resolve("/missing/x").unwrap_err(), FsError::NotFound);
        assert_eq!(dirs.resolve("/file.txt/x").unwrap_err(), FsError::NotADirectory);
        assert_eq!(dirs.resolve("///").unwrap_err(), FsError::InvalidArgument);
        assert_eq!(dirs.find_empty_slot("/").unwrap_err(), FsError::AlreadyExists);
        assert_eq!(dirs.find_empty_slot("/file.txt").unwrap_err(), FsError::AlreadyExists);
        assert_eq!(dirs.dir_cluster_of("/file.txt"), Err(FsError::NotADirectory));
        assert_eq!(dirs.dir_cluster_of("/"), Ok(0));
    }

    #[test]
    fn list_stops_early_when_sink_declines() {
        let (disk, meta) = setup(16);
        let dirs = DirResolver::new(&disk, &meta);
        put(&disk, meta.root_start, 0, &named(b"ONE        ", ATTR_ARCHIVE, 0));
        put(&disk, meta.root_start, 1, &named(b"TWO        ", ATTR_ARCHIVE, 0));
        let mut seen = 0;
        dirs.list(0, |_, _| {
            seen += 1;
            false
        })
        .unwrap();
        assert_eq!(seen, 1);
    }
}

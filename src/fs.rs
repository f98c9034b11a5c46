use crate::allocator::ClusterAllocator;
use crate::block::{self, BlockDevice};
use crate::bpb::BootSector;
use crate::dir::{path_is_root, DirEntry, DirEntrySlot, DirResolver, ATTR_ARCHIVE, ATTR_DIRECTORY};
use crate::entry::EntryWriter;
use crate::error::{FsError, FsResult};
use crate::fat::FatTable;
use crate::file::FileIo;
use crate::format::{self, FormatParams};
use crate::name::{self, DOTDOT_NAME, DOT_NAME, SHORT_NAME_LEN};
use crate::time::{self, Timestamp};
use crate::volume::{MountOptions, VolumeMeta, DIR_ENTRY_SIZE, MAX_SECTOR_SIZE, PHYSICAL_SECTOR_SIZE};

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
const MODE_READ_ONLY: u32 = 0o444;
const MODE_DEFAULT: u32 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// What a `getattr` style call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    /// 512-byte units.
    pub blocks: u64,
    pub blksize: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total_clusters: u32,
    pub free_clusters: u32,
    pub cluster_size: u32,
}

/// Small volumes pass only when the boot sector says FAT16 outright, as
/// `format` with `allow_small` writes them.
fn looks_like_fat12(boot: &BootSector, meta: &VolumeMeta) -> bool {
    meta.cluster_count < format::FAT16_MIN_CLUSTERS && boot.fs_type != *b"FAT16   "
}

/// A mounted FAT16 volume. Paths are `/`-separated and absolute; the
/// root itself is `/`.
pub struct Fat16Volume<D: BlockDevice> {
    device: D,
    boot: BootSector,
    meta: VolumeMeta,
}

impl<D: BlockDevice> Fat16Volume<D> {
    pub fn mount(device: D, options: MountOptions) -> FsResult<Self> {
        let ss = device.sector_size();
        if !(PHYSICAL_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&ss) {
            return Err(FsError::Unsupported);
        }
        let mut sector = [0u8; MAX_SECTOR_SIZE];
        block::read_sector(&device, 0, &mut sector[..ss])?;
        let boot = BootSector::parse(&sector[..ss])?;
        if boot.bytes_per_sector as usize != ss {
            log::warn!("boot sector claims {} byte sectors, device has {}", boot.bytes_per_sector, ss);
            return Err(FsError::Unsupported);
        }
        if boot.total_sectors() as u64 > device.sector_count() {
            log::warn!("volume of {} sectors on a {} sector device", boot.total_sectors(), device.sector_count());
            return Err(FsError::InvalidBootSector);
        }

        let meta = VolumeMeta::from_boot_sector(&boot, &options, time::now())?;
        if looks_like_fat12(&boot, &meta) {
            log::warn!("{} clusters is FAT12 sized; reading the FAT as 16-bit entries", meta.cluster_count);
        }
        log::info!(
            "mounted FAT16: {} clusters of {} bytes, {} root entries",
            meta.cluster_count,
            meta.cluster_size,
            meta.root_entries
        );
        Ok(Self { device, boot, meta })
    }

    pub fn format(device: D, params: &FormatParams, options: MountOptions) -> FsResult<Self> {
        format::format(&device, params)?;
        Self::mount(device, options)
    }

    pub fn meta(&self) -> &VolumeMeta {
        &self.meta
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    fn dirs(&self) -> DirResolver<'_, D> {
        DirResolver::new(&self.device, &self.meta)
    }

    fn writer(&self) -> EntryWriter<'_, D> {
        EntryWriter::new(&self.device, &self.meta)
    }

    fn file_io(&self) -> FileIo<'_, D> {
        FileIo::new(&self.device, &self.meta)
    }

    fn attr_of(&self, entry: &DirEntry) -> FileAttr {
        let perm = if entry.is_read_only() { MODE_READ_ONLY } else { MODE_DEFAULT };
        let (kind, fmt) = if entry.is_dir() { (FileKind::Directory, S_IFDIR) } else { (FileKind::File, S_IFREG) };
        let size = entry.size as u64;
        FileAttr {
            kind,
            mode: fmt | perm,
            size,
            blocks: size / PHYSICAL_SECTOR_SIZE as u64,
            blksize: self.meta.cluster_size as u32,
            uid: self.meta.uid,
            gid: self.meta.gid,
            atime: entry.accessed(),
            mtime: entry.modified(),
            ctime: entry.created(),
        }
    }

    pub fn get_attributes(&self, path: &str) -> FsResult<FileAttr> {
        if path_is_root(path) {
            return Ok(FileAttr {
                kind: FileKind::Directory,
                mode: S_IFDIR | MODE_DEFAULT,
                size: 0,
                blocks: 0,
                blksize: self.meta.cluster_size as u32,
                uid: self.meta.uid,
                gid: self.meta.gid,
                atime: self.meta.atime,
                mtime: self.meta.mtime,
                ctime: self.meta.ctime,
            });
        }
        let slot = self.dirs().find_entry(path)?;
        Ok(self.attr_of(&slot.entry))
    }

    /// Feeds each live entry of the directory at `path` to `sink`, which
    /// returns false to stop early.
    pub fn list_directory<F>(&self, path: &str, sink: F) -> FsResult<()>
    where
        F: FnMut(&str, &DirEntry) -> bool,
    {
        log::debug!("readdir {}", path);
        let dirs = self.dirs();
        let cluster = dirs.dir_cluster_of(path)?;
        dirs.list(cluster, sink)
    }

    pub fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        log::debug!("read {} at {} len {}", path, offset, buf.len());
        self.file_io().read(path, offset, buf)
    }

    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        self.file_io().write(path, data, offset)
    }

    pub fn set_size(&mut self, path: &str, size: u64) -> FsResult<()> {
        self.file_io().truncate(path, size)
    }

    fn short_name_for(segment: &str) -> FsResult<[u8; SHORT_NAME_LEN]> {
        let short = name::encode_short_name(segment)?;
        if short == DOT_NAME || short == DOTDOT_NAME {
            return Err(FsError::InvalidName);
        }
        Ok(short)
    }

    pub fn create_file(&mut self, path: &str) -> FsResult<()> {
        log::debug!("create {}", path);
        let placement = self.dirs().find_empty_slot(path)?;
        let short = Self::short_name_for(placement.name)?;
        let mut slot = placement.slot;
        self.writer().create(&mut slot, &short, ATTR_ARCHIVE, 0, 0)
    }

    pub fn create_directory(&mut self, path: &str) -> FsResult<()> {
        log::debug!("mkdir {}", path);
        let placement = self.dirs().find_empty_slot(path)?;
        let short = Self::short_name_for(placement.name)?;

        let cluster = ClusterAllocator::new(&self.device, &self.meta).allocate_one()?;
        let writer = self.writer();
        let mut slot = placement.slot;
        writer.create(&mut slot, &short, ATTR_DIRECTORY, cluster, 0)?;

        let sector = self.meta.sector_of(cluster)?;
        let mut dot = slot.entry;
        dot.name = DOT_NAME;
        dot.set_first_cluster(cluster);
        writer.write(&DirEntrySlot { entry: dot, sector, offset: 0 })?;

        let mut dotdot = slot.entry;
        dotdot.name = DOTDOT_NAME;
        dotdot.set_first_cluster(placement.parent_cluster);
        writer.write(&DirEntrySlot { entry: dotdot, sector, offset: DIR_ENTRY_SIZE })
    }

    pub fn remove_file(&mut self, path: &str) -> FsResult<()> {
        log::debug!("unlink {}", path);
        if path_is_root(path) {
            return Err(FsError::IsADirectory);
        }
        let mut slot = self.dirs().find_entry(path)?;
        if slot.entry.is_dir() {
            return Err(FsError::IsADirectory);
        }
        FatTable::new(&self.device, &self.meta).free_chain(slot.entry.first_cluster())?;
        self.writer().delete(&mut slot)
    }

    pub fn remove_directory(&mut self, path: &str) -> FsResult<()> {
        log::debug!("rmdir {}", path);
        if path_is_root(path) {
            return Err(FsError::Busy);
        }
        let dirs = self.dirs();
        let mut slot = dirs.find_entry(path)?;
        if !slot.entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if slot.entry.is_dot() {
            return Err(FsError::InvalidArgument);
        }
        if !dirs.is_empty_dir(slot.entry.first_cluster())? {
            return Err(FsError::NotEmpty);
        }
        FatTable::new(&self.device, &self.meta).free_chain(slot.entry.first_cluster())?;
        self.writer().delete(&mut slot)
    }

    pub fn set_times(&mut self, path: &str, atime: Timestamp, mtime: Timestamp) -> FsResult<()> {
        if path_is_root(path) {
            return Ok(());
        }
        let mut slot = self.dirs().find_entry(path)?;
        self.writer().set_times(&mut slot, atime, mtime)
    }

    pub fn usage(&self) -> Usage {
        Usage {
            total_clusters: self.meta.cluster_end - 2,
            free_clusters: ClusterAllocator::new(&self.device, &self.meta).free_count(),
            cluster_size: self.meta.cluster_size as u32,
        }
    }
}

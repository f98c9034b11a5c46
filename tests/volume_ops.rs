use fat16vol::allocator::ClusterAllocator;
use fat16vol::dir::{DirEntry, DirEntrySlot, DirResolver, ATTR_ARCHIVE};
use fat16vol::entry::EntryWriter;
use fat16vol::fat::FatTable;
use fat16vol::{Fat16Volume, FileKind, FormatParams, FsError, MountOptions, RamDisk, Timestamp};

fn small_volume(root_entries: u16) -> Fat16Volume<RamDisk> {
    let params = FormatParams {
        sectors_per_cluster: Some(1),
        root_entries,
        allow_small: true,
        ..FormatParams::default()
    };
    Fat16Volume::format(RamDisk::new(512, 4096), &params, MountOptions::default()).expect("format failed")
}

fn names(vol: &Fat16Volume<RamDisk>, path: &str) -> Vec<String> {
    let mut out = Vec::new();
    vol.list_directory(path, |name, _| {
        out.push(name.to_string());
        true
    })
    .expect("list failed");
    out
}

#[test]
fn create_resolve_delete_file() {
    let mut vol = small_volume(512);
    vol.create_file("/FILE1.TXT").expect("create failed");

    let attr = vol.get_attributes("/FILE1.TXT").expect("getattr failed");
    assert_eq!(attr.kind, FileKind::File);
    assert_eq!(attr.size, 0);
    assert_eq!(names(&vol, "/"), ["FILE1.TXT"]);

    assert_eq!(vol.create_file("/FILE1.TXT"), Err(FsError::AlreadyExists));

    vol.remove_file("/FILE1.TXT").expect("unlink failed");
    assert_eq!(vol.get_attributes("/FILE1.TXT"), Err(FsError::NotFound));
    assert!(names(&vol, "/").is_empty());

    // the deleted slot is reused
    vol.create_file("/FILE2.TXT").expect("create failed");
    let raw = vol.device().snapshot();
    let root = vol.meta().root_start as usize * 512;
    assert_eq!(&raw[root..root + 11], b"FILE2   TXT");
}

#[test]
fn subdirectory_listing() {
    let mut vol = small_volume(512);
    vol.create_directory("/SUB").expect("mkdir failed");
    vol.create_file("/SUB/A.TXT").expect("create failed");
    vol.create_file("/SUB/B.TXT").expect("create failed");

    let listed: Vec<String> = names(&vol, "/SUB").into_iter().filter(|n| n != "." && n != "..").collect();
    assert_eq!(listed, ["A.TXT", "B.TXT"]);
    assert_eq!(names(&vol, "/SUB")[..2], [".", ".."]);
    assert_eq!(vol.get_attributes("/SUB").expect("getattr failed").kind, FileKind::Directory);
    assert_eq!(vol.get_attributes("/SUB").expect("getattr failed").mode, 0o040755);
}

#[test]
fn rmdir_refuses_populated_directory() {
    let mut vol = small_volume(512);
    vol.create_directory("/SUB").expect("mkdir failed");
    vol.create_file("/SUB/A.TXT").expect("create failed");

    assert_eq!(vol.remove_directory("/SUB"), Err(FsError::NotEmpty));
    assert_eq!(vol.remove_file("/SUB"), Err(FsError::IsADirectory));
    assert_eq!(vol.remove_directory("/SUB/A.TXT"), Err(FsError::NotADirectory));
    assert_eq!(vol.remove_directory("/"), Err(FsError::Busy));

    vol.remove_file("/SUB/A.TXT").expect("unlink failed");
    vol.remove_directory("/SUB").expect("rmdir failed");
    assert_eq!(vol.get_attributes("/SUB"), Err(FsError::NotFound));
}

#[test]
fn rmdir_checks_every_cluster() {
    // one sector per cluster holds 16 entries: . and .. plus 14 files
    let mut vol = small_volume(512);
    vol.create_directory("/BIG").expect("mkdir failed");
    for i in 0..14 {
        vol.create_file(&format!("/BIG/F{}.TXT", i)).expect("create failed");
    }
    assert_eq!(vol.create_file("/BIG/F14.TXT"), Err(FsError::DirectoryFull));

    // chain a second cluster by hand and put one entry in it
    let meta = *vol.meta();
    {
        let dev = vol.device();
        let big = DirResolver::new(dev, &meta).find_entry("/BIG").expect("lookup failed").entry.first_cluster();
        let extra = ClusterAllocator::new(dev, &meta).allocate_one().expect("alloc failed");
        FatTable::new(dev, &meta).write_entry(big, extra).expect("link failed");
        let mut slot = DirEntrySlot { entry: DirEntry::default(), sector: meta.cluster_to_sector(extra), offset: 0 };
        EntryWriter::new(dev, &meta).create(&mut slot, b"LATE    TXT", ATTR_ARCHIVE, 0, 0).expect("entry failed");
    }

    for i in 0..14 {
        vol.remove_file(&format!("/BIG/F{}.TXT", i)).expect("unlink failed");
    }
    assert_eq!(names(&vol, "/BIG"), [".", "..", "LATE.TXT"]);
    assert_eq!(vol.remove_directory("/BIG"), Err(FsError::NotEmpty));

    let free_before = vol.usage().free_clusters;
    vol.remove_file("/BIG/LATE.TXT").expect("unlink failed");
    vol.remove_directory("/BIG").expect("rmdir failed");
    assert_eq!(vol.usage().free_clusters, free_before + 2);
}

#[test]
fn full_root_directory() {
    let mut vol = small_volume(16);
    for i in 0..16 {
        vol.create_file(&format!("/F{}", i)).expect("create failed");
    }
    assert_eq!(vol.create_file("/LAST"), Err(FsError::DirectoryFull));
    assert_eq!(vol.create_directory("/LASTDIR"), Err(FsError::DirectoryFull));
    assert_eq!(FsError::DirectoryFull.errno(), -28);
}

#[test]
fn root_capacity_ends_mid_sector() {
    // 20 entries span two sectors but only four slots of the second
    let mut vol = small_volume(20);
    assert_eq!(vol.meta().root_sectors, 2);
    for i in 0..20 {
        vol.create_file(&format!("/F{}", i)).expect("create failed");
    }
    assert_eq!(vol.create_file("/F20"), Err(FsError::DirectoryFull));
    assert_eq!(names(&vol, "/").len(), 20);

    let raw = vol.device().snapshot();
    let past_end = (vol.meta().root_start as usize + 1) * 512 + 4 * 32;
    assert!(raw[past_end..past_end + 12 * 32].iter().all(|&b| b == 0));
}

#[test]
fn path_through_file_is_not_a_directory() {
    let mut vol = small_volume(512);
    vol.create_file("/FILE.TXT").expect("create failed");
    assert_eq!(vol.get_attributes("/FILE.TXT/X"), Err(FsError::NotADirectory));
    assert_eq!(vol.create_file("/FILE.TXT/X"), Err(FsError::NotADirectory));
    assert_eq!(vol.get_attributes("/NOPE/X"), Err(FsError::NotFound));
    assert_eq!(
        vol.list_directory("/FILE.TXT", |_, _| true),
        Err(FsError::NotADirectory)
    );
}

#[test]
fn invalid_names_are_rejected() {
    let mut vol = small_volume(512);
    assert_eq!(vol.create_file("/toolongname.txt"), Err(FsError::InvalidName));
    assert_eq!(vol.create_file("/bad*name"), Err(FsError::InvalidName));
    assert_eq!(vol.create_directory("/a.b.c.d"), Err(FsError::InvalidName));
    assert_eq!(vol.create_file("/"), Err(FsError::AlreadyExists));
}

#[test]
fn lowercase_paths_resolve() {
    let mut vol = small_volume(512);
    vol.create_file("/readme.md").expect("create failed");
    assert!(vol.get_attributes("/README.MD").is_ok());
    assert_eq!(names(&vol, "/"), ["README.MD"]);
}

#[test]
fn set_times_round_trip() {
    let mut vol = small_volume(512);
    vol.create_file("/T.BIN").expect("create failed");
    let atime = Timestamp::new(1_500_000_000, 0);
    let mtime = Timestamp::new(1_600_000_000, 0);
    vol.set_times("/T.BIN", atime, mtime).expect("utimens failed");

    let attr = vol.get_attributes("/T.BIN").expect("getattr failed");
    assert_eq!(attr.mtime, mtime);
    assert_eq!(attr.atime.secs, 1_500_000_000 - 1_500_000_000 % 86400);
    assert_eq!(vol.set_times("/MISSING", atime, mtime), Err(FsError::NotFound));
}

#[test]
fn remount_sees_same_tree() {
    let mut vol = small_volume(512);
    vol.create_directory("/DOCS").expect("mkdir failed");
    vol.create_file("/DOCS/A.TXT").expect("create failed");
    vol.write("/DOCS/A.TXT", b"persisted", 0).expect("write failed");

    let image = vol.into_device().into_image();
    let vol = Fat16Volume::mount(RamDisk::from_image(512, image), MountOptions { uid: 7, gid: 8 })
        .expect("mount failed");
    let mut buf = [0u8; 32];
    let n = vol.read("/DOCS/A.TXT", 0, &mut buf).expect("read failed");
    assert_eq!(&buf[..n], b"persisted");
    assert_eq!(vol.get_attributes("/DOCS").expect("getattr failed").uid, 7);
}

//! FAT16 volume engine.
//!
//! Mounts a FAT16 image through a sector-addressed [`BlockDevice`] and
//! exposes path-based operations (attributes, listing, offset reads and
//! writes, create/remove, timestamps, truncate) with the semantics a
//! FUSE-style dispatcher expects. Only 8.3 short names are understood.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod allocator;
pub mod block;
pub mod bpb;
pub mod dir;
pub mod entry;
pub mod error;
pub mod fat;
pub mod file;
pub mod format;
pub mod fs;
#[cfg(feature = "std")]
pub mod image;
pub mod name;
pub mod ramdisk;
pub mod time;
pub mod volume;

pub use block::{BlockDevice, BlockDeviceError};
pub use error::{FsError, FsResult};
pub use format::FormatParams;
pub use fs::{Fat16Volume, FileAttr, FileKind, Usage};
pub use ramdisk::RamDisk;
pub use time::Timestamp;
pub use volume::{MountOptions, VolumeMeta};

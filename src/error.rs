use core::fmt;

/// Every failure the engine reports. One kind per condition; device
/// failures all collapse into `Io` after being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotADirectory,
    NotFound,
    AlreadyExists,
    DirectoryFull,
    IsADirectory,
    NotEmpty,
    Busy,
    InvalidArgument,
    InvalidName,
    NoSpace,
    Io,
    Inconsistent,
    InvalidBootSector,
    Unsupported,
}

pub type FsResult<T> = Result<T, FsError>;

const EIO: i32 = 5;
const ENOENT: i32 = 2;
const EBUSY: i32 = 16;
const EEXIST: i32 = 17;
const ENOTDIR: i32 = 20;
const EISDIR: i32 = 21;
const EINVAL: i32 = 22;
const ENOSPC: i32 = 28;
const ENOTEMPTY: i32 = 39;
const EOPNOTSUPP: i32 = 95;
const EUCLEAN: i32 = 117;

impl FsError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::NotADirectory => "Not a directory.",
            FsError::NotFound => "No such file or directory.",
            FsError::AlreadyExists => "File already exists.",
            FsError::DirectoryFull => "Directory full.",
            FsError::IsADirectory => "Is a directory.",
            FsError::NotEmpty => "Directory not empty.",
            FsError::Busy => "Resource busy.",
            FsError::InvalidArgument => "Invalid argument.",
            FsError::InvalidName => "Invalid file name.",
            FsError::NoSpace => "Disk full.",
            FsError::Io => "I/O error.",
            FsError::Inconsistent => "Volume structure is inconsistent.",
            FsError::InvalidBootSector => "Invalid FAT16 boot sector.",
            FsError::Unsupported => "Unsupported volume geometry.",
        }
    }

    /// Negative POSIX code, the convention FUSE-style dispatchers expect.
    pub fn errno(&self) -> i32 {
        let code = match self {
            FsError::NotADirectory => ENOTDIR,
            FsError::NotFound => ENOENT,
            FsError::AlreadyExists => EEXIST,
            FsError::DirectoryFull | FsError::NoSpace => ENOSPC,
            FsError::IsADirectory => EISDIR,
            FsError::NotEmpty => ENOTEMPTY,
            FsError::Busy => EBUSY,
            FsError::InvalidArgument | FsError::InvalidName | FsError::InvalidBootSector => EINVAL,
            FsError::Io => EIO,
            FsError::Inconsistent => EUCLEAN,
            FsError::Unsupported => EOPNOTSUPP,
        };
        -code
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FsError {}

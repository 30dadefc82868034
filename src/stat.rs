//! Stat records, POSIX mode bits and the access check.

use crate::cred::Cred;

/// File type bits, packed into the high bits of `mode` (the `S_IFMT` field).
pub const S_IFMT: u32 = 0o170_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFLNK: u32 = 0o120_000;

/// Owner/group/other read-write-execute masks.
pub const S_IRWXU: u32 = 0o700;
pub const S_IRWXG: u32 = 0o070;
pub const S_IRWXO: u32 = 0o007;

pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IXUSR: u32 = 0o100;

pub const DEFAULT_DIR_MODE: u32 = S_IFDIR | 0o755;
pub const DEFAULT_FILE_MODE: u32 = S_IFREG | 0o644;

pub const BLOCK_SIZE: u64 = 512;
pub const FS_BLOCK_SIZE: u32 = 4096;

/// High-level file type, derived from `mode & S_IFMT`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

impl FileType {
    pub fn ifmt_bits(self) -> u32 {
        match self {
            FileType::Regular => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
        }
    }

    pub fn from_mode(mode: u32) -> Option<FileType> {
        match mode & S_IFMT {
            S_IFREG => Some(FileType::Regular),
            S_IFDIR => Some(FileType::Directory),
            S_IFLNK => Some(FileType::Symlink),
            _ => None,
        }
    }
}

/// Requested access bits used by [`Stats::has_access`]; a subset of the owner's `S_IRWXU` bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccessMode(pub u32);

impl AccessMode {
    pub const READ: AccessMode = AccessMode(0o4);
    pub const WRITE: AccessMode = AccessMode(0o2);
    pub const EXEC: AccessMode = AccessMode(0o1);
}

/// POSIX stat record.
///
/// `mode` packs the file type into `S_IFMT` and permission bits into the low 12 bits.
/// `blocks`/`blksize`/`nlink` are derived/fixed rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub ino: u64,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
}

impl Stats {
    /// Builds stats for a freshly allocated inode, defaulting `mode`'s type bits to regular
    /// if the caller didn't set any (the invariant `mode & S_IFMT != 0`).
    pub fn new(ino: u64, mode: u32, uid: u32, gid: u32, now_ms: i64) -> Self {
        let mode = if mode & S_IFMT == 0 { mode | S_IFREG } else { mode };
        Self {
            ino,
            size: 0,
            mode,
            uid,
            gid,
            atime_ms: now_ms,
            mtime_ms: now_ms,
            ctime_ms: now_ms,
            birthtime_ms: now_ms,
        }
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE)
    }

    pub fn blksize(&self) -> u32 {
        FS_BLOCK_SIZE
    }

    pub fn nlink(&self) -> u32 {
        1
    }

    pub fn permission_bits(&self) -> u32 {
        self.mode & 0o7777
    }

    /// `hasAccess` from the spec: an effective uid/gid of `0` bypasses every check; otherwise
    /// the requested bits are checked against the owner, group or other triad depending on
    /// which one matches the credential.
    pub fn has_access(&self, requested: AccessMode, cred: &Cred) -> bool {
        if cred.is_root() {
            return true;
        }
        let applicable = if cred.euid == self.uid {
            (self.mode & S_IRWXU) >> 6
        } else if cred.egid == self.gid {
            (self.mode & S_IRWXG) >> 3
        } else {
            self.mode & S_IRWXO
        };
        applicable & requested.0 == requested.0
    }
}

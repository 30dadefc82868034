//! The `FileSystem`/`FileHandle` contract every backend and composer implements.

use async_trait::async_trait;

use crate::cred::Cred;
use crate::error::Result;
use crate::flags::OpenFlags;
use crate::stat::{FileType, Stats};

/// Filesystem type magic reported by [`Metadata::fs_type`]: the ASCII bytes of `"zenfs"` packed
/// into a `u64`, carried over unchanged from the system this core was distilled from.
pub const FS_TYPE: u64 = 0x7A_65_6E_66_73;

/// Static capability/space-accounting snapshot returned by [`FileSystem::metadata`].
#[derive(Debug, Clone)]
pub struct Metadata {
    pub name: String,
    pub readonly: bool,
    pub total_space: u64,
    pub free_space: u64,
    pub block_size: u32,
    pub total_nodes: u64,
    pub free_nodes: u64,
    pub fs_type: u64,
    pub no_async_cache: bool,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Metadata {
            name: name.into(),
            readonly: false,
            total_space: u64::MAX,
            free_space: u64::MAX,
            block_size: crate::stat::FS_BLOCK_SIZE,
            total_nodes: u64::MAX,
            free_nodes: u64::MAX,
            fs_type: FS_TYPE,
            no_async_cache: false,
        }
    }
}

/// A single entry returned by [`FileSystem::readdir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub file_type: FileType,
}

/// The interface every backend and composer implements: a path-oriented, credential-checked
/// file API. Paths passed in are always absolute and normalized by the caller (the mount
/// router, or a composer forwarding to its inner filesystem).
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Called once after construction; must resolve before any other method is called. Backed
    /// by a Store-backed filesystem this is typically a no-op once the root inode exists; for
    /// the async bridge this is where the sync mirror is populated.
    async fn ready(&self) -> Result<()>;

    async fn metadata(&self) -> Metadata;

    async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats>;

    async fn exists(&self, path: &str, cred: &Cred) -> bool {
        self.stat(path, cred).await.is_ok()
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>>;

    async fn create_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>>;

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> Result<()>;

    async fn rmdir(&self, path: &str, cred: &Cred) -> Result<()>;

    async fn unlink(&self, path: &str, cred: &Cred) -> Result<()>;

    async fn rename(&self, old_path: &str, new_path: &str, cred: &Cred) -> Result<()>;

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> Result<()>;

    async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>>;

    /// Flushes `data` and/or `stats` for an open file back to storage; the counterpart a
    /// [`FileHandle::sync`] calls into on the owning filesystem.
    async fn sync_file(
        &self,
        path: &str,
        data: Option<&[u8]>,
        stats: Option<&Stats>,
        cred: &Cred,
    ) -> Result<()>;
}

/// An open file: owns a byte buffer and a back-reference (via the methods below) to the
/// filesystem it was opened on. Writes are only guaranteed durable after [`FileHandle::sync`] or
/// [`FileHandle::close`] succeeds; callers must check that result rather than relying on `Drop`,
/// which can only best-effort flush and cannot surface an error.
#[async_trait]
pub trait FileHandle: Send + Sync + std::fmt::Debug {
    async fn read(&self, position: u64, len: usize) -> Result<Vec<u8>>;

    async fn write(&self, position: u64, data: &[u8]) -> Result<usize>;

    async fn stat(&self) -> Result<Stats>;

    async fn truncate(&self, len: u64) -> Result<()>;

    async fn chmod(&self, mode: u32) -> Result<()>;

    async fn chown(&self, uid: u32, gid: u32) -> Result<()>;

    /// Flushes buffered data and stat changes to the owning filesystem.
    async fn sync(&self) -> Result<()>;

    /// Flushes and releases the handle. Implementations should make this equivalent to
    /// `sync` followed by dropping the handle.
    async fn close(&self) -> Result<()>;
}

//! `LockedFS`: wraps any [`FileSystem`] behind a single FIFO mutex, serializing every operation.
//!
//! Tokio's [`Mutex`] queues waiters FIFO, which is what gives callers the "concurrent mutators
//! appear in a total order" guarantee without the composer doing any extra bookkeeping.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cred::Cred;
use crate::error::Result;
use crate::filesystem::{DirEntry, FileHandle, FileSystem, Metadata};
use crate::flags::OpenFlags;
use crate::stat::Stats;

pub struct LockedFs<F: FileSystem> {
    inner: F,
    lock: Mutex<()>,
}

impl<F: FileSystem> LockedFs<F> {
    pub fn new(inner: F) -> Self {
        Self { inner, lock: Mutex::new(()) }
    }
}

#[async_trait]
impl<F: FileSystem> FileSystem for LockedFs<F> {
    async fn ready(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.ready().await
    }

    async fn metadata(&self) -> Metadata {
        let _guard = self.lock.lock().await;
        self.inner.metadata().await
    }

    async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats> {
        let _guard = self.lock.lock().await;
        self.inner.stat(path, cred).await
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        let _guard = self.lock.lock().await;
        self.inner.open_file(path, flags, cred).await
    }

    async fn create_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        let _guard = self.lock.lock().await;
        self.inner.create_file(path, flags, mode, cred).await
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.mkdir(path, mode, cred).await
    }

    async fn rmdir(&self, path: &str, cred: &Cred) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.rmdir(path, cred).await
    }

    async fn unlink(&self, path: &str, cred: &Cred) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.unlink(path, cred).await
    }

    async fn rename(&self, old_path: &str, new_path: &str, cred: &Cred) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.rename(old_path, new_path, cred).await
    }

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.link(src, dst, cred).await
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
        let _guard = self.lock.lock().await;
        self.inner.readdir(path, cred).await
    }

    async fn sync_file(
        &self,
        path: &str,
        data: Option<&[u8]>,
        stats: Option<&Stats>,
        cred: &Cred,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.inner.sync_file(path, data, stats, cred).await
    }
}

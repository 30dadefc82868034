//! `StoreFs`: a [`FileSystem`] backed by a generic key/value [`Store`], one file per operation —
//! mirroring how a real on-disk filesystem driver is usually laid out.

mod alloc;
mod file;
mod getattr;
mod internal;
mod link;
mod mkdir;
mod readdir;
mod rename;
mod rmdir;
mod unlink;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::filesystem::{DirEntry, FileHandle, FileSystem, Metadata};
use crate::flags::OpenFlags;
use crate::inode::{self, Ino};
use crate::stat::{Stats, S_IFDIR};
use crate::store::{Store, StoreKey};

use self::internal::{now_ms, read_stats};

/// Traces an error once at the point it leaves the store-backed implementation, then returns it
/// unchanged. Composers above this layer propagate the same error without re-tracing it.
fn traced<T>(op: &'static str, path: &str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        warn!(op, path, error = %err, "store-backed operation failed");
    }
    result
}

fn trace_err(op: &'static str, path: &str, err: Error) -> Error {
    warn!(op, path, error = %err, "store-backed operation failed");
    err
}

/// A filesystem whose entire state — every inode's stat record and data blob — lives in one
/// [`Store`]. Paths are resolved fresh against the store on every call; nothing is cached
/// in-process, so two `StoreFs` handles on the same store observe each other's writes
/// immediately.
pub struct StoreFs<S: Store> {
    store: Arc<S>,
    name: String,
}

impl<S: Store + 'static> StoreFs<S> {
    pub fn new(store: S, name: impl Into<String>) -> Self {
        Self { store: Arc::new(store), name: name.into() }
    }

    /// Creates the root inode if it doesn't already exist. Idempotent: calling this on an
    /// already-initialized store is a no-op.
    #[instrument(skip(self))]
    async fn ensure_root(&self) -> Result<()> {
        let mut txn = self.store.begin_transaction().await?;
        let exists = txn.get(StoreKey::Record(Ino::ROOT)).await?.is_some();
        if exists {
            txn.abort().await?;
            return Ok(());
        }
        let stats = Stats::new(Ino::ROOT.0, S_IFDIR | 0o755, 0, 0, now_ms());
        txn.put(StoreKey::Record(Ino::ROOT), inode::encode_record(&stats), false).await?;
        txn.put(StoreKey::Data(Ino::ROOT), Vec::new(), false).await?;
        txn.commit().await
    }
}

#[async_trait]
impl<S: Store + 'static> FileSystem for StoreFs<S> {
    async fn ready(&self) -> Result<()> {
        self.ensure_root().await
    }

    async fn metadata(&self) -> Metadata {
        Metadata::new(self.name.clone())
    }

    async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats> {
        traced("stat", path, getattr::stat(&*self.store, path, cred).await)
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        traced("open_file", path, file::open_file(&self.store, path, flags, cred).await)
    }

    async fn create_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        traced("create_file", path, file::create_file(&self.store, path, flags, mode, cred).await)
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> Result<()> {
        traced("mkdir", path, mkdir::mkdir(&*self.store, path, mode, cred).await)
    }

    async fn rmdir(&self, path: &str, cred: &Cred) -> Result<()> {
        traced("rmdir", path, rmdir::rmdir(&*self.store, path, cred).await)
    }

    async fn unlink(&self, path: &str, cred: &Cred) -> Result<()> {
        traced("unlink", path, unlink::unlink(&*self.store, path, cred).await)
    }

    async fn rename(&self, old_path: &str, new_path: &str, cred: &Cred) -> Result<()> {
        traced("rename", old_path, rename::rename(&*self.store, old_path, new_path, cred).await)
    }

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> Result<()> {
        traced("link", src, link::link(&*self.store, src, dst, cred).await)
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
        traced("readdir", path, readdir::readdir(&*self.store, path, cred).await)
    }

    async fn sync_file(
        &self,
        path: &str,
        data: Option<&[u8]>,
        stats: Option<&Stats>,
        cred: &Cred,
    ) -> Result<()> {
        let mut txn = self.store.begin_transaction().await?;
        let ino = match internal::resolve(txn.as_mut(), path).await {
            Ok(ino) => ino,
            Err(err) => {
                txn.abort().await?;
                return Err(trace_err("sync_file", path, err));
            }
        };
        let existing = match read_stats(txn.as_mut(), ino).await {
            Ok(stats) => stats,
            Err(err) => {
                txn.abort().await?;
                return Err(trace_err("sync_file", path, err));
            }
        };
        if !existing.has_access(crate::stat::AccessMode::WRITE, cred) {
            txn.abort().await?;
            return Err(trace_err("sync_file", path, crate::error::Error::access(format!("no write access to {path}"))));
        }
        txn.abort().await?;
        traced("sync_file", path, file::sync_ino(&*self.store, ino, data, stats).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RawStore, SimpleStore};
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    struct MapStore(RwLock<HashMap<u64, Vec<u8>>>);

    #[async_trait]
    impl RawStore for MapStore {
        async fn raw_get(&self, key: u64) -> Result<Option<Vec<u8>>> {
            Ok(self.0.read().await.get(&key).cloned())
        }
        async fn raw_put(&self, key: u64, bytes: Vec<u8>, _overwrite: bool) -> Result<bool> {
            self.0.write().await.insert(key, bytes);
            Ok(true)
        }
        async fn raw_delete(&self, key: u64) -> Result<()> {
            self.0.write().await.remove(&key);
            Ok(())
        }
        async fn raw_entries(&self) -> Result<Vec<u64>> {
            Ok(self.0.read().await.keys().copied().collect())
        }
    }

    fn fs() -> StoreFs<SimpleStore<MapStore>> {
        StoreFs::new(SimpleStore::new(MapStore(RwLock::new(HashMap::new()))), "test")
    }

    #[tokio::test]
    async fn ready_creates_root_once() {
        let fs = fs();
        fs.ready().await.unwrap();
        fs.ready().await.unwrap();
        let root = fs.stat("/", &Cred::ROOT).await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn mkdir_then_readdir_sees_entry() {
        let fs = fs();
        fs.ready().await.unwrap();
        fs.mkdir("/docs", 0o755, &Cred::ROOT).await.unwrap();
        let entries = fs.readdir("/", &Cred::ROOT).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "docs");
    }

    #[tokio::test]
    async fn create_write_sync_read_round_trips() {
        let fs = fs();
        fs.ready().await.unwrap();
        let handle = fs
            .create_file("/hello.txt", OpenFlags::parse("w").unwrap(), 0o644, &Cred::ROOT)
            .await
            .unwrap();
        handle.write(0, b"hello world").await.unwrap();
        handle.sync().await.unwrap();

        let reopened =
            fs.open_file("/hello.txt", OpenFlags::parse("r").unwrap(), &Cred::ROOT).await.unwrap();
        let data = reopened.read(0, 64).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn unlink_removes_file() {
        let fs = fs();
        fs.ready().await.unwrap();
        fs.create_file("/a", OpenFlags::parse("w").unwrap(), 0o644, &Cred::ROOT).await.unwrap();
        fs.unlink("/a", &Cred::ROOT).await.unwrap();
        assert!(!fs.exists("/a", &Cred::ROOT).await);
    }
}

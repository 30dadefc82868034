//! Open file handles: byte-range read/write buffered in memory between explicit `sync`s.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::filesystem::FileHandle;
use crate::flags::OpenFlags;
use crate::inode::{self, Ino};
use crate::stat::{AccessMode, Stats, S_IFREG};
use crate::store::{Store, StoreKey};

use super::internal::{now_ms, read_dir_entries, read_stats, resolve, resolve_parent, write_dir_entries};

#[instrument(skip(store, cred), fields(path = path))]
pub async fn open_file<S: Store + 'static>(
    store: &Arc<S>,
    path: &str,
    flags: OpenFlags,
    cred: &Cred,
) -> Result<Box<dyn FileHandle>> {
    let mut txn = store.begin_transaction().await?;
    let result = async {
        let ino = resolve(txn.as_mut(), path).await?;
        let stats = read_stats(txn.as_mut(), ino).await?;
        if stats.is_dir() {
            return Err(Error::is_dir(format!("{path} is a directory")));
        }
        if flags.read && !stats.has_access(AccessMode::READ, cred) {
            return Err(Error::access(format!("no read access to {path}")));
        }
        if flags.write && !stats.has_access(AccessMode::WRITE, cred) {
            return Err(Error::access(format!("no write access to {path}")));
        }
        let data = txn.get(StoreKey::Data(ino)).await?.unwrap_or_default();
        Ok((ino, stats, data))
    }
    .await;
    txn.abort().await?;
    let (ino, mut stats, mut data) = result?;

    if flags.truncate {
        data.clear();
        stats.size = 0;
    }

    debug!(ino = ino.0, "opened file handle");
    Ok(Box::new(StoreFileHandle {
        store: Arc::clone(store),
        ino,
        append: flags.append,
        buffer: Mutex::new(Buffered { data, stats, dirty: flags.truncate }),
    }))
}

#[instrument(skip(store, cred), fields(path = path))]
pub async fn create_file<S: Store + 'static>(
    store: &Arc<S>,
    path: &str,
    flags: OpenFlags,
    mode: u32,
    cred: &Cred,
) -> Result<Box<dyn FileHandle>> {
    let mut txn = store.begin_transaction().await?;
    let outcome = async {
        let (parent_ino, name) = resolve_parent(txn.as_mut(), path).await?;
        let parent_stats = read_stats(txn.as_mut(), parent_ino).await?;
        if !parent_stats.has_access(AccessMode::WRITE, cred) {
            return Err(Error::access(format!("no write access to parent of {path}")));
        }

        let mut entries = read_dir_entries(txn.as_mut(), parent_ino).await?;
        if let Some(&existing_ino) = entries.get(name) {
            if flags.exclusive {
                return Err(Error::exist(format!("{path} already exists")));
            }
            let stats = read_stats(txn.as_mut(), existing_ino).await?;
            let data = txn.get(StoreKey::Data(existing_ino)).await?.unwrap_or_default();
            return Ok((existing_ino, stats, data));
        }

        let new_ino = super::alloc::allocate(txn.as_mut()).await?;
        let stats = Stats::new(new_ino.0, (mode & 0o7777) | S_IFREG, cred.euid, cred.egid, now_ms());
        txn.put(StoreKey::Record(new_ino), inode::encode_record(&stats), false).await?;
        txn.put(StoreKey::Data(new_ino), Vec::new(), false).await?;
        entries.insert(name.to_string(), new_ino);
        write_dir_entries(txn.as_mut(), parent_ino, &entries).await?;
        Ok((new_ino, stats, Vec::new()))
    }
    .await;

    match outcome {
        Ok((ino, mut stats, mut data)) => {
            txn.commit().await?;
            debug!(ino = ino.0, "opened file for creation");
            if flags.truncate {
                data.clear();
                stats.size = 0;
            }
            Ok(Box::new(StoreFileHandle {
                store: Arc::clone(store),
                ino,
                append: flags.append,
                buffer: Mutex::new(Buffered { data, stats, dirty: flags.truncate }),
            }) as Box<dyn FileHandle>)
        }
        Err(err) => {
            txn.abort().await?;
            warn!(error = %err, "create_file aborted");
            Err(err)
        }
    }
}

/// Flushes `data`/`stats` for `ino` back to the store; called both by [`FileHandle::sync`] and
/// directly by composers that need to push stat-only changes (e.g. `chmod` on a closed path).
pub async fn sync_ino<S: Store>(
    store: &S,
    ino: Ino,
    data: Option<&[u8]>,
    stats: Option<&Stats>,
) -> Result<()> {
    let mut txn = store.begin_transaction().await?;
    let outcome: Result<()> = async {
        if let Some(data) = data {
            txn.put(StoreKey::Data(ino), data.to_vec(), true).await?;
        }
        if let Some(stats) = stats {
            txn.put(StoreKey::Record(ino), inode::encode_record(stats), true).await?;
        }
        Ok(())
    }
    .await;
    match outcome {
        Ok(()) => txn.commit().await,
        Err(err) => {
            txn.abort().await?;
            Err(err)
        }
    }
}

struct Buffered {
    data: Vec<u8>,
    stats: Stats,
    dirty: bool,
}

struct StoreFileHandle<S: Store + 'static> {
    store: Arc<S>,
    ino: Ino,
    append: bool,
    buffer: Mutex<Buffered>,
}

impl<S: Store + 'static> std::fmt::Debug for StoreFileHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreFileHandle")
            .field("ino", &self.ino)
            .field("append", &self.append)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: Store + 'static> FileHandle for StoreFileHandle<S> {
    async fn read(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        let buffer = self.buffer.lock().await;
        let start = position as usize;
        if start >= buffer.data.len() {
            return Ok(Vec::new());
        }
        let end = std::cmp::min(start + len, buffer.data.len());
        Ok(buffer.data[start..end].to_vec())
    }

    async fn write(&self, position: u64, data: &[u8]) -> Result<usize> {
        let mut buffer = self.buffer.lock().await;
        let position = if self.append { buffer.data.len() as u64 } else { position };
        let start = position as usize;
        let end = start + data.len();
        if buffer.data.len() < end {
            buffer.data.resize(end, 0);
        }
        buffer.data[start..end].copy_from_slice(data);
        buffer.stats.size = buffer.data.len() as u64;
        buffer.stats.mtime_ms = now_ms();
        buffer.stats.ctime_ms = buffer.stats.mtime_ms;
        buffer.dirty = true;
        Ok(data.len())
    }

    async fn stat(&self) -> Result<Stats> {
        Ok(self.buffer.lock().await.stats)
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        buffer.data.resize(len as usize, 0);
        buffer.stats.size = len;
        buffer.stats.mtime_ms = now_ms();
        buffer.stats.ctime_ms = buffer.stats.mtime_ms;
        buffer.dirty = true;
        Ok(())
    }

    async fn chmod(&self, mode: u32) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        let type_bits = buffer.stats.mode & crate::stat::S_IFMT;
        buffer.stats.mode = type_bits | (mode & 0o7777);
        buffer.stats.ctime_ms = now_ms();
        buffer.dirty = true;
        Ok(())
    }

    async fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        buffer.stats.uid = uid;
        buffer.stats.gid = gid;
        buffer.stats.ctime_ms = now_ms();
        buffer.dirty = true;
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        if !buffer.dirty {
            return Ok(());
        }
        sync_ino(&*self.store, self.ino, Some(&buffer.data), Some(&buffer.stats)).await?;
        buffer.dirty = false;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.sync().await
    }
}

impl<S: Store + 'static> Drop for StoreFileHandle<S> {
    /// Best-effort flush for a handle dropped without an explicit `close`/`sync`. Errors are
    /// discarded since `Drop` has no way to surface them; callers that need to observe a flush
    /// failure must still call `close`/`sync` themselves.
    fn drop(&mut self) {
        let Ok(mut buffer) = self.buffer.try_lock() else { return };
        if !buffer.dirty {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else { return };
        let store = Arc::clone(&self.store);
        let ino = self.ino;
        let data = std::mem::take(&mut buffer.data);
        let stats = buffer.stats;
        buffer.dirty = false;
        drop(buffer);
        handle.spawn(async move {
            let _ = sync_ino(&*store, ino, Some(&data), Some(&stats)).await;
        });
    }
}

//! The minimal byte key/value [`Store`] interface [`crate::store_fs::StoreFs`] is built on, plus
//! the `SimpleStore` adapter that gives a non-transactional store the same interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;
use crate::inode::Ino;

/// Logical key into a [`Store`]: each inode owns one record key (its [`crate::stat::Stats`])
/// and one data key (file bytes, or a directory's encoded `name -> ino` map).
///
/// The data model only requires that both can be written atomically within one transaction;
/// [`StoreKey::fuse`] is how an implementation backed by a flat byte-keyed map (like
/// [`SimpleStore`]) fuses the two logical keys into one key space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Record(Ino),
    Data(Ino),
    /// Reserved key holding the monotonic inode allocator counter (see
    /// `crate::store_fs::alloc`). Not associated with any real inode.
    Allocator,
}

impl StoreKey {
    pub fn ino(self) -> Option<Ino> {
        match self {
            StoreKey::Record(ino) | StoreKey::Data(ino) => Some(ino),
            StoreKey::Allocator => None,
        }
    }

    /// Maps this logical key onto a single `u64` key space: the low bit distinguishes record
    /// from data for real inodes; the reserved all-ones key is set aside for the allocator
    /// counter, which no real `Ino` can reach (inode numbers stay below `u64::MAX / 2`).
    pub fn fuse(self) -> u64 {
        match self {
            StoreKey::Record(ino) => ino.0 << 1,
            StoreKey::Data(ino) => (ino.0 << 1) | 1,
            StoreKey::Allocator => u64::MAX,
        }
    }
}

/// A transaction in progress against a [`Store`]. Every mutation [`crate::store_fs::StoreFs`]
/// performs is wrapped in exactly one transaction spanning all affected inodes; dropping a
/// transaction without committing it must behave as [`Transaction::abort`].
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, key: StoreKey) -> Result<Option<Vec<u8>>>;
    async fn put(&mut self, key: StoreKey, bytes: Vec<u8>, overwrite: bool) -> Result<bool>;
    async fn delete(&mut self, key: StoreKey) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Byte key/value store with optional native transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: StoreKey) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: StoreKey, bytes: Vec<u8>, overwrite: bool) -> Result<bool>;
    async fn delete(&self, key: StoreKey) -> Result<()>;
    async fn entries(&self) -> Result<Vec<StoreKey>>;
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// A flat, non-transactional byte map: `get`/`put`/`delete`/`entries` only, no atomicity of its
/// own. [`SimpleStore`] wraps one of these to provide the full [`Store`] contract.
#[async_trait]
pub trait RawStore: Send + Sync {
    async fn raw_get(&self, key: u64) -> Result<Option<Vec<u8>>>;
    async fn raw_put(&self, key: u64, bytes: Vec<u8>, overwrite: bool) -> Result<bool>;
    async fn raw_delete(&self, key: u64) -> Result<()>;
    async fn raw_entries(&self) -> Result<Vec<u64>>;
}

/// Adapts a non-transactional [`RawStore`] into a full [`Store`]: writes made through a
/// [`SimpleTransaction`] are buffered in memory and applied on [`Transaction::commit`], discarded
/// entirely on [`Transaction::abort`].
///
/// The critical section (an async [`Mutex`] held for the whole transaction, from
/// [`Store::begin_transaction`] through `commit`/`abort`) is what gives two transactions
/// serializable semantics, per the concurrency model: the simple adapter provides this by
/// coalescing the entire read-check-buffer-commit sequence into a single in-memory section rather
/// than by any cleverness in the underlying map. Only one transaction is in flight at a time; a
/// second `begin_transaction` call waits for the first to commit or abort before it can observe or
/// buffer anything.
pub struct SimpleStore<S: RawStore> {
    inner: Arc<S>,
    commit_lock: Arc<Mutex<()>>,
}

impl<S: RawStore> SimpleStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner: Arc::new(inner), commit_lock: Arc::new(Mutex::new(())) }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[derive(Clone)]
enum BufferedOp {
    Put { bytes: Vec<u8>, overwrite: bool },
    Delete,
}

/// Transaction handle returned by [`SimpleStore::begin_transaction`]. Owns an `Arc` clone of the
/// store rather than borrowing it, so it satisfies the `'static` [`Transaction`] trait object
/// contract while still sharing the same backing map. Holds the store's commit lock for its
/// entire lifetime, acquired before the transaction is handed to the caller and released only on
/// `commit`/`abort` (or drop), so nothing else can observe or buffer a write while this
/// transaction is open.
pub struct SimpleTransaction<S: RawStore> {
    inner: Arc<S>,
    _lock: OwnedMutexGuard<()>,
    buffer: StdMutex<HashMap<u64, BufferedOp>>,
}

#[async_trait]
impl<S: RawStore + 'static> Transaction for SimpleTransaction<S> {
    async fn get(&mut self, key: StoreKey) -> Result<Option<Vec<u8>>> {
        let fused = key.fuse();
        if let Some(op) = self.buffer.lock().unwrap().get(&fused) {
            return Ok(match op {
                BufferedOp::Put { bytes, .. } => Some(bytes.clone()),
                BufferedOp::Delete => None,
            });
        }
        self.inner.raw_get(fused).await
    }

    async fn put(&mut self, key: StoreKey, bytes: Vec<u8>, overwrite: bool) -> Result<bool> {
        let fused = key.fuse();
        // Safe to check-then-buffer without re-locking: this transaction already holds the
        // store's commit lock for its entire lifetime, so no other transaction or direct
        // `Store::put`/`delete` call can observe or mutate state concurrently.
        let existing = self.get(key).await?;
        if existing.is_some() && !overwrite {
            return Ok(false);
        }
        self.buffer.lock().unwrap().insert(fused, BufferedOp::Put { bytes, overwrite });
        Ok(true)
    }

    async fn delete(&mut self, key: StoreKey) -> Result<()> {
        self.buffer.lock().unwrap().insert(key.fuse(), BufferedOp::Delete);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let buffered = self.buffer.into_inner().unwrap();
        for (key, op) in buffered {
            match op {
                BufferedOp::Put { bytes, overwrite } => {
                    self.inner.raw_put(key, bytes, overwrite).await?;
                }
                BufferedOp::Delete => {
                    self.inner.raw_delete(key).await?;
                }
            }
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        // Buffered writes are simply dropped; the backing store was never touched.
        Ok(())
    }
}

#[async_trait]
impl<S: RawStore + 'static> Store for SimpleStore<S> {
    async fn get(&self, key: StoreKey) -> Result<Option<Vec<u8>>> {
        self.inner.raw_get(key.fuse()).await
    }

    async fn put(&self, key: StoreKey, bytes: Vec<u8>, overwrite: bool) -> Result<bool> {
        let _guard = self.commit_lock.lock().await;
        self.inner.raw_put(key.fuse(), bytes, overwrite).await
    }

    async fn delete(&self, key: StoreKey) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        self.inner.raw_delete(key.fuse()).await
    }

    async fn entries(&self) -> Result<Vec<StoreKey>> {
        let raw = self.inner.raw_entries().await?;
        Ok(raw
            .into_iter()
            .map(|key| {
                if key == u64::MAX {
                    return StoreKey::Allocator;
                }
                let ino = Ino(key >> 1);
                if key & 1 == 0 {
                    StoreKey::Record(ino)
                } else {
                    StoreKey::Data(ino)
                }
            })
            .collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let lock = Arc::clone(&self.commit_lock).lock_owned().await;
        Ok(Box::new(SimpleTransaction {
            inner: Arc::clone(&self.inner),
            _lock: lock,
            buffer: StdMutex::new(HashMap::new()),
        }))
    }
}

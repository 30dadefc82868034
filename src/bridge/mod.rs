//! `AsyncBridge`: preloads an async-only backend into an in-memory mirror, then serves reads
//! straight from the mirror and pipelines mutations back to the backend in FIFO order.
//!
//! Every method on this crate's [`FileSystem`] trait is already `async`, so "sync" here does not
//! mean non-`async fn` — it means "answered from the local mirror without waiting on the
//! backend". That is the behavior this composer gives every other composer and the mount router.

mod queue;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, instrument, warn};

use crate::backends::memory::MemoryStore;
use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::filesystem::{DirEntry, FileHandle, FileSystem, Metadata};
use crate::flags::OpenFlags;
use crate::stat::{FileType, Stats};
use crate::store::SimpleStore;
use crate::store_fs::StoreFs;

use queue::Op;

struct BridgeState {
    pending: usize,
    latched_error: Option<Error>,
}

/// Shared handle onto the write-back queue, cloned into every [`BridgeHandle`] so a write made
/// through an open file (not just a top-level `FileSystem` mutator) is pipelined too.
#[derive(Clone)]
struct QueueHandle {
    sender: mpsc::UnboundedSender<Op>,
    state: Arc<Mutex<BridgeState>>,
    notify: Arc<Notify>,
}

impl QueueHandle {
    async fn push(&self, op: Op) {
        self.state.lock().await.pending += 1;
        let _ = self.sender.send(op);
    }

    async fn take_latched_error(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.latched_error.take() {
            return Err(err);
        }
        Ok(())
    }

    async fn queue_done(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            if self.state.lock().await.pending == 0 {
                break;
            }
            notified.await;
        }
        self.take_latched_error().await
    }
}

/// Spawns the FIFO driver task: dequeues operations and awaits each against the backend before
/// starting the next, latching the first failure it observes.
fn spawn_driver(backend: Arc<dyn FileSystem>, mut receiver: mpsc::UnboundedReceiver<Op>, queue: QueueHandle) {
    tokio::spawn(async move {
        while let Some(op) = receiver.recv().await {
            debug!("dequeued operation for async backend replay");
            let result = queue::apply(backend.as_ref(), &op).await;
            let mut guard = queue.state.lock().await;
            if let Err(err) = result {
                warn!(error = %err, "queued async operation failed, latching error");
                if guard.latched_error.is_none() {
                    guard.latched_error = Some(err);
                }
            }
            guard.pending = guard.pending.saturating_sub(1);
            let pending = guard.pending;
            drop(guard);
            if pending == 0 {
                queue.notify.notify_waiters();
            }
        }
    });
}

/// Bridges an async backend to sync-shaped call sites. `disable_async_cache` makes every
/// operation fail `ENOTSUP` instead of touching the mirror, matching the configuration knob of
/// the same name.
pub struct AsyncBridge {
    mirror: Arc<dyn FileSystem>,
    backend: Arc<dyn FileSystem>,
    queue: QueueHandle,
    disable_async_cache: bool,
}

impl AsyncBridge {
    pub fn new(backend: Arc<dyn FileSystem>, disable_async_cache: bool) -> Self {
        let mirror: Arc<dyn FileSystem> =
            Arc::new(StoreFs::new(SimpleStore::new(MemoryStore::new()), "bridge-mirror"));
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = QueueHandle {
            sender,
            state: Arc::new(Mutex::new(BridgeState { pending: 0, latched_error: None })),
            notify: Arc::new(Notify::new()),
        };
        spawn_driver(Arc::clone(&backend), receiver, queue.clone());
        Self { mirror, backend, queue, disable_async_cache }
    }

    fn check_enabled(&self) -> Result<()> {
        if self.disable_async_cache {
            return Err(Error::not_supported("async cache is disabled for this mount"));
        }
        Ok(())
    }

    /// Resolves once every operation enqueued so far has been awaited against the backend.
    /// Callers that need durability (rather than just mirror-visible results) must call this
    /// before trusting a mutation persisted.
    pub async fn queue_done(&self) -> Result<()> {
        self.queue.queue_done().await
    }

    async fn cross_copy(&self, path: &str, cred: &Cred) -> Result<()> {
        let entries = match self.backend.readdir(path, cred).await {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries {
            let child = crate::path::join(path, &entry.name);
            let stats = self.backend.stat(&child, cred).await?;
            match entry.file_type {
                FileType::Directory => {
                    let _ = self.mirror.mkdir(&child, stats.permission_bits(), cred).await;
                    Box::pin(self.cross_copy(&child, cred)).await?;
                }
                _ => {
                    let source = self.backend.open_file(&child, OpenFlags::parse("r")?, cred).await?;
                    let data = source.read(0, stats.size as usize).await?;
                    let _ = source.close().await;
                    let dest = self
                        .mirror
                        .create_file(&child, OpenFlags::parse("w")?, stats.permission_bits(), cred)
                        .await?;
                    dest.write(0, &data).await?;
                    dest.close().await?;
                }
            }
        }
        Ok(())
    }

    fn wrap_handle(&self, path: &str, cred: &Cred, inner: Box<dyn FileHandle>) -> Box<dyn FileHandle> {
        Box::new(BridgeHandle {
            inner: Arc::from(inner),
            queue: self.queue.clone(),
            path: path.to_string(),
            cred: *cred,
        })
    }
}

#[async_trait]
impl FileSystem for AsyncBridge {
    #[instrument(skip(self))]
    async fn ready(&self) -> Result<()> {
        self.queue.take_latched_error().await?;
        self.backend.ready().await?;
        self.mirror.ready().await?;
        self.cross_copy("/", &Cred::ROOT).await?;
        debug!("cross-copied async backend into sync mirror");
        Ok(())
    }

    async fn metadata(&self) -> Metadata {
        let mut metadata = self.mirror.metadata().await;
        metadata.no_async_cache = self.disable_async_cache;
        metadata
    }

    async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.stat(path, cred).await
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        let inner = self.mirror.open_file(path, flags, cred).await?;
        Ok(self.wrap_handle(path, cred, inner))
    }

    async fn create_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        let inner = self.mirror.create_file(path, flags, mode, cred).await?;
        Ok(self.wrap_handle(path, cred, inner))
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> Result<()> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.mkdir(path, mode, cred).await?;
        self.queue.push(Op::Mkdir { path: path.to_string(), mode, cred: *cred }).await;
        Ok(())
    }

    async fn rmdir(&self, path: &str, cred: &Cred) -> Result<()> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.rmdir(path, cred).await?;
        self.queue.push(Op::Rmdir { path: path.to_string(), cred: *cred }).await;
        Ok(())
    }

    async fn unlink(&self, path: &str, cred: &Cred) -> Result<()> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.unlink(path, cred).await?;
        self.queue.push(Op::Unlink { path: path.to_string(), cred: *cred }).await;
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str, cred: &Cred) -> Result<()> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.rename(old_path, new_path, cred).await?;
        self.queue
            .push(Op::Rename {
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
                cred: *cred,
            })
            .await;
        Ok(())
    }

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> Result<()> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.link(src, dst, cred).await?;
        self.queue.push(Op::Link { src: src.to_string(), dst: dst.to_string(), cred: *cred }).await;
        Ok(())
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.readdir(path, cred).await
    }

    async fn sync_file(
        &self,
        path: &str,
        data: Option<&[u8]>,
        stats: Option<&Stats>,
        cred: &Cred,
    ) -> Result<()> {
        self.check_enabled()?;
        self.queue.take_latched_error().await?;
        self.mirror.sync_file(path, data, stats, cred).await?;
        if let Some(data) = data {
            let current_stats = self.mirror.stat(path, cred).await?;
            self.queue.push(queue::write_op(path, data.to_vec(), &current_stats, *cred)).await;
        }
        Ok(())
    }
}

/// Wraps a mirror-backed [`FileHandle`]: reads and in-memory mutations forward to the mirror
/// untouched, while `sync`/`close` additionally pipeline the handle's current bytes back to the
/// async backend.
struct BridgeHandle {
    /// `Arc` rather than `Box` so `Drop` can clone a handle onto a spawned best-effort flush task
    /// without needing ownership of `self`.
    inner: Arc<dyn FileHandle>,
    queue: QueueHandle,
    path: String,
    cred: Cred,
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("path", &self.path)
            .field("cred", &self.cred)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FileHandle for BridgeHandle {
    async fn read(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        self.inner.read(position, len).await
    }

    async fn write(&self, position: u64, data: &[u8]) -> Result<usize> {
        self.inner.write(position, data).await
    }

    async fn stat(&self) -> Result<Stats> {
        self.inner.stat().await
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        self.inner.truncate(len).await
    }

    async fn chmod(&self, mode: u32) -> Result<()> {
        self.inner.chmod(mode).await
    }

    async fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        self.inner.chown(uid, gid).await
    }

    async fn sync(&self) -> Result<()> {
        self.inner.sync().await?;
        let stats = self.inner.stat().await?;
        let data = self.inner.read(0, stats.size as usize).await?;
        self.queue.push(queue::write_op(&self.path, data, &stats, self.cred)).await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.sync().await
    }
}

impl Drop for BridgeHandle {
    /// Best-effort flush for a handle dropped without an explicit `close`/`sync`: spawns the same
    /// sync-then-enqueue sequence `sync` runs, discarding the result since `Drop` cannot surface
    /// an error. A no-op if dropped outside a Tokio runtime.
    fn drop(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else { return };
        let inner = Arc::clone(&self.inner);
        let queue = self.queue.clone();
        let path = self.path.clone();
        let cred = self.cred;
        handle.spawn(async move {
            let result: Result<()> = async {
                inner.sync().await?;
                let stats = inner.stat().await?;
                let data = inner.read(0, stats.size as usize).await?;
                queue.push(queue::write_op(&path, data, &stats, cred)).await;
                Ok(())
            }
            .await;
            let _ = result;
        });
    }
}

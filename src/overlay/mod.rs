//! `OverlayFs`: a writable layer composed over a read-only layer, with a durable deletion log
//! recording names hidden from the readable layer.

mod deletion_log;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, ErrorKind, Result};
use crate::filesystem::{DirEntry, FileHandle, FileSystem, Metadata};
use crate::flags::OpenFlags;
use crate::stat::Stats;

/// Path the deletion log is stored at on the writable layer. Every operation targeting this
/// path directly is rejected with `EPERM`; it is an implementation detail of the overlay, not a
/// file the overlay exposes.
const DELETION_LOG_PATH: &str = "/.deleted";

struct OverlayState {
    deleted: BTreeSet<String>,
    flushing: bool,
    dirty: bool,
    latched_error: Option<Error>,
}

/// Composes a writable [`FileSystem`] over a read-only one. Reads fall through to the readable
/// layer when a path isn't present on the writable layer; writes always land on the writable
/// layer; deletions of readable-layer-only paths are recorded in a durable log rather than
/// mutating the readable layer (which this composer never writes to).
pub struct OverlayFs {
    writable: Arc<dyn FileSystem>,
    readable: Arc<dyn FileSystem>,
    state: Arc<Mutex<OverlayState>>,
}

impl OverlayFs {
    pub fn new(writable: Arc<dyn FileSystem>, readable: Arc<dyn FileSystem>) -> Self {
        Self {
            writable,
            readable,
            state: Arc::new(Mutex::new(OverlayState {
                deleted: BTreeSet::new(),
                flushing: false,
                dirty: false,
                latched_error: None,
            })),
        }
    }

    fn reject_protected_path(path: &str) -> Result<()> {
        if path == DELETION_LOG_PATH {
            return Err(Error::not_permitted(format!("{DELETION_LOG_PATH} is reserved")));
        }
        Ok(())
    }

    /// Surfaces a previously latched deletion-log flush error exactly once, then clears it.
    async fn take_latched_error(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.latched_error.take() {
            warn!(error = %err, "surfacing latched deletion-log flush error");
            return Err(err);
        }
        Ok(())
    }

    async fn is_deleted(&self, path: &str) -> bool {
        self.state.lock().await.deleted.contains(path)
    }

    /// Schedules a flush of the deletion log. At most one flush runs at a time; a deletion that
    /// arrives while a flush is in flight just sets the dirty flag, which the in-flight flush
    /// rechecks before returning — so this is fire-and-forget from the caller's perspective.
    fn trigger_flush(&self) {
        let state = Arc::clone(&self.state);
        let writable = Arc::clone(&self.writable);
        tokio::spawn(async move {
            loop {
                {
                    let mut guard = state.lock().await;
                    if guard.flushing {
                        guard.dirty = true;
                        return;
                    }
                    guard.flushing = true;
                    guard.dirty = false;
                }
                let snapshot = state.lock().await.deleted.clone();
                let bytes = deletion_log::serialize(&snapshot);
                debug!(entries = snapshot.len(), "flushing deletion log");
                let result = flush_to(writable.as_ref(), &bytes).await;

                let mut guard = state.lock().await;
                guard.flushing = false;
                match result {
                    Ok(()) => debug!("deletion log flush succeeded"),
                    Err(err) => {
                        warn!(error = %err, "deletion log flush failed, latching error");
                        guard.latched_error = Some(err);
                    }
                }
                if !guard.dirty {
                    break;
                }
            }
        });
    }

    async fn load_deletion_log(&self) -> Result<BTreeSet<String>> {
        match self.writable.open_file(DELETION_LOG_PATH, OpenFlags::parse("r")?, &Cred::ROOT).await {
            Ok(handle) => {
                let stats = handle.stat().await?;
                let bytes = handle.read(0, stats.size as usize).await?;
                Ok(deletion_log::parse(&bytes))
            }
            Err(err) if err.kind() == ErrorKind::NoEntry => Ok(BTreeSet::new()),
            Err(err) => Err(err),
        }
    }

    /// Creates any missing ancestor directories of `path` on the writable layer, copying each
    /// one's permission bits from the readable layer when present.
    async fn ensure_parents_on_writable(&self, path: &str, cred: &Cred) -> Result<()> {
        let Some(dir) = crate::path::dirname(path) else { return Ok(()) };
        if dir == "/" {
            return Ok(());
        }
        let mut current = String::new();
        for component in crate::path::components(dir) {
            current = crate::path::join(&current, component);
            if self.writable.exists(&current, cred).await {
                continue;
            }
            let mode = match self.readable.stat(&current, cred).await {
                Ok(stats) => stats.permission_bits(),
                Err(_) => 0o755,
            };
            self.writable.mkdir(&current, mode, cred).await?;
        }
        Ok(())
    }
}

async fn flush_to(writable: &dyn FileSystem, bytes: &[u8]) -> Result<()> {
    let handle = writable
        .create_file(DELETION_LOG_PATH, OpenFlags::parse("w")?, 0o600, &Cred::ROOT)
        .await?;
    handle.write(0, bytes).await?;
    handle.close().await
}

#[async_trait]
impl FileSystem for OverlayFs {
    #[instrument(skip(self))]
    async fn ready(&self) -> Result<()> {
        self.writable.ready().await?;
        self.readable.ready().await?;
        let deleted = self.load_deletion_log().await?;
        debug!(entries = deleted.len(), "loaded deletion log");
        self.state.lock().await.deleted = deleted;
        Ok(())
    }

    async fn metadata(&self) -> Metadata {
        self.writable.metadata().await
    }

    async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if self.writable.exists(path, cred).await {
            return self.writable.stat(path, cred).await;
        }
        if self.is_deleted(path).await {
            return Err(Error::no_entry(format!("{path} was deleted")));
        }
        let mut stats = self.readable.stat(path, cred).await?;
        stats.mode |= 0o222;
        Ok(stats)
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if self.writable.exists(path, cred).await {
            return self.writable.open_file(path, flags, cred).await;
        }
        if self.is_deleted(path).await {
            return Err(Error::no_entry(format!("{path} was deleted")));
        }
        let mut stats = self.readable.stat(path, cred).await?;
        if stats.is_dir() {
            return Err(Error::is_dir(format!("{path} is a directory")));
        }
        stats.mode |= 0o222;
        let source = self.readable.open_file(path, OpenFlags::parse("r")?, cred).await?;
        let data = source.read(0, stats.size as usize).await?;
        let _ = source.close().await;
        Ok(Box::new(OverlayHandle {
            writable: Arc::clone(&self.writable),
            path: path.to_string(),
            buffer: Mutex::new(Buffered { data, stats, dirty: false }),
        }))
    }

    async fn create_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if self.exists(path, cred).await {
            return Err(Error::exist(format!("{path} already exists")));
        }
        self.ensure_parents_on_writable(path, cred).await?;
        self.writable.create_file(path, flags, mode, cred).await
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> Result<()> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if self.exists(path, cred).await {
            return Err(Error::exist(format!("{path} already exists")));
        }
        self.ensure_parents_on_writable(path, cred).await?;
        self.writable.mkdir(path, mode, cred).await
    }

    async fn rmdir(&self, path: &str, cred: &Cred) -> Result<()> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if !self.stat(path, cred).await?.is_dir() {
            return Err(Error::not_dir(format!("{path} is not a directory")));
        }
        let entries = self.readdir(path, cred).await?;
        if !entries.is_empty() {
            return Err(Error::not_empty(format!("{path} is not empty")));
        }
        self.hide(path, cred, true).await
    }

    async fn unlink(&self, path: &str, cred: &Cred) -> Result<()> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if self.stat(path, cred).await?.is_dir() {
            return Err(Error::is_dir(format!("{path} is a directory")));
        }
        self.hide(path, cred, false).await
    }

    async fn rename(&self, old_path: &str, new_path: &str, cred: &Cred) -> Result<()> {
        Self::reject_protected_path(old_path)?;
        Self::reject_protected_path(new_path)?;
        self.take_latched_error().await?;
        if !self.writable.exists(old_path, cred).await {
            return Err(Error::not_supported(format!(
                "{old_path} is not on the writable layer; overlay rename requires copy-on-write first"
            )));
        }
        self.ensure_parents_on_writable(new_path, cred).await?;
        self.writable.rename(old_path, new_path, cred).await
    }

    async fn link(&self, src: &str, dst: &str, cred: &Cred) -> Result<()> {
        Self::reject_protected_path(src)?;
        Self::reject_protected_path(dst)?;
        self.take_latched_error().await?;
        if !self.writable.exists(src, cred).await {
            return Err(Error::not_supported(format!(
                "{src} is not on the writable layer; overlay link requires copy-on-write first"
            )));
        }
        self.ensure_parents_on_writable(dst, cred).await?;
        self.writable.link(src, dst, cred).await
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        if !self.exists(path, cred).await {
            return Err(Error::no_entry(format!("{path} does not exist")));
        }
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        if self.writable.exists(path, cred).await {
            for entry in self.writable.readdir(path, cred).await? {
                if entry.name == ".deleted" {
                    continue;
                }
                if seen.insert(entry.name.clone()) {
                    result.push(entry);
                }
            }
        }
        if let Ok(entries) = self.readable.readdir(path, cred).await {
            let state = self.state.lock().await;
            for entry in entries {
                let child_path = crate::path::join(path, &entry.name);
                if state.deleted.contains(&child_path) {
                    continue;
                }
                if seen.insert(entry.name.clone()) {
                    result.push(entry);
                }
            }
        }
        Ok(result)
    }

    async fn sync_file(
        &self,
        path: &str,
        data: Option<&[u8]>,
        stats: Option<&Stats>,
        cred: &Cred,
    ) -> Result<()> {
        Self::reject_protected_path(path)?;
        self.take_latched_error().await?;
        self.writable.sync_file(path, data, stats, cred).await
    }
}

impl OverlayFs {
    /// Shared tail of `unlink`/`rmdir`: removes a writable-layer entry if present, and records a
    /// readable-layer-only name in the deletion log.
    async fn hide(&self, path: &str, cred: &Cred, is_dir: bool) -> Result<()> {
        let on_writable = self.writable.exists(path, cred).await;
        if on_writable {
            if is_dir {
                self.writable.rmdir(path, cred).await?;
            } else {
                self.writable.unlink(path, cred).await?;
            }
        }
        let on_readable = self.readable.exists(path, cred).await;
        if !on_writable && !on_readable {
            return Err(Error::no_entry(format!("{path} does not exist")));
        }
        if on_readable {
            let mut state = self.state.lock().await;
            if state.deleted.insert(path.to_string()) {
                state.dirty = true;
                drop(state);
                self.trigger_flush();
            }
        }
        Ok(())
    }
}

struct Buffered {
    data: Vec<u8>,
    stats: Stats,
    dirty: bool,
}

/// An in-memory file handle returned for a readable-layer file opened through the overlay. The
/// first `sync`/`close` copies it onto the writable layer (copy-on-write); subsequent syncs land
/// directly on that freshly created file.
struct OverlayHandle {
    writable: Arc<dyn FileSystem>,
    path: String,
    buffer: Mutex<Buffered>,
}

impl std::fmt::Debug for OverlayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayHandle").field("path", &self.path).finish_non_exhaustive()
    }
}

#[async_trait]
impl FileHandle for OverlayHandle {
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
        let start = position as usize;
        let end = start + data.len();
        if buffer.data.len() < end {
            buffer.data.resize(end, 0);
        }
        buffer.data[start..end].copy_from_slice(data);
        buffer.stats.size = buffer.data.len() as u64;
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
        buffer.dirty = true;
        Ok(())
    }

    async fn chmod(&self, mode: u32) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        let type_bits = buffer.stats.mode & crate::stat::S_IFMT;
        buffer.stats.mode = type_bits | (mode & 0o7777);
        buffer.dirty = true;
        Ok(())
    }

    async fn chown(&self, uid: u32, gid: u32) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        buffer.stats.uid = uid;
        buffer.stats.gid = gid;
        buffer.dirty = true;
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let buffer = self.buffer.lock().await;
        let handle = self
            .writable
            .create_file(&self.path, OpenFlags::parse("w")?, buffer.stats.permission_bits(), &Cred::ROOT)
            .await?;
        handle.write(0, &buffer.data).await?;
        handle.chmod(buffer.stats.permission_bits()).await?;
        handle.chown(buffer.stats.uid, buffer.stats.gid).await?;
        handle.sync().await
    }

    async fn close(&self) -> Result<()> {
        self.sync().await
    }
}

impl Drop for OverlayHandle {
    /// Best-effort copy-up for a handle dropped without an explicit `close`/`sync`. Errors are
    /// discarded since `Drop` cannot surface one; a no-op if nothing was written or if dropped
    /// outside a Tokio runtime.
    fn drop(&mut self) {
        let Ok(mut buffer) = self.buffer.try_lock() else { return };
        if !buffer.dirty {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else { return };
        let writable = Arc::clone(&self.writable);
        let path = self.path.clone();
        let data = std::mem::take(&mut buffer.data);
        let stats = buffer.stats;
        buffer.dirty = false;
        drop(buffer);
        handle.spawn(async move {
            let result: Result<()> = async {
                let file_handle = writable
                    .create_file(&path, OpenFlags::parse("w")?, stats.permission_bits(), &Cred::ROOT)
                    .await?;
                file_handle.write(0, &data).await?;
                file_handle.chmod(stats.permission_bits()).await?;
                file_handle.chown(stats.uid, stats.gid).await?;
                file_handle.sync().await
            }
            .await;
            let _ = result;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::store::SimpleStore;
    use crate::store_fs::StoreFs;

    fn memory_fs(name: &str) -> Arc<dyn FileSystem> {
        Arc::new(StoreFs::new(SimpleStore::new(MemoryStore::new()), name.to_string()))
    }

    async fn seed_readable(readable: &Arc<dyn FileSystem>, path: &str, content: &[u8]) {
        readable.ready().await.unwrap();
        let handle =
            readable.create_file(path, OpenFlags::parse("w").unwrap(), 0o644, &Cred::ROOT).await.unwrap();
        handle.write(0, content).await.unwrap();
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn reads_fall_through_to_readable_layer() {
        let readable = memory_fs("readable");
        seed_readable(&readable, "/ro.txt", b"hello").await;
        let writable = memory_fs("writable");
        let overlay = OverlayFs::new(writable, readable);
        overlay.ready().await.unwrap();

        let stats = overlay.stat("/ro.txt", &Cred::ROOT).await.unwrap();
        assert_eq!(stats.size, 5);
        assert_eq!(stats.permission_bits() & 0o222, 0o222);
    }

    #[tokio::test]
    async fn unlink_hides_readable_only_entry() {
        let readable = memory_fs("readable");
        seed_readable(&readable, "/ro.txt", b"X").await;
        let writable = memory_fs("writable");
        let overlay = OverlayFs::new(writable, readable);
        overlay.ready().await.unwrap();

        overlay.unlink("/ro.txt", &Cred::ROOT).await.unwrap();
        assert!(!overlay.exists("/ro.txt", &Cred::ROOT).await);
        assert_eq!(overlay.readdir("/", &Cred::ROOT).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn deletion_log_survives_reconstruction() {
        let readable = memory_fs("readable");
        seed_readable(&readable, "/ro.txt", b"X").await;
        let writable = memory_fs("writable");
        let overlay = OverlayFs::new(Arc::clone(&writable), Arc::clone(&readable));
        overlay.ready().await.unwrap();
        overlay.unlink("/ro.txt", &Cred::ROOT).await.unwrap();

        // Give the fire-and-forget flush task a chance to run before reconstructing.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let overlay2 = OverlayFs::new(writable, readable);
        overlay2.ready().await.unwrap();
        assert!(!overlay2.exists("/ro.txt", &Cred::ROOT).await);
    }

    #[tokio::test]
    async fn create_file_copies_on_write() {
        let readable = memory_fs("readable");
        let writable = memory_fs("writable");
        let overlay = OverlayFs::new(writable, readable);
        overlay.ready().await.unwrap();
        let handle =
            overlay.create_file("/new.txt", OpenFlags::parse("w").unwrap(), 0o644, &Cred::ROOT).await.unwrap();
        handle.write(0, b"data").await.unwrap();
        handle.close().await.unwrap();
        assert!(overlay.exists("/new.txt", &Cred::ROOT).await);
    }

    #[tokio::test]
    async fn protected_path_is_rejected() {
        let readable = memory_fs("readable");
        let writable = memory_fs("writable");
        let overlay = OverlayFs::new(writable, readable);
        overlay.ready().await.unwrap();
        let err = overlay.stat("/.deleted", &Cred::ROOT).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);
    }
}

//! End-to-end scenarios exercising the mount router, a composed `StoreFs`, `OverlayFs`,
//! `ReadonlyFs` and `AsyncBridge` together.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::root;
use vfscore::bridge::AsyncBridge;
use vfscore::cred::Cred;
use vfscore::error::{Error, ErrorKind, Result};
use vfscore::filesystem::{DirEntry, FileHandle, Metadata};
use vfscore::overlay::OverlayFs;
use vfscore::readonly::ReadonlyFs;
use vfscore::store::SimpleStore;
use vfscore::store_fs::StoreFs;
use vfscore::{ErrorKind as Kind, FileSystem, MountTable, OpenFlags};

fn memory_fs(name: &str) -> Arc<dyn FileSystem> {
    Arc::new(StoreFs::new(SimpleStore::new(vfscore::backends::memory::MemoryStore::new()), name))
}

/// S1 — write then read a file at the root mount, checking size.
#[tokio::test]
async fn s1_write_then_read_reports_correct_size() {
    let table = MountTable::new();
    table.mount("/", memory_fs("root")).await.unwrap();

    let handle =
        table.create_file("/a.txt", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"hello").await.unwrap();
    handle.close().await.unwrap();

    let handle = table.open_file("/a.txt", OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    assert_eq!(handle.read(0, 64).await.unwrap(), b"hello");
    assert_eq!(table.stat("/a.txt", &root()).await.unwrap().size, 5);
}

/// S2 — two mounts, one nested under the other; each only lists its own entries.
#[tokio::test]
async fn s2_nested_mounts_each_list_their_own_entries() {
    let table = MountTable::new();
    table.mount("/", memory_fs("root")).await.unwrap();
    table.mount("/tmp", memory_fs("tmp")).await.unwrap();

    let handle =
        table.create_file("/tmp/x", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"1").await.unwrap();
    handle.close().await.unwrap();
    let handle = table.create_file("/y", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"2").await.unwrap();
    handle.close().await.unwrap();

    let mut root_names: Vec<_> =
        table.readdir("/", &root()).await.unwrap().into_iter().map(|e| e.name).collect();
    root_names.sort();
    assert_eq!(root_names, vec!["tmp".to_string(), "y".to_string()]);

    let tmp_names: Vec<_> =
        table.readdir("/tmp", &root()).await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(tmp_names, vec!["x".to_string()]);
}

/// S3 — unlinking a readable-only entry through an overlay hides it, and the hiding survives
/// reconstructing the overlay from the same writable layer.
#[tokio::test]
async fn s3_overlay_unlink_hides_and_persists() {
    let readable = memory_fs("readable");
    readable.ready().await.unwrap();
    let handle =
        readable.create_file("/ro.txt", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"X").await.unwrap();
    handle.close().await.unwrap();

    let writable = memory_fs("writable");
    let overlay = OverlayFs::new(Arc::clone(&writable), Arc::clone(&readable));
    overlay.ready().await.unwrap();
    overlay.unlink("/ro.txt", &root()).await.unwrap();
    assert_eq!(overlay.readdir("/", &root()).await.unwrap().len(), 0);

    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let overlay2 = OverlayFs::new(writable, readable);
    overlay2.ready().await.unwrap();
    assert!(!overlay2.exists("/ro.txt", &root()).await);
}

/// S4 — a `ReadonlyFs` rejects writes with `EROFS` and leaves the wrapped file unchanged.
#[tokio::test]
async fn s4_readonly_rejects_write_leaves_file_unchanged() {
    let inner = StoreFs::new(SimpleStore::new(vfscore::backends::memory::MemoryStore::new()), "mem");
    inner.ready().await.unwrap();
    let handle =
        inner.create_file("/r", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"z").await.unwrap();
    handle.close().await.unwrap();
    let fs = ReadonlyFs::new(inner);

    let err = fs.create_file("/r", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap_err();
    assert_eq!(err.kind(), Kind::ReadOnlyFs);

    let handle = fs.open_file("/r", OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    assert_eq!(handle.read(0, 64).await.unwrap(), b"z");
}

/// A backend standing in for "a port with no attached responder": every call fails as if the
/// transport had timed out. There is no real network port in this crate (the async bridge
/// bridges an in-process `FileSystem`, not a wire protocol), so unreachability is simulated
/// directly rather than through an actual timeout.
struct UnresponsivePort;

#[async_trait]
impl FileSystem for UnresponsivePort {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }
    async fn metadata(&self) -> Metadata {
        Metadata::new("unresponsive")
    }
    async fn stat(&self, _path: &str, _cred: &Cred) -> Result<Stats_> {
        unreachable!()
    }
    async fn open_file(
        &self,
        _path: &str,
        _flags: OpenFlags,
        _cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Err(rpc_failed())
    }
    async fn create_file(
        &self,
        _path: &str,
        _flags: OpenFlags,
        _mode: u32,
        _cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Err(rpc_failed())
    }
    async fn mkdir(&self, _path: &str, _mode: u32, _cred: &Cred) -> Result<()> {
        Err(rpc_failed())
    }
    async fn rmdir(&self, _path: &str, _cred: &Cred) -> Result<()> {
        Err(rpc_failed())
    }
    async fn unlink(&self, _path: &str, _cred: &Cred) -> Result<()> {
        Err(rpc_failed())
    }
    async fn rename(&self, _old_path: &str, _new_path: &str, _cred: &Cred) -> Result<()> {
        Err(rpc_failed())
    }
    async fn link(&self, _src: &str, _dst: &str, _cred: &Cred) -> Result<()> {
        Err(rpc_failed())
    }
    async fn readdir(&self, _path: &str, _cred: &Cred) -> Result<Vec<DirEntry>> {
        Err(rpc_failed())
    }
    async fn sync_file(
        &self,
        _path: &str,
        _data: Option<&[u8]>,
        _stats: Option<&Stats_>,
        _cred: &Cred,
    ) -> Result<()> {
        Err(rpc_failed())
    }
}

type Stats_ = vfscore::stat::Stats;

fn rpc_failed() -> Error {
    Error::io("RPC Failed")
}

/// S5 — a bridged backend that never responds latches `EIO "RPC Failed"`, surfaced from the next
/// call that checks the latch.
#[tokio::test]
async fn s5_unresponsive_backend_latches_rpc_failed() {
    let bridge = AsyncBridge::new(Arc::new(UnresponsivePort), false);
    bridge.ready().await.unwrap();

    let handle =
        bridge.create_file("/test", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"x").await.unwrap();
    handle.close().await.unwrap();

    let err = bridge.queue_done().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("RPC Failed"));
}

/// S6 — renaming a directory moves its descendants with it; the old path is gone.
#[tokio::test]
async fn s6_rename_directory_moves_descendants() {
    let table = MountTable::new();
    table.mount("/", memory_fs("root")).await.unwrap();

    table.mkdir("/a", 0o755, &root()).await.unwrap();
    table.mkdir("/a/b", 0o755, &root()).await.unwrap();
    table.rename("/a", "/c", &root()).await.unwrap();

    assert!(table.stat("/c/b", &root()).await.is_ok());
    let err = table.stat("/a", &root()).await.unwrap_err();
    assert_eq!(err.kind(), Kind::NoEntry);
}

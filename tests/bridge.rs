mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::root;
use vfscore::bridge::AsyncBridge;
use vfscore::cred::Cred;
use vfscore::error::{Error, ErrorKind, Result};
use vfscore::filesystem::{DirEntry, FileHandle, Metadata};
use vfscore::flags::OpenFlags;
use vfscore::stat::Stats;
use vfscore::FileSystem;

#[tokio::test]
async fn backend_converges_with_mirror_after_queue_done() {
    let backend = common::fresh_fs().await;
    let bridge = AsyncBridge::new(Arc::clone(&backend), false);
    bridge.ready().await.unwrap();

    bridge.mkdir("/a", 0o755, &root()).await.unwrap();
    assert!(bridge.exists("/a", &root()).await);
    bridge.queue_done().await.unwrap();
    assert!(backend.exists("/a", &root()).await);
}

#[tokio::test]
async fn reads_are_served_from_the_mirror_without_waiting() {
    let backend = common::fresh_fs().await;
    let bridge = AsyncBridge::new(backend, false);
    bridge.ready().await.unwrap();

    bridge.mkdir("/instant", 0o755, &root()).await.unwrap();
    // No queue_done() call here: the mirror must already reflect the mutation.
    assert!(bridge.stat("/instant", &root()).await.is_ok());
}

#[tokio::test]
async fn disabled_cache_rejects_reads_and_writes() {
    let backend = common::fresh_fs().await;
    let bridge = AsyncBridge::new(backend, true);

    let err = bridge.mkdir("/a", 0o755, &root()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);
}

/// A backend that always fails, standing in for an unreachable remote store: exercises the
/// bridge's latched-error path without a real transport.
struct UnreachableBackend;

#[async_trait]
impl FileSystem for UnreachableBackend {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn metadata(&self) -> Metadata {
        Metadata::new("unreachable")
    }

    async fn stat(&self, _path: &str, _cred: &Cred) -> Result<Stats> {
        Err(unreachable_error())
    }

    async fn open_file(
        &self,
        _path: &str,
        _flags: OpenFlags,
        _cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Err(unreachable_error())
    }

    async fn create_file(
        &self,
        _path: &str,
        _flags: OpenFlags,
        _mode: u32,
        _cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Err(unreachable_error())
    }

    async fn mkdir(&self, _path: &str, _mode: u32, _cred: &Cred) -> Result<()> {
        Err(unreachable_error())
    }

    async fn rmdir(&self, _path: &str, _cred: &Cred) -> Result<()> {
        Err(unreachable_error())
    }

    async fn unlink(&self, _path: &str, _cred: &Cred) -> Result<()> {
        Err(unreachable_error())
    }

    async fn rename(&self, _old_path: &str, _new_path: &str, _cred: &Cred) -> Result<()> {
        Err(unreachable_error())
    }

    async fn link(&self, _src: &str, _dst: &str, _cred: &Cred) -> Result<()> {
        Err(unreachable_error())
    }

    async fn readdir(&self, _path: &str, _cred: &Cred) -> Result<Vec<DirEntry>> {
        Err(unreachable_error())
    }

    async fn sync_file(
        &self,
        _path: &str,
        _data: Option<&[u8]>,
        _stats: Option<&Stats>,
        _cred: &Cred,
    ) -> Result<()> {
        Err(unreachable_error())
    }
}

fn unreachable_error() -> Error {
    Error::io("RPC Failed")
}

#[tokio::test]
async fn queued_backend_failure_latches_and_surfaces_once() {
    let bridge = AsyncBridge::new(Arc::new(UnreachableBackend), false);
    bridge.ready().await.unwrap();

    bridge.mkdir("/a", 0o755, &root()).await.unwrap();
    let err = bridge.queue_done().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("RPC Failed"));

    // The latched error is cleared after being surfaced once.
    bridge.queue_done().await.unwrap();
}

//! Shared helpers for the integration tests: a fresh in-memory `StoreFs` and the root credential.

use std::sync::Arc;

use vfscore::backends::memory::MemoryStore;
use vfscore::filesystem::FileSystem;
use vfscore::store::SimpleStore;
use vfscore::store_fs::StoreFs;
use vfscore::Cred;

pub fn root() -> Cred {
    Cred::ROOT
}

pub async fn fresh_fs() -> Arc<dyn FileSystem> {
    let fs = Arc::new(StoreFs::new(SimpleStore::new(MemoryStore::new()), "mem"));
    fs.ready().await.unwrap();
    fs
}

pub async fn write_file(fs: &dyn FileSystem, path: &str, contents: &[u8]) {
    let handle = fs
        .create_file(path, vfscore::OpenFlags::parse("w").unwrap(), 0o644, &root())
        .await
        .unwrap();
    handle.write(0, contents).await.unwrap();
    handle.close().await.unwrap();
}

pub async fn read_file(fs: &dyn FileSystem, path: &str) -> Vec<u8> {
    let handle = fs.open_file(path, vfscore::OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    let size = handle.stat().await.unwrap().size as usize;
    handle.read(0, size).await.unwrap()
}

mod common;

use std::sync::Arc;

use vfscore::backends::memory::MemoryStore;
use vfscore::locked::LockedFs;
use vfscore::store::SimpleStore;
use vfscore::store_fs::StoreFs;
use vfscore::{Cred, FileSystem};

#[tokio::test]
async fn serializes_concurrent_mkdirs_without_interleaving() {
    let fs = Arc::new(LockedFs::new(StoreFs::new(SimpleStore::new(MemoryStore::new()), "mem")));
    fs.ready().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let fs = Arc::clone(&fs);
        handles.push(tokio::spawn(async move {
            fs.mkdir(&format!("/dir{i}"), 0o755, &Cred::ROOT).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let entries = fs.readdir("/", &Cred::ROOT).await.unwrap();
    assert_eq!(entries.len(), 8);
}

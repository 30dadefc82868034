mod common;

use std::sync::Arc;

use common::root;
use vfscore::filesystem::FileSystem;
use vfscore::overlay::OverlayFs;
use vfscore::OpenFlags;

async fn seeded_readable() -> Arc<dyn FileSystem> {
    let fs = common::fresh_fs().await;
    let handle = fs.create_file("/ro.txt", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"original").await.unwrap();
    handle.close().await.unwrap();
    fs
}

#[tokio::test]
async fn write_through_readable_file_copies_up_without_mutating_readable() {
    let readable = seeded_readable().await;
    let writable = common::fresh_fs().await;
    let overlay = OverlayFs::new(Arc::clone(&writable), Arc::clone(&readable));
    overlay.ready().await.unwrap();

    let handle = overlay.open_file("/ro.txt", OpenFlags::parse("r+").unwrap(), &root()).await.unwrap();
    handle.write(0, b"changed!").await.unwrap();
    handle.close().await.unwrap();

    let readable_handle =
        readable.open_file("/ro.txt", OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    assert_eq!(readable_handle.read(0, 64).await.unwrap(), b"original");

    let writable_handle =
        writable.open_file("/ro.txt", OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    assert_eq!(writable_handle.read(0, 64).await.unwrap(), b"changed!");
}

#[tokio::test]
async fn mkdir_through_overlay_lands_on_writable_layer() {
    let readable = common::fresh_fs().await;
    let writable = common::fresh_fs().await;
    let overlay = OverlayFs::new(Arc::clone(&writable), readable);
    overlay.ready().await.unwrap();

    overlay.mkdir("/docs", 0o755, &root()).await.unwrap();
    assert!(writable.exists("/docs", &root()).await);
}

#[tokio::test]
async fn rename_requires_source_already_on_writable_layer() {
    let readable = seeded_readable().await;
    let writable = common::fresh_fs().await;
    let overlay = OverlayFs::new(writable, readable);
    overlay.ready().await.unwrap();

    let err = overlay.rename("/ro.txt", "/moved.txt", &root()).await.unwrap_err();
    assert_eq!(err.kind(), vfscore::ErrorKind::NotSupported);
}

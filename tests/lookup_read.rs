mod common;

use common::{fresh_fs, root};
use vfscore::{ErrorKind, OpenFlags};

#[tokio::test]
async fn stat_root_reports_directory() {
    let fs = fresh_fs().await;
    let stats = fs.stat("/", &root()).await.unwrap();
    assert!(stats.is_dir());
}

#[tokio::test]
async fn stat_missing_path_fails_with_no_entry() {
    let fs = fresh_fs().await;
    let err = fs.stat("/missing", &root()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoEntry);
}

#[tokio::test]
async fn exists_returns_false_for_missing_path() {
    let fs = fresh_fs().await;
    assert!(!fs.exists("/missing", &root()).await);
}

#[tokio::test]
async fn open_file_on_directory_fails_with_is_dir() {
    let fs = fresh_fs().await;
    fs.mkdir("/docs", 0o755, &root()).await.unwrap();
    let err = fs.open_file("/docs", OpenFlags::parse("r").unwrap(), &root()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsDir);
}

#[tokio::test]
async fn partial_read_returns_requested_slice() {
    let fs = fresh_fs().await;
    let handle =
        fs.create_file("/a.txt", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"0123456789").await.unwrap();
    handle.close().await.unwrap();

    let handle = fs.open_file("/a.txt", OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    assert_eq!(handle.read(2, 4).await.unwrap(), b"2345");
}

#[tokio::test]
async fn read_past_end_of_file_returns_empty() {
    let fs = fresh_fs().await;
    let handle =
        fs.create_file("/a.txt", OpenFlags::parse("w").unwrap(), 0o644, &root()).await.unwrap();
    handle.write(0, b"hi").await.unwrap();
    handle.close().await.unwrap();

    let handle = fs.open_file("/a.txt", OpenFlags::parse("r").unwrap(), &root()).await.unwrap();
    assert_eq!(handle.read(100, 10).await.unwrap(), Vec::<u8>::new());
}

mod common;

use common::{fresh_fs, root, write_file};
use vfscore::ErrorKind;

#[tokio::test]
async fn unlink_removes_file_entry() {
    let fs = fresh_fs().await;
    write_file(fs.as_ref(), "/a.txt", b"x").await;
    fs.unlink("/a.txt", &root()).await.unwrap();
    assert!(!fs.exists("/a.txt", &root()).await);
}

#[tokio::test]
async fn unlink_on_directory_fails_with_is_dir() {
    let fs = fresh_fs().await;
    fs.mkdir("/docs", 0o755, &root()).await.unwrap();
    let err = fs.unlink("/docs", &root()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsDir);
}

#[tokio::test]
async fn rmdir_on_file_fails_with_not_dir() {
    let fs = fresh_fs().await;
    write_file(fs.as_ref(), "/a.txt", b"x").await;
    let err = fs.rmdir("/a.txt", &root()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotDir);
}

#[tokio::test]
async fn rmdir_refuses_non_empty_directory() {
    let fs = fresh_fs().await;
    fs.mkdir("/docs", 0o755, &root()).await.unwrap();
    write_file(fs.as_ref(), "/docs/a.txt", b"x").await;
    let err = fs.rmdir("/docs", &root()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEmpty);
}

#[tokio::test]
async fn rmdir_succeeds_once_empty() {
    let fs = fresh_fs().await;
    fs.mkdir("/docs", 0o755, &root()).await.unwrap();
    fs.rmdir("/docs", &root()).await.unwrap();
    assert!(!fs.exists("/docs", &root()).await);
}

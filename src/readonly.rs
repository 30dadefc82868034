//! `ReadonlyFS`: rejects every mutating operation with `EROFS`, passing reads straight through.

use async_trait::async_trait;

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::filesystem::{DirEntry, FileHandle, FileSystem, Metadata};
use crate::flags::OpenFlags;
use crate::stat::Stats;

pub struct ReadonlyFs<F: FileSystem> {
    inner: F,
}

impl<F: FileSystem> ReadonlyFs<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    fn rejected(syscall: &'static str) -> Error {
        Error::read_only_fs(format!("{syscall} is not permitted on a read-only filesystem"))
            .with_syscall(syscall)
    }
}

#[async_trait]
impl<F: FileSystem> FileSystem for ReadonlyFs<F> {
    async fn ready(&self) -> Result<()> {
        self.inner.ready().await
    }

    async fn metadata(&self) -> Metadata {
        let mut metadata = self.inner.metadata().await;
        metadata.readonly = true;
        metadata
    }

    async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats> {
        self.inner.stat(path, cred).await
    }

    async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        if flags.write {
            return Err(Self::rejected("open_file"));
        }
        self.inner.open_file(path, flags, cred).await
    }

    async fn create_file(
        &self,
        _path: &str,
        _flags: OpenFlags,
        _mode: u32,
        _cred: &Cred,
    ) -> Result<Box<dyn FileHandle>> {
        Err(Self::rejected("create_file"))
    }

    async fn mkdir(&self, _path: &str, _mode: u32, _cred: &Cred) -> Result<()> {
        Err(Self::rejected("mkdir"))
    }

    async fn rmdir(&self, _path: &str, _cred: &Cred) -> Result<()> {
        Err(Self::rejected("rmdir"))
    }

    async fn unlink(&self, _path: &str, _cred: &Cred) -> Result<()> {
        Err(Self::rejected("unlink"))
    }

    async fn rename(&self, _old_path: &str, _new_path: &str, _cred: &Cred) -> Result<()> {
        Err(Self::rejected("rename"))
    }

    async fn link(&self, _src: &str, _dst: &str, _cred: &Cred) -> Result<()> {
        Err(Self::rejected("link"))
    }

    async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
        self.inner.readdir(path, cred).await
    }

    async fn sync_file(
        &self,
        _path: &str,
        _data: Option<&[u8]>,
        _stats: Option<&Stats>,
        _cred: &Cred,
    ) -> Result<()> {
        Err(Self::rejected("sync_file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::store::SimpleStore;
    use crate::store_fs::StoreFs;

    #[tokio::test]
    async fn mutators_are_rejected() {
        let inner = StoreFs::new(SimpleStore::new(MemoryStore::new()), "mem");
        inner.ready().await.unwrap();
        inner.mkdir("/existing", 0o755, &Cred::ROOT).await.unwrap();
        let fs = ReadonlyFs::new(inner);

        let err = fs.mkdir("/new", 0o755, &Cred::ROOT).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ReadOnlyFs);
        assert!(fs.exists("/existing", &Cred::ROOT).await);
        assert!(fs.metadata().await.readonly);
    }
}

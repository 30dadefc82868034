//! Mount table and path router: the entry point every API call passes through before it reaches
//! a concrete [`FileSystem`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::filesystem::{DirEntry, FileSystem};
use crate::flags::OpenFlags;
use crate::path;
use crate::stat::Stats;

/// Prefix-indexed mount table with longest-prefix dispatch.
///
/// Mirrors the teacher's `Vfs` dispatch surface, generalized from a fixed NFS export set to an
/// arbitrary number of mounted [`FileSystem`]s keyed by absolute-path prefix.
pub struct MountTable {
    mounts: RwLock<HashMap<String, Arc<dyn FileSystem>>>,
    /// The process credential `configure` establishes from `Configuration { uid, gid, .. }`.
    /// Every dispatch method below still takes its `cred` explicitly — this is not consulted by
    /// any of them — it exists purely as a fallback for callers that have no per-request
    /// credential of their own (e.g. a tool bootstrapping before it has parsed one).
    default_cred: StdRwLock<Cred>,
}

impl MountTable {
    pub fn new() -> Self {
        Self { mounts: RwLock::new(HashMap::new()), default_cred: StdRwLock::new(Cred::ROOT) }
    }

    /// Records the process credential established by `configure`. Does not affect any in-flight
    /// or future dispatch call, which always takes its own `cred` argument.
    pub fn set_process_cred(&self, cred: Cred) {
        *self.default_cred.write().expect("default_cred lock poisoned") = cred;
    }

    /// The process credential last established via [`MountTable::set_process_cred`], or
    /// [`Cred::ROOT`] if `configure` was never called.
    pub fn process_cred(&self) -> Cred {
        *self.default_cred.read().expect("default_cred lock poisoned")
    }

    #[instrument(skip(self, fs), fields(prefix = prefix))]
    pub async fn mount(&self, prefix: &str, fs: Arc<dyn FileSystem>) -> Result<()> {
        let normalized = match path::normalize(prefix) {
            Some(normalized) => normalized,
            None => return Err(trace_origin(Error::invalid(format!("mount prefix {prefix} is not absolute")))),
        };
        let mut mounts = self.mounts.write().await;
        if mounts.contains_key(&normalized) {
            return Err(trace_origin(Error::exist(format!("{normalized} is already mounted"))));
        }
        fs.ready().await?;
        debug!(prefix = normalized, "mounted filesystem");
        mounts.insert(normalized, fs);
        Ok(())
    }

    #[instrument(skip(self), fields(prefix = prefix))]
    pub async fn umount(&self, prefix: &str) -> Result<()> {
        let normalized = match path::normalize(prefix) {
            Some(normalized) => normalized,
            None => return Err(trace_origin(Error::invalid(format!("mount prefix {prefix} is not absolute")))),
        };
        let mut mounts = self.mounts.write().await;
        if mounts.remove(&normalized).is_none() {
            return Err(trace_origin(Error::no_entry(format!("{normalized} is not mounted"))));
        }
        debug!(prefix = normalized, "unmounted filesystem");
        Ok(())
    }

    /// Resolves `abs_path` to its owning mount and the path relative to that mount's prefix,
    /// choosing the longest matching prefix. Fails with `ENOENT` if nothing matches.
    async fn resolve(&self, abs_path: &str) -> Result<(Arc<dyn FileSystem>, String)> {
        let normalized = match path::normalize(abs_path) {
            Some(normalized) => normalized,
            None => return Err(trace_origin(Error::invalid(format!("{abs_path} is not an absolute path")))),
        };
        let mounts = self.mounts.read().await;
        let best = match mounts
            .keys()
            .filter(|prefix| path::is_path_prefix(prefix, &normalized))
            .max_by_key(|prefix| prefix.len())
        {
            Some(best) => best,
            None => return Err(trace_origin(Error::no_entry(format!("no mount covers {normalized}")))),
        };
        let rel = path::strip_prefix(best, &normalized).expect("matched prefix must strip");
        Ok((Arc::clone(&mounts[best]), rel.to_string()))
    }

    pub async fn stat(&self, path: &str, cred: &Cred) -> Result<Stats> {
        let (fs, rel) = self.resolve(path).await?;
        fs.stat(&rel, cred).await
    }

    pub async fn exists(&self, path: &str, cred: &Cred) -> bool {
        match self.resolve(path).await {
            Ok((fs, rel)) => fs.exists(&rel, cred).await,
            Err(_) => false,
        }
    }

    pub async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        cred: &Cred,
    ) -> Result<Box<dyn crate::filesystem::FileHandle>> {
        let (fs, rel) = self.resolve(path).await?;
        fs.open_file(&rel, flags, cred).await
    }

    pub async fn create_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        cred: &Cred,
    ) -> Result<Box<dyn crate::filesystem::FileHandle>> {
        let (fs, rel) = self.resolve(path).await?;
        fs.create_file(&rel, flags, mode, cred).await
    }

    pub async fn mkdir(&self, path: &str, mode: u32, cred: &Cred) -> Result<()> {
        let (fs, rel) = self.resolve(path).await?;
        fs.mkdir(&rel, mode, cred).await
    }

    pub async fn rmdir(&self, path: &str, cred: &Cred) -> Result<()> {
        let (fs, rel) = self.resolve(path).await?;
        fs.rmdir(&rel, cred).await
    }

    pub async fn unlink(&self, path: &str, cred: &Cred) -> Result<()> {
        let (fs, rel) = self.resolve(path).await?;
        fs.unlink(&rel, cred).await
    }

    pub async fn readdir(&self, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
        let (fs, rel) = self.resolve(path).await?;
        fs.readdir(&rel, cred).await
    }

    pub async fn link(&self, src: &str, dst: &str, cred: &Cred) -> Result<()> {
        let (src_fs, src_rel) = self.resolve(src).await?;
        let (dst_fs, dst_rel) = self.resolve(dst).await?;
        if Arc::ptr_eq(&src_fs, &dst_fs) {
            return src_fs.link(&src_rel, &dst_rel, cred).await;
        }
        Err(Error::not_supported(format!("{src} and {dst} are on different mounts")))
    }

    /// Renames `old_path` to `new_path`. Same-mount renames delegate directly; cross-mount
    /// renames fall back to copy-then-unlink, best-effort (see the design notes on cross-mount
    /// rename atomicity).
    #[instrument(skip(self, cred), fields(old_path = old_path, new_path = new_path))]
    pub async fn rename(&self, old_path: &str, new_path: &str, cred: &Cred) -> Result<()> {
        let (old_fs, old_rel) = self.resolve(old_path).await?;
        let (new_fs, new_rel) = self.resolve(new_path).await?;
        if Arc::ptr_eq(&old_fs, &new_fs) {
            return old_fs.rename(&old_rel, &new_rel, cred).await;
        }
        warn!(old_path, new_path, "cross-mount rename, falling back to copy+unlink");
        self.cross_mount_rename(&old_fs, &old_rel, &new_fs, &new_rel, old_path, cred).await
    }

    async fn cross_mount_rename(
        &self,
        old_fs: &Arc<dyn FileSystem>,
        old_rel: &str,
        new_fs: &Arc<dyn FileSystem>,
        new_rel: &str,
        old_path: &str,
        cred: &Cred,
    ) -> Result<()> {
        let stats = old_fs.stat(old_rel, cred).await?;
        if stats.is_dir() {
            new_fs.mkdir(new_rel, stats.permission_bits(), cred).await?;
            for entry in old_fs.readdir(old_rel, cred).await? {
                let child_old = path::join(old_rel, &entry.name);
                let child_new = path::join(new_rel, &entry.name);
                Box::pin(self.cross_mount_rename(
                    old_fs,
                    &child_old,
                    new_fs,
                    &child_new,
                    old_path,
                    cred,
                ))
                .await?;
            }
            old_fs.rmdir(old_rel, cred).await
        } else {
            let src_handle = old_fs.open_file(old_rel, OpenFlags::parse("r")?, cred).await?;
            let bytes = src_handle.read(0, stats.size as usize).await?;
            let dst_handle = new_fs
                .create_file(new_rel, OpenFlags::parse("w")?, stats.permission_bits(), cred)
                .await?;
            dst_handle.write(0, &bytes).await?;
            dst_handle.close().await?;
            old_fs.unlink(old_rel, cred).await
        }
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Traces an error once at the point it is first produced, then returns it unchanged.
fn trace_origin(err: Error) -> Error {
    warn!(error = %err, "mount table rejected call");
    err
}

//! `readdir`: list a directory's entries.

use tracing::{debug, instrument};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::filesystem::DirEntry;
use crate::stat::AccessMode;
use crate::store::Store;

use super::internal::{read_dir_entries, read_stats, resolve};

#[instrument(skip(store, cred), fields(path = path))]
pub async fn readdir<S: Store>(store: &S, path: &str, cred: &Cred) -> Result<Vec<DirEntry>> {
    let mut txn = store.begin_transaction().await?;
    let result = async {
        let ino = resolve(txn.as_mut(), path).await?;
        let stats = read_stats(txn.as_mut(), ino).await?;
        if !stats.is_dir() {
            return Err(Error::not_dir(format!("{path} is not a directory")));
        }
        if !stats.has_access(AccessMode::READ, cred) {
            return Err(Error::access(format!("no read access to {path}")));
        }
        let entries = read_dir_entries(txn.as_mut(), ino).await?;
        let mut result = Vec::with_capacity(entries.len());
        for (name, child_ino) in entries {
            let child_stats = read_stats(txn.as_mut(), child_ino).await?;
            let file_type = child_stats
                .file_type()
                .ok_or_else(|| Error::io(format!("inode {} has unknown type", child_ino.0)))?;
            result.push(DirEntry { name, ino: child_ino.0, file_type });
        }
        Ok(result)
    }
    .await;

    txn.abort().await?;
    debug!(count = result.as_ref().map(Vec::len).unwrap_or(0), "read directory");
    result
}

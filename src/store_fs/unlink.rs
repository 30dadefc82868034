//! `unlink`: remove a directory entry pointing at a non-directory inode.
//!
//! The core does not maintain `nlink` refcounts (see the design notes' open question): the
//! backing inode record and data blob are deleted unconditionally, even if another directory
//! entry still points at the same `Ino` via [`crate::store_fs::link`].

use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::stat::AccessMode;
use crate::store::{Store, StoreKey};

use super::internal::{read_dir_entries, read_stats, resolve_parent, write_dir_entries};

#[instrument(skip(store, cred), fields(path = path))]
pub async fn unlink<S: Store>(store: &S, path: &str, cred: &Cred) -> Result<()> {
    let mut txn = store.begin_transaction().await?;
    let outcome = async {
        let (parent_ino, name) = resolve_parent(txn.as_mut(), path).await?;
        let parent_stats = read_stats(txn.as_mut(), parent_ino).await?;
        if !parent_stats.has_access(AccessMode::WRITE, cred) {
            return Err(Error::access(format!("no write access to parent of {path}")));
        }

        let mut entries = read_dir_entries(txn.as_mut(), parent_ino).await?;
        let target_ino = *entries
            .get(name)
            .ok_or_else(|| Error::no_entry(format!("{path} does not exist")))?;
        let target_stats = read_stats(txn.as_mut(), target_ino).await?;
        if target_stats.is_dir() {
            return Err(Error::is_dir(format!("{path} is a directory")));
        }

        entries.remove(name);
        write_dir_entries(txn.as_mut(), parent_ino, &entries).await?;
        txn.delete(StoreKey::Record(target_ino)).await?;
        txn.delete(StoreKey::Data(target_ino)).await?;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            txn.commit().await?;
            debug!("unlinked file");
            Ok(())
        }
        Err(err) => {
            txn.abort().await?;
            warn!(error = %err, "unlink aborted");
            Err(err)
        }
    }
}

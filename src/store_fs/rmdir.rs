//! `rmdir`: remove an empty directory entry.

use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::stat::AccessMode;
use crate::store::{Store, StoreKey};

use super::internal::{read_dir_entries, read_stats, resolve_parent, write_dir_entries};

#[instrument(skip(store, cred), fields(path = path))]
pub async fn rmdir<S: Store>(store: &S, path: &str, cred: &Cred) -> Result<()> {
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
        if !target_stats.is_dir() {
            return Err(Error::not_dir(format!("{path} is not a directory")));
        }
        let target_entries = read_dir_entries(txn.as_mut(), target_ino).await?;
        if !target_entries.is_empty() {
            return Err(Error::not_empty(format!("{path} is not empty")));
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
            debug!("removed directory");
            Ok(())
        }
        Err(err) => {
            txn.abort().await?;
            warn!(error = %err, "rmdir aborted");
            Err(err)
        }
    }
}

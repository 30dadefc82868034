//! `rename`: atomic parent-mutation move, with same-type overwrite allowed.

use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::stat::AccessMode;
use crate::store::StoreKey;

use super::internal::{read_dir_entries, read_stats, resolve_parent, write_dir_entries};

#[instrument(skip(store, cred), fields(old_path = old_path, new_path = new_path))]
pub async fn rename<S: crate::store::Store>(
    store: &S,
    old_path: &str,
    new_path: &str,
    cred: &Cred,
) -> Result<()> {
    let mut txn = store.begin_transaction().await?;
    let outcome = async {
        let (old_parent, old_name) = resolve_parent(txn.as_mut(), old_path).await?;
        let (new_parent, new_name) = resolve_parent(txn.as_mut(), new_path).await?;

        let old_parent_stats = read_stats(txn.as_mut(), old_parent).await?;
        if !old_parent_stats.has_access(AccessMode::WRITE, cred) {
            return Err(Error::access(format!("no write access to parent of {old_path}")));
        }
        let new_parent_stats = read_stats(txn.as_mut(), new_parent).await?;
        if !new_parent_stats.has_access(AccessMode::WRITE, cred) {
            return Err(Error::access(format!("no write access to parent of {new_path}")));
        }

        let mut old_entries = read_dir_entries(txn.as_mut(), old_parent).await?;
        let moved_ino = *old_entries
            .get(old_name)
            .ok_or_else(|| Error::no_entry(format!("{old_path} does not exist")))?;
        let moved_stats = read_stats(txn.as_mut(), moved_ino).await?;

        if old_parent == new_parent {
            if let Some(&existing_ino) = old_entries.get(new_name) {
                check_overwrite(txn.as_mut(), existing_ino, &moved_stats, new_path).await?;
            }
            old_entries.remove(old_name);
            old_entries.insert(new_name.to_string(), moved_ino);
            write_dir_entries(txn.as_mut(), old_parent, &old_entries).await?;
        } else {
            let mut new_entries = read_dir_entries(txn.as_mut(), new_parent).await?;
            if let Some(&existing_ino) = new_entries.get(new_name) {
                check_overwrite(txn.as_mut(), existing_ino, &moved_stats, new_path).await?;
            }
            old_entries.remove(old_name);
            new_entries.insert(new_name.to_string(), moved_ino);
            write_dir_entries(txn.as_mut(), old_parent, &old_entries).await?;
            write_dir_entries(txn.as_mut(), new_parent, &new_entries).await?;
        }
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            txn.commit().await?;
            debug!("renamed entry");
            Ok(())
        }
        Err(err) => {
            txn.abort().await?;
            warn!(error = %err, "rename aborted");
            Err(err)
        }
    }
}

/// Validates overwriting `existing_ino` with an entry of `moved_stats`' type: same-type
/// overwrite is permitted (the existing inode is simply dropped by the caller re-pointing the
/// name), a non-empty directory destination is `ENOTEMPTY`, and a cross-type overwrite is
/// `EISDIR`/`ENOTDIR`.
async fn check_overwrite(
    txn: &mut dyn crate::store::Transaction,
    existing_ino: crate::inode::Ino,
    moved_stats: &crate::stat::Stats,
    new_path: &str,
) -> Result<()> {
    let existing_stats = read_stats(txn, existing_ino).await?;
    match (moved_stats.is_dir(), existing_stats.is_dir()) {
        (true, true) => {
            let existing_entries = read_dir_entries(txn, existing_ino).await?;
            if !existing_entries.is_empty() {
                return Err(Error::not_empty(format!("{new_path} is not empty")));
            }
            txn.delete(StoreKey::Record(existing_ino)).await?;
            txn.delete(StoreKey::Data(existing_ino)).await?;
        }
        (false, false) => {
            txn.delete(StoreKey::Record(existing_ino)).await?;
            txn.delete(StoreKey::Data(existing_ino)).await?;
        }
        (true, false) => return Err(Error::not_dir(format!("{new_path} is not a directory"))),
        (false, true) => return Err(Error::is_dir(format!("{new_path} is a directory"))),
    }
    Ok(())
}

//! `mkdir`: allocate a directory inode and link it into its parent.

use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::inode;
use crate::stat::{AccessMode, Stats, S_IFDIR};
use crate::store::{Store, StoreKey};

use super::alloc;
use super::internal::{now_ms, read_dir_entries, read_stats, resolve_parent, write_dir_entries};

#[instrument(skip(store, cred), fields(path = path))]
pub async fn mkdir<S: Store>(store: &S, path: &str, mode: u32, cred: &Cred) -> Result<()> {
    let mut txn = store.begin_transaction().await?;
    let outcome = async {
        let (parent_ino, name) = resolve_parent(txn.as_mut(), path).await?;

        let parent_stats = read_stats(txn.as_mut(), parent_ino).await?;
        if !parent_stats.has_access(AccessMode::WRITE, cred)
            || !parent_stats.has_access(AccessMode::EXEC, cred)
        {
            return Err(Error::access(format!("no write+exec access to parent of {path}")));
        }

        let mut entries = read_dir_entries(txn.as_mut(), parent_ino).await?;
        if entries.contains_key(name) {
            return Err(Error::exist(format!("{path} already exists")));
        }

        let new_ino = alloc::allocate(txn.as_mut()).await?;
        let now = now_ms();
        let stats = Stats::new(new_ino.0, (mode & 0o7777) | S_IFDIR, cred.euid, cred.egid, now);
        txn.put(StoreKey::Record(new_ino), inode::encode_record(&stats), false).await?;
        txn.put(StoreKey::Data(new_ino), Vec::new(), false).await?;

        entries.insert(name.to_string(), new_ino);
        write_dir_entries(txn.as_mut(), parent_ino, &entries).await?;
        Ok(new_ino)
    }
    .await;

    match outcome {
        Ok(ino) => {
            txn.commit().await?;
            debug!(ino = ino.0, "created directory");
            Ok(())
        }
        Err(err) => {
            txn.abort().await?;
            warn!(error = %err, "mkdir aborted");
            Err(err)
        }
    }
}

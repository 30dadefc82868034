//! `link`: add a new directory entry pointing at an existing inode.
//!
//! POSIX's cross-device `EXDEV` is deliberately not enforced here (see the design notes' open
//! question); the mount router is the only place cross-filesystem linking could even be
//! detected, and it doesn't expose `link` across mounts either.

use tracing::{debug, instrument, warn};

use crate::cred::Cred;
use crate::error::{Error, Result};
use crate::stat::AccessMode;

use super::internal::{read_dir_entries, read_stats, resolve, resolve_parent, write_dir_entries};

#[instrument(skip(store, cred), fields(src = src, dst = dst))]
pub async fn link<S: crate::store::Store>(store: &S, src: &str, dst: &str, cred: &Cred) -> Result<()> {
    let mut txn = store.begin_transaction().await?;
    let outcome = async {
        let src_ino = resolve(txn.as_mut(), src).await?;
        let src_stats = read_stats(txn.as_mut(), src_ino).await?;
        if src_stats.is_dir() {
            return Err(Error::is_dir(format!("cannot link directory {src}")));
        }

        let (parent_ino, name) = resolve_parent(txn.as_mut(), dst).await?;
        let parent_stats = read_stats(txn.as_mut(), parent_ino).await?;
        if !parent_stats.has_access(AccessMode::WRITE, cred) {
            return Err(Error::access(format!("no write access to parent of {dst}")));
        }

        let mut entries = read_dir_entries(txn.as_mut(), parent_ino).await?;
        if entries.contains_key(name) {
            return Err(Error::exist(format!("{dst} already exists")));
        }
        entries.insert(name.to_string(), src_ino);
        write_dir_entries(txn.as_mut(), parent_ino, &entries).await?;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            txn.commit().await?;
            debug!("linked entry");
            Ok(())
        }
        Err(err) => {
            txn.abort().await?;
            warn!(error = %err, "link aborted");
            Err(err)
        }
    }
}

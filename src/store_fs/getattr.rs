//! `stat`: resolve a path and return its inode's attributes.

use tracing::instrument;

use crate::cred::Cred;
use crate::error::Result;
use crate::stat::Stats;
use crate::store::Store;

use super::internal::{read_stats, resolve};

#[instrument(skip(store, _cred), fields(path = path))]
pub async fn stat<S: Store>(store: &S, path: &str, _cred: &Cred) -> Result<Stats> {
    let mut txn = store.begin_transaction().await?;
    let result = async {
        let ino = resolve(txn.as_mut(), path).await?;
        read_stats(txn.as_mut(), ino).await
    }
    .await;
    txn.abort().await?;
    result
}

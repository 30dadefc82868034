//! Shared traversal and transaction helpers used by every `store_fs` operation module.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::inode::{self, Ino};
use crate::store::{StoreKey, Transaction};

pub fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Reads and decodes an inode's stat record through an in-progress transaction.
pub async fn read_stats(txn: &mut dyn Transaction, ino: Ino) -> Result<crate::stat::Stats> {
    let bytes = txn
        .get(StoreKey::Record(ino))
        .await?
        .ok_or_else(|| Error::no_entry(format!("no inode record for ino {}", ino.0)))?;
    inode::decode_record(&bytes)
}

/// Reads and decodes a directory's data blob through an in-progress transaction.
pub async fn read_dir_entries(
    txn: &mut dyn Transaction,
    ino: Ino,
) -> Result<BTreeMap<String, Ino>> {
    let bytes = txn.get(StoreKey::Data(ino)).await?.unwrap_or_default();
    inode::decode_directory(&bytes)
}

/// Writes a directory's data blob and bumps its `mtime`/`ctime` through an in-progress
/// transaction.
pub async fn write_dir_entries(
    txn: &mut dyn Transaction,
    ino: Ino,
    entries: &BTreeMap<String, Ino>,
) -> Result<()> {
    txn.put(StoreKey::Data(ino), inode::encode_directory(entries), true).await?;
    let mut stats = read_stats(txn, ino).await?;
    stats.mtime_ms = now_ms();
    stats.ctime_ms = stats.mtime_ms;
    txn.put(StoreKey::Record(ino), inode::encode_record(&stats), true).await?;
    Ok(())
}

/// Resolves an absolute, normalized path to its inode number, starting from the root.
/// `ENOENT` if any component is missing, `ENOTDIR` if a non-terminal component isn't a
/// directory. Symlinks are returned as-is: this core never follows them during traversal.
pub async fn resolve(txn: &mut dyn Transaction, path: &str) -> Result<Ino> {
    let mut current = Ino::ROOT;
    for component in crate::path::components(path) {
        let stats = read_stats(txn, current).await?;
        if !stats.is_dir() {
            return Err(Error::not_dir(format!("{component} is not a directory")));
        }
        let entries = read_dir_entries(txn, current).await?;
        current = *entries
            .get(component)
            .ok_or_else(|| Error::no_entry(format!("no such entry: {component}")))?;
    }
    Ok(current)
}

/// Resolves a path's parent directory inode and its final component name. Fails with
/// `EINVAL` for the root path, which has no parent.
pub async fn resolve_parent<'a>(
    txn: &mut dyn Transaction,
    path: &'a str,
) -> Result<(Ino, &'a str)> {
    let (dir, name) = crate::path::split(path)
        .ok_or_else(|| Error::invalid("path has no parent (is it the root?)"))?;
    let parent_ino = resolve(txn, dir).await?;
    let parent_stats = read_stats(txn, parent_ino).await?;
    if !parent_stats.is_dir() {
        return Err(Error::not_dir(format!("{dir} is not a directory")));
    }
    Ok((parent_ino, name))
}

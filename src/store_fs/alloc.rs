//! Monotonic inode allocator.
//!
//! The next-to-allocate inode number is itself persisted in the store (under
//! [`StoreKey::Allocator`]) rather than kept in a process-local counter, so two `StoreFs`
//! handles opened on the same store never hand out the same `Ino` — and a freed `Ino` is never
//! reused within the lifetime of the store, only within a single aborted transaction.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Result;
use crate::inode::Ino;
use crate::store::{StoreKey, Transaction};

/// First inode number handed out to a user-created file or directory; `0` is reserved for root.
const FIRST_ALLOCATED_INO: u64 = 1;

/// Allocates a fresh, never-before-used inode number through an in-progress transaction.
pub async fn allocate(txn: &mut dyn Transaction) -> Result<Ino> {
    let next = match txn.get(StoreKey::Allocator).await? {
        Some(bytes) if bytes.len() == 8 => LittleEndian::read_u64(&bytes),
        _ => FIRST_ALLOCATED_INO,
    };
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, next + 1);
    txn.put(StoreKey::Allocator, buf.to_vec(), true).await?;
    Ok(Ino(next))
}

//! Fixed-layout inode record and directory entry codec.
//!
//! An inode's record and its data blob are stored as two separate byte strings in the
//! [`crate::store::Store`] (see that module for the key scheme). This module only knows how to
//! turn a [`Stats`]-shaped record into bytes and back, and how a directory's data blob encodes
//! its `name -> ino` mapping; it has no notion of transactions or of where the bytes live.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::stat::Stats;

/// 64-bit inode identifier, unique within a single [`crate::store::Store`]. `Ino(0)` is always
/// the filesystem root and must exist once a [`crate::store_fs::StoreFs`] is ready.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ino(pub u64);

impl Ino {
    pub const ROOT: Ino = Ino(0);
}

impl From<u64> for Ino {
    fn from(value: u64) -> Self {
        Ino(value)
    }
}

impl From<Ino> for u64 {
    fn from(value: Ino) -> Self {
        value.0
    }
}

/// Fixed-width on-disk representation of an inode's metadata (everything in [`Stats`]).
const RECORD_LEN: usize = 8 + 4 + 4 + 4 + 8 + 8 + 8 + 8 + 8;

/// Encodes an inode's [`Stats`] into the fixed-width record format stored under its inode key.
pub fn encode_record(stats: &Stats) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_LEN);
    buf.write_u64::<LittleEndian>(stats.ino).unwrap();
    buf.write_u32::<LittleEndian>(stats.mode).unwrap();
    buf.write_u32::<LittleEndian>(stats.uid).unwrap();
    buf.write_u32::<LittleEndian>(stats.gid).unwrap();
    buf.write_u64::<LittleEndian>(stats.size).unwrap();
    buf.write_i64::<LittleEndian>(stats.atime_ms).unwrap();
    buf.write_i64::<LittleEndian>(stats.mtime_ms).unwrap();
    buf.write_i64::<LittleEndian>(stats.ctime_ms).unwrap();
    buf.write_i64::<LittleEndian>(stats.birthtime_ms).unwrap();
    buf
}

/// Decodes a fixed-width inode record produced by [`encode_record`].
pub fn decode_record(mut bytes: &[u8]) -> Result<Stats> {
    fn read(cursor: &mut &[u8]) -> io::Result<Stats> {
        let ino = cursor.read_u64::<LittleEndian>()?;
        let mode = cursor.read_u32::<LittleEndian>()?;
        let uid = cursor.read_u32::<LittleEndian>()?;
        let gid = cursor.read_u32::<LittleEndian>()?;
        let size = cursor.read_u64::<LittleEndian>()?;
        let atime_ms = cursor.read_i64::<LittleEndian>()?;
        let mtime_ms = cursor.read_i64::<LittleEndian>()?;
        let ctime_ms = cursor.read_i64::<LittleEndian>()?;
        let birthtime_ms = cursor.read_i64::<LittleEndian>()?;
        Ok(Stats { ino, size, mode, uid, gid, atime_ms, mtime_ms, ctime_ms, birthtime_ms })
    }
    read(&mut bytes).map_err(|e| Error::io(format!("corrupt inode record: {e}")))
}

/// Encodes a directory's `name -> ino` mapping as its data blob: a sequence of
/// `(u16 name length, name bytes, u64 ino)` records. Iteration order is the map's key order, so
/// two implementations of this codec produce byte-identical output for the same contents.
pub fn encode_directory(entries: &BTreeMap<String, Ino>) -> Vec<u8> {
    let mut buf = Vec::new();
    for (name, ino) in entries {
        let name_bytes = name.as_bytes();
        buf.write_u16::<LittleEndian>(name_bytes.len() as u16).unwrap();
        buf.write_all(name_bytes).unwrap();
        buf.write_u64::<LittleEndian>(ino.0).unwrap();
    }
    buf
}

/// Decodes a directory data blob produced by [`encode_directory`]. An empty slice decodes to an
/// empty directory.
pub fn decode_directory(mut bytes: &[u8]) -> Result<BTreeMap<String, Ino>> {
    let mut entries = BTreeMap::new();
    while !bytes.is_empty() {
        let name_len = bytes
            .read_u16::<LittleEndian>()
            .map_err(|e| Error::io(format!("corrupt directory blob: {e}")))? as usize;
        let mut name_buf = vec![0u8; name_len];
        bytes
            .read_exact(&mut name_buf)
            .map_err(|e| Error::io(format!("corrupt directory blob: {e}")))?;
        let name = String::from_utf8(name_buf)
            .map_err(|e| Error::io(format!("non-utf8 directory entry name: {e}")))?;
        let ino =
            bytes.read_u64::<LittleEndian>().map_err(|e| Error::io(format!("corrupt directory blob: {e}")))?;
        entries.insert(name, Ino(ino));
    }
    Ok(entries)
}

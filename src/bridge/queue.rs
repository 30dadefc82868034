//! The ordered operation queue pipelined back to the async backend after a sync mutation has
//! already landed on the in-memory mirror.

use crate::cred::Cred;
use crate::error::Result;
use crate::filesystem::FileSystem;
use crate::flags::OpenFlags;
use crate::stat::Stats;

/// One mutation already applied to the mirror, replayed against the async backend in order.
pub enum Op {
    Mkdir { path: String, mode: u32, cred: Cred },
    Rmdir { path: String, cred: Cred },
    Unlink { path: String, cred: Cred },
    Rename { old_path: String, new_path: String, cred: Cred },
    Link { src: String, dst: String, cred: Cred },
    Write { path: String, data: Vec<u8>, mode: u32, cred: Cred },
}

/// Replays a single queued operation against the async backend.
pub async fn apply(backend: &dyn FileSystem, op: &Op) -> Result<()> {
    match op {
        Op::Mkdir { path, mode, cred } => backend.mkdir(path, *mode, cred).await,
        Op::Rmdir { path, cred } => backend.rmdir(path, cred).await,
        Op::Unlink { path, cred } => backend.unlink(path, cred).await,
        Op::Rename { old_path, new_path, cred } => backend.rename(old_path, new_path, cred).await,
        Op::Link { src, dst, cred } => backend.link(src, dst, cred).await,
        Op::Write { path, data, mode, cred } => {
            let handle =
                backend.create_file(path, OpenFlags::parse("w")?, *mode, cred).await?;
            handle.write(0, data).await?;
            handle.close().await
        }
    }
}

pub fn write_op(path: &str, data: Vec<u8>, stats: &Stats, cred: Cred) -> Op {
    Op::Write { path: path.to_string(), data, mode: stats.permission_bits(), cred }
}

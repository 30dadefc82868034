//! Errno-coded error type shared by every component of the core.

use std::fmt;
use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errno-style error kinds the core can emit.
///
/// These mirror the POSIX errno space rather than the full NFSv3 status
/// space: the core speaks file-API errors, not wire-protocol ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No such file or directory.
    NoEntry,
    /// File or directory already exists.
    Exist,
    /// Not a directory.
    NotDir,
    /// Is a directory.
    IsDir,
    /// Directory not empty.
    NotEmpty,
    /// Invalid argument.
    Invalid,
    /// Read-only filesystem.
    ReadOnlyFs,
    /// Operation not permitted.
    NotPermitted,
    /// Permission denied.
    Access,
    /// Operation not supported.
    NotSupported,
    /// I/O error from the underlying store or backend.
    Io,
}

impl ErrorKind {
    /// The conventional errno mnemonic for this kind, used in messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoEntry => "ENOENT",
            ErrorKind::Exist => "EEXIST",
            ErrorKind::NotDir => "ENOTDIR",
            ErrorKind::IsDir => "EISDIR",
            ErrorKind::NotEmpty => "ENOTEMPTY",
            ErrorKind::Invalid => "EINVAL",
            ErrorKind::ReadOnlyFs => "EROFS",
            ErrorKind::NotPermitted => "EPERM",
            ErrorKind::Access => "EACCES",
            ErrorKind::NotSupported => "ENOTSUP",
            ErrorKind::Io => "EIO",
        }
    }
}

/// A single tagged error: errno code plus optional path, syscall name and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    path: Option<PathBuf>,
    syscall: Option<&'static str>,
    message: String,
}

impl Error {
    /// Builds an error from a kind and a human message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, path: None, syscall: None, message: message.into() }
    }

    /// Attaches the path the failing operation was acting on.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches the syscall-like name of the failing operation (e.g. `"mkdir"`).
    pub fn with_syscall(mut self, syscall: &'static str) -> Self {
        self.syscall = Some(syscall);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn syscall(&self) -> Option<&'static str> {
        self.syscall
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn no_entry(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoEntry, message)
    }

    pub fn exist(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exist, message)
    }

    pub fn not_dir(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotDir, message)
    }

    pub fn is_dir(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IsDir, message)
    }

    pub fn not_empty(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotEmpty, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn read_only_fs(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReadOnlyFs, message)
    }

    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotPermitted, message)
    }

    pub fn access(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Access, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// The RPC-failure flavor the async bridge latches on transport/timeout errors.
    pub fn rpc_failed() -> Self {
        Self::io("RPC Failed")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(syscall) = self.syscall {
            write!(f, " ({syscall})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " [{}]", path.display())?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for Error {}

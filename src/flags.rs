//! File open flags: the string form callers pass (`"r"`, `"w+"`, …) and the parsed bitmask.

use crate::error::{Error, Result};

/// Parsed form of a POSIX-style open mode string.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    /// Parses one of `"r" | "r+" | "w" | "w+" | "a" | "a+"`, with an optional trailing `"x"` for
    /// exclusive creation on the `"w"`/`"w+"` forms (matching `O_EXCL`).
    pub fn parse(mode: &str) -> Result<OpenFlags> {
        let (base, exclusive) = match mode.strip_suffix('x') {
            Some(stripped) => (stripped, true),
            None => (mode, false),
        };
        let flags = match base {
            "r" => OpenFlags { read: true, ..Default::default() },
            "r+" => OpenFlags { read: true, write: true, ..Default::default() },
            "w" => OpenFlags { write: true, create: true, truncate: true, ..Default::default() },
            "w+" => OpenFlags {
                read: true,
                write: true,
                create: true,
                truncate: true,
                ..Default::default()
            },
            "a" => OpenFlags { write: true, create: true, append: true, ..Default::default() },
            "a+" => OpenFlags {
                read: true,
                write: true,
                create: true,
                append: true,
                ..Default::default()
            },
            _ => {
                return Err(Error::invalid(format!("unrecognized open flag string {mode:?}")));
            }
        };
        if exclusive && !flags.create {
            return Err(Error::invalid(format!("exclusive flag requires a creating mode: {mode:?}")));
        }
        Ok(OpenFlags { exclusive, ..flags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_posix_mode() {
        assert_eq!(OpenFlags::parse("r").unwrap(), OpenFlags { read: true, ..Default::default() });
        assert!(OpenFlags::parse("w+").unwrap().truncate);
        assert!(OpenFlags::parse("a").unwrap().append);
    }

    #[test]
    fn exclusive_suffix_requires_create() {
        assert!(OpenFlags::parse("wx").unwrap().exclusive);
        assert!(OpenFlags::parse("rx").is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(OpenFlags::parse("q").is_err());
    }
}

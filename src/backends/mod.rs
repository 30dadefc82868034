//! Concrete backends shipped with this crate.

pub mod memory;

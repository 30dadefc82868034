//! Configuration document: the `serde`/`toml`-deserializable mirror of the `configure` entry
//! point's arguments, shared by file-based and in-process configuration.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Result};

/// A single mount's option value: either a literal TOML value, or a nested mount configuration
/// that the registry resolves into a `FileSystem` before handing it to the owning backend (e.g.
/// an overlay backend's `"writable"`/`"readable"` options).
///
/// `serde(untagged)` tries `Mount` first — it only matches tables carrying a `backend` key — and
/// falls back to `Value` for everything else.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MountOptionValue {
    Mount(MountConfig),
    Value(toml::Value),
}

/// One entry of the `mounts` list: an absolute prefix, a backend name, and that backend's
/// options. Also reused, with `prefix` ignored, as the shape of a nested mount-valued option.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    #[serde(default)]
    pub prefix: String,
    pub backend: String,
    #[serde(default)]
    pub options: HashMap<String, MountOptionValue>,
}

/// Top-level configuration document: the mount table to install plus the process credentials
/// `configure` establishes before installing it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub disable_async_cache: bool,
}

impl Configuration {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| Error::invalid(format!("invalid configuration document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_mount_list() {
        let doc = r#"
            uid = 1000
            gid = 1000

            [[mounts]]
            prefix = "/"
            backend = "memory"
        "#;
        let config = Configuration::from_toml_str(doc).unwrap();
        assert_eq!(config.uid, 1000);
        assert_eq!(config.mounts.len(), 1);
        assert_eq!(config.mounts[0].backend, "memory");
    }

    #[test]
    fn parses_nested_mount_valued_option() {
        let doc = r#"
            [[mounts]]
            prefix = "/"
            backend = "overlay"

            [mounts.options.writable]
            backend = "memory"

            [mounts.options.readable]
            backend = "memory"
        "#;
        let config = Configuration::from_toml_str(doc).unwrap();
        let overlay = &config.mounts[0];
        assert!(matches!(overlay.options.get("writable"), Some(MountOptionValue::Mount(_))));
        assert!(matches!(overlay.options.get("readable"), Some(MountOptionValue::Mount(_))));
    }

    #[test]
    fn parses_plain_scalar_option() {
        let doc = r#"
            [[mounts]]
            prefix = "/data"
            backend = "memory"
            options = { capacity = 1024 }
        "#;
        let config = Configuration::from_toml_str(doc).unwrap();
        assert!(matches!(
            config.mounts[0].options.get("capacity"),
            Some(MountOptionValue::Value(toml::Value::Integer(1024)))
        ));
    }
}

//! Backend registry: validates mount options, probes availability, and recursively assembles a
//! mount configuration (including nested mount-valued options) into a ready `FileSystem`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::{Configuration, MountConfig, MountOptionValue};
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::mount::MountTable;

/// Mount configurations may not nest more than this many mount-valued options deep.
const MAX_MOUNT_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    String,
    Number,
    Object,
    Boolean,
    /// A nested mount configuration, resolved to a `FileSystem` before `create` runs.
    Mount,
}

#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub option_type: OptionType,
    pub required: bool,
    pub description: Option<&'static str>,
    /// Extra validation beyond the type check alone (range, format, cross-field constraints).
    /// Run only once the value has already passed the `option_type` check.
    pub validator: Option<fn(&ResolvedOption) -> Result<()>>,
}

/// An option value after recursive resolution: a literal, or a `ready()`-awaited filesystem
/// produced from a nested mount configuration.
pub enum ResolvedOption {
    Value(toml::Value),
    FileSystem(Arc<dyn FileSystem>),
}

/// A factory that produces a [`FileSystem`] from validated options.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn option_specs(&self) -> &[(&'static str, OptionSpec)];

    async fn is_available(&self) -> bool;

    async fn create(&self, options: &HashMap<String, ResolvedOption>) -> Result<Arc<dyn FileSystem>>;
}

#[derive(Default)]
pub struct Registry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    fn validate_options(backend: &dyn Backend, options: &HashMap<String, ResolvedOption>) -> Result<()> {
        for (name, spec) in backend.option_specs() {
            let value = options.get(*name);
            if spec.required && value.is_none() {
                return Err(Error::invalid(format!("{} is missing required option {name}", backend.name())));
            }
            let Some(value) = value else { continue };
            let matches_type = match (spec.option_type, value) {
                (OptionType::String, ResolvedOption::Value(v)) => v.is_str(),
                (OptionType::Number, ResolvedOption::Value(v)) => v.is_integer() || v.is_float(),
                (OptionType::Object, ResolvedOption::Value(v)) => v.is_table(),
                (OptionType::Boolean, ResolvedOption::Value(v)) => v.is_bool(),
                (OptionType::Mount, ResolvedOption::FileSystem(_)) => true,
                _ => false,
            };
            if !matches_type {
                return Err(Error::invalid(format!("option {name} has the wrong type for {}", backend.name())));
            }
            if let Some(validator) = spec.validator {
                validator(value)?;
            }
        }
        Ok(())
    }

    /// Resolves a `FileSystem`, a `Backend` config, or a nested mount configuration into a ready
    /// `FileSystem`. Mount-valued options recurse through this same method with `depth + 1`.
    #[instrument(skip(self, config), fields(backend = config.backend.as_str(), depth = depth))]
    pub async fn resolve_mount_config(&self, config: &MountConfig, depth: u32) -> Result<Arc<dyn FileSystem>> {
        if depth > MAX_MOUNT_DEPTH {
            return Err(Error::invalid("mount configuration nested too deeply"));
        }
        let backend = self
            .backends
            .get(&config.backend)
            .ok_or_else(|| Error::invalid(format!("unknown backend {}", config.backend)))?;

        let mut resolved = HashMap::with_capacity(config.options.len());
        for (name, value) in &config.options {
            let resolved_value = match value {
                MountOptionValue::Mount(nested) => ResolvedOption::FileSystem(
                    Box::pin(self.resolve_mount_config(nested, depth + 1)).await?,
                ),
                MountOptionValue::Value(value) => ResolvedOption::Value(value.clone()),
            };
            resolved.insert(name.clone(), resolved_value);
        }

        Self::validate_options(backend.as_ref(), &resolved)?;
        if !backend.is_available().await {
            return Err(Error::not_permitted(format!("backend {} is not available", config.backend)));
        }
        let fs = backend.create(&resolved).await?;
        fs.ready().await?;
        debug!(backend = config.backend.as_str(), "resolved mount configuration");
        Ok(fs)
    }

    /// Establishes the mount table described by `configuration`: records the process credential
    /// derived from `uid`/`gid` on `table` (see [`MountTable::set_process_cred`]), then installs
    /// each mount. `disable_async_cache` has no effect here — see `DESIGN.md` for why.
    pub async fn configure(&self, table: &MountTable, configuration: &Configuration) -> Result<()> {
        table.set_process_cred(crate::cred::Cred::new(configuration.uid, configuration.gid));
        for mount in &configuration.mounts {
            let fs = self.resolve_mount_config(mount, 0).await?;
            table.mount(&mount.prefix, fs).await?;
        }
        Ok(())
    }

    /// Replaces the root mount with the filesystem described by `mount`.
    pub async fn configure_single(&self, table: &MountTable, mount: &MountConfig) -> Result<()> {
        let fs = self.resolve_mount_config(mount, 0).await?;
        let _ = table.umount("/").await;
        table.mount("/", fs).await
    }
}

//! `MemoryStore`/`MemoryBackend`: the crate's only concrete, in-scope backend — a
//! non-transactional byte map guarded by [`SimpleStore`]'s own transaction adapter, used by
//! tests, doctests and every scenario in the testable-properties section.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::filesystem::FileSystem;
use crate::registry::{Backend, OptionSpec, ResolvedOption};
use crate::store::{RawStore, SimpleStore};
use crate::store_fs::StoreFs;

/// A flat, process-local byte map with no transactional guarantees of its own; wrapped in a
/// [`SimpleStore`] to provide the full `Store` contract.
pub struct MemoryStore {
    map: RwLock<HashMap<u64, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { map: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RawStore for MemoryStore {
    async fn raw_get(&self, key: u64) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().await.get(&key).cloned())
    }

    async fn raw_put(&self, key: u64, bytes: Vec<u8>, overwrite: bool) -> Result<bool> {
        let mut map = self.map.write().await;
        if !overwrite && map.contains_key(&key) {
            return Ok(false);
        }
        map.insert(key, bytes);
        Ok(true)
    }

    async fn raw_delete(&self, key: u64) -> Result<()> {
        self.map.write().await.remove(&key);
        Ok(())
    }

    async fn raw_entries(&self) -> Result<Vec<u64>> {
        Ok(self.map.read().await.keys().copied().collect())
    }
}

/// The `Backend` descriptor for [`MemoryStore`]: no required options, always available.
pub struct MemoryBackend;

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn option_specs(&self) -> &[(&'static str, OptionSpec)] {
        &[]
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn create(
        &self,
        _options: &HashMap<String, ResolvedOption>,
    ) -> Result<Arc<dyn FileSystem>> {
        let store = SimpleStore::new(MemoryStore::new());
        Ok(Arc::new(StoreFs::new(store, "memory")))
    }
}

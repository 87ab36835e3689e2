//! In-process cache storage.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{CacheStorage, check_put_key};
use crate::error::{Error, Result};
use crate::http::{RequestKey, Response};

type Store = HashMap<RequestKey, Response>;

/// Cache storage held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<Vec<(String, Store)>>,
}

impl MemoryCacheStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<(String, Store)>>> {
        self.stores
            .read()
            .map_err(|_| Error::Cache("memory cache lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<(String, Store)>>> {
        self.stores
            .write()
            .map_err(|_| Error::Cache("memory cache lock poisoned".to_string()))
    }
}

fn find_or_create<'a>(stores: &'a mut Vec<(String, Store)>, name: &str) -> &'a mut Store {
    let idx = match stores.iter().position(|(n, _)| n == name) {
        Some(idx) => idx,
        None => {
            stores.push((name.to_string(), Store::new()));
            stores.len() - 1
        }
    };
    &mut stores[idx].1
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        find_or_create(&mut *self.write()?, name);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read()?.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.write()?;
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() < before)
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        if !key.is_cacheable() {
            return Ok(None);
        }
        Ok(self
            .read()?
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, store)| store.get(key).cloned()))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        check_put_key(key)?;
        find_or_create(&mut *self.write()?, name).insert(key.clone(), response.clone());
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self
            .read()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, store)| store.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}

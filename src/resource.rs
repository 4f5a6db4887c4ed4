use std::{fmt, sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use tracing::debug;

use crate::{
    cache::{EntityCache, Keyed},
    Result, TaskDeckClient,
};

/// One REST collection fronted by an [`EntityCache`].
///
/// Reads consult the cache first; writes go to the server first and, on
/// success, are folded into the cached collection instead of discarding it.
pub struct CachedResource<T: Keyed> {
    client: TaskDeckClient,
    path: String,
    cache: EntityCache<T>,
}

impl<T: Keyed> fmt::Debug for CachedResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResource")
            .field("path", &self.path)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<T> CachedResource<T>
where
    T: Keyed + Clone + DeserializeOwned,
    T::Key: fmt::Display,
{
    /// Caches `path` with the default TTL.
    pub fn new(client: TaskDeckClient, path: impl Into<String>) -> Self {
        Self::with_cache(client, path, EntityCache::default())
    }

    pub fn with_ttl(client: TaskDeckClient, path: impl Into<String>, ttl: Duration) -> Self {
        Self::with_cache(client, path, EntityCache::new(ttl))
    }

    fn with_cache(client: TaskDeckClient, path: impl Into<String>, cache: EntityCache<T>) -> Self {
        let path = path.into();
        Self {
            client,
            path: path.trim_end_matches('/').to_owned(),
            cache,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cache(&self) -> &EntityCache<T> {
        &self.cache
    }

    fn item_path(&self, key: &T::Key) -> String {
        format!("{}/{}", self.path, key)
    }

    /// Full collection, from the cache while it is fresh.
    pub async fn list(&self) -> Result<Arc<Vec<T>>> {
        if let Some(hit) = self.cache.get() {
            debug!(path = %self.path, "collection served from cache");
            return Ok(hit);
        }
        let items: Vec<T> = self.client.get(&self.path, ()).await?;
        Ok(self.cache.put(items))
    }

    /// One entity, from the cached collection when possible.
    pub async fn find(&self, key: &T::Key) -> Result<T> {
        if let Some(hit) = self.cache.get_one(key) {
            debug!(path = %self.path, %key, "entity served from cache");
            return Ok(hit);
        }
        self.client.get(&self.item_path(key), ()).await
    }

    /// Creates an entity and folds the server's copy into the cache.
    ///
    /// When the server accepts without echoing the entity the cache is
    /// invalidated, since it can no longer reflect the collection.
    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<Option<T>> {
        let created: Option<T> = self.client.post(&self.path, body).await?;
        match &created {
            Some(entity) => self.cache.update_one(entity.clone()),
            None => self.cache.invalidate(),
        }
        Ok(created)
    }

    /// Replaces an entity and updates it in place in the cache.
    pub async fn update<B: Serialize + ?Sized>(&self, key: &T::Key, body: &B) -> Result<T> {
        let updated: T = self.client.put(&self.item_path(key), body).await?;
        self.cache.update_one(updated.clone());
        Ok(updated)
    }

    /// Deletes an entity and drops it from the cache.
    pub async fn remove(&self, key: &T::Key) -> Result<()> {
        let _: IgnoredAny = self.client.delete(&self.item_path(key)).await?;
        self.cache.remove_one(key);
        Ok(())
    }

    /// Forces the next [`list`](Self::list) to go to the server.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

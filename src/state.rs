use crate::config::ServerConfig;
use crate::graph::{GraphApi, GraphClient};
use anyhow::Result;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub struct AppState {
    config: Arc<ServerConfig>,
    graph: Arc<dyn GraphApi>,
    /// Resolved site ids keyed by locator. Sites are stable enough to cache;
    /// drives, items and sheets are re-fetched on every request so the
    /// available-names lists in errors stay fresh.
    site_cache: RwLock<LruCache<String, String>>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let graph: Arc<dyn GraphApi> = Arc::new(GraphClient::new(&config)?);
        Ok(Self::new_with_graph(config, graph))
    }

    pub fn new_with_graph(config: Arc<ServerConfig>, graph: Arc<dyn GraphApi>) -> Self {
        let capacity = NonZeroUsize::new(config.site_cache_capacity.max(1)).unwrap();
        Self {
            config,
            graph,
            site_cache: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    pub fn graph(&self) -> Arc<dyn GraphApi> {
        self.graph.clone()
    }

    pub fn cached_site_id(&self, key: &str) -> Option<String> {
        self.site_cache.write().get(key).cloned()
    }

    pub fn cache_site_id(&self, key: String, site_id: String) {
        self.site_cache.write().put(key, site_id);
    }
}

//! Namespaced product cache.
//!
//! [`ProductCache`] stores JSON snapshots under `catalog:<namespace>:<key>`
//! with a TTL per namespace. The backend is Redis when reachable at startup,
//! otherwise a bounded in-process LRU. Backend failures are logged and
//! absorbed: a failed read is a miss, a failed write or eviction is dropped.

use async_trait::async_trait;
use core_config::redis::RedisConfig;
use core_config::{ConfigError, FromEnv, env_parse};
use lru::LruCache;
use parking_lot::Mutex;
use redis::Client;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "catalog";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Cache namespaces, each with its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    /// Listings: all, active, by category
    Products,
    /// Single products keyed by id
    ProductById,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Products => "products",
            CacheNamespace::ProductById => "product_by_id",
        }
    }

    fn index(self) -> usize {
        match self {
            CacheNamespace::Products => 0,
            CacheNamespace::ProductById => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub products_ttl: Duration,
    pub product_by_id_ttl: Duration,
    /// Entry bound of the in-process fallback
    pub local_capacity: usize,
}

impl CacheConfig {
    pub fn ttl(&self, namespace: CacheNamespace) -> Duration {
        match namespace {
            CacheNamespace::Products => self.products_ttl,
            CacheNamespace::ProductById => self.product_by_id_ttl,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            products_ttl: Duration::from_secs(600),
            product_by_id_ttl: Duration::from_secs(1800),
            local_capacity: 1024,
        }
    }
}

impl FromEnv for CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            products_ttl: Duration::from_secs(env_parse("CACHE_PRODUCTS_TTL_SECS", 600u64)?),
            product_by_id_ttl: Duration::from_secs(env_parse(
                "CACHE_PRODUCT_BY_ID_TTL_SECS",
                1800u64,
            )?),
            local_capacity: env_parse("CACHE_LOCAL_CAPACITY", 1024usize)?,
        })
    }
}

/// Raw string key-value store behind [`ProductCache`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`, returning how many went
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// Redis backend over a reconnecting `ConnectionManager`
#[derive(Clone)]
pub struct RedisCacheBackend {
    conn: ConnectionManager,
}

impl RedisCacheBackend {
    /// Connect and verify with PING
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        info!("Attempting to connect to Redis at {}", url);

        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Successfully connected to Redis");
        Ok(Self { conn: manager })
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}

/// Bounded in-process LRU with per-entry expiry
pub struct InMemoryCacheBackend {
    entries: Mutex<LruCache<String, (String, Instant)>>,
}

impl InMemoryCacheBackend {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                return Ok(Some(value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        entries.put(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().pop(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.lock();

        let keys: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            entries.pop(key);
        }
        Ok(keys.len() as u64)
    }
}

/// Hit/miss counters since startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Typed, namespaced facade used by the product service
#[derive(Clone)]
pub struct ProductCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    /// Bumped by every eviction in the namespace
    generations: Arc<[AtomicU64; 2]>,
}

impl ProductCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            generations: Arc::new([AtomicU64::new(0), AtomicU64::new(0)]),
        }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        let backend = Arc::new(InMemoryCacheBackend::new(config.local_capacity));
        Self::new(backend, config)
    }

    /// Redis if configured and answering PING, otherwise in-process
    pub async fn connect(redis: &RedisConfig, config: CacheConfig) -> Self {
        let Some(url) = redis.url.as_deref() else {
            info!("REDIS_URL not set, using in-memory product cache");
            return Self::in_memory(config);
        };

        match RedisCacheBackend::connect(url).await {
            Ok(backend) => Self::new(Arc::new(backend), config),
            Err(e) => {
                warn!(error = %e, "Redis unreachable, falling back to in-memory product cache");
                Self::in_memory(config)
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn namespace_prefix(namespace: CacheNamespace) -> String {
        format!("{KEY_PREFIX}:{}:", namespace.as_str())
    }

    fn full_key(namespace: CacheNamespace, key: &str) -> String {
        format!("{}{key}", Self::namespace_prefix(namespace))
    }

    pub async fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        let full_key = Self::full_key(namespace, key);

        let raw = match self.backend.get(&full_key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, key = %full_key, "Cache read failed, treating as miss");
                None
            }
        };

        let Some(raw) = raw else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %full_key, "Cache miss");
            return None;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full_key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(error = %e, key = %full_key, "Discarding undecodable cache entry");
                self.misses.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.backend.delete(&full_key).await {
                    warn!(error = %e, key = %full_key, "Cache eviction failed");
                }
                None
            }
        }
    }

    pub async fn put<T: Serialize + Sync>(&self, namespace: CacheNamespace, key: &str, value: &T) {
        let full_key = Self::full_key(namespace, key);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, key = %full_key, "Failed to serialize cache entry");
                return;
            }
        };

        if let Err(e) = self
            .backend
            .set(&full_key, raw, self.config.ttl(namespace))
            .await
        {
            warn!(error = %e, key = %full_key, "Cache write failed");
        }
    }

    /// Eviction count of `namespace`, taken before a read-through load
    pub fn generation(&self, namespace: CacheNamespace) -> u64 {
        self.generations[namespace.index()].load(Ordering::SeqCst)
    }

    fn bump_generation(&self, namespace: CacheNamespace) {
        self.generations[namespace.index()].fetch_add(1, Ordering::SeqCst);
    }

    /// Store a value loaded while the namespace was at `seen`.
    ///
    /// Skipped when an eviction happened since, and undone when one lands
    /// during the write, so a snapshot read before a committed write never
    /// outlives that write's invalidation.
    pub async fn put_if_current<T: Serialize + Sync>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        seen: u64,
    ) {
        if self.generation(namespace) != seen {
            debug!(namespace = namespace.as_str(), key, "Skipping fill after eviction");
            return;
        }

        self.put(namespace, key, value).await;

        if self.generation(namespace) != seen {
            debug!(namespace = namespace.as_str(), key, "Eviction raced fill, dropping entry");
            let full_key = Self::full_key(namespace, key);
            if let Err(e) = self.backend.delete(&full_key).await {
                warn!(error = %e, key = %full_key, "Cache eviction failed");
            }
        }
    }

    pub async fn evict(&self, namespace: CacheNamespace, key: &str) {
        self.bump_generation(namespace);
        let full_key = Self::full_key(namespace, key);
        if let Err(e) = self.backend.delete(&full_key).await {
            warn!(error = %e, key = %full_key, "Cache eviction failed");
        }
    }

    pub async fn evict_all(&self, namespace: CacheNamespace) {
        self.bump_generation(namespace);
        let prefix = Self::namespace_prefix(namespace);
        match self.backend.delete_prefix(&prefix).await {
            Ok(removed) => debug!(namespace = namespace.as_str(), removed, "Evicted namespace"),
            Err(e) => warn!(error = %e, namespace = namespace.as_str(), "Namespace eviction failed"),
        }
    }
}

//! Key/value service backing the conversation-state cache, the tool-result
//! cache and the rate-limiter counters.
//!
//! Redis is used when configured; every operation degrades to a per-process
//! in-memory map when the pool is absent or a command fails. Degradation is
//! counted and logged but never surfaces to the turn.

use dashmap::DashMap;
use platform::record_counter;
use r2d2::Pool;
use r2d2_redis::redis::Commands;
use r2d2_redis::RedisConnectionManager;
use shared_types::RedisConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{info, warn};

type RedisPool = Pool<RedisConnectionManager>;

#[derive(Clone)]
struct MemEntry {
    value: String,
    expires_at: Option<Instant>,
}

pub struct KvStore {
    redis: Option<RedisPool>,
    memory: DashMap<String, MemEntry>,
    degraded: AtomicBool,
}

impl KvStore {
    /// Build the store. A missing or unreachable Redis configuration is not
    /// an error: the store silently runs in memory-only mode.
    pub fn new(config: Option<&RedisConfig>) -> Arc<Self> {
        let redis = config.and_then(|cfg| {
            let manager = match RedisConnectionManager::new(cfg.url.clone()) {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "invalid Redis URL, using in-memory KV only");
                    return None;
                }
            };

            let pool = Pool::builder()
                .max_size(cfg.pool_size)
                .min_idle(Some(1))
                .connection_timeout(Duration::from_millis(
                    cfg.connection_timeout_ms.unwrap_or(2_000),
                ))
                .build_unchecked(manager);

            info!(url = %cfg.url, pool_size = cfg.pool_size, "Redis KV pool configured");
            Some(pool)
        });

        Arc::new(Self {
            redis,
            memory: DashMap::new(),
            degraded: AtomicBool::new(false),
        })
    }

    /// Memory-only store for tests and Redis-less deployments.
    pub fn in_memory() -> Arc<Self> {
        Self::new(None)
    }

    /// True once any Redis command has failed since startup.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn mark_degraded(&self, op: &'static str, err: &dyn std::fmt::Display) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(%op, error = %err, "Redis unavailable, KV degraded to in-memory fallback");
        }
        record_counter("kv_degraded_ops_total", 1);
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(pool) = &self.redis {
            let pool = pool.clone();
            let key_owned = key.to_string();
            let result = task::spawn_blocking(move || -> Result<Option<String>, String> {
                let mut conn = pool.get().map_err(|e| e.to_string())?;
                conn.get(&key_owned).map_err(|e| e.to_string())
            })
            .await;

            match result {
                Ok(Ok(value)) => return value,
                Ok(Err(e)) => self.mark_degraded("get", &e),
                Err(e) => self.mark_degraded("get", &e),
            }
        }

        self.memory_get(key)
    }

    pub async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) {
        if let Some(pool) = &self.redis {
            let pool = pool.clone();
            let key_owned = key.to_string();
            let value_owned = value.to_string();
            let result = task::spawn_blocking(move || -> Result<(), String> {
                let mut conn = pool.get().map_err(|e| e.to_string())?;
                conn.set_ex(&key_owned, value_owned, ttl_seconds as usize)
                    .map_err(|e: r2d2_redis::redis::RedisError| e.to_string())
            })
            .await;

            match result {
                Ok(Ok(())) => return,
                Ok(Err(e)) => self.mark_degraded("setex", &e),
                Err(e) => self.mark_degraded("setex", &e),
            }
        }

        self.memory_set(key, value, ttl_seconds);
    }

    pub async fn delete(&self, key: &str) {
        if let Some(pool) = &self.redis {
            let pool = pool.clone();
            let key_owned = key.to_string();
            let result = task::spawn_blocking(move || -> Result<(), String> {
                let mut conn = pool.get().map_err(|e| e.to_string())?;
                conn.del(&key_owned)
                    .map_err(|e: r2d2_redis::redis::RedisError| e.to_string())
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.mark_degraded("del", &e),
                Err(e) => self.mark_degraded("del", &e),
            }
        }

        self.memory.remove(key);
    }

    /// Sliding-window counter primitive: INCR, EXPIRE on first increment,
    /// and the remaining window. Returns `(count, ttl_remaining_seconds)`.
    pub async fn incr_with_window(&self, key: &str, window_seconds: u64) -> (u64, u64) {
        if let Some(pool) = &self.redis {
            let pool = pool.clone();
            let key_owned = key.to_string();
            let result = task::spawn_blocking(move || -> Result<(u64, u64), String> {
                let mut conn = pool.get().map_err(|e| e.to_string())?;
                let count: u64 = conn.incr(&key_owned, 1u64).map_err(|e| e.to_string())?;
                if count == 1 {
                    let _: () = conn
                        .expire(&key_owned, window_seconds as usize)
                        .map_err(|e| e.to_string())?;
                }
                let ttl: i64 = conn.ttl(&key_owned).map_err(|e| e.to_string())?;
                let ttl = if ttl < 0 { window_seconds } else { ttl as u64 };
                Ok((count, ttl))
            })
            .await;

            match result {
                Ok(Ok(pair)) => return pair,
                Ok(Err(e)) => self.mark_degraded("incr", &e),
                Err(e) => self.mark_degraded("incr", &e),
            }
        }

        self.memory_incr(key, window_seconds)
    }

    fn memory_get(&self, key: &str) -> Option<String> {
        let entry = self.memory.get(key)?;
        if let Some(expires_at) = entry.expires_at {
            if Instant::now() >= expires_at {
                drop(entry);
                self.memory.remove(key);
                return None;
            }
        }
        Some(entry.value.clone())
    }

    fn memory_set(&self, key: &str, value: &str, ttl_seconds: u64) {
        self.memory.insert(
            key.to_string(),
            MemEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
    }

    fn memory_incr(&self, key: &str, window_seconds: u64) -> (u64, u64) {
        let now = Instant::now();
        let mut entry = self.memory.entry(key.to_string()).or_insert(MemEntry {
            value: "0".to_string(),
            expires_at: Some(now + Duration::from_secs(window_seconds)),
        });

        // Expired windows restart from zero.
        if matches!(entry.expires_at, Some(t) if now >= t) {
            entry.value = "0".to_string();
            entry.expires_at = Some(now + Duration::from_secs(window_seconds));
        }

        let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        let ttl = entry
            .expires_at
            .map(|t| t.saturating_duration_since(now).as_secs())
            .unwrap_or(window_seconds);
        (count, ttl)
    }
}

//! Shared Store Client (SSC): thin typed facade over the shared
//! in-memory store. Every other component goes through this trait;
//! nothing else speaks to Redis directly.

use async_trait::async_trait;
use batch_common::{Error, Result};
use redis::AsyncCommands;
use tracing::debug;

#[async_trait]
pub trait SharedStoreClient: Send + Sync {
    /// Byte-blob get, used for the packed time-series value.
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Decoded-string get, used for small scalar keys.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()>;
    async fn set_add(&self, set: &str, member: &str) -> Result<()>;
    async fn set_remove(&self, set: &str, member: &str) -> Result<()>;
    async fn set_members(&self, set: &str) -> Result<Vec<String>>;
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;
    async fn list_clear(&self, key: &str) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}

/// Production client: two parallel connections opened off the same
/// `redis::Client`, one typed for raw bytes (the packed series blob)
/// and one typed for decoded UTF-8 strings (set membership and small
/// keys) — mirroring the original's `redis_conn` / `redis_conn_decoded`
/// split (spec.md §4.1).
pub struct RedisStore {
    raw: redis::aio::MultiplexedConnection,
    decoded: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Store(format!("invalid redis url: {e}")))?;
        let raw = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::Store(format!("raw connection failed: {e}")))?;
        let decoded = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::Store(format!("decoded connection failed: {e}")))?;
        Ok(Self { raw, decoded })
    }
}

#[async_trait]
impl SharedStoreClient for RedisStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.raw.clone();
        conn.get(key)
            .await
            .map_err(|e| Error::Store(format!("GET {key}: {e}")))
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.decoded.clone();
        conn.get(key)
            .await
            .map_err(|e| Error::Store(format!("GET {key}: {e}")))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.decoded.clone();
        let ttl = ttl_secs.max(1) as u64;
        conn.set_ex::<_, _, ()>(key, value, ttl)
            .await
            .map_err(|e| Error::Store(format!("SETEX {key}: {e}")))
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.decoded.clone();
        conn.sadd::<_, _, ()>(set, member)
            .await
            .map_err(|e| Error::Store(format!("SADD {set}: {e}")))
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.decoded.clone();
        conn.srem::<_, _, ()>(set, member)
            .await
            .map_err(|e| Error::Store(format!("SREM {set}: {e}")))
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>> {
        let mut conn = self.decoded.clone();
        conn.smembers(set)
            .await
            .map_err(|e| Error::Store(format!("SMEMBERS {set}: {e}")))
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.decoded.clone();
        conn.lrange(key, 0, -1)
            .await
            .map_err(|e| Error::Store(format!("LRANGE {key}: {e}")))
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.decoded.clone();
        conn.rpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| Error::Store(format!("RPUSH {key}: {e}")))
    }

    async fn list_clear(&self, key: &str) -> Result<()> {
        let mut conn = self.decoded.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::Store(format!("DEL {key}: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.decoded.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("PING: {e}")))?;
        debug!("store ping ok");
        Ok(())
    }
}

/// An in-memory stand-in for `RedisStore`, used by tests throughout the
/// workspace so component logic tests without a live Redis
/// (SPEC_FULL.md §8). Not `cfg(test)`-gated because downstream crates'
/// own test modules need to construct it too.
pub mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeStore {
        pub bytes: Mutex<HashMap<String, Vec<u8>>>,
        pub strings: Mutex<HashMap<String, String>>,
        pub sets: Mutex<HashMap<String, HashSet<String>>>,
        pub lists: Mutex<HashMap<String, Vec<String>>>,
    }

    #[async_trait]
    impl SharedStoreClient for FakeStore {
        async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.bytes.lock().await.get(key).cloned())
        }
        async fn get_string(&self, key: &str) -> Result<Option<String>> {
            Ok(self.strings.lock().await.get(key).cloned())
        }
        async fn set_with_ttl(&self, key: &str, value: &str, _ttl_secs: i64) -> Result<()> {
            self.strings.lock().await.insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn set_add(&self, set: &str, member: &str) -> Result<()> {
            self.sets.lock().await.entry(set.to_string()).or_default().insert(member.to_string());
            Ok(())
        }
        async fn set_remove(&self, set: &str, member: &str) -> Result<()> {
            if let Some(s) = self.sets.lock().await.get_mut(set) {
                s.remove(member);
            }
            Ok(())
        }
        async fn set_members(&self, set: &str) -> Result<Vec<String>> {
            Ok(self.sets.lock().await.get(set).cloned().unwrap_or_default().into_iter().collect())
        }
        async fn list_range(&self, key: &str) -> Result<Vec<String>> {
            Ok(self.lists.lock().await.get(key).cloned().unwrap_or_default())
        }
        async fn list_push(&self, key: &str, value: &str) -> Result<()> {
            self.lists.lock().await.entry(key.to_string()).or_default().push(value.to_string());
            Ok(())
        }
        async fn list_clear(&self, key: &str) -> Result<()> {
            self.lists.lock().await.remove(key);
            Ok(())
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

}

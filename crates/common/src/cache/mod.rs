//! Pipeline checkpoint storage
//!
//! Provides:
//! - Redis-backed checkpoints with TTL and key prefix
//! - In-memory checkpoints when Redis is not configured
//! - Key builders

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Stores the last completed pipeline state of a draft
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, draft_id: Uuid, state: &Value) -> Result<()>;

    async fn load(&self, draft_id: Uuid) -> Result<Option<Value>>;

    async fn clear(&self, draft_id: Uuid) -> Result<bool>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Redis checkpoint client
pub struct RedisCheckpoints {
    connection: ConnectionManager,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisCheckpoints {
    /// Connect to Redis
    pub async fn new(url: &str, config: &RedisConfig) -> Result<Self> {
        let client = Client::open(url).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: config.checkpoint_ttl_secs,
        })
    }

    /// Build a prefixed key
    fn key(&self, draft_id: Uuid) -> String {
        format!("{}:{}", self.key_prefix, keys::checkpoint(draft_id))
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpoints {
    async fn save(&self, draft_id: Uuid, state: &Value) -> Result<()> {
        let full_key = self.key(draft_id);
        let json = serde_json::to_string(state)?;

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&full_key, &json, self.ttl_secs)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs = self.ttl_secs, bytes = json.len(), "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, draft_id: Uuid) -> Result<Option<Value>> {
        let full_key = self.key(draft_id);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", full_key, e),
        })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse checkpoint: {}", e),
                })?;
                debug!(key = %full_key, "Checkpoint hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Checkpoint miss");
                Ok(None)
            }
        }
    }

    async fn clear(&self, draft_id: Uuid) -> Result<bool> {
        let full_key = self.key(draft_id);
        let mut conn = self.connection.clone();

        let deleted: i32 = conn.del(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to delete key '{}': {}", full_key, e),
        })?;

        Ok(deleted > 0)
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// Process-local checkpoints
#[derive(Default)]
pub struct MemoryCheckpoints {
    entries: RwLock<HashMap<Uuid, Value>>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn save(&self, draft_id: Uuid, state: &Value) -> Result<()> {
        self.entries.write().await.insert(draft_id, state.clone());
        Ok(())
    }

    async fn load(&self, draft_id: Uuid) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(&draft_id).cloned())
    }

    async fn clear(&self, draft_id: Uuid) -> Result<bool> {
        Ok(self.entries.write().await.remove(&draft_id).is_some())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Create the checkpoint store selected by configuration
pub async fn create_checkpoint_store(config: &RedisConfig) -> Result<Arc<dyn CheckpointStore>> {
    match config.url.as_deref() {
        Some(url) if !url.is_empty() => {
            let store = RedisCheckpoints::new(url, config).await?;
            store.ping().await?;
            info!("Pipeline checkpoints stored in Redis");
            Ok(Arc::new(store))
        }
        _ => {
            info!("Redis not configured, pipeline checkpoints kept in memory");
            Ok(Arc::new(MemoryCheckpoints::new()))
        }
    }
}

/// Cache key builder helpers
pub mod keys {
    use uuid::Uuid;

    /// Build a pipeline checkpoint key
    pub fn checkpoint(draft_id: Uuid) -> String {
        format!("pipeline:{}", draft_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_builders() {
        let draft_id = Uuid::new_v4();
        assert_eq!(keys::checkpoint(draft_id), format!("pipeline:{}", draft_id));
    }

    #[tokio::test]
    async fn test_memory_checkpoints() {
        let store = MemoryCheckpoints::new();
        let draft_id = Uuid::new_v4();

        assert!(store.load(draft_id).await.unwrap().is_none());
        store.save(draft_id, &json!({"stage": "pdf_ready"})).await.unwrap();
        assert_eq!(
            store.load(draft_id).await.unwrap(),
            Some(json!({"stage": "pdf_ready"}))
        );
        assert!(store.clear(draft_id).await.unwrap());
        assert!(!store.clear(draft_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_factory_without_redis() {
        let config = RedisConfig {
            url: None,
            checkpoint_ttl_secs: 60,
            key_prefix: "test".to_string(),
        };
        let store = create_checkpoint_store(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
    }
}

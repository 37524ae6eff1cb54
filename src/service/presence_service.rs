// service/presence_service.rs
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use redis::{aio::ConnectionManager, AsyncCommands};
use tokio::sync::Mutex;
use uuid::Uuid;

fn typing_key(conversation_id: Uuid, user_id: Uuid) -> String {
    format!("typing:{}:{}", conversation_id, user_id)
}

/// Short-lived "is typing" flags. Entries vanish on their own after the TTL;
/// the last writer wins.
pub struct PresenceService {
    redis: Option<Arc<ConnectionManager>>,
    local: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl PresenceService {
    pub fn new(redis: Option<Arc<ConnectionManager>>, ttl: Duration) -> Self {
        Self {
            redis,
            local: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn set_typing(&self, conversation_id: Uuid, user_id: Uuid) {
        let key = typing_key(conversation_id, user_id);

        if let Some(redis) = &self.redis {
            let mut conn = ConnectionManager::clone(redis);
            let ttl_seconds = self.ttl.as_secs().max(1) as usize;
            match conn.set_ex::<_, _, ()>(&key, "1", ttl_seconds).await {
                Ok(()) => return,
                Err(e) => tracing::warn!("Redis typing write failed for {}: {}", key, e),
            }
        }

        let mut local = self.local.lock().await;
        let now = Instant::now();
        local.retain(|_, expires_at| *expires_at > now);
        local.insert(key, now + self.ttl);
    }

    pub async fn is_typing(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        let key = typing_key(conversation_id, user_id);

        if let Some(redis) = &self.redis {
            let mut conn = ConnectionManager::clone(redis);
            match conn.exists::<_, bool>(&key).await {
                Ok(exists) => return exists,
                Err(e) => tracing::warn!("Redis typing read failed for {}: {}", key, e),
            }
        }

        let local = self.local.lock().await;
        local
            .get(&key)
            .map(|expires_at| *expires_at > Instant::now())
            .unwrap_or(false)
    }
}

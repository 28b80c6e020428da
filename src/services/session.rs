//! Server-side session revocation.
//!
//! Tokens are stateless JWTs; logging out records the token's `jti` until the
//! token would have expired anyway. Redis backs this in deployments with more
//! than one API instance, an in-process map otherwise.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use redis::AsyncCommands;

use crate::errors::AppError;

const KEY_PREFIX: &str = "pmtrack:revoked:";

#[derive(Debug, Clone)]
pub enum SessionStore {
    Redis(redis::Client),
    Memory(Arc<Mutex<HashMap<String, i64>>>),
}

impl SessionStore {
    pub fn from_url(redis_url: Option<&str>) -> Result<Self, AppError> {
        match redis_url {
            Some(url) => redis::Client::open(url)
                .map(SessionStore::Redis)
                .map_err(|e| AppError::Internal(format!("Invalid REDIS_URL: {e}"))),
            None => Ok(Self::in_memory()),
        }
    }

    pub fn in_memory() -> Self {
        SessionStore::Memory(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Mark a token id as revoked until `expires_at` (unix seconds).
    pub async fn revoke(&self, jti: &str, expires_at: i64) -> Result<(), AppError> {
        let now = Utc::now().timestamp();
        let ttl = expires_at - now;
        if ttl <= 0 {
            return Ok(());
        }

        match self {
            SessionStore::Redis(client) => {
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(redis_error)?;
                let _: () = conn
                    .set_ex(format!("{KEY_PREFIX}{jti}"), 1, ttl as u64)
                    .await
                    .map_err(redis_error)?;
            }
            SessionStore::Memory(map) => {
                let mut map = map
                    .lock()
                    .map_err(|_| AppError::Internal("Session store poisoned".to_string()))?;
                map.retain(|_, exp| *exp > now);
                map.insert(jti.to_string(), expires_at);
            }
        }
        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        match self {
            SessionStore::Redis(client) => {
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(redis_error)?;
                conn.exists(format!("{KEY_PREFIX}{jti}"))
                    .await
                    .map_err(redis_error)
            }
            SessionStore::Memory(map) => {
                let map = map
                    .lock()
                    .map_err(|_| AppError::Internal("Session store poisoned".to_string()))?;
                Ok(map
                    .get(jti)
                    .is_some_and(|exp| *exp > Utc::now().timestamp()))
            }
        }
    }
}

fn redis_error(e: redis::RedisError) -> AppError {
    tracing::warn!(error = %e, "Session store unavailable");
    AppError::Internal(format!("Session store error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_revokes_until_expiry() {
        let store = SessionStore::in_memory();
        let exp = Utc::now().timestamp() + 600;
        assert!(!store.is_revoked("abc").await.unwrap());
        store.revoke("abc", exp).await.unwrap();
        assert!(store.is_revoked("abc").await.unwrap());
        assert!(!store.is_revoked("other").await.unwrap());
    }

    #[tokio::test]
    async fn already_expired_tokens_are_not_stored() {
        let store = SessionStore::in_memory();
        store
            .revoke("old", Utc::now().timestamp() - 10)
            .await
            .unwrap();
        assert!(!store.is_revoked("old").await.unwrap());
    }

    #[test]
    fn missing_url_uses_memory() {
        assert!(matches!(
            SessionStore::from_url(None).unwrap(),
            SessionStore::Memory(_)
        ));
    }
}

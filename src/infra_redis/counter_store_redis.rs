use crate::application_port::CounterError;
use crate::domain_port::CounterStore;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Counters as plain Redis integers. `INCR` is atomic on the server, so no client-side locking.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisCounterStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }
}

#[async_trait::async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let value: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| CounterError::Store(e.to_string()))?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn
            .get(&key)
            .await
            .map_err(|e| CounterError::Store(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(&key, value)
            .await
            .map_err(|e| CounterError::Store(e.to_string()))?;
        Ok(())
    }
}

use crate::application_port::{CounterError, VisitorCounter};
use crate::domain_port::CounterStore;
use crate::logger::*;
use std::sync::Arc;

pub const DEFAULT_COUNTER_NAME: &str = "api_visits";

/// Site-wide visit counter. All arithmetic happens inside the shared cache.
pub struct RealVisitorCounter {
    store: Arc<dyn CounterStore>,
    key: String,
}

impl RealVisitorCounter {
    pub fn new(store: Arc<dyn CounterStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait::async_trait]
impl VisitorCounter for RealVisitorCounter {
    async fn increment(&self) -> Result<i64, CounterError> {
        self.store.incr(&self.key).await
    }

    async fn read(&self) -> Result<i64, CounterError> {
        Ok(self.store.get(&self.key).await?.unwrap_or(0))
    }

    async fn reset(&self) -> Result<(), CounterError> {
        self.store.set(&self.key, 0).await?;
        info!(key = %self.key, "visitor counter reset");
        Ok(())
    }
}

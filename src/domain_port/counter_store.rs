use crate::application_port::CounterError;

/// Shared cache holding named integer counters.
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomic increment by one, performed inside the store. Returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, CounterError>;
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError>;
    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError>;
}

use crate::application_port::CounterError;
use crate::domain_port::CounterStore;
use dashmap::DashMap;

/// Counters live in a sharded map; each increment holds the entry's shard lock.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, i64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, CounterError> {
        Ok(self.counters.get(key).map(|value| *value))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
        self.counters.insert(key.to_string(), value);
        Ok(())
    }
}

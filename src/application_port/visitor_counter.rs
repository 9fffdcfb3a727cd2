#[derive(Debug, Clone, thiserror::Error)]
pub enum CounterError {
    #[error("store error: {0}")]
    Store(String),
}

#[async_trait::async_trait]
pub trait VisitorCounter: Send + Sync {
    async fn increment(&self) -> Result<i64, CounterError>;
    async fn read(&self) -> Result<i64, CounterError>;
    /// Operator action. The counter is never reset otherwise.
    async fn reset(&self) -> Result<(), CounterError>;
}

use crate::application_port::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Lets at most one full sync run at a time. Scheduled and operator-triggered runs queue
/// behind each other instead of interleaving pages.
pub struct SerializedCatalogSync {
    inner: Arc<dyn CatalogSync>,
    running: Mutex<()>,
}

impl SerializedCatalogSync {
    pub fn new(inner: Arc<dyn CatalogSync>) -> Self {
        Self {
            inner,
            running: Mutex::new(()),
        }
    }
}

#[async_trait::async_trait]
impl CatalogSync for SerializedCatalogSync {
    async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
        let _running = self.running.lock().await;
        self.inner.run_full_sync().await
    }
}

pub struct SyncScheduler {
    catalog_sync: Arc<dyn CatalogSync>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        catalog_sync: Arc<dyn CatalogSync>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            catalog_sync,
            interval,
            cancellation_token,
        }
    }

    /// Runs a sync immediately, then once per interval, until cancelled. A run in
    /// flight at cancellation is dropped; pages already committed stay committed.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("sync scheduler shutting down...");
                    break;
                }
                result = async {
                    ticker.tick().await;
                    self.catalog_sync.run_full_sync().await
                } => {
                    match result {
                        Ok(report) => debug!(
                            records_upserted = report.records_upserted,
                            "scheduled catalog sync finished"
                        ),
                        Err(e) => error!("scheduled catalog sync failed: {:#}", e),
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::*;
    use crate::domain_port::*;
    use crate::infra_memory::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(id: i64) -> ExternalRecord {
        ExternalRecord {
            id: Some(id),
            title: Some(format!("movie {id}")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        let source = Arc::new(ScriptedCatalogSource::new(vec![vec![record(1), record(2)]]));
        let repo = Arc::new(MemoryCatalogRepo::new());
        let sync: Arc<dyn CatalogSync> = Arc::new(RealCatalogSync::new(
            source.clone(),
            repo.clone(),
            Arc::new(SystemClock),
            SyncConfig::default(),
        ));
        let cancel = CancellationToken::new();
        let scheduler = SyncScheduler::new(sync, Duration::from_millis(20), cancel.clone());

        let handle = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(110)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(source.requests(1) >= 2);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.write_count(), 2);
    }

    struct Overlap {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogSync for Overlap {
        async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(SyncReport::default())
        }
    }

    #[tokio::test]
    async fn serialized_runs_never_overlap() {
        let probe = Arc::new(Overlap {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let sync = Arc::new(SerializedCatalogSync::new(probe.clone()));

        let runs = (0..4).map(|_| {
            let sync = sync.clone();
            tokio::spawn(async move { sync.run_full_sync().await })
        });
        for run in futures_util::future::join_all(runs).await {
            run.unwrap().unwrap();
        }
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }
}

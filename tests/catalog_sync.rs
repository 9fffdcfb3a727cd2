use moviehub::application_impl::*;
use moviehub::application_port::*;
use moviehub::domain_model::*;
use moviehub::domain_port::*;
use moviehub::infra_memory::*;
use std::sync::Arc;
use std::time::Duration;

fn movie(id: i64) -> ExternalRecord {
    ExternalRecord {
        id: Some(id),
        title: Some(format!("Movie {id}")),
        overview: Some(format!("Overview of movie {id}")),
        poster_path: Some(format!("/poster/{id}.jpg")),
        vote_average: Some(7.0 + (id % 3) as f64 / 10.0),
        release_date: Some("2019-05-30".into()),
        ..Default::default()
    }
}

/// `pages` pages of `per_page` distinct movies with ids starting at 1.
fn catalog(pages: i64, per_page: i64) -> Vec<Vec<ExternalRecord>> {
    (0..pages)
        .map(|p| (1..=per_page).map(|i| movie(p * per_page + i)).collect())
        .collect()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        multiplier: 2.0,
    }
}

struct Pipeline {
    source: Arc<ScriptedCatalogSource>,
    repo: Arc<MemoryCatalogRepo>,
    sync: RealCatalogSync,
}

fn pipeline(pages: Vec<Vec<ExternalRecord>>, max_pages: u32) -> Pipeline {
    let source = Arc::new(ScriptedCatalogSource::new(pages));
    let repo = Arc::new(MemoryCatalogRepo::new());
    let sync = RealCatalogSync::new(
        source.clone(),
        repo.clone(),
        Arc::new(SystemClock),
        SyncConfig {
            max_pages,
            retry: fast_retry(3),
        },
    );
    Pipeline { source, repo, sync }
}

#[tokio::test]
async fn second_run_over_unchanged_data_writes_nothing() {
    let p = pipeline(catalog(3, 5), 10);

    let first = p.sync.run_full_sync().await.unwrap();
    assert_eq!(first.pages_fetched, 3);
    assert_eq!(first.records_inserted, 15);
    assert_eq!(first.records_upserted, 15);
    assert!(!first.reached_page_ceiling);

    let second = p.sync.run_full_sync().await.unwrap();
    assert_eq!(second.records_upserted, 0);
    assert_eq!(second.records_unchanged, 15);
    assert_eq!(p.repo.count().await.unwrap(), 15);
    assert_eq!(p.repo.write_count(), 15);
}

#[tokio::test]
async fn changed_content_is_updated_in_place() {
    let p = pipeline(catalog(1, 3), 10);
    p.sync.run_full_sync().await.unwrap();

    let mut pages = catalog(1, 3);
    pages[0][1].title = Some("Renamed".into());
    p.source.set_pages(pages);

    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(report.records_updated, 1);
    assert_eq!(report.records_unchanged, 2);
    assert_eq!(p.repo.count().await.unwrap(), 3);
    let stored = p.repo.get(ExternalId(2)).await.unwrap().unwrap();
    assert_eq!(stored.content.title, "Renamed");
}

#[tokio::test]
async fn transient_and_rate_limited_fetches_are_retried() {
    let p = pipeline(catalog(2, 2), 10);
    p.source.fail_then_succeed(
        2,
        vec![
            FetchError::Transient("connection reset".into()),
            FetchError::RateLimited {
                retry_after: Some(Duration::from_millis(2)),
            },
        ],
    );

    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(p.source.requests(2), 3);
    assert_eq!(report.records_inserted, 4);
    assert_eq!(report.errors.len(), 2);
    assert!(matches!(
        report.errors[0],
        SyncIssue::TransientFetchError {
            page: 2,
            attempt: 1,
            ..
        }
    ));
    assert_eq!(
        report.errors[1],
        SyncIssue::RateLimited {
            page: 2,
            attempt: 2
        }
    );
}

#[tokio::test]
async fn exhausted_retries_fail_with_partial_report_and_rerun_does_not_duplicate() {
    let p = pipeline(catalog(3, 4), 10);
    p.source
        .fail_always(3, FetchError::Transient("gateway timeout".into()));

    let error = p.sync.run_full_sync().await.unwrap_err();
    let SyncError::Failed {
        failed_in, report, ..
    } = &error;
    assert_eq!(*failed_in, SyncState::Fetching { page: 3 });
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.records_inserted, 8);
    assert_eq!(p.source.requests(3), 3);
    assert_eq!(p.repo.count().await.unwrap(), 8);

    p.source.heal(3);
    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(report.records_inserted, 4);
    assert_eq!(report.records_unchanged, 8);
    assert_eq!(p.repo.count().await.unwrap(), 12);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let p = pipeline(catalog(2, 2), 10);
    p.source
        .fail_always(1, FetchError::Permanent("401 invalid api key".into()));

    let error = p.sync.run_full_sync().await.unwrap_err();
    assert_eq!(p.source.requests(1), 1);
    assert_eq!(error.report().pages_fetched, 0);
    assert_eq!(p.repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_and_repeated_records_are_skipped() {
    let mut pages = catalog(2, 3);
    pages[0].push(ExternalRecord {
        title: Some("No id".into()),
        ..Default::default()
    });
    pages[1].push(ExternalRecord {
        id: Some(-4),
        ..Default::default()
    });
    pages[1].push(movie(1));
    let p = pipeline(pages, 10);

    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(report.records_seen, 9);
    assert_eq!(report.records_inserted, 6);
    assert_eq!(report.records_skipped, 2);
    assert_eq!(report.records_duplicate, 1);
    assert_eq!(
        report.errors,
        vec![
            SyncIssue::MalformedRecord {
                page: 1,
                index: 3,
                reason: MalformedRecord::MissingId.to_string(),
            },
            SyncIssue::MalformedRecord {
                page: 2,
                index: 3,
                reason: MalformedRecord::InvalidId(-4).to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn page_ceiling_bounds_a_run() {
    let p = pipeline(catalog(12, 1), 10);

    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(report.pages_fetched, 10);
    assert!(report.reached_page_ceiling);
    assert_eq!(p.source.requests(11), 0);
    assert_eq!(p.repo.count().await.unwrap(), 10);
}

#[tokio::test]
async fn store_failure_fails_the_run_while_upserting() {
    let p = pipeline(catalog(2, 2), 10);
    p.repo.set_failing(true);

    let error = p.sync.run_full_sync().await.unwrap_err();
    let SyncError::Failed { failed_in, .. } = &error;
    assert_eq!(*failed_in, SyncState::Upserting { page: 1 });
    assert_eq!(error.report().records_upserted, 0);

    p.repo.set_failing(false);
    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(report.records_inserted, 4);
}

#[tokio::test]
async fn empty_source_completes_with_nothing_to_do() {
    let p = pipeline(vec![], 10);

    let report = p.sync.run_full_sync().await.unwrap();
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report, SyncReport {
        pages_fetched: 1,
        ..Default::default()
    });
}

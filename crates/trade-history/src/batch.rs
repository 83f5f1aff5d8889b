//! Fixed-window batch scheduling for enrichment runs.
//!
//! Records run in groups; every member of a group is awaited together
//! (`join_all`, no spawned tasks) before a fixed pause and the next group.
//! Each record gets its own result slot, so one failure never cancels its
//! siblings. Nothing is retried here.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::constants::{BATCH_GROUP_SIZE, BATCH_PAUSE};
use crate::enrich::Enricher;
use crate::error::Result;
use crate::types::{EnrichedTransactionRecord, PendingRecord};

/// Group size and inter-group pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub group_size: usize,
    pub pause: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            group_size: BATCH_GROUP_SIZE,
            pause: BATCH_PAUSE,
        }
    }
}

/// Run `f` over `items` group by group. Results come back in input order.
pub async fn run_in_groups<'a, T, R, F, Fut>(items: &'a [T], policy: &BatchPolicy, f: F) -> Vec<R>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = R>,
{
    let group_size = policy.group_size.max(1);
    let group_count = items.len().div_ceil(group_size);
    let mut results = Vec::with_capacity(items.len());

    for (index, group) in items.chunks(group_size).enumerate() {
        results.extend(join_all(group.iter().map(&f)).await);

        if index + 1 < group_count {
            sleep(policy.pause).await;
        }
    }

    results
}

/// Run `f` over `items` with at most `limit` futures in flight. Results come
/// back in input order.
pub async fn run_bounded<'a, T, R, F, Fut>(items: &'a [T], limit: usize, f: F) -> Vec<R>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items.iter().map(f)).buffered(limit.max(1)).collect().await
}

/// Outcome of an enrichment run, one slot per input record.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<Result<EnrichedTransactionRecord>>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }
}

impl Enricher {
    /// Enrich `records` under `policy`.
    pub async fn enrich_batch(&self, records: &[PendingRecord], policy: &BatchPolicy) -> BatchReport {
        info!(
            records = records.len(),
            group_size = policy.group_size,
            pause_ms = policy.pause.as_millis() as u64,
            "starting enrichment batch"
        );

        let results = run_in_groups(records, policy, |record| self.enrich(record)).await;
        let report = BatchReport { results };

        if report.failed() > 0 {
            warn!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "enrichment batch finished with failures"
            );
        } else {
            info!(succeeded = report.succeeded(), "enrichment batch finished");
        }

        report
    }
}

// Persistence coordinator: the single writer of StoredRecord.
//
// Two independent sinks sit behind one trait. The flat-file sink replaces a
// topic's snapshot wholesale; the relational sink upserts by post_id. Each
// sink is its own failure boundary: a sink that exhausts its retries is
// reported per topic and the other sink's writes stand.

pub mod flat_file;
pub mod postgres;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentiment_common::{dedupe_last_wins, StoredRecord};
use thiserror::Error;
use tracing::{info, warn};

pub use flat_file::CsvSnapshotSink;
pub use postgres::PostgresSink;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Worth retrying: connection drops, pool timeouts, interrupted I/O.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help: bad path, permission, constraint violation.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Outcome of one successful topic write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkWrite {
    pub rows: usize,
    /// Rows that replaced an existing entry rather than adding a new one.
    pub updated: usize,
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make the sink reflect `records` for `topic`. Records are unique by post_id.
    async fn write_topic(&self, topic: &str, records: &[StoredRecord]) -> Result<SinkWrite, SinkError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    fn delay_before(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

/// A topic batch a sink could not take.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFailure {
    pub sink: &'static str,
    pub topic: String,
    pub records: usize,
    pub attempts: u32,
    pub error: SinkError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistResult {
    /// Distinct records that every enabled sink accepted.
    pub written: usize,
    /// Input records that repeated an earlier post_id and were folded into it.
    pub skipped_duplicates: usize,
    /// Records lost per sink after retries ran out.
    pub write_failures_by_sink: BTreeMap<String, usize>,
    pub failures: Vec<SinkFailure>,
}

impl PersistResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct PersistenceCoordinator {
    sinks: Vec<Arc<dyn RecordSink>>,
    retry: RetryPolicy,
}

impl PersistenceCoordinator {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            sinks: Vec::new(),
            retry,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Write `records` to every sink. Each topic in `topics` is written even
    /// when no record belongs to it, so its snapshot drops rows from earlier runs.
    pub async fn persist(&self, topics: &[String], records: Vec<StoredRecord>) -> PersistResult {
        let (records, skipped_duplicates) = dedupe_last_wins(records, |r| r.post_id.as_str());
        if skipped_duplicates > 0 {
            info!(skipped_duplicates, "Collapsed repeated post ids, keeping the latest copy");
        }

        let mut by_topic: BTreeMap<String, Vec<StoredRecord>> = topics
            .iter()
            .map(|topic| (topic.clone(), Vec::new()))
            .collect();
        for record in records {
            by_topic.entry(record.topic.clone()).or_default().push(record);
        }
        for batch in by_topic.values_mut() {
            batch.sort_by(|a, b| a.post_id.cmp(&b.post_id));
        }

        // Sinks are independent, so they run side by side; each one writes its
        // topics in order on its own, which keeps a single writer per sink.
        let per_sink = futures::future::join_all(
            self.sinks
                .iter()
                .map(|sink| self.write_all_topics(sink.as_ref(), &by_topic)),
        )
        .await;

        let mut result = PersistResult {
            skipped_duplicates,
            ..Default::default()
        };
        for sink in &self.sinks {
            result.write_failures_by_sink.entry(sink.name().to_string()).or_insert(0);
        }

        for failures in per_sink {
            for failure in failures {
                *result
                    .write_failures_by_sink
                    .entry(failure.sink.to_string())
                    .or_insert(0) += failure.records;
                result.failures.push(failure);
            }
        }

        result.written = by_topic
            .iter()
            .filter(|(topic, _)| !result.failures.iter().any(|f| &f.topic == *topic))
            .map(|(_, batch)| batch.len())
            .sum();

        info!(
            written = result.written,
            skipped_duplicates = result.skipped_duplicates,
            failed_batches = result.failures.len(),
            "Persistence complete"
        );
        result
    }

    async fn write_all_topics(
        &self,
        sink: &dyn RecordSink,
        by_topic: &BTreeMap<String, Vec<StoredRecord>>,
    ) -> Vec<SinkFailure> {
        let mut failures = Vec::new();
        for (topic, batch) in by_topic {
            match self.write_with_retry(sink, topic, batch).await {
                Ok(write) => {
                    info!(
                        sink = sink.name(),
                        topic = topic.as_str(),
                        rows = write.rows,
                        updated = write.updated,
                        "Sink write complete"
                    );
                }
                Err((error, attempts)) => {
                    warn!(
                        sink = sink.name(),
                        topic = topic.as_str(),
                        records = batch.len(),
                        attempts,
                        error = %error,
                        "Sink write failed, continuing with remaining sinks"
                    );
                    failures.push(SinkFailure {
                        sink: sink.name(),
                        topic: topic.clone(),
                        records: batch.len(),
                        attempts,
                        error,
                    });
                }
            }
        }
        failures
    }

    async fn write_with_retry(
        &self,
        sink: &dyn RecordSink,
        topic: &str,
        batch: &[StoredRecord],
    ) -> Result<SinkWrite, (SinkError, u32)> {
        let mut attempt = 1;
        loop {
            match sink.write_topic(topic, batch).await {
                Ok(write) => return Ok(write),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_before(attempt);
                    warn!(
                        sink = sink.name(),
                        topic,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient sink failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

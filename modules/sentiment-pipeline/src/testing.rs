//! Test doubles for the pipeline seams: a word-weight oracle, an in-memory
//! upsert table, and sinks that fail on purpose.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sentiment_common::{PolarityScores, RawPost, StoredRecord};

use crate::persist::{RecordSink, SinkError, SinkWrite};
use crate::scorer::{OracleError, PolarityOracle};

// ---------------------------------------------------------------------------
// FixedOracle
// ---------------------------------------------------------------------------

/// Scores text by summing fixed word weights. Predictable enough to assert
/// exact labels against.
#[derive(Default)]
pub struct FixedOracle {
    weights: Vec<(String, f64)>,
    reject_word: Option<String>,
    outage_word: Option<String>,
    down: bool,
    calls: AtomicUsize,
}

impl FixedOracle {
    pub fn new() -> Self {
        Self::default()
            .weight("love", 0.6)
            .weight("amazing", 0.4)
            .weight("great", 0.5)
            .weight("terrible", -0.5)
            .weight("useless", -0.4)
            .weight("hate", -0.6)
    }

    pub fn weight(mut self, word: &str, value: f64) -> Self {
        self.weights.push((word.to_string(), value));
        self
    }

    /// Text containing `word` is refused for that record only.
    pub fn rejecting(mut self, word: &str) -> Self {
        self.reject_word = Some(word.to_string());
        self
    }

    /// Text containing `word` makes the oracle report itself unavailable.
    pub fn failing_on(mut self, word: &str) -> Self {
        self.outage_word = Some(word.to_string());
        self
    }

    /// Startup check fails.
    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PolarityOracle for FixedOracle {
    fn name(&self) -> &str {
        "fixed"
    }

    fn check(&self) -> Result<(), OracleError> {
        if self.down {
            return Err(OracleError::Unavailable("fixed oracle is down".into()));
        }
        Ok(())
    }

    fn polarity(&self, text: &str) -> Result<PolarityScores, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tokens: Vec<&str> = text.split_whitespace().collect();

        if let Some(word) = &self.outage_word {
            if tokens.contains(&word.as_str()) {
                return Err(OracleError::Unavailable(format!("outage triggered by {word}")));
            }
        }
        if let Some(word) = &self.reject_word {
            if tokens.contains(&word.as_str()) {
                return Err(OracleError::Rejected(format!("contains {word}")));
            }
        }
        if tokens.is_empty() {
            return Ok(PolarityScores {
                compound: 0.0,
                pos: 0.0,
                neu: 0.0,
                neg: 0.0,
            });
        }

        let compound: f64 = tokens
            .iter()
            .filter_map(|t| self.weights.iter().find(|(w, _)| w == t).map(|(_, v)| *v))
            .sum();
        let compound = compound.clamp(-1.0, 1.0);
        let (pos, neg) = if compound >= 0.0 { (compound, 0.0) } else { (0.0, -compound) };

        Ok(PolarityScores {
            compound,
            pos,
            neu: 1.0 - pos - neg,
            neg,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryTable
// ---------------------------------------------------------------------------

/// In-memory stand-in for the relational sink with the same upsert rules:
/// one row per post id, topic, engagement and text updated, sentiment kept.
#[derive(Default)]
pub struct MemoryTable {
    rows: Mutex<BTreeMap<String, StoredRecord>>,
    writes: AtomicUsize,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<StoredRecord> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, post_id: &str) -> Option<StoredRecord> {
        self.rows.lock().unwrap().get(post_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `write_topic` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for MemoryTable {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn write_topic(&self, _topic: &str, records: &[StoredRecord]) -> Result<SinkWrite, SinkError> {
        let mut rows = self.rows.lock().unwrap();
        let mut updated = 0;
        for r in records {
            match rows.get_mut(&r.post_id) {
                Some(existing) => {
                    existing.topic = r.topic.clone();
                    existing.subreddit = r.subreddit.clone();
                    existing.title = r.title.clone();
                    existing.body = r.body.clone();
                    existing.clean_text = r.clean_text.clone();
                    existing.upvotes = r.upvotes;
                    existing.num_comments = r.num_comments;
                    updated += 1;
                }
                None => {
                    rows.insert(r.post_id.clone(), r.clone());
                }
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(SinkWrite {
            rows: records.len(),
            updated,
        })
    }
}

// ---------------------------------------------------------------------------
// Failing sinks
// ---------------------------------------------------------------------------

/// Fails transiently a fixed number of times, then behaves like a MemoryTable.
pub struct FlakySink {
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    inner: MemoryTable,
}

impl FlakySink {
    pub fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            inner: MemoryTable::new(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn table(&self) -> &MemoryTable {
        &self.inner
    }
}

#[async_trait]
impl RecordSink for FlakySink {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn write_topic(&self, topic: &str, records: &[StoredRecord]) -> Result<SinkWrite, SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(SinkError::Transient("connection reset".into()));
        }
        self.inner.write_topic(topic, records).await
    }
}

/// Always fails with the given error.
pub struct FailingSink {
    name: &'static str,
    error: SinkError,
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn permanent(name: &'static str) -> Self {
        Self {
            name,
            error: SinkError::Permanent("permission denied".into()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn transient(name: &'static str) -> Self {
        Self {
            name,
            error: SinkError::Transient("timed out".into()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for FailingSink {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn write_topic(&self, _topic: &str, _records: &[StoredRecord]) -> Result<SinkWrite, SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A complete raw post dated 2024-03-01.
pub fn raw_post(id: &str, subreddit: &str, title: &str, body: &str, upvotes: i64, comments: i64) -> RawPost {
    RawPost {
        id: Some(id.to_string()),
        subreddit: Some(subreddit.to_string()),
        title: Some(title.to_string()),
        body: Some(body.to_string()),
        upvotes: Some(upvotes),
        num_comments: Some(comments),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single(),
    }
}

// Per-topic CSV snapshots.
//
// Each topic gets two files: the post table and the sentiment table. A write
// replaces both wholesale, so a rerun for a topic overwrites its earlier
// snapshot. Files are written to a temp file in the same directory and renamed
// into place, which leaves either the old snapshot or the new one on disk.
// A topic with no records still gets header-only files.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sentiment_common::{SentimentLabel, StoredRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{RecordSink, SinkError, SinkWrite};

const POST_COLUMNS: [&str; 12] = [
    "post_id",
    "subreddit",
    "title",
    "clean_text",
    "upvotes",
    "num_comments",
    "created_at",
    "compound",
    "pos",
    "neu",
    "neg",
    "label",
];

const SENTIMENT_COLUMNS: [&str; 6] = ["post_id", "compound", "pos", "neu", "neg", "label"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub post_id: String,
    pub subreddit: String,
    pub title: String,
    pub clean_text: String,
    pub upvotes: u32,
    pub num_comments: u32,
    pub created_at: String,
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRow {
    pub post_id: String,
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub label: SentimentLabel,
}

impl From<&StoredRecord> for PostRow {
    fn from(r: &StoredRecord) -> Self {
        Self {
            post_id: r.post_id.clone(),
            subreddit: r.subreddit.clone(),
            title: r.title.clone(),
            clean_text: r.clean_text.clone(),
            upvotes: r.upvotes,
            num_comments: r.num_comments,
            created_at: r.created_at.to_rfc3339(),
            compound: r.compound,
            pos: r.pos,
            neu: r.neu,
            neg: r.neg,
            label: r.label,
        }
    }
}

impl From<&StoredRecord> for SentimentRow {
    fn from(r: &StoredRecord) -> Self {
        Self {
            post_id: r.post_id.clone(),
            compound: r.compound,
            pos: r.pos,
            neu: r.neu,
            neg: r.neg,
            label: r.label,
        }
    }
}

/// Reduce a topic to a filename-safe slug. Anything outside `[A-Za-z0-9_-]`
/// becomes `_`. When that changed the topic, the first 8 hex digits of the
/// topic's SHA-256 are appended, so "ai art" and "ai_art" get different files.
pub fn topic_slug(topic: &str) -> String {
    let safe: String = topic
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if !safe.is_empty() && safe == topic {
        return safe;
    }

    let digest = hex::encode(Sha256::digest(topic.as_bytes()));
    let safe = if safe.is_empty() { "_".to_string() } else { safe };
    format!("{safe}-{}", &digest[..8])
}

#[derive(Debug, Clone)]
pub struct CsvSnapshotSink {
    dir: PathBuf,
}

impl CsvSnapshotSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn posts_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("reddit_{}_data.csv", topic_slug(topic)))
    }

    pub fn sentiment_path(&self, topic: &str) -> PathBuf {
        self.dir
            .join(format!("sentimental_analysis_{}_data.csv", topic_slug(topic)))
    }

    /// Read a topic's post snapshot back. Missing file reads as empty.
    pub fn read_posts(&self, topic: &str) -> Result<Vec<PostRow>, SinkError> {
        read_rows(&self.posts_path(topic))
    }

    pub fn read_sentiment(&self, topic: &str) -> Result<Vec<SentimentRow>, SinkError> {
        read_rows(&self.sentiment_path(topic))
    }

    fn write_blocking(&self, topic: &str, records: &[StoredRecord]) -> Result<SinkWrite, SinkError> {
        std::fs::create_dir_all(&self.dir).map_err(classify_io)?;

        let posts_path = self.posts_path(topic);
        let updated = match read_rows::<PostRow>(&posts_path) {
            Ok(previous) => previous
                .iter()
                .filter(|row| records.iter().any(|r| r.post_id == row.post_id))
                .count(),
            Err(e) => {
                warn!(
                    topic,
                    path = %posts_path.display(),
                    error = %e,
                    "Previous snapshot unreadable, replacing it"
                );
                0
            }
        };

        let posts = write_temp(&self.dir, &POST_COLUMNS, records.iter().map(PostRow::from))?;
        let sentiment = write_temp(&self.dir, &SENTIMENT_COLUMNS, records.iter().map(SentimentRow::from))?;

        posts
            .persist(&posts_path)
            .map_err(|e| classify_io(e.error))?;
        sentiment
            .persist(self.sentiment_path(topic))
            .map_err(|e| classify_io(e.error))?;

        debug!(
            topic,
            path = %posts_path.display(),
            rows = records.len(),
            "Replaced topic snapshot"
        );

        Ok(SinkWrite {
            rows: records.len(),
            updated,
        })
    }
}

#[async_trait]
impl RecordSink for CsvSnapshotSink {
    fn name(&self) -> &'static str {
        "flat_file"
    }

    async fn write_topic(&self, topic: &str, records: &[StoredRecord]) -> Result<SinkWrite, SinkError> {
        let sink = self.clone();
        let topic = topic.to_string();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || sink.write_blocking(&topic, &records))
            .await
            .map_err(|e| SinkError::Transient(format!("snapshot writer task failed: {e}")))?
    }
}

fn write_temp<R: Serialize>(
    dir: &Path,
    header: &[&str],
    rows: impl Iterator<Item = R>,
) -> Result<NamedTempFile, SinkError> {
    let file = NamedTempFile::new_in(dir).map_err(classify_io)?;
    // Header is written by hand so an empty topic still gets one.
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(header).map_err(classify_csv)?;
    for row in rows {
        writer.serialize(row).map_err(classify_csv)?;
    }
    writer
        .into_inner()
        .map_err(|e| classify_io(io::Error::new(e.error().kind(), e.to_string())))
}

fn read_rows<R: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<R>, SinkError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(classify_csv)?;
    reader
        .deserialize()
        .collect::<Result<Vec<R>, _>>()
        .map_err(classify_csv)
}

pub(crate) fn classify_io(e: io::Error) -> SinkError {
    match e.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => {
            SinkError::Permanent(e.to_string())
        }
        _ => SinkError::Transient(e.to_string()),
    }
}

fn classify_csv(e: csv::Error) -> SinkError {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(io_err) = e.into_kind() {
            return classify_io(io_err);
        }
        return SinkError::Transient("csv i/o error".to_string());
    }
    SinkError::Permanent(e.to_string())
}

// Relational sink: one `reddit_posts` row per post id.
//
// Each topic batch is one transaction. Conflicts on post_id take the update
// path: topic, engagement counts and text move forward, the sentiment columns
// written on first insert stay.
//
// The pool connects lazily and the schema is migrated on the first write, so
// an unreachable database surfaces as a transient sink error instead of
// stopping the run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentiment_common::StoredRecord;
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{RecordSink, SinkError, SinkWrite};

const UPSERT_SQL: &str = "
INSERT INTO reddit_posts (
    post_id, topic, subreddit, title, body, clean_text,
    upvotes, num_comments, created_at,
    compound, pos, neu, neg, label
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
ON CONFLICT (post_id) DO UPDATE SET
    topic        = EXCLUDED.topic,
    subreddit    = EXCLUDED.subreddit,
    title        = EXCLUDED.title,
    body         = EXCLUDED.body,
    clean_text   = EXCLUDED.clean_text,
    upvotes      = EXCLUDED.upvotes,
    num_comments = EXCLUDED.num_comments,
    updated_at   = now()
RETURNING (xmax = 0) AS inserted";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Row from the `reddit_posts` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PostRecordRow {
    pub post_id: String,
    pub topic: String,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub clean_text: String,
    pub upvotes: i64,
    pub num_comments: i64,
    pub created_at: DateTime<Utc>,
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub label: String,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PostgresSink {
    pool: PgPool,
    migrated: Arc<OnceCell<()>>,
}

impl PostgresSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            migrated: Arc::new(OnceCell::new()),
        }
    }

    /// Build a pool without touching the network. Only a malformed URL fails here.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        info!("Connected to database");

        let sink = Self::new(pool);
        sink.migrate().await?;
        Ok(sink)
    }

    /// Run pending migrations once per sink. A failed attempt is retried on the next call.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        self.migrated
            .get_or_try_init(|| async {
                sqlx::migrate!("./migrations").run(&self.pool).await?;
                info!("Migrations complete");
                Ok::<(), MigrateError>(())
            })
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn count_rows(&self, topic: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reddit_posts WHERE topic = $1")
            .bind(topic)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn fetch(&self, post_id: &str) -> Result<Option<PostRecordRow>> {
        let row = sqlx::query_as::<_, PostRecordRow>("SELECT * FROM reddit_posts WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn upsert_batch(&self, records: &[StoredRecord]) -> Result<SinkWrite, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for r in records {
            let row = sqlx::query(UPSERT_SQL)
                .bind(&r.post_id)
                .bind(&r.topic)
                .bind(&r.subreddit)
                .bind(&r.title)
                .bind(&r.body)
                .bind(&r.clean_text)
                .bind(i64::from(r.upvotes))
                .bind(i64::from(r.num_comments))
                .bind(r.created_at)
                .bind(r.compound)
                .bind(r.pos)
                .bind(r.neu)
                .bind(r.neg)
                .bind(r.label.as_str())
                .fetch_one(&mut *tx)
                .await?;

            let inserted: bool = row.try_get("inserted")?;
            if !inserted {
                updated += 1;
                debug!(post_id = r.post_id.as_str(), "Updated existing post row");
            }
        }

        tx.commit().await?;
        Ok(SinkWrite {
            rows: records.len(),
            updated,
        })
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn write_topic(&self, topic: &str, records: &[StoredRecord]) -> Result<SinkWrite, SinkError> {
        // Rows are never deleted, so an empty topic has nothing to do here.
        if records.is_empty() {
            return Ok(SinkWrite::default());
        }
        self.migrate().await.map_err(classify_migrate)?;
        let write = self.upsert_batch(records).await.map_err(classify_sqlx)?;
        debug!(topic, rows = write.rows, updated = write.updated, "Upserted topic batch");
        Ok(write)
    }
}

/// Serialization failures and deadlocks are safe to replay since the whole
/// batch rolled back.
fn classify_sqlx(e: sqlx::Error) -> SinkError {
    let transient = match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Protocol(_) => true,
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
    };
    if transient {
        SinkError::Transient(e.to_string())
    } else {
        SinkError::Permanent(e.to_string())
    }
}

fn classify_migrate(e: MigrateError) -> SinkError {
    match e {
        MigrateError::Execute(e) => classify_sqlx(e),
        other => SinkError::Permanent(other.to_string()),
    }
}

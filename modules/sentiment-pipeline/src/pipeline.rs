// One batch pass: validate -> normalize + score -> persist -> aggregate.
//
// Normalization and scoring are CPU-bound and independent per post, so they
// run on blocking workers, at most `pool_size` at a time. Completion order is
// discarded: results are put back in input order before anything downstream
// sees them. Persistence starts only after every post has been scored, so an
// unavailable oracle aborts the run with nothing written.

use futures::stream::{self, StreamExt};
use sentiment_common::{
    dedupe_last_wins, AggregateRow, GroupBy, NormalizedText, Post, ScoredPost, Sentiment,
    SentimentError, SentimentRecord, ValidationError,
};
use tracing::{info, warn};

use crate::aggregate::{aggregate, engagement_correlation, EngagementCorrelation};
use crate::normalizer::normalize_post;
use crate::persist::{PersistResult, PersistenceCoordinator};
use crate::report::{RunReport, SkipReason};
use crate::scorer::{OracleError, Scorer};
use crate::source::TopicBatch;

pub struct Pipeline {
    scorer: Scorer,
    coordinator: PersistenceCoordinator,
    pool_size: usize,
    group_by: GroupBy,
}

/// Everything a run produced. `scored` holds one entry per distinct post id,
/// in first-seen order.
#[derive(Debug)]
pub struct RunOutput {
    pub scored: Vec<ScoredPost>,
    pub aggregates: Vec<AggregateRow>,
    pub correlation: EngagementCorrelation,
    pub persisted: PersistResult,
    pub report: RunReport,
}

impl RunOutput {
    pub fn pairs(&self) -> impl Iterator<Item = (&Post, &SentimentRecord)> + '_ {
        self.scored.iter().map(|s| (&s.post, &s.sentiment))
    }
}

type ScoreOutcome = (usize, Post, NormalizedText, Result<Sentiment, OracleError>);

impl Pipeline {
    pub fn new(scorer: Scorer, coordinator: PersistenceCoordinator, pool_size: usize, group_by: GroupBy) -> Self {
        Self {
            scorer,
            coordinator,
            pool_size: pool_size.max(1),
            group_by,
        }
    }

    pub fn group_by(&self) -> &GroupBy {
        &self.group_by
    }

    pub async fn run(&self, batches: Vec<TopicBatch>, mut report: RunReport) -> Result<RunOutput, SentimentError> {
        self.scorer
            .check()
            .map_err(|e| SentimentError::OracleUnavailable(e.to_string()))?;

        info!(
            run_id = %report.run_id,
            oracle = self.scorer.oracle_name(),
            pool_size = self.pool_size,
            sinks = ?self.coordinator.sink_names(),
            "Starting sentiment run"
        );

        let posts = self.validate(batches, &mut report);
        let scored = self.score_all(posts, &mut report).await?;
        report.scored = scored.len();

        let persisted = self
            .coordinator
            .persist(&report.topics, scored.iter().map(ScoredPost::to_stored).collect())
            .await;
        report.written = persisted.written;
        report.skipped_duplicates = persisted.skipped_duplicates;
        report.write_failures_by_sink = persisted.write_failures_by_sink.clone();

        let (scored, _) = dedupe_last_wins(scored, |s| s.post.id.as_str());
        let pairs = || scored.iter().map(|s| (&s.post, &s.sentiment));
        let aggregates = aggregate(pairs(), &self.group_by);
        let correlation = engagement_correlation(pairs());
        report.groups = aggregates.len();

        info!(
            run_id = %report.run_id,
            scored = report.scored,
            written = report.written,
            validation_skips = report.validation_skips,
            groups = report.groups,
            "Sentiment run complete"
        );

        Ok(RunOutput {
            scored,
            aggregates,
            correlation,
            persisted,
            report,
        })
    }

    fn validate(&self, batches: Vec<TopicBatch>, report: &mut RunReport) -> Vec<Post> {
        let mut posts = Vec::new();
        for batch in batches {
            report.topics.push(batch.topic.clone());
            report.posts_received += batch.posts.len();

            for raw in batch.posts {
                let id = raw.id.clone();
                match raw.validate(&batch.topic) {
                    Ok(post) => posts.push(post),
                    Err(e) => {
                        warn!(
                            topic = batch.topic.as_str(),
                            post_id = id.as_deref().unwrap_or("<none>"),
                            error = %e,
                            "Skipping invalid post"
                        );
                        report.skip(&batch.topic, id.as_deref(), SkipReason::InvalidShape, e.to_string());
                    }
                }
            }
        }
        posts
    }

    async fn score_all(&self, posts: Vec<Post>, report: &mut RunReport) -> Result<Vec<ScoredPost>, SentimentError> {
        let mut outcomes: Vec<ScoreOutcome> = stream::iter(posts.into_iter().enumerate().map(|(idx, post)| {
            let scorer = self.scorer.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    let normalized = normalize_post(&post);
                    let result = scorer.score(&normalized.clean_text);
                    (idx, post, normalized, result)
                })
                .await
            }
        }))
        .buffer_unordered(self.pool_size)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SentimentError::Anyhow(anyhow::anyhow!("scoring worker failed: {e}")))?;

        outcomes.sort_by_key(|(idx, ..)| *idx);

        let mut scored = Vec::with_capacity(outcomes.len());
        for (_, post, normalized, result) in outcomes {
            match result {
                Ok(sentiment) => {
                    let sentiment = sentiment.for_post(&post.id);
                    scored.push(ScoredPost {
                        post,
                        normalized,
                        sentiment,
                    });
                }
                Err(OracleError::Rejected(reason)) => {
                    let e = ValidationError::Rejected(reason);
                    warn!(
                        topic = post.topic.as_str(),
                        post_id = post.id.as_str(),
                        error = %e,
                        "Skipping post the oracle would not score"
                    );
                    report.skip(&post.topic, Some(&post.id), SkipReason::OracleRejected, e.to_string());
                }
                Err(OracleError::Unavailable(reason)) => {
                    return Err(SentimentError::OracleUnavailable(reason));
                }
            }
        }
        Ok(scored)
    }
}

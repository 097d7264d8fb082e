//! End-to-end runs over in-memory sources and sinks.

use std::sync::Arc;

use sentiment_common::{GroupBy, GroupKey, RawPost, SentimentError, SentimentLabel};
use sentiment_pipeline::persist::{CsvSnapshotSink, PersistenceCoordinator, RetryPolicy};
use sentiment_pipeline::report::SkipReason;
use sentiment_pipeline::testing::{raw_post, FailingSink, FixedOracle, MemoryTable};
use sentiment_pipeline::{LexiconOracle, Pipeline, RunReport, Scorer, TopicBatch};

fn batch(topic: &str, posts: Vec<RawPost>) -> Vec<TopicBatch> {
    vec![TopicBatch {
        topic: topic.to_string(),
        posts,
    }]
}

fn lexicon_pipeline(table: Arc<MemoryTable>, group_by: GroupBy) -> Pipeline {
    Pipeline::new(
        Scorer::new(Arc::new(LexiconOracle::new())),
        PersistenceCoordinator::new(RetryPolicy::immediate(3)).with_sink(table),
        4,
        group_by,
    )
}

fn scenario_posts() -> Vec<RawPost> {
    vec![
        raw_post("a", "ml", "I love this, amazing!", "", 10, 2),
        raw_post("b", "ml", "terrible and useless", "", 0, 0),
    ]
}

#[tokio::test]
async fn love_and_terrible_split_evenly() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = lexicon_pipeline(table.clone(), GroupBy::subreddit());

    let out = pipeline
        .run(batch("ml", scenario_posts()), RunReport::new())
        .await
        .unwrap();

    assert_eq!(out.scored.len(), 2);
    assert_eq!(out.scored[0].sentiment.post_id, "a");
    assert_eq!(out.scored[0].sentiment.label, SentimentLabel::Positive);
    assert_eq!(out.scored[1].sentiment.label, SentimentLabel::Negative);

    assert_eq!(out.aggregates.len(), 1);
    let row = &out.aggregates[0];
    assert_eq!(row.group_key, GroupKey::subreddit("ml"));
    assert_eq!(row.post_count, 2);
    assert_eq!(row.positive_ratio, 0.5);
    assert_eq!(row.negative_ratio, 0.5);
    assert_eq!(row.neutral_ratio, 0.0);
    assert_eq!(row.mean_upvotes, 5.0);

    assert_eq!(out.report.written, 2);
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn rerun_with_new_upvotes_updates_in_place() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = lexicon_pipeline(table.clone(), GroupBy::topic());

    pipeline
        .run(batch("ml", scenario_posts()), RunReport::new())
        .await
        .unwrap();
    let first = table.get("a").unwrap();

    let updated = vec![raw_post("a", "ml", "I love this, amazing!", "", 15, 2)];
    let out = pipeline.run(batch("ml", updated), RunReport::new()).await.unwrap();

    assert_eq!(out.report.written, 1);
    assert_eq!(table.len(), 2);
    let stored = table.get("a").unwrap();
    assert_eq!(stored.upvotes, 15);
    assert_eq!(stored.compound, first.compound);
    assert_eq!(stored.label, first.label);
}

#[tokio::test]
async fn empty_text_scores_neutral() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = lexicon_pipeline(table, GroupBy::topic());

    let posts = vec![raw_post("e", "ml", "", "https://example.com/only-a-link", 1, 0)];
    let out = pipeline.run(batch("ml", posts), RunReport::new()).await.unwrap();

    assert_eq!(out.scored.len(), 1);
    let s = &out.scored[0].sentiment;
    assert_eq!(out.scored[0].normalized.clean_text, "");
    assert_eq!(s.label, SentimentLabel::Neutral);
    assert_eq!((s.pos, s.neu, s.neg), (0.0, 1.0, 0.0));
}

#[tokio::test]
async fn duplicate_ids_in_one_run_keep_the_last_copy() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = lexicon_pipeline(table.clone(), GroupBy::topic());

    let posts = vec![
        raw_post("a", "ml", "great", "", 10, 2),
        raw_post("b", "ml", "fine", "", 1, 1),
        raw_post("a", "ml", "great", "", 15, 3),
    ];
    let out = pipeline.run(batch("ml", posts), RunReport::new()).await.unwrap();

    assert_eq!(out.report.skipped_duplicates, 1);
    assert_eq!(out.report.written, 2);
    assert_eq!(out.scored.len(), 2);
    assert_eq!(out.aggregates[0].post_count, 2);
    assert_eq!(table.get("a").unwrap().upvotes, 15);
}

#[tokio::test]
async fn invalid_posts_are_skipped_and_counted() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = lexicon_pipeline(table.clone(), GroupBy::topic());

    let mut missing_subreddit = raw_post("x", "ml", "good", "", 1, 1);
    missing_subreddit.subreddit = None;
    let negative_votes = raw_post("y", "ml", "good", "", -4, 1);
    let mut no_id = raw_post("z", "ml", "good", "", 1, 1);
    no_id.id = Some("   ".into());

    let posts = vec![
        missing_subreddit,
        negative_votes,
        no_id,
        raw_post("ok", "ml", "good", "", 1, 1),
    ];
    let out = pipeline.run(batch("ml", posts), RunReport::new()).await.unwrap();

    assert_eq!(out.report.posts_received, 4);
    assert_eq!(out.report.validation_skips, 3);
    assert!(out.report.skips.iter().all(|s| s.reason == SkipReason::InvalidShape));
    assert_eq!(out.report.skips[1].post_id.as_deref(), Some("y"));
    assert_eq!(out.scored.len(), 1);
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn oracle_rejection_skips_only_that_post() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(FixedOracle::new().rejecting("gibberish"))),
        PersistenceCoordinator::new(RetryPolicy::immediate(1)).with_sink(table.clone()),
        2,
        GroupBy::topic(),
    );

    let posts = vec![
        raw_post("a", "ml", "love it", "", 1, 0),
        raw_post("b", "ml", "gibberish", "", 1, 0),
    ];
    let out = pipeline.run(batch("ml", posts), RunReport::new()).await.unwrap();

    assert_eq!(out.report.validation_skips, 1);
    assert_eq!(out.report.skips[0].reason, SkipReason::OracleRejected);
    assert_eq!(out.report.skips[0].post_id.as_deref(), Some("b"));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn oracle_down_at_startup_writes_nothing() {
    let table = Arc::new(MemoryTable::new());
    let oracle = Arc::new(FixedOracle::new().down());
    let pipeline = Pipeline::new(
        Scorer::new(oracle.clone()),
        PersistenceCoordinator::new(RetryPolicy::immediate(1)).with_sink(table.clone()),
        2,
        GroupBy::topic(),
    );

    let err = pipeline
        .run(batch("ml", scenario_posts()), RunReport::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SentimentError::OracleUnavailable(_)));
    assert_eq!(oracle.calls(), 0);
    assert_eq!(table.writes(), 0);
}

#[tokio::test]
async fn oracle_outage_mid_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let files = Arc::new(CsvSnapshotSink::new(dir.path()));
    let table = Arc::new(MemoryTable::new());
    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(FixedOracle::new().failing_on("boom"))),
        PersistenceCoordinator::new(RetryPolicy::immediate(1))
            .with_sink(files.clone())
            .with_sink(table.clone()),
        2,
        GroupBy::topic(),
    );

    let posts = vec![
        raw_post("a", "ml", "love", "", 1, 0),
        raw_post("b", "ml", "boom", "", 1, 0),
        raw_post("c", "ml", "hate", "", 1, 0),
    ];
    let err = pipeline.run(batch("ml", posts), RunReport::new()).await.unwrap_err();

    assert!(matches!(err, SentimentError::OracleUnavailable(_)));
    assert!(table.is_empty());
    assert!(!files.posts_path("ml").exists());
}

#[tokio::test]
async fn failed_sink_is_reported_and_other_sink_keeps_its_rows() {
    let table = Arc::new(MemoryTable::new());
    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(FixedOracle::new())),
        PersistenceCoordinator::new(RetryPolicy::immediate(2))
            .with_sink(Arc::new(FailingSink::permanent("flat_file")))
            .with_sink(table.clone()),
        2,
        GroupBy::topic(),
    );

    let out = pipeline
        .run(batch("ml", scenario_posts()), RunReport::new())
        .await
        .unwrap();

    assert_eq!(out.report.write_failures_by_sink.get("flat_file"), Some(&2));
    assert_eq!(out.report.write_failures_by_sink.get("relational"), Some(&0));
    assert_eq!(out.report.written, 0);
    assert_eq!(table.len(), 2);
    // Aggregation still runs over everything that was scored.
    assert_eq!(out.aggregates[0].post_count, 2);
}

#[tokio::test]
async fn results_do_not_depend_on_pool_size() {
    let posts: Vec<RawPost> = (0..40)
        .map(|i| {
            let text = if i % 3 == 0 { "love it" } else if i % 3 == 1 { "hate it" } else { "table" };
            raw_post(&format!("p{i:02}"), if i % 2 == 0 { "even" } else { "odd" }, text, "", i, 1)
        })
        .collect();

    let mut outputs = Vec::new();
    for pool in [1, 3, 16] {
        let pipeline = Pipeline::new(
            Scorer::new(Arc::new(LexiconOracle::new())),
            PersistenceCoordinator::new(RetryPolicy::immediate(1)).with_sink(Arc::new(MemoryTable::new())),
            pool,
            GroupBy::topic_and_subreddit(),
        );
        outputs.push(pipeline.run(batch("t", posts.clone()), RunReport::new()).await.unwrap());
    }

    for out in &outputs[1..] {
        assert_eq!(out.aggregates, outputs[0].aggregates);
        assert_eq!(out.scored, outputs[0].scored);
    }
}

#[tokio::test]
async fn compare_groups_by_topic() {
    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(LexiconOracle::new())),
        PersistenceCoordinator::new(RetryPolicy::immediate(1)).with_sink(Arc::new(MemoryTable::new())),
        2,
        GroupBy::topic(),
    );

    let batches = vec![
        TopicBatch {
            topic: "rust".into(),
            posts: vec![raw_post("r1", "rust", "love", "", 5, 1)],
        },
        TopicBatch {
            topic: "go".into(),
            posts: vec![
                raw_post("g1", "golang", "hate", "", 1, 1),
                raw_post("g2", "golang", "great", "", 3, 1),
            ],
        },
    ];
    let out = pipeline.run(batches, RunReport::new()).await.unwrap();

    let keys: Vec<String> = out.aggregates.iter().map(|r| r.group_key.to_string()).collect();
    assert_eq!(keys, vec!["go", "rust"]);
    assert_eq!(out.aggregates[0].post_count, 2);
    assert_eq!(out.report.topics, vec!["rust", "go"]);
}

#[tokio::test]
async fn unreachable_relational_sink_leaves_snapshots_intact() {
    let dir = tempfile::tempdir().unwrap();
    let files = Arc::new(CsvSnapshotSink::new(dir.path()));
    let database = Arc::new(FailingSink::transient("relational"));
    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(FixedOracle::new())),
        PersistenceCoordinator::new(RetryPolicy::immediate(3))
            .with_sink(files.clone())
            .with_sink(database.clone()),
        2,
        GroupBy::topic(),
    );

    let out = pipeline
        .run(batch("ml", scenario_posts()), RunReport::new())
        .await
        .unwrap();

    assert_eq!(database.attempts(), 3);
    assert_eq!(out.report.write_failures_by_sink.get("relational"), Some(&2));
    assert_eq!(out.report.write_failures_by_sink.get("flat_file"), Some(&0));
    assert_eq!(out.report.written, 0);
    assert_eq!(files.read_posts("ml").unwrap().len(), 2);
    assert_eq!(out.aggregates[0].post_count, 2);
}

#[tokio::test]
async fn rerun_without_valid_posts_clears_the_topic_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let files = Arc::new(CsvSnapshotSink::new(dir.path()));
    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(FixedOracle::new())),
        PersistenceCoordinator::new(RetryPolicy::immediate(1)).with_sink(files.clone()),
        2,
        GroupBy::topic(),
    );

    pipeline
        .run(batch("ml", scenario_posts()), RunReport::new())
        .await
        .unwrap();
    assert_eq!(files.read_posts("ml").unwrap().len(), 2);

    let invalid = vec![raw_post("c", "ml", "love", "", -1, 0)];
    let out = pipeline.run(batch("ml", invalid), RunReport::new()).await.unwrap();

    assert_eq!(out.report.scored, 0);
    assert_eq!(out.report.validation_skips, 1);
    assert!(files.read_posts("ml").unwrap().is_empty());
    assert!(files.read_sentiment("ml").unwrap().is_empty());
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use apify_client::ApifyClient;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sentiment_common::{Config, FileConfig, GroupBy};
use sentiment_pipeline::export::{export_for_chart, export_records_for_chart, ChartKind, RecordChartKind};
use sentiment_pipeline::persist::{CsvSnapshotSink, PersistenceCoordinator, PostgresSink, RetryPolicy};
use sentiment_pipeline::source::{fetch_topics, ApifyRedditSource, JsonFileSource, PostSource};
use sentiment_pipeline::{LexiconOracle, Pipeline, RunOutput, RunReport, Scorer};

#[derive(Parser)]
#[command(name = "sentiment")]
#[command(about = "Score Reddit posts on a topic and aggregate their sentiment")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, score, persist and aggregate one or more topics
    Run {
        /// Topic to search for (repeatable)
        #[arg(short, long = "topic", required = true)]
        topics: Vec<String>,

        /// Group aggregates by these fields, e.g. `topic,subreddit`
        #[arg(long)]
        group_by: Option<GroupBy>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Compare two or more topics side by side, grouped by topic
    Compare {
        #[arg(num_args = 2.., required = true)]
        topics: Vec<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read posts from a JSON file (or a directory of `<topic>.json`) instead of Apify
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output directory for snapshots and chart tables
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum posts to fetch per topic
    #[arg(long)]
    limit: Option<u32>,

    /// Skip the relational sink
    #[arg(long)]
    no_db: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("sentiment=info,sentiment_pipeline=info,sentiment_common=info,apify_client=info")
    });
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let (topics, group_by, common) = match cli.command {
        Commands::Run {
            topics,
            group_by,
            common,
        } => (topics, group_by, common),
        Commands::Compare { topics, common } => (topics, Some(GroupBy::topic()), common),
    };

    let file_config = FileConfig::load_or_default(common.config.as_deref())?;
    let config = Config::from_env();
    config.log_redacted();

    let group_by = group_by.unwrap_or_else(|| file_config.pipeline.group_by.clone());
    let output_dir = common
        .output_dir
        .clone()
        .unwrap_or_else(|| file_config.output.dir.clone());
    let limit = common.limit.unwrap_or(file_config.pipeline.fetch_limit);

    // Everything that can fail on configuration is settled before the first fetch.
    let source: Box<dyn PostSource> = match &common.input {
        Some(path) => Box::new(JsonFileSource::new(path)),
        None => {
            let token = config.require_apify_token()?;
            Box::new(ApifyRedditSource::new(ApifyClient::new(token.to_string())))
        }
    };

    let retry = RetryPolicy::new(
        file_config.persistence.max_attempts,
        Duration::from_millis(file_config.persistence.backoff_ms),
    );
    let mut coordinator =
        PersistenceCoordinator::new(retry).with_sink(Arc::new(CsvSnapshotSink::new(&output_dir)));
    if common.no_db {
        info!("Relational sink disabled");
    } else {
        // Connection problems show up later as per-sink write failures.
        let database_url = config.require_database_url()?;
        let sink = PostgresSink::connect_lazy(database_url).context("Invalid DATABASE_URL")?;
        coordinator = coordinator.with_sink(Arc::new(sink));
    }

    let pipeline = Pipeline::new(
        Scorer::new(Arc::new(LexiconOracle::new())),
        coordinator,
        file_config.pipeline.pool_size,
        group_by,
    );

    let report = RunReport::new();
    info!(run_id = %report.run_id, topics = ?topics, limit, "Fetching posts");
    let batches = fetch_topics(source.as_ref(), &topics, limit).await?;

    let output = pipeline.run(batches, report).await?;

    write_charts(&output, pipeline.group_by(), &output_dir, file_config.output.top_n)?;

    println!("{}", output.report);
    print_correlation(&output);

    if !output.persisted.is_complete() {
        for failure in &output.persisted.failures {
            warn!(
                sink = failure.sink,
                topic = failure.topic.as_str(),
                records = failure.records,
                error = %failure.error,
                "Records not persisted"
            );
        }
    }

    Ok(())
}

fn write_charts(output: &RunOutput, group_by: &GroupBy, dir: &Path, top_n: usize) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    for kind in [
        ChartKind::GroupedComparison,
        ChartKind::LabelDistribution,
        ChartKind::TopGroups { n: top_n },
    ] {
        let path = dir.join(format!("{}.csv", kind.file_stem()));
        export_for_chart(&output.aggregates, group_by, kind)
            .save_csv(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    for kind in [RecordChartKind::SentimentHistogram, RecordChartKind::SentimentScatter] {
        let path = dir.join(format!("{}.csv", kind.file_stem()));
        export_records_for_chart(output.pairs(), kind)
            .save_csv(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let report_path = dir.join(format!("run_{}.json", output.report.run_id));
    let json = serde_json::to_string_pretty(&output.report)?;
    std::fs::write(&report_path, json)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    info!(dir = %dir.display(), "Chart tables written");
    Ok(())
}

fn print_correlation(output: &RunOutput) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |r| format!("{r:.3}"));
    println!("Sentiment vs upvotes:  {}", fmt(output.correlation.sentiment_vs_upvotes));
    println!("Sentiment vs comments: {}", fmt(output.correlation.sentiment_vs_comments));
}

// Where raw posts come from. The pipeline only sees `PostSource`; shape
// validation happens downstream, so sources hand records over as-is.

use std::path::PathBuf;

use anyhow::{Context, Result};
use apify_client::{ApifyClient, RedditPost};
use async_trait::async_trait;
use sentiment_common::{RawPost, SentimentError};
use tracing::info;

#[async_trait]
pub trait PostSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch up to `limit` raw posts for a topic.
    async fn fetch(&self, topic: &str, limit: u32) -> Result<Vec<RawPost>>;
}

/// Raw posts for one topic, in the order the source returned them.
#[derive(Debug, Clone, Default)]
pub struct TopicBatch {
    pub topic: String,
    pub posts: Vec<RawPost>,
}

/// Fetch every topic in turn. The first failing topic aborts the whole fetch,
/// before anything downstream has run.
pub async fn fetch_topics(source: &dyn PostSource, topics: &[String], limit: u32) -> Result<Vec<TopicBatch>> {
    let mut batches = Vec::with_capacity(topics.len());
    for topic in topics {
        let posts = source
            .fetch(topic, limit)
            .await
            .with_context(|| format!("{} failed to fetch topic {topic:?}", source.name()))?;
        info!(source = source.name(), topic = topic.as_str(), posts = posts.len(), "Fetched topic");
        batches.push(TopicBatch {
            topic: topic.clone(),
            posts,
        });
    }
    Ok(batches)
}

pub struct ApifyRedditSource {
    client: ApifyClient,
}

impl ApifyRedditSource {
    pub fn new(client: ApifyClient) -> Self {
        Self { client }
    }
}

fn raw_post(post: RedditPost) -> RawPost {
    RawPost {
        id: post.post_id().map(str::to_string),
        created_at: post.created_at_utc(),
        subreddit: post.subreddit,
        title: post.title,
        body: post.body,
        upvotes: post.up_votes,
        num_comments: post.number_of_comments,
    }
}

#[async_trait]
impl PostSource for ApifyRedditSource {
    fn name(&self) -> &str {
        "apify"
    }

    async fn fetch(&self, topic: &str, limit: u32) -> Result<Vec<RawPost>> {
        let posts = self
            .client
            .search_reddit_keywords(&[topic], limit)
            .await
            .map_err(|e| {
                if e.is_auth() {
                    anyhow::Error::new(SentimentError::Config(format!("Apify rejected the API token: {e}")))
                } else {
                    anyhow::Error::new(e)
                }
            })?;
        Ok(posts.into_iter().map(raw_post).collect())
    }
}

/// A JSON array of raw posts on disk, either one file for every topic or a
/// directory holding `<topic>.json` per topic.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn path_for(&self, topic: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{topic}.json"))
        } else {
            self.path.clone()
        }
    }
}

#[async_trait]
impl PostSource for JsonFileSource {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn fetch(&self, topic: &str, limit: u32) -> Result<Vec<RawPost>> {
        let path = self.path_for(topic);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut posts: Vec<RawPost> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        posts.truncate(limit as usize);
        Ok(posts)
    }
}

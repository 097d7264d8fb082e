use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for the trudax/reddit-scraper-lite actor in keyword search mode.
#[derive(Debug, Clone, Serialize)]
pub struct RedditSearchInput {
    pub searches: Vec<String>,
    #[serde(rename = "maxItems")]
    pub max_items: u32,
    #[serde(rename = "maxPostCount")]
    pub max_post_count: u32,
    pub sort: String,
    #[serde(rename = "searchPosts")]
    pub search_posts: bool,
    #[serde(rename = "searchComments")]
    pub search_comments: bool,
    #[serde(rename = "searchCommunities")]
    pub search_communities: bool,
    #[serde(rename = "skipComments")]
    pub skip_comments: bool,
}

impl RedditSearchInput {
    /// Posts-only search across all of Reddit, ordered by relevance.
    pub fn posts(keywords: &[&str], limit: u32) -> Self {
        Self {
            searches: keywords.iter().map(|k| k.to_string()).collect(),
            max_items: limit,
            max_post_count: limit,
            sort: "relevance".to_string(),
            search_posts: true,
            search_comments: false,
            search_communities: false,
            skip_comments: true,
        }
    }
}

/// A single Reddit item from the Apify dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    /// Fullname, e.g. `t3_1abcde`.
    pub id: Option<String>,
    #[serde(rename = "parsedId")]
    pub parsed_id: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(rename = "parsedCommunityName", alias = "subreddit")]
    pub subreddit: Option<String>,
    #[serde(rename = "upVotes")]
    pub up_votes: Option<i64>,
    #[serde(rename = "numberOfComments")]
    pub number_of_comments: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    /// Apify returns "community", "post", or "comment". Used to filter out non-posts.
    #[serde(rename = "dataType")]
    pub data_type: Option<String>,
}

impl RedditPost {
    pub fn is_post(&self) -> bool {
        self.data_type.as_deref() == Some("post")
    }

    /// Stable post identifier, preferring the short parsed id.
    pub fn post_id(&self) -> Option<&str> {
        self.parsed_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Envelope for single-object API responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reddit_dataset_item() {
        let json = r#"{
            "id": "t3_abc123",
            "parsedId": "abc123",
            "url": "https://www.reddit.com/r/rust/comments/abc123/x/",
            "username": "ferris",
            "title": "Borrow checker finally clicked",
            "body": "It is not that bad!",
            "communityName": "r/rust",
            "parsedCommunityName": "rust",
            "upVotes": 42,
            "numberOfComments": 7,
            "createdAt": "2024-03-01T12:00:00.000Z",
            "dataType": "post"
        }"#;
        let post: RedditPost = serde_json::from_str(json).unwrap();
        assert!(post.is_post());
        assert_eq!(post.post_id(), Some("abc123"));
        assert_eq!(post.subreddit.as_deref(), Some("rust"));
        assert_eq!(post.up_votes, Some(42));
        assert!(post.created_at_utc().is_some());
    }

    #[test]
    fn falls_back_to_fullname_when_parsed_id_missing() {
        let json = r#"{"id": "t3_zzz", "dataType": "comment"}"#;
        let post: RedditPost = serde_json::from_str(json).unwrap();
        assert!(!post.is_post());
        assert_eq!(post.post_id(), Some("t3_zzz"));
        assert!(post.created_at_utc().is_none());
    }

    #[test]
    fn search_input_serializes_actor_field_names() {
        let input = RedditSearchInput::posts(&["rust lang"], 500);
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["searches"][0], "rust lang");
        assert_eq!(value["maxItems"], 500);
        assert_eq!(value["skipComments"], true);
    }
}

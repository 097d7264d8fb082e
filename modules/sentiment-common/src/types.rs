use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// --- Input records ---

/// A post as handed over by an extraction source, before shape validation.
/// Every field is optional because upstream datasets routinely omit them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: Option<String>,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub upvotes: Option<i64>,
    pub num_comments: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A validated post. Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub subreddit: String,
    pub topic: String,
    pub title: String,
    pub body: String,
    pub upvotes: u32,
    pub num_comments: u32,
    pub created_at: DateTime<Utc>,
}

impl RawPost {
    /// Shape check at the input boundary: required fields present, counts non-negative.
    /// Title and body may be missing or empty; they default to "".
    pub fn validate(self, topic: &str) -> Result<Post, ValidationError> {
        let id = non_empty(self.id, "id")?;
        let subreddit = non_empty(self.subreddit, "subreddit")?;
        let upvotes = non_negative(self.upvotes, "upvotes")?;
        let num_comments = non_negative(self.num_comments, "num_comments")?;
        let created_at = self
            .created_at
            .ok_or(ValidationError::MissingField("created_at"))?;

        Ok(Post {
            id,
            subreddit,
            topic: topic.to_string(),
            title: self.title.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            upvotes,
            num_comments,
            created_at,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn non_negative(value: Option<i64>, field: &'static str) -> Result<u32, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    if value < 0 {
        return Err(ValidationError::Negative { field, value });
    }
    u32::try_from(value).map_err(|_| ValidationError::OutOfRange { field, value })
}

// --- Derived records ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub post_id: String,
    pub clean_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [
        SentimentLabel::Positive,
        SentimentLabel::Neutral,
        SentimentLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(SentimentLabel::Positive),
            "neutral" => Ok(SentimentLabel::Neutral),
            "negative" => Ok(SentimentLabel::Negative),
            other => Err(format!("unknown sentiment label: {other}")),
        }
    }
}

/// The four numbers a polarity oracle produces for a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarityScores {
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
}

/// Scores plus label, not yet attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub label: SentimentLabel,
}

impl Sentiment {
    pub fn for_post(self, post_id: &str) -> SentimentRecord {
        SentimentRecord {
            post_id: post_id.to_string(),
            compound: self.compound,
            pos: self.pos,
            neu: self.neu,
            neg: self.neg,
            label: self.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub post_id: String,
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub label: SentimentLabel,
}

/// A post that made it through normalization and scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPost {
    pub post: Post,
    pub normalized: NormalizedText,
    pub sentiment: SentimentRecord,
}

impl ScoredPost {
    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord::new(&self.post, &self.normalized, &self.sentiment)
    }
}

/// Persisted row shape shared by the flat-file and relational sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub post_id: String,
    pub topic: String,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub clean_text: String,
    pub upvotes: u32,
    pub num_comments: u32,
    pub created_at: DateTime<Utc>,
    pub compound: f64,
    pub pos: f64,
    pub neu: f64,
    pub neg: f64,
    pub label: SentimentLabel,
}

impl StoredRecord {
    pub fn new(post: &Post, normalized: &NormalizedText, sentiment: &SentimentRecord) -> Self {
        Self {
            post_id: post.id.clone(),
            topic: post.topic.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            body: post.body.clone(),
            clean_text: normalized.clean_text.clone(),
            upvotes: post.upvotes,
            num_comments: post.num_comments,
            created_at: post.created_at,
            compound: sentiment.compound,
            pos: sentiment.pos,
            neu: sentiment.neu,
            neg: sentiment.neg,
            label: sentiment.label,
        }
    }
}

// --- Grouping ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Topic,
    Subreddit,
}

impl FromStr for GroupField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topic" => Ok(GroupField::Topic),
            "subreddit" => Ok(GroupField::Subreddit),
            other => Err(format!("unknown group field: {other} (expected topic or subreddit)")),
        }
    }
}

/// Non-empty set of fields that partition records for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GroupField>", into = "Vec<GroupField>")]
pub struct GroupBy(BTreeSet<GroupField>);

impl GroupBy {
    pub fn new(fields: impl IntoIterator<Item = GroupField>) -> Result<Self, String> {
        let set: BTreeSet<GroupField> = fields.into_iter().collect();
        if set.is_empty() {
            return Err("group_by needs at least one field".to_string());
        }
        Ok(Self(set))
    }

    pub fn topic() -> Self {
        Self(BTreeSet::from([GroupField::Topic]))
    }

    pub fn subreddit() -> Self {
        Self(BTreeSet::from([GroupField::Subreddit]))
    }

    pub fn topic_and_subreddit() -> Self {
        Self(BTreeSet::from([GroupField::Topic, GroupField::Subreddit]))
    }

    pub fn contains(&self, field: GroupField) -> bool {
        self.0.contains(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = GroupField> + '_ {
        self.0.iter().copied()
    }

    /// Project a post onto the group key for this grouping.
    pub fn key_for(&self, post: &Post) -> GroupKey {
        GroupKey {
            topic: self.contains(GroupField::Topic).then(|| post.topic.clone()),
            subreddit: self
                .contains(GroupField::Subreddit)
                .then(|| post.subreddit.clone()),
        }
    }
}

impl Default for GroupBy {
    fn default() -> Self {
        Self::topic_and_subreddit()
    }
}

impl TryFrom<Vec<GroupField>> for GroupBy {
    type Error = String;

    fn try_from(fields: Vec<GroupField>) -> Result<Self, Self::Error> {
        GroupBy::new(fields)
    }
}

impl From<GroupBy> for Vec<GroupField> {
    fn from(group_by: GroupBy) -> Self {
        group_by.0.into_iter().collect()
    }
}

impl FromStr for GroupBy {
    type Err = String;

    /// Comma-separated field list, e.g. `topic,subreddit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(GroupField::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        GroupBy::new(fields)
    }
}

/// Ordering is topic first, then subreddit, which gives the stable
/// ascending sort the exports rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub topic: Option<String>,
    pub subreddit: Option<String>,
}

impl GroupKey {
    pub fn topic(topic: &str) -> Self {
        Self {
            topic: Some(topic.to_string()),
            subreddit: None,
        }
    }

    pub fn subreddit(subreddit: &str) -> Self {
        Self {
            topic: None,
            subreddit: Some(subreddit.to_string()),
        }
    }

    pub fn topic_subreddit(topic: &str, subreddit: &str) -> Self {
        Self {
            topic: Some(topic.to_string()),
            subreddit: Some(subreddit.to_string()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.topic, &self.subreddit) {
            (Some(t), Some(s)) => write!(f, "{t}/{s}"),
            (Some(t), None) => f.write_str(t),
            (None, Some(s)) => f.write_str(s),
            (None, None) => f.write_str("all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub group_key: GroupKey,
    pub post_count: usize,
    pub mean_compound: f64,
    pub mean_upvotes: f64,
    pub mean_comments: f64,
    pub positive_count: usize,
    pub neutral_count: usize,
    pub negative_count: usize,
    pub positive_ratio: f64,
    pub neutral_ratio: f64,
    pub negative_ratio: f64,
}

/// Collapse repeated ids: the later occurrence replaces the earlier one in place,
/// so output order follows first appearance. Returns the number of replaced items.
pub fn dedupe_last_wins<T, F>(items: impl IntoIterator<Item = T>, key: F) -> (Vec<T>, usize)
where
    F: Fn(&T) -> &str,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::new();
    let mut duplicates = 0;

    for item in items {
        let id = key(&item).to_string();
        match index.get(&id) {
            Some(&pos) => {
                out[pos] = item;
                duplicates += 1;
            }
            None => {
                index.insert(id, out.len());
                out.push(item);
            }
        }
    }

    (out, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(id: &str) -> RawPost {
        RawPost {
            id: Some(id.to_string()),
            subreddit: Some("rust".to_string()),
            title: Some("title".to_string()),
            body: None,
            upvotes: Some(3),
            num_comments: Some(1),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn validate_accepts_complete_record() {
        let post = raw("a").validate("rust lang").unwrap();
        assert_eq!(post.id, "a");
        assert_eq!(post.topic, "rust lang");
        assert_eq!(post.body, "");
        assert_eq!(post.upvotes, 3);
    }

    #[test]
    fn validate_rejects_missing_id() {
        let mut r = raw("a");
        r.id = Some("   ".to_string());
        assert_eq!(r.validate("t"), Err(ValidationError::MissingField("id")));
    }

    #[test]
    fn validate_rejects_negative_counts() {
        let mut r = raw("a");
        r.upvotes = Some(-4);
        assert_eq!(
            r.validate("t"),
            Err(ValidationError::Negative {
                field: "upvotes",
                value: -4
            })
        );
    }

    #[test]
    fn validate_rejects_missing_timestamp() {
        let mut r = raw("a");
        r.created_at = None;
        assert_eq!(r.validate("t"), Err(ValidationError::MissingField("created_at")));
    }

    #[test]
    fn group_by_parses_comma_list() {
        let g: GroupBy = "subreddit, topic".parse().unwrap();
        assert_eq!(g, GroupBy::topic_and_subreddit());
        assert!("".parse::<GroupBy>().is_err());
        assert!("author".parse::<GroupBy>().is_err());
    }

    #[test]
    fn group_key_orders_topic_before_subreddit() {
        let mut keys = vec![
            GroupKey::topic_subreddit("b", "a"),
            GroupKey::topic_subreddit("a", "z"),
            GroupKey::topic_subreddit("a", "b"),
        ];
        keys.sort();
        let shown: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(shown, vec!["a/b", "a/z", "b/a"]);
    }

    #[test]
    fn dedupe_keeps_first_position_and_last_value() {
        let items = vec![("a", 1), ("b", 2), ("a", 3)];
        let (out, dups) = dedupe_last_wins(items, |item| item.0);
        assert_eq!(out, vec![("a", 3), ("b", 2)]);
        assert_eq!(dups, 1);
    }

    #[test]
    fn label_round_trips_through_str() {
        for label in SentimentLabel::ALL {
            assert_eq!(label.as_str().parse::<SentimentLabel>().unwrap(), label);
        }
    }
}

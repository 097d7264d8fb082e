use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Record failed shape validation.
    InvalidShape,
    /// The polarity oracle refused the record's text.
    OracleRejected,
}

/// One record dropped before scoring finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipEntry {
    pub topic: String,
    pub post_id: Option<String>,
    pub reason: SkipReason,
    pub detail: String,
}

/// Counters for one pipeline invocation, threaded through every stage.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub topics: Vec<String>,
    pub posts_received: usize,
    pub validation_skips: usize,
    pub scored: usize,
    pub skipped_duplicates: usize,
    pub written: usize,
    pub write_failures_by_sink: BTreeMap<String, usize>,
    pub groups: usize,
    pub skips: Vec<SkipEntry>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            topics: Vec::new(),
            posts_received: 0,
            validation_skips: 0,
            scored: 0,
            skipped_duplicates: 0,
            written: 0,
            write_failures_by_sink: BTreeMap::new(),
            groups: 0,
            skips: Vec::new(),
        }
    }

    pub fn skip(&mut self, topic: &str, post_id: Option<&str>, reason: SkipReason, detail: impl Into<String>) {
        self.validation_skips += 1;
        self.skips.push(SkipEntry {
            topic: topic.to_string(),
            post_id: post_id.map(str::to_string),
            reason,
            detail: detail.into(),
        });
    }

    pub fn total_write_failures(&self) -> usize {
        self.write_failures_by_sink.values().sum()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Sentiment Run Complete ===")?;
        writeln!(f, "Run id:             {}", self.run_id)?;
        writeln!(f, "Topics:             {}", self.topics.join(", "))?;
        writeln!(f, "Posts received:     {}", self.posts_received)?;
        writeln!(f, "Validation skips:   {}", self.validation_skips)?;
        writeln!(f, "Scored:             {}", self.scored)?;
        writeln!(f, "Duplicates folded:  {}", self.skipped_duplicates)?;
        writeln!(f, "Written:            {}", self.written)?;
        writeln!(f, "Groups:             {}", self.groups)?;
        if !self.write_failures_by_sink.is_empty() {
            writeln!(f, "\nWrite failures by sink:")?;
            for (sink, failures) in &self.write_failures_by_sink {
                writeln!(f, "  {sink:<12} {failures}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_counts_and_records_entry() {
        let mut report = RunReport::new();
        report.skip("rust", Some("abc"), SkipReason::InvalidShape, "missing field: subreddit");
        report.skip("rust", None, SkipReason::InvalidShape, "missing field: id");
        assert_eq!(report.validation_skips, 2);
        assert_eq!(report.skips[0].post_id.as_deref(), Some("abc"));
    }

    #[test]
    fn display_lists_sink_failures() {
        let mut report = RunReport::new();
        report.write_failures_by_sink.insert("relational".into(), 3);
        report.write_failures_by_sink.insert("flat_file".into(), 0);
        let text = report.to_string();
        assert!(text.contains("relational   3"));
        assert_eq!(report.total_write_failures(), 3);
    }
}

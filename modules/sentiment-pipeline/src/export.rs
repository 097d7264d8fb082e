// Reshape aggregates and scored records into tidy tables for charting.
//
// Pure reshaping: every function here reads its input and builds a new table.
// Rendering is somebody else's job; a table's only output format is CSV.

use std::fmt;
use std::io;
use std::path::Path;

use sentiment_common::{AggregateRow, GroupBy, GroupField, GroupKey, Post, SentimentLabel, SentimentRecord};

/// Chart shapes over aggregate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    /// Wide: one row per group, all statistics as columns.
    GroupedComparison,
    /// Long: one row per (group, label) with count and ratio.
    LabelDistribution,
    /// Largest groups by post count, ties broken by group key.
    TopGroups { n: usize },
}

impl ChartKind {
    pub fn file_stem(&self) -> String {
        match self {
            ChartKind::GroupedComparison => "grouped_comparison".to_string(),
            ChartKind::LabelDistribution => "label_distribution".to_string(),
            ChartKind::TopGroups { n } => format!("top_{n}_groups"),
        }
    }
}

/// Chart shapes over individual scored posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChartKind {
    /// Long `(post_id, variable, value)` for compound, upvotes and comments.
    SentimentHistogram,
    /// One point per post: compound against engagement.
    SentimentScatter,
}

impl RecordChartKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            RecordChartKind::SentimentHistogram => "sentiment_histogram",
            RecordChartKind::SentimentScatter => "sentiment_scatter",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Self {
        Cell::Float(x)
    }
}

impl From<usize> for Cell {
    fn from(n: usize) -> Self {
        Cell::Int(n as i64)
    }
}

impl From<u32> for Cell {
    fn from(n: u32) -> Self {
        Cell::Int(i64::from(n))
    }
}

/// Column-named rows. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TidyTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl TidyTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn write_csv<W: io::Write>(&self, out: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|c| c.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> csv::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

/// Key columns for a grouping, in `topic, subreddit` order.
fn key_columns(group_by: &GroupBy) -> Vec<&'static str> {
    group_by
        .fields()
        .map(|f| match f {
            GroupField::Topic => "topic",
            GroupField::Subreddit => "subreddit",
        })
        .collect()
}

fn key_cells(key: &GroupKey, group_by: &GroupBy) -> Vec<Cell> {
    group_by
        .fields()
        .map(|f| match f {
            GroupField::Topic => Cell::from(key.topic.clone().unwrap_or_default()),
            GroupField::Subreddit => Cell::from(key.subreddit.clone().unwrap_or_default()),
        })
        .collect()
}

pub fn export_for_chart(rows: &[AggregateRow], group_by: &GroupBy, kind: ChartKind) -> TidyTable {
    match kind {
        ChartKind::GroupedComparison => grouped_comparison(rows.iter(), group_by),
        ChartKind::LabelDistribution => label_distribution(rows, group_by),
        ChartKind::TopGroups { n } => {
            let mut ranked: Vec<&AggregateRow> = rows.iter().collect();
            ranked.sort_by(|a, b| {
                b.post_count
                    .cmp(&a.post_count)
                    .then_with(|| a.group_key.cmp(&b.group_key))
            });
            ranked.truncate(n);
            grouped_comparison(ranked.into_iter(), group_by)
        }
    }
}

fn grouped_comparison<'a>(rows: impl Iterator<Item = &'a AggregateRow>, group_by: &GroupBy) -> TidyTable {
    let mut columns = key_columns(group_by);
    columns.extend([
        "post_count",
        "mean_compound",
        "mean_upvotes",
        "mean_comments",
        "positive_ratio",
        "neutral_ratio",
        "negative_ratio",
    ]);
    let mut table = TidyTable::new(&columns);

    for row in rows {
        let mut cells = key_cells(&row.group_key, group_by);
        cells.extend([
            Cell::from(row.post_count),
            Cell::from(row.mean_compound),
            Cell::from(row.mean_upvotes),
            Cell::from(row.mean_comments),
            Cell::from(row.positive_ratio),
            Cell::from(row.neutral_ratio),
            Cell::from(row.negative_ratio),
        ]);
        table.push(cells);
    }
    table
}

fn label_distribution(rows: &[AggregateRow], group_by: &GroupBy) -> TidyTable {
    let mut columns = key_columns(group_by);
    columns.extend(["label", "count", "ratio"]);
    let mut table = TidyTable::new(&columns);

    for row in rows {
        for label in SentimentLabel::ALL {
            let (count, ratio) = match label {
                SentimentLabel::Positive => (row.positive_count, row.positive_ratio),
                SentimentLabel::Neutral => (row.neutral_count, row.neutral_ratio),
                SentimentLabel::Negative => (row.negative_count, row.negative_ratio),
            };

            let mut cells = key_cells(&row.group_key, group_by);
            cells.extend([Cell::from(label.as_str()), Cell::from(count), Cell::from(ratio)]);
            table.push(cells);
        }
    }
    table
}

/// Per-post chart tables, sorted by post id.
pub fn export_records_for_chart<'a, I>(records: I, kind: RecordChartKind) -> TidyTable
where
    I: IntoIterator<Item = (&'a Post, &'a SentimentRecord)>,
{
    let mut records: Vec<(&Post, &SentimentRecord)> = records.into_iter().collect();
    records.sort_by(|a, b| a.0.id.cmp(&b.0.id));

    match kind {
        RecordChartKind::SentimentHistogram => {
            let mut table = TidyTable::new(&["post_id", "variable", "value"]);
            for (post, sentiment) in records {
                table.push(vec![post.id.as_str().into(), "compound".into(), sentiment.compound.into()]);
                table.push(vec![post.id.as_str().into(), "upvotes".into(), post.upvotes.into()]);
                table.push(vec![post.id.as_str().into(), "comments".into(), post.num_comments.into()]);
            }
            table
        }
        RecordChartKind::SentimentScatter => {
            let mut table =
                TidyTable::new(&["post_id", "subreddit", "compound", "upvotes", "comments"]);
            for (post, sentiment) in records {
                table.push(vec![
                    post.id.as_str().into(),
                    post.subreddit.as_str().into(),
                    sentiment.compound.into(),
                    post.upvotes.into(),
                    post.num_comments.into(),
                ]);
            }
            table
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(topic: &str, subreddit: &str, count: usize, pos: usize, neu: usize, neg: usize) -> AggregateRow {
        let n = count as f64;
        AggregateRow {
            group_key: GroupKey::topic_subreddit(topic, subreddit),
            post_count: count,
            mean_compound: 0.1,
            mean_upvotes: 4.0,
            mean_comments: 1.5,
            positive_count: pos,
            neutral_count: neu,
            negative_count: neg,
            positive_ratio: pos as f64 / n,
            neutral_ratio: neu as f64 / n,
            negative_ratio: neg as f64 / n,
        }
    }

    fn rows() -> Vec<AggregateRow> {
        vec![
            row("ai", "art", 2, 1, 0, 1),
            row("ai", "ml", 4, 1, 2, 1),
            row("rust", "rust", 4, 4, 0, 0),
            row("zig", "zig", 1, 0, 1, 0),
        ]
    }

    #[test]
    fn grouped_comparison_is_wide() {
        let table = export_for_chart(&rows(), &GroupBy::topic_and_subreddit(), ChartKind::GroupedComparison);
        assert_eq!(&table.columns[..3], ["topic", "subreddit", "post_count"]);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[1][1], Cell::Text("ml".into()));
        assert!(table.rows.iter().all(|r| r.len() == table.columns.len()));
    }

    #[test]
    fn topic_only_grouping_has_one_key_column() {
        let rows = vec![AggregateRow {
            group_key: GroupKey::topic("ai"),
            ..row("ai", "", 3, 3, 0, 0)
        }];
        let table = export_for_chart(&rows, &GroupBy::topic(), ChartKind::GroupedComparison);
        assert_eq!(table.columns[0], "topic");
        assert_eq!(table.columns[1], "post_count");
    }

    #[test]
    fn label_distribution_is_long() {
        let table = export_for_chart(&rows(), &GroupBy::topic_and_subreddit(), ChartKind::LabelDistribution);
        assert_eq!(table.rows.len(), 12);
        let label = table.column("label").unwrap();
        let count = table.column("count").unwrap();
        // ai/ml: 4 posts, one positive, two neutral, one negative
        assert_eq!(table.rows[3][label], Cell::Text("positive".into()));
        assert_eq!(table.rows[3][count], Cell::Int(1));
        assert_eq!(table.rows[4][count], Cell::Int(2));
    }

    #[test]
    fn top_groups_breaks_ties_by_key() {
        let table = export_for_chart(&rows(), &GroupBy::topic_and_subreddit(), ChartKind::TopGroups { n: 2 });
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], Cell::Text("ai".into()));
        assert_eq!(table.rows[0][1], Cell::Text("ml".into()));
        assert_eq!(table.rows[1][0], Cell::Text("rust".into()));
    }

    #[test]
    fn top_groups_larger_than_input_keeps_all() {
        let table = export_for_chart(&rows(), &GroupBy::topic_and_subreddit(), ChartKind::TopGroups { n: 50 });
        assert_eq!(table.rows.len(), 4);
    }

    #[test]
    fn csv_output_has_header_and_rows() {
        let table = export_for_chart(&rows()[..1], &GroupBy::topic_and_subreddit(), ChartKind::GroupedComparison);
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "topic,subreddit,post_count,mean_compound,mean_upvotes,mean_comments,positive_ratio,neutral_ratio,negative_ratio"
        );
        assert_eq!(lines.next().unwrap(), "ai,art,2,0.1,4,1.5,0.5,0,0.5");
        assert!(lines.next().is_none());
    }

    #[test]
    fn histogram_has_three_rows_per_post() {
        use chrono::{TimeZone, Utc};
        let post = Post {
            id: "p1".into(),
            subreddit: "rust".into(),
            topic: "rust".into(),
            title: String::new(),
            body: String::new(),
            upvotes: 7,
            num_comments: 2,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let sentiment = SentimentRecord {
            post_id: "p1".into(),
            compound: 0.5,
            pos: 0.5,
            neu: 0.5,
            neg: 0.0,
            label: SentimentLabel::Positive,
        };
        let table = export_records_for_chart([(&post, &sentiment)], RecordChartKind::SentimentHistogram);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1], vec![Cell::Text("p1".into()), Cell::Text("upvotes".into()), Cell::Int(7)]);

        let scatter = export_records_for_chart([(&post, &sentiment)], RecordChartKind::SentimentScatter);
        assert_eq!(scatter.rows[0][2], Cell::Float(0.5));
    }
}

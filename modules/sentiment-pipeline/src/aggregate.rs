// Group scored posts and compute per-group summary statistics.
//
// Rows come out sorted by group key. Within a group, members are folded in
// post-id order so the floating point sums (and therefore every mean) are
// identical whatever order the records arrived in.

use std::collections::BTreeMap;

use sentiment_common::{
    dedupe_last_wins, AggregateRow, GroupBy, GroupKey, Post, SentimentLabel, SentimentRecord,
};

pub fn aggregate<'a, I>(records: I, group_by: &GroupBy) -> Vec<AggregateRow>
where
    I: IntoIterator<Item = (&'a Post, &'a SentimentRecord)>,
{
    let (records, _) = dedupe_last_wins(records, |(post, _)| post.id.as_str());

    let mut groups: BTreeMap<GroupKey, Vec<(&Post, &SentimentRecord)>> = BTreeMap::new();
    for (post, sentiment) in records {
        groups
            .entry(group_by.key_for(post))
            .or_default()
            .push((post, sentiment));
    }

    groups
        .into_iter()
        .map(|(group_key, mut members)| {
            members.sort_by(|a, b| a.0.id.cmp(&b.0.id));
            summarize(group_key, &members)
        })
        .collect()
}

fn summarize(group_key: GroupKey, members: &[(&Post, &SentimentRecord)]) -> AggregateRow {
    let mut compound = 0.0;
    let mut upvotes = 0.0;
    let mut comments = 0.0;
    let mut positive = 0usize;
    let mut neutral = 0usize;
    let mut negative = 0usize;

    for (post, sentiment) in members {
        compound += sentiment.compound;
        upvotes += f64::from(post.upvotes);
        comments += f64::from(post.num_comments);
        match sentiment.label {
            SentimentLabel::Positive => positive += 1,
            SentimentLabel::Neutral => neutral += 1,
            SentimentLabel::Negative => negative += 1,
        }
    }

    let n = members.len() as f64;
    AggregateRow {
        group_key,
        post_count: members.len(),
        mean_compound: compound / n,
        mean_upvotes: upvotes / n,
        mean_comments: comments / n,
        positive_count: positive,
        neutral_count: neutral,
        negative_count: negative,
        positive_ratio: positive as f64 / n,
        neutral_ratio: neutral as f64 / n,
        negative_ratio: negative as f64 / n,
    }
}

/// How sentiment moves with engagement across a record set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngagementCorrelation {
    pub sentiment_vs_upvotes: Option<f64>,
    pub sentiment_vs_comments: Option<f64>,
}

/// Pearson correlation of compound score against upvotes and against comment count.
/// `None` when there are fewer than two posts or either side has no variance.
pub fn engagement_correlation<'a, I>(records: I) -> EngagementCorrelation
where
    I: IntoIterator<Item = (&'a Post, &'a SentimentRecord)>,
{
    let (mut records, _) = dedupe_last_wins(records, |(post, _)| post.id.as_str());
    records.sort_by(|a, b| a.0.id.cmp(&b.0.id));

    let compound: Vec<f64> = records.iter().map(|(_, s)| s.compound).collect();
    let upvotes: Vec<f64> = records.iter().map(|(p, _)| f64::from(p.upvotes)).collect();
    let comments: Vec<f64> = records
        .iter()
        .map(|(p, _)| f64::from(p.num_comments))
        .collect();

    EngagementCorrelation {
        sentiment_vs_upvotes: pearson(&compound, &upvotes),
        sentiment_vs_comments: pearson(&compound, &comments),
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

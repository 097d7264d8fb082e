// Text cleanup ahead of polarity scoring.
//
// Output is lowercase, space-separated tokens made of letters and inner
// apostrophes, plus standalone `!` / `?` tokens. Negations and sentiment
// punctuation survive; URLs, markup, Reddit references, numbers and
// stopwords do not. Running the output through again is a no-op.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sentiment_common::{NormalizedText, Post};

static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("valid regex"));
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>\n]{1,200}>").expect("valid regex"));
static HTML_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:[a-zA-Z]{2,8}|#\d{1,6}|#x[0-9a-fA-F]{1,6});").expect("valid regex"));
static REDDIT_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\s)/?[ur]/[\w-]+").expect("valid regex"));

/// Common English function words. Negations, intensifiers and contrast
/// words ("but") are deliberately absent: the scorer reads them.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "i'm", "i've", "i'd", "i'll", "if", "in", "into", "is", "it",
    "it's", "its", "itself", "just", "me", "my", "myself", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "some", "such", "than", "that", "that's", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "under",
    "until", "up", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "you're", "you've", "your", "yours", "yourself",
    "yourselves",
];

static STOPWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORDS.iter().copied().collect());

/// Canonicalize a post's title and body into scoring text.
pub fn normalize(title: &str, body: &str) -> String {
    let joined = format!("{title}\n{body}");
    normalize_text(&joined)
}

pub fn normalize_post(post: &Post) -> NormalizedText {
    NormalizedText {
        post_id: post.id.clone(),
        clean_text: normalize(&post.title, &post.body),
    }
}

/// Single-string form of [`normalize`]; also what makes re-application a no-op.
pub fn normalize_text(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let text = MD_LINK_RE.replace_all(raw, "$1 ");
    let text = URL_RE.replace_all(&text, " ");
    let text = HTML_TAG_RE.replace_all(&text, " ");
    let text = HTML_ENTITY_RE.replace_all(&text, " ");
    let text = REDDIT_REF_RE.replace_all(&text, " ");
    let text = text.to_lowercase();

    let mut spaced = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '!' | '?' => {
                spaced.push(' ');
                spaced.push(c);
                spaced.push(' ');
            }
            '\'' | '\u{2019}' | '\u{2018}' => spaced.push('\''),
            c if c.is_alphabetic() => spaced.push(c),
            _ => spaced.push(' '),
        }
    }

    let tokens: Vec<&str> = spaced
        .split_whitespace()
        .map(|t| t.trim_matches('\''))
        .filter(|t| keep_token(t))
        .collect();

    tokens.join(" ")
}

fn keep_token(token: &str) -> bool {
    if token == "!" || token == "?" {
        return true;
    }
    // Single letters are leftovers from stripped markup ("r/", "u/", "'s").
    if token.chars().count() < 2 || !token.chars().any(char::is_alphabetic) {
        return false;
    }
    !STOPWORD_SET.contains(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_stopwords() {
        assert_eq!(normalize("I love this, amazing!", ""), "love amazing !");
    }

    #[test]
    fn keeps_negations_and_contractions() {
        assert_eq!(
            normalize("This is NOT good", "I don't like it. Never again?"),
            "not good don't like never ?"
        );
    }

    #[test]
    fn strips_urls_and_markdown_links() {
        let out = normalize(
            "Check https://example.com/x?y=1 now",
            "see [the docs](https://docs.rs) or www.rust-lang.org",
        );
        assert_eq!(out, "check see docs");
    }

    #[test]
    fn strips_html_and_reddit_references() {
        let out = normalize("&gt; quoted <b>bold</b> text", "ask u/some_user in r/rust please");
        assert_eq!(out, "quoted bold text ask please");
    }

    #[test]
    fn drops_numbers_and_symbols() {
        assert_eq!(normalize("10/10 would buy $$$ again 2024", ""), "buy");
    }

    #[test]
    fn splits_exclamation_runs_into_tokens() {
        assert_eq!(normalize("wow!!", ""), "wow ! !");
    }

    #[test]
    fn empty_and_whitespace_yield_empty() {
        assert_eq!(normalize("", ""), "");
        assert_eq!(normalize("   ", "\n\t  "), "");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn curly_apostrophes_fold_to_ascii() {
        assert_eq!(normalize("it\u{2019}s not what I\u{2019}d hoped", ""), "not hoped");
    }

    #[test]
    fn idempotent_on_own_output() {
        let samples = [
            "I love this, amazing!",
            "terrible and useless",
            "[link](http://x.y) &amp; <i>meh</i> r/rust u/bob 'quoted' words''",
            "Über café — naïve résumé!!! ??",
            "don't won't can't shouldn't",
            "a b c d 1 2 3",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "not idempotent for {s:?}");
        }
    }
}

//! Normalization boundary for raw twitterapi.io tweet objects.
//!
//! The API has drifted between field names over time (`author` vs `user`,
//! `viewCount` vs `impressions`, ...). Every fallback chain lives here; the
//! rest of the crate only sees [`CandidateTweet`].

use crate::arena::TweetMetrics;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

const AUTHOR_KEYS: &[&str] = &["author", "user", "userDetails"];
const HANDLE_KEYS: &[&str] = &["username", "handle", "screenName", "screen_name", "name"];
const DISPLAY_NAME_KEYS: &[&str] = &["name", "screenName", "screen_name"];
const VIEW_KEYS: &[&str] = &["viewCount", "views", "impressionCount", "impressions"];
const QUOTE_KEYS: &[&str] = &["quoteCount", "quotes"];

/// Classic Twitter timestamp, e.g. `Tue Dec 10 07:00:30 +0000 2024`.
const TWITTER_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Clone, PartialEq)]
pub struct TweetAuthor {
    pub handle: String,
    pub display_name: Option<String>,
}

/// A search result in canonical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTweet {
    pub id: String,
    pub url: Option<String>,
    pub text: String,
    pub author: TweetAuthor,
    pub created_at: DateTime<Utc>,
    pub metrics: TweetMetrics,
}

impl CandidateTweet {
    /// The tweet's own URL, or the canonical x.com permalink.
    pub fn permalink(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("https://x.com/{}/status/{}", self.author.handle, self.id),
        }
    }

    /// Fractional minutes between creation and `now`.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 60_000.0
    }
}

/// Pull the `tweets` array out of a search or lookup response body.
/// A body without the array yields no tweets.
pub fn tweets_array(body: &Value) -> &[Value] {
    body.get("tweets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Normalize one raw tweet. Returns `None` when the tweet has no usable id
/// or creation time; optional fields never cause a rejection.
pub fn normalize_tweet(raw: &Value) -> Option<CandidateTweet> {
    let Some(id) = id_of(raw) else {
        debug!("dropping tweet without id");
        return None;
    };
    let Some(created_at) = raw
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(parse_created_at)
    else {
        debug!(tweet_id = %id, "dropping tweet without parseable createdAt");
        return None;
    };

    let author_raw = AUTHOR_KEYS
        .iter()
        .find_map(|k| raw.get(*k).filter(|v| v.is_object()));
    let (handle, display_name) = match author_raw {
        Some(author) => (
            first_str(author, HANDLE_KEYS).unwrap_or("unknown").to_string(),
            first_str(author, DISPLAY_NAME_KEYS).map(str::to_string),
        ),
        None => ("unknown".to_string(), None),
    };

    Some(CandidateTweet {
        id,
        url: first_str(raw, &["url"]).map(str::to_string),
        text: first_str(raw, &["text"]).unwrap_or_default().to_string(),
        author: TweetAuthor {
            handle,
            display_name,
        },
        created_at,
        metrics: metrics_of(raw),
    })
}

/// Engagement counters of a raw tweet; absent counters are zero.
pub fn metrics_of(raw: &Value) -> TweetMetrics {
    TweetMetrics {
        likes: first_count(raw, &["likeCount"]).unwrap_or(0),
        retweets: first_count(raw, &["retweetCount"]).unwrap_or(0),
        replies: first_count(raw, &["replyCount"]).unwrap_or(0),
        views: first_count(raw, VIEW_KEYS).unwrap_or(0),
        quotes: first_count(raw, QUOTE_KEYS).unwrap_or(0),
    }
}

/// Tweet id as a string; some responses send it as a number.
pub fn id_of(raw: &Value) -> Option<String> {
    match raw.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    DateTime::parse_from_str(raw, TWITTER_TIME_FORMAT)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn first_str<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

/// First key holding a non-negative integer, either as a JSON number or a
/// numeric string.
fn first_count(obj: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    })
}

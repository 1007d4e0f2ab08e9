//! twitterapi.io client: candidate search for discovery and live metrics
//! lookups for resolution.

pub mod normalize;

pub use normalize::{CandidateTweet, TweetAuthor};

use crate::arena::TweetMetrics;
use crate::config::SearchConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// English, no retweets, at least 200 likes.
pub const CANDIDATE_QUERY: &str = "lang:en -is:retweet min_faves:200";

const SEARCH_PATH: &str = "/twitter/tweet/advanced_search";
const LOOKUP_PATH: &str = "/twitter/tweets";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed search response: {0}")]
    Decode(String),
    #[error("tweet {0} missing from lookup response")]
    NotFound(String),
}

/// Source of discovery candidates.
#[async_trait]
pub trait CandidateSource: Send + Sync + 'static {
    async fn search_candidates(&self) -> Result<Vec<CandidateTweet>, SearchError>;
}

/// Source of current engagement for an arena's tweet.
#[async_trait]
pub trait MetricsSource: Send + Sync + 'static {
    async fn tweet_metrics(&self, tweet_id: &str) -> Result<TweetMetrics, SearchError>;
}

pub struct TwitterApiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwitterApiClient {
    pub fn new(cfg: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, SearchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SearchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CandidateSource for TwitterApiClient {
    async fn search_candidates(&self) -> Result<Vec<CandidateTweet>, SearchError> {
        let body = self
            .get_json(
                SEARCH_PATH,
                &[("query", CANDIDATE_QUERY), ("queryType", "Latest")],
            )
            .await?;

        let raw = normalize::tweets_array(&body);
        let tweets: Vec<CandidateTweet> =
            raw.iter().filter_map(normalize::normalize_tweet).collect();

        info!(
            raw = raw.len(),
            normalized = tweets.len(),
            "fetched candidate tweets"
        );
        Ok(tweets)
    }
}

#[async_trait]
impl MetricsSource for TwitterApiClient {
    async fn tweet_metrics(&self, tweet_id: &str) -> Result<TweetMetrics, SearchError> {
        let body = self
            .get_json(LOOKUP_PATH, &[("tweet_ids", tweet_id)])
            .await?;

        let metrics = normalize::tweets_array(&body)
            .iter()
            .find(|t| normalize::id_of(t).as_deref() == Some(tweet_id))
            .map(normalize::metrics_of)
            .ok_or_else(|| SearchError::NotFound(tweet_id.to_string()))?;

        debug!(tweet_id, likes = metrics.likes, views = metrics.views, "fetched tweet metrics");
        Ok(metrics)
    }
}

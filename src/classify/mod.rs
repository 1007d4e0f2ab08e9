//! Best-effort topic labels for new arenas.
//!
//! One chat-completion request per discovery batch. Any failure (HTTP,
//! malformed JSON, unknown labels) degrades to "no labels"; classification
//! never blocks or fails a tick.

use crate::arena::{Arena, Category};
use crate::config::ClassifierConfig;
use crate::store::ArenaStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are classifying viral tweets into coarse buckets for a prediction market. \
Return STRICT JSON only, no prose.\n\
Valid categories: \"crypto\", \"ai\", \"politics\", \"meme\", \"sports\", \"other\".\n\
- crypto: anything clearly about coins, tokens, DeFi, NFTs, airdrops, Base, onchain, CT culture.\n\
- ai: AI, LLMs, dev tools, startups, hardware, general tech topics.\n\
- politics: elections, geopolitics, public policy, politicians, governments.\n\
- meme: mostly jokes / shitposts / culture, not clearly crypto/ai/politics.\n\
- sports: teams, athletes, matches, transfers.\n\
- other: everything else.\n\
Respond with a JSON object: { \"labels\": [{ \"id\": \"arena-id\", \"category\": \"crypto\" }, ...] }.";

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("classification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classification API returned {0}")]
    Status(u16),
    #[error("classification response missing content")]
    MissingContent,
    #[error("classification content is not valid label JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One arena to label.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyItem {
    pub id: String,
    pub handle: String,
    pub text: String,
}

impl ClassifyItem {
    pub fn from_arena(arena: &Arena) -> Self {
        Self {
            id: arena.id.to_string(),
            handle: arena.tweet_author_handle.clone(),
            text: arena.tweet_text.clone().unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct LabelResponse {
    labels: Vec<LabelItem>,
}

#[derive(Deserialize)]
struct LabelItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    category: String,
}

pub struct Classifier {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl Classifier {
    /// `None` when no API key is configured.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Option<Self>, ClassifyError> {
        if !cfg.enabled() {
            return Ok(None);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Some(Self {
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            client,
        }))
    }

    /// Labels keyed by item id. Errors are logged and yield an empty map.
    pub async fn classify(&self, items: &[ClassifyItem]) -> HashMap<String, Category> {
        if items.is_empty() {
            return HashMap::new();
        }
        match self.request_labels(items).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(error = %e, items = items.len(), "classification failed");
                HashMap::new()
            }
        }
    }

    async fn request_labels(
        &self,
        items: &[ClassifyItem],
    ) -> Result<HashMap<String, Category>, ClassifyError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: serde_json::json!({ "arenas": items }).to_string(),
                },
            ],
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClassifyError::Status(resp.status().as_u16()));
        }

        let chat: ChatResponse = resp.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(ClassifyError::MissingContent)?;

        parse_labels(&content)
    }
}

/// Parse the model's JSON reply. Entries without an id or with a label
/// outside the known set are dropped.
fn parse_labels(content: &str) -> Result<HashMap<String, Category>, ClassifyError> {
    let parsed: LabelResponse = serde_json::from_str(content)?;
    let mut labels = HashMap::new();
    for item in parsed.labels {
        if item.id.is_empty() {
            continue;
        }
        match item.category.parse::<Category>() {
            Ok(category) => {
                labels.insert(item.id, category);
            }
            Err(_) => debug!(id = %item.id, label = %item.category, "ignoring unknown label"),
        }
    }
    Ok(labels)
}

/// Classify freshly inserted arenas and write the labels back. Runs
/// detached from the discovery tick.
pub async fn label_new_arenas(
    classifier: Arc<Classifier>,
    store: Arc<dyn ArenaStore>,
    arenas: Vec<Arena>,
) {
    let items: Vec<ClassifyItem> = arenas.iter().map(ClassifyItem::from_arena).collect();
    let labels = classifier.classify(&items).await;

    let mut written = 0usize;
    for arena in &arenas {
        let Some(category) = labels.get(&arena.id.to_string()) else {
            continue;
        };
        match store.set_category(arena.id, *category).await {
            Ok(true) => written += 1,
            Ok(false) => debug!(arena = arena.arena_index, "arena gone or resolved, label skipped"),
            Err(e) => warn!(arena = arena.arena_index, error = %e, "failed to store category"),
        }
    }
    info!(arenas = arenas.len(), labeled = written, "classification done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NewArena;
    use crate::store::memory::MemoryArenaStore;
    use crate::store::InsertOutcome;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier_for(server: &MockServer) -> Classifier {
        Classifier::from_config(&ClassifierConfig {
            api_key: "sk-test".to_string(),
            base_url: server.uri(),
            ..ClassifierConfig::default()
        })
        .unwrap()
        .unwrap()
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    fn item(id: &str) -> ClassifyItem {
        ClassifyItem {
            id: id.to_string(),
            handle: "alice".to_string(),
            text: "gm".to_string(),
        }
    }

    #[test]
    fn test_disabled_without_key() {
        assert!(Classifier::from_config(&ClassifierConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_labels_drops_unknown_and_blank() {
        let labels = parse_labels(
            r#"{"labels":[
                {"id":"a","category":"crypto"},
                {"id":"b","category":"finance"},
                {"id":"","category":"ai"},
                {"id":"c","category":"Meme"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["a"], Category::Crypto);
        assert_eq!(labels["c"], Category::Meme);

        assert!(parse_labels("not json").is_err());
        assert!(parse_labels(r#"{"other": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_classify_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(chat_reply(r#"{"labels":[{"id":"x","category":"ai"}]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let labels = classifier_for(&server).classify(&[item("x")]).await;
        assert_eq!(labels.get("x"), Some(&Category::Ai));
    }

    #[tokio::test]
    async fn test_classify_failures_yield_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        assert!(classifier_for(&server).classify(&[item("x")]).await.is_empty());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("the answer is crypto"))
            .mount(&server)
            .await;
        assert!(classifier_for(&server).classify(&[item("x")]).await.is_empty());
    }

    #[tokio::test]
    async fn test_classify_skips_request_for_empty_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply(r#"{"labels":[]}"#))
            .expect(0)
            .mount(&server)
            .await;
        assert!(classifier_for(&server).classify(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_label_new_arenas_writes_categories() {
        let store = Arc::new(MemoryArenaStore::new());
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut arenas = Vec::new();
        for tweet_id in ["1", "2"] {
            let new = NewArena {
                tweet_id: tweet_id.to_string(),
                tweet_url: format!("https://x.com/a/status/{tweet_id}"),
                tweet_author_handle: "a".to_string(),
                author_display_name: None,
                tweet_text: Some("hello".to_string()),
                tweet_created_at: t,
                arena_created_at: t,
                resolve_deadline: t,
                bet_cutoff_at: t,
                likes_0: 300,
                retweets_0: None,
                replies_0: None,
                views_0: None,
                quotes_0: None,
                score_0: None,
                banger_line: 600,
                score_line: None,
            };
            match store.insert_if_absent(&new).await.unwrap() {
                InsertOutcome::Inserted(a) => arenas.push(a),
                InsertOutcome::Duplicate => unreachable!(),
            }
        }

        let server = MockServer::start().await;
        let reply = json!({
            "labels": [{ "id": arenas[0].id.to_string(), "category": "politics" }]
        })
        .to_string();
        Mock::given(method("POST"))
            .respond_with(chat_reply(&reply))
            .mount(&server)
            .await;

        let classifier = Arc::new(classifier_for(&server));
        label_new_arenas(classifier, store.clone(), arenas.clone()).await;

        assert_eq!(store.get(arenas[0].id).unwrap().category, Some(Category::Politics));
        assert_eq!(store.get(arenas[1].id).unwrap().category, None);
    }
}

use crate::config::FeedConfig;
use crate::notion::{DatabaseQuery, Direction, Filter, NotionClient, NotionError, QueryClient};
use crate::post::{self, NormalizedPost};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;

pub const FETCH_FAILED: &str = "Failed to fetch posts from Notion";

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to fetch posts from Notion: {0}")]
    Query(#[from] NotionError),
}

impl FeedError {
    /// Stable, caller-facing description of what went wrong.
    pub fn category(&self) -> &'static str {
        match self {
            FeedError::Query(_) => FETCH_FAILED,
        }
    }

    pub fn to_failure(&self, now: DateTime<Utc>) -> FeedFailure {
        let message = match self {
            FeedError::Query(err) => err.to_string(),
        };

        FeedFailure {
            success: false,
            error: self.category().to_string(),
            message,
            timestamp: post::iso_timestamp(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedEnvelope {
    pub success: bool,
    pub posts: Vec<NormalizedPost>,
    pub total: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedFailure {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

pub struct Feed<C> {
    client: C,
    config: FeedConfig,
}

impl Feed<NotionClient> {
    pub fn from_config(config: FeedConfig) -> Self {
        Self::new(NotionClient::from_config(&config), config)
    }
}

impl<C> Feed<C>
where
    C: QueryClient,
{
    pub fn new(client: C, config: FeedConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Newest first, optionally restricted to published pages.
    pub fn query(&self) -> DatabaseQuery {
        let query = DatabaseQuery::with_page_size(self.config.page_size)
            .sorted_by(self.config.schema.date.as_str(), Direction::Descending);

        match &self.config.published_property {
            Some(property) => query.filtered_by(Filter::And {
                and: vec![Filter::checkbox_equals(property.as_str(), true)],
            }),
            None => query,
        }
    }

    pub async fn fetch(&self) -> Result<FeedEnvelope, FeedError> {
        self.fetch_at(Utc::now()).await
    }

    /// One query, one page. Anything past the first page is dropped.
    pub async fn fetch_at(&self, now: DateTime<Utc>) -> Result<FeedEnvelope, FeedError> {
        let response = self
            .client
            .query_database(&self.config.database_id, &self.query())
            .await
            .inspect_err(|err| error!("Notion API Error: {}", err))?;

        if response.has_more {
            debug!(
                "Truncating feed to {} posts, more are available from cursor {:?}",
                response.results.len(),
                response.next_cursor
            );
        }

        let posts: Vec<NormalizedPost> = response
            .results
            .iter()
            .enumerate()
            .map(|(index, page)| post::normalize(page, index, &self.config.schema, now))
            .collect();

        info!("Fetched {} posts", posts.len());

        Ok(FeedEnvelope {
            success: true,
            total: posts.len(),
            posts,
            timestamp: post::iso_timestamp(now),
        })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::notion::{QueryResponse, fixtures};
    use anyhow::Result;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a canned response and remembers what it was asked.
    pub(crate) struct StubClient {
        response: Result<String, (u16, String)>,
        pub(crate) calls: AtomicUsize,
        pub(crate) last_query: Mutex<Option<DatabaseQuery>>,
    }

    impl StubClient {
        pub(crate) fn ok(body: &str) -> Self {
            Self {
                response: Ok(body.to_string()),
                calls: AtomicUsize::new(0),
                last_query: Mutex::new(None),
            }
        }

        pub(crate) fn failing(status: u16, body: &str) -> Self {
            Self {
                response: Err((status, body.to_string())),
                calls: AtomicUsize::new(0),
                last_query: Mutex::new(None),
            }
        }
    }

    impl QueryClient for StubClient {
        async fn query_database(
            &self,
            _database_id: &str,
            query: &DatabaseQuery,
        ) -> Result<QueryResponse, NotionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some(query.clone());

            match &self.response {
                Ok(body) => Ok(serde_json::from_str(body)?),
                Err((status, body)) => Err(NotionError::from_response(*status, body)),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap()
    }

    #[tokio::test]
    async fn test_fetch() -> Result<()> {
        let feed = Feed::new(
            StubClient::ok(fixtures::QUERY_RESPONSE),
            FeedConfig::new("secret", "db"),
        );

        let envelope = feed.fetch_at(now()).await?;

        assert!(envelope.success);
        assert_eq!(envelope.total, 2);
        assert_eq!(envelope.timestamp, "2024-03-04T05:06:07.000Z");

        let ids: Vec<&str> = envelope.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["page-1", "page-2"]);

        assert_eq!(envelope.posts[0].caption, "Hello, world");
        assert_eq!(
            envelope.posts[0].media.as_deref(),
            Some("https://files.notion.so/clip.mp4?sig=1")
        );
        assert_eq!(envelope.posts[1].caption, "Post 2");
        assert_eq!(envelope.posts[1].date, "2024-01-01T09:30:00.000Z");

        Ok(())
    }

    const MALFORMED_RESPONSE: &str = r#"{
        "object": "list",
        "results": [
            {
                "id": "good",
                "created_time": "2024-01-01T00:00:00.000Z",
                "properties": {
                    "Caption": { "type": "title", "title": [{ "plain_text": "Fine" }] },
                    "Post": {
                        "type": "files",
                        "files": [{ "type": "external", "external": { "url": "https://example.com/a.png" } }]
                    },
                    "Hide": { "type": "checkbox", "checkbox": false }
                }
            },
            {
                "id": "bad",
                "created_time": "2024-01-02T00:00:00.000Z",
                "properties": {
                    "Caption": { "type": "rich_text", "rich_text": [{ "plain_text": "Broken media" }] },
                    "Post": { "type": "files", "files": [{ "type": "file", "name": "x" }] },
                    "Hide": { "type": "checkbox", "checkbox": "yes" },
                    "Date": { "type": "date", "date": "soon" }
                }
            }
        ],
        "next_cursor": null,
        "has_more": false
    }"#;

    #[tokio::test]
    async fn test_fetch_tolerates_malformed_properties() -> Result<()> {
        let feed = Feed::new(
            StubClient::ok(MALFORMED_RESPONSE),
            FeedConfig::new("secret", "db"),
        );

        let envelope = feed.fetch_at(now()).await?;

        assert!(envelope.success);
        assert_eq!(envelope.total, 2);

        let good = &envelope.posts[0];
        assert_eq!(good.caption, "Fine");
        assert_eq!(good.media.as_deref(), Some("https://example.com/a.png"));

        let bad = &envelope.posts[1];
        assert_eq!(bad.id, "bad");
        assert_eq!(bad.caption, "Broken media");
        assert_eq!(bad.media, None);
        assert_eq!(bad.media_type, None);
        assert_eq!(bad.date, "2024-01-02T00:00:00.000Z");

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_sends_sort_and_filter() -> Result<()> {
        let feed = Feed::new(
            StubClient::ok(fixtures::EMPTY_RESPONSE),
            FeedConfig::new("secret", "db"),
        );

        feed.fetch_at(now()).await?;

        let query = feed.client.last_query.lock().unwrap().clone();
        assert_eq!(
            serde_json::to_value(query)?,
            json!({
                "sorts": [{ "property": "Date", "direction": "descending" }],
                "filter": { "and": [{ "property": "Published", "checkbox": { "equals": true } }] },
                "page_size": 30
            })
        );

        Ok(())
    }

    #[test]
    fn test_query_without_filter() -> Result<()> {
        let config = FeedConfig::new("secret", "db")
            .with_published_property(None::<String>)
            .with_page_size(10);
        let feed = Feed::new(StubClient::ok(fixtures::EMPTY_RESPONSE), config);

        let query = feed.query();

        assert_eq!(query.filter, None);
        assert_eq!(query.page_size, 10);

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_empty() -> Result<()> {
        let feed = Feed::new(
            StubClient::ok(fixtures::EMPTY_RESPONSE),
            FeedConfig::new("secret", "db"),
        );

        let envelope = feed.fetch_at(now()).await?;

        assert!(envelope.success);
        assert!(envelope.posts.is_empty());
        assert_eq!(envelope.total, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_failure() -> Result<()> {
        let feed = Feed::new(
            StubClient::failing(
                401,
                r#"{"object":"error","status":401,"code":"unauthorized","message":"API token is invalid."}"#,
            ),
            FeedConfig::new("secret", "db"),
        );

        let err = feed.fetch_at(now()).await.unwrap_err();
        assert_eq!(feed.client.calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            serde_json::to_value(err.to_failure(now()))?,
            json!({
                "success": false,
                "error": "Failed to fetch posts from Notion",
                "message": "API token is invalid.",
                "timestamp": "2024-03-04T05:06:07.000Z"
            })
        );

        Ok(())
    }
}

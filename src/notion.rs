//! Just enough of the Notion REST API to query a database and read the
//! property types a feed cares about.

use log::{debug, trace, warn};
use reqwest::header::{HeaderMap, InvalidHeaderValue};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;

pub const NOTION_VERSION: &str = "2022-06-28";

pub const UNAUTHORIZED: &str = "unauthorized";
pub const OBJECT_NOT_FOUND: &str = "object_not_found";

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    ObjectNotFound { message: String },
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("Invalid response from Notion: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl NotionError {
    /// The Notion error code, e.g. `unauthorized`, when the failure came from the API itself.
    pub fn code(&self) -> Option<&str> {
        match self {
            NotionError::Unauthorized { .. } => Some(UNAUTHORIZED),
            NotionError::ObjectNotFound { .. } => Some(OBJECT_NOT_FOUND),
            NotionError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        let (code, message) = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { code, message }) => (code, message),
            Err(_) => (None, None),
        };

        let code = code.unwrap_or_else(|| match status {
            401 => UNAUTHORIZED.to_string(),
            404 => OBJECT_NOT_FOUND.to_string(),
            _ => "unknown".to_string(),
        });
        let message = message.unwrap_or_else(|| format!("Notion responded with HTTP {status}"));

        match code.as_str() {
            UNAUTHORIZED => NotionError::Unauthorized { message },
            OBJECT_NOT_FOUND => NotionError::ObjectNotFound { message },
            _ => NotionError::Api {
                status,
                code,
                message,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sort {
    pub property: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckboxCondition {
    pub equals: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Filter {
    And {
        and: Vec<Filter>,
    },
    Checkbox {
        property: String,
        checkbox: CheckboxCondition,
    },
}

impl Filter {
    pub fn checkbox_equals<T>(property: T, equals: bool) -> Self
    where
        T: Into<String>,
    {
        Filter::Checkbox {
            property: property.into(),
            checkbox: CheckboxCondition { equals },
        }
    }
}

/// Body of `POST /v1/databases/{id}/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub page_size: u32,
}

impl DatabaseQuery {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            sorts: Vec::new(),
            filter: None,
            page_size,
        }
    }

    pub fn sorted_by<T>(mut self, property: T, direction: Direction) -> Self
    where
        T: Into<String>,
    {
        self.sorts.push(Sort {
            property: property.into(),
            direction,
        });
        self
    }

    pub fn filtered_by(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<Page>,
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    pub created_time: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Page {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileObject {
    /// Uploaded to Notion; the URL is signed and expires.
    File { file: FileUrl },
    External { external: FileUrl },
    #[serde(other)]
    Unknown,
}

impl FileObject {
    pub fn url(&self) -> Option<&str> {
        match self {
            FileObject::File { file } => Some(file.url.as_str()),
            FileObject::External { external } => Some(external.url.as_str()),
            FileObject::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DateValue {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// A page property, keyed by the `type` Notion reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Title(Vec<RichText>),
    RichText(Vec<RichText>),
    Files(Vec<FileObject>),
    Date(Option<DateValue>),
    Checkbox(bool),
    Unsupported(String),
}

impl PropertyValue {
    pub fn kind(&self) -> &str {
        match self {
            PropertyValue::Title(_) => "title",
            PropertyValue::RichText(_) => "rich_text",
            PropertyValue::Files(_) => "files",
            PropertyValue::Date(_) => "date",
            PropertyValue::Checkbox(_) => "checkbox",
            PropertyValue::Unsupported(kind) => kind.as_str(),
        }
    }

    pub fn spans(&self) -> &[RichText] {
        match self {
            PropertyValue::Title(spans) | PropertyValue::RichText(spans) => spans,
            _ => &[],
        }
    }

    /// All spans concatenated in order. `None` for non-text properties.
    pub fn plain_text(&self) -> Option<String> {
        match self {
            PropertyValue::Title(spans) | PropertyValue::RichText(spans) => Some(
                spans
                    .iter()
                    .map(|span| span.plain_text.as_str())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Only the first file is considered.
    pub fn first_file_url(&self) -> Option<&str> {
        match self {
            PropertyValue::Files(files) => files.first().and_then(FileObject::url),
            _ => None,
        }
    }

    pub fn date_start(&self) -> Option<&str> {
        match self {
            PropertyValue::Date(Some(date)) => date.start.as_deref(),
            _ => None,
        }
    }

    pub fn checkbox(&self) -> Option<bool> {
        match self {
            PropertyValue::Checkbox(checked) => Some(*checked),
            _ => None,
        }
    }
}

fn take<T>(value: &mut Value, field: &str) -> serde_json::Result<T>
where
    T: DeserializeOwned + Default,
{
    match value.get_mut(field).map(Value::take) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(field) => serde_json::from_value(field),
    }
}

/// An entry that doesn't decode becomes `FileObject::Unknown` rather than
/// failing the whole property.
fn take_files(value: &mut Value) -> serde_json::Result<Vec<FileObject>> {
    let entries: Vec<Value> = take(value, "files")?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value(entry).unwrap_or_else(|err| {
                warn!("Ignoring malformed file entry: {}", err);
                FileObject::Unknown
            })
        })
        .collect())
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("type"))?
            .to_string();

        let property = match kind.as_str() {
            "title" => take(&mut value, "title").map(PropertyValue::Title),
            "rich_text" => take(&mut value, "rich_text").map(PropertyValue::RichText),
            "files" => take_files(&mut value).map(PropertyValue::Files),
            "date" => take(&mut value, "date").map(PropertyValue::Date),
            "checkbox" => take(&mut value, "checkbox").map(PropertyValue::Checkbox),
            _ => Ok(PropertyValue::Unsupported(kind.clone())),
        };

        // A payload that doesn't match its tag reads as an unknown type, so one
        // bad property never costs the rest of the page.
        Ok(property.unwrap_or_else(|err| {
            warn!("Ignoring malformed {} property: {}", kind, err);
            PropertyValue::Unsupported(kind.clone())
        }))
    }
}

/// Anything that can run a database query. The feed only ever needs this one call.
pub trait QueryClient {
    fn query_database(
        &self,
        database_id: &str,
        query: &DatabaseQuery,
    ) -> impl Future<Output = Result<QueryResponse, NotionError>> + Send;
}

#[derive(Debug, Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    token: String,
    api_url: String,
}

impl NotionClient {
    pub fn new<T, U>(token: T, api_url: U) -> Self
    where
        T: Into<String>,
        U: Into<String>,
    {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &crate::FeedConfig) -> Self {
        Self::new(config.token.as_str(), config.api_url.as_str())
    }

    fn headers(&self) -> Result<HeaderMap, NotionError> {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert("Authorization", format!("Bearer {}", self.token).parse()?);
        headers.insert("Notion-Version", NOTION_VERSION.parse()?);
        headers.insert("Content-Type", "application/json".parse()?);

        Ok(headers)
    }
}

impl QueryClient for NotionClient {
    async fn query_database(
        &self,
        database_id: &str,
        query: &DatabaseQuery,
    ) -> Result<QueryResponse, NotionError> {
        let url = format!("{}/v1/databases/{}/query", self.api_url, database_id);

        trace!("Querying Notion: {:?}", query);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        trace!("Notion Response ({}): {}", status, body);

        if !status.is_success() {
            return Err(NotionError::from_response(status.as_u16(), &body));
        }

        let response: QueryResponse = serde_json::from_str(&body)?;
        debug!(
            "Read {} pages from {} (has_more: {})",
            response.results.len(),
            database_id,
            response.has_more
        );

        Ok(response)
    }
}

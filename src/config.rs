use crate::post::PropertySchema;
use std::env;
use std::fmt;

pub const DEFAULT_API_URL: &str = "https://api.notion.com";
pub const DEFAULT_PAGE_SIZE: u32 = 30;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PUBLISHED_PROPERTY: &str = "Published";
pub const DEFAULT_CACHE_MAX_AGE: u32 = 60;

const REQUIRED_VARS: [&str; 2] = [crate::NOTION_TOKEN_VAR, crate::NOTION_DATABASE_ID_VAR];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// Everything the feed needs to talk to Notion, read once at process start.
#[derive(Clone)]
pub struct FeedConfig {
    pub token: String,
    pub database_id: String,
    pub page_size: u32,
    /// Checkbox that must be ticked for a page to be served. `None` serves every page.
    pub published_property: Option<String>,
    pub schema: PropertySchema,
    pub api_url: String,
    pub cache_max_age: u32,
}

impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConfig")
            .field("token", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("page_size", &self.page_size)
            .field("published_property", &self.published_property)
            .field("schema", &self.schema)
            .field("api_url", &self.api_url)
            .field("cache_max_age", &self.cache_max_age)
            .finish()
    }
}

impl FeedConfig {
    pub fn new<T, D>(token: T, database_id: D) -> Self
    where
        T: Into<String>,
        D: Into<String>,
    {
        Self {
            token: token.into(),
            database_id: database_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
            published_property: Some(DEFAULT_PUBLISHED_PROPERTY.to_string()),
            schema: PropertySchema::default(),
            api_url: DEFAULT_API_URL.to_string(),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        validate(&lookup)?;

        let token = non_empty(&lookup, crate::NOTION_TOKEN_VAR).unwrap_or_default();
        let database_id =
            non_empty(&lookup, crate::NOTION_DATABASE_ID_VAR).unwrap_or_default();

        let mut config = Self::new(token, database_id);

        if let Some(page_size) = parse_var::<u32, _>(&lookup, crate::NOTION_PAGE_SIZE_VAR)? {
            config = config.with_page_size(page_size);
        }

        // Set but empty disables the filter; unset keeps the default.
        if let Some(published) = lookup(crate::NOTION_PUBLISHED_PROPERTY_VAR) {
            let published = published.trim();
            config.published_property = if published.is_empty() {
                None
            } else {
                Some(published.to_string())
            };
        }

        if let Some(api_url) = non_empty(&lookup, crate::NOTION_API_URL_VAR) {
            config.api_url = api_url.trim_end_matches('/').to_string();
        }

        if let Some(max_age) = parse_var::<u32, _>(&lookup, crate::CACHE_MAX_AGE_VAR)? {
            config.cache_max_age = max_age;
        }

        Ok(config)
    }

    /// Clamps to the range Notion accepts for a single query.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_published_property<T>(mut self, property: Option<T>) -> Self
    where
        T: Into<String>,
    {
        self.published_property = property.map(Into::into);
        self
    }

    pub fn with_api_url<T>(mut self, api_url: T) -> Self
    where
        T: Into<String>,
    {
        self.api_url = api_url.into();
        self
    }
}

/// Fails with every missing required variable named, not just the first.
pub fn validate_env() -> Result<(), ConfigError> {
    validate(&|name: &str| env::var(name).ok())
}

fn validate<F>(lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<String> = REQUIRED_VARS
        .iter()
        .filter(|name| non_empty(lookup, name).is_none())
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingVariables(missing))
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.is_empty())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

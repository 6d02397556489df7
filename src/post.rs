use crate::notion::{Page, PropertyValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".webm"];

/// Names of the database properties a post is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    pub caption: String,
    pub media: String,
    pub date: String,
    pub hide: String,
}

impl Default for PropertySchema {
    fn default() -> Self {
        Self {
            caption: "Caption".to_string(),
            media: "Post".to_string(),
            date: "Date".to_string(),
            hide: "Hide".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// Case-sensitive: `clip.MP4` is an image.
    pub fn classify(url: &str) -> Self {
        if VIDEO_EXTENSIONS.iter().any(|ext| url.contains(ext)) {
            MediaType::Video
        } else {
            MediaType::Image
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPost {
    pub id: String,
    pub caption: String,
    pub media: Option<String>,
    pub media_type: Option<MediaType>,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notion_url: Option<String>,
}

/// Same shape as JavaScript's `Date.toISOString`.
pub fn iso_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn caption(page: &Page, schema: &PropertySchema) -> Option<String> {
    page.property(&schema.caption)
        .and_then(PropertyValue::plain_text)
        .filter(|caption| !caption.is_empty())
}

pub fn media_url<'a>(page: &'a Page, schema: &PropertySchema) -> Option<&'a str> {
    page.property(&schema.media)
        .and_then(PropertyValue::first_file_url)
}

pub fn date<'a>(page: &'a Page, schema: &PropertySchema) -> Option<&'a str> {
    page.property(&schema.date).and_then(PropertyValue::date_start)
}

pub fn hidden(page: &Page, schema: &PropertySchema) -> Option<bool> {
    page.property(&schema.hide).and_then(PropertyValue::checkbox)
}

/// Builds the served post for the page at `index` within its batch. Every
/// missing or mistyped property falls back to a default.
pub fn normalize(
    page: &Page,
    index: usize,
    schema: &PropertySchema,
    now: DateTime<Utc>,
) -> NormalizedPost {
    let media = media_url(page, schema).map(str::to_string);
    let media_type = media.as_deref().map(MediaType::classify);

    let date = date(page, schema)
        .or(page.created_time.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| iso_timestamp(now));

    NormalizedPost {
        id: page.id.clone(),
        caption: caption(page, schema).unwrap_or_else(|| format!("Post {}", index + 1)),
        media,
        media_type,
        date,
        notion_url: page.url.clone(),
    }
}

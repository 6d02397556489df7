//! Human-readable checks for a Notion integration: is it configured, can it
//! read the database, and does the database have the properties a feed reads.

use crate::notion::{
    DatabaseQuery, NotionError, OBJECT_NOT_FOUND, Page, QueryClient, UNAUTHORIZED,
};
use crate::post::{self, PropertySchema};
use log::debug;

pub const SAMPLE_SIZE: u32 = 5;
pub const EXPECTED_PROPERTIES: [&str; 4] = ["Post", "Caption", "Date", "Hide"];

const EXCERPT_LEN: usize = 50;

pub fn excerpt(text: &str) -> String {
    let excerpt: String = text.chars().take(EXCERPT_LEN).collect();
    format!("{}...", excerpt)
}

pub fn env_report(token: Option<&str>, database_id: Option<&str>) -> Vec<String> {
    let token = match token.filter(|t| !t.is_empty()) {
        Some(token) => format!("Set (length: {})", token.len()),
        None => "Missing".to_string(),
    };
    let database_id = match database_id.filter(|id| !id.is_empty()) {
        Some(id) => format!("Set ({})", id),
        None => "Missing".to_string(),
    };

    vec![
        "Environment Variables:".to_string(),
        format!("  {}: {}", crate::NOTION_TOKEN_VAR, token),
        format!("  {}: {}", crate::NOTION_DATABASE_ID_VAR, database_id),
    ]
}

pub fn property_listing(page: &Page) -> Vec<String> {
    let mut lines = vec!["Database Properties Found:".to_string()];
    lines.extend(
        page.properties
            .iter()
            .map(|(name, value)| format!("  - {} ({})", name, value.kind())),
    );
    lines
}

pub fn visibility(page: &Page, schema: &PropertySchema) -> &'static str {
    match post::hidden(page, schema) {
        Some(true) => "Hidden",
        Some(false) => "Visible",
        None => "Not set",
    }
}

pub fn summarize(page: &Page, index: usize, schema: &PropertySchema) -> Vec<String> {
    let caption = page
        .property(&schema.caption)
        .and_then(|caption| caption.spans().first())
        .map(|span| excerpt(&span.plain_text))
        .unwrap_or_else(|| "No caption".to_string());
    let media = post::media_url(page, schema)
        .map(excerpt)
        .unwrap_or_else(|| "No media".to_string());
    let date = post::date(page, schema).unwrap_or("No date");

    vec![
        format!("  {}. {}", index + 1, caption),
        format!("     Media: {}", media),
        format!("     Date: {}", date),
        format!("     Visibility: {}", visibility(page, schema)),
    ]
}

pub fn validate_properties(page: &Page) -> Vec<String> {
    let mut lines = vec!["Property Validation:".to_string()];
    lines.extend(EXPECTED_PROPERTIES.iter().map(|name| {
        if page.properties.contains_key(*name) {
            format!("  [ok] {} - Found", name)
        } else {
            format!(
                "  [missing] {} - Missing (you need to add this property to your database)",
                name
            )
        }
    }));
    lines
}

pub fn remediation(err: &NotionError) -> Option<String> {
    match err.code() {
        Some(UNAUTHORIZED) => Some(format!(
            "Fix: Check your {} or make sure the integration has access to the database",
            crate::NOTION_TOKEN_VAR
        )),
        Some(OBJECT_NOT_FOUND) => Some(format!(
            "Fix: Check your {} or make sure the database exists",
            crate::NOTION_DATABASE_ID_VAR
        )),
        _ => None,
    }
}

/// Reads a handful of pages, unsorted and unfiltered, and describes them.
pub async fn inspect<C>(
    client: &C,
    database_id: &str,
    schema: &PropertySchema,
) -> Result<Vec<String>, NotionError>
where
    C: QueryClient,
{
    debug!("Sampling {} pages from {}", SAMPLE_SIZE, database_id);
    let response = client
        .query_database(database_id, &DatabaseQuery::with_page_size(SAMPLE_SIZE))
        .await?;

    let mut lines = vec![
        "Successfully connected to Notion!".to_string(),
        format!("Found {} records in database", response.results.len()),
        String::new(),
    ];

    let Some(first) = response.results.first() else {
        lines.push("Database is empty. Add some posts to test properly.".to_string());
        return Ok(lines);
    };

    lines.extend(property_listing(first));
    lines.push(String::new());

    lines.push("Sample Posts:".to_string());
    for (index, page) in response.results.iter().enumerate() {
        lines.extend(summarize(page, index, schema));
        lines.push(String::new());
    }

    lines.extend(validate_properties(first));

    Ok(lines)
}

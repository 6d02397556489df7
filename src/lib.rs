use anyhow::Result;
use log::LevelFilter;
use std::borrow::Cow;

pub mod config;
pub mod diagnostic;
pub mod feed;
pub mod handler;
pub mod notion;
pub mod post;

pub use config::{ConfigError, FeedConfig};
pub use feed::{Feed, FeedEnvelope, FeedError, FeedFailure};
pub use notion::{NotionClient, NotionError, QueryClient};
pub use post::{MediaType, NormalizedPost, PropertySchema};

pub const APP_NAME: &str = "notion_feed";

pub const NOTION_TOKEN_VAR: &str = "NOTION_TOKEN";
pub const NOTION_DATABASE_ID_VAR: &str = "NOTION_DATABASE_ID";
pub const NOTION_PAGE_SIZE_VAR: &str = "NOTION_PAGE_SIZE";
pub const NOTION_PUBLISHED_PROPERTY_VAR: &str = "NOTION_PUBLISHED_PROPERTY";
pub const NOTION_API_URL_VAR: &str = "NOTION_API_URL";
pub const CACHE_MAX_AGE_VAR: &str = "FEED_CACHE_MAX_AGE";

fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Logs `app_name` and `calling_module` at Info (Debug when verbose) and
/// everything else at Warn. Installing a second logger is a no-op.
pub fn set_up_logger<A, T>(app_name: A, calling_module: T, verbose: bool) -> Result<()>
where
    A: Into<Cow<'static, str>>,
    T: Into<Cow<'static, str>>,
{
    let level = log_level(verbose);

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for(app_name, level)
        .level_for(calling_module, level)
        .chain(std::io::stdout());

    if dispatch.apply().is_err() {
        log::debug!("Logger already installed");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(false), LevelFilter::Info);
        assert_eq!(log_level(true), LevelFilter::Debug);
    }

    #[test]
    fn test_set_up_logger_twice() -> Result<()> {
        set_up_logger(APP_NAME, module_path!(), false)?;
        set_up_logger(APP_NAME, module_path!(), true)?;

        Ok(())
    }
}

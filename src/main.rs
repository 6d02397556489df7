use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use log::debug;
use notion_feed::config::DEFAULT_API_URL;
use notion_feed::{Feed, FeedConfig, NotionClient, PropertySchema, diagnostic};
use std::env;

struct Args {
    verbose: bool,
    feed: bool,
    token: Option<String>,
    database_id: Option<String>,
    api_url: String,
}

fn parse_args() -> Args {
    let matches = Command::new("NotionFeed-Diagnostic")
        .version("0.1")
        .about("Checks that a Notion database can be served as a feed.")
        .arg(
            Arg::new("token")
                .short('t')
                .long("token")
                .env(notion_feed::NOTION_TOKEN_VAR)
                .hide_env_values(true)
                .help("Notion integration token."),
        )
        .arg(
            Arg::new("database-id")
                .short('d')
                .long("database-id")
                .env(notion_feed::NOTION_DATABASE_ID_VAR)
                .help("ID of the Notion database holding the posts."),
        )
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .env(notion_feed::NOTION_API_URL_VAR)
                .default_value(DEFAULT_API_URL)
                .help("Base URL of the Notion API."),
        )
        .arg(
            Arg::new("feed")
                .short('f')
                .long("feed")
                .action(ArgAction::SetTrue)
                .help("Print the feed as it would be served instead of inspecting the database."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose mode. Outputs DEBUG and higher log messages."),
        )
        .get_matches();

    let non_empty = |name: &str| {
        matches
            .get_one::<String>(name)
            .filter(|value| !value.is_empty())
            .cloned()
    };

    let token = non_empty("token");

    let database_id = non_empty("database-id");

    let api_url = non_empty("api-url").unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let verbose = matches.get_flag("verbose");

    let feed = matches.get_flag("feed");

    Args {
        verbose,
        feed,
        token,
        database_id,
        api_url,
    }
}

async fn print_feed(args: Args) -> Result<()> {
    // Flags win over the environment for the values clap already resolved.
    let config = FeedConfig::from_lookup(|name| {
        if name == notion_feed::NOTION_TOKEN_VAR {
            args.token.clone()
        } else if name == notion_feed::NOTION_DATABASE_ID_VAR {
            args.database_id.clone()
        } else if name == notion_feed::NOTION_API_URL_VAR {
            Some(args.api_url.clone())
        } else {
            env::var(name).ok()
        }
    })?;
    debug!("{:?}", config);

    let feed = Feed::from_config(config);
    match feed.fetch().await {
        Ok(envelope) => {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Err(err) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&err.to_failure(chrono::Utc::now()))?
            );
            Err(err.into())
        }
    }
}

async fn inspect(args: Args) -> Result<()> {
    println!("Testing Notion connection...");
    println!();

    for line in diagnostic::env_report(args.token.as_deref(), args.database_id.as_deref()) {
        println!("{}", line);
    }
    println!();

    let (Some(token), Some(database_id)) = (args.token, args.database_id) else {
        println!("Missing environment variables. Check your .env file.");
        return Ok(());
    };

    let client = NotionClient::new(token, args.api_url);

    println!("Testing database access...");
    match diagnostic::inspect(&client, &database_id, &PropertySchema::default()).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(err) => {
            println!("Error connecting to Notion:");
            println!("Error: {}", err);
            if let Some(hint) = diagnostic::remediation(&err) {
                println!();
                println!("{}", hint);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = parse_args();
    notion_feed::set_up_logger(notion_feed::APP_NAME, module_path!(), args.verbose)?;
    debug!("verbose: {}, feed: {}", args.verbose, args.feed);

    if args.feed {
        print_feed(args).await
    } else {
        inspect(args).await
    }
}

use aws_lambda_events::apigw::{ApiGatewayV2httpRequest, ApiGatewayV2httpResponse};
use lambda_runtime::{LambdaEvent, service_fn};
use log::debug;
use notion_feed::{APP_NAME, Feed, FeedConfig, NotionClient, handler, set_up_logger};

type LambdaError = lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    set_up_logger(APP_NAME, module_path!(), false)?;

    let config = FeedConfig::from_env()?;
    debug!("{:?}", config);

    let feed = Feed::from_config(config);
    let feed = &feed;

    let func = service_fn(move |event| function(feed, event));
    lambda_runtime::run(func).await?;
    Ok(())
}

async fn function(
    feed: &Feed<NotionClient>,
    event: LambdaEvent<ApiGatewayV2httpRequest>,
) -> Result<ApiGatewayV2httpResponse, LambdaError> {
    debug!("Processing request: {}", event.context.request_id);

    Ok(handler::handle_request(feed, &event.payload).await?)
}

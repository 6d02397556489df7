//! Maps an inbound API Gateway (HTTP API / function URL) request onto the feed.

use crate::feed::Feed;
use crate::notion::QueryClient;
use anyhow::Result;
use aws_lambda_events::apigw::{ApiGatewayV2httpRequest, ApiGatewayV2httpResponse};
use aws_lambda_events::encodings::Body;
use chrono::Utc;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(5);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );

    headers
}

fn response(
    status: StatusCode,
    headers: HeaderMap,
    body: Option<String>,
) -> ApiGatewayV2httpResponse {
    let mut response = ApiGatewayV2httpResponse::default();
    response.status_code = i64::from(status.as_u16());
    response.headers = headers;
    response.body = body.map(Body::Text);
    response
}

fn json_response<T>(
    status: StatusCode,
    mut headers: HeaderMap,
    body: &T,
) -> Result<ApiGatewayV2httpResponse>
where
    T: Serialize,
{
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    Ok(response(status, headers, Some(serde_json::to_string(body)?)))
}

pub async fn handle_request<C>(
    feed: &Feed<C>,
    request: &ApiGatewayV2httpRequest,
) -> Result<ApiGatewayV2httpResponse>
where
    C: QueryClient,
{
    handle(feed, &request.request_context.http.method).await
}

/// CORS preflight is answered without touching Notion; only GET serves the feed.
pub async fn handle<C>(feed: &Feed<C>, method: &Method) -> Result<ApiGatewayV2httpResponse>
where
    C: QueryClient,
{
    debug!("Handling {} request", method);

    let mut headers = cors_headers();

    if method == Method::OPTIONS {
        return Ok(response(StatusCode::OK, headers, None));
    }

    if method != Method::GET {
        warn!("Rejecting {} request", method);
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            headers,
            &json!({ "error": "Method not allowed" }),
        );
    }

    match feed.fetch().await {
        Ok(envelope) => {
            let cache_control = format!("s-maxage={}", feed.config().cache_max_age);
            headers.insert(header::CACHE_CONTROL, cache_control.parse()?);

            json_response(StatusCode::OK, headers, &envelope)
        }
        Err(err) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            &err.to_failure(Utc::now()),
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::FeedConfig;
    use crate::feed::test::StubClient;
    use crate::notion::fixtures;
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    fn body_json(response: &ApiGatewayV2httpResponse) -> Result<Value> {
        match &response.body {
            Some(Body::Text(body)) => Ok(serde_json::from_str(body)?),
            other => anyhow::bail!("unexpected body: {:?}", other),
        }
    }

    fn header<'a>(response: &'a ApiGatewayV2httpResponse, name: &str) -> Option<&'a str> {
        response
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    fn feed(client: StubClient) -> Feed<StubClient> {
        Feed::new(client, FeedConfig::new("secret", "db"))
    }

    #[tokio::test]
    async fn test_get() -> Result<()> {
        let feed = feed(StubClient::ok(fixtures::QUERY_RESPONSE));

        let response = handle(&feed, &Method::GET).await?;

        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "cache-control"), Some("s-maxage=60"));
        assert_eq!(header(&response, "content-type"), Some("application/json"));
        assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));

        let body = body_json(&response)?;
        assert_eq!(body["success"], true);
        assert_eq!(body["total"], 2);
        assert_eq!(body["posts"][0]["id"], "page-1");
        assert_eq!(body["posts"][0]["mediaType"], "video");
        assert_eq!(body["posts"][1]["mediaType"], "image");

        Ok(())
    }

    #[tokio::test]
    async fn test_get_empty() -> Result<()> {
        let feed = feed(StubClient::ok(fixtures::EMPTY_RESPONSE));

        let response = handle(&feed, &Method::GET).await?;

        assert_eq!(response.status_code, 200);
        let body = body_json(&response)?;
        assert_eq!(body["posts"], Value::Array(Vec::new()));
        assert_eq!(body["total"], 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_get_failure() -> Result<()> {
        let feed = feed(StubClient::failing(
            404,
            r#"{"object":"error","status":404,"code":"object_not_found","message":"Could not find database with ID: db."}"#,
        ));

        let response = handle(&feed, &Method::GET).await?;

        assert_eq!(response.status_code, 500);
        assert_eq!(header(&response, "cache-control"), None);
        assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));

        let body = body_json(&response)?;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Failed to fetch posts from Notion");
        assert_eq!(body["message"], "Could not find database with ID: db.");
        assert!(body["timestamp"].is_string());

        Ok(())
    }

    #[tokio::test]
    async fn test_options_skips_notion() -> Result<()> {
        let feed = feed(StubClient::ok(fixtures::QUERY_RESPONSE));

        let response = handle(&feed, &Method::OPTIONS).await?;

        assert_eq!(response.status_code, 200);
        assert!(response.body.is_none());
        assert_eq!(
            header(&response, "access-control-allow-methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(
            header(&response, "access-control-allow-headers"),
            Some("Content-Type")
        );
        assert_eq!(feed.client_calls(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_method_not_allowed() -> Result<()> {
        let feed = feed(StubClient::ok(fixtures::QUERY_RESPONSE));

        for method in [Method::POST, Method::DELETE, Method::PUT] {
            let response = handle(&feed, &method).await?;

            assert_eq!(response.status_code, 405);
            assert_eq!(body_json(&response)?, json!({ "error": "Method not allowed" }));
        }
        assert_eq!(feed.client_calls(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_handle_request() -> Result<()> {
        let feed = feed(StubClient::ok(fixtures::EMPTY_RESPONSE));
        let mut request = ApiGatewayV2httpRequest::default();
        request.request_context.http.method = Method::OPTIONS;

        let response = handle_request(&feed, &request).await?;

        assert_eq!(response.status_code, 200);
        assert_eq!(feed.client_calls(), 0);

        Ok(())
    }

    impl Feed<StubClient> {
        fn client_calls(&self) -> usize {
            self.client().calls.load(Ordering::SeqCst)
        }
    }
}

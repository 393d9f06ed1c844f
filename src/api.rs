//! API server for email-harvester.

use crate::error::AppError;
use crate::models::SiteReport;
use crate::processor::Harvester;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warp::{Filter, Rejection, Reply, http::StatusCode};

/// API response structure
#[derive(Serialize, Deserialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<SiteReport>,
}

/// Single site request structure
#[derive(Deserialize)]
struct ExtractRequest {
    url: String,
}

/// Batch API request structure
#[derive(Deserialize)]
struct BatchRequest {
    urls: Vec<String>,
}

/// Batch API response structure
#[derive(Serialize)]
struct BatchResponse {
    success: bool,
    message: String,
    results: Vec<SiteReport>,
}

/// All API routes, with rejections turned into JSON errors.
pub fn routes(
    harvester: Arc<Harvester>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    // Limit concurrent requests
    let semaphore = Arc::new(Semaphore::new(harvester.config().max_concurrency.max(1)));
    let semaphore_filter = warp::any().map(move || semaphore.clone());
    let harvester_filter = warp::any().map(move || harvester.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&ApiResponse {
                success: true,
                message: "Email Harvester API is running".to_string(),
                result: None,
            })
        });

    let extract = warp::path("extract")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(harvester_filter.clone())
        .and(semaphore_filter.clone())
        .and_then(handle_extract);

    let batch = warp::path("batch")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(harvester_filter)
        .and(semaphore_filter)
        .and_then(handle_batch);

    health
        .or(extract)
        .or(batch)
        .with(warp::cors().allow_any_origin())
        .recover(handle_rejection)
}

/// Serves the API until `shutdown` resolves.
pub async fn start_api_server(
    harvester: Arc<Harvester>,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    let (addr, server) = warp::serve(routes(harvester))
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown)
        .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to bind port {}: {}", port, e)))?;
    tracing::info!("API server listening on {}", addr);
    server.await;
    tracing::info!("API server stopped");
    Ok(())
}

/// Handle a single site extraction request
async fn handle_extract(
    request: ExtractRequest,
    harvester: Arc<Harvester>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| warp::reject::custom(ApiError))?;

    tracing::info!("Processing extraction request for {}", request.url);
    let report = harvester.process_url(&request.url).await;

    let (success, message) = match &report.error {
        Some(error) => (false, error.clone()),
        None => (true, format!("Found {} email(s)", report.emails.len())),
    };
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse {
            success,
            message,
            result: Some(report),
        }),
        status,
    ))
}

/// Handle a batch extraction request
async fn handle_batch(
    batch: BatchRequest,
    harvester: Arc<Harvester>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| warp::reject::custom(ApiError))?;

    tracing::info!("Processing batch of {} sites", batch.urls.len());
    let results = harvester.process_batch(batch.urls, false).await;

    Ok(warp::reply::json(&BatchResponse {
        success: true,
        message: format!("Processed {} sites", results.len()),
        results,
    }))
}

/// Custom error type for API rejections
#[derive(Debug)]
struct ApiError;

impl warp::reject::Reject for ApiError {}

/// Handle API rejections
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.find::<ApiError>().is_some() {
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    } else {
        tracing::warn!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse {
            success: false,
            message,
            result: None,
        }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Result;
    use crate::extractor::EmailExtractor;
    use crate::fetch::PageFetcher;
    use crate::models::FetchedPage;
    use async_trait::async_trait;
    use url::Url;

    struct OnePage;

    #[async_trait]
    impl PageFetcher for OnePage {
        async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
            Ok(FetchedPage {
                url: url.clone(),
                html: "<p>Press: press@acme.test</p>".to_string(),
            })
        }
    }

    fn harvester() -> Arc<Harvester> {
        let config = Arc::new(Config {
            verify_mx_records: false,
            browser_enabled: false,
            ..Config::default()
        });
        let extractor = EmailExtractor::new(config.clone(), Arc::new(OnePage));
        Arc::new(Harvester::from_extractor(config, extractor))
    }

    #[tokio::test]
    async fn test_health() {
        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(harvester()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_extract() {
        let res = warp::test::request()
            .method("POST")
            .path("/extract")
            .json(&serde_json::json!({ "url": "acme.test" }))
            .reply(&routes(harvester()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["emails"][0], "press@acme.test");
    }

    #[tokio::test]
    async fn test_extract_rejects_bad_url_and_bad_json() {
        let routes = routes(harvester());

        let res = warp::test::request()
            .method("POST")
            .path("/extract")
            .json(&serde_json::json!({ "url": "" }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = warp::test::request()
            .method("POST")
            .path("/extract")
            .body("{not json")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch() {
        let res = warp::test::request()
            .method("POST")
            .path("/batch")
            .json(&serde_json::json!({ "urls": ["acme.test", "shop.acme.test"] }))
            .reply(&routes(harvester()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["results"].as_array().map(Vec::len), Some(2));
    }
}

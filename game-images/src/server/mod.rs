//! Public read endpoint
//!
//! ```text
//! /images/{id}   GET, HEAD   raw image bytes, rate limited per client address
//! ```
//!
//! Any other path gets the same 404 as an unknown id.

pub mod images;
pub mod rate_limit;

pub use rate_limit::{Decision, RateLimiter};

use crate::app::AppState;
use crate::error::Result;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the public router
pub fn build_router(state: &AppState) -> Router {
    Router::new()
        .route(
            "/images/{id}",
            get(images::get_image).head(images::head_image),
        )
        .fallback(images::fallback)
        .with_state(state.blob_store.clone())
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit::rate_limit,
        ))
}

/// Serve the public router until Ctrl-C
pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let app = build_router(&state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, ServerConfig};
    use crate::database::initialize_database;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, Method, Request, StatusCode};
    use sqlx::sqlite::SqlitePoolOptions;
    use tower::ServiceExt;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    async fn create_test_state(rate_limit: RateLimitConfig) -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        let config = ServerConfig {
            rate_limit,
            ..ServerConfig::default()
        };
        AppState::new(pool, config)
    }

    async fn stored_png(state: &AppState) -> String {
        let mut conn = state.pool.acquire().await.unwrap();
        state.blob_store.store(&mut conn, PNG, "image/png").await.unwrap()
    }

    fn router_for(state: &AppState, last_octet: u8) -> Router {
        build_router(state).layer(MockConnectInfo(SocketAddr::from((
            [192, 168, 0, last_octet],
            40000,
        ))))
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_image() {
        let state = create_test_state(RateLimitConfig::default()).await;
        let id = stored_png(&state).await;

        let response = router_for(&state, 1)
            .oneshot(request(Method::GET, &format!("/images/{}", id)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), PNG);
    }

    #[tokio::test]
    async fn test_head_image() {
        let state = create_test_state(RateLimitConfig::default()).await;
        let id = stored_png(&state).await;

        let response = router_for(&state, 1)
            .oneshot(request(Method::HEAD, &format!("/images/{}", id)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            PNG.len().to_string().as_str()
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_malformed_ids_look_identical() {
        let state = create_test_state(RateLimitConfig::default()).await;

        let mut bodies = Vec::new();
        for uri in [
            format!("/images/{}", uuid::Uuid::new_v4()),
            "/images/not-a-uuid".to_string(),
            "/images/..%2Fetc%2Fpasswd".to_string(),
        ] {
            let response = router_for(&state, 1)
                .oneshot(request(Method::GET, &uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            bodies.push(to_bytes(response.into_body(), usize::MAX).await.unwrap());
        }

        assert!(bodies.iter().all(|b| b.as_ref() == b"Not Found"));
    }

    #[tokio::test]
    async fn test_unrouted_paths_look_like_missing_ids() {
        let state = create_test_state(RateLimitConfig::default()).await;

        for (method, uri) in [
            (Method::GET, "/images/a/b"),
            (Method::GET, "/images/"),
            (Method::GET, "/images"),
            (Method::HEAD, "/images/a/b"),
            (Method::GET, "/"),
        ] {
            let response = router_for(&state, 2)
                .oneshot(request(method.clone(), uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            if method == Method::GET {
                assert_eq!(body.as_ref(), b"Not Found", "{uri}");
            }
        }
    }

    #[tokio::test]
    async fn test_unrouted_paths_count_against_rate_limit() {
        let state = create_test_state(RateLimitConfig {
            burst_limit: 1,
            ..RateLimitConfig::default()
        })
        .await;

        let first = router_for(&state, 3)
            .oneshot(request(Method::GET, "/images/a/b"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::NOT_FOUND);

        let limited = router_for(&state, 3)
            .oneshot(request(Method::GET, "/images/a/b"))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429_with_retry_after() {
        let state = create_test_state(RateLimitConfig {
            burst_limit: 3,
            ..RateLimitConfig::default()
        })
        .await;
        let id = stored_png(&state).await;
        let uri = format!("/images/{}", id);

        for _ in 0..3 {
            let response = router_for(&state, 7)
                .oneshot(request(Method::GET, &uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let limited = router_for(&state, 7)
            .oneshot(request(Method::GET, &uri))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = limited.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));

        // Another address is unaffected.
        let other = router_for(&state, 8)
            .oneshot(request(Method::GET, &uri))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_misses_count_against_rate_limit() {
        let state = create_test_state(RateLimitConfig {
            burst_limit: 2,
            ..RateLimitConfig::default()
        })
        .await;

        for _ in 0..2 {
            let response = router_for(&state, 9)
                .oneshot(request(Method::GET, "/images/not-a-uuid"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let limited = router_for(&state, 9)
            .oneshot(request(Method::GET, "/images/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_storage_failure_is_opaque_500() {
        let state = create_test_state(RateLimitConfig::default()).await;
        let id = stored_png(&state).await;
        state.pool.close().await;

        let response = router_for(&state, 1)
            .oneshot(request(Method::GET, &format!("/images/{}", id)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"Internal Server Error");
    }
}

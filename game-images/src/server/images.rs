//! Public image handlers
//!
//! Unauthenticated by design: the id alone grants read access. Lookups go
//! straight to the image row and never touch owner tables. Every miss,
//! malformed or absent, gets the same 404.

use crate::config::{IMAGE_CACHE_CONTROL, NOT_FOUND_BODY};
use crate::database::Blob;
use crate::storage::BlobStore;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// `GET /images/{id}`
pub async fn get_image(State(store): State<BlobStore>, Path(id): Path<String>) -> Response {
    match lookup(&store, &id).await {
        Ok(blob) => {
            let headers = image_headers(&blob);
            (StatusCode::OK, headers, Body::from(blob.data)).into_response()
        }
        Err(response) => response,
    }
}

/// `HEAD /images/{id}`
pub async fn head_image(State(store): State<BlobStore>, Path(id): Path<String>) -> Response {
    match lookup(&store, &id).await {
        Ok(blob) => {
            let mut headers = image_headers(&blob);
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.data.len()));
            (StatusCode::OK, headers, Body::empty()).into_response()
        }
        Err(response) => response,
    }
}

async fn lookup(store: &BlobStore, id: &str) -> Result<Blob, Response> {
    if Uuid::parse_str(id).is_err() {
        return Err(not_found());
    }

    match store.get(id).await {
        Ok(Some(blob)) => Ok(blob),
        Ok(None) => Err(not_found()),
        Err(e) => {
            tracing::error!("Image lookup failed for {}: {}", id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
        }
    }
}

/// Fallback for every path the image route does not match
pub async fn fallback() -> Response {
    not_found()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

fn image_headers(blob: &Blob) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let content_type = HeaderValue::from_str(&blob.mime_type).unwrap_or_else(|_| {
        tracing::warn!("Image {} has an unencodable MIME type", blob.id);
        HeaderValue::from_static("application/octet-stream")
    });
    headers.insert(header::CONTENT_TYPE, content_type);

    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(IMAGE_CACHE_CONTROL),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    headers
}

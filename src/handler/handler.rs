// SPDX-License-Identifier: GPL-2.0-or-later

//! HTTP wiring for the SLO surface: translates `axum` requests into calls
//! against the `slo` crate's components and the `backend` trait, and their
//! results back into responses. Mirrors this workspace's existing handler
//! pattern of one `State`-carrying struct per route plus a per-route error
//! enum implementing `IntoResponse`.

#![allow(clippy::unused_async)]

use axum::{
    body::Body,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use backend::{ArcBackend, Backend, GetRequest};
use common::{ArcLogger, EnvConfig, ILogger, LogEntry, LogLevel, ObjectPath};
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use serde::Deserialize;
use slo::{
    classify::{classify, Classification, ConditionalOutcome, RangeOutcome},
    delete::{expand_delete_queue, BulkDeleter, SequentialBulkDeleter},
    model::{total_length, RESERVED_HEADER},
    store::store_manifest,
    stream::{plan_response, probe_first_segment, RangeSelection, StreamError},
    validate::{validate_manifest, ValidateManifestError},
    verify::{verify_manifest, VerifyManifestError},
    StoredManifest,
};
use std::sync::Arc;
use thiserror::Error;

pub type SharedConfig = Arc<dyn EnvConfig + Send + Sync>;

#[derive(Clone)]
pub struct SloState {
    pub backend: ArcBackend,
    pub logger: ArcLogger,
    pub config: SharedConfig,
}

#[derive(Debug, Deserialize)]
pub struct ManifestQuery {
    #[serde(rename = "multipart-manifest")]
    pub multipart_manifest: Option<String>,
}

fn parse_path(raw: &str) -> Result<ObjectPath, Response> {
    ObjectPath::parse(&format!("/{raw}"))
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid object path: {e}")).into_response())
}

fn auth_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------
// PUT
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PutManifestError {
    #[error("{0}")]
    Validate(#[from] ValidateManifestError),

    #[error("{0}")]
    Verify(#[from] VerifyManifestError),

    #[error("failed to store manifest: {0}")]
    Store(#[from] slo::store::StoreManifestError),
}

impl IntoResponse for PutManifestError {
    fn into_response(self) -> Response {
        match self {
            PutManifestError::Validate(ValidateManifestError::TooLarge) => {
                StatusCode::PAYLOAD_TOO_LARGE.into_response()
            }
            PutManifestError::Validate(ValidateManifestError::TooManySegments) => {
                StatusCode::PAYLOAD_TOO_LARGE.into_response()
            }
            PutManifestError::Validate(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            PutManifestError::Verify(VerifyManifestError::Problems(problems)) => {
                let body = problems
                    .iter()
                    .map(|p| format!("{}: {}", p.path, p.reason))
                    .collect::<Vec<_>>()
                    .join("\n");
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            PutManifestError::Verify(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
            PutManifestError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    }
}

pub async fn put_manifest_handler(
    State(state): State<SloState>,
    Path(raw_path): Path<String>,
    Query(query): Query<ManifestQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let path = match parse_path(&raw_path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if headers.contains_key("X-Copy-From") {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    if query.multipart_manifest.as_deref() != Some("put") {
        if headers.contains_key(RESERVED_HEADER) {
            return (StatusCode::BAD_REQUEST, "reserved header set without multipart-manifest=put").into_response();
        }
        // Plain PUT: forward as a regular object write.
        return forward_put(&state, &path, body.to_vec(), &headers).await;
    }

    if headers.get(header::CONTENT_LENGTH).is_none() && headers.get(header::TRANSFER_ENCODING).is_none() {
        return StatusCode::LENGTH_REQUIRED.into_response();
    }

    match put_manifest(&state, &path, &body, &headers).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn put_manifest(
    state: &SloState,
    path: &ObjectPath,
    body: &[u8],
    headers: &HeaderMap,
) -> Result<Response, PutManifestError> {
    let parsed = validate_manifest(
        body,
        path,
        state.config.max_manifest_segments(),
        state.config.max_manifest_size().as_u64(),
    )?;

    let token = auth_token(headers);
    let verified = verify_manifest(
        &parsed,
        &state.backend,
        token.as_deref(),
        state.config.min_segment_size().as_u64(),
        &state.logger,
    )
    .await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let result = store_manifest(
        &state.backend,
        path,
        &verified.entries,
        verified.composite_etag,
        verified.total_size,
        content_type,
        token,
    )
    .await?;

    state.logger.log(LogEntry::new(
        LogLevel::Info,
        "slo",
        format!("stored manifest {path} ({} segments)", verified.entries.len()),
    ));

    Ok((
        result.status,
        [(header::ETAG, format!("\"{}\"", result.composite_etag))],
    )
        .into_response())
}

async fn forward_put(state: &SloState, path: &ObjectPath, body: Vec<u8>, headers: &HeaderMap) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    match state
        .backend
        .put(
            path,
            backend::PutRequest {
                body,
                content_type,
                extra_headers: std::collections::HashMap::new(),
                auth_token: auth_token(headers),
            },
        )
        .await
    {
        Ok(resp) => {
            let etag = resp.etag.unwrap_or_default();
            (resp.status, [(header::ETAG, etag)]).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------
// GET / HEAD
// ---------------------------------------------------------------------

pub async fn get_or_head_manifest_handler(
    State(state): State<SloState>,
    Path(raw_path): Path<String>,
    Query(query): Query<ManifestQuery>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let path = match parse_path(&raw_path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let token = auth_token(&headers);
    let raw_manifest_requested = query.multipart_manifest.as_deref() == Some("get");

    let initial = if method == Method::HEAD {
        match state.backend.head(&path, token.as_deref()).await {
            Ok(meta) => backend::GetResponse { meta, body: None },
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    } else {
        match state
            .backend
            .get(&path, GetRequest { range: None, auth_token: token.clone(), source_tag: None })
            .await
        {
            Ok(r) => r,
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    };

    if !initial.meta.status.is_success() {
        return initial.meta.status.into_response();
    }

    let classification = classify(
        &initial.meta,
        &method,
        raw_manifest_requested,
        conditional_outcome(&headers, &initial.meta),
        None::<RangeOutcome>,
    );

    match classification {
        Classification::PassThrough => pass_through_response(initial),
        Classification::RawManifest => raw_manifest_response(initial),
        Classification::UseBody | Classification::RefetchRequired => {
            let manifest = match classification {
                Classification::UseBody => match read_manifest_body(initial).await {
                    Ok(m) => m,
                    Err(resp) => return resp,
                },
                _ => match refetch_manifest(&state, &path, token.as_deref()).await {
                    Ok(m) => m,
                    Err(resp) => return resp,
                },
            };
            serve_slo(&state, &path, &manifest, &method, &headers, token.as_deref()).await
        }
    }
}

fn conditional_outcome(headers: &HeaderMap, meta: &backend::ObjectMeta) -> Option<ConditionalOutcome> {
    if headers.get(header::IF_MATCH).is_none() && headers.get(header::IF_NONE_MATCH).is_none() {
        return None;
    }
    Some(ConditionalOutcome { is_2xx: meta.status.is_success() })
}

fn pass_through_response(response: backend::GetResponse) -> Response {
    let mut builder = Response::builder().status(response.meta.status);
    if let Some(len) = response.meta.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }
    if let Some(etag) = &response.meta.etag {
        builder = builder.header(header::ETAG, etag);
    }
    if let Some(ct) = &response.meta.content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    let body = response
        .body
        .map_or_else(Body::empty, |r| Body::from_stream(tokio_util::io::ReaderStream::new(r)));
    builder.body(body).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn raw_manifest_response(response: backend::GetResponse) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8");
    if let Some(etag) = &response.meta.etag {
        builder = builder.header(header::ETAG, etag);
    }
    let body = response
        .body
        .map_or_else(Body::empty, |r| Body::from_stream(tokio_util::io::ReaderStream::new(r)));
    builder.body(body).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn read_manifest_body(response: backend::GetResponse) -> Result<StoredManifest, Response> {
    let Some(mut body) = response.body else {
        return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
    };
    let mut buf = Vec::new();
    use tokio::io::AsyncReadExt;
    body.read_to_end(&mut buf)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;
    serde_json::from_slice(&buf).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn refetch_manifest(state: &SloState, path: &ObjectPath, token: Option<&str>) -> Result<StoredManifest, Response> {
    let response = state
        .backend
        .get(
            path,
            GetRequest { range: None, auth_token: token.map(str::to_owned), source_tag: None },
        )
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())?;
    if !response.meta.status.is_success() {
        return Err(response.meta.status.into_response());
    }
    read_manifest_body(response).await
}

async fn serve_slo(
    state: &SloState,
    path: &ObjectPath,
    manifest: &StoredManifest,
    method: &Method,
    headers: &HeaderMap,
    token: Option<&str>,
) -> Response {
    let total = total_length(manifest);
    let composite_etag = slo::model::composite_etag(manifest);

    if let web::CondResult::ShortCircuit(status) =
        web::check_preconditions(headers, method, &composite_etag, None)
    {
        return status.into_response();
    }

    let ranges = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(raw) if web::check_if_range(headers, &composite_etag) => {
            web::parse_range_header(raw, total).unwrap_or_default()
        }
        _ => Vec::new(),
    };

    let plan = match plan_response(&state.backend, path, manifest, &ranges, token).await {
        Ok(p) => p,
        Err(StreamError::RangeNotSatisfiable) => return StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    if let Err(e) = probe_first_segment(&state.backend, &plan.fetches, token).await {
        return (StatusCode::CONFLICT, e.to_string()).into_response();
    }

    let is_ranged = matches!(plan.range, RangeSelection::Single { .. });
    let content_length = match plan.range {
        RangeSelection::Whole => plan.total_length,
        RangeSelection::Single { start, end } => end - start + 1,
    };

    let mut builder = Response::builder();
    if is_ranged {
        if let RangeSelection::Single { start, end } = plan.range {
            builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{}", plan.total_length));
        }
    } else {
        builder = builder.status(StatusCode::OK).header(
            header::ETAG,
            HeaderValue::from_str(&format!("\"{}\"", plan.composite_etag)).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
    }
    builder = builder.header(header::CONTENT_LENGTH, content_length);

    if *method == Method::HEAD {
        return builder.body(Body::empty()).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    let limiter = slo::stream::RateLimiter::new(
        state.config.rate_limit_after_segment(),
        state.config.rate_limit_segments_per_sec(),
    );
    let body = web::segmented_body(state.backend.clone(), plan.fetches, limiter, token.map(str::to_owned));

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ---------------------------------------------------------------------
// DELETE
// ---------------------------------------------------------------------

pub async fn delete_handler(
    State(state): State<SloState>,
    Path(raw_path): Path<String>,
    Query(query): Query<ManifestQuery>,
    headers: HeaderMap,
) -> Response {
    let path = match parse_path(&raw_path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let token = auth_token(&headers);

    if query.multipart_manifest.as_deref() != Some("delete") {
        return match state.backend.delete(&path, token.as_deref()).await {
            Ok(resp) => resp.status.into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        };
    }

    let (deletes, mut errors) = match expand_delete_queue(
        &state.backend,
        &path.to_string(),
        token.as_deref(),
        state.config.max_buffered_delete_segments(),
    )
    .await
    {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let deleter = SequentialBulkDeleter::new(state.backend.clone());
    let mut report = deleter.delete_all(&deletes, token.as_deref()).await;
    report.append(&mut errors);

    let body = serde_json::to_string(&report.iter().map(|e| (e.path.clone(), e.error)).collect::<Vec<_>>())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response()
}

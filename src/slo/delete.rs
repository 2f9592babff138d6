// SPDX-License-Identifier: GPL-2.0-or-later

use async_recursion::async_recursion;
use backend::{ArcBackend, Backend, GetRequest};
use common::ObjectPath;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const SOURCE_TAG: &str = "SLO";

#[derive(Debug, Error)]
pub enum DeleteExpansionError {
    #[error("delete work queue exceeded the buffered-segment limit")]
    QueueOverflow,
}

/// Outcome of fetching one work-item's manifest, per the §4.H fetch
/// classifier: used both by the cascading walk and directly by the caller
/// for `?multipart-manifest=delete` on a non-manifest object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchClassification {
    /// `(path, sub_slo)` pairs, so a nested sub-SLO is re-expanded instead of
    /// being enqueued as a leaf delete.
    Segments(Vec<(String, bool)>),
    NotAnSlo,
    NotFound,
    Unauthorized,
    InternalError,
}

pub async fn classify_fetch(backend: &ArcBackend, path: &ObjectPath, auth_token: Option<&str>) -> FetchClassification {
    let response = match backend
        .get(
            path,
            GetRequest {
                range: None,
                auth_token: auth_token.map(str::to_owned),
                source_tag: Some(SOURCE_TAG),
            },
        )
        .await
    {
        Ok(r) => r,
        Err(_) => return FetchClassification::InternalError,
    };

    match response.meta.status {
        status if status == http::StatusCode::NOT_FOUND => FetchClassification::NotFound,
        status if status == http::StatusCode::UNAUTHORIZED => FetchClassification::Unauthorized,
        status if status.is_success() => {
            if !response.meta.is_static_large_object {
                return FetchClassification::NotAnSlo;
            }
            let Some(mut body) = response.body else {
                return FetchClassification::InternalError;
            };
            let mut buf = Vec::new();
            if body.read_to_end(&mut buf).await.is_err() {
                return FetchClassification::InternalError;
            }
            match serde_json::from_slice::<crate::model::StoredManifest>(&buf) {
                Ok(entries) => FetchClassification::Segments(
                    entries.into_iter().map(|e| (e.name, e.sub_slo)).collect(),
                ),
                Err(_) => FetchClassification::InternalError,
            }
        }
        _ => FetchClassification::InternalError,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReportEntry {
    pub path: String,
    pub error: Option<&'static str>,
}

/// Component H. Depth-first expansion: every child named by a manifest
/// (including nested sub-SLOs, recursively) is deleted before the manifest
/// itself is appended to the work-list.
pub async fn expand_delete_queue(
    backend: &ArcBackend,
    root: &str,
    auth_token: Option<&str>,
    max_buffered_segments: usize,
) -> Result<(Vec<String>, Vec<DeleteReportEntry>), DeleteExpansionError> {
    let mut deletes = Vec::new();
    let mut errors = Vec::new();
    let mut discovered = 1usize;

    expand_one(
        backend,
        root.to_owned(),
        true,
        auth_token,
        max_buffered_segments,
        &mut discovered,
        &mut deletes,
        &mut errors,
    )
    .await?;

    Ok((deletes, errors))
}

#[async_recursion]
#[allow(clippy::too_many_arguments)]
async fn expand_one(
    backend: &ArcBackend,
    path_str: String,
    sub_slo: bool,
    auth_token: Option<&str>,
    max_buffered_segments: usize,
    discovered: &mut usize,
    deletes: &mut Vec<String>,
    errors: &mut Vec<DeleteReportEntry>,
) -> Result<(), DeleteExpansionError> {
    if !sub_slo {
        deletes.push(path_str);
        return Ok(());
    }

    let Ok(path) = ObjectPath::parse(&path_str) else {
        errors.push(DeleteReportEntry {
            path: path_str,
            error: Some("invalid path"),
        });
        return Ok(());
    };

    match classify_fetch(backend, &path, auth_token).await {
        FetchClassification::Segments(children) => {
            *discovered += children.len();
            if *discovered > max_buffered_segments {
                return Err(DeleteExpansionError::QueueOverflow);
            }
            for (child_path, child_sub_slo) in children {
                expand_one(
                    backend,
                    child_path,
                    child_sub_slo,
                    auth_token,
                    max_buffered_segments,
                    discovered,
                    deletes,
                    errors,
                )
                .await?;
            }
            deletes.push(path_str);
        }
        FetchClassification::NotAnSlo => errors.push(DeleteReportEntry {
            path: path_str,
            error: Some("Not an SLO manifest"),
        }),
        FetchClassification::NotFound => errors.push(DeleteReportEntry {
            path: path_str,
            error: Some("404 Not Found"),
        }),
        FetchClassification::Unauthorized => errors.push(DeleteReportEntry {
            path: path_str,
            error: Some("401 Unauthorized"),
        }),
        FetchClassification::InternalError => errors.push(DeleteReportEntry {
            path: path_str,
            error: Some("500 Internal Error"),
        }),
    }

    Ok(())
}

/// The generic bulk-delete engine this component hands its work-list to,
/// kept external per the out-of-scope collaborator list. One sequential
/// implementation over `Backend::delete` is provided for tests and for a
/// deployment with no richer bulk-delete backend available.
#[async_trait::async_trait]
pub trait BulkDeleter {
    async fn delete_all(&self, paths: &[String], auth_token: Option<&str>) -> Vec<DeleteReportEntry>;
}

pub struct SequentialBulkDeleter {
    backend: ArcBackend,
}

impl SequentialBulkDeleter {
    #[must_use]
    pub fn new(backend: ArcBackend) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl BulkDeleter for SequentialBulkDeleter {
    async fn delete_all(&self, paths: &[String], auth_token: Option<&str>) -> Vec<DeleteReportEntry> {
        let mut report = Vec::new();
        for path in paths {
            let Ok(object_path) = ObjectPath::parse(path) else {
                report.push(DeleteReportEntry {
                    path: path.clone(),
                    error: Some("invalid path"),
                });
                continue;
            };
            match self.backend.delete(&object_path, auth_token).await {
                Ok(resp) if resp.status.is_success() => {}
                Ok(_) | Err(_) => report.push(DeleteReportEntry {
                    path: path.clone(),
                    error: Some("delete failed"),
                }),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredSegmentEntry;
    use backend::{MemoryBackend, PutRequest};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn segment(name: &str) -> StoredSegmentEntry {
        StoredSegmentEntry {
            name: name.to_owned(),
            bytes: 1,
            hash: "h".to_owned(),
            content_type: "application/octet-stream".to_owned(),
            last_modified: "0".to_owned(),
            range: None,
            sub_slo: false,
        }
    }

    async fn put_manifest(backend: &ArcBackend, path: &str, entries: Vec<StoredSegmentEntry>) {
        let mut headers = HashMap::new();
        headers.insert("X-Static-Large-Object".to_owned(), "True".to_owned());
        backend
            .put(
                &ObjectPath::parse(path).unwrap(),
                PutRequest {
                    body: serde_json::to_vec(&entries).unwrap(),
                    content_type: None,
                    extra_headers: headers,
                    auth_token: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_s6_cascading_delete_order() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());

        put_manifest(&backend, "/c/m2", vec![segment("/c/s2"), segment("/c/s3")]).await;
        let mut m2_entry = segment("/c/m2");
        m2_entry.sub_slo = true;
        put_manifest(&backend, "/c/m", vec![segment("/c/s1"), m2_entry]).await;

        let (deletes, errors) = expand_delete_queue(&backend, "/c/m", None, 10_000).await.unwrap();

        assert!(errors.is_empty());
        assert_eq!(vec!["/c/s1", "/c/s2", "/c/s3", "/c/m2", "/c/m"], deletes);
    }

    #[tokio::test]
    async fn test_queue_overflow_fails_fast() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        let mut children = Vec::new();
        for i in 0..5 {
            children.push(segment(&format!("/c/s{i}")));
        }
        put_manifest(&backend, "/c/m", children).await;

        let err = expand_delete_queue(&backend, "/c/m", None, 1).await.unwrap_err();
        assert!(matches!(err, DeleteExpansionError::QueueOverflow));
    }
}

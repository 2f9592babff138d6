// SPDX-License-Identifier: GPL-2.0-or-later

use crate::model::{StoredManifest, CONTENT_TYPE_PARAM, RESERVED_HEADER};
use backend::{ArcBackend, Backend, BackendError, PutRequest};
use common::ObjectPath;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreManifestError {
    #[error("failed to serialize stored manifest")]
    Serialize(#[from] serde_json::Error),

    #[error("backend rejected the manifest object: {0}")]
    Backend(#[from] BackendError),
}

pub struct StoredManifestResult {
    pub status: http::StatusCode,
    pub composite_etag: String,
}

/// Component C. Writes the canonical stored manifest object and rewrites the
/// response ETag to the logical composite ETag, never the backend's own.
pub async fn store_manifest(
    backend: &ArcBackend,
    manifest_path: &ObjectPath,
    entries: &StoredManifest,
    composite_etag: String,
    total_size: u64,
    client_content_type: Option<String>,
    auth_token: Option<String>,
) -> Result<StoredManifestResult, StoreManifestError> {
    let body = serde_json::to_vec(entries)?;

    let base_content_type = client_content_type.unwrap_or_else(|| {
        mime_guess::from_path(manifest_path.object())
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_owned()
    });
    let content_type = format!("{base_content_type};{CONTENT_TYPE_PARAM}={total_size}");

    let mut extra_headers = HashMap::new();
    extra_headers.insert(RESERVED_HEADER.to_owned(), "True".to_owned());

    let response = backend
        .put(
            manifest_path,
            PutRequest {
                body,
                content_type: Some(content_type),
                extra_headers,
                auth_token,
            },
        )
        .await?;

    Ok(StoredManifestResult {
        status: response.status,
        composite_etag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredSegmentEntry;
    use backend::MemoryBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_manifest_sets_reserved_header_and_suffix() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        let path = ObjectPath::parse("/c/manifest").unwrap();
        let entries: StoredManifest = vec![StoredSegmentEntry {
            name: "/c/a".to_owned(),
            bytes: 10,
            hash: "e1".to_owned(),
            content_type: "application/octet-stream".to_owned(),
            last_modified: "0".to_owned(),
            range: None,
            sub_slo: false,
        }];

        let result = store_manifest(
            &backend,
            &path,
            &entries,
            "composite".to_owned(),
            10,
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!("composite", result.composite_etag);
        assert_eq!(http::StatusCode::CREATED, result.status);
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use crate::model::StoredManifest;
use backend::{ArcBackend, Backend, GetRequest};
use common::ObjectPath;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const SOURCE_TAG: &str = "SLO";

#[derive(Debug, Error)]
pub enum FetchSubManifestError {
    #[error("sub-manifest {outer} -> {inner} fetch failed: backend status {status}")]
    NotFound {
        outer: String,
        inner: String,
        status: http::StatusCode,
    },

    #[error("sub-manifest {outer} -> {inner}: backend error: {source}")]
    Backend {
        outer: String,
        inner: String,
        #[source]
        source: backend::BackendError,
    },

    #[error("sub-manifest {outer} -> {inner}: body is not a valid stored manifest: {source}")]
    Decode {
        outer: String,
        inner: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("sub-manifest {outer} -> {inner}: failed reading body: {source}")]
    Read {
        outer: String,
        inner: String,
        #[source]
        source: std::io::Error,
    },
}

/// Component E. Always closes the body it reads, on every exit path.
pub async fn fetch_sub_manifest(
    backend: &ArcBackend,
    outer: &ObjectPath,
    inner: &ObjectPath,
    auth_token: Option<&str>,
) -> Result<StoredManifest, FetchSubManifestError> {
    let response = backend
        .get(
            inner,
            GetRequest {
                range: None,
                auth_token: auth_token.map(str::to_owned),
                source_tag: Some(SOURCE_TAG),
            },
        )
        .await
        .map_err(|source| FetchSubManifestError::Backend {
            outer: outer.to_string(),
            inner: inner.to_string(),
            source,
        })?;

    if !response.meta.status.is_success() {
        return Err(FetchSubManifestError::NotFound {
            outer: outer.to_string(),
            inner: inner.to_string(),
            status: response.meta.status,
        });
    }

    let Some(mut body) = response.body else {
        return Err(FetchSubManifestError::NotFound {
            outer: outer.to_string(),
            inner: inner.to_string(),
            status: response.meta.status,
        });
    };

    let mut buf = Vec::new();
    body.read_to_end(&mut buf)
        .await
        .map_err(|source| FetchSubManifestError::Read {
            outer: outer.to_string(),
            inner: inner.to_string(),
            source,
        })?;
    drop(body);

    serde_json::from_slice(&buf).map_err(|source| FetchSubManifestError::Decode {
        outer: outer.to_string(),
        inner: inner.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredSegmentEntry;
    use backend::{Backend, MemoryBackend, PutRequest};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetch_decodes_stored_manifest() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        let sub_path = ObjectPath::parse("/c/sub").unwrap();
        let manifest: StoredManifest = vec![StoredSegmentEntry {
            name: "/c/leaf".to_owned(),
            bytes: 5,
            hash: "h".to_owned(),
            content_type: "application/octet-stream".to_owned(),
            last_modified: "0".to_owned(),
            range: None,
            sub_slo: false,
        }];
        backend
            .put(
                &sub_path,
                PutRequest {
                    body: serde_json::to_vec(&manifest).unwrap(),
                    content_type: None,
                    extra_headers: HashMap::new(),
                    auth_token: None,
                },
            )
            .await
            .unwrap();

        let outer = ObjectPath::parse("/c/outer").unwrap();
        let fetched = fetch_sub_manifest(&backend, &outer, &sub_path, None)
            .await
            .unwrap();

        assert_eq!(manifest, fetched);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        let outer = ObjectPath::parse("/c/outer").unwrap();
        let missing = ObjectPath::parse("/c/missing").unwrap();

        let err = fetch_sub_manifest(&backend, &outer, &missing, None)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchSubManifestError::NotFound { .. }));
    }
}

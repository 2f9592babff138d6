// SPDX-License-Identifier: GPL-2.0-or-later

//! Component F, the central algorithm: a range-windowed, depth-bounded,
//! lazy-in-spirit traversal of a manifest tree. Collected eagerly into a
//! `Vec` here (the backend trait objects in this workspace are not
//! `Stream`-shaped, and every caller drains the whole window anyway), but the
//! recursion and window-slicing rules are exactly the ones a lazy iterator
//! would need to honor.

use crate::model::{StoredManifest, StoredSegmentEntry, MAX_RECURSION_DEPTH};
use crate::submanifest::{fetch_sub_manifest, FetchSubManifestError};
use async_recursion::async_recursion;
use backend::ArcBackend;
use common::ObjectPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("recursion depth exceeded {0} levels")]
    RecursionTooDeep(u32),

    #[error("sub-manifest entry {0:?} does not resolve to a valid object path")]
    InvalidSubManifestPath(String),

    #[error(transparent)]
    FetchSubManifest(#[from] FetchSubManifestError),
}

/// One leaf segment slice to read from the backend: bytes `[start, end]`
/// (inclusive) of the object named `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafFetch {
    pub path: ObjectPath,
    pub etag: String,
    pub size: u64,
    pub start: u64,
    pub end: u64,
}

struct SubManifestCache {
    entry: Option<(ObjectPath, StoredManifest)>,
}

impl SubManifestCache {
    fn new() -> Self {
        Self { entry: None }
    }
}

/// Lists every leaf byte-range that contributes to window `[first, last]`
/// (inclusive, logical offsets) of `manifest`. A `None` window means "the
/// whole object".
pub async fn list_window(
    backend: &ArcBackend,
    manifest_path: &ObjectPath,
    manifest: &StoredManifest,
    window: Option<(u64, u64)>,
    auth_token: Option<&str>,
) -> Result<Vec<LeafFetch>, ListError> {
    let (first, last) = match window {
        Some(w) => w,
        None => {
            let total = crate::model::total_length(manifest);
            if total == 0 {
                return Ok(Vec::new());
            }
            (0, total - 1)
        }
    };

    let mut out = Vec::new();
    let mut cache = SubManifestCache::new();
    list_inner(
        backend,
        manifest_path,
        manifest,
        i128::from(first),
        i128::from(last),
        0,
        auth_token,
        &mut cache,
        &mut out,
    )
    .await?;
    Ok(out)
}

fn source_range(entry: &StoredSegmentEntry) -> (i128, i128) {
    match entry.stored_range() {
        Some(r) => (i128::from(r.start()), i128::from(r.end())),
        None => (0, i128::from(entry.effective_length().saturating_sub(1))),
    }
}

#[async_recursion]
#[allow(clippy::too_many_arguments)]
async fn list_inner(
    backend: &ArcBackend,
    owner_path: &ObjectPath,
    manifest: &StoredManifest,
    window_first: i128,
    window_last: i128,
    depth: u32,
    auth_token: Option<&str>,
    cache: &mut SubManifestCache,
    out: &mut Vec<LeafFetch>,
) -> Result<(), ListError> {
    let mut f = window_first;
    let mut l = window_last;

    for entry in manifest {
        let len = i128::from(entry.effective_length());

        if f >= len {
            f -= len;
            l -= len;
            continue;
        }
        if l < 0 {
            break;
        }

        let (rs, re) = source_range(entry);

        if entry.sub_slo {
            if depth >= MAX_RECURSION_DEPTH {
                return Err(ListError::RecursionTooDeep(MAX_RECURSION_DEPTH));
            }
            let sub_path = entry
                .object_path()
                .ok_or_else(|| ListError::InvalidSubManifestPath(entry.name.clone()))?;

            let sub_manifest = match &cache.entry {
                Some((cached_path, cached)) if *cached_path == sub_path => cached.clone(),
                _ => {
                    let fetched =
                        fetch_sub_manifest(backend, owner_path, &sub_path, auth_token).await?;
                    cache.entry = Some((sub_path.clone(), fetched.clone()));
                    fetched
                }
            };

            let f2 = rs + f.max(0);
            let l2 = re.min(rs + l);

            list_inner(
                backend,
                &sub_path,
                &sub_manifest,
                f2,
                l2,
                depth + 1,
                auth_token,
                cache,
                out,
            )
            .await?;
        } else if let Some(path) = entry.object_path() {
            let start = rs + f.max(0);
            let end = re.min(rs + l);
            if start <= end {
                out.push(LeafFetch {
                    path,
                    etag: entry.hash.clone(),
                    size: entry.bytes,
                    #[allow(clippy::cast_sign_loss)]
                    start: start as u64,
                    #[allow(clippy::cast_sign_loss)]
                    end: end as u64,
                });
            }
        }

        f -= len;
        l -= len;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::Backend;
    use std::sync::Arc;

    fn entry(name: &str, bytes: u64, hash: &str, range: Option<&str>, sub_slo: bool) -> StoredSegmentEntry {
        StoredSegmentEntry {
            name: name.to_owned(),
            bytes,
            hash: hash.to_owned(),
            content_type: "application/octet-stream".to_owned(),
            last_modified: "0".to_owned(),
            range: range.map(str::to_owned),
            sub_slo,
        }
    }

    /// A `sub_slo` entry whose logical (concatenated) size is carried in the
    /// `swift_bytes=` content-type parameter, as the store step always writes it.
    fn sub_slo_entry(name: &str, logical_bytes: u64, hash: &str) -> StoredSegmentEntry {
        StoredSegmentEntry {
            content_type: format!("application/json;swift_bytes={logical_bytes}"),
            ..entry(name, 0, hash, None, true)
        }
    }

    fn memory_backend() -> ArcBackend {
        Arc::new(backend::MemoryBackend::new())
    }

    #[tokio::test]
    async fn test_whole_object_yields_every_entry_once() {
        let manifest = vec![entry("/c/a", 10, "e1", None, false), entry("/c/b", 20, "e2", None, false)];
        let backend = memory_backend();
        let path = ObjectPath::parse("/c/m").unwrap();

        let fetches = list_window(&backend, &path, &manifest, None, None).await.unwrap();

        assert_eq!(2, fetches.len());
        assert_eq!((0, 9), (fetches[0].start, fetches[0].end));
        assert_eq!((0, 19), (fetches[1].start, fetches[1].end));
    }

    #[tokio::test]
    async fn test_window_skips_earlier_entries_without_fetching() {
        let manifest = vec![entry("/c/a", 10, "e1", None, false), entry("/c/b", 20, "e2", None, false)];
        let backend = memory_backend();
        let path = ObjectPath::parse("/c/m").unwrap();

        let fetches = list_window(&backend, &path, &manifest, Some((10, 15)), None)
            .await
            .unwrap();

        assert_eq!(1, fetches.len());
        assert_eq!("/c/b", fetches[0].path.to_string());
        assert_eq!((0, 5), (fetches[0].start, fetches[0].end));
    }

    #[tokio::test]
    async fn test_s3_ranged_read_skips_sub_slo_entirely() {
        let backend = memory_backend();
        let sub_path = ObjectPath::parse("/c/sub").unwrap();
        let sub_manifest = vec![entry("/c/s1", 50 * 1024 * 1024, "es1", None, false)];
        backend
            .put(
                &sub_path,
                backend::PutRequest {
                    body: serde_json::to_vec(&sub_manifest).unwrap(),
                    content_type: None,
                    extra_headers: std::collections::HashMap::new(),
                    auth_token: None,
                },
            )
            .await
            .unwrap();

        let manifest = vec![
            sub_slo_entry("/c/sub", 50 * 1024 * 1024, "esub"),
            entry("/c/t", 10 * 1024 * 1024, "et", None, false),
        ];
        let path = ObjectPath::parse("/c/m").unwrap();

        let window_start = 50 * 1024 * 1024u64;
        let window_end = window_start + 511;

        let fetches = list_window(&backend, &path, &manifest, Some((window_start, window_end)), None)
            .await
            .unwrap();

        assert_eq!(1, fetches.len());
        assert_eq!("/c/t", fetches[0].path.to_string());
        assert_eq!((0, 511), (fetches[0].start, fetches[0].end));
    }

    #[tokio::test]
    async fn test_recursion_depth_exceeded() {
        let backend = memory_backend();

        // Build a chain of 12 nested sub-manifests, each referencing the next.
        let leaf_path = ObjectPath::parse("/c/leaf").unwrap();
        let mut next_manifest = vec![entry("/c/leaf", 10, "el", None, false)];
        for i in (0..12).rev() {
            let name = format!("/c/m{i}");
            let path = ObjectPath::parse(&name).unwrap();
            backend
                .put(
                    &path,
                    backend::PutRequest {
                        body: serde_json::to_vec(&next_manifest).unwrap(),
                        content_type: None,
                        extra_headers: std::collections::HashMap::new(),
                        auth_token: None,
                    },
                )
                .await
                .unwrap();
            next_manifest = vec![entry(&name, 0, "esub", None, true)];
        }
        let _ = leaf_path;

        let top_path = ObjectPath::parse("/c/top").unwrap();
        let err = list_window(&backend, &top_path, &next_manifest, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ListError::RecursionTooDeep(_)));
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use crate::etag::CompositeEtagBuilder;
use crate::model::StoredSegmentEntry;
use crate::validate::ParsedEntry;
use backend::{ArcBackend, Backend, ObjectMeta};
use common::{ArcLogger, ByteRange, ILogger, LogEntry, LogLevel};
use thiserror::Error;

const SOURCE: &str = "slo";
const RESERVED_HEADER: &str = "X-Static-Large-Object";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProblem {
    pub path: String,
    pub reason: &'static str,
}

#[derive(Debug, Error)]
pub enum VerifyManifestError {
    #[error("one or more segments failed verification")]
    Problems(Vec<SegmentProblem>),

    #[error("backend error while verifying segment {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: backend::BackendError,
    },
}

#[derive(Debug)]
pub struct VerifiedManifest {
    pub entries: Vec<StoredSegmentEntry>,
    pub composite_etag: String,
    pub total_size: u64,
}

/// Component B. Collapses consecutive identical paths, normalizes ranges
/// against observed sizes, and accumulates the composite ETag alongside.
pub async fn verify_manifest(
    entries: &[ParsedEntry],
    backend: &ArcBackend,
    auth_token: Option<&str>,
    min_segment_size: u64,
    logger: &ArcLogger,
) -> Result<VerifiedManifest, VerifyManifestError> {
    let mut problems = Vec::new();
    let mut stored = Vec::with_capacity(entries.len());
    let mut etag_builder = CompositeEtagBuilder::new();

    let mut prev_path: Option<&common::ObjectPath> = None;
    let mut prev_meta: Option<ObjectMeta> = None;

    let last_idx = entries.len().saturating_sub(1);

    for (idx, entry) in entries.iter().enumerate() {
        let meta = if prev_path == Some(&entry.path) {
            prev_meta.clone().expect("collapsed duplicate always has a prior response")
        } else {
            let meta = backend
                .head(&entry.path, auth_token)
                .await
                .map_err(|source| VerifyManifestError::Backend {
                    path: entry.path.to_string(),
                    source,
                })?;
            prev_path = Some(&entry.path);
            prev_meta = Some(meta.clone());
            meta
        };

        if !meta.status.is_success() {
            log_problem(logger, &entry.path, "missing");
            problems.push(SegmentProblem {
                path: entry.path.to_string(),
                reason: "Missing Segment",
            });
            continue;
        }

        let actual_len = meta.content_length.unwrap_or(0);
        let actual_etag = meta.etag.clone().unwrap_or_default();

        let normalized_range = match &entry.range {
            None => None,
            Some(raw_range) => normalize_range(raw_range, actual_len),
        };

        let effective_length = normalized_range.as_ref().map_or(actual_len, ByteRange::len);

        if effective_length < min_segment_size && idx != last_idx {
            log_problem(logger, &entry.path, "too small");
            problems.push(SegmentProblem {
                path: entry.path.to_string(),
                reason: "Too Small",
            });
            continue;
        }

        if let Some(expected) = entry.size_bytes {
            if expected != actual_len {
                log_problem(logger, &entry.path, "size mismatch");
                problems.push(SegmentProblem {
                    path: entry.path.to_string(),
                    reason: "Size Mismatch",
                });
                continue;
            }
        }

        if let Some(expected) = &entry.etag {
            if expected != &actual_etag {
                log_problem(logger, &entry.path, "etag mismatch");
                problems.push(SegmentProblem {
                    path: entry.path.to_string(),
                    reason: "Etag Mismatch",
                });
                continue;
            }
        }

        let stored_entry = StoredSegmentEntry {
            name: entry.path.to_string(),
            bytes: actual_len,
            hash: actual_etag,
            content_type: meta.content_type.clone().unwrap_or_else(|| "application/octet-stream".to_owned()),
            last_modified: meta
                .last_modified
                .map_or_else(|| crate::model::format_last_modified(std::time::SystemTime::now()), crate::model::format_last_modified),
            range: normalized_range.map(|r| r.to_stored_string()),
            sub_slo: meta.extra_headers.get(RESERVED_HEADER).is_some() || meta.is_static_large_object,
        };

        etag_builder.feed(&stored_entry);
        stored.push(stored_entry);
    }

    if !problems.is_empty() {
        return Err(VerifyManifestError::Problems(problems));
    }

    let total_size = stored.iter().map(StoredSegmentEntry::effective_length).sum();

    Ok(VerifiedManifest {
        entries: stored,
        composite_etag: etag_builder.finish(),
        total_size,
    })
}

/// Resolves a client range's raw "M-N" / "M-" / "-N" form against the
/// segment's observed length — the first point this entry's range is ever
/// concretized. Returns `None` when the resolved range covers the whole
/// segment, since a whole-segment range is equivalent to no range at all.
fn normalize_range(raw_range: &str, actual_len: u64) -> Option<ByteRange> {
    let normalized = ByteRange::parse(raw_range, actual_len).ok()?;
    if normalized.start() == 0 && actual_len > 0 && normalized.end() == actual_len - 1 {
        None
    } else {
        Some(normalized)
    }
}

fn log_problem(logger: &ArcLogger, path: &common::ObjectPath, reason: &str) {
    logger.log(LogEntry::new(
        LogLevel::Debug,
        SOURCE,
        format!("segment verification failed for {path}: {reason}"),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::{Backend, MemoryBackend, PutRequest};
    use common::{DummyLogger, ObjectPath};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn logger() -> ArcLogger {
        DummyLogger::new()
    }

    fn entry(path: &str, etag: Option<&str>, size_bytes: Option<u64>, range: Option<&str>) -> ParsedEntry {
        ParsedEntry {
            path: ObjectPath::parse(path).unwrap(),
            etag: etag.map(str::to_owned),
            size_bytes,
            range: range.map(str::to_owned),
        }
    }

    async fn seed(backend: &ArcBackend, path: &str, data: &[u8]) {
        backend
            .put(
                &ObjectPath::parse(path).unwrap(),
                PutRequest {
                    body: data.to_vec(),
                    content_type: None,
                    extra_headers: HashMap::new(),
                    auth_token: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_s1_validate_happy_path() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        seed(&backend, "/c/a", &[0u8; 1_048_576]).await;
        seed(&backend, "/c/b", &[0u8; 512]).await;

        let entries = vec![
            entry("/c/a", None, Some(1_048_576), None),
            entry("/c/b", None, None, None),
        ];
        let logger = logger();

        let result = verify_manifest(&entries, &backend, None, 1 << 20, &logger)
            .await
            .unwrap();

        assert_eq!(2, result.entries.len());
        assert_eq!(1_049_088, result.total_size);
    }

    #[tokio::test]
    async fn test_s2_etag_mismatch() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        seed(&backend, "/c/b", b"hello").await;

        let entries = vec![entry("/c/b", Some("wrong"), None, None)];
        let logger = logger();

        let err = verify_manifest(&entries, &backend, None, 1, &logger)
            .await
            .unwrap_err();

        match err {
            VerifyManifestError::Problems(problems) => {
                assert_eq!("/c/b", problems[0].path);
                assert_eq!("Etag Mismatch", problems[0].reason);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_s5_whole_range_normalized_away() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        seed(&backend, "/c/x", &[0u8; 1000]).await;

        let entries = vec![entry("/c/x", None, Some(1000), Some("0-999"))];
        let logger = logger();

        let result = verify_manifest(&entries, &backend, None, 1, &logger)
            .await
            .unwrap();

        assert!(result.entries[0].range.is_none());
    }

    #[tokio::test]
    async fn test_range_without_size_bytes_resolved_against_real_length() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        seed(&backend, "/c/x", &[0u8; 1000]).await;

        let entries = vec![entry("/c/x", None, None, Some("900-"))];
        let logger = logger();

        let result = verify_manifest(&entries, &backend, None, 1, &logger)
            .await
            .unwrap();

        assert_eq!("900-999", result.entries[0].range.as_deref().unwrap());
    }

    #[tokio::test]
    async fn test_missing_segment_reported() {
        let backend: ArcBackend = Arc::new(MemoryBackend::new());
        let entries = vec![entry("/c/missing", None, None, None)];
        let logger = logger();

        let err = verify_manifest(&entries, &backend, None, 1, &logger)
            .await
            .unwrap_err();

        match err {
            VerifyManifestError::Problems(problems) => {
                assert_eq!("Missing Segment", problems[0].reason);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

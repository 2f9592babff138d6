// SPDX-License-Identifier: GPL-2.0-or-later

//! Component G, the algorithmic half of the streaming responder. Precondition
//! and Range *header* parsing, and turning a leaf-fetch plan into an actual
//! HTTP body, are the `web`/`handler` crates' job; this module owns the
//! window selection, the first-segment conflict probe, and the rate limiter
//! that those crates drive.

use crate::listing::{list_window, LeafFetch, ListError};
use crate::model::StoredManifest;
use backend::{ArcBackend, Backend, BackendError, GetRange, GetRequest};
use common::ObjectPath;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no satisfiable byte range in request")]
    RangeNotSatisfiable,

    #[error(transparent)]
    List(#[from] ListError),

    #[error("first segment probe failed: {0}")]
    FirstSegmentConflict(#[source] BackendError),

    #[error("first segment probe returned non-success status {0}")]
    FirstSegmentNonSuccess(http::StatusCode),
}

/// What window of the logical concatenation to serve, and whether the
/// resulting response is a proper byte-range subset of the whole object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSelection {
    Whole,
    Single { start: u64, end: u64 },
}

/// Selects the serving window from the ranges the caller already parsed out
/// of the request's `Range` header. An empty slice means no `Range` header
/// was present. Multiple ranges are silently downgraded to `Whole` — the
/// spec's own documented compatibility behavior, not an oversight.
pub fn select_range(
    ranges: &[common::ByteRange],
    total_length: u64,
) -> Result<RangeSelection, StreamError> {
    match ranges.len() {
        0 => Ok(RangeSelection::Whole),
        1 => {
            let r = ranges[0];
            if r.start() >= total_length || r.end() >= total_length {
                return Err(StreamError::RangeNotSatisfiable);
            }
            Ok(RangeSelection::Single {
                start: r.start(),
                end: r.end(),
            })
        }
        _ => Ok(RangeSelection::Whole),
    }
}

pub struct ResponsePlan {
    pub fetches: Vec<LeafFetch>,
    pub range: RangeSelection,
    pub total_length: u64,
    pub composite_etag: String,
}

/// Steps 1-2 of component G: recompute ETag/length, select the window, and
/// list the leaf fetches it requires. Does not touch the backend for leaves
/// themselves — only for sub-manifest expansion inside `list_window`.
pub async fn plan_response(
    backend: &ArcBackend,
    manifest_path: &ObjectPath,
    manifest: &StoredManifest,
    ranges: &[common::ByteRange],
    auth_token: Option<&str>,
) -> Result<ResponsePlan, StreamError> {
    let total_length = crate::model::total_length(manifest);
    let composite_etag = crate::model::composite_etag(manifest);
    let range = select_range(ranges, total_length)?;

    let window = match range {
        RangeSelection::Whole => None,
        RangeSelection::Single { start, end } => Some((start, end)),
    };

    let fetches = list_window(backend, manifest_path, manifest, window, auth_token).await?;

    Ok(ResponsePlan {
        fetches,
        range,
        total_length,
        composite_etag,
    })
}

/// Step 5: validate the first segment synchronously before any body bytes
/// are committed. A failure here becomes 409 Conflict at the HTTP layer;
/// failures on later segments are the caller's problem to drop the
/// connection over, since the response has already been committed.
pub async fn probe_first_segment(
    backend: &ArcBackend,
    fetches: &[LeafFetch],
    auth_token: Option<&str>,
) -> Result<(), StreamError> {
    let Some(first) = fetches.first() else {
        return Ok(());
    };

    let response = backend
        .get(
            &first.path,
            GetRequest {
                range: Some(GetRange {
                    start: first.start,
                    end: first.end,
                }),
                auth_token: auth_token.map(str::to_owned),
                source_tag: Some("SLO"),
            },
        )
        .await
        .map_err(StreamError::FirstSegmentConflict)?;

    if !response.meta.status.is_success() {
        return Err(StreamError::FirstSegmentNonSuccess(response.meta.status));
    }

    Ok(())
}

/// Step 3: a token-bucket limiter that streams the first `after_segment`
/// leaf fetches unthrottled, then paces the rest to `per_second`.
pub struct RateLimiter {
    after_segment: usize,
    per_second: u32,
    served: usize,
}

impl RateLimiter {
    #[must_use]
    pub fn new(after_segment: usize, per_second: u32) -> Self {
        Self {
            after_segment,
            per_second,
            served: 0,
        }
    }

    /// Call before fetching each segment. Sleeps when throttling applies.
    pub async fn wait(&mut self) {
        if self.served >= self.after_segment && self.per_second > 0 {
            tokio::time::sleep(Duration::from_secs_f64(1.0 / f64::from(self.per_second))).await;
        }
        self.served += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ByteRange;

    #[test]
    fn test_no_range_header_is_whole() {
        assert_eq!(RangeSelection::Whole, select_range(&[], 1000).unwrap());
    }

    #[test]
    fn test_single_range_selected() {
        let r = ByteRange::parse("0-99", 1000).unwrap();
        assert_eq!(
            RangeSelection::Single { start: 0, end: 99 },
            select_range(&[r], 1000).unwrap()
        );
    }

    #[test]
    fn test_multiple_ranges_fall_back_to_whole() {
        let r1 = ByteRange::parse("0-99", 1000).unwrap();
        let r2 = ByteRange::parse("200-299", 1000).unwrap();
        assert_eq!(RangeSelection::Whole, select_range(&[r1, r2], 1000).unwrap());
    }

    #[tokio::test]
    async fn test_rate_limiter_does_not_sleep_when_unlimited() {
        let mut limiter = RateLimiter::new(0, 0);
        let start = tokio::time::Instant::now();
        for _ in 0..100 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

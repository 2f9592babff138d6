// SPDX-License-Identifier: GPL-2.0-or-later

//! RFC 7232 conditional-request evaluation against the SLO's logical ETag
//! and last-modified time. Generalized from the single-object case this
//! crate's video handlers dealt with: here the "resource" is always the
//! composite manifest, never an individual segment.

use http::{HeaderMap, StatusCode, header};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondResult {
    /// Proceed with the request as normal.
    Proceed,
    /// Short-circuit with this status (304 or 412).
    ShortCircuit(StatusCode),
}

fn trim_weak_prefix(s: &str) -> &str {
    s.strip_prefix("W/").unwrap_or(s)
}

fn scan_etag(header_value: &str, target: &str) -> bool {
    header_value
        .split(',')
        .map(str::trim)
        .map(trim_weak_prefix)
        .any(|tag| tag.trim_matches('"') == target || tag == "*")
}

fn check_if_match(headers: &HeaderMap, etag: &str) -> Option<CondResult> {
    let value = headers.get(header::IF_MATCH)?.to_str().ok()?;
    if scan_etag(value, etag) {
        None
    } else {
        Some(CondResult::ShortCircuit(StatusCode::PRECONDITION_FAILED))
    }
}

fn check_if_none_match(headers: &HeaderMap, etag: &str, is_get_or_head: bool) -> Option<CondResult> {
    let value = headers.get(header::IF_NONE_MATCH)?.to_str().ok()?;
    if scan_etag(value, etag) {
        let status = if is_get_or_head {
            StatusCode::NOT_MODIFIED
        } else {
            StatusCode::PRECONDITION_FAILED
        };
        Some(CondResult::ShortCircuit(status))
    } else {
        None
    }
}

fn check_if_modified_since(headers: &HeaderMap, last_modified: Option<SystemTime>) -> Option<CondResult> {
    let value = headers.get(header::IF_MODIFIED_SINCE)?.to_str().ok()?;
    let since = httpdate::parse_http_date(value).ok()?;
    let modified = last_modified?;
    if modified <= since {
        Some(CondResult::ShortCircuit(StatusCode::NOT_MODIFIED))
    } else {
        None
    }
}

fn check_if_unmodified_since(headers: &HeaderMap, last_modified: Option<SystemTime>) -> Option<CondResult> {
    let value = headers.get(header::IF_UNMODIFIED_SINCE)?.to_str().ok()?;
    let since = httpdate::parse_http_date(value).ok()?;
    let modified = last_modified?;
    if modified > since {
        Some(CondResult::ShortCircuit(StatusCode::PRECONDITION_FAILED))
    } else {
        None
    }
}

/// Evaluates If-Match, If-Unmodified-Since, If-None-Match, If-Modified-Since
/// in RFC 7232's precedence order against the composite ETag.
#[must_use]
pub fn check_preconditions(
    headers: &HeaderMap,
    method: &http::Method,
    etag: &str,
    last_modified: Option<SystemTime>,
) -> CondResult {
    if let Some(result) = check_if_match(headers, etag) {
        return result;
    }
    if headers.get(header::IF_MATCH).is_none() {
        if let Some(result) = check_if_unmodified_since(headers, last_modified) {
            return result;
        }
    }

    let is_get_or_head = matches!(*method, http::Method::GET | http::Method::HEAD);
    if let Some(result) = check_if_none_match(headers, etag, is_get_or_head) {
        return result;
    }
    if headers.get(header::IF_NONE_MATCH).is_none() && is_get_or_head {
        if let Some(result) = check_if_modified_since(headers, last_modified) {
            return result;
        }
    }

    CondResult::Proceed
}

/// RFC 7233 `If-Range`: only honor a conditional range request when the
/// validator still matches; otherwise the caller should serve the whole body.
#[must_use]
pub fn check_if_range(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_RANGE).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    scan_etag(value, etag)
}

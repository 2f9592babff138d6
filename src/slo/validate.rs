// SPDX-License-Identifier: GPL-2.0-or-later

use crate::model::{ClientSegmentEntry, MAX_RECURSION_DEPTH};
use common::{ByteRange, ObjectPath};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentProblem {
    #[error("entry {0}: missing path")]
    MissingPath(usize),
    #[error("entry {0}: invalid path {1:?}")]
    InvalidPath(usize, String),
    #[error("entry {0}: path refers to the manifest object itself")]
    SelfReference(usize),
    #[error("entry {0}: invalid range {1:?}")]
    InvalidRange(usize, String),
}

#[derive(Debug, Error)]
pub enum ValidateManifestError {
    #[error("manifest body is not a JSON list of segment descriptors")]
    NotAList(#[from] serde_json::Error),

    #[error("manifest must contain at least one segment")]
    EmptyManifest,

    #[error("manifest failed validation: {0:?}")]
    InvalidEntries(Vec<SegmentProblem>),

    #[error("manifest exceeds the configured segment count limit")]
    TooManySegments,

    #[error("manifest body exceeds the configured size limit")]
    TooLarge,
}

#[derive(Debug)]
pub struct ParsedEntry {
    pub path: ObjectPath,
    pub etag: Option<String>,
    pub size_bytes: Option<u64>,
    /// Range in its raw "M-N" / "M-" / "-N" client form. Left unresolved
    /// here since resolving a suffix or open-ended form needs the segment's
    /// real length, which is only known once it's fetched at verify time.
    pub range: Option<String>,
}

/// Component A: parse and validate a client-submitted manifest body.
///
/// Errors accumulate across every entry before the list is rejected, so a
/// caller can report every problem at once rather than stopping at the first.
pub fn validate_manifest(
    body: &[u8],
    manifest_path: &ObjectPath,
    max_segments: usize,
    max_body_size: u64,
) -> Result<Vec<ParsedEntry>, ValidateManifestError> {
    if body.len() as u64 > max_body_size {
        return Err(ValidateManifestError::TooLarge);
    }

    let raw: Vec<ClientSegmentEntry> = serde_json::from_slice(body)?;

    if raw.is_empty() {
        return Err(ValidateManifestError::EmptyManifest);
    }
    if raw.len() > max_segments {
        return Err(ValidateManifestError::TooManySegments);
    }

    let mut problems = Vec::new();
    let mut parsed = Vec::with_capacity(raw.len());

    for (idx, entry) in raw.into_iter().enumerate() {
        if entry.path.is_empty() {
            problems.push(SegmentProblem::MissingPath(idx));
            continue;
        }
        let Ok(path) = ObjectPath::parse(&entry.path) else {
            problems.push(SegmentProblem::InvalidPath(idx, entry.path));
            continue;
        };
        if &path == manifest_path {
            problems.push(SegmentProblem::SelfReference(idx));
            continue;
        }
        let range = match &entry.range {
            None => None,
            Some(raw_range) => {
                if range_is_valid(raw_range, entry.size_bytes) {
                    Some(raw_range.clone())
                } else {
                    problems.push(SegmentProblem::InvalidRange(idx, raw_range.clone()));
                    continue;
                }
            }
        };

        parsed.push(ParsedEntry {
            path,
            etag: entry.etag,
            size_bytes: entry.size_bytes,
            range,
        });
    }

    if !problems.is_empty() {
        return Err(ValidateManifestError::InvalidEntries(problems));
    }

    Ok(parsed)
}

/// Checks the range's textual form independently of size, and gates a
/// satisfiability check (does it start within the segment?) on `size_bytes`
/// being known. Probing with `u64::MAX` when it isn't exercises the same
/// parser without ever tripping the size-dependent bound.
fn range_is_valid(raw: &str, size_bytes: Option<u64>) -> bool {
    let probe_size = size_bytes.unwrap_or(u64::MAX);
    ByteRange::parse(raw, probe_size).is_ok()
}

#[must_use]
pub fn recursion_depth_exceeded(depth: u32) -> bool {
    depth > MAX_RECURSION_DEPTH
}

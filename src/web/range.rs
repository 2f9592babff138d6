// SPDX-License-Identifier: GPL-2.0-or-later

//! RFC 7233 `Range` header parsing. Grammar support (multiple comma-separated
//! specs) lives here; the decision of what to *do* with more than one
//! satisfiable range (silently serve the whole object) lives in
//! `slo::stream`.

use common::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseRangeHeaderError {
    #[error("missing 'bytes=' unit prefix")]
    MissingUnit,
}

/// Parses a `Range` header value against a known total length, returning the
/// satisfiable ranges in the order given. A header with only unsatisfiable
/// specs returns an empty `Vec` (the caller maps that to 416). A header that
/// isn't `bytes=...`-shaped at all is rejected outright so the caller can
/// fall back to treating the request as unranged.
pub fn parse_range_header(value: &str, total_length: u64) -> Result<Vec<ByteRange>, ParseRangeHeaderError> {
    let specs = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(ParseRangeHeaderError::MissingUnit)?;

    let ranges = specs
        .split(',')
        .map(str::trim)
        .filter_map(|spec| ByteRange::parse(spec, total_length).ok())
        .collect();

    Ok(ranges)
}

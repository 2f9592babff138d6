// SPDX-License-Identifier: GPL-2.0-or-later

use common::ObjectPath;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub const RESERVED_HEADER: &str = "X-Static-Large-Object";
pub const CONTENT_TYPE_PARAM: &str = "swift_bytes";
pub const MAX_RECURSION_DEPTH: u32 = 10;

/// What the client submits in a manifest PUT body.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientSegmentEntry {
    pub path: String,
    pub etag: Option<String>,
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub range: Option<String>,
}

/// What component C writes, and F/G read back, as the stored manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredSegmentEntry {
    pub name: String,
    pub bytes: u64,
    pub hash: String,
    pub content_type: String,
    pub last_modified: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, rename = "sub_slo")]
    pub sub_slo: bool,
}

impl StoredSegmentEntry {
    /// Effective length L(e): range length if ranged, else the full segment size.
    #[must_use]
    pub fn effective_length(&self) -> u64 {
        match self.stored_range() {
            Some(r) => r.len(),
            None => self.logical_bytes(),
        }
    }

    /// `bytes` is the stored object's own physical size. For a `sub_slo`
    /// entry that's the nested manifest's JSON size, not the concatenated
    /// size it stands for — the concatenated size travels in the
    /// `swift_bytes=` content-type parameter the store step always writes.
    fn logical_bytes(&self) -> u64 {
        if self.sub_slo {
            parse_swift_bytes_param(&self.content_type).unwrap_or(self.bytes)
        } else {
            self.bytes
        }
    }

    #[must_use]
    pub fn stored_range(&self) -> Option<common::ByteRange> {
        self.range.as_deref().and_then(common::ByteRange::parse_stored)
    }

    #[must_use]
    pub fn object_path(&self) -> Option<ObjectPath> {
        ObjectPath::parse(&self.name).ok()
    }

    /// Composite-etag token: the whole-segment etag, or `etag:range;` if ranged.
    #[must_use]
    pub fn etag_token(&self) -> String {
        match &self.range {
            Some(r) => format!("{}:{};", self.hash, r),
            None => self.hash.clone(),
        }
    }
}

/// Extracts the `swift_bytes=N` parameter's value out of a content-type
/// string such as `"application/json;swift_bytes=52428800"`.
fn parse_swift_bytes_param(content_type: &str) -> Option<u64> {
    content_type.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(CONTENT_TYPE_PARAM)?
            .strip_prefix('=')?
            .parse()
            .ok()
    })
}

/// An ordered sequence of `StoredSegmentEntry`, the body of a manifest object.
pub type StoredManifest = Vec<StoredSegmentEntry>;

#[must_use]
pub fn total_length(manifest: &StoredManifest) -> u64 {
    manifest.iter().map(StoredSegmentEntry::effective_length).sum()
}

#[must_use]
pub fn composite_etag(manifest: &StoredManifest) -> String {
    let mut ctx = md5::Context::new();
    for entry in manifest {
        ctx.consume(entry.etag_token().as_bytes());
    }
    format!("{:x}", ctx.compute())
}

/// `last_modified` is stored as Unix seconds; `web` renders it to an HTTP-date
/// on the way out, so the manifest JSON round-trips through `serde_json`
/// without pulling a date-formatting crate into this one.
#[must_use]
pub fn format_last_modified(t: SystemTime) -> String {
    let secs = t
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.to_string()
}

#[must_use]
pub fn parse_last_modified(s: &str) -> Option<SystemTime> {
    s.parse::<u64>()
        .ok()
        .map(|secs| SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, bytes: u64, hash: &str, range: Option<&str>) -> StoredSegmentEntry {
        StoredSegmentEntry {
            name: name.to_owned(),
            bytes,
            hash: hash.to_owned(),
            content_type: "application/octet-stream".to_owned(),
            last_modified: "0".to_owned(),
            range: range.map(str::to_owned),
            sub_slo: false,
        }
    }

    #[test]
    fn test_effective_length_whole() {
        let e = entry("/c/a", 1000, "h", None);
        assert_eq!(1000, e.effective_length());
    }

    #[test]
    fn test_effective_length_ranged() {
        let e = entry("/c/a", 1000, "h", Some("0-99"));
        assert_eq!(100, e.effective_length());
    }

    #[test]
    fn test_effective_length_sub_slo_uses_swift_bytes_param() {
        let mut e = entry("/c/sub", 4096, "h", None);
        e.sub_slo = true;
        e.content_type = "application/json;swift_bytes=52428800".to_owned();
        assert_eq!(52_428_800, e.effective_length());
    }

    #[test]
    fn test_effective_length_sub_slo_falls_back_without_swift_bytes_param() {
        let mut e = entry("/c/sub", 4096, "h", None);
        e.sub_slo = true;
        assert_eq!(4096, e.effective_length());
    }

    #[test]
    fn test_composite_etag_whole_segments() {
        let manifest = vec![entry("/c/a", 10, "e1", None), entry("/c/b", 10, "e2", None)];
        let want = format!("{:x}", md5::compute("e1e2"));
        assert_eq!(want, composite_etag(&manifest));
    }

    #[test]
    fn test_composite_etag_ranged_segment() {
        let manifest = vec![entry("/c/a", 1000, "ex", Some("0-999"))];
        let want = format!("{:x}", md5::compute("ex:0-999;"));
        assert_eq!(want, composite_etag(&manifest));
    }

    #[test]
    fn test_total_length_sums_effective_lengths() {
        let manifest = vec![
            entry("/c/a", 1048576, "e1", None),
            entry("/c/b", 512, "e2", None),
        ];
        assert_eq!(1_049_088, total_length(&manifest));
    }
}

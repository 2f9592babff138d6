// SPDX-License-Identifier: GPL-2.0-or-later

//! Incremental composite-etag accumulation, used by the verifier (component B)
//! which feeds one segment's token at a time rather than building the full
//! `StoredManifest` up front.

use crate::model::StoredSegmentEntry;

pub struct CompositeEtagBuilder {
    ctx: md5::Context,
}

impl Default for CompositeEtagBuilder {
    fn default() -> Self {
        Self {
            ctx: md5::Context::new(),
        }
    }
}

impl CompositeEtagBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, entry: &StoredSegmentEntry) {
        self.ctx.consume(entry.etag_token().as_bytes());
    }

    #[must_use]
    pub fn finish(self) -> String {
        format!("{:x}", self.ctx.compute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::composite_etag;

    fn entry(hash: &str, range: Option<&str>) -> StoredSegmentEntry {
        StoredSegmentEntry {
            name: "/c/a".to_owned(),
            bytes: 10,
            hash: hash.to_owned(),
            content_type: "application/octet-stream".to_owned(),
            last_modified: "0".to_owned(),
            range: range.map(str::to_owned),
            sub_slo: false,
        }
    }

    #[test]
    fn test_incremental_matches_batch() {
        let entries = vec![entry("e1", None), entry("e2", Some("0-4"))];

        let mut builder = CompositeEtagBuilder::new();
        for e in &entries {
            builder.feed(e);
        }

        assert_eq!(composite_etag(&entries), builder.finish());
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use backend::ObjectMeta;
use http::{Method, StatusCode};

/// Component D. Decides, after a forwarded GET/HEAD, whether the response
/// names an SLO and whether a re-fetch is required before streaming.
#[derive(Debug, PartialEq, Eq)]
pub enum Classification {
    /// Not an SLO: pass the backend response through untouched.
    PassThrough,
    /// `?multipart-manifest=get`: stream the raw stored manifest JSON.
    RawManifest,
    /// The in-hand response body already is the whole stored manifest and
    /// can be used directly to drive the listing iterator.
    UseBody,
    /// The in-hand response cannot be trusted as the whole manifest; issue a
    /// fresh, unconditional, unranged internal GET.
    RefetchRequired,
}

#[derive(Debug, Clone, Copy)]
pub struct ConditionalOutcome {
    pub is_2xx: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RangeOutcome {
    pub status: StatusCode,
    pub first: u64,
    pub last: u64,
    pub complete_length: u64,
}

pub fn classify(
    meta: &ObjectMeta,
    method: &Method,
    raw_manifest_requested: bool,
    conditional: Option<ConditionalOutcome>,
    range: Option<RangeOutcome>,
) -> Classification {
    if !meta.is_static_large_object {
        return Classification::PassThrough;
    }
    if raw_manifest_requested {
        return Classification::RawManifest;
    }
    if *method == Method::HEAD {
        return Classification::RefetchRequired;
    }
    if let Some(cond) = conditional {
        if !cond.is_2xx {
            return Classification::RefetchRequired;
        }
    }
    if let Some(r) = range {
        let is_partial = matches!(r.status, StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE);
        let is_proper_subset = r.first != 0 || r.last + 1 != r.complete_length;
        if is_partial && is_proper_subset {
            return Classification::RefetchRequired;
        }
    }
    Classification::UseBody
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slo_meta() -> ObjectMeta {
        ObjectMeta {
            is_static_large_object: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_non_slo_passes_through() {
        let meta = ObjectMeta::default();
        assert_eq!(
            Classification::PassThrough,
            classify(&meta, &Method::GET, false, None, None)
        );
    }

    #[test]
    fn test_raw_manifest_requested() {
        assert_eq!(
            Classification::RawManifest,
            classify(&slo_meta(), &Method::GET, true, None, None)
        );
    }

    #[test]
    fn test_head_always_refetches() {
        assert_eq!(
            Classification::RefetchRequired,
            classify(&slo_meta(), &Method::HEAD, false, None, None)
        );
    }

    #[test]
    fn test_conditional_mismatch_refetches() {
        let cond = ConditionalOutcome { is_2xx: false };
        assert_eq!(
            Classification::RefetchRequired,
            classify(&slo_meta(), &Method::GET, false, Some(cond), None)
        );
    }

    #[test]
    fn test_proper_subset_range_refetches() {
        let range = RangeOutcome {
            status: StatusCode::PARTIAL_CONTENT,
            first: 10,
            last: 19,
            complete_length: 100,
        };
        assert_eq!(
            Classification::RefetchRequired,
            classify(&slo_meta(), &Method::GET, false, None, Some(range))
        );
    }

    #[test]
    fn test_full_range_uses_body() {
        let range = RangeOutcome {
            status: StatusCode::PARTIAL_CONTENT,
            first: 0,
            last: 99,
            complete_length: 100,
        };
        assert_eq!(
            Classification::UseBody,
            classify(&slo_meta(), &Method::GET, false, None, Some(range))
        );
    }
}

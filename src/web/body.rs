// SPDX-License-Identifier: GPL-2.0-or-later

//! Turns a listed sequence of leaf segment fetches into an HTTP response
//! body. Segments are read and forwarded in declared order; a failure on any
//! segment after the first simply ends the stream early — by the time this
//! runs, the first-segment probe in `slo::stream` has already happened and
//! the response is committed.

use axum::body::Body;
use backend::{ArcBackend, Backend, GetRange, GetRequest};
use bytes::Bytes;
use slo::listing::LeafFetch;
use slo::stream::RateLimiter;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Builds a streaming body over `fetches`, reading each segment from
/// `backend` in order and pacing with `limiter`.
#[must_use]
pub fn segmented_body(
    backend: ArcBackend,
    fetches: Vec<LeafFetch>,
    mut limiter: RateLimiter,
    auth_token: Option<String>,
) -> Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(4);

    tokio::spawn(async move {
        for fetch in fetches {
            limiter.wait().await;

            let response = match backend
                .get(
                    &fetch.path,
                    GetRequest {
                        range: Some(GetRange {
                            start: fetch.start,
                            end: fetch.end,
                        }),
                        auth_token: auth_token.clone(),
                        source_tag: Some("SLO"),
                    },
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                    return;
                }
            };

            let Some(mut body) = response.body else {
                return;
            };

            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match body.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }
    });

    Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx))
}

// SPDX-License-Identifier: GPL-2.0-or-later

//! The opaque request-dispatch interface the SLO middleware forwards to: a
//! storage tier reachable by HEAD/GET/PUT/DELETE against `ObjectPath`s.
//! Mirrors the shape of `fs::Fs` (dyn-compatible, clonable trait object)
//! generalized from a local filesystem to a remote object store.

pub mod fs_backend;
pub mod memory;

pub use fs_backend::FsBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use common::ObjectPath;
use http::StatusCode;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::io::AsyncRead;

pub type ArcBackend = Arc<dyn Backend + Send + Sync>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// Headers the middleware cares about, independent of transport.
#[derive(Clone, Debug, Default)]
pub struct ObjectMeta {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<std::time::SystemTime>,
    pub is_static_large_object: bool,
    pub extra_headers: HashMap<String, String>,
}

pub struct GetResponse {
    pub meta: ObjectMeta,
    pub body: Option<Box<dyn AsyncRead + Send + Unpin>>,
}

#[derive(Clone, Debug)]
pub struct PutRequest {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub extra_headers: HashMap<String, String>,
    pub auth_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PutResponse {
    pub status: StatusCode,
    pub etag: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteResponse {
    pub status: StatusCode,
}

/// A byte range requested from a single backend object, inclusive on both ends.
#[derive(Clone, Copy, Debug)]
pub struct GetRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, Default)]
pub struct GetRequest {
    pub range: Option<GetRange>,
    pub auth_token: Option<String>,
    /// Tags internal sub-requests so backend-side logs can attribute them
    /// (the source tag "SLO" named in the external interface surface).
    pub source_tag: Option<&'static str>,
}

#[async_trait]
pub trait Backend {
    async fn head(
        &self,
        path: &ObjectPath,
        auth_token: Option<&str>,
    ) -> Result<ObjectMeta, BackendError>;

    async fn get(&self, path: &ObjectPath, req: GetRequest) -> Result<GetResponse, BackendError>;

    async fn put(
        &self,
        path: &ObjectPath,
        req: PutRequest,
    ) -> Result<PutResponse, BackendError>;

    async fn delete(
        &self,
        path: &ObjectPath,
        auth_token: Option<&str>,
    ) -> Result<DeleteResponse, BackendError>;
}

// SPDX-License-Identifier: GPL-2.0-or-later

use crate::{
    Backend, BackendError, DeleteResponse, GetRequest, GetResponse, ObjectMeta, PutRequest,
    PutResponse,
};
use async_trait::async_trait;
use common::ObjectPath;
use http::StatusCode;
use std::{collections::HashMap, io::Cursor, sync::Mutex, time::SystemTime};

#[derive(Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub etag: String,
    pub content_type: String,
    pub last_modified: Option<SystemTime>,
    pub is_static_large_object: bool,
}

/// In-memory `Backend`, analogous to `fs::MapFs`: every component-level unit
/// test in this crate drives this seam directly instead of a real store.
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<HashMap<ObjectPath, StoredObject>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: ObjectPath, object: StoredObject) {
        self.objects.lock().expect("lock poisoned").insert(path, object);
    }

    #[must_use]
    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.objects.lock().expect("lock poisoned").contains_key(path)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn head(
        &self,
        path: &ObjectPath,
        _auth_token: Option<&str>,
    ) -> Result<ObjectMeta, BackendError> {
        let objects = self.objects.lock().expect("lock poisoned");
        let Some(obj) = objects.get(path) else {
            return Ok(ObjectMeta {
                status: StatusCode::NOT_FOUND,
                ..Default::default()
            });
        };
        Ok(ObjectMeta {
            status: StatusCode::OK,
            content_length: Some(obj.data.len() as u64),
            etag: Some(obj.etag.clone()),
            content_type: Some(obj.content_type.clone()),
            last_modified: obj.last_modified,
            is_static_large_object: obj.is_static_large_object,
            extra_headers: HashMap::new(),
        })
    }

    async fn get(&self, path: &ObjectPath, req: GetRequest) -> Result<GetResponse, BackendError> {
        let objects = self.objects.lock().expect("lock poisoned");
        let Some(obj) = objects.get(path) else {
            return Ok(GetResponse {
                meta: ObjectMeta {
                    status: StatusCode::NOT_FOUND,
                    ..Default::default()
                },
                body: None,
            });
        };

        let (bytes, status) = if let Some(range) = req.range {
            let start = range.start.min(obj.data.len() as u64) as usize;
            let end = ((range.end + 1).min(obj.data.len() as u64)) as usize;
            (obj.data[start..end].to_vec(), StatusCode::PARTIAL_CONTENT)
        } else {
            (obj.data.clone(), StatusCode::OK)
        };

        Ok(GetResponse {
            meta: ObjectMeta {
                status,
                content_length: Some(obj.data.len() as u64),
                etag: Some(obj.etag.clone()),
                content_type: Some(obj.content_type.clone()),
                last_modified: obj.last_modified,
                is_static_large_object: obj.is_static_large_object,
                extra_headers: HashMap::new(),
            },
            body: Some(Box::new(Cursor::new(bytes))),
        })
    }

    async fn put(&self, path: &ObjectPath, req: PutRequest) -> Result<PutResponse, BackendError> {
        let etag = format!("{:x}", md5::compute(&req.body));
        let is_slo = req
            .extra_headers
            .get("X-Static-Large-Object")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let mut objects = self.objects.lock().expect("lock poisoned");
        objects.insert(
            path.clone(),
            StoredObject {
                data: req.body,
                etag: etag.clone(),
                content_type: req.content_type.unwrap_or_else(|| "application/octet-stream".to_owned()),
                last_modified: Some(SystemTime::now()),
                is_static_large_object: is_slo,
            },
        );
        Ok(PutResponse {
            status: StatusCode::CREATED,
            etag: Some(etag),
        })
    }

    async fn delete(
        &self,
        path: &ObjectPath,
        _auth_token: Option<&str>,
    ) -> Result<DeleteResponse, BackendError> {
        let mut objects = self.objects.lock().expect("lock poisoned");
        let status = if objects.remove(path).is_some() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::NOT_FOUND
        };
        Ok(DeleteResponse { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_head_missing() {
        let backend = MemoryBackend::new();
        let meta = backend
            .head(&ObjectPath::parse("/c/o").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(StatusCode::NOT_FOUND, meta.status);
    }

    #[tokio::test]
    async fn test_put_then_head() {
        let backend = MemoryBackend::new();
        let path = ObjectPath::parse("/c/o").unwrap();
        backend
            .put(
                &path,
                PutRequest {
                    body: b"hello".to_vec(),
                    content_type: None,
                    extra_headers: HashMap::new(),
                    auth_token: None,
                },
            )
            .await
            .unwrap();

        let meta = backend.head(&path, None).await.unwrap();
        assert_eq!(StatusCode::OK, meta.status);
        assert_eq!(Some(5), meta.content_length);
    }
}

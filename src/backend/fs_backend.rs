// SPDX-License-Identifier: GPL-2.0-or-later

//! Filesystem-backed `Backend`: the one production-shaped implementation this
//! crate ships, storing each object as a file under `root/container/object`
//! plus a `.meta.json` sidecar for the headers the dispatch trait tracks.
//! Pairs with [`crate::memory::MemoryBackend`] the same way a real-disk
//! filesystem pairs with an in-memory one elsewhere in this workspace,
//! without a directory-listing surface since this trait has no equivalent of
//! one.

use crate::{Backend, BackendError, DeleteResponse, GetRequest, GetResponse, ObjectMeta, PutRequest, PutResponse};
use async_trait::async_trait;
use common::ObjectPath;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io::SeekFrom, path::PathBuf, time::SystemTime};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Sidecar {
    etag: String,
    content_type: String,
    last_modified_secs: u64,
    is_static_large_object: bool,
    extra_headers: HashMap<String, String>,
}

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn data_path(&self, path: &ObjectPath) -> PathBuf {
        self.root.join(path.container()).join(path.object())
    }

    fn sidecar_path(&self, path: &ObjectPath) -> PathBuf {
        let mut p = self.data_path(path).into_os_string();
        p.push(".meta.json");
        PathBuf::from(p)
    }

    async fn read_sidecar(&self, path: &ObjectPath) -> Option<Sidecar> {
        let raw = tokio::fs::read(self.sidecar_path(path)).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn head(&self, path: &ObjectPath, _auth_token: Option<&str>) -> Result<ObjectMeta, BackendError> {
        let data_path = self.data_path(path);
        let Ok(file_meta) = tokio::fs::metadata(&data_path).await else {
            return Ok(ObjectMeta {
                status: StatusCode::NOT_FOUND,
                ..Default::default()
            });
        };
        let sidecar = self.read_sidecar(path).await;
        Ok(ObjectMeta {
            status: StatusCode::OK,
            content_length: Some(file_meta.len()),
            etag: sidecar.as_ref().map(|s| s.etag.clone()),
            content_type: sidecar.as_ref().map(|s| s.content_type.clone()),
            last_modified: sidecar
                .as_ref()
                .map(|s| SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(s.last_modified_secs)),
            is_static_large_object: sidecar.as_ref().is_some_and(|s| s.is_static_large_object),
            extra_headers: sidecar.map(|s| s.extra_headers).unwrap_or_default(),
        })
    }

    async fn get(&self, path: &ObjectPath, req: GetRequest) -> Result<GetResponse, BackendError> {
        let data_path = self.data_path(path);
        let mut file = match tokio::fs::File::open(&data_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(GetResponse {
                    meta: ObjectMeta {
                        status: StatusCode::NOT_FOUND,
                        ..Default::default()
                    },
                    body: None,
                });
            }
            Err(e) => return Err(BackendError::Transport(e.to_string())),
        };

        let total_len = file
            .metadata()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?
            .len();
        let sidecar = self.read_sidecar(path).await;

        let status = if let Some(range) = req.range {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            let want = (range.end + 1).saturating_sub(range.start);
            let mut buf = vec![0u8; want as usize];
            let mut filled = 0usize;
            while filled < buf.len() {
                let n = file
                    .read(&mut buf[filled..])
                    .await
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            return Ok(GetResponse {
                meta: ObjectMeta {
                    status: StatusCode::PARTIAL_CONTENT,
                    content_length: Some(total_len),
                    etag: sidecar.as_ref().map(|s| s.etag.clone()),
                    content_type: sidecar.as_ref().map(|s| s.content_type.clone()),
                    last_modified: sidecar
                        .as_ref()
                        .map(|s| SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(s.last_modified_secs)),
                    is_static_large_object: sidecar.as_ref().is_some_and(|s| s.is_static_large_object),
                    extra_headers: sidecar.map(|s| s.extra_headers).unwrap_or_default(),
                },
                body: Some(Box::new(std::io::Cursor::new(buf))),
            });
        } else {
            StatusCode::OK
        };

        Ok(GetResponse {
            meta: ObjectMeta {
                status,
                content_length: Some(total_len),
                etag: sidecar.as_ref().map(|s| s.etag.clone()),
                content_type: sidecar.as_ref().map(|s| s.content_type.clone()),
                last_modified: sidecar
                    .as_ref()
                    .map(|s| SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(s.last_modified_secs)),
                is_static_large_object: sidecar.as_ref().is_some_and(|s| s.is_static_large_object),
                extra_headers: sidecar.map(|s| s.extra_headers).unwrap_or_default(),
            },
            body: Some(Box::new(file)),
        })
    }

    async fn put(&self, path: &ObjectPath, req: PutRequest) -> Result<PutResponse, BackendError> {
        let data_path = self.data_path(path);
        if let Some(parent) = data_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
        }

        let etag = format!("{:x}", md5::compute(&req.body));
        let mut file = tokio::fs::File::create(&data_path)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        file.write_all(&req.body)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let is_slo = req
            .extra_headers
            .get("X-Static-Large-Object")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let sidecar = Sidecar {
            etag: etag.clone(),
            content_type: req.content_type.unwrap_or_else(|| "application/octet-stream".to_owned()),
            last_modified_secs: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            is_static_large_object: is_slo,
            extra_headers: req.extra_headers,
        };
        let sidecar_json = serde_json::to_vec(&sidecar).map_err(|e| BackendError::Transport(e.to_string()))?;
        tokio::fs::write(self.sidecar_path(path), sidecar_json)
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(PutResponse {
            status: StatusCode::CREATED,
            etag: Some(etag),
        })
    }

    async fn delete(&self, path: &ObjectPath, _auth_token: Option<&str>) -> Result<DeleteResponse, BackendError> {
        let data_path = self.data_path(path);
        let status = match tokio::fs::remove_file(&data_path).await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(self.sidecar_path(path)).await;
                StatusCode::NO_CONTENT
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            Err(e) => return Err(BackendError::Transport(e.to_string())),
        };
        Ok(DeleteResponse { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_head_then_get() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        let path = ObjectPath::parse("/c/o").unwrap();

        backend
            .put(
                &path,
                PutRequest {
                    body: b"hello world".to_vec(),
                    content_type: Some("text/plain".to_owned()),
                    extra_headers: HashMap::new(),
                    auth_token: None,
                },
            )
            .await
            .unwrap();

        let meta = backend.head(&path, None).await.unwrap();
        assert_eq!(StatusCode::OK, meta.status);
        assert_eq!(Some(11), meta.content_length);

        let mut response = backend.get(&path, GetRequest::default()).await.unwrap();
        let mut buf = Vec::new();
        response.body.take().unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(b"hello world".to_vec(), buf);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        let response = backend
            .get(&ObjectPath::parse("/c/missing").unwrap(), GetRequest::default())
            .await
            .unwrap();
        assert_eq!(StatusCode::NOT_FOUND, response.meta.status);
    }

    #[tokio::test]
    async fn test_delete_removes_sidecar() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        let path = ObjectPath::parse("/c/o").unwrap();
        backend
            .put(
                &path,
                PutRequest {
                    body: b"x".to_vec(),
                    content_type: None,
                    extra_headers: HashMap::new(),
                    auth_token: None,
                },
            )
            .await
            .unwrap();

        backend.delete(&path, None).await.unwrap();
        assert!(!dir.path().join("c").join("o").exists());
        assert!(backend.read_sidecar(&path).await.is_none());
    }
}

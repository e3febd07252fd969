use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::primitives::ByteStream;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

pub struct UploadResult {
    pub hash: String,
    pub size: i64,
    pub key: String,
}

/// Blob store holding the raw bytes of uploaded spreadsheets.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Streams `reader` into `key`, computing its SHA-256 on the way.
    async fn upload_stream_with_hash<'a>(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult>;
    async fn open_reader(&self, key: &str) -> Result<BlobReader>;
    async fn get_file(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete_file(&self, key: &str) -> Result<()>;
    async fn file_exists(&self, key: &str) -> Result<bool>;
}

const CHUNK_SIZE: usize = 64 * 1024;

/// Stores blobs as plain files under a root directory.
pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(anyhow!("invalid storage key: {}", key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn upload_stream_with_hash<'a>(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never observe a half-written blob
        let partial = path.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut hasher = Sha256::new();
        let mut total_size = 0i64;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        let copied: Result<()> = async {
            loop {
                let read = reader.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
                file.write_all(&buffer[..read]).await?;
                total_size += read as i64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        drop(file);
        tokio::fs::rename(&partial, &path).await?;

        Ok(UploadResult {
            hash: hex::encode(hasher.finalize()),
            size: total_size,
            key: key.to_string(),
        })
    }

    async fn open_reader(&self, key: &str) -> Result<BlobReader> {
        let file = tokio::fs::File::open(self.path_for(key)?).await?;
        Ok(Box::pin(file))
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(key)?).await?)
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)?).await?)
    }
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Sends `reader` as the parts of `upload_id` and completes the upload.
    async fn upload_parts<'a>(
        &self,
        key: &str,
        upload_id: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        let mut chunk_index = 1;
        let mut completed_parts = Vec::new();
        let mut hasher = Sha256::new();
        let mut total_size = 0;

        // S3 parts must be at least 5 MB except the last one
        let chunk_size = 8 * 1024 * 1024;
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let mut n = 0;
            while n < chunk_size {
                let read = reader.read(&mut buffer[n..]).await?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[n..n + read]);
                n += read;
            }

            if n == 0 {
                break;
            }

            total_size += n as i64;
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(ByteStream::from(buffer[..n].to_vec()))
                .part_number(chunk_index)
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(chunk_index)
                    .build(),
            );

            chunk_index += 1;
        }

        if completed_parts.is_empty() {
            // An upload needs at least one part, even an empty one
            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .body(ByteStream::from(Vec::new()))
                .part_number(1)
                .send()
                .await?;
            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(1)
                    .build(),
            );
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;

        Ok(UploadResult {
            hash: hex::encode(hasher.finalize()),
            size: total_size,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn upload_stream_with_hash<'a>(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<UploadResult> {
        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?;

        match self.upload_parts(key, upload_id, reader).await {
            Ok(result) => Ok(result),
            Err(e) => {
                // Incomplete multipart uploads keep their parts until aborted
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    tracing::warn!("Failed to abort multipart upload {}: {}", key, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn open_reader(&self, key: &str) -> Result<BlobReader> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(Box::pin(res.body.into_async_read()))
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(res.body.collect().await?.to_vec())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!(service_error))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_local_round_trip_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path());

        let data = b"Name,Score\nJo,7\n".to_vec();
        let result = storage
            .upload_stream_with_hash("uploads/u1/f1", Box::new(std::io::Cursor::new(data.clone())))
            .await
            .unwrap();

        assert_eq!(result.size, data.len() as i64);
        assert_eq!(result.hash, hex::encode(Sha256::digest(&data)));
        assert!(storage.file_exists("uploads/u1/f1").await.unwrap());
        assert_eq!(storage.get_file("uploads/u1/f1").await.unwrap(), data);

        let mut streamed = Vec::new();
        storage
            .open_reader("uploads/u1/f1")
            .await
            .unwrap()
            .read_to_end(&mut streamed)
            .await
            .unwrap();
        assert_eq!(streamed, data);

        storage.delete_file("uploads/u1/f1").await.unwrap();
        assert!(!storage.file_exists("uploads/u1/f1").await.unwrap());
        // Deleting twice is fine
        storage.delete_file("uploads/u1/f1").await.unwrap();
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("connection reset")))
        }
    }

    /// Minimal S3 endpoint: starts multipart uploads, accepts aborts and
    /// records every call as "METHOD path?query".
    async fn fake_s3(calls: Arc<Mutex<Vec<String>>>) -> String {
        use axum::{extract::Request, http::StatusCode, response::IntoResponse};

        let app = axum::Router::new().fallback(move |req: Request| {
            let calls = calls.clone();
            async move {
                let call = format!("{} {}", req.method(), req.uri());
                calls.lock().unwrap().push(call);

                let query = req.uri().query().unwrap_or_default().to_string();
                if req.method() == axum::http::Method::POST && query.contains("uploads") {
                    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Bucket>files</Bucket><Key>uploads/u1/f1</Key><UploadId>upload-1</UploadId></InitiateMultipartUploadResult>"#;
                    ([(axum::http::header::CONTENT_TYPE, "application/xml")], body).into_response()
                } else if req.method() == axum::http::Method::DELETE {
                    StatusCode::NO_CONTENT.into_response()
                } else {
                    StatusCode::BAD_REQUEST.into_response()
                }
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_s3_failed_upload_is_aborted() {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        let calls = Arc::new(Mutex::new(Vec::new()));
        let endpoint = fake_s3(calls.clone()).await;

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .credentials_provider(Credentials::new("key", "secret", None, None, "test"))
            .build();
        let storage = S3StorageService::new(Client::from_conf(config), "files".to_string());

        let result = storage
            .upload_stream_with_hash("uploads/u1/f1", Box::new(BrokenReader))
            .await;
        assert!(result.is_err());

        let calls = calls.lock().unwrap();
        assert!(
            calls
                .iter()
                .any(|c| c.starts_with("DELETE ") && c.contains("uploadId=upload-1")),
            "no abort in {:?}",
            calls
        );
    }

    #[tokio::test]
    async fn test_local_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path());
        assert!(storage.get_file("../outside").await.is_err());
        assert!(storage.get_file("/etc/passwd").await.is_err());
    }
}

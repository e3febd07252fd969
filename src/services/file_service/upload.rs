use crate::api::error::AppError;
use crate::entities::{uploaded_files, user_files};
use crate::services::spreadsheet::SpreadsheetFormat;
use crate::utils::validation::validate_upload;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DbErr, Set, TransactionTrait};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use uuid::Uuid;

use super::FileService;

/// Bytes inspected before anything is written to storage.
const HEADER_LEN: usize = 512;

async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, AppError> {
    let mut header = vec![0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader
            .read(&mut header[filled..])
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    header.truncate(filled);
    Ok(header)
}

/// A read failure of the uploading client's body, as opposed to a storage fault.
#[derive(Debug, thiserror::Error)]
#[error("upload stream interrupted: {0}")]
struct ClientStreamError(io::Error);

/// Tags every read error of the wrapped client stream as [`ClientStreamError`].
struct ClientReader<R>(R);

impl<R: AsyncRead + Unpin> AsyncRead for ClientReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0)
            .poll_read(cx, buf)
            .map_err(|e| io::Error::other(ClientStreamError(e)))
    }
}

fn is_client_stream_error(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .and_then(|io_err| io_err.get_ref())
            .is_some_and(|inner| inner.is::<ClientStreamError>())
    })
}

impl FileService {
    /// Validates, stores and records a spreadsheet for `user_id`.
    ///
    /// The blob is written first; the file row and the owner reference are
    /// then inserted in one transaction. Any failure after the blob exists
    /// removes it again.
    pub async fn upload_spreadsheet<'a>(
        &self,
        user_id: &str,
        filename: &str,
        content_type: Option<&str>,
        mut reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<uploaded_files::Model, AppError> {
        let header = read_header(&mut reader).await?;
        if header.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }

        let (filename, format) = validate_upload(filename, content_type, &header)?;

        // Reading one byte past the limit is enough to know it was exceeded
        let limit = self.config.max_file_size as u64 + 1;
        let chained = io::Cursor::new(header)
            .chain(ClientReader(reader))
            .take(limit);

        let storage_key = format!("uploads/{}/{}", user_id, Uuid::new_v4());
        tracing::info!("Streaming upload {} to {}", filename, storage_key);

        let stored = self
            .storage
            .upload_stream_with_hash(&storage_key, Box::new(chained))
            .await
            .map_err(|e| {
                if is_client_stream_error(&e) {
                    tracing::warn!("Upload of {} interrupted by the client: {}", filename, e);
                    AppError::BadRequest("Upload was interrupted".to_string())
                } else {
                    AppError::Internal(format!("Upload failed: {}", e))
                }
            })?;

        if stored.size > self.config.max_file_size as i64 {
            self.discard_blob(&storage_key).await;
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the maximum size of {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }

        let headers = match self.extract_headers(&storage_key, &filename, format, stored.size).await {
            Ok(headers) => headers,
            Err(e) => {
                self.discard_blob(&storage_key).await;
                return Err(e);
            }
        };

        let file_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let file = uploaded_files::ActiveModel {
            id: Set(file_id.clone()),
            owner_id: Set(user_id.to_string()),
            filename: Set(filename.clone()),
            content_type: Set(format.content_type().to_string()),
            size: Set(stored.size),
            storage_key: Set(storage_key.clone()),
            checksum: Set(stored.hash),
            headers: Set(serde_json::json!(headers)),
            uploaded_at: Set(now),
        };
        let reference = user_files::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            file_id: Set(file_id),
            created_at: Set(now),
        };

        let recorded: Result<uploaded_files::Model, DbErr> = async {
            let txn = self.db.begin().await?;
            let file = file.insert(&txn).await?;
            reference.insert(&txn).await?;
            txn.commit().await?;
            Ok(file)
        }
        .await;

        match recorded {
            Ok(file) => {
                tracing::info!(
                    "📊 Stored spreadsheet {} ({} bytes, {} columns) for user {}",
                    file.filename,
                    file.size,
                    headers.len(),
                    user_id
                );
                Ok(file)
            }
            Err(e) => {
                tracing::warn!("Recording upload {} failed, removing blob", storage_key);
                self.discard_blob(&storage_key).await;
                Err(e.into())
            }
        }
    }

    async fn extract_headers(
        &self,
        storage_key: &str,
        filename: &str,
        format: SpreadsheetFormat,
        size: i64,
    ) -> Result<Vec<String>, AppError> {
        if format == SpreadsheetFormat::Xls {
            return Ok(Vec::new());
        }
        if size as usize > self.config.max_parse_size {
            tracing::warn!(
                "{} is larger than the parse limit, headers not extracted",
                filename
            );
            return Ok(Vec::new());
        }
        let table = self.read_table(storage_key, filename, size).await?;
        Ok(table.headers)
    }

    pub(super) async fn discard_blob(&self, storage_key: &str) {
        if let Err(e) = self.storage.delete_file(storage_key).await {
            tracing::warn!("Failed to remove blob {}: {}", storage_key, e);
        }
    }
}

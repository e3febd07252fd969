use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::spreadsheet::{Table, parse_table};
use crate::services::storage::BlobReader;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use super::FileService;

impl FileService {
    /// The requester's files in upload order.
    pub async fn list_files(&self, user_id: &str) -> Result<Vec<uploaded_files::Model>, AppError> {
        let files = UploadedFiles::find()
            .inner_join(UserFiles)
            .filter(user_files::Column::UserId.eq(user_id))
            .order_by_asc(user_files::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(files)
    }

    /// Looks a file up by id; files of other users are reported as missing.
    pub async fn find_owned(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> Result<uploaded_files::Model, AppError> {
        UploadedFiles::find_by_id(file_id)
            .filter(uploaded_files::Column::OwnerId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    pub async fn open_file(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> Result<(uploaded_files::Model, BlobReader), AppError> {
        let file = self.find_owned(user_id, file_id).await?;
        let reader = self.storage.open_reader(&file.storage_key).await.map_err(|e| {
            tracing::error!("Blob {} of file {} unreadable: {}", file.storage_key, file.id, e);
            AppError::NotFound("File not found".to_string())
        })?;
        Ok((file, reader))
    }

    pub async fn load_table(
        &self,
        user_id: &str,
        file_id: &str,
    ) -> Result<(uploaded_files::Model, Table), AppError> {
        let file = self.find_owned(user_id, file_id).await?;
        let table = self
            .read_table(&file.storage_key, &file.filename, file.size)
            .await?;
        Ok((file, table))
    }

    pub(super) async fn read_table(
        &self,
        storage_key: &str,
        filename: &str,
        size: i64,
    ) -> Result<Table, AppError> {
        if size as usize > self.config.max_parse_size {
            return Err(AppError::PayloadTooLarge(
                "File is too large to analyse".to_string(),
            ));
        }

        let bytes = self
            .storage
            .get_file(storage_key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read blob {}: {}", storage_key, e)))?;

        let filename = filename.to_string();
        let table = tokio::task::spawn_blocking(move || parse_table(&bytes, &filename))
            .await
            .map_err(|e| AppError::Internal(format!("Parser task failed: {}", e)))??;
        Ok(table)
    }
}

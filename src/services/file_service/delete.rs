use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};

use super::FileService;

impl FileService {
    /// Removes an owned file together with its owner reference and the
    /// analyses built on it. The blob goes last, after the commit.
    pub async fn delete_file(&self, user_id: &str, file_id: &str) -> Result<(), AppError> {
        let file = self.find_owned(user_id, file_id).await?;

        let txn = self.db.begin().await?;

        UserFiles::delete_many()
            .filter(user_files::Column::FileId.eq(&file.id))
            .exec(&txn)
            .await?;

        let removed = Analyses::delete_many()
            .filter(analyses::Column::FileId.eq(&file.id))
            .exec(&txn)
            .await?;

        UploadedFiles::delete_by_id(file.id.clone())
            .exec(&txn)
            .await?;

        txn.commit().await?;

        tracing::info!(
            "🗑️ Deleted file {} ({}) and {} analyses for user {}",
            file.filename,
            file.id,
            removed.rows_affected,
            user_id
        );

        // The rows are gone; a leftover blob is unreachable
        self.discard_blob(&file.storage_key).await;

        Ok(())
    }
}

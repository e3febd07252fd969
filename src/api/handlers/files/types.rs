use crate::entities::uploaded_files;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_id: String,
    pub filename: String,
    pub headers: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub checksum: String,
    pub headers: Vec<String>,
    pub uploaded_at: chrono::DateTime<Utc>,
}

impl From<uploaded_files::Model> for FileView {
    fn from(file: uploaded_files::Model) -> Self {
        Self {
            headers: file.header_names(),
            id: file.id,
            filename: file.filename,
            content_type: file.content_type,
            size: file.size,
            checksum: file.checksum,
            uploaded_at: file.uploaded_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerFiles {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub uploaded_files: Vec<FileView>,
}

#[derive(Serialize, ToSchema)]
pub struct FilesResponse {
    pub user: OwnerFiles,
}

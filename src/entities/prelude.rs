pub use super::analyses::Entity as Analyses;
pub use super::uploaded_files::Entity as UploadedFiles;
pub use super::user_files::Entity as UserFiles;
pub use super::users::Entity as Users;

pub mod prelude;

pub mod analyses;
pub mod uploaded_files;
pub mod user_files;
pub mod users;

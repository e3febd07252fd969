pub mod download;
pub mod list;
pub mod manage;
pub mod types;
pub mod upload;

pub use download::*;
pub use list::*;
pub use manage::*;
pub use types::*;
pub use upload::*;

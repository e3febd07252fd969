pub mod admin;
pub mod analysis;
pub mod auth;
pub mod charts;
pub mod files;
pub mod health;
pub mod users;

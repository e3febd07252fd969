pub mod accounts;
pub mod charting;
pub mod file_service;
pub mod spreadsheet;
pub mod storage;

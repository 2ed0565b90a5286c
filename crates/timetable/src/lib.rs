//! Ingestion, change tracking and read API for the university timetable
//! spreadsheet.

pub mod auth;
pub mod config;
pub mod db;
pub mod fingerprint;
pub mod matcher;
pub mod model;
pub mod notify;
pub mod parser;
pub mod report;
pub mod server;
pub mod source;
pub mod sync;
pub mod types;

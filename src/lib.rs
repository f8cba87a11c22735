//! Folio - portfolio export importer
//!
//! This library scans a drop folder for broker exports, publishes the latest
//! file of each type to a canonical path, and keeps an encrypted, append-only
//! SQLite record of everything it imported.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod importers;
pub mod pipeline;
pub mod utils;

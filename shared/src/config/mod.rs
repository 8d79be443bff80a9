//! Configuration module for Spanhouse.
//!
//! This module contains the database connection and table settings used to
//! build trace readers.

pub mod reader;

pub use reader::{
    DatabaseConfig, ReaderConfig, TableNames, DEFAULT_ARCHIVE_SPANS_TABLE, DEFAULT_INDEX_TABLE,
    DEFAULT_OPERATIONS_TABLE, DEFAULT_SPANS_TABLE,
};

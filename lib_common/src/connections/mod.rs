//! # Connections Module
//!
//! This module handles persistent connections to external services.

/// Module for the PostgreSQL event log.
pub mod db_postgres;

pub use db_postgres::{DbError, EventLog, EventLogOptions, EventRow};

//! Cache-tag purge coordinator for Akamai Fast Purge.

pub mod config;
pub mod content;
pub mod error;
pub mod infra;
pub mod options;
pub mod purge;

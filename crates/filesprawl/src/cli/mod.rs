//! CLI command implementations

pub mod config;
pub mod context;
pub mod list;
pub mod output;
pub mod query;
pub mod scan;

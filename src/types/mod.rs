//! Core types for the conversion service.
//!
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Environment-driven configuration snapshot

mod config;
mod errors;

pub use config::{
    Config, ConverterConfig, Environment, HttpConfig, LogConfig, LogFormat, LogLevel, RpcConfig,
    ServerConfig, MAX_BATCH_ITEMS,
};
pub use errors::{Error, Result};

//! # html2md-server - HTML to Markdown conversion service
//!
//! Exposes one conversion capability over two protocols in a single process:
//! - REST (`axum`) under `/api/v1`
//! - RPC (length-prefixed msgpack frames over TCP)
//!
//! Both adapters share a [`service::ConvertService`], which runs single
//! conversions and batches with per-item failure isolation. The
//! [`lifecycle::ServerLifecycleManager`] starts both listeners together and
//! drains them together on shutdown.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────┐
//!   SIGINT/SIGTERM → │       ServerLifecycleManager         │
//!                    │   ┌────────────┐   ┌────────────┐    │
//!                    │   │ HttpServer │   │ RpcServer  │    │
//!                    │   └─────┬──────┘   └─────┬──────┘    │
//!                    └─────────┼────────────────┼───────────┘
//!                              └───────┬────────┘
//!                              ┌───────▼────────┐
//!                              │ ConvertService │──► BatchOrchestrator
//!                              └───────┬────────┘         │
//!                                      └──► Converter ◄───┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod convert;
pub mod http;
pub mod lifecycle;
pub mod rpc;
pub mod service;
pub mod types;
pub mod validation;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};

//! TCP+msgpack RPC transport.
//!
//! Length-prefixed msgpack frames carrying `{id, method, body}` requests and
//! `{id, ok, body | error}` responses. Methods: `Convert`, `ConvertBatch`,
//! `HealthCheck`, `GetConverterInfo` and the reserved `ConvertFromURL`.

pub mod codec;
pub mod router;
pub mod server;

pub use server::RpcServer;

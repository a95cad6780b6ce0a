//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for the Chitline print dispatch
//! engine: the upstream trigger contract (enqueue / cancel cascade) and the
//! read-only operational surface for admin tooling.

pub mod error;
pub mod handler;
mod rate_limiter;
pub mod server;
pub mod types;

pub use server::RpcServer;

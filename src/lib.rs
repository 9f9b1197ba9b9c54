//! wifi-rpc: RPC transport di atas Unix-domain socket
//!
//! Satu koneksi membawa dua arah lalu lintas: request/reply sinkron dari
//! client ke server, dan callback asinkron yang di-push server kapan saja.
//!
//! Layer:
//! - `core`: I/O buffer, connection context, registry fd -> context
//! - `protocol`: frame berbasis separator + terminator, encode/decode field
//! - `network`: socket primitives, event loop, client dan server

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod protocol;

pub use error::{Error, Result};

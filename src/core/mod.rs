//! Core module: buffer, per-connection context, dan registry
//!
//! - `IoBuffer`: byte buffer dengan offset consumed/filled, tumbuh sampai batas
//! - `Context`: socket + read/write buffer + pesan yang sedang di-parse
//! - `HashTable`: lookup context berdasarkan descriptor

mod buffer;
mod context;
mod hash_table;

pub use buffer::IoBuffer;
pub use context::{Context, Inbound, Outbound};
pub use hash_table::HashTable;

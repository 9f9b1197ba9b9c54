//! Error taxonomy untuk transport RPC
//!
//! Transient I/O (would-block, interrupted) tidak pernah muncul di sini:
//! layer Net mengembalikan jumlah byte parsial sebagai gantinya.

use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Peer menutup koneksi (read/write mengembalikan EOF atau EPIPE)
    #[error("peer closed the connection")]
    PeerClosed,

    /// Fatal socket error
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Buffer akan melewati batas maksimum
    #[error("buffer capacity exceeded: {required} bytes required, limit is {max}")]
    CapacityExceeded { required: usize, max: usize },

    #[error("no more fields in message")]
    NoMoreFields,

    #[error("malformed field: {0}")]
    Malformed(&'static str),

    #[error("invalid digit in numeric field")]
    InvalidDigit,

    /// Value yang ditulis mengandung separator/terminator, atau double non-finite
    #[error("field value cannot be encoded")]
    InvalidField,

    /// Client sudah dalam state `Closed`
    #[error("rpc connection closed")]
    Closed,

    #[error("no message installed for decoding")]
    NoMessage,

    #[error("descriptor {0} is outside the event loop set")]
    OutOfRange(RawFd),

    /// Event id di luar range yang dikonfigurasi server
    #[error("event id {0} is outside the configured range")]
    InvalidEvent(i32),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Apakah error ini mematikan koneksi (bukan error decode per-field)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::PeerClosed | Error::Io(_) | Error::CapacityExceeded { .. } | Error::Closed
        )
    }
}

//! Protocol Layer: text frame dengan separator dan terminator
//!
//! Format: `tag<sep>field<sep>...field<sep><terminator>`
//! - Tag `N` = request/reply, `C` = callback dari server
//! - Angka dikirim sebagai desimal, byte string sebagai hex lowercase

mod decoder;
mod encoder;
mod message;

pub use decoder::FieldReader;
pub use encoder::{FieldWriter, FrameEncoder};
pub use message::{Field, Message, MessageTag};

//! Field Encoder
//!
//! Semua write mendelegasikan ke `append_field`/`append_raw` milik
//! implementor (write buffer `Context`), jadi satu field selalu masuk
//! utuh atau tidak sama sekali.

use std::os::raw::c_long;

use super::message::{Field, MessageTag};
use crate::config::Framing;
use crate::error::{Error, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Sisi encode dari codec field
pub trait FieldWriter {
    fn framing(&self) -> &Framing;

    /// Append `value` diikuti separator dalam satu reservasi
    fn append_field(&mut self, value: &[u8]) -> Result<()>;

    /// Append bytes apa adanya (dipakai untuk terminator)
    fn append_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Tag pesan + separator
    fn write_begin(&mut self, tag: MessageTag) -> Result<()> {
        self.append_field(&[tag.as_byte()])
    }

    fn write_func(&mut self, name: &str) -> Result<()> {
        self.write_str(name)
    }

    /// Text tidak boleh mengandung separator atau terminator
    fn write_str(&mut self, value: &str) -> Result<()> {
        if !self.framing().is_clean(value.as_bytes()) {
            return Err(Error::InvalidField);
        }
        self.append_field(value.as_bytes())
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        self.append_field(value.to_string().as_bytes())
    }

    fn write_long(&mut self, value: c_long) -> Result<()> {
        self.append_field(value.to_string().as_bytes())
    }

    fn write_int64(&mut self, value: i64) -> Result<()> {
        self.append_field(value.to_string().as_bytes())
    }

    /// Representasi desimal terpendek yang round-trip; NaN/inf ditolak
    fn write_double(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::InvalidField);
        }
        self.append_field(value.to_string().as_bytes())
    }

    fn write_char(&mut self, value: char) -> Result<()> {
        let mut utf8 = [0u8; 4];
        let encoded = value.encode_utf8(&mut utf8).as_bytes();
        if !self.framing().is_clean(encoded) {
            return Err(Error::InvalidField);
        }
        self.append_field(encoded)
    }

    /// Dua karakter hex lowercase per byte
    fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        let mut hex = Vec::with_capacity(value.len() * 2);
        for &b in value {
            hex.push(HEX_DIGITS[(b >> 4) as usize]);
            hex.push(HEX_DIGITS[(b & 0x0f) as usize]);
        }
        self.append_field(&hex)
    }

    fn write_field(&mut self, field: &Field) -> Result<()> {
        match field {
            Field::Int(v) => self.write_int(*v),
            Field::Long(v) => self.write_long(*v),
            Field::Int64(v) => self.write_int64(*v),
            Field::Double(v) => self.write_double(*v),
            Field::Char(v) => self.write_char(*v),
            Field::Str(v) => self.write_str(v),
            Field::Bytes(v) => self.write_bytes(v),
        }
    }

    /// Terminator, tanpa separator di belakangnya
    fn write_end(&mut self) -> Result<()> {
        let terminator = self.framing().terminator.clone();
        self.append_raw(&terminator)
    }
}

/// Encoder mandiri ke `Vec<u8>`, untuk test dan benchmark
#[derive(Debug, Default)]
pub struct FrameEncoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameEncoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl FieldWriter for FrameEncoder {
    fn framing(&self) -> &Framing {
        &self.framing
    }

    fn append_field(&mut self, value: &[u8]) -> Result<()> {
        self.buffer.reserve(value.len() + 1);
        self.buffer.extend_from_slice(value);
        self.buffer.push(self.framing.separator);
        Ok(())
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_exact_bytes() {
        let mut enc = FrameEncoder::new(Framing::default());
        enc.write_begin(MessageTag::Normal).unwrap();
        enc.write_func("Ping").unwrap();
        enc.write_int(7).unwrap();
        enc.write_end().unwrap();
        assert_eq!(enc.as_bytes(), b"N\tPing\t7\t$$$$$$");
    }

    #[test]
    fn test_callback_layout_with_pipe_separator() {
        let mut enc = FrameEncoder::new(Framing::new(b'|', b"$$$$$$"));
        enc.write_begin(MessageTag::Callback).unwrap();
        enc.write_int(108).unwrap();
        enc.write_int(100).unwrap();
        enc.write_int(1).unwrap();
        enc.write_str("00:00:00:00:00:00").unwrap();
        enc.write_end().unwrap();
        assert_eq!(enc.as_bytes(), b"C|108|100|1|00:00:00:00:00:00|$$$$$$");
    }

    #[test]
    fn test_bytes_are_lowercase_hex() {
        let mut enc = FrameEncoder::new(Framing::default());
        enc.write_bytes(&[0x00, 0xAB, 0x7f, 0xff]).unwrap();
        assert_eq!(enc.as_bytes(), b"00ab7fff\t");
    }

    #[test]
    fn test_rejects_separator_in_text() {
        let mut enc = FrameEncoder::new(Framing::default());
        assert!(matches!(enc.write_str("a\tb"), Err(Error::InvalidField)));
        assert!(matches!(enc.write_func("x$$$$$$"), Err(Error::InvalidField)));
        assert!(matches!(enc.write_char('\t'), Err(Error::InvalidField)));
        assert!(enc.as_bytes().is_empty());
    }

    #[test]
    fn test_rejects_non_finite_double() {
        let mut enc = FrameEncoder::new(Framing::default());
        assert!(enc.write_double(f64::NAN).is_err());
        assert!(enc.write_double(f64::INFINITY).is_err());
        enc.write_double(-2.5).unwrap();
        assert_eq!(enc.as_bytes(), b"-2.5\t");
    }

    #[test]
    fn test_write_field_dispatch() {
        let mut enc = FrameEncoder::new(Framing::default());
        enc.write_field(&Field::Int64(-9_000_000_000)).unwrap();
        enc.write_field(&Field::Char('x')).unwrap();
        assert_eq!(enc.as_bytes(), b"-9000000000\tx\t");
    }
}

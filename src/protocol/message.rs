//! Text Message Format
//!
//! Layout:
//! ┌─────┬─────┬─────────┬─────┬─────────┬─────┬──────────────┐
//! │ tag │ sep │ field 1 │ sep │ field N │ sep │ terminator   │
//! └─────┴─────┴─────────┴─────┴─────────┴─────┴──────────────┘
//!
//! `tag` adalah satu karakter: `N` (request/reply) atau `C` (callback).
//! Byte string di-hex-encode sehingga field tidak pernah bertabrakan
//! dengan separator atau terminator.

use std::os::raw::c_long;

/// Tipe pesan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    /// Request dari client atau reply dari server
    Normal,
    /// Event yang di-push server tanpa diminta
    Callback,
}

impl MessageTag {
    #[inline(always)]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Normal => b'N',
            Self::Callback => b'C',
        }
    }

    #[inline(always)]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'N' => Some(Self::Normal),
            b'C' => Some(Self::Callback),
            _ => None,
        }
    }
}

/// Satu frame lengkap (terminator sudah diterima), dengan parse cursor
///
/// Ownership buffer ada di pemegang `Message`; drop = release.
#[derive(Debug, Clone)]
pub struct Message {
    bytes: Vec<u8>,
    cursor: usize,
    separator: u8,
    terminator_len: usize,
}

impl Message {
    /// `bytes` harus diakhiri terminator (panjang `terminator_len`)
    pub fn new(bytes: Vec<u8>, separator: u8, terminator_len: usize) -> Self {
        let mut msg = Self {
            bytes,
            cursor: 0,
            separator,
            terminator_len,
        };
        msg.reset_cursor();
        msg
    }

    /// Tag byte mentah (karakter pertama)
    #[inline(always)]
    pub fn tag_byte(&self) -> Option<u8> {
        if self.body_end() == 0 {
            return None;
        }
        self.bytes.first().copied()
    }

    #[inline(always)]
    pub fn tag(&self) -> Option<MessageTag> {
        self.tag_byte().and_then(MessageTag::from_byte)
    }

    #[inline(always)]
    pub fn is_reply(&self) -> bool {
        self.tag() == Some(MessageTag::Normal)
    }

    /// Total panjang frame, termasuk terminator
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline(always)]
    pub fn separator(&self) -> u8 {
        self.separator
    }

    /// Offset awal terminator
    #[inline(always)]
    pub fn body_end(&self) -> usize {
        self.bytes.len().saturating_sub(self.terminator_len)
    }

    #[inline(always)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Cursor sudah sampai di terminator
    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.body_end()
    }

    /// Kembalikan cursor ke field pertama setelah tag dan separator-nya
    pub fn reset_cursor(&mut self) {
        self.cursor = 2.min(self.body_end());
    }

    /// Field mentah di cursor tanpa memajukan cursor
    pub(crate) fn peek_field(&self) -> Option<&[u8]> {
        let body = &self.bytes[..self.body_end()];
        let rest = body.get(self.cursor..)?;
        let len = rest.iter().position(|&b| b == self.separator)?;
        Some(&rest[..len])
    }

    /// Maju melewati field sepanjang `len` plus separator-nya
    pub(crate) fn advance(&mut self, len: usize) {
        self.cursor = (self.cursor + len + 1).min(self.body_end());
    }
}

/// Nilai field bertipe, untuk pesan yang dibangun secara dinamis
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i32),
    Long(c_long),
    Int64(i64),
    Double(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Int64(v)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Double(v)
    }
}

impl From<char> for Field {
    fn from(v: char) -> Self {
        Field::Char(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Str(v.to_owned())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Str(v)
    }
}

impl From<Vec<u8>> for Field {
    fn from(v: Vec<u8>) -> Self {
        Field::Bytes(v)
    }
}

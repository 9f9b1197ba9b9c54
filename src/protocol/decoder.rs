//! Field Decoder
//!
//! Decode berjalan di atas parse cursor milik `Message`. Setiap decode yang
//! berhasil memajukan cursor melewati field dan separator-nya; decode yang
//! gagal tidak memajukan cursor.

use std::os::raw::c_long;
use std::str::FromStr;

use super::message::Message;
use crate::error::{Error, Result};

/// Sisi decode dari codec field
pub trait FieldReader {
    /// Pesan yang sedang di-parse
    fn parse_target(&mut self) -> Result<&mut Message>;

    /// Panjang field berikutnya dari cursor
    fn next_field_len(&mut self) -> Result<usize> {
        let msg = self.parse_target()?;
        field_len(msg)
    }

    fn read_func(&mut self) -> Result<String> {
        self.read_str()
    }

    fn read_str(&mut self) -> Result<String> {
        read_with(self.parse_target()?, |field| {
            std::str::from_utf8(field)
                .map(str::to_owned)
                .map_err(|_| Error::Malformed("text is not utf-8"))
        })
    }

    fn read_int(&mut self) -> Result<i32> {
        read_with(self.parse_target()?, parse_integer::<i32>)
    }

    fn read_long(&mut self) -> Result<c_long> {
        read_with(self.parse_target()?, parse_integer::<c_long>)
    }

    fn read_int64(&mut self) -> Result<i64> {
        read_with(self.parse_target()?, parse_integer::<i64>)
    }

    fn read_double(&mut self) -> Result<f64> {
        read_with(self.parse_target()?, |field| {
            validate_numeric(field)?;
            let text = std::str::from_utf8(field).map_err(|_| Error::InvalidDigit)?;
            text.parse::<f64>()
                .map_err(|_| Error::Malformed("double out of range"))
        })
    }

    fn read_char(&mut self) -> Result<char> {
        read_with(self.parse_target()?, |field| {
            let text =
                std::str::from_utf8(field).map_err(|_| Error::Malformed("text is not utf-8"))?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(Error::Malformed("expected a single character")),
            }
        })
    }

    /// Hex field (case-insensitive) ke raw bytes
    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        read_with(self.parse_target()?, decode_hex)
    }
}

impl FieldReader for Message {
    fn parse_target(&mut self) -> Result<&mut Message> {
        Ok(self)
    }
}

fn field_len(msg: &Message) -> Result<usize> {
    if msg.is_exhausted() {
        return Err(Error::NoMoreFields);
    }
    msg.peek_field()
        .map(<[u8]>::len)
        .ok_or(Error::Malformed("missing separator"))
}

/// Decode field di cursor dengan `parse`; cursor maju hanya jika sukses
fn read_with<T>(msg: &mut Message, parse: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
    let len = field_len(msg)?;
    let value = match msg.peek_field() {
        Some(field) => parse(field)?,
        None => return Err(Error::Malformed("missing separator")),
    };
    msg.advance(len);
    Ok(value)
}

/// Hanya digit, satu sign opsional di depan, dan maksimal satu titik desimal
fn validate_numeric(field: &[u8]) -> Result<()> {
    let digits = match field.first() {
        Some(b'+' | b'-') => &field[1..],
        _ => field,
    };

    let mut seen_point = false;
    let mut seen_digit = false;
    for &b in digits {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_point => seen_point = true,
            _ => return Err(Error::InvalidDigit),
        }
    }

    if seen_digit {
        Ok(())
    } else {
        Err(Error::InvalidDigit)
    }
}

/// Bagian pecahan dibuang (truncate ke nol)
fn parse_integer<T: FromStr>(field: &[u8]) -> Result<T> {
    validate_numeric(field)?;
    let text = std::str::from_utf8(field).map_err(|_| Error::InvalidDigit)?;
    let int_part = text.split('.').next().unwrap_or(text);
    let int_part = match int_part {
        "" | "+" | "-" => "0",
        other => other,
    };
    int_part
        .parse::<T>()
        .map_err(|_| Error::Malformed("integer out of range"))
}

fn hex_value(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::Malformed("invalid hex digit")),
    }
}

fn decode_hex(field: &[u8]) -> Result<Vec<u8>> {
    if field.len() % 2 != 0 {
        return Err(Error::Malformed("odd-length hex field"));
    }
    field
        .chunks_exact(2)
        .map(|pair| Ok((hex_value(pair[0])? << 4) | hex_value(pair[1])?))
        .collect()
}

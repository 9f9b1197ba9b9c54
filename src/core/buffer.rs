//! Growable byte buffer dengan offset yang dicek
//!
//! Layout:
//! ```text
//! 0 ........ begin ........ end ........ capacity
//!   consumed    unconsumed     free tail
//! ```
//!
//! Invariant: `0 <= begin <= end <= capacity` dan `capacity` selalu di
//! `[limits.min, limits.max]`. Kapasitas hanya bertambah, tidak pernah menyusut.

use crate::config::BufferLimits;
use crate::error::{Error, Result};

pub struct IoBuffer {
    data: Box<[u8]>,
    begin: usize,
    end: usize,
    limits: BufferLimits,
}

impl IoBuffer {
    /// Pre-allocate `limits.min` bytes
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            data: vec![0u8; limits.min].into_boxed_slice(),
            begin: 0,
            end: 0,
            limits,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Offset consumed
    #[inline(always)]
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Offset filled-to
    #[inline(always)]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Bytes yang belum dikonsumsi
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Unconsumed region (zero-copy)
    #[inline(always)]
    pub fn pending(&self) -> &[u8] {
        &self.data[self.begin..self.end]
    }

    /// Free tail untuk diisi langsung dari socket
    #[inline(always)]
    pub fn free_tail(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Pastikan ada `additional` bytes di free tail.
    ///
    /// Gagal tanpa mengubah isi maupun offset jika total unconsumed + `additional`
    /// melebihi `limits.max`. Jika tail kurang, data unconsumed dipindah ke
    /// offset 0 dulu, baru kapasitas digandakan (atau tepat sebesar kebutuhan).
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self.len().saturating_add(additional);
        if required > self.limits.max {
            return Err(Error::CapacityExceeded {
                required,
                max: self.limits.max,
            });
        }

        if self.capacity() - self.end >= additional {
            return Ok(());
        }

        self.compact();
        if self.capacity() - self.end >= additional {
            return Ok(());
        }

        let new_capacity = self
            .capacity()
            .saturating_mul(2)
            .max(required)
            .min(self.limits.max);
        let mut grown = vec![0u8; new_capacity].into_boxed_slice();
        grown[..self.end].copy_from_slice(&self.data[..self.end]);
        self.data = grown;
        Ok(())
    }

    /// Append bytes, growing jika perlu
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
        Ok(())
    }

    /// Tandai `n` bytes di free tail sebagai terisi
    #[inline]
    pub fn advance_end(&mut self, n: usize) {
        self.end += n.min(self.capacity() - self.end);
    }

    /// Consume `n` bytes dari depan region unconsumed
    #[inline]
    pub fn consume(&mut self, n: usize) {
        self.begin += n.min(self.len());
        if self.begin == self.end {
            self.begin = 0;
            self.end = 0;
        }
    }

    /// Sisakan hanya `len` bytes unconsumed pertama.
    ///
    /// Mark berupa panjang, bukan offset, supaya tetap valid setelah compact.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.end = self.begin + len;
        }
        if self.begin == self.end {
            self.begin = 0;
            self.end = 0;
        }
    }

    pub fn clear(&mut self) {
        self.begin = 0;
        self.end = 0;
    }

    /// Pindahkan region unconsumed ke offset 0
    fn compact(&mut self) {
        if self.begin == 0 {
            return;
        }
        self.data.copy_within(self.begin..self.end, 0);
        self.end -= self.begin;
        self.begin = 0;
    }
}

impl std::fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoBuffer")
            .field("capacity", &self.capacity())
            .field("begin", &self.begin)
            .field("end", &self.end)
            .finish()
    }
}

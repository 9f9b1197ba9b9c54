//! Connection Context dengan buffered I/O dan message framing
//!
//! Satu `Context` per koneksi: read buffer + framing di sisi `Inbound`,
//! write buffer di sisi `Outbound`, dan satu pesan yang sedang di-parse.
//! Client memecah context ke dua sisi supaya reader thread dan caller
//! tidak berbagi buffer yang sama.

use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use super::buffer::IoBuffer;
use crate::config::{BufferLimits, Framing};
use crate::error::{Error, Result};
use crate::network::net;
use crate::protocol::{FieldReader, FieldWriter, Message};

/// Sisi read: socket -> read buffer -> frame lengkap
#[derive(Debug)]
pub struct Inbound {
    stream: UnixStream,
    buffer: IoBuffer,
    framing: Framing,
}

impl Inbound {
    pub fn new(stream: UnixStream, framing: Framing, limits: BufferLimits) -> Self {
        Self {
            stream,
            buffer: IoBuffer::new(limits),
            framing,
        }
    }

    #[inline(always)]
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    #[inline(always)]
    pub fn buffer(&self) -> &IoBuffer {
        &self.buffer
    }

    /// Baca semua byte yang tersedia dari socket ke read buffer.
    ///
    /// Buffer tumbuh sesuai kebutuhan sampai `limits.max`; frame yang
    /// melebihi batas menghasilkan `CapacityExceeded`.
    pub fn pull_from_socket(&mut self) -> Result<usize> {
        let limits = self.buffer.limits();
        let mut total = 0;

        loop {
            let room = limits.min.min(limits.max - self.buffer.len());
            if room == 0 {
                if total > 0 {
                    return Ok(total);
                }
                return Err(Error::CapacityExceeded {
                    required: self.buffer.len() + 1,
                    max: limits.max,
                });
            }
            self.buffer.reserve(room)?;

            let tail = self.buffer.free_tail();
            let want = tail.len();
            let n = match net::read_some(&mut self.stream, tail) {
                Ok(n) => n,
                // Data yang sudah terbaca diproses dulu
                Err(Error::PeerClosed) if total > 0 => return Ok(total),
                Err(e) => return Err(e),
            };
            self.buffer.advance_end(n);
            total += n;

            if n < want {
                return Ok(total);
            }
        }
    }

    /// Ambil satu frame lengkap (sampai dan termasuk terminator).
    ///
    /// `None` jika terminator belum diterima seluruhnya.
    pub fn extract_message(&mut self) -> Option<Message> {
        let terminator = self.framing.terminator.as_slice();
        let pending = self.buffer.pending();
        if terminator.is_empty() || pending.len() < terminator.len() {
            return None;
        }

        let pos = pending
            .windows(terminator.len())
            .position(|w| w == terminator)?;
        let frame_len = pos + terminator.len();
        let frame = pending[..frame_len].to_vec();
        self.buffer.consume(frame_len);

        Some(Message::new(
            frame,
            self.framing.separator,
            terminator.len(),
        ))
    }
}

/// Sisi write: field encoder -> write buffer -> socket
#[derive(Debug)]
pub struct Outbound {
    stream: UnixStream,
    buffer: IoBuffer,
    framing: Framing,
}

impl Outbound {
    pub fn new(stream: UnixStream, framing: Framing, limits: BufferLimits) -> Self {
        Self {
            stream,
            buffer: IoBuffer::new(limits),
            framing,
        }
    }

    #[inline(always)]
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    #[inline(always)]
    pub fn buffer(&self) -> &IoBuffer {
        &self.buffer
    }

    /// Bytes pending di write buffer
    #[inline(always)]
    pub fn write_pending(&self) -> usize {
        self.buffer.len()
    }

    /// Queue bytes; gagal tanpa efek samping jika melewati `limits.max`
    pub fn append_to_write(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.extend(bytes)
    }

    /// Mark untuk `truncate_write`
    #[inline(always)]
    pub fn write_mark(&self) -> usize {
        self.buffer.len()
    }

    /// Buang bytes yang di-queue setelah `mark`
    pub fn truncate_write(&mut self, mark: usize) {
        self.buffer.truncate(mark);
    }

    /// Buang semua bytes yang belum terkirim
    pub fn clear_write(&mut self) {
        self.buffer.clear();
    }

    /// Drain write buffer ke socket.
    ///
    /// Berhenti tanpa error pada kondisi transient; returns sisa bytes.
    pub fn flush_write(&mut self) -> Result<usize> {
        while !self.buffer.is_empty() {
            let pending = self.buffer.pending();
            let want = pending.len();
            let n = net::write_some(&mut self.stream, pending)?;
            self.buffer.consume(n);
            if n < want {
                break;
            }
        }
        Ok(self.buffer.len())
    }
}

impl FieldWriter for Outbound {
    fn framing(&self) -> &Framing {
        &self.framing
    }

    fn append_field(&mut self, value: &[u8]) -> Result<()> {
        self.buffer.reserve(value.len() + 1)?;
        self.buffer.extend(value)?;
        self.buffer.extend(&[self.framing.separator])
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.append_to_write(bytes)
    }
}

/// Per-connection state
#[derive(Debug)]
pub struct Context {
    inbound: Inbound,
    outbound: Outbound,
    current: Option<Message>,
}

impl Context {
    /// Wrap socket; satu clone descriptor untuk sisi write
    pub fn new(stream: UnixStream, framing: Framing, limits: BufferLimits) -> Result<Self> {
        let write_stream = stream.try_clone()?;
        Ok(Self {
            inbound: Inbound::new(stream, framing.clone(), limits),
            outbound: Outbound::new(write_stream, framing, limits),
            current: None,
        })
    }

    /// Descriptor sisi read; key untuk event loop dan hash table
    #[inline(always)]
    pub fn fd(&self) -> RawFd {
        self.inbound.fd()
    }

    #[inline(always)]
    pub fn inbound(&self) -> &Inbound {
        &self.inbound
    }

    #[inline(always)]
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn into_parts(self) -> (Inbound, Outbound) {
        (self.inbound, self.outbound)
    }

    pub fn pull_from_socket(&mut self) -> Result<usize> {
        self.inbound.pull_from_socket()
    }

    pub fn extract_message(&mut self) -> Option<Message> {
        self.inbound.extract_message()
    }

    pub fn append_to_write(&mut self, bytes: &[u8]) -> Result<()> {
        self.outbound.append_to_write(bytes)
    }

    pub fn flush_write(&mut self) -> Result<usize> {
        self.outbound.flush_write()
    }

    #[inline(always)]
    pub fn write_pending(&self) -> usize {
        self.outbound.write_pending()
    }

    #[inline(always)]
    pub fn write_mark(&self) -> usize {
        self.outbound.write_mark()
    }

    pub fn truncate_write(&mut self, mark: usize) {
        self.outbound.truncate_write(mark)
    }

    /// Pasang `msg` sebagai parse target, cursor di-reset
    pub fn install(&mut self, mut msg: Message) {
        msg.reset_cursor();
        self.current = Some(msg);
    }

    /// Lepas parse target
    pub fn release_current(&mut self) -> Option<Message> {
        self.current.take()
    }

    #[inline(always)]
    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }
}

impl FieldWriter for Context {
    fn framing(&self) -> &Framing {
        self.outbound.framing()
    }

    fn append_field(&mut self, value: &[u8]) -> Result<()> {
        self.outbound.append_field(value)
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.outbound.append_raw(bytes)
    }
}

impl FieldReader for Context {
    fn parse_target(&mut self) -> Result<&mut Message> {
        self.current.as_mut().ok_or(Error::NoMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageTag;
    use std::io::Write;

    fn context_pair(limits: BufferLimits) -> (Context, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        net::set_nonblocking(a.as_raw_fd(), true).unwrap();
        (Context::new(a, Framing::default(), limits).unwrap(), b)
    }

    #[test]
    fn test_partial_frame_not_extracted() {
        let (mut ctx, mut peer) = context_pair(BufferLimits::default());
        peer.write_all(b"N\tGetName\t1\t2\t3\t$$$").unwrap();
        ctx.pull_from_socket().unwrap();
        assert!(ctx.extract_message().is_none());

        peer.write_all(b"$$$").unwrap();
        ctx.pull_from_socket().unwrap();
        let msg = ctx.extract_message().unwrap();
        assert_eq!(msg.as_bytes(), b"N\tGetName\t1\t2\t3\t$$$$$$");
        assert!(ctx.inbound().buffer().is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let (mut ctx, mut peer) = context_pair(BufferLimits::default());
        peer.write_all(b"N\t0\t$$$$$$C\t107\t100\t$$$$$$N\t1").unwrap();
        ctx.pull_from_socket().unwrap();

        let first = ctx.extract_message().unwrap();
        assert_eq!(first.tag(), Some(MessageTag::Normal));
        assert_eq!(first.len(), 10);

        let second = ctx.extract_message().unwrap();
        assert_eq!(second.tag(), Some(MessageTag::Callback));

        assert!(ctx.extract_message().is_none());
        assert_eq!(ctx.inbound().buffer().pending(), b"N\t1");
    }

    #[test]
    fn test_pull_grows_read_buffer() {
        let (mut ctx, mut peer) = context_pair(BufferLimits::new(16, 4096));
        let payload = vec![b'a'; 1000];
        peer.write_all(&payload).unwrap();
        peer.write_all(b"\t$$$$$$").unwrap();

        let n = ctx.pull_from_socket().unwrap();
        assert_eq!(n, 1007);
        assert!(ctx.inbound().buffer().capacity() >= 1007);
        assert_eq!(ctx.extract_message().unwrap().len(), 1007);
    }

    #[test]
    fn test_oversized_frame_fails() {
        let (mut ctx, mut peer) = context_pair(BufferLimits::new(16, 32));
        peer.write_all(&[b'x'; 64]).unwrap();
        assert_eq!(ctx.pull_from_socket().unwrap(), 32);
        assert!(matches!(
            ctx.pull_from_socket(),
            Err(Error::CapacityExceeded { max: 32, .. })
        ));
    }

    #[test]
    fn test_pull_peer_closed() {
        let (mut ctx, peer) = context_pair(BufferLimits::default());
        drop(peer);
        assert!(matches!(ctx.pull_from_socket(), Err(Error::PeerClosed)));
    }

    #[test]
    fn test_write_and_flush() {
        let (mut ctx, mut peer) = context_pair(BufferLimits::default());
        ctx.write_begin(MessageTag::Normal).unwrap();
        ctx.write_func("Ping").unwrap();
        ctx.write_int(7).unwrap();
        ctx.write_end().unwrap();
        assert_eq!(ctx.write_pending(), 15);

        assert_eq!(ctx.flush_write().unwrap(), 0);
        let mut buf = [0u8; 15];
        std::io::Read::read_exact(&mut peer, &mut buf).unwrap();
        assert_eq!(&buf, b"N\tPing\t7\t$$$$$$");
    }

    #[test]
    fn test_append_over_limit_keeps_buffer() {
        let (mut ctx, _peer) = context_pair(BufferLimits::new(8, 16));
        ctx.append_to_write(b"0123456789").unwrap();
        assert!(ctx.append_to_write(b"0123456789").is_err());
        assert_eq!(ctx.outbound().buffer().pending(), b"0123456789");
        // Field yang tidak muat tidak meninggalkan bytes parsial
        assert!(ctx.write_str("abcdef").is_err());
        assert_eq!(ctx.write_pending(), 10);
    }

    #[test]
    fn test_truncate_write_to_mark() {
        let (mut ctx, _peer) = context_pair(BufferLimits::default());
        ctx.write_begin(MessageTag::Normal).unwrap();
        let mark = ctx.write_mark();
        ctx.write_str("partial").unwrap();
        ctx.truncate_write(mark);
        assert_eq!(ctx.outbound().buffer().pending(), b"N\t");
    }

    #[test]
    fn test_install_and_decode() {
        let (mut ctx, _peer) = context_pair(BufferLimits::default());
        assert!(matches!(ctx.read_int(), Err(Error::NoMessage)));

        ctx.install(Message::new(b"N\t42\t$$$$$$".to_vec(), b'\t', 6));
        assert_eq!(ctx.read_int().unwrap(), 42);
        assert!(ctx.release_current().is_some());
        assert!(ctx.current().is_none());
    }
}

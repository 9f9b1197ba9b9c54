//! RPC Client: synchronous call + asynchronous callback di satu socket
//!
//! Satu reader thread per koneksi terus men-drain socket, memisahkan frame
//! menjadi reply (`N`) dan callback (`C`). Reply diserahkan ke caller yang
//! sedang menunggu di `CallGuard::call`; callback dijalankan di reader
//! thread, tapi hanya setelah reply yang masih dipegang caller dilepas.
//!
//! State koordinasi:
//! ```text
//! Idle ──reply──> DeliveringReply ──read_end──> Idle
//!   └──────────────────┴──fatal I/O / stop──> Closed
//! ```

use std::collections::HashMap;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::net::{self, Direction, Readiness};
use crate::config::{ClientConfig, Framing};
use crate::core::{Context, Inbound, Outbound};
use crate::error::{Error, Result};
use crate::protocol::{FieldReader, FieldWriter, Message};

/// Handler untuk callback yang di-push server.
///
/// Dipanggil di reader thread; cursor pesan sudah di field pertama setelah tag.
pub trait CallbackHandler: Send + 'static {
    fn on_callback(&mut self, msg: &mut Message);
}

impl<F> CallbackHandler for F
where
    F: FnMut(&mut Message) + Send + 'static,
{
    fn on_callback(&mut self, msg: &mut Message) {
        self(msg)
    }
}

type EventHandler = Box<dyn FnMut(&mut Message) + Send>;

/// Routing callback berdasarkan event id (field pertama setelah tag)
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<i32, EventHandler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `register`
    pub fn on<F>(mut self, event: i32, handler: F) -> Self
    where
        F: FnMut(&mut Message) + Send + 'static,
    {
        self.register(event, handler);
        self
    }

    /// Handler lama untuk event yang sama diganti
    pub fn register<F>(&mut self, event: i32, handler: F)
    where
        F: FnMut(&mut Message) + Send + 'static,
    {
        self.handlers.insert(event, Box::new(handler));
    }

    pub fn unregister(&mut self, event: i32) -> bool {
        self.handlers.remove(&event).is_some()
    }

    pub fn events(&self) -> Vec<i32> {
        let mut events: Vec<i32> = self.handlers.keys().copied().collect();
        events.sort_unstable();
        events
    }
}

impl CallbackHandler for EventDispatcher {
    fn on_callback(&mut self, msg: &mut Message) {
        let event = match msg.read_int() {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "callback without a valid event id");
                return;
            }
        };
        match self.handlers.get_mut(&event) {
            Some(handler) => handler(msg),
            None => debug!(event, "no handler registered for callback event"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Idle,
    DeliveringReply,
    Closed,
}

struct Coordination {
    state: ReplyState,
    /// Reply yang sudah diterima tapi belum diambil caller
    reply: Option<Message>,
}

struct Shared {
    coord: Mutex<Coordination>,
    cond: Condvar,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Coordination> {
        self.coord.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline(always)]
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn close(&self) {
        let mut coord = self.lock();
        coord.state = ReplyState::Closed;
        self.cond.notify_all();
    }

    /// Tunggu sampai reply sebelumnya dilepas. `false` jika client di-stop.
    fn wait_reply_drained<'a>(
        &self,
        guard: MutexGuard<'a, Coordination>,
    ) -> (MutexGuard<'a, Coordination>, bool) {
        let guard = self
            .cond
            .wait_while(guard, |c| {
                c.state == ReplyState::DeliveringReply && self.is_running()
            })
            .unwrap_or_else(PoisonError::into_inner);
        let running = self.is_running();
        (guard, running)
    }
}

/// Sisi caller: write buffer + reply yang sedang di-decode
struct CallSide {
    outbound: Outbound,
    reply: Option<Message>,
}

pub struct RpcClient {
    shared: Arc<Shared>,
    call_side: Mutex<CallSide>,
    reader: Option<JoinHandle<()>>,
    poll_timeout: Duration,
}

impl RpcClient {
    /// Connect ke `config.socket_path` dan start reader thread
    pub fn connect<H: CallbackHandler>(config: &ClientConfig, handler: H) -> Result<Self> {
        let stream = net::connect_unix(&config.socket_path)?;
        info!(path = %config.socket_path.display(), "rpc client connected");
        Self::from_stream(stream, config, handler)
    }

    /// Pakai socket yang sudah terhubung; `config.socket_path` diabaikan
    pub fn from_stream<H: CallbackHandler>(
        stream: UnixStream,
        config: &ClientConfig,
        handler: H,
    ) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let context = Context::new(stream, config.framing.clone(), config.limits)?;
        let (inbound, outbound) = context.into_parts();

        let shared = Arc::new(Shared {
            coord: Mutex::new(Coordination {
                state: ReplyState::Idle,
                reply: None,
            }),
            cond: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let reader = {
            let shared = Arc::clone(&shared);
            let poll_timeout = config.poll_timeout;
            thread::Builder::new()
                .name("rpc-reader".into())
                .spawn(move || reader_loop(inbound, handler, shared, poll_timeout))?
        };

        Ok(Self {
            shared,
            call_side: Mutex::new(CallSide {
                outbound,
                reply: None,
            }),
            reader: Some(reader),
            poll_timeout: config.poll_timeout,
        })
    }

    /// Ambil exclusive call lock.
    ///
    /// Build request, `call`, dan decode reply harus terjadi di guard yang sama.
    pub fn lock(&self) -> CallGuard<'_> {
        let side = self.call_side.lock().unwrap_or_else(PoisonError::into_inner);
        CallGuard {
            client: self,
            side,
            awaiting_end: false,
        }
    }

    pub fn state(&self) -> ReplyState {
        self.shared.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ReplyState::Closed
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        {
            let _coord = self.shared.lock();
            self.shared.cond.notify_all();
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("rpc reader thread panicked");
            }
        }
    }
}

/// Exclusive call lock; drop melepas lock dan reply yang belum di-`read_end`
pub struct CallGuard<'a> {
    client: &'a RpcClient,
    side: MutexGuard<'a, CallSide>,
    awaiting_end: bool,
}

impl CallGuard<'_> {
    /// Kirim request yang sudah di-build dan tunggu reply-nya.
    ///
    /// Sukses = reply terpasang sebagai parse target guard ini.
    pub fn call(&mut self) -> Result<()> {
        if self.awaiting_end {
            self.read_end();
        }

        let client = self.client;
        let shared = &client.shared;
        {
            let mut coord = shared.lock();
            if let Some(stale) = coord.reply.take() {
                warn!(len = stale.len(), "dropping reply that arrived without a pending call");
                if coord.state == ReplyState::DeliveringReply {
                    coord.state = ReplyState::Idle;
                }
                shared.cond.notify_all();
            }
            if coord.state == ReplyState::Closed {
                self.side.outbound.clear_write();
                return Err(Error::Closed);
            }
        }

        if let Err(e) = self.flush_all() {
            self.side.outbound.clear_write();
            return Err(e);
        }

        let mut coord = shared.lock();
        loop {
            if let Some(mut reply) = coord.reply.take() {
                drop(coord);
                reply.reset_cursor();
                self.side.reply = Some(reply);
                self.awaiting_end = true;
                return Ok(());
            }
            if coord.state == ReplyState::Closed {
                return Err(Error::Closed);
            }
            coord = shared
                .cond
                .wait(coord)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn flush_all(&mut self) -> Result<()> {
        loop {
            if self.side.outbound.flush_write()? == 0 {
                return Ok(());
            }
            if self.client.is_closed() {
                return Err(Error::Closed);
            }
            let fd = self.side.outbound.fd();
            net::wait_ready(fd, Direction::Write, self.client.poll_timeout)?;
        }
    }

    /// Lepas reply dan kembalikan state ke `Idle`
    pub fn read_end(&mut self) {
        self.side.reply = None;
        self.awaiting_end = false;

        let shared = &self.client.shared;
        let mut coord = shared.lock();
        if coord.state == ReplyState::DeliveringReply {
            coord.state = ReplyState::Idle;
        }
        shared.cond.notify_all();
    }

    /// Reply yang sedang di-decode
    pub fn reply(&self) -> Option<&Message> {
        self.side.reply.as_ref()
    }
}

impl FieldWriter for CallGuard<'_> {
    fn framing(&self) -> &Framing {
        self.side.outbound.framing()
    }

    fn append_field(&mut self, value: &[u8]) -> Result<()> {
        self.side.outbound.append_field(value)
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.side.outbound.append_raw(bytes)
    }
}

impl FieldReader for CallGuard<'_> {
    fn parse_target(&mut self) -> Result<&mut Message> {
        self.side.reply.as_mut().ok_or(Error::NoMessage)
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.side.outbound.write_pending() > 0 {
            debug!(
                bytes = self.side.outbound.write_pending(),
                "discarding request that was never sent"
            );
            self.side.outbound.clear_write();
        }
        if self.awaiting_end {
            self.read_end();
        }
    }
}

fn reader_loop<H: CallbackHandler>(
    mut inbound: Inbound,
    mut handler: H,
    shared: Arc<Shared>,
    poll_timeout: Duration,
) {
    let fd = inbound.fd();
    debug!(fd, "rpc reader started");
    // Closed juga saat handler panic
    let _closing = CloseOnExit(&shared);

    'read: while shared.is_running() {
        match net::wait_ready(fd, Direction::Read, poll_timeout) {
            Ok(Readiness::TimedOut) => continue,
            Ok(Readiness::Ready) => {}
            Err(e) => {
                warn!(fd, error = %e, "readiness wait failed");
                break;
            }
        }

        let pulled = inbound.pull_from_socket();

        // Frame lengkap tetap di-dispatch walaupun read terakhir gagal
        while let Some(msg) = inbound.extract_message() {
            if !dispatch(&shared, &mut handler, msg) {
                break 'read;
            }
        }

        match pulled {
            Ok(_) => {}
            Err(Error::PeerClosed) => {
                info!(fd, "rpc server closed the connection");
                break;
            }
            Err(e) => {
                warn!(fd, error = %e, "rpc read failed");
                break;
            }
        }
    }

    debug!(fd, "rpc reader stopped");
}

struct CloseOnExit<'a>(&'a Shared);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Returns `false` jika client di-stop saat menunggu
fn dispatch<H: CallbackHandler>(shared: &Shared, handler: &mut H, mut msg: Message) -> bool {
    let coord = shared.lock();
    let (mut coord, running) = shared.wait_reply_drained(coord);
    if !running {
        return false;
    }

    if msg.is_reply() {
        coord.reply = Some(msg);
        coord.state = ReplyState::DeliveringReply;
        shared.cond.notify_all();
        return true;
    }

    // Callback: jalankan tanpa memegang lock koordinasi
    drop(coord);
    msg.reset_cursor();
    handler.on_callback(&mut msg);
    true
}

//! RPC Server dengan event-driven I/O
//!
//! Satu thread menjalankan `EventLoop`: accept client, pull frame, panggil
//! function dari tabel berdasarkan nama, lalu flush reply. Event callback
//! yang di-queue lewat `ServerHandle::emit` dikirim ke semua client yang
//! subscribe di antara iterasi loop.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::ops::Range;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info, warn};

use super::event_loop::{EventLoop, EventMask, StopHandle};
use super::net;
use crate::config::ServerConfig;
use crate::core::{Context, HashTable};
use crate::error::{Error, Result};
use crate::protocol::{Field, FieldReader, FieldWriter, FrameEncoder, MessageTag};

pub const REGISTER_EVENT_CALLBACK: &str = "RegisterEventCallback";
pub const UNREGISTER_EVENT_CALLBACK: &str = "UnRegisterEventCallback";

const UNSUPPORTED_FUNCTION: &str = "unsupport function";
const HANDLER_FAILED: &str = "server deal failed!";

/// Function yang bisa dipanggil client.
///
/// Argumen dibaca dari request yang terpasang di `ctx`; function wajib
/// menulis satu reply frame lengkap. `Err` = reply parsial dibuang dan
/// server membalas dengan status gagal.
pub trait RpcFunction: Send + 'static {
    fn call(&mut self, ctx: &mut Context) -> Result<()>;
}

impl<F> RpcFunction for F
where
    F: FnMut(&mut Context) -> Result<()> + Send + 'static,
{
    fn call(&mut self, ctx: &mut Context) -> Result<()> {
        self(ctx)
    }
}

/// Event yang di-push ke subscriber: `C<sep>id<sep>fields...<term>`
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub id: i32,
    pub fields: Vec<Field>,
}

impl CallbackEvent {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, field: impl Into<Field>) -> Self {
        self.fields.push(field.into());
        self
    }
}

/// Kontrol server dari thread lain
#[derive(Debug, Clone)]
pub struct ServerHandle {
    stop: StopHandle,
    events: Sender<CallbackEvent>,
    event_range: Option<Range<i32>>,
}

impl ServerHandle {
    /// Loop berhenti di iterasi berikutnya (paling lama satu `poll_timeout`)
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Queue event untuk dikirim ke subscriber.
    ///
    /// Id di luar `ServerConfig::event_range` ditolak dengan `InvalidEvent`.
    pub fn emit(&self, event: CallbackEvent) -> Result<()> {
        if let Some(range) = &self.event_range {
            if !range.contains(&event.id) {
                return Err(Error::InvalidEvent(event.id));
            }
        }
        self.events.send(event).map_err(|_| Error::Closed)
    }
}

/// Function table + subscription per event
#[derive(Default)]
struct Registry {
    functions: HashMap<String, Box<dyn RpcFunction>>,
    subscribers: HashMap<i32, BTreeSet<RawFd>>,
}

impl Registry {
    /// Dispatch request yang terpasang di `ctx`.
    ///
    /// Request tanpa nama function yang valid tetap dibalas `unsupport function`
    /// supaya caller tidak menunggu reply yang tidak pernah datang.
    fn transact(&mut self, ctx: &mut Context) {
        let fd = ctx.fd();
        let tag = ctx.current().and_then(|m| m.tag_byte());
        if tag != Some(MessageTag::Normal.as_byte()) {
            warn!(fd, tag = ?tag.map(char::from), "dropping frame with unexpected tag");
            return;
        }

        let mark = ctx.write_mark();
        let name = match ctx.read_func() {
            Ok(name) => name,
            Err(e) => {
                debug!(fd, error = %e, "request without function name");
                write_status(ctx, mark, -1, Some(UNSUPPORTED_FUNCTION));
                return;
            }
        };

        let result = match name.as_str() {
            REGISTER_EVENT_CALLBACK => self.update_subscriptions(ctx, true),
            UNREGISTER_EVENT_CALLBACK => self.update_subscriptions(ctx, false),
            _ => match self.functions.get_mut(&name) {
                Some(function) => function.call(ctx),
                None => {
                    warn!(fd, function = %name, "unsupported function");
                    write_status(ctx, mark, -1, Some(UNSUPPORTED_FUNCTION));
                    return;
                }
            },
        };

        if let Err(e) = result {
            warn!(fd, function = %name, error = %e, "rpc function failed");
            write_status(ctx, mark, -1, Some(HANDLER_FAILED));
        }
    }

    /// Argumen: `count, id×count`
    fn update_subscriptions(&mut self, ctx: &mut Context, subscribe: bool) -> Result<()> {
        let fd = ctx.fd();
        let count = ctx.read_int()?;
        let mut ids = Vec::with_capacity(count.clamp(0, 64) as usize);
        for _ in 0..count.max(0) {
            ids.push(ctx.read_int()?);
        }

        for id in ids {
            if subscribe {
                self.subscribers.entry(id).or_default().insert(fd);
            } else if let Some(fds) = self.subscribers.get_mut(&id) {
                fds.remove(&fd);
                if fds.is_empty() {
                    self.subscribers.remove(&id);
                }
            }
        }
        debug!(fd, subscribe, count, "event subscriptions updated");

        ctx.write_begin(MessageTag::Normal)?;
        ctx.write_int(0)?;
        ctx.write_end()
    }

    fn forget_client(&mut self, fd: RawFd) {
        self.subscribers.retain(|_, fds| {
            fds.remove(&fd);
            !fds.is_empty()
        });
    }

    fn subscribers_of(&self, event: i32) -> Vec<RawFd> {
        self.subscribers
            .get(&event)
            .map(|fds| fds.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Buang reply parsial lalu tulis `N<sep>code<sep>[text<sep>]<term>`
fn write_status(ctx: &mut Context, mark: usize, code: i32, text: Option<&str>) {
    ctx.truncate_write(mark);
    if let Err(e) = queue_status(ctx, code, text) {
        warn!(fd = ctx.fd(), error = %e, "failed to queue status reply");
        ctx.truncate_write(mark);
    }
}

fn queue_status(ctx: &mut Context, code: i32, text: Option<&str>) -> Result<()> {
    ctx.write_begin(MessageTag::Normal)?;
    ctx.write_int(code)?;
    if let Some(text) = text {
        ctx.write_str(text)?;
    }
    ctx.write_end()
}

pub struct RpcServer {
    config: ServerConfig,
    listener: UnixListener,
    event_loop: EventLoop,
    clients: HashTable,
    registry: Registry,
    events_tx: Sender<CallbackEvent>,
    events_rx: Receiver<CallbackEvent>,
}

impl RpcServer {
    /// Listen di `config.socket_path` dan daftarkan listener ke event loop
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let listener = net::create_unix_server(&config.socket_path, config.backlog)?;
        let mut event_loop = EventLoop::new(config.event_loop_size)?;
        event_loop.add_interest(listener.as_raw_fd(), EventMask::READABLE)?;
        let (events_tx, events_rx) = mpsc::channel();

        info!(path = %config.socket_path.display(), "rpc server listening");
        Ok(Self {
            clients: HashTable::new(config.max_clients.max(1)),
            config,
            listener,
            event_loop,
            registry: Registry::default(),
            events_tx,
            events_rx,
        })
    }

    /// Daftarkan function; nama yang sama menggantikan yang lama
    pub fn register<F: RpcFunction>(&mut self, name: &str, function: F) {
        if self
            .registry
            .functions
            .insert(name.to_owned(), Box::new(function))
            .is_some()
        {
            debug!(function = name, "rpc function replaced");
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop: self.event_loop.stop_handle(),
            events: self.events_tx.clone(),
            event_range: self.config.event_range.clone(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Jalankan event loop sampai `ServerHandle::stop`
    pub fn run(&mut self) -> Result<()> {
        let listen_fd = self.listener.as_raw_fd();

        while !self.event_loop.is_stopped() {
            let fired = self.event_loop.poll(Some(self.config.poll_timeout))?;
            for event in fired {
                if event.fd == listen_fd {
                    self.accept_clients();
                    continue;
                }
                if event.mask.contains(EventMask::READABLE) {
                    self.handle_readable(event.fd);
                }
                if event.mask.contains(EventMask::WRITABLE) {
                    self.flush_client(event.fd);
                }
            }
            self.drain_events();
        }

        for fd in self.clients.fds() {
            self.close_client(fd);
        }
        info!("rpc server stopped");
        Ok(())
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => self.admit(stream),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: UnixStream) {
        let fd = stream.as_raw_fd();
        if self.clients.len() >= self.config.max_clients {
            warn!(fd, max = self.config.max_clients, "max clients reached, rejecting");
            return;
        }
        if let Err(e) = net::set_nonblocking(fd, true) {
            warn!(fd, error = %e, "failed to set client non-blocking");
            return;
        }

        let ctx = match Context::new(stream, self.config.framing.clone(), self.config.limits) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(fd, error = %e, "failed to create client context");
                return;
            }
        };
        if let Err(e) = self.event_loop.add_interest(fd, EventMask::READABLE) {
            warn!(fd, error = %e, "rejecting client");
            return;
        }
        if self.clients.insert(ctx).is_err() {
            warn!(fd, "descriptor already registered");
            return;
        }
        info!(fd, clients = self.clients.len(), "client connected");
    }

    fn handle_readable(&mut self, fd: RawFd) {
        // Edge-triggered: baca sampai socket kosong
        loop {
            let Some(ctx) = self.clients.find(fd) else {
                return;
            };
            let pulled = ctx.pull_from_socket();

            while let Some(msg) = ctx.extract_message() {
                ctx.install(msg);
                self.registry.transact(ctx);
                ctx.release_current();
            }

            match pulled {
                Ok(0) => break,
                Ok(_) => continue,
                Err(Error::PeerClosed) => {
                    self.close_client(fd);
                    return;
                }
                Err(e) => {
                    warn!(fd, error = %e, "read failed, closing client");
                    self.close_client(fd);
                    return;
                }
            }
        }
        self.flush_client(fd);
    }

    /// Flush write buffer; WRITABLE di-arm selama masih ada sisa
    fn flush_client(&mut self, fd: RawFd) {
        let Some(ctx) = self.clients.find(fd) else {
            return;
        };
        let armed = self.event_loop.interest(fd).contains(EventMask::WRITABLE);

        let result = match ctx.flush_write() {
            Ok(0) if armed => self.event_loop.remove_interest(fd, EventMask::WRITABLE),
            Ok(0) => Ok(()),
            Ok(_) if armed => Ok(()),
            Ok(_) => self.event_loop.add_interest(fd, EventMask::WRITABLE),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if !matches!(e, Error::PeerClosed) {
                warn!(fd, error = %e, "write failed, closing client");
            }
            self.close_client(fd);
        }
    }

    fn close_client(&mut self, fd: RawFd) {
        if let Err(e) = self.event_loop.remove_interest(fd, EventMask::all()) {
            debug!(fd, error = %e, "failed to remove interest");
        }
        self.registry.forget_client(fd);
        if self.clients.delete(fd).is_some() {
            info!(fd, clients = self.clients.len(), "client disconnected");
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.broadcast(&event);
        }
    }

    fn broadcast(&mut self, event: &CallbackEvent) {
        let fds = self.registry.subscribers_of(event.id);
        if fds.is_empty() {
            debug!(event = event.id, "no subscribers for event");
            return;
        }

        let mut encoder = FrameEncoder::new(self.config.framing.clone());
        if let Err(e) = encode_event(&mut encoder, event) {
            warn!(event = event.id, error = %e, "failed to encode callback");
            return;
        }

        for fd in fds {
            let Some(ctx) = self.clients.find(fd) else {
                continue;
            };
            if let Err(e) = ctx.append_to_write(encoder.as_bytes()) {
                warn!(fd, event = event.id, error = %e, "callback dropped, client buffer full");
                continue;
            }
            self.flush_client(fd);
        }
    }
}

fn encode_event(encoder: &mut FrameEncoder, event: &CallbackEvent) -> Result<()> {
    encoder.write_begin(MessageTag::Callback)?;
    encoder.write_int(event.id)?;
    for field in &event.fields {
        encoder.write_field(field)?;
    }
    encoder.write_end()
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
            debug!(error = %e, "failed to remove socket file");
        }
    }
}

//! Network Layer: Unix-domain socket, readiness multiplexing, RPC endpoints
//!
//! - `net`: read/write partial, readiness wait, listen/connect
//! - `event_loop`: interest per descriptor di atas mio (epoll)
//! - `client`: synchronous call + callback dispatch via reader thread
//! - `server`: function table + event push ke subscriber

pub mod client;
pub mod event_loop;
pub mod net;
pub mod server;

pub use client::{CallGuard, CallbackHandler, EventDispatcher, ReplyState, RpcClient};
pub use event_loop::{EventLoop, EventMask, FiredEvent, StopHandle};
pub use server::{CallbackEvent, RpcFunction, RpcServer, ServerHandle};

//! Konfigurasi client dan server
//!
//! Semua nilai punya default yang cocok dengan daemon Wi-Fi HAL.

use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

/// Socket path default yang dipakai HAL daemon dan Wi-Fi manager
pub const DEFAULT_SOCKET_PATH: &str = "/data/misc/wifi/unix_sock.sock";
/// Environment variable untuk override socket path di binaries
pub const SOCKET_PATH_ENV: &str = "WIFI_RPC_SOCKET";

pub const MIN_BUFFER_SIZE: usize = 1024; // 1KB
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024; // 1MB

pub const DEFAULT_SEPARATOR: u8 = b'\t';
pub const DEFAULT_TERMINATOR: &[u8] = b"$$$$$$";

/// Separator field dan terminator pesan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    pub separator: u8,
    pub terminator: Vec<u8>,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            terminator: DEFAULT_TERMINATOR.to_vec(),
        }
    }
}

impl Framing {
    pub fn new(separator: u8, terminator: &[u8]) -> Self {
        Self {
            separator,
            terminator: terminator.to_vec(),
        }
    }

    /// Apakah `value` aman ditulis sebagai satu field
    pub fn is_clean(&self, value: &[u8]) -> bool {
        if value.contains(&self.separator) {
            return false;
        }
        let term = self.terminator.as_slice();
        term.is_empty() || !value.windows(term.len()).any(|w| w == term)
    }
}

/// Batas kapasitas buffer read/write per koneksi
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            min: MIN_BUFFER_SIZE,
            max: MAX_BUFFER_SIZE,
        }
    }
}

impl BufferLimits {
    /// `min` di-clamp ke minimal 1 dan tidak boleh melebihi `max`
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        Self {
            min,
            max: max.max(min),
        }
    }
}

fn socket_path_from_env() -> PathBuf {
    std::env::var_os(SOCKET_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    pub framing: Framing,
    pub limits: BufferLimits,
    /// Readiness timeout reader thread; menentukan seberapa cepat stop terdeteksi
    pub poll_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            framing: Framing::default(),
            limits: BufferLimits::default(),
            poll_timeout: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    /// Default config dengan socket path dari `WIFI_RPC_SOCKET` jika ada
    pub fn from_env() -> Self {
        Self {
            socket_path: socket_path_from_env(),
            ..Self::default()
        }
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_limits(mut self, limits: BufferLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub framing: Framing,
    pub limits: BufferLimits,
    pub backlog: i32,
    pub max_clients: usize,
    /// Ukuran tabel descriptor event loop; fd >= nilai ini ditolak
    pub event_loop_size: usize,
    pub poll_timeout: Duration,
    /// Event id yang boleh di-`emit`; `None` = tidak divalidasi
    pub event_range: Option<Range<i32>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            framing: Framing::default(),
            limits: BufferLimits::default(),
            backlog: 10,
            max_clients: 64,
            event_loop_size: 1024,
            poll_timeout: Duration::from_millis(100),
            event_range: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            socket_path: socket_path_from_env(),
            ..Self::default()
        }
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_limits(mut self, limits: BufferLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_event_range(mut self, range: Range<i32>) -> Self {
        self.event_range = Some(range);
        self
    }
}

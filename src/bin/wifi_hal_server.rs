//! Demo Wi-Fi HAL daemon
//!
//! Menyediakan beberapa function sederhana dan mem-push event scan/connection
//! ke client yang subscribe.
//!
//! Usage:
//!   cargo run --release --bin wifi_hal_server -- [OPTIONS]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{info, Level};

use wifi_rpc::config::ServerConfig;
use wifi_rpc::core::Context;
use wifi_rpc::network::{CallbackEvent, RpcServer, ServerHandle};
use wifi_rpc::protocol::{FieldReader, FieldWriter, MessageTag};
use wifi_rpc::Result;

const EVENT_SCAN_DONE: i32 = 107;
const EVENT_CONNECTION_CHANGED: i32 = 108;

struct Options {
    socket_path: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        socket_path: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--socket" | "-s" => {
                if i + 1 < args.len() {
                    options.socket_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--help" => {
                println!("Wi-Fi HAL RPC server (demo)\n");
                println!("Usage: wifi_hal_server [OPTIONS]\n");
                println!("Options:");
                println!("  -s, --socket <PATH>    Socket path (default: $WIFI_RPC_SOCKET or /data/misc/wifi/unix_sock.sock)");
                println!("  -v, --verbose          Debug logging");
                println!("      --help             Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    options
}

/// State radio palsu yang dibagi antar function
#[derive(Default)]
struct Radio {
    connected_network: Option<i32>,
    scans: u32,
}

fn reply_ok(ctx: &mut Context) -> Result<()> {
    ctx.write_begin(MessageTag::Normal)?;
    ctx.write_int(0)?;
    ctx.write_end()
}

fn register_functions(server: &mut RpcServer, handle: ServerHandle) {
    let radio = Arc::new(Mutex::new(Radio::default()));

    server.register("GetName", |ctx: &mut Context| -> Result<()> {
        let _size = ctx.read_int()?;
        ctx.write_begin(MessageTag::Normal)?;
        ctx.write_int(0)?;
        ctx.write_str("wlan0")?;
        ctx.write_end()
    });

    server.register("GetMacAddress", |ctx: &mut Context| -> Result<()> {
        ctx.write_begin(MessageTag::Normal)?;
        ctx.write_int(0)?;
        ctx.write_bytes(&[0x02, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e])?;
        ctx.write_end()
    });

    {
        let radio = Arc::clone(&radio);
        let handle = handle.clone();
        server.register("StartScan", move |ctx: &mut Context| -> Result<()> {
            let scans = {
                let mut radio = radio.lock().unwrap_or_else(|e| e.into_inner());
                radio.scans += 1;
                radio.scans
            };
            reply_ok(ctx)?;
            // Event terkirim setelah reply karena queue di-drain di akhir iterasi
            handle.emit(CallbackEvent::new(EVENT_SCAN_DONE).with(scans as i32))
        });
    }

    server.register("GetScanInfos", |ctx: &mut Context| -> Result<()> {
        let max = ctx.read_int()?;
        let networks = [("home-ap", -42, 2412), ("office", -67, 5180)];
        let count = networks.len().min(max.max(0) as usize);

        ctx.write_begin(MessageTag::Normal)?;
        ctx.write_int(0)?;
        ctx.write_int(count as i32)?;
        for (ssid, rssi, freq) in networks.iter().take(count) {
            ctx.write_str(ssid)?;
            ctx.write_int(*rssi)?;
            ctx.write_int(*freq)?;
        }
        ctx.write_end()
    });

    {
        let radio = Arc::clone(&radio);
        let handle = handle.clone();
        server.register("Connect", move |ctx: &mut Context| -> Result<()> {
            let network_id = ctx.read_int()?;
            radio
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .connected_network = Some(network_id);
            reply_ok(ctx)?;
            handle.emit(
                CallbackEvent::new(EVENT_CONNECTION_CHANGED)
                    .with(network_id)
                    .with("connected"),
            )
        });
    }

    {
        let radio = Arc::clone(&radio);
        server.register("Disconnect", move |ctx: &mut Context| -> Result<()> {
            let previous = radio
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .connected_network
                .take();
            reply_ok(ctx)?;
            match previous {
                Some(id) => handle.emit(
                    CallbackEvent::new(EVENT_CONNECTION_CHANGED)
                        .with(id)
                        .with("disconnected"),
                ),
                None => Ok(()),
            }
        });
    }
}

fn main() {
    let options = parse_args();
    let level = if options.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = ServerConfig::from_env();
    if let Some(path) = options.socket_path {
        config = config.with_socket_path(path);
    }

    println!("📡 Wi-Fi HAL RPC server (demo)");
    println!("   Socket: {}", config.socket_path.display());

    let mut server = match RpcServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("❌ Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    let handle = server.handle();
    register_functions(&mut server, handle);

    info!("serving requests, Ctrl-C to quit");
    if let Err(e) = server.run() {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}

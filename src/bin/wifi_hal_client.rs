//! Demo Wi-Fi manager client
//!
//! Subscribe ke event scan/connection, lalu menjalankan beberapa call
//! ke `wifi_hal_server` dan mencetak hasilnya.
//!
//! Usage:
//!   cargo run --release --bin wifi_hal_client -- [OPTIONS]

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{warn, Level};

use wifi_rpc::config::ClientConfig;
use wifi_rpc::network::{EventDispatcher, RpcClient};
use wifi_rpc::protocol::{FieldReader, FieldWriter, Message, MessageTag};
use wifi_rpc::Result;

const EVENT_SCAN_DONE: i32 = 107;
const EVENT_CONNECTION_CHANGED: i32 = 108;

struct Options {
    socket_path: Option<PathBuf>,
    network_id: i32,
    verbose: bool,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        socket_path: None,
        network_id: 1,
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
            "--network" | "-n" => {
                if i + 1 < args.len() {
                    options.network_id = args[i + 1].parse().unwrap_or(1);
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--help" => {
                println!("Wi-Fi manager RPC client (demo)\n");
                println!("Usage: wifi_hal_client [OPTIONS]\n");
                println!("Options:");
                println!("  -s, --socket <PATH>    Socket path (default: $WIFI_RPC_SOCKET or /data/misc/wifi/unix_sock.sock)");
                println!("  -n, --network <ID>     Network id untuk Connect (default: 1)");
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

fn dispatcher() -> EventDispatcher {
    EventDispatcher::new()
        .on(EVENT_SCAN_DONE, |msg: &mut Message| match msg.read_int() {
            Ok(scans) => println!("   🔔 scan done (#{})", scans),
            Err(e) => warn!(error = %e, "malformed scan event"),
        })
        .on(EVENT_CONNECTION_CHANGED, |msg: &mut Message| {
            match (msg.read_int(), msg.read_str()) {
                (Ok(id), Ok(state)) => println!("   🔔 network {} {}", id, state),
                _ => warn!("malformed connection event"),
            }
        })
}

/// Call dengan argumen int yang reply-nya hanya status
fn call_status(client: &RpcClient, func: &str, args: &[i32]) -> Result<i32> {
    let mut guard = client.lock();
    guard.write_begin(MessageTag::Normal)?;
    guard.write_func(func)?;
    for arg in args {
        guard.write_int(*arg)?;
    }
    guard.write_end()?;
    guard.call()?;
    let status = guard.read_int()?;
    guard.read_end();
    Ok(status)
}

fn run(client: &RpcClient, network_id: i32) -> Result<()> {
    let status = call_status(
        client,
        "RegisterEventCallback",
        &[2, EVENT_SCAN_DONE, EVENT_CONNECTION_CHANGED],
    )?;
    println!("   RegisterEventCallback -> {}", status);

    {
        let mut guard = client.lock();
        guard.write_begin(MessageTag::Normal)?;
        guard.write_func("GetName")?;
        guard.write_int(64)?;
        guard.write_end()?;
        guard.call()?;
        let status = guard.read_int()?;
        let name = guard.read_str()?;
        println!("   GetName -> {} {:?}", status, name);
    }

    {
        let mut guard = client.lock();
        guard.write_begin(MessageTag::Normal)?;
        guard.write_func("GetMacAddress")?;
        guard.write_end()?;
        guard.call()?;
        let status = guard.read_int()?;
        let mac = guard.read_bytes()?;
        let mac: Vec<String> = mac.iter().map(|b| format!("{:02x}", b)).collect();
        println!("   GetMacAddress -> {} {}", status, mac.join(":"));
    }

    println!("   StartScan -> {}", call_status(client, "StartScan", &[])?);

    {
        let mut guard = client.lock();
        guard.write_begin(MessageTag::Normal)?;
        guard.write_func("GetScanInfos")?;
        guard.write_int(16)?;
        guard.write_end()?;
        guard.call()?;
        let status = guard.read_int()?;
        let count = guard.read_int()?;
        println!("   GetScanInfos -> {} ({} networks)", status, count);
        for _ in 0..count {
            let ssid = guard.read_str()?;
            let rssi = guard.read_int()?;
            let freq = guard.read_int()?;
            println!("      {:<12} {:>4} dBm  {} MHz", ssid, rssi, freq);
        }
    }

    println!(
        "   Connect({}) -> {}",
        network_id,
        call_status(client, "Connect", &[network_id])?
    );
    println!("   Disconnect -> {}", call_status(client, "Disconnect", &[])?);

    // Beri waktu event terakhir sampai
    thread::sleep(Duration::from_millis(200));
    Ok(())
}

fn main() {
    let options = parse_args();
    let level = if options.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = ClientConfig::from_env();
    if let Some(path) = options.socket_path {
        config = config.with_socket_path(path);
    }

    println!("📡 Wi-Fi manager RPC client (demo)");
    println!("   Socket: {}\n", config.socket_path.display());

    let client = match RpcClient::connect(&config, dispatcher()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ Connect failed: {}", e);
            eprintln!("\n💡 Make sure the server is running:");
            eprintln!("   cargo run --release --bin wifi_hal_server");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&client, options.network_id) {
        eprintln!("❌ Call failed: {}", e);
        std::process::exit(1);
    }
    println!("\n✅ Done");
}

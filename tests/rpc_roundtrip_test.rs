//! Client/server roundtrip lewat Unix socket sungguhan
//!
//! Usage:
//!   cargo test --test rpc_roundtrip_test

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use wifi_rpc::config::{BufferLimits, ClientConfig, ServerConfig};
use wifi_rpc::core::Context;
use wifi_rpc::network::{
    CallbackEvent, EventDispatcher, ReplyState, RpcClient, RpcServer, ServerHandle,
};
use wifi_rpc::protocol::{FieldReader, FieldWriter, Message, MessageTag};
use wifi_rpc::{Error, Result};

const EVENT_SCAN_DONE: i32 = 107;

fn server_config(path: &Path) -> ServerConfig {
    ServerConfig::default()
        .with_socket_path(path)
        .with_poll_timeout(Duration::from_millis(10))
}

fn start_server(path: &Path) -> (ServerHandle, JoinHandle<Result<()>>) {
    start_server_with(server_config(path))
}

fn start_server_with(config: ServerConfig) -> (ServerHandle, JoinHandle<Result<()>>) {
    let mut server = RpcServer::bind(config).unwrap();

    server.register("Ping", |ctx: &mut Context| -> Result<()> {
        let n = ctx.read_int()?;
        ctx.write_begin(MessageTag::Normal)?;
        ctx.write_int(0)?;
        ctx.write_int(n)?;
        ctx.write_end()
    });

    server.register("Echo", |ctx: &mut Context| -> Result<()> {
        let text = ctx.read_str()?;
        let bytes = ctx.read_bytes()?;
        let value = ctx.read_double()?;
        let c = ctx.read_char()?;
        ctx.write_begin(MessageTag::Normal)?;
        ctx.write_int(0)?;
        ctx.write_str(&text)?;
        ctx.write_bytes(&bytes)?;
        ctx.write_double(value)?;
        ctx.write_char(c)?;
        ctx.write_end()
    });

    let handle = server.handle();
    {
        let handle = handle.clone();
        server.register("StartScan", move |ctx: &mut Context| -> Result<()> {
            ctx.write_begin(MessageTag::Normal)?;
            ctx.write_int(0)?;
            ctx.write_end()?;
            handle.emit(CallbackEvent::new(EVENT_SCAN_DONE).with(3).with("done"))
        });
    }

    let runner = thread::spawn(move || server.run());
    (handle, runner)
}

/// Tunggu sampai server menutup koneksi (EOF atau reset)
fn assert_server_closes(stream: &mut UnixStream) {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {} bytes from server", n),
        Err(e) => assert!(
            !matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            "server kept the connection open"
        ),
    }
}

fn client_config(path: &Path) -> ClientConfig {
    ClientConfig::default()
        .with_socket_path(path)
        .with_poll_timeout(Duration::from_millis(10))
}

fn simple_call(client: &RpcClient, func: &str, args: &[i32]) -> Result<i32> {
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

#[test]
fn test_ping_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server(&path);

    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    for n in 0..100 {
        let mut guard = client.lock();
        guard.write_begin(MessageTag::Normal).unwrap();
        guard.write_func("Ping").unwrap();
        guard.write_int(n).unwrap();
        guard.write_end().unwrap();
        guard.call().unwrap();
        assert_eq!(guard.read_int().unwrap(), 0);
        assert_eq!(guard.read_int().unwrap(), n);
        guard.read_end();
    }

    handle.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_typed_fields_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server(&path);

    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    let mut guard = client.lock();
    guard.write_begin(MessageTag::Normal).unwrap();
    guard.write_func("Echo").unwrap();
    guard.write_str("home ap").unwrap();
    guard.write_bytes(&[0x00, 0xff, 0x10]).unwrap();
    guard.write_double(-2.5).unwrap();
    guard.write_char('w').unwrap();
    guard.write_end().unwrap();
    guard.call().unwrap();

    assert_eq!(guard.read_int().unwrap(), 0);
    assert_eq!(guard.read_str().unwrap(), "home ap");
    assert_eq!(guard.read_bytes().unwrap(), vec![0x00, 0xff, 0x10]);
    assert_eq!(guard.read_double().unwrap(), -2.5);
    assert_eq!(guard.read_char().unwrap(), 'w');
    drop(guard);

    handle.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_unsupported_function() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server(&path);

    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    let mut guard = client.lock();
    guard.write_begin(MessageTag::Normal).unwrap();
    guard.write_func("SetCountryCode").unwrap();
    guard.write_str("ID").unwrap();
    guard.write_end().unwrap();
    guard.call().unwrap();
    assert_eq!(guard.read_int().unwrap(), -1);
    assert_eq!(guard.read_str().unwrap(), "unsupport function");
    drop(guard);

    // Function yang gagal parse argumen
    let mut guard = client.lock();
    guard.write_begin(MessageTag::Normal).unwrap();
    guard.write_func("Ping").unwrap();
    guard.write_end().unwrap();
    guard.call().unwrap();
    assert_eq!(guard.read_int().unwrap(), -1);
    assert_eq!(guard.read_str().unwrap(), "server deal failed!");
    drop(guard);

    handle.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_callback_after_subscribe() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server(&path);

    let (tx, rx) = mpsc::channel();
    let dispatcher = EventDispatcher::new().on(EVENT_SCAN_DONE, move |msg: &mut Message| {
        let count = msg.read_int().unwrap();
        let state = msg.read_str().unwrap();
        tx.send((count, state)).unwrap();
    });
    let client = RpcClient::connect(&client_config(&path), dispatcher).unwrap();

    // Belum subscribe: event tidak dikirim
    assert_eq!(simple_call(&client, "StartScan", &[]).unwrap(), 0);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert_eq!(
        simple_call(&client, "RegisterEventCallback", &[1, EVENT_SCAN_DONE]).unwrap(),
        0
    );
    assert_eq!(simple_call(&client, "StartScan", &[]).unwrap(), 0);
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        (3, "done".to_string())
    );

    // Event dari thread lain lewat handle
    handle
        .emit(CallbackEvent::new(EVENT_SCAN_DONE).with(9).with("external"))
        .unwrap();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        (9, "external".to_string())
    );

    assert_eq!(
        simple_call(&client, "UnRegisterEventCallback", &[1, EVENT_SCAN_DONE]).unwrap(),
        0
    );
    assert_eq!(simple_call(&client, "StartScan", &[]).unwrap(), 0);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    handle.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_concurrent_callers_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server(&path);

    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    thread::scope(|s| {
        for t in 0..4 {
            let client = &client;
            s.spawn(move || {
                for i in 0..50 {
                    let n = t * 1000 + i;
                    let mut guard = client.lock();
                    guard.write_begin(MessageTag::Normal).unwrap();
                    guard.write_func("Ping").unwrap();
                    guard.write_int(n).unwrap();
                    guard.write_end().unwrap();
                    guard.call().unwrap();
                    assert_eq!(guard.read_int().unwrap(), 0);
                    assert_eq!(guard.read_int().unwrap(), n);
                }
            });
        }
    });

    handle.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_server_stop_closes_client() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server(&path);

    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    assert_eq!(simple_call(&client, "Ping", &[1]).unwrap(), 0);

    handle.stop();
    runner.join().unwrap().unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while client.state() != ReplyState::Closed {
        assert!(Instant::now() < deadline, "client never observed close");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(matches!(simple_call(&client, "Ping", &[2]), Err(Error::Closed)));
    assert!(!path.exists());
}

#[test]
fn test_max_clients_rejects_extra_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let (handle, runner) = start_server_with(server_config(&path).with_max_clients(1));

    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    assert_eq!(simple_call(&client, "Ping", &[1]).unwrap(), 0);

    let mut extra = UnixStream::connect(&path).unwrap();
    assert_server_closes(&mut extra);

    // Client pertama tetap dilayani
    assert_eq!(simple_call(&client, "Ping", &[2]).unwrap(), 0);

    handle.stop();
    runner.join().unwrap().unwrap();
}

#[test]
fn test_oversized_frame_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wifi.sock");
    let config = server_config(&path).with_limits(BufferLimits::new(64, 256));
    let (handle, runner) = start_server_with(config);

    // Frame tanpa terminator yang melebihi batas buffer
    let mut raw = UnixStream::connect(&path).unwrap();
    let mut frame = b"N\tEcho\t".to_vec();
    frame.extend_from_slice(&[b'x'; 1024]);
    raw.write_all(&frame).unwrap();
    assert_server_closes(&mut raw);

    // Koneksi lain tidak terpengaruh
    let client = RpcClient::connect(&client_config(&path), |_: &mut Message| {}).unwrap();
    assert_eq!(simple_call(&client, "Ping", &[3]).unwrap(), 0);

    handle.stop();
    runner.join().unwrap().unwrap();
}

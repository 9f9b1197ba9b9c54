//! wifi-rpc - framing micro-benchmark
//!
//! Mengukur biaya encode/decode frame dan buffer I/O tanpa socket.
//! Untuk demo end-to-end jalankan `wifi_hal_server` lalu `wifi_hal_client`.

use std::time::Instant;

use wifi_rpc::config::{BufferLimits, Framing};
use wifi_rpc::core::IoBuffer;
use wifi_rpc::protocol::{FieldReader, FieldWriter, FrameEncoder, Message, MessageTag};
use wifi_rpc::Result;

fn main() {
    println!("📡 wifi-rpc framing benchmark");
    println!("=============================\n");

    let results = [
        benchmark_encode(),
        benchmark_decode(),
        benchmark_buffer(),
    ];
    if let Some(e) = results.into_iter().find_map(|r| r.err()) {
        eprintln!("❌ Benchmark failed: {}", e);
        std::process::exit(1);
    }

    println!("\n✅ All benchmarks complete!");
    println!("\nTo start server: cargo run --release --bin wifi_hal_server");
}

fn encode_scan_result(enc: &mut FrameEncoder, i: i32) -> Result<()> {
    enc.write_begin(MessageTag::Normal)?;
    enc.write_func("GetScanInfos")?;
    enc.write_int(i)?;
    enc.write_str("home-ap")?;
    enc.write_int64(-42)?;
    enc.write_double(2412.5)?;
    enc.write_bytes(&[0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e])?;
    enc.write_end()
}

fn benchmark_encode() -> Result<()> {
    println!("📊 Encode (7 fields/frame)");
    println!("--------------------------");

    const ITERATIONS: usize = 1_000_000;
    let mut enc = FrameEncoder::new(Framing::default());

    let start = Instant::now();
    let mut bytes = 0usize;
    for i in 0..ITERATIONS {
        enc.reset();
        encode_scan_result(&mut enc, i as i32)?;
        bytes += enc.as_bytes().len();
    }
    let duration = start.elapsed();

    let ns = duration.as_nanos() as f64 / ITERATIONS as f64;
    println!("  Frames: {}", ITERATIONS);
    println!("  Encode latency: {:.2} ns/frame", ns);
    println!(
        "  Throughput: {:.2} MB/sec\n",
        bytes as f64 / duration.as_secs_f64() / 1_000_000.0
    );
    Ok(())
}

fn benchmark_decode() -> Result<()> {
    println!("📊 Decode (7 fields/frame)");
    println!("--------------------------");

    const ITERATIONS: usize = 1_000_000;
    let framing = Framing::default();
    let mut enc = FrameEncoder::new(framing.clone());
    encode_scan_result(&mut enc, 7)?;
    let frame = enc.into_bytes();
    let mut msg = Message::new(frame, framing.separator, framing.terminator.len());

    let start = Instant::now();
    let mut checksum = 0i64;
    for _ in 0..ITERATIONS {
        msg.reset_cursor();
        let _name = msg.read_func()?;
        checksum += msg.read_int()? as i64;
        let _ssid = msg.read_str()?;
        checksum += msg.read_int64()?;
        checksum += msg.read_double()? as i64;
        checksum += msg.read_bytes()?.len() as i64;
    }
    let duration = start.elapsed();

    let ns = duration.as_nanos() as f64 / ITERATIONS as f64;
    println!("  Frames: {} (checksum {})", ITERATIONS, checksum);
    println!("  Decode latency: {:.2} ns/frame\n", ns);
    Ok(())
}

fn benchmark_buffer() -> Result<()> {
    println!("📊 IoBuffer (append + consume)");
    println!("------------------------------");

    const ITERATIONS: usize = 1_000_000;
    let mut enc = FrameEncoder::new(Framing::default());
    encode_scan_result(&mut enc, 1)?;
    let frame = enc.into_bytes();
    let mut buf = IoBuffer::new(BufferLimits::default());

    let start = Instant::now();
    for i in 0..ITERATIONS {
        buf.extend(&frame)?;
        // Sisakan sebagian supaya compact ikut terukur
        if i % 4 == 3 {
            buf.consume(buf.len() - frame.len() / 2);
        }
    }
    let duration = start.elapsed();

    let ns = duration.as_nanos() as f64 / ITERATIONS as f64;
    println!("  Frame size: {} bytes", frame.len());
    println!("  Append latency: {:.2} ns/op", ns);
    println!("  Final capacity: {} bytes", buf.capacity());
    Ok(())
}

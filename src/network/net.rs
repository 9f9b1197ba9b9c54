//! Socket primitives untuk Unix-domain stream
//!
//! Read/write partial dengan retry transient: `WouldBlock` menghentikan
//! loop dan mengembalikan jumlah byte sejauh ini, `Interrupted` langsung
//! di-retry. Peer close dilaporkan sebagai `Error::PeerClosed`.

use std::io::{self, Read, Write};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Hasil readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Toggle O_NONBLOCK pada descriptor
pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    // SAFETY: fcntl hanya membaca/menulis flag descriptor
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let new_flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };

    if new_flags != flags && unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read sampai `buf` penuh, `WouldBlock`, atau EOF.
///
/// EOF sebelum ada byte terbaca = `PeerClosed`; EOF setelah ada byte
/// mengembalikan byte yang sudah terbaca, close terdeteksi di call berikutnya.
pub fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => {
                if total == 0 {
                    return Err(Error::PeerClosed);
                }
                break;
            }
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if is_peer_closed(&e) => {
                if total == 0 {
                    return Err(Error::PeerClosed);
                }
                break;
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}

/// Write sampai `buf` habis atau `WouldBlock`
pub fn write_some<W: Write>(writer: &mut W, buf: &[u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match writer.write(&buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if is_peer_closed(&e) => return Err(Error::PeerClosed),
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}

fn is_peer_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

/// Tunggu descriptor siap read/write, maksimal `timeout`.
///
/// HUP/ERR dihitung sebagai siap supaya read/write berikutnya yang
/// melaporkan kondisinya. `EINTR` dilaporkan sebagai timeout.
pub fn wait_ready(fd: RawFd, direction: Direction, timeout: Duration) -> io::Result<Readiness> {
    let events = match direction {
        Direction::Read => libc::POLLIN,
        Direction::Write => libc::POLLOUT,
    };
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: pfd valid selama call, nfds = 1
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Readiness::TimedOut);
        }
        return Err(err);
    }

    if rc == 0 {
        Ok(Readiness::TimedOut)
    } else {
        Ok(Readiness::Ready)
    }
}

fn sockaddr_un(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    // SAFETY: sockaddr_un adalah POD, all-zero valid
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() || bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path is empty or too long",
        ));
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let len = mem::size_of::<libc::sa_family_t>() + bytes.len() + 1;
    Ok((addr, len as libc::socklen_t))
}

/// Listening socket non-blocking di `path` dengan backlog terbatas.
///
/// Socket file lama di path yang sama dihapus dulu.
pub fn create_unix_server(path: &Path, backlog: i32) -> io::Result<UnixListener> {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_socket() {
            std::fs::remove_file(path)?;
        }
    }

    let (addr, addr_len) = sockaddr_un(path)?;

    // SAFETY: argumen konstan yang valid
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd baru dibuat dan belum dimiliki siapa pun; listener menutupnya saat drop
    let listener = unsafe { UnixListener::from_raw_fd(fd) };

    // SAFETY: addr hidup sampai bind selesai, addr_len sesuai isi
    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            addr_len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::listen(fd, backlog) } < 0 {
        return Err(io::Error::last_os_error());
    }

    set_nonblocking(listener.as_raw_fd(), true)?;
    Ok(listener)
}

/// Connect ke server di `path`, langsung di-set non-blocking
pub fn connect_unix(path: &Path) -> io::Result<UnixStream> {
    let stream = UnixStream::connect(path)?;
    set_nonblocking(stream.as_raw_fd(), true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (UnixStream, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        set_nonblocking(a.as_raw_fd(), true).unwrap();
        set_nonblocking(b.as_raw_fd(), true).unwrap();
        (a, b)
    }

    fn is_nonblocking(fd: RawFd) -> bool {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        flags & libc::O_NONBLOCK != 0
    }

    #[test]
    fn test_toggle_nonblocking() {
        let (a, _b) = UnixStream::pair().unwrap();
        let fd = a.as_raw_fd();
        set_nonblocking(fd, true).unwrap();
        assert!(is_nonblocking(fd));
        set_nonblocking(fd, false).unwrap();
        assert!(!is_nonblocking(fd));
    }

    #[test]
    fn test_read_would_block_returns_partial() {
        let (mut a, mut b) = pair();
        write_some(&mut a, b"abc").unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(read_some(&mut b, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");

        // Tidak ada data: transient, bukan error
        assert_eq!(read_some(&mut b, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_peer_closed() {
        let (a, mut b) = pair();
        drop(a);
        let mut buf = [0u8; 4];
        assert!(matches!(read_some(&mut b, &mut buf), Err(Error::PeerClosed)));
    }

    #[test]
    fn test_read_data_then_close() {
        let (mut a, mut b) = pair();
        write_some(&mut a, b"xy").unwrap();
        drop(a);
        let mut buf = [0u8; 4];
        assert_eq!(read_some(&mut b, &mut buf).unwrap(), 2);
        assert!(matches!(read_some(&mut b, &mut buf), Err(Error::PeerClosed)));
    }

    #[test]
    fn test_write_peer_closed() {
        let (mut a, b) = pair();
        drop(b);
        assert!(matches!(write_some(&mut a, b"data"), Err(Error::PeerClosed)));
    }

    #[test]
    fn test_wait_ready() {
        let (mut a, b) = pair();
        let fd = b.as_raw_fd();
        assert_eq!(
            wait_ready(fd, Direction::Read, Duration::from_millis(10)).unwrap(),
            Readiness::TimedOut
        );
        assert_eq!(
            wait_ready(fd, Direction::Write, Duration::from_millis(10)).unwrap(),
            Readiness::Ready
        );
        write_some(&mut a, b"!").unwrap();
        assert_eq!(
            wait_ready(fd, Direction::Read, Duration::from_millis(10)).unwrap(),
            Readiness::Ready
        );
    }

    #[test]
    fn test_server_and_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.sock");

        let listener = create_unix_server(&path, 4).unwrap();
        assert!(is_nonblocking(listener.as_raw_fd()));

        let client = connect_unix(&path).unwrap();
        assert!(is_nonblocking(client.as_raw_fd()));

        let (_accepted, _) = loop {
            match listener.accept() {
                Ok(conn) => break conn,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => panic!("accept failed: {}", e),
            }
        };

        // Path sudah ada: socket lama dihapus dan bind ulang sukses
        drop(listener);
        let _again = create_unix_server(&path, 4).unwrap();
    }

    #[test]
    fn test_path_too_long() {
        let long = "x".repeat(200);
        let err = create_unix_server(Path::new(&long), 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

use std::io::{Cursor, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// Reports how many bytes can be read without blocking.
///
/// The answer is a hint: another reader may consume the bytes before the
/// caller gets to them, and some transports cannot answer at all (they
/// report zero).
pub trait ReadReady {
    /// Number of bytes currently readable without blocking.
    fn bytes_ready(&self) -> std::io::Result<usize>;
}

/// A connected duplex link implementing `Read` and `Write`.
///
/// This is the physical connection a multiplexor/demultiplexor pair runs on.
/// Clone it with [`Link::try_clone`] to hand the read half and the write half
/// to different owners.
pub struct Link {
    inner: LinkInner,
}

enum LinkInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for Link {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.read(buf),
            LinkInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Link {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.write(buf),
            LinkInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.flush(),
            LinkInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl Link {
    /// Create a Link from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkInner::Unix(stream),
        }
    }

    /// Create a Link from a TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkInner::Tcp(stream),
        }
    }

    /// A connected pair of in-process links (Unix only).
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            LinkInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            LinkInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this link (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            LinkInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }

    /// Shut down both directions of the link.
    ///
    /// Every clone observes the shutdown: blocked reads return EOF and
    /// further writes fail.
    pub fn shutdown(&self) -> Result<()> {
        let res = match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            LinkInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match res {
            Ok(()) => Ok(()),
            // Already shut down by the peer or by another clone.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Human-readable description of the remote end, for diagnostics.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => match stream.peer_addr() {
                Ok(addr) => match addr.as_pathname() {
                    Some(path) => format!("unix:{}", path.display()),
                    None => "unix:<unnamed>".to_string(),
                },
                Err(_) => "unix:<unknown>".to_string(),
            },
            LinkInner::Tcp(stream) => match stream.peer_addr() {
                Ok(addr) => format!("tcp:{addr}"),
                Err(_) => "tcp:<unknown>".to_string(),
            },
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(_) => "unix-domain-socket",
            LinkInner::Tcp(_) => "tcp",
        }
    }
}

impl ReadReady for Link {
    fn bytes_ready(&self) -> std::io::Result<usize> {
        match &self.inner {
            #[cfg(unix)]
            LinkInner::Unix(stream) => stream.bytes_ready(),
            LinkInner::Tcp(stream) => stream.bytes_ready(),
        }
    }
}

#[cfg(unix)]
impl ReadReady for std::os::unix::net::UnixStream {
    fn bytes_ready(&self) -> std::io::Result<usize> {
        use std::os::fd::AsRawFd;
        fionread(self.as_raw_fd())
    }
}

impl ReadReady for TcpStream {
    #[cfg(unix)]
    fn bytes_ready(&self) -> std::io::Result<usize> {
        use std::os::fd::AsRawFd;
        fionread(self.as_raw_fd())
    }

    #[cfg(not(unix))]
    fn bytes_ready(&self) -> std::io::Result<usize> {
        Ok(0)
    }
}

impl<T: AsRef<[u8]>> ReadReady for Cursor<T> {
    fn bytes_ready(&self) -> std::io::Result<usize> {
        let len = self.get_ref().as_ref().len() as u64;
        Ok(len.saturating_sub(self.position()) as usize)
    }
}

#[cfg(unix)]
fn fionread(fd: std::os::fd::RawFd) -> std::io::Result<usize> {
    let mut avail: libc::c_int = 0;

    // SAFETY: `fd` is an open socket descriptor borrowed from a live stream and
    // `avail` is a valid writable `c_int`, which is what FIONREAD stores into.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut avail as *mut libc::c_int) };

    if rc == 0 {
        Ok(avail.max(0) as usize)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("type", &self.transport_name())
            .finish()
    }
}

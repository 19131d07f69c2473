//! The byte stream underlying a server connection.
use Result;

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(feature = "ssl")]
use openssl::ssl::SslStream;

/// A plain or TLS-wrapped TCP stream to a single server.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "ssl")]
    Ssl(SslStream<TcpStream>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match *self {
            Stream::Tcp(ref stream) => stream,
            #[cfg(feature = "ssl")]
            Stream::Ssl(ref stream) => stream.get_ref(),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    pub fn is_ssl(&self) -> bool {
        match *self {
            Stream::Tcp(_) => false,
            #[cfg(feature = "ssl")]
            Stream::Ssl(_) => true,
        }
    }

    /// Closes both halves of the underlying socket.
    pub fn shutdown(&self) -> io::Result<()> {
        self.tcp().shutdown(Shutdown::Both)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            Stream::Tcp(ref mut stream) => stream.read(buf),
            #[cfg(feature = "ssl")]
            Stream::Ssl(ref mut stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            Stream::Tcp(ref mut stream) => stream.write(buf),
            #[cfg(feature = "ssl")]
            Stream::Ssl(ref mut stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Stream::Tcp(ref mut stream) => stream.flush(),
            #[cfg(feature = "ssl")]
            Stream::Ssl(ref mut stream) => stream.flush(),
        }
    }
}

/// Opens a TCP connection, bounding establishment by `connect_timeout`.
///
/// Name resolution may yield several addresses; each is tried in turn and
/// the last failure is surfaced if none of them accepts.
pub fn connect_tcp(host_name: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let addrs = (host_name, port).to_socket_addrs()?;

    let mut last_err = None;
    for addr in addrs {
        let attempt = if connect_timeout == Duration::new(0, 0) {
            TcpStream::connect(&addr)
        } else {
            TcpStream::connect_timeout(&addr, connect_timeout)
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("host '{}' did not resolve to any address", host_name),
            )
        })
        .into())
}

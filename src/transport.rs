//! Transport abstraction. A transport is anything that can carry the raw
//! byte stream of a connection: the handshake bytes, then chunked messages.
//!
//! TLS and name resolution are out of scope here; callers hand in an
//! already-connected [`std::net::TcpStream`] (or any other `Read + Write`,
//! e.g. a Unix socket or an in-memory pipe in tests).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;

/// Marker trait for the duplex byte stream a [`crate::connection::Connection`]
/// is built on. Blanket-implemented for anything `Read + Write`.
pub trait Transport: Read + Write {}

impl<T: Read + Write> Transport for T {}

/// Open a TCP transport to `addr`, applying the given timeouts to the
/// underlying socket.
pub fn connect_tcp(
    addr: impl std::net::ToSocketAddrs,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
) -> Result<TcpStream> {
    let stream = match connect_timeout {
        Some(timeout) => {
            let addr = addr
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| crate::error::Error::protocol("no address to connect to"))?;
            TcpStream::connect_timeout(&addr, timeout)?
        }
        None => TcpStream::connect(addr)?,
    };
    stream.set_read_timeout(read_timeout)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

//! Connection establishment: the magic-preamble handshake that negotiates a
//! protocol version, after which every further exchange on the socket is
//! chunked-framed messages.

use std::io::{Read, Write};

use crate::chunking::ChunkedStream;
use crate::constant::{HANDSHAKE_MAGIC, HANDSHAKE_VERSION_COUNT};
use crate::error::{Error, Result};
use crate::primitive::{read_u32, write_u32};

/// A connection that has completed the handshake and is ready to carry
/// chunked messages.
pub struct Connection<S> {
    pub(crate) stream: ChunkedStream<S>,
    pub(crate) version: u32,
    broken: bool,
}

impl<S: Read + Write> Connection<S> {
    /// Perform the handshake: send the magic preamble and up to four
    /// candidate versions (highest preference first, zero-padded), then
    /// read back the version the server chose. A reply of `0` means no
    /// proposed version was acceptable.
    pub fn handshake(
        mut transport: S,
        preferred_versions: [u32; HANDSHAKE_VERSION_COUNT],
        snd_min_chunk: u16,
        snd_max_chunk: u16,
    ) -> Result<Self> {
        let mut out = Vec::with_capacity(4 + 4 * HANDSHAKE_VERSION_COUNT);
        out.extend_from_slice(&HANDSHAKE_MAGIC);
        for v in preferred_versions {
            write_u32(&mut out, v);
        }
        transport.write_all(&out)?;
        transport.flush()?;
        tracing::debug!(?preferred_versions, "sent handshake proposal");

        let mut reply = [0u8; 4];
        transport.read_exact(&mut reply)?;
        let (version, _) = read_u32(&reply)?;
        if version == 0 {
            log::warn!("server rejected all proposed protocol versions");
            return Err(Error::NegotiationFailed);
        }
        tracing::debug!(version, "handshake negotiated");

        Ok(Self {
            stream: ChunkedStream::with_chunk_sizes(transport, snd_min_chunk, snd_max_chunk),
            version,
            broken: false,
        })
    }

    pub fn negotiated_version(&self) -> u32 {
        self.version
    }

    pub fn is_broken(&self) -> bool {
        self.broken || self.stream.is_broken()
    }

    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn send_message(&mut self, bytes: &[u8]) -> Result<()> {
        let result = self.stream.write_message_part(bytes).and_then(|()| self.stream.end_message());
        if let Err(ref err) = result {
            log::warn!("send failed, marking connection broken: {err}");
            self.broken = true;
        }
        result
    }

    pub fn recv_message(&mut self) -> Result<Vec<u8>> {
        let result = self.stream.read_message();
        if let Err(ref err) = result {
            log::warn!("recv failed, marking connection broken: {err}");
            self.broken = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Pipe {
        to_read: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.to_read.read(buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handshake_rejects_zero_reply() {
        let pipe = Pipe {
            to_read: Cursor::new(vec![0, 0, 0, 0]),
            written: Vec::new(),
        };
        let err = Connection::handshake(pipe, [1, 0, 0, 0], 1024, 16 * 1024).unwrap_err();
        assert!(matches!(err, Error::NegotiationFailed));
    }

    #[test]
    fn handshake_accepts_nonzero_reply_and_records_version() {
        let pipe = Pipe {
            to_read: Cursor::new(vec![0, 0, 0, 1]),
            written: Vec::new(),
        };
        let conn = Connection::handshake(pipe, [1, 0, 0, 0], 1024, 16 * 1024).unwrap();
        assert_eq!(conn.negotiated_version(), 1);
    }
}

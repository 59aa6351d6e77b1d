//! Chunked framing on top of a raw transport.
//!
//! Every message is split into one or more chunks of `<u16 length
//! BE><payload>`, terminated by a zero-length chunk. Small writes are
//! coalesced into a send buffer until `snd_min_chunk` bytes have
//! accumulated, bounding both the chunk count for short messages and the
//! per-chunk overhead for long ones (chunks above `snd_max_chunk` are
//! split).

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::primitive::{read_u16, write_u16};

const DEFAULT_MIN_CHUNK: u16 = 1024;
const DEFAULT_MAX_CHUNK: u16 = 16 * 1024;

pub struct ChunkedStream<S> {
    delegate: S,
    snd_min_chunk: u16,
    snd_max_chunk: u16,
    snd_buffer: Vec<u8>,
    /// Sticky error: once a read or write fails, every subsequent call on
    /// this stream fails the same way without touching `delegate` again.
    broken: Option<io::ErrorKind>,
}

impl<S> ChunkedStream<S> {
    pub fn new(delegate: S) -> Self {
        Self::with_chunk_sizes(delegate, DEFAULT_MIN_CHUNK, DEFAULT_MAX_CHUNK)
    }

    pub fn with_chunk_sizes(delegate: S, snd_min_chunk: u16, snd_max_chunk: u16) -> Self {
        Self {
            delegate,
            snd_min_chunk: snd_min_chunk.max(1),
            snd_max_chunk: snd_max_chunk.max(snd_min_chunk.max(1)),
            snd_buffer: Vec::with_capacity(snd_min_chunk as usize),
            broken: None,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    fn fail(&mut self, kind: io::ErrorKind, msg: &'static str) -> Error {
        self.broken = Some(kind);
        Error::Transport(io::Error::new(kind, msg))
    }
}

impl<S: Write> ChunkedStream<S> {
    /// Buffer `data` for the message currently being written, flushing full
    /// chunks to the delegate once `snd_buffer` passes `snd_min_chunk`.
    pub fn write_message_part(&mut self, data: &[u8]) -> Result<()> {
        if let Some(kind) = self.broken {
            return Err(self.fail(kind, "stream previously failed"));
        }
        self.snd_buffer.extend_from_slice(data);
        while self.snd_buffer.len() >= self.snd_min_chunk as usize {
            let take = self.snd_buffer.len().min(self.snd_max_chunk as usize);
            let chunk: Vec<u8> = self.snd_buffer.drain(..take).collect();
            self.write_chunk(&chunk)?;
        }
        Ok(())
    }

    /// Flush any buffered remainder as a final chunk (if non-empty) and emit
    /// the zero-length terminator that marks the message boundary.
    pub fn end_message(&mut self) -> Result<()> {
        if let Some(kind) = self.broken {
            return Err(self.fail(kind, "stream previously failed"));
        }
        while !self.snd_buffer.is_empty() {
            let take = self.snd_buffer.len().min(self.snd_max_chunk as usize);
            let chunk: Vec<u8> = self.snd_buffer.drain(..take).collect();
            self.write_chunk(&chunk)?;
        }
        let mut terminator = Vec::with_capacity(2);
        write_u16(&mut terminator, 0);
        self.delegate
            .write_all(&terminator)
            .map_err(|e| self.fail(e.kind(), "write failed flushing message terminator"))?;
        self.delegate
            .flush()
            .map_err(|e| self.fail(e.kind(), "flush failed"))?;
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let mut header = Vec::with_capacity(2);
        write_u16(&mut header, chunk.len() as u16);
        self.delegate
            .write_all(&header)
            .map_err(|e| self.fail(e.kind(), "write failed writing chunk header"))?;
        self.delegate
            .write_all(chunk)
            .map_err(|e| self.fail(e.kind(), "write failed writing chunk body"))?;
        Ok(())
    }
}

impl<S: Read> ChunkedStream<S> {
    /// Read one complete message: every chunk up to and including the
    /// zero-length terminator, with the chunk headers stripped.
    pub fn read_message(&mut self) -> Result<Vec<u8>> {
        if let Some(kind) = self.broken {
            return Err(self.fail(kind, "stream previously failed"));
        }
        let mut message = Vec::new();
        loop {
            let len = self.read_chunk_header()?;
            if len == 0 {
                return Ok(message);
            }
            let start = message.len();
            message.resize(start + len as usize, 0);
            self.delegate
                .read_exact(&mut message[start..])
                .map_err(|e| self.fail(e.kind(), "read failed reading chunk body"))?;
        }
    }

    fn read_chunk_header(&mut self) -> Result<u16> {
        let mut header = [0u8; 2];
        self.delegate
            .read_exact(&mut header)
            .map_err(|e| self.fail(e.kind(), "read failed reading chunk header"))?;
        let (len, _) = read_u16(&header)?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A fake duplex endpoint: writes go to `written`, reads come from a
    /// fixed `to_read` buffer, mirroring a loopback pipe without needing
    /// real sockets.
    struct Pipe {
        to_read: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.to_read.read(buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn small_message_is_one_chunk_plus_terminator() {
        let pipe = Pipe {
            to_read: Cursor::new(Vec::new()),
            written: Vec::new(),
        };
        let mut stream = ChunkedStream::with_chunk_sizes(pipe, 1024, 1024);
        stream.write_message_part(b"hello").unwrap();
        stream.end_message().unwrap();
        let out = &stream.delegate.written;
        assert_eq!(&out[0..2], &[0x00, 0x05]);
        assert_eq!(&out[2..7], b"hello");
        assert_eq!(&out[7..9], &[0x00, 0x00]);
    }

    #[test]
    fn large_message_splits_at_max_chunk() {
        let pipe = Pipe {
            to_read: Cursor::new(Vec::new()),
            written: Vec::new(),
        };
        let mut stream = ChunkedStream::with_chunk_sizes(pipe, 4, 4);
        stream.write_message_part(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        stream.end_message().unwrap();
        let out = &stream.delegate.written;
        assert_eq!(&out[0..2], &[0x00, 0x04]);
        assert_eq!(&out[6..8], &[0x00, 0x04]);
        assert_eq!(&out[12..14], &[0x00, 0x00]);
    }

    #[test]
    fn read_message_reassembles_chunks() {
        let mut wire = Vec::new();
        write_u16(&mut wire, 3);
        wire.extend_from_slice(b"abc");
        write_u16(&mut wire, 2);
        wire.extend_from_slice(b"de");
        write_u16(&mut wire, 0);
        let pipe = Pipe {
            to_read: Cursor::new(wire),
            written: Vec::new(),
        };
        let mut stream = ChunkedStream::new(pipe);
        let msg = stream.read_message().unwrap();
        assert_eq!(msg, b"abcde");
    }

    #[test]
    fn truncated_read_marks_stream_broken() {
        let pipe = Pipe {
            to_read: Cursor::new(vec![0x00]),
            written: Vec::new(),
        };
        let mut stream = ChunkedStream::new(pipe);
        assert!(stream.read_message().is_err());
        assert!(stream.is_broken());
        assert!(stream.read_message().is_err());
    }
}

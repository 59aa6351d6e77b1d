//! An in-memory duplex transport for exercising `Session` without a real
//! socket: reads come from a fixed, pre-scripted byte buffer; writes land
//! in a `Vec<u8>` the test can inspect afterward.

use std::io::{self, Cursor, Read, Write};

pub struct Pipe {
    pub to_read: Cursor<Vec<u8>>,
    pub written: Vec<u8>,
}

impl Pipe {
    pub fn new(to_read: Vec<u8>) -> Self {
        Self {
            to_read: Cursor::new(to_read),
            written: Vec::new(),
        }
    }
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

pub fn chunk_message(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&0u16.to_be_bytes());
}

pub fn scripted_pipe(handshake_reply: u32, messages: &[Vec<u8>]) -> Pipe {
    let mut wire = handshake_reply.to_be_bytes().to_vec();
    for msg in messages {
        chunk_message(msg, &mut wire);
    }
    Pipe::new(wire)
}

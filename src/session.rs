//! Session: the request/response pipeline on top of one connection.
//!
//! Requests are dispatched FIFO. `run` sends `RUN` immediately followed by
//! `PULL_ALL` (auto-pull), registers one job for the pair, and returns a
//! handle the caller drives with [`Session::fetch_next`]. A server
//! `FAILURE` auto-emits `ACK_FAILURE` and puts the session in a state where
//! further `RUN`s are `IGNORED` until that acknowledgement round-trips.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::connection::Connection;
use crate::constant::message as sig;
use crate::error::{Error, Result, ServerFailure};
use crate::job::{JobHandle, JobRegistry, SessionEvent};
use crate::message::{self, Message};
use crate::mpool::Mpool;
use crate::opts::{Auth, ConnectOpts};
use crate::stream::{Disposition, Status, StreamState};
use crate::value::Value;

/// A caller-held reference to one in-flight or completed result stream.
#[derive(Clone)]
pub struct StreamHandle(Rc<RefCell<StreamState>>);

impl StreamHandle {
    pub fn status(&self) -> Status {
        self.0.borrow().status()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.0.borrow().field_names().to_vec()
    }

    /// A snapshot of this stream's summary metadata so far: statement type,
    /// update counts, and plan/profile, once its terminal SUCCESS has
    /// arrived.
    pub fn summary(&self) -> crate::stream::Summary {
        self.0.borrow().summary().clone()
    }
}

/// One entry in the session's FIFO dispatch queue: either a caller's result
/// stream, or an internal placeholder for an auto-sent ACK_FAILURE whose
/// SUCCESS reply must be drained without being routed to any stream.
enum Pending {
    Stream(Rc<RefCell<StreamState>>),
    AckFailure,
}

pub struct Session<S> {
    connection: Connection<S>,
    jobs: JobRegistry,
    pending: VecDeque<Pending>,
    scratch: Mpool,
    /// Set after a server FAILURE until our ACK_FAILURE has been sent;
    /// further RUNs would just be IGNORED by the server, so we refuse them
    /// locally instead.
    awaiting_ack: bool,
    ended: bool,
}

impl<S: Read + Write> Session<S> {
    /// Complete the handshake, send INIT, and wait for its SUCCESS/FAILURE.
    pub fn connect(transport: S, opts: &ConnectOpts) -> Result<Self> {
        let connection = Connection::handshake(
            transport,
            opts.preferred_versions,
            opts.snd_min_chunk,
            opts.snd_max_chunk,
        )?;
        let mut session = Self {
            connection,
            jobs: JobRegistry::new(),
            pending: VecDeque::new(),
            scratch: Mpool::new(),
            awaiting_ack: false,
            ended: false,
        };
        session.init(opts)?;
        Ok(session)
    }

    fn init(&mut self, opts: &ConnectOpts) -> Result<()> {
        let auth_fields: Vec<(&str, Value<'_>)> = match &opts.auth {
            Auth::None => Vec::new(),
            Auth::Basic {
                principal,
                credentials,
            } => vec![
                ("scheme", Value::String("basic")),
                ("principal", Value::String(principal)),
                ("credentials", Value::String(credentials)),
            ],
        };
        let bytes = message::encode_init(&opts.user_agent, &auth_fields);
        self.connection.send_message(&bytes)?;
        let raw = self.connection.recv_message()?;
        self.scratch.drain();
        let msg = Message::decode(&raw, &self.scratch)?;
        match msg.signature {
            sig::SUCCESS => Ok(()),
            sig::FAILURE => Err(Error::ServerFailure(extract_failure(msg.fields))),
            other => Err(Error::protocol(format!(
                "unexpected reply to INIT: signature 0x{other:02X}"
            ))),
        }
    }

    /// Run a statement and begin streaming its results.
    pub fn run(&mut self, statement: &str, parameters: &[(&str, Value<'_>)]) -> Result<StreamHandle> {
        if self.ended {
            return Err(Error::SessionEnded);
        }
        if self.awaiting_ack {
            tracing::debug!("running statement while a previous failure is unacknowledged; expect IGNORED");
        }
        let run_bytes = message::encode_run(statement, parameters);
        let pull_bytes = message::encode_pull_all();
        self.connection.send_message(&run_bytes)?;
        self.connection.send_message(&pull_bytes)?;

        let state = Rc::new(RefCell::new(StreamState::new()));
        let handle_for_registry: Rc<RefCell<dyn JobHandle>> = state.clone();
        self.jobs.register(&handle_for_registry);
        self.pending.push_back(Pending::Stream(state.clone()));
        Ok(StreamHandle(state))
    }

    /// Run a statement but discard its results rather than streaming them.
    pub fn run_discard(&mut self, statement: &str, parameters: &[(&str, Value<'_>)]) -> Result<()> {
        if self.ended {
            return Err(Error::SessionEnded);
        }
        if self.awaiting_ack {
            tracing::debug!("running statement while a previous failure is unacknowledged; expect IGNORED");
        }
        let run_bytes = message::encode_run(statement, parameters);
        let discard_bytes = message::encode_discard_all();
        self.connection.send_message(&run_bytes)?;
        self.connection.send_message(&discard_bytes)?;

        let state = Rc::new(RefCell::new(StreamState::new()));
        let handle_for_registry: Rc<RefCell<dyn JobHandle>> = state.clone();
        self.jobs.register(&handle_for_registry);
        self.pending.push_back(Pending::Stream(state.clone()));
        let handle = StreamHandle(state);
        while !matches!(handle.status(), Status::Drained | Status::Failed) {
            self.pump_one()?;
        }
        self.check_stream_error(&handle)
    }

    /// Fetch the next record of `handle`'s stream, pumping the connection
    /// as needed. `Ok(None)` means the stream is exhausted.
    pub fn fetch_next(&mut self, handle: &StreamHandle) -> Result<Option<crate::stream::Record>> {
        loop {
            if let Some(record) = handle.0.borrow_mut().pop_record() {
                return Ok(Some(record));
            }
            match handle.status() {
                Status::Drained => return Ok(None),
                Status::Failed | Status::Closed => {
                    self.check_stream_error(handle)?;
                    return Ok(None);
                }
                Status::Starting | Status::Streaming => {}
            }
            self.pump_one()?;
        }
    }

    fn check_stream_error(&self, handle: &StreamHandle) -> Result<()> {
        if let Some(err) = handle.0.borrow_mut().take_error() {
            return Err(err);
        }
        Ok(())
    }

    /// Read and dispatch exactly one wire message to the entry at the head
    /// of the pending queue.
    fn pump_one(&mut self) -> Result<()> {
        let raw = self.connection.recv_message()?;
        let wire_sig = message::peek_signature(&raw)?;

        if wire_sig == sig::RECORD {
            let job = match self.pending.front() {
                Some(Pending::Stream(job)) => job.clone(),
                Some(Pending::AckFailure) => {
                    return Err(Error::protocol("received RECORD while awaiting ACK_FAILURE's reply"))
                }
                None => return Err(Error::protocol("received RECORD with no pending stream")),
            };
            let record = crate::stream::decode_record(&raw)?;
            job.borrow_mut().push_record(record);
            return Ok(());
        }

        self.scratch.drain();
        let msg = Message::decode(&raw, &self.scratch)?;

        match self.pending.front() {
            Some(Pending::AckFailure) => {
                match msg.signature {
                    sig::SUCCESS => {
                        self.awaiting_ack = false;
                    }
                    other => {
                        return Err(Error::protocol(format!(
                            "unexpected reply to auto-sent ACK_FAILURE: signature 0x{other:02X}"
                        )))
                    }
                }
                self.pending.pop_front();
                Ok(())
            }
            Some(Pending::Stream(job)) => {
                let job = job.clone();
                let (disposition, sent_ack) = match msg.signature {
                    sig::SUCCESS => (job.borrow_mut().on_success(msg.fields), false),
                    sig::FAILURE => {
                        let failure = extract_failure(msg.fields);
                        tracing::debug!(code = %failure.code, "server reported failure, auto-acking");
                        let d = job.borrow_mut().on_failure(failure);
                        self.connection.send_message(&message::encode_ack_failure())?;
                        self.awaiting_ack = true;
                        (d, true)
                    }
                    sig::IGNORED => (job.borrow_mut().on_ignored(), false),
                    other => {
                        return Err(Error::protocol(format!(
                            "unexpected message signature 0x{other:02X} while streaming"
                        )))
                    }
                };

                if matches!(disposition, Disposition::Pop) {
                    self.pending.pop_front();
                }
                // The auto ACK_FAILURE's own SUCCESS must be drained through
                // its own queue slot, appended once right here, never
                // misrouted to whatever job comes next.
                if sent_ack {
                    self.pending.push_back(Pending::AckFailure);
                }
                Ok(())
            }
            None => Err(Error::protocol("received control message with no pending stream")),
        }
    }

    /// Reset the session: discard any buffered state and notify every
    /// attached stream so they fail cleanly instead of hanging.
    pub fn reset(&mut self) -> Result<()> {
        self.connection.send_message(&message::encode_reset())?;
        let raw = self.connection.recv_message()?;
        self.scratch.drain();
        let msg = Message::decode(&raw, &self.scratch)?;
        self.pending.clear();
        self.jobs.notify_all(SessionEvent::Reset);
        self.awaiting_ack = false;
        match msg.signature {
            sig::SUCCESS => Ok(()),
            other => Err(Error::protocol(format!(
                "unexpected reply to RESET: signature 0x{other:02X}"
            ))),
        }
    }

    /// Tear down the session. Notifies every still-attached stream and
    /// marks the connection as done; does not send a GOODBYE-style message
    /// since the negotiated protocol here has none.
    pub fn close(&mut self) {
        self.ended = true;
        self.jobs.notify_all(SessionEvent::Ended);
        self.pending.clear();
        self.connection.mark_broken();
    }

    pub fn is_broken(&self) -> bool {
        self.connection.is_broken()
    }

    /// Close a result stream early. Its reply slot stays in the pending
    /// queue (the server doesn't know the caller stopped reading, so later
    /// dispatch can't skip it without desyncing the FIFO); from here on any
    /// RECORD still arriving for it is silently discarded instead of
    /// buffered.
    pub fn close_stream(&mut self, handle: &StreamHandle) {
        handle.0.borrow_mut().close();
    }
}

fn extract_failure(fields: &[Value<'_>]) -> ServerFailure {
    let mut code = String::from("Unknown.Unknown");
    let mut message = String::new();
    if let Some(metadata) = fields.first().and_then(|v| v.as_map()) {
        for (k, v) in metadata {
            match *k {
                "code" => {
                    if let Some(s) = v.as_str() {
                        code = s.to_owned();
                    }
                }
                "message" => {
                    if let Some(s) = v.as_str() {
                        message = s.to_owned();
                    }
                }
                _ => {}
            }
        }
    }
    ServerFailure { code, message }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        if !self.ended {
            self.jobs.notify_all(SessionEvent::Ended);
        }
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

    fn chunk(payload: &[u8], out: &mut Vec<u8>) {
        crate::primitive::write_u16(out, payload.len() as u16);
        out.extend_from_slice(payload);
        crate::primitive::write_u16(out, 0);
    }

    fn scripted_pipe(messages: &[Vec<u8>]) -> Pipe {
        let mut wire = vec![0, 0, 0, 1]; // handshake reply
        for msg in messages {
            chunk(msg, &mut wire);
        }
        Pipe {
            to_read: Cursor::new(wire),
            written: Vec::new(),
        }
    }

    #[test]
    fn connect_sends_init_and_reads_success() {
        let success = Message::encode(sig::SUCCESS, &[]);
        let pipe = scripted_pipe(&[success]);
        let session = Session::connect(pipe, &ConnectOpts::default()).unwrap();
        assert!(!session.is_broken());
    }

    #[test]
    fn run_then_fetch_drains_records_then_summary() {
        let init_success = Message::encode(sig::SUCCESS, &[]);
        let fields = [Value::String("n")];
        let run_meta = [("fields", Value::List(&fields))];
        let run_success = Message::encode(sig::SUCCESS, &[Value::Map(&run_meta)]);
        let record = Message::encode(sig::RECORD, &[Value::Int(7)]);
        let pull_success = Message::encode(sig::SUCCESS, &[]);

        let pipe = scripted_pipe(&[init_success, run_success, record, pull_success]);
        let mut session = Session::connect(pipe, &ConnectOpts::default()).unwrap();
        let handle = session.run("RETURN 7 AS n", &[]).unwrap();

        let first = session.fetch_next(&handle).unwrap();
        assert_eq!(first.unwrap().get(0), Some(Value::Int(7)));
        let second = session.fetch_next(&handle).unwrap();
        assert!(second.is_none());
        assert_eq!(handle.status(), Status::Drained);
    }
}

//! A client library for a versioned, chunked binary graph-database wire
//! protocol: handshake negotiation, a PackStream-like value codec, and a
//! pipelined request/response session built on top of them.
//!
//! ```no_run
//! use bolt_client::{ConnectOpts, Session};
//! use bolt_client::transport::connect_tcp;
//!
//! # fn main() -> bolt_client::error::Result<()> {
//! let transport = connect_tcp("localhost:7687", None, None)?;
//! let mut session = Session::connect(transport, &ConnectOpts::default())?;
//! let handle = session.run("RETURN 1 AS n", &[])?;
//! while let Some(record) = session.fetch_next(&handle)? {
//!     let _ = record.get(0);
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod connection;
pub mod constant;
pub mod error;
pub mod job;
pub mod message;
pub mod mpool;
pub mod opts;
pub mod primitive;
pub mod session;
pub mod stream;
pub mod transport;
pub mod value;

pub use connection::Connection;
pub use error::{Error, Result};
pub use mpool::Mpool;
pub use opts::{Auth, ConnectOpts};
pub use session::{Session, StreamHandle};
pub use stream::{Plan, Record, Status, Summary};
pub use value::{Node, Path, Relationship, UnboundRelationship, Value};

//! Message codec: every request/response is a single top-level PackStream
//! struct whose signature is the message type and whose fields are the
//! message's arguments.

use crate::constant::marker;
use crate::constant::message as sig;
use crate::error::{Error, Result};
use crate::mpool::Mpool;
use crate::primitive::{read_u16, read_u8};
use crate::value::Value;

/// A decoded message: signature plus its fields, borrowed from the pool
/// used to decode it.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub signature: u8,
    pub fields: &'a [Value<'a>],
}

impl<'a> Message<'a> {
    pub fn decode(raw: &[u8], pool: &'a Mpool) -> Result<Message<'a>> {
        let (value, rest) = Value::decode(raw, pool)?;
        if !rest.is_empty() {
            return Err(Error::protocol("trailing bytes after top-level message struct"));
        }
        match value {
            Value::Struct(signature, fields) => Ok(Message { signature, fields }),
            _ => Err(Error::protocol("message is not a struct")),
        }
    }

    pub fn encode(signature: u8, fields: &[Value<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        Value::Struct(signature, fields).encode(&mut out);
        out
    }

    pub fn is_summary(&self) -> bool {
        matches!(self.signature, sig::SUCCESS | sig::FAILURE | sig::IGNORED)
    }

    pub fn is_record(&self) -> bool {
        self.signature == sig::RECORD
    }
}

/// Read just enough of a raw message to learn its signature byte, without
/// decoding the full struct. Used by the session dispatch loop to decide
/// which pool (short-lived scratch vs. a fresh per-record arena) to decode
/// into before committing to a full decode.
pub fn peek_signature(raw: &[u8]) -> Result<u8> {
    let (m, rest) = read_u8(raw)?;
    match m {
        tiny if (marker::TINY_STRUCT_MIN..=marker::TINY_STRUCT_MAX).contains(&tiny) => {
            let (sig, _) = read_u8(rest)?;
            Ok(sig)
        }
        marker::STRUCT8 => {
            let (_, rest) = read_u8(rest)?;
            let (sig, _) = read_u8(rest)?;
            Ok(sig)
        }
        marker::STRUCT16 => {
            let (_, rest) = read_u16(rest)?;
            let (sig, _) = read_u8(rest)?;
            Ok(sig)
        }
        other => Err(Error::protocol(format!(
            "top-level message is not a struct (marker 0x{other:02X})"
        ))),
    }
}

/// Build the raw bytes for an INIT message: `user_agent`, `auth_token` map.
pub fn encode_init(user_agent: &str, auth: &[(&str, Value<'_>)]) -> Vec<u8> {
    let fields = [Value::String(user_agent), Value::Map(auth)];
    Message::encode(sig::INIT, &fields)
}

/// Build the raw bytes for a RUN message: `statement`, `parameters` map.
pub fn encode_run(statement: &str, parameters: &[(&str, Value<'_>)]) -> Vec<u8> {
    let fields = [Value::String(statement), Value::Map(parameters)];
    Message::encode(sig::RUN, &fields)
}

pub fn encode_pull_all() -> Vec<u8> {
    Message::encode(sig::PULL_ALL, &[])
}

pub fn encode_discard_all() -> Vec<u8> {
    Message::encode(sig::DISCARD_ALL, &[])
}

pub fn encode_ack_failure() -> Vec<u8> {
    Message::encode(sig::ACK_FAILURE, &[])
}

pub fn encode_reset() -> Vec<u8> {
    Message::encode(sig::RESET, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_message_roundtrips_through_decode() {
        let params = [("limit", Value::Int(10))];
        let bytes = encode_run("MATCH (n) RETURN n", &params);
        let pool = Mpool::new();
        let msg = Message::decode(&bytes, &pool).unwrap();
        assert_eq!(msg.signature, sig::RUN);
        assert_eq!(msg.fields[0], Value::String("MATCH (n) RETURN n"));
        assert_eq!(msg.fields[1].as_map().unwrap()[0].0, "limit");
    }

    #[test]
    fn pull_all_has_no_fields() {
        let bytes = encode_pull_all();
        let pool = Mpool::new();
        let msg = Message::decode(&bytes, &pool).unwrap();
        assert_eq!(msg.signature, sig::PULL_ALL);
        assert!(msg.fields.is_empty());
    }

    #[test]
    fn record_and_summary_classification() {
        let pool = Mpool::new();
        let record = Message::decode(&Message::encode(sig::RECORD, &[Value::Int(1)]), &pool)
            .unwrap();
        assert!(record.is_record());
        assert!(!record.is_summary());

        let pool2 = Mpool::new();
        let success =
            Message::decode(&Message::encode(sig::SUCCESS, &[]), &pool2).unwrap();
        assert!(success.is_summary());
    }
}

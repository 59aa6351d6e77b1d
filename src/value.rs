//! The value model: a PackStream-like dynamically typed value, plus the
//! graph-specific structures (`Node`, `Relationship`, `UnboundRelationship`,
//! `Path`) carried inside it.
//!
//! Decoded values borrow their string/list/map/struct payloads from an
//! [`Mpool`](crate::mpool::Mpool) passed in by the caller; nothing here
//! allocates on the general heap once decoding is underway.

use crate::constant::{marker, structure};
use crate::error::{Error, Result};
use crate::mpool::Mpool;
use crate::primitive::{read_bytes, read_u16, read_u32, read_u64, read_u8, write_u16, write_u32};

/// A dynamically typed wire value.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(&'a str),
    List(&'a [Value<'a>]),
    Map(&'a [(&'a str, Value<'a>)]),
    Node(Node<'a>),
    Relationship(Relationship<'a>),
    UnboundRelationship(UnboundRelationship<'a>),
    Path(Path<'a>),
    /// A struct with a signature this crate doesn't assign special meaning
    /// to (forward compatibility with server-side extensions).
    Struct(u8, &'a [Value<'a>]),
}

/// Maps compare as an unordered collection of entries: same length, and
/// every entry in `a` has a matching `(key, value)` somewhere in `b`. Keys
/// are assumed unique within one map, as the wire format guarantees.
fn maps_eq(a: &[(&str, Value<'_>)], b: &[(&str, Value<'_>)]) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
}

impl<'a> PartialEq for Value<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => maps_eq(a, b),
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Relationship(a), Value::Relationship(b)) => a == b,
            (Value::UnboundRelationship(a), Value::UnboundRelationship(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::Struct(sa, fa), Value::Struct(sb, fb)) => sa == sb && fa == fb,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    pub id: i64,
    pub labels: &'a [&'a str],
    pub properties: &'a [(&'a str, Value<'a>)],
}

impl<'a> PartialEq for Node<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.labels == other.labels && maps_eq(self.properties, other.properties)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Relationship<'a> {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: &'a str,
    pub properties: &'a [(&'a str, Value<'a>)],
}

impl<'a> PartialEq for Relationship<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.start_node_id == other.start_node_id
            && self.end_node_id == other.end_node_id
            && self.rel_type == other.rel_type
            && maps_eq(self.properties, other.properties)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnboundRelationship<'a> {
    pub id: i64,
    pub rel_type: &'a str,
    pub properties: &'a [(&'a str, Value<'a>)],
}

impl<'a> PartialEq for UnboundRelationship<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.rel_type == other.rel_type && maps_eq(self.properties, other.properties)
    }
}

/// An alternating sequence of nodes and relationships as returned in
/// compressed form: `nodes`, `rels` (unbound, direction implied by `ids`),
/// and `ids` giving a walk through them (`+n` selects the n-th relationship
/// traversed forward, `-n` traversed backward, 1-indexed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Path<'a> {
    pub nodes: &'a [Node<'a>],
    pub rels: &'a [UnboundRelationship<'a>],
    pub ids: &'a [i64],
}

impl<'a> Value<'a> {
    /// Decode one value from `data`, allocating any borrowed payload out of
    /// `pool`. Returns the value and the remaining unconsumed bytes.
    pub fn decode<'d>(data: &'d [u8], pool: &'a Mpool) -> Result<(Value<'a>, &'d [u8])> {
        let (marker, rest) = read_u8(data)?;
        decode_after_marker(marker, rest, pool)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(marker::NULL),
            Value::Bool(false) => out.push(marker::FALSE),
            Value::Bool(true) => out.push(marker::TRUE),
            Value::Int(n) => encode_int(*n, out),
            Value::Float(f) => {
                out.push(marker::FLOAT64);
                out.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Value::String(s) => encode_string(s, out),
            Value::List(items) => {
                encode_container_header(marker::TINY_LIST_MIN, marker::LIST8, items.len(), out);
                for item in *items {
                    item.encode(out);
                }
            }
            Value::Map(entries) => {
                encode_container_header(marker::TINY_MAP_MIN, marker::MAP8, entries.len(), out);
                for (k, v) in *entries {
                    encode_string(k, out);
                    v.encode(out);
                }
            }
            Value::Node(n) => {
                encode_struct_header(structure::NODE, 3, out);
                Value::Int(n.id).encode(out);
                encode_container_header(marker::TINY_LIST_MIN, marker::LIST8, n.labels.len(), out);
                for label in n.labels {
                    encode_string(label, out);
                }
                encode_properties(n.properties, out);
            }
            Value::Relationship(r) => {
                encode_struct_header(structure::RELATIONSHIP, 5, out);
                Value::Int(r.id).encode(out);
                Value::Int(r.start_node_id).encode(out);
                Value::Int(r.end_node_id).encode(out);
                encode_string(r.rel_type, out);
                encode_properties(r.properties, out);
            }
            Value::UnboundRelationship(r) => {
                encode_struct_header(structure::UNBOUND_RELATIONSHIP, 3, out);
                Value::Int(r.id).encode(out);
                encode_string(r.rel_type, out);
                encode_properties(r.properties, out);
            }
            Value::Path(p) => {
                encode_struct_header(structure::PATH, 3, out);
                encode_container_header(marker::TINY_LIST_MIN, marker::LIST8, p.nodes.len(), out);
                for node in p.nodes {
                    Value::Node(*node).encode(out);
                }
                encode_container_header(marker::TINY_LIST_MIN, marker::LIST8, p.rels.len(), out);
                for rel in p.rels {
                    Value::UnboundRelationship(*rel).encode(out);
                }
                encode_container_header(marker::TINY_LIST_MIN, marker::LIST8, p.ids.len(), out);
                for id in p.ids {
                    Value::Int(*id).encode(out);
                }
            }
            Value::Struct(sig, fields) => {
                encode_struct_header(*sig, fields.len(), out);
                for field in *fields {
                    field.encode(out);
                }
            }
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&'a [(&'a str, Value<'a>)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&'a [Value<'a>]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

fn encode_properties(props: &[(&str, Value<'_>)], out: &mut Vec<u8>) {
    encode_container_header(marker::TINY_MAP_MIN, marker::MAP8, props.len(), out);
    for (k, v) in props {
        encode_string(k, out);
        v.encode(out);
    }
}

fn encode_int(n: i64, out: &mut Vec<u8>) {
    if (-16..128).contains(&n) {
        out.push(n as u8);
    } else if let Ok(n8) = i8::try_from(n) {
        out.push(marker::INT8);
        out.push(n8 as u8);
    } else if let Ok(n16) = i16::try_from(n) {
        out.push(marker::INT16);
        out.extend_from_slice(&n16.to_be_bytes());
    } else if let Ok(n32) = i32::try_from(n) {
        out.push(marker::INT32);
        out.extend_from_slice(&n32.to_be_bytes());
    } else {
        out.push(marker::INT64);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    let len = s.len();
    if len <= 15 {
        out.push(marker::TINY_STRING_MIN | len as u8);
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker::STRING8);
        out.push(len8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(marker::STRING16);
        write_u16(out, len16);
    } else {
        out.push(marker::STRING32);
        write_u32(out, len as u32);
    }
    out.extend_from_slice(s.as_bytes());
}

fn encode_container_header(tiny_base: u8, marker8: u8, len: usize, out: &mut Vec<u8>) {
    if len <= 15 {
        out.push(tiny_base | len as u8);
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker8);
        out.push(len8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(marker8 + 1);
        write_u16(out, len16);
    } else {
        out.push(marker8 + 2);
        write_u32(out, len as u32);
    }
}

fn encode_struct_header(signature: u8, len: usize, out: &mut Vec<u8>) {
    if len <= 15 {
        out.push(marker::TINY_STRUCT_MIN | len as u8);
    } else if let Ok(len8) = u8::try_from(len) {
        out.push(marker::STRUCT8);
        out.push(len8);
    } else {
        out.push(marker::STRUCT16);
        write_u16(out, len as u16);
    }
    out.push(signature);
}

fn decode_after_marker<'d, 'a>(
    m: u8,
    rest: &'d [u8],
    pool: &'a Mpool,
) -> Result<(Value<'a>, &'d [u8])> {
    match m {
        marker::NULL => Ok((Value::Null, rest)),
        marker::TRUE => Ok((Value::Bool(true), rest)),
        marker::FALSE => Ok((Value::Bool(false), rest)),
        marker::FLOAT64 => {
            let (bits, rest) = read_u64(rest)?;
            Ok((Value::Float(f64::from_bits(bits)), rest))
        }
        marker::INT8 => {
            let (b, rest) = read_u8(rest)?;
            Ok((Value::Int(b as i8 as i64), rest))
        }
        marker::INT16 => {
            let (v, rest) = read_u16(rest)?;
            Ok((Value::Int(v as i16 as i64), rest))
        }
        marker::INT32 => {
            let (v, rest) = read_u32(rest)?;
            Ok((Value::Int(v as i32 as i64), rest))
        }
        marker::INT64 => {
            let (v, rest) = read_u64(rest)?;
            Ok((Value::Int(v as i64), rest))
        }
        _ if m < 0x80 => Ok((Value::Int(m as i64), rest)),
        _ if m >= 0xF0 => Ok((Value::Int((m as i8) as i64), rest)),
        _ if (marker::TINY_STRING_MIN..=marker::TINY_STRING_MAX).contains(&m) => {
            decode_string((m & 0x0F) as usize, rest, pool)
        }
        marker::STRING8 => {
            let (len, rest) = read_u8(rest)?;
            decode_string(len as usize, rest, pool)
        }
        marker::STRING16 => {
            let (len, rest) = read_u16(rest)?;
            decode_string(len as usize, rest, pool)
        }
        marker::STRING32 => {
            let (len, rest) = read_u32(rest)?;
            decode_string(len as usize, rest, pool)
        }
        _ if (marker::TINY_LIST_MIN..=marker::TINY_LIST_MAX).contains(&m) => {
            decode_list((m & 0x0F) as usize, rest, pool)
        }
        marker::LIST8 => {
            let (len, rest) = read_u8(rest)?;
            decode_list(len as usize, rest, pool)
        }
        marker::LIST16 => {
            let (len, rest) = read_u16(rest)?;
            decode_list(len as usize, rest, pool)
        }
        marker::LIST32 => {
            let (len, rest) = read_u32(rest)?;
            decode_list(len as usize, rest, pool)
        }
        _ if (marker::TINY_MAP_MIN..=marker::TINY_MAP_MAX).contains(&m) => {
            decode_map((m & 0x0F) as usize, rest, pool)
        }
        marker::MAP8 => {
            let (len, rest) = read_u8(rest)?;
            decode_map(len as usize, rest, pool)
        }
        marker::MAP16 => {
            let (len, rest) = read_u16(rest)?;
            decode_map(len as usize, rest, pool)
        }
        marker::MAP32 => {
            let (len, rest) = read_u32(rest)?;
            decode_map(len as usize, rest, pool)
        }
        _ if (marker::TINY_STRUCT_MIN..=marker::TINY_STRUCT_MAX).contains(&m) => {
            decode_struct((m & 0x0F) as usize, rest, pool)
        }
        marker::STRUCT8 => {
            let (len, rest) = read_u8(rest)?;
            decode_struct(len as usize, rest, pool)
        }
        marker::STRUCT16 => {
            let (len, rest) = read_u16(rest)?;
            decode_struct(len as usize, rest, pool)
        }
        other => Err(Error::protocol(format!("unknown marker byte 0x{other:02X}"))),
    }
}

fn decode_string<'d, 'a>(len: usize, rest: &'d [u8], pool: &'a Mpool) -> Result<(Value<'a>, &'d [u8])> {
    let (bytes, rest) = read_bytes(rest, len)?;
    let s = simdutf8::basic::from_utf8(bytes)
        .map_err(|_| Error::protocol("string field is not valid UTF-8"))?;
    let owned = pool.alloc_str(s);
    Ok((Value::String(owned), rest))
}

fn decode_list<'d, 'a>(len: usize, mut rest: &'d [u8], pool: &'a Mpool) -> Result<(Value<'a>, &'d [u8])> {
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        let (v, r) = Value::decode(rest, pool)?;
        items.push(v);
        rest = r;
    }
    let slice = pool.alloc_slice_fill(items.len(), items.into_iter());
    Ok((Value::List(slice), rest))
}

fn decode_map<'d, 'a>(
    len: usize,
    mut rest: &'d [u8],
    pool: &'a Mpool,
) -> Result<(Value<'a>, &'d [u8])> {
    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        let (key, r) = Value::decode(rest, pool)?;
        let key = key
            .as_str()
            .ok_or_else(|| Error::protocol("map key is not a string"))?;
        let (value, r) = Value::decode(r, pool)?;
        entries.push((key, value));
        rest = r;
    }
    let slice = pool.alloc_slice_fill(entries.len(), entries.into_iter());
    Ok((Value::Map(slice), rest))
}

fn decode_struct<'d, 'a>(
    len: usize,
    rest: &'d [u8],
    pool: &'a Mpool,
) -> Result<(Value<'a>, &'d [u8])> {
    let (sig, mut rest) = read_u8(rest)?;
    let mut fields = Vec::with_capacity(len);
    for _ in 0..len {
        let (v, r) = Value::decode(rest, pool)?;
        fields.push(v);
        rest = r;
    }
    match (sig, fields.len()) {
        (structure::NODE, 3) => {
            let id = fields[0]
                .as_int()
                .ok_or_else(|| Error::protocol("node id is not an int"))?;
            let labels = fields[1]
                .as_list()
                .ok_or_else(|| Error::protocol("node labels is not a list"))?;
            let mut label_strs = Vec::with_capacity(labels.len());
            for l in labels {
                label_strs.push(
                    l.as_str()
                        .ok_or_else(|| Error::protocol("node label is not a string"))?,
                );
            }
            let labels = pool.alloc_slice_fill(label_strs.len(), label_strs.into_iter());
            let properties = fields[2]
                .as_map()
                .ok_or_else(|| Error::protocol("node properties is not a map"))?;
            Ok((
                Value::Node(Node {
                    id,
                    labels,
                    properties,
                }),
                rest,
            ))
        }
        (structure::RELATIONSHIP, 5) => {
            let id = fields[0]
                .as_int()
                .ok_or_else(|| Error::protocol("rel id is not an int"))?;
            let start_node_id = fields[1]
                .as_int()
                .ok_or_else(|| Error::protocol("rel start id is not an int"))?;
            let end_node_id = fields[2]
                .as_int()
                .ok_or_else(|| Error::protocol("rel end id is not an int"))?;
            let rel_type = fields[3]
                .as_str()
                .ok_or_else(|| Error::protocol("rel type is not a string"))?;
            let properties = fields[4]
                .as_map()
                .ok_or_else(|| Error::protocol("rel properties is not a map"))?;
            Ok((
                Value::Relationship(Relationship {
                    id,
                    start_node_id,
                    end_node_id,
                    rel_type,
                    properties,
                }),
                rest,
            ))
        }
        (structure::UNBOUND_RELATIONSHIP, 3) => {
            let id = fields[0]
                .as_int()
                .ok_or_else(|| Error::protocol("unbound rel id is not an int"))?;
            let rel_type = fields[1]
                .as_str()
                .ok_or_else(|| Error::protocol("unbound rel type is not a string"))?;
            let properties = fields[2]
                .as_map()
                .ok_or_else(|| Error::protocol("unbound rel properties is not a map"))?;
            Ok((
                Value::UnboundRelationship(UnboundRelationship {
                    id,
                    rel_type,
                    properties,
                }),
                rest,
            ))
        }
        (structure::PATH, 3) => {
            let raw_nodes = fields[0]
                .as_list()
                .ok_or_else(|| Error::protocol("path nodes is not a list"))?;
            let mut nodes = Vec::with_capacity(raw_nodes.len());
            for v in raw_nodes {
                match v {
                    Value::Node(n) => nodes.push(*n),
                    _ => return Err(Error::protocol("path nodes entry is not a Node")),
                }
            }
            let raw_rels = fields[1]
                .as_list()
                .ok_or_else(|| Error::protocol("path rels is not a list"))?;
            let mut rels = Vec::with_capacity(raw_rels.len());
            for v in raw_rels {
                match v {
                    Value::UnboundRelationship(r) => rels.push(*r),
                    _ => {
                        return Err(Error::protocol(
                            "path rels entry is not an UnboundRelationship",
                        ))
                    }
                }
            }
            let raw_ids = fields[2]
                .as_list()
                .ok_or_else(|| Error::protocol("path ids is not a list"))?;
            let mut ids = Vec::with_capacity(raw_ids.len());
            for v in raw_ids {
                ids.push(
                    v.as_int()
                        .ok_or_else(|| Error::protocol("path id entry is not an int"))?,
                );
            }
            let nodes = pool.alloc_slice_fill(nodes.len(), nodes.into_iter());
            let rels = pool.alloc_slice_fill(rels.len(), rels.into_iter());
            let ids = pool.alloc_slice_fill(ids.len(), ids.into_iter());
            Ok((Value::Path(Path { nodes, rels, ids }), rest))
        }
        _ => {
            let slice = pool.alloc_slice_fill(fields.len(), fields.into_iter());
            Ok((Value::Struct(sig, slice), rest))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value<'_>) -> Vec<u8> {
        let mut out = Vec::new();
        v.encode(&mut out);
        out
    }

    #[test]
    fn tiny_int_roundtrip() {
        let pool = Mpool::new();
        let bytes = roundtrip(Value::Int(42));
        let (v, rest) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::Int(42));
        assert!(rest.is_empty());
    }

    #[test]
    fn negative_tiny_int_roundtrip() {
        let pool = Mpool::new();
        let bytes = roundtrip(Value::Int(-5));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::Int(-5));
    }

    #[test]
    fn int64_roundtrip() {
        let pool = Mpool::new();
        let bytes = roundtrip(Value::Int(i64::MIN));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::Int(i64::MIN));
    }

    #[test]
    fn float_roundtrip() {
        let pool = Mpool::new();
        let bytes = roundtrip(Value::Float(3.5));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::Float(3.5));
    }

    #[test]
    fn string_roundtrip_short_and_long() {
        let pool = Mpool::new();
        let bytes = roundtrip(Value::String("hi"));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::String("hi"));

        let long = "x".repeat(300);
        let pool2 = Mpool::new();
        let bytes = roundtrip(Value::String(&long));
        let (v, _) = Value::decode(&bytes, &pool2).unwrap();
        assert_eq!(v.as_str(), Some(long.as_str()));
    }

    #[test]
    fn list_roundtrip() {
        let pool = Mpool::new();
        let items = [Value::Int(1), Value::Int(2), Value::Null];
        let bytes = roundtrip(Value::List(&items));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::List(&items));
    }

    #[test]
    fn map_roundtrip() {
        let pool = Mpool::new();
        let entries = [("a", Value::Int(1)), ("b", Value::Bool(true))];
        let bytes = roundtrip(Value::Map(&entries));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::Map(&entries));
    }

    #[test]
    fn node_roundtrip() {
        let pool = Mpool::new();
        let labels = ["Person"];
        let props = [("name", Value::String("Alice"))];
        let node = Node {
            id: 7,
            labels: &labels,
            properties: &props,
        };
        let bytes = roundtrip(Value::Node(node));
        let (v, _) = Value::decode(&bytes, &pool).unwrap();
        assert_eq!(v, Value::Node(node));
    }

    #[test]
    fn unknown_marker_is_protocol_error() {
        let pool = Mpool::new();
        assert!(Value::decode(&[0xC7], &pool).is_err());
    }
}

//! Canonical CBOR encoding of event bodies.
//!
//! Event hashes are computed over these bytes, so the encoding must be
//! identical on every platform:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)

use ciborium::value::Value;

use crate::event::{ChannelProperties, EventBody, Inception, Payload};
use crate::signer::DelegateSig;
use crate::stream::StreamId;

/// Body field keys. Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const CREATOR: u64 = 0;
    pub const SALT: u64 = 1;
    pub const PREV_EVENTS: u64 = 2;
    pub const CREATED_AT: u64 = 3;
    pub const DELEGATE_SIG: u64 = 4;
    pub const PAYLOAD: u64 = 5;

    pub const PAYLOAD_KIND: u64 = 0;
}

/// Encode an event body to canonical CBOR bytes.
pub fn canonical_body_bytes(body: &EventBody) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &body_to_cbor_value(body));
    buf
}

fn key(k: u64) -> Value {
    Value::Integer(k.into())
}

fn text(s: &str) -> Value {
    Value::Text(s.to_owned())
}

fn opt_stream(id: &Option<StreamId>) -> Value {
    id.as_ref().map_or(Value::Null, |id| text(id.as_str()))
}

fn body_to_cbor_value(body: &EventBody) -> Value {
    let prevs = body
        .prev_events
        .iter()
        .map(|h| Value::Bytes(h.0.to_vec()))
        .collect();

    Value::Map(vec![
        (key(keys::CREATOR), Value::Bytes(body.creator_address.0.to_vec())),
        (key(keys::SALT), Value::Bytes(body.salt.to_vec())),
        (key(keys::PREV_EVENTS), Value::Array(prevs)),
        (key(keys::CREATED_AT), Value::Integer(body.created_at_ms.into())),
        (key(keys::DELEGATE_SIG), delegate_to_cbor_value(body.delegate_sig.as_ref())),
        (key(keys::PAYLOAD), payload_to_cbor_value(&body.payload)),
    ])
}

fn delegate_to_cbor_value(sig: Option<&DelegateSig>) -> Value {
    match sig {
        Some(sig) => Value::Map(vec![
            (key(0), Value::Bytes(sig.signature.0.to_vec())),
            (key(1), Value::Integer(sig.expiry_ms.into())),
        ]),
        None => Value::Null,
    }
}

fn properties_to_cbor_value(props: Option<&ChannelProperties>) -> Value {
    match props {
        Some(p) => Value::Map(vec![(key(0), text(&p.name)), (key(1), text(&p.topic))]),
        None => Value::Null,
    }
}

fn payload_to_cbor_value(payload: &Payload) -> Value {
    let mut entries = vec![(key(keys::PAYLOAD_KIND), Value::Integer(payload.kind_tag().into()))];

    match payload {
        Payload::Inception(Inception {
            stream_id,
            kind,
            space_id,
            properties,
        }) => {
            entries.push((key(1), text(stream_id.as_str())));
            entries.push((key(2), Value::Integer(kind.to_u8().into())));
            entries.push((key(3), opt_stream(space_id)));
            entries.push((key(4), properties_to_cbor_value(properties.as_ref())));
        }
        Payload::UserMembership { op, stream_id } => {
            entries.push((key(1), Value::Integer(op.to_u32().into())));
            entries.push((key(2), text(stream_id.as_str())));
        }
        Payload::Membership { op, user } => {
            entries.push((key(1), Value::Integer(op.to_u32().into())));
            entries.push((key(2), Value::Bytes(user.0.to_vec())));
        }
        Payload::Channel {
            op,
            channel_id,
            properties,
        } => {
            entries.push((key(1), Value::Integer(op.to_u32().into())));
            entries.push((key(2), text(channel_id.as_str())));
            entries.push((key(3), properties_to_cbor_value(properties.as_ref())));
        }
        Payload::Message { text: body } => {
            entries.push((key(1), text(body)));
        }
        Payload::Unrecognized { .. } => {}
    }

    Value::Map(entries)
}

/// Recursively encode a CBOR value.
///
/// Only the value shapes produced above are supported.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        _ => unreachable!("event bodies never contain floats or tags"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // -1 encodes as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

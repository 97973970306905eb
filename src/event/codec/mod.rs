//! Avro binary codec for `OrderCreated`.
//!
//! Wire layout (no header, no schema fingerprint):
//! `order_id (string), store_id (string), total_amount_cents (int),
//! status (string), created_at (long)`.
//!
//! - `int`/`long`: zigzag-encoded variable-length integers
//! - `string`: `long` byte length followed by UTF-8 bytes
//!
//! Encoding is deterministic. Decoding is all-or-nothing: any structural
//! mismatch returns a `DecodeError` and no value.

use bytes::{BufMut, Bytes, BytesMut};

use super::OrderCreated;

/// Maximum encoded width of an Avro `int`.
const MAX_INT_BYTES: usize = 5;
/// Maximum encoded width of an Avro `long`.
const MAX_LONG_BYTES: usize = 10;

pub(crate) const ORDER_ID: &str = "order_id";
pub(crate) const STORE_ID: &str = "store_id";
pub(crate) const TOTAL_AMOUNT_CENTS: &str = "total_amount_cents";
pub(crate) const STATUS: &str = "status";
pub(crate) const CREATED_AT: &str = "created_at";

/// Field names and Avro primitive types, in wire order.
pub(crate) const FIELDS: [(&str, &str); 5] = [
    (ORDER_ID, "string"),
    (STORE_ID, "string"),
    (TOTAL_AMOUNT_CENTS, "int"),
    (STATUS, "string"),
    (CREATED_AT, "long"),
];

/// Errors from decoding a record that does not conform to the schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Input truncated while reading '{field}'")]
    Truncated { field: &'static str },

    #[error("Malformed variable-length integer in '{field}'")]
    MalformedVarint { field: &'static str },

    #[error("Value {value} out of range for '{field}'")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("Negative length {len} for '{field}'")]
    NegativeLength { field: &'static str, len: i64 },

    #[error("Invalid UTF-8 in '{field}'")]
    InvalidUtf8 { field: &'static str },

    #[error("{count} trailing bytes after last field")]
    TrailingBytes { count: usize },
}

/// Encode an event to its wire bytes.
pub fn encode(event: &OrderCreated) -> Bytes {
    let capacity = event.order_id.len()
        + event.store_id.len()
        + event.status.len()
        + 3 * MAX_LONG_BYTES
        + MAX_INT_BYTES
        + MAX_LONG_BYTES;
    let mut buf = BytesMut::with_capacity(capacity);

    put_string(&mut buf, &event.order_id);
    put_string(&mut buf, &event.store_id);
    put_long(&mut buf, i64::from(event.total_amount_cents));
    put_string(&mut buf, &event.status);
    put_long(&mut buf, event.created_at);

    buf.freeze()
}

/// Decode wire bytes into an event.
pub fn decode(bytes: &[u8]) -> Result<OrderCreated, DecodeError> {
    let mut reader = Reader::new(bytes);

    let order_id = reader.string(ORDER_ID)?;
    let store_id = reader.string(STORE_ID)?;
    let total_amount_cents = reader.int(TOTAL_AMOUNT_CENTS)?;
    let status = reader.string(STATUS)?;
    let created_at = reader.long(CREATED_AT)?;

    let remaining = reader.remaining();
    if remaining > 0 {
        return Err(DecodeError::TrailingBytes { count: remaining });
    }

    Ok(OrderCreated {
        order_id,
        store_id,
        total_amount_cents,
        status,
        created_at,
    })
}

fn put_long(buf: &mut BytesMut, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n >= 0x80 {
        buf.put_u8((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    buf.put_u8(n as u8);
}

fn put_string(buf: &mut BytesMut, value: &str) {
    put_long(buf, value.len() as i64);
    buf.put_slice(value.as_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Read a zigzag varint of at most `max_bytes` bytes.
    fn varint(&mut self, field: &'static str, max_bytes: usize) -> Result<i64, DecodeError> {
        let mut value: u64 = 0;
        for i in 0..max_bytes {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(DecodeError::Truncated { field })?;
            self.pos += 1;

            // The final byte of a 10-byte long may only carry one bit.
            if i == MAX_LONG_BYTES - 1 && byte > 0x01 {
                return Err(DecodeError::MalformedVarint { field });
            }

            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((value >> 1) as i64 ^ -((value & 1) as i64));
            }
        }
        Err(DecodeError::MalformedVarint { field })
    }

    fn long(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        self.varint(field, MAX_LONG_BYTES)
    }

    fn int(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        let value = self.varint(field, MAX_INT_BYTES)?;
        i32::try_from(value).map_err(|_| DecodeError::OutOfRange { field, value })
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.long(field)?;
        if len < 0 {
            return Err(DecodeError::NegativeLength { field, len });
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(DecodeError::Truncated { field });
        }

        let raw = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }
}

//! Schema driven binary codec.
//!
//! Layout rules, shared with the on-chain program (which reads the same bytes
//! through borsh):
//! - integers are little-endian and fixed width
//! - `Bytes` and `Vec` carry a u32 little-endian length prefix
//! - `FixedBytes(n)` and `Array(_, n)` carry no prefix
//! - records are their fields in schema order, nothing in between
//! - enums are one discriminant byte followed by the variant's fields
//!
//! Schemas are plain data. Field order and discriminants are wire format:
//! reordering a record or renumbering a variant is a breaking change.

use crate::error::{LotteryError, Result};

/// Width of every length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub schema: Schema,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variant {
    pub discriminant: u8,
    pub name: &'static str,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    U8,
    U16,
    U32,
    U64,
    U128,
    Bool,
    /// Exactly `n` raw bytes, e.g. hashes and public keys.
    FixedBytes(usize),
    /// Length-prefixed raw bytes.
    Bytes,
    /// Length-prefixed sequence.
    Vec(Box<Schema>),
    /// Sequence of exactly `n` elements, no prefix.
    Array(Box<Schema>, usize),
    Struct(Vec<Field>),
    Enum(Vec<Variant>),
}

/// A decoded value. Record and variant fields are positional, in schema order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Bool(bool),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(Vec<Value>),
    Variant { discriminant: u8, fields: Vec<Value> },
}

pub fn field(name: &'static str, schema: Schema) -> Field {
    Field { name, schema }
}

pub fn variant(discriminant: u8, name: &'static str, fields: Vec<Field>) -> Variant {
    Variant {
        discriminant,
        name,
        fields,
    }
}

impl Schema {
    pub fn vec(inner: Schema) -> Schema {
        Schema::Vec(Box::new(inner))
    }

    pub fn array(inner: Schema, len: usize) -> Schema {
        Schema::Array(Box::new(inner), len)
    }

    /// Smallest number of bytes any value of this schema can occupy.
    pub fn min_size(&self) -> usize {
        match self {
            Schema::U8 | Schema::Bool => 1,
            Schema::U16 => 2,
            Schema::U32 => 4,
            Schema::U64 => 8,
            Schema::U128 => 16,
            Schema::FixedBytes(n) => *n,
            Schema::Bytes | Schema::Vec(_) => LENGTH_PREFIX_BYTES,
            Schema::Array(inner, n) => inner.min_size().saturating_mul(*n),
            Schema::Struct(fields) => fields.iter().map(|f| f.schema.min_size()).sum(),
            Schema::Enum(variants) => {
                1 + variants
                    .iter()
                    .map(|v| v.fields.iter().map(|f| f.schema.min_size()).sum::<usize>())
                    .min()
                    .unwrap_or(0)
            }
        }
    }

    fn find_variant(&self, discriminant: u8) -> Option<&Variant> {
        match self {
            Schema::Enum(variants) => variants.iter().find(|v| v.discriminant == discriminant),
            _ => None,
        }
    }
}

fn mismatch(expected: &Schema, found: &Value) -> LotteryError {
    LotteryError::SchemaMismatch(format!("expected {:?}, found {:?}", expected, found))
}

fn length_prefix(len: usize, out: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| LotteryError::SchemaMismatch(format!("length {} exceeds u32", len)))?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

/// Encode `value` according to `schema`.
pub fn encode(value: &Value, schema: &Schema) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(schema.min_size());
    encode_into(value, schema, &mut out)?;
    Ok(out)
}

pub fn encode_into(value: &Value, schema: &Schema, out: &mut Vec<u8>) -> Result<()> {
    match (schema, value) {
        (Schema::U8, Value::U8(v)) => out.push(*v),
        (Schema::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (Schema::U32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (Schema::U64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (Schema::U128, Value::U128(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (Schema::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        (Schema::FixedBytes(n), Value::Bytes(bytes)) => {
            if bytes.len() != *n {
                return Err(LotteryError::SchemaMismatch(format!(
                    "fixed byte array expects {} bytes, found {}",
                    n,
                    bytes.len()
                )));
            }
            out.extend_from_slice(bytes);
        }
        (Schema::Bytes, Value::Bytes(bytes)) => {
            length_prefix(bytes.len(), out)?;
            out.extend_from_slice(bytes);
        }
        (Schema::Vec(inner), Value::List(items)) => {
            length_prefix(items.len(), out)?;
            for item in items {
                encode_into(item, inner, out)?;
            }
        }
        (Schema::Array(inner, n), Value::List(items)) => {
            if items.len() != *n {
                return Err(LotteryError::SchemaMismatch(format!(
                    "array expects {} elements, found {}",
                    n,
                    items.len()
                )));
            }
            for item in items {
                encode_into(item, inner, out)?;
            }
        }
        (Schema::Struct(fields), Value::Record(values)) => encode_fields(fields, values, out)?,
        (Schema::Enum(_), Value::Variant { discriminant, fields }) => {
            let variant = schema.find_variant(*discriminant).ok_or_else(|| {
                LotteryError::SchemaMismatch(format!("unknown discriminant {}", discriminant))
            })?;
            out.push(*discriminant);
            encode_fields(&variant.fields, fields, out)?;
        }
        (schema, value) => return Err(mismatch(schema, value)),
    }
    Ok(())
}

fn encode_fields(fields: &[Field], values: &[Value], out: &mut Vec<u8>) -> Result<()> {
    if fields.len() != values.len() {
        return Err(LotteryError::SchemaMismatch(format!(
            "record expects {} fields, found {}",
            fields.len(),
            values.len()
        )));
    }
    for (field, value) in fields.iter().zip(values) {
        encode_into(value, &field.schema, out)
            .map_err(|e| LotteryError::SchemaMismatch(format!("field `{}`: {}", field.name, e)))?;
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(LotteryError::MalformedEncoding(format!(
                "need {} bytes at offset {}, only {} remain",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn length(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.array()?) as usize)
    }
}

/// Decode a complete value. Trailing bytes are rejected.
pub fn decode(data: &[u8], schema: &Schema) -> Result<Value> {
    let (value, used) = decode_prefix(data, schema)?;
    if used != data.len() {
        return Err(LotteryError::MalformedEncoding(format!(
            "{} trailing bytes after value",
            data.len() - used
        )));
    }
    Ok(value)
}

/// Decode one value from the front of `data`, returning it and the bytes consumed.
pub fn decode_prefix(data: &[u8], schema: &Schema) -> Result<(Value, usize)> {
    let mut reader = Reader { data, pos: 0 };
    let value = decode_value(&mut reader, schema)?;
    Ok((value, reader.pos))
}

fn decode_value(reader: &mut Reader<'_>, schema: &Schema) -> Result<Value> {
    let value = match schema {
        Schema::U8 => Value::U8(reader.array::<1>()?[0]),
        Schema::U16 => Value::U16(u16::from_le_bytes(reader.array()?)),
        Schema::U32 => Value::U32(u32::from_le_bytes(reader.array()?)),
        Schema::U64 => Value::U64(u64::from_le_bytes(reader.array()?)),
        Schema::U128 => Value::U128(u128::from_le_bytes(reader.array()?)),
        Schema::Bool => match reader.array::<1>()?[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => {
                return Err(LotteryError::MalformedEncoding(format!(
                    "invalid bool byte {}",
                    other
                )))
            }
        },
        Schema::FixedBytes(n) => Value::Bytes(reader.take(*n)?.to_vec()),
        Schema::Bytes => {
            let len = reader.length()?;
            Value::Bytes(reader.take(len)?.to_vec())
        }
        Schema::Vec(inner) => {
            let count = reader.length()?;
            Value::List(decode_elements(reader, inner, count)?)
        }
        Schema::Array(inner, n) => Value::List(decode_elements(reader, inner, *n)?),
        Schema::Struct(fields) => Value::Record(decode_fields(reader, fields)?),
        Schema::Enum(_) => {
            let discriminant = reader.array::<1>()?[0];
            let variant = schema.find_variant(discriminant).ok_or_else(|| {
                LotteryError::MalformedEncoding(format!("unknown discriminant {}", discriminant))
            })?;
            Value::Variant {
                discriminant,
                fields: decode_fields(reader, &variant.fields)?,
            }
        }
    };
    Ok(value)
}

fn decode_elements(reader: &mut Reader<'_>, inner: &Schema, count: usize) -> Result<Vec<Value>> {
    // Reject counts the remaining input cannot possibly hold before allocating.
    let needed = inner.min_size().saturating_mul(count);
    if needed > reader.remaining() {
        return Err(LotteryError::MalformedEncoding(format!(
            "length prefix {} needs at least {} bytes, only {} remain",
            count,
            needed,
            reader.remaining()
        )));
    }
    let mut items = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        items.push(decode_value(reader, inner)?);
    }
    Ok(items)
}

fn decode_fields(reader: &mut Reader<'_>, fields: &[Field]) -> Result<Vec<Value>> {
    fields
        .iter()
        .map(|field| decode_value(reader, &field.schema))
        .collect()
}

impl Value {
    pub fn into_u32(self) -> Result<u32> {
        match self {
            Value::U32(v) => Ok(v),
            other => Err(mismatch(&Schema::U32, &other)),
        }
    }

    pub fn into_u64(self) -> Result<u64> {
        match self {
            Value::U64(v) => Ok(v),
            other => Err(mismatch(&Schema::U64, &other)),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch(&Schema::Bool, &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Value::Bytes(v) => Ok(v),
            other => Err(mismatch(&Schema::Bytes, &other)),
        }
    }

    pub fn into_fixed<const N: usize>(self) -> Result<[u8; N]> {
        let bytes = self.into_bytes()?;
        <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
            LotteryError::SchemaMismatch(format!("expected {} bytes, found {}", N, bytes.len()))
        })
    }

    pub fn into_list(self) -> Result<Vec<Value>> {
        match self {
            Value::List(v) => Ok(v),
            other => Err(LotteryError::SchemaMismatch(format!(
                "expected list, found {:?}",
                other
            ))),
        }
    }

    pub fn into_record(self) -> Result<Fields> {
        match self {
            Value::Record(v) => Ok(Fields(v.into_iter())),
            other => Err(LotteryError::SchemaMismatch(format!(
                "expected record, found {:?}",
                other
            ))),
        }
    }

    pub fn into_variant(self) -> Result<(u8, Fields)> {
        match self {
            Value::Variant {
                discriminant,
                fields,
            } => Ok((discriminant, Fields(fields.into_iter()))),
            other => Err(LotteryError::SchemaMismatch(format!(
                "expected variant, found {:?}",
                other
            ))),
        }
    }

    pub fn fixed(bytes: &[u8]) -> Value {
        Value::Bytes(bytes.to_vec())
    }

    pub fn list<T>(items: &[T], f: impl Fn(&T) -> Value) -> Value {
        Value::List(items.iter().map(f).collect())
    }
}

/// Positional reader over record or variant fields.
pub struct Fields(std::vec::IntoIter<Value>);

impl Fields {
    pub fn next(&mut self, name: &str) -> Result<Value> {
        self.0
            .next()
            .ok_or_else(|| LotteryError::SchemaMismatch(format!("missing field `{}`", name)))
    }

    /// Ensure every field was consumed.
    pub fn finish(mut self) -> Result<()> {
        match self.0.next() {
            None => Ok(()),
            Some(extra) => Err(LotteryError::SchemaMismatch(format!(
                "unexpected extra field {:?}",
                extra
            ))),
        }
    }
}

/// A Rust type with a fixed wire schema.
pub trait Schematic: Sized {
    fn schema() -> Schema;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;

    fn pack(&self) -> Result<Vec<u8>> {
        encode(&self.to_value(), &Self::schema())
    }

    fn unpack(data: &[u8]) -> Result<Self> {
        Self::from_value(decode(data, &Self::schema())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::Struct(vec![
            field("amount", Schema::U64),
            field("hash", Schema::FixedBytes(4)),
            field("payload", Schema::Bytes),
            field("indices", Schema::vec(Schema::U32)),
            field("flag", Schema::Bool),
        ])
    }

    fn sample_value() -> Value {
        Value::Record(vec![
            Value::U64(0x0102_0304_0506_0708),
            Value::Bytes(vec![9, 9, 9, 9]),
            Value::Bytes(vec![1, 2, 3]),
            Value::List(vec![Value::U32(7), Value::U32(256)]),
            Value::Bool(true),
        ])
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode(&sample_value(), &sample_schema()).unwrap();
        let expected: Vec<u8> = [
            &[8u8, 7, 6, 5, 4, 3, 2, 1][..],
            &[9, 9, 9, 9],
            &[3, 0, 0, 0, 1, 2, 3],
            &[2, 0, 0, 0, 7, 0, 0, 0, 0, 1, 0, 0],
            &[1],
        ]
        .concat();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let schema = sample_schema();
        let bytes = encode(&sample_value(), &schema).unwrap();
        assert_eq!(decode(&bytes, &schema).unwrap(), sample_value());
    }

    #[test]
    fn test_decode_truncated_input() {
        let schema = sample_schema();
        let bytes = encode(&sample_value(), &schema).unwrap();
        for cut in 0..bytes.len() {
            assert!(matches!(
                decode(&bytes[..cut], &schema),
                Err(LotteryError::MalformedEncoding(_))
            ));
        }
    }

    #[test]
    fn test_decode_oversized_length_prefix() {
        let mut bytes = vec![0xff, 0xff, 0xff, 0x7f];
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            decode(&bytes, &Schema::Bytes),
            Err(LotteryError::MalformedEncoding(_))
        ));
        assert!(matches!(
            decode(&bytes, &Schema::vec(Schema::U64)),
            Err(LotteryError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_decode_unknown_discriminant() {
        let schema = Schema::Enum(vec![
            variant(0, "Ping", vec![]),
            variant(3, "Amount", vec![field("amount", Schema::U64)]),
        ]);
        assert_eq!(
            decode(&[3, 1, 0, 0, 0, 0, 0, 0, 0], &schema).unwrap(),
            Value::Variant {
                discriminant: 3,
                fields: vec![Value::U64(1)],
            }
        );
        assert!(matches!(
            decode(&[1], &schema),
            Err(LotteryError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes_and_bad_bool() {
        assert!(matches!(
            decode(&[1, 0], &Schema::U8),
            Err(LotteryError::MalformedEncoding(_))
        ));
        assert!(matches!(
            decode(&[2], &Schema::Bool),
            Err(LotteryError::MalformedEncoding(_))
        ));
        let (value, used) = decode_prefix(&[1, 0], &Schema::U8).unwrap();
        assert_eq!((value, used), (Value::U8(1), 1));
    }

    #[test]
    fn test_encode_rejects_mismatched_values() {
        assert!(matches!(
            encode(&Value::U32(1), &Schema::U64),
            Err(LotteryError::SchemaMismatch(_))
        ));
        assert!(matches!(
            encode(&Value::Bytes(vec![0; 31]), &Schema::FixedBytes(32)),
            Err(LotteryError::SchemaMismatch(_))
        ));
        assert!(matches!(
            encode(&Value::Record(vec![Value::U64(1)]), &sample_schema()),
            Err(LotteryError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_fixed_array_has_no_prefix() {
        let schema = Schema::array(Schema::U8, 3);
        let value = Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(3)]);
        assert_eq!(encode(&value, &schema).unwrap(), vec![1, 2, 3]);
        assert_eq!(schema.min_size(), 3);
    }
}

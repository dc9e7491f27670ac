// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capability traits for user-controlled encoding.
//!
//! A type either lets the codec walk its fields (REFLECTED mode), drives
//! the named-field API itself ([`BinarySerializer`], CUSTOM mode), or takes
//! over the byte stream entirely ([`ExternalSerializer`], EXTERNAL mode).
//! The named-field API is also implemented by the metadata collector, which
//! is how schema evolution observes a custom serializer's field order
//! without producing bytes.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::error::BinaryResult;
use crate::value::{BinaryInstance, BinaryValue, Date, Timestamp};

/// Named-field sink driven by custom serializers.
///
/// Each `write_*` call records one `(fieldId, offset)` pair in the current
/// schema; `begin_raw` switches to the raw tail, after which named fields
/// are rejected.
pub trait FieldWriter {
    fn write_field(&mut self, name: &str, value: &BinaryValue) -> BinaryResult<()>;

    /// One-way switch into raw mode for this object.
    fn begin_raw(&mut self) -> BinaryResult<()>;

    /// Append externally produced bytes to the raw tail.
    fn write_raw(&mut self, bytes: &[u8]) -> BinaryResult<()>;

    fn write_byte(&mut self, name: &str, v: i8) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Byte(v))
    }

    fn write_short(&mut self, name: &str, v: i16) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Short(v))
    }

    fn write_int(&mut self, name: &str, v: i32) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Int(v))
    }

    fn write_long(&mut self, name: &str, v: i64) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Long(v))
    }

    fn write_float(&mut self, name: &str, v: f32) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Float(v))
    }

    fn write_double(&mut self, name: &str, v: f64) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Double(v))
    }

    fn write_bool(&mut self, name: &str, v: bool) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Bool(v))
    }

    fn write_string(&mut self, name: &str, v: &str) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::String(v.to_string()))
    }

    fn write_uuid(&mut self, name: &str, v: Uuid) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Uuid(v))
    }

    fn write_date(&mut self, name: &str, v: Date) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Date(v))
    }

    fn write_timestamp(&mut self, name: &str, v: Timestamp) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Timestamp(v))
    }

    fn write_decimal(&mut self, name: &str, v: &BigDecimal) -> BinaryResult<()> {
        self.write_field(name, &BinaryValue::Decimal(v.clone()))
    }
}

/// Named-field source driven by custom serializers during decode.
///
/// Field reads are random access: each call locates the field through the
/// schema footer, independent of call order. A missing field reads as
/// `Null`.
pub trait FieldReader {
    fn read_field(&mut self, name: &str) -> BinaryResult<BinaryValue>;

    /// Position at the raw tail written by [`FieldWriter::begin_raw`].
    fn begin_raw(&mut self) -> BinaryResult<()>;

    /// Consume `len` bytes from the raw tail.
    fn read_raw(&mut self, len: usize) -> BinaryResult<Vec<u8>>;

    fn read_int(&mut self, name: &str) -> BinaryResult<Option<i32>> {
        Ok(self.read_field(name)?.as_i32())
    }

    fn read_long(&mut self, name: &str) -> BinaryResult<Option<i64>> {
        Ok(self.read_field(name)?.as_i64())
    }

    fn read_double(&mut self, name: &str) -> BinaryResult<Option<f64>> {
        Ok(self.read_field(name)?.as_f64())
    }

    fn read_bool(&mut self, name: &str) -> BinaryResult<Option<bool>> {
        Ok(self.read_field(name)?.as_bool())
    }

    fn read_string(&mut self, name: &str) -> BinaryResult<Option<String>> {
        Ok(match self.read_field(name)? {
            BinaryValue::String(s) => Some(s),
            _ => None,
        })
    }
}

/// User-supplied binary serializer (CUSTOM mode). The write side drives
/// the named-field API; the read side populates a fresh instance that the
/// reader has already published to its handle table, so back-references
/// into the object being decoded resolve.
pub trait BinarySerializer: Send + Sync {
    fn write_binary(&self, obj: &BinaryInstance, writer: &mut dyn FieldWriter)
        -> BinaryResult<()>;

    fn read_binary(&self, obj: &BinaryInstance, reader: &mut dyn FieldReader)
        -> BinaryResult<()>;
}

/// Full byte-level takeover (EXTERNAL mode). The writer is switched into
/// raw mode before `write_external` runs; no schema footer is emitted.
pub trait ExternalSerializer: Send + Sync {
    fn write_external(&self, obj: &BinaryInstance, writer: &mut dyn FieldWriter)
        -> BinaryResult<()>;

    fn read_external(&self, obj: &BinaryInstance, reader: &mut dyn FieldReader)
        -> BinaryResult<()>;
}

/// Value-substitution hook: replaces a value before encode
/// (`write_replace`) or after decode (`read_resolve`).
pub type ValueHook = Arc<dyn Fn(BinaryValue) -> BinaryResult<BinaryValue> + Send + Sync>;

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Encoding of value trees into portable binary bytes.
//!
//! One [`BinaryWriter`] encodes one root value (plus everything reachable
//! from it) into an output buffer. It is not safe for concurrent use;
//! callers create one per request. The writer keeps a handle table so a
//! value encountered twice is emitted once and referenced by a `HANDLE`
//! back-offset afterwards, which is also what makes cycles encodable.
//!
//! Per-object state machine: header reserved -> fields open -> (raw |
//! footer emitted) -> header patched. The transition into raw mode is
//! one-way; named fields are rejected afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::Sign;

use crate::context::Context;
use crate::descriptor::TypeDescriptor;
use crate::error::{BinaryError, BinaryResult};
use crate::ids::IdMapper;
use crate::io::OutBuffer;
use crate::metadata::CancelToken;
use crate::schema::{self, update_schema_id, EMPTY_SCHEMA_ID};
use crate::serializer::FieldWriter;
use crate::value::{BinaryInstance, BinaryValue, EnumValue};
use crate::wire;

/// Collects `(fieldId, offset)` pairs for one object being written.
struct SchemaRecorder {
    object_start: usize,
    type_id: i32,
    mapper: Arc<dyn IdMapper>,
    entries: Vec<(i32, u32)>,
    raw_start: Option<usize>,
}

/// Encodes one value tree into bytes.
pub struct BinaryWriter<'a> {
    ctx: &'a Context,
    out: OutBuffer,
    handles: HashMap<(usize, usize), usize>,
    frames: Vec<SchemaRecorder>,
    cancel: Option<CancelToken>,
}

impl<'a> BinaryWriter<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            out: OutBuffer::new(),
            handles: HashMap::new(),
            frames: Vec::new(),
            cancel: None,
        }
    }

    /// Append to a caller-owned buffer. On error the caller truncates back
    /// to the mark it recorded before the write.
    pub fn with_buffer(ctx: &'a Context, buf: Vec<u8>) -> Self {
        Self {
            ctx,
            out: OutBuffer::with_buffer(buf),
            handles: HashMap::new(),
            frames: Vec::new(),
            cancel: None,
        }
    }

    /// Attach a cancellation token, honored only at metadata-publish
    /// boundaries.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }

    /// Encode one root value.
    pub fn write(&mut self, value: &BinaryValue) -> BinaryResult<()> {
        self.write_value(value)
    }

    // -----------------------------------------------------------------
    // Value dispatch
    // -----------------------------------------------------------------

    pub(crate) fn write_value(&mut self, value: &BinaryValue) -> BinaryResult<()> {
        match value {
            BinaryValue::Null => {
                self.write_null();
                Ok(())
            }
            BinaryValue::Byte(v) => {
                self.out.push_u8(wire::BYTE);
                self.out.push_i8(*v);
                Ok(())
            }
            BinaryValue::Short(v) => {
                self.out.push_u8(wire::SHORT);
                self.out.push_i16(*v);
                Ok(())
            }
            BinaryValue::Int(v) => {
                self.out.push_u8(wire::INT);
                self.out.push_i32(*v);
                Ok(())
            }
            BinaryValue::Long(v) => {
                self.out.push_u8(wire::LONG);
                self.out.push_i64(*v);
                Ok(())
            }
            BinaryValue::Float(v) => {
                self.out.push_u8(wire::FLOAT);
                self.out.push_f32(*v);
                Ok(())
            }
            BinaryValue::Double(v) => {
                self.out.push_u8(wire::DOUBLE);
                self.out.push_f64(*v);
                Ok(())
            }
            BinaryValue::Char(v) => {
                self.out.push_u8(wire::CHAR);
                self.out.push_u16(*v);
                Ok(())
            }
            BinaryValue::Bool(v) => {
                self.out.push_u8(wire::BOOLEAN);
                self.out.push_bool(*v);
                Ok(())
            }
            BinaryValue::Decimal(v) => {
                self.out.push_u8(wire::DECIMAL);
                self.push_decimal_payload(v);
                Ok(())
            }
            BinaryValue::String(v) => {
                self.out.push_u8(wire::STRING);
                self.push_string_payload(v);
                Ok(())
            }
            BinaryValue::Uuid(v) => {
                self.out.push_u8(wire::UUID);
                let (msb, lsb) = v.as_u64_pair();
                self.out.push_i64(msb as i64);
                self.out.push_i64(lsb as i64);
                Ok(())
            }
            BinaryValue::Date(v) => {
                self.out.push_u8(wire::DATE);
                self.out.push_i64(v.millis());
                Ok(())
            }
            BinaryValue::Timestamp(v) => {
                self.out.push_u8(wire::TIMESTAMP);
                self.out.push_i64(v.millis());
                self.out.push_i32(v.nanos());
                Ok(())
            }
            BinaryValue::ByteArr(v) => {
                self.out.push_u8(wire::BYTE_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_i8(e);
                }
                Ok(())
            }
            BinaryValue::ShortArr(v) => {
                self.out.push_u8(wire::SHORT_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_i16(e);
                }
                Ok(())
            }
            BinaryValue::IntArr(v) => {
                self.out.push_u8(wire::INT_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_i32(e);
                }
                Ok(())
            }
            BinaryValue::LongArr(v) => {
                self.out.push_u8(wire::LONG_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_i64(e);
                }
                Ok(())
            }
            BinaryValue::FloatArr(v) => {
                self.out.push_u8(wire::FLOAT_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_f32(e);
                }
                Ok(())
            }
            BinaryValue::DoubleArr(v) => {
                self.out.push_u8(wire::DOUBLE_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_f64(e);
                }
                Ok(())
            }
            BinaryValue::CharArr(v) => {
                self.out.push_u8(wire::CHAR_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_u16(e);
                }
                Ok(())
            }
            BinaryValue::BoolArr(v) => {
                self.out.push_u8(wire::BOOLEAN_ARR);
                self.out.push_i32(v.len() as i32);
                for &e in v {
                    self.out.push_bool(e);
                }
                Ok(())
            }
            BinaryValue::StringArr(v) => {
                self.out.push_u8(wire::STRING_ARR);
                self.out.push_i32(v.len() as i32);
                for e in v {
                    match e {
                        Some(s) => {
                            self.out.push_u8(wire::STRING);
                            self.push_string_payload(s);
                        }
                        None => self.write_null(),
                    }
                }
                Ok(())
            }
            BinaryValue::UuidArr(v) => {
                self.out.push_u8(wire::UUID_ARR);
                self.out.push_i32(v.len() as i32);
                for e in v {
                    match e {
                        Some(u) => self.write_value(&BinaryValue::Uuid(*u))?,
                        None => self.write_null(),
                    }
                }
                Ok(())
            }
            BinaryValue::DateArr(v) => {
                self.out.push_u8(wire::DATE_ARR);
                self.out.push_i32(v.len() as i32);
                for e in v {
                    match e {
                        Some(d) => self.write_value(&BinaryValue::Date(*d))?,
                        None => self.write_null(),
                    }
                }
                Ok(())
            }
            BinaryValue::TimestampArr(v) => {
                self.out.push_u8(wire::TIMESTAMP_ARR);
                self.out.push_i32(v.len() as i32);
                for e in v {
                    match e {
                        Some(t) => self.write_value(&BinaryValue::Timestamp(*t))?,
                        None => self.write_null(),
                    }
                }
                Ok(())
            }
            BinaryValue::DecimalArr(v) => {
                self.out.push_u8(wire::DECIMAL_ARR);
                self.out.push_i32(v.len() as i32);
                for e in v {
                    match e {
                        Some(d) => {
                            self.out.push_u8(wire::DECIMAL);
                            self.push_decimal_payload(d);
                        }
                        None => self.write_null(),
                    }
                }
                Ok(())
            }
            BinaryValue::ObjectArr {
                component_type_id,
                elements,
            } => {
                self.out.push_u8(wire::OBJ_ARR);
                self.out.push_i32(*component_type_id);
                self.out.push_i32(elements.len() as i32);
                for e in elements {
                    self.write_value(e)?;
                }
                Ok(())
            }
            BinaryValue::Collection { kind, elements } => {
                self.out.push_u8(wire::COL);
                self.out.push_i32(elements.len() as i32);
                self.out.push_u8(*kind);
                for e in elements {
                    self.write_value(e)?;
                }
                Ok(())
            }
            BinaryValue::Map { kind, entries } => {
                self.out.push_u8(wire::MAP);
                self.out.push_i32(entries.len() as i32);
                self.out.push_u8(*kind);
                for (k, v) in entries {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
                Ok(())
            }
            BinaryValue::MapEntry(entry) => {
                self.out.push_u8(wire::MAP_ENTRY);
                self.write_value(&entry.0)?;
                self.write_value(&entry.1)
            }
            BinaryValue::Enum(e) => {
                self.out.push_u8(wire::ENUM);
                self.push_enum_payload(e)
            }
            BinaryValue::EnumArr {
                component_type_id,
                elements,
            } => {
                self.out.push_u8(wire::ENUM_ARR);
                self.out.push_i32(*component_type_id);
                self.out.push_i32(elements.len() as i32);
                for e in elements {
                    self.write_value(e)?;
                }
                Ok(())
            }
            BinaryValue::Class(c) => {
                self.out.push_u8(wire::CLASS);
                self.out.push_i32(c.type_id);
                if c.type_id == wire::UNREGISTERED_TYPE_ID {
                    let name = c.type_name.as_deref().ok_or_else(|| {
                        BinaryError::UnsupportedValue {
                            reason: "unregistered class reference without a name".into(),
                        }
                    })?;
                    self.out.push_u8(wire::STRING);
                    self.push_string_payload(name);
                }
                Ok(())
            }
            BinaryValue::Binary(obj) => {
                if self.try_write_as_handle(value)? {
                    return Ok(());
                }
                let window = obj.window().to_vec();
                self.out.push_u8(wire::PORTABLE_OBJ);
                self.out.push_i32(window.len() as i32);
                self.out.push_bytes(&window);
                self.out.push_i32(0);
                Ok(())
            }
            BinaryValue::Object(inst) => self.write_object(inst),
        }
    }

    pub(crate) fn write_null(&mut self) {
        self.out.push_u8(wire::NULL);
    }

    fn write_object(&mut self, inst: &Arc<BinaryInstance>) -> BinaryResult<()> {
        let desc = self.ctx.descriptor_for_instance(inst)?;

        if let Some(hook) = desc.write_replace() {
            let replaced = hook(BinaryValue::Object(Arc::clone(inst))).map_err(|e| {
                BinaryError::UserHookFailed {
                    hook: "write_replace",
                    type_name: desc.type_name().to_string(),
                    reason: e.to_string(),
                }
            })?;

            return match replaced {
                BinaryValue::Object(other) if !Arc::ptr_eq(&other, inst) => {
                    let other_desc = self.ctx.descriptor_for_instance(&other)?;
                    other_desc.write(&BinaryValue::Object(other), self)
                }
                BinaryValue::Object(same) => desc.write(&BinaryValue::Object(same), self),
                other => self.write_value(&other),
            };
        }

        desc.write(&BinaryValue::Object(Arc::clone(inst)), self)
    }

    // -----------------------------------------------------------------
    // Object framing (driven by TypeDescriptor::write)
    // -----------------------------------------------------------------

    /// If `value` was already emitted, write a `HANDLE` back-reference and
    /// return true. Otherwise remember its position-to-be and return false.
    pub(crate) fn try_write_as_handle(&mut self, value: &BinaryValue) -> BinaryResult<bool> {
        let Some(identity) = value.identity() else {
            return Ok(false);
        };

        let pos = self.out.len();
        match self.handles.get(&identity) {
            Some(&referent) => {
                self.out.push_u8(wire::HANDLE);
                self.out.push_i32((pos - referent) as i32);
                Ok(true)
            }
            None => {
                self.handles.insert(identity, pos);
                Ok(false)
            }
        }
    }

    /// Reserve the header and open a schema recorder for one object.
    pub(crate) fn begin_object(&mut self, desc: &TypeDescriptor) -> BinaryResult<()> {
        let object_start = self.out.reserve_zeroed(wire::HDR_LEN);

        self.out.patch_u8(object_start + wire::TAG_POS, wire::OBJ);
        self.out
            .patch_u8(object_start + wire::PROTO_VER_POS, wire::PROTO_VER);

        let header_type_id = if desc.registered() {
            desc.type_id()
        } else {
            wire::UNREGISTERED_TYPE_ID
        };
        self.out
            .patch_i32(object_start + wire::TYPE_ID_POS, header_type_id);

        if !desc.registered() {
            self.out.push_u8(wire::STRING);
            self.push_string_payload(desc.type_name());
        }

        self.frames.push(SchemaRecorder {
            object_start,
            type_id: desc.type_id(),
            mapper: Arc::clone(desc.id_mapper()),
            entries: Vec::new(),
            raw_start: None,
        });

        Ok(())
    }

    fn frame_mut(&mut self) -> BinaryResult<&mut SchemaRecorder> {
        self.frames
            .last_mut()
            .ok_or_else(|| BinaryError::UnsupportedValue {
                reason: "no object is being written".into(),
            })
    }

    /// Emit the footer, then back-patch the header. Returns the schema id
    /// stored in the header.
    pub(crate) fn post_write(
        &mut self,
        desc: &TypeDescriptor,
        inst: &BinaryInstance,
    ) -> BinaryResult<i32> {
        let (object_start, entries, raw_start) = {
            let frame = self.frame_mut()?;
            (
                frame.object_start,
                std::mem::take(&mut frame.entries),
                frame.raw_start,
            )
        };

        let payload_end = self.out.len();

        let hash = inst.hash().unwrap_or_else(|| {
            schema::fnv1a(&self.out.as_slice()[object_start + wire::HDR_LEN..payload_end])
        });

        let mut flags: u16 = 0;
        if desc.user_type() {
            flags |= wire::FLAG_USR_TYP;
        }

        let mut schema_id = 0;
        let schema_or_raw_off;

        if entries.is_empty() {
            schema_or_raw_off = match raw_start {
                Some(raw) => {
                    flags |= wire::FLAG_HAS_RAW;
                    (raw - object_start) as i32
                }
                None => 0,
            };
        } else {
            flags |= wire::FLAG_HAS_SCHEMA;

            schema_id = entries
                .iter()
                .fold(EMPTY_SCHEMA_ID, |acc, &(fid, _)| update_schema_id(acc, fid));

            let compact = self.ctx.config().compact_footer;
            if compact {
                flags |= wire::FLAG_COMPACT_FOOTER;
            }

            let footer_start = self.out.len();
            schema_or_raw_off = (footer_start - object_start) as i32;

            // Minimal width that fits every recorded offset.
            let max_offset = entries.iter().map(|&(_, off)| off).max().unwrap_or(0);
            let offset_len = if max_offset < 256 {
                flags |= wire::FLAG_OFFSET_ONE_BYTE;
                wire::OFFSET_1
            } else if max_offset < 65536 {
                flags |= wire::FLAG_OFFSET_TWO_BYTES;
                wire::OFFSET_2
            } else {
                wire::OFFSET_4
            };

            for &(fid, off) in &entries {
                if !compact {
                    self.out.push_i32(fid);
                }
                match offset_len {
                    wire::OFFSET_1 => self.out.push_u8(off as u8),
                    wire::OFFSET_2 => self.out.push_u16(off as u16),
                    _ => self.out.push_i32(off as i32),
                }
            }

            if let Some(raw) = raw_start {
                flags |= wire::FLAG_HAS_RAW;
                self.out.push_i32((raw - object_start) as i32);
            }
        }

        let total_len = (self.out.len() - object_start) as i32;

        self.out.patch_u16(object_start + wire::FLAGS_POS, flags);
        self.out.patch_i32(object_start + wire::HASH_CODE_POS, hash);
        self.out
            .patch_i32(object_start + wire::TOTAL_LEN_POS, total_len);
        self.out
            .patch_i32(object_start + wire::SCHEMA_ID_POS, schema_id);
        self.out.patch_i32(
            object_start + wire::SCHEMA_OR_RAW_OFF_POS,
            schema_or_raw_off,
        );

        Ok(schema_id)
    }

    /// Report a completed user-type write to the metadata coordinator.
    pub(crate) fn on_object_written(
        &mut self,
        desc: &TypeDescriptor,
        inst: &Arc<BinaryInstance>,
        schema_id: i32,
    ) -> BinaryResult<()> {
        self.ctx
            .metadata_coordinator()
            .on_object_written(self.ctx, desc, inst, schema_id, self.cancel.as_ref())
    }

    pub(crate) fn pop_schema(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn begin_raw_tail(&mut self) -> BinaryResult<()> {
        let pos = self.out.len();
        let frame = self.frame_mut()?;
        if frame.raw_start.is_none() {
            frame.raw_start = Some(pos);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Payload helpers
    // -----------------------------------------------------------------

    fn push_string_payload(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.out.push_i32(bytes.len() as i32);
        self.out.push_bytes(bytes);
    }

    fn push_decimal_payload(&mut self, d: &BigDecimal) {
        let (mut unscaled, mut exponent) = d.as_bigint_and_exponent();

        // The wire reserves the scale's top bit for the value's sign, so a
        // negative scale is normalized away first.
        while exponent < 0 {
            unscaled = unscaled * 10;
            exponent += 1;
        }

        let negative = unscaled.sign() == Sign::Minus;
        let magnitude = unscaled.magnitude();
        let bytes = num_bigint::BigInt::from_biguint(Sign::Plus, magnitude.clone())
            .to_signed_bytes_be();

        let mut scale = exponent as u32;
        if negative {
            scale |= 0x8000_0000;
        }

        self.out.push_u32(scale);
        self.out.push_i32(bytes.len() as i32);
        self.out.push_bytes(&bytes);
    }

    fn push_enum_payload(&mut self, e: &EnumValue) -> BinaryResult<()> {
        self.out.push_i32(e.type_id);
        if e.type_id == wire::UNREGISTERED_TYPE_ID {
            let name = e
                .type_name
                .as_deref()
                .ok_or_else(|| BinaryError::UnsupportedValue {
                    reason: "unregistered enum without a type name".into(),
                })?;
            self.out.push_u8(wire::STRING);
            self.push_string_payload(name);
        }
        self.out.push_i32(e.ordinal);
        Ok(())
    }
}

impl FieldWriter for BinaryWriter<'_> {
    fn write_field(&mut self, name: &str, value: &BinaryValue) -> BinaryResult<()> {
        let (field_id, offset) = {
            let pos = self.out.len();
            let frame = self.frame_mut()?;
            if frame.raw_start.is_some() {
                return Err(BinaryError::UnsupportedValue {
                    reason: format!(
                        "named field {} written after the raw tail was started",
                        name
                    ),
                });
            }
            let field_id = frame.mapper.field_id(frame.type_id, name);
            (field_id, (pos - frame.object_start) as u32)
        };

        self.write_value(value)?;

        self.frame_mut()?.entries.push((field_id, offset));
        Ok(())
    }

    fn begin_raw(&mut self) -> BinaryResult<()> {
        self.begin_raw_tail()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> BinaryResult<()> {
        let frame = self.frame_mut()?;
        if frame.raw_start.is_none() {
            return Err(BinaryError::UnsupportedValue {
                reason: "raw bytes written before the raw tail was started".into(),
            });
        }
        self.out.push_bytes(bytes);
        Ok(())
    }
}

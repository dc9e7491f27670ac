// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoding of portable binary bytes back into values.
//!
//! One [`BinaryReader`] decodes from one byte range, either materializing
//! the whole value tree (`read_root`) or locating a single field through
//! the schema footer without touching the rest of the payload
//! (`unmarshal_field`). The reader keeps a handle table keyed by absolute
//! offset so back-references and cycles resolve to the already-built
//! value.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{BinaryError, BinaryResult};
use crate::ids::IdMapper;
use crate::io::InBuffer;
use crate::object::BinaryObject;
use crate::schema::Schema;
use crate::serializer::FieldReader;
use crate::value::{BinaryValue, ClassRef, Date, EnumValue, Timestamp};
use crate::wire;

/// Per-object decode state.
struct ReadFrame {
    object_start: usize,
    type_id: i32,
    schema_id: i32,
    flags: u16,
    total_len: usize,
    mapper: Arc<dyn IdMapper>,
    raw_cursor: usize,
    raw_end: usize,
}

/// Decodes values from a byte range.
pub struct BinaryReader<'a> {
    ctx: &'a Context,
    buf: InBuffer<'a>,
    root_start: usize,
    pos: usize,
    handles: HashMap<usize, BinaryValue>,
    frames: Vec<ReadFrame>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(ctx: &'a Context, bytes: &'a [u8], start: usize) -> Self {
        Self {
            ctx,
            buf: InBuffer::new(bytes),
            root_start: start,
            pos: start,
            handles: HashMap::new(),
            frames: Vec::new(),
        }
    }

    /// Fully materialize the root value.
    pub fn read_root(&mut self) -> BinaryResult<BinaryValue> {
        self.pos = self.root_start;
        self.read_value()
    }

    // -----------------------------------------------------------------
    // Random field access over the root object
    // -----------------------------------------------------------------

    /// Read a single field of the root object by name, without
    /// materializing the rest of it.
    pub fn unmarshal_field(&mut self, name: &str) -> BinaryResult<BinaryValue> {
        let meta = self.root_meta()?;
        let field_id = meta.mapper.field_id(meta.type_id, name);
        self.unmarshal_by_meta(&meta, field_id)
    }

    /// Read a single field of the root object by derived field id.
    pub fn unmarshal_field_by_id(&mut self, field_id: i32) -> BinaryResult<BinaryValue> {
        let meta = self.root_meta()?;
        self.unmarshal_by_meta(&meta, field_id)
    }

    /// Position-based access, used by schema-driven readers.
    pub fn field_by_order(&mut self, order: usize) -> BinaryResult<BinaryValue> {
        let meta = self.root_meta()?;

        if !wire::has_schema(meta.flags) {
            return Ok(BinaryValue::Null);
        }

        let layout = self.footer_layout(&meta)?;
        let entry_pos = layout.footer_start + order * layout.entry_size + layout.field_id_len;
        if entry_pos + layout.offset_len > layout.footer_end {
            return Err(BinaryError::UnsupportedValue {
                reason: format!("field order {} out of range", order),
            });
        }

        let offset = self.read_footer_offset(entry_pos, layout.offset_len)?;
        self.read_value_at(meta.object_start + offset)
    }

    /// Whether the root object's footer mentions the named field.
    pub fn has_field(&mut self, name: &str) -> BinaryResult<bool> {
        let meta = self.root_meta()?;
        let field_id = meta.mapper.field_id(meta.type_id, name);
        Ok(self.find_field_pos(&meta, field_id)?.is_some())
    }

    /// Rebuild the root object's layout from a plain footer and register
    /// it, so later compact-footer frames of the same schema resolve. A
    /// compact footer cannot be rebuilt; the schema must arrive through a
    /// metadata sync instead.
    pub fn get_or_create_schema(&mut self) -> BinaryResult<Arc<Schema>> {
        let meta = self.root_meta()?;

        if !wire::has_schema(meta.flags) {
            return Err(BinaryError::UnsupportedValue {
                reason: "object has no schema footer".into(),
            });
        }

        let registry = self.ctx.schema_registry(meta.type_id);
        if let Some(schema) = registry.lookup(meta.schema_id) {
            return Ok(schema);
        }

        if wire::is_compact_footer(meta.flags) {
            return Err(BinaryError::UnknownSchema {
                type_id: meta.type_id,
                schema_id: meta.schema_id,
            });
        }

        let layout = self.footer_layout(&meta)?;
        let count = (layout.footer_end - layout.footer_start) / layout.entry_size;
        let mut field_ids = Vec::with_capacity(count);
        for i in 0..count {
            field_ids.push(self.buf.read_i32(layout.footer_start + i * layout.entry_size)?);
        }

        let schema = Arc::new(Schema::from_parts(meta.schema_id, field_ids));
        registry.insert(Arc::clone(&schema))?;
        Ok(schema)
    }

    fn unmarshal_by_meta(&mut self, meta: &ObjectMeta, field_id: i32) -> BinaryResult<BinaryValue> {
        match self.find_field_pos(meta, field_id)? {
            Some(pos) => self.read_value_at(pos),
            None => Ok(BinaryValue::Null),
        }
    }

    // -----------------------------------------------------------------
    // Value dispatch
    // -----------------------------------------------------------------

    fn read_value(&mut self) -> BinaryResult<BinaryValue> {
        let tag_pos = self.pos;
        let tag = self.buf.read_u8(tag_pos)?;
        self.pos += 1;

        match tag {
            wire::NULL => Ok(BinaryValue::Null),
            wire::BYTE => {
                let v = self.buf.read_i8(self.pos)?;
                self.pos += 1;
                Ok(BinaryValue::Byte(v))
            }
            wire::SHORT => {
                let v = self.buf.read_i16(self.pos)?;
                self.pos += 2;
                Ok(BinaryValue::Short(v))
            }
            wire::INT => {
                let v = self.buf.read_i32(self.pos)?;
                self.pos += 4;
                Ok(BinaryValue::Int(v))
            }
            wire::LONG => {
                let v = self.buf.read_i64(self.pos)?;
                self.pos += 8;
                Ok(BinaryValue::Long(v))
            }
            wire::FLOAT => {
                let v = self.buf.read_f32(self.pos)?;
                self.pos += 4;
                Ok(BinaryValue::Float(v))
            }
            wire::DOUBLE => {
                let v = self.buf.read_f64(self.pos)?;
                self.pos += 8;
                Ok(BinaryValue::Double(v))
            }
            wire::CHAR => {
                let v = self.buf.read_u16(self.pos)?;
                self.pos += 2;
                Ok(BinaryValue::Char(v))
            }
            wire::BOOLEAN => {
                let v = self.buf.read_u8(self.pos)?;
                self.pos += 1;
                Ok(BinaryValue::Bool(v != 0))
            }
            wire::DECIMAL => self.read_decimal_payload().map(BinaryValue::Decimal),
            wire::STRING => self.read_string_payload().map(BinaryValue::String),
            wire::UUID => {
                let msb = self.buf.read_i64(self.pos)?;
                let lsb = self.buf.read_i64(self.pos + 8)?;
                self.pos += 16;
                Ok(BinaryValue::Uuid(Uuid::from_u64_pair(msb as u64, lsb as u64)))
            }
            wire::DATE => {
                let millis = self.buf.read_i64(self.pos)?;
                self.pos += 8;
                Ok(BinaryValue::Date(Date::from_millis(millis)))
            }
            wire::TIMESTAMP => {
                let millis = self.buf.read_i64(self.pos)?;
                let nanos = self.buf.read_i32(self.pos + 8)?;
                self.pos += 12;
                Ok(BinaryValue::Timestamp(Timestamp::new(millis, nanos)))
            }
            wire::BYTE_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_i8(self.pos)?);
                    self.pos += 1;
                }
                Ok(BinaryValue::ByteArr(arr))
            }
            wire::SHORT_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_i16(self.pos)?);
                    self.pos += 2;
                }
                Ok(BinaryValue::ShortArr(arr))
            }
            wire::INT_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_i32(self.pos)?);
                    self.pos += 4;
                }
                Ok(BinaryValue::IntArr(arr))
            }
            wire::LONG_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_i64(self.pos)?);
                    self.pos += 8;
                }
                Ok(BinaryValue::LongArr(arr))
            }
            wire::FLOAT_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_f32(self.pos)?);
                    self.pos += 4;
                }
                Ok(BinaryValue::FloatArr(arr))
            }
            wire::DOUBLE_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_f64(self.pos)?);
                    self.pos += 8;
                }
                Ok(BinaryValue::DoubleArr(arr))
            }
            wire::CHAR_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_u16(self.pos)?);
                    self.pos += 2;
                }
                Ok(BinaryValue::CharArr(arr))
            }
            wire::BOOLEAN_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(self.buf.read_u8(self.pos)? != 0);
                    self.pos += 1;
                }
                Ok(BinaryValue::BoolArr(arr))
            }
            wire::STRING_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(match self.read_value()? {
                        BinaryValue::String(s) => Some(s),
                        BinaryValue::Null => None,
                        _ => {
                            return Err(BinaryError::corrupt(
                                self.pos,
                                "string array element is not a string",
                            ))
                        }
                    });
                }
                Ok(BinaryValue::StringArr(arr))
            }
            wire::UUID_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(match self.read_value()? {
                        BinaryValue::Uuid(u) => Some(u),
                        BinaryValue::Null => None,
                        _ => {
                            return Err(BinaryError::corrupt(
                                self.pos,
                                "uuid array element is not a uuid",
                            ))
                        }
                    });
                }
                Ok(BinaryValue::UuidArr(arr))
            }
            wire::DATE_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(match self.read_value()? {
                        BinaryValue::Date(d) => Some(d),
                        BinaryValue::Null => None,
                        _ => {
                            return Err(BinaryError::corrupt(
                                self.pos,
                                "date array element is not a date",
                            ))
                        }
                    });
                }
                Ok(BinaryValue::DateArr(arr))
            }
            wire::TIMESTAMP_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(match self.read_value()? {
                        BinaryValue::Timestamp(t) => Some(t),
                        BinaryValue::Null => None,
                        _ => {
                            return Err(BinaryError::corrupt(
                                self.pos,
                                "timestamp array element is not a timestamp",
                            ))
                        }
                    });
                }
                Ok(BinaryValue::TimestampArr(arr))
            }
            wire::DECIMAL_ARR => {
                let len = self.read_array_len()?;
                let mut arr = Vec::with_capacity(len);
                for _ in 0..len {
                    arr.push(match self.read_value()? {
                        BinaryValue::Decimal(d) => Some(d),
                        BinaryValue::Null => None,
                        _ => {
                            return Err(BinaryError::corrupt(
                                self.pos,
                                "decimal array element is not a decimal",
                            ))
                        }
                    });
                }
                Ok(BinaryValue::DecimalArr(arr))
            }
            wire::OBJ_ARR => {
                let component_type_id = self.buf.read_i32(self.pos)?;
                self.pos += 4;
                let len = self.read_array_len()?;
                let mut elements = Vec::with_capacity(len);
                for _ in 0..len {
                    elements.push(self.read_value()?);
                }
                Ok(BinaryValue::ObjectArr {
                    component_type_id,
                    elements,
                })
            }
            wire::COL => {
                let len = self.read_array_len()?;
                let kind = self.buf.read_u8(self.pos)?;
                self.pos += 1;
                let mut elements = Vec::with_capacity(len);
                for _ in 0..len {
                    elements.push(self.read_value()?);
                }
                Ok(BinaryValue::Collection { kind, elements })
            }
            wire::MAP => {
                let len = self.read_array_len()?;
                let kind = self.buf.read_u8(self.pos)?;
                self.pos += 1;
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    entries.push((key, value));
                }
                Ok(BinaryValue::Map { kind, entries })
            }
            wire::MAP_ENTRY => {
                let key = self.read_value()?;
                let value = self.read_value()?;
                Ok(BinaryValue::MapEntry(Box::new((key, value))))
            }
            wire::ENUM => {
                let (type_id, type_name) = self.read_type_ref()?;
                let ordinal = self.buf.read_i32(self.pos)?;
                self.pos += 4;
                Ok(BinaryValue::Enum(EnumValue {
                    type_id,
                    type_name,
                    ordinal,
                }))
            }
            wire::ENUM_ARR => {
                let component_type_id = self.buf.read_i32(self.pos)?;
                self.pos += 4;
                let len = self.read_array_len()?;
                let mut elements = Vec::with_capacity(len);
                for _ in 0..len {
                    elements.push(self.read_value()?);
                }
                Ok(BinaryValue::EnumArr {
                    component_type_id,
                    elements,
                })
            }
            wire::CLASS => {
                let (type_id, type_name) = self.read_type_ref()?;
                Ok(BinaryValue::Class(ClassRef { type_id, type_name }))
            }
            wire::PORTABLE_OBJ => {
                let len = self.read_array_len()?;
                let bytes = self.buf.bytes(self.pos, len)?.to_vec();
                self.pos += len;
                let offset = self.buf.read_i32(self.pos)?;
                self.pos += 4;
                if offset < 0 || offset as usize >= len.max(1) {
                    return Err(BinaryError::corrupt(
                        self.pos - 4,
                        "nested object offset out of range",
                    ));
                }
                let obj = BinaryObject::attached(Arc::from(bytes), offset as usize)?;
                Ok(BinaryValue::Binary(obj))
            }
            wire::HANDLE => {
                let back = self.buf.read_i32(self.pos)?;
                self.pos += 4;
                if back <= 0 || back as usize > tag_pos {
                    return Err(BinaryError::corrupt(
                        tag_pos,
                        "handle back-offset out of range",
                    ));
                }
                self.resolve_handle(tag_pos - back as usize)
            }
            wire::OBJ => {
                self.pos = tag_pos;
                self.read_object(tag_pos)
            }
            other => Err(BinaryError::corrupt(
                tag_pos,
                format!("unknown type tag: {}", other),
            )),
        }
    }

    fn read_object(&mut self, object_start: usize) -> BinaryResult<BinaryValue> {
        let meta = self.object_meta(object_start)?;

        let desc = self
            .ctx
            .descriptor_by_id(meta.type_id)
            .ok_or(BinaryError::UnknownType {
                type_id: meta.type_id,
                type_name: None,
            })?;

        self.pos = meta.field_start;

        self.frames.push(ReadFrame {
            object_start,
            type_id: meta.type_id,
            schema_id: meta.schema_id,
            flags: meta.flags,
            total_len: meta.total_len,
            mapper: Arc::clone(&meta.mapper),
            raw_cursor: 0,
            raw_end: 0,
        });

        let result = desc.read(self);
        self.frames.pop();
        self.pos = object_start + meta.total_len;
        result
    }

    /// Parse and validate one object header.
    fn object_meta(&mut self, object_start: usize) -> BinaryResult<ObjectMeta> {
        let tag = self.buf.read_u8(object_start + wire::TAG_POS)?;
        if tag != wire::OBJ {
            return Err(BinaryError::corrupt(object_start, "bad object header tag"));
        }

        let proto = self.buf.read_u8(object_start + wire::PROTO_VER_POS)?;
        if proto != wire::PROTO_VER {
            return Err(BinaryError::corrupt(
                object_start,
                format!("unsupported protocol version: {}", proto),
            ));
        }

        let flags = self.buf.read_u16(object_start + wire::FLAGS_POS)?;
        let header_type_id = self.buf.read_i32(object_start + wire::TYPE_ID_POS)?;
        let schema_id = self.buf.read_i32(object_start + wire::SCHEMA_ID_POS)?;

        let total_len = self.buf.read_i32(object_start + wire::TOTAL_LEN_POS)?;
        if total_len < wire::HDR_LEN as i32 {
            return Err(BinaryError::corrupt(object_start, "total length too small"));
        }
        let total_len = total_len as usize;
        if object_start + total_len > self.buf.len() {
            return Err(BinaryError::corrupt(
                object_start,
                "total length overruns buffer",
            ));
        }

        let mut field_start = object_start + wire::HDR_LEN;
        let (type_id, mapper) = if header_type_id == wire::UNREGISTERED_TYPE_ID {
            // Type name travels with the object; resolve it locally.
            let saved = self.pos;
            self.pos = field_start;
            let name = self.read_tagged_string()?;
            field_start = self.pos;
            self.pos = saved;

            let desc = self.ctx.descriptor_by_name(&name).ok_or_else(|| {
                BinaryError::UnknownType {
                    type_id: wire::UNREGISTERED_TYPE_ID,
                    type_name: Some(name.clone()),
                }
            })?;
            (desc.type_id(), Arc::clone(desc.id_mapper()))
        } else {
            let mapper = self
                .ctx
                .descriptor_by_id(header_type_id)
                .map(|d| Arc::clone(d.id_mapper()))
                .unwrap_or_else(|| self.ctx.default_id_mapper());
            (header_type_id, mapper)
        };

        Ok(ObjectMeta {
            object_start,
            field_start,
            type_id,
            schema_id,
            flags,
            total_len,
            mapper,
        })
    }

    fn root_meta(&mut self) -> BinaryResult<ObjectMeta> {
        let tag = self.buf.read_u8(self.root_start)?;
        if tag != wire::OBJ {
            return Err(BinaryError::UnsupportedValue {
                reason: "random field access requires an object at the root".into(),
            });
        }
        self.object_meta(self.root_start)
    }

    // -----------------------------------------------------------------
    // Footer navigation
    // -----------------------------------------------------------------

    fn footer_layout(&self, meta: &ObjectMeta) -> BinaryResult<FooterLayout> {
        let schema_off = self
            .buf
            .read_i32(meta.object_start + wire::SCHEMA_OR_RAW_OFF_POS)?;
        if schema_off < 0 {
            return Err(BinaryError::corrupt(
                meta.object_start,
                "negative schema offset",
            ));
        }

        let footer_start = meta.object_start + schema_off as usize;
        let raw_off_len = if wire::has_raw(meta.flags) { 4 } else { 0 };
        let footer_end = meta.object_start + meta.total_len - raw_off_len;

        if footer_start > footer_end {
            return Err(BinaryError::corrupt(
                meta.object_start,
                "schema offset past object end",
            ));
        }

        let field_id_len = if wire::is_compact_footer(meta.flags) {
            0
        } else {
            wire::FIELD_ID_LEN
        };
        let offset_len = wire::field_offset_len(meta.flags);

        Ok(FooterLayout {
            footer_start,
            footer_end,
            field_id_len,
            offset_len,
            entry_size: field_id_len + offset_len,
        })
    }

    fn find_field_pos(&self, meta: &ObjectMeta, field_id: i32) -> BinaryResult<Option<usize>> {
        if !wire::has_schema(meta.flags) {
            return Ok(None);
        }

        let layout = self.footer_layout(meta)?;

        if wire::is_compact_footer(meta.flags) {
            let registry = self.ctx.schema_registry(meta.type_id);
            let schema =
                registry
                    .lookup(meta.schema_id)
                    .ok_or_else(|| BinaryError::UnknownSchema {
                        type_id: meta.type_id,
                        schema_id: meta.schema_id,
                    })?;

            let Some(order) = schema.order_of(field_id) else {
                return Ok(None);
            };

            let entry_pos = layout.footer_start + order * layout.offset_len;
            if entry_pos + layout.offset_len > layout.footer_end {
                return Err(BinaryError::corrupt(entry_pos, "footer entry out of range"));
            }

            let offset = self.read_footer_offset(entry_pos, layout.offset_len)?;
            return Ok(Some(meta.object_start + offset));
        }

        let count = (layout.footer_end - layout.footer_start) / layout.entry_size;
        for i in 0..count {
            let entry_pos = layout.footer_start + i * layout.entry_size;
            if self.buf.read_i32(entry_pos)? == field_id {
                let offset =
                    self.read_footer_offset(entry_pos + wire::FIELD_ID_LEN, layout.offset_len)?;
                return Ok(Some(meta.object_start + offset));
            }
        }

        Ok(None)
    }

    fn read_footer_offset(&self, pos: usize, offset_len: usize) -> BinaryResult<usize> {
        match offset_len {
            wire::OFFSET_1 => Ok(self.buf.read_u8(pos)? as usize),
            wire::OFFSET_2 => Ok(self.buf.read_u16(pos)? as usize),
            _ => {
                let off = self.buf.read_i32(pos)?;
                if off < 0 {
                    return Err(BinaryError::corrupt(pos, "negative field offset"));
                }
                Ok(off as usize)
            }
        }
    }

    // -----------------------------------------------------------------
    // Handles
    // -----------------------------------------------------------------

    /// Register the value under construction for the innermost object, so
    /// back-references into it resolve before it is complete.
    pub(crate) fn set_handle_current(&mut self, value: BinaryValue) {
        if let Some(frame) = self.frames.last() {
            self.handles.insert(frame.object_start, value);
        }
    }

    fn resolve_handle(&mut self, referent: usize) -> BinaryResult<BinaryValue> {
        if let Some(value) = self.handles.get(&referent) {
            return Ok(value.clone());
        }

        let value = self.read_value_at(referent)?;
        self.handles
            .entry(referent)
            .or_insert_with(|| value.clone());
        Ok(value)
    }

    fn read_value_at(&mut self, pos: usize) -> BinaryResult<BinaryValue> {
        let saved = self.pos;
        self.pos = pos;
        let result = self.read_value();
        self.pos = saved;
        result
    }

    // -----------------------------------------------------------------
    // Payload helpers
    // -----------------------------------------------------------------

    fn read_array_len(&mut self) -> BinaryResult<usize> {
        let len = self.buf.read_i32(self.pos)?;
        if len < 0 {
            return Err(BinaryError::corrupt(self.pos, "negative length"));
        }
        self.pos += 4;
        Ok(len as usize)
    }

    fn read_string_payload(&mut self) -> BinaryResult<String> {
        let len = self.read_array_len()?;
        let bytes = self.buf.bytes(self.pos, len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| BinaryError::corrupt(self.pos, "invalid UTF-8 in string"))?
            .to_string();
        self.pos += len;
        Ok(s)
    }

    fn read_tagged_string(&mut self) -> BinaryResult<String> {
        let tag = self.buf.read_u8(self.pos)?;
        if tag != wire::STRING {
            return Err(BinaryError::corrupt(self.pos, "expected a string"));
        }
        self.pos += 1;
        self.read_string_payload()
    }

    fn read_decimal_payload(&mut self) -> BinaryResult<BigDecimal> {
        let scale_raw = self.buf.read_u32(self.pos)?;
        self.pos += 4;

        let negative = scale_raw & 0x8000_0000 != 0;
        let scale = (scale_raw & 0x7FFF_FFFF) as i64;

        let len = self.read_array_len()?;
        let bytes = self.buf.bytes(self.pos, len)?;
        self.pos += len;

        let mut magnitude = BigInt::from_signed_bytes_be(bytes);
        if negative {
            magnitude = -magnitude;
        }

        Ok(BigDecimal::new(magnitude, scale))
    }

    /// Type id, plus the embedded name when the id is the unregistered
    /// sentinel.
    fn read_type_ref(&mut self) -> BinaryResult<(i32, Option<String>)> {
        let type_id = self.buf.read_i32(self.pos)?;
        self.pos += 4;
        if type_id == wire::UNREGISTERED_TYPE_ID {
            let name = self.read_tagged_string()?;
            Ok((type_id, Some(name)))
        } else {
            Ok((type_id, None))
        }
    }

    fn frame(&self) -> BinaryResult<&ReadFrame> {
        self.frames
            .last()
            .ok_or_else(|| BinaryError::UnsupportedValue {
                reason: "no object is being read".into(),
            })
    }
}

impl FieldReader for BinaryReader<'_> {
    fn read_field(&mut self, name: &str) -> BinaryResult<BinaryValue> {
        let (meta, field_id) = {
            let frame = self.frame()?;
            let meta = ObjectMeta {
                object_start: frame.object_start,
                field_start: 0,
                type_id: frame.type_id,
                schema_id: frame.schema_id,
                flags: frame.flags,
                total_len: frame.total_len,
                mapper: Arc::clone(&frame.mapper),
            };
            let field_id = frame.mapper.field_id(frame.type_id, name);
            (meta, field_id)
        };

        self.unmarshal_by_meta(&meta, field_id)
    }

    fn begin_raw(&mut self) -> BinaryResult<()> {
        let (object_start, flags, total_len, already) = {
            let frame = self.frame()?;
            (
                frame.object_start,
                frame.flags,
                frame.total_len,
                frame.raw_cursor != 0,
            )
        };

        if already {
            return Ok(());
        }

        if !wire::has_raw(flags) {
            return Err(BinaryError::UnsupportedValue {
                reason: "object has no raw tail".into(),
            });
        }

        let (raw_off, raw_end) = if wire::has_schema(flags) {
            let schema_off = self.buf.read_i32(object_start + wire::SCHEMA_OR_RAW_OFF_POS)?;
            let raw_off = self.buf.read_i32(object_start + total_len - 4)?;
            (raw_off, object_start + schema_off.max(0) as usize)
        } else {
            let raw_off = self.buf.read_i32(object_start + wire::SCHEMA_OR_RAW_OFF_POS)?;
            (raw_off, object_start + total_len)
        };

        if raw_off < wire::HDR_LEN as i32 || object_start + raw_off as usize > raw_end {
            return Err(BinaryError::corrupt(object_start, "raw offset out of range"));
        }

        if let Some(frame) = self.frames.last_mut() {
            frame.raw_cursor = object_start + raw_off as usize;
            frame.raw_end = raw_end;
        }

        Ok(())
    }

    fn read_raw(&mut self, len: usize) -> BinaryResult<Vec<u8>> {
        let (cursor, end) = {
            let frame = self.frame()?;
            (frame.raw_cursor, frame.raw_end)
        };

        if cursor == 0 {
            return Err(BinaryError::UnsupportedValue {
                reason: "raw tail not started".into(),
            });
        }

        if cursor + len > end {
            return Err(BinaryError::corrupt(cursor, "raw read past raw tail"));
        }

        let bytes = self.buf.bytes(cursor, len)?.to_vec();
        if let Some(frame) = self.frames.last_mut() {
            frame.raw_cursor += len;
        }
        Ok(bytes)
    }
}

/// Parsed, validated object header.
struct ObjectMeta {
    object_start: usize,
    /// First byte after the header and the optional embedded type name.
    field_start: usize,
    type_id: i32,
    schema_id: i32,
    flags: u16,
    total_len: usize,
    mapper: Arc<dyn IdMapper>,
}

struct FooterLayout {
    footer_start: usize,
    footer_end: usize,
    field_id_len: usize,
    offset_len: usize,
    entry_size: usize,
}

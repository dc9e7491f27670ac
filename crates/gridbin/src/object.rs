// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lazy view over an encoded object.
//!
//! A [`BinaryObject`] exposes the header in constant time and individual
//! fields through the schema footer, without materializing the value. It
//! either owns exactly its own bytes (*detached*) or is a window into a
//! larger buffer (*attached*); detaching copies the window out once and is
//! idempotent.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::Context;
use crate::error::{BinaryError, BinaryResult};
use crate::io::InBuffer;
use crate::reader::BinaryReader;
use crate::value::BinaryValue;
use crate::wire;

/// A view over one encoded object inside a byte buffer.
#[derive(Clone)]
pub struct BinaryObject {
    bytes: Arc<[u8]>,
    start: usize,
    total_len: usize,
    type_id: i32,
    schema_id: i32,
    hash_code: i32,
    flags: u16,
    detach_allowed: bool,
    cached: Arc<RwLock<Option<BinaryValue>>>,
}

impl BinaryObject {
    /// Wrap a buffer that contains exactly one object starting at 0.
    pub fn new(bytes: Vec<u8>) -> BinaryResult<Self> {
        Self::attached(Arc::from(bytes), 0)
    }

    /// Wrap a window starting at `start` inside a shared buffer. The
    /// header is validated eagerly; `start + totalLength` must lie within
    /// the buffer.
    pub fn attached(bytes: Arc<[u8]>, start: usize) -> BinaryResult<Self> {
        let buf = InBuffer::new(&bytes);

        let tag = buf.read_u8(start + wire::TAG_POS)?;
        if tag != wire::OBJ {
            return Err(BinaryError::corrupt(start, "bad object header tag"));
        }

        let proto = buf.read_u8(start + wire::PROTO_VER_POS)?;
        if proto != wire::PROTO_VER {
            return Err(BinaryError::corrupt(
                start,
                format!("unsupported protocol version: {}", proto),
            ));
        }

        let total_len = buf.read_i32(start + wire::TOTAL_LEN_POS)?;
        if total_len < wire::HDR_LEN as i32 || start + total_len as usize > bytes.len() {
            return Err(BinaryError::corrupt(start, "total length overruns buffer"));
        }

        let flags = buf.read_u16(start + wire::FLAGS_POS)?;
        let type_id = buf.read_i32(start + wire::TYPE_ID_POS)?;
        let schema_id = buf.read_i32(start + wire::SCHEMA_ID_POS)?;
        let hash_code = buf.read_i32(start + wire::HASH_CODE_POS)?;

        Ok(Self {
            bytes,
            start,
            total_len: total_len as usize,
            type_id,
            schema_id,
            hash_code,
            flags,
            detach_allowed: false,
            cached: Arc::new(RwLock::new(None)),
        })
    }

    pub fn with_detach_allowed(mut self, allowed: bool) -> Self {
        self.detach_allowed = allowed;
        self
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn schema_id(&self) -> i32 {
        self.schema_id
    }

    pub fn hash_code(&self) -> i32 {
        self.hash_code
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Encoded length in bytes, header included.
    pub fn length(&self) -> usize {
        self.total_len
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// The object's own bytes.
    pub fn window(&self) -> &[u8] {
        &self.bytes[self.start..self.start + self.total_len]
    }

    /// True when the underlying buffer contains exactly this object.
    pub fn detached(&self) -> bool {
        self.start == 0 && self.total_len == self.bytes.len()
    }

    /// Copy the window into a private buffer. Idempotent; a no-op when
    /// detaching is not allowed or the object is already detached.
    pub fn detach(&self) -> BinaryObject {
        if !self.detach_allowed || self.detached() {
            return self.clone();
        }

        BinaryObject {
            bytes: Arc::from(self.window().to_vec()),
            start: 0,
            total_len: self.total_len,
            type_id: self.type_id,
            schema_id: self.schema_id,
            hash_code: self.hash_code,
            flags: self.flags,
            detach_allowed: true,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Read one field by name without materializing the object.
    pub fn field(&self, ctx: &Context, name: &str) -> BinaryResult<BinaryValue> {
        BinaryReader::new(ctx, &self.bytes, self.start).unmarshal_field(name)
    }

    /// Read one field by derived field id.
    pub fn field_by_id(&self, ctx: &Context, field_id: i32) -> BinaryResult<BinaryValue> {
        BinaryReader::new(ctx, &self.bytes, self.start).unmarshal_field_by_id(field_id)
    }

    /// Read the field at the given schema position.
    pub fn field_by_order(&self, ctx: &Context, order: usize) -> BinaryResult<BinaryValue> {
        BinaryReader::new(ctx, &self.bytes, self.start).field_by_order(order)
    }

    pub fn has_field(&self, ctx: &Context, name: &str) -> BinaryResult<bool> {
        BinaryReader::new(ctx, &self.bytes, self.start).has_field(name)
    }

    /// The object's schema, from the registry or rebuilt from a plain
    /// footer (and registered in passing).
    pub fn schema(&self, ctx: &Context) -> BinaryResult<Arc<crate::schema::Schema>> {
        BinaryReader::new(ctx, &self.bytes, self.start).get_or_create_schema()
    }

    /// Fully materialize the value. When the type's descriptor keeps
    /// deserialized values, the result is cached on this view.
    pub fn deserialize(&self, ctx: &Context) -> BinaryResult<BinaryValue> {
        if let Some(cached) = self.cached.read().clone() {
            return Ok(cached);
        }

        let value = BinaryReader::new(ctx, &self.bytes, self.start).read_root()?;

        let keep = ctx
            .descriptor_by_id(self.type_id)
            .map(|d| d.keep_deserialized())
            .unwrap_or(false);
        if keep {
            *self.cached.write() = Some(value.clone());
        }

        Ok(value)
    }

    /// Buffer identity, used by the writer's handle table.
    pub(crate) fn identity(&self) -> (usize, usize) {
        (Arc::as_ptr(&self.bytes) as *const u8 as usize, self.start)
    }
}

// Equality and hashing are defined over the object's own byte window, so
// an attached view and its detached copy compare equal.
impl PartialEq for BinaryObject {
    fn eq(&self, other: &Self) -> bool {
        self.window() == other.window()
    }
}

impl Eq for BinaryObject {}

impl Hash for BinaryObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.window().hash(state);
    }
}

impl fmt::Debug for BinaryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryObject")
            .field("type_id", &format_args!("0x{:08X}", self.type_id))
            .field("schema_id", &format_args!("0x{:08X}", self.schema_id))
            .field("start", &self.start)
            .field("len", &self.total_len)
            .field("detached", &self.detached())
            .finish()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field layouts and their stable hashes.
//!
//! A [`Schema`] is one ordered field-id layout observed for a type. Its
//! `schema_id` is an FNV-1a/32 hash folded over the four little-endian
//! bytes of each field id, so equal sequences always hash equal and the
//! id can be recomputed by any peer from the footer alone.

mod registry;

pub use registry::SchemaRegistry;

use serde::{Deserialize, Serialize};

pub(crate) const FNV1_BASIS: u32 = 0x811C_9DC5;
pub(crate) const FNV1_PRIME: u32 = 0x0100_0193;

/// Schema id of an empty layout (no fields recorded).
pub const EMPTY_SCHEMA_ID: i32 = FNV1_BASIS as i32;

/// Fold one field id into a running schema id.
pub fn update_schema_id(schema_id: i32, field_id: i32) -> i32 {
    let mut h = schema_id as u32;
    for b in field_id.to_le_bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(FNV1_PRIME);
    }
    h as i32
}

/// FNV-1a over raw bytes; used for content-derived object hash codes.
pub(crate) fn fnv1a(bytes: &[u8]) -> i32 {
    let mut h = FNV1_BASIS;
    for &b in bytes {
        h ^= u32::from(b);
        h = h.wrapping_mul(FNV1_PRIME);
    }
    h as i32
}

/// One ordered field layout of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    id: i32,
    field_ids: Vec<i32>,
}

impl Schema {
    /// Reassemble a schema from an already-known id and layout, e.g. when
    /// received through a metadata update.
    pub(crate) fn from_parts(id: i32, field_ids: Vec<i32>) -> Self {
        Self { id, field_ids }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn field_ids(&self) -> &[i32] {
        &self.field_ids
    }

    pub fn len(&self) -> usize {
        self.field_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_ids.is_empty()
    }

    /// Position of `field_id` within the layout.
    pub fn order_of(&self, field_id: i32) -> Option<usize> {
        self.field_ids.iter().position(|&id| id == field_id)
    }

    pub fn field_id_at(&self, order: usize) -> Option<i32> {
        self.field_ids.get(order).copied()
    }
}

/// Collects field ids in write order and produces a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    field_ids: Vec<i32>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&mut self, field_id: i32) {
        self.field_ids.push(field_id);
    }

    pub fn len(&self) -> usize {
        self.field_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_ids.is_empty()
    }

    pub fn build(self) -> Schema {
        let id = self
            .field_ids
            .iter()
            .fold(EMPTY_SCHEMA_ID, |acc, &fid| update_schema_id(acc, fid));

        Schema {
            id,
            field_ids: self.field_ids,
        }
    }
}

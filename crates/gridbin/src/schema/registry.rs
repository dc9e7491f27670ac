// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-type cache of known schemas, indexed by schema id.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{BinaryError, BinaryResult};
use crate::schema::Schema;

/// Concurrent `schemaId -> Schema` map for one type id.
///
/// Lookups are lock-free on the hot path. Inserts are idempotent: a second
/// insert with an equal schema is a no-op; an unequal schema under an equal
/// id is an invariant violation and fails fatally.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    type_id: i32,
    schemas: DashMap<i32, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new(type_id: i32) -> Self {
        Self {
            type_id,
            schemas: DashMap::new(),
        }
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn lookup(&self, schema_id: i32) -> Option<Arc<Schema>> {
        self.schemas.get(&schema_id).map(|entry| Arc::clone(&entry))
    }

    pub fn insert(&self, schema: Arc<Schema>) -> BinaryResult<()> {
        match self.schemas.entry(schema.id()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if **existing.get() == *schema {
                    Ok(())
                } else {
                    Err(BinaryError::TypeConfig {
                        type_name: format!("0x{:08X}", self.type_id),
                        reason: format!(
                            "schema id 0x{:08X} maps to two different layouts",
                            schema.id()
                        ),
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                log::debug!(
                    "[schema] type 0x{:08X}: registered schema 0x{:08X} ({} fields)",
                    self.type_id,
                    schema.id(),
                    schema.len()
                );
                slot.insert(schema);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Drop all cached schemas. Used when a node re-syncs metadata from
    /// the cluster.
    pub fn clear(&self) {
        self.schemas.clear();
    }
}

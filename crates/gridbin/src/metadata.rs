// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type metadata and its evolution protocol.
//!
//! The coordinator watches every user-type write. The common path (schema
//! already known) does no metadata work at all; only when a write emits a
//! schema the local registry has never seen does the coordinator collect
//! the type's field map, merge it into the accumulated per-type metadata,
//! publish the merged result through the caller-supplied transport
//! callback and register the schema.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::descriptor::{TypeDescriptor, WriteMode};
use crate::error::{BinaryError, BinaryResult};
use crate::ids::IdMapper;
use crate::schema::{Schema, SchemaBuilder};
use crate::serializer::FieldWriter;
use crate::value::{BinaryInstance, BinaryValue, TypeTag};

/// Published metadata of one type: field map, affinity key, known schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetadata {
    type_id: i32,
    type_name: String,
    fields: BTreeMap<String, TypeTag>,
    affinity_key_field: Option<String>,
    schemas: Vec<Schema>,
}

impl BinaryMetadata {
    pub fn new(
        type_id: i32,
        type_name: impl Into<String>,
        fields: BTreeMap<String, TypeTag>,
        affinity_key_field: Option<String>,
        schemas: Vec<Schema>,
    ) -> Self {
        Self {
            type_id,
            type_name: type_name.into(),
            fields,
            affinity_key_field,
            schemas,
        }
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &BTreeMap<String, TypeTag> {
        &self.fields
    }

    pub fn affinity_key_field(&self) -> Option<&str> {
        self.affinity_key_field.as_deref()
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// Union-merge another update into this metadata. Returns whether
    /// anything changed. A field tag conflict is fatal; `Object` acts as
    /// the bottom tag (assigned by `Null` fields) and merges with any
    /// concrete tag.
    pub fn merge(&mut self, other: &BinaryMetadata) -> BinaryResult<bool> {
        let mut changed = false;

        for (name, &tag) in &other.fields {
            match self.fields.get(name).copied() {
                None => {
                    self.fields.insert(name.clone(), tag);
                    changed = true;
                }
                Some(existing) if existing == tag => {}
                Some(TypeTag::Object) => {
                    self.fields.insert(name.clone(), tag);
                    changed = true;
                }
                Some(_) if tag == TypeTag::Object => {}
                Some(existing) => {
                    return Err(BinaryError::MetadataConflict {
                        type_id: self.type_id,
                        field: name.clone(),
                        reason: format!("type tag {:?} conflicts with {:?}", tag, existing),
                    });
                }
            }
        }

        if let Some(theirs) = other.affinity_key_field.clone() {
            match self.affinity_key_field.clone() {
                Some(ours) if ours != theirs => {
                    return Err(BinaryError::MetadataConflict {
                        type_id: self.type_id,
                        field: theirs,
                        reason: format!("affinity key changed from {}", ours),
                    });
                }
                Some(_) => {}
                None => {
                    self.affinity_key_field = Some(theirs);
                    changed = true;
                }
            }
        }

        for schema in &other.schemas {
            if !self.schemas.iter().any(|s| s.id() == schema.id()) {
                self.schemas.push(schema.clone());
                changed = true;
            }
        }

        Ok(changed)
    }
}

/// Transport callback through which merged metadata leaves the codec.
/// Runs on the writing thread unless fire-and-forget mode is configured.
pub trait MetadataHandler: Send + Sync {
    fn metadata_update(&self, type_id: i32, meta: &BinaryMetadata) -> BinaryResult<()>;
}

/// Discards all updates. The default for contexts without a cluster.
#[derive(Debug, Default)]
pub struct NoopMetadataHandler;

impl MetadataHandler for NoopMetadataHandler {
    fn metadata_update(&self, _type_id: i32, _meta: &BinaryMetadata) -> BinaryResult<()> {
        Ok(())
    }
}

/// How the coordinator delivers updates to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Call the handler on the writing thread; the write blocks until the
    /// cluster acknowledges.
    #[default]
    Blocking,
    /// Queue the update; the caller drains the queue out-of-band via
    /// [`Context::flush_metadata`].
    FireAndForget,
}

/// Cancellation token honored only at metadata-publish boundaries. An
/// in-progress byte-level encode or decode always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Records a custom serializer's field order and tags without producing
/// bytes. Used for the second pass a genuinely new schema triggers.
pub struct MetadataCollector {
    type_id: i32,
    mapper: Arc<dyn IdMapper>,
    fields: BTreeMap<String, TypeTag>,
    schema: SchemaBuilder,
}

impl MetadataCollector {
    pub fn new(type_id: i32, mapper: Arc<dyn IdMapper>) -> Self {
        Self {
            type_id,
            mapper,
            fields: BTreeMap::new(),
            schema: SchemaBuilder::new(),
        }
    }

    pub fn finish(self) -> (Schema, BTreeMap<String, TypeTag>) {
        (self.schema.build(), self.fields)
    }
}

impl FieldWriter for MetadataCollector {
    fn write_field(&mut self, name: &str, value: &BinaryValue) -> BinaryResult<()> {
        self.schema
            .add_field(self.mapper.field_id(self.type_id, name));
        self.fields.insert(name.to_string(), value.type_tag());
        Ok(())
    }

    fn begin_raw(&mut self) -> BinaryResult<()> {
        Ok(())
    }

    fn write_raw(&mut self, _bytes: &[u8]) -> BinaryResult<()> {
        Ok(())
    }
}

/// Detects new schemas during writes and publishes merged metadata.
pub struct MetadataCoordinator {
    accumulated: DashMap<i32, BinaryMetadata>,
    pending: SegQueue<(i32, BinaryMetadata)>,
    handler: Arc<dyn MetadataHandler>,
    mode: PublishMode,
}

impl MetadataCoordinator {
    pub(crate) fn new(handler: Arc<dyn MetadataHandler>, mode: PublishMode) -> Self {
        Self {
            accumulated: DashMap::new(),
            pending: SegQueue::new(),
            handler,
            mode,
        }
    }

    /// Accumulated metadata snapshot for a type.
    pub fn metadata(&self, type_id: i32) -> Option<BinaryMetadata> {
        self.accumulated.get(&type_id).map(|m| m.clone())
    }

    /// Post-write hook. The hot path is a single registry lookup.
    pub(crate) fn on_object_written(
        &self,
        ctx: &Context,
        desc: &TypeDescriptor,
        inst: &Arc<BinaryInstance>,
        schema_id: i32,
        cancel: Option<&CancelToken>,
    ) -> BinaryResult<()> {
        if schema_id == 0 {
            // Raw-only object: no schema to coordinate.
            return Ok(());
        }

        let registry = ctx.schema_registry(desc.type_id());
        if registry.lookup(schema_id).is_some() {
            return Ok(());
        }

        let (schema, fields) = match desc.mode() {
            WriteMode::Reflected => {
                let schema = desc.schema().cloned().ok_or_else(|| BinaryError::TypeConfig {
                    type_name: desc.type_name().to_string(),
                    reason: "reflected type without a stable schema".into(),
                })?;
                (schema, desc.fields_meta().clone())
            }
            WriteMode::Custom => {
                let serializer =
                    desc.serializer()
                        .ok_or_else(|| BinaryError::TypeConfig {
                            type_name: desc.type_name().to_string(),
                            reason: "custom type without a serializer".into(),
                        })?;

                let mut collector =
                    MetadataCollector::new(desc.type_id(), Arc::clone(desc.id_mapper()));
                serializer.write_binary(inst, &mut collector)?;
                let (schema, fields) = collector.finish();
                (Arc::new(schema), fields)
            }
            _ => return Ok(()),
        };

        if schema.id() != schema_id {
            return Err(BinaryError::TypeConfig {
                type_name: desc.type_name().to_string(),
                reason: "serializer emitted a different field order during metadata collection"
                    .into(),
            });
        }

        log::debug!(
            "[metadata] type {} (0x{:08X}): new schema 0x{:08X}",
            desc.type_name(),
            desc.type_id(),
            schema_id
        );

        let update = BinaryMetadata::new(
            desc.type_id(),
            desc.type_name(),
            fields,
            desc.affinity_key_field().map(str::to_string),
            vec![(*schema).clone()],
        );

        let changed = match self.accumulated.entry(desc.type_id()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                existing.get_mut().merge(&update)?
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(update);
                true
            }
        };

        if changed && desc.metadata_enabled() {
            let snapshot = self
                .metadata(desc.type_id())
                .unwrap_or_else(|| BinaryMetadata::new(desc.type_id(), desc.type_name(), BTreeMap::new(), None, Vec::new()));
            self.publish(desc.type_id(), snapshot, cancel);
        }

        // Registering locally regardless of publication keeps this node's
        // compact-footer reads working.
        registry.insert(schema)
    }

    fn publish(&self, type_id: i32, meta: BinaryMetadata, cancel: Option<&CancelToken>) {
        match self.mode {
            PublishMode::FireAndForget => self.pending.push((type_id, meta)),
            PublishMode::Blocking => {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    log::debug!(
                        "[metadata] publish of type 0x{:08X} cancelled; queued for retry",
                        type_id
                    );
                    self.pending.push((type_id, meta));
                    return;
                }

                if let Err(err) = self.handler.metadata_update(type_id, &meta) {
                    log::warn!(
                        "[metadata] publish of type 0x{:08X} failed ({}); queued for retry",
                        type_id,
                        err
                    );
                    self.pending.push((type_id, meta));
                }
            }
        }
    }

    /// Deliver queued updates on the calling thread. Returns how many were
    /// published; stops early when cancelled or when the handler fails
    /// (failed updates stay queued).
    pub fn flush_pending(&self, cancel: Option<&CancelToken>) -> BinaryResult<usize> {
        let mut published = 0;

        while let Some((type_id, meta)) = self.pending.pop() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                self.pending.push((type_id, meta));
                return Ok(published);
            }

            if let Err(err) = self.handler.metadata_update(type_id, &meta) {
                self.pending.push((type_id, meta));
                return Err(err);
            }

            published += 1;
        }

        Ok(published)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

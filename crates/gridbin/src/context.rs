// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec context: type descriptors, schema registries, configuration.
//!
//! The context is explicit and passed into every codec call; there is no
//! process-wide default. It is shared freely across threads: descriptor
//! and registry reads are lock-free, descriptor creation is serialized per
//! type id, and a descriptor is immutable once published.

use std::sync::Arc;

use dashmap::DashMap;

use crate::descriptor::{TypeConfiguration, TypeDescriptor};
use crate::error::{BinaryError, BinaryResult};
use crate::ids::{DefaultIdMapper, IdMapper};
use crate::metadata::{
    BinaryMetadata, CancelToken, MetadataCoordinator, MetadataHandler, NoopMetadataHandler,
    PublishMode,
};
use crate::object::BinaryObject;
use crate::reader::BinaryReader;
use crate::schema::SchemaRegistry;
use crate::value::{BinaryInstance, BinaryValue};
use crate::writer::BinaryWriter;

/// Codec-wide configuration.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Emit compact footers (no field ids; readers resolve the layout via
    /// the schema registry).
    pub compact_footer: bool,
    /// Default for per-type metadata publication.
    pub metadata_enabled: bool,
    /// Default for caching deserialized values on [`BinaryObject`] views.
    pub keep_deserialized: bool,
    /// How metadata updates reach the transport callback.
    pub publish_mode: PublishMode,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compact_footer: true,
            metadata_enabled: true,
            keep_deserialized: true,
            publish_mode: PublishMode::Blocking,
        }
    }
}

/// Owns everything the codec needs to encode and decode values.
pub struct Context {
    config: CodecConfig,
    id_mapper: Arc<dyn IdMapper>,
    by_id: DashMap<i32, Arc<TypeDescriptor>>,
    by_name: DashMap<String, i32>,
    schemas: DashMap<i32, Arc<SchemaRegistry>>,
    coordinator: MetadataCoordinator,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl Context {
    pub fn new(config: CodecConfig) -> Self {
        Self::with_handler(config, Arc::new(NoopMetadataHandler))
    }

    /// Create a context whose metadata updates go to `handler`.
    pub fn with_handler(config: CodecConfig, handler: Arc<dyn MetadataHandler>) -> Self {
        let coordinator = MetadataCoordinator::new(handler, config.publish_mode);
        Self {
            config,
            id_mapper: Arc::new(DefaultIdMapper),
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            schemas: DashMap::new(),
            coordinator,
        }
    }

    /// Replace the default id mapper. Affects types registered afterwards.
    pub fn with_id_mapper(mut self, mapper: Arc<dyn IdMapper>) -> Self {
        self.id_mapper = mapper;
        self
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub(crate) fn default_id_mapper(&self) -> Arc<dyn IdMapper> {
        Arc::clone(&self.id_mapper)
    }

    // -----------------------------------------------------------------
    // Type registration
    // -----------------------------------------------------------------

    /// Register a type. Re-registering the same name returns the existing
    /// descriptor; two distinct names hashing to one type id fail fatally.
    pub fn register_type(&self, cfg: TypeConfiguration) -> BinaryResult<Arc<TypeDescriptor>> {
        let desc = Arc::new(TypeDescriptor::build(
            cfg,
            &self.id_mapper,
            self.config.metadata_enabled,
            self.config.keep_deserialized,
        )?);

        match self.by_id.entry(desc.type_id()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.canonical_name() == desc.canonical_name() {
                    Ok(Arc::clone(existing))
                } else {
                    Err(BinaryError::TypeConfig {
                        type_name: desc.type_name().to_string(),
                        reason: format!(
                            "type id 0x{:08X} already taken by type {}",
                            desc.type_id(),
                            existing.type_name()
                        ),
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                log::debug!(
                    "[context] registered type {} as 0x{:08X} ({:?})",
                    desc.type_name(),
                    desc.type_id(),
                    desc.mode()
                );
                slot.insert(Arc::clone(&desc));
                self.by_name
                    .insert(desc.canonical_name().to_string(), desc.type_id());
                Ok(desc)
            }
        }
    }

    pub fn descriptor_by_id(&self, type_id: i32) -> Option<Arc<TypeDescriptor>> {
        self.by_id.get(&type_id).map(|d| Arc::clone(&d))
    }

    pub fn descriptor_by_name(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        let canonical = type_name.to_lowercase();
        let type_id = *self.by_name.get(&canonical)?;
        self.descriptor_by_id(type_id)
    }

    /// Descriptor for an instance's type, created on first encounter: an
    /// unregistered type gets a reflected descriptor derived from the
    /// instance's own field list.
    pub(crate) fn descriptor_for_instance(
        &self,
        inst: &Arc<BinaryInstance>,
    ) -> BinaryResult<Arc<TypeDescriptor>> {
        if let Some(desc) = self.descriptor_by_name(inst.type_name()) {
            return Ok(desc);
        }

        let mut cfg = TypeConfiguration::new(inst.type_name());
        for (name, tag) in inst.field_tags() {
            cfg = cfg.field(name, tag);
        }

        log::debug!(
            "[context] first encounter of type {}; deriving descriptor from instance",
            inst.type_name()
        );
        self.register_type(cfg)
    }

    /// Derived field id for a type, using its registered mapper when
    /// available.
    pub fn field_id(&self, type_id: i32, field_name: &str) -> i32 {
        match self.descriptor_by_id(type_id) {
            Some(desc) => desc.id_mapper().field_id(type_id, field_name),
            None => self.id_mapper.field_id(type_id, field_name),
        }
    }

    // -----------------------------------------------------------------
    // Schemas and metadata
    // -----------------------------------------------------------------

    /// The schema registry of one type (created on first use).
    pub fn schema_registry(&self, type_id: i32) -> Arc<SchemaRegistry> {
        Arc::clone(
            &self
                .schemas
                .entry(type_id)
                .or_insert_with(|| Arc::new(SchemaRegistry::new(type_id))),
        )
    }

    pub(crate) fn metadata_coordinator(&self) -> &MetadataCoordinator {
        &self.coordinator
    }

    /// Accumulated metadata snapshot for a type.
    pub fn metadata(&self, type_id: i32) -> Option<BinaryMetadata> {
        self.coordinator.metadata(type_id)
    }

    /// Apply a metadata update received from another node: merge it and
    /// register its schemas locally.
    pub fn apply_metadata(&self, meta: &BinaryMetadata) -> BinaryResult<()> {
        let registry = self.schema_registry(meta.type_id());
        for schema in meta.schemas() {
            registry.insert(Arc::new(schema.clone()))?;
        }
        Ok(())
    }

    /// Drain queued metadata publications on this thread.
    pub fn flush_metadata(&self, cancel: Option<&CancelToken>) -> BinaryResult<usize> {
        self.coordinator.flush_pending(cancel)
    }

    // -----------------------------------------------------------------
    // Codec entry points
    // -----------------------------------------------------------------

    /// Encode one value into a fresh buffer.
    pub fn marshal(&self, value: &BinaryValue) -> BinaryResult<Vec<u8>> {
        let mut writer = BinaryWriter::new(self);
        writer.write(value)?;
        Ok(writer.into_bytes())
    }

    /// Fully decode one value from `bytes`.
    pub fn unmarshal(&self, bytes: &[u8]) -> BinaryResult<BinaryValue> {
        BinaryReader::new(self, bytes, 0).read_root()
    }

    /// Wrap encoded bytes in a lazy view without decoding them.
    pub fn binary_object(&self, bytes: Vec<u8>) -> BinaryResult<BinaryObject> {
        BinaryObject::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeConfiguration;
    use crate::value::{InstanceBuilder, TypeTag};

    #[test]
    fn register_and_look_up_by_id_and_name() {
        let ctx = Context::default();
        let desc = ctx
            .register_type(TypeConfiguration::new("Point").field("x", TypeTag::Int))
            .unwrap();

        assert_eq!(ctx.descriptor_by_id(desc.type_id()).unwrap().type_id(), desc.type_id());
        assert!(ctx.descriptor_by_name("POINT").is_some());
        assert!(ctx.descriptor_by_name("nope").is_none());
    }

    #[test]
    fn re_registration_is_idempotent() {
        let ctx = Context::default();
        let a = ctx.register_type(TypeConfiguration::new("Point")).unwrap();
        let b = ctx.register_type(TypeConfiguration::new("point")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn colliding_type_names_are_fatal() {
        struct ConstMapper;
        impl IdMapper for ConstMapper {
            fn type_id(&self, _name: &str) -> i32 {
                7
            }
            fn field_id(&self, _type_id: i32, field_name: &str) -> i32 {
                DefaultIdMapper.field_id(0, field_name)
            }
        }

        let ctx = Context::default();
        let mapper: Arc<dyn IdMapper> = Arc::new(ConstMapper);

        ctx.register_type(TypeConfiguration::new("A").id_mapper(Arc::clone(&mapper)))
            .unwrap();
        let err = ctx
            .register_type(TypeConfiguration::new("B").id_mapper(mapper))
            .unwrap_err();

        assert!(matches!(err, BinaryError::TypeConfig { .. }));
    }

    #[test]
    fn instance_auto_registration_derives_fields() {
        let ctx = Context::default();
        let inst = InstanceBuilder::new("Sensor")
            .field("id", 7)
            .field("name", "probe")
            .build();

        let desc = ctx.descriptor_for_instance(&inst).unwrap();
        assert_eq!(desc.field_accessors().len(), 2);
        assert_eq!(desc.fields_meta().get("name"), Some(&TypeTag::String));
    }

    #[test]
    fn schema_registry_is_per_type() {
        let ctx = Context::default();
        let a = ctx.schema_registry(1);
        let b = ctx.schema_registry(2);
        let a2 = ctx.schema_registry(1);

        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}

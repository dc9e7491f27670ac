// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema discovery and metadata publication: the common path does no
//! metadata work, a new schema triggers exactly one collect-merge-publish
//! round, and compact-footer reads recover after a registry re-sync.

use std::sync::Arc;

use parking_lot::Mutex;

use gridbin::{
    BinaryError, BinaryInstance, BinaryMetadata, BinarySerializer, BinaryValue, CancelToken,
    CodecConfig, Context, FieldReader, FieldWriter, InstanceBuilder, MetadataHandler, PublishMode,
    TypeConfiguration, TypeTag,
};

/// Records every published update; optionally fails on demand.
#[derive(Default)]
struct RecordingHandler {
    updates: Mutex<Vec<(i32, BinaryMetadata)>>,
    fail: Mutex<bool>,
}

impl RecordingHandler {
    fn updates(&self) -> Vec<(i32, BinaryMetadata)> {
        self.updates.lock().clone()
    }

    fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

impl MetadataHandler for RecordingHandler {
    fn metadata_update(&self, type_id: i32, meta: &BinaryMetadata) -> gridbin::Result<()> {
        if *self.fail.lock() {
            return Err(BinaryError::UnsupportedValue {
                reason: "transport down".into(),
            });
        }
        self.updates.lock().push((type_id, meta.clone()));
        Ok(())
    }
}

fn recording_ctx(mode: PublishMode) -> (Context, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::default());
    let ctx = Context::with_handler(
        CodecConfig {
            publish_mode: mode,
            ..CodecConfig::default()
        },
        Arc::clone(&handler) as Arc<dyn MetadataHandler>,
    );
    (ctx, handler)
}

#[test]
fn first_write_publishes_metadata_once() {
    let (ctx, handler) = recording_ctx(PublishMode::Blocking);

    let point = || InstanceBuilder::new("Point").field("x", 1).field("y", 2).build();

    ctx.marshal(&BinaryValue::Object(point())).unwrap();
    ctx.marshal(&BinaryValue::Object(point())).unwrap();
    ctx.marshal(&BinaryValue::Object(point())).unwrap();

    // Schema known after the first write; no further publications.
    let updates = handler.updates();
    assert_eq!(updates.len(), 1);

    let (type_id, meta) = &updates[0];
    assert_eq!(*type_id, 0x065E_5590);
    assert_eq!(meta.type_name(), "Point");
    assert_eq!(meta.fields().get("x"), Some(&TypeTag::Int));
    assert_eq!(meta.fields().get("y"), Some(&TypeTag::Int));
    assert_eq!(meta.schemas().len(), 1);
}

#[test]
fn affinity_key_is_published() {
    let (ctx, handler) = recording_ctx(PublishMode::Blocking);
    ctx.register_type(
        TypeConfiguration::new("Order")
            .field("id", TypeTag::Long)
            .field("customer", TypeTag::String)
            .affinity_key("customer"),
    )
    .unwrap();

    let order = InstanceBuilder::new("Order")
        .field("id", BinaryValue::Long(9))
        .field("customer", "acme")
        .build();
    ctx.marshal(&BinaryValue::Object(order)).unwrap();

    let updates = handler.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.affinity_key_field(), Some("customer"));
}

// ---------------------------------------------------------------------------
// Evolution through a custom serializer
// ---------------------------------------------------------------------------

/// Writes `v1` always and `v2` only when the instance carries it, so the
/// same type emits two different schemas over time.
struct EvolvingSerializer;

impl BinarySerializer for EvolvingSerializer {
    fn write_binary(
        &self,
        obj: &BinaryInstance,
        writer: &mut dyn FieldWriter,
    ) -> gridbin::Result<()> {
        writer.write_int("v1", obj.field("v1").and_then(|v| v.as_i32()).unwrap_or(0))?;
        if let Some(v2) = obj.field("v2").and_then(|v| v.as_i32()) {
            writer.write_int("v2", v2)?;
        }
        Ok(())
    }

    fn read_binary(
        &self,
        obj: &BinaryInstance,
        reader: &mut dyn FieldReader,
    ) -> gridbin::Result<()> {
        if let Some(v1) = reader.read_int("v1")? {
            obj.set_field("v1", BinaryValue::Int(v1));
        }
        if let Some(v2) = reader.read_int("v2")? {
            obj.set_field("v2", BinaryValue::Int(v2));
        }
        Ok(())
    }
}

#[test]
fn schema_evolution_merges_metadata() {
    let (ctx, handler) = recording_ctx(PublishMode::Blocking);
    ctx.register_type(TypeConfiguration::new("Evolving").serializer(Arc::new(EvolvingSerializer)))
        .unwrap();

    let old = InstanceBuilder::new("Evolving").field("v1", 1).build();
    let new = InstanceBuilder::new("Evolving").field("v1", 1).field("v2", 2).build();

    ctx.marshal(&BinaryValue::Object(old.clone())).unwrap();
    ctx.marshal(&BinaryValue::Object(new)).unwrap();
    // Old layout again: schema already known, no third publication.
    ctx.marshal(&BinaryValue::Object(old)).unwrap();

    let updates = handler.updates();
    assert_eq!(updates.len(), 2);

    // The second update carries the union of both layouts.
    let merged = &updates[1].1;
    assert_eq!(merged.fields().len(), 2);
    assert_eq!(merged.schemas().len(), 2);

    // Both layouts decode.
    let type_id = updates[0].0;
    let meta = ctx.metadata(type_id).unwrap();
    assert_eq!(meta.schemas().len(), 2);
}

#[test]
fn both_layouts_stay_readable() {
    let ctx = Context::default();
    ctx.register_type(TypeConfiguration::new("Evolving").serializer(Arc::new(EvolvingSerializer)))
        .unwrap();

    let old_bytes = ctx
        .marshal(&BinaryValue::Object(
            InstanceBuilder::new("Evolving").field("v1", 10).build(),
        ))
        .unwrap();
    let new_bytes = ctx
        .marshal(&BinaryValue::Object(
            InstanceBuilder::new("Evolving").field("v1", 11).field("v2", 12).build(),
        ))
        .unwrap();

    let old = ctx.unmarshal(&old_bytes).unwrap();
    let new = ctx.unmarshal(&new_bytes).unwrap();

    assert_eq!(old.as_instance().unwrap().field("v1").unwrap().as_i32(), Some(10));
    assert_eq!(old.as_instance().unwrap().field("v2"), None);
    assert_eq!(new.as_instance().unwrap().field("v2").unwrap().as_i32(), Some(12));
}

// ---------------------------------------------------------------------------
// Compact footer vs registry loss (the retry-after-sync path)
// ---------------------------------------------------------------------------

#[test]
fn cleared_registry_fails_then_recovers() {
    let ctx = Context::default();
    let point = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();

    let bytes = ctx.marshal(&BinaryValue::Object(point.clone())).unwrap();
    let view = ctx.binary_object(bytes.clone()).unwrap();
    let type_id = view.type_id();

    // Sanity: the field resolves while the schema is known.
    assert_eq!(view.field(&ctx, "x").unwrap().as_i32(), Some(3));

    // Simulate a node that lost its schema cache.
    ctx.schema_registry(type_id).clear();

    let err = view.field(&ctx, "x").unwrap_err();
    match &err {
        BinaryError::UnknownSchema { type_id: t, .. } => assert_eq!(*t, type_id),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.recoverable());

    // Re-sync from the published metadata and retry.
    let meta = ctx.metadata(type_id).expect("metadata accumulated");
    ctx.apply_metadata(&meta).unwrap();

    assert_eq!(view.field(&ctx, "x").unwrap().as_i32(), Some(3));
    assert_eq!(ctx.unmarshal(&bytes).unwrap(), BinaryValue::Object(point));
}

// ---------------------------------------------------------------------------
// Publish failure, fire-and-forget, cancellation
// ---------------------------------------------------------------------------

#[test]
fn failed_publish_is_retried_out_of_band() {
    let (ctx, handler) = recording_ctx(PublishMode::Blocking);
    handler.set_fail(true);

    let bytes = ctx
        .marshal(&BinaryValue::Object(
            InstanceBuilder::new("Point").field("x", 1).field("y", 2).build(),
        ))
        .unwrap();

    // The write itself completed; only the publish is pending.
    assert!(handler.updates().is_empty());
    assert_eq!(ctx.unmarshal(&bytes).unwrap().type_tag(), TypeTag::Object);

    // Flush fails while the transport is down, keeping the update queued.
    handler.set_fail(true);
    assert!(ctx.flush_metadata(None).is_err());

    handler.set_fail(false);
    assert_eq!(ctx.flush_metadata(None).unwrap(), 1);
    assert_eq!(handler.updates().len(), 1);
    assert_eq!(ctx.flush_metadata(None).unwrap(), 0);
}

#[test]
fn fire_and_forget_queues_until_flushed() {
    let (ctx, handler) = recording_ctx(PublishMode::FireAndForget);

    ctx.marshal(&BinaryValue::Object(
        InstanceBuilder::new("Point").field("x", 1).field("y", 2).build(),
    ))
    .unwrap();

    assert!(handler.updates().is_empty());
    assert_eq!(ctx.flush_metadata(None).unwrap(), 1);
    assert_eq!(handler.updates().len(), 1);
}

#[test]
fn cancellation_stops_flush_without_losing_updates() {
    let (ctx, handler) = recording_ctx(PublishMode::FireAndForget);

    ctx.marshal(&BinaryValue::Object(
        InstanceBuilder::new("Point").field("x", 1).field("y", 2).build(),
    ))
    .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();

    assert_eq!(ctx.flush_metadata(Some(&cancel)).unwrap(), 0);
    assert!(handler.updates().is_empty());

    // The update survived the cancelled flush.
    assert_eq!(ctx.flush_metadata(None).unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Fatal configuration errors
// ---------------------------------------------------------------------------

#[test]
fn colliding_field_ids_fail_registration() {
    let ctx = Context::default();

    // Case-insensitive hashing makes these two names collide.
    let err = ctx
        .register_type(
            TypeConfiguration::new("Broken")
                .field("value", TypeTag::Int)
                .field("Value", TypeTag::Long),
        )
        .unwrap_err();

    match err {
        BinaryError::TypeConfig { reason, .. } => assert!(reason.contains("duplicate field")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn metadata_disabled_type_publishes_nothing_but_reads_fine() {
    let (ctx, handler) = recording_ctx(PublishMode::Blocking);
    ctx.register_type(
        TypeConfiguration::new("Quiet")
            .field("v", TypeTag::Int)
            .metadata_enabled(false),
    )
    .unwrap();

    let bytes = ctx
        .marshal(&BinaryValue::Object(
            InstanceBuilder::new("Quiet").field("v", 5).build(),
        ))
        .unwrap();

    assert!(handler.updates().is_empty());

    // Local compact-footer reads still work: the schema registered locally.
    let view = ctx.binary_object(bytes).unwrap();
    assert_eq!(view.field(&ctx, "v").unwrap().as_i32(), Some(5));
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # gridbin - Portable binary objects for in-memory data grids
//!
//! A schema-aware, language-neutral binary serialization format with
//! random field access over raw bytes, plus the schema registry and
//! metadata evolution protocol that keep type layouts consistent across
//! grid nodes.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridbin::{BinaryValue, Context, InstanceBuilder};
//!
//! fn main() -> gridbin::Result<()> {
//!     let ctx = Context::default();
//!
//!     let point = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();
//!     let bytes = ctx.marshal(&BinaryValue::Object(point))?;
//!
//!     // Lazy view: read one field without decoding the object.
//!     let view = ctx.binary_object(bytes)?;
//!     assert_eq!(view.field(&ctx, "x")?.as_i32(), Some(3));
//!
//!     // Or materialize the whole value.
//!     let value = view.deserialize(&ctx)?;
//!     assert_eq!(value.as_instance().unwrap().field("y").unwrap().as_i32(), Some(4));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                           Context                                  |
//! |    descriptors | id mapper | schema registries | configuration     |
//! +--------------------------------------------------------------------+
//! |       Writer                |               Reader                 |
//! |  handle table, schema       |  random field access, handle         |
//! |  recorder, footer emission  |  resolution, footer navigation       |
//! +--------------------------------------------------------------------+
//! |   BinaryObject (lazy view)  |       MetadataCoordinator            |
//! |   O(1) header, detach       |  new-schema detection, merge,        |
//! |                             |  transport callback                  |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Context`] | Owns descriptors, registries and configuration; passed into every call |
//! | [`BinaryValue`] | The value tree: primitives, arrays, containers, instances |
//! | [`BinaryObject`] | Lazy view over encoded bytes with random field access |
//! | [`BinaryWriter`] | Encodes one value tree, tracking shared values and cycles |
//! | [`BinaryReader`] | Decodes bytes, fully or one field at a time |
//! | [`TypeConfiguration`] | Declarative per-type setup (fields, serializers, hooks) |
//!
//! The wire format is little-endian throughout; every user-type object
//! carries a fixed 24-byte header and a trailing schema footer that makes
//! per-field access possible without deserialization. Shared values and
//! cycles are encoded once and referenced by `HANDLE` back-offsets.

pub mod context;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod io;
pub mod metadata;
pub mod object;
pub mod reader;
pub mod schema;
pub mod serializer;
pub mod value;
pub mod wire;
pub mod writer;

pub use context::{CodecConfig, Context};
pub use descriptor::{FieldAccessor, TypeConfiguration, TypeDescriptor, WriteMode};
pub use error::{BinaryError, BinaryResult};
pub use ids::{DefaultIdMapper, IdMapper};
pub use metadata::{
    BinaryMetadata, CancelToken, MetadataCollector, MetadataHandler, NoopMetadataHandler,
    PublishMode,
};
pub use object::BinaryObject;
pub use reader::BinaryReader;
pub use schema::{Schema, SchemaBuilder, SchemaRegistry};
pub use serializer::{
    BinarySerializer, ExternalSerializer, FieldReader, FieldWriter, ValueHook,
};
pub use value::{
    BinaryInstance, BinaryValue, ClassRef, Date, EnumValue, InstanceBuilder, Timestamp, TypeTag,
};
pub use writer::BinaryWriter;

/// Crate-wide result alias.
pub type Result<T> = BinaryResult<T>;

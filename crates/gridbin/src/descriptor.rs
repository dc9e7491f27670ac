// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-type descriptors: identity, encoding mode, field accessors,
//! stable schema, lifecycle hooks.
//!
//! A descriptor is created once per type (explicitly via
//! [`crate::context::Context::register_type`] or on first encounter of an
//! instance) and is immutable afterwards; concurrent readers access it
//! lock-free through an `Arc`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::{BinaryError, BinaryResult};
use crate::ids::IdMapper;
use crate::reader::BinaryReader;
use crate::schema::{Schema, SchemaBuilder};
use crate::serializer::{
    BinarySerializer, ExternalSerializer, FieldReader, FieldWriter, ValueHook,
};
use crate::value::{BinaryInstance, BinaryValue, TypeTag};
use crate::writer::BinaryWriter;

/// How values of a type are encoded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Predefined primitive / array / container type: plain tag dispatch,
    /// no user-type header.
    Fixed(TypeTag),
    /// Plain user type: the codec walks the field-accessor table.
    Reflected,
    /// User-supplied binary serializer drives the named-field API.
    Custom,
    /// The type takes over the byte stream entirely (raw tail, no footer).
    External,
    /// Never encoded; written as `NULL`.
    Excluded,
}

impl std::fmt::Debug for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Fixed(tag) => write!(f, "Fixed({tag:?})"),
            WriteMode::Reflected => write!(f, "Reflected"),
            WriteMode::Custom => write!(f, "Custom"),
            WriteMode::External => write!(f, "External"),
            WriteMode::Excluded => write!(f, "Excluded"),
        }
    }
}

/// One entry of the field-accessor table: resolves a named field of an
/// instance and carries its derived id and metadata tag.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    name: String,
    field_id: i32,
    tag: TypeTag,
}

impl FieldAccessor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_id(&self) -> i32 {
        self.field_id
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    fn get(&self, inst: &BinaryInstance) -> BinaryValue {
        inst.field(&self.name).unwrap_or(BinaryValue::Null)
    }
}

/// Declarative type specification, consumed by
/// [`crate::context::Context::register_type`].
pub struct TypeConfiguration {
    pub(crate) type_name: String,
    pub(crate) user_type: bool,
    pub(crate) affinity_key_field: Option<String>,
    pub(crate) id_mapper: Option<Arc<dyn IdMapper>>,
    pub(crate) serializer: Option<Arc<dyn BinarySerializer>>,
    pub(crate) external: Option<Arc<dyn ExternalSerializer>>,
    pub(crate) fields: Vec<(String, TypeTag)>,
    pub(crate) fixed_tag: Option<TypeTag>,
    pub(crate) metadata_enabled: Option<bool>,
    pub(crate) keep_deserialized: Option<bool>,
    pub(crate) registered: bool,
    pub(crate) excluded: bool,
    pub(crate) write_replace: Option<ValueHook>,
    pub(crate) read_resolve: Option<ValueHook>,
}

impl TypeConfiguration {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            user_type: true,
            affinity_key_field: None,
            id_mapper: None,
            serializer: None,
            external: None,
            fields: Vec::new(),
            fixed_tag: None,
            metadata_enabled: None,
            keep_deserialized: None,
            registered: true,
            excluded: false,
            write_replace: None,
            read_resolve: None,
        }
    }

    /// Declare a field (REFLECTED mode). Declaration order becomes the
    /// stable schema order, super-type fields first.
    pub fn field(mut self, name: impl Into<String>, tag: TypeTag) -> Self {
        self.fields.push((name.into(), tag));
        self
    }

    pub fn affinity_key(mut self, field: impl Into<String>) -> Self {
        self.affinity_key_field = Some(field.into());
        self
    }

    pub fn id_mapper(mut self, mapper: Arc<dyn IdMapper>) -> Self {
        self.id_mapper = Some(mapper);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn BinarySerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn external(mut self, external: Arc<dyn ExternalSerializer>) -> Self {
        self.external = Some(external);
        self
    }

    /// Predefined primitive-like type (not a user type).
    pub fn predefined(mut self, tag: TypeTag) -> Self {
        self.fixed_tag = Some(tag);
        self.user_type = false;
        self
    }

    pub fn metadata_enabled(mut self, enabled: bool) -> Self {
        self.metadata_enabled = Some(enabled);
        self
    }

    pub fn keep_deserialized(mut self, keep: bool) -> Self {
        self.keep_deserialized = Some(keep);
        self
    }

    /// Mark the type as lacking a cluster-wide id: the header carries the
    /// unregistered sentinel and the type name travels with every object.
    pub fn unregistered(mut self) -> Self {
        self.registered = false;
        self
    }

    /// Never encode values of this type; they serialize as `NULL`.
    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    pub fn write_replace(mut self, hook: ValueHook) -> Self {
        self.write_replace = Some(hook);
        self
    }

    pub fn read_resolve(mut self, hook: ValueHook) -> Self {
        self.read_resolve = Some(hook);
        self
    }
}

/// Immutable runtime descriptor of one type.
pub struct TypeDescriptor {
    type_id: i32,
    type_name: String,
    canonical_name: String,
    user_type: bool,
    mode: WriteMode,
    affinity_key_field: Option<String>,
    id_mapper: Arc<dyn IdMapper>,
    serializer: Option<Arc<dyn BinarySerializer>>,
    external: Option<Arc<dyn ExternalSerializer>>,
    fields: Vec<FieldAccessor>,
    stable_schema: Option<Arc<Schema>>,
    fields_meta: BTreeMap<String, TypeTag>,
    metadata_enabled: bool,
    keep_deserialized: bool,
    registered: bool,
    write_replace: Option<ValueHook>,
    read_resolve: Option<ValueHook>,
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_id", &self.type_id)
            .field("type_name", &self.type_name)
            .field("mode", &self.mode)
            .field("fields", &self.fields.len())
            .field("registered", &self.registered)
            .finish()
    }
}

impl TypeDescriptor {
    /// Build a descriptor from its configuration. Rejects duplicate field
    /// names, colliding field ids and a zero (reserved) type id.
    pub(crate) fn build(
        cfg: TypeConfiguration,
        default_mapper: &Arc<dyn IdMapper>,
        default_metadata_enabled: bool,
        default_keep_deserialized: bool,
    ) -> BinaryResult<Self> {
        let mapper = cfg.id_mapper.unwrap_or_else(|| Arc::clone(default_mapper));
        let canonical_name = cfg.type_name.to_lowercase();

        let type_id = mapper.type_id(&cfg.type_name);
        if type_id == crate::wire::UNREGISTERED_TYPE_ID && cfg.registered {
            return Err(BinaryError::TypeConfig {
                type_name: cfg.type_name,
                reason: "type id hashed to the reserved unregistered sentinel (0)".into(),
            });
        }

        if cfg.serializer.is_some() && cfg.external.is_some() {
            return Err(BinaryError::TypeConfig {
                type_name: cfg.type_name,
                reason: "a type cannot have both a binary and an external serializer".into(),
            });
        }

        let mode = if cfg.excluded {
            WriteMode::Excluded
        } else if let Some(tag) = cfg.fixed_tag {
            WriteMode::Fixed(tag)
        } else if cfg.serializer.is_some() {
            WriteMode::Custom
        } else if cfg.external.is_some() {
            WriteMode::External
        } else {
            WriteMode::Reflected
        };

        let mut fields = Vec::new();
        let mut stable_schema = None;
        let mut fields_meta = BTreeMap::new();
        let metadata_enabled = cfg.metadata_enabled.unwrap_or(default_metadata_enabled);

        if mode == WriteMode::Reflected {
            let mut names = HashSet::new();
            let mut ids = HashSet::new();
            let mut schema = SchemaBuilder::new();

            for (name, tag) in cfg.fields {
                if !names.insert(name.clone()) {
                    return Err(BinaryError::TypeConfig {
                        type_name: cfg.type_name,
                        reason: format!("duplicate field name: {}", name),
                    });
                }

                let field_id = mapper.field_id(type_id, &name);
                if !ids.insert(field_id) {
                    return Err(BinaryError::TypeConfig {
                        type_name: cfg.type_name,
                        reason: format!("duplicate field id for field: {}", name),
                    });
                }

                schema.add_field(field_id);

                if metadata_enabled {
                    fields_meta.insert(name.clone(), tag);
                }

                fields.push(FieldAccessor {
                    name,
                    field_id,
                    tag,
                });
            }

            stable_schema = Some(Arc::new(schema.build()));
        }

        Ok(Self {
            type_id,
            canonical_name,
            type_name: cfg.type_name,
            user_type: cfg.user_type,
            mode,
            affinity_key_field: cfg.affinity_key_field,
            id_mapper: mapper,
            serializer: cfg.serializer,
            external: cfg.external,
            fields,
            stable_schema,
            fields_meta,
            metadata_enabled,
            keep_deserialized: cfg.keep_deserialized.unwrap_or(default_keep_deserialized),
            registered: cfg.registered,
            write_replace: cfg.write_replace,
            read_resolve: cfg.read_resolve,
        })
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Lowercase canonical form used for name lookups.
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn user_type(&self) -> bool {
        self.user_type
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn affinity_key_field(&self) -> Option<&str> {
        self.affinity_key_field.as_deref()
    }

    pub fn id_mapper(&self) -> &Arc<dyn IdMapper> {
        &self.id_mapper
    }

    /// Stable schema of a REFLECTED type.
    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.stable_schema.as_ref()
    }

    /// Field name to type-tag map published in metadata.
    pub fn fields_meta(&self) -> &BTreeMap<String, TypeTag> {
        &self.fields_meta
    }

    pub fn field_accessors(&self) -> &[FieldAccessor] {
        &self.fields
    }

    pub fn metadata_enabled(&self) -> bool {
        self.metadata_enabled
    }

    pub fn keep_deserialized(&self) -> bool {
        self.keep_deserialized
    }

    pub fn registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn serializer(&self) -> Option<&Arc<dyn BinarySerializer>> {
        self.serializer.as_ref()
    }

    pub(crate) fn write_replace(&self) -> Option<&ValueHook> {
        self.write_replace.as_ref()
    }

    /// Encode one value of this type. The writer has not emitted anything
    /// for it yet; handle lookup happens here.
    pub(crate) fn write(&self, val: &BinaryValue, w: &mut BinaryWriter<'_>) -> BinaryResult<()> {
        match self.mode {
            WriteMode::Excluded => {
                w.write_null();
                Ok(())
            }
            WriteMode::Fixed(_) => {
                if matches!(val, BinaryValue::Object(_)) {
                    return Err(BinaryError::UnsupportedValue {
                        reason: format!(
                            "type {} is predefined and cannot encode an instance",
                            self.type_name
                        ),
                    });
                }
                w.write_value(val)
            }
            WriteMode::Reflected | WriteMode::Custom | WriteMode::External => {
                let inst = val.as_instance().ok_or_else(|| BinaryError::UnsupportedValue {
                    reason: format!("type {} expects an instance value", self.type_name),
                })?;

                if w.try_write_as_handle(val)? {
                    return Ok(());
                }

                w.begin_object(self)?;

                let mut res = self.write_fields(inst, w);
                if res.is_ok() {
                    res = match w.post_write(self, inst) {
                        Ok(schema_id) if self.user_type => {
                            w.on_object_written(self, inst, schema_id)
                        }
                        Ok(_) => Ok(()),
                        Err(err) => Err(err),
                    };
                }

                w.pop_schema();
                res
            }
        }
    }

    fn write_fields(&self, inst: &Arc<BinaryInstance>, w: &mut BinaryWriter<'_>) -> BinaryResult<()> {
        match self.mode {
            WriteMode::Reflected => {
                for accessor in &self.fields {
                    let value = accessor.get(inst);
                    w.write_field(&accessor.name, &value)?;
                }
                Ok(())
            }
            WriteMode::Custom => match &self.serializer {
                Some(serializer) => serializer.write_binary(inst, w),
                None => Err(BinaryError::TypeConfig {
                    type_name: self.type_name.clone(),
                    reason: "CUSTOM mode without serializer".into(),
                }),
            },
            WriteMode::External => match &self.external {
                Some(external) => {
                    w.begin_raw()?;
                    external.write_external(inst, w)
                }
                None => Err(BinaryError::TypeConfig {
                    type_name: self.type_name.clone(),
                    reason: "EXTERNAL mode without serializer".into(),
                }),
            },
            _ => Ok(()),
        }
    }

    /// Decode one value of this type. The reader has parsed the header,
    /// pushed the object frame, and positioned past any embedded name.
    pub(crate) fn read(&self, r: &mut BinaryReader<'_>) -> BinaryResult<BinaryValue> {
        let inst = Arc::new(BinaryInstance::new(self.type_name.clone()));

        // Publish before decoding children so back-references resolve.
        r.set_handle_current(BinaryValue::Object(Arc::clone(&inst)));

        match self.mode {
            WriteMode::Reflected => {
                for accessor in &self.fields {
                    let value = r.read_field(&accessor.name)?;
                    inst.set_field(accessor.name.clone(), value);
                }
            }
            WriteMode::Custom => match &self.serializer {
                Some(serializer) => serializer.read_binary(&inst, r)?,
                None => {
                    return Err(BinaryError::TypeConfig {
                        type_name: self.type_name.clone(),
                        reason: "CUSTOM mode without serializer".into(),
                    })
                }
            },
            WriteMode::External => match &self.external {
                Some(external) => {
                    r.begin_raw()?;
                    external.read_external(&inst, r)?;
                }
                None => {
                    return Err(BinaryError::TypeConfig {
                        type_name: self.type_name.clone(),
                        reason: "EXTERNAL mode without serializer".into(),
                    })
                }
            },
            WriteMode::Fixed(_) | WriteMode::Excluded => {
                return Err(BinaryError::UnsupportedValue {
                    reason: format!(
                        "type {} cannot appear behind a user-type header",
                        self.type_name
                    ),
                });
            }
        }

        let mut result = BinaryValue::Object(inst);

        if let Some(hook) = &self.read_resolve {
            result = hook(result).map_err(|e| BinaryError::UserHookFailed {
                hook: "read_resolve",
                type_name: self.type_name.clone(),
                reason: e.to_string(),
            })?;
            // Later back-references must see the replacement.
            r.set_handle_current(result.clone());
        }

        Ok(result)
    }
}

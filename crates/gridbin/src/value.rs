// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The value tree encoded and decoded by the codec.
//!
//! [`BinaryValue`] covers every wire tag: primitives, arrays, containers,
//! enums, pre-encoded objects and user-type instances. User-type instances
//! ([`BinaryInstance`]) are shared through `Arc` and carry their fields
//! behind a lock so the reader can install an instance in its handle table
//! before decoding children and back-fill afterwards; that is what lets
//! cyclic graphs decode. Identity (for the writer's handle table and the
//! sharing laws) is `Arc` pointer identity.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object::BinaryObject;
use crate::wire;

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    millis: i64,
}

impl Date {
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }
}

/// Millisecond timestamp plus sub-millisecond nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    millis: i64,
    nanos: i32,
}

impl Timestamp {
    pub fn new(millis: i64, nanos: i32) -> Self {
        Self { millis, nanos }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Nanoseconds in addition to `millis`.
    pub fn nanos(&self) -> i32 {
        self.nanos
    }
}

/// An enum constant: owning type plus ordinal. The name is carried only
/// when the owning type has no cluster-wide id yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_id: i32,
    pub type_name: Option<String>,
    pub ordinal: i32,
}

impl EnumValue {
    pub fn new(type_id: i32, ordinal: i32) -> Self {
        Self {
            type_id,
            type_name: None,
            ordinal,
        }
    }

    pub fn unregistered(type_name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            type_id: wire::UNREGISTERED_TYPE_ID,
            type_name: Some(type_name.into()),
            ordinal,
        }
    }
}

/// A reference to a type itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassRef {
    pub type_id: i32,
    pub type_name: Option<String>,
}

/// Field type tags as published in type metadata. Each variant maps to
/// exactly one wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Bool,
    String,
    Uuid,
    Date,
    Timestamp,
    Decimal,
    ByteArr,
    ShortArr,
    IntArr,
    LongArr,
    FloatArr,
    DoubleArr,
    CharArr,
    BoolArr,
    StringArr,
    UuidArr,
    DateArr,
    TimestampArr,
    DecimalArr,
    ObjectArr,
    Collection,
    Map,
    MapEntry,
    BinaryObj,
    Enum,
    EnumArr,
    Class,
    Object,
}

impl TypeTag {
    pub fn wire_tag(self) -> u8 {
        match self {
            TypeTag::Byte => wire::BYTE,
            TypeTag::Short => wire::SHORT,
            TypeTag::Int => wire::INT,
            TypeTag::Long => wire::LONG,
            TypeTag::Float => wire::FLOAT,
            TypeTag::Double => wire::DOUBLE,
            TypeTag::Char => wire::CHAR,
            TypeTag::Bool => wire::BOOLEAN,
            TypeTag::String => wire::STRING,
            TypeTag::Uuid => wire::UUID,
            TypeTag::Date => wire::DATE,
            TypeTag::Timestamp => wire::TIMESTAMP,
            TypeTag::Decimal => wire::DECIMAL,
            TypeTag::ByteArr => wire::BYTE_ARR,
            TypeTag::ShortArr => wire::SHORT_ARR,
            TypeTag::IntArr => wire::INT_ARR,
            TypeTag::LongArr => wire::LONG_ARR,
            TypeTag::FloatArr => wire::FLOAT_ARR,
            TypeTag::DoubleArr => wire::DOUBLE_ARR,
            TypeTag::CharArr => wire::CHAR_ARR,
            TypeTag::BoolArr => wire::BOOLEAN_ARR,
            TypeTag::StringArr => wire::STRING_ARR,
            TypeTag::UuidArr => wire::UUID_ARR,
            TypeTag::DateArr => wire::DATE_ARR,
            TypeTag::TimestampArr => wire::TIMESTAMP_ARR,
            TypeTag::DecimalArr => wire::DECIMAL_ARR,
            TypeTag::ObjectArr => wire::OBJ_ARR,
            TypeTag::Collection => wire::COL,
            TypeTag::Map => wire::MAP,
            TypeTag::MapEntry => wire::MAP_ENTRY,
            TypeTag::BinaryObj => wire::PORTABLE_OBJ,
            TypeTag::Enum => wire::ENUM,
            TypeTag::EnumArr => wire::ENUM_ARR,
            TypeTag::Class => wire::CLASS,
            TypeTag::Object => wire::OBJ,
        }
    }
}

/// Any value the codec can encode.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryValue {
    Null,

    // Primitives
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// UTF-16 code unit.
    Char(u16),
    Bool(bool),
    Decimal(BigDecimal),
    String(String),
    Uuid(Uuid),
    Date(Date),
    Timestamp(Timestamp),

    // Primitive arrays (packed, no per-element tags)
    ByteArr(Vec<i8>),
    ShortArr(Vec<i16>),
    IntArr(Vec<i32>),
    LongArr(Vec<i64>),
    FloatArr(Vec<f32>),
    DoubleArr(Vec<f64>),
    CharArr(Vec<u16>),
    BoolArr(Vec<bool>),

    // Object arrays (tagged per element, nullable)
    StringArr(Vec<Option<String>>),
    UuidArr(Vec<Option<Uuid>>),
    DateArr(Vec<Option<Date>>),
    TimestampArr(Vec<Option<Timestamp>>),
    DecimalArr(Vec<Option<BigDecimal>>),
    ObjectArr {
        component_type_id: i32,
        elements: Vec<BinaryValue>,
    },

    // Containers
    Collection {
        kind: u8,
        elements: Vec<BinaryValue>,
    },
    Map {
        kind: u8,
        entries: Vec<(BinaryValue, BinaryValue)>,
    },
    MapEntry(Box<(BinaryValue, BinaryValue)>),

    // Special
    Enum(EnumValue),
    EnumArr {
        component_type_id: i32,
        elements: Vec<BinaryValue>,
    },
    Class(ClassRef),
    /// A pre-encoded object nested verbatim.
    Binary(BinaryObject),
    /// A user-type instance.
    Object(Arc<BinaryInstance>),
}

impl BinaryValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BinaryValue::Null)
    }

    /// Metadata tag for this value. `Null` reports [`TypeTag::Object`]
    /// (the most permissive tag; any later concrete tag merges over it).
    pub fn type_tag(&self) -> TypeTag {
        match self {
            BinaryValue::Null => TypeTag::Object,
            BinaryValue::Byte(_) => TypeTag::Byte,
            BinaryValue::Short(_) => TypeTag::Short,
            BinaryValue::Int(_) => TypeTag::Int,
            BinaryValue::Long(_) => TypeTag::Long,
            BinaryValue::Float(_) => TypeTag::Float,
            BinaryValue::Double(_) => TypeTag::Double,
            BinaryValue::Char(_) => TypeTag::Char,
            BinaryValue::Bool(_) => TypeTag::Bool,
            BinaryValue::Decimal(_) => TypeTag::Decimal,
            BinaryValue::String(_) => TypeTag::String,
            BinaryValue::Uuid(_) => TypeTag::Uuid,
            BinaryValue::Date(_) => TypeTag::Date,
            BinaryValue::Timestamp(_) => TypeTag::Timestamp,
            BinaryValue::ByteArr(_) => TypeTag::ByteArr,
            BinaryValue::ShortArr(_) => TypeTag::ShortArr,
            BinaryValue::IntArr(_) => TypeTag::IntArr,
            BinaryValue::LongArr(_) => TypeTag::LongArr,
            BinaryValue::FloatArr(_) => TypeTag::FloatArr,
            BinaryValue::DoubleArr(_) => TypeTag::DoubleArr,
            BinaryValue::CharArr(_) => TypeTag::CharArr,
            BinaryValue::BoolArr(_) => TypeTag::BoolArr,
            BinaryValue::StringArr(_) => TypeTag::StringArr,
            BinaryValue::UuidArr(_) => TypeTag::UuidArr,
            BinaryValue::DateArr(_) => TypeTag::DateArr,
            BinaryValue::TimestampArr(_) => TypeTag::TimestampArr,
            BinaryValue::DecimalArr(_) => TypeTag::DecimalArr,
            BinaryValue::ObjectArr { .. } => TypeTag::ObjectArr,
            BinaryValue::Collection { .. } => TypeTag::Collection,
            BinaryValue::Map { .. } => TypeTag::Map,
            BinaryValue::MapEntry(_) => TypeTag::MapEntry,
            BinaryValue::Enum(_) => TypeTag::Enum,
            BinaryValue::EnumArr { .. } => TypeTag::EnumArr,
            BinaryValue::Class(_) => TypeTag::Class,
            BinaryValue::Binary(_) => TypeTag::BinaryObj,
            BinaryValue::Object(_) => TypeTag::Object,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            BinaryValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BinaryValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BinaryValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BinaryValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BinaryValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Arc<BinaryInstance>> {
        match self {
            BinaryValue::Object(inst) => Some(inst),
            _ => None,
        }
    }

    /// Identity of this value for handle-table purposes. Only values with
    /// a stable address participate in sharing.
    pub(crate) fn identity(&self) -> Option<(usize, usize)> {
        match self {
            BinaryValue::Object(inst) => Some((Arc::as_ptr(inst) as usize, 0)),
            BinaryValue::Binary(obj) => Some(obj.identity()),
            _ => None,
        }
    }
}

impl From<i8> for BinaryValue {
    fn from(v: i8) -> Self {
        BinaryValue::Byte(v)
    }
}

impl From<i16> for BinaryValue {
    fn from(v: i16) -> Self {
        BinaryValue::Short(v)
    }
}

impl From<i32> for BinaryValue {
    fn from(v: i32) -> Self {
        BinaryValue::Int(v)
    }
}

impl From<i64> for BinaryValue {
    fn from(v: i64) -> Self {
        BinaryValue::Long(v)
    }
}

impl From<f32> for BinaryValue {
    fn from(v: f32) -> Self {
        BinaryValue::Float(v)
    }
}

impl From<f64> for BinaryValue {
    fn from(v: f64) -> Self {
        BinaryValue::Double(v)
    }
}

impl From<bool> for BinaryValue {
    fn from(v: bool) -> Self {
        BinaryValue::Bool(v)
    }
}

impl From<&str> for BinaryValue {
    fn from(v: &str) -> Self {
        BinaryValue::String(v.to_string())
    }
}

impl From<String> for BinaryValue {
    fn from(v: String) -> Self {
        BinaryValue::String(v)
    }
}

impl From<Uuid> for BinaryValue {
    fn from(v: Uuid) -> Self {
        BinaryValue::Uuid(v)
    }
}

impl From<Arc<BinaryInstance>> for BinaryValue {
    fn from(v: Arc<BinaryInstance>) -> Self {
        BinaryValue::Object(v)
    }
}

/// A user-type instance: type name plus ordered named fields.
///
/// Fields live behind a lock so a decoded instance can be published to the
/// reader's handle table before its children exist. An explicit semantic
/// hash may be attached; otherwise the writer derives one from the
/// serialized field bytes.
pub struct BinaryInstance {
    type_name: String,
    hash: Option<i32>,
    fields: RwLock<Vec<(String, BinaryValue)>>,
}

// Shallow on purpose: instances may sit in cyclic graphs.
impl std::fmt::Debug for BinaryInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryInstance")
            .field("type_name", &self.type_name)
            .field("fields", &self.field_names())
            .finish()
    }
}

impl BinaryInstance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            hash: None,
            fields: RwLock::new(Vec::new()),
        }
    }

    pub fn with_hash(type_name: impl Into<String>, hash: i32) -> Self {
        Self {
            type_name: type_name.into(),
            hash: Some(hash),
            fields: RwLock::new(Vec::new()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Explicit semantic hash, if one was attached.
    pub fn hash(&self) -> Option<i32> {
        self.hash
    }

    /// Set or replace a field, preserving first-set order.
    pub fn set_field(&self, name: impl Into<String>, value: BinaryValue) {
        let name = name.into();
        let mut fields = self.fields.write();
        match fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => fields.push((name, value)),
        }
    }

    pub fn field(&self, name: &str) -> Option<BinaryValue> {
        self.fields
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.read().iter().any(|(n, _)| n == name)
    }

    /// Field names in declaration (first-set) order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.read().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Snapshot of `(name, type tag)` pairs in declaration order.
    pub fn field_tags(&self) -> Vec<(String, TypeTag)> {
        self.fields
            .read()
            .iter()
            .map(|(n, v)| (n.clone(), v.type_tag()))
            .collect()
    }

    pub fn field_count(&self) -> usize {
        self.fields.read().len()
    }

    /// Snapshot of all fields as a name-keyed map.
    pub fn fields_map(&self) -> HashMap<String, BinaryValue> {
        self.fields.read().iter().cloned().collect()
    }
}

// Deep structural equality. Not defined on cyclic graphs; callers compare
// those by identity (`Arc::ptr_eq`).
impl PartialEq for BinaryInstance {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.type_name == other.type_name && *self.fields.read() == *other.fields.read()
    }
}

/// Fluent construction for instances, mirroring the descriptor builder.
#[derive(Debug)]
pub struct InstanceBuilder {
    instance: BinaryInstance,
}

impl InstanceBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            instance: BinaryInstance::new(type_name),
        }
    }

    pub fn hash(mut self, hash: i32) -> Self {
        self.instance.hash = Some(hash);
        self
    }

    pub fn field(self, name: impl Into<String>, value: impl Into<BinaryValue>) -> Self {
        self.instance.set_field(name, value.into());
        self
    }

    pub fn build(self) -> Arc<BinaryInstance> {
        Arc::new(self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_fields_keep_declaration_order() {
        let inst = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();

        assert_eq!(inst.field_names(), vec!["x", "y"]);
        assert_eq!(inst.field("x").unwrap().as_i32(), Some(3));
        assert_eq!(inst.field("z"), None);
    }

    #[test]
    fn set_field_replaces_in_place() {
        let inst = BinaryInstance::new("T");
        inst.set_field("a", BinaryValue::Int(1));
        inst.set_field("b", BinaryValue::Int(2));
        inst.set_field("a", BinaryValue::Int(9));

        assert_eq!(inst.field_names(), vec!["a", "b"]);
        assert_eq!(inst.field("a").unwrap().as_i32(), Some(9));
    }

    #[test]
    fn deep_equality() {
        let a = InstanceBuilder::new("Point").field("x", 1).build();
        let b = InstanceBuilder::new("Point").field("x", 1).build();
        let c = InstanceBuilder::new("Point").field("x", 2).build();

        assert_eq!(BinaryValue::Object(a.clone()), BinaryValue::Object(b));
        assert_ne!(BinaryValue::Object(a), BinaryValue::Object(c));
    }

    #[test]
    fn identity_is_pointer_identity() {
        let a = InstanceBuilder::new("Point").field("x", 1).build();
        let b = InstanceBuilder::new("Point").field("x", 1).build();

        let va = BinaryValue::Object(a.clone());
        let va2 = BinaryValue::Object(a);
        let vb = BinaryValue::Object(b);

        assert_eq!(va.identity(), va2.identity());
        assert_ne!(va.identity(), vb.identity());
        assert_eq!(BinaryValue::Int(1).identity(), None);
    }

    #[test]
    fn type_tags_map_to_wire() {
        assert_eq!(BinaryValue::Int(1).type_tag().wire_tag(), wire::INT);
        assert_eq!(
            BinaryValue::String("s".into()).type_tag().wire_tag(),
            wire::STRING
        );
        assert_eq!(
            BinaryValue::Collection {
                kind: wire::ARR_LIST,
                elements: vec![]
            }
            .type_tag()
            .wire_tag(),
            wire::COL
        );
    }

    #[test]
    fn field_tags_snapshot() {
        let inst = InstanceBuilder::new("T")
            .field("i", 1)
            .field("s", "txt")
            .build();

        assert_eq!(
            inst.field_tags(),
            vec![
                ("i".to_string(), TypeTag::Int),
                ("s".to_string(), TypeTag::String)
            ]
        );
    }
}

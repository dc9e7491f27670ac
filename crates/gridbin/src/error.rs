// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the binary codec.

use std::fmt;

/// Result alias used throughout the codec.
pub type BinaryResult<T> = Result<T, BinaryError>;

/// Errors produced by the binary codec and its registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryError {
    /// Encoded bytes are malformed: bad header tag, truncated buffer,
    /// or a length field overrunning the buffer. Fatal to the current
    /// decode only.
    CorruptFrame { offset: usize, reason: String },

    /// A compact footer referenced a schema the registry does not know.
    /// The caller may retry after a metadata sync.
    UnknownSchema { type_id: i32, schema_id: i32 },

    /// No descriptor is registered for the given type id or name.
    /// The caller may retry after a metadata sync.
    UnknownType {
        type_id: i32,
        type_name: Option<String>,
    },

    /// Invalid type configuration: duplicate field names or ids, type id
    /// collisions, reserved ids. Fatal at registration.
    TypeConfig { type_name: String, reason: String },

    /// Two metadata updates disagree on a field's type. Fatal.
    MetadataConflict {
        type_id: i32,
        field: String,
        reason: String,
    },

    /// A `write_replace` / `read_resolve` hook returned an error.
    UserHookFailed {
        hook: &'static str,
        type_name: String,
        reason: String,
    },

    /// The writer was asked to encode something it cannot express, e.g.
    /// a named field after the raw tail was started.
    UnsupportedValue { reason: String },
}

impl BinaryError {
    /// True for errors a caller may recover from by refreshing metadata
    /// and retrying; false for fatal ones.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            BinaryError::UnknownSchema { .. } | BinaryError::UnknownType { .. }
        )
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        BinaryError::CorruptFrame {
            offset,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BinaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryError::CorruptFrame { offset, reason } => {
                write!(f, "corrupt frame at offset {}: {}", offset, reason)
            }
            BinaryError::UnknownSchema { type_id, schema_id } => {
                write!(
                    f,
                    "unknown schema 0x{:08X} for type 0x{:08X}",
                    schema_id, type_id
                )
            }
            BinaryError::UnknownType { type_id, type_name } => match type_name {
                Some(name) => write!(f, "unknown type: {}", name),
                None => write!(f, "unknown type id: 0x{:08X}", type_id),
            },
            BinaryError::TypeConfig { type_name, reason } => {
                write!(f, "invalid configuration for type {}: {}", type_name, reason)
            }
            BinaryError::MetadataConflict {
                type_id,
                field,
                reason,
            } => {
                write!(
                    f,
                    "metadata conflict for type 0x{:08X}, field {}: {}",
                    type_id, field, reason
                )
            }
            BinaryError::UserHookFailed {
                hook,
                type_name,
                reason,
            } => {
                write!(f, "{} hook failed for type {}: {}", hook, type_name, reason)
            }
            BinaryError::UnsupportedValue { reason } => {
                write!(f, "unsupported value: {}", reason)
            }
        }
    }
}

impl std::error::Error for BinaryError {}

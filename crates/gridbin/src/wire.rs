// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire-format constants: header layout, flag bits, type tags.
//!
//! All multi-byte quantities on the wire are little-endian. Every encoded
//! user-type object starts with a fixed 24-byte header followed by the
//! field payload region, an optional schema footer and an optional raw
//! tail (see [`crate::writer`] for the emission rules).

// ---------------------------------------------------------------------------
// Header layout
// ---------------------------------------------------------------------------

/// Header tag of an encoded user-type object.
pub const OBJ: u8 = 0x67;

/// Current protocol version.
pub const PROTO_VER: u8 = 1;

/// Sentinel type id for types whose cluster-wide id is not yet assigned.
/// The header is followed by the fully-qualified type name as a `STRING`.
pub const UNREGISTERED_TYPE_ID: i32 = 0;

/// Byte offsets of the header fields, relative to the object start.
pub const TAG_POS: usize = 0;
pub const PROTO_VER_POS: usize = 1;
pub const FLAGS_POS: usize = 2;
pub const TYPE_ID_POS: usize = 4;
pub const HASH_CODE_POS: usize = 8;
pub const TOTAL_LEN_POS: usize = 12;
pub const SCHEMA_ID_POS: usize = 16;
pub const SCHEMA_OR_RAW_OFF_POS: usize = 20;

/// Total header length in bytes.
pub const HDR_LEN: usize = 24;

/// Width of a field id inside a non-compact footer entry.
pub const FIELD_ID_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// User-defined type (as opposed to a predefined primitive-like one).
pub const FLAG_USR_TYP: u16 = 0x0001;
/// Schema footer present.
pub const FLAG_HAS_SCHEMA: u16 = 0x0002;
/// Raw tail present.
pub const FLAG_HAS_RAW: u16 = 0x0004;
/// Footer offsets are 1 byte wide.
pub const FLAG_OFFSET_ONE_BYTE: u16 = 0x0008;
/// Footer offsets are 2 bytes wide.
pub const FLAG_OFFSET_TWO_BYTES: u16 = 0x0010;
/// Footer omits field ids; schema resolved by `schemaId` via the registry.
pub const FLAG_COMPACT_FOOTER: u16 = 0x0020;

/// Footer offset widths selected by the writer.
pub const OFFSET_1: usize = 1;
pub const OFFSET_2: usize = 2;
pub const OFFSET_4: usize = 4;

pub fn is_user_type(flags: u16) -> bool {
    flags & FLAG_USR_TYP != 0
}

pub fn has_schema(flags: u16) -> bool {
    flags & FLAG_HAS_SCHEMA != 0
}

pub fn has_raw(flags: u16) -> bool {
    flags & FLAG_HAS_RAW != 0
}

pub fn is_compact_footer(flags: u16) -> bool {
    flags & FLAG_COMPACT_FOOTER != 0
}

/// Footer offset width encoded in the flags.
pub fn field_offset_len(flags: u16) -> usize {
    if flags & FLAG_OFFSET_ONE_BYTE != 0 {
        OFFSET_1
    } else if flags & FLAG_OFFSET_TWO_BYTES != 0 {
        OFFSET_2
    } else {
        OFFSET_4
    }
}

// ---------------------------------------------------------------------------
// Type tags
// ---------------------------------------------------------------------------

pub const BYTE: u8 = 1;
pub const SHORT: u8 = 2;
pub const INT: u8 = 3;
pub const LONG: u8 = 4;
pub const FLOAT: u8 = 5;
pub const DOUBLE: u8 = 6;
pub const CHAR: u8 = 7;
pub const BOOLEAN: u8 = 8;
pub const STRING: u8 = 9;
pub const UUID: u8 = 10;
pub const DATE: u8 = 11;
pub const BYTE_ARR: u8 = 12;
pub const SHORT_ARR: u8 = 13;
pub const INT_ARR: u8 = 14;
pub const LONG_ARR: u8 = 15;
pub const FLOAT_ARR: u8 = 16;
pub const DOUBLE_ARR: u8 = 17;
pub const CHAR_ARR: u8 = 18;
pub const BOOLEAN_ARR: u8 = 19;
pub const STRING_ARR: u8 = 20;
pub const UUID_ARR: u8 = 21;
pub const DATE_ARR: u8 = 22;
pub const OBJ_ARR: u8 = 23;
pub const COL: u8 = 24;
pub const MAP: u8 = 25;
pub const MAP_ENTRY: u8 = 26;
pub const PORTABLE_OBJ: u8 = 27;
pub const ENUM: u8 = 28;
pub const ENUM_ARR: u8 = 29;
pub const DECIMAL: u8 = 30;
pub const DECIMAL_ARR: u8 = 31;
pub const CLASS: u8 = 32;
pub const TIMESTAMP: u8 = 33;
pub const TIMESTAMP_ARR: u8 = 34;
pub const NULL: u8 = 101;
pub const HANDLE: u8 = 102;

// ---------------------------------------------------------------------------
// Collection / map kinds
// ---------------------------------------------------------------------------

// Opaque container kind bytes carried on the wire. No host-container
// semantics are implied; peers round-trip them verbatim.

pub const USER_COL: u8 = 0;
pub const ARR_LIST: u8 = 1;
pub const LINKED_LIST: u8 = 2;
pub const HASH_SET: u8 = 3;
pub const LINKED_HASH_SET: u8 = 4;
pub const TREE_SET: u8 = 5;

pub const USER_MAP: u8 = 0;
pub const HASH_MAP: u8 = 1;
pub const LINKED_HASH_MAP: u8 = 2;
pub const TREE_MAP: u8 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_contiguous() {
        assert_eq!(TAG_POS, 0);
        assert_eq!(PROTO_VER_POS, 1);
        assert_eq!(FLAGS_POS, 2);
        assert_eq!(TYPE_ID_POS, 4);
        assert_eq!(HASH_CODE_POS, 8);
        assert_eq!(TOTAL_LEN_POS, 12);
        assert_eq!(SCHEMA_ID_POS, 16);
        assert_eq!(SCHEMA_OR_RAW_OFF_POS, 20);
        assert_eq!(HDR_LEN, 24);
    }

    #[test]
    fn offset_width_from_flags() {
        assert_eq!(field_offset_len(FLAG_OFFSET_ONE_BYTE), OFFSET_1);
        assert_eq!(field_offset_len(FLAG_OFFSET_TWO_BYTES), OFFSET_2);
        assert_eq!(field_offset_len(0), OFFSET_4);
    }

    #[test]
    fn flag_predicates() {
        let flags = FLAG_USR_TYP | FLAG_HAS_SCHEMA | FLAG_COMPACT_FOOTER;
        assert!(is_user_type(flags));
        assert!(has_schema(flags));
        assert!(!has_raw(flags));
        assert!(is_compact_footer(flags));
    }
}

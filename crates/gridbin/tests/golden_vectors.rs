// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Golden byte-level vectors: frozen identifier hashes and exact wire
//! layouts. These pin the format; any change here is a wire break.

use gridbin::{
    BinaryValue, CodecConfig, Context, DefaultIdMapper, IdMapper, InstanceBuilder, PublishMode,
    wire,
};

fn plain_footer_ctx() -> Context {
    Context::new(CodecConfig {
        compact_footer: false,
        metadata_enabled: true,
        keep_deserialized: true,
        publish_mode: PublishMode::Blocking,
    })
}

fn read_i32(bytes: &[u8], pos: usize) -> i32 {
    i32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

fn read_u16(bytes: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([bytes[pos], bytes[pos + 1]])
}

// ---------------------------------------------------------------------------
// Frozen identifier vectors
// ---------------------------------------------------------------------------

#[test]
fn frozen_type_id_vectors() {
    let mapper = DefaultIdMapper;

    assert_eq!(mapper.type_id("Point"), 0x065E_5590);
    assert_eq!(mapper.type_id("point"), 0x065E_5590);
    assert_eq!(mapper.type_id("ab"), 3105);
    assert_eq!(mapper.type_id("abc"), 96354);
}

#[test]
fn frozen_field_id_vectors() {
    let mapper = DefaultIdMapper;

    assert_eq!(mapper.field_id(0x065E_5590, "x"), 120);
    assert_eq!(mapper.field_id(0x065E_5590, "y"), 121);
    assert_eq!(mapper.field_id(0x065E_5590, "X"), 120);
}

// ---------------------------------------------------------------------------
// Full-footer object layout (spec'd 24-byte header + INT fields + footer)
// ---------------------------------------------------------------------------

#[test]
fn point_layout_with_plain_footer() {
    let ctx = plain_footer_ctx();
    let point = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();

    let bytes = ctx.marshal(&BinaryValue::Object(point)).unwrap();

    // Header.
    assert_eq!(bytes[wire::TAG_POS], wire::OBJ);
    assert_eq!(bytes[wire::PROTO_VER_POS], wire::PROTO_VER);
    assert_eq!(read_i32(&bytes, wire::TYPE_ID_POS), 0x065E_5590);
    assert_eq!(read_i32(&bytes, wire::TOTAL_LEN_POS) as usize, bytes.len());

    let flags = read_u16(&bytes, wire::FLAGS_POS);
    assert!(wire::is_user_type(flags));
    assert!(wire::has_schema(flags));
    assert!(!wire::has_raw(flags));
    assert!(!wire::is_compact_footer(flags));
    assert_eq!(wire::field_offset_len(flags), wire::OFFSET_1);

    // Field region: INT 03 00 00 00 INT 04 00 00 00.
    assert_eq!(bytes[24], wire::INT);
    assert_eq!(&bytes[25..29], &[3, 0, 0, 0]);
    assert_eq!(bytes[29], wire::INT);
    assert_eq!(&bytes[30..34], &[4, 0, 0, 0]);

    // Footer: two (fieldId, offset) entries in declaration order.
    let footer = read_i32(&bytes, wire::SCHEMA_OR_RAW_OFF_POS) as usize;
    assert_eq!(footer, 34);
    assert_eq!(read_i32(&bytes, footer), 120);
    assert_eq!(bytes[footer + 4], 24);
    assert_eq!(read_i32(&bytes, footer + 5), 121);
    assert_eq!(bytes[footer + 9], 29);

    assert_eq!(bytes.len(), 44);
}

#[test]
fn compact_footer_omits_field_ids() {
    let ctx = Context::default();
    let point = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();

    let bytes = ctx.marshal(&BinaryValue::Object(point)).unwrap();

    let flags = read_u16(&bytes, wire::FLAGS_POS);
    assert!(wire::is_compact_footer(flags));

    // Two 1-byte offsets only.
    let footer = read_i32(&bytes, wire::SCHEMA_OR_RAW_OFF_POS) as usize;
    assert_eq!(bytes.len() - footer, 2);
    assert_eq!(bytes[footer], 24);
    assert_eq!(bytes[footer + 1], 29);
}

#[test]
fn schema_id_is_deterministic_across_contexts() {
    let a = plain_footer_ctx();
    let b = Context::default();

    let bytes_a = a
        .marshal(&BinaryValue::Object(
            InstanceBuilder::new("Point").field("x", 1).field("y", 2).build(),
        ))
        .unwrap();
    let bytes_b = b
        .marshal(&BinaryValue::Object(
            InstanceBuilder::new("Point").field("x", 9).field("y", 8).build(),
        ))
        .unwrap();

    assert_eq!(
        read_i32(&bytes_a, wire::SCHEMA_ID_POS),
        read_i32(&bytes_b, wire::SCHEMA_ID_POS)
    );
}

#[test]
fn object_hash_is_deterministic_from_content() {
    let ctx = Context::default();
    let one = InstanceBuilder::new("Key").field("id", 17).build();
    let two = InstanceBuilder::new("Key").field("id", 17).build();
    let other = InstanceBuilder::new("Key").field("id", 18).build();

    let h1 = read_i32(&ctx.marshal(&BinaryValue::Object(one)).unwrap(), wire::HASH_CODE_POS);
    let h2 = read_i32(&ctx.marshal(&BinaryValue::Object(two)).unwrap(), wire::HASH_CODE_POS);
    let h3 = read_i32(
        &ctx.marshal(&BinaryValue::Object(other)).unwrap(),
        wire::HASH_CODE_POS,
    );

    assert_eq!(h1, h2);
    assert_ne!(h1, h3);
}

#[test]
fn explicit_instance_hash_wins() {
    let ctx = Context::default();
    let inst = InstanceBuilder::new("Key").hash(0x1234_5678).field("id", 1).build();

    let bytes = ctx.marshal(&BinaryValue::Object(inst)).unwrap();
    assert_eq!(read_i32(&bytes, wire::HASH_CODE_POS), 0x1234_5678);
}

// ---------------------------------------------------------------------------
// Footer offset-width minimality
// ---------------------------------------------------------------------------

fn footer_width_for_payload(filler_len: usize) -> usize {
    let ctx = plain_footer_ctx();
    let inst = InstanceBuilder::new(format!("Padded{filler_len}"))
        .field("pad", BinaryValue::ByteArr(vec![0; filler_len]))
        .field("tail", 1)
        .build();

    let bytes = ctx.marshal(&BinaryValue::Object(inst)).unwrap();
    wire::field_offset_len(read_u16(&bytes, wire::FLAGS_POS))
}

#[test]
fn footer_width_is_minimal() {
    // Offsets stay below 256.
    assert_eq!(footer_width_for_payload(16), wire::OFFSET_1);
    // Largest offset crosses 256 but stays below 65536.
    assert_eq!(footer_width_for_payload(512), wire::OFFSET_2);
    // Largest offset crosses 65536.
    assert_eq!(footer_width_for_payload(70_000), wire::OFFSET_4);
}

#[test]
fn unregistered_type_carries_its_name() {
    let ctx = Context::default();
    ctx.register_type(
        gridbin::TypeConfiguration::new("Ghost")
            .field("v", gridbin::TypeTag::Int)
            .unregistered(),
    )
    .unwrap();

    let inst = InstanceBuilder::new("Ghost").field("v", 5).build();
    let bytes = ctx.marshal(&BinaryValue::Object(inst)).unwrap();

    assert_eq!(read_i32(&bytes, wire::TYPE_ID_POS), wire::UNREGISTERED_TYPE_ID);

    // Type name travels as a STRING right after the header.
    assert_eq!(bytes[24], wire::STRING);
    assert_eq!(read_i32(&bytes, 25), 5);
    assert_eq!(&bytes[29..34], b"Ghost");

    // And the reader resolves it locally.
    let decoded = ctx.unmarshal(&bytes).unwrap();
    let inst = decoded.as_instance().unwrap();
    assert_eq!(inst.type_name(), "Ghost");
    assert_eq!(inst.field("v").unwrap().as_i32(), Some(5));
}

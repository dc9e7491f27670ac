// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared sub-values and cycles: each shared node is encoded once, later
//! occurrences become `HANDLE` back-references, and decoding reproduces
//! the sharing structure with preserved identity.

use std::sync::Arc;

use gridbin::{wire, BinaryInstance, BinaryValue, Context, IdMapper, InstanceBuilder};

fn read_i32(bytes: &[u8], pos: usize) -> i32 {
    i32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

#[test]
fn repeated_element_becomes_handle_to_first_encoding() {
    let ctx = Context::default();

    let a = InstanceBuilder::new("Point").field("x", 1).field("y", 2).build();
    let b = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();

    let list = BinaryValue::Collection {
        kind: wire::ARR_LIST,
        elements: vec![
            BinaryValue::Object(Arc::clone(&a)),
            BinaryValue::Object(b),
            BinaryValue::Object(a),
        ],
    };

    let bytes = ctx.marshal(&list).unwrap();

    // Layout: COL tag, i32 size, u8 kind, then the elements.
    assert_eq!(bytes[0], wire::COL);
    assert_eq!(read_i32(&bytes, 1), 3);
    let first = 6;
    assert_eq!(bytes[first], wire::OBJ);

    let len_a = read_i32(&bytes, first + wire::TOTAL_LEN_POS) as usize;
    let second = first + len_a;
    assert_eq!(bytes[second], wire::OBJ);

    let len_b = read_i32(&bytes, second + wire::TOTAL_LEN_POS) as usize;
    let third = second + len_b;

    // The third element is a handle whose back-offset lands exactly on
    // the first element's header.
    assert_eq!(bytes[third], wire::HANDLE);
    let back = read_i32(&bytes, third + 1) as usize;
    assert_eq!(third - back, first);
    assert_eq!(bytes.len(), third + 5);
}

#[test]
fn decoded_sharing_preserves_identity() {
    let ctx = Context::default();

    let a = InstanceBuilder::new("Point").field("x", 1).field("y", 2).build();
    let b = InstanceBuilder::new("Point").field("x", 3).field("y", 4).build();

    let list = BinaryValue::Collection {
        kind: wire::ARR_LIST,
        elements: vec![
            BinaryValue::Object(Arc::clone(&a)),
            BinaryValue::Object(b),
            BinaryValue::Object(a),
        ],
    };

    let decoded = ctx.unmarshal(&ctx.marshal(&list).unwrap()).unwrap();

    let BinaryValue::Collection { elements, .. } = decoded else {
        panic!("expected a collection");
    };
    assert_eq!(elements.len(), 3);

    let first = elements[0].as_instance().unwrap();
    let second = elements[1].as_instance().unwrap();
    let third = elements[2].as_instance().unwrap();

    assert!(Arc::ptr_eq(first, third));
    assert!(!Arc::ptr_eq(first, second));
    assert_eq!(first.field("x").unwrap().as_i32(), Some(1));
}

#[test]
fn self_cycle_round_trips_with_identity() {
    let ctx = Context::default();

    let node = Arc::new(BinaryInstance::new("Node"));
    node.set_field("tag", BinaryValue::Int(7));
    node.set_field("next", BinaryValue::Object(Arc::clone(&node)));

    let bytes = ctx.marshal(&BinaryValue::Object(Arc::clone(&node))).unwrap();
    let decoded = ctx.unmarshal(&bytes).unwrap();

    let decoded_node = decoded.as_instance().unwrap();
    let next = decoded_node.field("next").unwrap();
    let next_inst = next.as_instance().unwrap();

    // decoded.next is decoded itself.
    assert!(Arc::ptr_eq(decoded_node, next_inst));
    assert_eq!(decoded_node.field("tag").unwrap().as_i32(), Some(7));
}

#[test]
fn two_node_cycle_round_trips() {
    let ctx = Context::default();

    let left = Arc::new(BinaryInstance::new("Node"));
    let right = Arc::new(BinaryInstance::new("Node"));
    left.set_field("tag", BinaryValue::Int(1));
    left.set_field("next", BinaryValue::Object(Arc::clone(&right)));
    right.set_field("tag", BinaryValue::Int(2));
    right.set_field("next", BinaryValue::Object(Arc::clone(&left)));

    let bytes = ctx.marshal(&BinaryValue::Object(Arc::clone(&left))).unwrap();
    let decoded = ctx.unmarshal(&bytes).unwrap();

    let l = decoded.as_instance().unwrap();
    let r_val = l.field("next").unwrap();
    let r = r_val.as_instance().unwrap();
    let l_again_val = r.field("next").unwrap();
    let l_again = l_again_val.as_instance().unwrap();

    assert_eq!(l.field("tag").unwrap().as_i32(), Some(1));
    assert_eq!(r.field("tag").unwrap().as_i32(), Some(2));
    assert!(Arc::ptr_eq(l, l_again));
}

#[test]
fn diamond_sharing_is_encoded_once() {
    let ctx = Context::default();

    let shared = InstanceBuilder::new("Leaf").field("v", 42).build();
    let parent = InstanceBuilder::new("Pair")
        .field("left", BinaryValue::Object(Arc::clone(&shared)))
        .field("right", BinaryValue::Object(shared))
        .build();

    let bytes = ctx.marshal(&BinaryValue::Object(parent)).unwrap();

    // Exactly one full encoding of the leaf: count OBJ headers.
    let leaf_type_id = gridbin::DefaultIdMapper.type_id("Leaf");
    let mut headers = 0;
    let mut pos = 0;
    while pos + wire::HDR_LEN <= bytes.len() {
        if bytes[pos] == wire::OBJ && read_i32(&bytes, pos + wire::TYPE_ID_POS) == leaf_type_id {
            headers += 1;
        }
        pos += 1;
    }
    assert_eq!(headers, 1);

    let decoded = ctx.unmarshal(&bytes).unwrap();
    let pair = decoded.as_instance().unwrap();
    let left_val = pair.field("left").unwrap();
    let right_val = pair.field("right").unwrap();
    assert!(Arc::ptr_eq(
        left_val.as_instance().unwrap(),
        right_val.as_instance().unwrap()
    ));
}

#[test]
fn sharing_across_separate_writes_is_not_linked() {
    // Handle tables are per-writer: the same instance marshalled twice
    // yields two self-contained buffers.
    let ctx = Context::default();
    let point = InstanceBuilder::new("Point").field("x", 1).field("y", 2).build();

    let first = ctx.marshal(&BinaryValue::Object(Arc::clone(&point))).unwrap();
    let second = ctx.marshal(&BinaryValue::Object(point)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0], wire::OBJ);
}

#[test]
fn deep_nesting_with_backreference_to_root() {
    let ctx = Context::default();

    let root = Arc::new(BinaryInstance::new("Tree"));
    let child = Arc::new(BinaryInstance::new("Tree"));
    let grandchild = Arc::new(BinaryInstance::new("Tree"));

    grandchild.set_field("up", BinaryValue::Object(Arc::clone(&root)));
    grandchild.set_field("id", BinaryValue::Int(3));
    child.set_field("up", BinaryValue::Object(Arc::clone(&root)));
    child.set_field("id", BinaryValue::Int(2));
    child.set_field("kid", BinaryValue::Object(grandchild));
    root.set_field("up", BinaryValue::Null);
    root.set_field("id", BinaryValue::Int(1));
    root.set_field("kid", BinaryValue::Object(child));

    let bytes = ctx.marshal(&BinaryValue::Object(Arc::clone(&root))).unwrap();
    let decoded = ctx.unmarshal(&bytes).unwrap();

    let d_root = decoded.as_instance().unwrap();
    let d_child_val = d_root.field("kid").unwrap();
    let d_child = d_child_val.as_instance().unwrap();
    let d_grand_val = d_child.field("kid").unwrap();
    let d_grand = d_grand_val.as_instance().unwrap();

    let up1 = d_child.field("up").unwrap();
    let up2 = d_grand.field("up").unwrap();
    assert!(Arc::ptr_eq(up1.as_instance().unwrap(), d_root));
    assert!(Arc::ptr_eq(up2.as_instance().unwrap(), d_root));
}

//! Integration tests for the DDM request encoder
//!
//! Exercises the request builders through the public API and checks the
//! two structural guarantees every frame must uphold: consistent length
//! fields at every nesting level, and full-width blank-padded character
//! key fields.

use ddm400r::libddm::{
    build_request, request, verify_lengths, DeclaredName, KeyField, KeyFieldType, KeyValue,
    OptionList, Term,
};

use proptest::prelude::*;

fn dclnam() -> DeclaredName {
    DeclaredName::new("TSTFILE").unwrap()
}

#[test]
fn open_frame_matches_reference_layout() {
    let frame = request::open(&dclnam(), "MYLIB/MYFILE", OptionList::default(), 0x0001).unwrap();
    verify_lengths(&frame).unwrap();

    // header: total length, GDS id, request format, correlation id
    assert_eq!(u16::from_be_bytes([frame[0], frame[1]]) as usize, frame.len());
    assert_eq!(frame[2], 0xD0);
    assert_eq!(frame[3], 0x01);
    assert_eq!(u16::from_be_bytes([frame[4], frame[5]]), 0x0001);
    // file name travels as EBCDIC: 'M' is 0xD4
    assert!(frame.contains(&0xD4));
}

#[test]
fn keyed_get_carries_full_width_key() {
    let fields = [
        KeyField::new("NAME", KeyFieldType::Char { width: 10, variable_length: false }),
        KeyField::new("SEQ", KeyFieldType::Binary4),
    ];
    let values = [
        Some(KeyValue::Text("JONES".to_string())),
        Some(KeyValue::Number(3)),
    ];
    let frame =
        request::get_by_key(&dclnam(), &fields, &values, OptionList::default(), 2).unwrap();
    verify_lengths(&frame).unwrap();

    // "JONES" in EBCDIC, blank padded to the declared width of 10
    let expected_key: Vec<u8> = {
        let mut k = vec![0xD1, 0xD6, 0xD5, 0xC5, 0xE2];
        k.extend_from_slice(&[0x40; 5]);
        k.extend_from_slice(&[0, 0, 0, 3]);
        k
    };
    assert!(frame
        .windows(expected_key.len())
        .any(|w| w == expected_key.as_slice()));
}

#[test]
fn builders_are_deterministic() {
    let a = request::get(&dclnam(), OptionList::default(), 5).unwrap();
    let b = request::get(&dclnam(), OptionList::default(), 5).unwrap();
    assert_eq!(a, b);
}

#[test]
fn commit_and_rollback_have_no_parameters() {
    for frame in [request::commit(1).unwrap(), request::rollback(2).unwrap()] {
        verify_lengths(&frame).unwrap();
        // header + bare operation term
        assert_eq!(frame.len(), 6 + 4);
    }
}

fn leaf_term() -> impl Strategy<Value = Term> {
    (any::<u16>(), proptest::collection::vec(any::<u8>(), 0..40))
        .prop_map(|(cp, bytes)| Term::bytes(cp, bytes))
}

fn term_tree() -> impl Strategy<Value = Term> {
    leaf_term().prop_recursive(3, 24, 4, |inner| {
        (any::<u16>(), proptest::collection::vec(inner, 0..4))
            .prop_map(|(cp, kids)| Term::nested(cp, kids))
    })
}

proptest! {
    /// Every length field in a built frame covers exactly its prefix plus
    /// value, whatever the parameter term shape.
    #[test]
    fn tlv_lengths_hold_for_arbitrary_schemas(
        operation in any::<u16>(),
        correlation in any::<u16>(),
        params in proptest::collection::vec(term_tree(), 0..5),
    ) {
        let frame = build_request(operation, correlation, params).unwrap();
        prop_assert!(verify_lengths(&frame).is_ok());
        prop_assert_eq!(
            u16::from_be_bytes([frame[0], frame[1]]) as usize,
            frame.len()
        );
    }

    /// Fixed-width character key fields always occupy the declared width,
    /// with EBCDIC blanks in the padding positions.
    #[test]
    fn char_keys_keep_declared_width(width in 1usize..30, take in 0usize..30) {
        let s: String = "KEYVALUE".chars().cycle().take(take.min(width)).collect();
        let fields = [KeyField::new(
            "K",
            KeyFieldType::Char { width, variable_length: false },
        )];
        let key = ddm400r::libddm::encode_key(&fields, &[Some(KeyValue::Text(s.clone()))]).unwrap();
        prop_assert_eq!(key.len(), width);
        for &b in &key[s.len()..] {
            prop_assert_eq!(b, 0x40);
        }
    }
}

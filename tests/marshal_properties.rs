//! Conversion properties of the value marshaller over generated inputs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::collection::{btree_map, btree_set, vec};
use proptest::prelude::*;

use iohid::marshal::{criteria_to_native, to_host, to_int32, to_native, Criteria};
use iohid::{HostObject, HostValue};

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Own keys start with a letter, so they never collide with the `_`-prefixed
/// hidden and inherited keys below and are never array indices
fn own_key() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,10}"
}

fn hidden_key() -> impl Strategy<Value = String> {
    "_h[a-z0-9]{1,8}"
}

fn inherited_key() -> impl Strategy<Value = String> {
    "_p[a-z0-9]{1,8}"
}

proptest! {
    #[test]
    fn integers_survive_round_trip(n in any::<i32>()) {
        let native = to_native(&HostValue::from(n)).unwrap();
        prop_assert_eq!(native.as_i32(), Some(n));
        prop_assert_eq!(to_host(&native), HostValue::Number(f64::from(n)));
    }

    #[test]
    fn out_of_range_numbers_wrap_like_int32(
        n in any::<i32>(),
        turns in -4i32..=4,
        thousandths in 1u32..1000,
    ) {
        let shifted = f64::from(n) + f64::from(turns) * TWO_POW_32;
        prop_assert_eq!(to_int32(shifted), n);

        // Truncation is toward zero
        let frac = f64::from(thousandths) / 1000.0;
        let expected = if n < 0 { n + 1 } else { n };
        prop_assert_eq!(to_int32(f64::from(n) + frac), expected);
    }

    #[test]
    fn strings_preserve_utf8(s in any::<String>()) {
        let native = to_native(&HostValue::from(s.as_str())).unwrap();
        prop_assert_eq!(native.as_str().unwrap().as_bytes(), s.as_bytes());
        prop_assert_eq!(to_host(&native), HostValue::from(s));
    }

    #[test]
    fn list_order_preserved(items in vec(any::<i32>(), 0..64)) {
        let host = HostValue::Array(items.iter().copied().map(HostValue::from).collect());
        let native = to_native(&host).unwrap();
        let converted: Vec<i32> = native
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_i32())
            .collect();
        prop_assert_eq!(&converted, &items);
        prop_assert_eq!(to_host(&native), host);
    }

    #[test]
    fn maps_carry_exactly_own_enumerable_keys(
        own in btree_map(own_key(), any::<i32>(), 0..12),
        hidden in btree_set(hidden_key(), 0..6),
        inherited in btree_map(inherited_key(), any::<i32>(), 0..6),
    ) {
        let proto: HostObject = inherited
            .iter()
            .map(|(k, v)| (k.clone(), HostValue::from(*v)))
            .collect();
        let mut obj = HostObject::with_prototype(proto);
        for (key, value) in &own {
            obj.set(key.as_str(), *value);
        }
        for key in &hidden {
            obj.define_hidden(key.as_str(), 1);
        }

        let native = to_native(&obj.into()).unwrap();
        let dict = native.as_dictionary().unwrap();
        let keys: BTreeSet<&str> = dict.iter().filter_map(|(k, _)| k.as_str()).collect();
        let expected: BTreeSet<&str> = own.keys().map(String::as_str).collect();
        prop_assert_eq!(keys, expected);

        let values: BTreeMap<String, i32> = dict
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_owned(), v.as_i32()?)))
            .collect();
        prop_assert_eq!(values, own);
    }
}

#[test]
fn int32_edges() {
    for n in [0, 1, -1, i32::MAX, i32::MIN, i32::MAX - 1, i32::MIN + 1] {
        let native = to_native(&HostValue::from(n)).unwrap();
        assert_eq!(native.as_i32(), Some(n));
    }
    assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
    assert_eq!(to_int32(-2_147_483_649.0), i32::MAX);
    assert_eq!(to_int32(f64::NAN), 0);
    assert_eq!(to_int32(f64::INFINITY), 0);
}

#[test]
fn device_strings_preserve_utf8() {
    for s in ["", "Magic Keyboard with Touch ID", "日本語キーボード", "emoji 🎹🖱️"] {
        let native = to_native(&HostValue::from(s)).unwrap();
        assert_eq!(native.as_str(), Some(s));
    }
}

#[test]
fn nested_maps_skip_inherited_and_hidden_keys() {
    let mut proto = HostObject::new();
    proto.set("LocationID", 7).set("VendorID", 99);

    let mut obj = HostObject::with_prototype(proto);
    obj.set("VendorID", 1452)
        .set("Product", "Keyboard")
        .set("DeviceUsagePairs", vec![HostValue::Object(
            [("DeviceUsagePage".to_owned(), HostValue::from(1))]
                .into_iter()
                .collect(),
        )])
        .define_hidden("Secret", 5);

    let native = to_native(&obj.clone().into()).unwrap();
    let dict = native.as_dictionary().unwrap();
    let keys: Vec<&str> = dict.iter().filter_map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["VendorID", "Product", "DeviceUsagePairs"]);
    assert_eq!(dict.get("VendorID").and_then(|v| v.as_i32()), Some(1452));
    assert!(!dict.contains_key("LocationID"));
    assert!(!dict.contains_key("Secret"));

    for (key, value) in obj.own_enumerable() {
        let back = to_host(dict.get(key).unwrap());
        assert_eq!(&back, value);
    }
}

#[test]
fn converted_objects_are_solely_owned() {
    let value: HostValue = serde_json::json!({
        "VendorID": 1452,
        "pairs": [{"DeviceUsagePage": 1}, {"DeviceUsage": 6}]
    })
    .into();
    let native = to_native(&value).unwrap();
    assert_eq!(Arc::strong_count(&native), 1);

    let dict = native.as_dictionary().unwrap();
    for (key, child) in dict.iter() {
        assert_eq!(Arc::strong_count(key), 1);
        assert_eq!(Arc::strong_count(child), 1);
    }

    match criteria_to_native(&value).unwrap() {
        Criteria::Single(dict) => assert_eq!(Arc::strong_count(&dict), 1),
        other => panic!("expected single criteria, got {:?}", other),
    }
}

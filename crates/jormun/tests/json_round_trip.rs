//! End-to-end JSON codec behavior through the public API.

use jormun::{ValueRepr, Vm, VmOptions};
use pretty_assertions::assert_eq;

fn vm() -> Vm {
    Vm::new(VmOptions::default())
}

#[test]
fn parse_object_scenario() {
    let mut vm = vm();
    let handle = vm.json_parse(r#"{"a":1,"b":[2,3]}"#).unwrap();
    let ValueRepr::Object(map) = vm.export(handle) else {
        panic!("expected an object");
    };
    assert_eq!(map.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(map["a"], ValueRepr::Number(1.0));
    assert_eq!(
        map["b"],
        ValueRepr::Array(vec![ValueRepr::Number(2.0), ValueRepr::Number(3.0)])
    );
}

#[test]
fn surrogate_pair_scenario() {
    let mut vm = vm();
    let handle = vm.json_parse(r#""😀""#).unwrap();

    // Code-unit length is 2; the content is the UTF-8 encoding of U+1F600.
    let length = vm.property(handle, "length").unwrap().unwrap();
    assert_eq!(vm.export(length), ValueRepr::Number(2.0));
    assert_eq!(vm.export(handle), ValueRepr::String("\u{1f600}".to_string()));
}

#[test]
fn stringify_skip_rules_scenarios() {
    let mut vm = vm();

    // Objects drop undefined-valued and function-valued members.
    let object = vm.object().unwrap();
    vm.set_property(object, "a", vm.number(1.0)).unwrap();
    vm.set_property(object, "b", vm.undefined()).unwrap();
    assert_eq!(vm.json_stringify(object).unwrap(), Some(r#"{"a":1}"#.to_string()));

    // Arrays keep positions by emitting null.
    let array = vm
        .array(&[vm.number(1.0), vm.undefined(), vm.number(3.0)])
        .unwrap();
    assert_eq!(vm.json_stringify(array).unwrap(), Some("[1,null,3]".to_string()));
}

#[test]
fn depth_boundary_is_exactly_32() {
    let mut vm = vm();
    let nested = |depth: usize| {
        let mut text = "[".repeat(depth);
        text.push('0');
        text.push_str(&"]".repeat(depth));
        text
    };
    assert!(vm.json_parse(&nested(32)).is_ok());
    let err = vm.json_parse(&nested(33)).unwrap_err();
    assert!(err.to_string().starts_with("SyntaxError: Nested too deep"));
}

#[test]
fn parse_then_stringify_canonicalizes() {
    let mut vm = vm();
    let cases = [
        (r#"  {  "a" : 1 , "b" : [ true, null ] } "#, r#"{"a":1,"b":[true,null]}"#),
        ("[1e2,0.5,-0]", "[100,0.5,0]"),
        (r#""A\n""#, "\"A\\n\""),
        ("[[]]", "[[]]"),
        (r#"{"k":{}}"#, r#"{"k":{}}"#),
    ];
    for (input, canonical) in cases {
        let handle = vm.json_parse(input).unwrap();
        assert_eq!(vm.json_stringify(handle).unwrap().as_deref(), Some(canonical), "{input}");
    }
}

#[test]
fn structural_round_trip_is_a_fixed_point() {
    let mut vm = vm();
    let source = r#"{"s":"text","n":-2.5e3,"flags":[true,false,null],"o":{"inner":[{}]}}"#;
    let first = vm.json_parse(source).unwrap();
    let text = vm.json_stringify(first).unwrap().unwrap();
    let second = vm.json_parse(&text).unwrap();
    assert_eq!(vm.export(first), vm.export(second));
    assert_eq!(vm.json_stringify(second).unwrap().unwrap(), text);
}

#[test]
fn output_cross_checks_against_serde_json() {
    let mut vm = vm();
    let object = vm.object().unwrap();
    let text_value = vm.string("quote \" and \\ tab\t").unwrap();
    vm.set_property(object, "text", text_value).unwrap();
    vm.set_property(object, "tiny", vm.number(5e-324)).unwrap();
    vm.set_property(object, "big", vm.number(1.23e21)).unwrap();
    let inner = vm.array(&[vm.boolean(false), vm.null()]).unwrap();
    vm.set_property(object, "inner", inner).unwrap();

    let text = vm.json_stringify(object).unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("output must be valid JSON");
    assert_eq!(parsed["text"], serde_json::json!("quote \" and \\ tab\t"));
    assert_eq!(parsed["tiny"].as_f64(), Some(5e-324));
    assert_eq!(parsed["big"].as_f64(), Some(1.23e21));
    assert_eq!(parsed["inner"], serde_json::json!([false, null]));
}

#[test]
fn errors_report_positions_and_leave_vm_usable() {
    let mut vm = vm();
    let err = vm.json_parse("{bad}").unwrap_err();
    assert_eq!(err.to_string(), "SyntaxError: Unexpected token at position 1");
    assert!(vm.error_string().unwrap().contains("Unexpected token"));

    // The VM keeps working after a failed parse.
    assert!(vm.json_parse("[]").is_ok());
}

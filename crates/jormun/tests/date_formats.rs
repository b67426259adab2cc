//! Date parsing and formatting through the public API.

use jormun::{ErrorKind, ValueRepr, Vm, VmOptions};
use pretty_assertions::assert_eq;

fn vm() -> Vm {
    Vm::new(VmOptions::default())
}

/// Builds a date from a string and returns its epoch milliseconds.
fn parse_ms(vm: &mut Vm, text: &str) -> f64 {
    let text = vm.string(text).unwrap();
    let date = vm.date(&[text]).unwrap();
    let ValueRepr::Date(ms) = vm.export(date) else {
        panic!("expected a date");
    };
    ms
}

#[test]
fn iso_parse_scenario() {
    let mut vm = vm();
    assert_eq!(parse_ms(&mut vm, "1970-09-28T06:00:00Z"), 23_349_600_000.0);
    assert_eq!(parse_ms(&mut vm, "1970-09-28T06:00:00.000Z"), 23_349_600_000.0);
}

#[test]
fn three_formats_agree() {
    let mut vm = vm();
    let iso = parse_ms(&mut vm, "1970-09-28T06:00:00Z");
    let rfc = parse_ms(&mut vm, "Mon, 28 Sep 1970 06:00:00 GMT");
    let js = parse_ms(&mut vm, "Mon Sep 28 1970 06:00:00 GMT+0000");
    assert_eq!(iso, rfc);
    assert_eq!(iso, js);
}

#[test]
fn unparseable_input_is_invalid_date() {
    let mut vm = vm();
    assert!(parse_ms(&mut vm, "yesterday-ish").is_nan());
    assert!(parse_ms(&mut vm, "1970~01~01").is_nan());
}

#[test]
fn nan_date_to_iso_string_throws_range_error() {
    let mut vm = vm();
    let nan = vm.number(f64::NAN);
    let date = vm.date(&[nan]).unwrap();
    let to_iso = vm.property(date, "toISOString").unwrap().unwrap();
    let err = vm.call_function(to_iso, date, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeError);
    assert_eq!(err.to_string(), "RangeError: Invalid Date");
}

#[test]
fn epoch_range_boundary() {
    let mut vm = vm();
    let at_limit = vm.date(&[vm.number(8.64e15)]).unwrap();
    assert_eq!(vm.export(at_limit), ValueRepr::Date(8.64e15));

    let beyond = vm.date(&[vm.number(8.64e15 + 1.0)]).unwrap();
    let ValueRepr::Date(ms) = vm.export(beyond) else {
        panic!("expected a date");
    };
    assert!(ms.is_nan());
}

#[test]
fn iso_round_trip_over_the_full_range() {
    let mut vm = vm();
    for ms in [0.0, 23_349_600_000.0, -123_456_789_000.0, 8.64e15, -8.64e15] {
        let date = vm.date(&[vm.number(ms)]).unwrap();
        let to_iso = vm.property(date, "toISOString").unwrap().unwrap();
        let text = vm.call_function(to_iso, date, &[]).unwrap();
        let ValueRepr::String(text) = vm.export(text) else {
            panic!("expected a string");
        };
        assert_eq!(parse_ms(&mut vm, &text), ms, "{text}");
    }
}

#[test]
fn utc_string_and_getters() {
    let mut vm = vm();
    let date = vm.date(&[vm.number(23_349_600_000.0)]).unwrap();

    let to_utc = vm.property(date, "toUTCString").unwrap().unwrap();
    let text = vm.call_function(to_utc, date, &[]).unwrap();
    assert_eq!(
        vm.export(text),
        ValueRepr::String("Mon, 28 Sep 1970 06:00:00 GMT".to_string())
    );

    // Month is zero-based, day-of-week starts at Sunday.
    let get_month = vm.property(date, "getUTCMonth").unwrap().unwrap();
    let month = vm.call_function(get_month, date, &[]).unwrap();
    assert_eq!(vm.export(month), ValueRepr::Number(8.0));
    let get_day = vm.property(date, "getUTCDay").unwrap().unwrap();
    let day = vm.call_function(get_day, date, &[]).unwrap();
    assert_eq!(vm.export(day), ValueRepr::Number(1.0));
}

#[test]
fn calendar_constructor_against_utc_getters() {
    let mut vm = vm();
    // new Date(y, m, d, …) reads as local time; its UTC fields must match
    // the same reading shifted by the zone offset, which the round trip
    // through getTime/getTimezoneOffset verifies without pinning a zone.
    let date = vm
        .date(&[vm.number(1970.0), vm.number(8.0), vm.number(28.0), vm.number(6.0)])
        .unwrap();
    let get_hours = vm.property(date, "getHours").unwrap().unwrap();
    let hours = vm.call_function(get_hours, date, &[]).unwrap();
    assert_eq!(vm.export(hours), ValueRepr::Number(6.0));

    let get_year = vm.property(date, "getFullYear").unwrap().unwrap();
    let year = vm.call_function(get_year, date, &[]).unwrap();
    assert_eq!(vm.export(year), ValueRepr::Number(1970.0));
}

#[test]
fn setters_update_and_invalidate() {
    let mut vm = vm();
    let date = vm.date(&[vm.number(0.0)]).unwrap();

    let set_year = vm.property(date, "setUTCFullYear").unwrap().unwrap();
    vm.call_function(set_year, date, &[vm.number(1970.0), vm.number(8.0), vm.number(28.0)])
        .unwrap();
    let set_hours = vm.property(date, "setUTCHours").unwrap().unwrap();
    let result = vm.call_function(set_hours, date, &[vm.number(6.0)]).unwrap();
    assert_eq!(vm.export(result), ValueRepr::Number(23_349_600_000.0));

    // An unrepresentable field turns the date invalid.
    let set_month = vm.property(date, "setUTCMonth").unwrap().unwrap();
    let result = vm.call_function(set_month, date, &[vm.number(f64::INFINITY)]).unwrap();
    let ValueRepr::Number(ms) = vm.export(result) else {
        panic!("expected a number");
    };
    assert!(ms.is_nan());
}

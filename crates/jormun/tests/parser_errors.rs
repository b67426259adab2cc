//! Parser acceptance and error reporting through the public API.

use jormun::{Vm, VmOptions};
use pretty_assertions::assert_eq;

fn vm() -> Vm {
    Vm::new(VmOptions::default())
}

fn module_vm() -> Vm {
    Vm::new(VmOptions {
        module: true,
        ..VmOptions::default()
    })
}

#[test]
fn accepted_programs() {
    let mut vm = vm();
    for source in [
        "var a = 1, b = a + 2;",
        "function add(a, b) { return a + b }",
        "if (x) { y = 1 } else y = 2;",
        "for (var i = 0; i < 10; i++) total += i;",
        "for (var key in object) {}",
        "while (ready) { work() }",
        "do { tick() } while (running)",
        "switch (kind) { case 1: break; default: break }",
        "try { risky() } catch (e) { log(e) } finally { done() }",
        "outer: for (;;) { break outer }",
        "var f = function named() { return named };",
        "var g = (a, b) => a + b;",
        "var h = x => x * 2;",
        "value = condition ? left : right;",
        "bits = a << 2 >>> 1 & mask | flags ^ toggle;",
        "delete object.key; typeof value; void 0;",
        "matched = /ab+c/i;",
        "obj = { name: 'x', 'two': 2, 3: 'three' };",
        "list = [1, , 3];",
        "x = new Thing(1, 2).member[0]();",
        "n = 2 ** 3 ** 2;",
        "t = this;",
    ] {
        assert!(vm.parse(source, "ok.js").is_ok(), "{source} should parse");
    }
}

#[test]
fn error_messages_carry_file_and_line() {
    let mut vm = vm();
    let err = vm.parse("var a = 1;\nvar b = ;", "script.js").unwrap_err();
    assert_eq!(err.to_string(), "SyntaxError: Unexpected token \";\" (script.js:2)");
    assert_eq!(err.file_name(), Some("script.js"));
    assert_eq!(err.line_number(), Some(2));
}

#[test]
fn function_nesting_boundary() {
    let mut vm = vm();
    let nested = |depth: usize| {
        let mut source = String::new();
        for i in 0..depth {
            source.push_str(&format!("function f{i}() {{ "));
        }
        source.push_str(&"}".repeat(depth));
        source
    };
    assert!(vm.parse(&nested(5), "five.js").is_ok());
    let err = vm.parse(&nested(6), "six.js").unwrap_err();
    assert_eq!(err.message(), "The maximum function nesting level is 5");
}

#[test]
fn statement_position_rules() {
    let mut vm = vm();
    assert!(vm.parse("return 1;", "top.js").is_err());
    assert!(vm.parse("throw\nerr;", "nl.js").is_err());
    assert!(vm.parse("try { }", "bare.js").is_err());
    assert!(vm.parse("break missing;", "label.js").is_err());
    assert!(vm.parse("switch (x) { default: ; default: ; }", "two.js").is_err());
}

#[test]
fn asi_requires_newline_or_semicolon() {
    let mut vm = vm();
    assert!(vm.parse("a = 1\nb = 2", "asi.js").is_ok());
    assert!(vm.parse("a = 1; b = 2", "semi.js").is_ok());
    assert!(vm.parse("a = 1 b = 2", "bad.js").is_err());
}

#[test]
fn module_only_statements() {
    let mut vm = vm();
    assert!(vm.parse("import lib from 'lib';", "script.js").is_err());
    assert!(vm.parse("export default 1;", "script.js").is_err());

    let mut vm = module_vm();
    assert!(vm.parse("import lib from 'lib';", "mod.js").is_ok());
    assert!(vm.parse("export default lib;", "mod.js").is_ok());
}

#[test]
fn trailer_option_stops_at_outer_brace() {
    let mut vm = Vm::new(VmOptions {
        trailer: true,
        ..VmOptions::default()
    });
    assert!(vm.parse("var a = 1; } trailing config", "conf.js").is_ok());

    let mut strict = Vm::new(VmOptions::default());
    assert!(strict.parse("var a = 1; } trailing config", "conf.js").is_err());
}

#[test]
fn failed_parse_does_not_poison_the_vm() {
    let mut vm = vm();
    assert!(vm.parse("var broken = ;", "one.js").is_err());
    assert!(vm.error_string().is_some());
    assert!(vm.parse("var fine = 1;", "two.js").is_ok());
    assert_eq!(vm.error_string(), None);
}

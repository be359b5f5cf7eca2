//! End-to-end inference scenarios
//!
//! Each test runs the whole pipeline: parse, order, read, finalize.

mod common;

use common::assertions::{assert_before, assert_class, assert_module, types};
use common::fixtures::{project, sources};
use luastub::analysis::TypeTag;
use luastub::{analyze_project, analyze_sources, AnalysisConfig};

#[test]
fn e2e_module_table_with_numeric_function() {
    let output = analyze_sources(
        sources(&[(
            "shared/M",
            "local M = {}\nfunction M.f(x) return x + 1 end\nreturn M",
        )]),
        &AnalysisConfig::default(),
    );
    let module = assert_module(&output, "shared/M");

    let table = module.returns[0]
        .types
        .single_table()
        .expect("Expected the module to return one table");
    let f = module
        .table_by_id(table)
        .and_then(|t| t.function("f"))
        .expect("Expected function f on the returned table");
    assert_eq!(f.params.len(), 1);
    assert_eq!(f.params[0].types, types(&[TypeTag::Number]));
    assert_eq!(f.returns, vec![types(&[TypeTag::Number])]);
}

#[test]
fn e2e_new_method_constructs_its_class() {
    let output = analyze_sources(
        sources(&[(
            "shared/Foo",
            "Foo = {}\nfunction Foo:new()\n  local o = {}\n  setmetatable(o, self)\n  return o\nend",
        )]),
        &AnalysisConfig::default(),
    );
    let module = assert_module(&output, "shared/Foo");
    let class = assert_class(module, "Foo");

    let new = class.member_function("new").expect("Expected new on Foo");
    assert!(new.is_constructor);
    assert_eq!(new.returns, vec![types(&[TypeTag::TableRef(class.table)])]);
}

#[test]
fn e2e_global_set_in_function_may_be_nil() {
    let output = analyze_sources(
        sources(&[
            ("client/reader", "function bar2() return Counter end"),
            ("shared/setter", "function bar() Counter = 5 end"),
        ]),
        &AnalysisConfig::default(),
    );
    assert_before(&output.order, "shared/setter", "client/reader");

    let reader = assert_module(&output, "client/reader");
    let bar2 = reader.function("bar2").expect("Expected bar2");
    assert_eq!(bar2.returns, vec![types(&[TypeTag::Number, TypeTag::Nil])]);
}

#[test]
fn e2e_module_local_set_in_function_may_be_nil() {
    let output = analyze_sources(
        sources(&[(
            "shared/state",
            "local x\nfunction bar() x = 5 end\nfunction bar2() return x end",
        )]),
        &AnalysisConfig::default(),
    );
    let module = assert_module(&output, "shared/state");
    let bar2 = module.function("bar2").expect("Expected bar2");
    assert_eq!(bar2.returns, vec![types(&[TypeTag::Number, TypeTag::Nil])]);
}

#[test]
fn e2e_derive_call_creates_child_class() {
    let output = analyze_sources(
        sources(&[(
            "shared/classes",
            "Base = {}\nfunction Base:derive(name)\n  local c = {}\n  return c\nend\nChild = Base:derive(\"Child\")",
        )]),
        &AnalysisConfig::default(),
    );
    let module = assert_module(&output, "shared/classes");
    let child = assert_class(module, "Child");
    assert_eq!(child.extends.as_deref(), Some("Base"));
    assert_eq!(child.derive_name.as_deref(), Some("Child"));
}

#[test]
fn e2e_class_across_modules() {
    let dir = project(&[
        (
            "shared/ui/Button.lua",
            "local Button = {}\nButton.__index = Button\n\
             function Button.new()\n  local self = setmetatable({}, Button)\n  return self\nend\n\
             return Button",
        ),
        (
            "client/Main.lua",
            "local Button = require(\"ui.Button\")\nlocal b = Button.new()\nreturn b",
        ),
    ]);
    let output = analyze_project(&AnalysisConfig::new(dir.path()));
    assert_eq!(output.order, vec!["shared/ui/Button", "client/Main"]);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let button = assert_module(&output, "shared/ui/Button");
    let class = assert_class(button, "Button");
    assert!(class.member_function("new").is_some());

    let main = assert_module(&output, "client/Main");
    assert_eq!(main.returns[0].types, types(&[TypeTag::TableRef(class.table)]));
}

#[test]
fn e2e_required_global_is_recorded() {
    let output = analyze_sources(
        sources(&[
            ("shared/util/Strings", "local S = {}\nfunction S.trim(s) return s end\nreturn S"),
            ("shared/Main", "Strings = require(\"util.Strings\")"),
        ]),
        &AnalysisConfig::default(),
    );
    let main = assert_module(&output, "shared/Main");
    assert_eq!(main.requires.len(), 1);
    assert_eq!(main.requires[0].name, "Strings");
    assert_eq!(main.requires[0].module, "shared/util/Strings");
    assert!(main.fields.is_empty());
}

#[test]
fn e2e_mutual_requires_terminate() {
    let output = analyze_sources(
        sources(&[
            ("shared/a", "return require(\"b\")"),
            ("shared/b", "return require(\"a\")"),
        ]),
        &AnalysisConfig::default(),
    );
    assert_eq!(output.modules.len(), 2);
    for module in &output.modules {
        assert!(module.returns[0].types.is_empty());
    }
    assert!(output.diagnostics.iter().any(|d| d.starts_with("E-DEP-006")));
}

#[test]
fn e2e_output_serializes_to_json() {
    let output = analyze_sources(
        sources(&[("shared/M", "local M = { answer = 42 }\nreturn M")]),
        &AnalysisConfig::default(),
    );
    let json = serde_json::to_value(&output).expect("Failed to serialize output");
    assert_eq!(json["order"][0], "shared/M");
    assert_eq!(json["modules"][0]["id"], "shared/M");
    assert_eq!(json["modules"][0]["tables"][0]["name"], "M");
    assert_eq!(
        json["modules"][0]["tables"][0]["fields"][0]["value"]["literal"],
        "42"
    );
}

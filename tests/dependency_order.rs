//! Analysis order over whole projects

mod common;

use common::assertions::{assert_before, assert_module, types};
use common::fixtures::{project, sources, write_file};
use luastub::deps::{discover_files, order_sources};
use luastub::analysis::TypeTag;
use luastub::{analyze_project, analyze_sources, AnalysisConfig};

fn buckets() -> Vec<String> {
    AnalysisConfig::default().buckets
}

#[test]
fn e2e_required_module_comes_first() {
    let resolved = order_sources(
        &sources(&[
            ("shared/a", "local b = require(\"b\")\nreturn b"),
            ("shared/b", "return {}"),
        ]),
        &buckets(),
    );
    assert_eq!(resolved.order, vec!["shared/b", "shared/a"]);
    assert!(resolved.diagnostics.is_empty());
}

#[test]
fn e2e_global_setter_comes_first() {
    let resolved = order_sources(
        &sources(&[
            ("shared/z_reader", "local size = Config.size\nreturn size"),
            ("shared/a_setter", "Config = { size = 10 }"),
        ]),
        &buckets(),
    );
    assert_before(&resolved.order, "shared/a_setter", "shared/z_reader");
}

#[test]
fn e2e_extension_keeps_fields_on_defining_table() {
    let output = analyze_sources(
        sources(&[
            ("shared/a_base", "Config = { size = 10 }"),
            ("shared/z_ext", "Config = Config or {}\nConfig.extra = 1"),
        ]),
        &AnalysisConfig::default(),
    );
    assert_eq!(output.order, vec!["shared/a_base", "shared/z_ext"]);

    let base = assert_module(&output, "shared/a_base");
    let config = base.table("Config").expect("Config missing");
    assert!(config.field("size").is_some());
    let extra = config.field("extra").expect("extension field lost");
    assert_eq!(extra.value.types, types(&[TypeTag::Number]));
}

#[test]
fn e2e_cycle_places_each_file_once() {
    let resolved = order_sources(
        &sources(&[
            ("shared/a", "local b = require(\"b\")\nA = {}\nreturn A"),
            ("shared/b", "local a = require(\"a\")\nreturn a"),
        ]),
        &buckets(),
    );
    assert_eq!(resolved.order.len(), 2);
    assert!(resolved.order.contains(&"shared/a".to_string()));
    assert!(resolved.order.contains(&"shared/b".to_string()));
    assert!(resolved
        .diagnostics
        .iter()
        .any(|d| d.code() == "E-DEP-006"));
}

#[test]
fn e2e_buckets_run_in_configured_order() {
    let dir = project(&[
        ("server/Boot.lua", "return 1"),
        ("client/Hud.lua", "return 2"),
        ("shared/Util.lua", "return 3"),
    ]);
    let output = analyze_project(&AnalysisConfig::new(dir.path()));
    assert_eq!(
        output.order,
        vec!["shared/Util", "client/Hud", "server/Boot"]
    );
}

#[test]
fn e2e_discovery_filters_extension_and_buckets() {
    let dir = project(&[
        ("shared/a.lua", "return 1"),
        ("shared/nested/b.lua", "return 2"),
        ("shared/readme.txt", "not lua"),
        ("tools/c.lua", "return 3"),
    ]);
    let config = AnalysisConfig::new(dir.path());
    let found: Vec<String> = discover_files(&config)
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(found, vec!["a.lua", "b.lua"]);
}

#[test]
fn e2e_unparseable_file_is_skipped() {
    let dir = project(&[("shared/good.lua", "return {}")]);
    write_file(dir.path(), "shared/bad.lua", "local function (");

    let output = analyze_project(&AnalysisConfig::new(dir.path()));
    assert_eq!(output.order, vec!["shared/good"]);
    assert_eq!(output.modules.len(), 1);
    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.starts_with("E-ANA-001") && d.contains("shared/bad")));
}

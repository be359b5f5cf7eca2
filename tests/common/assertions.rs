use luastub::analysis::{AnalyzedClass, AnalyzedModule, TypeSet, TypeTag};
use luastub::AnalysisOutput;

/// Build a type set from tags
pub fn types(tags: &[TypeTag]) -> TypeSet {
    tags.iter().copied().collect()
}

/// Assert that `first` is analyzed before `second`
pub fn assert_before(order: &[String], first: &str, second: &str) {
    let position = |id: &str| {
        order
            .iter()
            .position(|x| x == id)
            .unwrap_or_else(|| panic!("{} missing from order {:?}", id, order))
    };
    assert!(
        position(first) < position(second),
        "Expected {} before {} in {:?}",
        first,
        second,
        order
    );
}

/// Assert that a module was analyzed and return it
pub fn assert_module<'a>(output: &'a AnalysisOutput, id: &str) -> &'a AnalyzedModule {
    output
        .module(id)
        .unwrap_or_else(|| panic!("Expected module {} in {:?}", id, output.order))
}

/// Assert that a module declares a class and return it
pub fn assert_class<'a>(module: &'a AnalyzedModule, name: &str) -> &'a AnalyzedClass {
    module.class(name).unwrap_or_else(|| {
        let names: Vec<&str> = module.classes.iter().map(|c| c.name.as_str()).collect();
        panic!("Expected class {} in {}, found {:?}", name, module.id, names)
    })
}

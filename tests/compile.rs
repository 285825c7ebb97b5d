use jsonvet::dialect::{DIALECT_2020_12, DIALECT_DRAFT_7};
use jsonvet::{
    compile_schema, evaluate, validate, EmptyResolver, InMemoryResolver, JsonVetError, Mode,
    Program,
};
use serde_json::{json, Value};

fn compile(schema: &Value) -> Program {
    compile_schema(schema, &EmptyResolver, Some(DIALECT_2020_12)).expect("compile")
}

#[test]
fn boolean_schemas_compile_to_trivial_programs() {
    let always = compile(&json!(true));
    assert!(always.steps.is_empty());
    assert!(validate(&always, &json!({"anything": [1, 2]})).expect("validate"));

    let never = compile(&json!(false));
    assert_eq!(never.steps.len(), 1);
    assert!(!validate(&never, &json!(null)).expect("validate"));
}

#[test]
fn statically_impossible_keywords_are_skipped() {
    // `maxLength` only applies to strings, which `type` already excludes
    let program = compile(&json!({"type": "number", "maxLength": 3}));
    assert_eq!(program.steps.len(), 1);

    assert!(validate(&program, &json!(7.5)).expect("validate"));
    assert!(!validate(&program, &json!("text")).expect("validate"));
}

#[test]
fn integer_and_number_types_intersect() {
    // `multipleOf` is numeric, so a declared `integer` type must keep it
    let program = compile(&json!({"type": "integer", "multipleOf": 2}));
    assert_eq!(program.steps.len(), 2);

    assert!(validate(&program, &json!(4)).expect("validate"));
    assert!(!validate(&program, &json!(3)).expect("validate"));
}

#[test]
fn cyclic_references_share_a_subprogram() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/list",
        "type": "object",
        "properties": {"next": {"$ref": "#"}}
    });

    let program = compile(&schema);
    assert_eq!(program.subprogram_count(), 1);

    assert!(validate(&program, &json!({"next": {"next": {}}})).expect("validate"));
    assert!(!validate(&program, &json!({"next": 5})).expect("validate"));
}

#[test]
fn legacy_ref_overrides_siblings() {
    let schema = json!({
        "$schema": DIALECT_DRAFT_7,
        "definitions": {"name": {"type": "string"}},
        "$ref": "#/definitions/name",
        "type": "number"
    });

    let program = compile_schema(&schema, &EmptyResolver, None).expect("compile");
    assert!(validate(&program, &json!("abc")).expect("validate"));
    assert!(!validate(&program, &json!(5)).expect("validate"));
}

#[test]
fn modern_ref_keeps_its_siblings() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$defs": {"name": {"type": "string"}},
        "$ref": "#/$defs/name",
        "minLength": 3
    });

    let program = compile(&schema);
    assert!(validate(&program, &json!("abcd")).expect("validate"));
    assert!(!validate(&program, &json!("ab")).expect("validate"));
}

#[test]
fn dynamic_anchors_get_precompiled_labels() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/tree",
        "$dynamicAnchor": "node",
        "type": "object",
        "properties": {"child": {"$dynamicRef": "#node"}}
    });

    let program = compile(&schema);
    assert!(program
        .dynamic_label("https://example.com/tree", "node")
        .is_some());

    assert!(validate(&program, &json!({"child": {"child": {}}})).expect("validate"));
    assert!(!validate(&program, &json!({"child": 5})).expect("validate"));
}

#[test]
fn dependent_schemas_gate_on_property_presence() {
    let program = compile(&json!({
        "dependentSchemas": {"credit": {"required": ["billing"]}}
    }));

    assert!(validate(&program, &json!({"cash": 1})).expect("validate"));
    assert!(validate(&program, &json!({"credit": 1, "billing": {}})).expect("validate"));
    assert!(!validate(&program, &json!({"credit": 1})).expect("validate"));
}

#[test]
fn legacy_dependencies_mix_required_arrays_and_schemas() {
    let schema = json!({
        "$schema": DIALECT_DRAFT_7,
        "dependencies": {
            "credit": ["billing"],
            "shipping": {"properties": {"address": {"type": "string"}}}
        }
    });
    let program = compile_schema(&schema, &EmptyResolver, None).expect("compile");

    assert!(validate(&program, &json!({})).expect("validate"));
    assert!(!validate(&program, &json!({"credit": 1})).expect("validate"));
    assert!(validate(&program, &json!({"credit": 1, "billing": true})).expect("validate"));
    assert!(!validate(&program, &json!({"shipping": 1, "address": 9})).expect("validate"));
    assert!(
        validate(&program, &json!({"shipping": 1, "address": "Main St"})).expect("validate")
    );
}

#[test]
fn empty_combinator_arrays_are_fatal() {
    for schema in [json!({"allOf": []}), json!({"anyOf": []}), json!({"oneOf": []})] {
        let result = compile_schema(&schema, &EmptyResolver, Some(DIALECT_2020_12));
        assert!(
            matches!(result, Err(JsonVetError::InvalidKeywordValue { .. })),
            "expected a rejection for {schema}"
        );
    }
}

#[test]
fn unresolved_static_references_are_fatal() {
    let result = compile_schema(
        &json!({"$schema": DIALECT_2020_12, "$ref": "#/nowhere"}),
        &EmptyResolver,
        None,
    );
    assert!(matches!(
        result,
        Err(JsonVetError::UnresolvedReference { .. })
    ));
}

#[test]
fn invalid_patterns_are_fatal() {
    let result = compile_schema(&json!({"pattern": "("}), &EmptyResolver, Some(DIALECT_2020_12));
    assert!(matches!(result, Err(JsonVetError::InvalidPattern { .. })));
}

#[test]
fn external_references_compile_through_the_resolver() {
    let mut resolver = InMemoryResolver::new();
    resolver.insert(
        "https://example.com/name",
        json!({
            "$schema": DIALECT_2020_12,
            "$id": "https://example.com/name",
            "type": "string",
            "minLength": 1
        }),
    );

    let schema = json!({
        "$schema": DIALECT_2020_12,
        "properties": {"name": {"$ref": "https://example.com/name"}}
    });

    let program = compile_schema(&schema, &resolver, None).expect("compile");
    assert!(validate(&program, &json!({"name": "ada"})).expect("validate"));
    assert!(!validate(&program, &json!({"name": ""})).expect("validate"));
    assert!(!validate(&program, &json!({"name": 9})).expect("validate"));
}

#[test]
fn draft4_exclusive_bounds_fold_into_their_limits() {
    let schema = json!({
        "$schema": "http://json-schema.org/draft-04/schema#",
        "minimum": 3,
        "exclusiveMinimum": true
    });

    let program = compile_schema(&schema, &EmptyResolver, None).expect("compile");
    assert!(validate(&program, &json!(4)).expect("validate"));
    assert!(!validate(&program, &json!(3)).expect("validate"));
}

#[test]
fn verdicts_agree_between_modes() {
    let schema = json!({
        "type": "object",
        "required": ["kind"],
        "properties": {
            "kind": {"enum": ["point", "line"]},
            "coordinates": {"items": {"type": "number"}, "minItems": 1}
        },
        "additionalProperties": false
    });
    let program = compile(&schema);

    let instances = [
        json!({"kind": "point", "coordinates": [1, 2]}),
        json!({"kind": "circle", "coordinates": [1]}),
        json!({"kind": "line"}),
        json!({"kind": "line", "extra": true}),
        json!(42),
    ];
    for instance in &instances {
        let fast = evaluate(&program, instance, Mode::Fast).expect("fast");
        let full = evaluate(&program, instance, Mode::Full).expect("full");
        assert_eq!(fast.success, full.success, "verdict diverged on {instance}");
    }
}

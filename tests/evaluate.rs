use jsonvet::dialect::{DIALECT_2019_09, DIALECT_2020_12};
use jsonvet::{
    compile_schema, evaluate, EmptyResolver, Mode, Outcome, Pointer, Program, TracePhase,
};
use serde_json::{json, Value};

fn compile(schema: &Value) -> Program {
    compile_schema(schema, &EmptyResolver, Some(DIALECT_2020_12)).expect("compile")
}

#[test]
fn full_mode_traces_every_instruction() {
    let program = compile(&json!({"items": {"type": "string"}}));
    let result = evaluate(&program, &json!(["foo", "bar", "baz"]), Mode::Full).expect("evaluate");

    assert!(result.success);
    // Loop pre/post pair, three assertion pre/post pairs, and the trailing
    // annotation carrying the "all items evaluated" payload
    assert_eq!(result.trace.len(), 9);

    let first = &result.trace[0];
    assert_eq!(first.phase, TracePhase::Pre);
    assert_eq!(first.instruction, "loop-items");
    assert_eq!(first.outcome, None);

    let loop_post = &result.trace[7];
    assert_eq!(loop_post.phase, TracePhase::Post);
    assert_eq!(loop_post.instruction, "loop-items");
    assert_eq!(loop_post.outcome, Some(Outcome::Success));

    let tail = &result.trace[8];
    assert_eq!(tail.phase, TracePhase::Post);
    assert_eq!(tail.instruction, "annotation");
    assert_eq!(tail.annotation, Some(json!(true)));

    for event in &result.trace {
        if event.phase == TracePhase::Post {
            assert_eq!(event.outcome, Some(Outcome::Success));
            assert!(event.description.is_some());
        }
    }
}

#[test]
fn fast_mode_short_circuits() {
    let program = compile(&json!({"items": {"type": "string"}}));
    let result = evaluate(&program, &json!(["foo", 5, "baz"]), Mode::Full).expect("evaluate");
    assert!(!result.success);

    let fast = evaluate(&program, &json!(["foo", 5, "baz"]), Mode::Fast).expect("evaluate");
    assert!(!fast.success);
    // The first element's check, the failing second check, and the loop's
    // own post event; the third element is never visited
    assert_eq!(fast.trace.len(), 3);

    assert_eq!(fast.trace[0].instruction, "assertion");
    assert_eq!(fast.trace[0].outcome, Some(Outcome::Success));
    assert_eq!(
        fast.trace[0].instance_pointer,
        Pointer::parse("/0").expect("pointer")
    );
    assert_eq!(fast.trace[1].outcome, Some(Outcome::Failure));
    assert_eq!(fast.trace[2].instruction, "loop-items");
    assert_eq!(fast.trace[2].outcome, Some(Outcome::Failure));
}

#[test]
fn self_recursive_schemas_terminate() {
    let schema = json!({
        "$schema": DIALECT_2019_09,
        "$recursiveRef": "#",
        "$recursiveAnchor": true
    });
    let program = compile_schema(&schema, &EmptyResolver, None).expect("compile");

    for instance in [
        json!(null),
        json!([1, [2, [3, [4]]]]),
        json!({"a": {"b": {"c": {}}}}),
    ] {
        let result = evaluate(&program, &instance, Mode::Fast).expect("evaluate");
        assert!(result.success);
    }
}

#[test]
fn recursive_anchors_extend_through_the_dynamic_scope() {
    // A tree whose leaves must be strings, expressed with 2019-09 recursion
    let schema = json!({
        "$schema": DIALECT_2019_09,
        "$id": "https://example.com/tree",
        "$recursiveAnchor": true,
        "anyOf": [
            {"type": "string"},
            {
                "type": "array",
                "items": {"$recursiveRef": "#"}
            }
        ]
    });
    let program = compile_schema(&schema, &EmptyResolver, None).expect("compile");

    assert!(evaluate(&program, &json!(["a", ["b", ["c"]]]), Mode::Fast)
        .expect("evaluate")
        .success);
    assert!(!evaluate(&program, &json!(["a", [5]]), Mode::Fast)
        .expect("evaluate")
        .success);
}

#[test]
fn conditionals_trace_their_own_verdict() {
    let program = compile(&json!({"if": {"type": "string"}, "then": {"minLength": 2}}));
    let result = evaluate(&program, &json!("a"), Mode::Full).expect("evaluate");
    assert!(!result.success);

    // The test passed even though the selected branch failed; its verdict
    // appears as an assertion-shaped event at the conditional's position
    let condition_pointer = Pointer::parse("/if").expect("pointer");
    let test_verdict = result
        .trace
        .iter()
        .find(|event| {
            event.phase == TracePhase::Post
                && event.instruction == "assertion"
                && event.schema_pointer == condition_pointer
        })
        .expect("test verdict event");
    assert_eq!(test_verdict.outcome, Some(Outcome::Success));

    let condition_post = result
        .trace
        .iter()
        .find(|event| {
            event.phase == TracePhase::Post && event.instruction == "logical-condition"
        })
        .expect("condition post event");
    assert_eq!(condition_post.outcome, Some(Outcome::Failure));

    // A boolean test compiles to an empty program but is still recorded,
    // in fast mode too
    let program = compile(&json!({"if": true, "then": {"type": "string"}}));
    let fast = evaluate(&program, &json!(5), Mode::Fast).expect("evaluate");
    assert!(!fast.success);
    assert!(fast.trace.iter().any(|event| {
        event.instruction == "assertion"
            && event.schema_pointer == condition_pointer
            && event.outcome == Some(Outcome::Success)
    }));
}

#[test]
fn pattern_loops_report_each_property_once() {
    let program = compile(&json!({
        "patternProperties": {
            "^a": {"type": "string"},
            "a$": {"type": "string"}
        }
    }));
    let result = evaluate(&program, &json!({"a": "x"}), Mode::Full).expect("evaluate");
    assert!(result.success);

    // "a" matches both patterns but the annotation names it once
    let tail = result.trace.last().expect("tail");
    assert_eq!(tail.instruction, "annotation");
    assert_eq!(tail.annotation, Some(json!(["a"])));
}

#[test]
fn dynamic_fallback_is_stable_under_unrelated_edits() {
    let schema_with = |unrelated: Value| {
        json!({
            "$schema": DIALECT_2020_12,
            "$id": "https://example.com/root",
            "$defs": {
                "text": {"$dynamicAnchor": "leaf", "type": "string"},
                "unrelated": unrelated
            },
            "properties": {"value": {"$dynamicRef": "#leaf"}}
        })
    };

    for unrelated in [json!({"const": 1}), json!({"enum": ["changed", "sibling"]})] {
        let program = compile(&schema_with(unrelated));
        assert!(validate_instance(&program, &json!({"value": "hi"})));
        assert!(!validate_instance(&program, &json!({"value": 5})));
    }
}

#[test]
fn trace_events_serialize_with_stable_field_names() {
    let program = compile(&json!({"items": {"type": "string"}}));
    let result = evaluate(&program, &json!(["foo"]), Mode::Full).expect("evaluate");

    let first = serde_json::to_value(&result.trace[0]).expect("serialize");
    assert_eq!(first["phase"], json!("pre"));
    assert_eq!(first["instruction-kind"], json!("loop-items"));
    assert_eq!(first["schema-pointer"], json!("/items"));
    assert!(first.get("evaluate-path").is_some());
    assert!(first.get("instance-relative-pointer").is_some());
    assert!(first.get("outcome").is_none());

    let last = serde_json::to_value(result.trace.last().expect("tail")).expect("serialize");
    assert_eq!(last["outcome"], json!("success"));
    assert_eq!(last["emitted-value"], json!(true));
}

#[test]
fn verdicts_agree_between_modes_across_keyword_families() {
    let cases = [
        (
            json!({"allOf": [{"minimum": 0}, {"maximum": 10}]}),
            vec![json!(5), json!(-1), json!(11), json!("n/a")],
        ),
        (
            json!({"oneOf": [{"type": "string"}, {"minLength": 2}]}),
            vec![json!("a"), json!("ab"), json!(5)],
        ),
        (
            json!({"not": {"type": "null"}}),
            vec![json!(null), json!(0)],
        ),
        (
            json!({
                "if": {"properties": {"kind": {"const": "circle"}}},
                "then": {"required": ["radius"]},
                "else": {"required": ["width"]}
            }),
            vec![
                json!({"kind": "circle", "radius": 1}),
                json!({"kind": "circle"}),
                json!({"kind": "rect", "width": 2}),
                json!({"kind": "rect"}),
            ],
        ),
        (
            json!({"contains": {"type": "integer"}, "minContains": 2}),
            vec![json!([1, "a", 2]), json!([1]), json!(["a"])],
        ),
        (
            json!({
                "patternProperties": {"^x-": {"type": "string"}},
                "additionalProperties": {"type": "integer"}
            }),
            vec![
                json!({"x-name": "v", "count": 3}),
                json!({"x-name": 7}),
                json!({"count": "three"}),
            ],
        ),
        (
            json!({"propertyNames": {"maxLength": 3}}),
            vec![json!({"ab": 1}), json!({"abcd": 1})],
        ),
        (
            json!({"prefixItems": [{"type": "string"}], "items": {"type": "integer"}}),
            vec![json!(["id", 1, 2]), json!(["id", "no"]), json!([0])],
        ),
        (
            json!({"dependentRequired": {"credit": ["billing"]}}),
            vec![
                json!({"credit": true, "billing": {}}),
                json!({"credit": true}),
                json!({"cash": true}),
            ],
        ),
        (
            json!({"uniqueItems": true}),
            vec![json!([1, 2, 3]), json!([1, 2, 1])],
        ),
    ];

    for (schema, instances) in &cases {
        let program = compile(schema);
        for instance in instances {
            let fast = evaluate(&program, instance, Mode::Fast).expect("fast");
            let full = evaluate(&program, instance, Mode::Full).expect("full");
            assert_eq!(
                fast.success, full.success,
                "verdict diverged for {schema} on {instance}"
            );
        }
    }
}

fn validate_instance(program: &Program, instance: &Value) -> bool {
    evaluate(program, instance, Mode::Fast)
        .expect("evaluate")
        .success
}

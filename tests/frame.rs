use jsonvet::dialect::{DIALECT_2020_12, DIALECT_DRAFT_7};
use jsonvet::{
    classify, EmptyResolver, Frame, FrameMode, InMemoryResolver, JsonVetError, LocationType,
    Pointer, ReferenceKind,
};
use serde_json::{json, Value};

fn frame(schema: &Value) -> Frame {
    Frame::build(
        schema,
        classify,
        &EmptyResolver,
        FrameMode::References,
        None,
        None,
    )
    .expect("frame")
}

#[test]
fn registers_resources_and_subschemas() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/schema",
        "properties": {"foo": {"type": "string"}}
    });

    let frame = frame(&schema);

    let root = frame
        .location(ReferenceKind::Static, "https://example.com/schema")
        .expect("root resource");
    assert_eq!(root.location_type, LocationType::Resource);
    assert!(root.pointer.is_empty());

    let foo = frame
        .location(
            ReferenceKind::Static,
            "https://example.com/schema#/properties/foo",
        )
        .expect("nested subschema");
    assert_eq!(foo.location_type, LocationType::Subschema);
    assert_eq!(foo.base, "https://example.com/schema");
    assert_eq!(foo.pointer, Pointer::parse("/properties/foo").expect("pointer"));
}

#[test]
fn anonymous_documents_use_fragment_keys() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "properties": {"foo": {"type": "string"}}
    });

    let frame = frame(&schema);
    assert!(frame.defines(""));
    assert!(frame.defines("#/properties/foo"));
}

#[test]
fn ref_to_root_resolves_to_the_empty_pointer() {
    // The round trip must hold regardless of dialect and identifier
    let cases = [
        json!({"$schema": DIALECT_2020_12, "$ref": "#"}),
        json!({"$schema": DIALECT_2020_12, "$id": "https://example.com/s", "$ref": "#"}),
        json!({"$schema": DIALECT_DRAFT_7, "$ref": "#"}),
    ];

    for schema in &cases {
        let frame = frame(schema);
        let reference = frame
            .reference_at(
                ReferenceKind::Static,
                &Pointer::parse("/$ref").expect("pointer"),
            )
            .expect("reference");
        let destination = frame
            .location(ReferenceKind::Static, &reference.destination)
            .expect("destination");
        assert!(destination.pointer.is_empty());
    }
}

#[test]
fn sibling_anchors_with_the_same_name_are_fatal() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/s",
        "$defs": {
            "a": {"$anchor": "foo"},
            "b": {"$anchor": "foo"}
        }
    });

    let result = Frame::build(
        &schema,
        classify,
        &EmptyResolver,
        FrameMode::References,
        None,
        None,
    );
    assert!(matches!(
        result,
        Err(JsonVetError::AmbiguousAnchor { anchor, .. }) if anchor == "foo"
    ));
}

#[test]
fn duplicate_resource_identifiers_are_fatal() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/s",
        "$defs": {
            "a": {"$id": "https://example.com/duplicate"},
            "b": {"$id": "https://example.com/duplicate"}
        }
    });

    let result = Frame::build(
        &schema,
        classify,
        &EmptyResolver,
        FrameMode::References,
        None,
        None,
    );
    assert!(matches!(
        result,
        Err(JsonVetError::DuplicateResource { identifier, .. })
            if identifier == "https://example.com/duplicate"
    ));
}

#[test]
fn unreferenced_definitions_are_orphans() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/s",
        "properties": {"p": {"type": "string"}},
        "$defs": {"unused": {"type": "number"}}
    });

    let frame = frame(&schema);
    let unused = frame
        .location(ReferenceKind::Static, "https://example.com/s#/$defs/unused")
        .expect("definition");
    assert!(unused.orphan);

    let used = frame
        .location(
            ReferenceKind::Static,
            "https://example.com/s#/properties/p",
        )
        .expect("property subschema");
    assert!(!used.orphan);
}

#[test]
fn referenced_definitions_are_not_orphans() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/s",
        "$ref": "#/$defs/used",
        "$defs": {"used": {"type": "number"}}
    });

    let frame = frame(&schema);
    let used = frame
        .location(ReferenceKind::Static, "https://example.com/s#/$defs/used")
        .expect("definition");
    assert!(!used.orphan);

    let destination = frame
        .reference_at(
            ReferenceKind::Static,
            &Pointer::parse("/$ref").expect("pointer"),
        )
        .expect("reference");
    assert_eq!(
        destination.destination,
        "https://example.com/s#/$defs/used"
    );
}

#[test]
fn external_documents_are_fetched_through_the_resolver() {
    let mut resolver = InMemoryResolver::new();
    resolver.insert(
        "https://example.com/string",
        json!({
            "$schema": DIALECT_2020_12,
            "$id": "https://example.com/string",
            "type": "string"
        }),
    );

    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$ref": "https://example.com/string"
    });

    let frame = Frame::build(
        &schema,
        classify,
        &resolver,
        FrameMode::References,
        None,
        None,
    )
    .expect("frame");

    assert!(frame.defines("https://example.com/string"));
    assert_eq!(frame.external_documents().count(), 1);
}

#[test]
fn missing_external_documents_are_resolution_errors() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$ref": "https://missing.example.com/schema"
    });

    let result = Frame::build(
        &schema,
        classify,
        &EmptyResolver,
        FrameMode::References,
        None,
        None,
    );
    assert!(matches!(
        result,
        Err(JsonVetError::Resolution { identifier, .. })
            if identifier == "https://missing.example.com/schema"
    ));
}

#[test]
fn recursive_ref_values_other_than_the_root_are_fatal() {
    let schema = json!({
        "$schema": "https://json-schema.org/draft/2019-09/schema",
        "$recursiveRef": "#/definitions/a"
    });

    let result = Frame::build(
        &schema,
        classify,
        &EmptyResolver,
        FrameMode::References,
        None,
        None,
    );
    assert!(matches!(
        result,
        Err(JsonVetError::InvalidKeywordValue { keyword, .. }) if keyword == "$recursiveRef"
    ));
}

#[test]
fn framing_is_deterministic() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "$id": "https://example.com/tree",
        "$dynamicAnchor": "node",
        "type": "object",
        "properties": {
            "value": {"type": "string"},
            "children": {"items": {"$dynamicRef": "#node"}}
        },
        "$defs": {"leaf": {"$anchor": "leaf", "type": "null"}}
    });

    let first = frame(&schema);
    let second = frame(&schema);
    assert_eq!(first.locations(), second.locations());
    assert_eq!(first.references(), second.references());
}

#[test]
fn locations_mode_records_every_keyword_position() {
    let schema = json!({
        "$schema": DIALECT_2020_12,
        "type": "object",
        "properties": {"p": {"type": "string"}}
    });

    let full = Frame::build(
        &schema,
        classify,
        &EmptyResolver,
        FrameMode::Locations,
        None,
        None,
    )
    .expect("frame");

    // Root, three root keywords, the nested subschema and its keyword
    assert_eq!(full.locations().len(), 6);
    for key in ["", "#/$schema", "#/type", "#/properties", "#/properties/p", "#/properties/p/type"]
    {
        assert!(full.defines(key), "missing location {key}");
    }

    let references_only = frame(&schema);
    assert_eq!(references_only.locations().len(), 2);
}

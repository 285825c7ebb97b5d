//! The built-in per-keyword instruction builders. Each builder receives the
//! keyword's schema context and emits at most one instruction; sibling
//! ordering has already been decided by walker priority.

use regex::Regex;
use serde_json::Value;

use super::{
    Assertion, Compilation, CompilerTable, PatternProgram, SchemaContext, Step, StepCommon,
};
use crate::error::{JsonVetError, JsonVetResult};
use crate::frame::ReferenceKind;
use crate::pointer::Pointer;
use crate::walker::InstanceType;

pub(super) fn standard_table() -> CompilerTable {
    CompilerTable::new()
        .with_compiler("type", compile_type)
        .with_compiler("enum", compile_enum)
        .with_compiler("const", compile_const)
        .with_compiler("minimum", compile_minimum)
        .with_compiler("maximum", compile_maximum)
        .with_compiler("exclusiveMinimum", compile_exclusive_minimum)
        .with_compiler("exclusiveMaximum", compile_exclusive_maximum)
        .with_compiler("multipleOf", compile_multiple_of)
        .with_compiler("minLength", compile_min_length)
        .with_compiler("maxLength", compile_max_length)
        .with_compiler("pattern", compile_pattern)
        .with_compiler("required", compile_required)
        .with_compiler("minProperties", compile_min_properties)
        .with_compiler("maxProperties", compile_max_properties)
        .with_compiler("minItems", compile_min_items)
        .with_compiler("maxItems", compile_max_items)
        .with_compiler("uniqueItems", compile_unique_items)
        .with_compiler("dependentRequired", compile_dependent_required)
        .with_compiler("properties", compile_properties)
        .with_compiler("patternProperties", compile_pattern_properties)
        .with_compiler("additionalProperties", compile_additional_properties)
        .with_compiler("propertyNames", compile_property_names)
        .with_compiler("items", compile_items)
        .with_compiler("prefixItems", compile_prefix_items)
        .with_compiler("additionalItems", compile_additional_items)
        .with_compiler("contains", compile_contains)
        .with_compiler("allOf", compile_all_of)
        .with_compiler("anyOf", compile_any_of)
        .with_compiler("oneOf", compile_one_of)
        .with_compiler("not", compile_not)
        .with_compiler("if", compile_if)
        .with_compiler("dependentSchemas", compile_dependent_schemas)
        .with_compiler("dependencies", compile_dependencies)
        .with_compiler("$ref", compile_static_reference)
        .with_compiler("$dynamicRef", compile_dynamic_reference)
        .with_compiler("$recursiveRef", compile_recursive_reference)
        .with_compiler("title", compile_plain_annotation)
        .with_compiler("description", compile_plain_annotation)
        .with_compiler("default", compile_plain_annotation)
        .with_compiler("examples", compile_plain_annotation)
        .with_compiler("deprecated", compile_plain_annotation)
        .with_compiler("readOnly", compile_plain_annotation)
        .with_compiler("writeOnly", compile_plain_annotation)
        .with_compiler("format", compile_plain_annotation)
}

fn common(ctx: &SchemaContext) -> StepCommon {
    StepCommon {
        keyword: ctx.keyword.to_string(),
        schema_pointer: ctx.keyword_pointer(),
        base: ctx.base.clone(),
        instance_suffix: Pointer::new(),
    }
}

fn invalid(ctx: &SchemaContext) -> JsonVetError {
    JsonVetError::InvalidKeywordValue {
        keyword: ctx.keyword.to_string(),
        pointer: ctx.keyword_pointer(),
        value: ctx.value.clone(),
    }
}

fn assertion(ctx: &SchemaContext, assertion: Assertion) -> JsonVetResult<Option<Step>> {
    Ok(Some(Step::Assertion {
        common: common(ctx),
        assertion,
    }))
}

fn parse_type(name: &str) -> Option<InstanceType> {
    match name {
        "null" => Some(InstanceType::Null),
        "boolean" => Some(InstanceType::Boolean),
        "object" => Some(InstanceType::Object),
        "array" => Some(InstanceType::Array),
        "string" => Some(InstanceType::String),
        "number" => Some(InstanceType::Number),
        "integer" => Some(InstanceType::Integer),
        _ => None,
    }
}

fn unsigned(ctx: &SchemaContext) -> JsonVetResult<usize> {
    ctx.value
        .as_u64()
        .map(|bound| bound as usize)
        .ok_or_else(|| invalid(ctx))
}

fn number(ctx: &SchemaContext) -> JsonVetResult<f64> {
    ctx.value.as_f64().ok_or_else(|| invalid(ctx))
}

fn compile_type(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let types = match ctx.value {
        Value::String(name) => vec![parse_type(name).ok_or_else(|| invalid(ctx))?],
        Value::Array(names) => {
            let mut types = Vec::with_capacity(names.len());
            for name in names {
                let Value::String(name) = name else {
                    return Err(invalid(ctx));
                };
                types.push(parse_type(name).ok_or_else(|| invalid(ctx))?);
            }
            types
        }
        _ => return Err(invalid(ctx)),
    };

    assertion(ctx, Assertion::Type(types))
}

fn compile_enum(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let Value::Array(choices) = ctx.value else {
        return Err(invalid(ctx));
    };

    assertion(ctx, Assertion::Enum(choices.clone()))
}

fn compile_const(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    assertion(ctx, Assertion::Const(ctx.value.clone()))
}

/// Draft-4 spells exclusive bounds as boolean modifiers on
/// `minimum`/`maximum`; the bound compilers absorb them.
fn exclusive_flag(ctx: &SchemaContext, modifier: &str) -> bool {
    matches!(
        ctx.subschema.get(modifier),
        Some(Value::Bool(true))
    )
}

fn compile_minimum(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = number(ctx)?;
    if exclusive_flag(ctx, "exclusiveMinimum") {
        assertion(ctx, Assertion::Greater(bound))
    } else {
        assertion(ctx, Assertion::GreaterEqual(bound))
    }
}

fn compile_maximum(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = number(ctx)?;
    if exclusive_flag(ctx, "exclusiveMaximum") {
        assertion(ctx, Assertion::Less(bound))
    } else {
        assertion(ctx, Assertion::LessEqual(bound))
    }
}

fn compile_exclusive_minimum(
    _: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    if ctx.value.is_boolean() {
        return Ok(None);
    }

    assertion(ctx, Assertion::Greater(number(ctx)?))
}

fn compile_exclusive_maximum(
    _: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    if ctx.value.is_boolean() {
        return Ok(None);
    }

    assertion(ctx, Assertion::Less(number(ctx)?))
}

fn compile_multiple_of(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let divisor = number(ctx)?;
    if divisor <= 0.0 {
        return Err(invalid(ctx));
    }

    assertion(ctx, Assertion::MultipleOf(divisor))
}

fn compile_min_length(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = unsigned(ctx)?;
    assertion(ctx, Assertion::MinLength(bound))
}

fn compile_max_length(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = unsigned(ctx)?;
    assertion(ctx, Assertion::MaxLength(bound))
}

fn compile_pattern(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let Value::String(pattern) = ctx.value else {
        return Err(invalid(ctx));
    };
    let regex = Regex::new(pattern).map_err(|_| JsonVetError::InvalidPattern {
        pattern: pattern.clone(),
        pointer: ctx.keyword_pointer(),
    })?;

    assertion(ctx, Assertion::Pattern(pattern.clone(), regex))
}

fn compile_required(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let Value::Array(names) = ctx.value else {
        return Err(invalid(ctx));
    };
    let mut required = Vec::with_capacity(names.len());
    for name in names {
        let Value::String(name) = name else {
            return Err(invalid(ctx));
        };
        required.push(name.clone());
    }

    assertion(ctx, Assertion::Required(required))
}

fn compile_min_properties(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = unsigned(ctx)?;
    assertion(ctx, Assertion::MinProperties(bound))
}

fn compile_max_properties(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = unsigned(ctx)?;
    assertion(ctx, Assertion::MaxProperties(bound))
}

fn compile_min_items(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = unsigned(ctx)?;
    assertion(ctx, Assertion::MinItems(bound))
}

fn compile_max_items(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    let bound = unsigned(ctx)?;
    assertion(ctx, Assertion::MaxItems(bound))
}

fn compile_unique_items(_: &mut Compilation, ctx: &SchemaContext) -> JsonVetResult<Option<Step>> {
    match ctx.value {
        Value::Bool(true) => assertion(ctx, Assertion::UniqueItems),
        Value::Bool(false) => Ok(None),
        _ => Err(invalid(ctx)),
    }
}

fn dependency_entries(ctx: &SchemaContext) -> JsonVetResult<Vec<(String, Vec<String>)>> {
    let Value::Object(members) = ctx.value else {
        return Err(invalid(ctx));
    };

    let mut entries = Vec::new();
    for (property, requirements) in members {
        let Value::Array(names) = requirements else {
            return Err(invalid(ctx));
        };
        let mut required = Vec::with_capacity(names.len());
        for name in names {
            let Value::String(name) = name else {
                return Err(invalid(ctx));
            };
            required.push(name.clone());
        }
        entries.push((property.clone(), required));
    }

    Ok(entries)
}

fn compile_dependent_required(
    _: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let entries = dependency_entries(ctx)?;
    assertion(ctx, Assertion::RequiredDependencies(entries))
}

fn compile_properties(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let Value::Object(members) = ctx.value else {
        return Err(invalid(ctx));
    };

    let mut entries = Vec::with_capacity(members.len());
    for name in members.keys() {
        let children =
            compilation.compile_child(ctx, ctx.keyword_pointer().join(name.as_str()))?;
        entries.push((name.clone(), children));
    }

    Ok(Some(Step::LoopProperties {
        common: common(ctx),
        entries,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_pattern_properties(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let Value::Object(members) = ctx.value else {
        return Err(invalid(ctx));
    };

    let mut patterns = Vec::with_capacity(members.len());
    for pattern in members.keys() {
        let regex = Regex::new(pattern).map_err(|_| JsonVetError::InvalidPattern {
            pattern: pattern.clone(),
            pointer: ctx.keyword_pointer(),
        })?;
        let children =
            compilation.compile_child(ctx, ctx.keyword_pointer().join(pattern.as_str()))?;
        patterns.push(PatternProgram {
            pattern: pattern.clone(),
            regex,
            children,
        });
    }

    Ok(Some(Step::LoopPropertiesRegex {
        common: common(ctx),
        patterns,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_additional_properties(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let names = match ctx.subschema.get("properties") {
        Some(Value::Object(members)) => members.keys().cloned().collect(),
        _ => Vec::new(),
    };
    let mut patterns = Vec::new();
    if let Some(Value::Object(members)) = ctx.subschema.get("patternProperties") {
        for pattern in members.keys() {
            let regex = Regex::new(pattern).map_err(|_| JsonVetError::InvalidPattern {
                pattern: pattern.clone(),
                pointer: ctx.pointer.join("patternProperties"),
            })?;
            patterns.push((pattern.clone(), regex));
        }
    }

    let children = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    Ok(Some(Step::LoopPropertiesRemaining {
        common: common(ctx),
        names,
        patterns,
        children,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_property_names(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let children = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    Ok(Some(Step::LoopKeys {
        common: common(ctx),
        children,
    }))
}

fn compile_items(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    // Array form is the positional legacy spelling; the schema form starts
    // after any sibling prefixItems
    if let Value::Array(elements) = ctx.value {
        let mut programs = Vec::with_capacity(elements.len());
        for index in 0..elements.len() {
            programs.push(compilation.compile_child(ctx, ctx.keyword_pointer().join(index))?);
        }
        return Ok(Some(Step::LoopItemsPrefix {
            common: common(ctx),
            programs,
            public_annotation: compilation.annotations_public(),
        }));
    }

    let start = match ctx.subschema.get("prefixItems") {
        Some(Value::Array(prefix)) => prefix.len(),
        _ => 0,
    };
    let children = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    Ok(Some(Step::LoopItems {
        common: common(ctx),
        start,
        children,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_prefix_items(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let Value::Array(elements) = ctx.value else {
        return Err(invalid(ctx));
    };

    let mut programs = Vec::with_capacity(elements.len());
    for index in 0..elements.len() {
        programs.push(compilation.compile_child(ctx, ctx.keyword_pointer().join(index))?);
    }

    Ok(Some(Step::LoopItemsPrefix {
        common: common(ctx),
        programs,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_additional_items(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    // Only meaningful after a positional sibling `items`
    let Some(Value::Array(prefix)) = ctx.subschema.get("items") else {
        return Ok(None);
    };

    let children = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    Ok(Some(Step::LoopItems {
        common: common(ctx),
        start: prefix.len(),
        children,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_contains(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let minimum = match ctx.subschema.get("minContains") {
        Some(value) => value.as_u64().ok_or_else(|| invalid(ctx))? as usize,
        None => 1,
    };
    let maximum = match ctx.subschema.get("maxContains") {
        Some(value) => Some(value.as_u64().ok_or_else(|| invalid(ctx))? as usize),
        None => None,
    };

    let children = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    Ok(Some(Step::LoopContains {
        common: common(ctx),
        minimum,
        maximum,
        children,
        public_annotation: compilation.annotations_public(),
    }))
}

fn compile_branches(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Vec<Vec<Step>>> {
    let Value::Array(elements) = ctx.value else {
        return Err(invalid(ctx));
    };
    // Combinator arrays must carry at least one schema
    if elements.is_empty() {
        return Err(invalid(ctx));
    }

    let mut branches = Vec::with_capacity(elements.len());
    for index in 0..elements.len() {
        branches.push(compilation.compile_child(ctx, ctx.keyword_pointer().join(index))?);
    }

    Ok(branches)
}

fn compile_all_of(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let branches = compile_branches(compilation, ctx)?;
    Ok(Some(Step::LogicalAnd {
        common: common(ctx),
        branches,
    }))
}

fn compile_any_of(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let branches = compile_branches(compilation, ctx)?;
    Ok(Some(Step::LogicalOr {
        common: common(ctx),
        branches,
    }))
}

fn compile_one_of(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let branches = compile_branches(compilation, ctx)?;
    Ok(Some(Step::LogicalXor {
        common: common(ctx),
        branches,
    }))
}

fn compile_not(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let children = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    Ok(Some(Step::LogicalNot {
        common: common(ctx),
        children,
    }))
}

fn compile_if(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let test = compilation.compile_child(ctx, ctx.keyword_pointer())?;
    let consequent = match ctx.subschema.get("then") {
        Some(_) => compilation.compile_child(ctx, ctx.pointer.join("then"))?,
        None => Vec::new(),
    };
    let alternative = match ctx.subschema.get("else") {
        Some(_) => compilation.compile_child(ctx, ctx.pointer.join("else"))?,
        None => Vec::new(),
    };

    Ok(Some(Step::LogicalCondition {
        common: common(ctx),
        test,
        consequent,
        alternative,
    }))
}

fn compile_dependent_schemas(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let Value::Object(members) = ctx.value else {
        return Err(invalid(ctx));
    };

    let mut entries = Vec::with_capacity(members.len());
    for name in members.keys() {
        let children =
            compilation.compile_child(ctx, ctx.keyword_pointer().join(name.as_str()))?;
        entries.push((name.clone(), children));
    }

    Ok(Some(Step::Dependent {
        common: common(ctx),
        entries,
    }))
}

/// Legacy `dependencies` mixes required-property arrays and schema values
/// in one object.
fn compile_dependencies(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let Value::Object(members) = ctx.value else {
        return Err(invalid(ctx));
    };

    let mut required = Vec::new();
    let mut schemas = Vec::new();
    for (name, value) in members {
        match value {
            Value::Array(names) => {
                let mut entries = Vec::with_capacity(names.len());
                for entry in names {
                    let Value::String(entry) = entry else {
                        return Err(invalid(ctx));
                    };
                    entries.push(entry.clone());
                }
                required.push((name.clone(), entries));
            }
            Value::Object(_) | Value::Bool(_) => {
                let children =
                    compilation.compile_child(ctx, ctx.keyword_pointer().join(name.as_str()))?;
                schemas.push((name.clone(), children));
            }
            _ => return Err(invalid(ctx)),
        }
    }

    let mut steps = Vec::new();
    if !required.is_empty() {
        steps.push(Step::Assertion {
            common: common(ctx),
            assertion: Assertion::RequiredDependencies(required),
        });
    }
    if !schemas.is_empty() {
        steps.push(Step::Dependent {
            common: common(ctx),
            entries: schemas,
        });
    }

    Ok(match steps.len() {
        0 => None,
        1 => steps.pop(),
        _ => Some(Step::ControlGroup {
            common: common(ctx),
            children: steps,
        }),
    })
}

fn compile_static_reference(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let origin = ctx.keyword_pointer();
    let Some(reference) = compilation
        .frame()
        .reference_at(ReferenceKind::Static, &origin)
    else {
        return Err(invalid(ctx));
    };
    let destination = reference.destination.clone();
    let id = compilation.reference_label(&destination, &origin)?;

    Ok(Some(Step::ControlJump {
        common: common(ctx),
        id,
    }))
}

fn compile_dynamic_reference(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let origin = ctx.keyword_pointer();
    let Some(reference) = compilation
        .frame()
        .reference_at(ReferenceKind::Dynamic, &origin)
    else {
        return Err(invalid(ctx));
    };
    let destination = reference.destination.clone();
    let fragment = reference.fragment.clone().unwrap_or_default();

    // Only a plain-name fragment naming an actual dynamic anchor somewhere
    // participates in dynamic resolution; anything else is a static jump
    let dynamic = !fragment.is_empty()
        && !fragment.starts_with('/')
        && compilation
            .frame()
            .dynamic_anchors()
            .any(|(name, _, _)| name == fragment);

    let id = compilation.reference_label(&destination, &origin)?;
    if dynamic {
        Ok(Some(Step::ControlDynamicJump {
            common: common(ctx),
            anchor: fragment,
            fallback: id,
        }))
    } else {
        Ok(Some(Step::ControlJump {
            common: common(ctx),
            id,
        }))
    }
}

fn compile_recursive_reference(
    compilation: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    let origin = ctx.keyword_pointer();
    let Some(reference) = compilation
        .frame()
        .reference_at(ReferenceKind::Dynamic, &origin)
    else {
        return Err(invalid(ctx));
    };
    let destination = reference.destination.clone();
    let fallback = compilation.reference_label(&destination, &origin)?;

    Ok(Some(Step::ControlDynamicJump {
        common: common(ctx),
        anchor: String::new(),
        fallback,
    }))
}

fn compile_plain_annotation(
    _: &mut Compilation,
    ctx: &SchemaContext,
) -> JsonVetResult<Option<Step>> {
    Ok(Some(Step::Annotation {
        common: common(ctx),
        value: ctx.value.clone(),
        public: true,
    }))
}

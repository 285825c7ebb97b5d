//! Schema compilation: turns a framed schema into an immutable instruction
//! program that the evaluator can run any number of times.
//!
//! Programs are arenas of labeled sub-programs rather than inlined trees, so
//! a reference can point back into an enclosing or sibling sub-program
//! without infinite expansion. Compilation is memoized per destination URI.

mod keywords;

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::dialect::{self, Vocabularies};
use crate::error::{JsonVetError, JsonVetResult};
use crate::frame::{Frame, FrameMode, ReferenceKind};
use crate::pointer::Pointer;
use crate::resolver::SchemaResolver;
use crate::walker::{priority, InstanceType, KeywordCategory, SchemaWalker};

/// Bookkeeping every instruction carries for tracing: the originating
/// keyword, its schema pointer, and the base URI it evaluates under.
#[derive(Clone, Debug)]
pub struct StepCommon {
    pub keyword: String,
    pub schema_pointer: Pointer,
    /// The resource base URI active where the instruction was compiled
    pub base: String,
    /// Relative instance pointer template; empty when the instruction runs
    /// at its parent's instance location
    pub instance_suffix: Pointer,
}

/// A compiled per-pattern child program.
#[derive(Clone, Debug)]
pub struct PatternProgram {
    pub pattern: String,
    pub regex: Regex,
    pub children: Vec<Step>,
}

/// Leaf checks against the instance. Each assertion is gated on the
/// instance types it is meaningful for and passes vacuously elsewhere.
#[derive(Clone, Debug)]
pub enum Assertion {
    /// The `false` schema
    Fail,
    Type(Vec<InstanceType>),
    Enum(Vec<Value>),
    Const(Value),
    Greater(f64),
    GreaterEqual(f64),
    Less(f64),
    LessEqual(f64),
    MultipleOf(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(String, Regex),
    Required(Vec<String>),
    MinProperties(usize),
    MaxProperties(usize),
    MinItems(usize),
    MaxItems(usize),
    UniqueItems,
    /// Property presence implies further required properties
    RequiredDependencies(Vec<(String, Vec<String>)>),
}

/// One compiled instruction.
#[derive(Clone, Debug)]
pub enum Step {
    Assertion {
        common: StepCommon,
        assertion: Assertion,
    },
    /// Emits a side value; `public` annotations stay visible in fast mode
    Annotation {
        common: StepCommon,
        value: Value,
        public: bool,
    },
    /// A sub-schema compiled inline: all children must pass
    ControlGroup {
        common: StepCommon,
        children: Vec<Step>,
    },
    /// A sub-schema that introduces its own resource base; the evaluator
    /// pushes the base onto the dynamic scope stack around the children
    ControlResource {
        common: StepCommon,
        base: String,
        children: Vec<Step>,
    },
    /// Statically resolved jump into a labeled sub-program
    ControlJump {
        common: StepCommon,
        id: u64,
    },
    /// Jump resolved against the live dynamic scope chain, outermost frame
    /// first, falling back to the statically nearest candidate
    ControlDynamicJump {
        common: StepCommon,
        anchor: String,
        fallback: u64,
    },
    LogicalAnd {
        common: StepCommon,
        branches: Vec<Vec<Step>>,
    },
    LogicalOr {
        common: StepCommon,
        branches: Vec<Vec<Step>>,
    },
    LogicalXor {
        common: StepCommon,
        branches: Vec<Vec<Step>>,
    },
    LogicalNot {
        common: StepCommon,
        children: Vec<Step>,
    },
    /// `if`/`then`/`else`: the test always runs and is always traced, but
    /// only gates which branch counts
    LogicalCondition {
        common: StepCommon,
        test: Vec<Step>,
        consequent: Vec<Step>,
        alternative: Vec<Step>,
    },
    LoopProperties {
        common: StepCommon,
        entries: Vec<(String, Vec<Step>)>,
        public_annotation: bool,
    },
    LoopPropertiesRegex {
        common: StepCommon,
        patterns: Vec<PatternProgram>,
        public_annotation: bool,
    },
    /// `additionalProperties`: runs on properties not claimed by sibling
    /// `properties` names or `patternProperties` patterns
    LoopPropertiesRemaining {
        common: StepCommon,
        names: Vec<String>,
        patterns: Vec<(String, Regex)>,
        children: Vec<Step>,
        public_annotation: bool,
    },
    /// `propertyNames`: child program runs against each key as a string
    LoopKeys {
        common: StepCommon,
        children: Vec<Step>,
    },
    /// Uniform item applicator starting at a fixed index
    LoopItems {
        common: StepCommon,
        start: usize,
        children: Vec<Step>,
        public_annotation: bool,
    },
    /// Positional item applicators (`prefixItems`, legacy array `items`)
    LoopItemsPrefix {
        common: StepCommon,
        programs: Vec<Vec<Step>>,
        public_annotation: bool,
    },
    LoopContains {
        common: StepCommon,
        minimum: usize,
        maximum: Option<usize>,
        children: Vec<Step>,
        public_annotation: bool,
    },
    /// `dependentSchemas` and the schema form of legacy `dependencies`
    Dependent {
        common: StepCommon,
        entries: Vec<(String, Vec<Step>)>,
    },
}

impl Step {
    pub fn common(&self) -> &StepCommon {
        match self {
            Step::Assertion { common, .. }
            | Step::Annotation { common, .. }
            | Step::ControlGroup { common, .. }
            | Step::ControlResource { common, .. }
            | Step::ControlJump { common, .. }
            | Step::ControlDynamicJump { common, .. }
            | Step::LogicalAnd { common, .. }
            | Step::LogicalOr { common, .. }
            | Step::LogicalXor { common, .. }
            | Step::LogicalNot { common, .. }
            | Step::LogicalCondition { common, .. }
            | Step::LoopProperties { common, .. }
            | Step::LoopPropertiesRegex { common, .. }
            | Step::LoopPropertiesRemaining { common, .. }
            | Step::LoopKeys { common, .. }
            | Step::LoopItems { common, .. }
            | Step::LoopItemsPrefix { common, .. }
            | Step::LoopContains { common, .. }
            | Step::Dependent { common, .. } => common,
        }
    }

    /// Stable instruction-kind name used in trace events.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Assertion { .. } => "assertion",
            Step::Annotation { .. } => "annotation",
            Step::ControlGroup { .. } => "control-group",
            Step::ControlResource { .. } => "control-resource",
            Step::ControlJump { .. } => "control-jump",
            Step::ControlDynamicJump { .. } => "control-dynamic-jump",
            Step::LogicalAnd { .. } => "logical-and",
            Step::LogicalOr { .. } => "logical-or",
            Step::LogicalXor { .. } => "logical-xor",
            Step::LogicalNot { .. } => "logical-not",
            Step::LogicalCondition { .. } => "logical-condition",
            Step::LoopProperties { .. } => "loop-properties",
            Step::LoopPropertiesRegex { .. } => "loop-properties-regex",
            Step::LoopPropertiesRemaining { .. } => "loop-properties-remaining",
            Step::LoopKeys { .. } => "loop-keys",
            Step::LoopItems { .. } => "loop-items",
            Step::LoopItemsPrefix { .. } => "loop-items-prefix",
            Step::LoopContains { .. } => "loop-contains",
            Step::Dependent { .. } => "dependent",
        }
    }
}

/// A labeled arena entry: the compiled program for one reference
/// destination, plus the resource base the evaluator enters when jumping
/// into it.
#[derive(Clone, Debug)]
pub struct Subprogram {
    pub base: String,
    pub steps: Vec<Step>,
}

/// A compiled, immutable, re-executable validation program.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub steps: Vec<Step>,
    /// The root document's resource base (empty for anonymous documents)
    pub base: String,
    subprograms: BTreeMap<u64, Subprogram>,
    /// (resource URI, anchor name) to jump label, for dynamic resolution
    dynamic_labels: BTreeMap<(String, String), u64>,
}

impl Program {
    pub fn subprogram(&self, id: u64) -> Option<&Subprogram> {
        self.subprograms.get(&id)
    }

    /// The jump label a dynamic anchor resolves to within a given resource,
    /// if that resource declares one.
    pub fn dynamic_label(&self, resource: &str, anchor: &str) -> Option<u64> {
        self.dynamic_labels
            .get(&(resource.to_string(), anchor.to_string()))
            .copied()
    }

    pub fn subprogram_count(&self) -> usize {
        self.subprograms.len()
    }
}

/// Everything a per-keyword compiler sees about the keyword it compiles.
pub struct SchemaContext<'a> {
    pub keyword: &'a str,
    /// The keyword's value
    pub value: &'a Value,
    /// The enclosing schema object, for sibling-sensitive keywords
    pub subschema: &'a Value,
    /// Schema pointer of the enclosing sub-schema
    pub pointer: Pointer,
    /// Document key: `None` for the caller's document, `Some` for fetched
    /// external resources
    pub document: Option<String>,
    pub base: String,
    pub dialect: String,
    pub base_dialect: String,
    pub vocabularies: Vocabularies,
}

impl SchemaContext<'_> {
    /// Schema pointer of the keyword itself.
    pub fn keyword_pointer(&self) -> Pointer {
        self.pointer.join(self.keyword)
    }
}

/// A per-keyword instruction builder. Returning `None` emits nothing while
/// the keyword stays framed.
pub type KeywordCompiler =
    fn(&mut Compilation, &SchemaContext) -> JsonVetResult<Option<Step>>;

/// The pluggable keyword-compiler table. Keywords without an entry emit no
/// instructions.
#[derive(Clone, Default)]
pub struct CompilerTable {
    entries: BTreeMap<&'static str, KeywordCompiler>,
}

impl CompilerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table covering the common assertion, applicator,
    /// reference and annotation keywords.
    pub fn standard() -> Self {
        keywords::standard_table()
    }

    pub fn with_compiler(mut self, keyword: &'static str, compiler: KeywordCompiler) -> Self {
        self.entries.insert(keyword, compiler);
        self
    }

    pub fn get(&self, keyword: &str) -> Option<KeywordCompiler> {
        self.entries.get(keyword).copied()
    }
}

/// Compile a schema document into a program, framing it internally.
pub fn compile(
    schema: &Value,
    walker: SchemaWalker,
    resolver: &dyn SchemaResolver,
    table: &CompilerTable,
    default_dialect: Option<&str>,
    default_id: Option<&str>,
) -> JsonVetResult<Program> {
    let frame = Frame::build(
        schema,
        walker,
        resolver,
        FrameMode::References,
        default_dialect,
        default_id,
    )?;
    compile_with_frame(schema, walker, resolver, &frame, table, default_dialect)
}

/// Compile against a pre-built frame. The frame must have been built from
/// the same document; the resolver is only consulted for custom meta-schema
/// vocabulary discovery.
pub fn compile_with_frame(
    schema: &Value,
    walker: SchemaWalker,
    resolver: &dyn SchemaResolver,
    frame: &Frame,
    table: &CompilerTable,
    default_dialect: Option<&str>,
) -> JsonVetResult<Program> {
    let Some(root_dialect) = dialect::dialect(schema, default_dialect) else {
        return Err(JsonVetError::UnknownDialect);
    };

    // The root resource URI, if the caller's document declares one
    let root_base = frame
        .locations()
        .iter()
        .find(|((kind, _), location)| {
            *kind == ReferenceKind::Static
                && location.pointer.is_empty()
                && location.location_type == crate::frame::LocationType::Resource
                && location
                    .root
                    .as_deref()
                    .is_some_and(|root| std::ptr::eq(frame.document(Some(root), schema), schema))
        })
        .map(|(_, location)| location.base.clone())
        .unwrap_or_default();

    let unevaluated_active = unevaluated_anywhere(schema)
        || frame
            .external_documents()
            .any(|(_, document)| unevaluated_anywhere(document));

    let mut compilation = Compilation {
        schema,
        walker,
        resolver,
        frame,
        table,
        unevaluated_active,
        subprograms: BTreeMap::new(),
        memo: BTreeMap::new(),
        dynamic_labels: BTreeMap::new(),
        next_label: 0,
        vocabulary_cache: BTreeMap::new(),
    };

    // Precompile jump labels for every non-orphan dynamic anchor so that
    // dynamic jumps resolve with a map lookup at evaluation time
    let anchors: Vec<(String, String, String)> = frame
        .dynamic_anchors()
        .filter(|(_, _, location)| !location.orphan)
        .map(|(name, uri, location)| (name.to_string(), uri.to_string(), location.base.clone()))
        .collect();
    for (name, uri, resource) in anchors {
        let label = compilation.reference_label(&uri, &Pointer::new())?;
        compilation.dynamic_labels.insert((resource, name), label);
    }

    let steps = compilation.compile_subschema(None, Pointer::new(), &root_base, &root_dialect)?;

    debug!(
        "compiled program: {} root steps, {} subprograms",
        steps.len(),
        compilation.subprograms.len()
    );

    Ok(Program {
        steps,
        base: root_base,
        subprograms: compilation.subprograms,
        dynamic_labels: compilation.dynamic_labels,
    })
}

/// In-flight compilation state, exposed to keyword compilers so they can
/// compile child schemas and resolve reference labels.
pub struct Compilation<'a> {
    schema: &'a Value,
    walker: SchemaWalker,
    resolver: &'a dyn SchemaResolver,
    frame: &'a Frame,
    table: &'a CompilerTable,
    unevaluated_active: bool,
    subprograms: BTreeMap<u64, Subprogram>,
    /// Destination URI to already-allocated label, for cyclic references
    memo: BTreeMap<String, u64>,
    dynamic_labels: BTreeMap<(String, String), u64>,
    next_label: u64,
    vocabulary_cache: BTreeMap<String, Vocabularies>,
}

impl<'a> Compilation<'a> {
    pub fn frame(&self) -> &Frame {
        self.frame
    }

    /// Whether any `unevaluatedItems`/`unevaluatedProperties` occurs in the
    /// document graph; loop annotation tails compile as public iff so.
    pub fn annotations_public(&self) -> bool {
        self.unevaluated_active
    }

    /// Compile the sub-schema at an absolute pointer within the context's
    /// document, inheriting its dialect and base.
    pub fn compile_child(
        &mut self,
        ctx: &SchemaContext,
        pointer: Pointer,
    ) -> JsonVetResult<Vec<Step>> {
        self.compile_subschema(ctx.document.clone(), pointer, &ctx.base, &ctx.dialect)
    }

    /// The label of the compiled program for a statically resolved
    /// destination URI, compiling it on first use. Labels are allocated
    /// before their bodies compile so that cyclic references terminate.
    pub fn reference_label(&mut self, destination: &str, origin: &Pointer) -> JsonVetResult<u64> {
        if let Some(label) = self.memo.get(destination) {
            return Ok(*label);
        }

        let Some(location) = self.frame.location(ReferenceKind::Static, destination) else {
            return Err(JsonVetError::UnresolvedReference {
                identifier: destination.to_string(),
                origin: origin.clone(),
            });
        };

        let label = self.next_label;
        self.next_label += 1;
        self.memo.insert(destination.to_string(), label);
        // Reserve the slot so that re-entrant compilation of a cycle sees
        // the label as taken
        self.subprograms.insert(
            label,
            Subprogram {
                base: location.base.clone(),
                steps: Vec::new(),
            },
        );

        let document = location
            .root
            .clone()
            .filter(|root| !std::ptr::eq(self.frame.document(Some(root), self.schema), self.schema));
        let pointer = location.pointer.clone();
        let base = location.base.clone();
        let dialect = location.dialect.clone();

        let steps = self.compile_subschema(document, pointer, &base, &dialect)?;
        if let Some(slot) = self.subprograms.get_mut(&label) {
            slot.steps = steps;
        }

        Ok(label)
    }

    fn vocabularies_for(&mut self, dialect_uri: &str) -> Vocabularies {
        if let Some(cached) = self.vocabulary_cache.get(dialect_uri) {
            return cached.clone();
        }

        // The frame already validated every dialect in play, so failures
        // here can only be the tolerated degrade-to-unknown cases
        let resolved = dialect::vocabularies(dialect_uri, self.resolver).unwrap_or_default();
        self.vocabulary_cache
            .insert(dialect_uri.to_string(), resolved.clone());
        resolved
    }

    /// Compile one sub-schema into its instruction sequence.
    fn compile_subschema(
        &mut self,
        document: Option<String>,
        pointer: Pointer,
        inherited_base: &str,
        inherited_dialect: &str,
    ) -> JsonVetResult<Vec<Step>> {
        let document_value = self.frame.document(document.as_deref(), self.schema);
        let Some(subschema) = pointer.resolve(document_value) else {
            return Ok(Vec::new());
        };

        match subschema {
            Value::Bool(true) => return Ok(Vec::new()),
            Value::Bool(false) => {
                return Ok(vec![Step::Assertion {
                    common: StepCommon {
                        keyword: String::new(),
                        schema_pointer: pointer,
                        base: inherited_base.to_string(),
                        instance_suffix: Pointer::new(),
                    },
                    assertion: Assertion::Fail,
                }]);
            }
            Value::Object(_) => {}
            _ => return Ok(Vec::new()),
        }

        let current_dialect = dialect::dialect(subschema, Some(inherited_dialect))
            .unwrap_or_else(|| inherited_dialect.to_string());
        let vocabularies = self.vocabularies_for(&current_dialect);
        // Pre-vocabulary dialects double as their own pseudo-vocabulary, so
        // membership identifies the base dialect without a resolver
        let base_dialect = [
            dialect::DIALECT_DRAFT_7,
            dialect::DIALECT_DRAFT_6,
            dialect::DIALECT_DRAFT_4,
            dialect::DIALECT_2020_12,
            dialect::DIALECT_2019_09,
        ]
        .iter()
        .find(|candidate| {
            vocabularies.contains(candidate)
                || (**candidate == dialect::DIALECT_2020_12
                    && vocabularies.contains(dialect::VOCAB_2020_12_CORE))
                || (**candidate == dialect::DIALECT_2019_09
                    && vocabularies.contains(dialect::VOCAB_2019_09_CORE))
        })
        .map(|candidate| candidate.to_string())
        .unwrap_or_else(|| current_dialect.clone());

        // A declared identifier switches the resource base for everything
        // below, including the dynamic scope at evaluation time
        let declared_base = self
            .frame
            .locations()
            .iter()
            .find(|((kind, _), location)| {
                *kind == ReferenceKind::Static
                    && location.pointer == pointer
                    && location.location_type == crate::frame::LocationType::Resource
                    && document_matches(self.frame, self.schema, &document, location)
            })
            .map(|(_, location)| location.base.clone());
        let base = declared_base
            .clone()
            .unwrap_or_else(|| inherited_base.to_string());

        let Value::Object(members) = subschema else {
            return Ok(Vec::new());
        };

        // Legacy dialects: a sibling $ref makes every other keyword inert
        let only_ref =
            dialect::ref_overrides_siblings(&base_dialect) && members.contains_key("$ref");

        let mut ordered: Vec<(&String, &Value)> = members
            .iter()
            .filter(|(keyword, _)| !only_ref || keyword.as_str() == "$ref")
            .collect();
        ordered.sort_by_key(|(keyword, _)| priority(keyword, &vocabularies, self.walker));

        let declared_types = declared_instance_types(members.get("type"));

        let mut steps = Vec::new();
        for (keyword, value) in ordered {
            let descriptor = (self.walker)(keyword, &vocabularies);

            // Statically unsatisfiable type gate: skip the keyword
            if let Some(declared) = &declared_types {
                if !descriptor.instances.is_empty()
                    && !descriptor
                        .instances
                        .iter()
                        .any(|candidate| types_intersect(*candidate, declared))
                {
                    continue;
                }
            }

            if matches!(
                descriptor.category,
                KeywordCategory::Comment
                    | KeywordCategory::Other
                    | KeywordCategory::Unknown
                    | KeywordCategory::LocationMembers
            ) {
                continue;
            }

            let Some(compiler) = self.table.get(keyword) else {
                continue;
            };

            let ctx = SchemaContext {
                keyword,
                value,
                subschema,
                pointer: pointer.clone(),
                document: document.clone(),
                base: base.clone(),
                dialect: current_dialect.clone(),
                base_dialect: base_dialect.clone(),
                vocabularies: vocabularies.clone(),
            };
            if let Some(step) = compiler(self, &ctx)? {
                steps.push(step);
            }
        }

        // Wrap in a resource marker when the base changed, so evaluation
        // maintains the dynamic scope chain
        if let Some(new_base) = declared_base {
            if new_base != inherited_base && !pointer.is_empty() {
                return Ok(vec![Step::ControlResource {
                    common: StepCommon {
                        keyword: String::new(),
                        schema_pointer: pointer,
                        base: new_base.clone(),
                        instance_suffix: Pointer::new(),
                    },
                    base: new_base,
                    children: steps,
                }]);
            }
        }

        Ok(steps)
    }
}

fn document_matches(
    frame: &Frame,
    schema: &Value,
    document: &Option<String>,
    location: &crate::frame::Location,
) -> bool {
    let location_document = location
        .root
        .clone()
        .filter(|root| !std::ptr::eq(frame.document(Some(root), schema), schema));
    location_document == *document
}

/// The set of instance types a schema's own `type` keyword statically
/// declares, when that is a string or an array of strings.
fn declared_instance_types(value: Option<&Value>) -> Option<BTreeSet<InstanceType>> {
    fn parse(name: &str) -> Option<InstanceType> {
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

    match value {
        Some(Value::String(name)) => parse(name).map(|only| BTreeSet::from([only])),
        Some(Value::Array(names)) => {
            let mut result = BTreeSet::new();
            for name in names {
                let Value::String(name) = name else {
                    return None;
                };
                result.insert(parse(name)?);
            }
            Some(result)
        }
        _ => None,
    }
}

fn types_intersect(candidate: InstanceType, declared: &BTreeSet<InstanceType>) -> bool {
    if declared.contains(&candidate) {
        return true;
    }

    // Integer instances are numbers, so either direction intersects
    match candidate {
        InstanceType::Number => declared.contains(&InstanceType::Integer),
        InstanceType::Integer => declared.contains(&InstanceType::Number),
        _ => false,
    }
}

/// Whether any object in the tree carries an `unevaluated*` member.
fn unevaluated_anywhere(value: &Value) -> bool {
    match value {
        Value::Object(members) => {
            members.contains_key("unevaluatedItems")
                || members.contains_key("unevaluatedProperties")
                || members.values().any(unevaluated_anywhere)
        }
        Value::Array(items) => items.iter().any(unevaluated_anywhere),
        _ => false,
    }
}

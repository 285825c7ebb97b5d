//! Jsonvet: a JSON Schema resolution and validation engine.
//!
//! This crate turns a schema document into a fully resolved map of every
//! identifiable location inside it (resources, sub-schemas, pointers,
//! anchors) and into an executable instruction program that can be run
//! repeatedly against arbitrary values while emitting an ordered trace of
//! assertions, annotations, and their outcomes.
//!
//! # Examples
//! ```
//! use jsonvet::{compile_schema, evaluate, EmptyResolver, Mode};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "$schema": "https://json-schema.org/draft/2020-12/schema",
//!     "items": {"type": "string"}
//! });
//!
//! let program = compile_schema(&schema, &EmptyResolver, None).expect("compile");
//! let outcome = evaluate(&program, &json!(["foo", "bar"]), Mode::Fast).expect("evaluate");
//! assert!(outcome.success);
//! ```

mod error;

pub mod compiler;
pub mod dialect;
pub mod evaluator;
pub mod frame;
pub mod pointer;
pub mod resolver;
pub mod trace;
pub mod uri;
pub mod walker;

pub use compiler::{
    compile, compile_with_frame, Assertion, CompilerTable, Program, Step, Subprogram,
};
pub use error::{JsonVetError, JsonVetResult};
pub use evaluator::{evaluate, Evaluation, Mode};
pub use frame::{Frame, FrameMode, Location, LocationType, Reference, ReferenceKind};
pub use pointer::{Pointer, Token};
pub use resolver::{
    resolver_from_callback, CallbackResolver, EmptyResolver, InMemoryResolver, SchemaResolver,
};
pub use trace::{Outcome, TraceEvent, TracePhase};
pub use walker::{classify, priority, InstanceType, KeywordCategory, KeywordDescriptor, SchemaWalker};

use serde_json::Value;

/// Compile a schema with the default keyword walker and compiler table.
pub fn compile_schema(
    schema: &Value,
    resolver: &dyn SchemaResolver,
    default_dialect: Option<&str>,
) -> JsonVetResult<Program> {
    compiler::compile(
        schema,
        walker::classify,
        resolver,
        &CompilerTable::standard(),
        default_dialect,
        None,
    )
}

/// Validate an instance against a compiled program, verdict only.
pub fn validate(program: &Program, instance: &Value) -> JsonVetResult<bool> {
    Ok(evaluator::evaluate(program, instance, Mode::Fast)?.success)
}

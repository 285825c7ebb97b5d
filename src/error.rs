use thiserror::Error;

use crate::pointer::Pointer;

/// Result alias used across the crate.
pub type JsonVetResult<T> = Result<T, JsonVetError>;

/// Error variants surfaced by the framing, compilation, and evaluation
/// machinery. Assertion failures are not errors; they are ordinary traced
/// outcomes.
#[derive(Debug, Error)]
pub enum JsonVetError {
    #[error("the schema is neither an object nor a boolean")]
    NotASchema,
    #[error("the schema declares no dialect and no default was given")]
    UnknownDialect,
    #[error("unknown base dialect: {0}")]
    UnknownBaseDialect(String),
    #[error("a meta-schema reference must be an absolute URI: {0}")]
    RelativeMetaschema(String),
    #[error("could not resolve schema resource {identifier} required from {origin}")]
    Resolution { identifier: String, origin: Pointer },
    #[error("the schema identifier at {0} is not a non-empty string")]
    InvalidIdentifier(Pointer),
    #[error("duplicate resource identifier {identifier} at {pointer}")]
    DuplicateResource { identifier: String, pointer: Pointer },
    #[error("ambiguous anchor {anchor} at {pointer}")]
    AmbiguousAnchor { anchor: String, pointer: Pointer },
    #[error("the value of {keyword} at {pointer} is invalid: {value}")]
    InvalidKeywordValue {
        keyword: String,
        pointer: Pointer,
        value: serde_json::Value,
    },
    #[error("static reference {identifier} at {origin} does not resolve to any known location")]
    UnresolvedReference { identifier: String, origin: Pointer },
    #[error("invalid regular expression {pattern} at {pointer}")]
    InvalidPattern { pattern: String, pointer: Pointer },
    #[error("invalid JSON pointer: {0}")]
    InvalidPointer(String),
    #[error("invalid URI: {0}")]
    InvalidUri(String),
    #[error("the evaluation path depth limit was reached, likely due to infinite recursion")]
    EvaluationDepthLimit,
}

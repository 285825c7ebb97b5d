use serde::Serialize;
use serde_json::Value;

use crate::pointer::Pointer;

/// Whether the event was emitted on entering or leaving an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TracePhase {
    Pre,
    Post,
}

/// Post-event verdicts. An assertion failure is a normal traced outcome,
/// never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl From<bool> for Outcome {
    fn from(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// One ordered entry of an evaluation trace. The serialized field names are
/// part of the tooling contract.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceEvent {
    pub phase: TracePhase,
    #[serde(rename = "instruction-kind")]
    pub instruction: &'static str,
    #[serde(rename = "schema-pointer")]
    pub schema_pointer: Pointer,
    /// Resource URI plus fragment of the schema position being evaluated
    #[serde(rename = "evaluate-path")]
    pub evaluate_path: String,
    #[serde(rename = "instance-relative-pointer")]
    pub instance_pointer: Pointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Present on annotation post-events only
    #[serde(rename = "emitted-value", skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Value>,
    /// Present in full mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

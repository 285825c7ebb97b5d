//! Program execution: runs a compiled program against an instance value,
//! maintaining the dynamic scope stack and emitting an ordered trace.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::compiler::{Assertion, Program, Step};
use crate::error::{JsonVetError, JsonVetResult};
use crate::pointer::Pointer;
use crate::trace::{TraceEvent, TracePhase};
use crate::uri;
use crate::walker::InstanceType;

/// How much of the trace survives. The verdict is identical in both modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Short-circuits where semantics allow and emits one post event per
    /// executed instruction
    Fast,
    /// Executes every instruction, emitting pre/post pairs with
    /// human-readable descriptions
    Full,
}

/// The result of one evaluation call.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub success: bool,
    pub trace: Vec<TraceEvent>,
}

/// Recursion guard; generous enough that only a malformed cyclic program
/// could reach it.
const DEPTH_LIMIT: usize = 300;

/// Run a compiled program against an instance value.
pub fn evaluate(program: &Program, instance: &Value, mode: Mode) -> JsonVetResult<Evaluation> {
    let mut state = State {
        program,
        mode,
        trace: Vec::new(),
        scopes: vec![program.base.clone()],
        annotations: BTreeMap::new(),
        active: BTreeSet::new(),
        depth: 0,
    };

    let success = state.run_program(&program.steps, instance, &Pointer::new())?;
    Ok(Evaluation {
        success,
        trace: state.trace,
    })
}

struct State<'a> {
    program: &'a Program,
    mode: Mode,
    trace: Vec<TraceEvent>,
    /// Dynamic scope chain of resource URIs, outermost first
    scopes: Vec<String>,
    /// Values emitted so far, per (instance pointer, schema pointer);
    /// discarded when the evaluation call returns
    annotations: BTreeMap<(Pointer, Pointer), Vec<Value>>,
    /// Jump targets currently on the evaluation stack per instance
    /// location; re-entering one without instance progress is a fixed
    /// point and succeeds vacuously
    active: BTreeSet<(u64, Pointer)>,
    depth: usize,
}

impl<'a> State<'a> {
    /// Conjunction over an instruction sequence.
    fn run_program(
        &mut self,
        steps: &[Step],
        value: &Value,
        instance: &Pointer,
    ) -> JsonVetResult<bool> {
        let mut success = true;
        for step in steps {
            if !self.run_step(step, value, instance)? {
                success = false;
                if self.mode == Mode::Fast {
                    return Ok(false);
                }
            }
        }

        Ok(success)
    }

    fn run_step(&mut self, step: &Step, value: &Value, instance: &Pointer) -> JsonVetResult<bool> {
        self.depth += 1;
        if self.depth > DEPTH_LIMIT {
            return Err(JsonVetError::EvaluationDepthLimit);
        }

        if self.mode == Mode::Full {
            self.push_event(TracePhase::Pre, step, instance, None, None);
        }

        let (result, tail) = self.execute(step, value, instance)?;

        let annotation = match step {
            Step::Annotation {
                common,
                value: emitted,
                ..
            } => {
                self.annotations
                    .entry((instance.clone(), common.schema_pointer.clone()))
                    .or_default()
                    .push(emitted.clone());
                Some(emitted.clone())
            }
            _ => None,
        };
        self.push_event(TracePhase::Post, step, instance, Some(result), annotation);

        // Loop annotation tails come after the loop's own post event
        if let Some((payload, public)) = tail {
            if result && (self.mode == Mode::Full || public) {
                let common = step.common();
                self.annotations
                    .entry((instance.clone(), common.schema_pointer.clone()))
                    .or_default()
                    .push(payload.clone());
                self.trace.push(TraceEvent {
                    phase: TracePhase::Post,
                    instruction: "annotation",
                    schema_pointer: common.schema_pointer.clone(),
                    evaluate_path: evaluate_path(step),
                    instance_pointer: instance.clone(),
                    outcome: Some(true.into()),
                    annotation: Some(payload),
                    description: self.describe(step),
                });
            }
        }

        self.depth -= 1;
        Ok(result)
    }

    /// Execute one instruction; returns the verdict plus an optional loop
    /// annotation payload.
    #[allow(clippy::type_complexity)]
    fn execute(
        &mut self,
        step: &Step,
        value: &Value,
        instance: &Pointer,
    ) -> JsonVetResult<(bool, Option<(Value, bool)>)> {
        let result = match step {
            Step::Assertion { assertion, .. } => (check(assertion, value), None),
            Step::Annotation { .. } => (true, None),
            Step::ControlGroup { children, .. } => {
                (self.run_program(children, value, instance)?, None)
            }
            Step::ControlResource { base, children, .. } => {
                self.scopes.push(base.clone());
                let result = self.run_program(children, value, instance)?;
                self.scopes.pop();
                (result, None)
            }
            Step::ControlJump { id, .. } => (self.jump(*id, value, instance)?, None),
            Step::ControlDynamicJump {
                anchor, fallback, ..
            } => {
                // Outermost matching scope wins; the statically nearest
                // candidate is only the fallback
                let target = self
                    .scopes
                    .iter()
                    .find_map(|scope| self.program.dynamic_label(scope, anchor))
                    .unwrap_or(*fallback);
                (self.jump(target, value, instance)?, None)
            }
            Step::LogicalAnd { branches, .. } => {
                let mut success = true;
                for branch in branches {
                    if !self.run_program(branch, value, instance)? {
                        success = false;
                        if self.mode == Mode::Fast {
                            break;
                        }
                    }
                }
                (success, None)
            }
            Step::LogicalOr { branches, .. } => {
                let mut success = false;
                for branch in branches {
                    if self.run_program(branch, value, instance)? {
                        success = true;
                        if self.mode == Mode::Fast {
                            break;
                        }
                    }
                }
                (success, None)
            }
            Step::LogicalXor { branches, .. } => {
                // Exactly-one semantics never short-circuit
                let mut matches = 0;
                for branch in branches {
                    if self.run_program(branch, value, instance)? {
                        matches += 1;
                    }
                }
                (matches == 1, None)
            }
            Step::LogicalNot { children, .. } => {
                (!self.run_program(children, value, instance)?, None)
            }
            Step::LogicalCondition {
                test,
                consequent,
                alternative,
                ..
            } => {
                // The test always runs and only selects which branch
                // counts, but its own verdict is still recorded as an
                // assertion-shaped event in both modes
                let verdict = self.run_program(test, value, instance)?;
                let common = step.common();
                self.trace.push(TraceEvent {
                    phase: TracePhase::Post,
                    instruction: "assertion",
                    schema_pointer: common.schema_pointer.clone(),
                    evaluate_path: evaluate_path(step),
                    instance_pointer: instance.clone(),
                    outcome: Some(verdict.into()),
                    annotation: None,
                    description: match self.mode {
                        Mode::Full => {
                            Some("record whether the conditional test passed".to_string())
                        }
                        Mode::Fast => None,
                    },
                });
                let branch = if verdict { consequent } else { alternative };
                (self.run_program(branch, value, instance)?, None)
            }
            Step::LoopProperties {
                entries,
                public_annotation,
                ..
            } => {
                let Value::Object(members) = value else {
                    return Ok((true, None));
                };
                let mut success = true;
                let mut evaluated = Vec::new();
                'entries: for (name, children) in entries {
                    let Some(member) = members.get(name) else {
                        continue;
                    };
                    if self.run_program(children, member, &instance.join(name.as_str()))? {
                        evaluated.push(Value::String(name.clone()));
                    } else {
                        success = false;
                        if self.mode == Mode::Fast {
                            break 'entries;
                        }
                    }
                }
                (success, Some((Value::Array(evaluated), *public_annotation)))
            }
            Step::LoopPropertiesRegex {
                patterns,
                public_annotation,
                ..
            } => {
                let Value::Object(members) = value else {
                    return Ok((true, None));
                };
                let mut success = true;
                let mut evaluated = Vec::new();
                'members: for (name, member) in members {
                    // A name matching several patterns is still reported once
                    let mut matched = false;
                    for pattern in patterns {
                        if !pattern.regex.is_match(name) {
                            continue;
                        }
                        if self.run_program(
                            &pattern.children,
                            member,
                            &instance.join(name.as_str()),
                        )? {
                            matched = true;
                        } else {
                            success = false;
                            if self.mode == Mode::Fast {
                                break 'members;
                            }
                        }
                    }
                    if matched {
                        evaluated.push(Value::String(name.clone()));
                    }
                }
                (success, Some((Value::Array(evaluated), *public_annotation)))
            }
            Step::LoopPropertiesRemaining {
                names,
                patterns,
                children,
                public_annotation,
                ..
            } => {
                let Value::Object(members) = value else {
                    return Ok((true, None));
                };
                let mut success = true;
                let mut evaluated = Vec::new();
                'members: for (name, member) in members {
                    let claimed = names.iter().any(|candidate| candidate == name)
                        || patterns.iter().any(|(_, regex)| regex.is_match(name));
                    if claimed {
                        continue;
                    }
                    if self.run_program(children, member, &instance.join(name.as_str()))? {
                        evaluated.push(Value::String(name.clone()));
                    } else {
                        success = false;
                        if self.mode == Mode::Fast {
                            break 'members;
                        }
                    }
                }
                (success, Some((Value::Array(evaluated), *public_annotation)))
            }
            Step::LoopKeys { children, .. } => {
                let Value::Object(members) = value else {
                    return Ok((true, None));
                };
                let mut success = true;
                for name in members.keys() {
                    let key = Value::String(name.clone());
                    if !self.run_program(children, &key, &instance.join(name.as_str()))? {
                        success = false;
                        if self.mode == Mode::Fast {
                            break;
                        }
                    }
                }
                (success, None)
            }
            Step::LoopItems {
                start,
                children,
                public_annotation,
                ..
            } => {
                let Value::Array(items) = value else {
                    return Ok((true, None));
                };
                let mut success = true;
                for (index, item) in items.iter().enumerate().skip(*start) {
                    if !self.run_program(children, item, &instance.join(index))? {
                        success = false;
                        if self.mode == Mode::Fast {
                            break;
                        }
                    }
                }
                // `true` means the loop evaluated through the end of the
                // array, which is what unevaluated-style consumers ask
                (success, Some((Value::Bool(true), *public_annotation)))
            }
            Step::LoopItemsPrefix {
                programs,
                public_annotation,
                ..
            } => {
                let Value::Array(items) = value else {
                    return Ok((true, None));
                };
                let count = programs.len().min(items.len());
                let mut success = true;
                for index in 0..count {
                    if !self.run_program(&programs[index], &items[index], &instance.join(index))? {
                        success = false;
                        if self.mode == Mode::Fast {
                            break;
                        }
                    }
                }
                let payload = if count >= items.len() {
                    Value::Bool(true)
                } else if count == 0 {
                    Value::Bool(false)
                } else {
                    Value::from(count - 1)
                };
                (success, Some((payload, *public_annotation)))
            }
            Step::LoopContains {
                minimum,
                maximum,
                children,
                public_annotation,
                ..
            } => {
                let Value::Array(items) = value else {
                    return Ok((true, None));
                };
                let mut matched = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    if self.run_program(children, item, &instance.join(index))? {
                        matched.push(Value::from(index));
                    }
                }
                let count = matched.len();
                let success =
                    count >= *minimum && maximum.map(|maximum| count <= maximum).unwrap_or(true);
                (success, Some((Value::Array(matched), *public_annotation)))
            }
            Step::Dependent { entries, .. } => {
                let Value::Object(members) = value else {
                    return Ok((true, None));
                };
                let mut success = true;
                for (name, children) in entries {
                    if !members.contains_key(name) {
                        continue;
                    }
                    if !self.run_program(children, value, instance)? {
                        success = false;
                        if self.mode == Mode::Fast {
                            break;
                        }
                    }
                }
                (success, None)
            }
        };

        Ok(result)
    }

    /// Enter a labeled sub-program, pushing its resource base onto the
    /// dynamic scope chain.
    fn jump(&mut self, id: u64, value: &Value, instance: &Pointer) -> JsonVetResult<bool> {
        let Some(subprogram) = self.program.subprogram(id) else {
            // Unreachable for programs produced by the compiler
            return Ok(true);
        };

        let key = (id, instance.clone());
        if !self.active.insert(key.clone()) {
            // A cycle with no instance progress has reached its fixed point
            return Ok(true);
        }

        self.scopes.push(subprogram.base.clone());
        let result = self.run_program(&subprogram.steps, value, instance);
        self.scopes.pop();
        self.active.remove(&key);

        result
    }

    fn push_event(
        &mut self,
        phase: TracePhase,
        step: &Step,
        instance: &Pointer,
        outcome: Option<bool>,
        annotation: Option<Value>,
    ) {
        let common = step.common();
        self.trace.push(TraceEvent {
            phase,
            instruction: step.kind(),
            schema_pointer: common.schema_pointer.clone(),
            evaluate_path: evaluate_path(step),
            instance_pointer: instance.clone(),
            outcome: outcome.map(Into::into),
            annotation,
            description: match phase {
                TracePhase::Post => self.describe(step),
                TracePhase::Pre => None,
            },
        });
    }

    fn describe(&self, step: &Step) -> Option<String> {
        if self.mode != Mode::Full {
            return None;
        }

        let keyword = &step.common().keyword;
        Some(match step {
            Step::Assertion { assertion, .. } => describe_assertion(assertion),
            Step::Annotation { .. } => format!("emit the \"{keyword}\" annotation"),
            Step::ControlGroup { .. } => "every nested instruction must pass".to_string(),
            Step::ControlResource { base, .. } => {
                format!("enter the schema resource \"{base}\"")
            }
            Step::ControlJump { .. } => "follow the statically resolved reference".to_string(),
            Step::ControlDynamicJump { anchor, .. } => {
                if anchor.is_empty() {
                    "follow the recursive reference through the dynamic scope".to_string()
                } else {
                    format!("follow the dynamic reference to anchor \"{anchor}\"")
                }
            }
            Step::LogicalAnd { .. } => "every branch must pass".to_string(),
            Step::LogicalOr { .. } => "at least one branch must pass".to_string(),
            Step::LogicalXor { .. } => "exactly one branch must pass".to_string(),
            Step::LogicalNot { .. } => "the nested schema must not pass".to_string(),
            Step::LogicalCondition { .. } => {
                "the conditional selects which branch is enforced".to_string()
            }
            Step::LoopProperties { .. } => "named properties must match their schemas".to_string(),
            Step::LoopPropertiesRegex { .. } => {
                "pattern-matched properties must match their schemas".to_string()
            }
            Step::LoopPropertiesRemaining { .. } => {
                "remaining properties must match the schema".to_string()
            }
            Step::LoopKeys { .. } => "every property name must match the schema".to_string(),
            Step::LoopItems { start, .. } => {
                if *start == 0 {
                    "every array item must match the schema".to_string()
                } else {
                    format!("array items from index {start} must match the schema")
                }
            }
            Step::LoopItemsPrefix { .. } => {
                "leading array items must match their positional schemas".to_string()
            }
            Step::LoopContains {
                minimum, maximum, ..
            } => match maximum {
                Some(maximum) => format!(
                    "between {minimum} and {maximum} array items must match the schema"
                ),
                None => format!("at least {minimum} array items must match the schema"),
            },
            Step::Dependent { .. } => {
                "schemas gated on property presence must pass".to_string()
            }
        })
    }
}

fn evaluate_path(step: &Step) -> String {
    let common = step.common();
    uri::with_fragment(&common.base, &common.schema_pointer.to_fragment())
}

/// The JSON type of a value, with integral numbers classified as integers.
fn instance_type(value: &Value) -> InstanceType {
    match value {
        Value::Null => InstanceType::Null,
        Value::Bool(_) => InstanceType::Boolean,
        Value::Object(_) => InstanceType::Object,
        Value::Array(_) => InstanceType::Array,
        Value::String(_) => InstanceType::String,
        Value::Number(number) => {
            if number.is_i64()
                || number.is_u64()
                || number.as_f64().is_some_and(|float| float.fract() == 0.0)
            {
                InstanceType::Integer
            } else {
                InstanceType::Number
            }
        }
    }
}

fn type_matches(declared: InstanceType, value: &Value) -> bool {
    let actual = instance_type(value);
    declared == actual || (declared == InstanceType::Number && actual == InstanceType::Integer)
}

/// Leaf assertions pass vacuously on instance types they do not apply to.
fn check(assertion: &Assertion, value: &Value) -> bool {
    match assertion {
        Assertion::Fail => false,
        Assertion::Type(types) => types.iter().any(|declared| type_matches(*declared, value)),
        Assertion::Enum(choices) => choices.iter().any(|choice| choice == value),
        Assertion::Const(expected) => expected == value,
        Assertion::Greater(bound) => value.as_f64().map_or(true, |number| number > *bound),
        Assertion::GreaterEqual(bound) => value.as_f64().map_or(true, |number| number >= *bound),
        Assertion::Less(bound) => value.as_f64().map_or(true, |number| number < *bound),
        Assertion::LessEqual(bound) => value.as_f64().map_or(true, |number| number <= *bound),
        Assertion::MultipleOf(divisor) => value.as_f64().map_or(true, |number| {
            let ratio = number / divisor;
            (ratio - ratio.round()).abs() < 1e-9
        }),
        Assertion::MinLength(bound) => value
            .as_str()
            .map_or(true, |text| text.chars().count() >= *bound),
        Assertion::MaxLength(bound) => value
            .as_str()
            .map_or(true, |text| text.chars().count() <= *bound),
        Assertion::Pattern(_, regex) => value.as_str().map_or(true, |text| regex.is_match(text)),
        Assertion::Required(names) => match value {
            Value::Object(members) => names.iter().all(|name| members.contains_key(name)),
            _ => true,
        },
        Assertion::MinProperties(bound) => match value {
            Value::Object(members) => members.len() >= *bound,
            _ => true,
        },
        Assertion::MaxProperties(bound) => match value {
            Value::Object(members) => members.len() <= *bound,
            _ => true,
        },
        Assertion::MinItems(bound) => match value {
            Value::Array(items) => items.len() >= *bound,
            _ => true,
        },
        Assertion::MaxItems(bound) => match value {
            Value::Array(items) => items.len() <= *bound,
            _ => true,
        },
        Assertion::UniqueItems => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .all(|(index, item)| !items[..index].contains(item)),
            _ => true,
        },
        Assertion::RequiredDependencies(entries) => match value {
            Value::Object(members) => entries.iter().all(|(property, names)| {
                !members.contains_key(property)
                    || names.iter().all(|name| members.contains_key(name))
            }),
            _ => true,
        },
    }
}

fn describe_assertion(assertion: &Assertion) -> String {
    match assertion {
        Assertion::Fail => "the schema rejects every instance".to_string(),
        Assertion::Type(types) => format!(
            "the instance must be of type {}",
            types
                .iter()
                .map(|declared| format!("{declared:?}").to_lowercase())
                .collect::<Vec<_>>()
                .join(" or ")
        ),
        Assertion::Enum(_) => "the instance must equal one of the allowed values".to_string(),
        Assertion::Const(_) => "the instance must equal the expected value".to_string(),
        Assertion::Greater(bound) => format!("the number must be greater than {bound}"),
        Assertion::GreaterEqual(bound) => format!("the number must be at least {bound}"),
        Assertion::Less(bound) => format!("the number must be less than {bound}"),
        Assertion::LessEqual(bound) => format!("the number must be at most {bound}"),
        Assertion::MultipleOf(divisor) => format!("the number must be a multiple of {divisor}"),
        Assertion::MinLength(bound) => {
            format!("the string must be at least {bound} characters long")
        }
        Assertion::MaxLength(bound) => {
            format!("the string must be at most {bound} characters long")
        }
        Assertion::Pattern(pattern, _) => {
            format!("the string must match the pattern \"{pattern}\"")
        }
        Assertion::Required(names) => format!("the object must define {} properties", names.len()),
        Assertion::MinProperties(bound) => {
            format!("the object must have at least {bound} properties")
        }
        Assertion::MaxProperties(bound) => {
            format!("the object must have at most {bound} properties")
        }
        Assertion::MinItems(bound) => format!("the array must have at least {bound} items"),
        Assertion::MaxItems(bound) => format!("the array must have at most {bound} items"),
        Assertion::UniqueItems => "the array items must be unique".to_string(),
        Assertion::RequiredDependencies(_) => {
            "present properties require their dependent properties".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_floats_are_integers() {
        assert_eq!(instance_type(&json!(2.0)), InstanceType::Integer);
        assert_eq!(instance_type(&json!(2.5)), InstanceType::Number);
        assert!(type_matches(InstanceType::Number, &json!(3)));
        assert!(!type_matches(InstanceType::Integer, &json!(2.5)));
    }

    #[test]
    fn assertions_gate_on_instance_type() {
        assert!(check(&Assertion::MinLength(3), &json!(42)));
        assert!(!check(&Assertion::MinLength(3), &json!("ab")));
        assert!(check(&Assertion::Required(vec!["a".to_string()]), &json!(1)));
    }
}

use serde::Serialize;

use crate::dialect::{
    Vocabularies, DIALECT_DRAFT_4, DIALECT_DRAFT_6, DIALECT_DRAFT_7, VOCAB_2019_09_APPLICATOR,
    VOCAB_2019_09_CONTENT, VOCAB_2019_09_CORE, VOCAB_2019_09_FORMAT, VOCAB_2019_09_META_DATA,
    VOCAB_2019_09_VALIDATION, VOCAB_2020_12_APPLICATOR, VOCAB_2020_12_CONTENT,
    VOCAB_2020_12_CORE, VOCAB_2020_12_FORMAT_ANNOTATION, VOCAB_2020_12_FORMAT_ASSERTION,
    VOCAB_2020_12_META_DATA, VOCAB_2020_12_UNEVALUATED, VOCAB_2020_12_VALIDATION,
};

/// The JSON types an instance value can take. `Integer` is the subset of
/// `Number` with a zero fractional part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Null,
    Boolean,
    Object,
    Array,
    String,
    Number,
    Integer,
}

/// The behavioral category of a schema keyword. This is a closed set: both
/// the frame and the compiler match on it exhaustively, so adding a category
/// is a compile-time-checked exercise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeywordCategory {
    /// A leaf boolean check against the instance
    Assertion,
    /// Emits a side value without affecting validity
    Annotation,
    /// Purely descriptive, ignored by evaluation
    Comment,
    /// `$ref` and its statically or dynamically scoped relatives
    Reference,
    /// A member container of named schema definitions
    LocationMembers,
    /// Recognized bookkeeping keywords such as identifiers and anchors
    Other,
    /// Not declared by any active vocabulary
    Unknown,
    /// `allOf`: every element applies in place
    ApplicatorElementsInPlace,
    /// `anyOf`/`oneOf`: some elements apply in place
    ApplicatorElementsInPlaceSome,
    /// `prefixItems`: element N applies to instance item N
    ApplicatorElementsTraverseItem,
    /// `if`/`then`/`else`: conditionally applies in place
    ApplicatorValueInPlaceMaybe,
    /// `not`: applies in place with inverted outcome
    ApplicatorValueInPlaceNegate,
    /// `contentSchema` and similar non-asserting in-place applicators
    ApplicatorValueInPlaceOther,
    /// `dependentSchemas`/`dependencies`: members conditionally in place
    ApplicatorMembersInPlaceSome,
    /// `properties`: member M applies to instance property M
    ApplicatorMembersTraversePropertyStatic,
    /// `patternProperties`: member regex R applies to matching properties
    ApplicatorMembersTraversePropertyRegex,
    /// `contains`: applies to at least one instance item
    ApplicatorValueTraverseAnyItem,
    /// `items` (2020-12), `additionalItems`, `unevaluatedItems`: applies to
    /// a suffix of instance items
    ApplicatorValueTraverseSomeItem,
    /// `propertyNames`: applies to every property key
    ApplicatorValueTraverseAnyPropertyKey,
    /// `additionalProperties`, `unevaluatedProperties`: applies to the
    /// remaining properties
    ApplicatorValueTraverseSomeProperty,
    /// Applies to the parent of the current instance location
    ApplicatorValueTraverseParent,
    /// Non-traversing applicator that takes a schema or an array of schemas
    ApplicatorValueOrElementsInPlace,
    /// `items` (draft-2019 and earlier): schema form applies to every item,
    /// array form applies per index
    ApplicatorValueOrElementsTraverseAnyItemOrItem,
}

/// How the frame and compiler descend through a keyword's value looking for
/// sub-schemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    None,
    Value,
    Elements,
    Members,
    ValueOrElements,
}

impl KeywordCategory {
    pub fn traversal(self) -> Traversal {
        use KeywordCategory::*;
        match self {
            Assertion | Annotation | Comment | Reference | Other | Unknown => Traversal::None,
            ApplicatorValueInPlaceMaybe
            | ApplicatorValueInPlaceNegate
            | ApplicatorValueInPlaceOther
            | ApplicatorValueTraverseAnyItem
            | ApplicatorValueTraverseSomeItem
            | ApplicatorValueTraverseAnyPropertyKey
            | ApplicatorValueTraverseSomeProperty
            | ApplicatorValueTraverseParent => Traversal::Value,
            ApplicatorElementsInPlace
            | ApplicatorElementsInPlaceSome
            | ApplicatorElementsTraverseItem => Traversal::Elements,
            ApplicatorMembersInPlaceSome
            | ApplicatorMembersTraversePropertyStatic
            | ApplicatorMembersTraversePropertyRegex
            | LocationMembers => Traversal::Members,
            ApplicatorValueOrElementsInPlace
            | ApplicatorValueOrElementsTraverseAnyItemOrItem => Traversal::ValueOrElements,
        }
    }
}

/// What the walker knows about one keyword under a fixed vocabulary set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordDescriptor {
    pub category: KeywordCategory,
    /// The vocabulary that declares the keyword; `None` for `Unknown`
    pub vocabulary: Option<&'static str>,
    /// Sibling keywords whose evaluation must come first
    pub dependencies: &'static [&'static str],
    /// Instance types the keyword is meaningful for; empty means all
    pub instances: &'static [InstanceType],
}

/// The walker callback type: pure, total, and cheap.
pub type SchemaWalker = fn(&str, &Vocabularies) -> KeywordDescriptor;

const ANY: &[InstanceType] = &[];
const OBJECT: &[InstanceType] = &[InstanceType::Object];
const ARRAY: &[InstanceType] = &[InstanceType::Array];
const STRING: &[InstanceType] = &[InstanceType::String];
const NUMERIC: &[InstanceType] = &[InstanceType::Integer, InstanceType::Number];

const NO_DEPS: &[&str] = &[];
const DEPS_IF: &[&str] = &["if"];
const DEPS_REF: &[&str] = &["$ref"];
const DEPS_TYPE: &[&str] = &["type"];
const DEPS_PROPERTIES: &[&str] = &["properties"];
const DEPS_ITEMS: &[&str] = &["items"];
const DEPS_PREFIX_ITEMS: &[&str] = &["prefixItems"];
const DEPS_CONTAINS_BOUNDS: &[&str] = &["minContains", "maxContains"];
const DEPS_PROPERTY_FAMILY: &[&str] = &["properties", "patternProperties"];
const DEPS_UNEVALUATED_PROPERTIES: &[&str] =
    &["properties", "patternProperties", "additionalProperties"];
const DEPS_UNEVALUATED_ITEMS_2020: &[&str] = &["prefixItems", "items", "contains"];
const DEPS_UNEVALUATED_ITEMS_2019: &[&str] = &["items", "additionalItems"];
const DEPS_REF_REQUIRED: &[&str] = &["$ref", "required"];
const DEPS_REQUIRED: &[&str] = &["required"];

fn known(
    vocabulary: &'static str,
    category: KeywordCategory,
    dependencies: &'static [&'static str],
    instances: &'static [InstanceType],
) -> KeywordDescriptor {
    KeywordDescriptor {
        category,
        vocabulary: Some(vocabulary),
        dependencies,
        instances,
    }
}

fn unknown(dependencies: &'static [&'static str]) -> KeywordDescriptor {
    KeywordDescriptor {
        category: KeywordCategory::Unknown,
        vocabulary: None,
        dependencies,
        instances: ANY,
    }
}

/// Classify a keyword under the active vocabulary set. Returns `Unknown`
/// with no vocabulary attribution when nothing declares the keyword.
pub fn classify(keyword: &str, vocabularies: &Vocabularies) -> KeywordDescriptor {
    use KeywordCategory::*;

    if vocabularies.contains(VOCAB_2020_12_CORE) {
        let result = match keyword {
            "$id" | "$schema" | "$vocabulary" | "$anchor" | "$dynamicAnchor" => {
                Some(known(VOCAB_2020_12_CORE, Other, NO_DEPS, ANY))
            }
            "$ref" | "$dynamicRef" => Some(known(VOCAB_2020_12_CORE, Reference, NO_DEPS, ANY)),
            // `definitions` is kept for backwards compatibility
            "$defs" | "definitions" => {
                Some(known(VOCAB_2020_12_CORE, LocationMembers, NO_DEPS, ANY))
            }
            "$comment" => Some(known(VOCAB_2020_12_CORE, Comment, NO_DEPS, ANY)),
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2020_12_APPLICATOR) {
        let result = match keyword {
            "allOf" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorElementsInPlace,
                NO_DEPS,
                ANY,
            )),
            "anyOf" | "oneOf" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorElementsInPlaceSome,
                NO_DEPS,
                ANY,
            )),
            "if" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueInPlaceMaybe,
                NO_DEPS,
                ANY,
            )),
            "then" | "else" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueInPlaceMaybe,
                DEPS_IF,
                ANY,
            )),
            "not" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueInPlaceNegate,
                NO_DEPS,
                ANY,
            )),
            "properties" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorMembersTraversePropertyStatic,
                DEPS_REQUIRED,
                OBJECT,
            )),
            "patternProperties" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorMembersTraversePropertyRegex,
                NO_DEPS,
                OBJECT,
            )),
            "additionalProperties" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueTraverseSomeProperty,
                DEPS_PROPERTY_FAMILY,
                OBJECT,
            )),
            "propertyNames" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueTraverseAnyPropertyKey,
                NO_DEPS,
                OBJECT,
            )),
            "dependentSchemas" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorMembersInPlaceSome,
                NO_DEPS,
                OBJECT,
            )),
            "contains" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueTraverseAnyItem,
                DEPS_CONTAINS_BOUNDS,
                ARRAY,
            )),
            "items" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorValueTraverseSomeItem,
                DEPS_PREFIX_ITEMS,
                ARRAY,
            )),
            "prefixItems" => Some(known(
                VOCAB_2020_12_APPLICATOR,
                ApplicatorElementsTraverseItem,
                NO_DEPS,
                ARRAY,
            )),
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2020_12_VALIDATION) {
        let result = match keyword {
            // Ordered after `properties` so the compiler can fold type
            // checks into property loops
            "type" => Some(known(VOCAB_2020_12_VALIDATION, Assertion, DEPS_PROPERTIES, ANY)),
            "enum" | "const" => Some(known(VOCAB_2020_12_VALIDATION, Assertion, NO_DEPS, ANY)),
            "minLength" | "maxLength" | "pattern" => {
                Some(known(VOCAB_2020_12_VALIDATION, Assertion, NO_DEPS, STRING))
            }
            "minimum" | "maximum" => {
                Some(known(VOCAB_2020_12_VALIDATION, Assertion, DEPS_TYPE, NUMERIC))
            }
            "exclusiveMinimum" | "exclusiveMaximum" | "multipleOf" => {
                Some(known(VOCAB_2020_12_VALIDATION, Assertion, NO_DEPS, NUMERIC))
            }
            "required" | "minProperties" | "maxProperties" | "dependentRequired" => {
                Some(known(VOCAB_2020_12_VALIDATION, Assertion, NO_DEPS, OBJECT))
            }
            "minItems" | "maxItems" | "uniqueItems" | "minContains" | "maxContains" => {
                Some(known(VOCAB_2020_12_VALIDATION, Assertion, NO_DEPS, ARRAY))
            }
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2020_12_UNEVALUATED) {
        let result = match keyword {
            "unevaluatedProperties" => Some(known(
                VOCAB_2020_12_UNEVALUATED,
                ApplicatorValueTraverseSomeProperty,
                DEPS_UNEVALUATED_PROPERTIES,
                OBJECT,
            )),
            "unevaluatedItems" => Some(known(
                VOCAB_2020_12_UNEVALUATED,
                ApplicatorValueTraverseSomeItem,
                DEPS_UNEVALUATED_ITEMS_2020,
                ARRAY,
            )),
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2020_12_META_DATA) {
        if let "title" | "description" | "default" | "examples" | "deprecated" | "readOnly"
        | "writeOnly" = keyword
        {
            return known(VOCAB_2020_12_META_DATA, Annotation, NO_DEPS, ANY);
        }
    }

    if vocabularies.contains(VOCAB_2020_12_FORMAT_ASSERTION) && keyword == "format" {
        return known(VOCAB_2020_12_FORMAT_ASSERTION, Assertion, NO_DEPS, STRING);
    }

    if vocabularies.contains(VOCAB_2020_12_FORMAT_ANNOTATION) && keyword == "format" {
        return known(VOCAB_2020_12_FORMAT_ANNOTATION, Annotation, NO_DEPS, STRING);
    }

    if vocabularies.contains(VOCAB_2020_12_CONTENT) {
        let result = match keyword {
            "contentSchema" => Some(known(
                VOCAB_2020_12_CONTENT,
                ApplicatorValueInPlaceOther,
                NO_DEPS,
                STRING,
            )),
            "contentMediaType" | "contentEncoding" => {
                Some(known(VOCAB_2020_12_CONTENT, Annotation, NO_DEPS, STRING))
            }
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2019_09_CORE) {
        let result = match keyword {
            "$id" | "$schema" | "$vocabulary" | "$anchor" | "$recursiveAnchor" => {
                Some(known(VOCAB_2019_09_CORE, Other, NO_DEPS, ANY))
            }
            "$ref" | "$recursiveRef" => Some(known(VOCAB_2019_09_CORE, Reference, NO_DEPS, ANY)),
            "$defs" | "definitions" => {
                Some(known(VOCAB_2019_09_CORE, LocationMembers, NO_DEPS, ANY))
            }
            "$comment" => Some(known(VOCAB_2019_09_CORE, Comment, NO_DEPS, ANY)),
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2019_09_APPLICATOR) {
        let result = match keyword {
            "allOf" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorElementsInPlace,
                NO_DEPS,
                ANY,
            )),
            "anyOf" | "oneOf" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorElementsInPlaceSome,
                NO_DEPS,
                ANY,
            )),
            "if" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueInPlaceMaybe,
                NO_DEPS,
                ANY,
            )),
            "then" | "else" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueInPlaceMaybe,
                DEPS_IF,
                ANY,
            )),
            "not" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueInPlaceNegate,
                NO_DEPS,
                ANY,
            )),
            "properties" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorMembersTraversePropertyStatic,
                DEPS_REQUIRED,
                OBJECT,
            )),
            "patternProperties" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorMembersTraversePropertyRegex,
                NO_DEPS,
                OBJECT,
            )),
            "additionalProperties" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueTraverseSomeProperty,
                DEPS_PROPERTY_FAMILY,
                OBJECT,
            )),
            "propertyNames" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueTraverseAnyPropertyKey,
                NO_DEPS,
                OBJECT,
            )),
            "dependentSchemas" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorMembersInPlaceSome,
                NO_DEPS,
                OBJECT,
            )),
            "unevaluatedProperties" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueTraverseSomeProperty,
                DEPS_UNEVALUATED_PROPERTIES,
                OBJECT,
            )),
            "unevaluatedItems" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueTraverseSomeItem,
                DEPS_UNEVALUATED_ITEMS_2019,
                ARRAY,
            )),
            "items" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueOrElementsTraverseAnyItemOrItem,
                NO_DEPS,
                ARRAY,
            )),
            "additionalItems" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueTraverseSomeItem,
                DEPS_ITEMS,
                ARRAY,
            )),
            "contains" => Some(known(
                VOCAB_2019_09_APPLICATOR,
                ApplicatorValueTraverseAnyItem,
                DEPS_CONTAINS_BOUNDS,
                ARRAY,
            )),
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2019_09_VALIDATION) {
        let result = match keyword {
            "type" => Some(known(VOCAB_2019_09_VALIDATION, Assertion, DEPS_PROPERTIES, ANY)),
            "enum" | "const" => Some(known(VOCAB_2019_09_VALIDATION, Assertion, NO_DEPS, ANY)),
            "minLength" | "maxLength" | "pattern" => {
                Some(known(VOCAB_2019_09_VALIDATION, Assertion, NO_DEPS, STRING))
            }
            "minimum" | "maximum" => {
                Some(known(VOCAB_2019_09_VALIDATION, Assertion, DEPS_TYPE, NUMERIC))
            }
            "exclusiveMinimum" | "exclusiveMaximum" | "multipleOf" => {
                Some(known(VOCAB_2019_09_VALIDATION, Assertion, NO_DEPS, NUMERIC))
            }
            "required" | "minProperties" | "maxProperties" | "dependentRequired" => {
                Some(known(VOCAB_2019_09_VALIDATION, Assertion, NO_DEPS, OBJECT))
            }
            "minItems" | "maxItems" | "uniqueItems" | "minContains" | "maxContains" => {
                Some(known(VOCAB_2019_09_VALIDATION, Assertion, NO_DEPS, ARRAY))
            }
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    if vocabularies.contains(VOCAB_2019_09_META_DATA) {
        if let "title" | "description" | "default" | "examples" | "deprecated" | "readOnly"
        | "writeOnly" = keyword
        {
            return known(VOCAB_2019_09_META_DATA, Annotation, NO_DEPS, ANY);
        }
    }

    if vocabularies.contains(VOCAB_2019_09_FORMAT) && keyword == "format" {
        return known(VOCAB_2019_09_FORMAT, Annotation, NO_DEPS, STRING);
    }

    if vocabularies.contains(VOCAB_2019_09_CONTENT) {
        let result = match keyword {
            "contentSchema" => Some(known(
                VOCAB_2019_09_CONTENT,
                ApplicatorValueInPlaceOther,
                NO_DEPS,
                STRING,
            )),
            "contentMediaType" | "contentEncoding" => {
                Some(known(VOCAB_2019_09_CONTENT, Annotation, NO_DEPS, STRING))
            }
            _ => None,
        };
        if let Some(result) = result {
            return result;
        }
    }

    for legacy in [DIALECT_DRAFT_7, DIALECT_DRAFT_6, DIALECT_DRAFT_4] {
        if !vocabularies.contains(legacy) {
            continue;
        }

        if let Some(result) = classify_legacy(keyword, legacy) {
            return result;
        }

        // In these drafts a sibling $ref takes precedence over everything,
        // including unknown keywords
        return unknown(DEPS_REF);
    }

    unknown(NO_DEPS)
}

fn classify_legacy(keyword: &str, vocabulary: &'static str) -> Option<KeywordDescriptor> {
    use KeywordCategory::*;

    let modern_id = vocabulary != DIALECT_DRAFT_4;
    match keyword {
        "$schema" => Some(known(vocabulary, Other, DEPS_REF, ANY)),
        "$id" if modern_id => Some(known(vocabulary, Other, DEPS_REF, ANY)),
        "id" if !modern_id => Some(known(vocabulary, Other, DEPS_REF, ANY)),
        "$ref" => Some(known(vocabulary, Reference, NO_DEPS, ANY)),
        "$comment" if vocabulary == DIALECT_DRAFT_7 => {
            Some(known(vocabulary, Comment, DEPS_REF, ANY))
        }
        "type" => Some(known(vocabulary, Assertion, DEPS_PROPERTIES, ANY)),
        "enum" => Some(known(vocabulary, Assertion, DEPS_REF, ANY)),
        "const" if vocabulary != DIALECT_DRAFT_4 => {
            Some(known(vocabulary, Assertion, DEPS_REF, ANY))
        }
        "multipleOf" | "maximum" | "exclusiveMaximum" | "minimum" | "exclusiveMinimum" => {
            Some(known(vocabulary, Assertion, DEPS_REF, NUMERIC))
        }
        "maxLength" | "minLength" | "pattern" => {
            Some(known(vocabulary, Assertion, DEPS_REF, STRING))
        }
        "items" => Some(known(
            vocabulary,
            ApplicatorValueOrElementsTraverseAnyItemOrItem,
            DEPS_REF,
            ARRAY,
        )),
        "additionalItems" => Some(known(
            vocabulary,
            ApplicatorValueTraverseSomeItem,
            DEPS_ITEMS,
            ARRAY,
        )),
        "maxItems" | "minItems" | "uniqueItems" => {
            Some(known(vocabulary, Assertion, DEPS_REF, ARRAY))
        }
        "contains" if vocabulary != DIALECT_DRAFT_4 => {
            Some(known(vocabulary, ApplicatorValueTraverseAnyItem, DEPS_REF, ARRAY))
        }
        "maxProperties" | "minProperties" | "required" => {
            Some(known(vocabulary, Assertion, DEPS_REF, OBJECT))
        }
        "properties" => Some(known(
            vocabulary,
            ApplicatorMembersTraversePropertyStatic,
            DEPS_REF_REQUIRED,
            OBJECT,
        )),
        "patternProperties" => Some(known(
            vocabulary,
            ApplicatorMembersTraversePropertyRegex,
            DEPS_REF,
            OBJECT,
        )),
        "additionalProperties" => Some(known(
            vocabulary,
            ApplicatorValueTraverseSomeProperty,
            DEPS_PROPERTY_FAMILY,
            OBJECT,
        )),
        "dependencies" => Some(known(
            vocabulary,
            ApplicatorMembersInPlaceSome,
            DEPS_REF,
            OBJECT,
        )),
        "propertyNames" if vocabulary != DIALECT_DRAFT_4 => Some(known(
            vocabulary,
            ApplicatorValueTraverseAnyPropertyKey,
            DEPS_REF,
            OBJECT,
        )),
        "if" if vocabulary == DIALECT_DRAFT_7 => {
            Some(known(vocabulary, ApplicatorValueInPlaceMaybe, DEPS_REF, ANY))
        }
        "then" | "else" if vocabulary == DIALECT_DRAFT_7 => {
            Some(known(vocabulary, ApplicatorValueInPlaceMaybe, DEPS_IF, ANY))
        }
        "allOf" => Some(known(vocabulary, ApplicatorElementsInPlace, DEPS_REF, ANY)),
        "anyOf" | "oneOf" => Some(known(vocabulary, ApplicatorElementsInPlaceSome, DEPS_REF, ANY)),
        "not" => Some(known(vocabulary, ApplicatorValueInPlaceNegate, DEPS_REF, ANY)),
        "format" => Some(known(vocabulary, Other, DEPS_REF, STRING)),
        "contentEncoding" | "contentMediaType" if vocabulary == DIALECT_DRAFT_7 => {
            Some(known(vocabulary, Comment, DEPS_REF, STRING))
        }
        "definitions" => Some(known(vocabulary, LocationMembers, DEPS_REF, ANY)),
        "title" | "description" | "default" => Some(known(vocabulary, Comment, DEPS_REF, ANY)),
        "readOnly" | "writeOnly" | "examples" if vocabulary == DIALECT_DRAFT_7 => {
            Some(known(vocabulary, Comment, DEPS_REF, ANY))
        }
        _ => None,
    }
}

/// A total order over sibling keywords consistent with their dependency
/// sets: keywords with no dependencies sort first, and each level of
/// depended-upon peers adds one.
pub fn priority(keyword: &str, vocabularies: &Vocabularies, walker: SchemaWalker) -> usize {
    walker(keyword, vocabularies)
        .dependencies
        .iter()
        .map(|dependency| priority(dependency, vocabularies, walker) + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{vocabularies, DIALECT_2020_12};
    use crate::resolver::EmptyResolver;

    fn modern() -> Vocabularies {
        vocabularies(DIALECT_2020_12, &EmptyResolver).expect("official vocabularies")
    }

    #[test]
    fn classifies_modern_core_keywords() {
        let active = modern();
        assert_eq!(classify("$ref", &active).category, KeywordCategory::Reference);
        assert_eq!(classify("$dynamicRef", &active).category, KeywordCategory::Reference);
        assert_eq!(classify("$defs", &active).category, KeywordCategory::LocationMembers);
        assert_eq!(classify("$comment", &active).category, KeywordCategory::Comment);
        assert_eq!(classify("type", &active).category, KeywordCategory::Assertion);
    }

    #[test]
    fn known_keywords_carry_their_vocabulary() {
        let active = modern();
        assert_eq!(
            classify("format", &active).vocabulary,
            Some(crate::dialect::VOCAB_2020_12_FORMAT_ANNOTATION)
        );
        assert_eq!(
            classify("title", &active).vocabulary,
            Some(crate::dialect::VOCAB_2020_12_META_DATA)
        );
    }

    #[test]
    fn unknown_keyword_has_no_vocabulary() {
        let active = modern();
        let descriptor = classify("x-vendor-extension", &active);
        assert_eq!(descriptor.category, KeywordCategory::Unknown);
        assert_eq!(descriptor.vocabulary, None);
    }

    #[test]
    fn ordering_follows_dependencies() {
        let active = modern();
        assert!(
            priority("else", &active, classify) > priority("if", &active, classify),
            "else must sort after if"
        );
        assert!(
            priority("unevaluatedProperties", &active, classify)
                > priority("additionalProperties", &active, classify)
        );
        assert!(
            priority("additionalProperties", &active, classify)
                > priority("properties", &active, classify)
        );
        assert_eq!(priority("allOf", &active, classify), 0);
    }

    #[test]
    fn legacy_unknown_depends_on_ref() {
        let mut active = Vocabularies::new();
        active.insert(DIALECT_DRAFT_7, true);
        let descriptor = classify("x-anything", &active);
        assert_eq!(descriptor.category, KeywordCategory::Unknown);
        assert_eq!(descriptor.dependencies, &["$ref"]);
        assert_eq!(classify("$ref", &active).category, KeywordCategory::Reference);
    }
}

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{JsonVetError, JsonVetResult};
use crate::resolver::SchemaResolver;

/// The official 2020-12 dialect and vocabulary identifiers.
pub const DIALECT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";
pub const VOCAB_2020_12_CORE: &str = "https://json-schema.org/draft/2020-12/vocab/core";
pub const VOCAB_2020_12_APPLICATOR: &str =
    "https://json-schema.org/draft/2020-12/vocab/applicator";
pub const VOCAB_2020_12_UNEVALUATED: &str =
    "https://json-schema.org/draft/2020-12/vocab/unevaluated";
pub const VOCAB_2020_12_VALIDATION: &str =
    "https://json-schema.org/draft/2020-12/vocab/validation";
pub const VOCAB_2020_12_META_DATA: &str = "https://json-schema.org/draft/2020-12/vocab/meta-data";
pub const VOCAB_2020_12_FORMAT_ANNOTATION: &str =
    "https://json-schema.org/draft/2020-12/vocab/format-annotation";
pub const VOCAB_2020_12_FORMAT_ASSERTION: &str =
    "https://json-schema.org/draft/2020-12/vocab/format-assertion";
pub const VOCAB_2020_12_CONTENT: &str = "https://json-schema.org/draft/2020-12/vocab/content";

/// The official 2019-09 dialect and vocabulary identifiers.
pub const DIALECT_2019_09: &str = "https://json-schema.org/draft/2019-09/schema";
pub const VOCAB_2019_09_CORE: &str = "https://json-schema.org/draft/2019-09/vocab/core";
pub const VOCAB_2019_09_APPLICATOR: &str =
    "https://json-schema.org/draft/2019-09/vocab/applicator";
pub const VOCAB_2019_09_VALIDATION: &str =
    "https://json-schema.org/draft/2019-09/vocab/validation";
pub const VOCAB_2019_09_META_DATA: &str = "https://json-schema.org/draft/2019-09/vocab/meta-data";
pub const VOCAB_2019_09_FORMAT: &str = "https://json-schema.org/draft/2019-09/vocab/format";
pub const VOCAB_2019_09_CONTENT: &str = "https://json-schema.org/draft/2019-09/vocab/content";

/// Pre-vocabulary dialects double as their own single pseudo-vocabulary.
pub const DIALECT_DRAFT_7: &str = "http://json-schema.org/draft-07/schema#";
pub const DIALECT_DRAFT_6: &str = "http://json-schema.org/draft-06/schema#";
pub const DIALECT_DRAFT_4: &str = "http://json-schema.org/draft-04/schema#";

/// The set of vocabularies active for one sub-schema, mapping vocabulary URI
/// to whether it is required. Inherited by embedded sub-schemas unless a
/// nested `$schema` overrides it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vocabularies(BTreeMap<String, bool>);

impl Vocabularies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, required: bool) {
        self.0.insert(uri.into(), required);
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.0.contains_key(uri)
    }

    pub fn get(&self, uri: &str) -> Option<bool> {
        self.0.get(uri).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(uri, required)| (uri.as_str(), *required))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, bool)> for Vocabularies {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(entries: I) -> Self {
        Self(entries.into_iter().collect())
    }
}

/// A schema document is either a keyword object or a boolean.
pub fn is_schema(document: &Value) -> bool {
    document.is_object() || document.is_boolean()
}

/// The dialect of a schema: its `$schema` value, falling back to the given
/// default. Boolean schemas cannot carry `$schema`.
pub fn dialect(schema: &Value, default_dialect: Option<&str>) -> Option<String> {
    if let Value::Object(members) = schema {
        if let Some(Value::String(uri)) = members.get("$schema") {
            return Some(uri.clone());
        }
    }

    default_dialect.map(str::to_string)
}

/// Walk the meta-schema chain up to the self-describing meta-schema that
/// anchors the dialect. The official dialect URIs short-circuit without
/// consulting the resolver. Returns `None` when a custom meta-schema cannot
/// be resolved, in which case every keyword classifies as unknown.
pub fn base_dialect(
    schema: &Value,
    resolver: &dyn SchemaResolver,
    default_dialect: Option<&str>,
) -> JsonVetResult<Option<String>> {
    let Some(effective) = dialect(schema, default_dialect) else {
        return Ok(None);
    };

    base_dialect_of_uri(&effective, schema, resolver)
}

fn base_dialect_of_uri(
    effective: &str,
    schema: &Value,
    resolver: &dyn SchemaResolver,
) -> JsonVetResult<Option<String>> {
    if matches!(
        effective,
        DIALECT_2020_12 | DIALECT_2019_09 | DIALECT_DRAFT_7 | DIALECT_DRAFT_6 | DIALECT_DRAFT_4
    ) {
        return Ok(Some(effective.to_string()));
    }

    // A meta-schema that identifies as its own dialect is the base dialect
    if let Value::Object(members) = schema {
        if let Some(Value::String(identifier)) = members.get("$id") {
            if identifier == effective {
                return Ok(Some(effective.to_string()));
            }
        }
    }

    match resolver.resolve(effective) {
        Some(metaschema) => {
            let Some(next) = dialect(&metaschema, None) else {
                return Ok(None);
            };
            if next == effective {
                return Ok(Some(effective.to_string()));
            }
            base_dialect_of_uri(&next, &metaschema, resolver)
        }
        None => {
            if crate::uri::is_absolute(effective) {
                Ok(None)
            } else {
                Err(JsonVetError::RelativeMetaschema(effective.to_string()))
            }
        }
    }
}

/// The identifying keyword spelling for a base dialect: modern drafts use
/// `$id`, draft-4 and older use bare `id`.
pub fn id_keyword(base_dialect: &str) -> Option<&'static str> {
    match base_dialect {
        DIALECT_2020_12 | DIALECT_2019_09 | DIALECT_DRAFT_7 | DIALECT_DRAFT_6 => Some("$id"),
        DIALECT_DRAFT_4 => Some("id"),
        _ => None,
    }
}

/// Whether a sibling `$ref` makes every other keyword inert, which is the
/// behavior of draft-7 and earlier.
pub fn ref_overrides_siblings(base_dialect: &str) -> bool {
    matches!(base_dialect, DIALECT_DRAFT_7 | DIALECT_DRAFT_6 | DIALECT_DRAFT_4)
}

/// The resource identifier a schema object declares, if any, honoring the
/// per-dialect spelling and the legacy `$ref` sibling override.
pub fn identify(
    schema: &Value,
    base_dialect: &str,
    default_id: Option<&str>,
) -> JsonVetResult<Option<String>> {
    let Value::Object(members) = schema else {
        return Ok(default_id.map(str::to_string));
    };

    let Some(keyword) = id_keyword(base_dialect) else {
        return Err(JsonVetError::UnknownBaseDialect(base_dialect.to_string()));
    };

    let Some(identifier) = members.get(keyword) else {
        return Ok(default_id.map(str::to_string));
    };

    match identifier {
        Value::String(identifier) if !identifier.is_empty() => {
            if members.contains_key("$ref") && ref_overrides_siblings(base_dialect) {
                Ok(default_id.map(str::to_string))
            } else {
                Ok(Some(identifier.clone()))
            }
        }
        _ => Err(JsonVetError::InvalidIdentifier(crate::pointer::Pointer::new())),
    }
}

/// The built-in vocabulary tables for the official dialect URIs.
pub fn official_vocabularies(dialect_uri: &str) -> Option<Vocabularies> {
    let entries: &[(&str, bool)] = match dialect_uri {
        DIALECT_2020_12 => &[
            (VOCAB_2020_12_CORE, true),
            (VOCAB_2020_12_APPLICATOR, true),
            (VOCAB_2020_12_UNEVALUATED, true),
            (VOCAB_2020_12_VALIDATION, true),
            (VOCAB_2020_12_META_DATA, true),
            (VOCAB_2020_12_FORMAT_ANNOTATION, true),
            (VOCAB_2020_12_CONTENT, true),
        ],
        DIALECT_2019_09 => &[
            (VOCAB_2019_09_CORE, true),
            (VOCAB_2019_09_APPLICATOR, true),
            (VOCAB_2019_09_VALIDATION, true),
            (VOCAB_2019_09_META_DATA, true),
            (VOCAB_2019_09_FORMAT, false),
            (VOCAB_2019_09_CONTENT, true),
        ],
        DIALECT_DRAFT_7 => &[(DIALECT_DRAFT_7, true)],
        DIALECT_DRAFT_6 => &[(DIALECT_DRAFT_6, true)],
        DIALECT_DRAFT_4 => &[(DIALECT_DRAFT_4, true)],
        _ => return None,
    };

    Some(
        entries
            .iter()
            .map(|(uri, required)| (uri.to_string(), *required))
            .collect(),
    )
}

/// The vocabulary set active for a schema with the given dialect. Official
/// dialects resolve without I/O. Custom meta-schemas are fetched through the
/// resolver and honored via their `$vocabulary` member; an unresolvable
/// absolute meta-schema degrades to the empty set.
pub fn vocabularies(
    dialect_uri: &str,
    resolver: &dyn SchemaResolver,
) -> JsonVetResult<Vocabularies> {
    if let Some(known) = official_vocabularies(dialect_uri) {
        return Ok(known);
    }

    let Some(metaschema) = resolver.resolve(dialect_uri) else {
        if crate::uri::is_absolute(dialect_uri) {
            return Ok(Vocabularies::new());
        }
        return Err(JsonVetError::RelativeMetaschema(dialect_uri.to_string()));
    };

    if let Value::Object(members) = &metaschema {
        if let Some(Value::Object(declared)) = members.get("$vocabulary") {
            let mut result = Vocabularies::new();
            for (uri, required) in declared {
                match required {
                    Value::Bool(required) => result.insert(uri.clone(), *required),
                    other => {
                        return Err(JsonVetError::InvalidKeywordValue {
                            keyword: "$vocabulary".to_string(),
                            pointer: crate::pointer::Pointer::new(),
                            value: other.clone(),
                        })
                    }
                }
            }
            return Ok(result);
        }
    }

    // No $vocabulary member: inherit from the meta-schema's own dialect
    match dialect(&metaschema, None) {
        Some(next) if next != dialect_uri => vocabularies(&next, resolver),
        Some(next) => Ok(official_vocabularies(&next).unwrap_or_default()),
        None => Ok(Vocabularies::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::EmptyResolver;
    use serde_json::json;

    #[test]
    fn official_dialects_need_no_resolver() {
        let schema = json!({"$schema": DIALECT_2020_12, "type": "string"});
        let base = base_dialect(&schema, &EmptyResolver, None).unwrap();
        assert_eq!(base.as_deref(), Some(DIALECT_2020_12));
        let vocabularies = vocabularies(DIALECT_2020_12, &EmptyResolver).unwrap();
        assert!(vocabularies.contains(VOCAB_2020_12_CORE));
        assert!(vocabularies.contains(VOCAB_2020_12_VALIDATION));
    }

    #[test]
    fn draft4_uses_bare_id() {
        assert_eq!(id_keyword(DIALECT_DRAFT_4), Some("id"));
        let schema = json!({"id": "https://example.com/s", "type": "object"});
        let identifier = identify(&schema, DIALECT_DRAFT_4, None).unwrap();
        assert_eq!(identifier.as_deref(), Some("https://example.com/s"));
    }

    #[test]
    fn legacy_ref_makes_id_inert() {
        let schema = json!({"$id": "https://example.com/s", "$ref": "#/definitions/a"});
        assert_eq!(identify(&schema, DIALECT_DRAFT_7, None).unwrap(), None);
        assert_eq!(
            identify(&schema, DIALECT_2020_12, None).unwrap().as_deref(),
            Some("https://example.com/s")
        );
    }

    #[test]
    fn unresolvable_custom_metaschema_degrades() {
        let result = vocabularies("https://example.com/meta", &EmptyResolver).unwrap();
        assert!(result.is_empty());
        assert!(matches!(
            vocabularies("meta", &EmptyResolver),
            Err(JsonVetError::RelativeMetaschema(_))
        ));
    }
}

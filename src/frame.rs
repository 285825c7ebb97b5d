use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::dialect::{self, Vocabularies};
use crate::error::{JsonVetError, JsonVetResult};
use crate::pointer::Pointer;
use crate::resolver::SchemaResolver;
use crate::uri;
use crate::walker::{KeywordCategory, SchemaWalker, Traversal};

/// Whether a reference participates in static or dynamic resolution. Part of
/// every location and reference key, because a static and a dynamic
/// reference may point at the same URI from the same schema object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Static,
    Dynamic,
}

/// What a framed location addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    /// A sub-schema that introduces its own base URI
    Resource,
    /// A traversable sub-schema without an identifier of its own
    Subschema,
    /// A plain keyword position, recorded in [`FrameMode::Locations`] only
    Pointer,
    /// A named location addressable by URI fragment
    Anchor,
}

/// One identifiable place in the resolved document graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub location_type: LocationType,
    /// The root resource URI of the owning document; `None` for anonymous
    /// documents
    pub root: Option<String>,
    /// Base URI of the containing resource (empty for anonymous documents)
    pub base: String,
    /// JSON Pointer from the owning document's root
    pub pointer: Pointer,
    /// JSON Pointer from the containing resource
    pub relative_pointer: Pointer,
    pub dialect: String,
    pub base_dialect: String,
    /// Pointer of the enclosing sub-schema, `None` at the document root
    pub parent: Option<Pointer>,
    /// Never reachable from the document root by evaluation structure or
    /// reference
    pub orphan: bool,
    /// Every reference whose resolution lands here, by reference key
    pub destination_of: Vec<(ReferenceKind, Pointer)>,
}

/// A reference edge as written in the schema, post URI resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    /// The fully resolved destination URI, fragment included
    pub destination: String,
    /// The destination resource, fragment excluded
    pub base: Option<String>,
    pub fragment: Option<String>,
}

/// How much bookkeeping the frame records. The compiler only needs
/// [`FrameMode::References`]; tooling that wants every keyword position uses
/// [`FrameMode::Locations`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameMode {
    Locations,
    #[default]
    References,
}

type Node = (Option<String>, Pointer);

/// The immutable location/reference graph of one root schema document plus
/// every external resource it statically reaches. Construction is
/// deterministic: the same document and resolver answers produce an
/// identical graph.
#[derive(Debug, Default)]
pub struct Frame {
    mode: FrameMode,
    locations: BTreeMap<(ReferenceKind, String), Location>,
    references: BTreeMap<(ReferenceKind, Pointer), Reference>,
    /// External documents pulled in through the resolver, by root URI
    documents: BTreeMap<String, Value>,
    /// Evaluation-reachable sub-schema pointers per document
    reachable: BTreeSet<Node>,
    /// All sub-schema pointers per document, for ownership queries
    subschemas: BTreeSet<Node>,
}

/// A pending reference gathered during traversal, resolved in a second pass
/// so that forward and sibling references work.
#[derive(Debug)]
struct PendingReference {
    kind: ReferenceKind,
    origin: Pointer,
    base: String,
    target: String,
}

/// Traversal state for one sub-schema visit.
#[derive(Clone)]
struct VisitFrame {
    document: Option<String>,
    pointer: Pointer,
    /// Enclosing resources, outermost first: (URI, absolute pointer)
    resources: Vec<(String, Pointer)>,
    dialect: String,
    parent: Option<Pointer>,
}

struct Builder<'a> {
    walker: SchemaWalker,
    resolver: &'a dyn SchemaResolver,
    mode: FrameMode,
    default_dialect: Option<&'a str>,
    frame: Frame,
    pending: Vec<PendingReference>,
    /// Evaluation containment edges between sub-schemas; definition
    /// containers such as `$defs` do not contribute edges
    children: BTreeMap<Node, Vec<Node>>,
    /// Reference origins per owning sub-schema
    origins: BTreeMap<Node, Vec<(ReferenceKind, Pointer)>>,
    vocabulary_cache: BTreeMap<String, Vocabularies>,
}

impl Frame {
    /// Frame a schema document: collect every identifiable location and
    /// resolve every reference, fetching external resources through the
    /// resolver as needed.
    pub fn build(
        schema: &Value,
        walker: SchemaWalker,
        resolver: &dyn SchemaResolver,
        mode: FrameMode,
        default_dialect: Option<&str>,
        default_id: Option<&str>,
    ) -> JsonVetResult<Frame> {
        if !dialect::is_schema(schema) {
            return Err(JsonVetError::NotASchema);
        }

        let mut builder = Builder {
            walker,
            resolver,
            mode,
            default_dialect,
            frame: Frame {
                mode,
                ..Frame::default()
            },
            pending: Vec::new(),
            children: BTreeMap::new(),
            origins: BTreeMap::new(),
            vocabulary_cache: BTreeMap::new(),
        };

        builder.traverse_document(schema, None, default_id)?;
        builder.resolve_references(schema)?;
        builder.compute_reachability();

        debug!(
            "framed schema: {} locations, {} references",
            builder.frame.locations.len(),
            builder.frame.references.len()
        );

        Ok(builder.frame)
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn locations(&self) -> &BTreeMap<(ReferenceKind, String), Location> {
        &self.locations
    }

    pub fn references(&self) -> &BTreeMap<(ReferenceKind, Pointer), Reference> {
        &self.references
    }

    pub fn location(&self, kind: ReferenceKind, uri: &str) -> Option<&Location> {
        self.locations.get(&(kind, uri.to_string()))
    }

    /// Whether any location answers to the given URI, statically.
    pub fn defines(&self, uri: &str) -> bool {
        self.location(ReferenceKind::Static, uri).is_some()
    }

    pub fn reference_at(&self, kind: ReferenceKind, origin: &Pointer) -> Option<&Reference> {
        self.references.get(&(kind, origin.clone()))
    }

    /// The document a location lives in: the caller's root schema, or an
    /// external resource fetched during framing.
    pub fn document<'a>(&'a self, root: Option<&str>, root_schema: &'a Value) -> &'a Value {
        match root {
            Some(uri) => self.documents.get(uri).unwrap_or(root_schema),
            None => root_schema,
        }
    }

    /// Whether the sub-schema at the given document/pointer participates in
    /// evaluation reachable from the root.
    pub fn is_reachable(&self, document: Option<&str>, pointer: &Pointer) -> bool {
        self.reachable
            .contains(&(document.map(str::to_string), pointer.clone()))
    }

    /// The external documents fetched through the resolver during framing.
    pub fn external_documents(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.documents
            .iter()
            .map(|(uri, document)| (uri.as_str(), document))
    }

    /// Every dynamic anchor in the graph as (anchor name, location URI,
    /// location). The compiler precompiles jump labels from this set.
    pub fn dynamic_anchors(&self) -> impl Iterator<Item = (&str, &str, &Location)> {
        self.locations
            .iter()
            .filter(|((kind, _), location)| {
                *kind == ReferenceKind::Dynamic && location.location_type == LocationType::Anchor
            })
            .map(|((_, key), location)| {
                let (_, fragment) = uri::split_fragment(key);
                (fragment.unwrap_or(""), key.as_str(), location)
            })
    }
}

impl<'a> Builder<'a> {
    fn vocabularies_for(&mut self, dialect_uri: &str) -> JsonVetResult<Vocabularies> {
        if let Some(cached) = self.vocabulary_cache.get(dialect_uri) {
            return Ok(cached.clone());
        }

        let resolved = dialect::vocabularies(dialect_uri, self.resolver)?;
        self.vocabulary_cache
            .insert(dialect_uri.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Traverse one document depth-first, registering locations and
    /// collecting pending references.
    fn traverse_document(
        &mut self,
        document: &Value,
        document_key: Option<String>,
        default_id: Option<&str>,
    ) -> JsonVetResult<()> {
        let Some(root_dialect) = dialect::dialect(document, self.default_dialect) else {
            return Err(JsonVetError::UnknownDialect);
        };

        let mut stack = vec![VisitFrame {
            document: document_key,
            pointer: Pointer::new(),
            resources: Vec::new(),
            dialect: root_dialect,
            parent: None,
        }];

        // Only the document root may receive an externally supplied
        // identifier
        let mut root_default_id = default_id.map(str::to_string);

        while let Some(visit) = stack.pop() {
            let Some(subschema) = visit.pointer.resolve(document) else {
                continue;
            };
            if !dialect::is_schema(subschema) {
                continue;
            }

            let current_dialect = dialect::dialect(subschema, Some(&visit.dialect))
                .unwrap_or_else(|| visit.dialect.clone());
            let base_dialect =
                dialect::base_dialect(subschema, self.resolver, Some(&current_dialect))?
                    .unwrap_or_else(|| current_dialect.clone());
            let vocabularies = self.vocabularies_for(&current_dialect)?;

            let mut resources = visit.resources.clone();
            self.register_identifiers(
                subschema,
                &visit,
                &vocabularies,
                &current_dialect,
                &base_dialect,
                &mut resources,
                root_default_id.take().as_deref(),
            )?;

            self.register_subschema(&visit, &resources, &current_dialect, &base_dialect);
            self.frame
                .subschemas
                .insert((visit.document.clone(), visit.pointer.clone()));

            let Value::Object(members) = subschema else {
                continue;
            };

            for (keyword, value) in members {
                let descriptor = (self.walker)(keyword, &vocabularies);
                let member_pointer = visit.pointer.join(keyword.as_str());

                if descriptor.category == KeywordCategory::Reference {
                    self.collect_reference(keyword, value, &member_pointer, &visit, &resources)?;
                    self.register_pointer(
                        &member_pointer,
                        &visit,
                        &resources,
                        &current_dialect,
                        &base_dialect,
                    );
                    continue;
                }

                // Children of definition containers are addressable but do
                // not participate in evaluation from here
                let evaluable = descriptor.category != KeywordCategory::LocationMembers;

                match descriptor.category.traversal() {
                    Traversal::None => {
                        self.register_pointer(
                            &member_pointer,
                            &visit,
                            &resources,
                            &current_dialect,
                            &base_dialect,
                        );
                    }
                    Traversal::Value => {
                        if dialect::is_schema(value) {
                            self.push_child(
                                &mut stack,
                                &visit,
                                &resources,
                                member_pointer,
                                &current_dialect,
                                evaluable,
                            );
                        } else {
                            self.register_pointer(
                                &member_pointer,
                                &visit,
                                &resources,
                                &current_dialect,
                                &base_dialect,
                            );
                        }
                    }
                    Traversal::Elements => {
                        self.register_pointer(
                            &member_pointer,
                            &visit,
                            &resources,
                            &current_dialect,
                            &base_dialect,
                        );
                        if let Value::Array(items) = value {
                            for index in 0..items.len() {
                                self.push_child(
                                    &mut stack,
                                    &visit,
                                    &resources,
                                    member_pointer.join(index),
                                    &current_dialect,
                                    evaluable,
                                );
                            }
                        }
                    }
                    Traversal::Members => {
                        self.register_pointer(
                            &member_pointer,
                            &visit,
                            &resources,
                            &current_dialect,
                            &base_dialect,
                        );
                        if let Value::Object(entries) = value {
                            for name in entries.keys() {
                                self.push_child(
                                    &mut stack,
                                    &visit,
                                    &resources,
                                    member_pointer.join(name.as_str()),
                                    &current_dialect,
                                    evaluable,
                                );
                            }
                        }
                    }
                    Traversal::ValueOrElements => {
                        if let Value::Array(items) = value {
                            self.register_pointer(
                                &member_pointer,
                                &visit,
                                &resources,
                                &current_dialect,
                                &base_dialect,
                            );
                            for index in 0..items.len() {
                                self.push_child(
                                    &mut stack,
                                    &visit,
                                    &resources,
                                    member_pointer.join(index),
                                    &current_dialect,
                                    evaluable,
                                );
                            }
                        } else if dialect::is_schema(value) {
                            self.push_child(
                                &mut stack,
                                &visit,
                                &resources,
                                member_pointer,
                                &current_dialect,
                                evaluable,
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn push_child(
        &mut self,
        stack: &mut Vec<VisitFrame>,
        visit: &VisitFrame,
        resources: &[(String, Pointer)],
        pointer: Pointer,
        current_dialect: &str,
        evaluable: bool,
    ) {
        if evaluable {
            self.children
                .entry((visit.document.clone(), visit.pointer.clone()))
                .or_default()
                .push((visit.document.clone(), pointer.clone()));
        }

        stack.push(VisitFrame {
            document: visit.document.clone(),
            pointer,
            resources: resources.to_vec(),
            dialect: current_dialect.to_string(),
            parent: Some(visit.pointer.clone()),
        });
    }

    /// Register resource identifiers and anchors declared by this
    /// sub-schema, updating the enclosing resource list in place.
    #[allow(clippy::too_many_arguments)]
    fn register_identifiers(
        &mut self,
        subschema: &Value,
        visit: &VisitFrame,
        vocabularies: &Vocabularies,
        current_dialect: &str,
        base_dialect: &str,
        resources: &mut Vec<(String, Pointer)>,
        default_id: Option<&str>,
    ) -> JsonVetResult<()> {
        let Value::Object(members) = subschema else {
            if let Some(identifier) = default_id {
                self.register_resource(
                    identifier.to_string(),
                    visit,
                    current_dialect,
                    base_dialect,
                    resources,
                )?;
            }
            return Ok(());
        };

        let current_base = resources.last().map(|(uri, _)| uri.clone());

        let declared = if dialect::id_keyword(base_dialect).is_some() {
            dialect::identify(subschema, base_dialect, default_id).map_err(|error| match error {
                JsonVetError::InvalidIdentifier(_) => {
                    JsonVetError::InvalidIdentifier(visit.pointer.clone())
                }
                other => other,
            })?
        } else {
            default_id.map(str::to_string)
        };

        if let Some(identifier) = declared {
            let resolved = uri::resolve(current_base.as_deref(), &identifier)?;
            let (base_part, fragment) = uri::split_fragment(&resolved);
            let base_part = base_part.to_string();

            match fragment {
                Some(fragment) if !fragment.is_empty() => {
                    // Legacy `$id: "#name"` spelling registers an anchor
                    let fragment = fragment.to_string();
                    if !base_part.is_empty() && Some(base_part.as_str()) != current_base.as_deref()
                    {
                        self.register_resource(
                            base_part,
                            visit,
                            current_dialect,
                            base_dialect,
                            resources,
                        )?;
                    }
                    let anchor_base = resources
                        .last()
                        .map(|(uri, _)| uri.clone())
                        .unwrap_or_default();
                    self.register_anchor(
                        ReferenceKind::Static,
                        &anchor_base,
                        &fragment,
                        visit,
                        resources,
                        current_dialect,
                        base_dialect,
                    )?;
                }
                _ => {
                    self.register_resource(
                        base_part,
                        visit,
                        current_dialect,
                        base_dialect,
                        resources,
                    )?;
                }
            }
        }

        let anchor_base = resources
            .last()
            .map(|(uri, _)| uri.clone())
            .unwrap_or_default();

        if vocabularies.contains(dialect::VOCAB_2020_12_CORE) {
            for (keyword, kind) in [
                ("$anchor", ReferenceKind::Static),
                ("$dynamicAnchor", ReferenceKind::Dynamic),
            ] {
                let Some(value) = members.get(keyword) else {
                    continue;
                };
                let Value::String(name) = value else {
                    return Err(JsonVetError::InvalidKeywordValue {
                        keyword: keyword.to_string(),
                        pointer: visit.pointer.clone(),
                        value: value.clone(),
                    });
                };
                self.register_anchor(
                    kind,
                    &anchor_base,
                    name,
                    visit,
                    resources,
                    current_dialect,
                    base_dialect,
                )?;
                // A dynamic anchor is also addressable statically
                if kind == ReferenceKind::Dynamic {
                    self.register_anchor(
                        ReferenceKind::Static,
                        &anchor_base,
                        name,
                        visit,
                        resources,
                        current_dialect,
                        base_dialect,
                    )?;
                }
            }
        } else if vocabularies.contains(dialect::VOCAB_2019_09_CORE) {
            if let Some(value) = members.get("$anchor") {
                let Value::String(name) = value else {
                    return Err(JsonVetError::InvalidKeywordValue {
                        keyword: "$anchor".to_string(),
                        pointer: visit.pointer.clone(),
                        value: value.clone(),
                    });
                };
                self.register_anchor(
                    ReferenceKind::Static,
                    &anchor_base,
                    name,
                    visit,
                    resources,
                    current_dialect,
                    base_dialect,
                )?;
            }

            if let Some(value) = members.get("$recursiveAnchor") {
                let Value::Bool(enabled) = value else {
                    return Err(JsonVetError::InvalidKeywordValue {
                        keyword: "$recursiveAnchor".to_string(),
                        pointer: visit.pointer.clone(),
                        value: value.clone(),
                    });
                };
                // The recursive anchor has no name of its own; it behaves
                // like a dynamic anchor with an empty name
                if *enabled {
                    self.register_anchor(
                        ReferenceKind::Dynamic,
                        &anchor_base,
                        "",
                        visit,
                        resources,
                        current_dialect,
                        base_dialect,
                    )?;
                }
            }
        }

        Ok(())
    }

    fn register_resource(
        &mut self,
        identifier: String,
        visit: &VisitFrame,
        current_dialect: &str,
        base_dialect: &str,
        resources: &mut Vec<(String, Pointer)>,
    ) -> JsonVetResult<()> {
        let key = (ReferenceKind::Static, identifier.clone());
        if let Some(existing) = self.frame.locations.get(&key) {
            if existing.pointer != visit.pointer {
                return Err(JsonVetError::DuplicateResource {
                    identifier,
                    pointer: visit.pointer.clone(),
                });
            }
        }

        resources.push((identifier.clone(), visit.pointer.clone()));
        let root = root_uri(resources).map(str::to_string);
        self.frame.locations.insert(
            key,
            Location {
                location_type: LocationType::Resource,
                root,
                base: identifier,
                pointer: visit.pointer.clone(),
                relative_pointer: Pointer::new(),
                dialect: current_dialect.to_string(),
                base_dialect: base_dialect.to_string(),
                parent: visit.parent.clone(),
                orphan: false,
                destination_of: Vec::new(),
            },
        );

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn register_anchor(
        &mut self,
        kind: ReferenceKind,
        base: &str,
        name: &str,
        visit: &VisitFrame,
        resources: &[(String, Pointer)],
        current_dialect: &str,
        base_dialect: &str,
    ) -> JsonVetResult<()> {
        let key = (kind, uri::with_fragment(base, name));
        if let Some(existing) = self.frame.locations.get(&key) {
            if existing.pointer != visit.pointer {
                return Err(JsonVetError::AmbiguousAnchor {
                    anchor: name.to_string(),
                    pointer: visit.pointer.clone(),
                });
            }
        }

        self.frame.locations.insert(
            key,
            Location {
                location_type: LocationType::Anchor,
                root: root_uri(resources).map(str::to_string),
                base: base.to_string(),
                pointer: visit.pointer.clone(),
                relative_pointer: relative_pointer(visit, resources),
                dialect: current_dialect.to_string(),
                base_dialect: base_dialect.to_string(),
                parent: visit.parent.clone(),
                orphan: false,
                destination_of: Vec::new(),
            },
        );

        Ok(())
    }

    /// Register the sub-schema location itself, keyed under every enclosing
    /// resource.
    fn register_subschema(
        &mut self,
        visit: &VisitFrame,
        resources: &[(String, Pointer)],
        current_dialect: &str,
        base_dialect: &str,
    ) {
        let root = root_uri(resources).map(str::to_string);
        let nearest_base = resources
            .last()
            .map(|(uri, _)| uri.clone())
            .unwrap_or_default();

        for (base_uri, relative) in resource_relative_keys(&visit.pointer, resources) {
            if relative.is_empty() && !base_uri.is_empty() {
                // The resource registration already covers this key
                continue;
            }

            let key = (
                ReferenceKind::Static,
                uri::with_fragment(&base_uri, &relative.to_fragment()),
            );
            self.frame.locations.entry(key).or_insert_with(|| Location {
                location_type: LocationType::Subschema,
                root: root.clone(),
                base: nearest_base.clone(),
                pointer: visit.pointer.clone(),
                relative_pointer: relative_pointer(visit, resources),
                dialect: current_dialect.to_string(),
                base_dialect: base_dialect.to_string(),
                parent: visit.parent.clone(),
                orphan: false,
                destination_of: Vec::new(),
            });
        }
    }

    /// Register a plain keyword position. Skipped entirely in
    /// references-only mode.
    fn register_pointer(
        &mut self,
        member_pointer: &Pointer,
        visit: &VisitFrame,
        resources: &[(String, Pointer)],
        current_dialect: &str,
        base_dialect: &str,
    ) {
        if self.mode != FrameMode::Locations {
            return;
        }

        let root = root_uri(resources).map(str::to_string);
        let nearest_base = resources
            .last()
            .map(|(uri, _)| uri.clone())
            .unwrap_or_default();
        let relative = match resources.last() {
            Some((_, resource_pointer)) => member_pointer
                .strip_prefix(resource_pointer)
                .unwrap_or_else(|| member_pointer.clone()),
            None => member_pointer.clone(),
        };

        for (base_uri, key_relative) in resource_relative_keys(member_pointer, resources) {
            let key = (
                ReferenceKind::Static,
                uri::with_fragment(&base_uri, &key_relative.to_fragment()),
            );
            self.frame.locations.entry(key).or_insert_with(|| Location {
                location_type: LocationType::Pointer,
                root: root.clone(),
                base: nearest_base.clone(),
                pointer: member_pointer.clone(),
                relative_pointer: relative.clone(),
                dialect: current_dialect.to_string(),
                base_dialect: base_dialect.to_string(),
                parent: Some(visit.pointer.clone()),
                orphan: false,
                destination_of: Vec::new(),
            });
        }
    }

    fn collect_reference(
        &mut self,
        keyword: &str,
        value: &Value,
        member_pointer: &Pointer,
        visit: &VisitFrame,
        resources: &[(String, Pointer)],
    ) -> JsonVetResult<()> {
        let Value::String(target) = value else {
            return Err(JsonVetError::InvalidKeywordValue {
                keyword: keyword.to_string(),
                pointer: member_pointer.clone(),
                value: value.clone(),
            });
        };

        let kind = match keyword {
            "$dynamicRef" | "$recursiveRef" => ReferenceKind::Dynamic,
            _ => ReferenceKind::Static,
        };

        // $recursiveRef only ever points at the current resource root
        if keyword == "$recursiveRef" && target != "#" {
            return Err(JsonVetError::InvalidKeywordValue {
                keyword: keyword.to_string(),
                pointer: member_pointer.clone(),
                value: value.clone(),
            });
        }

        self.origins
            .entry((visit.document.clone(), visit.pointer.clone()))
            .or_default()
            .push((kind, member_pointer.clone()));

        self.pending.push(PendingReference {
            kind,
            origin: member_pointer.clone(),
            base: resources
                .last()
                .map(|(uri, _)| uri.clone())
                .unwrap_or_default(),
            target: target.clone(),
        });

        Ok(())
    }

    /// Second pass: resolve every pending reference, pulling external
    /// documents through the resolver when a destination base is unknown.
    fn resolve_references(&mut self, root_schema: &Value) -> JsonVetResult<()> {
        let mut queue: VecDeque<PendingReference> = std::mem::take(&mut self.pending).into();

        while let Some(pending) = queue.pop_front() {
            let destination = uri::resolve(
                if pending.base.is_empty() {
                    None
                } else {
                    Some(&pending.base)
                },
                &pending.target,
            )?;
            let (base_part, fragment) = uri::split_fragment(&destination);
            let base_part = base_part.to_string();
            let fragment = fragment.map(str::to_string);
            let normalized = uri::with_fragment(&base_part, fragment.as_deref().unwrap_or(""));

            let resolved =
                self.ensure_destination(&pending, &base_part, &fragment, &normalized, root_schema)?;
            if !resolved {
                return Err(JsonVetError::UnresolvedReference {
                    identifier: normalized,
                    origin: pending.origin.clone(),
                });
            }

            // References discovered while traversing an external document
            // get resolved too
            queue.extend(std::mem::take(&mut self.pending));

            if let Some(location) = self
                .frame
                .locations
                .get_mut(&(ReferenceKind::Static, normalized.clone()))
            {
                location
                    .destination_of
                    .push((pending.kind, pending.origin.clone()));
            }

            self.frame.references.insert(
                (pending.kind, pending.origin),
                Reference {
                    destination: normalized,
                    base: if base_part.is_empty() {
                        None
                    } else {
                        Some(base_part)
                    },
                    fragment,
                },
            );
        }

        Ok(())
    }

    /// Make sure a destination URI is backed by a location, fetching and
    /// traversing external documents if needed. Returns whether the
    /// destination exists.
    fn ensure_destination(
        &mut self,
        pending: &PendingReference,
        base_part: &str,
        fragment: &Option<String>,
        normalized: &str,
        root_schema: &Value,
    ) -> JsonVetResult<bool> {
        // Dynamic references resolve at evaluation time; the static
        // candidate recorded here is only the fallback
        if self
            .frame
            .locations
            .contains_key(&(ReferenceKind::Static, normalized.to_string()))
        {
            return Ok(true);
        }

        // Unknown base resource: consult the resolver once
        let base_known = base_part.is_empty()
            || self
                .frame
                .locations
                .contains_key(&(ReferenceKind::Static, base_part.to_string()));
        if !base_known && !self.frame.documents.contains_key(base_part) {
            let Some(document) = self.resolver.resolve(base_part) else {
                return Err(JsonVetError::Resolution {
                    identifier: base_part.to_string(),
                    origin: pending.origin.clone(),
                });
            };
            self.frame
                .documents
                .insert(base_part.to_string(), document.clone());
            self.traverse_document(&document, Some(base_part.to_string()), Some(base_part))?;

            if self
                .frame
                .locations
                .contains_key(&(ReferenceKind::Static, normalized.to_string()))
            {
                return Ok(true);
            }
        }

        // A pointer fragment may address a position that references-only
        // mode did not record; accept it when the pointer resolves inside
        // the owning document
        let Some(fragment) = fragment else {
            return Ok(false);
        };
        if !fragment.is_empty() && !fragment.starts_with('/') {
            return Ok(false);
        }

        let pointer = Pointer::parse(fragment)?;
        let Some(base_location) = self
            .frame
            .locations
            .get(&(ReferenceKind::Static, base_part.to_string()))
        else {
            return Ok(false);
        };

        let root = base_location.root.clone();
        let absolute = base_location.pointer.concat(&pointer);
        let dialect = base_location.dialect.clone();
        let base_dialect = base_location.base_dialect.clone();
        let exists = match &root {
            Some(uri) if self.frame.documents.contains_key(uri) => self
                .frame
                .documents
                .get(uri)
                .and_then(|document| absolute.resolve(document))
                .is_some(),
            _ => absolute.resolve(root_schema).is_some(),
        };
        if !exists {
            return Ok(false);
        }

        self.frame.locations.insert(
            (ReferenceKind::Static, normalized.to_string()),
            Location {
                location_type: LocationType::Subschema,
                root,
                base: base_part.to_string(),
                pointer: absolute,
                relative_pointer: pointer,
                dialect,
                base_dialect,
                parent: None,
                orphan: false,
                destination_of: Vec::new(),
            },
        );
        Ok(true)
    }

    /// Mark orphans: locations not reachable from the document root by
    /// evaluation structure (applicator containment) or by reference.
    fn compute_reachability(&mut self) {
        let mut reachable: BTreeSet<Node> = BTreeSet::new();
        let mut queue: VecDeque<Node> = VecDeque::from([(None, Pointer::new())]);
        self.expand_reachable(&mut reachable, &mut queue);

        // Pessimistic dynamic closure: a reachable dynamic reference may
        // land on any same-named dynamic anchor at evaluation time, so such
        // anchors count as reachable; iterate to a fixed point because a
        // newly reachable anchor subtree can carry further references
        loop {
            let mut queue: VecDeque<Node> = VecDeque::new();
            for (owner, origins) in &self.origins {
                if !reachable.contains(owner) {
                    continue;
                }
                for (kind, origin) in origins {
                    if *kind != ReferenceKind::Dynamic {
                        continue;
                    }
                    let Some(reference) = self.frame.references.get(&(*kind, origin.clone()))
                    else {
                        continue;
                    };
                    let name = reference.fragment.as_deref().unwrap_or("");
                    for (anchor_name, _, location) in self.frame.dynamic_anchors() {
                        if anchor_name != name {
                            continue;
                        }
                        let node = (
                            document_key(&self.frame.documents, &location.root),
                            location.pointer.clone(),
                        );
                        if !reachable.contains(&node) && !queue.contains(&node) {
                            queue.push_back(node);
                        }
                    }
                }
            }
            if queue.is_empty() {
                break;
            }
            self.expand_reachable(&mut reachable, &mut queue);
        }

        for location in self.frame.locations.values_mut() {
            let document = document_key(&self.frame.documents, &location.root);
            let mut owner = location.pointer.clone();
            let owned = loop {
                if self
                    .frame
                    .subschemas
                    .contains(&(document.clone(), owner.clone()))
                    || owner.is_empty()
                {
                    break owner;
                }
                owner = owner.parent();
            };
            location.orphan = !reachable.contains(&(document, owned));
        }

        self.frame.reachable = reachable;
    }

    fn expand_reachable(&self, reachable: &mut BTreeSet<Node>, queue: &mut VecDeque<Node>) {
        while let Some(node) = queue.pop_front() {
            if !reachable.insert(node.clone()) {
                continue;
            }

            if let Some(children) = self.children.get(&node) {
                for child in children {
                    if !reachable.contains(child) {
                        queue.push_back(child.clone());
                    }
                }
            }

            let Some(origins) = self.origins.get(&node) else {
                continue;
            };
            for (kind, origin) in origins {
                let Some(reference) = self.frame.references.get(&(*kind, origin.clone())) else {
                    continue;
                };
                let Some(destination) = self
                    .frame
                    .locations
                    .get(&(ReferenceKind::Static, reference.destination.clone()))
                else {
                    continue;
                };
                let target = (
                    document_key(&self.frame.documents, &destination.root),
                    destination.pointer.clone(),
                );
                if !reachable.contains(&target) {
                    queue.push_back(target);
                }
            }
        }
    }
}

/// The document root resource of a resource chain, which by construction is
/// the one registered at the empty pointer.
fn root_uri(resources: &[(String, Pointer)]) -> Option<&str> {
    resources
        .iter()
        .find(|(_, pointer)| pointer.is_empty())
        .map(|(uri, _)| uri.as_str())
}

fn relative_pointer(visit: &VisitFrame, resources: &[(String, Pointer)]) -> Pointer {
    match resources.last() {
        Some((_, resource_pointer)) => visit
            .pointer
            .strip_prefix(resource_pointer)
            .unwrap_or_else(|| visit.pointer.clone()),
        None => visit.pointer.clone(),
    }
}

/// The (base URI, relative pointer) pairs a position is addressable under:
/// one per enclosing resource, plus the anonymous key when the document has
/// no resource identifier at all.
fn resource_relative_keys(
    pointer: &Pointer,
    resources: &[(String, Pointer)],
) -> Vec<(String, Pointer)> {
    let mut keys = Vec::new();
    if resources.is_empty() {
        keys.push((String::new(), pointer.clone()));
    }
    for (resource_uri, resource_pointer) in resources {
        if let Some(relative) = pointer.strip_prefix(resource_pointer) {
            keys.push((resource_uri.clone(), relative));
        }
    }

    keys
}

/// Map a location's owning root resource to the internal document key:
/// `Some` for fetched external documents, `None` for the caller's document.
fn document_key(documents: &BTreeMap<String, Value>, root: &Option<String>) -> Option<String> {
    root.as_ref()
        .filter(|uri| documents.contains_key(*uri))
        .cloned()
}

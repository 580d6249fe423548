//! Traversal over the trie and, below class-typed properties, the class graph.
//!
//! A match is a list of [`PathElement`]s from the first level down. Exact
//! resolution requires every segment to match; prefix search collects every
//! path consistent with a partially typed query.

use crate::class_graph::{BeanMember, ClassNode, ClassShape, GraphContext, Literal};
use crate::key::KeyPath;
use crate::metadata::DeprecationLevel;
use crate::tree::{NodeId, NodeKind, PropertyMeta, SuggestionTrie};
use crate::types::SuggestionNodeType;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Transparent hops (into collection elements) a query may take beyond one
/// per remaining segment.
pub const MAX_TRANSPARENT_HOPS: usize = 8;

/// One matched step of a key path.
#[derive(Debug, Clone)]
pub enum PathElement {
    /// Node of the metadata trie
    Trie(NodeId),
    /// Map key taken from a property's `.keys` hint
    HintKey {
        property: NodeId,
        key: String,
        description: Option<String>,
    },
    /// Member of a bean type
    Member(Arc<BeanMember>),
    /// Key of a map-typed value
    MapKey { key: String, map: Arc<ClassNode> },
    /// `true`/`false` or an enum constant used as a key
    Literal {
        literal: Literal,
        owner: Arc<ClassNode>,
    },
    /// Step into the element type of an array or collection; has no segment
    Element(Arc<ClassNode>),
}

impl PathElement {
    /// Segment text this element contributes to a dotted path.
    pub fn segment<'a>(&'a self, trie: &'a SuggestionTrie) -> Option<&'a str> {
        match self {
            PathElement::Trie(id) => trie.get(*id).map(|n| n.name.as_str()),
            PathElement::HintKey { key, .. } | PathElement::MapKey { key, .. } => Some(key),
            PathElement::Member(member) => Some(&member.name),
            PathElement::Literal { literal, .. } => Some(&literal.value),
            PathElement::Element(_) => None,
        }
    }
}

/// Join the segments of some elements into a dotted path.
pub fn dotted_path(trie: &SuggestionTrie, elements: &[PathElement]) -> String {
    elements
        .iter()
        .filter_map(|e| e.segment(trie))
        .collect::<Vec<_>>()
        .join(".")
}

/// A key completion request.
#[derive(Debug, Clone)]
pub struct KeyQuery {
    pub path: KeyPath,
    /// Sanitized keys already present next to the cursor
    pub excluded: HashSet<String>,
    /// Retry unmatched segments one level deeper
    pub deep_fallback: bool,
}

impl KeyQuery {
    pub fn new(query: &str) -> Self {
        Self {
            path: KeyPath::parse_query(query),
            excluded: HashSet::new(),
            deep_fallback: true,
        }
    }

    /// Skip siblings that are already present.
    pub fn exclude<I, S>(mut self, siblings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded
            .extend(siblings.into_iter().map(|s| crate::key::sanitize(s.as_ref())));
        self
    }

    pub fn deep_fallback(mut self, enabled: bool) -> Self {
        self.deep_fallback = enabled;
        self
    }
}

/// Where traversal continues after a matched element.
enum Cursor {
    Trie(NodeId),
    Graph(Arc<ClassNode>),
    End,
}

/// A literal value a leaf accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChoice {
    pub value: String,
    pub description: Option<String>,
}

struct Search<'q> {
    query: &'q KeyQuery,
    ancestor_len: usize,
    stack: Vec<PathElement>,
    found: Vec<Vec<PathElement>>,
}

impl Search<'_> {
    fn emit(&mut self) {
        self.found.push(self.stack.clone());
    }

    /// Sibling exclusion applies directly below the ancestor only.
    fn excluded(&self, key: &str) -> bool {
        self.stack.len() == self.ancestor_len && self.query.excluded.contains(key)
    }
}

/// Read-only view used by every query.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub trie: &'a SuggestionTrie,
    pub graph: GraphContext<'a>,
}

impl<'a> QueryContext<'a> {
    pub fn new(trie: &'a SuggestionTrie, graph: GraphContext<'a>) -> Self {
        Self { trie, graph }
    }

    /// Class graph of a property's declared type.
    pub fn property_delegate(&self, meta: &PropertyMeta) -> Option<Arc<ClassNode>> {
        meta.type_ref.as_ref().map(|t| self.graph.node_for(t))
    }

    pub fn property_node_type(&self, meta: &PropertyMeta) -> SuggestionNodeType {
        if let Some(hinted) = meta.hinted_type() {
            return hinted;
        }
        match self.property_delegate(meta) {
            Some(graph) => graph.node_type(&self.graph),
            None if meta.type_name.is_some() => SuggestionNodeType::UnknownClass,
            None => SuggestionNodeType::Undefined,
        }
    }

    /// Whether a property offers no key navigation below itself.
    pub fn property_is_leaf(&self, meta: &PropertyMeta) -> bool {
        if meta.has_known_values() {
            return true;
        }
        let node_type = self.property_node_type(meta);
        if node_type == SuggestionNodeType::Map {
            return false;
        }
        node_type.represents_leaf()
            || self
                .property_delegate(meta)
                .map_or(true, |graph| graph.is_leaf(&self.graph))
    }

    /// Node type of the last element of a path.
    pub fn node_type(&self, element: &PathElement) -> SuggestionNodeType {
        match element {
            PathElement::Trie(id) => match self.trie.get(*id).map(|n| &n.kind) {
                Some(NodeKind::Property(meta)) => self.property_node_type(meta),
                Some(NodeKind::Group(Some(meta))) if meta.type_name.is_some() => {
                    SuggestionNodeType::KnownClass
                }
                _ => SuggestionNodeType::Undefined,
            },
            PathElement::HintKey { property, .. } => {
                let meta = self.trie.get(*property).and_then(|n| n.property());
                match meta.and_then(|m| self.map_value_of(m)) {
                    Some(value) => value.node_type(&self.graph),
                    None if meta.is_some_and(|m| m.value_hint().is_some()) => {
                        SuggestionNodeType::Values
                    }
                    None => SuggestionNodeType::Undefined,
                }
            }
            PathElement::Member(member) => member.graph(&self.graph).node_type(&self.graph),
            PathElement::MapKey { map, .. } => map
                .map_value(&self.graph)
                .map_or(SuggestionNodeType::Undefined, |v| v.node_type(&self.graph)),
            PathElement::Literal { owner, .. } => owner.node_type(&self.graph),
            PathElement::Element(node) => node.node_type(&self.graph),
        }
    }

    fn map_value_of(&self, meta: &PropertyMeta) -> Option<Arc<ClassNode>> {
        self.property_delegate(meta)?.map_value(&self.graph)
    }

    fn cursor_after(&self, last: Option<&PathElement>) -> Cursor {
        let graph = match last {
            None => return Cursor::Trie(self.trie.root_id()),
            Some(PathElement::Trie(id)) => return Cursor::Trie(*id),
            Some(PathElement::HintKey { property, .. }) => self
                .trie
                .get(*property)
                .and_then(|n| n.property())
                .and_then(|meta| self.map_value_of(meta)),
            Some(PathElement::Member(member)) => Some(member.graph(&self.graph)),
            Some(PathElement::MapKey { map, .. }) => map.map_value(&self.graph),
            Some(PathElement::Literal { .. }) => None,
            Some(PathElement::Element(node)) => Some(Arc::clone(node)),
        };
        graph.map_or(Cursor::End, Cursor::Graph)
    }

    /// Resolve a complete path from the root.
    pub fn resolve(&self, path: &KeyPath) -> Option<Vec<PathElement>> {
        self.resolve_from(&[], path)
    }

    /// Resolve a complete path below an already resolved ancestor.
    pub fn resolve_from(&self, ancestor: &[PathElement], path: &KeyPath) -> Option<Vec<PathElement>> {
        let mut out = ancestor.to_vec();
        let matched = match self.cursor_after(ancestor.last()) {
            Cursor::Trie(id) => self.trie_exact(id, path, 0, &mut out),
            Cursor::Graph(graph) => self.class_exact(&graph, path, 0, budget(path, 0), &mut out),
            Cursor::End => path.is_empty(),
        };
        matched.then_some(out)
    }

    fn trie_exact(&self, id: NodeId, path: &KeyPath, idx: usize, out: &mut Vec<PathElement>) -> bool {
        let (Some(node), Some(segment)) = (self.trie.get(id), path.get(idx)) else {
            return idx >= path.len();
        };

        match &node.kind {
            NodeKind::Group(_) => match node.children.get(&segment.sanitized) {
                Some(&child) => {
                    out.push(PathElement::Trie(child));
                    self.trie_exact(child, path, idx + 1, out)
                }
                None => false,
            },
            NodeKind::Property(meta) => {
                if self.property_is_leaf(meta) {
                    return false;
                }
                if let Some(entry) = meta.key_hint().and_then(|k| k.find_exact(&segment.sanitized)) {
                    out.push(PathElement::HintKey {
                        property: id,
                        key: entry.value.clone(),
                        description: entry.description.clone(),
                    });
                    if path.is_last(idx) {
                        return true;
                    }
                    return match self.map_value_of(meta) {
                        Some(value) => self.class_exact(&value, path, idx + 1, budget(path, idx + 1), out),
                        None => false,
                    };
                }
                match self.property_delegate(meta) {
                    Some(graph) => self.class_exact(&graph, path, idx, budget(path, idx), out),
                    None => false,
                }
            }
        }
    }

    fn class_exact(
        &self,
        graph: &Arc<ClassNode>,
        path: &KeyPath,
        idx: usize,
        budget: usize,
        out: &mut Vec<PathElement>,
    ) -> bool {
        let Some(segment) = path.get(idx) else {
            return true;
        };
        if budget == 0 {
            debug!(path = %path, "Class graph hop limit reached");
            return false;
        }

        match graph.shape(&self.graph) {
            ClassShape::Leaf(_) => false,
            ClassShape::Boolean(literals) | ClassShape::Enum(literals) => {
                match literals.get(&segment.sanitized) {
                    Some(literal) if path.is_last(idx) => {
                        out.push(PathElement::Literal {
                            literal: literal.clone(),
                            owner: Arc::clone(graph),
                        });
                        true
                    }
                    _ => false,
                }
            }
            ClassShape::Array(element) | ClassShape::Iterable(element) => {
                out.push(PathElement::Element(Arc::clone(element)));
                self.class_exact(element, path, idx, budget - 1, out)
            }
            ClassShape::Map { key, value } => {
                let key_text = match key.shape(&self.graph) {
                    ClassShape::Boolean(literals) | ClassShape::Enum(literals) => {
                        match literals.get(&segment.sanitized) {
                            Some(literal) => literal.value.clone(),
                            None => return false,
                        }
                    }
                    _ => segment.original.clone(),
                };
                out.push(PathElement::MapKey {
                    key: key_text,
                    map: Arc::clone(graph),
                });
                self.class_exact(value, path, idx + 1, budget - 1, out)
            }
            ClassShape::Bean(members) => match members.get(&segment.sanitized) {
                Some(member) => {
                    out.push(PathElement::Member(Arc::clone(member)));
                    let nested = member.graph(&self.graph);
                    self.class_exact(&nested, path, idx + 1, budget - 1, out)
                }
                None => false,
            },
        }
    }

    /// Every path below `ancestor` consistent with the query.
    pub fn search(&self, ancestor: &[PathElement], query: &KeyQuery) -> Vec<Vec<PathElement>> {
        let mut search = Search {
            query,
            ancestor_len: ancestor.len(),
            stack: ancestor.to_vec(),
            found: Vec::new(),
        };

        match self.cursor_after(ancestor.last()) {
            Cursor::Trie(id) => self.trie_prefix(id, 0, &mut search),
            Cursor::Graph(graph) => {
                self.class_prefix(&graph, 0, budget(&query.path, 0), &mut search)
            }
            Cursor::End => {}
        }
        search.found
    }

    fn trie_prefix(&self, id: NodeId, idx: usize, s: &mut Search<'_>) {
        let Some(node) = self.trie.get(id) else {
            return;
        };
        let query = s.query;

        let Some(segment) = query.path.get(idx) else {
            match &node.kind {
                NodeKind::Group(meta) => {
                    if node.children.len() == 1 {
                        // A lone child is offered directly instead of its parent
                        for &child in node.children.values() {
                            self.descend_trie(child, idx, s);
                        }
                    } else if meta.is_some() && node.parent.is_some() {
                        s.emit();
                    } else {
                        for &child in node.children.values() {
                            self.descend_trie(child, idx, s);
                        }
                    }
                }
                NodeKind::Property(meta) => {
                    if meta.deprecation_level != DeprecationLevel::Error {
                        s.emit();
                    }
                }
            }
            return;
        };

        match &node.kind {
            NodeKind::Group(_) => {
                let before = s.found.len();
                let matches: Vec<NodeId> = node
                    .children
                    .with_prefix(&segment.sanitized)
                    .filter(|(key, _)| !s.excluded(key))
                    .map(|(_, child)| *child)
                    .collect();
                for child in matches {
                    self.descend_trie(child, idx + 1, s);
                }

                if s.found.len() == before && query.deep_fallback {
                    let all: Vec<NodeId> = node
                        .children
                        .iter()
                        .filter(|(key, _)| !s.excluded(key))
                        .map(|(_, child)| *child)
                        .collect();
                    for child in all {
                        self.descend_trie(child, idx, s);
                    }
                }
            }
            NodeKind::Property(meta) => {
                if meta.deprecation_level == DeprecationLevel::Error || self.property_is_leaf(meta) {
                    return;
                }

                if let Some(keys) = meta.key_hint() {
                    if query.path.is_last(idx) {
                        for entry in keys.find_prefix(&segment.sanitized) {
                            s.stack.push(PathElement::HintKey {
                                property: id,
                                key: entry.value.clone(),
                                description: entry.description.clone(),
                            });
                            s.emit();
                            s.stack.pop();
                        }
                        return;
                    }
                    if let Some(entry) = keys.find_exact(&segment.sanitized) {
                        s.stack.push(PathElement::HintKey {
                            property: id,
                            key: entry.value.clone(),
                            description: entry.description.clone(),
                        });
                        if let Some(value) = self.map_value_of(meta) {
                            self.class_prefix(&value, idx + 1, budget(&query.path, idx + 1), s);
                        }
                        s.stack.pop();
                        return;
                    }
                }

                if let Some(graph) = self.property_delegate(meta) {
                    self.class_prefix(&graph, idx, budget(&query.path, idx), s);
                }
            }
        }
    }

    fn descend_trie(&self, child: NodeId, idx: usize, s: &mut Search<'_>) {
        s.stack.push(PathElement::Trie(child));
        self.trie_prefix(child, idx, s);
        s.stack.pop();
    }

    fn class_prefix(&self, graph: &Arc<ClassNode>, idx: usize, budget: usize, s: &mut Search<'_>) {
        let query = s.query;
        let Some(segment) = query.path.get(idx) else {
            s.emit();
            return;
        };
        if budget == 0 {
            debug!(query = %query.path, "Class graph hop limit reached");
            return;
        }
        let last = query.path.is_last(idx);

        match graph.shape(&self.graph) {
            ClassShape::Leaf(_) => {}
            ClassShape::Boolean(literals) | ClassShape::Enum(literals) => {
                if !last {
                    return;
                }
                for (key, literal) in literals.with_prefix(&segment.sanitized) {
                    if s.excluded(key) {
                        continue;
                    }
                    s.stack.push(PathElement::Literal {
                        literal: literal.clone(),
                        owner: Arc::clone(graph),
                    });
                    s.emit();
                    s.stack.pop();
                }
            }
            ClassShape::Array(element) | ClassShape::Iterable(element) => {
                s.stack.push(PathElement::Element(Arc::clone(element)));
                self.class_prefix(element, idx, budget - 1, s);
                s.stack.pop();
            }
            ClassShape::Map { key, value } => match key.shape(&self.graph) {
                ClassShape::Boolean(literals) | ClassShape::Enum(literals) => {
                    for (_, literal) in literals.with_prefix(&segment.sanitized) {
                        s.stack.push(PathElement::MapKey {
                            key: literal.value.clone(),
                            map: Arc::clone(graph),
                        });
                        if last {
                            s.emit();
                        } else {
                            self.class_prefix(value, idx + 1, budget - 1, s);
                        }
                        s.stack.pop();
                    }
                }
                // Free-form keys cannot be completed, only walked through
                _ if !last => {
                    s.stack.push(PathElement::MapKey {
                        key: segment.original.clone(),
                        map: Arc::clone(graph),
                    });
                    self.class_prefix(value, idx + 1, budget - 1, s);
                    s.stack.pop();
                }
                _ => {}
            },
            ClassShape::Bean(members) => {
                for (key, member) in members.with_prefix(&segment.sanitized) {
                    if s.excluded(key) {
                        continue;
                    }
                    s.stack.push(PathElement::Member(Arc::clone(member)));
                    if last {
                        s.emit();
                    } else {
                        let nested = member.graph(&self.graph);
                        self.class_prefix(&nested, idx + 1, budget - 1, s);
                    }
                    s.stack.pop();
                }
            }
        }
    }

    /// Values accepted at the end of a resolved path, with the default if known.
    pub fn value_choices(&self, elements: &[PathElement]) -> (Vec<ValueChoice>, Option<String>) {
        let from_literals = |literals: Vec<Literal>| {
            literals
                .into_iter()
                .map(|l| ValueChoice {
                    value: l.value,
                    description: l.description,
                })
                .collect::<Vec<_>>()
        };
        let from_graph = |graph: Option<Arc<ClassNode>>| {
            graph.map_or_else(Vec::new, |g| from_literals(g.value_choices(&self.graph)))
        };

        match elements.last() {
            None | Some(PathElement::Literal { .. }) => (Vec::new(), None),
            Some(PathElement::Trie(id)) => match self.trie.get(*id).and_then(|n| n.property()) {
                Some(meta) => {
                    let choices = match meta.generic_hint() {
                        Some(hint) if meta.has_known_values() => hint
                            .entries()
                            .map(|e| ValueChoice {
                                value: e.value.clone(),
                                description: e.description.clone(),
                            })
                            .collect(),
                        _ if meta.hinted_type() == Some(SuggestionNodeType::Map) => Vec::new(),
                        _ => from_graph(self.property_delegate(meta)),
                    };
                    (choices, meta.default_value.clone())
                }
                None => (Vec::new(), None),
            },
            Some(PathElement::HintKey { property, .. }) => {
                let meta = self.trie.get(*property).and_then(|n| n.property());
                let choices = match meta.and_then(|m| m.value_hint()) {
                    Some(hint) => hint
                        .entries()
                        .map(|e| ValueChoice {
                            value: e.value.clone(),
                            description: e.description.clone(),
                        })
                        .collect(),
                    None => from_graph(meta.and_then(|m| self.map_value_of(m))),
                };
                (choices, None)
            }
            Some(PathElement::Member(member)) => (from_graph(Some(member.graph(&self.graph))), None),
            Some(PathElement::MapKey { map, .. }) => (from_graph(map.map_value(&self.graph)), None),
            Some(PathElement::Element(node)) => (from_graph(Some(Arc::clone(node))), None),
        }
    }
}

fn budget(path: &KeyPath, idx: usize) -> usize {
    path.len().saturating_sub(idx) + MAX_TRANSPARENT_HOPS
}

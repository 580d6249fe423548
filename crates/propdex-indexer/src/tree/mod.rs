//! Dotted-path trie of configuration keys.
//!
//! Nodes live in an arena keyed by [`NodeId`]; parents are referenced by id,
//! never owned. Every node records the sources that contributed it or any
//! of its descendants, which is what cascading removal relies on.
//!
//! Declarations and hints are kept per source. The metadata a node exposes
//! is derived from the lowest contributing [`SourceId`], so the trie does
//! not depend on the order in which sources were merged or retired.

mod builder;

pub use builder::{MergeOutcome, MergeReport, MetadataIndexBuilder};

use crate::hint::{HintSlot, HintTable};
use crate::key::{KeyPath, PrefixIndex, Segment};
use crate::metadata::{Deprecation, DeprecationLevel, GroupDeclaration, PropertyDeclaration};
use crate::types::{SuggestionNodeType, TypeRef};
use crate::SourceId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// Unique identifier for a trie node.
pub type NodeId = u64;

/// The key trie of one module.
#[derive(Debug, Clone)]
pub struct SuggestionTrie {
    /// All nodes, keyed by ID
    nodes: HashMap<NodeId, TrieNode>,

    /// Root node ID
    root_id: NodeId,

    /// Next ID to hand out
    next_id: NodeId,

    /// Every hint table, by sanitized target path, then by declaring source
    hints: BTreeMap<String, BTreeMap<SourceId, BTreeMap<HintSlot, HintTable>>>,

    /// Target paths each source declared hints for
    hinted: HashMap<SourceId, BTreeSet<String>>,

    /// Declarations rejected because of a path-kind conflict
    pending: BTreeMap<SourceId, Vec<PendingDeclaration>>,
}

/// A rejected declaration kept for retry once the conflicting source leaves.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingDeclaration {
    Group(GroupDeclaration),
    Property(PropertyDeclaration),
}

/// What one source declared for a node.
#[derive(Debug, Clone)]
pub(crate) enum Declaration {
    Group(GroupMeta),
    Property(PropertyMeta),
}

impl Default for SuggestionTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionTrie {
    /// Create a trie holding only its root.
    pub fn new() -> Self {
        let root_id = 0;
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            TrieNode {
                id: root_id,
                name: String::new(),
                sanitized: String::new(),
                parent: None,
                children: PrefixIndex::new(),
                sources: BTreeSet::new(),
                declarations: BTreeMap::new(),
                kind: NodeKind::Group(None),
            },
        );

        Self {
            nodes,
            root_id,
            next_id: 1,
            hints: BTreeMap::new(),
            hinted: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&TrieNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut TrieNode> {
        self.nodes.get_mut(&id)
    }

    /// Child of `id` with the given sanitized key.
    pub fn child(&self, id: NodeId, sanitized: &str) -> Option<NodeId> {
        self.get(id)?.children.get(sanitized).copied()
    }

    /// Children of a node, in key order.
    pub fn children(&self, id: NodeId) -> Vec<&TrieNode> {
        self.get(id)
            .map(|n| n.children.values().filter_map(|child| self.get(*child)).collect())
            .unwrap_or_default()
    }

    /// Resolve a path segment by segment without entering class graphs.
    pub fn find(&self, path: &KeyPath) -> Option<NodeId> {
        path.segments()
            .iter()
            .try_fold(self.root_id, |id, segment| self.child(id, &segment.sanitized))
    }

    /// Resolve a path given as sanitized segments joined by dots.
    pub(crate) fn find_sanitized(&self, key: &str) -> Option<NodeId> {
        key.split('.').try_fold(self.root_id, |id, segment| self.child(id, segment))
    }

    /// Sanitized dotted path of a node.
    pub(crate) fn sanitized_path_of(&self, id: NodeId) -> String {
        self.lineage(id)
            .into_iter()
            .filter_map(|id| self.get(id))
            .map(|n| n.sanitized.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Ancestors of a node from the first level down to the node itself.
    pub fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut lineage = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.get(id)) {
            if node.parent.is_none() {
                break;
            }
            lineage.push(node.id);
            current = node.parent;
        }
        lineage.reverse();
        lineage
    }

    /// Dotted path of a node, using original names.
    pub fn path_of(&self, id: NodeId) -> String {
        self.lineage(id)
            .into_iter()
            .filter_map(|id| self.get(id))
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Whether no key has been indexed.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Number of nodes, root excluded.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn group_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.id != self.root_id && n.is_group())
            .count()
    }

    pub fn property_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_property()).count()
    }

    /// Sources contributing anything to the trie.
    pub fn sources(&self) -> &BTreeSet<SourceId> {
        &self.root().sources
    }

    /// Get the root node.
    pub fn root(&self) -> &TrieNode {
        match self.nodes.get(&self.root_id) {
            Some(root) => root,
            None => unreachable!("root node is never removed"),
        }
    }

    /// Flat listing of `(path, kind, sources)` in path order.
    ///
    /// Two tries with the same listing index the same keys for the same
    /// sources, whatever IDs their nodes carry.
    pub fn entries(&self) -> Vec<TrieEntry> {
        let mut entries: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.id != self.root_id)
            .map(|n| TrieEntry {
                path: self.path_of(n.id),
                kind: n.kind_label(),
                declared_by: n.declarations.keys().next().cloned(),
                sources: n.sources.iter().cloned().collect(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Indented rendering of the trie for diagnostics.
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.render_node(&mut output, self.root_id, 0);
        output
    }

    fn render_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let Some(node) = self.get(id) else {
            return;
        };
        if node.parent.is_some() {
            output.push_str(&format!(
                "{}{} [{}]\n",
                "  ".repeat(depth - 1),
                node.name,
                node.kind_label()
            ));
        }
        for child in node.children.values() {
            self.render_node(output, *child, depth + 1);
        }
    }

    pub(crate) fn insert_child(&mut self, parent: NodeId, segment: &Segment, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;

        self.nodes.insert(
            id,
            TrieNode {
                id,
                name: segment.original.clone(),
                sanitized: segment.sanitized.clone(),
                parent: Some(parent),
                children: PrefixIndex::new(),
                sources: BTreeSet::new(),
                declarations: BTreeMap::new(),
                kind,
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.insert(segment.sanitized.clone(), id);
        }
        id
    }

    /// Drop a node and everything under it.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.remove(&node.sanitized);
        }
        let mut pending: Vec<NodeId> = node.children.values().copied().collect();
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                pending.extend(removed.children.values().copied());
            }
        }
    }

    /// Add `source` to a node and all its ancestors.
    pub(crate) fn add_source_upwards(&mut self, id: NodeId, source: &SourceId) {
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.nodes.get_mut(&id)) {
            node.sources.insert(source.clone());
            current = node.parent;
        }
    }

    /// Record what `source` declares for a node and re-derive its metadata.
    pub(crate) fn declare(&mut self, id: NodeId, source: &SourceId, declaration: Declaration) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.declarations.entry(source.clone()).or_insert(declaration);
        }
        self.refresh(id);
    }

    /// Drop the declaration of `source` on a node. Returns whether it had one.
    pub(crate) fn undeclare(&mut self, id: NodeId, source: &SourceId) -> bool {
        let removed = self
            .nodes
            .get_mut(&id)
            .is_some_and(|n| n.declarations.remove(source).is_some());
        if removed {
            self.refresh(id);
        }
        removed
    }

    /// Re-derive the exposed metadata of a node from its declarations and
    /// the hints targeting its path.
    pub(crate) fn refresh(&mut self, id: NodeId) {
        if id == self.root_id {
            return;
        }
        let key = self.sanitized_path_of(id);
        let hints = self.hints.get(&key);
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };

        node.kind = match node.declarations.values().next() {
            Some(Declaration::Property(meta)) => {
                let mut meta = meta.clone();
                for tables in hints.into_iter().flat_map(|by_source| by_source.values()) {
                    for (slot, table) in tables {
                        meta.attach_hint(*slot, table.clone());
                    }
                }
                NodeKind::Property(meta)
            }
            Some(Declaration::Group(meta)) => NodeKind::Group(Some(meta.clone())),
            None => NodeKind::Group(None),
        };
    }

    /// Record a hint table under its target path. A source keeps its first
    /// table per slot.
    pub(crate) fn record_hint(&mut self, key: String, source: &SourceId, slot: HintSlot, table: HintTable) {
        self.hinted.entry(source.clone()).or_default().insert(key.clone());
        self.hints
            .entry(key)
            .or_default()
            .entry(source.clone())
            .or_default()
            .entry(slot)
            .or_insert(table);
    }

    /// Forget every hint of `source`. Returns the target paths it had.
    pub(crate) fn forget_hints(&mut self, source: &SourceId) -> BTreeSet<String> {
        let keys = self.hinted.remove(source).unwrap_or_default();
        for key in &keys {
            if let Some(by_source) = self.hints.get_mut(key) {
                by_source.remove(source);
                if by_source.is_empty() {
                    self.hints.remove(key);
                }
            }
        }
        keys
    }

    /// Number of hint declarations waiting for a property at their path.
    pub fn dangling_hint_count(&self) -> usize {
        self.hints
            .iter()
            .filter(|(key, _)| {
                !self
                    .find_sanitized(key)
                    .and_then(|id| self.get(id))
                    .is_some_and(TrieNode::is_property)
            })
            .map(|(_, by_source)| by_source.values().map(BTreeMap::len).sum::<usize>())
            .sum()
    }

    pub(crate) fn defer(&mut self, source: &SourceId, declaration: PendingDeclaration) {
        let pending = self.pending.entry(source.clone()).or_default();
        if !pending.contains(&declaration) {
            pending.push(declaration);
        }
    }

    pub(crate) fn take_pending(&mut self) -> BTreeMap<SourceId, Vec<PendingDeclaration>> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn drop_pending(&mut self, source: &SourceId) {
        self.pending.remove(source);
    }

    /// Number of declarations held back by path-kind conflicts.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

/// One row of [`SuggestionTrie::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieEntry {
    pub path: String,
    pub kind: &'static str,
    /// Source whose declaration the node exposes
    pub declared_by: Option<SourceId>,
    pub sources: Vec<SourceId>,
}

/// A node in the key trie.
#[derive(Debug, Clone)]
pub struct TrieNode {
    /// Unique node ID
    pub id: NodeId,

    /// Segment as first declared
    pub name: String,

    /// Lookup key
    pub sanitized: String,

    /// Parent node ID (None for root)
    pub parent: Option<NodeId>,

    /// Children by sanitized key; always empty for properties
    pub children: PrefixIndex<NodeId>,

    /// Sources contributing this node or a descendant
    pub sources: BTreeSet<SourceId>,

    /// Declarations of this node, by source
    pub(crate) declarations: BTreeMap<SourceId, Declaration>,

    /// Group or property, as exposed by the lowest declaring source
    pub kind: NodeKind,
}

impl TrieNode {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn is_property(&self) -> bool {
        matches!(self.kind, NodeKind::Property(_))
    }

    /// Sources that declared this exact path, lowest first.
    pub fn declared_by(&self) -> impl Iterator<Item = &SourceId> {
        self.declarations.keys()
    }

    pub fn property(&self) -> Option<&PropertyMeta> {
        match &self.kind {
            NodeKind::Property(meta) => Some(meta),
            NodeKind::Group(_) => None,
        }
    }

    pub fn group(&self) -> Option<&GroupMeta> {
        match &self.kind {
            NodeKind::Group(meta) => meta.as_ref(),
            NodeKind::Property(_) => None,
        }
    }

    fn kind_label(&self) -> &'static str {
        match &self.kind {
            NodeKind::Group(Some(_)) => "group",
            NodeKind::Group(None) => "intermediate",
            NodeKind::Property(_) => "property",
        }
    }
}

/// What a node represents.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Namespace; `None` until some source declares it
    Group(Option<GroupMeta>),
    /// Leaf-capable key
    Property(PropertyMeta),
}

/// Descriptive metadata of a declared group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMeta {
    pub type_name: Option<String>,
    pub description: Option<String>,
    pub source_type: Option<String>,
    pub source_method: Option<String>,
}

impl From<&GroupDeclaration> for GroupMeta {
    fn from(declaration: &GroupDeclaration) -> Self {
        Self {
            type_name: declaration.type_name.clone(),
            description: declaration.description.clone(),
            source_type: declaration.source_type.clone(),
            source_method: declaration.source_method.clone(),
        }
    }
}

/// Metadata of a declared property.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    /// Declared type as written
    pub type_name: Option<String>,

    /// Declared type, when it parses
    pub type_ref: Option<TypeRef>,

    pub description: Option<String>,
    pub source_type: Option<String>,
    pub default_value: Option<String>,
    pub deprecation_level: DeprecationLevel,
    pub deprecation: Option<Deprecation>,

    /// Generic or `.keys` hint
    primary_hint: Option<(HintSlot, HintTable)>,

    /// `.values` hint
    value_hint: Option<HintTable>,
}

impl From<&PropertyDeclaration> for PropertyMeta {
    fn from(declaration: &PropertyDeclaration) -> Self {
        let type_ref = declaration.type_name.as_deref().and_then(|name| {
            TypeRef::parse(name)
                .map_err(|e| warn!(property = %declaration.name, error = %e, "Unparsable property type"))
                .ok()
        });

        Self {
            type_name: declaration.type_name.clone(),
            type_ref,
            description: declaration.description.clone(),
            source_type: declaration.source_type.clone(),
            default_value: declaration.default_value_text(),
            deprecation_level: declaration.deprecation_level(),
            deprecation: declaration.deprecation.clone(),
            primary_hint: None,
            value_hint: None,
        }
    }
}

impl PropertyMeta {
    /// Hint listing the accepted values of the property itself.
    pub fn generic_hint(&self) -> Option<&HintTable> {
        match &self.primary_hint {
            Some((HintSlot::Generic, table)) => Some(table),
            _ => None,
        }
    }

    /// Hint listing the accepted keys of a map property.
    pub fn key_hint(&self) -> Option<&HintTable> {
        match &self.primary_hint {
            Some((HintSlot::Keys, table)) => Some(table),
            _ => None,
        }
    }

    /// Hint listing the accepted values of a map property.
    pub fn value_hint(&self) -> Option<&HintTable> {
        self.value_hint.as_ref()
    }

    /// Whether the values of this property are known up front.
    pub fn has_known_values(&self) -> bool {
        self.key_hint().is_none()
            && self.value_hint.is_none()
            && self.generic_hint().is_some_and(HintTable::has_values)
    }

    /// Node type implied by hints alone.
    pub fn hinted_type(&self) -> Option<SuggestionNodeType> {
        if self.key_hint().is_some() || self.value_hint.is_some() {
            Some(SuggestionNodeType::Map)
        } else if self.has_known_values() {
            Some(SuggestionNodeType::Values)
        } else {
            None
        }
    }

    /// Attach a hint unless its slot is taken. Returns whether it was attached.
    pub(crate) fn attach_hint(&mut self, slot: HintSlot, table: HintTable) -> bool {
        match slot {
            HintSlot::Values if self.value_hint.is_none() => {
                self.value_hint = Some(table);
                true
            }
            HintSlot::Generic | HintSlot::Keys if self.primary_hint.is_none() => {
                self.primary_hint = Some((slot, table));
                true
            }
            _ => false,
        }
    }

    /// Source of the table filling `slot`.
    pub fn hint_source(&self, slot: HintSlot) -> Option<&SourceId> {
        match slot {
            HintSlot::Generic => self.generic_hint(),
            HintSlot::Keys => self.key_hint(),
            HintSlot::Values => self.value_hint(),
        }
        .map(HintTable::source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str) -> Segment {
        Segment::new(name)
    }

    #[test]
    fn test_trie_new() {
        let trie = SuggestionTrie::new();
        assert!(trie.is_empty());
        assert_eq!(trie.node_count(), 0);
        assert!(trie.root().parent.is_none());
    }

    #[test]
    fn test_insert_and_find() {
        let mut trie = SuggestionTrie::new();
        let root = trie.root_id();
        let server = trie.insert_child(root, &segment("server"), NodeKind::Group(None));
        let port = trie.insert_child(
            server,
            &segment("port"),
            NodeKind::Property(PropertyMeta::from(&PropertyDeclaration {
                name: "server.port".to_string(),
                ..Default::default()
            })),
        );

        assert_eq!(trie.find(&KeyPath::parse("server.port")), Some(port));
        assert_eq!(trie.find(&KeyPath::parse("SERVER.Port")), Some(port));
        assert_eq!(trie.find(&KeyPath::parse("server.host")), None);
        assert_eq!(trie.find(&KeyPath::parse("")), Some(root));
        assert_eq!(trie.path_of(port), "server.port");
        assert_eq!(trie.lineage(port), vec![server, port]);
        assert_eq!(trie.group_count(), 1);
        assert_eq!(trie.property_count(), 1);
    }

    #[test]
    fn test_remove_subtree() {
        let mut trie = SuggestionTrie::new();
        let root = trie.root_id();
        let a = trie.insert_child(root, &segment("a"), NodeKind::Group(None));
        let b = trie.insert_child(a, &segment("b"), NodeKind::Group(None));
        trie.insert_child(b, &segment("c"), NodeKind::Group(None));

        trie.remove_subtree(a);
        assert!(trie.is_empty());
        assert!(trie.root().children.is_empty());
    }

    #[test]
    fn test_sources_propagate_upwards() {
        let mut trie = SuggestionTrie::new();
        let root = trie.root_id();
        let a = trie.insert_child(root, &segment("a"), NodeKind::Group(None));
        let b = trie.insert_child(a, &segment("b"), NodeKind::Group(None));

        trie.add_source_upwards(b, &SourceId::from("s1"));
        for id in [root, a, b] {
            assert!(trie.get(id).unwrap().sources.contains(&SourceId::from("s1")));
        }
    }

    #[test]
    fn test_render() {
        let mut trie = SuggestionTrie::new();
        let root = trie.root_id();
        let a = trie.insert_child(root, &segment("a"), NodeKind::Group(None));
        trie.insert_child(a, &segment("b"), NodeKind::Group(None));

        assert_eq!(trie.render(), "a [intermediate]\n  b [intermediate]\n");
    }

    #[test]
    fn test_hint_slots() {
        use crate::metadata::{HintDeclaration, HintValue};

        let mut meta = PropertyMeta::from(&PropertyDeclaration::default());
        let declaration = HintDeclaration {
            name: "x".to_string(),
            values: vec![HintValue {
                value: serde_json::json!("on"),
                description: None,
            }],
            providers: vec![],
        };
        let table = |s: &str| HintTable::from_declaration(&declaration, SourceId::from(s));

        assert!(meta.attach_hint(HintSlot::Generic, table("s1")));
        assert!(meta.has_known_values());
        assert_eq!(meta.hinted_type(), Some(SuggestionNodeType::Values));
        assert!(!meta.attach_hint(HintSlot::Keys, table("s2")));

        assert!(meta.attach_hint(HintSlot::Values, table("s2")));
        assert_eq!(meta.hinted_type(), Some(SuggestionNodeType::Map));

        assert_eq!(meta.hint_source(HintSlot::Generic), Some(&SourceId::from("s1")));
        assert_eq!(meta.hint_source(HintSlot::Values), Some(&SourceId::from("s2")));
        assert_eq!(meta.hint_source(HintSlot::Keys), None);
    }
}

//! Merging metadata documents into a trie and retiring sources.

use super::{Declaration, GroupMeta, NodeId, NodeKind, PendingDeclaration, PropertyMeta, SuggestionTrie};
use crate::hint::{HintTarget, HintTable};
use crate::key::KeyPath;
use crate::metadata::{GroupDeclaration, HintDeclaration, MetadataDocument, PropertyDeclaration};
use crate::SourceId;
use tracing::{debug, warn};

/// Result of applying one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New metadata was attached
    Added,
    /// The path was already declared; the declaration is kept behind the
    /// lowest declaring source
    Duplicate,
    /// Conflicting or dangling declaration; the trie is unchanged
    Rejected,
    /// Declaration without a name
    Skipped,
}

/// Counts of outcomes for one merged document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub skipped: usize,
}

impl MergeReport {
    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Added => self.added += 1,
            MergeOutcome::Duplicate => self.duplicates += 1,
            MergeOutcome::Rejected => self.rejected += 1,
            MergeOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Applies declarations of one source to a trie.
pub struct MetadataIndexBuilder<'a> {
    trie: &'a mut SuggestionTrie,
}

/// Deepest existing node on a path and how many segments it consumed.
struct Existing {
    node: NodeId,
    depth: usize,
}

impl<'a> MetadataIndexBuilder<'a> {
    pub fn new(trie: &'a mut SuggestionTrie) -> Self {
        Self { trie }
    }

    /// Merge a whole document. Groups go first, then properties, then hints,
    /// each in name order, so the outcome does not depend on document order.
    pub fn merge_document(&mut self, document: &MetadataDocument, source: &SourceId) -> MergeReport {
        let mut report = MergeReport::default();

        let mut groups: Vec<_> = document.groups.iter().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        for group in groups {
            report.record(self.add_group(group, source));
        }

        let mut properties: Vec<_> = document.properties.iter().collect();
        properties.sort_by(|a, b| a.name.cmp(&b.name));
        for property in properties {
            report.record(self.add_property(property, source));
        }

        let mut hints: Vec<_> = document.hints.iter().collect();
        hints.sort_by(|a, b| a.name.cmp(&b.name));
        for hint in hints {
            report.record(self.add_hint(hint, source));
        }

        debug!(
            source = %source,
            added = report.added,
            duplicates = report.duplicates,
            rejected = report.rejected,
            "Merged metadata document"
        );
        report
    }

    /// Declare a group. Of several declarations of one path, the lowest
    /// source's metadata is exposed.
    pub fn add_group(&mut self, declaration: &GroupDeclaration, source: &SourceId) -> MergeOutcome {
        self.place_group(declaration, source, true)
    }

    /// Declare a property. Intermediate segments always become groups.
    pub fn add_property(
        &mut self,
        declaration: &PropertyDeclaration,
        source: &SourceId,
    ) -> MergeOutcome {
        self.place_property(declaration, source, true)
    }

    /// Record a hint and attach it to the property it names.
    ///
    /// A hint whose target is missing or a group is rejected but remembered;
    /// it takes effect once a property is declared at that path.
    pub fn add_hint(&mut self, declaration: &HintDeclaration, source: &SourceId) -> MergeOutcome {
        let target = HintTarget::parse(&declaration.name);
        if target.path.is_empty() {
            return MergeOutcome::Skipped;
        }

        let key = target
            .path
            .segments()
            .iter()
            .map(|segment| segment.sanitized.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let table = HintTable::from_declaration(declaration, source.clone());
        self.trie.record_hint(key, source, target.slot, table);

        let Some(id) = self.trie.find(&target.path) else {
            debug!(hint = %declaration.name, source = %source, "Hint target not declared yet");
            return MergeOutcome::Rejected;
        };
        if !self.trie.get(id).is_some_and(|n| n.is_property()) {
            warn!(hint = %declaration.name, source = %source, "Hint targets a group");
            return MergeOutcome::Rejected;
        }

        self.trie.refresh(id);
        let effective = self
            .trie
            .get(id)
            .and_then(|n| n.property())
            .and_then(|meta| meta.hint_source(target.slot))
            == Some(source);
        if effective {
            MergeOutcome::Added
        } else {
            debug!(hint = %declaration.name, slot = ?target.slot, source = %source, "Hint slot already filled");
            MergeOutcome::Duplicate
        }
    }

    /// Remove every contribution of `source`, pruning nodes no source keeps.
    ///
    /// Returns the number of nodes removed. Declarations the source was
    /// blocking are retried by [`reconcile`](Self::reconcile).
    pub fn remove_source(&mut self, source: &SourceId) -> usize {
        self.trie.drop_pending(source);
        for key in self.trie.forget_hints(source) {
            if let Some(id) = self.trie.find_sanitized(&key) {
                self.trie.refresh(id);
            }
        }

        let root = self.trie.root_id();
        let removed = self.retire(root, source);
        if removed > 0 {
            debug!(source = %source, removed, "Removed source from trie");
        }
        removed
    }

    /// Retry declarations held back by path-kind conflicts whose blocking
    /// source has since been removed. Run once after a batch of removals
    /// and merges.
    pub fn reconcile(&mut self) -> MergeReport {
        let mut report = MergeReport::default();
        for (source, declarations) in self.trie.take_pending() {
            for declaration in declarations {
                let outcome = match &declaration {
                    PendingDeclaration::Group(group) => self.place_group(group, &source, false),
                    PendingDeclaration::Property(property) => {
                        self.place_property(property, &source, false)
                    }
                };
                report.record(outcome);
            }
        }

        if report.added + report.duplicates > 0 {
            debug!(
                added = report.added,
                duplicates = report.duplicates,
                still_rejected = report.rejected,
                "Applied previously rejected declarations"
            );
        }
        report
    }

    fn place_group(&mut self, declaration: &GroupDeclaration, source: &SourceId, announce: bool) -> MergeOutcome {
        let path = KeyPath::parse(&declaration.name);
        if path.is_empty() {
            return MergeOutcome::Skipped;
        }

        let existing = self.deepest_existing(&path);
        if let Some(conflict) = self.property_on_path(&existing) {
            if announce {
                self.report_conflict(&declaration.name, conflict, source, "group declared on or under a property");
            }
            self.trie.defer(source, PendingDeclaration::Group(declaration.clone()));
            return MergeOutcome::Rejected;
        }

        let terminal = self.create_missing(&path, existing, || NodeKind::Group(None));
        let first = self.trie.get(terminal).is_some_and(|n| n.declarations.is_empty());
        self.trie.declare(terminal, source, Declaration::Group(GroupMeta::from(declaration)));
        self.trie.add_source_upwards(terminal, source);

        if first {
            MergeOutcome::Added
        } else {
            debug!(path = %declaration.name, source = %source, "Group already declared");
            MergeOutcome::Duplicate
        }
    }

    fn place_property(
        &mut self,
        declaration: &PropertyDeclaration,
        source: &SourceId,
        announce: bool,
    ) -> MergeOutcome {
        let path = KeyPath::parse(&declaration.name);
        if path.is_empty() {
            return MergeOutcome::Skipped;
        }

        let existing = self.deepest_existing(&path);
        let conflict = if existing.depth == path.len() {
            let is_property = self.trie.get(existing.node).is_some_and(|n| n.is_property());
            if is_property {
                debug!(path = %declaration.name, source = %source, "Property already declared");
                let meta = PropertyMeta::from(declaration);
                self.trie.declare(existing.node, source, Declaration::Property(meta));
                self.trie.add_source_upwards(existing.node, source);
                return MergeOutcome::Duplicate;
            }
            Some((existing.node, "property declared on a group"))
        } else {
            self.property_on_path(&existing)
                .map(|id| (id, "property declared under a property"))
        };

        if let Some((conflict, reason)) = conflict {
            if announce {
                self.report_conflict(&declaration.name, conflict, source, reason);
            }
            self.trie.defer(source, PendingDeclaration::Property(declaration.clone()));
            return MergeOutcome::Rejected;
        }

        let meta = PropertyMeta::from(declaration);
        let terminal = self.create_missing(&path, existing, || NodeKind::Property(meta.clone()));
        self.trie.declare(terminal, source, Declaration::Property(meta));
        self.trie.add_source_upwards(terminal, source);
        MergeOutcome::Added
    }

    /// Post-order removal. Subtrees that never saw `source` are skipped.
    fn retire(&mut self, id: NodeId, source: &SourceId) -> usize {
        let children: Vec<NodeId> = match self.trie.get(id) {
            Some(node) if node.sources.contains(source) => node.children.values().copied().collect(),
            _ => return 0,
        };

        let mut removed = 0;
        for child in children {
            removed += self.retire(child, source);
            let orphaned = self.trie.get(child).is_some_and(|n| n.sources.is_empty());
            if orphaned {
                self.trie.remove_subtree(child);
                removed += 1;
            }
        }

        if let Some(node) = self.trie.get_mut(id) {
            node.sources.remove(source);
        }
        self.trie.undeclare(id, source);
        removed
    }

    fn deepest_existing(&self, path: &KeyPath) -> Existing {
        let mut existing = Existing {
            node: self.trie.root_id(),
            depth: 0,
        };
        for segment in path.segments() {
            match self.trie.child(existing.node, &segment.sanitized) {
                Some(child) => {
                    existing.node = child;
                    existing.depth += 1;
                }
                None => break,
            }
        }
        existing
    }

    /// First property among the existing nodes of a path.
    fn property_on_path(&self, existing: &Existing) -> Option<NodeId> {
        self.trie
            .lineage(existing.node)
            .into_iter()
            .find(|id| self.trie.get(*id).is_some_and(|n| n.is_property()))
    }

    /// Create the segments past `existing`; the last one gets `terminal`.
    fn create_missing(
        &mut self,
        path: &KeyPath,
        existing: Existing,
        terminal: impl FnOnce() -> NodeKind,
    ) -> NodeId {
        let mut current = existing.node;
        let segments = path.segments();
        if existing.depth == segments.len() {
            return current;
        }

        let last = segments.len() - 1;
        for segment in &segments[existing.depth..last] {
            current = self.trie.insert_child(current, segment, NodeKind::Group(None));
        }
        self.trie.insert_child(current, &segments[last], terminal())
    }

    fn report_conflict(&self, path: &str, existing: NodeId, source: &SourceId, reason: &str) {
        let existing_sources: Vec<_> = self
            .trie
            .get(existing)
            .map(|n| n.sources.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        warn!(
            path = %path,
            existing = %self.trie.path_of(existing),
            existing_sources = ?existing_sources,
            source = %source,
            "Rejected conflicting declaration: {}",
            reason
        );
    }
}

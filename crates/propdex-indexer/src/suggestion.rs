//! Suggestions returned to completion clients.

use crate::key::sanitize;
use crate::metadata::DeprecationLevel;
use crate::query::{dotted_path, PathElement, QueryContext};
use crate::tree::NodeKind;
use crate::types::{SuggestionNodeType, TypeRef};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// A key completion.
///
/// Ordered and compared by `(full_path, display_path)`; two branches that
/// reach the same key collapse into one suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct KeySuggestion {
    /// Path below the ancestor the query started from
    pub display_path: String,
    pub full_path: String,
    pub short_type: Option<String>,
    pub description: Option<String>,
    pub deprecation: DeprecationLevel,
    pub default_value: Option<String>,
    pub node_type: SuggestionNodeType,
}

impl KeySuggestion {
    /// First sentence of the description.
    pub fn summary(&self) -> Option<&str> {
        let description = self.description.as_deref()?.trim();
        let end = description
            .find(". ")
            .map(|i| i + 1)
            .unwrap_or(description.len());
        Some(&description[..end])
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation != DeprecationLevel::None
    }
}

impl PartialEq for KeySuggestion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeySuggestion {}

impl PartialOrd for KeySuggestion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeySuggestion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.full_path
            .cmp(&other.full_path)
            .then_with(|| self.display_path.cmp(&other.display_path))
    }
}

/// A value completion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ValueSuggestion {
    pub display_value: String,
    pub description: Option<String>,
    /// Whether the value is the property's default
    pub is_default: bool,
}

/// Turn matched paths into suggestions.
pub fn key_suggestions(
    ctx: &QueryContext<'_>,
    ancestor_len: usize,
    found: &[Vec<PathElement>],
) -> BTreeSet<KeySuggestion> {
    found
        .iter()
        .filter_map(|path| describe_key(ctx, ancestor_len, path))
        .collect()
}

fn describe_key(ctx: &QueryContext<'_>, ancestor_len: usize, path: &[PathElement]) -> Option<KeySuggestion> {
    let last = path.last()?;
    let mut suggestion = KeySuggestion {
        display_path: dotted_path(ctx.trie, path.get(ancestor_len..).unwrap_or_default()),
        full_path: dotted_path(ctx.trie, path),
        short_type: None,
        description: None,
        deprecation: DeprecationLevel::None,
        default_value: None,
        node_type: ctx.node_type(last),
    };

    match last {
        PathElement::Trie(id) => match &ctx.trie.get(*id)?.kind {
            NodeKind::Property(meta) => {
                suggestion.short_type = meta
                    .type_ref
                    .as_ref()
                    .map(TypeRef::short_name)
                    .or_else(|| meta.type_name.clone());
                suggestion.description = meta.description.clone();
                suggestion.deprecation = meta.deprecation_level;
                suggestion.default_value = meta.default_value.clone();
            }
            NodeKind::Group(meta) => {
                let meta = meta.as_ref();
                suggestion.short_type = meta
                    .and_then(|m| m.type_name.as_deref())
                    .map(short_type_name);
                suggestion.description = meta.and_then(|m| m.description.clone());
            }
        },
        PathElement::HintKey {
            property,
            description,
            ..
        } => {
            suggestion.short_type = ctx
                .trie
                .get(*property)
                .and_then(|n| n.property())
                .and_then(|m| m.type_ref.as_ref())
                .and_then(|t| t.args().get(1))
                .map(TypeRef::short_name);
            suggestion.description = description.clone();
        }
        PathElement::Member(member) => {
            suggestion.short_type = Some(member.short_type());
            suggestion.description = member.description.clone();
            if member.deprecated {
                suggestion.deprecation = DeprecationLevel::Warning;
            }
        }
        PathElement::MapKey { map, .. } => {
            suggestion.short_type = map.type_ref().args().get(1).map(TypeRef::short_name);
        }
        PathElement::Literal { literal, owner } => {
            suggestion.short_type = Some(owner.type_ref().short_name());
            suggestion.description = literal.description.clone();
        }
        PathElement::Element(node) => {
            suggestion.short_type = Some(node.type_ref().short_name());
        }
    }

    Some(suggestion)
}

/// Values accepted at `leaf` whose sanitized text starts with `prefix`.
pub fn value_suggestions(
    ctx: &QueryContext<'_>,
    leaf: &[PathElement],
    prefix: &str,
    excluded: &HashSet<String>,
) -> BTreeSet<ValueSuggestion> {
    let prefix = sanitize(prefix);
    let (choices, default) = ctx.value_choices(leaf);
    let default = default.map(|d| sanitize(&d));

    choices
        .into_iter()
        .filter_map(|choice| {
            let key = sanitize(&choice.value);
            if !key.starts_with(&prefix) || excluded.contains(&key) {
                return None;
            }
            Some(ValueSuggestion {
                is_default: default.as_deref() == Some(key.as_str()),
                display_value: choice.value,
                description: choice.description,
            })
        })
        .collect()
}

/// Simple name of a type name that may not parse.
pub(crate) fn short_type_name(name: &str) -> String {
    TypeRef::parse(name)
        .map(|t| t.short_name())
        .unwrap_or_else(|_| name.to_string())
}

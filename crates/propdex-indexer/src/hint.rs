//! Hint tables: literal value choices for a property.

use crate::key::{sanitize, KeyPath, PrefixIndex};
use crate::metadata::{render_scalar, HintDeclaration};
use crate::SourceId;

/// Which position of a property a hint describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HintSlot {
    /// Values of the property itself
    Generic,
    /// Keys of a map property (`name.keys`)
    Keys,
    /// Values of a map property (`name.values`)
    Values,
}

/// Property path and slot a hint name addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintTarget {
    pub path: KeyPath,
    pub slot: HintSlot,
}

impl HintTarget {
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        let (path, slot) = if let Some(stripped) = name.strip_suffix(".keys") {
            (stripped, HintSlot::Keys)
        } else if let Some(stripped) = name.strip_suffix(".values") {
            (stripped, HintSlot::Values)
        } else {
            (name, HintSlot::Generic)
        };
        Self {
            path: KeyPath::parse(path),
            slot,
        }
    }
}

/// One literal choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintEntry {
    /// Value as it should be inserted
    pub value: String,
    pub description: Option<String>,
}

/// Immutable lookup over the choices of one hint declaration.
#[derive(Debug, Clone)]
pub struct HintTable {
    source: SourceId,
    entries: PrefixIndex<HintEntry>,
    providers: Vec<String>,
}

impl HintTable {
    /// Build a table from a declaration. Array and object values are skipped.
    pub fn from_declaration(declaration: &HintDeclaration, source: SourceId) -> Self {
        let entries = declaration
            .values
            .iter()
            .filter_map(|hint| {
                let value = render_scalar(&hint.value, None)?;
                Some((
                    sanitize(&value),
                    HintEntry {
                        value,
                        description: hint.description.clone(),
                    },
                ))
            })
            .collect();

        Self {
            source,
            entries,
            providers: declaration
                .providers
                .iter()
                .map(|p| p.name.clone())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Source that declared the hint.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn find_exact(&self, sanitized: &str) -> Option<&HintEntry> {
        self.entries.get(sanitized)
    }

    /// Choices whose sanitized value starts with `prefix`, in sorted order.
    pub fn find_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a HintEntry> + 'a {
        self.entries.with_prefix(prefix).map(|(_, entry)| entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HintEntry> {
        self.entries.values()
    }

    /// Names of the value providers declared alongside the values.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn has_values(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Plain-text documentation for keys and values.

use crate::key::sanitize;
use crate::metadata::DeprecationLevel;
use crate::query::{dotted_path, PathElement, QueryContext};
use crate::suggestion::short_type_name;
use crate::tree::NodeKind;
use crate::types::TypeRef;
use std::fmt::Write;

/// Documentation for the key at the end of `path`.
pub fn documentation(ctx: &QueryContext<'_>, path: &[PathElement]) -> Option<String> {
    let full_path = dotted_path(ctx.trie, path);
    let mut doc = Doc::default();

    match path.last()? {
        PathElement::Trie(id) => match &ctx.trie.get(*id)?.kind {
            NodeKind::Property(meta) => {
                let type_label = meta
                    .type_ref
                    .as_ref()
                    .map(TypeRef::short_name)
                    .or_else(|| meta.type_name.clone());
                doc.definition(type_label.as_deref(), &full_path, meta.default_value.as_deref());
                doc.paragraph(meta.description.as_deref());
                doc.field("Default value", meta.default_value.as_deref());

                let declared_elsewhere = match (&meta.source_type, &meta.type_ref) {
                    (Some(source), Some(declared)) => TypeRef::parse(source)
                        .map(|s| !s.same_erasure(declared))
                        .unwrap_or(true),
                    (Some(_), None) => true,
                    _ => false,
                };
                if declared_elsewhere {
                    doc.field("Declared at", meta.source_type.as_deref());
                }

                if meta.deprecation_level != DeprecationLevel::None {
                    let deprecation = meta.deprecation.as_ref();
                    doc.deprecation(
                        meta.deprecation_level,
                        deprecation.and_then(|d| d.reason.as_deref()),
                        deprecation.and_then(|d| d.replacement.as_deref()),
                    );
                }

                let providers: Vec<_> = [meta.generic_hint(), meta.key_hint(), meta.value_hint()]
                    .into_iter()
                    .flatten()
                    .flat_map(|h| h.providers().iter().cloned())
                    .collect();
                if !providers.is_empty() {
                    doc.field("Value providers", Some(&providers.join(", ")));
                }
            }
            NodeKind::Group(meta) => {
                let meta = meta.as_ref();
                let type_label = meta.and_then(|m| m.type_name.as_deref()).map(short_type_name);
                doc.definition(type_label.as_deref(), &full_path, None);
                doc.paragraph(meta.and_then(|m| m.description.as_deref()));

                if let Some(source_type) = meta.and_then(|m| m.source_type.as_deref()) {
                    let declared = match meta.and_then(|m| m.source_method.as_deref()) {
                        Some(method) => format!("{}#{}", source_type, method),
                        None => source_type.to_string(),
                    };
                    if meta.and_then(|m| m.type_name.as_deref()) != Some(declared.as_str()) {
                        doc.field("Declared at", Some(&declared));
                    }
                }
            }
        },
        PathElement::HintKey {
            property,
            description,
            ..
        } => {
            let value_type = ctx
                .trie
                .get(*property)
                .and_then(|n| n.property())
                .and_then(|m| m.type_ref.as_ref())
                .and_then(|t| t.args().get(1))
                .map(TypeRef::short_name);
            doc.definition(value_type.as_deref(), &full_path, None);
            doc.paragraph(description.as_deref());
        }
        PathElement::Member(member) => {
            doc.definition(Some(&member.short_type()), &full_path, None);
            doc.paragraph(member.description.as_deref());
            doc.field("Declared at", Some(&member.owner.to_string()));
            if member.deprecated {
                doc.deprecation(DeprecationLevel::Warning, None, None);
            }
        }
        PathElement::MapKey { map, .. } => {
            let value_type = map.type_ref().args().get(1).map(TypeRef::short_name);
            doc.definition(value_type.as_deref(), &full_path, None);
        }
        PathElement::Literal { literal, owner } => {
            let parent = dotted_path(ctx.trie, &path[..path.len() - 1]);
            doc.definition(Some(&owner.type_ref().short_name()), &parent, Some(&literal.value));
            doc.paragraph(literal.description.as_deref());
        }
        PathElement::Element(node) => {
            let element_path = format!("{}[]", full_path);
            doc.definition(Some(&node.type_ref().short_name()), &element_path, None);
        }
    }

    Some(doc.finish())
}

/// Documentation for one value accepted at the end of `path`.
pub fn value_documentation(ctx: &QueryContext<'_>, path: &[PathElement], value: &str) -> Option<String> {
    let key = sanitize(value);
    let (choices, _) = ctx.value_choices(path);
    let choice = choices.into_iter().find(|c| sanitize(&c.value) == key)?;

    let mut doc = Doc::default();
    doc.definition(None, &dotted_path(ctx.trie, path), Some(&choice.value));
    doc.paragraph(choice.description.as_deref());
    Some(doc.finish())
}

#[derive(Default)]
struct Doc {
    text: String,
}

impl Doc {
    fn definition(&mut self, type_label: Option<&str>, path: &str, value: Option<&str>) {
        if let Some(type_label) = type_label {
            let _ = write!(self.text, "{} ", type_label);
        }
        self.text.push_str(path);
        if let Some(value) = value {
            let _ = write!(self.text, " = {}", value);
        }
        self.text.push('\n');
    }

    fn paragraph(&mut self, text: Option<&str>) {
        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            let _ = write!(self.text, "\n{}\n", text);
        }
    }

    fn field(&mut self, label: &str, value: Option<&str>) {
        if let Some(value) = value {
            let _ = write!(self.text, "\n{}: {}", label, value);
        }
    }

    fn deprecation(&mut self, level: DeprecationLevel, reason: Option<&str>, replacement: Option<&str>) {
        let banner = match level {
            DeprecationLevel::Error => "ERROR",
            _ => "WARNING",
        };
        let _ = write!(self.text, "\nDeprecation: {}", banner);
        if let Some(reason) = reason {
            let _ = write!(self.text, " - {}", reason);
        }
        if let Some(replacement) = replacement {
            let _ = write!(self.text, "\nReplacement: {}", replacement);
        }
    }

    fn finish(mut self) -> String {
        let trimmed = self.text.trim_end().len();
        self.text.truncate(trimmed);
        self.text
    }
}

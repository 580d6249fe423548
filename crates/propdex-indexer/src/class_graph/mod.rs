//! Type-directed suggestion graph.
//!
//! A [`ClassNode`] stands for one declared type and works out its shape the
//! first time it is touched. Bean members keep only their declared
//! [`TypeRef`] and reach the nested node through the [`ClassGraphCache`],
//! so self-referential types never form ownership cycles and are expanded
//! no deeper than a query asks for.

mod cache;

pub use cache::{CacheStats, ClassGraphCache};

use crate::key::{sanitize, PrefixIndex};
use crate::types::{
    classify_builtin, BuiltinKind, ClassDefinition, MemberDefinition, SuggestionNodeType,
    TypeRef, TypeResolver,
};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Everything a class node needs to initialize itself.
#[derive(Clone, Copy)]
pub struct GraphContext<'a> {
    pub resolver: &'a dyn TypeResolver,
    pub cache: &'a ClassGraphCache,
    pub generation: u64,
}

impl<'a> GraphContext<'a> {
    pub fn new(resolver: &'a dyn TypeResolver, cache: &'a ClassGraphCache, generation: u64) -> Self {
        Self {
            resolver,
            cache,
            generation,
        }
    }

    /// Shared node for a type in the current generation.
    pub fn node_for(&self, type_ref: &TypeRef) -> Arc<ClassNode> {
        self.cache.get_or_create(type_ref, self.generation)
    }
}

impl fmt::Debug for GraphContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphContext")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// A lazily shaped node of the class graph.
pub struct ClassNode {
    type_ref: TypeRef,
    shape: OnceCell<ClassShape>,
}

impl fmt::Debug for ClassNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassNode")
            .field("type_ref", &self.type_ref.to_string())
            .field("initialized", &self.shape.get().is_some())
            .finish()
    }
}

/// How a type navigates.
#[derive(Debug)]
pub enum ClassShape {
    /// Scalar with no children
    Leaf(SuggestionNodeType),
    /// `true`/`false` offered as children and as values
    Boolean(PrefixIndex<Literal>),
    /// Constants offered as children and as values
    Enum(PrefixIndex<Literal>),
    Array(Arc<ClassNode>),
    Iterable(Arc<ClassNode>),
    /// Keys resolve against `key`, the segments after a key against `value`
    Map {
        key: Arc<ClassNode>,
        value: Arc<ClassNode>,
    },
    Bean(PrefixIndex<Arc<BeanMember>>),
}

/// A literal child: a boolean value or an enum constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub value: String,
    pub description: Option<String>,
}

/// A navigable property of a bean type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanMember {
    /// Property name as declared
    pub name: String,
    /// Declared type; an unparsable name resolves to an unknown class
    pub type_ref: TypeRef,
    pub description: Option<String>,
    pub deprecated: bool,
    /// Type that declares the member
    pub owner: TypeRef,
}

impl BeanMember {
    /// Node for the member's own type.
    pub fn graph(&self, ctx: &GraphContext<'_>) -> Arc<ClassNode> {
        ctx.node_for(&self.type_ref)
    }

    pub fn short_type(&self) -> String {
        self.type_ref.short_name()
    }
}

impl ClassNode {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            shape: OnceCell::new(),
        }
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn is_initialized(&self) -> bool {
        self.shape.get().is_some()
    }

    /// Shape of the node, computed on first access.
    pub fn shape(&self, ctx: &GraphContext<'_>) -> &ClassShape {
        self.shape.get_or_init(|| build_shape(&self.type_ref, ctx))
    }

    pub fn node_type(&self, ctx: &GraphContext<'_>) -> SuggestionNodeType {
        match self.shape(ctx) {
            ClassShape::Leaf(kind) => *kind,
            ClassShape::Boolean(_) => SuggestionNodeType::Boolean,
            ClassShape::Enum(_) => SuggestionNodeType::Enum,
            ClassShape::Array(_) => SuggestionNodeType::Array,
            ClassShape::Iterable(_) => SuggestionNodeType::Iterable,
            ClassShape::Map { .. } => SuggestionNodeType::Map,
            ClassShape::Bean(_) => SuggestionNodeType::KnownClass,
        }
    }

    /// Whether the node offers no further key navigation.
    ///
    /// Arrays and collections are leaves exactly when their element is.
    pub fn is_leaf(&self, ctx: &GraphContext<'_>) -> bool {
        match self.shape(ctx) {
            ClassShape::Array(element) | ClassShape::Iterable(element) => element.is_leaf(ctx),
            ClassShape::Map { .. } | ClassShape::Bean(_) => false,
            ClassShape::Leaf(_) | ClassShape::Boolean(_) | ClassShape::Enum(_) => true,
        }
    }

    /// Literal values a property of this type accepts.
    pub fn value_choices(&self, ctx: &GraphContext<'_>) -> Vec<Literal> {
        match self.shape(ctx) {
            ClassShape::Boolean(literals) | ClassShape::Enum(literals) => {
                literals.values().cloned().collect()
            }
            ClassShape::Array(element) | ClassShape::Iterable(element) => {
                element.value_choices(ctx)
            }
            ClassShape::Leaf(_) | ClassShape::Map { .. } | ClassShape::Bean(_) => Vec::new(),
        }
    }

    /// Value node of a map, if this node is one.
    pub fn map_value(&self, ctx: &GraphContext<'_>) -> Option<Arc<ClassNode>> {
        match self.shape(ctx) {
            ClassShape::Map { value, .. } => Some(Arc::clone(value)),
            _ => None,
        }
    }
}

fn build_shape(type_ref: &TypeRef, ctx: &GraphContext<'_>) -> ClassShape {
    let (name, args) = match type_ref {
        TypeRef::Array(element) => return ClassShape::Array(ctx.node_for(element)),
        TypeRef::Named { name, args } => (name.as_str(), args),
    };

    match classify_builtin(name) {
        Some(BuiltinKind::Scalar(SuggestionNodeType::Boolean)) => ClassShape::Boolean(
            ["true", "false"]
                .into_iter()
                .map(|value| {
                    (
                        value.to_string(),
                        Literal {
                            value: value.to_string(),
                            description: None,
                        },
                    )
                })
                .collect(),
        ),
        Some(BuiltinKind::Scalar(kind)) => ClassShape::Leaf(kind),
        Some(BuiltinKind::Iterable) => ClassShape::Iterable(ctx.node_for(&type_ref.arg_or_object(0))),
        Some(BuiltinKind::Map) => ClassShape::Map {
            key: ctx.node_for(&type_ref.arg_or_object(0)),
            value: ctx.node_for(&type_ref.arg_or_object(1)),
        },
        Some(BuiltinKind::StringMap) => {
            let string = TypeRef::named("java.lang.String");
            ClassShape::Map {
                key: ctx.node_for(&string),
                value: ctx.node_for(&string),
            }
        }
        None => match ctx.resolver.resolve(name).as_deref() {
            Some(ClassDefinition::Enum { constants }) => ClassShape::Enum(
                constants
                    .iter()
                    .map(|c| {
                        (
                            sanitize(&c.name),
                            Literal {
                                value: c.name.clone(),
                                description: c.description.clone(),
                            },
                        )
                    })
                    .collect(),
            ),
            Some(ClassDefinition::Bean { members }) => {
                debug!(type_name = %type_ref, members = members.len(), "Expanding bean type");
                ClassShape::Bean(
                    members
                        .iter()
                        .filter_map(|m| bean_member(type_ref, m))
                        .map(|m| (sanitize(&m.name), Arc::new(m)))
                        .collect(),
                )
            }
            None => {
                debug!(type_name = %type_ref, args = args.len(), "Unresolved type, treating as leaf");
                ClassShape::Leaf(SuggestionNodeType::UnknownClass)
            }
        },
    }
}

/// Members must be readable and writable, except that collections and maps
/// may be readable only because they are filled in place.
fn bean_member(owner: &TypeRef, definition: &MemberDefinition) -> Option<BeanMember> {
    if !definition.readable {
        return None;
    }

    let type_ref = TypeRef::parse(&definition.type_name)
        .unwrap_or_else(|_| TypeRef::named(definition.type_name.trim()));

    if !definition.writable && !is_container(&type_ref) {
        return None;
    }

    Some(BeanMember {
        name: definition.name.clone(),
        type_ref,
        description: definition.description.clone(),
        deprecated: definition.deprecated,
        owner: owner.clone(),
    })
}

fn is_container(type_ref: &TypeRef) -> bool {
    match type_ref {
        TypeRef::Array(_) => true,
        TypeRef::Named { name, .. } => matches!(
            classify_builtin(name),
            Some(BuiltinKind::Iterable | BuiltinKind::Map | BuiltinKind::StringMap)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnumConstantDefinition, TypeCatalog};

    fn member(name: &str, type_name: &str) -> MemberDefinition {
        MemberDefinition {
            name: name.to_string(),
            type_name: type_name.to_string(),
            description: None,
            deprecated: false,
            readable: true,
            writable: true,
        }
    }

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.insert(
            "com.acme.Mode",
            ClassDefinition::Enum {
                constants: vec![
                    EnumConstantDefinition {
                        name: "FAST".to_string(),
                        description: Some("Quick".to_string()),
                    },
                    EnumConstantDefinition {
                        name: "SAFE".to_string(),
                        description: None,
                    },
                ],
            },
        );
        let mut read_only = member("hidden", "java.lang.String");
        read_only.writable = false;
        let mut read_only_list = member("tags", "java.util.List<java.lang.String>");
        read_only_list.writable = false;
        catalog.insert(
            "com.acme.Node",
            ClassDefinition::Bean {
                members: vec![
                    member("name", "java.lang.String"),
                    member("parent", "com.acme.Node"),
                    member("children", "java.util.List<com.acme.Node>"),
                    member("mode", "com.acme.Mode"),
                    read_only,
                    read_only_list,
                ],
            },
        );
        catalog
    }

    #[test]
    fn test_scalar_shapes() {
        let catalog = TypeCatalog::new();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let int = ctx.node_for(&TypeRef::named("int"));
        assert_eq!(int.node_type(&ctx), SuggestionNodeType::Integer);
        assert!(int.is_leaf(&ctx));

        let boolean = ctx.node_for(&TypeRef::named("java.lang.Boolean"));
        let values: Vec<_> = boolean.value_choices(&ctx).into_iter().map(|l| l.value).collect();
        assert_eq!(values, vec!["false", "true"]);
    }

    #[test]
    fn test_unresolved_is_unknown_leaf() {
        let catalog = TypeCatalog::new();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let node = ctx.node_for(&TypeRef::named("com.acme.Missing"));
        assert_eq!(node.node_type(&ctx), SuggestionNodeType::UnknownClass);
        assert!(node.is_leaf(&ctx));
    }

    #[test]
    fn test_shape_is_lazy() {
        let catalog = catalog();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let node = ctx.node_for(&TypeRef::named("com.acme.Node"));
        assert!(!node.is_initialized());
        assert_eq!(node.node_type(&ctx), SuggestionNodeType::KnownClass);
        assert!(node.is_initialized());
    }

    #[test]
    fn test_bean_member_filter() {
        let catalog = catalog();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let node = ctx.node_for(&TypeRef::named("com.acme.Node"));
        let ClassShape::Bean(members) = node.shape(&ctx) else {
            panic!("expected bean");
        };
        assert!(members.contains_key("name"));
        assert!(members.contains_key("tags"));
        assert!(!members.contains_key("hidden"));
        assert_eq!(members.len(), 5);
    }

    #[test]
    fn test_self_reference_shares_node() {
        let catalog = catalog();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let node = ctx.node_for(&TypeRef::named("com.acme.Node"));
        let ClassShape::Bean(members) = node.shape(&ctx) else {
            panic!("expected bean");
        };
        let parent = members.get("parent").unwrap().graph(&ctx);
        assert!(Arc::ptr_eq(&node, &parent));

        let children = members.get("children").unwrap().graph(&ctx);
        let ClassShape::Iterable(element) = children.shape(&ctx) else {
            panic!("expected iterable");
        };
        assert!(Arc::ptr_eq(&node, element));
        assert!(!children.is_leaf(&ctx));
    }

    #[test]
    fn test_enum_and_collection_values() {
        let catalog = catalog();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let modes = ctx.node_for(&TypeRef::parse("java.util.Set<com.acme.Mode>").unwrap());
        assert!(modes.is_leaf(&ctx));
        let values: Vec<_> = modes.value_choices(&ctx).into_iter().map(|l| l.value).collect();
        assert_eq!(values, vec!["FAST", "SAFE"]);
    }

    #[test]
    fn test_map_shape() {
        let catalog = catalog();
        let cache = ClassGraphCache::new(16);
        let ctx = GraphContext::new(&catalog, &cache, 1);

        let map = ctx.node_for(
            &TypeRef::parse("java.util.Map<com.acme.Mode,com.acme.Node>").unwrap(),
        );
        assert!(!map.is_leaf(&ctx));
        assert_eq!(map.node_type(&ctx), SuggestionNodeType::Map);
        let value = map.map_value(&ctx).unwrap();
        assert_eq!(value.type_ref().name(), "com.acme.Node");

        let props = ctx.node_for(&TypeRef::named("java.util.Properties"));
        assert_eq!(
            props.map_value(&ctx).unwrap().node_type(&ctx),
            SuggestionNodeType::String
        );
    }
}

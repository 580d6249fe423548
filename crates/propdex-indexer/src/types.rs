//! Declared types and how they are resolved.
//!
//! Type names use the JVM spelling found in metadata documents:
//! `java.util.Map<java.lang.String,com.acme.Pool>`, `com.acme.Mode[]`,
//! `com.acme.Outer$Inner`. Only the first level of type arguments matters
//! for navigation.

use crate::IndexerError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A parsed type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named { name: String, args: Vec<TypeRef> },
    Array(Box<TypeRef>),
}

const OBJECT: &str = "java.lang.Object";

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn object() -> Self {
        Self::named(OBJECT)
    }

    /// Parse a type name.
    pub fn parse(input: &str) -> Result<Self, IndexerError> {
        let mut parser = TypeParser {
            input,
            pos: 0,
        };
        let parsed = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != input.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(parsed)
    }

    /// Fully qualified name without type arguments. Arrays report their element.
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Named { name, .. } => name,
            TypeRef::Array(element) => element.name(),
        }
    }

    pub fn args(&self) -> &[TypeRef] {
        match self {
            TypeRef::Named { args, .. } => args,
            TypeRef::Array(_) => &[],
        }
    }

    /// Type argument at `index`, or `java.lang.Object` when absent.
    pub fn arg_or_object(&self, index: usize) -> TypeRef {
        self.args().get(index).cloned().unwrap_or_else(TypeRef::object)
    }

    /// Display form with simple names, e.g. `Map<String,Pool>`.
    pub fn short_name(&self) -> String {
        match self {
            TypeRef::Named { name, args } => {
                let simple = name.rsplit('.').next().unwrap_or(name).replace('$', ".");
                if args.is_empty() {
                    simple
                } else {
                    let args: Vec<_> = args.iter().map(TypeRef::short_name).collect();
                    format!("{}<{}>", simple, args.join(","))
                }
            }
            TypeRef::Array(element) => format!("{}[]", element.short_name()),
        }
    }

    /// Whether two types are the same ignoring type arguments.
    pub fn same_erasure(&self, other: &TypeRef) -> bool {
        match (self, other) {
            (TypeRef::Named { name: a, .. }, TypeRef::Named { name: b, .. }) => a == b,
            (TypeRef::Array(a), TypeRef::Array(b)) => a.same_erasure(b),
            _ => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeRef::Array(element) => write!(f, "{}[]", element),
        }
    }
}

struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl TypeParser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &str) -> IndexerError {
        IndexerError::InvalidTypeName {
            name: self.input.to_string(),
            reason: format!("{} at offset {}", reason, self.pos),
        }
    }

    fn identifier(&mut self) -> Result<String, IndexerError> {
        self.skip_whitespace();
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | '_' | '$')))
            .unwrap_or(self.rest().len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        let ident = self.rest()[..len].to_string();
        self.pos += len;
        Ok(ident)
    }

    fn parse_type(&mut self) -> Result<TypeRef, IndexerError> {
        let mut parsed = if self.eat("?") {
            if self.eat("extends") {
                self.parse_type()?
            } else {
                // `? super T` and a bare `?` both admit anything
                if self.eat("super") {
                    self.parse_type()?;
                }
                TypeRef::object()
            }
        } else {
            let name = self.identifier()?;
            let mut args = Vec::new();
            if self.eat("<") {
                loop {
                    args.push(self.parse_type()?);
                    if self.eat(",") {
                        continue;
                    }
                    if self.eat(">") {
                        break;
                    }
                    return Err(self.error("expected ',' or '>'"));
                }
            }
            TypeRef::Named { name, args }
        };

        loop {
            if self.eat("[]") || self.eat("...") {
                parsed = TypeRef::Array(Box::new(parsed));
            } else {
                break;
            }
        }
        Ok(parsed)
    }
}

/// Kind of a suggestion node, derived from its declared type or hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionNodeType {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Character,
    String,
    Enum,
    Array,
    Iterable,
    Map,
    KnownClass,
    UnknownClass,
    Undefined,
    /// Leaf whose values come from hints
    Values,
}

impl SuggestionNodeType {
    /// Whether a node of this kind offers no further key navigation.
    pub fn represents_leaf(self) -> bool {
        use SuggestionNodeType::*;
        matches!(
            self,
            Boolean
                | Byte
                | Short
                | Integer
                | Long
                | Float
                | Double
                | Character
                | String
                | Enum
                | UnknownClass
                | Undefined
                | Values
        )
    }

    pub fn represents_array_or_iterable(self) -> bool {
        matches!(self, SuggestionNodeType::Array | SuggestionNodeType::Iterable)
    }
}

/// How a well-known type name navigates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Scalar(SuggestionNodeType),
    Iterable,
    Map,
    /// `java.util.Properties`: a map of strings without type arguments
    StringMap,
}

/// Classify the type names every classpath shares.
pub fn classify_builtin(name: &str) -> Option<BuiltinKind> {
    use SuggestionNodeType as T;

    let kind = match name {
        "boolean" | "java.lang.Boolean" => BuiltinKind::Scalar(T::Boolean),
        "byte" | "java.lang.Byte" => BuiltinKind::Scalar(T::Byte),
        "short" | "java.lang.Short" => BuiltinKind::Scalar(T::Short),
        "int" | "java.lang.Integer" => BuiltinKind::Scalar(T::Integer),
        "long" | "java.lang.Long" => BuiltinKind::Scalar(T::Long),
        "float" | "java.lang.Float" => BuiltinKind::Scalar(T::Float),
        "double" | "java.lang.Double" => BuiltinKind::Scalar(T::Double),
        "char" | "java.lang.Character" => BuiltinKind::Scalar(T::Character),
        "java.lang.String" | "java.lang.CharSequence" => BuiltinKind::Scalar(T::String),
        "java.lang.Object" => BuiltinKind::Scalar(T::UnknownClass),
        "java.lang.Iterable"
        | "java.util.Collection"
        | "java.util.List"
        | "java.util.ArrayList"
        | "java.util.LinkedList"
        | "java.util.Set"
        | "java.util.HashSet"
        | "java.util.LinkedHashSet"
        | "java.util.SortedSet"
        | "java.util.NavigableSet"
        | "java.util.TreeSet"
        | "java.util.Queue"
        | "java.util.Deque" => BuiltinKind::Iterable,
        "java.util.Map"
        | "java.util.HashMap"
        | "java.util.LinkedHashMap"
        | "java.util.SortedMap"
        | "java.util.NavigableMap"
        | "java.util.TreeMap"
        | "java.util.concurrent.ConcurrentMap"
        | "java.util.concurrent.ConcurrentHashMap" => BuiltinKind::Map,
        "java.util.Properties" => BuiltinKind::StringMap,
        _ => return None,
    };
    Some(kind)
}

/// Structure of a type that is not built in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClassDefinition {
    Enum {
        #[serde(default)]
        constants: Vec<EnumConstantDefinition>,
    },
    Bean {
        #[serde(default)]
        members: Vec<MemberDefinition>,
    },
}

/// One enum constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumConstantDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// One bean property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default = "default_true")]
    pub readable: bool,

    #[serde(default = "default_true")]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

/// Resolves type names that are not built in.
///
/// Stands in for the class resolution environment of the host project.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<ClassDefinition>>;
}

/// In-memory resolver loaded from JSON catalogs.
///
/// ```json
/// { "types": { "com.acme.Mode": { "kind": "enum", "constants": [{ "name": "FAST" }] } } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<String, Arc<ClassDefinition>>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    types: BTreeMap<String, ClassDefinition>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(content: &str, path: &Path) -> Result<Self, IndexerError> {
        let file: CatalogFile =
            serde_json::from_str(content).map_err(|e| IndexerError::parse(path, e))?;
        Ok(Self {
            types: file
                .types
                .into_iter()
                .map(|(name, definition)| (name, Arc::new(definition)))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, path)
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: ClassDefinition) {
        self.types.insert(name.into(), Arc::new(definition));
    }

    /// Add every type of `other`; existing entries win.
    pub fn merge(&mut self, other: TypeCatalog) {
        for (name, definition) in other.types {
            self.types.entry(name).or_insert(definition);
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeResolver for TypeCatalog {
    fn resolve(&self, name: &str) -> Option<Arc<ClassDefinition>> {
        self.types.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let parsed = TypeRef::parse("java.lang.String").unwrap();
        assert_eq!(parsed, TypeRef::named("java.lang.String"));
        assert_eq!(parsed.short_name(), "String");
    }

    #[test]
    fn test_parse_generic_map() {
        let parsed = TypeRef::parse("java.util.Map<java.lang.String, com.acme.Pool>").unwrap();
        assert_eq!(parsed.name(), "java.util.Map");
        assert_eq!(parsed.args().len(), 2);
        assert_eq!(parsed.args()[1].name(), "com.acme.Pool");
        assert_eq!(parsed.short_name(), "Map<String,Pool>");
        assert_eq!(parsed.to_string(), "java.util.Map<java.lang.String,com.acme.Pool>");
    }

    #[test]
    fn test_parse_arrays_and_nesting() {
        let parsed = TypeRef::parse("java.util.List<java.util.List<int[]>>[]").unwrap();
        let TypeRef::Array(element) = &parsed else {
            panic!("expected array");
        };
        assert_eq!(element.name(), "java.util.List");
        assert_eq!(parsed.short_name(), "List<List<int[]>>[]");
    }

    #[test]
    fn test_parse_wildcards() {
        let parsed = TypeRef::parse("java.util.List<? extends com.acme.Base>").unwrap();
        assert_eq!(parsed.args()[0].name(), "com.acme.Base");

        let parsed = TypeRef::parse("java.util.Map<?, ? super java.lang.Integer>").unwrap();
        assert_eq!(parsed.args()[0], TypeRef::object());
        assert_eq!(parsed.args()[1], TypeRef::object());
    }

    #[test]
    fn test_parse_inner_class() {
        let parsed = TypeRef::parse("com.acme.Outer$Inner").unwrap();
        assert_eq!(parsed.short_name(), "Outer.Inner");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            TypeRef::parse(""),
            Err(IndexerError::InvalidTypeName { .. })
        ));
        assert!(TypeRef::parse("java.util.Map<java.lang.String").is_err());
        assert!(TypeRef::parse("a b").is_err());
    }

    #[test]
    fn test_arg_or_object() {
        let raw = TypeRef::parse("java.util.List").unwrap();
        assert_eq!(raw.arg_or_object(0), TypeRef::object());
    }

    #[test]
    fn test_same_erasure() {
        let a = TypeRef::parse("java.util.List<java.lang.String>").unwrap();
        let b = TypeRef::parse("java.util.List").unwrap();
        assert!(a.same_erasure(&b));
        assert!(!a.same_erasure(&TypeRef::Array(Box::new(b))));
    }

    #[test]
    fn test_classify_builtin() {
        assert_eq!(
            classify_builtin("java.lang.Integer"),
            Some(BuiltinKind::Scalar(SuggestionNodeType::Integer))
        );
        assert_eq!(classify_builtin("java.util.Set"), Some(BuiltinKind::Iterable));
        assert_eq!(classify_builtin("java.util.TreeMap"), Some(BuiltinKind::Map));
        assert_eq!(classify_builtin("com.acme.Pool"), None);
    }

    #[test]
    fn test_node_type_leaf() {
        assert!(SuggestionNodeType::Enum.represents_leaf());
        assert!(SuggestionNodeType::UnknownClass.represents_leaf());
        assert!(!SuggestionNodeType::Map.represents_leaf());
        assert!(!SuggestionNodeType::KnownClass.represents_leaf());
        assert!(SuggestionNodeType::Iterable.represents_array_or_iterable());
    }

    #[test]
    fn test_catalog_load() {
        let json = r#"{
            "types": {
                "com.acme.Mode": {"kind": "enum", "constants": [{"name": "FAST"}, {"name": "SAFE", "description": "Slow"}]},
                "com.acme.Pool": {"kind": "bean", "members": [{"name": "maxSize", "type": "int"}]}
            }
        }"#;
        let catalog = TypeCatalog::from_json(json, Path::new("types.json")).unwrap();
        assert_eq!(catalog.len(), 2);

        let Some(definition) = catalog.resolve("com.acme.Pool") else {
            panic!("missing type");
        };
        match definition.as_ref() {
            ClassDefinition::Bean { members } => {
                assert!(members[0].readable && members[0].writable);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(catalog.resolve("com.acme.Missing").is_none());
    }

    #[test]
    fn test_catalog_merge_keeps_existing() {
        let mut first = TypeCatalog::new();
        first.insert("a.A", ClassDefinition::Enum { constants: vec![] });

        let mut second = TypeCatalog::new();
        second.insert("a.A", ClassDefinition::Bean { members: vec![] });
        second.insert("b.B", ClassDefinition::Bean { members: vec![] });

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert!(matches!(
            first.resolve("a.A").as_deref(),
            Some(ClassDefinition::Enum { .. })
        ));
    }
}

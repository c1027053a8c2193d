//! Declarations and the annotations attached to them.

use indexmap::IndexMap;
use kestrel_core::{FqName, Name, Span};
use serde::{Deserialize, Serialize};

use crate::ids::DeclId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorKind {
    Getter,
    Setter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    /// A class constructor; its container is the class.
    Constructor,
    /// A property accessor; its container is the property.
    Accessor(AccessorKind),
    /// Classes, functions, properties, type aliases and everything else.
    Other,
}

/// A constant annotation argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstValue {
    String(String),
    Int(i64),
    Bool(bool),
    Class(Type),
    Enum(FqName),
    Array(Vec<ConstValue>),
}

impl ConstValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::String(text) => Some(text),
            _ => None,
        }
    }
}

/// A resolved annotation instance on a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub fq_name: FqName,
    pub arguments: IndexMap<Name, ConstValue>,
    pub span: Option<Span>,
}

impl Annotation {
    pub fn new(fq_name: impl Into<FqName>) -> Self {
        Self {
            fq_name: fq_name.into(),
            arguments: IndexMap::new(),
            span: None,
        }
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<Name>, value: ConstValue) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ConstValue> {
        self.arguments
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: DeclId,
    pub name: Name,
    pub kind: DeclKind,
    /// Class for constructors, property for accessors, enclosing class for members.
    pub container: Option<DeclId>,
    pub annotations: Vec<Annotation>,
    /// Declarations this one directly overrides.
    pub overrides: Vec<DeclId>,
    pub ty: Option<Type>,
    pub span: Option<Span>,
}

impl Declaration {
    pub fn annotation(&self, fq_name: &str) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|ann| ann.fq_name.as_str() == fq_name)
    }
}

/// Flat storage for every declaration known to a compilation snapshot.
#[derive(Debug, Clone, Default)]
pub struct DeclTree {
    decls: Vec<Declaration>,
}

impl DeclTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, name: impl Into<Name>, kind: DeclKind) -> DeclId {
        let id = DeclId::from_raw(self.decls.len());
        self.decls.push(Declaration {
            id,
            name: name.into(),
            kind,
            container: None,
            annotations: Vec::new(),
            overrides: Vec::new(),
            ty: None,
            span: None,
        });
        id
    }

    pub fn get(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(id.idx())
    }

    pub fn get_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        self.decls.get_mut(id.idx())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn set_container(&mut self, id: DeclId, container: DeclId) {
        if let Some(decl) = self.get_mut(id) {
            decl.container = Some(container);
        }
    }

    pub fn add_annotation(&mut self, id: DeclId, annotation: Annotation) {
        if let Some(decl) = self.get_mut(id) {
            decl.annotations.push(annotation);
        }
    }

    pub fn add_override(&mut self, id: DeclId, overridden: DeclId) {
        if let Some(decl) = self.get_mut(id) {
            if !decl.overrides.contains(&overridden) {
                decl.overrides.push(overridden);
            }
        }
    }

    pub fn set_type(&mut self, id: DeclId, ty: Type) {
        if let Some(decl) = self.get_mut(id) {
            decl.ty = Some(ty);
        }
    }

    pub fn set_span(&mut self, id: DeclId, span: Span) {
        if let Some(decl) = self.get_mut(id) {
            decl.span = Some(span);
        }
    }

    pub fn children_of(&self, container: DeclId) -> impl Iterator<Item = &Declaration> + '_ {
        self.decls
            .iter()
            .filter(move |decl| decl.container == Some(container))
    }

    /// Finds a declaration by simple name inside `container` (or at top level
    /// when `container` is `None`).
    pub fn find_by_name(&self, container: Option<DeclId>, name: &str) -> Option<DeclId> {
        self.decls
            .iter()
            .find(|decl| decl.container == container && decl.name.as_str() == name)
            .map(|decl| decl.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_links_containers() {
        let mut tree = DeclTree::new();
        let class = tree.alloc("Widget", DeclKind::Other);
        let ctor = tree.alloc("<init>", DeclKind::Constructor);
        tree.set_container(ctor, class);
        tree.add_annotation(
            class,
            Annotation::new("kotlin.Deprecated")
                .with_argument("value", ConstValue::String("old".into())),
        );

        assert_eq!(tree.find_by_name(Some(class), "<init>"), Some(ctor));
        assert_eq!(tree.children_of(class).count(), 1);
        let ann = tree
            .get(class)
            .and_then(|d| d.annotation("kotlin.Deprecated"))
            .unwrap();
        assert_eq!(ann.argument("value").and_then(ConstValue::as_str), Some("old"));
    }
}

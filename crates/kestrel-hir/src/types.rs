use std::fmt;

use kestrel_core::FqName;
use serde::{Deserialize, Serialize};

/// A resolved type as answered by the type-inference oracle.
///
/// Only classifier types with arguments and nullability are modelled; function
/// types and projections render through their classifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub name: FqName,
    pub args: Vec<Type>,
    pub nullable: bool,
}

pub const JAVA_LANG_CLASS: &str = "java.lang.Class";
pub const KOTLIN_KCLASS: &str = "kotlin.reflect.KClass";

impl Type {
    pub fn named(name: impl AsRef<str>) -> Self {
        Self {
            name: FqName::new(name),
            args: Vec::new(),
            nullable: false,
        }
    }

    pub fn with_args(name: impl AsRef<str>, args: Vec<Type>) -> Self {
        Self {
            name: FqName::new(name),
            args,
            nullable: false,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn any() -> Self {
        Type::named("kotlin.Any")
    }

    pub fn unit() -> Self {
        Type::named("kotlin.Unit")
    }

    pub fn boolean() -> Self {
        Type::named("kotlin.Boolean")
    }

    pub fn int() -> Self {
        Type::named("kotlin.Int")
    }

    pub fn string() -> Self {
        Type::named("kotlin.String")
    }

    pub fn nothing() -> Self {
        Type::named("kotlin.Nothing")
    }

    pub fn java_class(arg: Type) -> Self {
        Type::with_args(JAVA_LANG_CLASS, vec![arg])
    }

    pub fn kclass(arg: Type) -> Self {
        Type::with_args(KOTLIN_KCLASS, vec![arg])
    }

    pub fn short_name(&self) -> &str {
        self.name.short_name()
    }

    pub fn is_unit(&self) -> bool {
        self.name.as_str() == "kotlin.Unit" && !self.nullable
    }

    pub fn is_nothing(&self) -> bool {
        self.name.as_str() == "kotlin.Nothing"
    }

    pub fn is_java_lang_class(&self) -> bool {
        self.name.as_str() == JAVA_LANG_CLASS
    }

    pub fn type_argument(&self, index: usize) -> Option<&Type> {
        self.args.get(index)
    }

    /// Renders the type the way it is written in source with short names,
    /// e.g. `List<String>?`.
    pub fn render(&self) -> String {
        self.render_with(&|ty: &Type| ty.short_name().to_string())
    }

    /// Renders the type with fully-qualified classifier names.
    pub fn render_qualified(&self) -> String {
        self.render_with(&|ty: &Type| ty.name.as_str().to_string())
    }

    fn render_with(&self, name: &dyn Fn(&Type) -> String) -> String {
        let mut out = name(self);
        if !self.args.is_empty() {
            out.push('<');
            for (idx, arg) in self.args.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                out.push_str(&arg.render_with(name));
            }
            out.push('>');
        }
        if self.nullable {
            out.push('?');
        }
        out
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.render_qualified())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_short_and_qualified() {
        let ty = Type::with_args("kotlin.collections.List", vec![Type::string().nullable()]);
        assert_eq!(ty.render(), "List<String?>");
        assert_eq!(
            ty.render_qualified(),
            "kotlin.collections.List<kotlin.String?>"
        );
        assert!(Type::java_class(Type::int()).is_java_lang_class());
    }
}

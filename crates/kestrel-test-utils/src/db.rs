use std::collections::HashMap;

use kestrel_core::{Diagnostic, Name};
use kestrel_hir::{
    AnnotationEntry, Body, Callee, DeclId, DeclKind, DeclTree, Declaration, ExprId, ExprKind,
    LocalId, LocalKind, StmtKind, Type, UnaryOp,
};
use kestrel_resolve::{ResolutionContext, JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION};

use crate::parser::{parse_file, FunctionFixture};
use crate::types::{parse_type, qualify};

/// An in-memory snapshot of one fixture file plus a small type oracle.
///
/// Typing rules are deliberately shallow: literals, declared types, local
/// initializers, `for` elements, calls to declared functions and constructors,
/// and the `javaClass<T>()` builtin.
#[derive(Debug)]
pub struct FixtureDb {
    source: String,
    decls: DeclTree,
    functions: Vec<FunctionFixture>,
    annotations: Vec<AnnotationEntry>,
    classes: Vec<DeclId>,
    supertypes: HashMap<DeclId, Vec<String>>,
    ctor_params: HashMap<DeclId, Vec<(Name, String)>>,
    diagnostics: Vec<Diagnostic>,
    java_class: DeclId,
}

impl FixtureDb {
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let parsed = parse_file(source);
        let mut decls = parsed.decls;
        let java_class = decls.alloc("javaClass", DeclKind::Other);
        decls.set_type(java_class, Type::java_class(Type::named("T")));

        let mut db = Self {
            source: source.to_string(),
            decls,
            functions: parsed.functions,
            annotations: parsed.annotations,
            classes: parsed.classes,
            supertypes: parsed.supertypes,
            ctor_params: parsed.ctor_params,
            diagnostics: Vec::new(),
            java_class,
        };
        db.diagnostics = db.check_annotation_arguments();
        db
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn decls(&self) -> &DeclTree {
        &self.decls
    }

    pub fn functions(&self) -> &[FunctionFixture] {
        &self.functions
    }

    pub fn annotations(&self) -> &[AnnotationEntry] {
        &self.annotations
    }

    /// The first function with a body named `name`.
    #[track_caller]
    pub fn function(&self, name: &str) -> &FunctionFixture {
        self.functions
            .iter()
            .find(|function| function.name == name)
            .unwrap_or_else(|| panic!("fixture has no function `{name}`"))
    }

    /// Looks up a declaration by dotted path: `foo`, `Widget.render`,
    /// `Widget.Widget` (the constructor), `Widget.size.get` (an accessor).
    #[track_caller]
    pub fn decl(&self, path: &str) -> DeclId {
        let mut container = None;
        let mut found = None;
        for segment in path.split('.') {
            let decl = self
                .decls
                .find_by_name(container, segment)
                .unwrap_or_else(|| panic!("fixture has no declaration `{path}`"));
            container = Some(decl);
            found = Some(decl);
        }
        found.unwrap_or_else(|| panic!("empty declaration path"))
    }

    fn is_class(&self, decl: DeclId) -> bool {
        self.classes.contains(&decl)
    }

    fn constructor_of(&self, class: DeclId) -> Option<DeclId> {
        self.decls
            .children_of(class)
            .find(|decl| decl.kind == DeclKind::Constructor)
            .map(|decl| decl.id)
    }

    fn class_of_type(&self, ty: &Type) -> Option<DeclId> {
        self.classes.iter().copied().find(|class| {
            self.decls
                .get(*class)
                .is_some_and(|decl| decl.name.as_str() == ty.name.as_str())
        })
    }

    /// `name` in `class` or in any of its supertypes.
    fn find_member(&self, class: DeclId, name: &str) -> Option<DeclId> {
        let mut queue = vec![class];
        let mut seen = Vec::new();
        while let Some(class) = queue.pop() {
            if seen.contains(&class) {
                continue;
            }
            seen.push(class);
            if let Some(member) = self.decls.find_by_name(Some(class), name) {
                return Some(member);
            }
            for super_name in self.supertypes.get(&class).into_iter().flatten() {
                if let Some(super_class) = self.class_of_type(&parse_type(super_name)) {
                    queue.push(super_class);
                }
            }
        }
        None
    }

    fn resolve_simple(&self, body: &Body, name: &str, is_call: bool) -> Option<DeclId> {
        let container = body
            .owner()
            .and_then(|owner| self.decls.get(owner))
            .and_then(|owner| owner.container)
            .filter(|container| self.is_class(*container));
        let decl = container
            .and_then(|class| self.find_member(class, name))
            .or_else(|| self.decls.find_by_name(None, name))?;
        if is_call && self.is_class(decl) {
            return self.constructor_of(decl);
        }
        Some(decl)
    }

    fn resolve_member(&self, body: &Body, receiver: ExprId, name: &str) -> Option<DeclId> {
        let receiver_ty = self.type_of(body, receiver)?;
        let class = self.class_of_type(&receiver_ty)?;
        self.find_member(class, name)
    }

    fn owner_class_type(&self, body: &Body) -> Option<Type> {
        let owner = self.decls.get(body.owner()?)?;
        let class = self.decls.get(owner.container?)?;
        class.ty.clone()
    }

    fn call_type(&self, body: &Body, expr: ExprId) -> Option<Type> {
        let ExprKind::Call {
            callee, type_args, ..
        } = &body.expr(expr).kind
        else {
            return None;
        };
        if let Callee::Local(local) = callee {
            let data = body.local(*local);
            return match data.kind {
                LocalKind::LocalFunction => Some(
                    data.ty
                        .as_ref()
                        .map(|ty| parse_type(&ty.text))
                        .unwrap_or_else(Type::unit),
                ),
                LocalKind::LocalClass => Some(Type::named(data.name.as_str())),
                LocalKind::Param | LocalKind::Local => None,
            };
        }

        let target = self.resolve_reference(body, expr)?;
        if target == self.java_class {
            let argument = match type_args.first() {
                Some(explicit) => parse_type(&explicit.text),
                None => self
                    .expected_class_argument(body, expr)
                    .unwrap_or_else(Type::any),
            };
            return Some(Type::java_class(argument));
        }
        self.decls.get(target)?.ty.clone()
    }

    /// The type argument of the annotation parameter that `expr` is passed to.
    fn expected_class_argument(&self, body: &Body, expr: ExprId) -> Option<Type> {
        let entry = self
            .annotations
            .iter()
            .find(|entry| entry.body.span() == body.span())?;
        let index = entry.arguments.iter().position(|arg| arg.value == expr)?;
        let argument = &entry.arguments[index];

        let class = self
            .classes
            .iter()
            .copied()
            .find(|class| {
                self.decls
                    .get(*class)
                    .is_some_and(|decl| decl.name == entry.name)
            })?;
        let params = self.ctor_params.get(&self.constructor_of(class)?)?;
        let (_, ty) = match &argument.name {
            Some(name) => params.iter().find(|(param, _)| param == name)?,
            None => params.get(index)?,
        };
        let expected = parse_type(ty);
        expected
            .type_argument(0)
            .filter(|arg| arg.name.as_str() != "*")
            .cloned()
    }

    fn supertype_chain(&self, ty: &Type) -> Vec<Type> {
        let mut chain = vec![ty.clone()];
        let mut current = ty.clone();
        loop {
            let next = match current.name.as_str() {
                "kotlin.Int" | "kotlin.Long" | "kotlin.Short" | "kotlin.Byte" | "kotlin.Double"
                | "kotlin.Float" => Some(Type::named(qualify("Number"))),
                "kotlin.String" => Some(Type::named(qualify("CharSequence"))),
                "kotlin.Any" => None,
                _ => self
                    .class_of_type(&current)
                    .and_then(|class| self.supertypes.get(&class))
                    .and_then(|supers| supers.first())
                    .map(|name| parse_type(name)),
            };
            match next {
                Some(next) if !chain.contains(&next) => {
                    chain.push(next.clone());
                    current = next;
                }
                _ => break,
            }
        }
        let any = Type::any();
        if !chain.contains(&any) {
            chain.push(any);
        }
        chain
    }

    fn check_annotation_arguments(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for entry in &self.annotations {
            for value in entry.argument_exprs() {
                entry.body.walk_expr(value, &mut |expr| {
                    if !matches!(entry.body.expr(expr).kind, ExprKind::Call { .. }) {
                        return;
                    }
                    let is_class = self
                        .type_of(&entry.body, expr)
                        .is_some_and(|ty| ty.is_java_lang_class());
                    if is_class {
                        out.push(Diagnostic::error(
                            JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION,
                            "java.lang.Class is not allowed as an annotation argument",
                            Some(entry.body.expr(value).span),
                        ));
                    }
                });
            }
        }
        out
    }
}

impl ResolutionContext for FixtureDb {
    fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(id)
    }

    fn resolve_reference(&self, body: &Body, expr: ExprId) -> Option<DeclId> {
        match &body.expr(expr).kind {
            ExprKind::Name(name) => self.resolve_simple(body, name.as_str(), false),
            ExprKind::Call {
                receiver: None,
                callee: Callee::Name(name),
                ..
            } => self.resolve_simple(body, name.as_str(), true),
            ExprKind::Call {
                receiver: Some(receiver),
                callee: Callee::Name(name),
                ..
            }
            | ExprKind::FieldAccess { receiver, name } => {
                self.resolve_member(body, *receiver, name.as_str())
            }
            _ => None,
        }
    }

    fn type_of(&self, body: &Body, expr: ExprId) -> Option<Type> {
        match &body.expr(expr).kind {
            ExprKind::Bool(_) => Some(Type::boolean()),
            ExprKind::Int(_) => Some(Type::int()),
            ExprKind::String(_) => Some(Type::string()),
            ExprKind::Null => Some(Type::nothing().nullable()),
            ExprKind::This => self.owner_class_type(body),
            ExprKind::Local(local) => self.type_of_local(body, *local),
            ExprKind::Unary { op, expr } => match op {
                UnaryOp::Not => Some(Type::boolean()),
                UnaryOp::Neg => self.type_of(body, *expr),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_comparison() || op.is_logical() {
                    return Some(Type::boolean());
                }
                let lhs = self.type_of(body, *lhs);
                let rhs = self.type_of(body, *rhs);
                let is_string = |ty: &Option<Type>| {
                    ty.as_ref().is_some_and(|ty| ty.name.as_str() == "kotlin.String")
                };
                if is_string(&lhs) || is_string(&rhs) {
                    return Some(Type::string());
                }
                lhs.or(rhs)
            }
            ExprKind::Call { .. } => self.call_type(body, expr),
            ExprKind::Name(_) | ExprKind::FieldAccess { .. } => {
                let decl = self.resolve_reference(body, expr)?;
                self.decls.get(decl)?.ty.clone()
            }
            ExprKind::ClassLiteral { ty } => Some(Type::kclass(parse_type(&ty.text))),
            ExprKind::Invalid { .. } => None,
        }
    }

    fn type_of_local(&self, body: &Body, local: LocalId) -> Option<Type> {
        let data = body.local(local);
        if matches!(data.kind, LocalKind::LocalFunction | LocalKind::LocalClass) {
            return None;
        }
        if let Some(ty) = &data.ty {
            return Some(parse_type(&ty.text));
        }
        body.stmt_ids().find_map(|stmt| match &body.stmt(stmt).kind {
            StmtKind::Let {
                local: declared,
                initializer: Some(init),
            } if *declared == local => self.type_of(body, *init),
            StmtKind::For {
                local: declared,
                iterable,
                ..
            } if *declared == local => self
                .type_of(body, *iterable)
                .and_then(|ty| ty.type_argument(0).cloned()),
            _ => None,
        })
    }

    fn common_supertype(&self, types: &[Type]) -> Option<Type> {
        let (first, rest) = types.split_first()?;
        let nullable = types.iter().any(|ty| ty.nullable);
        let strip = |ty: &Type| Type {
            nullable: false,
            ..ty.clone()
        };
        let chains: Vec<Vec<Type>> = rest
            .iter()
            .map(|ty| self.supertype_chain(&strip(ty)))
            .collect();
        let common = self
            .supertype_chain(&strip(first))
            .into_iter()
            .find(|candidate| chains.iter().all(|chain| chain.contains(candidate)))
            .unwrap_or_else(Type::any);
        Some(if nullable { common.nullable() } else { common })
    }

    fn is_name_taken(&self, owner: Option<DeclId>, name: &str) -> bool {
        ResolutionContext::is_name_taken(&self.decls, owner, name)
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_members_through_receivers() {
        let db = FixtureDb::parse(
            r#"
class Widget(val size: Int) {
    fun render(): String = "w"
}

fun use(w: Widget): String {
    val n = w.size
    return w.render()
}
"#,
        );
        let function = db.function("use");
        let body = &function.body;
        let render_call = body
            .expr_ids()
            .find(|expr| {
                matches!(&body.expr(*expr).kind, ExprKind::Call { callee: Callee::Name(name), .. } if name == "render")
            })
            .unwrap();
        assert_eq!(
            db.resolve_reference(body, render_call),
            Some(db.decl("Widget.render"))
        );
        assert_eq!(db.type_of(body, render_call), Some(Type::string()));

        let n = body
            .local_ids()
            .find(|local| body.local(*local).name == "n")
            .unwrap();
        assert_eq!(db.type_of_local(body, n), Some(Type::int()));
    }

    #[test]
    fn widens_to_common_supertype() {
        let db = FixtureDb::parse("open class Shape\nclass Circle : Shape()\nclass Square : Shape()\n");
        let common = db.common_supertype(&[Type::named("Circle"), Type::named("Square")]);
        assert_eq!(common, Some(Type::named("Shape")));
        let numeric = db.common_supertype(&[Type::int(), Type::named("kotlin.Double").nullable()]);
        assert_eq!(numeric, Some(Type::named("kotlin.Number").nullable()));
        assert_eq!(
            db.common_supertype(&[Type::int(), Type::string()]),
            Some(Type::any())
        );
    }
}

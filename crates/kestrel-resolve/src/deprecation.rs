//! Deprecation lookup and reporting.
//!
//! A declaration's effective deprecation is its own `@Deprecated` annotation.
//! Constructors and property accessors without one borrow the annotation
//! declared directly on their container (the class or the property). Nothing
//! is inherited through overrides.

use std::collections::HashSet;

use kestrel_core::{Diagnostic, Span};
use kestrel_hir::{Annotation, ConstValue, DeclId, DeclKind, Declaration};

use crate::context::{ResolutionContext, ResolvedCall};
use crate::sink::DiagnosticSink;

pub const KOTLIN_DEPRECATED: &str = "kotlin.Deprecated";
/// Legacy alias honoured for Java interop.
pub const JAVA_DEPRECATED: &str = "java.lang.Deprecated";

const DEPRECATION_ANNOTATIONS: [&str; 2] = [KOTLIN_DEPRECATED, JAVA_DEPRECATED];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeprecationDiagnosticKind {
    DeprecatedSymbol,
    DeprecatedSymbolWithMessage,
}

impl DeprecationDiagnosticKind {
    pub fn code(self) -> &'static str {
        match self {
            DeprecationDiagnosticKind::DeprecatedSymbol => "DEPRECATED_SYMBOL",
            DeprecationDiagnosticKind::DeprecatedSymbolWithMessage => {
                "DEPRECATED_SYMBOL_WITH_MESSAGE"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecationDiagnostic {
    pub kind: DeprecationDiagnosticKind,
    /// Where the deprecated declaration is referenced.
    pub site: Span,
    pub target: DeclId,
    pub message: Option<String>,
}

impl DeprecationDiagnostic {
    pub fn to_diagnostic(&self, target: &Declaration) -> Diagnostic {
        let text = match &self.message {
            Some(message) => format!("'{}' is deprecated. {message}", target.name),
            None => format!("'{}' is deprecated.", target.name),
        };
        Diagnostic::warning(self.kind.code(), text, Some(self.site))
    }
}

/// The deprecation annotation written on `decl` itself. The Kotlin annotation
/// wins over the Java alias.
pub fn declared_deprecation(decl: &Declaration) -> Option<&Annotation> {
    DEPRECATION_ANNOTATIONS
        .iter()
        .find_map(|fq_name| decl.annotation(fq_name))
}

pub fn effective_deprecation<C>(ctx: &C, decl: DeclId) -> Option<&Annotation>
where
    C: ResolutionContext + ?Sized,
{
    let declaration = ctx.declaration(decl)?;
    if let Some(annotation) = declared_deprecation(declaration) {
        return Some(annotation);
    }

    match declaration.kind {
        DeclKind::Constructor | DeclKind::Accessor(_) => {
            let container = ctx.declaration(declaration.container?)?;
            declared_deprecation(container)
        }
        DeclKind::Other => None,
    }
}

/// The `value` argument of a deprecation annotation, when it is a string.
pub fn deprecation_message(annotation: &Annotation) -> Option<&str> {
    annotation.argument("value").and_then(ConstValue::as_str)
}

pub fn deprecation_diagnostic(
    site: Span,
    target: DeclId,
    annotation: &Annotation,
) -> DeprecationDiagnostic {
    let message = deprecation_message(annotation).map(str::to_string);
    let kind = if message.is_some() {
        DeprecationDiagnosticKind::DeprecatedSymbolWithMessage
    } else {
        DeprecationDiagnosticKind::DeprecatedSymbol
    };
    DeprecationDiagnostic {
        kind,
        site,
        target,
        message,
    }
}

/// Reports a deprecation warning for `call` when its target is deprecated.
///
/// The warning goes to `site` when given, otherwise to the callee name. Calls
/// with neither are not reported.
pub fn check_deprecated_call<C>(
    ctx: &C,
    call: &ResolvedCall,
    site: Option<Span>,
    sink: &mut dyn DiagnosticSink,
) where
    C: ResolutionContext + ?Sized,
{
    let Some(site) = site.or(call.callee) else {
        tracing::debug!(
            target: "kestrel.resolve",
            call = ?call.call,
            "no site to report deprecation on"
        );
        return;
    };
    check_deprecated_declaration(ctx, call.target, site, sink);
}

/// Reports a deprecation warning at `site` when `decl` is deprecated.
pub fn check_deprecated_declaration<C>(
    ctx: &C,
    decl: DeclId,
    site: Span,
    sink: &mut dyn DiagnosticSink,
) where
    C: ResolutionContext + ?Sized,
{
    let Some(annotation) = effective_deprecation(ctx, decl) else {
        return;
    };
    let Some(target) = ctx.declaration(decl) else {
        return;
    };
    let diagnostic = deprecation_diagnostic(site, decl, annotation);
    sink.report(diagnostic.to_diagnostic(target));
}

/// Declarations overridden by `decl` (transitively) that declare a deprecation
/// themselves, nearest first.
///
/// Informational only: these never make `decl` deprecated.
pub fn overridden_deprecations<C>(ctx: &C, decl: DeclId) -> Vec<(DeclId, &Annotation)>
where
    C: ResolutionContext + ?Sized,
{
    let mut out = Vec::new();
    let mut seen: HashSet<DeclId> = HashSet::from([decl]);
    let mut queue = std::collections::VecDeque::from(ctx.overrides_of(decl));
    while let Some(next) = queue.pop_front() {
        if !seen.insert(next) {
            continue;
        }
        if let Some(annotation) = ctx.declaration(next).and_then(declared_deprecation) {
            out.push((next, annotation));
        }
        queue.extend(ctx.overrides_of(next));
    }
    out
}

#[cfg(test)]
mod tests {
    use kestrel_hir::{AccessorKind, DeclTree};
    use pretty_assertions::assert_eq;

    use super::*;

    fn deprecated(message: Option<&str>) -> Annotation {
        let annotation = Annotation::new(KOTLIN_DEPRECATED);
        match message {
            Some(message) => {
                annotation.with_argument("value", ConstValue::String(message.to_string()))
            }
            None => annotation,
        }
    }

    #[test]
    fn overriding_function_does_not_inherit_deprecation() {
        let mut tree = DeclTree::new();
        let sup = tree.alloc("Super", DeclKind::Other);
        let sub = tree.alloc("Sub", DeclKind::Other);
        let super_foo = tree.alloc("foo", DeclKind::Other);
        let sub_foo = tree.alloc("foo", DeclKind::Other);
        tree.set_container(super_foo, sup);
        tree.set_container(sub_foo, sub);
        tree.add_override(sub_foo, super_foo);
        tree.add_annotation(super_foo, deprecated(Some("use bar")));

        assert!(effective_deprecation(&tree, sub_foo).is_none());
        assert!(effective_deprecation(&tree, super_foo).is_some());

        let inherited = overridden_deprecations(&tree, sub_foo);
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].0, super_foo);
    }

    #[test]
    fn constructor_falls_back_to_class_annotation() {
        let mut tree = DeclTree::new();
        let class = tree.alloc("Widget", DeclKind::Other);
        let ctor = tree.alloc("Widget", DeclKind::Constructor);
        tree.set_container(ctor, class);
        tree.add_annotation(class, deprecated(Some("use Gadget")));

        let annotation = effective_deprecation(&tree, ctor).unwrap();
        assert_eq!(deprecation_message(annotation), Some("use Gadget"));
    }

    #[test]
    fn accessor_fallback_is_one_level_only() {
        let mut tree = DeclTree::new();
        let class = tree.alloc("Widget", DeclKind::Other);
        let property = tree.alloc("size", DeclKind::Other);
        let getter = tree.alloc("<get-size>", DeclKind::Accessor(AccessorKind::Getter));
        tree.set_container(property, class);
        tree.set_container(getter, property);
        tree.add_annotation(class, deprecated(None));

        assert!(effective_deprecation(&tree, property).is_none());
        assert!(effective_deprecation(&tree, getter).is_none());

        tree.add_annotation(property, deprecated(None));
        assert!(effective_deprecation(&tree, getter).is_some());
    }

    #[test]
    fn kotlin_annotation_wins_over_java_alias() {
        let mut tree = DeclTree::new();
        let foo = tree.alloc("foo", DeclKind::Other);
        tree.add_annotation(foo, Annotation::new(JAVA_DEPRECATED));
        tree.add_annotation(foo, deprecated(Some("kotlin")));

        let annotation = effective_deprecation(&tree, foo).unwrap();
        assert_eq!(annotation.fq_name.as_str(), KOTLIN_DEPRECATED);
    }

    #[test]
    fn message_requires_textual_value() {
        let with_text = deprecated(Some("gone"));
        let with_int = Annotation::new(KOTLIN_DEPRECATED).with_argument("value", ConstValue::Int(3));
        let with_other_name = Annotation::new(KOTLIN_DEPRECATED)
            .with_argument("message", ConstValue::String("gone".into()));

        let target = DeclTree::new().alloc("foo", DeclKind::Other);
        let kinds: Vec<_> = [&with_text, &with_int, &with_other_name]
            .into_iter()
            .map(|ann| deprecation_diagnostic(Span::new(0, 3), target, ann).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                DeprecationDiagnosticKind::DeprecatedSymbolWithMessage,
                DeprecationDiagnosticKind::DeprecatedSymbol,
                DeprecationDiagnosticKind::DeprecatedSymbol,
            ]
        );
    }

    #[test]
    fn call_check_prefers_explicit_site() {
        let mut tree = DeclTree::new();
        let foo = tree.alloc("foo", DeclKind::Other);
        tree.add_annotation(foo, deprecated(Some("use bar")));

        let call = ResolvedCall {
            call: kestrel_hir::ExprId::from_raw(0),
            target: foo,
            callee: Some(Span::new(10, 13)),
        };
        let mut sink: Vec<Diagnostic> = Vec::new();
        check_deprecated_call(&tree, &call, Some(Span::new(2, 5)), &mut sink);
        check_deprecated_call(&tree, &call, None, &mut sink);
        check_deprecated_call(
            &tree,
            &ResolvedCall {
                callee: None,
                ..call
            },
            None,
            &mut sink,
        );

        let spans: Vec<_> = sink.iter().map(|d| d.span).collect();
        assert_eq!(spans, vec![Some(Span::new(2, 5)), Some(Span::new(10, 13))]);
        assert_eq!(sink[0].message, "'foo' is deprecated. use bar");
        assert_eq!(sink[0].code, "DEPRECATED_SYMBOL_WITH_MESSAGE");
    }
}

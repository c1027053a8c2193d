//! Name suggestion and disambiguation for introduced declarations.

pub use kestrel_core::is_identifier;
use kestrel_hir::{Body, Callee, ExprId, ExprKind, Type};

/// What the suggested name is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// A function; `returns_value` adds `get`-prefixed candidates.
    Function { returns_value: bool },
    /// A variable, property or parameter.
    Value,
}

/// Ordered, deduplicated name candidates for an introduced declaration.
///
/// Candidates come from `expr` (callee, field and variable names with `get`
/// and `is` prefixes dropped, plus their camel-case suffixes), from the
/// explicit `seed` names, and from `ty`. When nothing usable is found the list
/// holds only `placeholder`.
pub fn suggest_names(
    body: &Body,
    expr: Option<ExprId>,
    seeds: &[&str],
    ty: Option<&Type>,
    kind: NameKind,
    placeholder: &str,
) -> Vec<String> {
    let mut bases: Vec<String> = Vec::new();
    if let Some(expr) = expr {
        if let Some(name) = expression_name(body, expr) {
            bases.extend(camel_case_suffixes(&strip_accessor_prefix(&name)));
        }
    }
    for seed in seeds {
        bases.extend(camel_case_suffixes(seed));
    }
    if let Some(ty) = ty {
        if let Some(name) = type_name(ty) {
            bases.push(name);
        }
    }

    let candidates: Vec<String> = match kind {
        NameKind::Function {
            returns_value: true,
        } => bases
            .iter()
            .map(|base| format!("get{}", capitalize(base)))
            .collect(),
        NameKind::Function {
            returns_value: false,
        } => Vec::new(),
        NameKind::Value => bases,
    };

    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        if is_identifier(&candidate) && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    if out.is_empty() {
        out.push(placeholder.to_string());
    }
    out
}

/// `base`, then `base1`, `base2`, ... up to `limit` suffixes; the first name
/// `is_taken` rejects is skipped.
pub fn unique_name(base: &str, is_taken: impl Fn(&str) -> bool, limit: usize) -> Option<String> {
    if !is_taken(base) {
        return Some(base.to_string());
    }
    for suffix in 1..=limit {
        let candidate = format!("{base}{suffix}");
        if !is_taken(&candidate) {
            tracing::debug!(
                target: "kestrel.refactor",
                base,
                candidate = %candidate,
                "disambiguated name"
            );
            return Some(candidate);
        }
    }
    None
}

fn expression_name(body: &Body, expr: ExprId) -> Option<String> {
    match &body.expr(expr).kind {
        ExprKind::Call {
            callee: Callee::Name(name),
            ..
        }
        | ExprKind::Name(name)
        | ExprKind::FieldAccess { name, .. } => Some(name.to_string()),
        ExprKind::Call {
            callee: Callee::Local(local),
            ..
        }
        | ExprKind::Local(local) => Some(body.local(*local).name.to_string()),
        ExprKind::Unary { expr, .. } => expression_name(body, *expr),
        _ => None,
    }
}

fn strip_accessor_prefix(name: &str) -> String {
    for prefix in ["get", "is"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(char::is_uppercase) {
                return decapitalize(rest);
            }
        }
    }
    name.to_string()
}

/// `fooBarBaz` -> `fooBarBaz`, `barBaz`, `baz`.
fn camel_case_suffixes(name: &str) -> Vec<String> {
    let mut out = vec![name.to_string()];
    for (idx, ch) in name.char_indices().skip(1) {
        if ch.is_uppercase() {
            out.push(decapitalize(&name[idx..]));
        }
    }
    out
}

fn type_name(ty: &Type) -> Option<String> {
    if ty.is_unit() || ty.is_nothing() || ty.name.as_str() == "kotlin.Any" {
        return None;
    }
    let short = ty.short_name();
    if short.is_empty() {
        return None;
    }
    Some(decapitalize(short))
}

pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use kestrel_core::{Name, Span};
    use kestrel_hir::BodyBuilder;

    use super::*;

    #[test]
    fn unique_name_appends_numeric_suffix() {
        let taken = ["count", "count1"];
        assert_eq!(
            unique_name("count", |name| taken.contains(&name), 10),
            Some("count2".to_string())
        );
        assert_eq!(unique_name("size", |name| taken.contains(&name), 10), Some("size".to_string()));
        assert_eq!(unique_name("x", |_| true, 3), None);
    }

    #[test]
    fn suggests_from_getter_call_and_type() {
        let mut b = BodyBuilder::new(Span::new(0, 40));
        let scope = b.root_scope();
        let call = b.alloc_expr(
            ExprKind::Call {
                receiver: None,
                callee: Callee::Name(Name::new("getUserName")),
                callee_span: Span::new(10, 21),
                type_args: Vec::new(),
                args: Vec::new(),
            },
            Span::new(10, 23),
            scope,
        );
        let stmt = b.alloc_stmt(kestrel_hir::StmtKind::Expr(call), Span::new(10, 23), scope);
        let root = b.alloc_stmt(kestrel_hir::StmtKind::Block(vec![stmt]), Span::new(8, 25), scope);
        let body = b.finish(root);

        let names = suggest_names(
            &body,
            Some(call),
            &[],
            Some(&Type::string()),
            NameKind::Value,
            "value",
        );
        assert_eq!(names, vec!["userName", "name", "string"]);

        let function_names = suggest_names(
            &body,
            Some(call),
            &[],
            None,
            NameKind::Function {
                returns_value: true,
            },
            "extracted",
        );
        assert_eq!(function_names, vec!["getUserName", "getName"]);

        let fallback = suggest_names(
            &body,
            None,
            &[],
            None,
            NameKind::Function {
                returns_value: false,
            },
            "extracted",
        );
        assert_eq!(fallback, vec!["extracted"]);
    }
}

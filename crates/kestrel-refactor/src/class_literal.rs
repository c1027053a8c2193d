//! Rewrites `javaClass<T>()`-style arguments of annotations into `T::class`.
//!
//! The type checker reports `JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION` on
//! annotation arguments that evaluate to a `java.lang.Class`. Every call inside
//! such an argument whose target returns `java.lang.Class` becomes a class
//! literal; class names taken from the inferred type are fully qualified and
//! reported for reference shortening.

use kestrel_core::Span;
use kestrel_hir::{AnnotationEntry, Body, ExprId, ExprKind};
use kestrel_resolve::{ResolutionContext, JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION};

use crate::edit::{FileId, TextEdit, WorkspaceEdit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementTask {
    /// The call, inside the annotation entry's body.
    pub expr: ExprId,
    pub span: Span,
    pub class_name: String,
    /// `class_name` is fully qualified and should be shortened by the host.
    pub needs_shortening: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassLiteralRewrite {
    pub edit: WorkspaceEdit,
    /// Ranges, in the rewritten text, of class names to shorten.
    pub shorten: Vec<Span>,
}

/// Tasks for one annotation entry, children before parents.
pub fn create_replacement_tasks<C>(ctx: &C, entry: &AnnotationEntry) -> Vec<ReplacementTask>
where
    C: ResolutionContext + ?Sized,
{
    let flagged: Vec<Span> = ctx
        .diagnostics()
        .iter()
        .filter(|diagnostic| diagnostic.code == JAVA_LANG_CLASS_ARGUMENT_IN_ANNOTATION)
        .filter_map(|diagnostic| diagnostic.span)
        .filter(|span| entry.span.contains_span(*span))
        .collect();
    if flagged.is_empty() {
        return Vec::new();
    }

    let mut tasks = Vec::new();
    for argument in entry.argument_exprs() {
        visit_post_order(&entry.body, argument, &mut |expr| {
            let span = entry.body.expr(expr).span;
            if !flagged.iter().any(|flag| flag.contains_span(span)) {
                return;
            }
            if let Some(task) = replacement_task(ctx, &entry.body, expr) {
                tasks.push(task);
            }
        });
    }
    tracing::debug!(
        target: "kestrel.refactor",
        annotation = %entry.name,
        tasks = tasks.len(),
        "created class literal replacement tasks"
    );
    tasks
}

/// Tasks for every annotation entry of a file.
pub fn collect_file_tasks<C>(ctx: &C, entries: &[AnnotationEntry]) -> Vec<ReplacementTask>
where
    C: ResolutionContext + ?Sized,
{
    entries
        .iter()
        .flat_map(|entry| create_replacement_tasks(ctx, entry))
        .collect()
}

/// Replaces each task's call with `T::class`. Tasks nested inside another
/// task are dropped, since the outer replacement removes them.
pub fn process_tasks(file: &FileId, tasks: &[ReplacementTask]) -> ClassLiteralRewrite {
    let mut sorted: Vec<&ReplacementTask> = tasks.iter().collect();
    sorted.sort_by_key(|task| (task.span.start, std::cmp::Reverse(task.span.end)));

    let mut kept: Vec<&ReplacementTask> = Vec::new();
    for task in sorted {
        if kept.last().is_some_and(|outer| outer.span.intersects(task.span)) {
            continue;
        }
        kept.push(task);
    }

    let mut edits = Vec::new();
    let mut shorten = Vec::new();
    let mut delta: isize = 0;
    for task in kept {
        let replacement = format!("{}::class", task.class_name);
        let new_start = task.span.start.saturating_add_signed(delta);
        if task.needs_shortening {
            shorten.push(Span::new(new_start, new_start + task.class_name.len()));
        }
        delta += replacement.len() as isize - task.span.len() as isize;
        edits.push(TextEdit::replace(file.clone(), task.span, replacement));
    }

    ClassLiteralRewrite {
        edit: WorkspaceEdit::new(edits),
        shorten,
    }
}

fn replacement_task<C>(ctx: &C, body: &Body, expr: ExprId) -> Option<ReplacementTask>
where
    C: ResolutionContext + ?Sized,
{
    let ExprKind::Call { type_args, .. } = &body.expr(expr).kind else {
        return None;
    };
    let call = ctx.resolve_call(body, expr)?;
    let returns_class = ctx
        .declaration(call.target)
        .and_then(|decl| decl.ty.as_ref())
        .is_some_and(|ty| ty.is_java_lang_class());
    if !returns_class {
        return None;
    }

    let (class_name, needs_shortening) = match type_args.first() {
        Some(explicit) => (explicit.text.trim().to_string(), false),
        None => {
            let ty = ctx.type_of(body, expr)?;
            let argument = ty.type_argument(0)?;
            (argument.render_qualified(), true)
        }
    };
    Some(ReplacementTask {
        expr,
        span: body.expr(expr).span,
        class_name,
        needs_shortening,
    })
}

fn visit_post_order(body: &Body, expr: ExprId, f: &mut dyn FnMut(ExprId)) {
    for child in body.expr_children(expr) {
        visit_post_order(body, child, f);
    }
    f(expr);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(start: usize, end: usize, class_name: &str, needs_shortening: bool) -> ReplacementTask {
        ReplacementTask {
            expr: ExprId::from_raw(0),
            span: Span::new(start, end),
            class_name: class_name.to_string(),
            needs_shortening,
        }
    }

    #[test]
    fn process_tasks_tracks_shortening_in_rewritten_text() {
        // @Ann(javaClass<String>(), javaClass())
        //      5..24                26..37
        let file = FileId::new("A.kt");
        let rewrite = process_tasks(
            &file,
            &[
                task(5, 24, "String", false),
                task(26, 37, "foo.Bar", true),
            ],
        );
        let text = "@Ann(javaClass<String>(), javaClass())";
        let out = rewrite.edit.apply_to(&file, text).unwrap();
        assert_eq!(out, "@Ann(String::class, foo.Bar::class)");
        assert_eq!(rewrite.shorten, vec![Span::new(20, 27)]);
        assert_eq!(&out[20..27], "foo.Bar");
    }

    #[test]
    fn nested_tasks_are_dropped() {
        let file = FileId::new("A.kt");
        let rewrite = process_tasks(
            &file,
            &[task(8, 12, "Inner", false), task(5, 20, "Outer", false)],
        );
        assert_eq!(rewrite.edit.edits.len(), 1);
        assert_eq!(rewrite.edit.edits[0].replacement, "Outer::class");
    }
}

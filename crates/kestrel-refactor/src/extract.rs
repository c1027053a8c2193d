//! Extract Function / Variable / Property / Parameter.
//!
//! Extraction runs in two steps. [`analyze`] collects captures and exits and
//! synthesizes an [`ExtractableCodeDescriptor`]; [`generate`] turns a
//! conflict-free descriptor into text edits. Generation is all-or-nothing:
//! either every edit is produced or a [`ConflictReport`] is returned and
//! nothing is.

use kestrel_config::{ExtractionConfig, ExtractionTarget, Visibility};
use kestrel_core::text::{
    indentation_at, is_at_line_start, line_end_offset, line_start_offset, normalize_whitespace,
    reindent,
};
use kestrel_core::Span;
use kestrel_flow::{classify_region, ExitTarget, RegionExits};
use kestrel_hir::{Body, Callee, ExprId, ExprKind, LocalId, StmtId, StmtKind, Type};
use kestrel_resolve::ResolutionContext;

use crate::capture::analyze_captures;
use crate::conflict::{Conflict, ConflictReport};
use crate::edit::{FileId, TextEdit, WorkspaceEdit};
use crate::naming::unique_name;
use crate::region::ExtractionRegion;
use crate::signature::{
    lookup_owner, synthesize, CarrierSpec, ExtractableCodeDescriptor, ReturnStrategy, ValueSource,
};

const INDENT: &str = "    ";

/// The declaration whose body contains the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerInfo {
    /// The whole declaration, modifiers and annotations included.
    pub span: Span,
    /// `( ... )` of the declaration, parentheses included.
    pub param_list: Option<Span>,
    pub is_member: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionOptions {
    /// Move an extracted function out of its class, as an extension when it
    /// uses the receiver.
    pub top_level: bool,
}

/// One extraction request over an immutable snapshot.
#[derive(Debug, Clone)]
pub struct ExtractionData<'a> {
    pub file: FileId,
    pub source: &'a str,
    pub body: &'a Body,
    pub region: ExtractionRegion,
    pub owner: OwnerInfo,
    pub options: ExtractionOptions,
}

impl<'a> ExtractionData<'a> {
    pub fn new(
        file: FileId,
        source: &'a str,
        body: &'a Body,
        region: ExtractionRegion,
        owner: OwnerInfo,
    ) -> Self {
        Self {
            file,
            source,
            body,
            region,
            owner,
            options: ExtractionOptions::default(),
        }
    }

    /// Resolves `selection` to a region, or reports an invalid selection.
    pub fn from_selection(
        file: FileId,
        source: &'a str,
        body: &'a Body,
        owner: OwnerInfo,
        selection: Span,
    ) -> Result<Self, ConflictReport> {
        let region = ExtractionRegion::from_selection(body, source, selection)
            .ok_or_else(|| ConflictReport::new([Conflict::InvalidSelection]))?;
        Ok(Self::new(file, source, body, region, owner))
    }

    #[must_use]
    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }

    fn text(&self, span: Span) -> &'a str {
        span.slice(self.source).unwrap_or("")
    }
}

/// Which matching occurrences of an extracted expression are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OccurrencesToReplace {
    /// Only the selected expression.
    Original,
    #[default]
    All,
    /// The selected expression plus the occurrences at these indices, in
    /// textual order.
    Indices(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionGeneratorOptions {
    pub target: ExtractionTarget,
    pub visibility: Visibility,
    pub occurrences: OccurrencesToReplace,
    pub with_default_value: bool,
    pub specify_type: bool,
    /// Overrides the first suggested name.
    pub name: Option<String>,
    pub placeholder_function_name: String,
    pub placeholder_variable_name: String,
    pub max_name_attempts: usize,
}

impl From<&ExtractionConfig> for ExtractionGeneratorOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            target: config.target,
            visibility: config.visibility,
            occurrences: if config.replace_all_occurrences {
                OccurrencesToReplace::All
            } else {
                OccurrencesToReplace::Original
            },
            with_default_value: config.with_default_value,
            specify_type: config.specify_type,
            name: None,
            placeholder_function_name: config.placeholder_function_name.clone(),
            placeholder_variable_name: config.placeholder_variable_name.clone(),
            max_name_attempts: config.max_name_attempts.max(1),
        }
    }
}

impl Default for ExtractionGeneratorOptions {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl ExtractionGeneratorOptions {
    #[must_use]
    pub fn with_target(mut self, target: ExtractionTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_occurrences(mut self, occurrences: OccurrencesToReplace) -> Self {
        self.occurrences = occurrences;
        self
    }
}

/// The result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedExtraction {
    pub name: String,
    /// Text of the introduced declaration(s).
    pub declaration: String,
    /// Text replacing the selected code.
    pub call_site: String,
    pub edit: WorkspaceEdit,
    /// Argument to add at existing call sites of the owner, for Introduce
    /// Parameter.
    pub default_value_for_call: Option<String>,
    /// Spans (in the original text) of every replaced occurrence.
    pub replaced: Vec<Span>,
}

/// Analyzes the region and synthesizes the extracted declaration's shape.
pub fn analyze<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    options: &ExtractionGeneratorOptions,
) -> ExtractableCodeDescriptor
where
    C: ResolutionContext + ?Sized,
{
    let captures = analyze_captures(ctx, data.body, &data.region);
    let exits = match &data.region {
        ExtractionRegion::Statements { stmts, span } => classify_region(data.body, stmts, *span),
        ExtractionRegion::Expression { .. } => RegionExits {
            exits: Vec::new(),
            falls_through: true,
        },
    };
    synthesize(ctx, data, captures, exits, options)
}

/// Produces the edits for `descriptor`, or every conflict that prevents it.
pub fn generate<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    descriptor: &ExtractableCodeDescriptor,
    options: &ExtractionGeneratorOptions,
) -> Result<GeneratedExtraction, ConflictReport>
where
    C: ResolutionContext + ?Sized,
{
    if descriptor.has_conflicts() {
        let report = ConflictReport::new(descriptor.conflicts.iter().cloned());
        tracing::debug!(
            target: "kestrel.refactor",
            conflicts = report.conflicts.len(),
            "extraction blocked by conflicts"
        );
        return Err(report);
    }

    let mut descriptor = descriptor.clone();
    revalidate_parameter_names(ctx, data, &mut descriptor, options)?;

    let generated = match descriptor.target {
        ExtractionTarget::Function => generate_function(ctx, data, &descriptor, options)?,
        ExtractionTarget::Variable => generate_variable(data, &descriptor, options)?,
        ExtractionTarget::Property => generate_property(data, &descriptor, options)?,
        ExtractionTarget::Parameter => generate_parameter(data, &mut descriptor, options)?,
    };
    tracing::debug!(
        target: "kestrel.refactor",
        name = %generated.name,
        edits = generated.edit.edits.len(),
        "generated extraction"
    );
    Ok(generated)
}

/// [`analyze`] followed by [`generate`].
pub fn extract<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    options: &ExtractionGeneratorOptions,
) -> Result<GeneratedExtraction, ConflictReport>
where
    C: ResolutionContext + ?Sized,
{
    let descriptor = analyze(ctx, data, options);
    generate(ctx, data, &descriptor, options)
}

/// Renames parameters that clash with names introduced by generation itself.
fn revalidate_parameter_names<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    descriptor: &mut ExtractableCodeDescriptor,
    options: &ExtractionGeneratorOptions,
) -> Result<(), ConflictReport>
where
    C: ResolutionContext + ?Sized,
{
    if descriptor.target != ExtractionTarget::Function {
        return Ok(());
    }
    let mut introduced: Vec<String> = vec![descriptor.name.clone()];
    if let ReturnStrategy::Carrier(spec) = &descriptor.return_strategy {
        introduced.push(spec.class_name.clone());
    }
    introduced.extend(
        descriptor
            .local_declarations
            .iter()
            .map(|declaration| declaration.name.clone()),
    );
    let declared: Vec<String> = descriptor
        .captures
        .declared
        .iter()
        .map(|local| data.body.local(*local).name.to_string())
        .collect();

    for idx in 0..descriptor.parameters.len() {
        let current = descriptor.parameters[idx].name.clone();
        if !introduced.contains(&current) {
            continue;
        }
        let others: Vec<String> = descriptor
            .parameters
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != idx)
            .map(|(_, parameter)| parameter.name.clone())
            .collect();
        let taken = |name: &str| {
            introduced.iter().any(|n| n == name)
                || others.iter().any(|n| n == name)
                || declared.iter().any(|n| n == name)
                || ctx.is_name_taken(lookup_owner(data), name)
        };
        match unique_name(&current, taken, options.max_name_attempts) {
            Some(name) => {
                tracing::debug!(
                    target: "kestrel.refactor",
                    from = %current,
                    to = %name,
                    "renamed parameter clashing with a generated name"
                );
                descriptor.parameters[idx].name = name;
            }
            None => {
                return Err(ConflictReport::new([Conflict::NameExhausted { base: current }]));
            }
        }
    }
    Ok(())
}

fn generate_function<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    d: &ExtractableCodeDescriptor,
    options: &ExtractionGeneratorOptions,
) -> Result<GeneratedExtraction, ConflictReport>
where
    C: ResolutionContext + ?Sized,
{
    let source = data.source;
    let body = data.body;
    let region_span = data.region.span();
    let region_indent = indentation_at(source, region_span.start);

    let anchor_span = insertion_anchor(ctx, data);
    let owner_indent = indentation_at(source, anchor_span.start);
    let body_indent = format!("{owner_indent}{INDENT}");

    let renames = parameter_renames(d);
    let carrier_type = |spec: &CarrierSpec| Type::named(&spec.class_name);

    // Prelude: relocated declarations, then `var` mirrors and write-only locals.
    let mut lines: Vec<String> = Vec::new();
    for relocated in &d.captures.relocated {
        let text = rewrite(source, relocated.span, &renames);
        let indent = indentation_at(source, relocated.span.start);
        lines.push(reindent(&text, &indent, &body_indent));
    }
    for parameter in d.parameters.iter().filter(|p| p.needs_mirror()) {
        lines.push(format!("{body_indent}var {0} = {0}", parameter.name));
    }
    for declaration in &d.local_declarations {
        lines.push(format!(
            "{body_indent}var {}: {}",
            declaration.name,
            declaration.ty.render()
        ));
    }

    match &data.region {
        ExtractionRegion::Expression { span, .. } => {
            let text = rewrite(source, *span, &renames);
            let text = match &d.return_strategy {
                ReturnStrategy::Unit => text,
                _ => format!("return {text}"),
            };
            lines.push(reindent(&text, &region_indent, &body_indent));
        }
        ExtractionRegion::Statements { .. } => {
            let mut edits = exit_rewrites(data, d, &renames);
            let exit_spans: Vec<Span> = edits.iter().map(|(span, _)| *span).collect();
            edits.extend(
                renames
                    .iter()
                    .filter(|(span, _)| region_span.contains_span(*span))
                    .filter(|(span, _)| !exit_spans.iter().any(|exit| exit.contains_span(*span)))
                    .cloned(),
            );
            let text = rewrite(source, region_span, &edits);
            lines.push(reindent(&text, &region_indent, &body_indent));

            match &d.return_strategy {
                ReturnStrategy::Value {
                    source: ValueSource::WriteCandidate { local, .. },
                    ..
                } => lines.push(format!("{body_indent}return {}", returned_name(d, body, *local))),
                ReturnStrategy::ControlFlag { .. } if d.exits.falls_through => {
                    lines.push(format!("{body_indent}return false"));
                }
                ReturnStrategy::Carrier(spec) if spec.includes_normal => lines.push(format!(
                    "{body_indent}return {}.{}",
                    spec.class_name,
                    CarrierSpec::NORMAL
                )),
                _ => {}
            }
        }
    }

    let params = d
        .parameters
        .iter()
        .map(|parameter| format!("{}: {}", parameter.name, parameter.ty.render()))
        .collect::<Vec<_>>()
        .join(", ");
    let receiver = d
        .receiver
        .as_ref()
        .map(|ty| format!("{}.", ty.render()))
        .unwrap_or_default();
    let return_type = d
        .return_strategy
        .return_type(carrier_type)
        .map(|ty| format!(": {}", ty.render()))
        .unwrap_or_default();
    let mut declaration = format!(
        "{}fun {receiver}{}({params}){return_type} {{\n",
        visibility_prefix(options.visibility),
        d.name
    );
    for line in &lines {
        declaration.push_str(line.trim_end_matches('\n'));
        declaration.push('\n');
    }
    declaration.push_str(&owner_indent);
    declaration.push('}');

    if let ReturnStrategy::Carrier(spec) = &d.return_strategy {
        declaration.push_str("\n\n");
        declaration.push_str(&owner_indent);
        declaration.push_str(&carrier_class(spec, &owner_indent, options.visibility));
    }

    let args = d
        .parameters
        .iter()
        .map(|parameter| parameter.original_name.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let call = format!("{}({args})", d.name);
    let call_site = call_site_text(data, d, &call, &region_indent, options.max_name_attempts);

    let mut edits = vec![TextEdit::insert(
        data.file.clone(),
        anchor_span.end,
        format!("\n\n{owner_indent}{declaration}"),
    )];
    for relocated in &d.captures.relocated {
        edits.push(TextEdit::delete(
            data.file.clone(),
            whole_lines(source, relocated.span),
        ));
    }
    let replaced = match &data.region {
        ExtractionRegion::Expression { expr, .. } => select_occurrences(data, *expr, options, None),
        ExtractionRegion::Statements { .. } => vec![region_span],
    };
    for span in &replaced {
        edits.push(TextEdit::replace(data.file.clone(), *span, call_site.clone()));
    }

    Ok(GeneratedExtraction {
        name: d.name.clone(),
        declaration,
        call_site,
        edit: normalized(edits)?,
        default_value_for_call: None,
        replaced,
    })
}

fn generate_variable(
    data: &ExtractionData<'_>,
    d: &ExtractableCodeDescriptor,
    options: &ExtractionGeneratorOptions,
) -> Result<GeneratedExtraction, ConflictReport> {
    let body = data.body;
    let ExtractionRegion::Expression { expr, span } = &data.region else {
        return Err(invalid_selection());
    };
    let anchor = data.region.anchor(body).ok_or_else(invalid_selection)?;
    let anchor_span = body.stmt(anchor).span;

    // Locals bound inside the anchor are not visible where the variable goes.
    let bound_inside = local_bindings(body, *expr)
        .into_iter()
        .any(|local| anchor_span.contains_span(body.local(local).span));
    if bound_inside {
        return Err(invalid_selection());
    }

    let indent = indentation_at(data.source, anchor_span.start);
    let declaration = format!(
        "val {}{} = {}",
        d.name,
        type_suffix(d, options),
        data.text(*span)
    );

    let scope = body
        .parent(anchor)
        .map(|block| Span::new(anchor_span.start, body.stmt(block).span.end))
        .unwrap_or(anchor_span);
    let replaced = select_occurrences(data, *expr, options, Some(scope));

    let whole_statement = matches!(&body.stmt(anchor).kind, StmtKind::Expr(e) if e == expr)
        && body.expr(*expr).span == anchor_span;
    let mut edits = Vec::new();
    if whole_statement {
        edits.push(TextEdit::replace(
            data.file.clone(),
            anchor_span,
            declaration.clone(),
        ));
    } else {
        edits.push(TextEdit::insert(
            data.file.clone(),
            anchor_span.start,
            format!("{declaration}\n{indent}"),
        ));
    }
    for occurrence in &replaced {
        if whole_statement && *occurrence == *span {
            continue;
        }
        edits.push(TextEdit::replace(data.file.clone(), *occurrence, d.name.clone()));
    }

    Ok(GeneratedExtraction {
        name: d.name.clone(),
        declaration,
        call_site: d.name.clone(),
        edit: normalized(edits)?,
        default_value_for_call: None,
        replaced,
    })
}

fn generate_property(
    data: &ExtractionData<'_>,
    d: &ExtractableCodeDescriptor,
    options: &ExtractionGeneratorOptions,
) -> Result<GeneratedExtraction, ConflictReport> {
    let ExtractionRegion::Expression { expr, span } = &data.region else {
        return Err(invalid_selection());
    };
    let indent = indentation_at(data.source, data.owner.span.start);
    let declaration = format!(
        "{}val {}{} = {}",
        visibility_prefix(options.visibility),
        d.name,
        type_suffix(d, options),
        data.text(*span)
    );
    let replaced = select_occurrences(data, *expr, options, None);

    let mut edits = vec![TextEdit::insert(
        data.file.clone(),
        data.owner.span.start,
        format!("{declaration}\n\n{indent}"),
    )];
    for occurrence in &replaced {
        edits.push(TextEdit::replace(data.file.clone(), *occurrence, d.name.clone()));
    }

    Ok(GeneratedExtraction {
        name: d.name.clone(),
        declaration,
        call_site: d.name.clone(),
        edit: normalized(edits)?,
        default_value_for_call: None,
        replaced,
    })
}

fn generate_parameter(
    data: &ExtractionData<'_>,
    d: &mut ExtractableCodeDescriptor,
    options: &ExtractionGeneratorOptions,
) -> Result<GeneratedExtraction, ConflictReport> {
    let ExtractionRegion::Expression { expr, span } = &data.region else {
        return Err(invalid_selection());
    };
    let param_list = data
        .owner
        .param_list
        .ok_or_else(|| ConflictReport::new([Conflict::MissingParameterList]))?;

    // Back-patch the placeholder type now that the value type is final.
    let value_type = d.return_strategy.value_type().cloned().unwrap_or_else(Type::any);
    let introduced = d
        .parameters
        .iter_mut()
        .find(|parameter| parameter.local.is_none())
        .ok_or_else(invalid_selection)?;
    introduced.ty = value_type;

    let default_value = data.text(*span).to_string();
    let mut declaration = format!("{}: {}", introduced.name, introduced.ty.render());
    if options.with_default_value {
        declaration.push_str(" = ");
        declaration.push_str(&default_value);
    }
    let separator = if data.body.params().next().is_some() {
        ", "
    } else {
        ""
    };
    let insert_at = param_list.end.saturating_sub(1).max(param_list.start);

    let replaced = select_occurrences(data, *expr, options, None);
    let mut edits = vec![TextEdit::insert(
        data.file.clone(),
        insert_at,
        format!("{separator}{declaration}"),
    )];
    for occurrence in &replaced {
        edits.push(TextEdit::replace(data.file.clone(), *occurrence, d.name.clone()));
    }

    Ok(GeneratedExtraction {
        name: d.name.clone(),
        declaration,
        call_site: d.name.clone(),
        edit: normalized(edits)?,
        default_value_for_call: Some(default_value),
        replaced,
    })
}

/// The declaration after which an extracted function is inserted.
fn insertion_anchor<C>(ctx: &C, data: &ExtractionData<'_>) -> Span
where
    C: ResolutionContext + ?Sized,
{
    if data.options.top_level && data.owner.is_member {
        let class_span = data
            .body
            .owner()
            .and_then(|owner| ctx.declaration(owner))
            .and_then(|owner| owner.container)
            .and_then(|class| ctx.declaration(class))
            .and_then(|class| class.span);
        if let Some(span) = class_span {
            return span;
        }
    }
    data.owner.span
}

/// Reference renames for parameters whose name differs from the captured local.
fn parameter_renames(d: &ExtractableCodeDescriptor) -> Vec<(Span, String)> {
    let mut out = Vec::new();
    for parameter in &d.parameters {
        if parameter.name == parameter.original_name.as_str() {
            continue;
        }
        let Some(capture) = parameter.local.and_then(|local| d.captures.capture(local)) else {
            continue;
        };
        for span in &capture.reference_spans {
            out.push((*span, parameter.name.clone()));
        }
    }
    out.sort_by_key(|(span, _)| span.start);
    out
}

/// Replacements for the forced exits of the region under the chosen strategy.
fn exit_rewrites(
    data: &ExtractionData<'_>,
    d: &ExtractableCodeDescriptor,
    renames: &[(Span, String)],
) -> Vec<(Span, String)> {
    let body = data.body;
    let mut out = Vec::new();
    for exit in d.exits.forced() {
        let Some(stmt) = exit.stmt else {
            continue;
        };
        let value = exit
            .value
            .map(|value| rewrite(data.source, body.expr(value).span, renames));
        let replacement = match &d.return_strategy {
            ReturnStrategy::ControlFlag { .. } => "return true".to_string(),
            ReturnStrategy::AlwaysExits { .. } => match value {
                Some(value) => format!("return {value}"),
                None => "return".to_string(),
            },
            ReturnStrategy::Carrier(spec) => {
                let Some(variant) = spec.variant_for(stmt) else {
                    continue;
                };
                match value {
                    Some(value) => format!("return {}.{}({value})", spec.class_name, variant.name),
                    None => format!("return {}.{}", spec.class_name, variant.name),
                }
            }
            ReturnStrategy::Unit | ReturnStrategy::Value { .. } => continue,
        };
        out.push((body.stmt(stmt).span, replacement));
    }
    out
}

fn returned_name(d: &ExtractableCodeDescriptor, body: &Body, local: LocalId) -> String {
    if let Some(parameter) = d.parameter_for(local) {
        return parameter.name.clone();
    }
    body.local(local).name.to_string()
}

fn call_site_text(
    data: &ExtractionData<'_>,
    d: &ExtractableCodeDescriptor,
    call: &str,
    indent: &str,
    name_attempts: usize,
) -> String {
    let body = data.body;
    match &d.return_strategy {
        ReturnStrategy::Unit
        | ReturnStrategy::Value {
            source: ValueSource::Expression,
            ..
        } => call.to_string(),
        ReturnStrategy::Value {
            source:
                ValueSource::WriteCandidate {
                    local,
                    declared_in_region: true,
                },
            ..
        } => {
            let declared = body.local(*local);
            let keyword = if declared.mutable { "var" } else { "val" };
            format!("{keyword} {} = {call}", declared.name)
        }
        ReturnStrategy::Value {
            source: ValueSource::WriteCandidate { local, .. },
            ..
        } => format!("{} = {call}", body.local(*local).name),
        ReturnStrategy::ControlFlag { jump, .. } => {
            format!("if ({call}) {}", jump_text(body, *jump))
        }
        ReturnStrategy::AlwaysExits { exit, jump, ty } => {
            let has_value = ty.as_ref().is_some_and(|ty| !ty.is_unit());
            match exit {
                ExitTarget::Function { .. } if has_value => {
                    format!("{} {call}", jump_text(body, *jump))
                }
                _ => format!("{call}\n{indent}{}", jump_text(body, *jump)),
            }
        }
        ReturnStrategy::Carrier(spec) => {
            let taken = |name: &str| body.locals().iter().any(|local| local.name == name);
            let result =
                unique_name("result", taken, name_attempts).unwrap_or_else(|| "result".into());
            let mut out = format!("when (val {result} = {call}) {{\n");
            for variant in &spec.variants {
                let Some(jump) = variant.exits.first() else {
                    continue;
                };
                let jump = jump_text(body, *jump);
                if variant.payload.is_some() {
                    out.push_str(&format!(
                        "{indent}{INDENT}is {}.{} -> {jump} {result}.value\n",
                        spec.class_name, variant.name
                    ));
                } else {
                    out.push_str(&format!(
                        "{indent}{INDENT}{}.{} -> {jump}\n",
                        spec.class_name, variant.name
                    ));
                }
            }
            if spec.includes_normal {
                out.push_str(&format!(
                    "{indent}{INDENT}{}.{} -> {{}}\n",
                    spec.class_name,
                    CarrierSpec::NORMAL
                ));
            }
            out.push_str(indent);
            out.push('}');
            out
        }
    }
}

/// `return`, `break@outer`, ... for a jump statement, without its value.
fn jump_text(body: &Body, stmt: StmtId) -> String {
    let (keyword, label) = match &body.stmt(stmt).kind {
        StmtKind::Return { label, .. } => ("return", label),
        StmtKind::Break { label } => ("break", label),
        StmtKind::Continue { label } => ("continue", label),
        _ => return "return".to_string(),
    };
    match label {
        Some(label) => format!("{keyword}@{label}"),
        None => keyword.to_string(),
    }
}

fn carrier_class(spec: &CarrierSpec, indent: &str, visibility: Visibility) -> String {
    let class = &spec.class_name;
    let mut out = format!(
        "{}sealed class {class} {{\n",
        visibility_prefix(visibility)
    );
    if spec.includes_normal {
        out.push_str(&format!(
            "{indent}{INDENT}object {} : {class}()\n",
            CarrierSpec::NORMAL
        ));
    }
    for variant in &spec.variants {
        match &variant.payload {
            Some(ty) => out.push_str(&format!(
                "{indent}{INDENT}class {}(val value: {}) : {class}()\n",
                variant.name,
                ty.render()
            )),
            None => out.push_str(&format!(
                "{indent}{INDENT}object {} : {class}()\n",
                variant.name
            )),
        }
    }
    out.push_str(indent);
    out.push('}');
    out
}

fn visibility_prefix(visibility: Visibility) -> String {
    visibility
        .keyword()
        .map(|keyword| format!("{keyword} "))
        .unwrap_or_default()
}

fn type_suffix(d: &ExtractableCodeDescriptor, options: &ExtractionGeneratorOptions) -> String {
    match d.return_strategy.value_type() {
        Some(ty) if options.specify_type => format!(": {}", ty.render()),
        _ => String::new(),
    }
}

/// Applies `edits` lying inside `span` to the text of `span`.
fn rewrite(source: &str, span: Span, edits: &[(Span, String)]) -> String {
    let mut inside: Vec<&(Span, String)> = edits
        .iter()
        .filter(|(range, _)| span.contains_span(*range))
        .collect();
    inside.sort_by_key(|(range, _)| range.start);

    let mut out = String::new();
    let mut cursor = span.start;
    for (range, replacement) in inside {
        if range.start < cursor {
            continue;
        }
        out.push_str(source.get(cursor..range.start).unwrap_or(""));
        out.push_str(replacement);
        cursor = range.end;
    }
    out.push_str(source.get(cursor..span.end).unwrap_or(""));
    out
}

/// `span` widened to whole lines when nothing else shares them.
fn whole_lines(source: &str, span: Span) -> Span {
    let end = line_end_offset(source, span.end);
    let rest_blank = source
        .get(span.end..end)
        .is_some_and(|rest| rest.trim().is_empty());
    if is_at_line_start(source, span.start) && rest_blank {
        Span::new(line_start_offset(source, span.start), end)
    } else {
        span
    }
}

/// Locals referenced by `expr`, in walk order.
fn local_bindings(body: &Body, expr: ExprId) -> Vec<LocalId> {
    let mut out = Vec::new();
    body.walk_expr(expr, &mut |inner| match &body.expr(inner).kind {
        ExprKind::Local(local)
        | ExprKind::Call {
            callee: Callee::Local(local),
            ..
        } => out.push(*local),
        _ => {}
    });
    out
}

/// Expressions equal to `expr` in normalized text and local bindings, in
/// textual order, without nesting.
fn find_occurrences(data: &ExtractionData<'_>, expr: ExprId, scope: Option<Span>) -> Vec<Span> {
    let body = data.body;
    let key = normalize_whitespace(data.text(body.expr(expr).span));
    let bindings = local_bindings(body, expr);

    let mut found: Vec<Span> = body
        .expr_ids()
        .filter(|candidate| body.expr_stmt(*candidate).is_some())
        .filter(|candidate| {
            let span = body.expr(*candidate).span;
            scope.map_or(true, |scope| scope.contains_span(span))
                && normalize_whitespace(data.text(span)) == key
                && local_bindings(body, *candidate) == bindings
        })
        .map(|candidate| body.expr(candidate).span)
        .collect();
    found.sort();
    found.dedup();

    let mut out: Vec<Span> = Vec::new();
    for span in found {
        if out.last().is_some_and(|last: &Span| last.intersects(span)) {
            continue;
        }
        out.push(span);
    }
    out
}

fn select_occurrences(
    data: &ExtractionData<'_>,
    expr: ExprId,
    options: &ExtractionGeneratorOptions,
    scope: Option<Span>,
) -> Vec<Span> {
    let original = data.body.expr(expr).span;
    let all = find_occurrences(data, expr, scope);
    let mut out: Vec<Span> = match &options.occurrences {
        OccurrencesToReplace::Original => Vec::new(),
        OccurrencesToReplace::All => all,
        OccurrencesToReplace::Indices(indices) => indices
            .iter()
            .filter_map(|idx| all.get(*idx).copied())
            .collect(),
    };
    if !out.contains(&original) {
        out.push(original);
    }
    out.sort();
    out.dedup();
    out
}

fn normalized(edits: Vec<TextEdit>) -> Result<WorkspaceEdit, ConflictReport> {
    let mut edit = WorkspaceEdit::new(edits);
    edit.normalize()
        .map_err(|err| ConflictReport::new([Conflict::Edit(err.to_string())]))?;
    Ok(edit)
}

fn invalid_selection() -> ConflictReport {
    ConflictReport::new([Conflict::InvalidSelection])
}

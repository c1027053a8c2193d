//! Signature synthesis: parameters, return strategy and name of the
//! extracted declaration.

use indexmap::IndexMap;
use kestrel_config::ExtractionTarget;
use kestrel_core::Name;
use kestrel_flow::{seq_definitely_assigns, ExitPath, ExitTarget, JumpKind, RegionExits};
use kestrel_hir::{Body, LocalId, LocalKind, StmtId, Type};
use kestrel_resolve::ResolutionContext;

use crate::capture::{CaptureAnalysis, CaptureUsage, CapturedSymbol};
use crate::conflict::Conflict;
use crate::extract::{ExtractionData, ExtractionGeneratorOptions};
use crate::naming::{capitalize, is_identifier, suggest_names, unique_name, NameKind};
use crate::region::ExtractionRegion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Argument passed at the call site.
    pub original_name: Name,
    /// The captured local, `None` for an introduced parameter.
    pub local: Option<LocalId>,
    pub ty: Type,
    /// Types observed at the capture sites, before widening.
    pub type_candidates: Vec<Type>,
    pub default_value: Option<String>,
    pub usage: CaptureUsage,
}

impl Parameter {
    /// Written in the extracted body, so it needs a `var` mirror there.
    pub fn needs_mirror(&self) -> bool {
        self.usage.is_written()
    }
}

/// A write-only outer local that the region assigns before it can flow out,
/// declared as `var name: T` in the extracted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDeclaration {
    pub local: LocalId,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    WriteCandidate {
        local: LocalId,
        declared_in_region: bool,
    },
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnStrategy {
    Unit,
    Value {
        ty: Type,
        source: ValueSource,
    },
    /// The region either falls through or takes one payload-free jump; the
    /// function returns `true` when the jump must be taken.
    ControlFlag {
        exit: ExitTarget,
        jump: StmtId,
    },
    /// Every path of the region leaves through one target.
    AlwaysExits {
        exit: ExitTarget,
        jump: StmtId,
        ty: Option<Type>,
    },
    Carrier(CarrierSpec),
}

impl ReturnStrategy {
    /// Declared return type of the extracted function, `None` for `Unit`.
    pub fn return_type(&self, carrier_type: impl FnOnce(&CarrierSpec) -> Type) -> Option<Type> {
        match self {
            ReturnStrategy::Unit => None,
            ReturnStrategy::Value { ty, .. } => (!ty.is_unit()).then(|| ty.clone()),
            ReturnStrategy::ControlFlag { .. } => Some(Type::boolean()),
            ReturnStrategy::AlwaysExits { ty, .. } => ty.clone().filter(|ty| !ty.is_unit()),
            ReturnStrategy::Carrier(spec) => Some(carrier_type(spec)),
        }
    }

    pub fn value_type(&self) -> Option<&Type> {
        match self {
            ReturnStrategy::Value { ty, .. } => Some(ty),
            _ => None,
        }
    }
}

/// A sealed result class encoding which exit of the region fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierSpec {
    pub class_name: String,
    pub variants: Vec<CarrierVariant>,
    /// Adds a `Normal` variant for falling through the region.
    pub includes_normal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierVariant {
    pub name: String,
    pub target: ExitTarget,
    pub payload: Option<Type>,
    /// The jump statements mapped to this variant, in textual order.
    pub exits: Vec<StmtId>,
}

impl CarrierSpec {
    pub fn variant_for(&self, stmt: StmtId) -> Option<&CarrierVariant> {
        self.variants.iter().find(|variant| variant.exits.contains(&stmt))
    }

    pub const NORMAL: &'static str = "Normal";
}

/// Everything needed to generate an extraction, or the reasons it cannot be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractableCodeDescriptor {
    pub target: ExtractionTarget,
    pub name: String,
    pub suggested_names: Vec<String>,
    /// Extension receiver of a function moved out of its class.
    pub receiver: Option<Type>,
    pub parameters: Vec<Parameter>,
    pub local_declarations: Vec<LocalDeclaration>,
    pub return_strategy: ReturnStrategy,
    pub exits: RegionExits,
    pub captures: CaptureAnalysis,
    pub conflicts: Vec<Conflict>,
}

impl ExtractableCodeDescriptor {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn parameter_for(&self, local: LocalId) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|parameter| parameter.local == Some(local))
    }
}

/// Builds the descriptor for `data` from its capture and exit analyses.
pub fn synthesize<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    captures: CaptureAnalysis,
    exits: RegionExits,
    options: &ExtractionGeneratorOptions,
) -> ExtractableCodeDescriptor
where
    C: ResolutionContext + ?Sized,
{
    let body = data.body;
    let mut conflicts = captures.conflicts.clone();

    if options.target != ExtractionTarget::Function && !data.region.is_expression() {
        conflicts.push(Conflict::ExpressionRequired {
            target: target_label(options.target),
        });
    }

    let mut return_strategy = decide_return(ctx, data, &captures, &exits, options, &mut conflicts);

    let mut parameters = Vec::new();
    let mut local_declarations = Vec::new();
    match options.target {
        ExtractionTarget::Function => {
            let declared_names: Vec<&str> = captures
                .declared
                .iter()
                .map(|local| body.local(*local).name.as_str())
                .collect();
            for capture in &captures.captures {
                let (ty, type_candidates) = capture_type(ctx, body, capture);
                let Some(ty) = ty else {
                    conflicts.push(Conflict::UnknownParameterType {
                        name: capture.name.to_string(),
                    });
                    continue;
                };
                if capture.usage == CaptureUsage::Write
                    && !needs_incoming_value(data, &captures, capture.local)
                {
                    local_declarations.push(LocalDeclaration {
                        local: capture.local,
                        name: capture.name.to_string(),
                        ty,
                    });
                    continue;
                }

                let taken = |name: &str| {
                    parameters.iter().any(|p: &Parameter| p.name == name)
                        || declared_names.contains(&name)
                        || ctx.is_name_taken(lookup_owner(data), name)
                };
                let Some(name) = unique_name(capture.name.as_str(), taken, options.max_name_attempts)
                else {
                    conflicts.push(Conflict::NameExhausted {
                        base: capture.name.to_string(),
                    });
                    continue;
                };
                parameters.push(Parameter {
                    name,
                    original_name: capture.name.clone(),
                    local: Some(capture.local),
                    ty,
                    type_candidates,
                    default_value: None,
                    usage: capture.usage,
                });
            }
        }
        ExtractionTarget::Variable => {}
        ExtractionTarget::Property => {
            let mut names: Vec<String> = captures
                .captures
                .iter()
                .map(|capture| capture.name.to_string())
                .collect();
            names.extend(captures.relocated.iter().map(|r| r.name.to_string()));
            if !names.is_empty() {
                conflicts.push(Conflict::PropertyCapturesLocals { names });
            }
        }
        ExtractionTarget::Parameter => {
            if data.owner.param_list.is_none() {
                conflicts.push(Conflict::MissingParameterList);
            }
            let owner_params: Vec<LocalId> = body.params().collect();
            let mut names: Vec<String> = captures
                .captures
                .iter()
                .filter(|capture| !owner_params.contains(&capture.local))
                .map(|capture| capture.name.to_string())
                .collect();
            names.extend(captures.relocated.iter().map(|r| r.name.to_string()));
            if !names.is_empty() {
                conflicts.push(Conflict::ParameterCapturesLocals { names });
            }
        }
    }

    let receiver = match options.target {
        ExtractionTarget::Function
            if data.options.top_level && data.owner.is_member && captures.uses_receiver() =>
        {
            owner_class_type(ctx, body)
        }
        _ => None,
    };

    let value_type = return_strategy.value_type().cloned();
    let seeds: Vec<&str> = match &return_strategy {
        ReturnStrategy::Value {
            source: ValueSource::WriteCandidate { local, .. },
            ..
        } => vec![body.local(*local).name.as_str()],
        _ => Vec::new(),
    };
    let (kind, placeholder) = match options.target {
        ExtractionTarget::Function => (
            NameKind::Function {
                returns_value: value_type.is_some(),
            },
            options.placeholder_function_name.as_str(),
        ),
        _ => (NameKind::Value, options.placeholder_variable_name.as_str()),
    };
    let suggested_names = suggest_names(
        body,
        data.region.expr(),
        &seeds,
        value_type.as_ref(),
        kind,
        placeholder,
    );

    let requested = match &options.name {
        Some(name) if !is_identifier(name) => {
            conflicts.push(Conflict::InvalidName { name: name.clone() });
            None
        }
        Some(name) => Some(name.clone()),
        None => None,
    };
    let base = requested
        .or_else(|| suggested_names.first().cloned())
        .unwrap_or_else(|| placeholder.to_string());
    let name = match unique_name(
        &base,
        |name| is_declaration_name_taken(ctx, data, options.target, name),
        options.max_name_attempts,
    ) {
        Some(name) => name,
        None => {
            conflicts.push(Conflict::NameExhausted { base: base.clone() });
            base
        }
    };

    if options.target == ExtractionTarget::Parameter {
        if let ExtractionRegion::Expression { span, .. } = &data.region {
            // Typed `Any` until the signature is final.
            parameters.push(Parameter {
                name: name.clone(),
                original_name: Name::new(&name),
                local: None,
                ty: Type::any(),
                type_candidates: value_type.iter().cloned().collect(),
                default_value: span.slice(data.source).map(str::to_string),
                usage: CaptureUsage::Read,
            });
        }
    }

    if let ReturnStrategy::Carrier(spec) = &mut return_strategy {
        let base = format!("{}Result", capitalize(&name));
        spec.class_name = unique_name(
            &base,
            |candidate| ctx.is_name_taken(lookup_owner(data), candidate),
            options.max_name_attempts,
        )
        .unwrap_or(base);
    }

    tracing::debug!(
        target: "kestrel.refactor",
        name = %name,
        parameters = parameters.len(),
        strategy = strategy_label(&return_strategy),
        conflicts = conflicts.len(),
        "synthesized extraction signature"
    );

    ExtractableCodeDescriptor {
        target: options.target,
        name,
        suggested_names,
        receiver,
        parameters,
        local_declarations,
        return_strategy,
        exits,
        captures,
        conflicts,
    }
}

fn decide_return<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    captures: &CaptureAnalysis,
    exits: &RegionExits,
    options: &ExtractionGeneratorOptions,
    conflicts: &mut Vec<Conflict>,
) -> ReturnStrategy
where
    C: ResolutionContext + ?Sized,
{
    let body = data.body;
    if let ExtractionRegion::Expression { expr, .. } = &data.region {
        return match ctx.type_of(body, *expr) {
            Some(ty) if ty.is_unit() && options.target == ExtractionTarget::Function => {
                ReturnStrategy::Unit
            }
            Some(ty) => ReturnStrategy::Value {
                ty,
                source: ValueSource::Expression,
            },
            None => {
                conflicts.push(Conflict::UnknownExpressionType);
                ReturnStrategy::Unit
            }
        };
    }

    let candidates = &captures.write_candidates;
    let forced: Vec<&ExitPath> = exits.forced().collect();
    if candidates.len() > 1 {
        conflicts.push(Conflict::MultipleOutputs {
            names: candidates.iter().map(|c| c.name.to_string()).collect(),
        });
    }
    if let Some(candidate) = candidates.first() {
        if !forced.is_empty() {
            conflicts.push(Conflict::OutputAndJumps {
                name: candidate.name.to_string(),
            });
        }
        if candidates.len() > 1 || !forced.is_empty() {
            return ReturnStrategy::Unit;
        }
        return match ctx.type_of_local(body, candidate.local) {
            Some(ty) => ReturnStrategy::Value {
                ty,
                source: ValueSource::WriteCandidate {
                    local: candidate.local,
                    declared_in_region: candidate.declared_in_region,
                },
            },
            None => {
                conflicts.push(Conflict::UnknownExitType);
                ReturnStrategy::Unit
            }
        };
    }
    if forced.is_empty() {
        return ReturnStrategy::Unit;
    }

    let groups = group_exits(ctx, body, &forced, conflicts);
    if groups.is_empty() {
        return ReturnStrategy::Unit;
    }

    if groups.len() == 1 {
        let group = &groups[0];
        if !exits.falls_through {
            return ReturnStrategy::AlwaysExits {
                exit: group.target.clone(),
                jump: group.exits[0],
                ty: group.payload.clone(),
            };
        }
        if group.payload.is_none() {
            return ReturnStrategy::ControlFlag {
                exit: group.target.clone(),
                jump: group.exits[0],
            };
        }
    }

    let mut variants: Vec<CarrierVariant> = Vec::new();
    for group in groups {
        let base = variant_base_name(&group.target);
        let name = unique_name(
            base,
            |candidate| {
                candidate == CarrierSpec::NORMAL || variants.iter().any(|v| v.name == candidate)
            },
            options.max_name_attempts,
        )
        .unwrap_or_else(|| base.to_string());
        variants.push(CarrierVariant {
            name,
            target: group.target,
            payload: group.payload,
            exits: group.exits,
        });
    }
    ReturnStrategy::Carrier(CarrierSpec {
        class_name: String::new(),
        variants,
        includes_normal: exits.falls_through,
    })
}

struct ExitGroup {
    target: ExitTarget,
    payload: Option<Type>,
    exits: Vec<StmtId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Function,
    Loop(StmtId, JumpKind),
}

/// Groups forced exits by target. Exits to one target share a carrier slot
/// and must carry equal payload types.
fn group_exits<C>(
    ctx: &C,
    body: &Body,
    forced: &[&ExitPath],
    conflicts: &mut Vec<Conflict>,
) -> Vec<ExitGroup>
where
    C: ResolutionContext + ?Sized,
{
    let mut groups: IndexMap<GroupKey, (ExitTarget, Vec<Option<Type>>, Vec<StmtId>)> =
        IndexMap::new();
    for exit in forced {
        let key = match &exit.target {
            ExitTarget::Function { .. } => GroupKey::Function,
            ExitTarget::Loop { stmt, jump, .. } => GroupKey::Loop(*stmt, *jump),
            ExitTarget::Unresolved { label } => {
                conflicts.push(Conflict::UnresolvedJumpTarget {
                    label: label.to_string(),
                });
                continue;
            }
            ExitTarget::RegionEnd => continue,
        };
        let payload = match exit.value {
            Some(value) => match ctx.type_of(body, value) {
                Some(ty) => Some(ty),
                None => {
                    conflicts.push(Conflict::UnknownExitType);
                    continue;
                }
            },
            None => None,
        };
        let entry = groups
            .entry(key)
            .or_insert_with(|| (exit.target.clone(), Vec::new(), Vec::new()));
        entry.1.push(payload);
        if let Some(stmt) = exit.stmt {
            entry.2.push(stmt);
        }
    }

    let mut out = Vec::new();
    for (_, (target, payloads, exits)) in groups {
        let mut distinct: Vec<&Option<Type>> = Vec::new();
        for payload in &payloads {
            if !distinct.contains(&payload) {
                distinct.push(payload);
            }
        }
        if distinct.len() > 1 {
            conflicts.push(Conflict::IncompatibleExitTypes {
                types: distinct
                    .iter()
                    .map(|payload| match payload {
                        Some(ty) => ty.render(),
                        None => "Unit".to_string(),
                    })
                    .collect(),
            });
            continue;
        }
        if exits.is_empty() {
            continue;
        }
        out.push(ExitGroup {
            target,
            payload: payloads.into_iter().next().flatten(),
            exits,
        });
    }
    out
}

fn variant_base_name(target: &ExitTarget) -> &'static str {
    match target {
        ExitTarget::Loop {
            jump: JumpKind::Break,
            ..
        } => "Break",
        ExitTarget::Loop {
            jump: JumpKind::Continue,
            ..
        } => "Continue",
        ExitTarget::Function { .. } | ExitTarget::RegionEnd | ExitTarget::Unresolved { .. } => {
            "Return"
        }
    }
}

/// A write-only local that flows out of the region keeps its old value on
/// paths that skip the write, so it must be passed in.
fn needs_incoming_value(
    data: &ExtractionData<'_>,
    captures: &CaptureAnalysis,
    local: LocalId,
) -> bool {
    captures
        .write_candidates
        .iter()
        .any(|candidate| candidate.local == local)
        && !seq_definitely_assigns(data.body, data.region.stmts(), local)
}

/// The observed types of `capture` and their common supertype.
fn capture_type<C>(ctx: &C, body: &Body, capture: &CapturedSymbol) -> (Option<Type>, Vec<Type>)
where
    C: ResolutionContext + ?Sized,
{
    let mut observed: Vec<Type> = Vec::new();
    let declared = ctx.type_of_local(body, capture.local);
    let at_sites = capture
        .reference_exprs
        .iter()
        .filter_map(|expr| ctx.type_of(body, *expr));
    for ty in at_sites.chain(declared) {
        if !observed.contains(&ty) {
            observed.push(ty);
        }
    }
    let ty = match observed.as_slice() {
        [] => None,
        [single] => Some(single.clone()),
        many => ctx.common_supertype(many),
    };
    (ty, observed)
}

fn owner_class_type<C>(ctx: &C, body: &Body) -> Option<Type>
where
    C: ResolutionContext + ?Sized,
{
    let owner = ctx.declaration(body.owner()?)?;
    let class = ctx.declaration(owner.container?)?;
    Some(
        class
            .ty
            .clone()
            .unwrap_or_else(|| Type::named(class.name.as_str())),
    )
}

/// The declaration next to which new members are looked up.
pub(crate) fn lookup_owner(data: &ExtractionData<'_>) -> Option<kestrel_hir::DeclId> {
    if data.options.top_level {
        None
    } else {
        data.body.owner()
    }
}

fn is_declaration_name_taken<C>(
    ctx: &C,
    data: &ExtractionData<'_>,
    target: ExtractionTarget,
    name: &str,
) -> bool
where
    C: ResolutionContext + ?Sized,
{
    match target {
        ExtractionTarget::Function | ExtractionTarget::Property => {
            ctx.is_name_taken(lookup_owner(data), name)
        }
        ExtractionTarget::Variable | ExtractionTarget::Parameter => data
            .body
            .locals()
            .iter()
            .filter(|local| matches!(local.kind, LocalKind::Param | LocalKind::Local))
            .any(|local| local.name == name),
    }
}

fn target_label(target: ExtractionTarget) -> &'static str {
    match target {
        ExtractionTarget::Function => "function",
        ExtractionTarget::Variable => "variable",
        ExtractionTarget::Property => "property",
        ExtractionTarget::Parameter => "parameter",
    }
}

fn strategy_label(strategy: &ReturnStrategy) -> &'static str {
    match strategy {
        ReturnStrategy::Unit => "unit",
        ReturnStrategy::Value { .. } => "value",
        ReturnStrategy::ControlFlag { .. } => "control-flag",
        ReturnStrategy::AlwaysExits { .. } => "always-exits",
        ReturnStrategy::Carrier(_) => "carrier",
    }
}

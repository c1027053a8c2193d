use std::collections::BTreeMap;

use kestrel_refactor::{
    analyze, analyze_captures, extract, generate_preview, Conflict, ConflictReport,
    ExtractionData, ExtractionGeneratorOptions, ExtractionOptions, ExtractionRegion, FileId,
    GeneratedExtraction, OwnerInfo, ReturnStrategy,
};
use kestrel_core::Diagnostic;
use kestrel_hir::{Body, DeclId, Declaration, ExprId, ExprKind, LocalId, LocalKind, Type};
use kestrel_resolve::ResolutionContext;
use kestrel_test_utils::{extract_range, parse_type, FixtureDb, FunctionFixture};
use pretty_assertions::assert_eq;

fn owner(function: &FunctionFixture) -> OwnerInfo {
    OwnerInfo {
        span: function.span,
        param_list: Some(function.param_list),
        is_member: function.is_member,
    }
}

fn file() -> FileId {
    FileId::new("Main.kt")
}

/// Extracts the marked selection of `function` as a function with default
/// options and returns the rewritten text.
fn extract_function(fixture: &str, function: &str) -> (GeneratedExtraction, String) {
    let (code, selection) = extract_range(fixture);
    let db = FixtureDb::parse(&code);
    let function = db.function(function);
    let data = ExtractionData::from_selection(
        file(),
        db.source(),
        &function.body,
        owner(function),
        selection,
    )
    .expect("valid selection");
    let generated = extract(&db, &data, &ExtractionGeneratorOptions::default())
        .unwrap_or_else(|report| panic!("unexpected conflicts:\n{report}"));
    let updated = generated.edit.apply_to(&file(), &code).unwrap();
    (generated, updated)
}

fn extract_conflicts(fixture: &str, function: &str) -> ConflictReport {
    let (code, selection) = extract_range(fixture);
    let db = FixtureDb::parse(&code);
    let function = db.function(function);
    let data = ExtractionData::from_selection(
        file(),
        db.source(),
        &function.body,
        owner(function),
        selection,
    )
    .expect("valid selection");
    match extract(&db, &data, &ExtractionGeneratorOptions::default()) {
        Ok(generated) => panic!("expected conflicts, got:\n{}", generated.declaration),
        Err(report) => report,
    }
}

#[test]
fn written_outer_local_is_returned_and_reassigned() {
    let (generated, updated) = extract_function(
        r#"
fun compute(a: Int): Int {
    var total = 0
    /*start*/total += a
    total *= 2/*end*/
    return total
}
"#,
        "compute",
    );

    assert_eq!(generated.name, "getTotal");
    assert_eq!(generated.call_site, "total = getTotal(total, a)");
    assert_eq!(
        updated,
        r#"
fun compute(a: Int): Int {
    var total = 0
    total = getTotal(total, a)
    return total
}

private fun getTotal(total: Int, a: Int): Int {
    var total = total
    total += a
    total *= 2
    return total
}
"#
    );
}

#[test]
fn output_value_combined_with_forced_exit_is_a_conflict() {
    let report = extract_conflicts(
        r#"
fun f(): Int {
    var x = 0
    var y = 0
    /*start*/x = compute()
    if (x > 0) return x
    y = x * 2/*end*/
    return y
}

fun compute(): Int = 1
"#,
        "f",
    );

    assert!(
        report.conflicts.contains(&Conflict::OutputAndJumps {
            name: "y".to_string()
        }),
        "{report}"
    );
}

#[test]
fn several_outputs_are_a_conflict() {
    let report = extract_conflicts(
        r#"
fun f(seed: Int): Int {
    var x = 0
    var y = 0
    /*start*/x = seed + 1
    y = seed + 2/*end*/
    return x + y
}
"#,
        "f",
    );

    assert_eq!(
        report.conflicts,
        vec![Conflict::MultipleOutputs {
            names: vec!["x".to_string(), "y".to_string()]
        }]
    );
}

#[test]
fn returns_with_different_payload_types_are_a_conflict() {
    let report = extract_conflicts(
        r#"
fun g(flag: Boolean, n: Int): Any {
    /*start*/if (flag) return n
    if (n > 1) return "big"/*end*/
    return 0
}
"#,
        "g",
    );

    assert_eq!(
        report.conflicts,
        vec![Conflict::IncompatibleExitTypes {
            types: vec!["Int".to_string(), "String".to_string()]
        }]
    );
}

#[test]
fn single_payload_free_jump_becomes_a_control_flag() {
    let (generated, updated) = extract_function(
        r#"
fun scan(items: List<Int>) {
    for (item in items) {
        /*start*/if (item < 0) break
        println(item)/*end*/
    }
}
"#,
        "scan",
    );

    assert_eq!(generated.call_site, "if (extracted(item)) break");
    assert_eq!(
        updated,
        r#"
fun scan(items: List<Int>) {
    for (item in items) {
        if (extracted(item)) break
    }
}

private fun extracted(item: Int): Boolean {
    if (item < 0) return true
    println(item)
    return false
}
"#
    );
}

#[test]
fn exits_to_different_targets_use_a_result_carrier() {
    let (generated, _) = extract_function(
        r#"
fun find(items: List<Int>, limit: Int): Int {
    for (item in items) {
        /*start*/if (item > limit) return item
        if (item == 0) continue/*end*/
    }
    return -1
}
"#,
        "find",
    );

    assert_eq!(
        generated.declaration,
        r#"private fun extracted(item: Int, limit: Int): ExtractedResult {
    if (item > limit) return ExtractedResult.Return(item)
    if (item == 0) return ExtractedResult.Continue
    return ExtractedResult.Normal
}

private sealed class ExtractedResult {
    object Normal : ExtractedResult()
    class Return(val value: Int) : ExtractedResult()
    object Continue : ExtractedResult()
}"#
    );
    assert_eq!(
        generated.call_site,
        r#"when (val result = extracted(item, limit)) {
            is ExtractedResult.Return -> return result.value
            ExtractedResult.Continue -> continue
            ExtractedResult.Normal -> {}
        }"#
    );
}

#[test]
fn parameter_clashing_with_a_top_level_name_is_renamed() {
    let (generated, updated) = extract_function(
        r#"
fun helper(): Int = 1

fun run(helper: Int): Int {
    /*start*/val doubled = helper * 2
    println(doubled)/*end*/
    return 0
}
"#,
        "run",
    );

    assert_eq!(generated.call_site, "extracted(helper)");
    assert!(
        updated.contains(
            "private fun extracted(helper1: Int) {\n    val doubled = helper1 * 2\n    println(doubled)\n}"
        ),
        "{updated}"
    );
}

#[test]
fn extracted_function_captures_only_its_own_parameters() {
    let (_, updated) = extract_function(
        r#"
fun scan(items: List<Int>) {
    for (item in items) {
        /*start*/if (item < 0) break
        println(item)/*end*/
    }
}
"#,
        "scan",
    );

    let db = FixtureDb::parse(&updated);
    let extracted = db.function("extracted");
    let region = ExtractionRegion::whole_body(&extracted.body).unwrap();
    let analysis = analyze_captures(&db, &extracted.body, &region);

    assert!(analysis.conflicts.is_empty());
    let captured: Vec<_> = analysis
        .captures
        .iter()
        .map(|capture| {
            let local = extracted.body.local(capture.local);
            (local.name.to_string(), local.kind)
        })
        .collect();
    assert_eq!(captured, vec![("item".to_string(), LocalKind::Param)]);
}

#[test]
fn top_level_extraction_of_member_code_adds_a_receiver() {
    let (code, selection) = extract_range(
        r#"
class Counter {
    var count: Int = 0

    fun bump(step: Int) {
        /*start*/count += step/*end*/
    }
}
"#,
    );
    let db = FixtureDb::parse(&code);
    let function = db.function("bump");
    let data = ExtractionData::from_selection(
        file(),
        db.source(),
        &function.body,
        owner(function),
        selection,
    )
    .unwrap()
    .with_options(ExtractionOptions { top_level: true });

    let descriptor = analyze(&db, &data, &ExtractionGeneratorOptions::default());
    assert!(!descriptor.has_conflicts(), "{:?}", descriptor.conflicts);
    assert_eq!(descriptor.return_strategy, ReturnStrategy::Unit);
    assert_eq!(
        descriptor.receiver.as_ref().map(|ty| ty.render()),
        Some("Counter".to_string())
    );

    let generated = extract(&db, &data, &ExtractionGeneratorOptions::default()).unwrap();
    let updated = generated.edit.apply_to(&file(), &code).unwrap();
    assert!(
        updated.ends_with("}\n\nprivate fun Counter.extracted(step: Int) {\n    count += step\n}\n"),
        "{updated}"
    );
}

#[test]
fn selection_splitting_a_statement_is_rejected() {
    let (code, selection) = extract_range(
        r#"
fun f(a: Int) {
    val b = a /*start*/+ 1
    println(b)/*end*/
}
"#,
    );
    let db = FixtureDb::parse(&code);
    let function = db.function("f");
    let err = ExtractionData::from_selection(
        file(),
        db.source(),
        &function.body,
        owner(function),
        selection,
    )
    .unwrap_err();
    assert_eq!(err.conflicts, vec![Conflict::InvalidSelection]);
}

#[test]
fn preview_shows_the_extracted_function() {
    let fixture = r#"
fun compute(a: Int): Int {
    var total = 0
    /*start*/total += a
    total *= 2/*end*/
    return total
}
"#;
    let (generated, _) = extract_function(fixture, "compute");
    let (code, _) = extract_range(fixture);

    let mut sources = BTreeMap::new();
    sources.insert(file(), code);
    let preview = generate_preview(&sources, &generated.edit).unwrap();

    assert_eq!(preview.total_files, 1);
    let diff = &preview.files[0].unified_diff;
    assert!(diff.contains("-    total += a"), "{diff}");
    assert!(diff.contains("+    total = getTotal(total, a)"), "{diff}");
    assert!(diff.contains("+private fun getTotal(total: Int, a: Int): Int {"), "{diff}");
}

#[test]
fn conditionally_written_output_is_passed_in() {
    let (generated, updated) = extract_function(
        r#"
fun pick(flag: Boolean): Int {
    var b = 0
    /*start*/if (flag) b = 1/*end*/
    return b
}
"#,
        "pick",
    );

    assert!(!generated.declaration.contains("var b: Int\n"), "{}", generated.declaration);
    assert_eq!(
        updated,
        r#"
fun pick(flag: Boolean): Int {
    var b = 0
    b = getB(flag, b)
    return b
}

private fun getB(flag: Boolean, b: Int): Int {
    var b = b
    if (flag) b = 1
    return b
}
"#
    );
}

#[test]
fn definitely_written_output_is_declared_locally() {
    let (_, updated) = extract_function(
        r#"
fun pick(flag: Boolean): Int {
    var b = 0
    /*start*/if (flag) b = 1 else b = 2/*end*/
    return b
}
"#,
        "pick",
    );

    assert_eq!(
        updated,
        r#"
fun pick(flag: Boolean): Int {
    var b = 0
    b = getB(flag)
    return b
}

private fun getB(flag: Boolean): Int {
    var b: Int
    if (flag) b = 1 else b = 2
    return b
}
"#
    );
}

#[test]
fn local_function_moves_with_its_captures() {
    let (generated, updated) = extract_function(
        r#"
fun report(scale: Int, values: List<Int>) {
    fun scaled(v: Int): Int {
        return v * scale
    }
    /*start*/for (value in values) {
        println(scaled(value))
    }/*end*/
}
"#,
        "report",
    );

    assert_eq!(generated.call_site, "extracted(scale, values)");
    assert_eq!(
        generated.declaration,
        r#"private fun extracted(scale: Int, values: List<Int>) {
    fun scaled(v: Int): Int {
        return v * scale
    }
    for (value in values) {
        println(scaled(value))
    }
}"#
    );
    let caller_end = updated.find("private fun extracted").unwrap();
    assert!(!updated[..caller_end].contains("fun scaled"), "{updated}");
}

#[test]
fn local_function_used_outside_the_selection_is_a_conflict() {
    let report = extract_conflicts(
        r#"
fun f(n: Int) {
    fun twice(v: Int): Int {
        return v * 2
    }
    /*start*/val doubled = twice(n)
    println(doubled)/*end*/
    println(twice(1))
}
"#,
        "f",
    );

    assert_eq!(
        report.conflicts,
        vec![Conflict::LocalDeclarationUsedOutside {
            name: "twice".to_string()
        }]
    );
}

#[test]
fn local_function_declared_in_the_selection_and_used_after_is_a_conflict() {
    let report = extract_conflicts(
        r#"
fun f(n: Int) {
    /*start*/fun twice(v: Int): Int {
        return v * 2
    }
    println(twice(n))/*end*/
    println(twice(1))
}
"#,
        "f",
    );

    assert_eq!(
        report.conflicts,
        vec![Conflict::DeclarationUsedAfter {
            name: "twice".to_string()
        }]
    );
}

#[test]
fn selection_that_always_returns_is_returned_from_the_call_site() {
    let (generated, updated) = extract_function(
        r#"
fun classify(n: Int): String {
    println(n)
    /*start*/if (n < 0) return "negative"
    return "positive"/*end*/
}
"#,
        "classify",
    );

    assert_eq!(generated.call_site, "return extracted(n)");
    assert_eq!(
        updated,
        r#"
fun classify(n: Int): String {
    println(n)
    return extracted(n)
}

private fun extracted(n: Int): String {
    if (n < 0) return "negative"
    return "positive"
}
"#
    );
}

#[test]
fn selection_that_always_breaks_keeps_the_break_at_the_call_site() {
    let (generated, updated) = extract_function(
        r#"
fun drain(items: List<Int>) {
    for (item in items) {
        /*start*/println(item)
        break/*end*/
    }
}
"#,
        "drain",
    );

    assert_eq!(generated.call_site, "extracted(item)\n        break");
    assert_eq!(
        updated,
        r#"
fun drain(items: List<Int>) {
    for (item in items) {
        extracted(item)
        break
    }
}

private fun extracted(item: Int) {
    println(item)
    return
}
"#
    );
}

#[test]
fn assignment_to_an_unknown_name_is_a_conflict() {
    let report = extract_conflicts(
        r#"
fun f(a: Int) {
    /*start*/missing = a
    println(a)/*end*/
}
"#,
        "f",
    );

    assert_eq!(
        report.conflicts,
        vec![Conflict::UnresolvedWrite {
            name: "missing".to_string()
        }]
    );
}

/// Reports narrowed types for chosen local reads, the way smart casts do.
struct Narrowed<'a> {
    db: &'a FixtureDb,
    sites: Vec<(ExprId, Type)>,
}

impl ResolutionContext for Narrowed<'_> {
    fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.db.declaration(id)
    }

    fn resolve_reference(&self, body: &Body, expr: ExprId) -> Option<DeclId> {
        self.db.resolve_reference(body, expr)
    }

    fn type_of(&self, body: &Body, expr: ExprId) -> Option<Type> {
        match self.sites.iter().find(|(site, _)| *site == expr) {
            Some((_, ty)) => Some(ty.clone()),
            None => self.db.type_of(body, expr),
        }
    }

    fn type_of_local(&self, body: &Body, local: LocalId) -> Option<Type> {
        self.db.type_of_local(body, local)
    }

    fn common_supertype(&self, types: &[Type]) -> Option<Type> {
        self.db.common_supertype(types)
    }

    fn is_name_taken(&self, owner: Option<DeclId>, name: &str) -> bool {
        self.db.is_name_taken(owner, name)
    }

    fn diagnostics(&self) -> &[Diagnostic] {
        self.db.diagnostics()
    }
}

#[test]
fn parameter_type_widens_to_the_common_supertype_of_its_uses() {
    let (code, selection) = extract_range(
        r#"
open class Animal
class Dog : Animal()
class Cat : Animal()

fun pet(animal: Animal) {
    /*start*/feed(animal)
    groom(animal)/*end*/
}
"#,
    );
    let db = FixtureDb::parse(&code);
    let function = db.function("pet");
    let body = &function.body;
    let mut reads: Vec<ExprId> = body
        .expr_ids()
        .filter(|expr| matches!(body.expr(*expr).kind, ExprKind::Local(_)))
        .collect();
    reads.sort_by_key(|expr| body.expr(*expr).span.start);
    let ctx = Narrowed {
        db: &db,
        sites: reads
            .into_iter()
            .zip([parse_type("Dog"), parse_type("Cat")])
            .collect(),
    };

    let data = ExtractionData::from_selection(file(), db.source(), body, owner(function), selection)
        .unwrap();
    let descriptor = analyze(&ctx, &data, &ExtractionGeneratorOptions::default());
    assert!(!descriptor.has_conflicts(), "{:?}", descriptor.conflicts);

    let parameter = &descriptor.parameters[0];
    let candidates: Vec<String> = parameter.type_candidates.iter().map(Type::render).collect();
    assert_eq!(candidates, vec!["Dog", "Cat", "Animal"]);
    assert_eq!(parameter.ty.render(), "Animal");

    let generated = extract(&ctx, &data, &ExtractionGeneratorOptions::default()).unwrap();
    assert!(
        generated
            .declaration
            .starts_with("private fun extracted(animal: Animal) {"),
        "{}",
        generated.declaration
    );
}

use std::collections::HashSet;

use kestrel_core::Span;
use kestrel_flow::{
    build_region_cfg, classify_region, live_locals_after, seq_definitely_assigns, ExitKind,
    ExitTarget, JumpKind, RegionExits,
};
use kestrel_hir::{Body, StmtId, StmtKind};
use kestrel_test_utils::{extract_range, FixtureDb};
use pretty_assertions::assert_eq;

/// Statements covered by `selection` whose parent is outside it.
fn region_stmts(body: &Body, selection: Span) -> Vec<StmtId> {
    let mut stmts: Vec<StmtId> = body
        .stmt_ids()
        .filter(|stmt| selection.contains_span(body.stmt(*stmt).span))
        .filter(|stmt| {
            body.parent(*stmt)
                .is_some_and(|parent| !selection.contains_span(body.stmt(parent).span))
        })
        .collect();
    stmts.sort_by_key(|stmt| body.stmt(*stmt).span.start);
    stmts
}

fn classify(fixture: &str, function: &str) -> (FixtureDb, RegionExits) {
    let (code, selection) = extract_range(fixture);
    let db = FixtureDb::parse(&code);
    let body = &db.function(function).body;
    let exits = classify_region(body, &region_stmts(body, selection), selection);
    (db, exits)
}

fn live_names(fixture: &str, function: &str) -> Vec<String> {
    let (code, selection) = extract_range(fixture);
    let db = FixtureDb::parse(&code);
    let body = &db.function(function).body;
    let (cfg, blocks) = build_region_cfg(body, &region_stmts(body, selection));
    let live: HashSet<_> = live_locals_after(body, &cfg, blocks);
    let mut names: Vec<String> = live
        .into_iter()
        .map(|local| body.local(local).name.to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn jumps_to_enclosing_loops_are_forced_exits() {
    let (db, exits) = classify(
        r#"
fun f(rows: List<List<Int>>) {
    outer@ for (row in rows) {
        for (cell in row) {
            /*start*/if (cell < 0) break@outer
            if (cell == 0) continue/*end*/
        }
    }
}
"#,
        "f",
    );
    let body = &db.function("f").body;

    assert!(exits.falls_through);
    let targets: Vec<(Option<String>, JumpKind)> = exits
        .forced()
        .map(|exit| match &exit.target {
            ExitTarget::Loop { stmt, label, jump } => {
                assert!(matches!(body.stmt(*stmt).kind, StmtKind::For { .. }));
                (label.as_ref().map(ToString::to_string), *jump)
            }
            other => panic!("unexpected target {other:?}"),
        })
        .collect();
    assert_eq!(
        targets,
        vec![
            (Some("outer".to_string()), JumpKind::Break),
            (None, JumpKind::Continue),
        ]
    );
}

#[test]
fn local_function_returns_and_throws_are_not_exits() {
    let (_, exits) = classify(
        r#"
fun g(x: Int): Int {
    /*start*/fun helper(): Int { return x }
    if (x < 0) throw IllegalStateException()
    println(helper())/*end*/
    return 0
}
"#,
        "g",
    );

    assert!(exits.falls_through);
    assert!(!exits.has_forced_exits());
    assert_eq!(exits.exits.len(), 1);
    assert_eq!(exits.exits[0].kind, ExitKind::FallThrough);
}

#[test]
fn unknown_label_is_unresolved() {
    let (_, exits) = classify(
        r#"
fun h(items: List<Int>) {
    for (item in items) {
        /*start*/if (item < 0) break@missing/*end*/
    }
}
"#,
        "h",
    );

    let forced: Vec<_> = exits.forced().map(|exit| exit.target.clone()).collect();
    assert_eq!(forced.len(), 1);
    assert!(matches!(&forced[0], ExitTarget::Unresolved { label } if label == "missing"));
}

#[test]
fn both_branches_returning_never_fall_through() {
    let (_, exits) = classify(
        r#"
fun sign(a: Boolean): Int {
    /*start*/if (a) return 1 else return 2/*end*/
}
"#,
        "sign",
    );

    assert!(!exits.falls_through);
    let kinds: Vec<_> = exits.exits.iter().map(|exit| exit.kind).collect();
    assert_eq!(kinds, vec![ExitKind::ValueExit, ExitKind::ValueExit]);
    assert!(exits
        .forced()
        .all(|exit| exit.target == ExitTarget::Function { label: None }));
}

#[test]
fn only_locals_read_after_the_region_are_live() {
    let live = live_names(
        r#"
fun h(a: Int): Int {
    var x = a
    var y = 0
    /*start*/x = x + 1
    y = x/*end*/
    return x
}
"#,
        "h",
    );

    assert_eq!(live, vec!["x".to_string()]);
}

#[test]
fn loop_back_edge_keeps_locals_live() {
    let live = live_names(
        r#"
fun k(n: Int) {
    var i = 0
    while (i < n) {
        /*start*/i = i + 1/*end*/
    }
}
"#,
        "k",
    );

    assert_eq!(live, vec!["i".to_string(), "n".to_string()]);
}

fn assigns_b(fixture: &str) -> bool {
    let (code, selection) = extract_range(fixture);
    let db = FixtureDb::parse(&code);
    let body = &db.function("f").body;
    let b = body
        .local_ids()
        .find(|local| body.local(*local).name == "b")
        .unwrap();
    seq_definitely_assigns(body, &region_stmts(body, selection), b)
}

#[test]
fn assignment_on_every_completing_path_is_definite() {
    assert!(assigns_b(
        r#"
fun f(flag: Boolean) {
    var b = 0
    /*start*/if (flag) b = 1 else return/*end*/
    println(b)
}
"#
    ));
    assert!(assigns_b(
        r#"
fun f(flag: Boolean) {
    var b = 0
    /*start*/do {
        b = 1
    } while (flag)/*end*/
    println(b)
}
"#
    ));
}

#[test]
fn branches_and_loops_that_may_skip_the_write_are_not_definite() {
    assert!(!assigns_b(
        r#"
fun f(flag: Boolean) {
    var b = 0
    /*start*/if (flag) b = 1/*end*/
    println(b)
}
"#
    ));
    assert!(!assigns_b(
        r#"
fun f(items: List<Int>) {
    var b = 0
    /*start*/for (item in items) b = item/*end*/
    println(b)
}
"#
    ));
    assert!(!assigns_b(
        r#"
fun f(flag: Boolean) {
    var b = 0
    /*start*/do {
        if (flag) break
        b = 1
    } while (flag)/*end*/
    println(b)
}
"#
    ));
}

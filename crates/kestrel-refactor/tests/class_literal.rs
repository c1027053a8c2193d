use kestrel_core::Span;
use kestrel_refactor::{collect_file_tasks, create_replacement_tasks, process_tasks, FileId};
use kestrel_test_utils::FixtureDb;
use pretty_assertions::assert_eq;

const SOURCE: &str = r#"
annotation class Ann(val arg: Class<*>)
annotation class Typed(val arg: Class<foo.Widget>)

@Ann(javaClass<String>())
@Typed(javaClass())
fun target() {}

@Deprecated("gone")
fun old() {}
"#;

#[test]
fn explicit_and_inferred_class_arguments_become_literals() {
    let db = FixtureDb::parse(SOURCE);
    let tasks = collect_file_tasks(&db, db.annotations());

    let names: Vec<_> = tasks
        .iter()
        .map(|task| (task.class_name.as_str(), task.needs_shortening))
        .collect();
    assert_eq!(names, vec![("String", false), ("foo.Widget", true)]);

    let file = FileId::new("Target.kt");
    let rewrite = process_tasks(&file, &tasks);
    let updated = rewrite.edit.apply_to(&file, SOURCE).unwrap();
    assert!(
        updated.contains("@Ann(String::class)\n@Typed(foo.Widget::class)\nfun target() {}"),
        "{updated}"
    );

    let start = updated.find("foo.Widget::class").unwrap();
    assert_eq!(rewrite.shorten, vec![Span::new(start, start + "foo.Widget".len())]);
}

#[test]
fn entries_without_class_diagnostics_are_left_alone() {
    let db = FixtureDb::parse(SOURCE);
    let deprecated = db
        .annotations()
        .iter()
        .find(|entry| entry.name == "Deprecated")
        .unwrap();

    assert!(create_replacement_tasks(&db, deprecated).is_empty());
}

use kestrel_refactor::{
    extract, Conflict, ConflictReport, ExtractionData, ExtractionGeneratorOptions,
    ExtractionTarget, FileId, GeneratedExtraction, OccurrencesToReplace, OwnerInfo,
};
use kestrel_test_utils::{extract_range, FixtureDb};
use pretty_assertions::assert_eq;

fn file() -> FileId {
    FileId::new("Main.kt")
}

fn run(
    fixture: &str,
    function: &str,
    options: ExtractionGeneratorOptions,
) -> (String, Result<GeneratedExtraction, ConflictReport>) {
    let (code, selection) = extract_range(fixture);
    let db = FixtureDb::parse(&code);
    let function = db.function(function);
    let owner = OwnerInfo {
        span: function.span,
        param_list: Some(function.param_list),
        is_member: function.is_member,
    };
    let data = ExtractionData::from_selection(file(), db.source(), &function.body, owner, selection)
        .expect("valid selection");
    let result = extract(&db, &data, &options);
    (code, result)
}

fn apply(code: &str, generated: &GeneratedExtraction) -> String {
    generated.edit.apply_to(&file(), code).unwrap()
}

#[test]
fn variable_replaces_every_occurrence_after_the_anchor() {
    let options = ExtractionGeneratorOptions::default()
        .with_target(ExtractionTarget::Variable)
        .with_name("product");
    let (code, result) = run(
        r#"
fun area(w: Int, h: Int): Int {
    val base = /*start*/w * h/*end*/ + 1
    return base + w * h
}
"#,
        "area",
        options,
    );
    let generated = result.unwrap();

    assert_eq!(generated.declaration, "val product: Int = w * h");
    assert_eq!(generated.replaced.len(), 2);
    assert_eq!(
        apply(&code, &generated),
        r#"
fun area(w: Int, h: Int): Int {
    val product: Int = w * h
    val base = product + 1
    return base + product
}
"#
    );
}

#[test]
fn variable_can_replace_only_the_selection() {
    let options = ExtractionGeneratorOptions::default()
        .with_target(ExtractionTarget::Variable)
        .with_name("product")
        .with_occurrences(OccurrencesToReplace::Original);
    let (code, result) = run(
        r#"
fun area(w: Int, h: Int): Int {
    val base = /*start*/w * h/*end*/ + 1
    return base + w * h
}
"#,
        "area",
        options,
    );

    assert_eq!(
        apply(&code, &result.unwrap()),
        r#"
fun area(w: Int, h: Int): Int {
    val product: Int = w * h
    val base = product + 1
    return base + w * h
}
"#
    );
}

#[test]
fn variable_requires_an_expression() {
    let options = ExtractionGeneratorOptions::default().with_target(ExtractionTarget::Variable);
    let (_, result) = run(
        r#"
fun log(a: Int) {
    /*start*/println(a)
    println(a)/*end*/
}
"#,
        "log",
        options,
    );

    assert_eq!(
        result.unwrap_err().conflicts,
        vec![Conflict::ExpressionRequired {
            target: "variable"
        }]
    );
}

#[test]
fn property_is_inserted_before_the_owner() {
    let options = ExtractionGeneratorOptions::default()
        .with_target(ExtractionTarget::Property)
        .with_name("shipping");
    let (code, result) = run(
        r#"
class Shop {
    fun total(price: Int): Int {
        return price + /*start*/100 * 3/*end*/
    }
}
"#,
        "total",
        options,
    );

    assert_eq!(
        apply(&code, &result.unwrap()),
        r#"
class Shop {
    private val shipping: Int = 100 * 3

    fun total(price: Int): Int {
        return price + shipping
    }
}
"#
    );
}

#[test]
fn property_cannot_capture_locals() {
    let options = ExtractionGeneratorOptions::default().with_target(ExtractionTarget::Property);
    let (_, result) = run(
        r#"
class Shop {
    fun total(price: Int): Int {
        return /*start*/price * 3/*end*/
    }
}
"#,
        "total",
        options,
    );

    assert_eq!(
        result.unwrap_err().conflicts,
        vec![Conflict::PropertyCapturesLocals {
            names: vec!["price".to_string()]
        }]
    );
}

#[test]
fn parameter_is_appended_with_a_default_value() {
    let options = ExtractionGeneratorOptions::default()
        .with_target(ExtractionTarget::Parameter)
        .with_name("greeting");
    let (code, result) = run(
        r#"
fun greet(name: String): String {
    return /*start*/"Hello"/*end*/ + name
}
"#,
        "greet",
        options,
    );
    let generated = result.unwrap();

    assert_eq!(generated.declaration, r#"greeting: String = "Hello""#);
    assert_eq!(generated.default_value_for_call.as_deref(), Some(r#""Hello""#));
    assert_eq!(
        apply(&code, &generated),
        r#"
fun greet(name: String, greeting: String = "Hello"): String {
    return greeting + name
}
"#
    );
}

#[test]
fn parameter_may_only_use_the_owner_parameters() {
    let options = ExtractionGeneratorOptions::default().with_target(ExtractionTarget::Parameter);
    let (_, result) = run(
        r#"
fun scale(factor: Int): Int {
    val base = 10
    return /*start*/base * factor/*end*/
}
"#,
        "scale",
        options,
    );

    assert_eq!(
        result.unwrap_err().conflicts,
        vec![Conflict::ParameterCapturesLocals {
            names: vec!["base".to_string()]
        }]
    );
}

#[test]
fn requested_name_must_be_an_identifier() {
    let options = ExtractionGeneratorOptions::default()
        .with_target(ExtractionTarget::Variable)
        .with_name("when");
    let (_, result) = run(
        r#"
fun f(a: Int): Int {
    return /*start*/a + 1/*end*/
}
"#,
        "f",
        options,
    );

    assert_eq!(
        result.unwrap_err().conflicts,
        vec![Conflict::InvalidName {
            name: "when".to_string()
        }]
    );
}

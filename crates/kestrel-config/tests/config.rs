use std::io::Write;

use kestrel_config::{
    ConfigError, ConfigValidationError, ConfigWarning, ExtractionTarget, KestrelConfig, Visibility,
};
use pretty_assertions::assert_eq;

#[test]
fn empty_config_uses_defaults() {
    let config = KestrelConfig::load_from_str("").unwrap();
    assert_eq!(config, KestrelConfig::default());
    assert_eq!(config.extraction.target, ExtractionTarget::Function);
    assert_eq!(config.extraction.visibility, Visibility::Private);
    assert!(config.extraction.with_default_value);
    assert_eq!(config.extraction.placeholder_function_name, "extracted");
    assert_eq!(config.extraction.max_name_attempts, 100);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "debug"
json = true

[extraction]
target = "variable"
specify_type = false
replace_all_occurrences = false
"#
    )
    .unwrap();

    let config = KestrelConfig::load_from_path(file.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(config.extraction.target, ExtractionTarget::Variable);
    assert!(!config.extraction.specify_type);
    assert!(!config.extraction.replace_all_occurrences);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = KestrelConfig::load_from_path(dir.path().join("kestrel.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn invalid_toml_is_reported_without_snippet() {
    let err = KestrelConfig::load_from_str("[extraction]\ntarget = 3\n").unwrap_err();
    let ConfigError::Toml(message) = err else {
        panic!("expected a toml error, got {err:?}");
    };
    assert!(!message.contains("target = 3"));
}

#[test]
fn diagnostics_collect_unknown_keys_and_invalid_values() {
    let text = r#"
[logging]
level = "kestrel=verbose"

[extraction]
targte = "function"
max_name_attempts = 0
placeholder_variable_name = "not an ident"
"#;
    let (config, diagnostics) = KestrelConfig::load_from_str_with_diagnostics(text).unwrap();
    assert_eq!(config.extraction.target, ExtractionTarget::Function);
    assert_eq!(diagnostics.unknown_keys, vec!["extraction.targte".to_string()]);
    assert_eq!(
        diagnostics.warnings,
        vec![ConfigWarning::LoggingLevelInvalid {
            value: "kestrel=verbose".to_string()
        }]
    );
    assert_eq!(diagnostics.errors.len(), 2);
    assert!(matches!(
        &diagnostics.errors[0],
        ConfigValidationError::InvalidValue { toml_path, .. }
            if toml_path == "extraction.max_name_attempts"
    ));
    assert!(!diagnostics.is_ok());
}

#[test]
fn keyword_placeholder_is_rejected() {
    let config = KestrelConfig::load_from_str(
        r#"
[extraction]
placeholder_function_name = "fun"
placeholder_variable_name = "größe"
"#,
    )
    .unwrap();
    let diagnostics = config.validate();

    assert_eq!(
        diagnostics.errors,
        vec![ConfigValidationError::InvalidValue {
            toml_path: "extraction.placeholder_function_name".to_string(),
            message: "`fun` is not an identifier".to_string(),
        }]
    );
}

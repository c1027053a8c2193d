//! Configuration for Kestrel hosts: logging and extraction defaults.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [extraction]
//! target = "variable"
//! specify_type = false
//! ```

mod diagnostics;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use kestrel_core::is_identifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};

pub use diagnostics::{ConfigDiagnostics, ConfigValidationError, ConfigWarning};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KestrelConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Defaults for extraction refactorings; individual requests may override them.
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level (`info`, `warning`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. An unopenable file disables file
    /// logging only.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level merged with `RUST_LOG`.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }

    fn level_is_valid(&self) -> bool {
        tracing_subscriber::EnvFilter::try_new(Self::normalize_level_directives(&self.level))
            .is_ok()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

/// Shape of the declaration an extraction produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionTarget {
    #[default]
    Function,
    Variable,
    Property,
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

impl Visibility {
    /// Modifier keyword to emit, `None` for the implicit default.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Visibility::Private => Some("private"),
            Visibility::Internal => Some("internal"),
            Visibility::Public => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub target: ExtractionTarget,

    /// Visibility of extracted functions and properties.
    #[serde(default)]
    pub visibility: Visibility,

    /// Give introduced parameters a default value at the declaration site.
    #[serde(default = "default_true")]
    pub with_default_value: bool,

    /// Replace every matching occurrence of an extracted expression, not just
    /// the selected one.
    #[serde(default = "default_true")]
    pub replace_all_occurrences: bool,

    /// Write explicit types on extracted variables and properties.
    #[serde(default = "default_true")]
    pub specify_type: bool,

    #[serde(default = "ExtractionConfig::default_function_name")]
    pub placeholder_function_name: String,

    #[serde(default = "ExtractionConfig::default_variable_name")]
    pub placeholder_variable_name: String,

    /// Upper bound on numeric suffixes tried while disambiguating a name.
    #[serde(default = "ExtractionConfig::default_max_name_attempts")]
    pub max_name_attempts: usize,
}

fn default_true() -> bool {
    true
}

impl ExtractionConfig {
    fn default_function_name() -> String {
        "extracted".to_owned()
    }

    fn default_variable_name() -> String {
        "value".to_owned()
    }

    fn default_max_name_attempts() -> usize {
        100
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            target: ExtractionTarget::default(),
            visibility: Visibility::default(),
            with_default_value: true,
            replace_all_occurrences: true,
            specify_type: true,
            placeholder_function_name: Self::default_function_name(),
            placeholder_variable_name: Self::default_variable_name(),
            max_name_attempts: Self::default_max_name_attempts(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl KestrelConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str(&text)
    }

    /// Load a config and report unknown keys and invalid values.
    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<KestrelConfig>(text)?;
        for key in &unknown_keys {
            tracing::warn!(target: "kestrel.config", key = %key, "unknown config key");
        }

        let mut diagnostics = config.validate();
        diagnostics.unknown_keys = unknown_keys;
        Ok((config, diagnostics))
    }

    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn validate(&self) -> ConfigDiagnostics {
        let mut diagnostics = ConfigDiagnostics::default();

        if !self.logging.level_is_valid() {
            diagnostics.warnings.push(ConfigWarning::LoggingLevelInvalid {
                value: self.logging.level.clone(),
            });
        }

        let extraction = &self.extraction;
        if extraction.max_name_attempts == 0 {
            diagnostics.errors.push(ConfigValidationError::InvalidValue {
                toml_path: "extraction.max_name_attempts".to_owned(),
                message: "must be >= 1".to_owned(),
            });
        }
        for (toml_path, value) in [
            (
                "extraction.placeholder_function_name",
                &extraction.placeholder_function_name,
            ),
            (
                "extraction.placeholder_variable_name",
                &extraction.placeholder_variable_name,
            ),
        ] {
            if !is_identifier(value) {
                diagnostics.errors.push(ConfigValidationError::InvalidValue {
                    toml_path: toml_path.to_owned(),
                    message: format!("`{value}` is not an identifier"),
                });
            }
        }

        diagnostics
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: std::sync::MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber described by `config`.
///
/// Safe to call multiple times; only the first call has an effect.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if config.stderr {
            // Route through `TestWriter` in debug builds so `cargo test` captures the output.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(io::stderr));
            }
        }

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        if let Some(file) = file {
            let file = Arc::new(Mutex::new(file));
            make_writer = BoxMakeWriter::new(make_writer.and(MutexFileMakeWriter { file }));
        }

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(make_writer);
        let result = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            // Another subscriber was installed by the host; keep it.
            tracing::debug!(target: "kestrel.config", "global tracing subscriber already set");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_synonyms_are_normalized() {
        assert_eq!(LoggingConfig::normalize_level_directives(" Warning "), "warn");
        assert_eq!(LoggingConfig::normalize_level_directives(""), "info");
        assert_eq!(
            LoggingConfig::normalize_level_directives("kestrel.refactor=trace"),
            "kestrel.refactor=trace"
        );
    }

    #[test]
    fn env_filter_accepts_level_synonyms() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "warning".to_owned(),
            ..LoggingConfig::default()
        };
        assert!(config.level_is_valid());
        assert_eq!(
            config.env_filter().max_level_hint(),
            Some(tracing_subscriber::filter::LevelFilter::WARN)
        );

        let invalid = LoggingConfig {
            level: "kestrel=verbose".to_owned(),
            ..LoggingConfig::default()
        };
        assert!(!invalid.level_is_valid());
        assert_eq!(
            invalid.env_filter().max_level_hint(),
            Some(tracing_subscriber::filter::LevelFilter::INFO)
        );
    }

    #[test]
    fn init_tracing_installs_once() {
        let config = LoggingConfig {
            stderr: false,
            ..LoggingConfig::default()
        };
        init_tracing(&config);
        init_tracing(&config);
        tracing::info!(target: "kestrel.config", "tracing initialized");
    }

    #[test]
    fn visibility_keywords() {
        assert_eq!(Visibility::Private.keyword(), Some("private"));
        assert_eq!(Visibility::Public.keyword(), None);
    }
}

//! Build-wide instrumentation settings
//!
//! One immutable [`InstrumentationConfig`] is supplied per build and shared
//! read-only by every unit processed in it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default marker annotation, as a binary class name
pub const DEFAULT_MARKER_ANNOTATION: &str = "org.intellij.lang.annotations.Pattern";

/// What kind of check is woven in, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentationMode {
    /// Instrumentation disabled for the whole build
    None,
    /// Checks fail with an assertion error
    #[default]
    Assert,
    /// Checks fail with an ordinary runtime exception
    Exception,
}

/// Static runtime entry points the injected code calls.
///
/// Both methods must have the descriptor
/// `(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/String;)V` and receive
/// the checked value, the pattern and a description of the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorTarget {
    /// Binary name of the class declaring both methods
    pub class: String,
    pub assert_method: String,
    pub exception_method: String,
}

impl Default for ValidatorTarget {
    fn default() -> Self {
        Self {
            class: "org.classweave.runtime.PatternValidator".to_string(),
            assert_method: "assertMatches".to_string(),
            exception_method: "checkMatches".to_string(),
        }
    }
}

impl ValidatorTarget {
    /// Internal (slash separated) form of [`ValidatorTarget::class`]
    pub fn internal_class_name(&self) -> String {
        self.class.replace('.', "/")
    }

    /// Method invoked in `mode`; `None` when instrumentation is off
    pub fn method_for(&self, mode: InstrumentationMode) -> Option<&str> {
        match mode {
            InstrumentationMode::None => None,
            InstrumentationMode::Assert => Some(&self.assert_method),
            InstrumentationMode::Exception => Some(&self.exception_method),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    pub mode: InstrumentationMode,
    /// Binary name of the marker annotation, e.g. `com.example.Pattern`
    pub marker_annotation: String,
    pub validator: ValidatorTarget,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            mode: InstrumentationMode::default(),
            marker_annotation: DEFAULT_MARKER_ANNOTATION.to_string(),
            validator: ValidatorTarget::default(),
        }
    }
}

/// Invalid build-wide settings; fatal before any unit is processed
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read instrumentation settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Marker annotation name is empty")]
    MissingMarker,

    #[error("Invalid {what} {value:?}")]
    InvalidName { what: &'static str, value: String },
}

impl InstrumentationConfig {
    pub fn new(mode: InstrumentationMode, marker_annotation: impl Into<String>) -> Self {
        Self {
            mode,
            marker_annotation: marker_annotation.into(),
            validator: ValidatorTarget::default(),
        }
    }

    pub fn with_validator(mut self, validator: ValidatorTarget) -> Self {
        self.validator = validator;
        self
    }

    /// Parse and validate settings supplied by the project configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn enabled(&self) -> bool {
        self.mode != InstrumentationMode::None
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.marker_annotation.trim().is_empty() {
            return Err(ConfigError::MissingMarker);
        }
        check_binary_name("marker annotation name", &self.marker_annotation)?;
        check_binary_name("validator class name", &self.validator.class)?;
        check_identifier("assert method name", &self.validator.assert_method)?;
        check_identifier("exception method name", &self.validator.exception_method)?;
        Ok(())
    }

    /// Field descriptor of the marker, as stored in annotation attributes
    pub fn marker_descriptor(&self) -> String {
        format!("L{};", self.marker_annotation.replace('.', "/"))
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn check_identifier(what: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            what,
            value: value.to_string(),
        })
    }
}

fn check_binary_name(what: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.split('.').all(is_identifier) {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            what,
            value: value.to_string(),
        })
    }
}

//! Dispatcher configuration.
//!
//! Configuration is plain data: it can be built in code, loaded from JSON,
//! and overridden from `OFFLOAD_*` environment variables.
//!
//! ```json
//! {
//!   "lifecycle": "gated",
//!   "arguments": { "shape": "fixed", "input": [1, 2, 3] },
//!   "context": { "thread_name": "offload-context", "stack_size": 8388608 }
//! }
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Default cap on a single encoded envelope (64 MiB).
pub const DEFAULT_MAX_ENVELOPE_BYTES: usize = 64 * 1024 * 1024;

/// When execution contexts are created and destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// One context per dispatcher, spawned on attach, destroyed on kill/detach.
    #[default]
    Eager,
    /// A fresh context for every dispatch, torn down after its reply.
    PerCall,
    /// One context per factory, shared by every dispatcher it builds.
    Singleton,
    /// Context restarts driven by an external trigger value.
    Gated,
}

impl Lifecycle {
    /// Config-file spelling of the lifecycle.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eager => "eager",
            Self::PerCall => "per_call",
            Self::Singleton => "singleton",
            Self::Gated => "gated",
        }
    }
}

impl FromStr for Lifecycle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "eager" => Ok(Self::Eager),
            "per_call" => Ok(Self::PerCall),
            "singleton" => Ok(Self::Singleton),
            "gated" => Ok(Self::Gated),
            other => Err(Error::Config(format!("unknown lifecycle `{}`", other))),
        }
    }
}

/// How call arguments are placed in the invocation envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ArgumentShape {
    /// Dispatch arguments are sent as a positional list.
    #[default]
    Positional,
    /// A fixed input value is sent on every invocation.
    Fixed { input: Value },
}

/// Settings for spawned execution context threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Thread name prefix; the context generation is appended.
    pub thread_name: String,

    /// Stack size for context threads. `None` uses the platform default.
    pub stack_size: Option<usize>,

    /// Largest encoded envelope accepted in either direction.
    pub max_envelope_bytes: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            thread_name: "offload-context".to_string(),
            stack_size: None,
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
        }
    }
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Lifecycle policy.
    pub lifecycle: Lifecycle,

    /// Argument envelope shape.
    pub arguments: ArgumentShape,

    /// Context thread settings.
    pub context: ContextSettings,
}

impl DispatcherConfig {
    /// Config with the given lifecycle and defaults elsewhere.
    pub fn with_lifecycle(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            ..Self::default()
        }
    }

    /// Gated config sending `input` on every trigger change.
    pub fn gated(input: Value) -> Self {
        Self {
            lifecycle: Lifecycle::Gated,
            arguments: ArgumentShape::Fixed { input },
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read and `Config` if it is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Apply `OFFLOAD_*` environment overrides.
    ///
    /// Recognised variables: `OFFLOAD_LIFECYCLE`, `OFFLOAD_THREAD_NAME`,
    /// `OFFLOAD_STACK_SIZE`, `OFFLOAD_MAX_ENVELOPE_BYTES`.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("OFFLOAD_LIFECYCLE") {
            self.lifecycle = value.parse()?;
        }
        if let Some(value) = lookup("OFFLOAD_THREAD_NAME") {
            self.context.thread_name = value;
        }
        if let Some(value) = lookup("OFFLOAD_STACK_SIZE") {
            self.context.stack_size = Some(parse_size("OFFLOAD_STACK_SIZE", &value)?);
        }
        if let Some(value) = lookup("OFFLOAD_MAX_ENVELOPE_BYTES") {
            self.context.max_envelope_bytes = parse_size("OFFLOAD_MAX_ENVELOPE_BYTES", &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.lifecycle == Lifecycle::Gated
            && !matches!(self.arguments, ArgumentShape::Fixed { .. })
        {
            return Err(Error::Config(
                "gated lifecycle requires a fixed input (arguments.shape = \"fixed\")".to_string(),
            ));
        }
        if self.context.thread_name.is_empty() {
            return Err(Error::Config(
                "context.thread_name must not be empty".to_string(),
            ));
        }
        if self.context.thread_name.contains('\0') {
            return Err(Error::Config(
                "context.thread_name must not contain NUL".to_string(),
            ));
        }
        if self.context.max_envelope_bytes == 0 {
            return Err(Error::Config(
                "context.max_envelope_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.lifecycle, Lifecycle::Eager);
        assert_eq!(config.arguments, ArgumentShape::Positional);
        assert_eq!(config.context.thread_name, "offload-context");
        assert_eq!(
            config.context.max_envelope_bytes,
            DEFAULT_MAX_ENVELOPE_BYTES
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_partial() {
        let config = DispatcherConfig::from_json_str(
            r#"{"lifecycle": "gated", "arguments": {"shape": "fixed", "input": [1, 2]}}"#,
        )
        .unwrap();
        assert_eq!(config.lifecycle, Lifecycle::Gated);
        assert_eq!(
            config.arguments,
            ArgumentShape::Fixed {
                input: json!([1, 2])
            }
        );
        assert_eq!(config.context, ContextSettings::default());
    }

    #[test]
    fn test_gated_requires_fixed_input() {
        let err = DispatcherConfig::from_json_str(r#"{"lifecycle": "gated"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("fixed input")));
    }

    #[test]
    fn test_from_json_file() {
        let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("offload.json");
        std::fs::write(
            &path,
            r#"{"lifecycle": "per_call", "context": {"stack_size": 65536}}"#,
        )
        .expect("Failed to write config");

        let config = DispatcherConfig::from_json_file(&path).unwrap();
        assert_eq!(config.lifecycle, Lifecycle::PerCall);
        assert_eq!(config.context.stack_size, Some(65536));

        let missing = DispatcherConfig::from_json_file(temp.path().join("missing.json"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OFFLOAD_LIFECYCLE", "singleton"),
            ("OFFLOAD_THREAD_NAME", "calc"),
            ("OFFLOAD_STACK_SIZE", "1048576"),
        ]
        .into_iter()
        .collect();

        let config = DispatcherConfig::default()
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.lifecycle, Lifecycle::Singleton);
        assert_eq!(config.context.thread_name, "calc");
        assert_eq!(config.context.stack_size, Some(1 << 20));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = DispatcherConfig::default()
            .apply_vars(|key| (key == "OFFLOAD_STACK_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.starts_with("OFFLOAD_STACK_SIZE")));
    }

    #[test]
    fn test_lifecycle_parse() {
        assert_eq!("per-call".parse::<Lifecycle>().unwrap(), Lifecycle::PerCall);
        assert_eq!(" Eager ".parse::<Lifecycle>().unwrap(), Lifecycle::Eager);
        assert!("pool".parse::<Lifecycle>().is_err());
        assert_eq!(Lifecycle::PerCall.as_str(), "per_call");
    }
}

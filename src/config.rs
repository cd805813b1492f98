//! Target configuration files and environment overrides
//!
//! ```json
//! { "triple": "aarch64-linux-gnu", "cpu": "generic", "compiler": "aarch64-linux-gnu-gcc" }
//! ```
//!
//! Every field is optional. Environment variables override the file:
//! `FREESTAND_TRIPLE`, `FREESTAND_CPU`, `FREESTAND_FEATURES`, `FREESTAND_CC`
//! and `FREESTAND_RUNTIME` (`1`/`true`/`yes` to enable).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendKind;
use crate::target::{Platform, TargetDescriptor, TargetError, TargetSpec, TripleSource};

pub const ENV_TRIPLE: &str = "FREESTAND_TRIPLE";
pub const ENV_CPU: &str = "FREESTAND_CPU";
pub const ENV_FEATURES: &str = "FREESTAND_FEATURES";
pub const ENV_CC: &str = "FREESTAND_CC";
pub const ENV_RUNTIME: &str = "FREESTAND_RUNTIME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read target config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid target config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Serializable description of a target descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    pub backend: BackendKind,
    /// Raw triple; takes precedence over `platform`.
    pub triple: Option<String>,
    pub platform: Option<Platform>,
    pub cpu: Option<String>,
    pub features: Option<String>,
    pub compiler: Option<PathBuf>,
    pub managed_runtime: bool,
}

impl TargetConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(triple) = lookup(ENV_TRIPLE) {
            self.triple = Some(triple);
        }
        if let Some(cpu) = lookup(ENV_CPU) {
            self.cpu = Some(cpu);
        }
        if let Some(features) = lookup(ENV_FEATURES) {
            self.features = Some(features);
        }
        if let Some(cc) = lookup(ENV_CC) {
            self.compiler = Some(PathBuf::from(cc));
        }
        if let Some(flag) = lookup(ENV_RUNTIME) {
            self.managed_runtime = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_RUNTIME,
                        value: flag,
                    });
                }
            };
        }
        Ok(self)
    }

    /// Build the descriptor this configuration describes.
    pub fn into_descriptor(self) -> Result<TargetDescriptor, ConfigError> {
        let triple = match (self.triple, self.platform) {
            (Some(triple), _) => TripleSource::Raw(triple),
            (None, Some(platform)) => TripleSource::Platform(platform),
            (None, None) => TripleSource::Host,
        };
        let mut target = TargetDescriptor::new(
            self.backend,
            TargetSpec {
                triple,
                cpu: self.cpu,
                features: self.features,
            },
        )?;
        if let Some(compiler) = self.compiler {
            target.set_compiler(compiler);
        }
        target.set_runtime(self.managed_runtime);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Arch, Os};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_parse_config() {
        let config = TargetConfig::from_json(
            r#"{
                "platform": { "arch": "aarch64", "os": "linux", "libc": "musl" },
                "cpu": "generic",
                "compiler": "aarch64-linux-musl-gcc",
                "managed_runtime": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Cranelift);
        assert_eq!(config.platform.unwrap().arch, Arch::Aarch64);
        assert_eq!(config.compiler, Some(PathBuf::from("aarch64-linux-musl-gcc")));

        let target = config.into_descriptor().unwrap();
        assert_eq!(target.triple(), "aarch64-linux-musl");
        assert_eq!(target.compiler(), Some(Path::new("aarch64-linux-musl-gcc")));
        assert!(target.uses_managed_runtime());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(matches!(
            TargetConfig::from_json(r#"{ "tripel": "x86_64-linux-gnu" }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TRIPLE, "x86_64-unknown-linux-gnu"),
            (ENV_FEATURES, "+avx,+avx2"),
            (ENV_RUNTIME, "yes"),
        ]
        .into_iter()
        .collect();

        let config = TargetConfig {
            platform: Some(Platform::new(Arch::Aarch64, Os::Linux)),
            ..Default::default()
        }
        .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap();

        assert_eq!(config.triple.as_deref(), Some("x86_64-unknown-linux-gnu"));
        assert!(config.managed_runtime);

        // The raw triple wins over the platform.
        let target = config.into_descriptor().unwrap();
        assert_eq!(target.triple(), "x86_64-unknown-linux-gnu");
        assert_eq!(target.features(), "+avx,+avx2");
    }

    #[test]
    fn test_invalid_runtime_flag() {
        let err = TargetConfig::default()
            .apply_overrides(|key| (key == ENV_RUNTIME).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_empty_config_is_host() {
        let target = TargetConfig::default().into_descriptor().unwrap();
        assert!(target.is_host());
        assert!(!target.uses_managed_runtime());
    }

    #[test]
    fn test_bad_target_surfaces_target_error() {
        let config = TargetConfig {
            triple: Some("x86_64-linux-gnu".into()),
            cpu: Some("not-a-cpu".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.into_descriptor(),
            Err(ConfigError::Target(TargetError::InvalidCpu { .. }))
        ));
    }
}

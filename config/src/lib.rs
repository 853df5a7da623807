//! TOML configuration for the audit workspace.
//!
//! ```toml
//! [storage]
//! data_dir = "${HOME}/audits/alpha"
//!
//! [scanner]
//! tolerance = 1e-4
//! shallow_depth = 1
//! extra_lexical_phrases = ["alpha_em"]
//!
//! [[axioms]]
//! id = "A1"
//! statement = "Spacetime is a smooth 4-manifold."
//!
//! [[reference]]
//! name = "inverse_fine_structure"
//! value = 137.035999084
//! relative_uncertainty = 1.5e-10
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

use provenance_scanner::{ReferenceConstant, ScanConfig};
use provenance_types::{Axiom, AxiomCatalog, AxiomId, CatalogError};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PROVENANCE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub axioms: Vec<AxiomEntry>,
    /// Extra or overriding reference constants for the numerical layer.
    #[serde(default, rename = "reference")]
    pub references: Vec<ReferenceConstant>,
    /// File this config was read from; `None` for built-in defaults.
    #[serde(skip)]
    source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the append-only logs. Supports `${VAR}` expansion.
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerConfig {
    pub tolerance: Option<f64>,
    pub shallow_depth: Option<usize>,
    pub min_literal_digits: Option<usize>,
    #[serde(default)]
    pub extra_lexical_phrases: Vec<String>,
    #[serde(default)]
    pub extra_reasoning_phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxiomEntry {
    pub id: String,
    pub statement: String,
}

/// Replace `${VAR}` with the variable's value. Unset variables expand to
/// nothing; an unclosed `${` is kept verbatim.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }
    out.push_str(rest);
    out
}

/// `$PROVENANCE_CONFIG`, else `~/.provenance/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".provenance").join("config.toml"))
}

impl AuditConfig {
    /// Load from `explicit` if given (the file must exist), else from
    /// [`config_path`]. A missing default file yields the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                tracing::info!(path = %path.display(), "No config file; using built-in defaults");
                Ok(Self::default())
            }
            None => {
                tracing::info!("No home directory; using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let mut config = Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.source = Some(path.to_path_buf());
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!(
            path = %path.display(),
            axioms = config.axioms.len(),
            references = config.references.len(),
            "Config loaded"
        );
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(tolerance) = self.scanner.tolerance
            && !(tolerance > 0.0 && tolerance < 1.0)
        {
            return Err(format!("scanner.tolerance must be in (0, 1), got {tolerance}"));
        }
        if self.axioms.is_empty() {
            return Err("at least one [[axioms]] entry is required".to_string());
        }
        let mut seen = BTreeSet::new();
        for axiom in &self.axioms {
            if !seen.insert(axiom.id.as_str()) {
                return Err(format!("duplicate axiom id '{}'", axiom.id));
            }
        }
        for reference in &self.references {
            if !reference.value.is_finite() || !reference.relative_uncertainty.is_finite() {
                return Err(format!("reference '{}' must be finite", reference.name));
            }
            if reference.relative_uncertainty < 0.0 {
                return Err(format!(
                    "reference '{}' has a negative uncertainty",
                    reference.name
                ));
            }
        }
        Ok(())
    }

    /// Data directory with `${VAR}` expanded; defaults to `~/.provenance`.
    #[must_use]
    pub fn data_dir(&self) -> Option<PathBuf> {
        match self.storage.data_dir.as_deref() {
            Some(dir) => Some(PathBuf::from(expand_env_vars(dir))),
            None => dirs::home_dir().map(|home| home.join(".provenance")),
        }
    }

    /// The closed catalog. Fails when no axioms are configured.
    pub fn axiom_catalog(&self) -> Result<AxiomCatalog, CatalogError> {
        AxiomCatalog::new(self.axioms.iter().map(|entry| Axiom {
            id: AxiomId::new(entry.id.as_str()),
            statement: entry.statement.clone(),
        }))
    }

    /// Built-in scanner defaults with this file's overrides applied.
    /// Configured references replace built-ins of the same name.
    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        let mut config = ScanConfig::default()
            .extend_lexical(self.scanner.extra_lexical_phrases.iter().cloned())
            .extend_reasoning(self.scanner.extra_reasoning_phrases.iter().cloned());
        if let Some(tolerance) = self.scanner.tolerance {
            config = config.with_tolerance(tolerance);
        }
        if let Some(depth) = self.scanner.shallow_depth {
            config.shallow_depth = depth;
        }
        if let Some(digits) = self.scanner.min_literal_digits {
            config.min_literal_digits = digits;
        }
        for reference in &self.references {
            config.references.retain(|r| r.name != reference.name);
            config.references.push(reference.clone());
        }
        config
    }
}

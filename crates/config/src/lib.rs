//! Configuration for the stylesheet inlining stage.
//!
//! Values are layered with [`figment`]: serialized defaults, then an optional
//! configuration file (TOML, YAML or JSON, picked by extension), then
//! `FOLD_`-prefixed environment variables. Nested keys in the environment are
//! separated by a double underscore, so `FOLD_ENGINE__PRELOAD=swap` sets
//! `engine.preload`.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::bail;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::value::Dict;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Prefix of every environment variable read by [`Config::load`].
pub const ENV_PREFIX: &str = "FOLD_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Absolute output directory of the build. Stylesheets that are not in
    /// the asset table are read from and written back under this path.
    pub path: PathBuf,
    /// URL prefix the build serves its assets under; stripped from `href`s.
    pub public_path: String,
    /// Glob patterns of extra stylesheets to offer every document.
    pub additional_stylesheets: Vec<String>,
    /// Remove inlined CSS from the source stylesheets once every document
    /// has been processed.
    pub prune_source: bool,
    /// Options handed to the extraction engine untouched.
    pub engine: Dict,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            public_path: String::new(),
            additional_stylesheets: Vec::new(),
            prune_source: false,
            engine: Dict::new(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, `file` (if any) and the environment.
    #[instrument(level = "debug")]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            // Figment silently skips missing files; an explicit path must exist.
            if !file.is_file() {
                bail!(ErrorKind::NotFound(file.to_path_buf()));
            }
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                other => bail!(ErrorKind::UnsupportedFormat(other.unwrap_or_default().to_string())),
            };
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from caller-supplied providers.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|e| ErrorKind::Load(e.to_string()))?;
        config.validate()?;
        tracing::debug!(
            path = %config.path.display(),
            public_path = %config.public_path,
            additional_stylesheets = config.additional_stylesheets.len(),
            prune_source = config.prune_source,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path.is_absolute() {
            bail!(ErrorKind::Invalid {
                field: "path",
                reason: format!("must be an absolute path, got \"{}\"", self.path.display()),
            });
        }
        if self.public_path.chars().any(char::is_whitespace) {
            bail!(ErrorKind::Invalid {
                field: "public_path",
                reason: "must not contain whitespace".to_string(),
            });
        }
        for pattern in &self.additional_stylesheets {
            if let Err(e) = glob::Pattern::new(pattern) {
                bail!(ErrorKind::Invalid {
                    field: "additional_stylesheets",
                    reason: format!("\"{pattern}\": {e}"),
                });
            }
        }
        Ok(())
    }
}

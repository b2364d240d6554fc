//! Configuration for re-packing container image layers.
//!
//! Values are layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults (gzip output, gzip-only registry)
//! 2. A configuration file, TOML, YAML or JSON by extension
//! 3. Environment variables prefixed with `STRATA_` (e.g.
//!    `STRATA_COMPRESSION=zstd`, `STRATA_LEVEL=19`)
//!
//! ```toml
//! compression = "zstd"
//! level = 19
//! formats = ["gzip", "zstd"]
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format as _, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_compress::{Compression, Format, Preference, Registry};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "STRATA_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compression applied when a layer is re-packed without an explicit
    /// format.
    pub compression: Compression,
    /// Encoder level for `compression`; the format's default when unset.
    pub level: Option<u32>,
    /// Formats the registry recognises and can produce.
    pub formats: Vec<Compression>,
}

impl Default for Config {
    fn default() -> Self {
        Self { compression: Compression::Gzip, level: None, formats: vec![Compression::Gzip] }
    }
}

impl Config {
    /// Where the configuration file lives when no path is given, if the
    /// platform has a configuration directory at all.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "strata").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist. Without one, the file at
    /// [`default_path`](Self::default_path) is read if present.
    #[tracing::instrument(level = "debug", skip_all, fields(path))]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        if let Some(file) = &file {
            tracing::Span::current().record("path", tracing::field::display(file.display()));
        }
        let config = Self::from_figment(Self::figment(file.as_deref())?)?;
        tracing::debug!(compression = %config.compression, level = ?config.level, "configuration loaded");
        Ok(config)
    }

    /// The layered sources, without extracting them.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate a configuration from arbitrary sources.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values agree with each other.
    pub fn validate(&self) -> Result<()> {
        if self.compression != Compression::None && !self.formats.contains(&self.compression) {
            exn::bail!(ErrorKind::Invalid(format!("{} is not among the enabled formats", self.compression)));
        }
        if let Some(level) = self.level {
            match self.compression.levels() {
                Some(range) if range.contains(&level) => {},
                Some(range) => exn::bail!(ErrorKind::Invalid(format!(
                    "level {level} is outside {}..={} for {}",
                    range.start(),
                    range.end(),
                    self.compression
                ))),
                None => exn::bail!(ErrorKind::Invalid(format!("{} takes no level", self.compression))),
            }
        }
        Ok(())
    }

    /// Build the registry this configuration describes.
    ///
    /// Fails if a format has no codec compiled in.
    pub fn registry(&self) -> Result<Registry> {
        let mut registry = Registry::empty();
        for &kind in self.formats.iter().filter(|&&kind| kind != Compression::None) {
            let Some(format) = Format::builtin(kind) else {
                exn::bail!(ErrorKind::Invalid(format!("{kind} support is not compiled in")));
            };
            registry.register(format).map_err(ErrorKind::compression)?;
        }
        if let Some(level) = self.level
            && self.compression != Compression::None
        {
            registry.set_level(self.compression, level).map_err(ErrorKind::compression)?;
        }
        Ok(registry)
    }

    /// Pick the output compression for a re-pack.
    pub fn resolve(&self, preference: Preference, detected: Option<Compression>) -> Compression {
        preference.resolve(self.compression, detected)
    }
}

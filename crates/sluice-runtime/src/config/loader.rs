//! Layered configuration loading.
//!
//! Layers, lowest priority first:
//!
//! 1. [`SluiceConfig::default`]
//! 2. values passed to [`ConfigLoader::merge`]
//! 3. `sluice.<profile>.<ext>` next to the chosen base file
//! 4. the base file, `sluice.<ext>` or `config.<ext>`, or the file given to
//!    [`ConfigLoader::file`]
//! 5. `SLUICE_*` environment variables, with `__` between nested keys
//!    (`SLUICE_RESPONSE__MISSING_PARAMS_STATUS=422`)
//!
//! `<ext>` is `toml` with the `toml-config` feature and `yaml`/`yml` with
//! `yaml-config`. The profile defaults to `SLUICE_PROFILE`, then
//! `development`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SluiceConfig;

const ENV_PREFIX: &str = "SLUICE_";
const PROFILE_VAR: &str = "SLUICE_PROFILE";
const DEFAULT_PROFILE: &str = "development";

/// Base file names, in lookup order.
const FILE_STEMS: &[&str] = &["sluice", "config"];

/// Extensions the enabled format features can parse, in lookup order.
const EXTENSIONS: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "toml",
    #[cfg(feature = "yaml-config")]
    "yaml",
    #[cfg(feature = "yaml-config")]
    "yml",
];

/// Builds a [`SluiceConfig`] from defaults, files and the environment.
#[derive(Debug)]
pub struct ConfigLoader {
    overrides: Vec<SluiceConfig>,
    profile: Option<String>,
    dirs: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Vec::new(),
            profile: None,
            dirs: Vec::new(),
            file: None,
            env: true,
        }
    }

    /// Selects the profile variant file, overriding `SLUICE_PROFILE`.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into().to_lowercase());
        self
    }

    /// Adds a directory to look for configuration files in.
    pub fn search_path<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dirs.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Loads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` above the defaults and earlier merges.
    pub fn merge(mut self, config: SluiceConfig) -> Self {
        self.overrides.push(config);
        self
    }

    pub fn load(self) -> ConfigResult<SluiceConfig> {
        let profile = self.resolved_profile();
        let mut figment = Figment::from(Serialized::defaults(SluiceConfig::default()));
        for config in &self.overrides {
            figment = figment.merge(Serialized::defaults(config.clone()));
        }

        for path in self.files(&profile)? {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, &path)?;
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        let config: SluiceConfig = figment.extract()?;
        debug!(
            %profile,
            mode = %config.server.mode,
            port = config.server.port,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn resolved_profile(&self) -> String {
        self.profile
            .clone()
            .or_else(|| std::env::var(PROFILE_VAR).ok().map(|p| p.to_lowercase()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    /// Returns the files to merge, lowest priority first.
    fn files(&self, profile: &str) -> ConfigResult<Vec<PathBuf>> {
        let base = match &self.file {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => match self.discover() {
                Some(path) => path,
                None => {
                    warn!("No configuration file found, using defaults");
                    return Ok(Vec::new());
                }
            },
        };

        let variant = profile_variant(&base, profile).filter(|path| path.is_file());
        Ok(variant.into_iter().chain([base]).collect())
    }

    fn discover(&self) -> Option<PathBuf> {
        let cwd;
        let dirs = if self.dirs.is_empty() {
            cwd = std::env::current_dir().ok()?;
            std::slice::from_ref(&cwd)
        } else {
            self.dirs.as_slice()
        };

        dirs.iter()
            .flat_map(|dir| {
                FILE_STEMS.iter().flat_map(move |stem| {
                    EXTENSIONS.iter().map(move |ext| dir.join(format!("{stem}.{ext}")))
                })
            })
            .find(|path| path.is_file())
    }
}

/// `dir/sluice.toml` with profile `production` becomes
/// `dir/sluice.production.toml`.
fn profile_variant(base: &Path, profile: &str) -> Option<PathBuf> {
    let stem = base.file_stem()?.to_str()?;
    let ext = base.extension()?.to_str()?;
    Some(base.with_file_name(format!("{stem}.{profile}.{ext}")))
}

#[cfg_attr(
    not(any(feature = "toml-config", feature = "yaml-config")),
    allow(unused_variables)
)]
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(OsStr::to_str) {
        #[cfg(feature = "toml-config")]
        Some("toml") => Ok(figment.merge(figment::providers::Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        Some("yaml" | "yml") => Ok(figment.merge(figment::providers::Yaml::file(path))),
        _ => Err(ConfigError::ParseError(format!(
            "{} is not in an enabled configuration format",
            path.display()
        ))),
    }
}

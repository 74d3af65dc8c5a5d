// Copyright (C) 2024 Nicola Dardanis <nicdard@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::crypto::check_key_size;
use crate::error::Result;

/// The default settings file, looked up in the working directory. It is optional.
pub const DEFAULT_CONFIG_FILE_PATH: &str = "csrgen.toml";
/// Prefix of the environment variables overriding the settings, nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "CSRGEN_";
/// The default size of the generated RSA keys.
pub const DEFAULT_KEY_BITS: usize = 2048;
/// The default template collaborator, looked up in the working directory.
pub const DEFAULT_TEMPLATE_FILE_PATH: &str = "template.yaml";

/// Optional attributes added to the subject of the request, next to the common name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectSettings {
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
}

/// The settings of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Size in bits of the RSA modulus.
    pub key_bits: usize,
    /// The manifest template.
    pub template: PathBuf,
    /// The directory in which the `<name>/` output directory is created.
    pub output_root: PathBuf,
    pub subject: SubjectSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            key_bits: DEFAULT_KEY_BITS,
            template: PathBuf::from(DEFAULT_TEMPLATE_FILE_PATH),
            output_root: PathBuf::from("."),
            subject: SubjectSettings::default(),
        }
    }
}

impl Settings {
    /// The layered configuration: defaults, then the TOML file at `config_path` if present,
    /// then the `CSRGEN_` environment variables.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract the settings from the layered configuration and validate them.
    pub fn load(config_path: &Path) -> Result<Self> {
        let settings: Settings = Settings::figment(config_path).extract()?;
        settings.validate()?;
        log::debug!("Loaded settings: `{:?}`", settings);
        Ok(settings)
    }

    /// Reject settings a run would fail on, before anything is written.
    pub fn validate(&self) -> Result<()> {
        check_key_size(self.key_bits)
    }
}

// ========================================================================================
//                               Run configuration
// ========================================================================================
//
// A run is configured from an optional TOML file, then overridden by command-line flags.
// Prevalence levels must be known before the prior can be built, so a configuration that
// never names them is rejected up front by `RunConfig::prevalence`.

use crate::aggregate::CsmfScope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default output file stem, written as `<filename>.csv`.
pub const DEFAULT_FILENAME: &str = "VA5_result";
/// Default number of causes reported from the population fractions.
pub const DEFAULT_CSMF_TOP: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Invalid {setting} prevalence level '{value}'. Expected one of 'h' (high), 'l' (low) or 'v' (very low)."
    )]
    InvalidPrevalence { setting: &'static str, value: String },
    #[error(
        "No {0} prevalence level was given. Set it in the configuration file or pass it on the command line."
    )]
    MissingPrevalence(&'static str),
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid indicator layout: {0}")]
    Layout(String),
}

/// Prevalence of HIV or malaria as a cause of death in the study population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrevalenceLevel {
    /// Around 1 in 100 deaths.
    High,
    /// Around 1 in 1000 deaths.
    Low,
    /// Around 1 in 10000 deaths.
    VeryLow,
}

impl PrevalenceLevel {
    /// The single-letter code written to the `MALPREV`/`HIVPREV` result columns.
    pub fn code(self) -> &'static str {
        match self {
            Self::High => "h",
            Self::Low => "l",
            Self::VeryLow => "v",
        }
    }

    fn parse_for(setting: &'static str, value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "h" | "high" => Ok(Self::High),
            "l" | "low" => Ok(Self::Low),
            "v" | "very-low" | "verylow" | "very_low" => Ok(Self::VeryLow),
            _ => Err(ConfigError::InvalidPrevalence {
                setting,
                value: value.to_string(),
            }),
        }
    }

    pub fn parse_hiv(value: &str) -> Result<Self, ConfigError> {
        Self::parse_for("HIV", value)
    }

    pub fn parse_malaria(value: &str) -> Result<Self, ConfigError> {
        Self::parse_for("malaria", value)
    }
}

impl FromStr for PrevalenceLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_for("prevalence", s)
    }
}

impl TryFrom<String> for PrevalenceLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PrevalenceLevel> for String {
    fn from(level: PrevalenceLevel) -> Self {
        level.code().to_string()
    }
}

impl fmt::Display for PrevalenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Low => "low",
            Self::VeryLow => "very low",
        };
        f.write_str(label)
    }
}

/// Layout of the per-record result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Summary columns only.
    #[default]
    Classic,
    /// Summary columns followed by the full 70-cause distribution.
    Extended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsmfConfig {
    pub top: usize,
    pub scope: CsmfScope,
}

impl Default for CsmfConfig {
    fn default() -> Self {
        Self {
            top: DEFAULT_CSMF_TOP,
            scope: CsmfScope::MedicalOnly,
        }
    }
}

/// Everything a batch run needs besides the input table and the probability base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiv: Option<PrevalenceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malaria: Option<PrevalenceLevel>,
    pub output: OutputFormat,
    pub groupcode: bool,
    pub append: bool,
    pub directory: PathBuf,
    pub filename: String,
    pub write_checked_data: bool,
    pub csmf: CsmfConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hiv: None,
            malaria: None,
            output: OutputFormat::Classic,
            groupcode: false,
            append: false,
            directory: PathBuf::from("."),
            filename: DEFAULT_FILENAME.to_string(),
            write_checked_data: false,
            csmf: CsmfConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads a configuration from a TOML file. Keys that are absent take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// The (HIV, malaria) levels, failing if either was never set.
    pub fn prevalence(&self) -> Result<(PrevalenceLevel, PrevalenceLevel), ConfigError> {
        let hiv = self.hiv.ok_or(ConfigError::MissingPrevalence("HIV"))?;
        let malaria = self
            .malaria
            .ok_or(ConfigError::MissingPrevalence("malaria"))?;
        Ok((hiv, malaria))
    }

    /// Path of the per-record result file.
    pub fn result_path(&self) -> PathBuf {
        self.directory.join(format!("{}.csv", self.filename))
    }

    /// Path of the checked-data file, written only when `write_checked_data` is set.
    pub fn checked_path(&self) -> PathBuf {
        self.directory.join(format!("{}_checked.csv", self.filename))
    }
}

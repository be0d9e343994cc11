//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `FERM_ROOT_FOLDER` environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable config file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "FERM_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "notebook.db";

/// Probe types every batch must have a passing calibration for before inoculation
const DEFAULT_REQUIRED_PROBES: [&str; 3] = ["ph", "do", "temperature"];

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    pub level: String,
    /// Optional log file; stderr when absent
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Laboratory thresholds consulted by the validators and the state machine
///
/// Values are judgment calls by laboratory staff and therefore live in config,
/// not in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum inoculum OD600 reading
    pub inoculum_density_floor: f64,
    /// Accepted pH slope band, percent of Nernstian ideal
    pub ph_slope_min_percent: f64,
    pub ph_slope_max_percent: f64,
    /// Nernstian slope at 25 °C, mV per pH unit
    pub ph_ideal_slope_mv: f64,
    /// DO and off-gas probes must respond faster than this
    pub gas_response_ceiling_s: f64,
    /// DO and off-gas span reading tolerance, percent of reference
    pub gas_span_tolerance_percent: f64,
    /// Absolute tolerance for temperature probes, °C
    pub temperature_tolerance_c: f64,
    /// Absolute tolerance for pressure probes, bar
    pub pressure_tolerance_bar: f64,
    /// Samples required before a batch may be closed
    pub min_samples_for_closure: u32,
    /// Probe types needing a passing calibration before inoculation
    pub required_probes: Vec<String>,
    /// Upper bound for batch sequence numbers
    pub max_sequence_number: u32,
    /// Empirical DCW (g/L) per OD600 unit
    pub dcw_per_od_factor: f64,
    /// Measured DCW deviating from the OD estimate by more than this is logged
    pub dcw_cross_check_tolerance_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            inoculum_density_floor: 0.1,
            ph_slope_min_percent: 95.0,
            ph_slope_max_percent: 105.0,
            ph_ideal_slope_mv: 59.16,
            gas_response_ceiling_s: 60.0,
            gas_span_tolerance_percent: 2.0,
            temperature_tolerance_c: 0.5,
            pressure_tolerance_bar: 0.05,
            min_samples_for_closure: 8,
            required_probes: DEFAULT_REQUIRED_PROBES.iter().map(|p| p.to_string()).collect(),
            max_sequence_number: 9999,
            dcw_per_od_factor: 0.4,
            dcw_cross_check_tolerance_percent: 25.0,
        }
    }
}

impl Thresholds {
    /// Reject configurations the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if !(self.inoculum_density_floor > 0.0) {
            return Err(Error::Config(
                "inoculum_density_floor must be positive".to_string(),
            ));
        }
        if self.ph_slope_min_percent >= self.ph_slope_max_percent {
            return Err(Error::Config(format!(
                "pH slope band is empty: [{}, {}]",
                self.ph_slope_min_percent, self.ph_slope_max_percent
            )));
        }
        if !(self.ph_ideal_slope_mv > 0.0) {
            return Err(Error::Config("ph_ideal_slope_mv must be positive".to_string()));
        }
        if self.max_sequence_number == 0 {
            return Err(Error::Config("max_sequence_number must be >= 1".to_string()));
        }
        if !(self.dcw_per_od_factor > 0.0) {
            return Err(Error::Config("dcw_per_od_factor must be positive".to_string()));
        }
        Ok(())
    }
}

/// Contents of the TOML config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub thresholds: Thresholds,
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    config.thresholds.validate()?;
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Load the config from an explicit path or the platform location
///
/// Falls back to defaults with a warning when no file exists or it cannot be parsed.
pub fn load_or_default(explicit: Option<&Path>) -> TomlConfig {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => {
                warn!("No config directory for this platform, using defaults");
                return TomlConfig::default();
            }
        },
    };

    if !path.exists() {
        warn!("Config file not found: {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Platform config file location (`<config_dir>/ferm-eln/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ferm-eln").join("config.toml"))
}

/// Resolves the root folder following the priority order in the module docs
pub struct RootFolderResolver<'a> {
    cli_arg: Option<&'a Path>,
    toml: Option<&'a TomlConfig>,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<&'a Path>, toml: Option<&'a TomlConfig>) -> Self {
        Self { cli_arg, toml }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = self.cli_arg {
            return path.to_path_buf();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(root) = self.toml.and_then(|c| c.root_folder.as_ref()) {
            return root.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ferm-eln"))
        .unwrap_or_else(|| PathBuf::from("./ferm_eln_data"))
}

/// Prepares the resolved root folder on disk
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }
}

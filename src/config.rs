use std::path::Path;
use std::time::Duration;

use facet::Facet;

use crate::error::VbxError;
use crate::manage::VBoxManage;
use crate::paths;

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default)]
    pub manage: ManageConfig,
    #[facet(default)]
    pub stop: StopConfig,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct ManageConfig {
    /// Path to the VBoxManage binary. Empty means: resolve from the
    /// `VBX_MANAGE` environment variable, then the PATH.
    #[facet(default)]
    pub binary: String,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct StopConfig {
    /// Cadence of the ACPI power-button poll loop.
    #[facet(default = 1000)]
    pub poll_interval_ms: u64,
    /// Deadline for the poll loop in seconds. Absent means wait forever.
    pub timeout_s: Option<u64>,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            timeout_s: None,
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Config, VbxError> {
        let contents = std::fs::read_to_string(path).map_err(|source| VbxError::ConfigLoad {
            path: path.display().to_string(),
            source,
        })?;

        let config: Config =
            facet_toml::from_str(&contents).map_err(|e| VbxError::ConfigParse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective config: an explicitly given path must load;
    /// otherwise `./vbx.toml`, then the user config dir, then defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Config, VbxError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let local = Path::new(paths::CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }
        if let Some(user) = paths::user_config_path()
            && user.exists()
        {
            return Self::load(&user);
        }
        Ok(Config::default())
    }

    fn validate(&self) -> Result<(), VbxError> {
        if self.stop.poll_interval_ms == 0 {
            return Err(VbxError::Validation {
                message: "stop.poll_interval_ms must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Production runner for the configured binary.
    pub fn runner(&self) -> VBoxManage {
        if self.manage.binary.is_empty() {
            VBoxManage::from_env()
        } else {
            VBoxManage::new(&self.manage.binary)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop.timeout_s.map(Duration::from_secs)
    }
}

// ── Tests ────────────────────────────────────────────────
